// src/params/store.rs

//! Session-wide parameter and return-value stores.
//!
//! Both stores are shared by the scheduler loop, by completing runs and by
//! external readers. Each operation touches a single key under one lock
//! acquisition; `update` serialises read-modify-write cycles on one key.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value;

use crate::locks::{read, write};
use crate::params::{Argument, Parameters};

/// Session-level parameters.
#[derive(Debug, Default)]
pub struct ParameterStore {
    inner: RwLock<Parameters>,
}

impl ParameterStore {
    pub fn new(initial: Parameters) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub fn get(&self, name: &str) -> Option<Argument> {
        read(&self.inner).get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, arg: impl Into<Argument>) {
        write(&self.inner).insert(name, arg);
    }

    pub fn remove(&self, name: &str) -> Option<Argument> {
        write(&self.inner).remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        read(&self.inner).contains(name)
    }

    /// Insert every entry of `params`, one key at a time.
    pub fn extend(&self, params: &Parameters) {
        for (name, arg) in params.iter() {
            self.set(name.clone(), arg.clone());
        }
    }

    /// Point-in-time copy of all parameters.
    pub fn snapshot(&self) -> Parameters {
        read(&self.inner).clone()
    }

    /// Materialized parameters as plain values.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        read(&self.inner).to_values()
    }

    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }
}

/// Latest successful return value per task name.
///
/// Written once per successful run, never rolled back by failures.
#[derive(Debug, Default)]
pub struct ReturnStore {
    inner: RwLock<HashMap<String, Value>>,
}

impl ReturnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task: &str) -> Option<Value> {
        read(&self.inner).get(task).cloned()
    }

    pub fn set(&self, task: impl Into<String>, value: Value) -> Option<Value> {
        write(&self.inner).insert(task.into(), value)
    }

    /// Read-modify-write of one entry while holding the write lock.
    pub fn update<F>(&self, task: &str, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut guard = write(&self.inner);
        let next = f(guard.get(task));
        guard.insert(task.to_string(), next.clone());
        next
    }

    pub fn remove(&self, task: &str) -> Option<Value> {
        write(&self.inner).remove(task)
    }

    pub fn contains(&self, task: &str) -> bool {
        read(&self.inner).contains_key(task)
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> {
        read(&self.inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }
}
