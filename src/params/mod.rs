// src/params/mod.rs

//! Parameters, lazy arguments and the stores that hold them.
//!
//! - [`Argument`] is either a materialized JSON value or a deferred
//!   computation resolved right before a task body runs.
//! - [`Parameters`] maps parameter names to arguments (session level or
//!   task level).
//! - [`Arguments`] is the fully resolved view handed to a task body.
//! - [`store`] holds the session-wide parameter and return-value stores.
//! - [`resolve`] turns bindings into arguments against a session.

pub mod resolve;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{Result, TasktideError};
use crate::session::Session;

pub use resolve::{resolve, resolve_for_task};
pub use store::{ParameterStore, ReturnStore};

type ArgFn = dyn Fn(&Session) -> anyhow::Result<Value> + Send + Sync;

/// Named callable computing a value from the session at call time.
#[derive(Clone)]
pub struct FuncArgument {
    name: String,
    func: Arc<ArgFn>,
}

impl FuncArgument {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, session: &Session) -> anyhow::Result<Value> {
        (self.func)(session)
    }
}

/// A parameter value, materialized or lazy.
#[derive(Clone)]
pub enum Argument {
    /// Passed through unchanged.
    Value(Value),
    /// Latest successful return value of the named task.
    Return(String),
    /// Session-level parameter with the given name.
    Param(String),
    /// Process environment variable.
    Env(String),
    /// Value computed by a callable from the session.
    Func(FuncArgument),
}

impl Argument {
    pub fn value(value: impl Into<Value>) -> Self {
        Argument::Value(value.into())
    }

    pub fn return_of(task: impl Into<String>) -> Self {
        Argument::Return(task.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Argument::Param(name.into())
    }

    pub fn env(var: impl Into<String>) -> Self {
        Argument::Env(var.into())
    }

    pub fn func<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Session) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Argument::Func(FuncArgument {
            name: name.into(),
            func: Arc::new(func),
        })
    }

    pub fn is_lazy(&self) -> bool {
        !matches!(self, Argument::Value(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Argument::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => write!(f, "Value({v})"),
            Argument::Return(task) => write!(f, "Return({task:?})"),
            Argument::Param(name) => write!(f, "Param({name:?})"),
            Argument::Env(var) => write!(f, "Env({var:?})"),
            Argument::Func(func) => write!(f, "Func({:?})", func.name),
        }
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Argument::Value(a), Argument::Value(b)) => a == b,
            (Argument::Return(a), Argument::Return(b)) => a == b,
            (Argument::Param(a), Argument::Param(b)) => a == b,
            (Argument::Env(a), Argument::Env(b)) => a == b,
            (Argument::Func(a), Argument::Func(b)) => {
                a.name == b.name && Arc::ptr_eq(&a.func, &b.func)
            }
            _ => false,
        }
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

/// Mapping from parameter name to [`Argument`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    entries: BTreeMap<String, Argument>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from materialized values only.
    pub fn from_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .map(|(k, v)| (k.into(), Argument::Value(v.into())))
            .collect()
    }

    /// Build from a JSON object; non-objects are a type error.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_values(map)),
            other => Err(TasktideError::Type(format!(
                "parameters must be a mapping (got {})",
                crate::config::model::json_type_name(&other)
            ))),
        }
    }

    pub fn with(mut self, name: impl Into<String>, arg: impl Into<Argument>) -> Self {
        self.entries.insert(name.into(), arg.into());
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        arg: impl Into<Argument>,
    ) -> Option<Argument> {
        self.entries.insert(name.into(), arg.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Argument> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Argument)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Copy of `self` with every entry of `overrides` applied on top.
    pub fn merged_with(&self, overrides: &Parameters) -> Parameters {
        let mut merged = self.clone();
        for (name, arg) in overrides.iter() {
            merged.entries.insert(name.clone(), arg.clone());
        }
        merged
    }

    /// Materialized entries only, lazy ones are left out.
    pub fn to_values(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .filter_map(|(k, arg)| arg.as_value().map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Argument)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, Argument)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl From<BTreeMap<String, Value>> for Parameters {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self::from_values(values)
    }
}

/// Fully resolved arguments passed to a task body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Deserialize the named argument into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| TasktideError::resolution(name, "argument not provided"))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone().into_iter().collect())
    }

    pub(crate) fn insert(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }
}
