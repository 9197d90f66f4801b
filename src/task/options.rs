use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::DurationInput;
use crate::errors::{Result, TasktideError};
use crate::types::Execution;

/// Option bag accepted at task registration.
///
/// Only `execution`, `priority`, `timeout`, `parameters` and `retries` are
/// recognised; anything else fails construction.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskOptions {
    #[serde(default)]
    pub execution: Option<Execution>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub timeout: Option<DurationInput>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub retries: Option<u32>,
}

impl TaskOptions {
    pub fn from_mapping(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| TasktideError::Config(format!("task options: {e}")))
    }
}
