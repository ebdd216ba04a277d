use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::policy::PolicyError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn generate() -> Self {
        Self(format!("act-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Raised by capability handlers. Never escapes `process_action`; it is folded into a
/// failed action instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("unknown action type: {0}")]
    UnknownActionType(String),
    #[error("missing required parameter `{0}`")]
    MissingParameter(String),
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("{0}")]
    Rejected(String),
}

/// Additive key/value payload carried by an action.
///
/// Fields can be added or overwritten but never removed, so each stage of a handler
/// only ever enriches what earlier stages produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merges every top-level field of a serializable output struct into the payload.
    pub fn merge<T: Serialize>(&mut self, output: &T) -> Result<(), HandlerError> {
        match serde_json::to_value(output) {
            Ok(Value::Object(fields)) => {
                self.0.extend(fields);
                Ok(())
            }
            Ok(other) => Err(HandlerError::Rejected(format!(
                "handler output must be an object, got {}",
                json_kind(&other)
            ))),
            Err(error) => Err(HandlerError::Rejected(format!("handler output: {error}"))),
        }
    }

    pub fn extend(&mut self, fields: Map<String, Value>) {
        self.0.extend(fields);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|value| !value.is_null())
    }

    pub fn str_param(&self, key: &str) -> Result<&str, HandlerError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Err(HandlerError::MissingParameter(key.to_string())),
            Some(Value::String(value)) => Ok(value.as_str()),
            Some(other) => Err(HandlerError::InvalidParameter {
                name: key.to_string(),
                reason: format!("expected string, got {}", json_kind(other)),
            }),
        }
    }

    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn f64_param(&self, key: &str) -> Result<f64, HandlerError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Err(HandlerError::MissingParameter(key.to_string())),
            Some(value) => value.as_f64().ok_or_else(|| HandlerError::InvalidParameter {
                name: key.to_string(),
                reason: format!("expected number, got {}", json_kind(value)),
            }),
        }
    }

    pub fn opt_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Deserializes a parameter into a typed value.
    pub fn typed_param<T: DeserializeOwned>(&self, key: &str) -> Result<T, HandlerError> {
        let value = match self.0.get(key) {
            None | Some(Value::Null) => return Err(HandlerError::MissingParameter(key.to_string())),
            Some(value) => value.clone(),
        };
        serde_json::from_value(value).map_err(|error| HandlerError::InvalidParameter {
            name: key.to_string(),
            reason: error.to_string(),
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub id: ActionId,
    pub action_type: String,
    pub description: String,
    pub status: ActionStatus,
    pub result: Payload,
    pub error: Option<String>,
}

impl AgentAction {
    pub fn new(action_type: impl Into<String>, params: Payload) -> Self {
        let action_type = action_type.into();
        Self {
            id: ActionId::generate(),
            description: action_type.replace('_', " "),
            action_type,
            status: ActionStatus::Pending,
            result: params,
            error: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn start(&mut self) {
        self.status = ActionStatus::Processing;
    }

    pub fn complete(&mut self) {
        self.status = ActionStatus::Completed;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ActionStatus::Failed;
        self.error = Some(error.into());
    }

    pub fn is_completed(&self) -> bool {
        self.status == ActionStatus::Completed
    }
}
