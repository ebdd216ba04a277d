use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const APPLIED_RULES_KEY: &str = "applied_rules";

/// A named, versioned rule bundle. Immutable once registered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub description: String,
    pub version: u32,
    pub rules: Value,
}

impl Policy {
    pub fn new(name: impl Into<String>, description: impl Into<String>, rules: Value) -> Self {
        Self { name: name.into(), description: description.into(), version: 1, rules }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Reads the rule bundle into a typed view.
    pub fn rules_as<T: DeserializeOwned>(&self) -> Result<T, PolicyError> {
        serde_json::from_value(self.rules.clone()).map_err(|error| PolicyError::MalformedRules {
            name: self.name.clone(),
            reason: error.to_string(),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Unknown policy names pass the data through untouched.
    #[default]
    Lenient,
    /// Unknown policy names are reported as errors.
    Strict,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy `{0}` is not defined")]
    NotFound(String),
    #[error("policy `{name}` has malformed rules: {reason}")]
    MalformedRules { name: String, reason: String },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Policy>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.insert(policy.name.clone(), policy);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    pub fn resolve(&self, name: &str) -> Result<&Policy, PolicyError> {
        self.get(name).ok_or_else(|| PolicyError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.policies.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Returns `data` with the named rule bundle attached under `applied_rules`.
    ///
    /// In lenient mode an unknown name yields `data` unchanged.
    pub fn apply(
        &self,
        name: &str,
        mut data: Map<String, Value>,
        mode: PolicyMode,
    ) -> Result<Map<String, Value>, PolicyError> {
        match (self.get(name), mode) {
            (Some(policy), _) => {
                data.insert(APPLIED_RULES_KEY.to_string(), policy.rules.clone());
                Ok(data)
            }
            (None, PolicyMode::Lenient) => Ok(data),
            (None, PolicyMode::Strict) => Err(PolicyError::NotFound(name.to_string())),
        }
    }
}
