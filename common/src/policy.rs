//! Traffic policy documents
//!
//! A policy maps a phase (`on_http_request`, `on_http_response`, ...) to an
//! ordered list of rules; each rule holds an ordered list of actions.
//! Older documents key rules by direction instead (`inbound`, `outbound`);
//! `convert_legacy_directions_to_phases` rewrites those in place.
//!
//! ```json
//! {
//!   "on_http_request": [
//!     {"name": "rewrite", "actions": [{"type": "url-rewrite", "config": {"from": ".*", "to": "/"}}]}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub const PHASE_ON_HTTP_REQUEST: &str = "on_http_request";
pub const PHASE_ON_HTTP_RESPONSE: &str = "on_http_response";
pub const PHASE_ON_TCP_CONNECT: &str = "on_tcp_connect";

pub const LEGACY_INBOUND: &str = "inbound";
pub const LEGACY_OUTBOUND: &str = "outbound";

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Invalid traffic policy: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("Traffic policy must be a JSON object, got: {0}")]
    NotAnObject(String),
}

/// A single action: `{"type": "...", "config": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl Action {
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config: Some(config),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<String>,

    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            expressions: Vec::new(),
            actions,
        }
    }
}

/// Phase keyed rule lists
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficPolicy {
    phases: BTreeMap<String, Vec<Rule>>,
}

impl TrafficPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a policy document. `null` yields an empty policy.
    pub fn from_value(value: &Value) -> Result<Self, PolicyError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(_) => Ok(serde_json::from_value(value.clone())?),
            other => Err(PolicyError::NotAnObject(other.to_string())),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, PolicyError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(&value)
    }

    pub fn to_value(&self) -> Result<Value, PolicyError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.phases.values().all(Vec::is_empty)
    }

    pub fn rules(&self, phase: &str) -> &[Rule] {
        self.phases.get(phase).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn phases(&self) -> impl Iterator<Item = &str> {
        self.phases.keys().map(String::as_str)
    }

    /// True when the document uses `inbound`/`outbound` keys
    pub fn is_legacy(&self) -> bool {
        self.phases.contains_key(LEGACY_INBOUND) || self.phases.contains_key(LEGACY_OUTBOUND)
    }

    /// Move `inbound` rules to `on_http_request` and `outbound` rules to
    /// `on_http_response`, appended after any rules already in those phases.
    pub fn convert_legacy_directions_to_phases(&mut self) {
        for (legacy, phase) in [
            (LEGACY_INBOUND, PHASE_ON_HTTP_REQUEST),
            (LEGACY_OUTBOUND, PHASE_ON_HTTP_RESPONSE),
        ] {
            if let Some(rules) = self.phases.remove(legacy) {
                self.phases
                    .entry(phase.to_string())
                    .or_default()
                    .extend(rules);
            }
        }
    }

    /// Append a rule to a phase
    pub fn merge_rule(&mut self, rule: Rule, phase: &str) {
        self.phases.entry(phase.to_string()).or_default().push(rule);
    }

    /// Append every rule of `other`, phase by phase, preserving order
    pub fn merge(&mut self, other: TrafficPolicy) {
        for (phase, rules) in other.phases {
            self.phases.entry(phase).or_default().extend(rules);
        }
    }
}
