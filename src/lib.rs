use std::time::Duration;

use management::AlertingRuleId;
use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("{kind} {namespace}/{name} not found")]
    DocumentNotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("alerting rule {} (severity {}) not found in PrometheusRule {}/{}", .0.rule_name, .0.severity, .0.namespace, .0.prometheus_rule)]
    RuleNotFound(AlertingRuleId),

    #[error("relabel config not found in AlertRelabelConfig {namespace}/{name}")]
    RelabelConfigNotFound { namespace: String, name: String },

    #[error("{kind} {namespace}/{name} is not managed by alert management")]
    OwnershipConflict {
        kind: String,
        namespace: String,
        name: String,
    },

    // NB: only reachable if something other than us removed the owned group
    // while leaving the ownership label in place
    #[error("PrometheusRule {namespace}/{name} is managed but has no alert management rule group")]
    GroupNotFound { namespace: String, name: String },

    #[error("failed to {operation} {resource}: {source}")]
    Upstream {
        operation: &'static str,
        resource: String,
        #[source]
        source: StoreError,
    },

    #[error("{operation} {resource} did not complete within {timeout:?}")]
    DeadlineExceeded {
        operation: &'static str,
        resource: String,
        timeout: Duration,
    },

    #[error("{resource} kept changing underneath us, gave up after {attempts} attempts")]
    ConcurrentModification { resource: String, attempts: u32 },

    #[error("Failed to query Prometheus: {0}")]
    QueryFailed(#[from] reqwest::Error),

    #[error("unexpected status code response, want 200, got {status} ({body:?})")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid query result: {0}")]
    InvalidQueryResult(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::SerializationError(_) => "SerializationError",
            Error::InvalidIdentity(_) => "InvalidIdentity",
            Error::InvalidRule(_) => "InvalidRule",
            Error::DocumentNotFound { .. } => "DocumentNotFound",
            Error::RuleNotFound(_) => "RuleNotFound",
            Error::RelabelConfigNotFound { .. } => "RelabelConfigNotFound",
            Error::OwnershipConflict { .. } => "OwnershipConflict",
            Error::GroupNotFound { .. } => "GroupNotFound",
            Error::Upstream { .. } => "Upstream",
            Error::DeadlineExceeded { .. } => "DeadlineExceeded",
            Error::ConcurrentModification { .. } => "ConcurrentModification",
            Error::QueryFailed(_) => "QueryFailed",
            Error::UnexpectedStatus { .. } => "UnexpectedStatus",
            Error::InvalidQueryResult(_) => "InvalidQueryResult",
        }
    }
}

/// Alerting rule and relabel config management
pub mod management;

/// Storage of the shared documents
pub mod store;

/// Bounded polling against eventually consistent state
pub mod polling;

/// Client for the Prometheus HTTP API
pub mod prometheus_api;

/// HTTP routes for the management API
pub mod httpserver;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;

pub use management::State;
pub use metrics::Metrics;

/// External CRDs
pub mod resources;
