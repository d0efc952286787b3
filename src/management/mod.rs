use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::*;

use crate::resources::{AlertRelabelConfig, PrometheusRule};
use crate::store::{DocumentStore, StoreError};
use crate::{Error, Metrics, Result};

pub mod alerting_rules;
pub mod ownership;
pub mod relabel_configs;
pub mod rule_groups;

pub use alerting_rules::AlertingRuleSummary;
pub use ownership::OwnershipConfig;

/// Identifies one alerting rule: severity takes part in identity because the
/// same alert name may exist at several severities.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingRuleId {
    pub namespace: String,
    pub prometheus_rule: String,
    pub rule_name: String,
    pub severity: String,
}

impl AlertingRuleId {
    pub fn new(
        namespace: impl Into<String>,
        prometheus_rule: impl Into<String>,
        rule_name: impl Into<String>,
        severity: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            prometheus_rule: prometheus_rule.into(),
            rule_name: rule_name.into(),
            severity: severity.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("namespace", &self.namespace),
            ("prometheusRule", &self.prometheus_rule),
            ("ruleName", &self.rule_name),
            ("severity", &self.severity),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidIdentity(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Display for AlertingRuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.namespace, self.prometheus_rule, self.rule_name, self.severity
        )
    }
}

/// Identifies one AlertRelabelConfig document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelabelConfigId {
    pub namespace: String,
    pub name: String,
}

impl RelabelConfigId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() || self.name.trim().is_empty() {
            return Err(Error::InvalidIdentity(
                "namespace and name are required".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration of the management controller, fixed at startup.
#[derive(Clone, Debug)]
pub struct ManagementConfig {
    pub ownership: OwnershipConfig,
    /// Upper bound for every single store call.
    pub request_timeout: Option<Duration>,
    /// Extra attempts after a write lost a compare-and-swap race.
    pub max_conflict_retries: u32,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            ownership: OwnershipConfig::default(),
            request_timeout: Some(Duration::from_secs(30)),
            max_conflict_retries: 3,
        }
    }
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
        }
    }
}

/// State shared between the controller and the web server
#[derive(Clone)]
pub struct State {
    /// Diagnostics populated by the controller
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    pub registry: prometheus::Registry,
    config: ManagementConfig,
}

/// State wrapper around the controller outputs for the web server
impl State {
    pub fn new(config: ManagementConfig) -> Self {
        Self {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            registry: prometheus::Registry::default(),
            config,
        }
    }

    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller that can update State
    pub fn to_controller(
        &self,
        prometheus_rules: Arc<dyn DocumentStore<PrometheusRule>>,
        alert_relabel_configs: Arc<dyn DocumentStore<AlertRelabelConfig>>,
    ) -> Result<Arc<Controller>, prometheus::Error> {
        Ok(Arc::new(Controller {
            prometheus_rules,
            alert_relabel_configs,
            config: self.config.clone(),
            metrics: Metrics::default().register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
        }))
    }
}

/// The outcome of mutating a freshly read document in memory.
pub(crate) enum Write<K> {
    /// Persist the document (create when it carries no resourceVersion).
    Apply(K),
    /// Remove the document; its resourceVersion guards the delete.
    Delete(K),
    /// Nothing to persist.
    Unchanged,
}

/// Owns the public operations on alerting rules and relabel configs.
pub struct Controller {
    prometheus_rules: Arc<dyn DocumentStore<PrometheusRule>>,
    alert_relabel_configs: Arc<dyn DocumentStore<AlertRelabelConfig>>,
    config: ManagementConfig,
    metrics: Metrics,
    diagnostics: Arc<RwLock<Diagnostics>>,
}

/// What an operation acts on: a document, optionally narrowed to one entry in it.
struct Target<'a> {
    namespace: &'a str,
    name: &'a str,
    entry: Option<String>,
}

impl<'a> Target<'a> {
    fn document(namespace: &'a str, name: &'a str) -> Self {
        Self {
            namespace,
            name,
            entry: None,
        }
    }

    fn alerting_rule(id: &'a AlertingRuleId) -> Self {
        Self {
            namespace: &id.namespace,
            name: &id.prometheus_rule,
            entry: Some(format!(
                "alerting rule {} (severity {})",
                id.rule_name, id.severity
            )),
        }
    }

    fn describe<K: Resource<DynamicType = ()>>(&self) -> String {
        match &self.entry {
            Some(entry) => format!("{} {}/{}: {entry}", K::kind(&()), self.namespace, self.name),
            None => format!("{} {}/{}", K::kind(&()), self.namespace, self.name),
        }
    }
}

fn document_not_found<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> Error {
    Error::DocumentNotFound {
        kind: K::kind(&()).to_string(),
        namespace: namespace.into(),
        name: name.into(),
    }
}

fn record_trace_id() {
    if let Some(trace_id) = crate::telemetry::get_trace_id() {
        Span::current().record("trace_id", field::display(&trace_id));
    }
}

impl Controller {
    pub fn ownership(&self) -> &OwnershipConfig {
        &self.config.ownership
    }

    /// Count the outcome of an operation in the failure metrics.
    fn observe<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.metrics.operation_failure(operation, err);
        }
        result
    }

    /// Run a store call under the configured request timeout.
    async fn bounded<T, F>(&self, call: F) -> std::result::Result<T, StoreError>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        match self.config.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .unwrap_or(Err(StoreError::DeadlineExceeded(timeout))),
            None => call.await,
        }
    }

    /// Log a store failure once, with the identity it concerned, and classify it.
    fn upstream(&self, operation: &'static str, resource: String, err: StoreError) -> Error {
        error!(operation, resource = %resource, error = %err, "Store call failed");
        match err {
            StoreError::DeadlineExceeded(timeout) => Error::DeadlineExceeded {
                operation,
                resource,
                timeout,
            },
            source => Error::Upstream {
                operation,
                resource,
                source,
            },
        }
    }

    /// Fetch a document, mapping absence to `None`.
    async fn fetch<K>(
        &self,
        store: &dyn DocumentStore<K>,
        operation: &'static str,
        target: &Target<'_>,
    ) -> Result<Option<K>>
    where
        K: Resource<DynamicType = ()> + Send + 'static,
    {
        match self.bounded(store.get(target.namespace, target.name)).await {
            Ok(document) => Ok(Some(document)),
            Err(StoreError::NotFound) => Ok(None),
            Err(err) => Err(self.upstream(operation, target.describe::<K>(), err)),
        }
    }

    async fn list<K>(&self, store: &dyn DocumentStore<K>, operation: &'static str) -> Result<Vec<K>>
    where
        K: Resource<DynamicType = ()> + Send + 'static,
    {
        self.bounded(store.list()).await.map_err(|err| {
            self.upstream(operation, format!("{} (all namespaces)", K::kind(&())), err)
        })
    }

    fn ensure_managed<K>(&self, document: &K) -> Result<()>
    where
        K: Resource<DynamicType = ()>,
    {
        if self.config.ownership.is_managed(document) {
            Ok(())
        } else {
            Err(Error::OwnershipConflict {
                kind: K::kind(&()).to_string(),
                namespace: document.namespace().unwrap_or_default(),
                name: document.name_any(),
            })
        }
    }

    /// A new, empty document carrying our ownership marker.
    fn new_document<K>(&self, namespace: &str, name: &str) -> K
    where
        K: Resource<DynamicType = ()> + Default,
    {
        let mut document = K::default();
        let meta = document.meta_mut();
        meta.name = Some(name.into());
        meta.namespace = Some(namespace.into());
        meta.labels = Some(self.config.ownership.marker_labels());
        document
    }

    /// Read, check ownership, mutate and conditionally persist a document.
    ///
    /// `mutate` sees the document as just read (or `None` if it does not exist)
    /// and is re-run from scratch whenever the conditional write loses a race.
    async fn modify<K, T, F>(
        &self,
        store: &dyn DocumentStore<K>,
        operation: &'static str,
        target: &Target<'_>,
        mut mutate: F,
    ) -> Result<T>
    where
        K: Resource<DynamicType = ()> + Clone + Send + 'static,
        F: FnMut(Option<K>) -> Result<(Write<K>, T)>,
    {
        let resource = target.describe::<K>();
        let attempts = self.config.max_conflict_retries + 1;

        for attempt in 1..=attempts {
            let current = self.fetch(store, operation, target).await?;
            if let Some(document) = &current {
                self.ensure_managed(document)?;
            }

            let (write, value) = mutate(current)?;

            let result = match write {
                Write::Apply(document) => {
                    self.ensure_managed(&document)?;
                    self.bounded(store.create_or_update(document))
                        .await
                        .map(|_| ())
                }
                Write::Delete(document) => {
                    self.ensure_managed(&document)?;
                    self.bounded(store.delete(
                        target.namespace,
                        target.name,
                        document.resource_version(),
                    ))
                    .await
                }
                Write::Unchanged => return Ok(value),
            };

            match result {
                Ok(()) => {
                    self.diagnostics.write().await.last_event = Utc::now();
                    return Ok(value);
                }
                // someone else wrote (or removed) the document since we read it
                Err(err) if err.is_conflict() || err.is_not_found() => {
                    warn!(
                        operation,
                        resource = %resource,
                        attempt,
                        error = %err,
                        "Write lost a race, re-reading"
                    );
                    self.metrics.conflict_retry(&K::kind(&()));
                }
                Err(err) => return Err(self.upstream(operation, resource, err)),
            }
        }

        Err(Error::ConcurrentModification { resource, attempts })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_every_field() {
        assert!(AlertingRuleId::new("ns", "pr1", "HighMemory", "critical")
            .validate()
            .is_ok());

        let err = AlertingRuleId::new("ns", "pr1", "HighMemory", "")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity(ref m) if m.contains("severity")));

        let err = AlertingRuleId::new("", " ", "HighMemory", "critical")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity(ref m) if m.contains("namespace, prometheusRule")));

        assert!(RelabelConfigId::new("ns", "").validate().is_err());
    }

    #[test]
    fn identity_uses_path_parameter_names() {
        let id: AlertingRuleId = serde_json::from_value(serde_json::json!({
            "namespace": "ns",
            "prometheusRule": "pr1",
            "ruleName": "HighMemory",
            "severity": "critical"
        }))
        .unwrap();
        assert_eq!(id, AlertingRuleId::new("ns", "pr1", "HighMemory", "critical"));
        assert_eq!(id.to_string(), "ns/pr1/HighMemory/critical");
    }
}
