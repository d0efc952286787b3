use std::collections::BTreeMap;

use kube::ResourceExt;

/// Label that marks a document as written by alert management.
pub const DEFAULT_OWNER_LABEL_KEY: &str = "cmo.openshift.io/owner";
pub const DEFAULT_OWNER_LABEL_VALUE: &str = "alert-management";
/// Name of the single rule group alert management owns inside a PrometheusRule.
pub const DEFAULT_RULE_GROUP_NAME: &str = "cmo-alert-management";

/// The strings shared between every writer and reader of managed documents.
///
/// A document written with one set of values looks foreign to a process
/// configured with another, so these are set once at startup and never derived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipConfig {
    pub label_key: String,
    pub label_value: String,
    pub rule_group_name: String,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            label_key: DEFAULT_OWNER_LABEL_KEY.into(),
            label_value: DEFAULT_OWNER_LABEL_VALUE.into(),
            rule_group_name: DEFAULT_RULE_GROUP_NAME.into(),
        }
    }
}

impl OwnershipConfig {
    /// True iff the document carries exactly our marker label.
    ///
    /// Callers decide what a missing document means before asking.
    pub fn is_managed<K: ResourceExt>(&self, document: &K) -> bool {
        self.has_marker(document.labels())
    }

    pub fn has_marker(&self, labels: &BTreeMap<String, String>) -> bool {
        labels.get(&self.label_key) == Some(&self.label_value)
    }

    /// Labels for a document we are about to create.
    pub fn marker_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(self.label_key.clone(), self.label_value.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{PrometheusRule, PrometheusRuleSpec};

    fn document(labels: &[(&str, &str)]) -> PrometheusRule {
        let mut pr = PrometheusRule::new("pr1", PrometheusRuleSpec::default());
        pr.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        pr
    }

    #[test]
    fn managed_only_with_exact_marker() {
        let config = OwnershipConfig::default();

        assert!(config.is_managed(&document(&[(DEFAULT_OWNER_LABEL_KEY, DEFAULT_OWNER_LABEL_VALUE)])));
        assert!(!config.is_managed(&document(&[(DEFAULT_OWNER_LABEL_KEY, "someone-else")])));
        assert!(!config.is_managed(&document(&[("app", DEFAULT_OWNER_LABEL_VALUE)])));
        assert!(!config.is_managed(&PrometheusRule::new("pr1", PrometheusRuleSpec::default())));
    }

    #[test]
    fn default_marker_is_the_cluster_monitoring_owner_label() {
        let config = OwnershipConfig::default();
        assert_eq!(config.rule_group_name, "cmo-alert-management");
        assert_eq!(
            config.marker_labels(),
            BTreeMap::from([("cmo.openshift.io/owner".to_string(), "alert-management".to_string())])
        );
        assert!(config.is_managed(&document(&[
            ("app.kubernetes.io/name", "kube-state-metrics"),
            ("cmo.openshift.io/owner", "alert-management"),
        ])));
    }

    #[test]
    fn marker_from_other_configuration_looks_foreign() {
        let ours = OwnershipConfig::default();
        let theirs = OwnershipConfig {
            label_value: "alert-management-v2".into(),
            ..Default::default()
        };

        let mut pr = PrometheusRule::new("pr1", PrometheusRuleSpec::default());
        pr.metadata.labels = Some(theirs.marker_labels());

        assert!(theirs.is_managed(&pr));
        assert!(!ours.is_managed(&pr));
    }
}
