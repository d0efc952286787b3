use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// AlertRelabelConfig defines a set of relabel configs for alerts.
/// API: monitoring.openshift.io/v1
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "monitoring.openshift.io",
    version = "v1",
    kind = "AlertRelabelConfig",
    plural = "alertrelabelconfigs",
    derive = "Default",
    derive = "PartialEq",
    namespaced
)]
pub struct AlertRelabelConfigSpec {
    /// Configs is a list of sequentially evaluated alert relabel configs.
    #[serde(default)]
    pub configs: Vec<RelabelConfig>,
}

/// RelabelConfig allows dynamic rewriting of label sets for alerts.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelabelConfig {
    /// The source labels select values from existing labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_labels: Option<Vec<String>>,

    /// Separator placed between concatenated source label values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,

    /// Label to which the resulting value is written in a replace action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,

    /// Regular expression against which the extracted value is matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    /// Modulus to take of the hash of the source label values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulus: Option<u64>,

    /// Replacement value against which a regex replace is performed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,

    /// Action to perform based on regex matching. Defaults to Replace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn relabel_config_uses_camel_case() {
        let config = RelabelConfig {
            source_labels: Some(vec!["alertname".into(), "severity".into()]),
            separator: Some(";".into()),
            regex: Some("Watchdog;none".into()),
            target_label: Some("severity".into()),
            replacement: Some("info".into()),
            action: Some("Replace".into()),
            ..Default::default()
        };

        assert_json_eq!(
            serde_json::to_value(&config).unwrap(),
            json!({
                "sourceLabels": ["alertname", "severity"],
                "separator": ";",
                "regex": "Watchdog;none",
                "targetLabel": "severity",
                "replacement": "info",
                "action": "Replace"
            })
        );
    }
}
