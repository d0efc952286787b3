use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The label every addressable alerting rule carries alongside its alert name.
pub const SEVERITY_LABEL: &str = "severity";

/// PrometheusRule defines recording and alerting rules for a Prometheus instance.
/// API: monitoring.coreos.com/v1
///
/// Several writers share a single PrometheusRule; this crate only ever mutates the
/// one group it owns and passes every other group through untouched.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "PrometheusRule",
    plural = "prometheusrules",
    derive = "Default",
    derive = "PartialEq",
    namespaced
)]
pub struct PrometheusRuleSpec {
    /// Content of Prometheus rule file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<RuleGroup>,
}

/// RuleGroup is a list of sequentially evaluated recording and alerting rules.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RuleGroup {
    /// Name of the rule group.
    pub name: String,

    /// Interval determines how often rules in the group are evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Defines the offset the rule evaluation timestamp of this particular group by the specified duration into the past.
    #[serde(default, rename = "query_offset", skip_serializing_if = "Option::is_none")]
    pub query_offset: Option<String>,

    /// List of alerting and recording rules.
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// PartialResponseStrategy is only used by ThanosRuler and will be ignored by Prometheus instances.
    #[serde(
        default,
        rename = "partial_response_strategy",
        skip_serializing_if = "Option::is_none"
    )]
    pub partial_response_strategy: Option<String>,

    /// Limit the number of alerts an alerting rule and series a recording rule can produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// Labels to add or overwrite before storing the result for its rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Rule describes an alerting or recording rule.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Rule {
    /// Name of the time series to output to. Only used for recording rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,

    /// Name of the alert. Must be a valid label value. Only used for alerting rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,

    /// PromQL expression to evaluate.
    pub expr: IntOrString,

    /// Alerts are considered firing once they have been returned for this long.
    #[serde(default, rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_: Option<String>,

    /// KeepFiringFor defines how long an alert will continue firing after the condition that triggered it has cleared.
    #[serde(
        default,
        rename = "keep_firing_for",
        skip_serializing_if = "Option::is_none"
    )]
    pub keep_firing_for: Option<String>,

    /// Labels to add or overwrite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Annotations to add to each alert. Only valid for alerting rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Rule {
    /// Build an alerting rule with the given name, expression and severity.
    pub fn alerting(alert: &str, expr: &str, severity: &str) -> Self {
        Self {
            alert: Some(alert.into()),
            expr: IntOrString::String(expr.into()),
            labels: Some(BTreeMap::from([(SEVERITY_LABEL.into(), severity.into())])),
            ..Default::default()
        }
    }

    pub fn severity(&self) -> Option<&str> {
        self.labels
            .as_ref()
            .and_then(|labels| labels.get(SEVERITY_LABEL))
            .map(String::as_str)
    }

    /// Whether this is the alerting rule named `alert` at `severity`.
    pub fn matches(&self, alert: &str, severity: &str) -> bool {
        self.alert.as_deref() == Some(alert) && self.severity() == Some(severity)
    }
}
