//! External CRDs whose documents are shared with other writers.
//!
//! Neither CRD is installed by this crate; the structs mirror the upstream
//! schemas closely enough that foreign content survives a read-modify-write.

pub mod alertrelabelconfigs;
pub mod prometheusrules;

pub use alertrelabelconfigs::{AlertRelabelConfig, AlertRelabelConfigSpec, RelabelConfig};
pub use prometheusrules::{PrometheusRule, PrometheusRuleSpec, Rule, RuleGroup, SEVERITY_LABEL};
