use kube::ResourceExt;
use serde::Serialize;
use tracing::*;

use super::rule_groups::{
    ensure_owned_group, find_owned_group, find_owned_group_mut, find_rule, position_of,
    prune_owned_group,
};
use super::{document_not_found, record_trace_id, AlertingRuleId, Controller, Target, Write};
use crate::resources::{PrometheusRule, Rule};
use crate::{Error, Result};

/// An alerting rule as found in the cluster, whether we manage it or not.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingRuleSummary {
    pub id: AlertingRuleId,
    /// The rule sits in the owned group of a managed document.
    pub managed: bool,
    pub rule: Rule,
}

/// The payload must describe the rule its identity names.
fn validate_payload(id: &AlertingRuleId, rule: &Rule) -> Result<()> {
    if rule.alert.as_deref() != Some(id.rule_name.as_str()) {
        return Err(Error::InvalidRule(format!(
            "alert {:?} does not match rule name {:?}",
            rule.alert.as_deref().unwrap_or_default(),
            id.rule_name
        )));
    }
    if rule.severity() != Some(id.severity.as_str()) {
        return Err(Error::InvalidRule(format!(
            "severity label {:?} does not match severity {:?}",
            rule.severity().unwrap_or_default(),
            id.severity
        )));
    }
    Ok(())
}

impl Controller {
    #[instrument(skip(self), fields(trace_id))]
    pub async fn get_alerting_rule(&self, id: &AlertingRuleId) -> Result<Rule> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("get_alerting_rule");
        self.observe("get_alerting_rule", self.get_rule(id).await)
    }

    #[instrument(skip(self, rule), fields(trace_id))]
    pub async fn create_alerting_rule(&self, id: &AlertingRuleId, rule: Rule) -> Result<Rule> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("create_alerting_rule");
        self.observe("create_alerting_rule", self.create_rule(id, rule).await)
    }

    #[instrument(skip(self, rule), fields(trace_id))]
    pub async fn update_alerting_rule(&self, id: &AlertingRuleId, rule: Rule) -> Result<Rule> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("update_alerting_rule");
        self.observe("update_alerting_rule", self.update_rule(id, rule).await)
    }

    #[instrument(skip(self), fields(trace_id))]
    pub async fn delete_alerting_rule(&self, id: &AlertingRuleId) -> Result<()> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("delete_alerting_rule");
        self.observe("delete_alerting_rule", self.delete_rule(id).await)
    }

    /// Every addressable alerting rule in every PrometheusRule, in document order.
    #[instrument(skip(self), fields(trace_id))]
    pub async fn list_alerting_rules(&self) -> Result<Vec<AlertingRuleSummary>> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("list_alerting_rules");
        self.observe("list_alerting_rules", self.list_rules().await)
    }

    async fn get_rule(&self, id: &AlertingRuleId) -> Result<Rule> {
        id.validate()?;
        let document = self
            .fetch(
                self.prometheus_rules.as_ref(),
                "get",
                &Target::alerting_rule(id),
            )
            .await?
            .ok_or_else(|| document_not_found::<PrometheusRule>(&id.namespace, &id.prometheus_rule))?;

        find_rule(&document.spec.groups, &id.rule_name, &id.severity)
            .cloned()
            .ok_or_else(|| Error::RuleNotFound(id.clone()))
    }

    async fn create_rule(&self, id: &AlertingRuleId, rule: Rule) -> Result<Rule> {
        id.validate()?;
        validate_payload(id, &rule)?;
        let group_name = &self.config.ownership.rule_group_name;

        self.modify(
            self.prometheus_rules.as_ref(),
            "create",
            &Target::alerting_rule(id),
            |current| {
                let mut document = current.unwrap_or_else(|| {
                    debug!("PrometheusRule {}/{} does not exist yet", id.namespace, id.prometheus_rule);
                    self.new_document(&id.namespace, &id.prometheus_rule)
                });
                ensure_owned_group(&mut document.spec.groups, group_name)
                    .rules
                    .push(rule.clone());
                Ok((Write::Apply(document), rule.clone()))
            },
        )
        .await
    }

    async fn update_rule(&self, id: &AlertingRuleId, rule: Rule) -> Result<Rule> {
        id.validate()?;
        validate_payload(id, &rule)?;
        let group_name = &self.config.ownership.rule_group_name;

        self.modify(
            self.prometheus_rules.as_ref(),
            "update",
            &Target::alerting_rule(id),
            |current| {
                let mut document = current.ok_or_else(|| {
                    document_not_found::<PrometheusRule>(&id.namespace, &id.prometheus_rule)
                })?;
                let group = find_owned_group_mut(&mut document.spec.groups, group_name)
                    .ok_or_else(|| Error::GroupNotFound {
                        namespace: id.namespace.clone(),
                        name: id.prometheus_rule.clone(),
                    })?;
                let position = position_of(group, &id.rule_name, &id.severity)
                    .ok_or_else(|| Error::RuleNotFound(id.clone()))?;
                group.rules[position] = rule.clone();
                Ok((Write::Apply(document), rule.clone()))
            },
        )
        .await
    }

    async fn delete_rule(&self, id: &AlertingRuleId) -> Result<()> {
        id.validate()?;
        let group_name = &self.config.ownership.rule_group_name;

        self.modify(
            self.prometheus_rules.as_ref(),
            "delete",
            &Target::alerting_rule(id),
            |current| {
                let mut document = current.ok_or_else(|| {
                    document_not_found::<PrometheusRule>(&id.namespace, &id.prometheus_rule)
                })?;
                let group = find_owned_group_mut(&mut document.spec.groups, group_name)
                    .ok_or_else(|| Error::GroupNotFound {
                        namespace: id.namespace.clone(),
                        name: id.prometheus_rule.clone(),
                    })?;
                let position = position_of(group, &id.rule_name, &id.severity)
                    .ok_or_else(|| Error::RuleNotFound(id.clone()))?;
                group.rules.remove(position);

                if prune_owned_group(&mut document.spec.groups, group_name) {
                    debug!("Owned group of {}/{} is empty, pruning it", id.namespace, id.prometheus_rule);
                }
                if document.spec.groups.is_empty() {
                    Ok((Write::Delete(document), ()))
                } else {
                    Ok((Write::Apply(document), ()))
                }
            },
        )
        .await
    }

    async fn list_rules(&self) -> Result<Vec<AlertingRuleSummary>> {
        let documents = self.list(self.prometheus_rules.as_ref(), "list").await?;
        let ownership = &self.config.ownership;

        let mut summaries = Vec::new();
        for document in &documents {
            let namespace = document.namespace().unwrap_or_default();
            let name = document.name_any();
            let owned = ownership
                .is_managed(document)
                .then(|| find_owned_group(&document.spec.groups, &ownership.rule_group_name))
                .flatten();

            for group in &document.spec.groups {
                let in_owned_group = owned.is_some_and(|owned| std::ptr::eq(owned, group));
                for rule in &group.rules {
                    let (Some(alert), Some(severity)) = (rule.alert.as_deref(), rule.severity())
                    else {
                        continue;
                    };
                    summaries.push(AlertingRuleSummary {
                        id: AlertingRuleId::new(&namespace, &name, alert, severity),
                        managed: in_owned_group,
                        rule: rule.clone(),
                    });
                }
            }
        }
        Ok(summaries)
    }
}
