use tracing::*;

use super::{document_not_found, record_trace_id, Controller, RelabelConfigId, Target, Write};
use crate::resources::{AlertRelabelConfig, RelabelConfig};
use crate::{Error, Result};

impl Controller {
    /// The relabel configs of one document. Reads ignore ownership.
    #[instrument(skip(self), fields(trace_id))]
    pub async fn get_relabel_configs(&self, id: &RelabelConfigId) -> Result<Vec<RelabelConfig>> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("get_relabel_configs");
        self.observe("get_relabel_configs", self.get_configs(id).await)
    }

    /// Append an entry, creating the document if needed.
    #[instrument(skip(self, entry), fields(trace_id))]
    pub async fn create_relabel_config(
        &self,
        id: &RelabelConfigId,
        entry: RelabelConfig,
    ) -> Result<RelabelConfig> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("create_relabel_config");
        self.observe("create_relabel_config", self.append_config(id, entry).await)
    }

    /// Replace the whole list. An empty list removes the document.
    #[instrument(skip(self, entries), fields(trace_id))]
    pub async fn update_relabel_configs(
        &self,
        id: &RelabelConfigId,
        entries: Vec<RelabelConfig>,
    ) -> Result<Vec<RelabelConfig>> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("update_relabel_configs");
        self.observe("update_relabel_configs", self.replace_configs(id, entries).await)
    }

    /// Remove the first entry equal to `entry`.
    #[instrument(skip(self, entry), fields(trace_id))]
    pub async fn delete_relabel_config(&self, id: &RelabelConfigId, entry: RelabelConfig) -> Result<()> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("delete_relabel_config");
        self.observe("delete_relabel_config", self.remove_config(id, entry).await)
    }

    #[instrument(skip(self), fields(trace_id))]
    pub async fn list_relabel_configs(&self) -> Result<Vec<AlertRelabelConfig>> {
        record_trace_id();
        let _timer = self.metrics.count_and_measure("list_relabel_configs");
        let result = self.list(self.alert_relabel_configs.as_ref(), "list").await;
        self.observe("list_relabel_configs", result)
    }

    async fn get_configs(&self, id: &RelabelConfigId) -> Result<Vec<RelabelConfig>> {
        id.validate()?;
        self.fetch(
            self.alert_relabel_configs.as_ref(),
            "get",
            &Target::document(&id.namespace, &id.name),
        )
        .await?
        .map(|document| document.spec.configs)
            .ok_or_else(|| document_not_found::<AlertRelabelConfig>(&id.namespace, &id.name))
    }

    async fn append_config(&self, id: &RelabelConfigId, entry: RelabelConfig) -> Result<RelabelConfig> {
        id.validate()?;
        self.modify(
            self.alert_relabel_configs.as_ref(),
            "create",
            &Target::document(&id.namespace, &id.name),
            |current| {
                let mut document: AlertRelabelConfig =
                    current.unwrap_or_else(|| self.new_document(&id.namespace, &id.name));
                document.spec.configs.push(entry.clone());
                Ok((Write::Apply(document), entry.clone()))
            },
        )
        .await
    }

    async fn replace_configs(
        &self,
        id: &RelabelConfigId,
        entries: Vec<RelabelConfig>,
    ) -> Result<Vec<RelabelConfig>> {
        id.validate()?;
        self.modify(
            self.alert_relabel_configs.as_ref(),
            "update",
            &Target::document(&id.namespace, &id.name),
            |current| {
                let write = match current {
                    None if entries.is_empty() => Write::Unchanged,
                    Some(document) if entries.is_empty() => {
                        debug!("No relabel configs left in {}/{}", id.namespace, id.name);
                        Write::Delete(document)
                    }
                    current => {
                        let mut document: AlertRelabelConfig =
                            current.unwrap_or_else(|| self.new_document(&id.namespace, &id.name));
                        document.spec.configs = entries.clone();
                        Write::Apply(document)
                    }
                };
                Ok((write, entries.clone()))
            },
        )
        .await
    }

    async fn remove_config(&self, id: &RelabelConfigId, entry: RelabelConfig) -> Result<()> {
        id.validate()?;
        self.modify(
            self.alert_relabel_configs.as_ref(),
            "delete",
            &Target::document(&id.namespace, &id.name),
            |current| {
                let mut document = current
                    .ok_or_else(|| document_not_found::<AlertRelabelConfig>(&id.namespace, &id.name))?;
                let position = document
                    .spec
                    .configs
                    .iter()
                    .position(|config| *config == entry)
                    .ok_or_else(|| Error::RelabelConfigNotFound {
                        namespace: id.namespace.clone(),
                        name: id.name.clone(),
                    })?;
                document.spec.configs.remove(position);

                if document.spec.configs.is_empty() {
                    Ok((Write::Delete(document), ()))
                } else {
                    Ok((Write::Apply(document), ()))
                }
            },
        )
        .await
    }
}
