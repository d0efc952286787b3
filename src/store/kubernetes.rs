use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams, Preconditions};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::*;

use super::{DocumentStore, StoreError};

/// DocumentStore backed by the Kubernetes API server.
///
/// Compare-and-swap comes for free: a replace carrying a stale
/// `metadata.resourceVersion` is rejected with 409 by the API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K> DocumentStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn list(&self) -> Result<Vec<K>, StoreError> {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        Ok(self.namespaced::<K>(namespace).get(name).await?)
    }

    async fn create_or_update(&self, document: K) -> Result<K, StoreError> {
        let namespace = document.namespace().unwrap_or_default();
        let name = document.name_any();
        let api = self.namespaced::<K>(&namespace);
        let params = PostParams {
            field_manager: Some("alert-management".into()),
            ..Default::default()
        };

        if document.resource_version().is_none() {
            debug!("Creating {} {namespace}/{name}", K::kind(&()));
            Ok(api.create(&params, &document).await?)
        } else {
            debug!("Replacing {} {namespace}/{name}", K::kind(&()));
            Ok(api.replace(&name, &params, &document).await?)
        }
    }

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
    ) -> Result<(), StoreError> {
        let params = DeleteParams {
            preconditions: resource_version.map(|rv| Preconditions {
                resource_version: Some(rv),
                uid: None,
            }),
            ..Default::default()
        };
        debug!("Deleting {} {namespace}/{name}", K::kind(&()));
        self.namespaced::<K>(namespace).delete(name, &params).await?;
        Ok(())
    }
}
