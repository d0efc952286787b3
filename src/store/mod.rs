//! Storage seam for the shared documents.
//!
//! A `DocumentStore<K>` hands out one document per (namespace, name). Writes are
//! conditional: a document carrying a `resourceVersion` only replaces the stored
//! copy if that version is still current, and a document without one is only
//! created if nothing is stored under its name yet. Both failures surface as
//! [`StoreError::Conflict`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod kubernetes;

#[cfg(test)]
pub(crate) mod testing;

pub use kubernetes::KubeStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("store call did not return within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Kube Error: {0}")]
    Kube(kube::Error),
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound,
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict(resp.message),
            err => StoreError::Kube(err),
        }
    }
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[async_trait]
pub trait DocumentStore<K: Send + 'static>: Send + Sync {
    /// All documents of this kind, across namespaces.
    async fn list(&self) -> Result<Vec<K>, StoreError>;

    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    /// Create `document` if it has no resourceVersion, otherwise replace the
    /// stored copy if its version still matches. Returns the stored document.
    async fn create_or_update(&self, document: K) -> Result<K, StoreError>;

    /// Delete a document, optionally only if it is still at `resource_version`.
    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
    ) -> Result<(), StoreError>;
}
