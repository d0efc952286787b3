use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use kube::core::ErrorResponse;
use kube::{Resource, ResourceExt};

use super::{DocumentStore, StoreError};

type Documents<K> = BTreeMap<(String, String), K>;
type WriteHook<K> = Box<dyn FnOnce(&mut Documents<K>) + Send>;

/// In-memory DocumentStore with the same compare-and-swap rules as the API server.
pub(crate) struct FakeStore<K> {
    documents: Mutex<Documents<K>>,
    next_version: AtomicUsize,
    gets: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    get_error: Mutex<Option<u16>>,
    get_delay: Mutex<Option<Duration>>,
    before_write: Mutex<Vec<WriteHook<K>>>,
}

impl<K> Default for FakeStore<K> {
    fn default() -> Self {
        Self {
            documents: Mutex::new(BTreeMap::new()),
            next_version: AtomicUsize::new(1),
            gets: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            get_error: Mutex::new(None),
            get_delay: Mutex::new(None),
            before_write: Mutex::new(Vec::new()),
        }
    }
}

impl<K> FakeStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    /// Seed a document as if some other writer had stored it.
    pub fn insert(&self, mut document: K) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        document.meta_mut().resource_version = Some(version.to_string());
        let key = (document.namespace().unwrap_or_default(), document.name_any());
        self.documents.lock().unwrap().insert(key, document);
    }

    pub fn document(&self, namespace: &str, name: &str) -> Option<K> {
        self.documents
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Make every `get` fail with an API error carrying `code`.
    pub fn fail_gets_with(&self, code: u16) {
        *self.get_error.lock().unwrap() = Some(code);
    }

    pub fn delay_gets(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }

    /// Run `hook` against the stored documents right before the next write or
    /// delete is evaluated. Simulates a concurrent writer sneaking in between
    /// our read and our write.
    pub fn before_next_write(&self, hook: impl FnOnce(&mut Documents<K>) + Send + 'static) {
        self.before_write.lock().unwrap().push(Box::new(hook));
    }

    /// Bump the stored version of a document without changing its content.
    pub fn touch(&self, namespace: &str, name: &str) {
        let namespace = namespace.to_string();
        let name = name.to_string();
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        self.before_next_write(move |documents| {
            if let Some(document) = documents.get_mut(&(namespace, name)) {
                document.meta_mut().resource_version = Some(format!("touched-{version}"));
            }
        });
    }

    fn run_write_hook(&self, documents: &mut Documents<K>) {
        let hook = {
            let mut hooks = self.before_write.lock().unwrap();
            if hooks.is_empty() {
                None
            } else {
                Some(hooks.remove(0))
            }
        };
        if let Some(hook) = hook {
            hook(documents);
        }
    }
}

fn api_error(code: u16) -> StoreError {
    StoreError::from(kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: format!("injected failure {code}"),
        reason: "InternalError".into(),
        code,
    }))
}

#[async_trait]
impl<K> DocumentStore<K> for FakeStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn list(&self) -> Result<Vec<K>, StoreError> {
        Ok(self.documents.lock().unwrap().values().cloned().collect())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(code) = *self.get_error.lock().unwrap() {
            return Err(api_error(code));
        }
        self.document(namespace, name).ok_or(StoreError::NotFound)
    }

    async fn create_or_update(&self, mut document: K) -> Result<K, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.lock().unwrap();
        self.run_write_hook(&mut documents);

        let key = (document.namespace().unwrap_or_default(), document.name_any());
        let stored_version = documents.get(&key).and_then(|d| d.resource_version());
        match (document.resource_version(), stored_version) {
            (None, Some(_)) => return Err(StoreError::Conflict("already exists".into())),
            (Some(_), None) => return Err(StoreError::NotFound),
            (Some(ours), Some(theirs)) if ours != theirs => {
                return Err(StoreError::Conflict(format!(
                    "resourceVersion {ours} is stale, current is {theirs}"
                )))
            }
            _ => {}
        }

        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        document.meta_mut().resource_version = Some(version.to_string());
        documents.insert(key, document.clone());
        Ok(document)
    }

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
    ) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.lock().unwrap();
        self.run_write_hook(&mut documents);

        let key = (namespace.to_string(), name.to_string());
        let stored = documents.get(&key).ok_or(StoreError::NotFound)?;
        if let Some(expected) = resource_version {
            if stored.resource_version().as_deref() != Some(expected.as_str()) {
                return Err(StoreError::Conflict("precondition failed".into()));
            }
        }
        documents.remove(&key);
        Ok(())
    }
}

