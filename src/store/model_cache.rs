use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::ResolutionError;
use crate::logic::resolve::ModelResolver;
use crate::model::{ApiModel, ModelUri};

/// Default time a caller waits for a resolution
pub const DEFAULT_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Unset until the single resolution for the key completes
type Slot = Option<Result<Arc<ApiModel>, ResolutionError>>;

/// Memoizes resolved models per canonical URI.
///
/// The first request for a URI spawns the resolution; every later or
/// concurrent request attaches to the same single-value channel. Resolutions
/// run detached from callers, so a caller giving up after its timeout never
/// cancels the shared entry.
pub struct ModelCache {
    resolver: Arc<ModelResolver>,
    /// Entries keyed by canonical URI (`remote/X`, `nested/K`)
    entries: Arc<Mutex<HashMap<String, watch::Receiver<Slot>>>>,
    timeout: Duration,
    resolutions: Arc<AtomicUsize>,
}

impl ModelCache {
    pub fn new(resolver: Arc<ModelResolver>) -> Self {
        Self::with_timeout(resolver, DEFAULT_RESOLUTION_TIMEOUT)
    }

    pub fn with_timeout(resolver: Arc<ModelResolver>, timeout: Duration) -> Self {
        Self {
            resolver,
            entries: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            resolutions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn resolver(&self) -> &Arc<ModelResolver> {
        &self.resolver
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get_or_resolve(&self, uri: &str) -> Result<Arc<ApiModel>, ResolutionError> {
        self.get_or_resolve_with_timeout(uri, self.timeout).await
    }

    pub async fn get_or_resolve_with_timeout(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<Arc<ApiModel>, ResolutionError> {
        let uri = ModelUri::parse(uri);
        let key = uri.to_string();
        let mut receiver = self.entry(uri);

        let outcome = match tokio::time::timeout(timeout, receiver.wait_for(Option::is_some)).await {
            Ok(Ok(slot)) => slot
                .clone()
                .unwrap_or_else(|| Err(ResolutionError::Closed(key.clone()))),
            Ok(Err(_)) => Err(ResolutionError::Closed(key)),
            Err(_) => {
                log::warn!("Gave up waiting for {} after {:?}", key, timeout);
                Err(ResolutionError::Timeout {
                    uri: key,
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        };
        outcome
    }

    /// Completed value for `uri`, without waiting or triggering a resolution
    pub fn peek(&self, uri: &str) -> Option<Result<Arc<ApiModel>, ResolutionError>> {
        let key = ModelUri::parse(uri).to_string();
        let entries = self.entries.lock();
        entries.get(&key).and_then(|receiver| receiver.borrow().clone())
    }

    /// Number of resolutions started since creation (or the last clear)
    pub fn resolution_count(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forget every entry and nested fragment
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.resolver.registry().clear();
        self.resolutions.store(0, Ordering::SeqCst);
    }

    fn entry(&self, uri: ModelUri) -> watch::Receiver<Slot> {
        let key = uri.to_string();
        let mut entries = self.entries.lock();
        if let Some(receiver) = entries.get(&key) {
            log::debug!("Cache hit for {}", key);
            return receiver.clone();
        }

        let (sender, receiver) = watch::channel(None);
        entries.insert(key.clone(), receiver.clone());
        self.resolutions.fetch_add(1, Ordering::SeqCst);

        let resolver = Arc::clone(&self.resolver);
        let shared = Arc::clone(&self.entries);
        let own = receiver.clone();
        tokio::spawn(async move {
            let result = resolver.resolve(&uri).await.map(Arc::new);
            if let Err(err) = &result {
                log::warn!("Resolution of {} failed: {}", key, err);
                if err.is_transient() {
                    let mut entries = shared.lock();
                    // the key may belong to a newer entry after a clear
                    if entries.get(&key).map_or(false, |entry| entry.same_channel(&own)) {
                        entries.remove(&key);
                    }
                }
            }
            sender.send_replace(Some(result));
        });

        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaDocument;
    use crate::store::SchemaSource;
    use serde_json::json;

    /// Counts fetches and answers after a delay
    struct SlowSource {
        document: SchemaDocument,
        delay: Duration,
        fetches: AtomicUsize,
        fail: bool,
        /// Only the first fetch fails
        fail_once: bool,
    }

    impl SlowSource {
        fn new(delay: Duration) -> Self {
            let document = serde_json::from_value(json!({
                "definitions": {
                    "Opus": {"type": "object", "properties": {"title": {"type": "string"}}}
                }
            }))
            .unwrap();
            Self {
                document,
                delay,
                fetches: AtomicUsize::new(0),
                fail: false,
                fail_once: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl SchemaSource for SlowSource {
        async fn get_spec(&self) -> Result<SchemaDocument, ResolutionError> {
            let fetch = self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_once && fetch > 0 {
                return Ok(self.document.clone());
            }
            tokio::time::sleep(self.delay).await;
            if self.fail || self.fail_once {
                return Err(ResolutionError::Source("backend down".to_string()));
            }
            Ok(self.document.clone())
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_resolution() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(30)));
        let cache = ModelCache::new(Arc::new(ModelResolver::new(source.clone())));

        let (a, b) = tokio::join!(
            cache.get_or_resolve("Opus"),
            cache.get_or_resolve("#/definitions/Opus")
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resolution_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_does_not_poison_entry() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(100)));
        let cache = ModelCache::new(Arc::new(ModelResolver::new(source.clone())));

        let err = cache
            .get_or_resolve_with_timeout("Opus", Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Timeout { .. }));

        let model = cache.get_or_resolve("Opus").await.unwrap();
        assert!(model.properties.contains_key("title"));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resolution_count(), 1);
    }

    #[tokio::test]
    async fn test_definition_failures_stay_cached() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(1)));
        let cache = ModelCache::new(Arc::new(ModelResolver::new(source)));

        let err = cache.get_or_resolve("Nope").await.unwrap_err();
        assert_eq!(err, ResolutionError::UnknownDefinition("Nope".to_string()));
        let again = cache.get_or_resolve("Nope").await.unwrap_err();
        assert_eq!(again, err);
        assert_eq!(cache.resolution_count(), 1);
        assert!(cache.peek("Nope").is_some());
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried() {
        let mut source = SlowSource::new(Duration::from_millis(1));
        source.fail = true;
        let cache = ModelCache::new(Arc::new(ModelResolver::new(Arc::new(source))));

        let err = cache.get_or_resolve("Opus").await.unwrap_err();
        assert!(err.is_transient());
        assert!(cache.peek("Opus").is_none());

        let _ = cache.get_or_resolve("Opus").await;
        assert_eq!(cache.resolution_count(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.resolution_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_failure_keeps_newer_entry() {
        let mut source = SlowSource::new(Duration::from_millis(40));
        source.fail_once = true;
        let source = Arc::new(source);
        let cache = ModelCache::new(Arc::new(ModelResolver::new(source.clone())));

        let err = cache
            .get_or_resolve_with_timeout("Opus", Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Timeout { .. }));

        // the first resolution is still running and will fail after the clear
        cache.clear();
        let model = cache.get_or_resolve("Opus").await.unwrap();
        assert!(model.properties.contains_key("title"));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

        assert_eq!(cache.len(), 1);
        assert!(matches!(cache.peek("Opus"), Some(Ok(_))));
        cache.get_or_resolve("Opus").await.unwrap();
        assert_eq!(cache.resolution_count(), 1);
    }
}
