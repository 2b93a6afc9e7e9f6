use super::{BackendAdapter, BackendError};
use crate::models::{PhotoCategory, RemoteObject};
use std::sync::Arc;
use std::time::Duration;

/// Result of walking the fallback chain once
#[derive(Debug, Default)]
pub struct ChainOutcome {
    /// The first successful upload, if any
    pub stored: Option<RemoteObject>,
    /// Every failed attempt before the success, in chain order
    pub failures: Vec<(String, BackendError)>,
}

/// Ordered list of adapters tried one after another until one succeeds.
///
/// Attempts are strictly sequential so at most one remote copy is created
/// per upload.
pub struct FallbackChain {
    adapters: Vec<Arc<dyn BackendAdapter>>,
    timeout: Duration,
}

impl FallbackChain {
    pub fn new(adapters: Vec<Arc<dyn BackendAdapter>>, timeout: Duration) -> Self {
        Self { adapters, timeout }
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn adapter(&self, name: &str) -> Option<&Arc<dyn BackendAdapter>> {
        self.adapters.iter().find(|a| a.name() == name)
    }

    pub async fn upload(
        &self,
        bytes: &[u8],
        owner_entity_id: &str,
        category: PhotoCategory,
    ) -> ChainOutcome {
        let mut failures = Vec::new();

        for adapter in &self.adapters {
            let name = adapter.name().to_string();
            log::debug!("Trying backend {} for {} ({})", name, owner_entity_id, category);

            let attempt =
                tokio::time::timeout(self.timeout, adapter.upload(bytes, owner_entity_id, category))
                    .await;

            match attempt {
                Ok(Ok(mut remote)) => {
                    remote.backend = name.clone();
                    log::info!("Backend {} stored photo at {}", name, remote.url);
                    return ChainOutcome {
                        stored: Some(remote),
                        failures,
                    };
                }
                Ok(Err(e)) => {
                    log::warn!("Backend {} upload failed: {}", name, e);
                    failures.push((name, e));
                }
                Err(_) => {
                    log::warn!("Backend {} timed out after {:?}", name, self.timeout);
                    failures.push((name, BackendError::Timeout(self.timeout)));
                }
            }
        }

        ChainOutcome {
            stored: None,
            failures,
        }
    }

    /// Download through the adapter that stored the object
    pub async fn fetch(&self, remote: &RemoteObject) -> Result<Vec<u8>, BackendError> {
        let adapter = self
            .adapter(&remote.backend)
            .ok_or_else(|| BackendError::UnknownBackend(remote.backend.clone()))?;
        tokio::time::timeout(self.timeout, adapter.fetch(&remote.url))
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))?
    }

    /// Delete through the adapter that stored the object
    pub async fn delete(&self, remote: &RemoteObject) -> Result<bool, BackendError> {
        let adapter = self
            .adapter(&remote.backend)
            .ok_or_else(|| BackendError::UnknownBackend(remote.backend.clone()))?;
        tokio::time::timeout(
            self.timeout,
            adapter.delete(&remote.url, remote.delete_token.as_deref()),
        )
        .await
        .map_err(|_| BackendError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubBackend;

    fn chain(adapters: Vec<Arc<StubBackend>>, timeout: Duration) -> FallbackChain {
        FallbackChain::new(
            adapters
                .into_iter()
                .map(|a| a as Arc<dyn BackendAdapter>)
                .collect(),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_first_success_stops_chain() {
        let a = Arc::new(StubBackend::failing("a"));
        let b = Arc::new(StubBackend::succeeding("b"));
        let c = Arc::new(StubBackend::succeeding("c"));
        let chain = chain(vec![a.clone(), b.clone(), c.clone()], Duration::from_secs(5));

        let outcome = chain.upload(b"img", "client-42", PhotoCategory::Progress).await;

        let stored = outcome.stored.unwrap();
        assert_eq!(stored.backend, "b");
        assert!(stored.url.starts_with("https://b.example/"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "a");
        assert_eq!(a.upload_calls(), 1);
        assert_eq!(b.upload_calls(), 1);
        assert_eq!(c.upload_calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_advances_chain() {
        let slow = Arc::new(StubBackend::slow("slow", Duration::from_secs(30)));
        let fast = Arc::new(StubBackend::succeeding("fast"));
        let chain = chain(vec![slow, fast], Duration::from_millis(50));

        let outcome = chain.upload(b"img", "c", PhotoCategory::Profile).await;

        assert_eq!(outcome.stored.unwrap().backend, "fast");
        assert!(matches!(outcome.failures[0].1, BackendError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_all_failures_reported_in_order() {
        let chain = chain(
            vec![
                Arc::new(StubBackend::failing("a")),
                Arc::new(StubBackend::failing("b")),
            ],
            Duration::from_secs(5),
        );

        let outcome = chain.upload(b"img", "c", PhotoCategory::Profile).await;

        assert!(outcome.stored.is_none());
        let names: Vec<_> = outcome.failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_routes_to_storing_backend() {
        let a = Arc::new(StubBackend::succeeding("a"));
        let b = Arc::new(StubBackend::succeeding("b"));
        let chain = chain(vec![a.clone(), b.clone()], Duration::from_secs(5));

        let remote = RemoteObject {
            url: "https://b.example/x".into(),
            backend: "b".into(),
            delete_token: None,
        };
        assert!(chain.delete(&remote).await.unwrap());
        assert!(a.deleted_urls().is_empty());
        assert_eq!(b.deleted_urls(), vec!["https://b.example/x".to_string()]);

        let unknown = RemoteObject {
            backend: "gone".into(),
            ..remote
        };
        assert!(matches!(
            chain.delete(&unknown).await,
            Err(BackendError::UnknownBackend(_))
        ));
    }
}
