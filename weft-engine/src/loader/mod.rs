//! JIT artifact loading with cache, override event, and fetch fallback.
//!
//! A [`Loader`] resolves artifact URLs to shared in-memory artifacts.
//! Resolution order: `load`-event override, cache, fetcher. A URL is
//! fetched at most once per loader between cache clears, and the
//! loader performs no validation beyond JSON deserialization.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use weft_core::error::{Result, WeftError};
use weft_core::event::{EngineEvent, EventBus, EventData, LoadHandle};

/// Type alias for async fetch futures.
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<JsonValue>> + Send + 'a>>;

/// A function from artifact URL to raw artifact JSON.
///
/// The engine never persists artifacts; this is the only transport
/// seam. [`HttpFetcher`] is the default implementation; tests inject
/// in-memory fetchers.
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch the artifact at `url` and return its raw JSON.
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// HTTP artifact fetcher backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
    base: Option<String>,
}

impl HttpFetcher {
    /// Create a fetcher resolving URLs as given.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base: None,
        }
    }

    /// Create a fetcher that prefixes relative URLs with `base`.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: Some(base.into()),
        }
    }

    fn absolute(&self, url: &str) -> String {
        match (&self.base, url.starts_with("http://") || url.starts_with("https://")) {
            (Some(base), false) => format!("{}/{}", base.trim_end_matches('/'), url),
            _ => url.to_string(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        let target = self.absolute(url);
        Box::pin(async move {
            let response = self
                .client
                .get(&target)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| WeftError::FetchFailed {
                    url: url.to_string(),
                    cause: e.to_string(),
                })?;
            response
                .json::<JsonValue>()
                .await
                .map_err(|e| WeftError::ArtifactParse {
                    url: url.to_string(),
                    cause: e.to_string(),
                })
        })
    }
}

/// URL→artifact loader with an in-memory cache, generic over the
/// artifact type (graphs and vectors each get one).
pub struct Loader<T> {
    kind: &'static str,
    cache: RwLock<HashMap<String, Arc<RwLock<T>>>>,
    fetcher: Option<Arc<dyn ArtifactFetcher>>,
    bus: Arc<EventBus>,
}

impl<T> Loader<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Create a loader. `kind` names the artifact type in logs and
    /// errors ("graph" or "vector").
    pub fn new(kind: &'static str, bus: Arc<EventBus>, fetcher: Option<Arc<dyn ArtifactFetcher>>) -> Self {
        Self {
            kind,
            cache: RwLock::new(HashMap::new()),
            fetcher,
            bus,
        }
    }

    /// Resolve a URL to a shared artifact.
    ///
    /// Emits the `load` event first; a listener-supplied value takes
    /// precedence over the cache and the network. Without a fetcher and
    /// without a cache hit the load fails with
    /// [`WeftError::FetchUndefined`] and emits `error`.
    pub async fn load(&self, url: &str) -> Result<Arc<RwLock<T>>> {
        let handle = LoadHandle::new();
        self.bus.dispatch(&EngineEvent::new(EventData::Load {
            url: url.to_string(),
            value: handle.clone(),
        }));

        if let Some(raw) = handle.take() {
            let artifact = self.parse(url, raw)?;
            let shared = Arc::new(RwLock::new(artifact));
            self.cache
                .write()
                .insert(url.to_string(), Arc::clone(&shared));
            tracing::debug!(kind = self.kind, url, "Artifact satisfied by load listener");
            return Ok(shared);
        }

        if let Some(hit) = self.cache.read().get(url) {
            return Ok(Arc::clone(hit));
        }

        let Some(fetcher) = &self.fetcher else {
            let err = WeftError::FetchUndefined {
                url: url.to_string(),
            };
            self.emit_error(url, &err);
            return Err(err);
        };

        let raw = match fetcher.fetch(url).await {
            Ok(raw) => raw,
            Err(err) => {
                self.emit_error(url, &err);
                return Err(err);
            }
        };
        let artifact = self.parse(url, raw)?;
        let shared = Arc::new(RwLock::new(artifact));
        self.cache
            .write()
            .insert(url.to_string(), Arc::clone(&shared));
        tracing::debug!(kind = self.kind, url, "Artifact fetched");
        Ok(shared)
    }

    /// Drop all cache entries; the next load refetches.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// Whether a URL is currently cached.
    pub fn is_cached(&self, url: &str) -> bool {
        self.cache.read().contains_key(url)
    }

    /// Number of cached artifacts.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    fn parse(&self, url: &str, raw: JsonValue) -> Result<T> {
        serde_json::from_value(raw).map_err(|e| {
            let err = WeftError::ArtifactParse {
                url: url.to_string(),
                cause: e.to_string(),
            };
            self.emit_error(url, &err);
            err
        })
    }

    fn emit_error(&self, url: &str, err: &WeftError) {
        tracing::error!(kind = self.kind, url, error = %err, "Artifact load failed");
        self.bus.dispatch(&EngineEvent::new(EventData::Error {
            code: err.code(),
            message: err.to_string(),
            graph_id: None,
            vector_id: None,
            field: None,
            url: Some(url.to_string()),
        }));
    }
}

/// The scheduler's two parameterized artifact URL templates.
///
/// `{id}` and `{version}` are substituted to produce loader input.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    /// Template for graph artifacts.
    pub graph: String,
    /// Template for vector artifacts.
    pub vector: String,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            graph: "artifacts/graph/{id}.{version}".to_string(),
            vector: "artifacts/vectors/{id}.{version}".to_string(),
        }
    }
}

impl ArtifactPaths {
    /// Resolve the URL of a graph artifact.
    pub fn graph_url(&self, id: &str, version: u64) -> String {
        expand(&self.graph, id, version)
    }

    /// Resolve the URL of a vector artifact.
    pub fn vector_url(&self, id: &str, version: u64) -> String {
        expand(&self.vector, id, version)
    }
}

fn expand(template: &str, id: &str, version: u64) -> String {
    template
        .replace("{id}", id)
        .replace("{version}", &version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::graph::Graph;

    fn graph_json(id: &str) -> JsonValue {
        serde_json::json!({ "id": id, "url": "", "version": 0, "properties": {}, "vectors": [] })
    }

    struct CountingFetcher {
        artifact: JsonValue,
        hits: std::sync::atomic::AtomicUsize,
    }

    impl ArtifactFetcher for CountingFetcher {
        fn fetch<'a>(&'a self, _url: &'a str) -> FetchFuture<'a> {
            self.hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let artifact = self.artifact.clone();
            Box::pin(async move { Ok(artifact) })
        }
    }

    #[test]
    fn default_paths_expand() {
        let paths = ArtifactPaths::default();
        assert_eq!(paths.graph_url("g1", 0), "artifacts/graph/g1.0");
        assert_eq!(paths.vector_url("n1", 3), "artifacts/vectors/n1.3");
    }

    #[test]
    fn paths_are_replaceable() {
        let paths = ArtifactPaths {
            graph: "https://example.test/g/{id}/{version}".to_string(),
            vector: "https://example.test/v/{id}/{version}".to_string(),
        };
        assert_eq!(paths.graph_url("g1", 2), "https://example.test/g/g1/2");
    }

    #[tokio::test]
    async fn fetches_once_until_cleared() {
        let bus = Arc::new(EventBus::new());
        let fetcher = Arc::new(CountingFetcher {
            artifact: graph_json("g2"),
            hits: std::sync::atomic::AtomicUsize::new(0),
        });
        let loader: Loader<Graph> = Loader::new("graph", bus, Some(fetcher.clone()));

        loader.load("artifacts/graph/g2.0").await.unwrap();
        loader.load("artifacts/graph/g2.0").await.unwrap();
        assert_eq!(fetcher.hits.load(std::sync::atomic::Ordering::SeqCst), 1);

        loader.clear_cache();
        loader.load("artifacts/graph/g2.0").await.unwrap();
        assert_eq!(fetcher.hits.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn listener_override_beats_network() {
        let bus = Arc::new(EventBus::new());
        bus.add_listener("load", |event| {
            if let EventData::Load { value, .. } = &event.data {
                value.set(serde_json::json!({
                    "id": "override", "url": "", "version": 0, "properties": {}, "vectors": []
                }));
            }
        });
        let fetcher = Arc::new(CountingFetcher {
            artifact: graph_json("network"),
            hits: std::sync::atomic::AtomicUsize::new(0),
        });
        let loader: Loader<Graph> = Loader::new("graph", bus, Some(fetcher.clone()));

        let graph = loader.load("artifacts/graph/x.0").await.unwrap();
        assert_eq!(graph.read().id, "override");
        assert_eq!(fetcher.hits.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_fetcher_emits_error() {
        let bus = Arc::new(EventBus::new());
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let errors = Arc::clone(&errors);
            bus.add_listener("error", move |event| {
                if let EventData::Error { message, .. } = &event.data {
                    errors.lock().push(message.clone());
                }
            });
        }
        let loader: Loader<Graph> = Loader::new("graph", bus, None);

        let result = loader.load("artifacts/graph/g9.0").await;
        assert!(matches!(result, Err(WeftError::FetchUndefined { .. })));
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Fetch is not defined"));
    }

    #[tokio::test]
    async fn unparseable_artifact_is_an_error() {
        let bus = Arc::new(EventBus::new());
        let fetcher = Arc::new(CountingFetcher {
            artifact: serde_json::json!("not a graph"),
            hits: std::sync::atomic::AtomicUsize::new(0),
        });
        let loader: Loader<Graph> = Loader::new("graph", bus, Some(fetcher));

        let result = loader.load("artifacts/graph/bad.0").await;
        assert!(matches!(result, Err(WeftError::ArtifactParse { .. })));
        assert!(!loader.is_cached("artifacts/graph/bad.0"));
    }
}
