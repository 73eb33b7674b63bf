//! The scheduler: top-level entry, shared state, loaders, and events.
//!
//! A [`Scheduler`] owns the base graph, the handler-visible `context`
//! and `state`, the per-vector runtime caches, the two artifact
//! loaders, the event bus, and the handler runtime. The entry point is
//! [`Scheduler::url`]: pattern-match a vector by URL and deliver a
//! value to one of its input fields; propagation then runs through the
//! edge and vector executors in this module.
//!
//! The engine never lets a failure escape a vector boundary: every
//! failure path emits an `error` (or `warning`) event and the
//! scheduler stays usable. Construction is the only fallible surface.

mod edge;
mod vector;

use crate::loader::{ArtifactFetcher, ArtifactPaths, Loader};
use crate::runtime::{HandlerRuntime, RhaiRuntime};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use weft_core::error::{Result, WeftError};
use weft_core::event::{EngineEvent, EventBus, EventData, ListenerId};
use weft_core::graph::{Graph, SharedGraph, Vector};
use weft_core::logging::{LogCategory, LogCollector, LogEvent, NullCollector};

/// Message emitted as a `warning` when a URL pattern matches no vector.
pub const URL_MISS_MESSAGE: &str = "Cannot find vector at the specified URL.";

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    graph: Graph,
    context: JsonValue,
    state: JsonValue,
    paths: ArtifactPaths,
    collector: Arc<dyn LogCollector>,
    fetcher: Option<Arc<dyn ArtifactFetcher>>,
    runtime: Option<Arc<dyn HandlerRuntime>>,
}

impl SchedulerBuilder {
    /// Start building a scheduler over a base graph.
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            context: JsonValue::Object(Default::default()),
            state: JsonValue::Object(Default::default()),
            paths: ArtifactPaths::default(),
            collector: Arc::new(NullCollector),
            fetcher: None,
            runtime: None,
        }
    }

    /// Set the handler context (the handler's self-reference).
    pub fn with_context(mut self, context: JsonValue) -> Self {
        self.context = context;
        self
    }

    /// Set the shared mutable state mapping.
    pub fn with_state(mut self, state: JsonValue) -> Self {
        self.state = state;
        self
    }

    /// Set the log collector. Defaults to [`NullCollector`].
    pub fn with_logger(mut self, collector: Arc<dyn LogCollector>) -> Self {
        self.collector = collector;
        self
    }

    /// Set the artifact fetcher. Without one, uncached loads fail with
    /// a "Fetch is not defined" error.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replace the handler runtime. Defaults to [`RhaiRuntime`].
    pub fn with_runtime(mut self, runtime: Arc<dyn HandlerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Override the artifact URL templates.
    pub fn with_paths(mut self, paths: ArtifactPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Build the scheduler.
    pub fn build(self) -> Scheduler {
        let bus = Arc::new(EventBus::new());
        let runtime = self
            .runtime
            .unwrap_or_else(|| Arc::new(RhaiRuntime::new(Arc::clone(&self.collector))));
        Scheduler {
            graph: SharedGraph::new(self.graph),
            context: RwLock::new(self.context),
            state: RwLock::new(self.state),
            vector_cache: RwLock::new(HashMap::new()),
            graph_loader: Loader::new("graph", Arc::clone(&bus), self.fetcher.clone()),
            vector_loader: Loader::new("vector", Arc::clone(&bus), self.fetcher),
            paths: RwLock::new(self.paths),
            bus,
            runtime,
            collector: self.collector,
            traversals: AtomicU64::new(0),
        }
    }
}

/// The dataflow scheduler.
pub struct Scheduler {
    graph: SharedGraph,
    context: RwLock<JsonValue>,
    state: RwLock<JsonValue>,
    vector_cache: RwLock<HashMap<String, JsonValue>>,
    bus: Arc<EventBus>,
    graph_loader: Loader<Graph>,
    vector_loader: Loader<Vector>,
    paths: RwLock<ArtifactPaths>,
    runtime: Arc<dyn HandlerRuntime>,
    collector: Arc<dyn LogCollector>,
    traversals: AtomicU64,
}

impl Scheduler {
    /// Create a scheduler with defaults over a base graph.
    pub fn new(graph: Graph) -> Self {
        SchedulerBuilder::new(graph).build()
    }

    /// Start building a scheduler.
    pub fn builder(graph: Graph) -> SchedulerBuilder {
        SchedulerBuilder::new(graph)
    }

    /// Create a scheduler from a raw graph artifact.
    ///
    /// Fails when no graph is supplied (null) or the artifact does not
    /// parse. This is the engine's only construction-time failure.
    pub fn from_value(artifact: JsonValue) -> Result<Self> {
        if artifact.is_null() {
            return Err(WeftError::GraphMissing);
        }
        let graph: Graph = serde_json::from_value(artifact)?;
        Ok(Self::new(graph))
    }

    // -------------------------------------------------------------------------
    // Entry points
    // -------------------------------------------------------------------------

    /// Deliver `value` on `field` to the first vector of the base
    /// graph whose `url` matches `pattern` (a regular expression).
    ///
    /// Emits `begin`/`end` around the top-level chain. A non-empty
    /// pattern that matches nothing emits a `warning`. `end` does not
    /// imply the graph has quiesced: chains the handler did not await
    /// may still be settling.
    pub async fn url(&self, pattern: &str, value: JsonValue, field: &str) {
        self.url_impl(pattern, value, field, None).await;
    }

    /// Like [`Scheduler::url`], but scoped to the linked graph of
    /// `current` when that graph is already resolved. This lets an
    /// outer handler invoke a URL pattern inside a sub-graph it has a
    /// handle to.
    pub async fn url_within(&self, pattern: &str, value: JsonValue, field: &str, current: &Vector) {
        let scope = current
            .linked_graph
            .as_ref()
            .and_then(|linked| linked.graph.clone());
        self.url_impl(pattern, value, field, scope).await;
    }

    #[tracing::instrument(skip_all, fields(pattern = %pattern, field = %field))]
    async fn url_impl(
        &self,
        pattern: &str,
        value: JsonValue,
        field: &str,
        scope: Option<SharedGraph>,
    ) {
        let started = Instant::now();
        self.traversals.fetch_add(1, Ordering::Relaxed);
        self.dispatch(EventData::Begin {
            url: pattern.to_string(),
        });

        let graph = scope.unwrap_or_else(|| self.graph.clone());
        match Regex::new(pattern) {
            Err(e) => {
                let err = WeftError::PatternInvalid {
                    pattern: pattern.to_string(),
                    cause: e.to_string(),
                };
                self.emit_error(&err, Some(graph.identity().0), None, None);
            }
            Ok(matcher) => {
                let target = {
                    let graph = graph.read();
                    graph
                        .vectors
                        .iter()
                        .find(|v| matcher.is_match(&v.url))
                        .map(|v| v.id.clone())
                };
                match target {
                    Some(vector_id) => {
                        edge::execute(self, graph, vector_id, field.to_string(), value).await;
                    }
                    None if !pattern.is_empty() => {
                        tracing::warn!(pattern, "{}", URL_MISS_MESSAGE);
                        self.collector.collect(
                            LogEvent::warn(LogCategory::Scheduler, URL_MISS_MESSAGE)
                                .with_field("url", pattern),
                        );
                        self.dispatch(EventData::Warning {
                            message: URL_MISS_MESSAGE.to_string(),
                            url: Some(pattern.to_string()),
                        });
                    }
                    None => {}
                }
            }
        }

        self.dispatch(EventData::End {
            url: pattern.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Register a listener under an event name. Unknown names are
    /// accepted silently.
    pub fn add_event_listener(
        &self,
        name: impl Into<String>,
        listener: impl Fn(&EngineEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.bus.add_listener(name, listener)
    }

    /// Remove a listener. Silent no-op when the name or id is unknown.
    pub fn remove_event_listener(&self, name: &str, id: ListenerId) {
        self.bus.remove_listener(name, id);
    }

    pub(crate) fn dispatch(&self, data: EventData) {
        self.bus.dispatch(&EngineEvent::new(data));
    }

    pub(crate) fn emit_error(
        &self,
        err: &WeftError,
        graph_id: Option<String>,
        vector_id: Option<String>,
        field: Option<String>,
    ) {
        tracing::error!(error = %err, "Traversal error");
        let mut log = LogEvent::error(LogCategory::Vector, err.to_string());
        if let Some(ref graph_id) = graph_id {
            log = log.with_graph_id(graph_id.clone());
        }
        if let Some(ref vector_id) = vector_id {
            log = log.with_vector_id(vector_id.clone());
        }
        self.collector.collect(log);
        self.dispatch(EventData::Error {
            code: err.code(),
            message: err.to_string(),
            graph_id,
            vector_id,
            field,
            url: None,
        });
    }

    // -------------------------------------------------------------------------
    // Shared resources
    // -------------------------------------------------------------------------

    /// The base graph cell. Never fetched; mutated in place as linked
    /// artifacts resolve.
    pub fn graph(&self) -> SharedGraph {
        self.graph.clone()
    }

    pub(crate) fn base_graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// The graph artifact loader.
    pub fn graph_loader(&self) -> &Loader<Graph> {
        &self.graph_loader
    }

    /// The vector artifact loader.
    pub fn vector_loader(&self) -> &Loader<Vector> {
        &self.vector_loader
    }

    /// Current artifact URL templates.
    pub fn paths(&self) -> ArtifactPaths {
        self.paths.read().clone()
    }

    /// Override the graph artifact URL template.
    pub fn set_graph_path(&self, template: impl Into<String>) {
        self.paths.write().graph = template.into();
    }

    /// Override the vector artifact URL template.
    pub fn set_vector_path(&self, template: impl Into<String>) {
        self.paths.write().vector = template.into();
    }

    /// Snapshot of the shared state mapping.
    pub fn state(&self) -> JsonValue {
        self.state.read().clone()
    }

    /// Snapshot of the handler context.
    pub fn context(&self) -> JsonValue {
        self.context.read().clone()
    }

    /// Snapshot of a vector's runtime cache entry, if it has executed.
    pub fn vector_cache(&self, vector_id: &str) -> Option<JsonValue> {
        self.vector_cache.read().get(vector_id).cloned()
    }

    /// Number of `url` traversals entered on this scheduler.
    pub fn traversals(&self) -> u64 {
        self.traversals.load(Ordering::Relaxed)
    }

    pub(crate) fn state_snapshot(&self) -> JsonValue {
        self.state.read().clone()
    }

    pub(crate) fn set_state_value(&self, value: JsonValue) {
        *self.state.write() = value;
    }

    pub(crate) fn context_snapshot(&self) -> JsonValue {
        self.context.read().clone()
    }

    pub(crate) fn set_context_value(&self, value: JsonValue) {
        *self.context.write() = value;
    }

    pub(crate) fn cache_entry(&self, vector_id: &str) -> JsonValue {
        self.vector_cache
            .write()
            .entry(vector_id.to_string())
            .or_insert_with(|| JsonValue::Object(Default::default()))
            .clone()
    }

    pub(crate) fn store_cache(&self, vector_id: &str, value: JsonValue) {
        self.vector_cache
            .write()
            .insert(vector_id.to_string(), value);
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn HandlerRuntime> {
        &self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_requires_a_graph() {
        let result = Scheduler::from_value(JsonValue::Null);
        assert!(matches!(result, Err(WeftError::GraphMissing)));
    }

    #[test]
    fn from_value_parses_minimal_artifact() {
        let sched = Scheduler::from_value(json!({
            "id": "g1", "url": "", "version": 0, "properties": {}, "vectors": []
        }))
        .unwrap();
        assert_eq!(sched.graph().identity(), ("g1".to_string(), 0));
    }

    #[test]
    fn paths_are_mutable() {
        let sched = Scheduler::new(Graph::new("g1"));
        sched.set_graph_path("https://example.test/{id}/{version}");
        assert_eq!(
            sched.paths().graph_url("g2", 1),
            "https://example.test/g2/1"
        );
        // The vector template is untouched.
        assert_eq!(sched.paths().vector_url("n1", 0), "artifacts/vectors/n1.0");
    }

    #[tokio::test]
    async fn traversal_counter_is_monotonic() {
        let sched = Scheduler::new(Graph::new("g1"));
        sched.url("a", json!(null), "in").await;
        sched.url("b", json!(null), "in").await;
        assert_eq!(sched.traversals(), 2);
    }
}
