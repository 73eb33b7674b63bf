//! Shared helpers for the integration suites.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weft_core::error::WeftError;
use weft_core::event::{EngineEvent, EventData};
use weft_core::logging::{BufferedCollector, LogCategory, LogCollector};
use weft_engine::loader::{ArtifactFetcher, FetchFuture};
use weft_engine::Scheduler;

/// In-memory fetcher serving a fixed URL→artifact map and counting
/// hits.
pub struct MapFetcher {
    artifacts: HashMap<String, JsonValue>,
    hits: AtomicUsize,
}

impl MapFetcher {
    pub fn new(artifacts: HashMap<String, JsonValue>) -> Arc<Self> {
        Arc::new(Self {
            artifacts,
            hits: AtomicUsize::new(0),
        })
    }

    pub fn single(url: impl Into<String>, artifact: JsonValue) -> Arc<Self> {
        let mut artifacts = HashMap::new();
        artifacts.insert(url.into(), artifact);
        Self::new(artifacts)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl ArtifactFetcher for MapFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let artifact = self.artifacts.get(url).cloned();
        Box::pin(async move {
            artifact.ok_or_else(|| WeftError::FetchFailed {
                url: url.to_string(),
                cause: "no such artifact".to_string(),
            })
        })
    }
}

/// Record every event dispatched under `name`.
pub fn record_events(sched: &Scheduler, name: &str) -> Arc<Mutex<Vec<EngineEvent>>> {
    let store: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&store);
    sched.add_event_listener(name.to_string(), move |event| sink.lock().push(event.clone()));
    store
}

/// Record the names of events dispatched under each of `names`, in
/// dispatch order.
pub fn record_event_names(sched: &Scheduler, names: &[&str]) -> Arc<Mutex<Vec<&'static str>>> {
    let store: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    for name in names {
        let sink = Arc::clone(&store);
        sched.add_event_listener(name.to_string(), move |event| sink.lock().push(event.name()));
    }
    store
}

/// Pull the rendered messages out of recorded `error` events.
pub fn error_messages(events: &Arc<Mutex<Vec<EngineEvent>>>) -> Vec<String> {
    events
        .lock()
        .iter()
        .filter_map(|event| match &event.data {
            EventData::Error { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// A buffered collector ready to hand to `SchedulerBuilder::with_logger`.
pub fn collector() -> Arc<BufferedCollector> {
    Arc::new(BufferedCollector::with_default_capacity())
}

pub fn as_logger(collector: &Arc<BufferedCollector>) -> Arc<dyn LogCollector> {
    Arc::clone(collector) as Arc<dyn LogCollector>
}

/// Messages printed by handler code (`print`/`debug`).
pub fn handler_output(collector: &BufferedCollector) -> Vec<String> {
    collector
        .by_category(LogCategory::Handler)
        .into_iter()
        .map(|event| event.message)
        .collect()
}
