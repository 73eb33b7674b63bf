//! Lifecycle events and the synchronous event bus.
//!
//! Every step of a traversal is bracketed by events: `begin`/`end`
//! around a scheduler entry, `beginedge`/`endedge` around a vector
//! invocation, `beginconnector`/`endconnector` around each fan-out,
//! `set`/`afterSet` around the handler, plus `load`, `warning` and
//! `error`. Listeners run synchronously in registration order.
//!
//! Two events carry response handles: `set` exposes
//! [`ContextHandle::set`] to rebind the handler context, and `load`
//! exposes [`LoadHandle::set`] to satisfy an artifact load without the
//! fetcher.

use crate::graph::{Connector, Vector};
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A listener callback registered on the bus.
pub type Listener = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Handle returned by [`EventBus::add_listener`], used for removal.
///
/// Closures have no identity, so removal is by handle rather than by
/// function reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An engine lifecycle event.
///
/// Every event carries a fresh RFC-4122 v4 id and an epoch-millisecond
/// timestamp alongside its payload.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    /// Unique event id.
    pub id: Uuid,
    /// Milliseconds since the UNIX epoch.
    pub time: u64,
    /// The event payload.
    pub data: EventData,
}

impl EngineEvent {
    /// Create an event with a fresh id and the current time.
    pub fn new(data: EventData) -> Self {
        Self {
            id: Uuid::new_v4(),
            time: epoch_millis(),
            data,
        }
    }

    /// The event name this event dispatches under.
    pub fn name(&self) -> &'static str {
        self.data.name()
    }
}

/// Per-event payloads. Field sets follow the engine's event contract.
#[derive(Debug, Clone)]
pub enum EventData {
    /// A scheduler entry was invoked.
    Begin {
        /// The URL pattern supplied to the entry.
        url: String,
    },
    /// The top-level chain of a scheduler entry settled.
    End {
        /// The URL pattern supplied to the entry.
        url: String,
        /// Wall time of the top-level chain.
        duration_ms: u64,
    },
    /// A vector is about to execute.
    BeginEdge {
        /// The target vector id.
        vector_id: String,
        /// The graph the vector was found in.
        graph_id: String,
        /// The input field.
        field: String,
        /// The input value.
        value: JsonValue,
    },
    /// A vector execution settled, successfully or not.
    EndEdge {
        /// The target vector id.
        vector_id: String,
        /// The graph the vector was found in.
        graph_id: String,
        /// The input field.
        field: String,
        /// The input value.
        value: JsonValue,
        /// Wall time of the invocation.
        duration_ms: u64,
    },
    /// An edge write is about to fan out to one connector.
    BeginConnector {
        /// The connector being traversed.
        connector: Connector,
        /// The written value.
        value: JsonValue,
    },
    /// The downstream traversal of one connector settled.
    EndConnector {
        /// The connector that was traversed.
        connector: Connector,
        /// The written value.
        value: JsonValue,
        /// Wall time of the downstream traversal.
        duration_ms: u64,
    },
    /// The set handler is about to run. Listeners may rebind the
    /// handler context through `context`.
    Set {
        /// Snapshot of the effective vector.
        vector: Vector,
        /// The graph the vector executes in.
        graph_id: String,
        /// The input field.
        field: String,
        /// The input value.
        value: JsonValue,
        /// Response handle: rebind the handler's context.
        context: ContextHandle,
    },
    /// The set handler settled.
    AfterSet {
        /// The effective vector id.
        vector_id: String,
        /// The graph the vector executed in.
        graph_id: String,
        /// The input field.
        field: String,
        /// The handler's return value (null when the handler failed).
        returned: JsonValue,
        /// The handler failure, if any.
        err: Option<String>,
    },
    /// The loader is about to resolve a URL. Listeners may satisfy the
    /// load through `value`.
    Load {
        /// The artifact URL being resolved.
        url: String,
        /// Response handle: supply the artifact without the fetcher.
        value: LoadHandle,
    },
    /// A non-fatal condition.
    Warning {
        /// Human-readable description.
        message: String,
        /// The URL involved, if any.
        url: Option<String>,
    },
    /// A failure surfaced during traversal.
    Error {
        /// The stable error code (see `WeftError::code`).
        code: &'static str,
        /// The rendered error message.
        message: String,
        /// The graph involved, if known.
        graph_id: Option<String>,
        /// The vector involved, if known.
        vector_id: Option<String>,
        /// The field involved, if known.
        field: Option<String>,
        /// The URL involved, if known.
        url: Option<String>,
    },
}

impl EventData {
    /// The event name this payload dispatches under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Begin { .. } => "begin",
            Self::End { .. } => "end",
            Self::BeginEdge { .. } => "beginedge",
            Self::EndEdge { .. } => "endedge",
            Self::BeginConnector { .. } => "beginconnector",
            Self::EndConnector { .. } => "endconnector",
            Self::Set { .. } => "set",
            Self::AfterSet { .. } => "afterSet",
            Self::Load { .. } => "load",
            Self::Warning { .. } => "warning",
            Self::Error { .. } => "error",
        }
    }
}

/// Response cell carried by the `set` event.
#[derive(Debug, Clone, Default)]
pub struct ContextHandle(Arc<Mutex<Option<JsonValue>>>);

impl ContextHandle {
    /// Create an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a replacement context for the handler.
    pub fn set(&self, value: JsonValue) {
        *self.0.lock() = Some(value);
    }

    /// Take the installed context, if a listener supplied one.
    pub fn take(&self) -> Option<JsonValue> {
        self.0.lock().take()
    }
}

/// Response cell carried by the `load` event.
#[derive(Debug, Clone, Default)]
pub struct LoadHandle(Arc<Mutex<Option<JsonValue>>>);

impl LoadHandle {
    /// Create an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply the artifact for this URL, bypassing the fetcher.
    pub fn set(&self, value: JsonValue) {
        *self.0.lock() = Some(value);
    }

    /// Take the supplied artifact, if a listener provided one.
    pub fn take(&self) -> Option<JsonValue> {
        self.0.lock().take()
    }
}

/// Named synchronous event multicast.
///
/// Listener registration accepts any event name silently; dispatch
/// invokes the listeners registered under the event's name, in
/// registration order. Removing an unknown listener or removing from
/// an unknown event is a no-op.
pub struct EventBus {
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener under an event name.
    pub fn add_listener(
        &self,
        name: impl Into<String>,
        listener: impl Fn(&EngineEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(name.into())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Silent no-op when the name or id is unknown.
    pub fn remove_listener(&self, name: &str, id: ListenerId) {
        if let Some(entries) = self.listeners.write().get_mut(name) {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    /// Dispatch an event to its listeners, synchronously, in
    /// registration order.
    ///
    /// Listeners are snapshotted before invocation so a listener may
    /// add or remove listeners without deadlocking the bus.
    pub fn dispatch(&self, event: &EngineEvent) {
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.read();
            match listeners.get(event.name()) {
                Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of listeners registered under a name.
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.read().get(name).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let counts: HashMap<&str, usize> = listeners
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

/// Milliseconds since the UNIX epoch.
fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
