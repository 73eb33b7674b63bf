//! Pluggable set-handler runtimes.
//!
//! The engine compiles and runs whatever handler source it is given;
//! the [`HandlerRuntime`] trait is the seam between the traversal
//! algorithm and the scripting dialect. [`RhaiRuntime`] is the default
//! implementation.
//!
//! A handler runs synchronously against a fixed environment of named
//! bindings. Side effects that need the traversal (edge writes,
//! re-entrant scheduler invocations) are recorded as [`DeferredOp`]s
//! in control-flow order and drained by the vector executor once the
//! handler settles, preserving the sequential per-connector fan-out
//! order.

mod rhai_runtime;

pub use rhai_runtime::RhaiRuntime;

use serde_json::Value as JsonValue;
use weft_core::error::Result;

/// The environment a set handler runs against.
///
/// One binding per name, mirroring the handler contract: `scheduler`,
/// `graph`, `cache`, `vector`, `field`, `state`, `value`, `edges`,
/// `data`, `properties`, plus `context` (the handler's self-reference).
#[derive(Debug, Clone)]
pub struct HandlerEnv {
    /// Snapshot of the current graph.
    pub graph: JsonValue,
    /// Snapshot of the effective vector.
    pub vector: JsonValue,
    /// The input field being delivered.
    pub field: String,
    /// The delivered value.
    pub value: JsonValue,
    /// The per-vector runtime cache entry.
    pub cache: JsonValue,
    /// The scheduler-owned shared state.
    pub state: JsonValue,
    /// The handler's self-reference.
    pub context: JsonValue,
    /// The effective vector's data payload.
    pub data: JsonValue,
    /// The effective vector's properties payload.
    pub properties: JsonValue,
    /// Output edge field names; writes to other names are inert.
    pub edge_fields: Vec<String>,
}

/// A traversal side effect recorded by a handler, in control-flow
/// order.
#[derive(Debug, Clone)]
pub enum DeferredOp {
    /// An edge write: fan `value` out to the edge's connectors.
    Write {
        /// The output edge field.
        field: String,
        /// The written value.
        value: JsonValue,
    },
    /// A re-entrant scheduler invocation.
    Invoke {
        /// The URL pattern.
        pattern: String,
        /// The value to deliver.
        value: JsonValue,
        /// The input field to deliver on.
        field: String,
    },
}

/// What a handler run produced.
///
/// A handler throw does not discard the outcome: side effects recorded
/// and bindings mutated before the throw are still reported, with the
/// failure in `err`.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    /// The handler's return value (its final expression); null when
    /// the handler threw.
    pub returned: JsonValue,
    /// The handler failure, if the handler threw.
    pub err: Option<String>,
    /// Recorded side effects, in control-flow order.
    pub ops: Vec<DeferredOp>,
    /// The cache binding as the handler left it.
    pub cache: JsonValue,
    /// The state binding as the handler left it.
    pub state: JsonValue,
    /// The context binding as the handler left it.
    pub context: JsonValue,
}

/// A compiled-handler execution backend.
pub trait HandlerRuntime: Send + Sync {
    /// Compile (and cache) a handler source without running it.
    ///
    /// Called before the `set` event is dispatched so compile errors
    /// surface without running listener-observable lifecycle.
    fn prepare(&self, vector_id: &str, source: &str) -> Result<()>;

    /// Run a handler against an environment.
    ///
    /// Returns `Err` only for compile and environment failures; a
    /// handler throw is reported through [`HandlerOutcome::err`].
    fn run(&self, vector_id: &str, source: &str, env: HandlerEnv) -> Result<HandlerOutcome>;
}
