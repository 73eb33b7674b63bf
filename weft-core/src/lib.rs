//! WEFT Core Library
//!
//! This crate provides the foundational types for the WEFT dataflow
//! engine: the graph data model, the lifecycle event bus, the error
//! taxonomy, and structured logging.
//!
//! # Overview
//!
//! WEFT executes declarative dataflow graphs. A [`Graph`] bundles
//! [`Vector`]s; each vector carries a user-authored set handler and
//! output [`Edge`]s whose connectors reference downstream inputs.
//! Linked artifacts ([`LinkedVector`], [`LinkedGraph`]) are resolved
//! lazily and mutated in place through shared cells, and every step of
//! a traversal is surrounded by events on the [`EventBus`].
//!
//! The execution engine itself lives in the `weft-engine` crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod graph;
pub mod logging;

// Re-export key types at crate root for convenience
pub use error::{Result, WeftError};
pub use event::{ContextHandle, EngineEvent, EventBus, EventData, ListenerId, LoadHandle};
pub use graph::{
    Connector, Edge, FieldMap, FieldRef, Graph, LinkedGraph, LinkedVector, SharedGraph,
    SharedVector, Template, Vector,
};
pub use logging::{BufferedCollector, LogCollector, LogEvent, LogLevel, NullCollector};
