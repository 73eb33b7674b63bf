//! WEFT Execution Engine
//!
//! This crate executes declarative dataflow graphs defined with the
//! `weft-core` data model. The entry point is [`Scheduler::url`]:
//! pattern-match a vector by URL, deliver a value to one of its input
//! fields, and let the engine propagate values transitively through
//! the graph - lazily materializing linked sub-graphs and reusable
//! vector artifacts, emitting lifecycle events around every step, and
//! funneling errors without aborting the traversal.
//!
//! # Example
//!
//! ```ignore
//! use weft_engine::Scheduler;
//! use weft_core::graph::{Edge, Graph, Vector};
//!
//! let graph = Graph::new("g1").with_vector(
//!     Vector::new("n1", "g1")
//!         .with_url("index")
//!         .with_set("print(value);"),
//! );
//! let sched = Scheduler::new(graph);
//! sched.url("index", serde_json::json!("hello"), "in").await;
//! ```
//!
//! Handlers are written in the engine's scripting dialect (Rhai by
//! default) and run against a fixed environment: `scheduler`, `graph`,
//! `cache`, `vector`, `field`, `state`, `value`, `edges`, `data`,
//! `properties`, and `context`. Writing `edges.<field> = v` fans the
//! value out to every connector on that edge.

#![warn(clippy::all)]

pub mod loader;
pub mod runtime;
pub mod scheduler;

pub use loader::{ArtifactFetcher, ArtifactPaths, FetchFuture, HttpFetcher, Loader};
pub use runtime::{DeferredOp, HandlerEnv, HandlerOutcome, HandlerRuntime, RhaiRuntime};
pub use scheduler::{Scheduler, SchedulerBuilder, URL_MISS_MESSAGE};
