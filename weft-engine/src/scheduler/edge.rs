//! The edge executor: the begin/end envelope around one vector
//! invocation.
//!
//! Every vector invocation passes through here, whether it came from a
//! top-level `url` entry or a recursive connector fan-out, so
//! `beginedge`/`endedge` bracket all of them. A rejection from the
//! vector executor is dispatched as an `error` event and does not
//! propagate to the caller.

use super::{vector, Scheduler};
use futures::future::BoxFuture;
use serde_json::Value as JsonValue;
use std::time::Instant;
use weft_core::event::EventData;
use weft_core::graph::SharedGraph;

/// Execute one vector invocation inside the `beginedge`/`endedge`
/// envelope.
///
/// Boxed because connector fan-out recurses through here.
pub(crate) fn execute<'a>(
    sched: &'a Scheduler,
    graph: SharedGraph,
    vector_id: String,
    field: String,
    value: JsonValue,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let (graph_id, _) = graph.identity();
        sched.dispatch(EventData::BeginEdge {
            vector_id: vector_id.clone(),
            graph_id: graph_id.clone(),
            field: field.clone(),
            value: value.clone(),
        });
        tracing::debug!(
            vector_id = %vector_id,
            graph_id = %graph_id,
            field = %field,
            "Executing vector"
        );

        let started = Instant::now();
        let result = vector::execute(sched, graph, &vector_id, &field, value.clone()).await;

        sched.dispatch(EventData::EndEdge {
            vector_id: vector_id.clone(),
            graph_id: graph_id.clone(),
            field: field.clone(),
            value,
            duration_ms: started.elapsed().as_millis() as u64,
        });

        if let Err(err) = result {
            sched.emit_error(&err, Some(graph_id), Some(vector_id), Some(field));
        }
    })
}
