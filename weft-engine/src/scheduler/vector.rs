//! The vector executor: link resolution, edge splicing, handler
//! dispatch, and connector fan-out.
//!
//! One invocation runs in five steps:
//!
//! 1. Resolve a linked vector (reusable template); the resolved vector
//!    becomes the effective vector.
//! 2. Resolve a linked graph: load the sub-graph artifact, splice the
//!    host's outbound connectors into the inner output edges, adopt
//!    the inner graph, and remap the input field through the field
//!    map.
//! 3. Ensure the per-vector runtime cache entry exists.
//! 4. Compile the handler, dispatch `set`, run the handler, dispatch
//!    `afterSet`.
//! 5. Drain the handler's recorded edge writes and re-entrant
//!    invocations, fanning each write out to its connectors in
//!    declared order, sequentially.
//!
//! Resolution failures continue with the pre-resolution vector; fan-out
//! failures are contained per connector. Cycles are not detected:
//! handlers terminate cycles by ceasing to write.

use super::{edge, Scheduler};
use crate::runtime::{DeferredOp, HandlerEnv};
use serde_json::Value as JsonValue;
use std::time::Instant;
use weft_core::error::{Result, WeftError};
use weft_core::event::{ContextHandle, EventData};
use weft_core::graph::{Graph, LinkedGraph, SharedGraph, SharedVector, Vector};

/// Where the effective vector currently lives: inside a graph cell, or
/// inside a resolved linked-vector cell.
enum Slot {
    InGraph { graph: SharedGraph, id: String },
    Linked(SharedVector),
}

impl Slot {
    fn snapshot(&self) -> Option<Vector> {
        match self {
            Self::InGraph { graph, id } => graph.read().vector(id).cloned(),
            Self::Linked(shared) => Some(shared.snapshot()),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut Vector) -> R) -> Option<R> {
        match self {
            Self::InGraph { graph, id } => graph.write().vector_mut(id).map(f),
            Self::Linked(shared) => Some(f(&mut shared.write())),
        }
    }
}

/// Execute one vector invocation. See the module docs for the step
/// breakdown.
pub(crate) async fn execute(
    sched: &Scheduler,
    graph: SharedGraph,
    vector_id: &str,
    field: &str,
    value: JsonValue,
) -> Result<()> {
    let mut current_graph = graph;
    let mut slot = Slot::InGraph {
        graph: current_graph.clone(),
        id: vector_id.to_string(),
    };
    let mut field = field.to_string();

    let Some(host) = slot.snapshot() else {
        return Err(WeftError::VectorNotFound {
            vector_id: vector_id.to_string(),
            graph_id: current_graph.identity().0,
        });
    };

    // Step 1: the linked vector, once resolved, is the effective
    // vector for everything downstream.
    if host.linked_vector.is_some() {
        if let Some(resolved) = resolve_linked_vector(sched, &slot, &host).await {
            slot = Slot::Linked(resolved);
        }
    }

    // Step 2: adopt the linked graph and remap the input field.
    let has_linked_graph = slot
        .snapshot()
        .map(|v| v.linked_graph.is_some())
        .unwrap_or(false);
    if has_linked_graph {
        if let Some((inner, inner_id, inner_field)) =
            resolve_linked_graph(sched, &slot, &field).await?
        {
            current_graph = inner.clone();
            slot = Slot::InGraph {
                graph: inner,
                id: inner_id,
            };
            field = inner_field;
        }
    }

    let Some(effective) = slot.snapshot() else {
        return Err(WeftError::VectorNotFound {
            vector_id: vector_id.to_string(),
            graph_id: current_graph.identity().0,
        });
    };

    // Step 3: the per-vector runtime cache persists for the
    // scheduler's lifetime.
    let cache = sched.cache_entry(&effective.id);

    // Step 4: compile and run the handler. An empty handler is valid
    // pass-through when a linked graph is present.
    if effective.template.set.trim().is_empty() {
        if effective.linked_graph.is_some() {
            return Ok(());
        }
        return Err(WeftError::TemplateMissing {
            vector_id: effective.id.clone(),
        });
    }

    let runtime = sched.runtime().clone();
    runtime.prepare(&effective.id, &effective.template.set)?;

    let (graph_id, _) = current_graph.identity();
    let context_handle = ContextHandle::new();
    sched.dispatch(EventData::Set {
        vector: effective.clone(),
        graph_id: graph_id.clone(),
        field: field.clone(),
        value: value.clone(),
        context: context_handle.clone(),
    });
    if let Some(installed) = context_handle.take() {
        sched.set_context_value(installed);
    }

    let env = HandlerEnv {
        graph: serde_json::to_value(&current_graph)?,
        vector: serde_json::to_value(&effective)?,
        field: field.clone(),
        value: value.clone(),
        cache,
        state: sched.state_snapshot(),
        context: sched.context_snapshot(),
        data: effective.data.clone(),
        properties: effective.properties.clone(),
        edge_fields: effective.edges.iter().map(|e| e.field.clone()).collect(),
    };

    let outcome = runtime.run(&effective.id, &effective.template.set, env)?;

    sched.store_cache(&effective.id, outcome.cache);
    sched.set_state_value(outcome.state);
    sched.set_context_value(outcome.context);

    if let Some(cause) = &outcome.err {
        let err = WeftError::HandlerFailed {
            vector_id: effective.id.clone(),
            cause: cause.clone(),
        };
        sched.emit_error(
            &err,
            Some(graph_id.clone()),
            Some(effective.id.clone()),
            Some(field.clone()),
        );
    }
    sched.dispatch(EventData::AfterSet {
        vector_id: effective.id.clone(),
        graph_id: graph_id.clone(),
        field: field.clone(),
        returned: outcome.returned.clone(),
        err: outcome.err.clone(),
    });

    // Step 5: drain recorded side effects in control-flow order.
    for op in outcome.ops {
        match op {
            DeferredOp::Write {
                field: edge_field,
                value,
            } => {
                fan_out(sched, &current_graph, &slot, &edge_field, value).await;
            }
            DeferredOp::Invoke {
                pattern,
                value,
                field,
            } => {
                sched.url(&pattern, value, &field).await;
            }
        }
    }

    Ok(())
}

/// Resolve a linked vector reference, mutating the host in place.
///
/// On a load failure the loader has already emitted `error`; the
/// invocation continues with the host vector.
async fn resolve_linked_vector(
    sched: &Scheduler,
    slot: &Slot,
    host: &Vector,
) -> Option<SharedVector> {
    let linked = host.linked_vector.clone()?;
    let url = sched.paths().vector_url(&linked.id, linked.version);

    match (linked.loaded, linked.vector) {
        (true, Some(shared)) => {
            // Already resolved. The loader is still consulted whenever
            // its cache lacks the URL, so a cache clear forces a
            // refetch on the next traversal; a refetch failure has
            // already been emitted by the loader.
            if !sched.vector_loader().is_cached(&url) {
                let _ = sched.vector_loader().load(&url).await;
            }
            Some(shared)
        }
        _ => match sched.vector_loader().load(&url).await {
            Err(_) => None,
            Ok(artifact) => {
                let mut resolved = artifact.read().clone();
                // The host vector's payload wins.
                resolved.data = host.data.clone();
                resolved.properties = host.properties.clone();
                let shared = SharedVector::new(resolved);
                slot.update(|v| {
                    if let Some(reference) = v.linked_vector.as_mut() {
                        reference.vector = Some(shared.clone());
                        reference.loaded = true;
                    }
                });
                tracing::debug!(
                    id = %linked.id,
                    version = linked.version,
                    "Linked vector resolved"
                );
                Some(shared)
            }
        },
    }
}

/// Resolve a linked graph reference: load, splice, mark loaded, and
/// compute the adoption target.
///
/// Returns `Ok(Some((inner graph, inner vector id, remapped field)))`
/// on adoption, `Ok(None)` to continue with the pre-resolution vector
/// (resolution failed; the loader emitted the error), and `Err` when
/// the input field has no mapping.
async fn resolve_linked_graph(
    sched: &Scheduler,
    slot: &Slot,
    field: &str,
) -> Result<Option<(SharedGraph, String, String)>> {
    let Some(host) = slot.snapshot() else {
        return Ok(None);
    };
    let Some(linked) = host.linked_graph.clone() else {
        return Ok(None);
    };

    let url = sched.paths().graph_url(&linked.id, linked.version);

    let inner = match (linked.loaded, linked.graph.clone()) {
        (true, Some(shared)) => {
            // Already resolved and spliced. The loader is still
            // consulted whenever its cache lacks the URL, so a cache
            // clear forces a refetch on the next traversal; a refetch
            // failure has already been emitted by the loader.
            if !sched.graph_loader().is_cached(&url) {
                let _ = sched.graph_loader().load(&url).await;
            }
            shared
        }
        _ => match sched.graph_loader().load(&url).await {
            Err(_) => return Ok(None),
            Ok(artifact) => {
                let mut inner: Graph = artifact.read().clone();
                splice(&host, &linked, &mut inner);
                let shared = SharedGraph::new(inner);
                slot.update(|v| {
                    if let Some(reference) = v.linked_graph.as_mut() {
                        reference.graph = Some(shared.clone());
                        reference.loaded = true;
                    }
                });
                tracing::debug!(
                    id = %linked.id,
                    version = linked.version,
                    "Linked graph spliced"
                );
                shared
            }
        },
    };

    let Some(input) = linked.fields.inputs.get(field) else {
        return Err(WeftError::InputFieldUnmapped {
            field: field.to_string(),
            id: linked.id.clone(),
        });
    };
    Ok(Some((inner, input.id.clone(), input.field.clone())))
}

/// Inner-edge splicing: union the host's outbound connectors into the
/// inner graph's matching output edges (deduplicating by connector
/// id), and apply the link's per-vector `data`/`properties`
/// replacements.
///
/// This is what makes a sub-graph look like a first-class vector from
/// the outside: its internal outputs are extended with the outside
/// world's connectors.
pub(crate) fn splice(host: &Vector, linked: &LinkedGraph, inner: &mut Graph) {
    for inner_vector in &mut inner.vectors {
        if let Some(data) = linked.data.get(&inner_vector.id) {
            inner_vector.data = data.clone();
        }
        if let Some(properties) = linked.properties.get(&inner_vector.id) {
            inner_vector.properties = properties.clone();
        }
        for inner_edge in &mut inner_vector.edges {
            for output in linked.fields.outputs.values() {
                if output.id != inner_vector.id {
                    continue;
                }
                if let Some(host_edge) = host.edges.iter().find(|e| e.field == output.field) {
                    inner_edge.merge_connectors(&host_edge.connectors);
                }
            }
        }
    }
}

/// Fan one edge write out to the edge's connectors, in declared order,
/// sequentially.
///
/// Cross-graph connectors (graph id or version differing from the
/// current graph) adopt the referenced graph: the scheduler's base
/// graph when it matches (never fetched), otherwise through the graph
/// loader. A dangling target aborts that connector only; a load
/// failure is wrapped as an edge setter error. Neither reaches the
/// writing handler.
async fn fan_out(
    sched: &Scheduler,
    graph: &SharedGraph,
    slot: &Slot,
    field: &str,
    value: JsonValue,
) {
    let Some(vector) = slot.snapshot() else {
        return;
    };
    let Some(edge_def) = vector.edge(field) else {
        return;
    };
    let connectors = edge_def.connectors.clone();
    let (graph_id, graph_version) = graph.identity();

    for connector in connectors {
        let target_graph = if connector.graph_id == graph_id && connector.version == graph_version {
            graph.clone()
        } else {
            let (base_id, base_version) = sched.base_graph().identity();
            if connector.graph_id == base_id && connector.version == base_version {
                sched.base_graph().clone()
            } else {
                let url = sched.paths().graph_url(&connector.graph_id, connector.version);
                match sched.graph_loader().load(&url).await {
                    Ok(cell) => SharedGraph::from(cell),
                    Err(load_err) => {
                        let err = WeftError::EdgeSetter {
                            vector_id: vector.id.clone(),
                            field: field.to_string(),
                            cause: load_err.to_string(),
                        };
                        sched.emit_error(
                            &err,
                            Some(connector.graph_id.clone()),
                            Some(connector.vector_id.clone()),
                            Some(connector.field.clone()),
                        );
                        continue;
                    }
                }
            }
        };

        if target_graph.read().vector(&connector.vector_id).is_none() {
            let err = WeftError::VectorNotFound {
                vector_id: connector.vector_id.clone(),
                graph_id: target_graph.identity().0,
            };
            sched.emit_error(
                &err,
                Some(connector.graph_id.clone()),
                Some(connector.vector_id.clone()),
                Some(connector.field.clone()),
            );
            continue;
        }

        sched.dispatch(EventData::BeginConnector {
            connector: connector.clone(),
            value: value.clone(),
        });
        let started = Instant::now();
        edge::execute(
            sched,
            target_graph,
            connector.vector_id.clone(),
            connector.field.clone(),
            value.clone(),
        )
        .await;
        sched.dispatch(EventData::EndConnector {
            connector,
            value: value.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::graph::{Connector, Edge};

    fn connector(id: &str) -> Connector {
        Connector::new(id, "sink", "in", "g1", 0)
    }

    fn inner_graph() -> Graph {
        Graph::new("g2").with_vector(
            Vector::new("exit", "g2")
                .with_edge(Edge::new("out").with_connector(connector("inner-c"))),
        )
    }

    #[test]
    fn splice_unions_host_connectors() {
        let host = Vector::new("host", "g1")
            .with_edge(Edge::new("out").with_connector(connector("host-c")));
        let linked = LinkedGraph::new("g2", 0).with_output("out", "exit", "out");
        let mut inner = inner_graph();

        splice(&host, &linked, &mut inner);

        let ids: Vec<&str> = inner.vector("exit").unwrap().edges[0]
            .connectors
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["inner-c", "host-c"]);
    }

    #[test]
    fn splice_deduplicates_by_connector_id() {
        let host = Vector::new("host", "g1")
            .with_edge(Edge::new("out").with_connector(connector("inner-c")));
        let linked = LinkedGraph::new("g2", 0).with_output("out", "exit", "out");
        let mut inner = inner_graph();

        splice(&host, &linked, &mut inner);
        // Splicing twice must not duplicate either.
        let host_again = host.clone();
        splice(&host_again, &linked, &mut inner);

        assert_eq!(inner.vector("exit").unwrap().edges[0].connectors.len(), 1);
    }

    #[test]
    fn splice_ignores_unmatched_vectors() {
        let host = Vector::new("host", "g1")
            .with_edge(Edge::new("out").with_connector(connector("host-c")));
        let linked = LinkedGraph::new("g2", 0).with_output("out", "someone-else", "out");
        let mut inner = inner_graph();

        splice(&host, &linked, &mut inner);

        assert_eq!(inner.vector("exit").unwrap().edges[0].connectors.len(), 1);
    }

    #[test]
    fn splice_applies_payload_overrides() {
        let host = Vector::new("host", "g1");
        let mut linked = LinkedGraph::new("g2", 0);
        linked
            .data
            .insert("exit".to_string(), serde_json::json!({ "tag": "swapped" }));
        linked
            .properties
            .insert("exit".to_string(), serde_json::json!({ "p": 1 }));
        let mut inner = inner_graph();

        splice(&host, &linked, &mut inner);

        let exit = inner.vector("exit").unwrap();
        assert_eq!(exit.data, serde_json::json!({ "tag": "swapped" }));
        assert_eq!(exit.properties, serde_json::json!({ "p": 1 }));
    }
}
