//! Executable vectors and their set handlers.

use super::edge::Edge;
use super::linked::{LinkedGraph, LinkedVector};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// An executable unit in a graph.
///
/// A vector receives a value on an input field, runs its set handler,
/// and fans values out through its output [`Edge`]s. The `url` is the
/// pattern-match target for scheduler entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vector {
    /// Unique vector id within its graph.
    pub id: String,

    /// The graph this vector belongs to.
    #[serde(rename = "graphId", default)]
    pub graph_id: String,

    /// The vector version.
    #[serde(default)]
    pub version: u64,

    /// Pattern-match target for scheduler entry.
    #[serde(default)]
    pub url: String,

    /// Output edges, in declared order.
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// The handler source bundle.
    #[serde(default)]
    pub template: Template,

    /// Author-owned payload, opaque to the engine, forwarded to the
    /// handler.
    #[serde(default)]
    pub data: JsonValue,

    /// Author-owned properties, opaque to the engine, forwarded to the
    /// handler.
    #[serde(default)]
    pub properties: JsonValue,

    /// Optional indirection to a reusable vector artifact.
    #[serde(rename = "linkedNode", default, skip_serializing_if = "Option::is_none")]
    pub linked_vector: Option<LinkedVector>,

    /// Optional indirection to an embedded sub-graph.
    #[serde(rename = "linkedGraph", default, skip_serializing_if = "Option::is_none")]
    pub linked_graph: Option<LinkedGraph>,
}

impl Vector {
    /// Create a vector with no edges and an empty handler.
    pub fn new(id: impl Into<String>, graph_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            graph_id: graph_id.into(),
            version: 0,
            url: String::new(),
            edges: Vec::new(),
            template: Template::default(),
            data: JsonValue::Null,
            properties: JsonValue::Null,
            linked_vector: None,
            linked_graph: None,
        }
    }

    /// Set the entry URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the handler source.
    pub fn with_set(mut self, source: impl Into<String>) -> Self {
        self.template.set = source.into();
        self
    }

    /// Add an output edge.
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Set the data payload.
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = data;
        self
    }

    /// Set the properties payload.
    pub fn with_properties(mut self, properties: JsonValue) -> Self {
        self.properties = properties;
        self
    }

    /// Attach a linked vector reference.
    pub fn with_linked_vector(mut self, linked: LinkedVector) -> Self {
        self.linked_vector = Some(linked);
        self
    }

    /// Attach a linked graph reference.
    pub fn with_linked_graph(mut self, linked: LinkedGraph) -> Self {
        self.linked_graph = Some(linked);
        self
    }

    /// Find an output edge by field name.
    pub fn edge(&self, field: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.field == field)
    }

    /// Find an output edge by field name, mutably.
    pub fn edge_mut(&mut self, field: &str) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| e.field == field)
    }
}

/// The handler source bundle of a vector.
///
/// `set` may be empty only when the vector carries a linked graph, in
/// which case the vector acts as a pass-through into the sub-graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Template {
    /// Source text of the set handler.
    #[serde(default)]
    pub set: String,
}

impl Template {
    /// Create a template from handler source.
    pub fn new(set: impl Into<String>) -> Self {
        Self { set: set.into() }
    }
}

/// A shared, in-place-mutable vector cell.
///
/// Linked vectors are resolved by populating this cell once; later
/// traversals observe the mutation (the `loaded` state machine of the
/// linked artifact).
#[derive(Clone)]
pub struct SharedVector(Arc<RwLock<Vector>>);

impl SharedVector {
    /// Wrap a vector in a shared cell.
    pub fn new(vector: Vector) -> Self {
        Self(Arc::new(RwLock::new(vector)))
    }

    /// Acquire a read guard.
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Vector> {
        self.0.read()
    }

    /// Acquire a write guard.
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Vector> {
        self.0.write()
    }

    /// Clone the current vector state.
    pub fn snapshot(&self) -> Vector {
        self.0.read().clone()
    }
}

impl fmt::Debug for SharedVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedVector").field(&*self.0.read()).finish()
    }
}

impl Serialize for SharedVector {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SharedVector {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Vector::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Connector;
    use serde_json::json;

    #[test]
    fn deserialize_artifact_shape() {
        let json = r#"{
            "id": "n1",
            "graphId": "g1",
            "version": 0,
            "url": "index",
            "edges": [ { "field": "out", "connectors": [] } ],
            "template": { "set": "print(value);" },
            "data": null,
            "properties": {}
        }"#;
        let vector: Vector = serde_json::from_str(json).unwrap();
        assert_eq!(vector.id, "n1");
        assert_eq!(vector.graph_id, "g1");
        assert_eq!(vector.url, "index");
        assert_eq!(vector.edges.len(), 1);
        assert_eq!(vector.template.set, "print(value);");
        assert!(vector.linked_vector.is_none());
        assert!(vector.linked_graph.is_none());
    }

    #[test]
    fn builder_and_edge_lookup() {
        let vector = Vector::new("n1", "g1")
            .with_url("index")
            .with_set("edges.out = value;")
            .with_edge(Edge::new("out").with_connector(Connector::new("c1", "n2", "in", "g1", 0)))
            .with_data(json!({ "tag": "a" }));

        assert!(vector.edge("out").is_some());
        assert!(vector.edge("missing").is_none());
        assert_eq!(vector.edge("out").unwrap().connectors.len(), 1);
    }

    #[test]
    fn shared_vector_mutation_is_visible() {
        let shared = SharedVector::new(Vector::new("n1", "g1"));
        let alias = shared.clone();
        shared.write().url = "index".to_string();
        assert_eq!(alias.read().url, "index");
    }

    #[test]
    fn shared_vector_serde_roundtrip() {
        let shared = SharedVector::new(Vector::new("n1", "g1").with_url("index"));
        let json = serde_json::to_string(&shared).unwrap();
        let restored: SharedVector = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.read().url, "index");
    }
}
