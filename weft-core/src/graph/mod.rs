//! The graph data model.
//!
//! A [`Graph`] is a versioned bundle of [`Vector`]s; identity is
//! `(id, version)`. Graphs are mutated in place as linked artifacts
//! resolve, so the engine passes them around as [`SharedGraph`] cells.

mod edge;
mod linked;
mod vector;

pub use edge::{Connector, Edge};
pub use linked::{FieldMap, FieldRef, LinkedGraph, LinkedVector};
pub use vector::{SharedVector, Template, Vector};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// A versioned container of vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    /// Unique graph id.
    pub id: String,

    /// Graph-level URL, unused by the engine but carried for authors.
    #[serde(default)]
    pub url: String,

    /// Graph version; `(id, version)` is the graph identity.
    #[serde(default)]
    pub version: u64,

    /// Author-owned properties, opaque to the engine.
    #[serde(default)]
    pub properties: JsonValue,

    /// The vectors of this graph, in declared order.
    #[serde(default)]
    pub vectors: Vec<Vector>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: String::new(),
            version: 0,
            properties: JsonValue::Null,
            vectors: Vec::new(),
        }
    }

    /// Set the version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Add a vector.
    pub fn with_vector(mut self, vector: Vector) -> Self {
        self.vectors.push(vector);
        self
    }

    /// Find a vector by id.
    pub fn vector(&self, id: &str) -> Option<&Vector> {
        self.vectors.iter().find(|v| v.id == id)
    }

    /// Find a vector by id, mutably.
    pub fn vector_mut(&mut self, id: &str) -> Option<&mut Vector> {
        self.vectors.iter_mut().find(|v| v.id == id)
    }
}

/// A shared, in-place-mutable graph cell.
///
/// Linked-graph resolution, inner-edge splicing and linked-vector
/// resolution all mutate the graph during traversal; every holder of
/// the cell observes those mutations for the scheduler's lifetime.
#[derive(Clone)]
pub struct SharedGraph(Arc<RwLock<Graph>>);

impl SharedGraph {
    /// Wrap a graph in a shared cell.
    pub fn new(graph: Graph) -> Self {
        Self(Arc::new(RwLock::new(graph)))
    }

    /// Acquire a read guard.
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Graph> {
        self.0.read()
    }

    /// Acquire a write guard.
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Graph> {
        self.0.write()
    }

    /// Clone the current graph state.
    pub fn snapshot(&self) -> Graph {
        self.0.read().clone()
    }

    /// The graph identity as `(id, version)`.
    pub fn identity(&self) -> (String, u64) {
        let graph = self.0.read();
        (graph.id.clone(), graph.version)
    }

    /// Whether two cells refer to the same graph instance.
    pub fn same_cell(&self, other: &SharedGraph) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Arc<RwLock<Graph>>> for SharedGraph {
    fn from(cell: Arc<RwLock<Graph>>) -> Self {
        Self(cell)
    }
}

impl fmt::Debug for SharedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedGraph").field(&*self.0.read()).finish()
    }
}

impl Serialize for SharedGraph {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SharedGraph {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Graph::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_artifact() {
        let json = r#"{
            "id": "g1",
            "url": "",
            "version": 0,
            "properties": {},
            "vectors": [
                {
                    "id": "n1",
                    "graphId": "g1",
                    "version": 0,
                    "url": "index",
                    "edges": [ { "field": "out", "connectors": [] } ],
                    "template": { "set": "print(value);" },
                    "data": null,
                    "properties": {}
                }
            ]
        }"#;
        let graph: Graph = serde_json::from_str(json).unwrap();
        assert_eq!(graph.id, "g1");
        assert_eq!(graph.vectors.len(), 1);
        assert!(graph.vector("n1").is_some());
        assert!(graph.vector("n2").is_none());
    }

    #[test]
    fn shared_graph_identity() {
        let shared = SharedGraph::new(Graph::new("g1").with_version(2));
        assert_eq!(shared.identity(), ("g1".to_string(), 2));
    }

    #[test]
    fn shared_graph_aliases_observe_writes() {
        let shared = SharedGraph::new(Graph::new("g1"));
        let alias = shared.clone();
        shared
            .write()
            .vectors
            .push(Vector::new("n1", "g1").with_url("index"));
        assert_eq!(alias.read().vectors.len(), 1);
        assert!(shared.same_cell(&alias));
    }

    #[test]
    fn distinct_cells_are_not_same() {
        let a = SharedGraph::new(Graph::new("g1"));
        let b = SharedGraph::new(Graph::new("g1"));
        assert!(!a.same_cell(&b));
    }
}
