//! Output edges and connectors.

use serde::{Deserialize, Serialize};

/// A named output on a vector.
///
/// Edges are write targets for set handlers: assigning to an edge fans
/// the value out to every connector on it, in declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// The output field name the handler writes to.
    pub field: String,

    /// Downstream connectors, traversed in declared order.
    #[serde(default)]
    pub connectors: Vec<Connector>,
}

impl Edge {
    /// Create an edge with no connectors.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            connectors: Vec::new(),
        }
    }

    /// Add a connector.
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connectors.push(connector);
        self
    }

    /// Union another connector set into this edge, deduplicating by
    /// connector id.
    pub fn merge_connectors(&mut self, incoming: &[Connector]) {
        for connector in incoming {
            if !self.connectors.iter().any(|c| c.id == connector.id) {
                self.connectors.push(connector.clone());
            }
        }
    }
}

/// A directed reference from an output edge to an input field on
/// another vector, possibly in another graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    /// Unique connector id, used to deduplicate during splicing.
    pub id: String,

    /// The target vector id.
    #[serde(rename = "vectorId")]
    pub vector_id: String,

    /// The target input field.
    pub field: String,

    /// The graph the target vector lives in.
    #[serde(rename = "graphId")]
    pub graph_id: String,

    /// The version of the target graph.
    #[serde(default)]
    pub version: u64,
}

impl Connector {
    /// Create a connector into the given graph.
    pub fn new(
        id: impl Into<String>,
        vector_id: impl Into<String>,
        field: impl Into<String>,
        graph_id: impl Into<String>,
        version: u64,
    ) -> Self {
        Self {
            id: id.into(),
            vector_id: vector_id.into(),
            field: field.into(),
            graph_id: graph_id.into(),
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(id: &str) -> Connector {
        Connector::new(id, "target", "in", "g1", 0)
    }

    #[test]
    fn deserialize_edge() {
        let json = r#"{
            "field": "out",
            "connectors": [
                { "id": "c1", "vectorId": "n2", "field": "in", "graphId": "g1", "version": 0 }
            ]
        }"#;
        let edge: Edge = serde_json::from_str(json).unwrap();
        assert_eq!(edge.field, "out");
        assert_eq!(edge.connectors.len(), 1);
        assert_eq!(edge.connectors[0].vector_id, "n2");
    }

    #[test]
    fn connectors_default_empty() {
        let edge: Edge = serde_json::from_str(r#"{ "field": "out" }"#).unwrap();
        assert!(edge.connectors.is_empty());
    }

    #[test]
    fn merge_deduplicates_by_id() {
        let mut edge = Edge::new("out").with_connector(connector("c1"));
        edge.merge_connectors(&[connector("c1"), connector("c2")]);
        assert_eq!(edge.connectors.len(), 2);

        // Merging again changes nothing.
        edge.merge_connectors(&[connector("c2")]);
        assert_eq!(edge.connectors.len(), 2);
    }

    #[test]
    fn merge_preserves_declared_order() {
        let mut edge = Edge::new("out").with_connector(connector("a"));
        edge.merge_connectors(&[connector("b"), connector("c")]);
        let ids: Vec<&str> = edge.connectors.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
