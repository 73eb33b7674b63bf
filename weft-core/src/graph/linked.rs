//! Linked artifacts: reusable vector templates and embedded sub-graphs.
//!
//! A linked vector or linked graph starts as a bare `(id, version)`
//! reference. The engine resolves it on first use by loading the
//! artifact and populating the payload cell, flipping `loaded` from
//! false to true exactly once. The flag never transitions back.

use super::vector::SharedVector;
use super::SharedGraph;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// An indirection to a reusable vector artifact, resolved on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedVector {
    /// The referenced vector artifact id.
    pub id: String,

    /// The referenced vector artifact version.
    #[serde(default)]
    pub version: u64,

    /// True once `node` has been populated. Monotonic.
    #[serde(default)]
    pub loaded: bool,

    /// The resolved vector, populated at load time with the host
    /// vector's `data` and `properties` copied over its own.
    #[serde(rename = "node", default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<SharedVector>,
}

impl LinkedVector {
    /// Create an unresolved reference.
    pub fn new(id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
            loaded: false,
            vector: None,
        }
    }
}

/// An indirection to an embedded sub-graph with I/O remapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedGraph {
    /// The referenced graph artifact id.
    pub id: String,

    /// The referenced graph artifact version.
    #[serde(default)]
    pub version: u64,

    /// True once the graph has been loaded and its inner edges
    /// spliced. Monotonic.
    #[serde(default)]
    pub loaded: bool,

    /// The resolved sub-graph. Inner output edges carry the host's
    /// connectors after splicing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<SharedGraph>,

    /// Per-inner-vector `data` replacements, keyed by vector id.
    #[serde(default)]
    pub data: HashMap<String, JsonValue>,

    /// Per-inner-vector `properties` replacements, keyed by vector id.
    #[serde(default)]
    pub properties: HashMap<String, JsonValue>,

    /// The field map exposing inner fields on the outside of the host.
    #[serde(default)]
    pub fields: FieldMap,
}

impl LinkedGraph {
    /// Create an unresolved reference.
    pub fn new(id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
            loaded: false,
            graph: None,
            data: HashMap::new(),
            properties: HashMap::new(),
            fields: FieldMap::default(),
        }
    }

    /// Map an outside input field onto an inner vector's field.
    pub fn with_input(
        mut self,
        outer: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.fields.inputs.insert(outer.into(), FieldRef::new(id, field));
        self
    }

    /// Map an outside output field onto an inner vector's field.
    pub fn with_output(
        mut self,
        outer: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.fields.outputs.insert(outer.into(), FieldRef::new(id, field));
        self
    }
}

/// Mapping of outside field names to inner `(vector id, field)` pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMap {
    /// Input mappings: outside field -> inner target.
    #[serde(default)]
    pub inputs: HashMap<String, FieldRef>,

    /// Output mappings: outside field -> inner source.
    #[serde(default)]
    pub outputs: HashMap<String, FieldRef>,
}

/// One side of a field mapping: an inner vector id and field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRef {
    /// The inner vector id.
    pub id: String,

    /// The inner field name.
    pub field: String,
}

impl FieldRef {
    /// Create a field reference.
    pub fn new(id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field: field.into(),
        }
    }
}
