use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stencil_core::error::{Result, StencilError};
use stencil_core::types::NodeType;

/// A node entry in a workflow graph.
///
/// `data` carries the variant-specific configuration plus a `type` tag naming
/// the node variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub data: Value,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Variant named by `data.type`.
    pub fn node_type(&self) -> Result<NodeType> {
        let tag = self
            .data
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| StencilError::InvalidNodeData {
                node_id: self.id.clone(),
                message: "missing string field 'type'".into(),
            })?;
        tag.parse()
    }
}

/// Workflow graph: node configs plus edges. Edges are carried opaquely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub edges: Vec<Value>,
}

impl GraphConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Load a graph from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Raw JSON form, as handed to mapping extraction.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
