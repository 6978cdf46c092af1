//! Node contract.
//!
//! `NodeKind` carries the static capabilities of a node variant (default
//! config for editors, selector mapping for the graph compiler, construction
//! from node data). `Node` is the object-safe runtime side used for dispatch.

pub mod template_transform;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use stencil_core::config::WorkflowConfig;
use stencil_core::error::{Result, StencilError};
use stencil_core::traits::CodeExecutor;
use stencil_core::types::{NodeRunResult, NodeType, VariableSelector};

use crate::variable_pool::VariablePool;

/// Mapping from `"{node_id}.{variable}"` to the pool path it reads.
pub type SelectorMapping = BTreeMap<String, Vec<String>>;

/// A node instance ready to run.
pub trait Node: Send + Sync {
    fn id(&self) -> &str;

    fn title(&self) -> &str;

    fn node_type(&self) -> NodeType;

    /// Execute the node against the run's variable pool.
    ///
    /// Expected failures come back as `Ok` with a failed run result.
    /// `Err` means the run must abort.
    fn run<'a>(&'a self, pool: &'a VariablePool) -> BoxFuture<'a, Result<NodeRunResult>>;
}

/// Static capabilities of a node variant.
pub trait NodeKind: Node + Sized + 'static {
    /// Node data as stored in graph configuration.
    type Data: DeserializeOwned;

    const NODE_TYPE: NodeType;

    /// Default editable shape, for editing tooling only.
    fn default_config(filters: Option<&Value>) -> Value;

    /// Map each declared selector to its pool path. Pure: no pool access.
    fn extract_variable_selector_to_variable_mapping(
        graph_config: &Value,
        node_id: &str,
        data: &Self::Data,
    ) -> SelectorMapping;

    fn from_data(
        node_id: &str,
        data: Self::Data,
        executor: Arc<dyn CodeExecutor>,
        config: &WorkflowConfig,
    ) -> Result<Self>;

    /// Deserialize this variant's data from a raw node-data object.
    fn parse_data(node_id: &str, raw: &Value) -> Result<Self::Data> {
        serde_json::from_value(raw.clone()).map_err(|e| StencilError::InvalidNodeData {
            node_id: node_id.to_string(),
            message: e.to_string(),
        })
    }
}

/// Mapping entries for a list of selectors; a later duplicate name replaces
/// an earlier one.
pub fn selector_mapping(node_id: &str, selectors: &[VariableSelector]) -> SelectorMapping {
    selectors
        .iter()
        .map(|s| (format!("{}.{}", node_id, s.variable), s.value_selector.clone()))
        .collect()
}
