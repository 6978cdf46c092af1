use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use stencil_core::config::WorkflowConfig;
use stencil_core::error::{Result, StencilError};
use stencil_core::traits::CodeExecutor;
use stencil_core::types::NodeType;

use crate::graph::{GraphConfig, NodeConfig};
use crate::node::template_transform::TemplateTransformNode;
use crate::node::{Node, NodeKind, SelectorMapping};

type BuildFn = fn(&NodeConfig, Arc<dyn CodeExecutor>, &WorkflowConfig) -> Result<Box<dyn Node>>;
type DefaultConfigFn = fn(Option<&Value>) -> Value;
type MappingFn = fn(&Value, &NodeConfig) -> Result<SelectorMapping>;

/// Type-erased entry for one node variant.
#[derive(Clone, Copy)]
struct KindEntry {
    build: BuildFn,
    default_config: DefaultConfigFn,
    mapping: MappingFn,
}

fn build_kind<K: NodeKind>(
    config: &NodeConfig,
    executor: Arc<dyn CodeExecutor>,
    workflow: &WorkflowConfig,
) -> Result<Box<dyn Node>> {
    let data = K::parse_data(&config.id, &config.data)?;
    Ok(Box::new(K::from_data(&config.id, data, executor, workflow)?))
}

fn mapping_kind<K: NodeKind>(graph: &Value, config: &NodeConfig) -> Result<SelectorMapping> {
    let data = K::parse_data(&config.id, &config.data)?;
    Ok(K::extract_variable_selector_to_variable_mapping(graph, &config.id, &data))
}

/// Registry of node variants, keyed by node type.
pub struct NodeRegistry {
    kinds: HashMap<NodeType, KindEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Register a node variant.
    pub fn register<K: NodeKind>(&mut self) {
        self.kinds.insert(
            K::NODE_TYPE,
            KindEntry {
                build: build_kind::<K>,
                default_config: K::default_config,
                mapping: mapping_kind::<K>,
            },
        );
    }

    /// Create a registry with all built-in node variants registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<TemplateTransformNode>();
        registry
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.kinds.contains_key(&node_type)
    }

    /// Registered node types, sorted by tag.
    pub fn node_types(&self) -> Vec<NodeType> {
        let mut types: Vec<NodeType> = self.kinds.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    fn entry(&self, node_type: NodeType) -> Result<&KindEntry> {
        self.kinds
            .get(&node_type)
            .ok_or_else(|| StencilError::UnknownNodeType(node_type.to_string()))
    }

    /// Build a runnable node from its graph config.
    pub fn build(
        &self,
        config: &NodeConfig,
        executor: Arc<dyn CodeExecutor>,
        workflow: &WorkflowConfig,
    ) -> Result<Box<dyn Node>> {
        let node_type = config.node_type()?;
        debug!(node_id = %config.id, %node_type, "Building node");
        (self.entry(node_type)?.build)(config, executor, workflow)
    }

    /// Default config of one node variant.
    pub fn default_config(&self, node_type: NodeType, filters: Option<&Value>) -> Result<Value> {
        Ok((self.entry(node_type)?.default_config)(filters))
    }

    /// Default configs of every registered variant.
    pub fn default_configs(&self, filters: Option<&Value>) -> Vec<Value> {
        self.node_types()
            .into_iter()
            .filter_map(|t| self.kinds.get(&t))
            .map(|entry| (entry.default_config)(filters))
            .collect()
    }

    /// Selector mapping for one node of `graph`.
    pub fn extract_node_mapping(&self, graph: &GraphConfig, node_id: &str) -> Result<SelectorMapping> {
        let config = graph.node(node_id).ok_or_else(|| StencilError::InvalidNodeData {
            node_id: node_id.to_string(),
            message: "node not found in graph".into(),
        })?;
        let entry = self.entry(config.node_type()?)?;
        (entry.mapping)(&graph.to_value(), config)
    }

    /// Selector mapping merged across every node in `graph`.
    ///
    /// Nodes of variants this registry does not know are skipped.
    pub fn extract_mapping(&self, graph: &GraphConfig) -> Result<SelectorMapping> {
        let raw = graph.to_value();
        let mut mapping = SelectorMapping::new();
        for config in &graph.nodes {
            let entry = match config.node_type() {
                Ok(t) => match self.kinds.get(&t) {
                    Some(entry) => entry,
                    None => continue,
                },
                Err(StencilError::UnknownNodeType(tag)) => {
                    debug!(node_id = %config.id, node_type = %tag, "Skipping node of unknown type");
                    continue;
                }
                Err(e) => return Err(e),
            };
            mapping.extend((entry.mapping)(&raw, config)?);
        }
        Ok(mapping)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
