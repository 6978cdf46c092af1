//! Workflow node execution.
//!
//! A workflow run owns one `VariablePool`. Each node resolves its declared
//! selectors against the pool, delegates to a `CodeExecutor` and returns an
//! immutable `NodeRunResult`. The `NodeRunner` wraps a single invocation,
//! writes outputs back into the pool and turns unexpected errors into a fatal
//! `NodeRunFailed` naming the node.

pub mod graph;
pub mod node;
pub mod registry;
pub mod runner;
pub mod variable_pool;

pub use graph::{GraphConfig, NodeConfig};
pub use node::template_transform::{TemplateTransformNode, TemplateTransformNodeData};
pub use node::{Node, NodeKind};
pub use registry::NodeRegistry;
pub use runner::{NodeExecution, NodeRunner};
pub use variable_pool::VariablePool;
