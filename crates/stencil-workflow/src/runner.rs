use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use stencil_core::error::{Result, StencilError};
use stencil_core::event::EventBus;
use stencil_core::security::redact_json;
use stencil_core::types::{ExecutionId, GlobalVariable, NodeEvent, NodeRunResult, NodeType};

use crate::node::Node;
use crate::variable_pool::VariablePool;

/// Record of one node execution.
#[derive(Debug, Clone, Serialize)]
pub struct NodeExecution {
    pub execution_id: ExecutionId,
    pub node_id: String,
    pub node_type: NodeType,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
    pub result: NodeRunResult,
}

impl NodeExecution {
    /// JSON form with every secret global's value masked.
    pub fn to_redacted_json(&self, globals: &[GlobalVariable]) -> Result<Value> {
        Ok(redact_json(serde_json::to_value(self)?, globals))
    }
}

/// Runs nodes against a variable pool and reports their lifecycle.
///
/// Successful outputs are written back into the pool under the node's id so
/// later nodes can select them. A failed run result is returned as-is; an
/// `Err` from the node aborts with `StencilError::NodeRunFailed`.
pub struct NodeRunner {
    event_bus: Arc<EventBus>,
}

impl NodeRunner {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub async fn run(&self, node: &dyn Node, pool: &mut VariablePool) -> Result<NodeExecution> {
        let execution_id = ExecutionId::new();
        let node_id = node.id().to_string();
        let node_type = node.node_type();
        let started_at = Utc::now();
        let start = Instant::now();

        info!(%execution_id, node_id = %node_id, %node_type, title = %node.title(), "Running node");
        self.event_bus.publish(NodeEvent::Started {
            execution_id: execution_id.clone(),
            node_id: node_id.clone(),
            node_type,
        });

        let outcome = node.run(pool).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(%execution_id, node_id = %node_id, error = %e, "Node run aborted");
                self.event_bus.publish(NodeEvent::Fatal {
                    execution_id,
                    node_id: node_id.clone(),
                    message: e.to_string(),
                });
                return Err(StencilError::NodeRunFailed {
                    node_id,
                    title: node.title().to_string(),
                    message: e.to_string(),
                });
            }
        };

        match (result.outputs(), result.error()) {
            (Some(outputs), _) => {
                for (key, value) in outputs {
                    pool.add(&[node_id.as_str(), key.as_str()], value.clone())?;
                }
                info!(%execution_id, node_id = %node_id, elapsed_ms, "Node succeeded");
                self.event_bus.publish(NodeEvent::Succeeded {
                    execution_id: execution_id.clone(),
                    node_id: node_id.clone(),
                    elapsed_ms,
                });
            }
            (None, error) => {
                let error = error.unwrap_or_default().to_string();
                warn!(%execution_id, node_id = %node_id, elapsed_ms, error = %error, "Node failed");
                self.event_bus.publish(NodeEvent::Failed {
                    execution_id: execution_id.clone(),
                    node_id: node_id.clone(),
                    error,
                    elapsed_ms,
                });
            }
        }

        Ok(NodeExecution {
            execution_id,
            node_id,
            node_type,
            title: node.title().to_string(),
            started_at,
            finished_at: Utc::now(),
            elapsed_ms,
            result,
        })
    }
}

impl Default for NodeRunner {
    fn default() -> Self {
        Self::new(Arc::new(EventBus::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stencil_core::config::WorkflowConfig;
    use stencil_core::traits::CodeExecutor;
    use stencil_core::types::VariableSelector;
    use stencil_test_utils::MockCodeExecutor;

    use crate::node::template_transform::{TemplateTransformNode, TemplateTransformNodeData};
    use crate::node::NodeKind;

    fn node(executor: MockCodeExecutor) -> TemplateTransformNode {
        let executor: Arc<dyn CodeExecutor> = Arc::new(executor);
        TemplateTransformNode::from_data(
            "tt",
            TemplateTransformNodeData {
                title: "Format".into(),
                desc: None,
                variables: vec![VariableSelector::new("arg1", ["start", "query"])],
                template: "{{ arg1 }}".into(),
            },
            executor,
            &WorkflowConfig::default(),
        )
        .unwrap()
    }

    fn pool() -> VariablePool {
        VariablePool::from_json(json!({"start": {"query": "hi"}})).unwrap()
    }

    #[tokio::test]
    async fn test_success_writes_outputs_to_pool() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let runner = NodeRunner::new(bus);
        let mut pool = pool();

        let exec = runner.run(&node(MockCodeExecutor::returning("hi")), &mut pool).await.unwrap();
        assert!(exec.result.is_success());
        assert_eq!(exec.node_id, "tt");
        assert_eq!(exec.title, "Format");
        assert!(exec.finished_at >= exec.started_at);
        assert_eq!(pool.get_any(&["tt", "output"]), Some(&json!("hi")));

        assert!(matches!(rx.recv().await.unwrap(), NodeEvent::Started { .. }));
        assert!(matches!(rx.recv().await.unwrap(), NodeEvent::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_failed_result_leaves_pool_untouched() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let runner = NodeRunner::new(bus);
        let mut pool = pool();

        let exec = runner
            .run(&node(MockCodeExecutor::failing("syntax error at line 2")), &mut pool)
            .await
            .unwrap();
        assert!(!exec.result.is_success());
        assert_eq!(exec.result.error(), Some("syntax error at line 2"));
        assert!(!pool.contains(&["tt", "output"]));

        let _started = rx.recv().await.unwrap();
        match rx.recv().await.unwrap() {
            NodeEvent::Failed { error, .. } => assert_eq!(error, "syntax error at line 2"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_wrapped_with_node_identity() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let runner = NodeRunner::new(bus);
        let mut pool = pool();

        let err = runner
            .run(&node(MockCodeExecutor::erroring("connection reset")), &mut pool)
            .await
            .unwrap_err();
        match &err {
            StencilError::NodeRunFailed { node_id, title, message } => {
                assert_eq!(node_id, "tt");
                assert_eq!(title, "Format");
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().starts_with("Node Format run failed: "));

        let _started = rx.recv().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), NodeEvent::Fatal { .. }));
    }

    #[tokio::test]
    async fn test_execution_serializes() {
        let runner = NodeRunner::default();
        let mut pool = pool();
        let exec = runner.run(&node(MockCodeExecutor::returning("hi")), &mut pool).await.unwrap();
        let value = serde_json::to_value(&exec).unwrap();
        assert_eq!(value["node_type"], "template-transform");
        assert_eq!(value["result"]["status"], "succeeded");
        assert_eq!(value["result"]["outputs"]["output"], "hi");
        assert!(value["result"].get("error").is_none());
    }
}
