use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use stencil_core::config::WorkflowConfig;
use stencil_core::error::{Result, StencilError};
use stencil_core::traits::CodeExecutor;
use stencil_core::types::{CodeLanguage, NodeRunResult, NodeType, VariableMap, VariableSelector};

use super::{selector_mapping, Node, NodeKind, SelectorMapping};
use crate::variable_pool::VariablePool;

/// Configuration of a template-transform node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateTransformNodeData {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default)]
    pub variables: Vec<VariableSelector>,
    pub template: String,
}

/// Renders a Jinja2 template over variables pulled from the pool.
pub struct TemplateTransformNode {
    id: String,
    data: TemplateTransformNodeData,
    executor: Arc<dyn CodeExecutor>,
    max_output_length: usize,
}

impl TemplateTransformNode {
    /// Resolve every declared selector. Absent values become explicit nulls;
    /// a later duplicate name overwrites an earlier one.
    fn collect_inputs(&self, pool: &VariablePool) -> VariableMap {
        let mut inputs = VariableMap::new();
        for selector in &self.data.variables {
            let value = pool
                .get_any(&selector.value_selector)
                .cloned()
                .unwrap_or(Value::Null);
            inputs.insert(selector.variable.clone(), value);
        }
        inputs
    }
}

impl Node for TemplateTransformNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.data.title
    }

    fn node_type(&self) -> NodeType {
        Self::NODE_TYPE
    }

    fn run<'a>(&'a self, pool: &'a VariablePool) -> BoxFuture<'a, Result<NodeRunResult>> {
        Box::pin(async move {
            let inputs = self.collect_inputs(pool);

            let rendered = match self
                .executor
                .execute_workflow_code_template(CodeLanguage::Jinja2, &self.data.template, &inputs)
                .await
            {
                Ok(out) => out.result,
                Err(StencilError::CodeExecution(message)) => {
                    warn!(node_id = %self.id, error = %message, "Template execution failed");
                    return Ok(NodeRunResult::failed(inputs, message));
                }
                Err(e) => return Err(e),
            };

            let rendered_len = rendered.chars().count();
            if rendered_len > self.max_output_length {
                warn!(
                    node_id = %self.id,
                    rendered_len,
                    limit = self.max_output_length,
                    "Template output over limit"
                );
                return Ok(NodeRunResult::failed(
                    inputs,
                    format!("Output length exceeds {} characters", self.max_output_length),
                ));
            }

            debug!(node_id = %self.id, rendered_len, "Template rendered");
            let mut outputs = VariableMap::new();
            outputs.insert("output".to_string(), Value::String(rendered));
            Ok(NodeRunResult::succeeded(inputs, outputs))
        })
    }
}

impl NodeKind for TemplateTransformNode {
    type Data = TemplateTransformNodeData;

    const NODE_TYPE: NodeType = NodeType::TemplateTransform;

    fn default_config(_filters: Option<&Value>) -> Value {
        serde_json::json!({
            "type": Self::NODE_TYPE.as_str(),
            "config": {
                "variables": [
                    {
                        "variable": "arg1",
                        "value_selector": []
                    }
                ],
                "template": "{{ arg1 }}"
            }
        })
    }

    fn extract_variable_selector_to_variable_mapping(
        _graph_config: &Value,
        node_id: &str,
        data: &Self::Data,
    ) -> SelectorMapping {
        selector_mapping(node_id, &data.variables)
    }

    fn from_data(
        node_id: &str,
        data: Self::Data,
        executor: Arc<dyn CodeExecutor>,
        config: &WorkflowConfig,
    ) -> Result<Self> {
        for selector in &data.variables {
            selector.validate(node_id)?;
        }
        if !executor.supports(CodeLanguage::Jinja2) {
            return Err(StencilError::UnsupportedLanguage {
                executor: executor.name().to_string(),
                language: CodeLanguage::Jinja2.to_string(),
            });
        }
        Ok(Self {
            id: node_id.to_string(),
            data,
            executor,
            max_output_length: config.template_transform_max_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stencil_test_utils::MockCodeExecutor;

    fn data(variables: Vec<VariableSelector>, template: &str) -> TemplateTransformNodeData {
        TemplateTransformNodeData {
            title: "Format".into(),
            desc: None,
            variables,
            template: template.into(),
        }
    }

    fn build(executor: MockCodeExecutor, variables: Vec<VariableSelector>, max: usize) -> TemplateTransformNode {
        TemplateTransformNode::from_data(
            "tt",
            data(variables, "{{ arg1 }}"),
            Arc::new(executor),
            &WorkflowConfig::default().with_max_length(max),
        )
        .unwrap()
    }

    fn pool() -> VariablePool {
        VariablePool::from_json(json!({"node_a": {"text": "hi"}})).unwrap()
    }

    #[tokio::test]
    async fn test_success_passes_result_through() {
        let executor = MockCodeExecutor::returning("hi");
        let calls = executor.calls();
        let node = build(executor, vec![VariableSelector::new("arg1", ["node_a", "text"])], 80_000);

        let result = node.run(&pool()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.outputs().unwrap()["output"], json!("hi"));
        assert_eq!(result.inputs()["arg1"], json!("hi"));
        assert!(result.error().is_none());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].language, CodeLanguage::Jinja2);
        assert_eq!(calls[0].template, "{{ arg1 }}");
    }

    #[test]
    fn test_from_data_rejects_executor_without_jinja() {
        let executor = MockCodeExecutor::returning("").with_languages(vec![CodeLanguage::Python3]);
        let err = TemplateTransformNode::from_data(
            "tt",
            data(vec![], "{{ arg1 }}"),
            Arc::new(executor),
            &WorkflowConfig::default(),
        )
        .err()
        .unwrap();
        match err {
            StencilError::UnsupportedLanguage { executor, language } => {
                assert_eq!(executor, "mock");
                assert_eq!(language, CodeLanguage::Jinja2.to_string());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_absent_selector_is_explicit_null() {
        let executor = MockCodeExecutor::returning("");
        let calls = executor.calls();
        let node = build(executor, vec![VariableSelector::new("arg1", ["missing", "x"])], 80_000);

        let result = node.run(&pool()).await.unwrap();
        assert_eq!(result.inputs().get("arg1"), Some(&Value::Null));
        assert_eq!(calls.lock().unwrap()[0].inputs.get("arg1"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_duplicate_names_last_wins() {
        let mut p = pool();
        p.add(&["node_b", "text"], json!("later")).unwrap();
        let node = build(
            MockCodeExecutor::returning("x"),
            vec![
                VariableSelector::new("arg1", ["node_a", "text"]),
                VariableSelector::new("arg1", ["node_b", "text"]),
            ],
            80_000,
        );
        let result = node.run(&p).await.unwrap();
        assert_eq!(result.inputs().len(), 1);
        assert_eq!(result.inputs()["arg1"], json!("later"));
    }

    #[tokio::test]
    async fn test_output_at_limit_succeeds() {
        let node = build(MockCodeExecutor::returning("a".repeat(10)), vec![], 10);
        let result = node.run(&pool()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.outputs().unwrap()["output"], json!("a".repeat(10)));
    }

    #[tokio::test]
    async fn test_output_over_limit_fails() {
        let node = build(MockCodeExecutor::returning("a".repeat(80_001)), vec![], 80_000);
        let result = node.run(&pool()).await.unwrap();
        assert!(!result.is_success());
        assert!(result.outputs().is_none());
        assert_eq!(result.error(), Some("Output length exceeds 80000 characters"));
    }

    #[tokio::test]
    async fn test_limit_counts_characters_not_bytes() {
        // 5 characters, 15 bytes.
        let node = build(MockCodeExecutor::returning("日本語です"), vec![], 5);
        assert!(node.run(&pool()).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_execution_error_becomes_failed_result() {
        let node = build(
            MockCodeExecutor::failing("syntax error at line 2"),
            vec![VariableSelector::new("arg1", ["node_a", "text"])],
            80_000,
        );
        let result = node.run(&pool()).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("syntax error at line 2"));
        assert!(result.outputs().is_none());
        assert_eq!(result.inputs()["arg1"], json!("hi"));
    }

    #[tokio::test]
    async fn test_other_executor_errors_propagate() {
        let node = build(MockCodeExecutor::erroring("sandbox exploded"), vec![], 80_000);
        let err = node.run(&pool()).await.unwrap_err();
        assert!(matches!(err, StencilError::Sandbox(_)));
    }

    #[test]
    fn test_from_data_rejects_empty_selector() {
        let result = TemplateTransformNode::from_data(
            "tt",
            data(vec![VariableSelector::new("arg1", Vec::<String>::new())], "{{ arg1 }}"),
            Arc::new(MockCodeExecutor::returning("")),
            &WorkflowConfig::default(),
        );
        assert!(matches!(result, Err(StencilError::InvalidNodeData { .. })));
    }

    #[test]
    fn test_default_config_shape() {
        let config = TemplateTransformNode::default_config(None);
        assert_eq!(config["type"], "template-transform");
        assert_eq!(config["config"]["template"], "{{ arg1 }}");
        assert_eq!(config["config"]["variables"][0]["variable"], "arg1");
        assert_eq!(config["config"]["variables"][0]["value_selector"], json!([]));
    }

    #[test]
    fn test_mapping_has_one_entry_per_selector() {
        let d = data(
            vec![
                VariableSelector::new("arg1", ["node_a", "text"]),
                VariableSelector::new("arg2", ["node_b", "items", "0"]),
            ],
            "{{ arg1 }}{{ arg2 }}",
        );
        let mapping =
            TemplateTransformNode::extract_variable_selector_to_variable_mapping(&json!({}), "tt", &d);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["tt.arg1"], vec!["node_a", "text"]);
        assert_eq!(mapping["tt.arg2"], vec!["node_b", "items", "0"]);
        assert!(!mapping.contains_key("tt.arg3"));
    }

    #[test]
    fn test_parse_data_ignores_type_tag() {
        let raw = json!({
            "type": "template-transform",
            "title": "Format reply",
            "variables": [{"variable": "arg1", "value_selector": ["node_a", "text"]}],
            "template": "{{ arg1 }}"
        });
        let d = TemplateTransformNode::parse_data("tt", &raw).unwrap();
        assert_eq!(d.title, "Format reply");
        assert_eq!(d.variables.len(), 1);

        let bad = TemplateTransformNode::parse_data("tt", &json!({"variables": []}));
        assert!(matches!(bad, Err(StencilError::InvalidNodeData { .. })));
    }
}
