use futures::future::BoxFuture;
use minijinja::{Environment, UndefinedBehavior};
use tracing::debug;

use stencil_core::error::{Result, StencilError};
use stencil_core::traits::CodeExecutor;
use stencil_core::types::{CodeExecutionResult, CodeLanguage, VariableMap};

const TEMPLATE_NAME: &str = "template";

/// Renders Jinja2 templates in-process.
///
/// Undefined variables render as empty strings, matching Jinja2's default
/// behavior; parse and render errors are reported as code-execution failures.
pub struct JinjaExecutor {
    undefined: UndefinedBehavior,
}

impl JinjaExecutor {
    pub fn new() -> Self {
        Self {
            undefined: UndefinedBehavior::Lenient,
        }
    }

    /// Fail the render when a template references an undefined variable.
    pub fn strict() -> Self {
        Self {
            undefined: UndefinedBehavior::Strict,
        }
    }

    fn render(&self, template: &str, inputs: &VariableMap) -> Result<String> {
        let mut env = Environment::new();
        env.set_undefined_behavior(self.undefined);
        env.add_template(TEMPLATE_NAME, template)
            .map_err(|e| StencilError::CodeExecution(e.to_string()))?;
        let tmpl = env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| StencilError::CodeExecution(e.to_string()))?;
        tmpl.render(minijinja::Value::from_serialize(inputs))
            .map_err(|e| StencilError::CodeExecution(e.to_string()))
    }
}

impl Default for JinjaExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeExecutor for JinjaExecutor {
    fn name(&self) -> &str {
        "jinja"
    }

    fn supported_languages(&self) -> &[CodeLanguage] {
        &[CodeLanguage::Jinja2]
    }

    fn execute_workflow_code_template<'a>(
        &'a self,
        language: CodeLanguage,
        template: &'a str,
        inputs: &'a VariableMap,
    ) -> BoxFuture<'a, Result<CodeExecutionResult>> {
        Box::pin(async move {
            if !self.supports(language) {
                return Err(StencilError::UnsupportedLanguage {
                    executor: self.name().to_string(),
                    language: language.to_string(),
                });
            }

            debug!(template_len = template.len(), inputs = inputs.len(), "Rendering template");
            let result = self.render(template, inputs)?;
            Ok(CodeExecutionResult { result })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(value: serde_json::Value) -> VariableMap {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_renders_variables() {
        let executor = JinjaExecutor::new();
        let vars = inputs(json!({"arg1": "hi", "items": [1, 2, 3]}));
        let out = executor
            .execute_workflow_code_template(
                CodeLanguage::Jinja2,
                "{{ arg1 }}: {% for i in items %}{{ i }}{% endfor %}",
                &vars,
            )
            .await
            .unwrap();
        assert_eq!(out.result, "hi: 123");
    }

    #[tokio::test]
    async fn test_missing_variable_renders_empty() {
        let executor = JinjaExecutor::new();
        let out = executor
            .execute_workflow_code_template(CodeLanguage::Jinja2, "[{{ nope }}]", &VariableMap::new())
            .await
            .unwrap();
        assert_eq!(out.result, "[]");
    }

    #[tokio::test]
    async fn test_strict_missing_variable_fails() {
        let executor = JinjaExecutor::strict();
        let err = executor
            .execute_workflow_code_template(CodeLanguage::Jinja2, "{{ nope }}", &VariableMap::new())
            .await
            .unwrap_err();
        assert!(err.is_execution_failure());
    }

    #[tokio::test]
    async fn test_syntax_error_is_execution_failure() {
        let executor = JinjaExecutor::new();
        let err = executor
            .execute_workflow_code_template(CodeLanguage::Jinja2, "{% if %}", &VariableMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StencilError::CodeExecution(_)));
    }

    #[tokio::test]
    async fn test_rejects_other_languages() {
        let executor = JinjaExecutor::new();
        let err = executor
            .execute_workflow_code_template(CodeLanguage::Python3, "print(1)", &VariableMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StencilError::UnsupportedLanguage { .. }));
    }
}
