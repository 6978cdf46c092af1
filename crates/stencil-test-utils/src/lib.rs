//! Shared test utilities for Stencil crates.
//!
//! Provides a scriptable `CodeExecutor` mock plus fixture builders for node
//! configs, graphs and config files.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::{json, Value};

use stencil_core::config::AppConfig;
use stencil_core::error::{Result, StencilError};
use stencil_core::traits::CodeExecutor;
use stencil_core::types::{CodeExecutionResult, CodeLanguage, VariableMap};

/// One call seen by [`MockCodeExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub language: CodeLanguage,
    pub template: String,
    pub inputs: VariableMap,
}

#[derive(Debug, Clone)]
enum Behavior {
    Return(String),
    Fail(String),
    Fatal(String),
    EchoInputs,
}

/// Code executor returning a scripted response and recording every call.
pub struct MockCodeExecutor {
    behavior: Behavior,
    languages: Vec<CodeLanguage>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockCodeExecutor {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            languages: vec![CodeLanguage::Jinja2, CodeLanguage::Python3],
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always succeed with `result`.
    pub fn returning(result: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Return(result.into()))
    }

    /// Always report a script-level failure (`StencilError::CodeExecution`).
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Fail(message.into()))
    }

    /// Always report an infrastructure fault (`StencilError::Sandbox`).
    pub fn erroring(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Fatal(message.into()))
    }

    /// Succeed with the received inputs serialized as JSON.
    pub fn echo_inputs() -> Self {
        Self::with_behavior(Behavior::EchoInputs)
    }

    /// Restrict the languages this mock claims to support.
    pub fn with_languages(mut self, languages: Vec<CodeLanguage>) -> Self {
        self.languages = languages;
        self
    }

    /// Shared handle to the recorded calls; stays valid after the mock is moved.
    pub fn calls(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        self.calls.clone()
    }
}

impl CodeExecutor for MockCodeExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    fn supported_languages(&self) -> &[CodeLanguage] {
        &self.languages
    }

    fn execute_workflow_code_template<'a>(
        &'a self,
        language: CodeLanguage,
        template: &'a str,
        inputs: &'a VariableMap,
    ) -> BoxFuture<'a, Result<CodeExecutionResult>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(RecordedCall {
                language,
                template: template.to_string(),
                inputs: inputs.clone(),
            });
            match &self.behavior {
                Behavior::Return(result) => Ok(CodeExecutionResult {
                    result: result.clone(),
                }),
                Behavior::Fail(message) => Err(StencilError::CodeExecution(message.clone())),
                Behavior::Fatal(message) => Err(StencilError::Sandbox(message.clone())),
                Behavior::EchoInputs => Ok(CodeExecutionResult {
                    result: serde_json::to_string(inputs)?,
                }),
            }
        })
    }
}

/// Node config for a template-transform node.
///
/// `variables` is a list of `(name, dotted selector path)` pairs, e.g.
/// `("arg1", "node_a.text")`.
pub fn template_node_config(id: &str, variables: &[(&str, &str)], template: &str) -> Value {
    let variables: Vec<Value> = variables
        .iter()
        .map(|(name, path)| {
            let selector: Vec<&str> = path.split('.').collect();
            json!({"variable": name, "value_selector": selector})
        })
        .collect();
    json!({
        "id": id,
        "data": {
            "type": "template-transform",
            "title": format!("Transform {}", id),
            "variables": variables,
            "template": template,
        }
    })
}

/// Graph config containing `nodes` and no edges.
pub fn graph_with(nodes: Vec<Value>) -> Value {
    json!({ "nodes": nodes, "edges": [] })
}

/// Write `contents` to `name` inside a fresh temp dir.
///
/// Keep the returned `TempDir` alive for as long as the file is needed.
pub fn write_temp_file(name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

/// Serialize `config` to a `stencil.toml` in a fresh temp dir.
pub fn write_app_config(config: &AppConfig) -> (tempfile::TempDir, PathBuf) {
    let contents = toml::to_string(config).unwrap();
    write_temp_file("stencil.toml", &contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mock = MockCodeExecutor::returning("ok");
        let calls = mock.calls();
        let mut inputs = VariableMap::new();
        inputs.insert("a".into(), json!(1));

        let out = mock
            .execute_workflow_code_template(CodeLanguage::Jinja2, "{{ a }}", &inputs)
            .await
            .unwrap();
        assert_eq!(out.result, "ok");
        assert_eq!(calls.lock().unwrap()[0].inputs, inputs);
    }

    #[tokio::test]
    async fn test_mock_echo_and_errors() {
        let mut inputs = VariableMap::new();
        inputs.insert("a".into(), json!("x"));
        let out = MockCodeExecutor::echo_inputs()
            .execute_workflow_code_template(CodeLanguage::Jinja2, "", &inputs)
            .await
            .unwrap();
        assert_eq!(out.result, r#"{"a":"x"}"#);

        let err = MockCodeExecutor::failing("bad")
            .execute_workflow_code_template(CodeLanguage::Jinja2, "", &inputs)
            .await
            .unwrap_err();
        assert!(err.is_execution_failure());
    }

    #[test]
    fn test_template_node_config_shape() {
        let node = template_node_config("tt", &[("arg1", "node_a.text")], "{{ arg1 }}");
        assert_eq!(node["data"]["type"], "template-transform");
        assert_eq!(node["data"]["variables"][0]["value_selector"][1], "text");
    }
}
