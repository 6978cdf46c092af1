use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stencil_core::config::CodeExecutionConfig;
use stencil_core::error::{Result, StencilError};
use stencil_core::traits::CodeExecutor;
use stencil_core::types::{CodeExecutionResult, CodeLanguage, VariableMap};

use crate::transformer::{self, RunnerScript};

/// Client for a remote code-execution sandbox service.
///
/// Posts runner scripts to `{endpoint}/v1/sandbox/run`. Transport failures,
/// timeouts and script errors come back as `StencilError::CodeExecution`; a
/// response the client cannot interpret is a `StencilError::Sandbox`.
pub struct SandboxExecutor {
    client: reqwest::Client,
    config: CodeExecutionConfig,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    language: &'a str,
    code: &'a str,
    preload: &'a str,
    enable_network: bool,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RunData>,
}

#[derive(Debug, Deserialize)]
struct RunData {
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SandboxExecutor {
    pub fn new(config: CodeExecutionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StencilError::Sandbox(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { client, config })
    }

    fn run_url(&self) -> String {
        format!("{}/v1/sandbox/run", self.config.endpoint.trim_end_matches('/'))
    }

    async fn post(&self, script: &RunnerScript) -> Result<String> {
        let body = RunRequest {
            language: "python3",
            code: &script.code,
            preload: &script.preload,
            enable_network: self.config.enable_network,
        };

        let mut request = self.client.post(self.run_url()).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.header("X-Api-Key", key);
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let response = match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                warn!(error = %e, "Sandbox request failed");
                return Err(StencilError::CodeExecution(format!(
                    "Failed to execute code, which is likely a network issue, \
                     please check if the sandbox service is running: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(StencilError::CodeExecution(format!(
                    "Code execution timed out after {}s",
                    self.config.timeout_secs
                )));
            }
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StencilError::CodeExecution(format!("Failed to read sandbox response: {}", e)))?;

        interpret_response(status.as_u16(), &text)
    }
}

/// Map an HTTP status and body from the sandbox to the runner's stdout.
fn interpret_response(status: u16, body: &str) -> Result<String> {
    if status == 503 {
        return Err(StencilError::CodeExecution(
            "Code execution service is unavailable".into(),
        ));
    }
    if status != 200 {
        return Err(StencilError::CodeExecution(format!(
            "Failed to execute code, got status code {}, please check if the sandbox service is running",
            status
        )));
    }

    let parsed: RunResponse = serde_json::from_str(body)
        .map_err(|e| StencilError::Sandbox(format!("malformed sandbox response: {}", e)))?;

    if parsed.code != 0 {
        return Err(StencilError::CodeExecution(parsed.message));
    }

    let data = parsed
        .data
        .ok_or_else(|| StencilError::Sandbox("sandbox response has no data".into()))?;
    if let Some(error) = data.error.filter(|e| !e.is_empty()) {
        return Err(StencilError::CodeExecution(error));
    }
    Ok(data.stdout.unwrap_or_default())
}

impl CodeExecutor for SandboxExecutor {
    fn name(&self) -> &str {
        "sandbox"
    }

    fn supported_languages(&self) -> &[CodeLanguage] {
        &[CodeLanguage::Jinja2, CodeLanguage::Python3]
    }

    fn execute_workflow_code_template<'a>(
        &'a self,
        language: CodeLanguage,
        template: &'a str,
        inputs: &'a VariableMap,
    ) -> BoxFuture<'a, Result<CodeExecutionResult>> {
        Box::pin(async move {
            let script = match transformer::transform(language, template, inputs)? {
                Some(script) if self.supports(language) => script,
                _ => {
                    return Err(StencilError::UnsupportedLanguage {
                        executor: self.name().to_string(),
                        language: language.to_string(),
                    })
                }
            };

            debug!(%language, url = %self.run_url(), "Posting runner script to sandbox");
            let stdout = self.post(&script).await?;
            let result = transformer::extract_result(&stdout)?;
            Ok(CodeExecutionResult { result })
        })
    }
}
