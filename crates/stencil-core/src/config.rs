use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StencilError};
use crate::security::mask_opt;

/// Environment variable overriding the template-transform output limit.
pub const TEMPLATE_TRANSFORM_MAX_LENGTH_ENV: &str = "TEMPLATE_TRANSFORM_MAX_LENGTH";

/// Top-level Stencil configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub code_execution: CodeExecutionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Limits applied by workflow nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum rendered length (characters) a template-transform node may emit.
    #[serde(default = "default_template_transform_max_length")]
    pub template_transform_max_length: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            template_transform_max_length: default_template_transform_max_length(),
        }
    }
}

impl WorkflowConfig {
    /// Defaults plus environment overrides, for callers without a config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.template_transform_max_length = max;
        self
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(TEMPLATE_TRANSFORM_MAX_LENGTH_ENV) {
            self.template_transform_max_length = parse_max_length(&raw)?;
            debug!(
                max_length = self.template_transform_max_length,
                "Template output limit overridden from environment"
            );
        }
        Ok(())
    }
}

fn parse_max_length(raw: &str) -> Result<usize> {
    raw.trim().parse().map_err(|_| {
        StencilError::Config(format!(
            "{} must be a non-negative integer, got '{}'",
            TEMPLATE_TRANSFORM_MAX_LENGTH_ENV, raw
        ))
    })
}

fn default_template_transform_max_length() -> usize { 80_000 }

/// Which code executor backend renders templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorBackend {
    /// In-process Jinja rendering.
    #[default]
    Local,
    /// Remote code-execution sandbox service.
    Sandbox,
}

/// Code execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeExecutionConfig {
    #[serde(default)]
    pub backend: ExecutorBackend,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub enable_network: bool,
}

impl Default for CodeExecutionConfig {
    fn default() -> Self {
        Self {
            backend: ExecutorBackend::default(),
            endpoint: default_endpoint(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            enable_network: false,
        }
    }
}

fn default_endpoint() -> String { "http://127.0.0.1:8194".to_string() }
fn default_timeout_secs() -> u64 { 15 }

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String { "stencil=info,warn".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion and overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StencilError::ConfigNotFound(path.display().to_string()))?;

        let mut config = Self::parse(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        Ok(Self {
            workflow: WorkflowConfig::from_env()?,
            ..Self::default()
        })
    }

    /// Parse TOML text after expanding `${ENV_VAR}` references.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| StencilError::Config(e.to_string()))
    }

    /// Apply process-environment overrides (`TEMPLATE_TRANSFORM_MAX_LENGTH`).
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.workflow.apply_env_overrides()
    }

    /// Copy of this config that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        out.code_execution.api_key = mask_opt(&self.code_execution.api_key);
        out
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_STENCIL_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_STENCIL_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_STENCIL_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_STENCIL_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_STENCIL_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.workflow.template_transform_max_length, 80_000);
        assert_eq!(config.code_execution.backend, ExecutorBackend::Local);
        assert_eq!(config.code_execution.endpoint, "http://127.0.0.1:8194");
        assert_eq!(config.code_execution.timeout_secs, 15);
        assert!(!config.code_execution.enable_network);
        assert_eq!(config.log.filter, "stencil=info,warn");
    }

    #[test]
    fn test_sandbox_section() {
        let config = AppConfig::parse(
            r#"
[code_execution]
backend = "sandbox"
endpoint = "http://sandbox:8194"
api_key = "secret"
timeout_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(config.code_execution.backend, ExecutorBackend::Sandbox);
        assert_eq!(config.code_execution.api_key.as_deref(), Some("secret"));
        assert_eq!(config.code_execution.timeout_secs, 30);
    }

    #[test]
    fn test_redacted_hides_api_key() {
        let mut config = AppConfig::default();
        config.code_execution.api_key = Some("secret".into());
        let shown = toml::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("[__HIDDEN__]"));
    }

    #[test]
    fn test_parse_max_length() {
        assert_eq!(parse_max_length(" 120 ").unwrap(), 120);
        assert!(matches!(parse_max_length("lots"), Err(StencilError::Config(_))));
    }

    #[test]
    fn test_with_max_length() {
        let config = WorkflowConfig::default().with_max_length(10);
        assert_eq!(config.template_transform_max_length, 10);
    }
}
