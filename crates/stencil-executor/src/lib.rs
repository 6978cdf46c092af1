//! Code executors: the collaborators that render a node's template.
//!
//! `JinjaExecutor` renders in-process with minijinja. `SandboxExecutor` ships
//! the template to a remote code-execution sandbox wrapped in a runner script
//! produced by `transformer`.

pub mod jinja;
pub mod sandbox;
pub mod transformer;

use std::sync::Arc;

use stencil_core::config::{CodeExecutionConfig, ExecutorBackend};
use stencil_core::error::Result;
use stencil_core::traits::CodeExecutor;

pub use jinja::JinjaExecutor;
pub use sandbox::SandboxExecutor;

/// Build the executor selected by `config.backend`.
pub fn from_config(config: &CodeExecutionConfig) -> Result<Arc<dyn CodeExecutor>> {
    match config.backend {
        ExecutorBackend::Local => Ok(Arc::new(JinjaExecutor::new())),
        ExecutorBackend::Sandbox => Ok(Arc::new(SandboxExecutor::new(config.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_local() {
        let executor = from_config(&CodeExecutionConfig::default()).unwrap();
        assert_eq!(executor.name(), "jinja");
    }

    #[test]
    fn test_from_config_sandbox() {
        let config = CodeExecutionConfig {
            backend: ExecutorBackend::Sandbox,
            ..Default::default()
        };
        let executor = from_config(&config).unwrap();
        assert_eq!(executor.name(), "sandbox");
    }
}
