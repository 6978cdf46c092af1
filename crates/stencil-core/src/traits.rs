use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{CodeExecutionResult, CodeLanguage, VariableMap};

/// Code executor. Renders a template or runs a script against named inputs.
///
/// A script-level failure is reported as `StencilError::CodeExecution` carrying
/// the message to show the workflow author. Any other error is treated by
/// callers as fatal.
pub trait CodeExecutor: Send + Sync + 'static {
    /// Executor name (used in logs and error messages).
    fn name(&self) -> &str;

    /// Languages this executor can run.
    fn supported_languages(&self) -> &[CodeLanguage];

    /// Execute `template` written in `language` with the given inputs.
    fn execute_workflow_code_template<'a>(
        &'a self,
        language: CodeLanguage,
        template: &'a str,
        inputs: &'a VariableMap,
    ) -> BoxFuture<'a, Result<CodeExecutionResult>>;

    fn supports(&self, language: CodeLanguage) -> bool {
        self.supported_languages().contains(&language)
    }
}
