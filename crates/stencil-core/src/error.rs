use thiserror::Error;

#[derive(Debug, Error)]
pub enum StencilError {
    // Code execution errors
    #[error("{0}")]
    CodeExecution(String),

    #[error("Code language not supported by {executor}: {language}")]
    UnsupportedLanguage { executor: String, language: String },

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    // Node errors
    #[error("Node {title} run failed: {message}")]
    NodeRunFailed {
        node_id: String,
        title: String,
        message: String,
    },

    #[error("Invalid node data for {node_id}: {message}")]
    InvalidNodeData { node_id: String, message: String },

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    // Variable errors
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid global variable {name}: {message}")]
    InvalidGlobalVariable { name: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StencilError {
    /// Whether this error is a script-level failure that a node reports as a
    /// `Failed` run result instead of aborting the run.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::CodeExecution(_))
    }
}

pub type Result<T> = std::result::Result<T, StencilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_execution_message_is_verbatim() {
        let err = StencilError::CodeExecution("syntax error at line 2".into());
        assert_eq!(err.to_string(), "syntax error at line 2");
        assert!(err.is_execution_failure());
    }

    #[test]
    fn test_node_run_failed_names_node() {
        let err = StencilError::NodeRunFailed {
            node_id: "n1".into(),
            title: "Format reply".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Node Format reply run failed: boom");
        assert!(!err.is_execution_failure());
    }
}
