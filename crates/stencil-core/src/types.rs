use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, StencilError};
use crate::security::HIDDEN_VALUE;

/// Named inputs or outputs of a node, in insertion order.
pub type VariableMap = serde_json::Map<String, Value>;

/// Unique identifier of a single node execution.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Code execution ──────────────────────────────────────────────

/// Language tag passed to a code executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    Jinja2,
    Python3,
    Javascript,
}

impl fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jinja2 => write!(f, "jinja2"),
            Self::Python3 => write!(f, "python3"),
            Self::Javascript => write!(f, "javascript"),
        }
    }
}

/// Successful output of a code executor call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeExecutionResult {
    pub result: String,
}

// ── Variables ───────────────────────────────────────────────────

/// A named reference to a path within the variable pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSelector {
    pub variable: String,
    pub value_selector: Vec<String>,
}

impl VariableSelector {
    pub fn new<S: Into<String>>(
        variable: impl Into<String>,
        value_selector: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            variable: variable.into(),
            value_selector: value_selector.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the selector is usable: a non-empty name and a non-empty path.
    pub fn validate(&self, node_id: &str) -> Result<()> {
        if self.variable.is_empty() {
            return Err(StencilError::InvalidNodeData {
                node_id: node_id.to_string(),
                message: "variable name must not be empty".into(),
            });
        }
        if self.value_selector.is_empty() {
            return Err(StencilError::InvalidNodeData {
                node_id: node_id.to_string(),
                message: format!("value_selector of '{}' must not be empty", self.variable),
            });
        }
        Ok(())
    }
}

/// Declared type of a global variable's serialized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

/// A named, typed, pool-wide value set at run start.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub value: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub is_secret: bool,
    #[serde(default = "default_exportable")]
    pub exportable: bool,
}

fn default_exportable() -> bool {
    true
}

impl GlobalVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            value_type,
            is_secret: false,
            exportable: true,
        }
    }

    pub fn secret(mut self) -> Self {
        self.is_secret = true;
        self
    }

    pub fn not_exportable(mut self) -> Self {
        self.exportable = false;
        self
    }

    /// Decode the serialized value according to `value_type`.
    pub fn typed_value(&self) -> Result<Value> {
        if self.value_type == ValueType::String {
            return Ok(Value::String(self.value.clone()));
        }

        let parsed: Value =
            serde_json::from_str(&self.value).map_err(|e| StencilError::InvalidGlobalVariable {
                name: self.name.clone(),
                message: e.to_string(),
            })?;

        let matches = match self.value_type {
            ValueType::Number => parsed.is_number(),
            ValueType::Boolean => parsed.is_boolean(),
            ValueType::Object => parsed.is_object(),
            ValueType::Array => parsed.is_array(),
            ValueType::String => true,
        };
        if !matches {
            return Err(StencilError::InvalidGlobalVariable {
                name: self.name.clone(),
                message: format!("value does not match declared type {:?}", self.value_type),
            });
        }
        Ok(parsed)
    }

    /// Copy safe to show: a secret's value is replaced by [`HIDDEN_VALUE`].
    pub fn masked(&self) -> Self {
        let mut out = self.clone();
        if out.is_secret {
            out.value = HIDDEN_VALUE.to_string();
        }
        out
    }

    /// The value as it may be shown to a user or written to a log.
    pub fn display_value(&self) -> &str {
        if self.is_secret {
            HIDDEN_VALUE
        } else {
            &self.value
        }
    }
}

impl fmt::Debug for GlobalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalVariable")
            .field("name", &self.name)
            .field("value", &self.display_value())
            .field("value_type", &self.value_type)
            .field("is_secret", &self.is_secret)
            .field("exportable", &self.exportable)
            .finish()
    }
}

impl fmt::Display for GlobalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.display_value())
    }
}

// ── Nodes ───────────────────────────────────────────────────────

/// Node-type tag stored in graph configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "template-transform")]
    TemplateTransform,
}

impl NodeType {
    pub const ALL: &'static [NodeType] = &[NodeType::TemplateTransform];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateTransform => "template-transform",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = StencilError;

    fn from_str(s: &str) -> Result<Self> {
        NodeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StencilError::UnknownNodeType(s.to_string()))
    }
}

/// Outcome status of a node run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Succeeded,
    Failed,
}

/// Immutable record of one node execution.
///
/// Built only through [`NodeRunResult::succeeded`] and [`NodeRunResult::failed`],
/// so a failed result always carries an error and a successful one always
/// carries outputs. Deserialization checks the same pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNodeRunResult")]
pub struct NodeRunResult {
    status: NodeRunStatus,
    inputs: VariableMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    outputs: Option<VariableMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
struct RawNodeRunResult {
    status: NodeRunStatus,
    #[serde(default)]
    inputs: VariableMap,
    outputs: Option<VariableMap>,
    error: Option<String>,
}

impl TryFrom<RawNodeRunResult> for NodeRunResult {
    type Error = String;

    fn try_from(raw: RawNodeRunResult) -> std::result::Result<Self, Self::Error> {
        match (raw.status, raw.outputs, raw.error) {
            (NodeRunStatus::Succeeded, Some(outputs), None) => Ok(Self::succeeded(raw.inputs, outputs)),
            (NodeRunStatus::Failed, None, Some(error)) => Ok(Self::failed(raw.inputs, error)),
            (NodeRunStatus::Succeeded, _, _) => {
                Err("succeeded run result needs outputs and no error".into())
            }
            (NodeRunStatus::Failed, _, _) => {
                Err("failed run result needs an error and no outputs".into())
            }
        }
    }
}

impl NodeRunResult {
    pub fn succeeded(inputs: VariableMap, outputs: VariableMap) -> Self {
        Self {
            status: NodeRunStatus::Succeeded,
            inputs,
            outputs: Some(outputs),
            error: None,
        }
    }

    pub fn failed(inputs: VariableMap, error: impl Into<String>) -> Self {
        Self {
            status: NodeRunStatus::Failed,
            inputs,
            outputs: None,
            error: Some(error.into()),
        }
    }

    pub fn status(&self) -> NodeRunStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == NodeRunStatus::Succeeded
    }

    pub fn inputs(&self) -> &VariableMap {
        &self.inputs
    }

    pub fn outputs(&self) -> Option<&VariableMap> {
        self.outputs.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Node lifecycle events published on the event bus.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Started {
        execution_id: ExecutionId,
        node_id: String,
        node_type: NodeType,
    },
    Succeeded {
        execution_id: ExecutionId,
        node_id: String,
        elapsed_ms: u64,
    },
    /// The node reported a `Failed` run result; the run may continue.
    Failed {
        execution_id: ExecutionId,
        node_id: String,
        error: String,
        elapsed_ms: u64,
    },
    /// The node raised an unexpected error; the run must abort.
    Fatal {
        execution_id: ExecutionId,
        node_id: String,
        message: String,
    },
}
