//! Runner scripts for the remote sandbox.
//!
//! The sandbox only runs Python. A template or script is shipped inside a
//! small runner that decodes the base64-encoded inputs, executes the payload
//! and prints the result between `<<RESULT>>` markers so it can be told apart
//! from anything else the payload writes to stdout.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use stencil_core::error::{Result, StencilError};
use stencil_core::types::{CodeLanguage, VariableMap};

pub const RESULT_TAG: &str = "<<RESULT>>";

const JINJA2_PRELOAD: &str = "import jinja2\ntemplate = jinja2.Template('{{s}}')\ntemplate.render(s='a')\n";

const JINJA2_RUNNER: &str = r#"import json
from base64 import b64decode

import jinja2

template = jinja2.Template(b64decode('{{template}}').decode('utf-8'))
inputs_obj = json.loads(b64decode('{{inputs}}').decode('utf-8'))
output = template.render(**inputs_obj)
print(f'<<RESULT>>{output}<<RESULT>>')
"#;

const PYTHON3_RUNNER: &str = r#"import json
from base64 import b64decode

exec(b64decode('{{template}}').decode('utf-8'))
inputs_obj = json.loads(b64decode('{{inputs}}').decode('utf-8'))
output = json.dumps(main(**inputs_obj), ensure_ascii=False)
print(f'<<RESULT>>{output}<<RESULT>>')
"#;

/// A runner script ready to post to the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerScript {
    pub code: String,
    pub preload: String,
}

/// Wrap `payload` in the runner for `language`.
///
/// Returns `None` for languages the sandbox runner does not handle.
pub fn transform(language: CodeLanguage, payload: &str, inputs: &VariableMap) -> Result<Option<RunnerScript>> {
    let (runner, preload) = match language {
        CodeLanguage::Jinja2 => (JINJA2_RUNNER, JINJA2_PRELOAD),
        CodeLanguage::Python3 => (PYTHON3_RUNNER, ""),
        CodeLanguage::Javascript => return Ok(None),
    };

    let inputs_json = serde_json::to_string(inputs)?;
    let code = runner
        .replace("{{template}}", &STANDARD.encode(payload))
        .replace("{{inputs}}", &STANDARD.encode(inputs_json));

    Ok(Some(RunnerScript {
        code,
        preload: preload.to_string(),
    }))
}

/// Pull the result out of the runner's stdout.
pub fn extract_result(stdout: &str) -> Result<String> {
    let start = stdout
        .find(RESULT_TAG)
        .ok_or_else(|| StencilError::Sandbox("runner output has no result marker".into()))?;
    let rest = &stdout[start + RESULT_TAG.len()..];
    let end = rest
        .rfind(RESULT_TAG)
        .ok_or_else(|| StencilError::Sandbox("runner output has an unterminated result".into()))?;
    Ok(rest[..end].to_string())
}
