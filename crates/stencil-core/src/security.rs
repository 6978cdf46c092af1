use serde_json::Value;

use crate::types::{GlobalVariable, ValueType};

/// Placeholder shown wherever a secret value would otherwise appear.
pub const HIDDEN_VALUE: &str = "[__HIDDEN__]";

/// Prepare globals for leaving the workflow (export, display).
///
/// Non-exportable variables are dropped; secret values are replaced by
/// [`HIDDEN_VALUE`].
pub fn export_globals(globals: &[GlobalVariable]) -> Vec<GlobalVariable> {
    globals
        .iter()
        .filter(|g| g.exportable)
        .map(GlobalVariable::masked)
        .collect()
}

/// Replace every occurrence of a string secret's value in `text`.
///
/// Only string-typed secrets are matched as text; use [`redact_json`] for
/// structured output.
pub fn redact_secrets(text: &str, globals: &[GlobalVariable]) -> String {
    let mut redacted = text.to_string();
    for g in globals
        .iter()
        .filter(|g| g.is_secret && g.value_type == ValueType::String && !g.value.is_empty())
    {
        redacted = redacted.replace(&g.value, HIDDEN_VALUE);
    }
    redacted
}

/// Mask secret globals inside a JSON value before it is serialized.
///
/// Any value equal to a secret's decoded value becomes [`HIDDEN_VALUE`], and
/// occurrences of string secrets inside other strings are replaced.
pub fn redact_json(mut value: Value, globals: &[GlobalVariable]) -> Value {
    let secrets: Vec<&GlobalVariable> = globals.iter().filter(|g| g.is_secret).collect();
    if secrets.is_empty() {
        return value;
    }
    let typed: Vec<Value> = secrets.iter().filter_map(|g| g.typed_value().ok()).collect();
    let needles: Vec<&str> = secrets
        .iter()
        .filter(|g| g.value_type == ValueType::String && !g.value.is_empty())
        .map(|g| g.value.as_str())
        .collect();
    redact_in_place(&mut value, &typed, &needles);
    value
}

fn redact_in_place(value: &mut Value, typed: &[Value], needles: &[&str]) {
    if typed.iter().any(|secret| *secret == *value) {
        *value = Value::String(HIDDEN_VALUE.to_string());
        return;
    }
    match value {
        Value::String(s) => {
            for needle in needles {
                if s.contains(needle) {
                    *s = s.replace(needle, HIDDEN_VALUE);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_in_place(item, typed, needles);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                redact_in_place(v, typed, needles);
            }
        }
        _ => {}
    }
}

/// Mask an optional secret for display (config dumps).
pub fn mask_opt(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|_| HIDDEN_VALUE.to_string())
}
