use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::{Map, Value};

use stencil_core::error::{Result, StencilError};
use stencil_core::security::HIDDEN_VALUE;
use stencil_core::types::GlobalVariable;

/// Namespace holding system variables (query, user id, ...).
pub const SYSTEM_NODE_ID: &str = "sys";
/// Namespace holding the run's global (environment) variables.
pub const ENVIRONMENT_NODE_ID: &str = "env";

/// Run-scoped store of values produced by workflow nodes.
///
/// Values are addressed by a path: the first segment names the producing node
/// (or the `sys` / `env` namespace), the second the variable, and any further
/// segments walk into objects by key and into arrays by index.
#[derive(Clone, Default)]
pub struct VariablePool {
    nodes: HashMap<String, Map<String, Value>>,
    secret_globals: HashSet<String>,
}

impl VariablePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool seeded with the run's global variables under `env`.
    pub fn with_globals(globals: &[GlobalVariable]) -> Result<Self> {
        let mut pool = Self::new();
        for g in globals {
            pool.add(&[ENVIRONMENT_NODE_ID, g.name.as_str()], g.typed_value()?)?;
            if g.is_secret {
                pool.secret_globals.insert(g.name.clone());
            }
        }
        Ok(pool)
    }

    /// Set a system variable (`sys.<key>`).
    pub fn with_system(mut self, key: &str, value: Value) -> Self {
        self.nodes
            .entry(SYSTEM_NODE_ID.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self
    }

    /// Build a pool from `{ "<node_id>": { "<variable>": value } }`.
    pub fn from_json(value: Value) -> Result<Self> {
        let mut pool = Self::new();
        pool.load_json(value)?;
        Ok(pool)
    }

    /// Merge `{ "<node_id>": { "<variable>": value } }` into the pool,
    /// overwriting variables that already exist.
    pub fn load_json(&mut self, value: Value) -> Result<()> {
        let Value::Object(nodes) = value else {
            return Err(StencilError::InvalidSelector(
                "pool data must be an object keyed by node id".into(),
            ));
        };

        for (node_id, vars) in nodes {
            let Value::Object(vars) = vars else {
                return Err(StencilError::InvalidSelector(format!(
                    "variables of node '{}' must be an object",
                    node_id
                )));
            };
            self.nodes.entry(node_id).or_default().extend(vars);
        }
        Ok(())
    }

    /// Resolve a path, returning `None` when any segment is missing.
    pub fn get_any<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (node_id, rest) = path.split_first()?;
        let (variable, rest) = rest.split_first()?;
        let root = self.nodes.get(node_id.as_ref())?.get(variable.as_ref())?;
        rest.iter().try_fold(root, |current, segment| step(current, segment.as_ref()))
    }

    pub fn contains<S: AsRef<str>>(&self, path: &[S]) -> bool {
        self.get_any(path).is_some()
    }

    /// Write a value. Paths longer than two segments write into nested
    /// objects, creating them as needed.
    pub fn add<S: AsRef<str>>(&mut self, path: &[S], value: Value) -> Result<()> {
        let [node_id, variable, rest @ ..] = path else {
            return Err(StencilError::InvalidSelector(format!(
                "selector needs a node id and a variable name, got {} segment(s)",
                path.len()
            )));
        };

        let vars = self.nodes.entry(node_id.as_ref().to_string()).or_default();
        let Some((last, middle)) = rest.split_last() else {
            vars.insert(variable.as_ref().to_string(), value);
            return Ok(());
        };

        let mut current = vars
            .entry(variable.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for segment in middle {
            current = step_mut(current, segment.as_ref());
        }
        let index = array_index(current, last.as_ref());
        match index {
            Some(i) => current[i] = value,
            None => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                current[last.as_ref()] = value;
            }
        }
        Ok(())
    }

    /// Drop every variable produced by `node_id`.
    pub fn remove_node(&mut self, node_id: &str) {
        self.nodes.remove(node_id);
    }

    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// JSON view of the pool with secret globals masked.
    pub fn snapshot(&self) -> Value {
        let mut out = Map::new();
        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();
        for id in ids {
            let mut vars = self.nodes[id].clone();
            if id == ENVIRONMENT_NODE_ID {
                for name in &self.secret_globals {
                    if let Some(v) = vars.get_mut(name) {
                        *v = Value::String(HIDDEN_VALUE.to_string());
                    }
                }
            }
            out.insert(id.clone(), Value::Object(vars));
        }
        Value::Object(out)
    }
}

impl fmt::Debug for VariablePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariablePool")
            .field("nodes", &self.snapshot())
            .finish()
    }
}

/// One path step: object field, or array index when the value is an array.
fn step<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'a>(current: &'a mut Value, segment: &str) -> &'a mut Value {
    if let Some(i) = array_index(current, segment) {
        return &mut current[i];
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    &mut current[segment]
}

/// Index into `current` when it is an array and `segment` is in range.
fn array_index(current: &Value, segment: &str) -> Option<usize> {
    let items = current.as_array()?;
    segment.parse::<usize>().ok().filter(|i| *i < items.len())
}
