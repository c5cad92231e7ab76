use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

/// Run-scoped store of step outputs, keyed by output variable name.
///
/// The store is append-only for the lifetime of a run: a variable is written
/// exactly once by the step that declares it, then read by later steps via
/// `{{name}}` substitution. It is created fresh per run and discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableStore {
    data: HashMap<String, serde_json::Value>,
}

/// Read access shared by the store and its scoped overlays.
pub trait VariableLookup {
    fn lookup(&self, name: &str) -> Option<&serde_json::Value>;
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from initial values (e.g. CLI-provided inputs).
    pub fn from_map(data: HashMap<String, serde_json::Value>) -> Self {
        Self { data }
    }

    /// Record a produced value. Writing a name twice is a bug in the
    /// workflow definition and is rejected (validation catches it earlier).
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let key = key.into();
        if self.data.contains_key(&key) {
            return Err(VellumError::Config(format!(
                "variable '{}' was already produced",
                key
            )));
        }
        self.data.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// A read-through view with one extra binding layered on top, used by
    /// `json_iterator` to expose `current_item` without mutating the run
    /// store.
    pub fn scoped<'a>(
        &'a self,
        key: &'a str,
        value: &'a serde_json::Value,
    ) -> ScopedStore<'a> {
        ScopedStore {
            base: self,
            key,
            value,
        }
    }
}

impl VariableLookup for VariableStore {
    fn lookup(&self, name: &str) -> Option<&serde_json::Value> {
        self.data.get(name)
    }
}

/// One-binding overlay over a `VariableStore`.
pub struct ScopedStore<'a> {
    base: &'a VariableStore,
    key: &'a str,
    value: &'a serde_json::Value,
}

impl VariableLookup for ScopedStore<'_> {
    fn lookup(&self, name: &str) -> Option<&serde_json::Value> {
        if name == self.key {
            Some(self.value)
        } else {
            self.base.lookup(name)
        }
    }
}

/// Render `{{name}}` placeholders in a template against the store.
///
/// String values are spliced raw; structured values are spliced as compact
/// JSON. An unresolved placeholder is a hard error, never a silent blank.
pub fn render_template<L: VariableLookup>(template: &str, vars: &L) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next(); // consume second '{'
            let mut name = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                if c == '}' && chars.peek() == Some(&'}') {
                    chars.next();
                    closed = true;
                    break;
                }
                name.push(c);
            }
            let name = name.trim();
            if !closed {
                // Dangling "{{" with no closing braces: leave it verbatim
                result.push_str("{{");
                result.push_str(name);
                break;
            }
            match vars.lookup(name) {
                Some(serde_json::Value::String(s)) => result.push_str(s),
                Some(value) => result.push_str(&value.to_string()),
                None => {
                    return Err(VellumError::Substitution {
                        placeholder: name.to_string(),
                    });
                }
            }
        } else {
            result.push(c);
        }
    }
    Ok(result)
}
