//! Variable bindings for one render and the stack of active renders.

use crate::error::{Result, TemplateError};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Reserved variable carrying the free-text instructions given on the
/// command line. Only the outermost context ever holds it.
pub const ADDITIONAL_INSTRUCTIONS: &str = "additional_instructions";

/// Immutable name to value mapping. Each `template()` call builds a fresh
/// one from its keyword arguments; nothing is inherited from the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    vars: Map<String, Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this context with `name` bound to `value`.
    pub fn with(&self, name: impl Into<String>, value: Value) -> Self {
        let mut vars = self.vars.clone();
        vars.insert(name.into(), value);
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for RenderContext {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Files currently being rendered, outermost first.
#[derive(Debug, Default)]
pub struct RenderTrace {
    stack: Vec<PathBuf>,
}

impl RenderTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `path`, failing if it is already on the stack.
    pub fn enter(&mut self, path: &Path) -> Result<()> {
        if self.contains(path) {
            let mut chain = self.stack.clone();
            chain.push(path.to_path_buf());
            return Err(TemplateError::CyclicReference {
                path: path.to_path_buf(),
                chain,
            });
        }
        self.stack.push(path.to_path_buf());
        Ok(())
    }

    pub fn exit(&mut self) {
        self.stack.pop();
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.stack.iter().any(|p| p == path)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
