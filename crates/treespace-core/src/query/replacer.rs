//! Variable replacers
//!
//! The parser asks a replacer for every `$name` it meets. A missing
//! variable aborts the parse; it is never collected as a syntax diagnostic.

use std::collections::HashMap;

use crate::data::ScalarValue;
use crate::errors::{Result, TreespaceError};
use crate::query::ast::Expression;

pub trait VariableReplacer {
    /// # Errors
    ///
    /// `VariableNotFound` when `name` has no value.
    fn replace(&self, name: &str) -> Result<Expression>;
}

/// Replacer for queries that take no parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVariables;

impl VariableReplacer for NoVariables {
    fn replace(&self, name: &str) -> Result<Expression> {
        Err(TreespaceError::VariableNotFound {
            name: name.to_string(),
        })
    }
}

/// Replacer backed by a fixed name -> expression map
#[derive(Debug, Clone, Default)]
pub struct MapVariableReplacer {
    variables: HashMap<String, Expression>,
}

impl MapVariableReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Expression) -> Option<Expression> {
        self.variables.insert(name.into(), value)
    }

    pub fn with(mut self, name: impl Into<String>, value: Expression) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_literal(self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.with(name, Expression::Literal(value.into()))
    }
}

impl VariableReplacer for MapVariableReplacer {
    fn replace(&self, name: &str) -> Result<Expression> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| TreespaceError::VariableNotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_variables_fails_every_lookup() {
        assert_eq!(
            NoVariables.replace("x"),
            Err(TreespaceError::VariableNotFound {
                name: "x".to_string()
            })
        );
    }

    #[test]
    fn test_map_replacer() {
        let replacer = MapVariableReplacer::new().with_literal("port", 8080u64);
        assert_eq!(replacer.replace("port").unwrap(), Expression::literal(8080u64));
        assert!(replacer.replace("host").is_err());
    }
}
