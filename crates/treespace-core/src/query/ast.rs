//! Parsed query expressions
//!
//! An `Expression` is immutable once parsed and holds no references into
//! any data tree, so one parse can be evaluated against many snapshots.

use std::fmt;

use crate::data::ScalarValue;
use crate::path::{DataPath, PathSegment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Name(String),
    Wildcard,
    SelfNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl Step {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            test: NodeTest::Name(name.into()),
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
}

/// Builtin predicate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    StartsWith,
    Contains,
    Not,
    Count,
    String,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "starts-with" => Function::StartsWith,
            "contains" => Function::Contains,
            "not" => Function::Not,
            "count" => Function::Count,
            "string" => Function::String,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::StartsWith => "starts-with",
            Function::Contains => "contains",
            Function::Not => "not",
            Function::Count => "count",
            Function::String => "string",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::StartsWith | Function::Contains => 2,
            Function::Not | Function::Count | Function::String => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Path(LocationPath),
    Literal(ScalarValue),
    /// A `$name` reference together with what the replacer resolved it to
    Variable {
        name: String,
        value: Box<Expression>,
    },
    FunctionCall {
        function: Function,
        args: Vec<Expression>,
    },
    Compare {
        op: CompareOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

impl Expression {
    pub fn literal(value: impl Into<ScalarValue>) -> Self {
        Expression::Literal(value.into())
    }

    /// The expression a variable stands for, or `self`
    pub fn resolved(&self) -> &Expression {
        match self {
            Expression::Variable { value, .. } => value.resolved(),
            other => other,
        }
    }

    pub fn as_path(&self) -> Option<&LocationPath> {
        match self.resolved() {
            Expression::Path(path) => Some(path),
            _ => None,
        }
    }

    /// Convert an absolute path of plain or singly-keyed steps
    ///
    /// Returns `None` for wildcards, self steps, positional or compound
    /// predicates, and relative paths.
    pub fn to_simple_path(&self) -> Option<DataPath> {
        let path = self.as_path()?;
        if !path.absolute {
            return None;
        }
        let mut segments = Vec::with_capacity(path.steps.len());
        for step in &path.steps {
            let NodeTest::Name(name) = &step.test else {
                return None;
            };
            let segment = match step.predicates.as_slice() {
                [] => PathSegment::new(name.clone()),
                [predicate] => {
                    let (leaf, value) = key_predicate(predicate)?;
                    PathSegment::keyed(name.clone(), leaf, value)
                }
                _ => return None,
            };
            segments.push(segment);
        }
        Some(DataPath::from_segments(segments))
    }
}

/// `leaf = literal` in either order
fn key_predicate(predicate: &Expression) -> Option<(String, String)> {
    let Expression::Compare {
        op: CompareOp::Eq,
        lhs,
        rhs,
    } = predicate.resolved()
    else {
        return None;
    };
    let leaf_of = |e: &Expression| -> Option<String> {
        let path = e.as_path()?;
        match (path.absolute, path.steps.as_slice()) {
            (false, [step]) if step.predicates.is_empty() => match &step.test {
                NodeTest::Name(n) => Some(n.clone()),
                _ => None,
            },
            _ => None,
        }
    };
    let literal_of = |e: &Expression| -> Option<String> {
        match e.resolved() {
            Expression::Literal(v) => Some(v.canonical()),
            _ => None,
        }
    };
    leaf_of(lhs)
        .zip(literal_of(rhs))
        .or_else(|| leaf_of(rhs).zip(literal_of(lhs)))
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name(n) => f.write_str(n),
            NodeTest::Wildcard => f.write_str("*"),
            NodeTest::SelfNode => f.write_str("."),
        }
    }
}

impl fmt::Display for LocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", step.test)?;
            for predicate in &step.predicates {
                write!(f, "[{}]", predicate)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Path(path) => write!(f, "{}", path),
            Expression::Literal(ScalarValue::String(s)) if s.contains('\'') => write!(f, "\"{}\"", s),
            Expression::Literal(ScalarValue::String(s)) => write!(f, "'{}'", s),
            Expression::Literal(other) => write!(f, "{}", other),
            Expression::Variable { name, .. } => write!(f, "${}", name),
            Expression::FunctionCall { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expression::Compare { op, lhs, rhs } => {
                let op = match op {
                    CompareOp::Eq => "=",
                    CompareOp::NotEq => "!=",
                };
                write!(f, "{} {} {}", lhs, op, rhs)
            }
        }
    }
}
