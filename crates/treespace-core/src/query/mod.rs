//! Path queries: tokenizing, parsing, variable replacement and evaluation

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod replacer;

pub use ast::{CompareOp, Expression, Function, LocationPath, NodeTest, Step};
pub use eval::{NodeSelection, QueryMatch, SelectionFilter};
pub use parser::{parse, parse_simple_path, MAX_NESTING};
pub use replacer::{MapVariableReplacer, NoVariables, VariableReplacer};
