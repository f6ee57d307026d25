//! Recursive-descent query parser with error recovery
//!
//! ```text
//! expr      := path
//! path      := '/'? step ('/' step)*
//! step      := ('*' | '.' | name) predicate*
//! predicate := '[' pred_expr ']'
//! pred_expr := operand (('=' | '!=') operand)?
//! operand   := literal | integer | variable | function | path
//! function  := name '(' (pred_expr (',' pred_expr)*)? ')'
//! ```
//!
//! A syntax mistake is recorded once and the parser skips ahead: to the
//! next top-level `/` for a broken step, or past the closing `]` for a
//! broken predicate. All diagnostics of one pass are returned together.

use crate::errors::{Result, SyntaxDiagnostic, TreespaceError};
use crate::query::ast::{CompareOp, Expression, Function, LocationPath, NodeTest, Step};
use crate::query::lexer::{tokenize, Token, TokenKind};
use crate::query::replacer::VariableReplacer;

/// Deepest allowed nesting of predicates and function calls
pub const MAX_NESTING: usize = 32;

/// Parse a query string
///
/// # Errors
///
/// - `Parser` with every syntax diagnostic found, ordered by offset
/// - `VariableNotFound` as soon as the replacer cannot resolve a variable
/// - `StopParsing` when nesting exceeds [`MAX_NESTING`]
pub fn parse(query: &str, replacer: &dyn VariableReplacer) -> Result<Expression> {
    let (tokens, lex_diagnostics) = tokenize(query);
    let mut parser = Parser {
        tokens,
        pos: 0,
        diagnostics: lex_diagnostics,
        replacer,
    };

    let path = match parser.parse_location_path(0) {
        Ok(path) => path,
        Err(Abort::Fatal(err)) => return Err(err),
        Err(Abort::Recover) => LocationPath {
            absolute: false,
            steps: Vec::new(),
        },
    };

    if parser.diagnostics.is_empty() {
        return Ok(Expression::Path(path));
    }
    let mut diagnostics = parser.diagnostics;
    diagnostics.sort_by_key(|d| d.offset);
    Err(TreespaceError::parser(query, diagnostics))
}

enum Abort {
    /// A diagnostic was recorded; the caller resynchronises
    Recover,
    Fatal(TreespaceError),
}

type PResult<T> = std::result::Result<T, Abort>;

struct Parser<'r> {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<SyntaxDiagnostic>,
    replacer: &'r dyn VariableReplacer,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn current(&self) -> &Token {
        // tokenize always ends with Eof and we never advance past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Record a diagnostic at the current token unless the lexer already did
    fn fail(&mut self, expected: &str) -> Abort {
        let token = self.current().clone();
        if token.kind != TokenKind::Error {
            self.diagnostics.push(SyntaxDiagnostic::new(
                token.offset,
                format!("expected {}, found {}", expected, token.kind),
            ));
        }
        Abort::Recover
    }

    fn stop(&self, reason: String) -> Abort {
        let mut diagnostics = self.diagnostics.clone();
        diagnostics.sort_by_key(|d| d.offset);
        Abort::Fatal(TreespaceError::StopParsing {
            reason,
            diagnostics,
        })
    }

    /// Skip to the next `/` outside brackets, or to the end
    fn sync_to_slash(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::Slash if depth == 0 => return,
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip past the `]` closing the predicate we are inside
    fn sync_past_close_bracket(&mut self) {
        let mut depth = 1usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_location_path(&mut self, depth: usize) -> PResult<LocationPath> {
        let absolute = self.eat(&TokenKind::Slash);
        let mut steps = Vec::new();
        if absolute && self.at_path_end(depth) {
            return Ok(LocationPath { absolute, steps });
        }

        // every round consumes at least one token
        let mut rounds = 0usize;
        loop {
            rounds += 1;
            if rounds > self.tokens.len() {
                return Err(self.stop(format!("no progress at token {}", self.pos)));
            }
            match self.parse_step(depth) {
                Ok(step) => steps.push(step),
                Err(Abort::Recover) if depth == 0 => self.sync_to_slash(),
                Err(abort) => return Err(abort),
            }
            if self.eat(&TokenKind::Slash) {
                continue;
            }
            if depth == 0 && *self.peek() != TokenKind::Eof {
                let _ = self.fail("'/' or end of input");
                self.sync_to_slash();
                if self.eat(&TokenKind::Slash) {
                    continue;
                }
            }
            return Ok(LocationPath { absolute, steps });
        }
    }

    fn at_path_end(&self, depth: usize) -> bool {
        match self.peek() {
            TokenKind::Eof => true,
            TokenKind::RBracket | TokenKind::Eq | TokenKind::NotEq | TokenKind::Comma | TokenKind::RParen => {
                depth > 0
            }
            _ => false,
        }
    }

    fn parse_step(&mut self, depth: usize) -> PResult<Step> {
        let test = match self.peek().clone() {
            TokenKind::Star => NodeTest::Wildcard,
            TokenKind::Dot => NodeTest::SelfNode,
            TokenKind::Name(name) => NodeTest::Name(name),
            _ => return Err(self.fail("a step")),
        };
        self.advance();

        let mut predicates = Vec::new();
        while *self.peek() == TokenKind::LBracket {
            if let Some(predicate) = self.parse_predicate(depth)? {
                predicates.push(predicate);
            }
        }
        Ok(Step { test, predicates })
    }

    /// `None` when the predicate was malformed and skipped
    fn parse_predicate(&mut self, depth: usize) -> PResult<Option<Expression>> {
        if depth >= MAX_NESTING {
            return Err(self.stop(format!("nesting deeper than {}", MAX_NESTING)));
        }
        self.advance();
        let parsed = self.parse_pred_expr(depth + 1).and_then(|expr| {
            if self.eat(&TokenKind::RBracket) {
                Ok(expr)
            } else {
                Err(self.fail("']'"))
            }
        });
        match parsed {
            Ok(expr) => Ok(Some(expr)),
            Err(Abort::Recover) => {
                self.sync_past_close_bracket();
                Ok(None)
            }
            Err(fatal) => Err(fatal),
        }
    }

    fn parse_pred_expr(&mut self, depth: usize) -> PResult<Expression> {
        let lhs = self.parse_operand(depth)?;
        let op = match self.peek() {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::NotEq,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_operand(depth)?;
        Ok(Expression::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_operand(&mut self, depth: usize) -> PResult<Expression> {
        match self.peek().clone() {
            TokenKind::Literal(text) => {
                self.advance();
                Ok(Expression::literal(text))
            }
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expression::literal(value))
            }
            TokenKind::Variable(name) => {
                self.advance();
                let value = self.replacer.replace(&name).map_err(Abort::Fatal)?;
                Ok(Expression::Variable {
                    name,
                    value: Box::new(value),
                })
            }
            TokenKind::Name(_) if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::LParen) => {
                self.parse_function(depth)
            }
            TokenKind::Name(_) | TokenKind::Star | TokenKind::Dot | TokenKind::Slash => {
                Ok(Expression::Path(self.parse_location_path(depth)?))
            }
            _ => Err(self.fail("an operand")),
        }
    }

    fn parse_function(&mut self, depth: usize) -> PResult<Expression> {
        if depth >= MAX_NESTING {
            return Err(self.stop(format!("nesting deeper than {}", MAX_NESTING)));
        }
        let name_token = self.advance();
        let TokenKind::Name(name) = name_token.kind else {
            return Err(self.stop("function call without a name".to_string()));
        };
        self.advance();

        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                args.push(self.parse_pred_expr(depth + 1)?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                return Err(self.fail("',' or ')'"));
            }
        }

        let Some(function) = Function::from_name(&name) else {
            self.diagnostics.push(SyntaxDiagnostic::new(
                name_token.offset,
                format!("unknown function '{}'", name),
            ));
            return Err(Abort::Recover);
        };
        if args.len() != function.arity() {
            self.diagnostics.push(SyntaxDiagnostic::new(
                name_token.offset,
                format!(
                    "function '{}' takes {} argument(s), got {}",
                    name,
                    function.arity(),
                    args.len()
                ),
            ));
            return Err(Abort::Recover);
        }
        Ok(Expression::FunctionCall { function, args })
    }
}

/// Convert a query string into a fully keyed data path
///
/// # Errors
///
/// Any parse error, or `InvalidPath` when the query uses wildcards,
/// functions, positional predicates or other non-path constructs.
pub fn parse_simple_path(query: &str) -> Result<crate::path::DataPath> {
    let expr = parse(query, &crate::query::replacer::NoVariables)?;
    expr.to_simple_path().ok_or_else(|| TreespaceError::InvalidPath {
        path: query.to_string(),
        reason: "not an absolute path of plain or keyed steps".to_string(),
    })
}
