//! Query tokenizer
//!
//! Lexical mistakes do not stop tokenizing. Each one is recorded as a
//! diagnostic and leaves an `Error` token behind, so the parser can
//! resynchronise without reporting the same mistake a second time.

use std::fmt;

use crate::errors::SyntaxDiagnostic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Slash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Eq,
    NotEq,
    Star,
    Dot,
    Name(String),
    Literal(String),
    Integer(i64),
    Variable(String),
    /// Placeholder for input already reported by the lexer
    Error,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Eq => f.write_str("'='"),
            TokenKind::NotEq => f.write_str("'!='"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::Name(n) => write!(f, "name '{}'", n),
            TokenKind::Literal(s) => write!(f, "string '{}'", s),
            TokenKind::Integer(i) => write!(f, "integer {}", i),
            TokenKind::Variable(v) => write!(f, "variable ${}", v),
            TokenKind::Error => f.write_str("invalid input"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub offset: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Split a query into tokens; the last token is always `Eof`
pub fn tokenize(input: &str) -> (Vec<Token>, Vec<SyntaxDiagnostic>) {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let simple = match c {
            '/' => Some(TokenKind::Slash),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ',' => Some(TokenKind::Comma),
            '=' => Some(TokenKind::Eq),
            '*' => Some(TokenKind::Star),
            '.' => Some(TokenKind::Dot),
            _ => None,
        };
        if let Some(kind) = simple {
            chars.next();
            tokens.push(Token { kind, offset });
            continue;
        }
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match c {
            '!' => {
                chars.next();
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::NotEq
                } else {
                    diagnostics.push(SyntaxDiagnostic::new(offset, "expected '=' after '!'"));
                    TokenKind::Error
                }
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == c {
                        closed = true;
                        break;
                    }
                    text.push(n);
                }
                if closed {
                    TokenKind::Literal(text)
                } else {
                    diagnostics.push(SyntaxDiagnostic::new(offset, "unterminated string literal"));
                    TokenKind::Error
                }
            }
            '$' => {
                chars.next();
                let name = take_while(&mut chars, is_name_char);
                if name.chars().next().is_some_and(is_name_start) {
                    TokenKind::Variable(name)
                } else {
                    diagnostics.push(SyntaxDiagnostic::new(offset, "expected a variable name after '$'"));
                    TokenKind::Error
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                chars.next();
                let mut digits = c.to_string();
                digits.push_str(&take_while(&mut chars, |n| n.is_ascii_digit()));
                match digits.parse::<i64>() {
                    Ok(value) => TokenKind::Integer(value),
                    Err(_) => {
                        diagnostics.push(SyntaxDiagnostic::new(
                            offset,
                            format!("invalid integer literal '{}'", digits),
                        ));
                        TokenKind::Error
                    }
                }
            }
            c if is_name_start(c) => TokenKind::Name(take_while(&mut chars, is_name_char)),
            other => {
                chars.next();
                diagnostics.push(SyntaxDiagnostic::new(
                    offset,
                    format!("unexpected character '{}'", other),
                ));
                TokenKind::Error
            }
        };
        tokens.push(Token { kind, offset });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: input.len(),
    });
    (tokens, diagnostics)
}

fn take_while<I, P>(chars: &mut std::iter::Peekable<I>, pred: P) -> String
where
    I: Iterator<Item = (usize, char)>,
    P: Fn(char) -> bool,
{
    let mut out = String::new();
    while let Some((_, c)) = chars.next_if(|&(_, c)| pred(c)) {
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenizes_path_with_predicate() {
        assert_eq!(
            kinds("/if[name != 'eth0']"),
            vec![
                TokenKind::Slash,
                TokenKind::Name("if".to_string()),
                TokenKind::LBracket,
                TokenKind::Name("name".to_string()),
                TokenKind::NotEq,
                TokenKind::Literal("eth0".to_string()),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_names_allow_dashes_dots_and_colons() {
        assert_eq!(
            kinds("starts-with(ietf:a.b)"),
            vec![
                TokenKind::Name("starts-with".to_string()),
                TokenKind::LParen,
                TokenKind::Name("ietf:a.b".to_string()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_variables_and_integers() {
        assert_eq!(
            kinds("[$port][-3]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Variable("port".to_string()),
                TokenKind::RBracket,
                TokenKind::LBracket,
                TokenKind::Integer(-3),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexical_errors_leave_error_tokens() {
        let (tokens, diagnostics) = tokenize("/a#/'open");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].offset, 2);
        assert_eq!(diagnostics[1].message, "unterminated string literal");
        assert_eq!(tokens[2].kind, TokenKind::Error);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }
}
