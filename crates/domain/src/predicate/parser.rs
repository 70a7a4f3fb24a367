//! Recursive-descent parser producing an [`Expr`] tree.
//!
//! `and` binds tighter than `or`, and `not`/`!` applies to the primary that
//! follows it. Keywords are case-insensitive.

use super::lexer::{CompareOp, Token, TokenKind, tokenize};
use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Contains {
        attr: String,
        value: Literal,
    },
    Supported {
        attr: String,
    },
    Compare {
        attr: String,
        op: CompareOp,
        value: Literal,
    },
}

pub(super) fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    if parser.peek().kind == TokenKind::Eof {
        return Err(ParseError::new(0, "empty expression"));
    }
    let expr = parser.parse_or()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(ParseError::new(trailing.offset, "unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // the token list always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Word(word) if word.eq_ignore_ascii_case(keyword))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.at_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(
                self.peek().offset,
                format!("expected `{keyword}`"),
            ))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut terms = vec![self.parse_and()?];
        while self.at_keyword("or") {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(flatten(terms, Expr::Or))
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut terms = vec![self.parse_primary()?];
        while self.at_keyword("and") {
            self.advance();
            terms.push(self.parse_primary()?);
        }
        Ok(flatten(terms, Expr::And))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                let closing = self.advance();
                if closing.kind != TokenKind::RParen {
                    return Err(ParseError::new(closing.offset, "expected `)`"));
                }
                Ok(inner)
            }
            TokenKind::Bang => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_primary()?)))
            }
            TokenKind::Word(word) if word.eq_ignore_ascii_case("not") => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_primary()?)))
            }
            TokenKind::Word(_) => self.parse_clause(),
            TokenKind::Eof => Err(ParseError::new(token.offset, "unexpected end of input")),
            _ => Err(ParseError::new(token.offset, "expected attribute or `(`")),
        }
    }

    fn parse_clause(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        let TokenKind::Word(attr) = token.kind else {
            return Err(ParseError::new(token.offset, "expected attribute"));
        };
        if is_keyword(&attr) || !is_attribute_name(&attr) {
            return Err(ParseError::new(
                token.offset,
                format!("expected attribute of the form `namespace:name`, found `{attr}`"),
            ));
        }

        if self.at_keyword("contains") {
            self.advance();
            let value = self.parse_literal()?;
            return Ok(Expr::Contains { attr, value });
        }

        if self.at_keyword("is") {
            self.advance();
            let negated = self.at_keyword("not");
            if negated {
                self.advance();
            }
            self.expect_keyword("supported")?;
            let supported = Expr::Supported { attr };
            return Ok(if negated {
                Expr::Not(Box::new(supported))
            } else {
                supported
            });
        }

        let next = self.advance();
        match next.kind {
            TokenKind::Op(op) => {
                let value = self.parse_literal()?;
                Ok(Expr::Compare { attr, op, value })
            }
            _ => Err(ParseError::new(
                next.offset,
                "expected `contains`, `is supported` or a comparison operator",
            )),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Str(text) => Ok(Literal::Str(text)),
            TokenKind::Number(value) => Ok(Literal::Number(value)),
            _ => Err(ParseError::new(
                token.offset,
                "expected quoted string or number",
            )),
        }
    }
}

fn flatten(mut terms: Vec<Expr>, wrap: fn(Vec<Expr>) -> Expr) -> Expr {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        wrap(terms)
    }
}

fn is_keyword(word: &str) -> bool {
    ["and", "or", "not", "contains", "is", "supported"]
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

/// `namespace:name` or `namespace:name:instance`, no empty segments.
fn is_attribute_name(word: &str) -> bool {
    let segments: Vec<&str> = word.split(':').collect();
    (2..=3).contains(&segments.len()) && segments.iter().all(|segment| !segment.is_empty())
}
