//! Tokenizer for trigger predicate text.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum TokenKind {
    /// Bare word: an attribute name or a keyword.
    Word(String),
    Str(String),
    Number(f64),
    LParen,
    RParen,
    Op(CompareOp),
    /// A lone `!`.
    Bang,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.')
}

pub(super) fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match c {
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            '=' => {
                chars.next();
                // `=` and `==` are the same operator
                let _ = chars.next_if(|&(_, n)| n == '=');
                TokenKind::Op(CompareOp::Eq)
            }
            '!' => {
                chars.next();
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::Op(CompareOp::Ne)
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                chars.next();
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::Op(CompareOp::Le)
                } else {
                    TokenKind::Op(CompareOp::Lt)
                }
            }
            '>' => {
                chars.next();
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    TokenKind::Op(CompareOp::Ge)
                } else {
                    TokenKind::Op(CompareOp::Gt)
                }
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, n)) = chars.next() {
                    if n == c {
                        closed = true;
                        break;
                    }
                    if n == '\\' {
                        match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        }
                    } else {
                        text.push(n);
                    }
                }
                if !closed {
                    return Err(ParseError::new(offset, "unterminated string literal"));
                }
                TokenKind::Str(text)
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                while let Some((_, n)) = chars.next_if(|&(_, n)| n.is_ascii_digit() || n == '.') {
                    text.push(n);
                }
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ParseError::new(offset, format!("invalid number {text:?}")))?;
                TokenKind::Number(value)
            }
            c if is_word_char(c) => {
                let mut text = String::new();
                while let Some((_, n)) = chars.next_if(|&(_, n)| is_word_char(n)) {
                    text.push(n);
                }
                TokenKind::Word(text)
            }
            other => {
                return Err(ParseError::new(
                    offset,
                    format!("unexpected character {other:?}"),
                ));
            }
        };

        tokens.push(Token { kind, offset });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: source.len(),
    });
    Ok(tokens)
}
