//! Trigger predicates: small boolean expressions over model attributes.
//!
//! ```text
//! base:caps contains 'mot' or (mot:motion is supported and mot:motion = 'DETECTED')
//! ```
//!
//! A [`TriggerPredicate`] is compiled once (at startup) and evaluated many
//! times against [`Model`]s. Evaluation never fails: an attribute the model
//! does not have makes `contains`, `is supported`, `=` and the ordering
//! comparisons false, and `!=` true. `not` (or `!`) inverts the clause or
//! parenthesized group that follows it.

mod lexer;
mod parser;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use lexer::CompareOp;
pub use parser::Literal;

use crate::error::ParseError;
use crate::model::{AttributeValue, Model};
use parser::Expr;

/// A compiled trigger expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TriggerPredicate {
    source: String,
    expr: Expr,
}

impl TriggerPredicate {
    /// Compile predicate text. No partial compiles.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] with the byte offset of the first problem.
    pub fn compile(text: &str) -> Result<Self, ParseError> {
        let expr = parser::parse(text)?;
        Ok(Self {
            source: text.trim().to_string(),
            expr,
        })
    }

    /// The source text this predicate was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn matches(&self, model: &Model) -> bool {
        eval(&self.expr, model)
    }

    /// Every model that matches, in iteration order.
    pub fn select<'a, I>(&self, models: I) -> Vec<&'a Model>
    where
        I: IntoIterator<Item = &'a Model>,
    {
        models
            .into_iter()
            .filter(|model| self.matches(model))
            .collect()
    }

    pub fn select_first<'a, I>(&self, models: I) -> Option<&'a Model>
    where
        I: IntoIterator<Item = &'a Model>,
    {
        models.into_iter().find(|model| self.matches(model))
    }

    pub fn matches_any<'a, I>(&self, models: I) -> bool
    where
        I: IntoIterator<Item = &'a Model>,
    {
        models.into_iter().any(|model| self.matches(model))
    }

    /// True for an empty collection.
    pub fn matches_all<'a, I>(&self, models: I) -> bool
    where
        I: IntoIterator<Item = &'a Model>,
    {
        models.into_iter().all(|model| self.matches(model))
    }
}

impl fmt::Display for TriggerPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for TriggerPredicate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl TryFrom<String> for TriggerPredicate {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::compile(&value)
    }
}

impl From<TriggerPredicate> for String {
    fn from(value: TriggerPredicate) -> Self {
        value.source
    }
}

fn eval(expr: &Expr, model: &Model) -> bool {
    match expr {
        Expr::Or(terms) => terms.iter().any(|term| eval(term, model)),
        Expr::And(terms) => terms.iter().all(|term| eval(term, model)),
        Expr::Not(inner) => !eval(inner, model),
        Expr::Supported { attr } => model.get(attr).is_some(),
        Expr::Contains { attr, value } => match model.get(attr) {
            Some(AttributeValue::List(items)) => items.iter().any(|item| equals(item, value)),
            Some(scalar) => equals(scalar, value),
            None => false,
        },
        Expr::Compare { attr, op, value } => match model.get(attr) {
            None => *op == CompareOp::Ne,
            Some(actual) => compare(actual, *op, value),
        },
    }
}

fn compare(actual: &AttributeValue, op: CompareOp, expected: &Literal) -> bool {
    match op {
        CompareOp::Eq => equals(actual, expected),
        CompareOp::Ne => !equals(actual, expected),
        CompareOp::Lt => order(actual, expected) == Some(Ordering::Less),
        CompareOp::Le => matches!(
            order(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Gt => order(actual, expected) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            order(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn equals(actual: &AttributeValue, expected: &Literal) -> bool {
    match (actual, expected) {
        (AttributeValue::String(text), Literal::Str(literal)) => text == literal,
        (AttributeValue::Bool(flag), Literal::Str(literal)) => {
            literal.eq_ignore_ascii_case(if *flag { "true" } else { "false" })
        }
        (AttributeValue::List(_) | AttributeValue::Json(_), _)
        | (AttributeValue::Bool(_), Literal::Number(_)) => false,
        _ => order(actual, expected) == Some(Ordering::Equal),
    }
}

/// Numeric ordering when both sides are numeric, otherwise textual.
fn order(actual: &AttributeValue, expected: &Literal) -> Option<Ordering> {
    match expected {
        Literal::Number(number) => actual.as_f64()?.partial_cmp(number),
        Literal::Str(literal) => {
            let numeric = matches!(actual, AttributeValue::Int(_) | AttributeValue::Float(_));
            if numeric && let Ok(number) = literal.trim().parse::<f64>() {
                return actual.as_f64()?.partial_cmp(&number);
            }
            Some(actual.as_text()?.as_str().cmp(literal.as_str()))
        }
    }
}
