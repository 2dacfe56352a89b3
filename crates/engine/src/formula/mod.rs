// Formula parsing and evaluation

pub mod eval;
pub mod parser;

use std::fmt;

use rustc_hash::FxHashSet;

use crate::name::NameRules;
use eval::{CellLookup, FormulaError};
use parser::Expr;

/// An immutable, parsed formula.
///
/// Keeps the AST for evaluation, the canonical text (tokens joined without
/// whitespace, numbers in shortest form, variables normalized) and the
/// distinct variables in first-occurrence order. Two formulas are equal iff
/// their canonical text is equal.
#[derive(Debug, Clone)]
pub struct Formula {
    expr: Expr,
    text: String,
    variables: Vec<String>,
}

impl Formula {
    /// Parse formula text without the leading `=`.
    pub fn parse(input: &str, rules: &NameRules) -> Result<Self, String> {
        let (tokens, expr) = parser::parse(input, rules)?;

        let mut text = String::new();
        let mut variables: Vec<String> = Vec::new();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for token in &tokens {
            text.push_str(&token.canonical());
            if let parser::Token::Var(name) = token {
                if seen.insert(name.as_str()) {
                    variables.push(name.clone());
                }
            }
        }

        Ok(Self { expr, text, variables })
    }

    /// Distinct normalized cell names referenced by this formula.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, lookup: &dyn CellLookup) -> Result<f64, FormulaError> {
        eval::evaluate(&self.expr, lookup)
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
