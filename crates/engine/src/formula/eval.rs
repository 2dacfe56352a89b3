// Formula evaluator - walks a parsed expression against injected cell values

use std::fmt;

use super::parser::{canonical_number, Expr, Op};

/// Source of numeric values for formula variables.
///
/// Returns `None` when the named cell cannot supply a number: it does not
/// exist, is empty, holds text, or itself holds a formula error.
pub trait CellLookup {
    fn lookup(&self, name: &str) -> Option<f64>;
}

impl<F> CellLookup for F
where
    F: Fn(&str) -> Option<f64>,
{
    fn lookup(&self, name: &str) -> Option<f64> {
        self(name)
    }
}

/// Value-domain marker for a formula that could not be evaluated.
///
/// Stored as a cell's value, never returned as an edit failure. Carries only
/// a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaError {
    reason: String,
}

impl FormulaError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#ERROR ({})", self.reason)
    }
}

/// Evaluate `expr`. The result is canonicalized (`-0` folds to `0`).
pub fn evaluate(expr: &Expr, lookup: &dyn CellLookup) -> Result<f64, FormulaError> {
    let n = eval_inner(expr, lookup)?;
    if !n.is_finite() {
        return Err(FormulaError::new("result is not a finite number"));
    }
    Ok(canonical_number(n))
}

fn eval_inner(expr: &Expr, lookup: &dyn CellLookup) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Var(name) => lookup
            .lookup(name)
            .ok_or_else(|| FormulaError::new(format!("{} has no numeric value", name))),
        Expr::Neg(inner) => Ok(-eval_inner(inner, lookup)?),
        Expr::Chain { first, rest } => {
            let mut acc = eval_inner(first, lookup)?;
            for (op, operand) in rest {
                let r = eval_inner(operand, lookup)?;
                acc = match op {
                    Op::Add => acc + r,
                    Op::Sub => acc - r,
                    Op::Mul => acc * r,
                    Op::Div => {
                        if r == 0.0 {
                            return Err(FormulaError::new("division by zero"));
                        }
                        acc / r
                    }
                };
            }
            Ok(acc)
        }
    }
}
