use std::fmt;

use crate::formula::eval::FormulaError;
use crate::formula::parser::format_number;
use crate::formula::Formula;

/// What the user put in a cell.
///
/// Empty text is the empty cell: a cell never written and a cell set to `""`
/// are indistinguishable through the public surface.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContents {
    Text(String),
    Number(f64),
    Formula(Formula),
}

impl Default for CellContents {
    fn default() -> Self {
        CellContents::Text(String::new())
    }
}

impl CellContents {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellContents::Text(s) if s.is_empty())
    }

    pub fn as_formula(&self) -> Option<&Formula> {
        match self {
            CellContents::Formula(f) => Some(f),
            _ => None,
        }
    }

    /// Canonical input form: feeding this back into `set_contents_of_cell`
    /// reproduces equal contents.
    pub fn to_input(&self) -> String {
        match self {
            CellContents::Text(s) => s.clone(),
            CellContents::Number(n) => format_number(*n),
            CellContents::Formula(f) => format!("={}", f),
        }
    }
}

impl fmt::Display for CellContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_input())
    }
}

/// What a cell displays.
///
/// For text and number cells the value equals the contents. For formula
/// cells it is the evaluation result or a formula error.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Error(FormulaError),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Text(String::new())
    }
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => f.write_str(&format_number(*n)),
            CellValue::Error(e) => write!(f, "{}", e),
        }
    }
}

/// A stored cell. Replaced wholesale on every edit; only the value of a
/// formula cell is rewritten in place during propagation.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub name: String,
    pub contents: CellContents,
    pub value: CellValue,
}

impl Cell {
    pub fn text(name: String, text: String) -> Self {
        let value = CellValue::Text(text.clone());
        Self { name, contents: CellContents::Text(text), value }
    }

    pub fn number(name: String, n: f64) -> Self {
        Self { name, contents: CellContents::Number(n), value: CellValue::Number(n) }
    }

    pub fn formula(name: String, formula: Formula, value: CellValue) -> Self {
        Self { name, contents: CellContents::Formula(formula), value }
    }
}
