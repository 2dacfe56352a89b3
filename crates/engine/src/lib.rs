//! Spreadsheet engine: named cells, formulas over them, and dependency-ordered
//! recalculation with cycle rejection.

pub mod cell;
pub mod cell_id;
pub mod dep_graph;
pub mod error;
pub mod formula;
pub mod name;
pub mod recalc;
pub mod sheet;

pub use cell::{CellContents, CellValue};
pub use error::SheetError;
pub use formula::eval::FormulaError;
pub use formula::Formula;
pub use name::{is_cell_name, NameRules};
pub use sheet::{SharedSheet, Sheet, DEFAULT_VERSION};
