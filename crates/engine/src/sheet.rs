//! The sheet: cell store, dependency graph and the edit-and-propagate pipeline.
//!
//! A `Sheet` has no internal locking. Callers that share one between threads
//! wrap it in [`SharedSheet`] and hold the lock for a whole edit or query.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::cell::{Cell, CellContents, CellValue};
use crate::cell_id::{CellArena, CellId};
use crate::dep_graph::DepGraph;
use crate::error::SheetError;
use crate::formula::parser::canonical_number;
use crate::formula::Formula;
use crate::name::NameRules;
use crate::recalc::{affected_cells, RecalcReport};

/// A sheet behind the single lock that guards its store and graph together.
pub type SharedSheet = Arc<Mutex<Sheet>>;

/// Version string used when the embedding application does not supply one.
pub const DEFAULT_VERSION: &str = "default";

/// Classified edit input, before anything is committed.
enum Input {
    Text(String),
    Number(f64),
    Formula(Formula),
}

#[derive(Debug, Clone)]
pub struct Sheet {
    rules: NameRules,
    version: String,
    arena: CellArena,
    /// Indexed by `CellId`. `None` means never written.
    cells: Vec<Option<Cell>>,
    /// Cells in the order they were first written.
    order: Vec<CellId>,
    graph: DepGraph,
    changed: bool,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Sheet {
    /// Empty sheet with identity normalization and no extra name validation.
    pub fn new() -> Self {
        Self::with_rules(NameRules::default(), DEFAULT_VERSION)
    }

    pub fn with_rules(rules: NameRules, version: impl Into<String>) -> Self {
        Self {
            rules,
            version: version.into(),
            arena: CellArena::new(),
            cells: Vec::new(),
            order: Vec::new(),
            graph: DepGraph::new(),
            changed: false,
        }
    }

    pub fn into_shared(self) -> SharedSheet {
        Arc::new(Mutex::new(self))
    }

    pub fn rules(&self) -> &NameRules {
        &self.rules
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// True if the sheet was edited since it was created, loaded or saved.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_saved(&mut self) {
        self.changed = false;
    }

    /// Set the contents of `name` and recompute everything that depends on it.
    ///
    /// `input` is classified as a number if it parses as a finite float, as a
    /// formula if it starts with `=`, and as text otherwise. Returns the
    /// affected set: `name` first, then every transitive dependent in an order
    /// where each cell follows the cells it reads from.
    ///
    /// On error nothing has changed.
    pub fn set_contents_of_cell(&mut self, name: &str, input: &str) -> Result<Vec<String>, SheetError> {
        let name = self.resolve(name)?;
        if input.contains('\n') || input.contains('\r') {
            return Err(SheetError::InvalidContent(format!(
                "contents of {} contain a line break",
                name
            )));
        }

        let parsed = self.classify(input)?;
        let start = Instant::now();

        // Affected set on the pre-edit graph. A cell's dependents are not
        // changed by rewriting its own formula, so the order stays valid
        // after the commit below.
        let affected: Vec<CellId> = match self.arena.get(&name) {
            Some(id) => affected_cells(&self.graph, id).map_err(|cycle| {
                let via = cycle
                    .path
                    .last()
                    .map(|c| self.arena.name(*c).to_string())
                    .unwrap_or_else(|| name.clone());
                SheetError::CircularDependency { cell: name.clone(), via }
            })?,
            None => Vec::new(),
        };

        if let Input::Formula(formula) = &parsed {
            for var in formula.variables() {
                let closes_cycle = *var == name
                    || self
                        .arena
                        .get(var)
                        .is_some_and(|id| affected.contains(&id));
                if closes_cycle {
                    return Err(SheetError::CircularDependency {
                        cell: name.clone(),
                        via: var.clone(),
                    });
                }
            }
        }

        let id = self.arena.intern(&name);
        let cell = match parsed {
            Input::Text(text) => {
                self.graph.clear_cell(id);
                Cell::text(name.clone(), text)
            }
            Input::Number(n) => {
                self.graph.clear_cell(id);
                Cell::number(name.clone(), n)
            }
            Input::Formula(formula) => {
                let preds: FxHashSet<CellId> = formula
                    .variables()
                    .iter()
                    .map(|var| self.arena.intern(var))
                    .collect();
                self.graph.replace_edges(id, preds);
                let value = self.evaluate(&formula);
                Cell::formula(name.clone(), formula, value)
            }
        };
        self.store(id, cell);

        let mut report = RecalcReport {
            affected: affected.len().max(1),
            ..Default::default()
        };
        for dep in affected.iter().skip(1) {
            let value = match self.cell(*dep).and_then(|c| c.contents.as_formula()) {
                Some(formula) => self.evaluate(formula),
                None => continue,
            };
            report.cells_recomputed += 1;
            if value.is_error() {
                report.errors += 1;
            }
            if let Some(Some(cell)) = self.cells.get_mut(dep.index()) {
                cell.value = value;
            }
        }
        report.duration_us = start.elapsed().as_micros() as u64;
        log::debug!("{}", report.log_line(&name));

        self.changed = true;

        if affected.is_empty() {
            return Ok(vec![name]);
        }
        Ok(affected
            .into_iter()
            .map(|c| self.arena.name(c).to_string())
            .collect())
    }

    /// Contents of `name`; empty text if the cell was never written.
    pub fn get_cell_contents(&self, name: &str) -> Result<CellContents, SheetError> {
        let name = self.resolve(name)?;
        Ok(self
            .lookup(&name)
            .map(|c| c.contents.clone())
            .unwrap_or_default())
    }

    /// Value of `name`; empty text if the cell was never written.
    pub fn get_cell_value(&self, name: &str) -> Result<CellValue, SheetError> {
        let name = self.resolve(name)?;
        Ok(self
            .lookup(&name)
            .map(|c| c.value.clone())
            .unwrap_or_default())
    }

    /// Names of all cells with non-empty contents, in first-written order.
    pub fn nonempty_cells(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|id| self.cell(*id))
            .filter(|c| !c.contents.is_empty())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Cells whose formulas reference `name` directly, sorted by name.
    pub fn direct_dependents(&self, name: &str) -> Result<Vec<String>, SheetError> {
        let name = self.resolve(name)?;
        let Some(id) = self.arena.get(&name) else {
            return Ok(Vec::new());
        };
        let mut names: Vec<String> = self
            .graph
            .dependents(id)
            .map(|d| self.arena.name(d).to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    fn resolve(&self, name: &str) -> Result<String, SheetError> {
        self.rules
            .resolve(name)
            .ok_or_else(|| SheetError::InvalidName(name.to_string()))
    }

    fn classify(&self, input: &str) -> Result<Input, SheetError> {
        if let Ok(n) = input.trim().parse::<f64>() {
            if n.is_finite() && !input.trim().is_empty() {
                return Ok(Input::Number(canonical_number(n)));
            }
        }
        if let Some(rest) = input.strip_prefix('=') {
            return Formula::parse(rest, &self.rules)
                .map(Input::Formula)
                .map_err(SheetError::FormulaParse);
        }
        Ok(Input::Text(input.to_string()))
    }

    fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.index()).and_then(|c| c.as_ref())
    }

    fn lookup(&self, name: &str) -> Option<&Cell> {
        self.arena.get(name).and_then(|id| self.cell(id))
    }

    fn store(&mut self, id: CellId, cell: Cell) {
        let idx = id.index();
        if self.cells.len() <= idx {
            self.cells.resize(idx + 1, None);
        }
        if self.cells[idx].is_none() {
            self.order.push(id);
        }
        self.cells[idx] = Some(cell);
    }

    fn evaluate(&self, formula: &Formula) -> CellValue {
        let lookup = |var: &str| self.lookup(var).and_then(|c| c.value.as_number());
        match formula.evaluate(&lookup) {
            Ok(n) => CellValue::Number(n),
            Err(e) => CellValue::Error(e),
        }
    }
}
