//! Dependency graph for formula cells.
//!
//! Tracks precedents (cells a formula reads) and dependents (cells whose
//! formula reads a given cell). The graph knows nothing about formulas; the
//! sheet feeds it the variable set of each formula as it is committed.
//!
//! # Edge Direction
//!
//! ```text
//! B → A  means  "B depends on A"  (A is a precedent of B, B a dependent of A)
//! ```
//!
//! Both directions are stored so either lookup is O(degree). Cycle detection
//! is not a property of the graph alone; see [`crate::recalc`].

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell_id::CellId;

/// Bidirectional adjacency over arena cell ids.
///
/// - `preds[B]` = cells that B depends on (forward edges)
/// - `succs[A]` = cells that depend on A (reverse edges)
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** If A ∈ preds[B] then B ∈ succs[A], and vice versa.
/// 2. **No dangling entries:** Empty sets are removed, not stored.
/// 3. **No duplicate edges:** Set semantics enforced by FxHashSet.
/// 4. **Atomic updates:** `replace_edges` is the only mutator that touches both maps.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    preds: FxHashMap<CellId, FxHashSet<CellId>>,
    succs: FxHashMap<CellId, FxHashSet<CellId>>,
    edges: usize,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells this cell's formula references.
    pub fn precedents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.preds
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Cells whose formula directly references this cell.
    pub fn dependents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.succs
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// True if some formula references `cell`.
    pub fn has_dependents(&self, cell: CellId) -> bool {
        self.succs.contains_key(&cell)
    }

    /// True if `cell` holds a formula with at least one reference.
    pub fn has_dependees(&self, cell: CellId) -> bool {
        self.preds.contains_key(&cell)
    }

    /// Total number of (dependent, precedent) pairs.
    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// Replace the forward edge set of `cell` atomically.
    ///
    /// 1. Removes `cell` from all its old precedents' dependent sets
    /// 2. Clears the cell's precedent set
    /// 3. Adds `cell` to all new precedents' dependent sets
    /// 4. Stores the new precedent set
    ///
    /// Pass an empty set to clear all edges for this cell. The caller holds
    /// the same exclusive scope it uses for the matching cell update, so no
    /// reader observes the intermediate state.
    pub fn replace_edges(&mut self, cell: CellId, new_preds: FxHashSet<CellId>) {
        if let Some(old_preds) = self.preds.remove(&cell) {
            self.edges -= old_preds.len();
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&cell);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        if new_preds.is_empty() {
            return;
        }

        for pred in &new_preds {
            self.succs.entry(*pred).or_default().insert(cell);
        }
        self.edges += new_preds.len();
        self.preds.insert(cell, new_preds);
    }

    /// Clear all forward edges for a cell (its contents stopped being a formula).
    pub fn clear_cell(&mut self, cell: CellId) {
        self.replace_edges(cell, FxHashSet::default());
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (cell, preds) in &self.preds {
            assert!(!preds.is_empty(), "Empty preds set stored for {:?}", cell);
            for pred in preds {
                assert!(
                    self.succs.get(pred).is_some_and(|s| s.contains(cell)),
                    "Missing succ edge: {:?} should have {:?} in dependents",
                    pred,
                    cell
                );
            }
        }

        for (cell, dependents) in &self.succs {
            assert!(!dependents.is_empty(), "Empty succs set stored for {:?}", cell);
            for dep in dependents {
                assert!(
                    self.preds.get(dep).is_some_and(|s| s.contains(cell)),
                    "Missing pred edge: {:?} should have {:?} in precedents",
                    dep,
                    cell
                );
            }
        }

        let counted: usize = self.preds.values().map(|s| s.len()).sum();
        assert_eq!(counted, self.edges, "Edge counter drifted");
    }
}
