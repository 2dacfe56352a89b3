//! Cell identity for the store and the dependency graph.
//!
//! Cell names are interned into a `CellArena`, which hands out dense
//! `CellId` handles. The store and the graph are indexed by `CellId`, so
//! neither needs to hash strings on the hot recalculation path.

use rustc_hash::FxHashMap;

/// Dense handle for an interned (normalized) cell name.
///
/// Ids are never reused: once a name is interned it keeps its id for the
/// life of the arena, even if the cell is emptied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

impl CellId {
    /// Raw index into arena-backed storage.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Name ↔ id interner.
#[derive(Debug, Clone, Default)]
pub struct CellArena {
    names: Vec<String>,
    index: FxHashMap<String, CellId>,
}

impl CellArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an already-interned name.
    pub fn get(&self, name: &str) -> Option<CellId> {
        self.index.get(name).copied()
    }

    /// Intern `name`, returning its existing id if it was seen before.
    pub fn intern(&mut self, name: &str) -> CellId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = CellId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    /// The name behind an id.
    ///
    /// Ids only come from this arena, so the lookup cannot miss.
    pub fn name(&self, id: CellId) -> &str {
        &self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut arena = CellArena::new();
        let a1 = arena.intern("A1");
        let b1 = arena.intern("B1");
        assert_ne!(a1, b1);
        assert_eq!(arena.intern("A1"), a1);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_name_round_trip() {
        let mut arena = CellArena::new();
        let id = arena.intern("ZZ99");
        assert_eq!(arena.name(id), "ZZ99");
        assert_eq!(arena.get("ZZ99"), Some(id));
        assert_eq!(arena.get("A1"), None);
    }

    #[test]
    fn test_ids_are_dense() {
        let mut arena = CellArena::new();
        let ids: Vec<usize> = ["A1", "A2", "A3"].iter().map(|n| arena.intern(n).index()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_display() {
        let mut arena = CellArena::new();
        arena.intern("A1");
        let id = arena.intern("B7");
        assert_eq!(format!("{}", id), "#1");
    }
}
