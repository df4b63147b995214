//! Per-stop variable-reference arena.
//!
//! DAP identifies expandable values (scopes, array/map containers, lazily
//! evaluated results) by small integer handles called `variablesReference`.
//! Handles are only valid while the debuggee is stopped: on `continue`/`next`/
//! `stepIn`/`stepOut` the whole table is invalidated in one O(1) step rather
//! than walked entry by entry.

use slab::Slab;

/// Allocates `variablesReference` handles for a single stop.
///
/// `0` is reserved by the protocol to mean "not expandable" and is never
/// handed out by [`VariableArena::insert`].
#[derive(Debug, Default)]
pub struct VariableArena<T> {
    slots: Slab<T>,
    /// Incremented on every `clear()`; lets callers detect a stale handle
    /// even if the slab index happens to be reused by a later stop.
    generation: u64,
}

/// A handle into a [`VariableArena`], tagged with the generation it was
/// issued under so a caller can detect staleness without consulting the
/// arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableHandle {
    pub reference: i64,
    pub generation: u64,
}

impl<T> VariableArena<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { slots: Slab::new(), generation: 0 }
    }

    /// Inserts a value, returning its protocol-facing reference (always >= 1).
    pub fn insert(&mut self, value: T) -> i64 {
        let key = self.slots.insert(value);
        i64::try_from(key).unwrap_or(i64::MAX) + 1
    }

    /// Inserts a value and returns a generation-tagged handle.
    pub fn insert_handle(&mut self, value: T) -> VariableHandle {
        VariableHandle { reference: self.insert(value), generation: self.generation }
    }

    /// Looks up a previously inserted value by its protocol reference.
    #[must_use]
    pub fn get(&self, reference: i64) -> Option<&T> {
        let key = usize::try_from(reference - 1).ok()?;
        self.slots.get(key)
    }

    #[must_use]
    pub fn get_mut(&mut self, reference: i64) -> Option<&mut T> {
        let key = usize::try_from(reference - 1).ok()?;
        self.slots.get_mut(key)
    }

    /// Returns true if `handle` was issued by the current generation and the
    /// slot it names is still present.
    #[must_use]
    pub fn is_current(&self, handle: VariableHandle) -> bool {
        handle.generation == self.generation && self.get(handle.reference).is_some()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bulk-invalidates every handle issued so far. O(1): drops the backing
    /// slab rather than freeing entries one at a time.
    pub fn clear(&mut self) {
        self.slots = Slab::new();
        self.generation = self.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_references_start_at_one() {
        let mut arena: VariableArena<&str> = VariableArena::new();
        let r1 = arena.insert("a");
        let r2 = arena.insert("b");
        assert_eq!(r1, 1);
        assert_eq!(r2, 2);
        assert_eq!(arena.get(r1), Some(&"a"));
        assert_eq!(arena.get(r2), Some(&"b"));
    }

    #[test]
    fn clear_invalidates_all_handles_in_one_step() {
        let mut arena: VariableArena<i32> = VariableArena::new();
        let r1 = arena.insert(10);
        assert!(arena.get(r1).is_some());

        arena.clear();

        assert!(arena.get(r1).is_none());
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn handle_generation_tracks_staleness_across_clears() {
        let mut arena: VariableArena<i32> = VariableArena::new();
        let handle = arena.insert_handle(1);
        assert!(arena.is_current(handle));

        arena.clear();
        // A fresh value may reuse the same slab slot...
        let _ = arena.insert(2);
        // ...but the old handle's generation no longer matches.
        assert!(!arena.is_current(handle));
    }

    #[test]
    fn unknown_reference_returns_none() {
        let arena: VariableArena<i32> = VariableArena::new();
        assert_eq!(arena.get(0), None);
        assert_eq!(arena.get(999), None);
    }
}
