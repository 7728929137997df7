//! Topology signature interning.
//!
//! Many actions across an episode reuse the same handful of bus-topology
//! configurations. Interning each distinct change vector under a small
//! integer id gives presentation code a compact identity to group, color,
//! and count configurations instead of carrying full vectors around.
//!
//! Equality is exact element-wise comparison. Two encodings of the same
//! physical topology (e.g. permuted bus-1/bus-2 labeling) get distinct ids;
//! see DESIGN.md for why this limitation is preserved.

use serde::{Deserialize, Serialize};

/// Append-only registry mapping distinct topology-change vectors to ids.
///
/// Two separate stores are maintained, one for "set_bus" style integer
/// vectors and one for "change_bus" style boolean vectors, because they
/// carry different action semantics. Ids are drawn from a single counter so
/// an id is unambiguous regardless of which store produced it.
///
/// Interning is not safe from multiple threads without external locking:
/// id assignment must stay deterministic and collision-free.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TopologyRegistry {
    set_vectors: Vec<(Vec<i32>, u32)>,
    change_vectors: Vec<(Vec<bool>, u32)>,
    next_id: u32,
}

impl TopologyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a "set_bus" style vector.
    ///
    /// Returns the existing id if an element-wise-equal vector was interned
    /// before, otherwise assigns the next sequential id. An all-zero vector
    /// is a no-op action and is never interned: the result is `None`.
    pub fn intern_set(&mut self, vector: &[i32]) -> Option<u32> {
        if vector.iter().all(|&v| v == 0) {
            return None;
        }
        if let Some((_, id)) = self
            .set_vectors
            .iter()
            .find(|(stored, _)| stored.as_slice() == vector)
        {
            return Some(*id);
        }
        let id = self.fresh_id();
        self.set_vectors.push((vector.to_vec(), id));
        Some(id)
    }

    /// Intern a "change_bus" style vector.
    ///
    /// Same contract as [`intern_set`](Self::intern_set); an all-false
    /// vector returns `None`.
    pub fn intern_change(&mut self, vector: &[bool]) -> Option<u32> {
        if !vector.iter().any(|&v| v) {
            return None;
        }
        if let Some((_, id)) = self
            .change_vectors
            .iter()
            .find(|(stored, _)| stored.as_slice() == vector)
        {
            return Some(*id);
        }
        let id = self.fresh_id();
        self.change_vectors.push((vector.to_vec(), id));
        Some(id)
    }

    /// Stored "set" vector for `id`, if that id came from the set store.
    pub fn set_vector(&self, id: u32) -> Option<&[i32]> {
        self.set_vectors
            .iter()
            .find(|(_, stored_id)| *stored_id == id)
            .map(|(vector, _)| vector.as_slice())
    }

    /// Stored "change" vector for `id`, if that id came from the change store.
    pub fn change_vector(&self, id: u32) -> Option<&[bool]> {
        self.change_vectors
            .iter()
            .find(|(_, stored_id)| *stored_id == id)
            .map(|(vector, _)| vector.as_slice())
    }

    /// Number of distinct signatures interned so far (both stores).
    pub fn len(&self) -> usize {
        self.set_vectors.len() + self.change_vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_deterministic() {
        let mut registry = TopologyRegistry::new();
        let first = registry.intern_set(&[1, 0, 2]);
        let second = registry.intern_set(&[1, 0, 2]);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_vectors_get_distinct_ids() {
        let mut registry = TopologyRegistry::new();
        let a = registry.intern_set(&[1, 0, 2]).unwrap();
        let b = registry.intern_set(&[1, 2, 0]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn noop_vectors_are_not_interned() {
        let mut registry = TopologyRegistry::new();
        assert_eq!(registry.intern_set(&[0, 0, 0]), None);
        assert_eq!(registry.intern_change(&[false, false]), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn set_and_change_stores_never_collide() {
        let mut registry = TopologyRegistry::new();
        let set_id = registry.intern_set(&[1, 2]).unwrap();
        let change_id = registry.intern_change(&[true, false]).unwrap();
        assert_ne!(set_id, change_id);
        assert!(registry.set_vector(set_id).is_some());
        assert!(registry.change_vector(change_id).is_some());
        assert!(registry.set_vector(change_id).is_none());
    }

    #[test]
    fn one_element_difference_is_a_new_signature() {
        let mut registry = TopologyRegistry::new();
        let a = registry.intern_set(&[1, 1, 2, 1]).unwrap();
        let b = registry.intern_set(&[1, 1, 2, 1]).unwrap();
        let c = registry.intern_set(&[1, 1, 2, 2]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.len(), 2);
    }
}
