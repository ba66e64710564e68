//! Indexed priority queue over grid cells.
//!
//! The queue keeps its entries in an arena of doubly-linked nodes sorted
//! ascending by key, with a dense coordinate-to-node map on the side. That
//! layout gives O(1) membership tests and key lookups and an O(1) unlink for
//! decrease-key, at the price of a linear walk to find the insertion point.
//! Search frontiers stay small and nearly sorted, so the walk is short in
//! practice.

use std::collections::HashMap;

use gridroute_core::GridCoord;

/// Ordering contract for queue keys. `improves` must be a strict
/// "better than" so equal keys keep their insertion order.
pub trait QueueKey: Copy {
    /// Reports whether `self` should be popped strictly before `other`.
    fn improves(&self, other: &Self) -> bool;
}

/// Plain distance key for Dijkstra expansion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistKey(u32);

impl DistKey {
    /// Distance of an unreached node.
    pub const INFINITE: DistKey = DistKey(u32::MAX);

    /// Wraps a finite distance.
    #[must_use]
    pub const fn new(distance: u32) -> Self {
        Self(distance)
    }

    /// Numeric distance value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Reports whether the node has never been reached.
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        self.0 == u32::MAX
    }
}

impl QueueKey for DistKey {
    fn improves(&self, other: &Self) -> bool {
        self.0 < other.0
    }
}

/// Composite A* key: total estimate first, heuristic as the tie-break, so
/// among equally promising nodes the one closer to the goal is expanded
/// first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoredKey {
    f: u32,
    h: u32,
}

impl ScoredKey {
    /// Builds a key from a total estimate and its heuristic component.
    #[must_use]
    pub const fn new(f: u32, h: u32) -> Self {
        Self { f, h }
    }
}

impl QueueKey for ScoredKey {
    fn improves(&self, other: &Self) -> bool {
        self.f < other.f || (self.f == other.f && self.h < other.h)
    }
}

#[derive(Clone, Debug)]
struct Entry<K> {
    coord: GridCoord,
    key: K,
    prev: Option<usize>,
    next: Option<usize>,
    linked: bool,
}

/// Sorted queue of grid cells keyed by `K`.
#[derive(Clone, Debug)]
pub struct IndexedQueue<K> {
    arena: Vec<Entry<K>>,
    index: HashMap<GridCoord, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: QueueKey> IndexedQueue<K> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    /// Reports whether no cell is waiting to be popped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Key currently associated with a cell, linked or already popped.
    #[must_use]
    pub fn key_of(&self, coord: GridCoord) -> Option<K> {
        self.index.get(&coord).map(|&slot| self.arena[slot].key)
    }

    /// Appends a cell at the tail without searching for a sorted slot. Only
    /// valid for keys that sort at or after the current tail, such as the
    /// infinite distance used to seed a Dijkstra frontier.
    pub fn push_back(&mut self, coord: GridCoord, key: K) {
        if self.index.contains_key(&coord) {
            return;
        }
        let slot = self.allocate(coord, key);
        self.link_before(slot, None);
    }

    /// Inserts a cell, or re-keys it when the new key improves on the
    /// recorded one. Returns true when the queue accepted the key, which is
    /// the signal to relink the cell's predecessor.
    pub fn process(&mut self, coord: GridCoord, key: K) -> bool {
        match self.index.get(&coord).copied() {
            Some(slot) => {
                if !key.improves(&self.arena[slot].key) {
                    return false;
                }
                self.arena[slot].key = key;
                if self.arena[slot].linked {
                    self.unlink(slot);
                }
                // An already popped cell re-enters the list here.
                let at = self.sorted_slot(key);
                self.link_before(slot, at);
                true
            }
            None => {
                let slot = self.allocate(coord, key);
                let at = self.sorted_slot(key);
                self.link_before(slot, at);
                true
            }
        }
    }

    /// Removes and returns the cell with the best key.
    pub fn pop_min(&mut self) -> Option<(GridCoord, K)> {
        let slot = self.head?;
        self.unlink(slot);
        Some((self.arena[slot].coord, self.arena[slot].key))
    }

    fn allocate(&mut self, coord: GridCoord, key: K) -> usize {
        let slot = self.arena.len();
        self.arena.push(Entry {
            coord,
            key,
            prev: None,
            next: None,
            linked: false,
        });
        let _ = self.index.insert(coord, slot);
        slot
    }

    /// First linked slot whose key the new key improves on.
    fn sorted_slot(&self, key: K) -> Option<usize> {
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            if key.improves(&self.arena[slot].key) {
                return Some(slot);
            }
            cursor = self.arena[slot].next;
        }
        None
    }

    fn link_before(&mut self, slot: usize, at: Option<usize>) {
        match at {
            Some(next) => {
                let prev = self.arena[next].prev;
                self.arena[slot].prev = prev;
                self.arena[slot].next = Some(next);
                self.arena[next].prev = Some(slot);
                match prev {
                    Some(prev) => self.arena[prev].next = Some(slot),
                    None => self.head = Some(slot),
                }
            }
            None => {
                self.arena[slot].prev = self.tail;
                self.arena[slot].next = None;
                match self.tail {
                    Some(tail) => self.arena[tail].next = Some(slot),
                    None => self.head = Some(slot),
                }
                self.tail = Some(slot);
            }
        }
        self.arena[slot].linked = true;
    }

    fn unlink(&mut self, slot: usize) {
        let prev = self.arena[slot].prev;
        let next = self.arena[slot].next;
        match prev {
            Some(prev) => self.arena[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.arena[next].prev = prev,
            None => self.tail = prev,
        }
        self.arena[slot].prev = None;
        self.arena[slot].next = None;
        self.arena[slot].linked = false;
    }
}

impl<K: QueueKey> Default for IndexedQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut IndexedQueue<DistKey>) -> Vec<(GridCoord, u32)> {
        let mut order = Vec::new();
        while let Some((coord, key)) = queue.pop_min() {
            order.push((coord, key.get()));
        }
        order
    }

    #[test]
    fn pops_in_ascending_key_order() {
        let mut queue = IndexedQueue::new();
        assert!(queue.process(GridCoord::new(0, 0), DistKey::new(30)));
        assert!(queue.process(GridCoord::new(1, 0), DistKey::new(10)));
        assert!(queue.process(GridCoord::new(2, 0), DistKey::new(20)));
        assert_eq!(
            drain(&mut queue),
            vec![
                (GridCoord::new(1, 0), 10),
                (GridCoord::new(2, 0), 20),
                (GridCoord::new(0, 0), 30),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn decrease_key_moves_a_cell_forward() {
        let mut queue = IndexedQueue::new();
        let _ = queue.process(GridCoord::new(0, 0), DistKey::new(10));
        let _ = queue.process(GridCoord::new(1, 0), DistKey::new(50));
        assert!(queue.process(GridCoord::new(1, 0), DistKey::new(5)));
        assert_eq!(queue.pop_min(), Some((GridCoord::new(1, 0), DistKey::new(5))));
    }

    #[test]
    fn worse_keys_are_refused() {
        let mut queue = IndexedQueue::new();
        let _ = queue.process(GridCoord::new(0, 0), DistKey::new(10));
        assert!(!queue.process(GridCoord::new(0, 0), DistKey::new(10)));
        assert!(!queue.process(GridCoord::new(0, 0), DistKey::new(25)));
        assert_eq!(queue.key_of(GridCoord::new(0, 0)), Some(DistKey::new(10)));
    }

    #[test]
    fn keys_survive_popping() {
        let mut queue = IndexedQueue::new();
        let _ = queue.process(GridCoord::new(0, 0), DistKey::new(10));
        assert_eq!(queue.pop_min(), Some((GridCoord::new(0, 0), DistKey::new(10))));
        assert_eq!(queue.key_of(GridCoord::new(0, 0)), Some(DistKey::new(10)));
        // A better key can still re-queue the popped cell.
        assert!(queue.process(GridCoord::new(0, 0), DistKey::new(3)));
        assert!(!queue.is_empty());
        assert_eq!(queue.pop_min(), Some((GridCoord::new(0, 0), DistKey::new(3))));
        assert!(queue.is_empty());
    }

    #[test]
    fn requeued_cells_rejoin_the_sorted_order() {
        let mut queue = IndexedQueue::new();
        let _ = queue.process(GridCoord::new(0, 0), DistKey::new(30));
        let _ = queue.process(GridCoord::new(1, 0), DistKey::new(20));
        let _ = queue.process(GridCoord::new(2, 0), DistKey::new(40));
        assert_eq!(queue.pop_min(), Some((GridCoord::new(1, 0), DistKey::new(20))));
        // A re-queue must still improve on the recorded key.
        assert!(!queue.process(GridCoord::new(1, 0), DistKey::new(35)));
        assert!(queue.process(GridCoord::new(1, 0), DistKey::new(15)));
        assert_eq!(
            drain(&mut queue),
            vec![
                (GridCoord::new(1, 0), 15),
                (GridCoord::new(0, 0), 30),
                (GridCoord::new(2, 0), 40),
            ]
        );
    }

    #[test]
    fn push_back_seeds_an_unsorted_tail() {
        let mut queue = IndexedQueue::new();
        for x in 0..4 {
            queue.push_back(GridCoord::new(x, 0), DistKey::INFINITE);
        }
        assert!(queue.process(GridCoord::new(2, 0), DistKey::new(0)));
        assert_eq!(queue.pop_min(), Some((GridCoord::new(2, 0), DistKey::new(0))));
    }

    #[test]
    fn scored_keys_break_ties_on_the_heuristic() {
        let mut queue = IndexedQueue::new();
        let _ = queue.process(GridCoord::new(0, 0), ScoredKey::new(40, 30));
        let _ = queue.process(GridCoord::new(1, 0), ScoredKey::new(40, 10));
        let _ = queue.process(GridCoord::new(2, 0), ScoredKey::new(38, 38));
        assert_eq!(queue.pop_min().map(|(coord, _)| coord), Some(GridCoord::new(2, 0)));
        assert_eq!(queue.pop_min().map(|(coord, _)| coord), Some(GridCoord::new(1, 0)));
        assert_eq!(queue.pop_min().map(|(coord, _)| coord), Some(GridCoord::new(0, 0)));
    }
}
