//! Specialized collection types

use std::ops::{Index, IndexMut};

/// Free list for object pooling
///
/// Indices stay valid until the item at that index is removed; removed slots
/// are reused by later insertions.
#[derive(Debug, Clone)]
pub struct FreeList<T> {
    items: Vec<Option<T>>,
    free_indices: Vec<usize>,
}

impl<T> FreeList<T> {
    /// Create a new free list
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    /// Insert an item and return its index
    pub fn insert(&mut self, item: T) -> usize {
        if let Some(index) = self.free_indices.pop() {
            self.items[index] = Some(item);
            index
        } else {
            let index = self.items.len();
            self.items.push(Some(item));
            index
        }
    }

    /// Remove an item by index
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.items.get_mut(index)?.take()?;
        self.free_indices.push(index);
        Some(item)
    }

    /// Get an item by index
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)?.as_ref()
    }

    /// Get a mutable reference to an item by index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)?.as_mut()
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.items.len() - self.free_indices.len()
    }

    /// True when no live items remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every item and forget all indices
    pub fn clear(&mut self) {
        self.items.clear();
        self.free_indices.clear();
    }
}

impl<T> Default for FreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for FreeList<T> {
    type Output = T;

    /// # Panics
    /// If the slot is out of range or free.
    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(item) => item,
            None => panic!("free list slot {index} is empty"),
        }
    }
}

impl<T> IndexMut<usize> for FreeList<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.get_mut(index) {
            Some(item) => item,
            None => panic!("free list slot {index} is empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_list_reuses_removed_slots() {
        let mut list = FreeList::new();
        let a = list.insert("a");
        let b = list.insert("b");

        assert_eq!(list.remove(a), Some("a"));
        assert_eq!(list.remove(a), None);

        let c = list.insert("c");
        assert_eq!(c, a);
        assert_eq!(list.get(b), Some(&"b"));
        assert_eq!(list.len(), 2);
        assert_eq!(list[c], "c");
    }

    #[test]
    #[should_panic(expected = "slot 1 is empty")]
    fn test_indexing_a_free_slot_panics() {
        let mut list = FreeList::new();
        list.insert(1);
        let b = list.insert(2);
        list.remove(b);
        let _ = list[b];
    }
}
