//! Collections keyed by product.
//!
//! Both the cart and the wishlist are ordered collections with at most one
//! entry per [`ProductId`]. The helpers here operate on either.

use super::id::ProductId;

/// An entry uniquely identified by its product within a collection.
pub trait Keyed {
    /// The product this entry belongs to.
    fn product_id(&self) -> &ProductId;
}

/// Find the position of a product in a keyed collection.
#[must_use]
pub fn position_of<T: Keyed>(items: &[T], product_id: &ProductId) -> Option<usize> {
    items.iter().position(|item| item.product_id() == product_id)
}

/// Restore the snapshot's entries for `keys` into `current`.
///
/// Used to undo a single failed operation without discarding mutations that
/// landed after it. For each key:
/// - present in the snapshot: the snapshot entry replaces the current one, or
///   is re-inserted at its snapshot position (clamped) if it was removed;
/// - absent from the snapshot: the current entry is removed.
///
/// Entries for keys not listed are left untouched.
pub fn revert_keys<T: Keyed + Clone>(current: &mut Vec<T>, snapshot: &[T], keys: &[ProductId]) {
    for key in keys {
        let before = snapshot
            .iter()
            .enumerate()
            .find(|(_, item)| item.product_id() == key);
        let now = position_of(current, key);

        match (before, now) {
            (Some((_, entry)), Some(idx)) => {
                if let Some(slot) = current.get_mut(idx) {
                    *slot = entry.clone();
                }
            }
            (Some((snapshot_idx, entry)), None) => {
                let idx = snapshot_idx.min(current.len());
                current.insert(idx, entry.clone());
            }
            (None, Some(idx)) => {
                current.remove(idx);
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Entry(ProductId, u32);

    impl Keyed for Entry {
        fn product_id(&self) -> &ProductId {
            &self.0
        }
    }

    fn entry(id: &str, n: u32) -> Entry {
        Entry(ProductId::new(id), n)
    }

    #[test]
    fn test_revert_restores_changed_entry() {
        let snapshot = vec![entry("a", 1), entry("b", 1)];
        let mut current = vec![entry("a", 5), entry("b", 1)];
        revert_keys(&mut current, &snapshot, &[ProductId::new("a")]);
        assert_eq!(current, snapshot);
    }

    #[test]
    fn test_revert_reinserts_removed_entry_at_original_position() {
        let snapshot = vec![entry("a", 1), entry("b", 2), entry("c", 3)];
        let mut current = vec![entry("a", 1), entry("c", 3)];
        revert_keys(&mut current, &snapshot, &[ProductId::new("b")]);
        assert_eq!(current, snapshot);
    }

    #[test]
    fn test_revert_removes_added_entry_and_keeps_later_changes() {
        let snapshot = vec![entry("a", 1)];
        // "n" was added by the failed op, "a" was bumped by a later op.
        let mut current = vec![entry("a", 4), entry("n", 1)];
        revert_keys(&mut current, &snapshot, &[ProductId::new("n")]);
        assert_eq!(current, vec![entry("a", 4)]);
    }

    #[test]
    fn test_revert_clamps_position_when_collection_shrank() {
        let snapshot = vec![entry("a", 1), entry("b", 1), entry("c", 1)];
        let mut current = vec![];
        revert_keys(&mut current, &snapshot, &[ProductId::new("c")]);
        assert_eq!(current, vec![entry("c", 1)]);
    }
}
