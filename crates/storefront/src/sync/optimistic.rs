//! Versioned, observable collection with snapshot/revert.

use exaltride_core::{Keyed, ProductId, revert_keys};
use parking_lot::Mutex;
use tokio::sync::watch;

/// A published collection and the revision that produced it.
///
/// Every published change bumps the revision by one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub revision: u64,
    pub items: Vec<T>,
}

/// State before an optimistic change, and the revision the change produced.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint<T> {
    snapshot: Vec<T>,
    epoch: u64,
    base: u64,
    revision: u64,
}

impl<T> Checkpoint<T> {
    /// Revision of the snapshot.
    pub(crate) const fn base(&self) -> u64 {
        self.base
    }

    /// Keep this snapshot but treat a later change as the latest one it covers.
    ///
    /// Used when several coalesced changes share one baseline.
    pub(crate) fn extend_to(mut self, later: &Self) -> Self {
        self.revision = later.revision;
        self
    }
}

/// In-memory collection owned by one container.
///
/// Changes are applied and published under one lock, so subscribers see them
/// in call order. A wholesale [`replace`](Self::replace) starts a new epoch;
/// checkpoints from an earlier epoch no longer revert anything.
pub(crate) struct Optimistic<T> {
    state: Mutex<State<T>>,
    publisher: watch::Sender<Versioned<T>>,
}

struct State<T> {
    current: Versioned<T>,
    epoch: u64,
}

impl<T> Optimistic<T>
where
    T: Keyed + Clone + Send + Sync,
{
    pub(crate) fn new(items: Vec<T>) -> Self {
        let initial = Versioned { revision: 0, items };
        let (publisher, _) = watch::channel(initial.clone());
        Self {
            state: Mutex::new(State {
                current: initial,
                epoch: 0,
            }),
            publisher,
        }
    }

    pub(crate) fn items(&self) -> Vec<T> {
        self.state.lock().current.items.clone()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.state.lock().current.items)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Versioned<T>> {
        self.publisher.subscribe()
    }

    /// Apply a change and publish the result.
    pub(crate) fn apply<R>(&self, change: impl FnOnce(&mut Vec<T>) -> R) -> (Checkpoint<T>, R) {
        let mut state = self.state.lock();
        let snapshot = state.current.items.clone();
        let base = state.current.revision;
        let result = change(&mut state.current.items);
        self.publish(&mut state);

        let checkpoint = Checkpoint {
            snapshot,
            epoch: state.epoch,
            base,
            revision: state.current.revision,
        };
        (checkpoint, result)
    }

    /// Apply a follow-up change to an earlier one, unless the collection has
    /// been replaced since. Returns whether it was applied.
    pub(crate) fn follow_up(&self, checkpoint: &Checkpoint<T>, change: impl FnOnce(&mut Vec<T>)) -> bool {
        let mut state = self.state.lock();
        if state.epoch != checkpoint.epoch {
            return false;
        }
        change(&mut state.current.items);
        self.publish(&mut state);
        true
    }

    /// Replace the whole collection, starting a new epoch.
    pub(crate) fn replace(&self, items: Vec<T>) {
        let mut state = self.state.lock();
        state.current.items = items;
        state.epoch += 1;
        self.publish(&mut state);
    }

    /// Replace the whole collection with one derived from the current items,
    /// starting a new epoch. Returns the items it was derived from.
    pub(crate) fn replace_with(&self, derive: impl FnOnce(&[T]) -> Vec<T>) -> Vec<T> {
        let mut state = self.state.lock();
        let next = derive(&state.current.items);
        let previous = std::mem::replace(&mut state.current.items, next);
        state.epoch += 1;
        self.publish(&mut state);
        previous
    }

    /// Undo a failed change.
    ///
    /// If nothing else was published since, the snapshot is restored exactly;
    /// otherwise only `keys` are restored, keeping later changes to other keys.
    /// Returns `false` if the collection was replaced since the change.
    pub(crate) fn revert(&self, checkpoint: &Checkpoint<T>, keys: &[ProductId]) -> bool {
        let mut state = self.state.lock();
        if state.epoch != checkpoint.epoch {
            tracing::debug!("Collection replaced since the failed change, nothing to revert");
            return false;
        }

        if state.current.revision == checkpoint.revision {
            state.current.items.clone_from(&checkpoint.snapshot);
        } else {
            tracing::debug!(
                since = checkpoint.revision,
                now = state.current.revision,
                "Newer changes landed, reverting affected keys only"
            );
            revert_keys(&mut state.current.items, &checkpoint.snapshot, keys);
        }
        self.publish(&mut state);
        true
    }

    fn publish(&self, state: &mut State<T>) {
        state.current.revision += 1;
        self.publisher.send_replace(state.current.clone());
    }
}

#[cfg(test)]
mod tests {
    use exaltride_core::{CartLineItem, Price, cart};

    use super::*;

    fn line(id: &str, quantity: u32) -> CartLineItem {
        CartLineItem::new(id, format!("Product {id}"), Price::from_units(100), quantity)
    }

    #[test]
    fn test_apply_publishes_and_bumps_revision() {
        let state = Optimistic::new(vec![line("a", 1)]);
        let rx = state.subscribe();

        let (checkpoint, ()) = state.apply(|items| cart::add(items, line("b", 1)));

        assert_eq!(rx.borrow().revision, 1);
        assert_eq!(rx.borrow().items.len(), 2);
        assert_eq!(checkpoint.snapshot, vec![line("a", 1)]);
    }

    #[test]
    fn test_revert_restores_exact_snapshot() {
        let before = vec![line("a", 2), line("b", 1)];
        let state = Optimistic::new(before.clone());

        let (checkpoint, _) = state.apply(|items| cart::remove(items, &ProductId::new("a")));
        state.revert(&checkpoint, &[ProductId::new("a")]);

        assert_eq!(state.items(), before);
    }

    #[test]
    fn test_revert_keeps_later_changes_to_other_keys() {
        let state = Optimistic::new(vec![line("a", 1)]);

        let (failed, ()) = state.apply(|items| cart::add(items, line("b", 1)));
        state.apply(|items| cart::add(items, line("c", 1)));
        state.revert(&failed, &[ProductId::new("b")]);

        assert_eq!(state.items(), vec![line("a", 1), line("c", 1)]);
    }

    #[test]
    fn test_replace_invalidates_checkpoints() {
        let state = Optimistic::new(vec![line("a", 1)]);

        let (stale, ()) = state.apply(|items| cart::add(items, line("b", 1)));
        state.replace(Vec::new());

        assert!(!state.revert(&stale, &[ProductId::new("b")]));
        assert!(!state.follow_up(&stale, |items| items.push(line("c", 1))));
        assert!(state.items().is_empty());
    }

    #[test]
    fn test_replace_with_derives_from_current_items() {
        let state = Optimistic::new(vec![line("a", 1)]);
        let (stale, ()) = state.apply(|items| cart::add(items, line("b", 1)));

        let previous = state.replace_with(|items| cart::merge(&[line("a", 2)], items));

        assert_eq!(previous, vec![line("a", 1), line("b", 1)]);
        assert_eq!(state.items(), vec![line("a", 3), line("b", 1)]);
        assert!(!state.revert(&stale, &[ProductId::new("b")]));
    }

    #[test]
    fn test_extended_checkpoint_restores_baseline() {
        let state = Optimistic::new(vec![line("a", 5)]);
        let id = ProductId::new("a");

        let (first, _) = state.apply(|items| cart::set_quantity(items, &id, 6));
        let (second, _) = state.apply(|items| cart::set_quantity(items, &id, 7));
        state.revert(&first.extend_to(&second), &[id]);

        assert_eq!(state.items(), vec![line("a", 5)]);
    }
}
