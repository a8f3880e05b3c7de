//! Optimistic cart and wishlist state.
//!
//! Every mutation follows the same path:
//!
//! 1. compute the new collection with the pure algebra in `exaltride-core`
//! 2. publish it immediately to subscribers
//! 3. mirror it to the guest store while the shopper is a guest
//! 4. send the remote write from a detached task
//! 5. on failure, revert and publish exactly one [`Notice`]
//!
//! Quantity changes are debounced per product so that only the last value of
//! a burst is sent. Failures are never retried.

mod cart;
mod notice;
mod optimistic;
mod wishlist;

use std::future::Future;
use std::sync::Arc;

use exaltride_core::cart::InvalidLineItem;
use parking_lot::{RwLock, RwLockReadGuard};
use thiserror::Error;
use tokio_util::task::TaskTracker;

pub use cart::CartStore;
pub use notice::{Notice, Notices, Operation};
pub use optimistic::Versioned;
pub use wishlist::WishlistStore;

use crate::commerce::RequestAuth;
use crate::guest::GuestIdentity;

/// Errors returned synchronously by a mutation.
///
/// Remote failures are not errors here; they surface as a revert and a
/// [`Notice`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The mutation was rejected before it was attempted.
    #[error("invalid item: {0}")]
    Invalid(#[from] InvalidLineItem),
}

/// Where mutations are mirrored.
#[derive(Clone)]
pub enum SyncTarget {
    /// Guest: the guest store is authoritative. With anonymous sessions
    /// enabled, remote writes carry the guest identifier, minted on first use.
    Guest { identity: Option<GuestIdentity> },
    /// Logged in: remote writes carry the shopper's bearer token.
    Account(RequestAuth),
}

impl SyncTarget {
    /// Whether mutations are mirrored to the guest store.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest { .. })
    }

    /// Credential for remote writes, if any are made.
    #[must_use]
    pub fn remote_auth(&self) -> Option<RequestAuth> {
        match self {
            Self::Guest { identity } => identity
                .as_ref()
                .map(|identity| RequestAuth::GuestSession(identity.get_or_create())),
            Self::Account(auth) => Some(auth.clone()),
        }
    }
}

/// State shared by the cart and wishlist of one container: the sync target,
/// the detached-task tracker and the notice channel.
#[derive(Clone)]
pub struct SyncContext {
    target: Arc<RwLock<SyncTarget>>,
    tasks: TaskTracker,
    notices: Notices,
}

impl SyncContext {
    #[must_use]
    pub fn new(target: SyncTarget) -> Self {
        Self {
            target: Arc::new(RwLock::new(target)),
            tasks: TaskTracker::new(),
            notices: Notices::new(),
        }
    }

    #[must_use]
    pub fn target(&self) -> SyncTarget {
        self.target.read().clone()
    }

    pub(crate) fn set_target(&self, target: SyncTarget) {
        *self.target.write() = target;
    }

    /// Hold the target while a change is applied and mirrored, so that a
    /// switch cannot land between the two.
    pub(crate) fn hold_target(&self) -> RwLockReadGuard<'_, SyncTarget> {
        self.target.read()
    }

    /// Run `f` with no change in progress, then switch to `target` before
    /// the next change starts.
    pub(crate) fn switch_target<R>(&self, target: SyncTarget, f: impl FnOnce() -> R) -> R {
        let mut current = self.target.write();
        let result = f();
        *current = target;
        result
    }

    #[must_use]
    pub const fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Run a remote write in the background.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Number of background writes still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every background write (including pending debounces) to finish.
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}
