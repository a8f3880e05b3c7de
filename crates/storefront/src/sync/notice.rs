//! Transient, user-visible notices about failed background syncs.

use std::collections::VecDeque;
use std::sync::Arc;

use exaltride_core::ProductId;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

/// Notices kept for request/response consumers that are not subscribed.
const PENDING_CAPACITY: usize = 32;

/// The operation a notice reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    AddToCart,
    UpdateQuantity,
    RemoveFromCart,
    ClearCart,
    ToggleWishlist,
}

impl Operation {
    const fn message(self) -> &'static str {
        match self {
            Self::AddToCart => "Couldn't add the item to your cart. Please try again.",
            Self::UpdateQuantity => "Couldn't update the quantity. Please try again.",
            Self::RemoveFromCart => "Couldn't remove the item from your cart. Please try again.",
            Self::ClearCart => "Couldn't clear your cart. Please try again.",
            Self::ToggleWishlist => "Couldn't update your wishlist. Please try again.",
        }
    }
}

/// A failed operation whose optimistic change has been reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn failed(operation: Operation, product_id: Option<ProductId>) -> Self {
        Self {
            operation,
            product_id,
            message: operation.message().to_string(),
        }
    }
}

/// Fan-out of notices to live subscribers, plus a bounded queue for
/// consumers that poll.
#[derive(Clone)]
pub struct Notices {
    inner: Arc<NoticesInner>,
}

struct NoticesInner {
    sender: broadcast::Sender<Notice>,
    pending: Mutex<VecDeque<Notice>>,
}

impl Notices {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(PENDING_CAPACITY);
        Self {
            inner: Arc::new(NoticesInner {
                sender,
                pending: Mutex::new(VecDeque::with_capacity(PENDING_CAPACITY)),
            }),
        }
    }

    /// Publish a notice.
    pub fn publish(&self, notice: Notice) {
        tracing::info!(operation = ?notice.operation, product_id = ?notice.product_id, "Sync notice");

        {
            let mut pending = self.inner.pending.lock();
            if pending.len() == PENDING_CAPACITY {
                pending.pop_front();
            }
            pending.push_back(notice.clone());
        }

        self.inner.sender.send(notice).ok();
    }

    /// Subscribe to notices published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.inner.sender.subscribe()
    }

    /// Drain the notices not yet taken.
    #[must_use]
    pub fn take_pending(&self) -> Vec<Notice> {
        self.inner.pending.lock().drain(..).collect()
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_pending_drains() {
        let notices = Notices::new();
        notices.publish(Notice::failed(Operation::AddToCart, Some(ProductId::new("p1"))));
        notices.publish(Notice::failed(Operation::ClearCart, None));

        let taken = notices.take_pending();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken.first().map(|n| n.operation), Some(Operation::AddToCart));
        assert!(notices.take_pending().is_empty());
    }

    #[test]
    fn test_pending_is_bounded() {
        let notices = Notices::new();
        for _ in 0..PENDING_CAPACITY + 5 {
            notices.publish(Notice::failed(Operation::ToggleWishlist, None));
        }
        assert_eq!(notices.take_pending().len(), PENDING_CAPACITY);
    }

    #[tokio::test]
    async fn test_subscribers_receive_notices() {
        let notices = Notices::new();
        let mut rx = notices.subscribe();
        notices.publish(Notice::failed(Operation::RemoveFromCart, None));
        let received = rx.recv().await;
        assert_eq!(received.map(|n| n.operation).ok(), Some(Operation::RemoveFromCart));
    }

    #[test]
    fn test_notice_serializes_snake_case() {
        let json = serde_json::to_value(Notice::failed(Operation::UpdateQuantity, None)).unwrap_or_default();
        assert_eq!(json.get("operation"), Some(&serde_json::json!("update_quantity")));
        assert!(json.get("product_id").is_none());
    }
}
