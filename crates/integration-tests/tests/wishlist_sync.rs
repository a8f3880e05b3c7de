//! Integration tests for wishlist toggles.

use exaltride_core::{ProductId, WishlistItem};
use exaltride_integration_tests::{FakeCommerce, account_device, entry, guest_device};
use exaltride_storefront::guest::GuestWishlist;
use exaltride_storefront::sync::Operation;

#[tokio::test]
async fn test_toggle_twice_restores_guest_wishlist() {
    let fake = FakeCommerce::new();
    let (storefront, storage) = guest_device(&fake).await;
    assert_eq!(storefront.wishlist().toggle(entry("a")).ok(), Some(true));
    let before = storefront.wishlist().items();

    assert_eq!(storefront.wishlist().toggle(entry("b")).ok(), Some(true));
    assert_eq!(storefront.wishlist().toggle(entry("b")).ok(), Some(false));

    assert_eq!(storefront.wishlist().items(), before);
    assert_eq!(GuestWishlist::new(storage).read(), before);
}

#[tokio::test]
async fn test_toggle_twice_restores_account_wishlist() {
    let fake = FakeCommerce::with_account(Vec::new(), vec![entry("a")]);
    let storefront = account_device(&fake).await;
    let before = storefront.wishlist().items();

    assert_eq!(storefront.wishlist().toggle(entry("b")).ok(), Some(true));
    assert_eq!(storefront.wishlist().toggle(entry("b")).ok(), Some(false));
    storefront.settle().await;

    assert_eq!(storefront.wishlist().items(), before);
    assert_eq!(fake.calls(), vec!["toggle b".to_string(), "toggle b".to_string()]);
}

#[tokio::test]
async fn test_offline_toggle_is_shown_then_reverted_with_one_notice() {
    let fake = FakeCommerce::new();
    let storefront = account_device(&fake).await;
    fake.set_offline(true);
    let id = ProductId::new("p9");

    assert_eq!(storefront.wishlist().toggle(entry("p9")).ok(), Some(true));
    assert!(storefront.wishlist().contains(&id));

    storefront.settle().await;

    assert!(!storefront.wishlist().contains(&id));
    let notices = storefront.notices().take_pending();
    assert_eq!(notices.len(), 1);
    let notice = notices.first();
    assert_eq!(notice.map(|n| n.operation), Some(Operation::ToggleWishlist));
    assert_eq!(notice.and_then(|n| n.product_id.clone()), Some(id));
}

#[tokio::test]
async fn test_bare_toggle_reuses_known_details() {
    let fake = FakeCommerce::new();
    let (storefront, _) = guest_device(&fake).await;

    assert_eq!(storefront.wishlist().toggle(entry("a")).ok(), Some(true));
    assert_eq!(storefront.wishlist().toggle(WishlistItem::bare("a")).ok(), Some(false));
    assert_eq!(storefront.wishlist().toggle(WishlistItem::bare("a")).ok(), Some(true));

    assert_eq!(storefront.wishlist().items(), vec![entry("a")]);
}
