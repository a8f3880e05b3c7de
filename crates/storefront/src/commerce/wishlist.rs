//! Remote wishlist endpoints.

use async_trait::async_trait;
use exaltride_core::{GuestId, ProductId, WishlistItem};
use serde::Serialize;
use tracing::instrument;

use super::{CommerceClient, CommerceError, RequestAuth, WishlistApi, records};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToggleBody<'a> {
    product_id: &'a ProductId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeBody<'a> {
    guest_id: &'a GuestId,
}

#[async_trait]
impl WishlistApi for CommerceClient {
    #[instrument(skip(self))]
    async fn list(&self, auth: Option<&RequestAuth>) -> Result<Vec<WishlistItem>, CommerceError> {
        let Some(auth) = auth else {
            tracing::debug!("No credential, skipping remote wishlist fetch");
            return Ok(Vec::new());
        };

        let request = auth.apply(self.inner.client.get(self.url(&["wishlist", "list"])));
        let body = self.send(request).await?;
        records::wishlist_items(&body)
    }

    #[instrument(skip(self, auth), fields(product_id = %product_id))]
    async fn toggle(&self, auth: &RequestAuth, product_id: &ProductId) -> Result<Option<bool>, CommerceError> {
        let request = auth
            .apply(self.inner.client.post(self.url(&["wishlist", "toggle"])))
            .json(&ToggleBody { product_id });
        let body = self.send(request).await?;
        Ok(records::toggle_membership(&body))
    }

    #[instrument(skip(self, auth), fields(guest_id = %guest_id))]
    async fn merge(&self, auth: &RequestAuth, guest_id: &GuestId) -> Result<(), CommerceError> {
        let request = auth
            .apply(self.inner.client.post(self.url(&["wishlist", "merge"])))
            .json(&MergeBody { guest_id });
        self.send(request).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_bodies_use_camel_case() {
        let product_id = ProductId::new("p9");
        assert_eq!(
            serde_json::to_value(ToggleBody { product_id: &product_id }).unwrap_or_default(),
            serde_json::json!({"productId": "p9"})
        );

        let guest_id = GuestId::generate();
        assert_eq!(
            serde_json::to_value(MergeBody { guest_id: &guest_id }).unwrap_or_default(),
            serde_json::json!({"guestId": guest_id.to_string()})
        );
    }
}
