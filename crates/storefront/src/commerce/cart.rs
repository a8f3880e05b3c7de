//! Remote cart endpoints.

use async_trait::async_trait;
use exaltride_core::{CartLineItem, ProductId};
use serde::Serialize;
use tracing::instrument;

use super::{CartApi, CommerceClient, CommerceError, RequestAuth, records};

#[derive(Debug, Serialize)]
struct AddItemBody<'a> {
    product_id: &'a ProductId,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct QuantityBody {
    quantity: u32,
}

#[async_trait]
impl CartApi for CommerceClient {
    #[instrument(skip(self))]
    async fn list(&self, auth: Option<&RequestAuth>) -> Result<Vec<CartLineItem>, CommerceError> {
        let Some(auth) = auth else {
            tracing::debug!("No credential, skipping remote cart fetch");
            return Ok(Vec::new());
        };

        let request = auth.apply(self.inner.client.get(self.url(&["cart"])));
        let body = self.send(request).await?;
        records::cart_items(&body)
    }

    #[instrument(skip(self, auth), fields(product_id = %product_id))]
    async fn add(&self, auth: &RequestAuth, product_id: &ProductId, quantity: u32) -> Result<(), CommerceError> {
        let request = auth
            .apply(self.inner.client.post(self.url(&["cart", "items"])))
            .json(&AddItemBody { product_id, quantity });
        self.send(request).await.map(drop)
    }

    #[instrument(skip(self, auth), fields(product_id = %product_id))]
    async fn set_quantity(
        &self,
        auth: &RequestAuth,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CommerceError> {
        let request = auth
            .apply(self.inner.client.put(self.url(&["cart", "items", product_id.as_str()])))
            .json(&QuantityBody { quantity });
        self.send(request).await.map(drop)
    }

    #[instrument(skip(self, auth), fields(product_id = %product_id))]
    async fn remove(&self, auth: &RequestAuth, product_id: &ProductId) -> Result<(), CommerceError> {
        let request = auth.apply(
            self.inner
                .client
                .delete(self.url(&["cart", "items", product_id.as_str()])),
        );
        self.send(request).await.map(drop)
    }

    #[instrument(skip(self, auth))]
    async fn clear(&self, auth: &RequestAuth) -> Result<(), CommerceError> {
        let request = auth.apply(self.inner.client.delete(self.url(&["cart"])));
        self.send(request).await.map(drop)
    }
}
