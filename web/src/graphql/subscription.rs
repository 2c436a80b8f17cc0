//! Live product changes over `graphql-transport-ws`.

use super::types::ProductObject;
use async_graphql::{Context, Result, Subscription};
use catalog_runtime::ProductService;
use futures::{Stream, StreamExt};

/// Root `Subscription` type.
#[derive(Debug, Default)]
pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Products created after the subscription started.
    async fn product_created(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = ProductObject>> {
        let products = ctx.data::<ProductService>()?;
        Ok(products.subscribe_created().await.map(ProductObject))
    }

    /// Products updated after the subscription started.
    async fn product_updated(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = ProductObject>> {
        let products = ctx.data::<ProductService>()?;
        Ok(products.subscribe_updated().await.map(ProductObject))
    }
}
