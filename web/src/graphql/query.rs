//! Read-only queries. Open to anonymous callers.

use super::types::{CategoryObject, ProductObject, parse_id};
use crate::error::graphql_error;
use async_graphql::{Context, ID, Object, Result};
use catalog_runtime::{CategoryService, ProductService};

/// Root `Query` type.
#[derive(Debug, Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// All products.
    async fn products(&self, ctx: &Context<'_>) -> Result<Vec<ProductObject>> {
        let products = ctx.data::<ProductService>()?;
        let list = products.find_all_products().await.map_err(graphql_error)?;
        Ok(list.into_iter().map(ProductObject).collect())
    }

    /// One product; `null` with a `NOT_FOUND` error when it does not exist.
    async fn product(&self, ctx: &Context<'_>, id: ID) -> Result<Option<ProductObject>> {
        let products = ctx.data::<ProductService>()?;
        let product = products
            .find_product(parse_id(&id)?)
            .await
            .map_err(graphql_error)?;
        Ok(Some(ProductObject(product)))
    }

    /// Products in one category.
    async fn products_by_category(&self, ctx: &Context<'_>, category_id: ID) -> Result<Vec<ProductObject>> {
        let products = ctx.data::<ProductService>()?;
        let list = products
            .find_products_by_category(parse_id(&category_id)?)
            .await
            .map_err(graphql_error)?;
        Ok(list.into_iter().map(ProductObject).collect())
    }

    /// All categories.
    async fn categories(&self, ctx: &Context<'_>) -> Result<Vec<CategoryObject>> {
        let categories = ctx.data::<CategoryService>()?;
        let list = categories.find_all_categories().await.map_err(graphql_error)?;
        Ok(list.into_iter().map(CategoryObject).collect())
    }

    /// One category; `null` with a `NOT_FOUND` error when it does not exist.
    async fn category(&self, ctx: &Context<'_>, id: ID) -> Result<Option<CategoryObject>> {
        let categories = ctx.data::<CategoryService>()?;
        let category = categories
            .find_category(parse_id(&id)?)
            .await
            .map_err(graphql_error)?;
        Ok(Some(CategoryObject(category)))
    }
}
