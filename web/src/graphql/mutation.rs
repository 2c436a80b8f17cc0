//! Mutations. Every field requires `ROLE_ADMIN`.

use super::types::{
    CategoryInput, CategoryObject, CategoryUpdateInput, ProductInput, ProductObject,
    ProductUpdateInput, parse_id,
};
use crate::auth::Principal;
use crate::error::{coded_error, graphql_error};
use async_graphql::{Context, ID, Object, Result};
use catalog_core::user::Role;
use catalog_runtime::{CategoryService, ProductService};

/// Fail unless the request carries a principal holding `role`.
///
/// Anonymous callers get `UNAUTHORIZED`; authenticated callers without the
/// role get `FORBIDDEN`.
fn require_role(ctx: &Context<'_>, role: Role) -> Result<()> {
    match ctx.data_opt::<Principal>() {
        None => Err(coded_error("Authentication required", "UNAUTHORIZED")),
        Some(principal) if principal.has_role(role) => Ok(()),
        Some(principal) => {
            tracing::warn!(username = %principal.username, required = %role, "Access denied");
            Err(coded_error("Access denied", "FORBIDDEN"))
        },
    }
}

/// Root `Mutation` type.
#[derive(Debug, Default)]
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_product(&self, ctx: &Context<'_>, input: ProductInput) -> Result<ProductObject> {
        require_role(ctx, Role::Admin)?;
        let products = ctx.data::<ProductService>()?;
        let product = products
            .create_product(input.into_new_product()?)
            .await
            .map_err(graphql_error)?;
        Ok(ProductObject(product))
    }

    async fn update_product(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: ProductUpdateInput,
    ) -> Result<ProductObject> {
        require_role(ctx, Role::Admin)?;
        let products = ctx.data::<ProductService>()?;
        let product = products
            .update_product(parse_id(&id)?, input.into_patch()?)
            .await
            .map_err(graphql_error)?;
        Ok(ProductObject(product))
    }

    async fn delete_product(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        require_role(ctx, Role::Admin)?;
        let products = ctx.data::<ProductService>()?;
        products.delete_product(parse_id(&id)?).await.map_err(graphql_error)
    }

    async fn create_category(&self, ctx: &Context<'_>, input: CategoryInput) -> Result<CategoryObject> {
        require_role(ctx, Role::Admin)?;
        let categories = ctx.data::<CategoryService>()?;
        let category = categories
            .create_category(input.into())
            .await
            .map_err(graphql_error)?;
        Ok(CategoryObject(category))
    }

    async fn update_category(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: CategoryUpdateInput,
    ) -> Result<CategoryObject> {
        require_role(ctx, Role::Admin)?;
        let categories = ctx.data::<CategoryService>()?;
        let category = categories
            .update_category(parse_id(&id)?, input.into())
            .await
            .map_err(graphql_error)?;
        Ok(CategoryObject(category))
    }

    /// `false` when products still reference the category.
    async fn delete_category(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        require_role(ctx, Role::Admin)?;
        let categories = ctx.data::<CategoryService>()?;
        categories.delete_category(parse_id(&id)?).await.map_err(graphql_error)
    }
}
