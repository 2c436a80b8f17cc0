//! GraphQL object and input types.

use crate::error::{coded_error, graphql_error};
use async_graphql::{Context, ID, InputObject, Object, Result};
use catalog_core::model::{Category, CategoryPatch, NewCategory, NewProduct, Product, ProductPatch};
use catalog_runtime::ProductService;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Parse a GraphQL `ID` into a numeric key.
///
/// # Errors
///
/// Returns a `BAD_REQUEST` error if `id` is not an integer.
pub fn parse_id(id: &ID) -> Result<i64> {
    id.parse::<i64>()
        .map_err(|_| coded_error(format!("Invalid id: {}", id.as_str()), "BAD_REQUEST"))
}

fn to_id(id: i64) -> ID {
    ID(id.to_string())
}

/// `Product` output type.
#[derive(Debug, Clone)]
pub struct ProductObject(pub Product);

#[Object(name = "Product")]
impl ProductObject {
    async fn id(&self) -> ID {
        to_id(self.0.id)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    async fn price(&self) -> Decimal {
        self.0.price
    }

    async fn stock_quantity(&self) -> i32 {
        self.0.stock_quantity
    }

    async fn category(&self) -> CategoryObject {
        CategoryObject(self.0.category.clone())
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    async fn updated_at(&self) -> DateTime<Utc> {
        self.0.updated_at
    }
}

/// `Category` output type.
#[derive(Debug, Clone)]
pub struct CategoryObject(pub Category);

#[Object(name = "Category")]
impl CategoryObject {
    async fn id(&self) -> ID {
        to_id(self.0.id)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    /// Products in this category.
    async fn products(&self, ctx: &Context<'_>) -> Result<Vec<ProductObject>> {
        let products = ctx.data::<ProductService>()?;
        let list = products
            .find_products_by_category(self.0.id)
            .await
            .map_err(graphql_error)?;
        Ok(list.into_iter().map(ProductObject).collect())
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    async fn updated_at(&self) -> DateTime<Utc> {
        self.0.updated_at
    }
}

/// Input for `createProduct`.
#[derive(Debug, Clone, InputObject)]
pub struct ProductInput {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Unit price
    pub price: Decimal,
    /// Units on hand
    pub stock_quantity: i32,
    /// Owning category
    pub category_id: ID,
}

impl ProductInput {
    /// Convert into the service input.
    ///
    /// # Errors
    ///
    /// Returns a `BAD_REQUEST` error if `categoryId` is not an integer.
    pub fn into_new_product(self) -> Result<NewProduct> {
        Ok(NewProduct {
            category_id: parse_id(&self.category_id)?,
            name: self.name,
            description: self.description,
            price: self.price,
            stock_quantity: self.stock_quantity,
        })
    }
}

/// Input for `updateProduct`; absent fields are left unchanged.
#[derive(Debug, Clone, Default, InputObject)]
pub struct ProductUpdateInput {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New price
    pub price: Option<Decimal>,
    /// New stock quantity
    pub stock_quantity: Option<i32>,
    /// New category
    pub category_id: Option<ID>,
}

impl ProductUpdateInput {
    /// Convert into the service patch.
    ///
    /// # Errors
    ///
    /// Returns a `BAD_REQUEST` error if `categoryId` is not an integer.
    pub fn into_patch(self) -> Result<ProductPatch> {
        Ok(ProductPatch {
            category_id: self.category_id.as_ref().map(parse_id).transpose()?,
            name: self.name,
            description: self.description,
            price: self.price,
            stock_quantity: self.stock_quantity,
        })
    }
}

/// Input for `createCategory`.
#[derive(Debug, Clone, InputObject)]
pub struct CategoryInput {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
}

impl From<CategoryInput> for NewCategory {
    fn from(input: CategoryInput) -> Self {
        Self {
            name: input.name,
            description: input.description,
        }
    }
}

/// Input for `updateCategory`; absent fields are left unchanged.
#[derive(Debug, Clone, Default, InputObject)]
pub struct CategoryUpdateInput {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
}

impl From<CategoryUpdateInput> for CategoryPatch {
    fn from(input: CategoryUpdateInput) -> Self {
        Self {
            name: input.name,
            description: input.description,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_numeric() {
        assert_eq!(parse_id(&ID::from("42")).unwrap(), 42);
        assert!(parse_id(&ID::from("abc")).is_err());
    }

    #[test]
    fn update_input_keeps_absent_fields_absent() {
        let patch = ProductUpdateInput {
            stock_quantity: Some(4),
            category_id: Some(ID::from("2")),
            ..ProductUpdateInput::default()
        }
        .into_patch()
        .unwrap();

        assert_eq!(patch.stock_quantity, Some(4));
        assert_eq!(patch.category_id, Some(2));
        assert!(patch.name.is_none());
        assert!(patch.price.is_none());
    }
}
