//! Catalog records and their create/patch inputs.
//!
//! Categories own products through a plain foreign key. A [`Product`] always
//! carries its resolved [`Category`], which is what every read path returns.

use crate::error::{CatalogError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Database id
    pub id: i64,
    /// Display name (unique)
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Database id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Unit price
    pub price: Decimal,
    /// Units on hand
    pub stock_quantity: i32,
    /// Owning category
    pub category: Category,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a category.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewCategory {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
}

impl NewCategory {
    /// Build an input from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            name: name.into(),
            description: description.map(str::to_string),
        }
    }

    /// Check field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] if the name is blank.
    pub fn validate(&self) -> Result<()> {
        require_name(&self.name)
    }
}

/// Partial update for a category. `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoryPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
}

impl CategoryPatch {
    /// Check field constraints on the fields that are present.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] if a new name is blank.
    pub fn validate(&self) -> Result<()> {
        self.name.as_deref().map_or(Ok(()), require_name)
    }

    /// Apply the present fields to `category`.
    pub fn apply(self, category: &mut Category) {
        if let Some(name) = self.name {
            category.name = name;
        }
        if let Some(description) = self.description {
            category.description = Some(description);
        }
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Unit price
    pub price: Decimal,
    /// Units on hand
    pub stock_quantity: i32,
    /// Owning category id
    pub category_id: i64,
}

impl NewProduct {
    /// Check field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for a blank name, a negative price,
    /// or a negative stock quantity.
    pub fn validate(&self) -> Result<()> {
        require_name(&self.name)?;
        require_price(self.price)?;
        require_stock(self.stock_quantity)
    }
}

/// Partial update for a product. `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New price
    pub price: Option<Decimal>,
    /// New stock quantity
    pub stock_quantity: Option<i32>,
    /// New category id
    pub category_id: Option<i64>,
}

impl ProductPatch {
    /// Check field constraints on the fields that are present.
    ///
    /// # Errors
    ///
    /// Same rules as [`NewProduct::validate`].
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require_name(name)?;
        }
        if let Some(price) = self.price {
            require_price(price)?;
        }
        if let Some(stock) = self.stock_quantity {
            require_stock(stock)?;
        }
        Ok(())
    }

    /// Apply the present scalar fields to `product`.
    ///
    /// The category is swapped separately because it has to be resolved first.
    pub fn apply(self, product: &mut Product, category: Option<Category>) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = Some(description);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock_quantity {
            product.stock_quantity = stock;
        }
        if let Some(category) = category {
            product.category = category;
        }
    }
}

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CatalogError::Validation("name must not be blank".into()));
    }
    Ok(())
}

/// Decimal places the `price` column keeps.
pub const PRICE_SCALE: u32 = 2;

/// Exclusive upper bound of the `price` column (`NUMERIC(12, 2)`).
pub const PRICE_LIMIT: Decimal = Decimal::from_parts(0x540B_E400, 2, 0, false, 0); // 10_000_000_000

fn require_price(price: Decimal) -> Result<()> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(CatalogError::Validation(format!(
            "price must not be negative (got {price})"
        )));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(CatalogError::Validation(format!(
            "price must have at most {PRICE_SCALE} decimal places (got {price})"
        )));
    }
    if price >= PRICE_LIMIT {
        return Err(CatalogError::Validation(format!(
            "price must be less than {PRICE_LIMIT} (got {price})"
        )));
    }
    Ok(())
}

fn require_stock(stock: i32) -> Result<()> {
    if stock < 0 {
        return Err(CatalogError::Validation(format!(
            "stockQuantity must not be negative (got {stock})"
        )));
    }
    Ok(())
}
