//! Sample data for a fresh database.
//!
//! Both seeders are idempotent: they only insert when the relevant table is
//! empty, so running them on every start-up is safe.

use catalog_core::error::Result;
use catalog_core::model::{NewCategory, NewProduct};
use catalog_core::repository::{CatalogRepository, UserRepository};
use catalog_core::user::{NewUser, Role};
use rust_decimal::Decimal;

/// What a seeding run inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Categories inserted
    pub categories: usize,
    /// Products inserted
    pub products: usize,
    /// Whether the role rows were created
    pub roles: bool,
    /// Users inserted
    pub users: usize,
}

struct SampleProduct {
    name: &'static str,
    description: &'static str,
    cents: i64,
    stock: i32,
}

struct SampleCategory {
    name: &'static str,
    description: &'static str,
    products: &'static [SampleProduct],
}

const CATALOG: &[SampleCategory] = &[
    SampleCategory {
        name: "Electronics",
        description: "Electronic equipment and devices",
        products: &[
            SampleProduct {
                name: "Smartphone X",
                description: "The latest flagship smartphone with cutting-edge features",
                cents: 99_999,
                stock: 50,
            },
            SampleProduct {
                name: "Laptop Pro",
                description: "High-performance laptop for professionals",
                cents: 149_999,
                stock: 25,
            },
            SampleProduct {
                name: "Wireless Headphones",
                description: "Premium wireless noise-cancelling headphones",
                cents: 24_999,
                stock: 100,
            },
        ],
    },
    SampleCategory {
        name: "Clothing",
        description: "Apparel and fashion items",
        products: &[
            SampleProduct {
                name: "Cotton T-Shirt",
                description: "Comfortable 100% cotton t-shirt",
                cents: 1_999,
                stock: 200,
            },
            SampleProduct {
                name: "Denim Jeans",
                description: "Classic denim jeans with modern fit",
                cents: 5_999,
                stock: 150,
            },
        ],
    },
    SampleCategory {
        name: "Books",
        description: "Books, ebooks, and audiobooks",
        products: &[
            SampleProduct {
                name: "JavaScript: The Good Parts",
                description: "A book focusing on the good features of JavaScript",
                cents: 2_999,
                stock: 75,
            },
            SampleProduct {
                name: "Spring Boot in Action",
                description: "Learn Spring Boot development by example",
                cents: 3_999,
                stock: 60,
            },
            SampleProduct {
                name: "Effective Java",
                description: "Best practices for Java programming",
                cents: 4_499,
                stock: 40,
            },
        ],
    },
];

/// Insert the sample categories and products if there are no categories yet.
///
/// # Errors
///
/// Returns the first repository error.
pub async fn seed_catalog(repo: &dyn CatalogRepository) -> Result<SeedReport> {
    if repo.count_categories().await? > 0 {
        tracing::info!("Database already initialized, skipping initialization");
        return Ok(SeedReport::default());
    }

    let mut report = SeedReport::default();
    for sample in CATALOG {
        let category = repo
            .insert_category(NewCategory::new(sample.name, Some(sample.description)))
            .await?;
        report.categories += 1;

        for product in sample.products {
            repo.insert_product(NewProduct {
                name: product.name.to_string(),
                description: Some(product.description.to_string()),
                price: Decimal::new(product.cents, 2),
                stock_quantity: product.stock,
                category_id: category.id,
            })
            .await?;
            report.products += 1;
        }
    }

    tracing::info!(
        categories = report.categories,
        products = report.products,
        "Sample catalog created"
    );
    Ok(report)
}

/// Create the roles if none exist and the default users if there are none.
///
/// | username | password   | roles     |
/// |----------|------------|-----------|
/// | `user`   | `password` | user      |
/// | `admin`  | `admin`    | all three |
///
/// # Errors
///
/// Returns the first repository error.
pub async fn seed_users(repo: &dyn UserRepository) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    if repo.count_roles().await? == 0 {
        repo.ensure_roles(&Role::ALL).await?;
        report.roles = true;
        tracing::info!("Roles created");
    }

    if repo.count_users().await? > 0 {
        tracing::info!("Users already exist, skipping user creation");
        return Ok(report);
    }

    let defaults = [
        NewUser::new("user", "user@example.com", "password", &[Role::User])
            .with_names("Regular", "User"),
        NewUser::new("admin", "admin@example.com", "admin", &Role::ALL).with_names("Admin", "User"),
    ];
    for user in defaults {
        let user = repo.insert_user(user).await?;
        tracing::info!(username = %user.username, roles = user.roles.len(), "User created");
        report.users += 1;
    }

    Ok(report)
}
