//! GraphQL schema for the catalog.
//!
//! Queries are public. Mutations require an administrator principal in the
//! request data (see [`crate::handlers::graphql`]). Subscriptions stream
//! products as they are created or updated.

mod mutation;
mod query;
mod subscription;
pub mod types;

pub use mutation::MutationRoot;
pub use query::QueryRoot;
pub use subscription::SubscriptionRoot;

use async_graphql::Schema;
use catalog_runtime::{CategoryService, ProductService};

/// The executable catalog schema.
pub type CatalogSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Build the schema with both services attached as context data.
#[must_use]
pub fn build_schema(products: ProductService, categories: CategoryService) -> CatalogSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(products)
        .data(categories)
        .finish()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use async_graphql::{Request, Value};
    use catalog_core::repository::CatalogRepository;
    use catalog_core::user::Role;
    use catalog_runtime::ProductEventPublisher;
    use catalog_testing::{InMemoryCatalogRepository, fixtures, test_clock};
    use futures::StreamExt;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    async fn schema() -> CatalogSchema {
        let repo = Arc::new(InMemoryCatalogRepository::new());
        let books = repo.insert_category(fixtures::new_category("Books")).await.unwrap();
        repo.insert_product(fixtures::new_product("Effective Java", books.id))
            .await
            .unwrap();

        let publisher = ProductEventPublisher::disabled(Arc::new(test_clock()));
        build_schema(
            ProductService::new(repo.clone(), publisher),
            CategoryService::new(repo),
        )
    }

    fn principal(roles: &[Role]) -> Principal {
        Principal {
            username: "tester".into(),
            roles: roles.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    fn error_code(response: &async_graphql::Response) -> Option<Value> {
        response.errors[0]
            .extensions
            .as_ref()
            .and_then(|ext| ext.get("code").cloned())
    }

    #[test]
    fn sdl_uses_camel_case_field_names() {
        let sdl = build_schema(
            ProductService::new(
                Arc::new(InMemoryCatalogRepository::new()),
                ProductEventPublisher::disabled(Arc::new(test_clock())),
            ),
            CategoryService::new(Arc::new(InMemoryCatalogRepository::new())),
        )
        .sdl();

        assert!(sdl.contains("stockQuantity: Int!"));
        assert!(sdl.contains("productsByCategory("));
        assert!(sdl.contains("categoryId: ID!"));
        assert!(sdl.contains("productCreated: Product!"));
    }

    #[tokio::test]
    async fn products_query_resolves_nested_category() {
        let schema = schema().await;
        let response = schema
            .execute("{ products { name price category { name } } }")
            .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let json = response.data.into_json().unwrap();
        assert_eq!(json["products"][0]["name"], "Effective Java");
        assert_eq!(json["products"][0]["price"], "19.99");
        assert_eq!(json["products"][0]["category"]["name"], "Books");
    }

    #[tokio::test]
    async fn missing_product_is_null_with_not_found() {
        let schema = schema().await;
        let response = schema.execute(r#"{ product(id: "999") { name } }"#).await;

        assert_eq!(error_code(&response), Some(Value::from("NOT_FOUND")));
        let json = response.data.into_json().unwrap();
        assert!(json["product"].is_null());
    }

    #[tokio::test]
    async fn malformed_id_is_bad_request() {
        let schema = schema().await;
        let response = schema.execute(r#"{ category(id: "books") { name } }"#).await;

        assert_eq!(error_code(&response), Some(Value::from("BAD_REQUEST")));
    }

    #[tokio::test]
    async fn anonymous_mutation_is_unauthorized() {
        let schema = schema().await;
        let response = schema
            .execute(r#"mutation { createCategory(input: { name: "Music" }) { id } }"#)
            .await;

        assert_eq!(error_code(&response), Some(Value::from("UNAUTHORIZED")));
    }

    #[tokio::test]
    async fn non_admin_mutation_is_forbidden() {
        let schema = schema().await;
        let request = Request::new(r#"mutation { deleteProduct(id: "1") }"#)
            .data(principal(&[Role::User]));
        let response = schema.execute(request).await;

        assert_eq!(error_code(&response), Some(Value::from("FORBIDDEN")));
    }

    #[tokio::test]
    async fn admin_can_create_and_update_products() {
        let schema = schema().await;
        let create = Request::new(
            r#"mutation {
                createProduct(input: { name: "Rust in Action", price: "42.50", stockQuantity: 3, categoryId: "1" }) {
                    id stockQuantity category { name }
                }
            }"#,
        )
        .data(principal(&[Role::Admin]));
        let response = schema.execute(create).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let json = response.data.into_json().unwrap();
        let id = json["createProduct"]["id"].as_str().unwrap().to_string();
        assert_eq!(json["createProduct"]["category"]["name"], "Books");

        let update = Request::new(format!(
            r#"mutation {{ updateProduct(id: "{id}", input: {{ stockQuantity: 9 }}) {{ name stockQuantity }} }}"#
        ))
        .data(principal(&[Role::Admin]));
        let response = schema.execute(update).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let json = response.data.into_json().unwrap();
        assert_eq!(json["updateProduct"]["name"], "Rust in Action");
        assert_eq!(json["updateProduct"]["stockQuantity"], 9);
    }

    #[tokio::test]
    async fn price_outside_column_range_is_bad_request() {
        let schema = schema().await;
        for price in ["12345678901.00", "9.999"] {
            let request = Request::new(format!(
                r#"mutation {{ createProduct(input: {{ name: "Gold", price: "{price}", stockQuantity: 1, categoryId: "1" }}) {{ id }} }}"#
            ))
            .data(principal(&[Role::Admin]));
            let response = schema.execute(request).await;

            assert_eq!(error_code(&response), Some(Value::from("BAD_REQUEST")), "{price}");
        }
    }

    #[tokio::test]
    async fn deleting_referenced_category_returns_false() {
        let schema = schema().await;
        let request = Request::new(r#"mutation { deleteCategory(id: "1") }"#)
            .data(principal(&[Role::Admin]));
        let response = schema.execute(request).await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap()["deleteCategory"],
            serde_json::json!(false)
        );
    }

    #[tokio::test]
    async fn product_created_subscription_streams_new_products() {
        let schema = schema().await;
        let mut stream = schema.execute_stream("subscription { productCreated { name } }");

        // Let the subscription register before creating the product.
        let next = tokio::spawn(async move { stream.next().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let create = Request::new(
            r#"mutation { createProduct(input: { name: "Dune", price: "9.99", stockQuantity: 1, categoryId: "1" }) { id } }"#,
        )
        .data(principal(&[Role::Admin]));
        let response = schema.execute(create).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let event = tokio::time::timeout(std::time::Duration::from_secs(2), next)
            .await
            .expect("subscription timed out")
            .unwrap()
            .expect("stream ended");
        let json = event.data.into_json().unwrap();
        assert_eq!(json["productCreated"]["name"], "Dune");
    }
}
