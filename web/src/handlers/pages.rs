//! Server-rendered pages.

use crate::auth::MaybePrincipal;
use crate::error::AppError;
use crate::state::AppState;
use async_graphql::http::GraphiQLSource;
use axum::{extract::State, response::Html};
use catalog_core::model::{Category, Product};
use std::fmt::Write;

/// Escape text for an HTML body or attribute.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Catalog home page.
///
/// # Endpoint
///
/// ```text
/// GET /
/// ```
///
/// # Errors
///
/// Returns `500` if the catalog cannot be loaded.
pub async fn home(
    State(state): State<AppState>,
    principal: MaybePrincipal,
) -> Result<Html<String>, AppError> {
    let products = state.products.find_all_products().await?;
    let categories = state.categories.find_all_categories().await?;
    Ok(Html(render_home(&products, &categories, principal.is_admin())))
}

/// GraphiQL console wired to `/graphql` and `/graphql/ws`.
///
/// # Endpoint
///
/// ```text
/// GET /graphql-console
/// ```
#[allow(clippy::unused_async)]
pub async fn graphql_console() -> Html<String> {
    Html(
        GraphiQLSource::build()
            .endpoint("/graphql")
            .subscription_endpoint("/graphql/ws")
            .title("Catalog GraphQL Console")
            .finish(),
    )
}

fn render_home(products: &[Product], categories: &[Category], is_admin: bool) -> String {
    let mut category_items = String::new();
    for category in categories {
        let _ = write!(
            category_items,
            "<li><strong>{}</strong> {}</li>",
            escape_html(&category.name),
            escape_html(category.description.as_deref().unwrap_or_default()),
        );
    }

    let mut product_rows = String::new();
    for product in products {
        let _ = write!(
            product_rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&product.name),
            escape_html(product.description.as_deref().unwrap_or_default()),
            escape_html(&product.category.name),
            product.price,
            product.stock_quantity,
        );
    }

    let admin_panel = if is_admin {
        r#"<section class="admin"><h2>Administration</h2><p>Signed in as administrator. Use the <a href="/graphql-console">GraphQL console</a> to manage the catalog.</p></section>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Product Catalog</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #ccc; padding: 0.4rem; text-align: left; }}
.admin {{ background: #fff4d6; padding: 0.5rem 1rem; }}
</style>
</head>
<body>
<nav><a href="/">Catalog</a> | <a href="/graphql-console">GraphQL console</a> | <a href="/kafka-ui">Event dashboard</a></nav>
<h1>Product Catalog</h1>
{admin_panel}
<h2>Categories ({category_count})</h2>
<ul>{category_items}</ul>
<h2>Products ({product_count})</h2>
<table>
<thead><tr><th>Name</th><th>Description</th><th>Category</th><th>Price</th><th>Stock</th></tr></thead>
<tbody>{product_rows}</tbody>
</table>
</body>
</html>
"#,
        category_count = categories.len(),
        product_count = products.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<b class="x">Tom & Jerry's</b>"#),
            "&lt;b class=&quot;x&quot;&gt;Tom &amp; Jerry&#x27;s&lt;/b&gt;"
        );
    }

    #[test]
    fn admin_panel_only_for_admins() {
        assert!(render_home(&[], &[], true).contains("Administration"));
        assert!(!render_home(&[], &[], false).contains("Administration"));
    }
}
