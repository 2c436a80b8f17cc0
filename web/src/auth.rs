//! HTTP Basic authentication.
//!
//! Requests may carry `Authorization: Basic base64(username:password)`. Valid
//! credentials resolve to a [`Principal`]; no header means an anonymous
//! caller. Invalid credentials are rejected with `401` rather than silently
//! downgraded to anonymous.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use catalog_core::repository::UserRepository;
use catalog_core::user::Role;
use std::collections::BTreeSet;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Login name
    pub username: String,
    /// Granted roles
    pub roles: BTreeSet<Role>,
}

impl Principal {
    /// Whether the caller holds `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the caller is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

/// Decoded `Authorization: Basic` credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// Username part
    pub username: String,
    /// Password part
    pub password: String,
}

impl BasicCredentials {
    /// Parse the `Authorization` header.
    ///
    /// Returns `Ok(None)` when the header is absent.
    ///
    /// # Errors
    ///
    /// Returns an `UNAUTHORIZED` [`AppError`] if the header is not well-formed
    /// Basic credentials.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, AppError> {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };
        let malformed = || AppError::unauthorized("Malformed Authorization header");

        let value = value.to_str().map_err(|_| malformed())?;
        let (scheme, encoded) = value.split_once(' ').ok_or_else(malformed)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AppError::unauthorized("Only Basic authentication is supported"));
        }

        let decoded = STANDARD.decode(encoded.trim()).map_err(|_| malformed())?;
        let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
        let (username, password) = decoded.split_once(':').ok_or_else(malformed)?;

        Ok(Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        }))
    }
}

/// Resolve the caller from request headers.
///
/// # Errors
///
/// Returns `UNAUTHORIZED` for malformed headers, unknown users, wrong
/// passwords and disabled accounts, and `INTERNAL_ERROR` if the user store
/// fails.
pub async fn authenticate(
    users: &dyn UserRepository,
    headers: &HeaderMap,
) -> Result<Option<Principal>, AppError> {
    let Some(credentials) = BasicCredentials::from_headers(headers)? else {
        return Ok(None);
    };

    let user = users
        .find_by_username(&credentials.username)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "User lookup failed");
            AppError::internal("An internal error occurred")
        })?;

    match user {
        Some(user) if user.check_password(&credentials.password) => {
            tracing::debug!(username = %user.username, "Authenticated");
            Ok(Some(Principal {
                username: user.username,
                roles: user.roles,
            }))
        },
        _ => {
            tracing::warn!(username = %credentials.username, "Rejected credentials");
            Err(AppError::unauthorized("Bad credentials"))
        },
    }
}

/// Optional caller, extracted from the `Authorization` header.
#[derive(Debug, Clone, Default)]
pub struct MaybePrincipal(pub Option<Principal>);

impl MaybePrincipal {
    /// Whether the caller is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(Principal::is_admin)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybePrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(state.users.as_ref(), &parts.headers).await.map(Self)
    }
}
