//! Users, roles and password hashes.
//!
//! Credentials are stored as `salt$digest` where `digest = sha256(salt || password)`,
//! both hex encoded. Verification compares digests in constant time.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Access role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Read access
    #[serde(rename = "ROLE_USER")]
    User,
    /// Reserved for moderation tooling
    #[serde(rename = "ROLE_MODERATOR")]
    Moderator,
    /// Catalog mutations
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
}

impl Role {
    /// Every role, in ascending privilege.
    pub const ALL: [Self; 3] = [Self::User, Self::Moderator, Self::Admin];

    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "ROLE_USER",
            Self::Moderator => "ROLE_MODERATOR",
            Self::Admin => "ROLE_ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown role name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROLE_USER" => Ok(Self::User),
            "ROLE_MODERATOR" => Ok(Self::Moderator),
            "ROLE_ADMIN" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A stored, salted password hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    const SALT_LEN: usize = 16;

    /// Hash `password` with a fresh random salt.
    #[must_use]
    pub fn generate(password: &str) -> Self {
        let mut salt = [0u8; Self::SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::with_salt(&salt, password)
    }

    fn with_salt(salt: &[u8], password: &str) -> Self {
        let digest = Self::digest(salt, password);
        Self(format!("{}${}", hex::encode(salt), hex::encode(digest)))
    }

    fn digest(salt: &[u8], password: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().to_vec()
    }

    /// Wrap a value read from storage.
    #[must_use]
    pub const fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// Stored representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check `password` against this hash.
    ///
    /// Malformed stored values never verify.
    #[must_use]
    pub fn verify(&self, password: &str) -> bool {
        let Some((salt_hex, digest_hex)) = self.0.split_once('$') else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
            return false;
        };
        constant_time_eq::constant_time_eq(&Self::digest(&salt, password), &expected)
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(..)")
    }
}

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Database id
    pub id: i64,
    /// Login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Salted hash
    pub password_hash: PasswordHash,
    /// Given name
    pub first_name: Option<String>,
    /// Family name
    pub last_name: Option<String>,
    /// Granted roles
    pub roles: BTreeSet<Role>,
    /// Disabled users cannot authenticate
    pub enabled: bool,
}

impl User {
    /// Whether the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Verify a login attempt.
    #[must_use]
    pub fn check_password(&self, password: &str) -> bool {
        self.enabled && self.password_hash.verify(password)
    }
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Salted hash
    pub password_hash: PasswordHash,
    /// Given name
    pub first_name: Option<String>,
    /// Family name
    pub last_name: Option<String>,
    /// Granted roles
    pub roles: BTreeSet<Role>,
    /// Whether the account can log in
    pub enabled: bool,
}

impl NewUser {
    /// Enabled user with a freshly hashed password.
    #[must_use]
    pub fn new(username: &str, email: &str, password: &str, roles: &[Role]) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: PasswordHash::generate(password),
            first_name: None,
            last_name: None,
            roles: roles.iter().copied().collect(),
            enabled: true,
        }
    }

    /// Set given and family names.
    #[must_use]
    pub fn with_names(mut self, first: &str, last: &str) -> Self {
        self.first_name = Some(first.to_string());
        self.last_name = Some(last.to_string());
        self
    }
}
