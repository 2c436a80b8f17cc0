//! User and role storage.

use crate::map_db_error;
use catalog_core::repository::{RepoFuture, UserRepository};
use catalog_core::user::{NewUser, PasswordHash, Role, User};
use sqlx::PgPool;
use std::collections::BTreeSet;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    first_name: Option<String>,
    last_name: Option<String>,
    enabled: bool,
    roles: Vec<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let roles: BTreeSet<Role> = row
            .roles
            .iter()
            .filter_map(|name| match name.parse::<Role>() {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::warn!(username = %row.username, error = %e, "Ignoring unknown role");
                    None
                },
            })
            .collect();

        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: PasswordHash::from_stored(row.password_hash),
            first_name: row.first_name,
            last_name: row.last_name,
            roles,
            enabled: row.enabled,
        }
    }
}

/// `PostgreSQL` user repository.
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Create a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserRepository for PostgresUserRepository {
    fn find_by_username(&self, username: &str) -> RepoFuture<'_, Option<User>> {
        let username = username.to_string();
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(
                r"
                SELECT u.id, u.username, u.email, u.password_hash, u.first_name, u.last_name,
                       u.enabled,
                       COALESCE(array_agg(r.name) FILTER (WHERE r.name IS NOT NULL), '{}') AS roles
                FROM users u
                LEFT JOIN user_roles ur ON ur.user_id = u.id
                LEFT JOIN roles r ON r.id = ur.role_id
                WHERE u.username = $1
                GROUP BY u.id
                ",
            )
            .bind(&username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to load user", e))?;

            Ok(row.map(User::from))
        })
    }

    fn insert_user(&self, user: NewUser) -> RepoFuture<'_, User> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_db_error("Failed to begin transaction", e))?;

            let (id,): (i64,) = sqlx::query_as(
                r"
                INSERT INTO users (username, email, password_hash, first_name, last_name, enabled)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id
                ",
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.password_hash.as_str())
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.enabled)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_db_error("Failed to insert user", e))?;

            for role in &user.roles {
                sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                    .bind(role.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_db_error("Failed to insert role", e))?;

                sqlx::query(
                    "INSERT INTO user_roles (user_id, role_id) SELECT $1, id FROM roles WHERE name = $2",
                )
                .bind(id)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_db_error("Failed to grant role", e))?;
            }

            tx.commit()
                .await
                .map_err(|e| map_db_error("Failed to commit user", e))?;

            tracing::info!(user_id = id, username = %user.username, roles = ?user.roles, "User created");

            Ok(User {
                id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                first_name: user.first_name,
                last_name: user.last_name,
                roles: user.roles,
                enabled: user.enabled,
            })
        })
    }

    fn count_users(&self) -> RepoFuture<'_, i64> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_db_error("Failed to count users", e))?;
            Ok(count)
        })
    }

    fn ensure_roles(&self, roles: &[Role]) -> RepoFuture<'_, ()> {
        let names: Vec<&'static str> = roles.iter().map(|role| role.as_str()).collect();
        Box::pin(async move {
            for name in names {
                sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                    .bind(name)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_db_error("Failed to insert role", e))?;
            }
            Ok(())
        })
    }

    fn count_roles(&self) -> RepoFuture<'_, i64> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM roles")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_db_error("Failed to count roles", e))?;
            Ok(count)
        })
    }
}
