//! PostgreSQL implementations of the store traits
//!
//! Every query runs under [`QUERY_TIMEOUT`]; a timeout is reported as
//! [`StoreError::Timeout`] and the in-flight query future is dropped.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::{
    MovieStore, PermissionStore, StoreError, StoreResult, TokenStore, UserStore, QUERY_TIMEOUT,
};
use crate::models::tokens::hash_token;
use crate::models::{Filters, Metadata, Movie, Permissions, Runtime, Scope, Token, User};

/// Run a query future with the store deadline applied
async fn bounded<T, F>(query: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, query).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => {
            tracing::warn!("Query exceeded {}s deadline", QUERY_TIMEOUT.as_secs());
            Err(StoreError::Timeout)
        }
    }
}

fn is_unique_violation(err: &StoreError) -> bool {
    match err {
        StoreError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    }
}

// =============================================================================
// Movies
// =============================================================================

#[derive(Debug, FromRow)]
struct MovieRow {
    id: i64,
    created_at: DateTime<Utc>,
    title: String,
    year: i32,
    runtime: i32,
    genres: Vec<String>,
    version: i32,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Self {
            id: row.id,
            created_at: row.created_at,
            title: row.title,
            year: row.year,
            runtime: Runtime(row.runtime),
            genres: row.genres,
            version: row.version,
        }
    }
}

#[derive(Debug, FromRow)]
struct CountedMovieRow {
    total_records: i64,
    #[sqlx(flatten)]
    movie: MovieRow,
}

pub struct PgMovieStore {
    pool: PgPool,
}

impl PgMovieStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MovieStore for PgMovieStore {
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()> {
        let (id, created_at, version): (i64, DateTime<Utc>, i32) = bounded(
            sqlx::query_as(
                r#"
                INSERT INTO movies (title, year, runtime, genres)
                VALUES ($1, $2, $3, $4)
                RETURNING id, created_at, version
                "#,
            )
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime.0)
            .bind(&movie.genres)
            .fetch_one(&self.pool),
        )
        .await?;

        movie.id = id;
        movie.created_at = created_at;
        movie.version = version;
        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Movie> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let row: Option<MovieRow> = bounded(
            sqlx::query_as(
                r#"
                SELECT id, created_at, title, year, runtime, genres, version
                FROM movies
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(Movie::from).ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &mut Movie) -> StoreResult<()> {
        let version: Option<i32> = bounded(
            sqlx::query_scalar(
                r#"
                UPDATE movies
                SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING version
                "#,
            )
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime.0)
            .bind(&movie.genres)
            .bind(movie.id)
            .bind(movie.version)
            .fetch_optional(&self.pool),
        )
        .await?;

        match version {
            Some(version) => {
                movie.version = version;
                Ok(())
            }
            None => Err(StoreError::EditConflict),
        }
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let result = bounded(
            sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> StoreResult<(Vec<Movie>, Metadata)> {
        let order = filters.sort_order().ok_or(StoreError::InvalidSort)?;
        if !filters.is_pageable() {
            return Ok((Vec::new(), Metadata::default()));
        }

        let query = format!(
            r#"
            SELECT count(*) OVER() AS total_records,
                   id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
              AND (genres @> $2 OR $2 = '{{}}')
            ORDER BY {} {}, id ASC
            LIMIT $3 OFFSET $4
            "#,
            order.column.column(),
            order.direction.keyword(),
        );

        let rows: Vec<CountedMovieRow> = bounded(
            sqlx::query_as(&query)
                .bind(title)
                .bind(genres)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool),
        )
        .await?;

        let total_records = rows.first().map_or(0, |row| row.total_records);
        let movies = rows.into_iter().map(|row| Movie::from(row.movie)).collect();
        let metadata = Metadata::calculate(total_records, filters.page, filters.page_size);

        Ok((movies, metadata))
    }
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    created_at: DateTime<Utc>,
    name: String,
    email: String,
    password_hash: String,
    activated: bool,
    version: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            created_at: row.created_at,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            activated: row.activated,
            version: row.version,
        }
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &mut User) -> StoreResult<()> {
        let inserted: StoreResult<(i64, DateTime<Utc>, i32)> = bounded(
            sqlx::query_as(
                r#"
                INSERT INTO users (name, email, password_hash, activated)
                VALUES ($1, $2, $3, $4)
                RETURNING id, created_at, version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .fetch_one(&self.pool),
        )
        .await;

        match inserted {
            Ok((id, created_at, version)) => {
                user.id = id;
                user.created_at = created_at;
                user.version = version;
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateEmail),
            Err(e) => Err(e),
        }
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let row: Option<UserRow> = bounded(
            sqlx::query_as(
                r#"
                SELECT id, created_at, name, email, password_hash, activated, version
                FROM users
                WHERE lower(email) = lower($1)
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &mut User) -> StoreResult<()> {
        let updated: StoreResult<Option<i32>> = bounded(
            sqlx::query_scalar(
                r#"
                UPDATE users
                SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.pool),
        )
        .await;

        match updated {
            Ok(Some(version)) => {
                user.version = version;
                Ok(())
            }
            Ok(None) => Err(StoreError::EditConflict),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateEmail),
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// Tokens
// =============================================================================

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: &Token) -> StoreResult<()> {
        bounded(
            sqlx::query(
                r#"
                INSERT INTO tokens (hash, user_id, expiry, scope)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&token.hash[..])
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> StoreResult<User> {
        let hash = hash_token(plaintext);

        let row: Option<UserRow> = bounded(
            sqlx::query_as(
                r#"
                SELECT users.id, users.created_at, users.name, users.email,
                       users.password_hash, users.activated, users.version
                FROM users
                INNER JOIN tokens ON users.id = tokens.user_id
                WHERE tokens.hash = $1
                  AND tokens.scope = $2
                  AND tokens.expiry > $3
                "#,
            )
            .bind(&hash[..])
            .bind(scope.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<()> {
        bounded(
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

// =============================================================================
// Permissions
// =============================================================================

pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    async fn get_all_for_user(&self, user_id: i64) -> StoreResult<Permissions> {
        let codes: Vec<String> = bounded(
            sqlx::query_scalar(
                r#"
                SELECT permissions.code
                FROM permissions
                INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                WHERE users_permissions.user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(Permissions::new(codes))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> StoreResult<()> {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();

        bounded(
            sqlx::query(
                r#"
                INSERT INTO users_permissions (user_id, permission_id)
                SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(&codes)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
