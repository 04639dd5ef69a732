pub mod memory;
pub mod pool;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::models::{Filters, Metadata, Movie, Permissions, Scope, Token, User};

pub use memory::MemoryStore;
pub use pool::create_pool;
pub use postgres::{PgMovieStore, PgPermissionStore, PgTokenStore, PgUserStore};

/// Upper bound on any single storage call
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures surfaced by the stores, already classified for callers
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("invalid sort value")]
    InvalidSort,

    #[error("query exceeded {}s timeout", QUERY_TIMEOUT.as_secs())]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Movie catalog persistence
#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Store a new movie, filling in `id`, `created_at` and `version`
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()>;

    async fn get(&self, id: i64) -> StoreResult<Movie>;

    /// Write `movie` back if its `version` is still current
    ///
    /// On success `movie.version` holds the new version. A version that was
    /// already advanced by another writer yields [`StoreError::EditConflict`].
    async fn update(&self, movie: &mut Movie) -> StoreResult<()>;

    async fn delete(&self, id: i64) -> StoreResult<()>;

    /// One page of movies matching `title` and `genres`, plus paging metadata
    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> StoreResult<(Vec<Movie>, Metadata)>;
}

/// User account persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &mut User) -> StoreResult<()>;

    async fn get_by_email(&self, email: &str) -> StoreResult<User>;

    /// Optimistic update keyed on `user.version`, like [`MovieStore::update`]
    async fn update(&self, user: &mut User) -> StoreResult<()>;
}

/// Token persistence; only token hashes are ever stored
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> StoreResult<()>;

    /// The owner of an unexpired token with this scope and plaintext
    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> StoreResult<User>;

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<()>;

    /// Generate and persist a token, returning it with its plaintext
    async fn new_token(
        &self,
        user_id: i64,
        ttl: chrono::Duration,
        scope: Scope,
    ) -> StoreResult<Token> {
        let token = Token::generate(user_id, ttl, scope);
        self.insert(&token).await?;
        Ok(token)
    }
}

/// User permission grants
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> StoreResult<Permissions>;

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> StoreResult<()>;
}

/// All stores used by the handlers
#[derive(Clone)]
pub struct Models {
    pub movies: Arc<dyn MovieStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Models {
    /// PostgreSQL-backed stores sharing one pool
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            movies: Arc::new(PgMovieStore::new(pool.clone())),
            users: Arc::new(PgUserStore::new(pool.clone())),
            tokens: Arc::new(PgTokenStore::new(pool.clone())),
            permissions: Arc::new(PgPermissionStore::new(pool)),
        }
    }

    /// Process-local stores, used in tests and for running without a database
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            movies: store.clone(),
            users: store.clone(),
            tokens: store.clone(),
            permissions: store,
        }
    }
}
