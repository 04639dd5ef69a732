//! In-process store implementations
//!
//! Mirror the PostgreSQL semantics (optimistic versions, unique emails,
//! token expiry, safelisted sorting) over plain maps behind one mutex. The
//! lock is never held across an `.await`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{MovieStore, PermissionStore, StoreError, StoreResult, TokenStore, UserStore};
use crate::models::permissions::{MOVIES_READ, MOVIES_WRITE};
use crate::models::tokens::hash_token;
use crate::models::{
    Filters, Metadata, Movie, Permissions, Scope, SortColumn, SortDirection, Token, User,
};

/// Permission codes that exist in the catalog
const KNOWN_PERMISSIONS: &[&str] = &[MOVIES_READ, MOVIES_WRITE];

#[derive(Debug)]
struct StoredToken {
    hash: [u8; 32],
    user_id: i64,
    expiry: DateTime<Utc>,
    scope: Scope,
}

#[derive(Debug, Default)]
struct Tables {
    movies: BTreeMap<i64, Movie>,
    last_movie_id: i64,
    users: BTreeMap<i64, User>,
    last_user_id: i64,
    tokens: Vec<StoredToken>,
    permissions: HashMap<i64, BTreeSet<String>>,
}

impl Tables {
    fn email_taken(&self, email: &str, except_id: i64) -> bool {
        self.users
            .values()
            .any(|u| u.id != except_id && u.email.eq_ignore_ascii_case(email))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn compare_movies(a: &Movie, b: &Movie, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Id => a.id.cmp(&b.id),
        SortColumn::Title => a.title.cmp(&b.title),
        SortColumn::Year => a.year.cmp(&b.year),
        SortColumn::Runtime => a.runtime.cmp(&b.runtime),
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()> {
        let mut tables = self.lock();
        tables.last_movie_id += 1;
        movie.id = tables.last_movie_id;
        movie.created_at = Utc::now();
        movie.version = 1;
        tables.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Movie> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.lock()
            .movies
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &mut Movie) -> StoreResult<()> {
        let mut tables = self.lock();
        let stored = match tables.movies.get_mut(&movie.id) {
            Some(stored) if stored.version == movie.version => stored,
            _ => return Err(StoreError::EditConflict),
        };

        stored.title = movie.title.clone();
        stored.year = movie.year;
        stored.runtime = movie.runtime;
        stored.genres = movie.genres.clone();
        stored.version += 1;
        movie.version = stored.version;
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.lock()
            .movies
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
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
        let title = title.to_lowercase();

        let mut matching: Vec<Movie> = self
            .lock()
            .movies
            .values()
            .filter(|m| title.is_empty() || m.title.to_lowercase().contains(&title))
            .filter(|m| genres.iter().all(|g| m.genres.contains(g)))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let primary = compare_movies(a, b, order.column);
            let primary = match order.direction {
                SortDirection::Ascending => primary,
                SortDirection::Descending => primary.reverse(),
            };
            primary.then(a.id.cmp(&b.id))
        });

        let total_records = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(filters.offset()).unwrap_or(0))
            .take(usize::try_from(filters.limit()).unwrap_or(0))
            .collect();

        Ok((
            page,
            Metadata::calculate(total_records, filters.page, filters.page_size),
        ))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &mut User) -> StoreResult<()> {
        let mut tables = self.lock();
        if tables.email_taken(&user.email, 0) {
            return Err(StoreError::DuplicateEmail);
        }
        tables.last_user_id += 1;
        user.id = tables.last_user_id;
        user.created_at = Utc::now();
        user.version = 1;
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        self.lock()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &mut User) -> StoreResult<()> {
        let mut tables = self.lock();
        if tables.email_taken(&user.email, user.id) {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = match tables.users.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => stored,
            _ => return Err(StoreError::EditConflict),
        };

        stored.name = user.name.clone();
        stored.email = user.email.clone();
        stored.password_hash = user.password_hash.clone();
        stored.activated = user.activated;
        stored.version += 1;
        user.version = stored.version;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &Token) -> StoreResult<()> {
        self.lock().tokens.push(StoredToken {
            hash: token.hash,
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        });
        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> StoreResult<User> {
        let hash = hash_token(plaintext);
        let now = Utc::now();
        let tables = self.lock();

        tables
            .tokens
            .iter()
            .find(|t| t.hash == hash && t.scope == scope && t.expiry > now)
            .and_then(|t| tables.users.get(&t.user_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<()> {
        self.lock()
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> StoreResult<Permissions> {
        Ok(self
            .lock()
            .permissions
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> StoreResult<()> {
        let mut tables = self.lock();
        let granted = tables.permissions.entry(user_id).or_default();
        for code in codes.iter().filter(|c| KNOWN_PERMISSIONS.contains(c)) {
            granted.insert(code.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::filters::MOVIE_SORT_SAFELIST;
    use crate::models::Runtime;

    fn movie(title: &str, year: i32, runtime: i32, genres: &[&str]) -> Movie {
        Movie::new(
            title.to_string(),
            year,
            Runtime(runtime),
            genres.iter().map(|g| g.to_string()).collect(),
        )
    }

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters {
            page,
            page_size,
            sort: sort.to_string(),
            sort_safelist: MOVIE_SORT_SAFELIST,
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for mut m in [
            movie("Casablanca", 1942, 102, &["drama", "romance", "war"]),
            movie("Black Panther", 2018, 134, &["action", "adventure"]),
            movie("The Breakfast Club", 1985, 97, &["comedy", "drama"]),
            movie("Moana", 2016, 107, &["animation", "adventure"]),
        ] {
            MovieStore::insert(&store, &mut m).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_version() {
        let store = MemoryStore::new();
        let mut m = movie("Casablanca", 1942, 102, &["drama"]);
        MovieStore::insert(&store, &mut m).await.unwrap();

        assert_eq!(m.id, 1);
        assert_eq!(m.version, 1);
        assert_eq!(MovieStore::get(&store, 1).await.unwrap(), m);
    }

    #[tokio::test]
    async fn test_get_and_delete_reject_non_positive_ids() {
        let store = seeded().await;
        for id in [0, -1, i64::MIN] {
            assert!(matches!(MovieStore::get(&store, id).await, Err(StoreError::NotFound)));
            assert!(matches!(store.delete(id).await, Err(StoreError::NotFound)));
        }
        assert!(matches!(store.delete(99).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let store = seeded().await;
        let mut first = MovieStore::get(&store, 1).await.unwrap();
        let mut second = first.clone();

        first.year = 1943;
        MovieStore::update(&store, &mut first).await.unwrap();
        assert_eq!(first.version, 2);

        second.title = "Casablanca (Remastered)".to_string();
        assert!(matches!(
            MovieStore::update(&store, &mut second).await,
            Err(StoreError::EditConflict)
        ));

        let stored = MovieStore::get(&store, 1).await.unwrap();
        assert_eq!(stored.year, 1943);
        assert_eq!(stored.title, "Casablanca");
    }

    #[tokio::test]
    async fn test_get_all_filters_and_sorts() {
        let store = seeded().await;

        let (movies, metadata) = store
            .get_all("", &["adventure".to_string()], &filters(1, 20, "-year"))
            .await
            .unwrap();
        let titles: Vec<_> = movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Black Panther", "Moana"]);
        assert_eq!(metadata.total_records, 2);

        let (movies, _) = store
            .get_all("BREAKFAST", &[], &filters(1, 20, "id"))
            .await
            .unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "The Breakfast Club");
    }

    #[tokio::test]
    async fn test_get_all_paginates() {
        let store = seeded().await;

        let (movies, metadata) = store.get_all("", &[], &filters(2, 3, "runtime")).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Black Panther");
        assert_eq!(metadata.current_page, 2);
        assert_eq!(metadata.last_page, 2);
        assert_eq!(metadata.total_records, 4);

        let (movies, metadata) = store.get_all("", &[], &filters(5, 3, "id")).await.unwrap();
        assert!(movies.is_empty());
        assert_eq!(metadata.total_records, 4);
    }

    #[tokio::test]
    async fn test_get_all_with_empty_page_window() {
        let store = seeded().await;

        for f in [filters(1, 0, "id"), filters(0, 20, "id"), filters(-2, -5, "-year")] {
            let (movies, metadata) = store.get_all("", &[], &f).await.unwrap();
            assert!(movies.is_empty());
            assert_eq!(metadata, Metadata::default());
        }
    }

    #[tokio::test]
    async fn test_get_all_rejects_unlisted_sort() {
        let store = seeded().await;
        let result = store.get_all("", &[], &filters(1, 20, "created_at")).await;
        assert!(matches!(result, Err(StoreError::InvalidSort)));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        let mut alice = User::new("Alice".into(), "alice@example.com".into(), "h".into());
        UserStore::insert(&store, &mut alice).await.unwrap();

        let mut again = User::new("Alice 2".into(), "ALICE@example.com".into(), "h".into());
        assert!(matches!(
            UserStore::insert(&store, &mut again).await,
            Err(StoreError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn test_token_round_trip_and_expiry() {
        let store = MemoryStore::new();
        let mut user = User::new("Alice".into(), "alice@example.com".into(), "h".into());
        UserStore::insert(&store, &mut user).await.unwrap();

        let token = store
            .new_token(user.id, chrono::Duration::hours(1), Scope::Authentication)
            .await
            .unwrap();
        let owner = store
            .get_for_token(Scope::Authentication, &token.plaintext)
            .await
            .unwrap();
        assert_eq!(owner.id, user.id);

        // Same plaintext, different scope
        assert!(matches!(
            store.get_for_token(Scope::Activation, &token.plaintext).await,
            Err(StoreError::NotFound)
        ));

        let expired = store
            .new_token(user.id, chrono::Duration::zero(), Scope::Authentication)
            .await
            .unwrap();
        assert!(matches!(
            store.get_for_token(Scope::Authentication, &expired.plaintext).await,
            Err(StoreError::NotFound)
        ));

        store
            .delete_all_for_user(Scope::Authentication, user.id)
            .await
            .unwrap();
        assert!(matches!(
            store.get_for_token(Scope::Authentication, &token.plaintext).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_permissions_only_grant_known_codes() {
        let store = MemoryStore::new();
        store
            .add_for_user(1, &[MOVIES_READ, "movies:destroy"])
            .await
            .unwrap();

        let permissions = store.get_all_for_user(1).await.unwrap();
        assert!(permissions.include(MOVIES_READ));
        assert!(!permissions.include("movies:destroy"));
        assert!(store.get_all_for_user(2).await.unwrap().is_empty());
    }
}
