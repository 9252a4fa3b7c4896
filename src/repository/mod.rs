//! Repository layer: store traits and their backends.
//!
//! Every store is a trait so the services never know whether they talk to
//! PostgreSQL ([`books::BooksRepository`] and friends) or to the in-process
//! [`memory::MemoryStore`].

pub mod books;
pub mod catalog;
pub mod memory;
pub mod permissions;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookChanges, NewBook},
        catalog::{Author, Librarian, Library, LibraryDetail},
        permission::{Bundle, Capability, CapabilitySet},
        user::{NewUser, Role, User, UserProfile},
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    /// All books ordered by id
    async fn list(&self) -> AppResult<Vec<Book>>;

    /// Fails with `NotFound` when the id is unknown
    async fn get(&self, id: i64) -> AppResult<Book>;

    /// Fails with `Conflict` on a duplicate ISBN
    async fn create(&self, book: &NewBook) -> AppResult<Book>;

    async fn update(&self, id: i64, changes: &BookChanges) -> AppResult<Book>;

    async fn delete(&self, id: i64) -> AppResult<()>;

    /// Case-insensitive substring match on title OR author
    async fn search(&self, needle: &str, limit: i64) -> AppResult<Vec<Book>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_authors(&self) -> AppResult<Vec<Author>>;

    async fn create_author(&self, name: &str) -> AppResult<Author>;

    /// Unknown book ids fail with `NotFound`
    async fn create_library(&self, name: &str, book_ids: &[i64]) -> AppResult<Library>;

    async fn set_library_books(&self, library_id: i64, book_ids: &[i64]) -> AppResult<()>;

    async fn get_library(&self, id: i64) -> AppResult<LibraryDetail>;

    /// Fails with `Conflict` when the library already has a librarian
    async fn create_librarian(&self, library_id: i64, name: &str) -> AppResult<Librarian>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts the user and its profile in one transaction. Fails with
    /// `Conflict` when the username is taken (case-insensitive)
    async fn create_account(&self, user: &NewUser, role: Role) -> AppResult<(User, UserProfile)>;

    async fn get_by_id(&self, id: i64) -> AppResult<Option<User>>;

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>>;

    async fn username_exists(&self, username: &str) -> AppResult<bool>;

    async fn get_profile(&self, user_id: i64) -> AppResult<Option<UserProfile>>;

    /// Changes the user's role, creating the profile when missing
    async fn set_role(&self, user_id: i64, role: Role) -> AppResult<UserProfile>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Upserts each bundle, replaces its capabilities and attaches it to its
    /// role, all in one transaction
    async fn apply_bundles(&self, bundles: &[Bundle]) -> AppResult<()>;

    /// Bundles ordered by name
    async fn list_bundles(&self) -> AppResult<Vec<Bundle>>;

    async fn role_capabilities(&self, role: Role) -> AppResult<CapabilitySet>;

    async fn user_capabilities(&self, user_id: i64) -> AppResult<CapabilitySet>;

    async fn grant_user(&self, user_id: i64, capability: Capability) -> AppResult<()>;

    /// Manual grant on a bundle, outside reconciliation
    async fn grant_bundle(&self, bundle: &str, capability: Capability) -> AppResult<()>;
}

/// Handles to every store
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub users: Arc<dyn UserStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Repository {
    pub fn new(
        books: Arc<dyn BookStore>,
        catalog: Arc<dyn CatalogStore>,
        users: Arc<dyn UserStore>,
        permissions: Arc<dyn PermissionStore>,
    ) -> Self {
        Self {
            books,
            catalog,
            users,
            permissions,
        }
    }

    /// PostgreSQL-backed stores sharing one pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            catalog: Arc::new(catalog::CatalogRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            permissions: Arc::new(permissions::PermissionsRepository::new(pool)),
        }
    }

    /// In-process stores sharing one state
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self {
            books: store.clone(),
            catalog: store.clone(),
            users: store.clone(),
            permissions: store,
        }
    }
}

/// Escapes `%`, `_` and `\` so user text matches literally inside ILIKE
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("dune"), "%dune%");
        assert_eq!(like_pattern("100%_"), "%100\\%\\_%");
    }
}
