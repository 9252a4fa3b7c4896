//! In-process store implementing every store trait.
//!
//! Used for local development (`database.url = "memory://"`) and by the
//! router tests. One `RwLock` guards the whole state, so each operation is
//! atomic with respect to the others.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{BookStore, CatalogStore, PermissionStore, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookChanges, BookRecord, NewBook},
        catalog::{Author, Librarian, Library, LibraryDetail},
        permission::{Bundle, Capability, CapabilitySet},
        user::{NewUser, Role, User, UserProfile},
    },
};

#[derive(Default)]
struct State {
    books: BTreeMap<i64, Book>,
    authors: BTreeMap<i64, Author>,
    libraries: BTreeMap<i64, Library>,
    library_books: BTreeMap<i64, BTreeSet<i64>>,
    librarians: BTreeMap<i64, Librarian>,
    users: BTreeMap<i64, User>,
    profiles: HashMap<i64, UserProfile>,
    bundles: BTreeMap<String, (Option<Role>, CapabilitySet)>,
    user_grants: HashMap<i64, CapabilitySet>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_books_exist(&self, book_ids: &[i64]) -> AppResult<()> {
        if book_ids.iter().all(|id| self.books.contains_key(id)) {
            Ok(())
        } else {
            Err(AppError::NotFound("One or more books do not exist".to_string()))
        }
    }

    fn isbn_taken(&self, isbn: &str) -> bool {
        self.books.values().any(|b| b.isbn.as_deref() == Some(isbn))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn book_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

fn library_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Library with id {} not found", id))
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn list(&self) -> AppResult<Vec<Book>> {
        let state = self.state.read().await;
        Ok(state.books.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> AppResult<Book> {
        let state = self.state.read().await;
        state.books.get(&id).cloned().ok_or_else(|| book_not_found(id))
    }

    async fn create(&self, book: &NewBook) -> AppResult<Book> {
        let mut state = self.state.write().await;
        if let Some(isbn) = &book.isbn {
            if state.isbn_taken(isbn) {
                return Err(AppError::Conflict("A book with this ISBN already exists".to_string()));
            }
        }

        let id = state.next_id();
        let created = Book {
            id,
            title: book.title.clone(),
            author: book.author.clone(),
            publication_year: book.publication_year,
            is_available: book.is_available,
            isbn: book.isbn.clone(),
        };
        state.books.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, changes: &BookChanges) -> AppResult<Book> {
        let mut state = self.state.write().await;
        let book = state.books.get_mut(&id).ok_or_else(|| book_not_found(id))?;
        book.title = changes.title.clone();
        book.author = changes.author.clone();
        book.publication_year = changes.publication_year;
        Ok(book.clone())
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.books.remove(&id).ok_or_else(|| book_not_found(id))?;
        for books in state.library_books.values_mut() {
            books.remove(&id);
        }
        Ok(())
    }

    async fn search(&self, needle: &str, limit: i64) -> AppResult<Vec<Book>> {
        let needle = needle.to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .books
            .values()
            .filter(|b| {
                b.title.to_lowercase().contains(&needle) || b.author.to_lowercase().contains(&needle)
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_authors(&self) -> AppResult<Vec<Author>> {
        let state = self.state.read().await;
        let mut authors: Vec<Author> = state.authors.values().cloned().collect();
        authors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(authors)
    }

    async fn create_author(&self, name: &str) -> AppResult<Author> {
        let mut state = self.state.write().await;
        let id = state.next_id();
        let author = Author {
            id,
            name: name.to_string(),
        };
        state.authors.insert(id, author.clone());
        Ok(author)
    }

    async fn create_library(&self, name: &str, book_ids: &[i64]) -> AppResult<Library> {
        let mut state = self.state.write().await;
        state.ensure_books_exist(book_ids)?;

        let id = state.next_id();
        let library = Library {
            id,
            name: name.to_string(),
        };
        state.libraries.insert(id, library.clone());
        state.library_books.insert(id, book_ids.iter().copied().collect());
        Ok(library)
    }

    async fn set_library_books(&self, library_id: i64, book_ids: &[i64]) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.libraries.contains_key(&library_id) {
            return Err(library_not_found(library_id));
        }
        state.ensure_books_exist(book_ids)?;
        state.library_books.insert(library_id, book_ids.iter().copied().collect());
        Ok(())
    }

    async fn get_library(&self, id: i64) -> AppResult<LibraryDetail> {
        let state = self.state.read().await;
        let library = state.libraries.get(&id).ok_or_else(|| library_not_found(id))?;
        let books = state
            .library_books
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|book_id| state.books.get(book_id))
                    .map(BookRecord::from)
                    .collect()
            })
            .unwrap_or_default();
        let librarian = state.librarians.values().find(|l| l.library_id == id).cloned();

        Ok(LibraryDetail {
            id: library.id,
            name: library.name.clone(),
            books,
            librarian,
        })
    }

    async fn create_librarian(&self, library_id: i64, name: &str) -> AppResult<Librarian> {
        let mut state = self.state.write().await;
        if !state.libraries.contains_key(&library_id) {
            return Err(library_not_found(library_id));
        }
        if state.librarians.values().any(|l| l.library_id == library_id) {
            return Err(AppError::Conflict("This library already has a librarian".to_string()));
        }

        let id = state.next_id();
        let librarian = Librarian {
            id,
            name: name.to_string(),
            library_id,
        };
        state.librarians.insert(id, librarian.clone());
        Ok(librarian)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_account(&self, user: &NewUser, role: Role) -> AppResult<(User, UserProfile)> {
        let mut state = self.state.write().await;
        let wanted = user.username.to_lowercase();
        if state.users.values().any(|u| u.username.to_lowercase() == wanted) {
            return Err(AppError::Conflict("A user with that username already exists.".to_string()));
        }

        let id = state.next_id();
        let created = User {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            is_active: true,
            date_joined: Utc::now(),
        };
        let profile = UserProfile::new(id, role);
        state.users.insert(id, created.clone());
        state.profiles.insert(id, profile.clone());
        Ok((created, profile))
    }

    async fn get_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let wanted = username.to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username.to_lowercase() == wanted)
            .cloned())
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        Ok(self.get_by_username(username).await?.is_some())
    }

    async fn get_profile(&self, user_id: i64) -> AppResult<Option<UserProfile>> {
        let state = self.state.read().await;
        Ok(state.profiles.get(&user_id).cloned())
    }

    async fn set_role(&self, user_id: i64, role: Role) -> AppResult<UserProfile> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
        }
        let profile = state
            .profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::new(user_id, role));
        profile.role = role;
        Ok(profile.clone())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn apply_bundles(&self, bundles: &[Bundle]) -> AppResult<()> {
        let mut state = self.state.write().await;
        for bundle in bundles {
            for (name, (role, _)) in state.bundles.iter_mut() {
                if *role == Some(bundle.role) && *name != bundle.name {
                    *role = None;
                }
            }
            state
                .bundles
                .insert(bundle.name.clone(), (Some(bundle.role), bundle.capabilities.clone()));
        }
        Ok(())
    }

    async fn list_bundles(&self) -> AppResult<Vec<Bundle>> {
        let state = self.state.read().await;
        Ok(state
            .bundles
            .iter()
            .filter_map(|(name, (role, capabilities))| {
                role.map(|role| Bundle {
                    name: name.clone(),
                    role,
                    capabilities: capabilities.clone(),
                })
            })
            .collect())
    }

    async fn role_capabilities(&self, role: Role) -> AppResult<CapabilitySet> {
        let state = self.state.read().await;
        Ok(state
            .bundles
            .values()
            .find(|(bundle_role, _)| *bundle_role == Some(role))
            .map(|(_, capabilities)| capabilities.clone())
            .unwrap_or_default())
    }

    async fn user_capabilities(&self, user_id: i64) -> AppResult<CapabilitySet> {
        let state = self.state.read().await;
        Ok(state.user_grants.get(&user_id).cloned().unwrap_or_default())
    }

    async fn grant_user(&self, user_id: i64, capability: Capability) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
        }
        state.user_grants.entry(user_id).or_default().insert(capability);
        Ok(())
    }

    async fn grant_bundle(&self, bundle: &str, capability: Capability) -> AppResult<()> {
        let mut state = self.state.write().await;
        let (_, capabilities) = state
            .bundles
            .get_mut(bundle)
            .ok_or_else(|| AppError::NotFound(format!("Bundle {} not found", bundle)))?;
        capabilities.insert(capability);
        Ok(())
    }
}
