//! Book operations behind capability checks

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookInput, BookRecord, SearchForm, SEARCH_RESULT_LIMIT},
        permission::Capability,
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct BooksService {
    repository: Repository,
}

impl BooksService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// All books ordered by id
    pub async fn list(&self, user: &UserClaims) -> AppResult<Vec<Book>> {
        user.require(Capability::CanView)?;
        self.repository.books.list().await
    }

    pub async fn get(&self, user: &UserClaims, id: i64) -> AppResult<Book> {
        user.require(Capability::CanView)?;
        self.repository.books.get(id).await
    }

    /// Inserts a new book; it starts out available
    pub async fn create(&self, user: &UserClaims, input: BookInput) -> AppResult<Book> {
        user.require(Capability::CanCreate)?;
        let book = self.repository.books.create(&input.into_new_book()).await?;
        tracing::info!(book_id = book.id, user = %user.sub, "Book created");
        Ok(book)
    }

    /// Loads a book for the edit form
    pub async fn get_for_edit(&self, user: &UserClaims, id: i64) -> AppResult<Book> {
        user.require(Capability::CanEdit)?;
        self.repository.books.get(id).await
    }

    pub async fn update(&self, user: &UserClaims, id: i64, input: &BookInput) -> AppResult<Book> {
        user.require(Capability::CanEdit)?;
        let book = self.repository.books.update(id, &input.changes()).await?;
        tracing::info!(book_id = id, user = %user.sub, "Book updated");
        Ok(book)
    }

    /// Loads a book for the delete confirmation page
    pub async fn get_for_delete(&self, user: &UserClaims, id: i64) -> AppResult<Book> {
        user.require(Capability::CanDelete)?;
        self.repository.books.get(id).await
    }

    pub async fn delete(&self, user: &UserClaims, id: i64) -> AppResult<()> {
        user.require(Capability::CanDelete)?;
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, user = %user.sub, "Book deleted");
        Ok(())
    }

    /// Public search over title and author.
    ///
    /// The raw query is length-checked, then sanitized; a query that is
    /// empty once sanitized yields no results without reaching the store.
    pub async fn search(&self, raw: &str) -> AppResult<Vec<Book>> {
        let query = SearchForm::clean(raw).map_err(AppError::Validation)?;
        if query.is_empty() {
            tracing::debug!("Search query empty after sanitization");
            return Ok(Vec::new());
        }
        self.repository.books.search(&query, SEARCH_RESULT_LIMIT).await
    }

    /// Every book as its wire record
    pub async fn records(&self) -> AppResult<Vec<BookRecord>> {
        let books = self.repository.books.list().await?;
        Ok(books.into_iter().map(BookRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::{
        models::permission::CapabilitySet,
        repository::{MockBookStore, MockCatalogStore, MockPermissionStore, MockUserStore},
    };

    fn service(books: MockBookStore) -> BooksService {
        BooksService::new(Repository::new(
            Arc::new(books),
            Arc::new(MockCatalogStore::new()),
            Arc::new(MockUserStore::new()),
            Arc::new(MockPermissionStore::new()),
        ))
    }

    fn user(capabilities: &[Capability]) -> UserClaims {
        UserClaims {
            sub: "reader".to_string(),
            user_id: 1,
            role: None,
            capabilities: capabilities.iter().copied().collect::<CapabilitySet>(),
            is_staff: false,
            is_superuser: false,
            exp: Utc::now().timestamp() + 60,
            iat: Utc::now().timestamp(),
        }
    }

    fn dune() -> Book {
        Book {
            id: 1,
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            publication_year: 1965,
            is_available: true,
            isbn: None,
        }
    }

    #[tokio::test]
    async fn list_without_view_never_reaches_the_store() {
        let mut books = MockBookStore::new();
        books.expect_list().times(0);

        let result = service(books).list(&user(&[])).await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn delete_requires_delete_capability() {
        let mut books = MockBookStore::new();
        books.expect_delete().times(0);

        let editor = user(&[Capability::CanView, Capability::CanCreate, Capability::CanEdit]);
        let result = service(books).delete(&editor, 1).await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn create_marks_book_available() {
        let mut books = MockBookStore::new();
        books
            .expect_create()
            .withf(|book| book.is_available && book.title == "Dune")
            .times(1)
            .returning(|_| Ok(dune()));

        let input = BookInput {
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            publication_year: 1965,
            isbn: None,
        };
        let created = service(books)
            .create(&user(&[Capability::CanCreate]), input)
            .await
            .unwrap();
        assert_eq!(created.id, 1);
    }

    #[tokio::test]
    async fn search_rejects_short_query_without_store_access() {
        let mut books = MockBookStore::new();
        books.expect_search().times(0);

        let result = service(books).search("a").await;
        match result {
            Err(AppError::Validation(errors)) => assert!(errors.contains("query")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn search_emptied_by_sanitizer_returns_nothing() {
        let mut books = MockBookStore::new();
        books.expect_search().times(0);

        let results = service(books).search("DROP SELECT").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_passes_sanitized_query_and_limit() {
        let mut books = MockBookStore::new();
        books
            .expect_search()
            .withf(|needle, limit| needle == "Dune" && *limit == 50)
            .times(1)
            .returning(|_, _| Ok(vec![dune()]));

        let results = service(books).search("<b>Dune</b> DROP").await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
