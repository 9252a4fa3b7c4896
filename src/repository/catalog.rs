//! Authors, libraries and librarians

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::CatalogStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookRecord},
        catalog::{Author, Librarian, Library, LibraryDetail},
    },
};

#[derive(Clone)]
pub struct CatalogRepository {
    pool: Pool<Postgres>,
}

impl CatalogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn ensure_books_exist(&self, book_ids: &[i64]) -> AppResult<()> {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE id = ANY($1)")
            .bind(book_ids)
            .fetch_one(&self.pool)
            .await?;

        let mut unique = book_ids.to_vec();
        unique.sort_unstable();
        unique.dedup();
        if found != unique.len() as i64 {
            return Err(AppError::NotFound("One or more books do not exist".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    async fn list_authors(&self) -> AppResult<Vec<Author>> {
        let authors = sqlx::query_as::<_, Author>("SELECT id, name FROM authors ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(authors)
    }

    async fn create_author(&self, name: &str) -> AppResult<Author> {
        let author = sqlx::query_as::<_, Author>("INSERT INTO authors (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(author)
    }

    async fn create_library(&self, name: &str, book_ids: &[i64]) -> AppResult<Library> {
        self.ensure_books_exist(book_ids).await?;

        let mut tx = self.pool.begin().await?;
        let library = sqlx::query_as::<_, Library>("INSERT INTO libraries (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO library_books (library_id, book_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(library.id)
        .bind(book_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(library)
    }

    async fn set_library_books(&self, library_id: i64, book_ids: &[i64]) -> AppResult<()> {
        self.ensure_books_exist(book_ids).await?;

        let mut tx = self.pool.begin().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM libraries WHERE id = $1)")
            .bind(library_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(AppError::NotFound(format!("Library with id {} not found", library_id)));
        }

        sqlx::query("DELETE FROM library_books WHERE library_id = $1")
            .bind(library_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO library_books (library_id, book_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(library_id)
        .bind(book_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_library(&self, id: i64) -> AppResult<LibraryDetail> {
        let library = sqlx::query_as::<_, Library>("SELECT id, name FROM libraries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Library with id {} not found", id)))?;

        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT b.id, b.title, b.author, b.publication_year, b.is_available, b.isbn
            FROM books b
            JOIN library_books lb ON lb.book_id = b.id
            WHERE lb.library_id = $1
            ORDER BY b.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let librarian = sqlx::query_as::<_, Librarian>(
            "SELECT id, name, library_id FROM librarians WHERE library_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(LibraryDetail {
            id: library.id,
            name: library.name,
            books: books.into_iter().map(BookRecord::from).collect(),
            librarian,
        })
    }

    async fn create_librarian(&self, library_id: i64, name: &str) -> AppResult<Librarian> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM libraries WHERE id = $1)")
            .bind(library_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(AppError::NotFound(format!("Library with id {} not found", library_id)));
        }

        sqlx::query_as::<_, Librarian>(
            "INSERT INTO librarians (name, library_id) VALUES ($1, $2) RETURNING id, name, library_id",
        )
        .bind(name)
        .bind(library_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_db(e, "This library already has a librarian"))
    }
}
