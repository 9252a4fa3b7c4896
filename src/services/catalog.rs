//! Authors, libraries and librarians

use validator::Validate;

use crate::{
    error::{AppError, AppResult, FieldErrors},
    models::{
        catalog::{Author, CreateAuthor, CreateLibrarian, CreateLibrary, Librarian, LibraryDetail},
        permission::Capability,
        user::UserClaims,
    },
    repository::Repository,
    sanitize,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

fn validate(payload: &impl Validate) -> AppResult<()> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(FieldErrors::from(e)))
}

/// Markup-free name; a name made only of tags is missing
fn required_name(raw: &str) -> AppResult<String> {
    let name = sanitize::strip_markup(raw);
    if name.is_empty() {
        return Err(AppError::Validation(FieldErrors::single("name", "This field is required.")));
    }
    Ok(name)
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.repository.catalog.list_authors().await
    }

    pub async fn create_author(&self, user: &UserClaims, payload: &CreateAuthor) -> AppResult<Author> {
        user.require(Capability::CanCreate)?;
        validate(payload)?;
        let name = required_name(&payload.name)?;
        self.repository.catalog.create_author(&name).await
    }

    /// Staff only
    pub async fn create_library(&self, user: &UserClaims, payload: &CreateLibrary) -> AppResult<LibraryDetail> {
        user.require_staff()?;
        validate(payload)?;
        let name = required_name(&payload.name)?;
        let library = self
            .repository
            .catalog
            .create_library(&name, &payload.book_ids)
            .await?;
        tracing::info!(library_id = library.id, books = payload.book_ids.len(), "Library created");
        self.repository.catalog.get_library(library.id).await
    }

    /// Replaces the library's book set. Staff only
    pub async fn set_library_books(
        &self,
        user: &UserClaims,
        library_id: i64,
        book_ids: &[i64],
    ) -> AppResult<LibraryDetail> {
        user.require_staff()?;
        self.repository.catalog.set_library_books(library_id, book_ids).await?;
        self.repository.catalog.get_library(library_id).await
    }

    /// One librarian per library. Staff only
    pub async fn create_librarian(
        &self,
        user: &UserClaims,
        library_id: i64,
        payload: &CreateLibrarian,
    ) -> AppResult<Librarian> {
        user.require_staff()?;
        validate(payload)?;
        let name = required_name(&payload.name)?;
        self.repository.catalog.create_librarian(library_id, &name).await
    }

    pub async fn get_library(&self, id: i64) -> AppResult<LibraryDetail> {
        self.repository.catalog.get_library(id).await
    }
}
