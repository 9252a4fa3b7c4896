//! OpenAPI documentation for the JSON endpoints

use axum::Router;
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{accounts, catalog, health};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bookshelf API",
        version = "0.3.0",
        description = "JSON endpoints of the Bookshelf catalog server",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        accounts::obtain_token,
        // Catalog
        catalog::list_book_records,
        catalog::list_authors,
        catalog::create_author,
        catalog::create_library,
        catalog::get_library,
        catalog::set_library_books,
        catalog::create_librarian,
    ),
    components(
        schemas(
            crate::models::user::TokenRequest,
            crate::models::user::TokenResponse,
            crate::models::book::BookRecord,
            crate::models::catalog::Author,
            crate::models::catalog::Library,
            crate::models::catalog::Librarian,
            crate::models::catalog::LibraryDetail,
            crate::models::catalog::CreateAuthor,
            crate::models::catalog::CreateLibrary,
            crate::models::catalog::SetLibraryBooks,
            crate::models::catalog::CreateLibrarian,
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
            crate::error::FieldErrors,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Token authentication"),
        (name = "books", description = "Book records"),
        (name = "catalog", description = "Authors, libraries and librarians")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
