//! HTTP layer: HTML pages, JSON endpoints and the router

pub mod accounts;
pub mod books;
pub mod catalog;
pub mod contact;
pub mod dashboard;
pub mod health;
pub mod openapi;
pub mod render;
pub mod security;

use std::time::Duration;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post, put},
    Router,
};
use axum_extra::{
    extract::CookieJar,
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::UserClaims, AppState};

/// Resolves the caller: bearer token first, then the session cookie.
///
/// The token only names the user; role and capabilities are read from the
/// store on every request. A bad bearer token is an error; a stale session
/// cookie just means the caller is anonymous.
pub(crate) async fn resolve_user(parts: &mut Parts, state: &AppState) -> Result<Option<UserClaims>, AppError> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
    {
        return state.services.users.resolve(bearer.token()).await.map(Some);
    }

    let jar = CookieJar::from_headers(&parts.headers);
    match jar.get(security::SESSION_COOKIE) {
        Some(cookie) => Ok(state.services.users.resolve(cookie.value()).await.ok()),
        None => Ok(None),
    }
}

/// Extractor for an authenticated user (401 otherwise)
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state)
            .await?
            .map(AuthenticatedUser)
            .ok_or_else(|| {
                AppError::AuthenticationRequired("Authentication credentials were not provided.".to_string())
            })
    }
}

/// Extractor for HTML pages that need a logged-in user: anonymous callers
/// are sent to the login page with a `next` pointing back here.
pub struct LoginRequired(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for LoginRequired {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match resolve_user(parts, state).await {
            Ok(Some(claims)) => Ok(LoginRequired(claims)),
            Ok(None) => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                Err(Redirect::to(&login_url(next)).into_response())
            }
            Err(e) => Err(e.into_response()),
        }
    }
}

pub fn login_url(next: &str) -> String {
    format!("/accounts/login/?next={}", urlencoding::encode(next))
}

/// Create the application router with all routes and layers
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let pages = Router::new()
        // Books
        .route("/books/", get(books::list_books))
        .route("/books/create/", get(books::create_form).post(books::create_book))
        .route("/books/secure-search/", get(books::search))
        .route("/books/secure-contact/", get(contact::contact_form).post(contact::submit_contact))
        .route("/books/:id/", get(books::book_detail))
        .route("/books/:id/edit/", get(books::edit_form).post(books::edit_book))
        .route("/books/:id/delete/", get(books::confirm_delete).post(books::delete_book))
        // Accounts
        .route("/accounts/register/", get(accounts::register_form).post(accounts::register))
        .route("/accounts/login/", get(accounts::login_form).post(accounts::login))
        .route("/accounts/logout/", post(accounts::logout))
        // Dashboards
        .route("/dashboard/", get(dashboard::dashboard))
        .route("/admin-dashboard/", get(dashboard::admin_dashboard))
        .route("/librarian-dashboard/", get(dashboard::librarian_dashboard))
        .route("/member-dashboard/", get(dashboard::member_dashboard))
        // Libraries
        .route("/libraries/:id/", get(catalog::library_page));

    let api = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/api/token/", post(accounts::obtain_token))
        .route("/api/books/", get(catalog::list_book_records))
        .route("/api/authors/", get(catalog::list_authors).post(catalog::create_author))
        .route("/api/libraries/", post(catalog::create_library))
        .route("/api/libraries/:id", get(catalog::get_library))
        .route("/api/libraries/:id/books", put(catalog::set_library_books))
        .route("/api/libraries/:id/librarian", post(catalog::create_librarian));

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .merge(pages)
        .merge(api)
        .with_state(state.clone())
        .merge(openapi::create_openapi_router())
        .layer(middleware::from_fn_with_state(state.clone(), security::csrf_protect))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(middleware::from_fn_with_state(state.clone(), security::security_headers))
        .layer(middleware::from_fn_with_state(state, security::https_redirect))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_url_encodes_next() {
        assert_eq!(login_url("/books/create/"), "/accounts/login/?next=%2Fbooks%2Fcreate%2F");
        assert_eq!(
            login_url("/books/?a=1&b=2"),
            "/accounts/login/?next=%2Fbooks%2F%3Fa%3D1%26b%3D2"
        );
    }
}
