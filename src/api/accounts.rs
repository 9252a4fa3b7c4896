//! Registration, login, logout and the token endpoint

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Form, Json,
};
use serde::Deserialize;

use super::{
    render::{Page, PageResult},
    security,
};
use crate::{
    error::{AppError, AppResult, FieldErrors},
    models::user::{LoginForm, RegisterForm, TokenRequest, TokenResponse, UserClaims},
    AppState,
};

const DEFAULT_LANDING: &str = "/dashboard/";

/// Only same-site paths are accepted as a post-login target
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => path,
        _ => DEFAULT_LANDING,
    }
}

/// Sets the session cookie and redirects
fn start_session(page: Page, token: String, to: &str) -> axum::response::Response {
    let jar = page.jar().add(security::session_cookie(token, page.secure_cookies()));
    (jar, Redirect::to(to)).into_response()
}

fn register_page(state: &AppState, page: Page, status: StatusCode, form: &RegisterForm, errors: &FieldErrors) -> PageResult {
    let mut context = page.context();
    context.insert("form", form);
    context.insert("errors", errors);
    page.render(state, status, "register.html", context)
}

pub async fn register_form(State(state): State<AppState>, page: Page) -> PageResult {
    register_page(&state, page, StatusCode::OK, &RegisterForm::default(), &FieldErrors::new())
}

pub async fn register(State(state): State<AppState>, page: Page, Form(form): Form<RegisterForm>) -> PageResult {
    match state.services.users.register(&form).await {
        Ok(user) => {
            let (token, _) = state.services.users.issue_token(&user).await?;
            Ok(start_session(page, token, DEFAULT_LANDING))
        }
        Err(AppError::Validation(errors)) => register_page(&state, page, StatusCode::BAD_REQUEST, &form, &errors),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NextParam {
    pub next: Option<String>,
}

fn login_page(state: &AppState, page: Page, status: StatusCode, form: &LoginForm, errors: &FieldErrors) -> PageResult {
    let mut context = page.context();
    context.insert("form", form);
    context.insert("next", &form.next);
    context.insert("errors", errors);
    page.render(state, status, "login.html", context)
}

pub async fn login_form(State(state): State<AppState>, page: Page, Query(params): Query<NextParam>) -> PageResult {
    let form = LoginForm {
        next: params.next,
        ..LoginForm::default()
    };
    login_page(&state, page, StatusCode::OK, &form, &FieldErrors::new())
}

pub async fn login(State(state): State<AppState>, page: Page, Form(form): Form<LoginForm>) -> PageResult {
    match state.services.users.login(&form.username, &form.password).await {
        Ok((token, _)) => {
            let target = safe_next(form.next.as_deref()).to_string();
            Ok(start_session(page, token, &target))
        }
        Err(AppError::Authentication(msg)) => {
            let errors = FieldErrors::single(FieldErrors::NON_FIELD, msg);
            login_page(&state, page, StatusCode::BAD_REQUEST, &form, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(State(state): State<AppState>, page: Page) -> PageResult {
    if let Some(user) = &page.user {
        tracing::info!(user_id = user.user_id, "User logged out");
    }
    let jar = security::clear_session(page.jar());
    let mut context = page.context();
    context.insert("user", &Option::<UserClaims>::None);
    let response = page.render(&state, StatusCode::OK, "logged_out.html", context)?;
    Ok((jar, response).into_response())
}

/// Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/api/token/",
    tag = "auth",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let response = state
        .services
        .users
        .token_response(&request.username, &request.password)
        .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_be_a_local_path() {
        assert_eq!(safe_next(Some("/books/create/")), "/books/create/");
        assert_eq!(safe_next(Some("https://evil.example/")), DEFAULT_LANDING);
        assert_eq!(safe_next(Some("//evil.example/")), DEFAULT_LANDING);
        assert_eq!(safe_next(None), DEFAULT_LANDING);
    }
}
