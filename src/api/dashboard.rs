//! Role dashboards

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
};

use super::{
    render::{Page, PageResult},
    LoginRequired,
};
use crate::{error::AppError, models::user::Role, AppState};

/// Sends the user to the dashboard of their role
pub async fn dashboard(LoginRequired(user): LoginRequired) -> PageResult {
    match user.role {
        Some(role) => Ok(Redirect::to(role.dashboard_path()).into_response()),
        None => Err(AppError::PermissionDenied("No role assigned to this account".to_string()).into()),
    }
}

fn role_dashboard(state: &AppState, user: &crate::models::UserClaims, page: Page, role: Role) -> PageResult {
    user.require_role(role)?;
    let mut context = page.context();
    context.insert("role", role.as_str());
    page.render(state, StatusCode::OK, "dashboard.html", context)
}

pub async fn admin_dashboard(State(state): State<AppState>, LoginRequired(user): LoginRequired, page: Page) -> PageResult {
    role_dashboard(&state, &user, page, Role::Admin)
}

pub async fn librarian_dashboard(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    page: Page,
) -> PageResult {
    role_dashboard(&state, &user, page, Role::Librarian)
}

pub async fn member_dashboard(State(state): State<AppState>, LoginRequired(user): LoginRequired, page: Page) -> PageResult {
    role_dashboard(&state, &user, page, Role::Member)
}
