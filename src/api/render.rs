//! Template rendering, page context and flash messages

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use tera::{Context, Tera};

use super::{resolve_user, security};
use crate::{
    error::AppError,
    models::{permission::Capability, user::UserClaims},
    AppState,
};

pub const FLASH_COOKIE: &str = "messages";

const TEMPLATES: [(&str, &str); 13] = [
    ("base.html", include_str!("../../templates/base.html")),
    ("book_list.html", include_str!("../../templates/book_list.html")),
    ("book_detail.html", include_str!("../../templates/book_detail.html")),
    ("book_form.html", include_str!("../../templates/book_form.html")),
    ("book_confirm_delete.html", include_str!("../../templates/book_confirm_delete.html")),
    ("search.html", include_str!("../../templates/search.html")),
    ("contact.html", include_str!("../../templates/contact.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("register.html", include_str!("../../templates/register.html")),
    ("logged_out.html", include_str!("../../templates/logged_out.html")),
    ("dashboard.html", include_str!("../../templates/dashboard.html")),
    ("library_detail.html", include_str!("../../templates/library_detail.html")),
    ("error.html", include_str!("../../templates/error.html")),
];

/// Compiled templates. Names end in `.html`, so Tera autoescapes them.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.to_vec())?;
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String, tera::Error> {
        self.tera.render(name, context)
    }
}

/// Error from an HTML handler, rendered as a page instead of JSON
pub struct PageError(pub AppError);

impl From<AppError> for PageError {
    fn from(error: AppError) -> Self {
        PageError(error)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let message = self.0.public_message();
        let mut context = Context::new();
        context.insert("status", &status.as_u16());
        context.insert("reason", status.canonical_reason().unwrap_or("Error"));
        context.insert("message", &message);

        match ERROR_PAGE.render("error.html", &context) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!("Failed to render error page: {:?}", e);
                (status, message).into_response()
            }
        }
    }
}

static ERROR_PAGE: once_cell::sync::Lazy<Tera> = once_cell::sync::Lazy::new(|| {
    let mut tera = Tera::default();
    if let Err(e) = tera.add_raw_template("error.html", include_str!("../../templates/error.html")) {
        tracing::error!("Invalid error template: {:?}", e);
    }
    tera
});

pub type PageResult = Result<Response, PageError>;

#[derive(Serialize)]
struct Perms {
    can_view: bool,
    can_create: bool,
    can_edit: bool,
    can_delete: bool,
}

impl Perms {
    fn of(claims: Option<&UserClaims>) -> Self {
        let has = |c| claims.map(|u| u.has(c)).unwrap_or(false);
        Self {
            can_view: has(Capability::CanView),
            can_create: has(Capability::CanCreate),
            can_edit: has(Capability::CanEdit),
            can_delete: has(Capability::CanDelete),
        }
    }
}

/// Per-request data every page needs: the user, the CSRF token and any
/// pending flash messages.
pub struct Page {
    pub user: Option<UserClaims>,
    pub csrf_token: String,
    pub messages: Vec<String>,
    jar: CookieJar,
    secure_cookies: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for Page {
    type Rejection = PageError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = resolve_user(parts, state).await?;
        let jar = CookieJar::from_headers(&parts.headers);
        let csrf_token = parts
            .extensions
            .get::<security::CsrfToken>()
            .map(|token| token.0.clone())
            .or_else(|| jar.get(security::CSRF_COOKIE).map(|c| c.value().to_string()))
            .unwrap_or_default();
        let messages = read_flash(&jar);

        Ok(Page {
            user,
            csrf_token,
            messages,
            jar,
            secure_cookies: state.config.security.effective().secure_cookies,
        })
    }
}

impl Page {
    /// Claims used for capability checks; anonymous callers have none
    pub fn claims(&self) -> UserClaims {
        self.user.clone().unwrap_or_else(UserClaims::anonymous)
    }

    pub fn context(&self) -> Context {
        let mut context = Context::new();
        context.insert("user", &self.user);
        context.insert("perms", &Perms::of(self.user.as_ref()));
        context.insert("csrf_token", &self.csrf_token);
        context.insert("messages", &self.messages);
        context
    }

    /// Renders `template`; shown flash messages are cleared
    pub fn render(self, state: &AppState, status: StatusCode, template: &str, context: Context) -> PageResult {
        let html = state.templates.render(template, &context).map_err(AppError::from)?;
        let jar = if self.messages.is_empty() {
            self.jar
        } else {
            self.jar.remove(Cookie::build(FLASH_COOKIE).path("/"))
        };
        Ok((status, jar, Html(html)).into_response())
    }

    /// 303 to `to`, queueing `message` for the next page
    pub fn redirect_with_message(self, to: &str, message: &str) -> Response {
        let mut messages = self.messages;
        messages.push(message.to_string());
        let jar = self.jar.add(flash_cookie(&messages, self.secure_cookies));
        (jar, Redirect::to(to)).into_response()
    }

    pub fn jar(&self) -> CookieJar {
        self.jar.clone()
    }

    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

fn flash_cookie(messages: &[String], secure: bool) -> Cookie<'static> {
    let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(messages).unwrap_or_default());
    Cookie::build((FLASH_COOKIE, encoded))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(axum_extra::extract::cookie::SameSite::Lax)
        .build()
}

fn read_flash(jar: &CookieJar) -> Vec<String> {
    jar.get(FLASH_COOKIE)
        .and_then(|cookie| URL_SAFE_NO_PAD.decode(cookie.value()).ok())
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_templates_compile() {
        assert!(Templates::new().is_ok());
    }

    #[test]
    fn flash_cookie_round_trips_through_the_jar() {
        let messages = vec!["Book created successfully!".to_string()];
        let jar = CookieJar::new().add(flash_cookie(&messages, false));
        assert_eq!(read_flash(&jar), messages);
    }

    #[test]
    fn garbage_flash_cookie_is_ignored() {
        let jar = CookieJar::new().add(Cookie::new(FLASH_COOKIE, "%%%"));
        assert!(read_flash(&jar).is_empty());
    }

    #[test]
    fn templates_escape_user_content() {
        let templates = Templates::new().unwrap();
        let mut context = Context::new();
        context.insert("user", &Option::<UserClaims>::None);
        context.insert("perms", &Perms::of(None));
        context.insert("csrf_token", "token");
        context.insert("messages", &Vec::<String>::new());
        context.insert("status", &404);
        context.insert("reason", "Not Found");
        context.insert("message", "<script>alert(1)</script>");
        let html = templates.render("error.html", &context).unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }
}
