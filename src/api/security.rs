//! Transport and browser security: HTTPS redirect, response headers,
//! CSRF double-submit check and the session cookie.

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequest, Request, State},
    http::{
        header::{
            AUTHORIZATION, CONTENT_SECURITY_POLICY, CONTENT_TYPE, HOST, LOCATION, REFERRER_POLICY, SET_COOKIE,
            STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
        },
        HeaderMap, HeaderValue, Method, StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Form,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::Deserialize;

use super::render::PageError;
use crate::{config::SecurityConfig, error::AppError, AppState};

pub const SESSION_COOKIE: &str = "sessionid";
pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_HEADER: &str = "x-csrftoken";
pub const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";

const CSRF_TOKEN_BYTES: usize = 32;
/// Largest form body buffered for the CSRF check
const MAX_FORM_BYTES: usize = 64 * 1024;

/// Token for the current request, available to handlers through extensions
#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// A request is secure when it arrived over TLS, directly or through the proxy
pub fn is_secure(uri: &Uri, headers: &HeaderMap, security: &SecurityConfig) -> bool {
    uri.scheme_str() == Some("https")
        || headers
            .get(security.proxy_ssl_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("https"))
            .unwrap_or(false)
}

pub fn has_bearer(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer "))
        .unwrap_or(false)
}

fn base_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Session cookie carrying the signed token
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    base_cookie(SESSION_COOKIE, token, secure)
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// Redirects plain HTTP requests to their https URL (301)
pub async fn https_redirect(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let security = state.config.security.effective();
    if !security.ssl_redirect || is_secure(request.uri(), request.headers(), &security) {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or("localhost");
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = format!("https://{}{}", host, path);

    match HeaderValue::from_str(&location) {
        Ok(value) => (StatusCode::MOVED_PERMANENTLY, [(LOCATION, value)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// nosniff and HSTS on every response; CSP, framing, XSS and referrer
/// policy on HTML responses
pub async fn security_headers(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let security = state.config.security.effective();
    let secure = is_secure(request.uri(), request.headers(), &security);

    let mut response = next.run(request).await;
    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false);

    let headers = response.headers_mut();
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    if is_html {
        if let Ok(value) = HeaderValue::from_str(&security.content_security_policy) {
            headers.insert(CONTENT_SECURITY_POLICY, value);
        }
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
        if let Ok(value) = HeaderValue::from_str(&security.referrer_policy) {
            headers.insert(REFERRER_POLICY, value);
        }
    }

    if secure {
        if let Some(hsts) = security.hsts_header() {
            if let Ok(value) = HeaderValue::from_str(&hsts) {
                headers.insert(STRICT_TRANSPORT_SECURITY, value);
            }
        }
    }

    response
}

#[derive(Deserialize)]
struct CsrfField {
    #[serde(default, rename = "csrfmiddlewaretoken")]
    token: Option<String>,
}

fn csrf_failure(reason: &str) -> Response {
    tracing::warn!(reason = %reason, "CSRF verification failed");
    PageError(AppError::PermissionDenied(format!("CSRF verification failed. {}", reason))).into_response()
}

/// Token posted in a urlencoded form body, if any
async fn form_token(headers: &HeaderMap, body: &axum::body::Bytes) -> Option<String> {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if !is_form {
        return None;
    }

    let form_request = Request::builder()
        .method(Method::POST)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.clone()))
        .ok()?;
    Form::<CsrfField>::from_request(form_request, &())
        .await
        .ok()
        .and_then(|Form(field)| field.token)
}

/// Double-submit check: unsafe requests must echo the `csrftoken` cookie
/// in the `X-CSRFToken` header or the `csrfmiddlewaretoken` form field.
///
/// Bearer-authenticated requests and `/api/` routes are exempt. Safe
/// requests without the cookie get one.
pub async fn csrf_protect(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let existing = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let safe = matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    );
    let exempt = request.uri().path().starts_with("/api/") || has_bearer(request.headers());

    if !safe && !exempt {
        let Some(expected) = existing.as_deref() else {
            return csrf_failure("CSRF cookie not set.");
        };

        let (parts, body) = request.into_parts();
        let bytes = match to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => bytes,
            Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
        };

        let presented = match parts.headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) {
            Some(token) => Some(token.to_string()),
            None => form_token(&parts.headers, &bytes).await,
        };
        match presented {
            None => return csrf_failure("CSRF token missing."),
            Some(token) if !constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
                return csrf_failure("CSRF token incorrect.");
            }
            Some(_) => {}
        }

        request = Request::from_parts(parts, Body::from(bytes));
    }

    let token = existing.clone().unwrap_or_else(generate_csrf_token);
    request.extensions_mut().insert(CsrfToken(token.clone()));

    let mut response = next.run(request).await;

    if existing.is_none() {
        let secure = state.config.security.effective().secure_cookies;
        let cookie = base_cookie(CSRF_COOKIE, token, secure);
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }

    response
}
