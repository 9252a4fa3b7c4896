//! User, profile and role types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use validator::Validate;

use super::{empty_as_none, permission::{Capability, CapabilitySet}};
use crate::error::{AppError, AppResult, FieldErrors};

/// Dashboard role stored on the user profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Role {
    Admin,
    Librarian,
    Member,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Librarian, Role::Member];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Librarian => "Librarian",
            Role::Member => "Member",
        }
    }

    /// Landing page for this role
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin-dashboard/",
            Role::Librarian => "/librarian-dashboard/",
            Role::Member => "/member-dashboard/",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Member
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "librarian" => Ok(Role::Librarian),
            "member" => Ok(Role::Member),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

// SQLx conversion for Role
impl sqlx::Type<Postgres> for Role {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for Role {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for Role {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Account record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    /// Hashed password (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

/// One-to-one extension of a user carrying its role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: i64,
    pub role: Role,
    pub bio: String,
    pub location: String,
}

impl UserProfile {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self {
            user_id,
            role,
            bio: String::new(),
            location: String::new(),
        }
    }
}

/// Insert payload for the users table (password already hashed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Everything needed to create an account and its profile
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub role: Role,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl NewAccount {
    pub fn member(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            email: None,
            password: password.to_string(),
            role: Role::Member,
            is_staff: false,
            is_superuser: false,
        }
    }

    pub fn superuser(username: &str, email: Option<String>, password: &str) -> Self {
        Self {
            username: username.to_string(),
            email,
            password: password.to_string(),
            role: Role::Admin,
            is_staff: true,
            is_superuser: true,
        }
    }
}

/// Usernames: letters, digits and @/./+/-/_ only
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

/// Registration form
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RegisterForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 150, message = "Enter a username of at most 150 characters."))]
    pub username: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[serde(default, skip_serializing)]
    #[validate(length(min = 8, message = "This password is too short. It must contain at least 8 characters."))]
    pub password1: String,
    #[serde(default, skip_serializing)]
    pub password2: String,
}

impl RegisterForm {
    /// Field-level validation; uniqueness is checked against the store separately
    pub fn clean(&self) -> Result<NewAccount, FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };
        if !self.username.is_empty() && !is_valid_username(&self.username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let mut account = NewAccount::member(&self.username, &self.password1);
        account.email = self.email.clone();
        Ok(account)
    }
}

/// Login form (HTML)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i64,
    pub role: Option<Role>,
    /// Resolved per request from the store; never signed into the token
    #[serde(skip)]
    pub capabilities: CapabilitySet,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Claims of a request without credentials. Never signed.
    pub fn anonymous() -> Self {
        Self {
            sub: String::new(),
            user_id: 0,
            role: None,
            capabilities: CapabilitySet::new(),
            is_staff: false,
            is_superuser: false,
            exp: 0,
            iat: 0,
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    // Authorization checks
    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(format!(
                "Insufficient rights to {} books",
                capability.verb()
            )))
        }
    }

    pub fn require_staff(&self) -> AppResult<()> {
        if self.is_staff || self.is_superuser {
            Ok(())
        } else {
            Err(AppError::PermissionDenied("Staff privileges required".to_string()))
        }
    }

    pub fn require_role(&self, role: Role) -> AppResult<()> {
        if self.role == Some(role) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(format!("{} role required", role)))
        }
    }
}

/// Token endpoint request
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

/// Token endpoint response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub email: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(capabilities: &[Capability]) -> UserClaims {
        UserClaims {
            sub: "reader".to_string(),
            user_id: 1,
            role: Some(Role::Member),
            capabilities: capabilities.iter().copied().collect(),
            is_staff: false,
            is_superuser: false,
            exp: Utc::now().timestamp() + 3600,
            iat: Utc::now().timestamp(),
        }
    }

    #[test]
    fn require_checks_capability() {
        let viewer = claims(&[Capability::CanView]);
        assert!(viewer.require(Capability::CanView).is_ok());
        assert!(matches!(
            viewer.require(Capability::CanDelete),
            Err(AppError::PermissionDenied(_))
        ));
    }

    #[test]
    fn token_leaves_capabilities_out() {
        let original = claims(&[Capability::CanView, Capability::CanCreate]);
        let token = original.create_token("secret").unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert!(parsed.capabilities.is_empty());
        assert_eq!(parsed.user_id, original.user_id);
        assert_eq!(parsed.role, Some(Role::Member));
        assert!(UserClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("librarian".parse::<Role>(), Ok(Role::Librarian));
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("guest".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Member);
    }

    #[test]
    fn register_form_rejects_mismatched_passwords() {
        let form = RegisterForm {
            username: "reader".to_string(),
            email: None,
            password1: "correct horse".to_string(),
            password2: "battery staple".to_string(),
        };
        let errors = form.clean().unwrap_err();
        assert!(errors.contains("password2"));
    }

    #[test]
    fn register_form_rejects_bad_username_and_short_password() {
        let form = RegisterForm {
            username: "bad name!".to_string(),
            email: Some("not-an-email".to_string()),
            password1: "short".to_string(),
            password2: "short".to_string(),
        };
        let errors = form.clean().unwrap_err();
        assert!(errors.contains("username"));
        assert!(errors.contains("email"));
        assert!(errors.contains("password1"));
    }

    #[test]
    fn register_form_builds_member_account() {
        let form = RegisterForm {
            username: "reader@home".to_string(),
            email: Some("reader@example.com".to_string()),
            password1: "long enough".to_string(),
            password2: "long enough".to_string(),
        };
        let account = form.clean().unwrap();
        assert_eq!(account.role, Role::Member);
        assert!(!account.is_staff);
        assert_eq!(account.email.as_deref(), Some("reader@example.com"));
    }
}
