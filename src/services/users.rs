//! Accounts, authentication and token issuing

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use super::permissions::PermissionsService;
use crate::{
    config::AuthConfig,
    error::{AppError, AppResult, FieldErrors},
    models::{
        permission::{Capability, CapabilitySet},
        user::{NewAccount, NewUser, RegisterForm, Role, TokenResponse, User, UserClaims, UserProfile},
    },
    repository::Repository,
};

const INVALID_CREDENTIALS: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
    permissions: PermissionsService,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig, permissions: PermissionsService) -> Self {
        Self {
            repository,
            config,
            permissions,
        }
    }

    /// Creates the user and its profile with the requested role in one store call
    pub async fn create_account(&self, account: NewAccount) -> AppResult<(User, UserProfile)> {
        let password_hash = hash_password(&account.password)?;
        let (user, profile) = self
            .repository
            .users
            .create_account(
                &NewUser {
                    username: account.username,
                    email: account.email,
                    password_hash,
                    is_staff: account.is_staff,
                    is_superuser: account.is_superuser,
                },
                account.role,
            )
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, role = %profile.role, "Account created");
        Ok((user, profile))
    }

    /// Self-service registration; new accounts are Members
    pub async fn register(&self, form: &RegisterForm) -> AppResult<User> {
        let mut errors = FieldErrors::new();
        let account = match form.clean() {
            Ok(account) => Some(account),
            Err(e) => {
                errors.merge(e);
                None
            }
        };
        if !form.username.is_empty() && self.repository.users.username_exists(&form.username).await? {
            errors.add("username", "A user with that username already exists.");
        }

        match account {
            Some(account) if errors.is_empty() => {
                let (user, _) = self.create_account(account).await.map_err(|e| match e {
                    // Lost a race with a concurrent registration
                    AppError::Conflict(msg) => AppError::Validation(FieldErrors::single("username", msg)),
                    other => other,
                })?;
                Ok(user)
            }
            _ => Err(AppError::Validation(errors)),
        }
    }

    /// Checks credentials; inactive accounts cannot log in
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<User> {
        let user = self
            .repository
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

        if !user.is_active || !verify_password(&user, password)? {
            tracing::warn!(username = %username, "Failed login attempt");
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }
        Ok(user)
    }

    /// Signs the user's identity into a token. Capabilities are not part
    /// of it; they are resolved again on every request.
    pub async fn issue_token(&self, user: &User) -> AppResult<(String, UserClaims)> {
        let profile = self.repository.users.get_profile(user.id).await?;

        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            role: profile.map(|p| p.role),
            capabilities: CapabilitySet::new(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            exp,
            iat: now,
        };

        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        Ok((token, claims))
    }

    /// Authenticate and issue a token in one step
    pub async fn login(&self, username: &str, password: &str) -> AppResult<(String, UserClaims)> {
        let user = self.authenticate(username, password).await?;
        let issued = self.issue_token(&user).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok(issued)
    }

    /// Body of the JSON token endpoint
    pub async fn token_response(&self, username: &str, password: &str) -> AppResult<TokenResponse> {
        let user = self.authenticate(username, password).await?;
        let (token, _) = self.issue_token(&user).await?;
        Ok(TokenResponse {
            token,
            user_id: user.id,
            username: user.username,
            email: user.email,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        })
    }

    pub fn decode_token(&self, token: &str) -> AppResult<UserClaims> {
        UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))
    }

    /// Claims of the token's user as they stand now: role, staff flags and
    /// capabilities come from the store, not from the token. Deleted users
    /// are rejected; inactive ones resolve with no capabilities.
    pub async fn resolve(&self, token: &str) -> AppResult<UserClaims> {
        let claims = self.decode_token(token)?;
        let user = self
            .repository
            .users
            .get_by_id(claims.user_id)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid or expired token".to_string()))?;
        let profile = self.repository.users.get_profile(user.id).await?;
        let capabilities = self.permissions.capabilities_for(&user, profile.as_ref()).await?;

        Ok(UserClaims {
            sub: user.username,
            role: profile.map(|p| p.role),
            capabilities,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            ..claims
        })
    }

    async fn find(&self, username: &str) -> AppResult<User> {
        self.repository
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))
    }

    /// Moves a user to another role, and so to that role's bundle
    pub async fn set_role(&self, username: &str, role: Role) -> AppResult<UserProfile> {
        let user = self.find(username).await?;
        let profile = self.repository.users.set_role(user.id, role).await?;
        tracing::info!(user_id = user.id, role = %role, "Role changed");
        Ok(profile)
    }

    /// Direct capability grant on top of the role's bundle
    pub async fn grant(&self, username: &str, capability: Capability) -> AppResult<()> {
        let user = self.find(username).await?;
        self.permissions.grant_user(user.id, capability).await?;
        tracing::info!(user_id = user.id, capability = %capability, "Capability granted");
        Ok(())
    }
}

/// Verify a password against the stored argon2 hash
fn verify_password(user: &User, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        models::{
            permission::{Capability, CapabilitySet},
            user::Role,
        },
        repository::{MockBookStore, MockCatalogStore, MockPermissionStore, MockUserStore},
    };

    fn service(users: MockUserStore, permissions: MockPermissionStore) -> UsersService {
        let repository = Repository::new(
            Arc::new(MockBookStore::new()),
            Arc::new(MockCatalogStore::new()),
            Arc::new(users),
            Arc::new(permissions),
        );
        UsersService::new(
            repository.clone(),
            AuthConfig::default(),
            PermissionsService::new(repository),
        )
    }

    fn stored_user(password: &str, is_active: bool) -> User {
        User {
            id: 3,
            username: "reader".to_string(),
            email: Some("reader@example.com".to_string()),
            password_hash: hash_password(password).unwrap(),
            is_staff: false,
            is_superuser: false,
            is_active,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn hashes_verify_only_the_right_password() {
        let user = stored_user("correct horse", true);
        assert!(verify_password(&user, "correct horse").unwrap());
        assert!(!verify_password(&user, "battery staple").unwrap());
    }

    #[tokio::test]
    async fn authenticate_rejects_inactive_user() {
        let mut users = MockUserStore::new();
        let user = stored_user("correct horse", false);
        users
            .expect_get_by_username()
            .returning(move |_| Ok(Some(user.clone())));

        let result = service(users, MockPermissionStore::new())
            .authenticate("reader", "correct horse")
            .await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn register_creates_member_profile() {
        let mut users = MockUserStore::new();
        users.expect_username_exists().returning(|_| Ok(false));
        users
            .expect_create_account()
            .withf(|new_user, role| new_user.username == "newcomer" && *role == Role::Member)
            .times(1)
            .returning(|new_user, role| {
                let user = User {
                    id: 4,
                    username: new_user.username.clone(),
                    email: new_user.email.clone(),
                    password_hash: new_user.password_hash.clone(),
                    is_staff: false,
                    is_superuser: false,
                    is_active: true,
                    date_joined: Utc::now(),
                };
                Ok((user, UserProfile::new(4, role)))
            });

        let form = RegisterForm {
            username: "newcomer".to_string(),
            email: None,
            password1: "long enough".to_string(),
            password2: "long enough".to_string(),
        };
        let user = service(users, MockPermissionStore::new())
            .register(&form)
            .await
            .unwrap();
        assert_eq!(user.username, "newcomer");
    }

    #[tokio::test]
    async fn register_reports_taken_username_as_field_error() {
        let mut users = MockUserStore::new();
        users.expect_username_exists().returning(|_| Ok(true));
        users.expect_create_account().times(0);

        let form = RegisterForm {
            username: "reader".to_string(),
            email: None,
            password1: "long enough".to_string(),
            password2: "long enough".to_string(),
        };
        match service(users, MockPermissionStore::new()).register(&form).await {
            Err(AppError::Validation(errors)) => assert!(errors.contains("username")),
            other => panic!("expected validation error, got {:?}", other.map(|u| u.id)),
        }
    }

    #[tokio::test]
    async fn failed_account_insert_is_reported_once() {
        let mut users = MockUserStore::new();
        users
            .expect_create_account()
            .times(1)
            .returning(|_, _| Err(AppError::Internal("profile insert failed".to_string())));
        users.expect_set_role().times(0);

        let result = service(users, MockPermissionStore::new())
            .create_account(NewAccount::member("reader", "long enough"))
            .await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    fn librarian_store(is_active: bool) -> MockUserStore {
        let mut users = MockUserStore::new();
        users
            .expect_get_by_id()
            .returning(move |_| Ok(Some(stored_user("pw", is_active))));
        users
            .expect_get_profile()
            .returning(|user_id| Ok(Some(UserProfile::new(user_id, Role::Librarian))));
        users
    }

    #[tokio::test]
    async fn token_carries_identity_only() {
        let service = service(librarian_store(true), MockPermissionStore::new());
        let (token, claims) = service.issue_token(&stored_user("pw", true)).await.unwrap();
        assert_eq!(claims.role, Some(Role::Librarian));

        let decoded = service.decode_token(&token).unwrap();
        assert_eq!(decoded.user_id, 3);
        assert_eq!(decoded.role, Some(Role::Librarian));
        assert!(decoded.capabilities.is_empty());
    }

    #[tokio::test]
    async fn resolve_reads_current_capabilities() {
        let mut permissions = MockPermissionStore::new();
        permissions
            .expect_role_capabilities()
            .returning(|_| Ok([Capability::CanView, Capability::CanEdit].into_iter().collect()));
        permissions
            .expect_user_capabilities()
            .returning(|_| Ok(CapabilitySet::new()));

        let service = service(librarian_store(true), permissions);
        let (token, _) = service.issue_token(&stored_user("pw", true)).await.unwrap();

        let claims = service.resolve(&token).await.unwrap();
        assert!(claims.has(Capability::CanEdit));
        assert!(!claims.has(Capability::CanDelete));
    }

    #[tokio::test]
    async fn inactive_user_resolves_without_capabilities() {
        let mut permissions = MockPermissionStore::new();
        permissions.expect_role_capabilities().times(0);
        permissions.expect_user_capabilities().times(0);

        let service = service(librarian_store(false), permissions);
        let (token, _) = service.issue_token(&stored_user("pw", true)).await.unwrap();

        let claims = service.resolve(&token).await.unwrap();
        assert!(claims.capabilities.is_empty());
    }

    #[tokio::test]
    async fn deleted_user_token_is_rejected() {
        let mut users = MockUserStore::new();
        users
            .expect_get_profile()
            .returning(|user_id| Ok(Some(UserProfile::new(user_id, Role::Member))));
        users.expect_get_by_id().returning(|_| Ok(None));

        let service = service(users, MockPermissionStore::new());
        let (token, _) = service.issue_token(&stored_user("pw", true)).await.unwrap();
        assert!(matches!(service.resolve(&token).await, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn role_and_grants_apply_to_existing_accounts() {
        let repository = Repository::in_memory();
        let permissions = PermissionsService::new(repository.clone());
        permissions.reconcile_defaults().await.unwrap();
        let service = UsersService::new(repository, AuthConfig::default(), permissions);

        service
            .create_account(NewAccount::member("reader", "long enough"))
            .await
            .unwrap();
        let (token, _) = service.login("reader", "long enough").await.unwrap();
        assert!(!service.resolve(&token).await.unwrap().has(Capability::CanCreate));

        let profile = service.set_role("READER", Role::Librarian).await.unwrap();
        assert_eq!(profile.role, Role::Librarian);
        let claims = service.resolve(&token).await.unwrap();
        assert_eq!(claims.role, Some(Role::Librarian));
        assert!(claims.has(Capability::CanCreate));
        assert!(!claims.has(Capability::CanDelete));

        service.grant("reader", Capability::CanDelete).await.unwrap();
        assert!(service.resolve(&token).await.unwrap().has(Capability::CanDelete));

        assert!(matches!(
            service.set_role("nobody", Role::Admin).await,
            Err(AppError::NotFound(_))
        ));
    }
}
