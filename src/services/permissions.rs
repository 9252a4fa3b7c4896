//! Capability resolution and bundle reconciliation

use std::collections::HashSet;

use crate::{
    error::{AppError, AppResult, FieldErrors},
    models::{
        permission::{Bundle, Capability, CapabilitySet},
        user::{User, UserProfile},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct PermissionsService {
    repository: Repository,
}

impl PermissionsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Brings the stored bundles in line with `desired`.
    ///
    /// Each bundle's capability set is replaced, so manual grants on a
    /// reconciled bundle are lost. Running it again is a no-op.
    pub async fn reconcile(&self, mut desired: Vec<Bundle>) -> AppResult<Vec<Bundle>> {
        let mut names = HashSet::new();
        let mut roles = HashSet::new();
        let mut errors = FieldErrors::new();
        for bundle in &desired {
            if !names.insert(bundle.name.clone()) {
                errors.add("name", format!("Duplicate bundle name: {}", bundle.name));
            }
            if !roles.insert(bundle.role) {
                errors.add("role", format!("Role {} is attached to more than one bundle", bundle.role));
            }
        }
        errors.into_result()?;

        desired.sort_by(|a, b| a.name.cmp(&b.name));
        self.repository.permissions.apply_bundles(&desired).await?;

        for bundle in &desired {
            tracing::info!(
                bundle = %bundle.name,
                role = %bundle.role,
                capabilities = bundle.capabilities.len(),
                "Bundle reconciled"
            );
        }

        self.repository.permissions.list_bundles().await
    }

    /// Viewers, Editors and Admins
    pub async fn reconcile_defaults(&self) -> AppResult<Vec<Bundle>> {
        self.reconcile(Bundle::defaults()).await
    }

    pub async fn bundles(&self) -> AppResult<Vec<Bundle>> {
        self.repository.permissions.list_bundles().await
    }

    /// Effective capabilities: everything for superusers, otherwise the
    /// role's bundle plus direct grants. Inactive users get nothing.
    pub async fn capabilities_for(
        &self,
        user: &User,
        profile: Option<&UserProfile>,
    ) -> AppResult<CapabilitySet> {
        if !user.is_active {
            return Ok(CapabilitySet::new());
        }
        if user.is_superuser {
            return Ok(CapabilitySet::all());
        }

        let mut capabilities = match profile {
            Some(profile) => self.repository.permissions.role_capabilities(profile.role).await?,
            None => CapabilitySet::new(),
        };
        capabilities.extend(&self.repository.permissions.user_capabilities(user.id).await?);
        Ok(capabilities)
    }

    pub async fn grant_user(&self, user_id: i64, capability: Capability) -> AppResult<()> {
        self.repository.permissions.grant_user(user_id, capability).await
    }

    pub async fn grant_bundle(&self, bundle: &str, capability: Capability) -> AppResult<()> {
        if bundle.trim().is_empty() {
            return Err(AppError::Validation(FieldErrors::single("bundle", "This field is required.")));
        }
        self.repository.permissions.grant_bundle(bundle, capability).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::{
        models::user::Role,
        repository::{MockBookStore, MockCatalogStore, MockPermissionStore, MockUserStore},
    };

    fn service(permissions: MockPermissionStore) -> PermissionsService {
        PermissionsService::new(Repository::new(
            Arc::new(MockBookStore::new()),
            Arc::new(MockCatalogStore::new()),
            Arc::new(MockUserStore::new()),
            Arc::new(permissions),
        ))
    }

    fn user(is_superuser: bool, is_active: bool) -> User {
        User {
            id: 9,
            username: "reader".to_string(),
            email: None,
            password_hash: String::new(),
            is_staff: is_superuser,
            is_superuser,
            is_active,
            date_joined: Utc::now(),
        }
    }

    #[tokio::test]
    async fn superuser_gets_everything_without_store_access() {
        let mut permissions = MockPermissionStore::new();
        permissions.expect_role_capabilities().times(0);
        permissions.expect_user_capabilities().times(0);

        let caps = service(permissions)
            .capabilities_for(&user(true, true), None)
            .await
            .unwrap();
        assert_eq!(caps, CapabilitySet::all());
    }

    #[tokio::test]
    async fn inactive_user_has_no_capabilities() {
        let mut permissions = MockPermissionStore::new();
        permissions.expect_role_capabilities().times(0);

        let profile = UserProfile::new(9, Role::Admin);
        let caps = service(permissions)
            .capabilities_for(&user(false, false), Some(&profile))
            .await
            .unwrap();
        assert!(caps.is_empty());
    }

    #[tokio::test]
    async fn role_bundle_and_direct_grants_are_merged() {
        let mut permissions = MockPermissionStore::new();
        permissions
            .expect_role_capabilities()
            .withf(|role| *role == Role::Member)
            .returning(|_| Ok([Capability::CanView].into_iter().collect()));
        permissions
            .expect_user_capabilities()
            .returning(|_| Ok([Capability::CanCreate].into_iter().collect()));

        let profile = UserProfile::new(9, Role::Member);
        let caps = service(permissions)
            .capabilities_for(&user(false, true), Some(&profile))
            .await
            .unwrap();
        assert!(caps.contains(Capability::CanView));
        assert!(caps.contains(Capability::CanCreate));
        assert!(!caps.contains(Capability::CanDelete));
    }

    #[tokio::test]
    async fn reconcile_applies_bundles_sorted_by_name() {
        let mut permissions = MockPermissionStore::new();
        permissions
            .expect_apply_bundles()
            .withf(|bundles| {
                let names: Vec<&str> = bundles.iter().map(|b| b.name.as_str()).collect();
                names == ["Admins", "Editors", "Viewers"]
            })
            .times(1)
            .returning(|_| Ok(()));
        permissions.expect_list_bundles().returning(|| Ok(Bundle::defaults()));

        let mut shuffled = Bundle::defaults();
        shuffled.reverse();
        service(permissions).reconcile(shuffled).await.unwrap();
    }

    #[tokio::test]
    async fn reconcile_rejects_two_bundles_for_one_role() {
        let mut permissions = MockPermissionStore::new();
        permissions.expect_apply_bundles().times(0);

        let desired = vec![
            Bundle::new("Viewers", Role::Member, &[Capability::CanView]),
            Bundle::new("Readers", Role::Member, &[Capability::CanView]),
        ];
        let result = service(permissions).reconcile(desired).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
