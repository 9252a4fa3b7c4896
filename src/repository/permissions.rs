//! Capability bundles and direct grants

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use super::PermissionStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        permission::{Bundle, Capability, CapabilitySet},
        user::Role,
    },
};

#[derive(Clone)]
pub struct PermissionsRepository {
    pool: Pool<Postgres>,
}

impl PermissionsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for PermissionsRepository {
    async fn apply_bundles(&self, bundles: &[Bundle]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        for bundle in bundles {
            // A role carries at most one bundle
            sqlx::query("UPDATE capability_bundles SET role = NULL WHERE role = $1 AND name <> $2")
                .bind(bundle.role)
                .bind(&bundle.name)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO capability_bundles (name, role)
                VALUES ($1, $2)
                ON CONFLICT (name) DO UPDATE SET role = EXCLUDED.role
                "#,
            )
            .bind(&bundle.name)
            .bind(bundle.role)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM bundle_capabilities WHERE bundle_name = $1")
                .bind(&bundle.name)
                .execute(&mut *tx)
                .await?;

            for capability in bundle.capabilities.iter() {
                sqlx::query("INSERT INTO bundle_capabilities (bundle_name, capability) VALUES ($1, $2)")
                    .bind(&bundle.name)
                    .bind(capability)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_bundles(&self) -> AppResult<Vec<Bundle>> {
        let rows = sqlx::query(
            r#"
            SELECT b.name, b.role, bc.capability
            FROM capability_bundles b
            LEFT JOIN bundle_capabilities bc ON bc.bundle_name = b.name
            WHERE b.role IS NOT NULL
            ORDER BY b.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut bundles: BTreeMap<String, Bundle> = BTreeMap::new();
        for row in rows {
            let name: String = row.get("name");
            let role: Role = row.get("role");
            let capability: Option<Capability> = row.get("capability");
            let bundle = bundles.entry(name.clone()).or_insert_with(|| Bundle {
                name,
                role,
                capabilities: CapabilitySet::new(),
            });
            if let Some(capability) = capability {
                bundle.capabilities.insert(capability);
            }
        }

        Ok(bundles.into_values().collect())
    }

    async fn role_capabilities(&self, role: Role) -> AppResult<CapabilitySet> {
        let capabilities: Vec<Capability> = sqlx::query_scalar(
            r#"
            SELECT bc.capability
            FROM bundle_capabilities bc
            JOIN capability_bundles b ON b.name = bc.bundle_name
            WHERE b.role = $1
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        Ok(capabilities.into_iter().collect())
    }

    async fn user_capabilities(&self, user_id: i64) -> AppResult<CapabilitySet> {
        let capabilities: Vec<Capability> =
            sqlx::query_scalar("SELECT capability FROM user_capabilities WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(capabilities.into_iter().collect())
    }

    async fn grant_user(&self, user_id: i64, capability: Capability) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_capabilities (user_id, capability)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(capability)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::NotFound(format!("User with id {} not found", user_id))
            }
            _ => AppError::Database(e),
        })?;
        Ok(())
    }

    async fn grant_bundle(&self, bundle: &str, capability: Capability) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO bundle_capabilities (bundle_name, capability)
            SELECT name, $2 FROM capability_bundles WHERE name = $1
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(bundle)
        .bind(capability)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM capability_bundles WHERE name = $1)")
                    .bind(bundle)
                    .fetch_one(&self.pool)
                    .await?;
            if !exists {
                return Err(AppError::NotFound(format!("Bundle {} not found", bundle)));
            }
        }
        Ok(())
    }
}
