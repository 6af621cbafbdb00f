//! PostgreSQL-backed stores for users, permission grants and API keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{ApiKey, PermissionGrant, PermissionScope, Role, User};
use crate::services::api_key_store::ApiKeyStore;
use crate::services::directory::UserDirectory;
use crate::services::grant_store::GrantStore;
use crate::services::ServiceError;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(e)
            })?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for Database {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %user_id, role = %role))]
    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET role_code = $2 WHERE user_id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.ping().await
    }
}

#[async_trait]
impl GrantStore for Database {
    async fn find_active_grant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
        now: DateTime<Utc>,
    ) -> Result<Option<PermissionGrant>, ServiceError> {
        let grant = sqlx::query_as::<_, PermissionGrant>(
            r#"
            SELECT * FROM permission_grants
            WHERE user_id = $1
              AND organization_id = $2
              AND scope_code = $3
              AND (expires_utc IS NULL OR expires_utc > $4)
            "#,
        )
        .bind(user_id)
        .bind(organization_id)
        .bind(scope.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grant)
    }

    #[instrument(skip(self, grant), fields(user_id = %grant.user_id, scope = %grant.scope_code))]
    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO permission_grants
                (grant_id, user_id, organization_id, scope_code, granted_by, expires_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(grant.grant_id)
        .bind(grant.user_id)
        .bind(grant.organization_id)
        .bind(&grant.scope_code)
        .bind(grant.granted_by)
        .bind(grant.expires_utc)
        .bind(grant.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                match grant.scope() {
                    Some(scope) => ServiceError::DuplicateGrant {
                        user_id: grant.user_id,
                        organization_id: grant.organization_id,
                        scope,
                    },
                    None => ServiceError::Validation(format!("Unknown scope {}", grant.scope_code)),
                }
            }
            _ => ServiceError::Database(e),
        })?;
        Ok(())
    }

    async fn delete_grant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "DELETE FROM permission_grants WHERE user_id = $1 AND organization_id = $2 AND scope_code = $3",
        )
        .bind(user_id)
        .bind(organization_id)
        .bind(scope.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_grants(
        &self,
        organization_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Vec<PermissionGrant>, ServiceError> {
        let grants = sqlx::query_as::<_, PermissionGrant>(
            r#"
            SELECT * FROM permission_grants
            WHERE organization_id = $1
              AND ($2::uuid IS NULL OR user_id = $2)
            ORDER BY created_utc
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    async fn delete_organization_grants(&self, organization_id: Uuid) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM permission_grants WHERE organization_id = $1")
            .bind(organization_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.ping().await
    }
}

#[async_trait]
impl ApiKeyStore for Database {
    async fn find_by_lookup_hash(&self, lookup_hash: &str) -> Result<Option<ApiKey>, ServiceError> {
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE lookup_hash = $1")
            .bind(lookup_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(key)
    }

    async fn find_by_id(&self, key_id: Uuid) -> Result<Option<ApiKey>, ServiceError> {
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE api_key_id = $1")
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(key)
    }

    #[instrument(skip(self, key), fields(key_id = %key.api_key_id, organization_id = %key.organization_id))]
    async fn insert_key(&self, key: &ApiKey) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO api_keys
                (api_key_id, organization_id, key_label, key_prefix, lookup_hash,
                 rate_limit_per_window, daily_quota, active_flag, expires_utc,
                 created_utc, last_used_utc, revoked_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(key.api_key_id)
        .bind(key.organization_id)
        .bind(&key.key_label)
        .bind(&key.key_prefix)
        .bind(&key.lookup_hash)
        .bind(key.rate_limit_per_window)
        .bind(key.daily_quota)
        .bind(key.active_flag)
        .bind(key.expires_utc)
        .bind(key.created_utc)
        .bind(key.last_used_utc)
        .bind(key.revoked_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate_key(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET active_flag = FALSE,
                revoked_utc = COALESCE(revoked_utc, $2)
            WHERE api_key_id = $1
            "#,
        )
        .bind(key_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_used(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError> {
        sqlx::query("UPDATE api_keys SET last_used_utc = $2 WHERE api_key_id = $1")
            .bind(key_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_keys(&self, organization_id: Uuid) -> Result<Vec<ApiKey>, ServiceError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE organization_id = $1 ORDER BY created_utc",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.ping().await
    }
}
