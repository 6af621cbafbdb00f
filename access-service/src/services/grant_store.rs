use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use crate::models::{PermissionGrant, PermissionScope};
use crate::services::ServiceError;

/// Persistent set of permission grants, unique per (user, organization, scope).
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Grant for the tuple whose expiry is null or strictly after `now`.
    async fn find_active_grant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
        now: DateTime<Utc>,
    ) -> Result<Option<PermissionGrant>, ServiceError>;

    /// Insert a new grant. Fails with `DuplicateGrant` if any grant for the
    /// tuple exists, active or not.
    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<(), ServiceError>;

    /// Delete the grant for the tuple. Returns whether one existed.
    async fn delete_grant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
    ) -> Result<bool, ServiceError>;

    async fn list_grants(
        &self,
        organization_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Vec<PermissionGrant>, ServiceError>;

    /// Remove every grant in an organization. Returns the number removed.
    async fn delete_organization_grants(&self, organization_id: Uuid) -> Result<u64, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

type GrantKey = (Uuid, Uuid, String);

#[derive(Default)]
pub struct InMemoryGrantStore {
    grants: DashMap<GrantKey, PermissionGrant>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(user_id: Uuid, organization_id: Uuid, scope: PermissionScope) -> GrantKey {
        (user_id, organization_id, scope.as_str().to_string())
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn find_active_grant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
        now: DateTime<Utc>,
    ) -> Result<Option<PermissionGrant>, ServiceError> {
        Ok(self
            .grants
            .get(&Self::key(user_id, organization_id, scope))
            .filter(|g| g.is_active_at(now))
            .map(|g| g.clone()))
    }

    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<(), ServiceError> {
        let key = (
            grant.user_id,
            grant.organization_id,
            grant.scope_code.clone(),
        );
        match self.grants.entry(key) {
            Entry::Occupied(_) => Err(ServiceError::DuplicateGrant {
                user_id: grant.user_id,
                organization_id: grant.organization_id,
                scope: grant.scope().ok_or_else(|| {
                    ServiceError::Validation(format!("Unknown scope {}", grant.scope_code))
                })?,
            }),
            Entry::Vacant(slot) => {
                slot.insert(grant.clone());
                Ok(())
            }
        }
    }

    async fn delete_grant(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        scope: PermissionScope,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .grants
            .remove(&Self::key(user_id, organization_id, scope))
            .is_some())
    }

    async fn list_grants(
        &self,
        organization_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Vec<PermissionGrant>, ServiceError> {
        let mut grants: Vec<PermissionGrant> = self
            .grants
            .iter()
            .filter(|g| g.organization_id == organization_id)
            .filter(|g| user_id.is_none_or(|u| g.user_id == u))
            .map(|g| g.clone())
            .collect();
        grants.sort_by_key(|g| g.created_utc);
        Ok(grants)
    }

    async fn delete_organization_grants(&self, organization_id: Uuid) -> Result<u64, ServiceError> {
        let mut removed = 0u64;
        self.grants.retain(|_, g| {
            let keep = g.organization_id != organization_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn second_insert_for_same_tuple_is_duplicate() {
        let store = InMemoryGrantStore::new();
        let (user, org) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        let grant = PermissionGrant::new(user, org, PermissionScope::ViewReports, Uuid::new_v4(), None, now);
        store.insert_grant(&grant).await.unwrap();

        let again = PermissionGrant::new(user, org, PermissionScope::ViewReports, Uuid::new_v4(), None, now);
        let err = store.insert_grant(&again).await.unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateGrant { .. }));
    }

    #[tokio::test]
    async fn expired_grants_are_not_returned_as_active() {
        let store = InMemoryGrantStore::new();
        let (user, org) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        let grant = PermissionGrant::new(
            user,
            org,
            PermissionScope::ExportData,
            Uuid::new_v4(),
            Some(now + Duration::minutes(1)),
            now,
        );
        store.insert_grant(&grant).await.unwrap();

        assert!(store
            .find_active_grant(user, org, PermissionScope::ExportData, now)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_active_grant(user, org, PermissionScope::ExportData, now + Duration::minutes(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn purge_only_touches_target_organization() {
        let store = InMemoryGrantStore::new();
        let user = Uuid::new_v4();
        let (org_a, org_b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        for scope in [PermissionScope::ViewReports, PermissionScope::ManageExams] {
            store
                .insert_grant(&PermissionGrant::new(user, org_a, scope, user, None, now))
                .await
                .unwrap();
        }
        store
            .insert_grant(&PermissionGrant::new(user, org_b, PermissionScope::ViewReports, user, None, now))
            .await
            .unwrap();

        assert_eq!(store.delete_organization_grants(org_a).await.unwrap(), 2);
        assert!(store.list_grants(org_a, None).await.unwrap().is_empty());
        assert_eq!(store.list_grants(org_b, Some(user)).await.unwrap().len(), 1);
    }
}
