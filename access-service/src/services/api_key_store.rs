use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::ApiKey;
use crate::services::ServiceError;

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn find_by_lookup_hash(&self, lookup_hash: &str) -> Result<Option<ApiKey>, ServiceError>;
    async fn find_by_id(&self, key_id: Uuid) -> Result<Option<ApiKey>, ServiceError>;
    async fn insert_key(&self, key: &ApiKey) -> Result<(), ServiceError>;
    /// Flip the key inactive. Returns whether the key exists.
    async fn deactivate_key(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<bool, ServiceError>;
    async fn touch_last_used(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError>;
    async fn list_keys(&self, organization_id: Uuid) -> Result<Vec<ApiKey>, ServiceError>;
    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[derive(Default)]
pub struct InMemoryApiKeyStore {
    keys: DashMap<Uuid, ApiKey>,
}

impl InMemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryApiKeyStore {
    async fn find_by_lookup_hash(&self, lookup_hash: &str) -> Result<Option<ApiKey>, ServiceError> {
        Ok(self
            .keys
            .iter()
            .find(|k| k.lookup_hash == lookup_hash)
            .map(|k| k.clone()))
    }

    async fn find_by_id(&self, key_id: Uuid) -> Result<Option<ApiKey>, ServiceError> {
        Ok(self.keys.get(&key_id).map(|k| k.clone()))
    }

    async fn insert_key(&self, key: &ApiKey) -> Result<(), ServiceError> {
        self.keys.insert(key.api_key_id, key.clone());
        Ok(())
    }

    async fn deactivate_key(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        Ok(match self.keys.get_mut(&key_id) {
            Some(mut key) => {
                if key.active_flag {
                    key.active_flag = false;
                    key.revoked_utc = Some(now);
                }
                true
            }
            None => false,
        })
    }

    async fn touch_last_used(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if let Some(mut key) = self.keys.get_mut(&key_id) {
            key.last_used_utc = Some(now);
        }
        Ok(())
    }

    async fn list_keys(&self, organization_id: Uuid) -> Result<Vec<ApiKey>, ServiceError> {
        let mut keys: Vec<ApiKey> = self
            .keys
            .iter()
            .filter(|k| k.organization_id == organization_id)
            .map(|k| k.clone())
            .collect();
        keys.sort_by_key(|k| k.created_utc);
        Ok(keys)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
