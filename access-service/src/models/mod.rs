//! Domain models for access-service.

pub mod api_key;
pub mod permission_grant;
pub mod user;

pub use api_key::{
    ApiKey, ApiKeyContext, ApiKeyLimits, ApiKeyResponse, ApiKeyUsage, CreateApiKeyRequest,
    CreateApiKeyResponse, WindowUsage, API_KEY_PREFIX,
};
pub use permission_grant::{
    CheckPermissionQuery, CheckPermissionResponse, CreateGrantRequest, GrantResponse,
    ListGrantsQuery, PermissionGrant, PermissionScope, PurgeGrantsResponse,
};
pub use user::{Role, SetRoleRequest, User, UserResponse};
