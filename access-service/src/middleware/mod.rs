pub mod api_key;
pub mod guards;
pub mod session;

pub use api_key::{api_key_middleware, ApiKeyAuth, API_KEY_HEADERS};
pub use guards::{require_permission, require_role, PermissionGuard, RoleGuard};
pub use session::{session_auth_middleware, CurrentUser, ORGANIZATION_HEADER};
