pub mod api_key_gate;
pub mod api_key_store;
pub mod authorizer;
pub mod clock;
pub mod counter;
pub mod database;
pub mod directory;
pub mod error;
pub mod grant_store;
pub mod metrics;
pub mod redis;
pub mod session;

pub use api_key_gate::{ApiKeyGate, GateDefaults, LimitCheck};
pub use api_key_store::{ApiKeyStore, InMemoryApiKeyStore};
pub use authorizer::{AccessRequest, AccessRule, Decision, PermissionService, RoleBypass, ScopedGrantRule};
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{CounterStore, CounterWindow, InMemoryCounterStore, WindowedCount};
pub use database::Database;
pub use directory::{InMemoryUserDirectory, UserDirectory};
pub use error::ServiceError;
pub use grant_store::{GrantStore, InMemoryGrantStore};
pub use self::redis::RedisCounterStore;
pub use session::{SessionClaims, SessionTokens};
