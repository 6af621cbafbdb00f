pub mod api_keys;
pub mod external;
pub mod health;
pub mod permissions;
pub mod users;
