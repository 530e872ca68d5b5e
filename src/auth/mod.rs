//! Authentication and Authorization module
//!
//! Provides JWT token-based authentication, bcrypt password hashing,
//! role gates for the REST API, and device keys for dispenser firmware.

pub mod device_key;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use device_key::{generate_device_key, hash_device_key, is_device_key_format};
pub use jwt::{create_token, verify_token, Claims, JwtConfig};
pub use middleware::{auth_middleware, AuthState, AuthenticatedUser};
pub use password::{hash_password, verify_password};
