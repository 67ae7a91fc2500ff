pub mod auth;

pub use auth::{admin_auth_middleware, vendor_auth_middleware, AdminClaims, VendorClaims};
