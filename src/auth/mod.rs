//! Identity and access control module
//!
//! Registration with OTP email verification, credential login producing a
//! dual-layer bearer token (signed JWT plus a registry record), password
//! reset, and the per-role access gate consumed by protected routes.

pub mod gate;
pub mod handlers;
pub mod password;
pub mod service;
pub mod validation;

pub use gate::{AdminOnly, Authenticated, EmployerOnly, RequiredRole, UserOnly};
pub use service::{AuthService, Claims, Registration};
