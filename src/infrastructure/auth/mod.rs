//! Identity verification backends.

mod jwt;

pub use jwt::{Claims, JwtIdentityVerifier};
