//! Auth domain - bearer-token verification.
//!
//! Tokens are issued by the identity service that owns passwords and OAuth;
//! this server only verifies them and reads the user id.

pub mod jwt;

pub use jwt::{Claims, JwtService};
