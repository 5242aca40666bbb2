//! Search profile: what the user is looking for. One per user.

pub mod data;
pub mod models;

pub use data::ProfileData;
pub use models::{Profile, ProfileInput, RemotePreference};
