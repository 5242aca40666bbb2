//! Connected mailboxes and the messages pulled from them.

pub mod activities;
pub mod data;
pub mod models;

pub use activities::{sync_email_source, SyncReport};
pub use data::EmailSourceData;
pub use models::{EmailMessage, EmailSource, NewEmailSource};
