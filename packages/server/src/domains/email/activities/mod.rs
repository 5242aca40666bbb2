pub mod sync;

pub use sync::{sync_email_source, SyncReport};
