pub mod tasks;

pub use tasks::{create_task, trigger_now, update_task, TaskValidationError};
