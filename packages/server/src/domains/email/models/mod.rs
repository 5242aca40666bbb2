pub mod email_message;
pub mod email_source;

pub use email_message::EmailMessage;
pub use email_source::{EmailSource, NewEmailSource};
