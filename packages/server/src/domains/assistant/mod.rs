//! Chat assistant that can run pipelines as tools.

pub mod chat;

pub use chat::{tool_definitions, Assistant, AssistantError, AssistantReply, ChatMessage, ChatRole};
