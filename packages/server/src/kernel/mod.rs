//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod http_services;
pub mod llm;
pub mod stream_hub;
pub mod test_dependencies;
pub mod traits;

pub use deps::{PipelineSettings, ServerDeps};
pub use http_services::{
    AiJobExtractor, HttpJobFeedScraper, HttpMailboxService, UnconfiguredMailboxService,
};
pub use llm::{DisabledAI, LlmError, OpenAiClient};
pub use stream_hub::{user_topic, StreamHub, SYSTEM_TOPIC};
pub use test_dependencies::TestDependencies;
pub use traits::*;
