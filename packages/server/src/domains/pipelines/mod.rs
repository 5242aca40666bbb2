//! Action pipelines: named, typed units of work shared by the REST API,
//! webhooks, the assistant and the scheduler. Every invocation is recorded
//! as a [`PipelineRun`].

pub mod actions;
pub mod data;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod store;

pub use actions::build_pipeline_registry;
pub use data::{PipelineRunData, RunEvent};
pub use error::PipelineError;
pub use models::{NewPipelineRun, PipelineRun, RunFilter, RunOutcome, RunStatus, TriggerSource};
pub use pipeline::{ErasedPipeline, Pipeline, PipelineContext, PipelineDescriptor};
pub use registry::{
    InvokeOutcome, InvokeRequest, PipelineRegistry, SharedPipelineRegistry, HEARTBEAT_INTERVAL,
    HEARTBEAT_STALE_AFTER,
};
pub use store::{PipelineRunStore, PostgresRunStore, StartOutcome};
