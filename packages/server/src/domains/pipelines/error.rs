use thiserror::Error;

use super::models::TriggerSource;
use crate::common::PipelineRunId;

/// Why a pipeline could not be started.
///
/// Failures inside a pipeline are not errors here: they are recorded on the
/// run, which `invoke` returns with status `failed`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("invalid input for {pipeline}: {reason}")]
    InvalidInput { pipeline: String, reason: String },

    #[error("{pipeline} cannot be triggered by {trigger}")]
    TriggerNotAllowed {
        pipeline: String,
        trigger: TriggerSource,
    },

    #[error("{pipeline} is already running for this idempotency key (run {run_id})")]
    AlreadyRunning {
        pipeline: String,
        run_id: PipelineRunId,
    },

    #[error("pipeline run store failed: {0:#}")]
    Store(#[from] anyhow::Error),
}
