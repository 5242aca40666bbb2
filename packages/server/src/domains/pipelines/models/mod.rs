pub mod pipeline_run;

pub use pipeline_run::{NewPipelineRun, PipelineRun, RunFilter, RunOutcome, RunStatus, TriggerSource};
