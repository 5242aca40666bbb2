pub mod pipeline_run;

pub use pipeline_run::{PipelineRunData, RunEvent};
