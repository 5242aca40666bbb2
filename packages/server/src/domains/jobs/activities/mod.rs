pub mod ingest;
pub mod scoring;

pub use ingest::{ingest_job, load_scoring_profile, IngestOutcome};
pub use scoring::{score_job, JobFacts, ScoreBreakdown, ScoringProfile};
