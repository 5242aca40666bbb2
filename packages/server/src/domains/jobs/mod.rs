//! Job postings: storage, dedupe, scoring and ingestion.

pub mod activities;
pub mod data;
pub mod models;

pub use activities::scoring::{score_job, JobFacts, ScoreBreakdown, ScoringProfile};
pub use data::JobPostingData;
pub use models::{JobFilter, JobPosting, JobStatus, JobUpdate};
