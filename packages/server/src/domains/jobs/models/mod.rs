pub mod job_posting;

pub use job_posting::{JobFilter, JobPosting, JobStatus, JobUpdate, UpsertedJob};
