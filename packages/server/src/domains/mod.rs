// Business domains
pub mod assistant;
pub mod auth;
pub mod email;
pub mod jobs;
pub mod pipelines;
pub mod profiles;
pub mod resumes;
pub mod scheduling;
pub mod sources;
pub mod users;
