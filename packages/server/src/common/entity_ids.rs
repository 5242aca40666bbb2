//! Typed ids for every persisted entity.

pub use super::id::Id;

pub struct User;
pub struct Profile;
pub struct Resume;
pub struct JobPosting;
pub struct EmailSource;
pub struct EmailMessage;
pub struct ScrapeSource;
pub struct PipelineRun;
pub struct ScheduledTask;

pub type UserId = Id<User>;
pub type ProfileId = Id<Profile>;
pub type ResumeId = Id<Resume>;
pub type JobPostingId = Id<JobPosting>;
pub type EmailSourceId = Id<EmailSource>;
pub type EmailMessageId = Id<EmailMessage>;
pub type ScrapeSourceId = Id<ScrapeSource>;
pub type PipelineRunId = Id<PipelineRun>;
pub type ScheduledTaskId = Id<ScheduledTask>;
