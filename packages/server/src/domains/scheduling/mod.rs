//! Cron schedules stored in the database that fire pipelines.

pub mod activities;
pub mod cron;
pub mod data;
pub mod models;
pub mod planner;
pub mod scheduler;
pub mod store;

pub use activities::{create_task, trigger_now, update_task, TaskValidationError};
pub use self::cron::{CronError, CronSchedule};
pub use data::ScheduledTaskData;
pub use models::{
    MisfirePolicy, NewScheduledTask, OverlapPolicy, ScheduledTask, ScheduledTaskInput,
    ScheduledTaskUpdate,
};
pub use planner::{blocked_by_overlap, plan_firings, FiringPlan};
pub use scheduler::{occurrence_key, Scheduler, SchedulerConfig, SchedulerHandle, TickReport};
pub use store::{claim_task, ClaimPolicy, ClaimedTask, PostgresTaskStore, ScheduledTaskStore};
