use chrono::Utc;
use serde::Serialize;

use super::cron::CronSchedule;
use super::models::{MisfirePolicy, OverlapPolicy, ScheduledTask};
use crate::domains::pipelines::RunStatus;

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledTaskData {
    pub id: String,
    pub name: String,
    pub cron_expression: String,
    pub pipeline_name: String,
    pub input: serde_json::Value,
    pub enabled: bool,
    pub misfire_policy: MisfirePolicy,
    pub overlap_policy: OverlapPolicy,
    pub next_run_at: String,
    /// The next few occurrences after now, for display.
    pub upcoming: Vec<String>,
    pub last_fired_at: Option<String>,
    pub last_run_id: Option<String>,
    pub last_run_status: Option<RunStatus>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ScheduledTask> for ScheduledTaskData {
    fn from(task: ScheduledTask) -> Self {
        let upcoming = match (task.enabled, CronSchedule::parse(&task.cron_expression)) {
            (true, Ok(schedule)) => schedule
                .upcoming(Utc::now(), 3)
                .into_iter()
                .map(|t| t.to_rfc3339())
                .collect(),
            _ => Vec::new(),
        };

        Self {
            id: task.id.to_string(),
            name: task.name,
            cron_expression: task.cron_expression,
            pipeline_name: task.pipeline_name,
            input: task.input,
            enabled: task.enabled,
            misfire_policy: task.misfire_policy,
            overlap_policy: task.overlap_policy,
            next_run_at: task.next_run_at.to_rfc3339(),
            upcoming,
            last_fired_at: task.last_fired_at.map(|t| t.to_rfc3339()),
            last_run_id: task.last_run_id.map(|id| id.to_string()),
            last_run_status: task.last_run_status,
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
        }
    }
}
