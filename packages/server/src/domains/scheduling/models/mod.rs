pub mod scheduled_task;

pub use scheduled_task::{
    MisfirePolicy, NewScheduledTask, OverlapPolicy, ScheduledTask, ScheduledTaskInput,
    ScheduledTaskUpdate,
};
