//! Decides which occurrences of a due task fire on this tick.
//!
//! Pure functions over a schedule and the clock; claiming and execution live
//! in the store and the scheduler.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::cron::CronSchedule;
use super::models::{MisfirePolicy, OverlapPolicy, ScheduledTask};
use crate::domains::pipelines::RunStatus;

/// Upper bound on occurrences walked one by one for a single task. Beyond
/// it the planner jumps to the recent window.
const MAX_SCAN: usize = 10_000;

/// Window searched for the most recent occurrences when the backlog is
/// larger than [`MAX_SCAN`].
const RECENT_WINDOW_HOURS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiringPlan {
    /// Occurrences to fire now, oldest first.
    pub fire_times: Vec<DateTime<Utc>>,
    /// Next `next_run_at`, always after `now`. `None` when the schedule has
    /// no further occurrences and the task should be disabled.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Missed occurrences that will not fire. A lower bound when the backlog
    /// exceeded the scan limit.
    pub dropped: usize,
}

impl FiringPlan {
    pub fn is_idle(&self) -> bool {
        self.fire_times.is_empty()
    }
}

/// Keeps the last `keep` items pushed and counts every push.
struct Tail {
    items: VecDeque<DateTime<Utc>>,
    keep: usize,
    seen: usize,
}

impl Tail {
    fn new(keep: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(keep),
            keep,
            seen: 0,
        }
    }

    fn push(&mut self, t: DateTime<Utc>) {
        self.seen += 1;
        if self.items.len() == self.keep {
            self.items.pop_front();
        }
        self.items.push_back(t);
    }

    fn last(&self) -> Option<DateTime<Utc>> {
        self.items.back().copied()
    }
}

/// The most recent `keep` due occurrences in `[next_run_at, now]` and how
/// many were seen in total.
fn due_occurrences(
    schedule: &CronSchedule,
    next_run_at: DateTime<Utc>,
    now: DateTime<Utc>,
    keep: usize,
) -> Tail {
    let mut tail = Tail::new(keep.max(1));
    if next_run_at > now {
        return tail;
    }
    tail.push(next_run_at);

    let mut cursor = next_run_at;
    let mut capped = false;
    for t in schedule.iter_after(next_run_at) {
        if t > now {
            break;
        }
        if tail.seen >= MAX_SCAN {
            capped = true;
            break;
        }
        tail.push(t);
        cursor = t;
    }

    if capped {
        let window_start = (now - Duration::hours(RECENT_WINDOW_HOURS)).max(cursor);
        for t in schedule.iter_after(window_start).take_while(|t| *t <= now) {
            tail.push(t);
        }
    }

    tail
}

/// Plan the firings of a task whose next occurrence is `next_run_at`.
pub fn plan_firings(
    schedule: &CronSchedule,
    next_run_at: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: MisfirePolicy,
    max_catch_up: usize,
) -> FiringPlan {
    if next_run_at > now {
        return FiringPlan {
            fire_times: Vec::new(),
            next_run_at: Some(next_run_at),
            dropped: 0,
        };
    }

    let keep = match policy {
        MisfirePolicy::SkipToLatest => 1,
        MisfirePolicy::CatchUp => max_catch_up.max(1),
    };
    let tail = due_occurrences(schedule, next_run_at, now, keep);
    let fire_times: Vec<_> = match policy {
        MisfirePolicy::SkipToLatest => tail.last().into_iter().collect(),
        MisfirePolicy::CatchUp => tail.items.iter().copied().collect(),
    };

    FiringPlan {
        dropped: tail.seen.saturating_sub(fire_times.len()),
        fire_times,
        next_run_at: schedule.next_after(now),
    }
}

/// True when the overlap policy forbids firing because the task's previous
/// run is still going. A `running` status older than `lease` is treated as
/// lost.
pub fn blocked_by_overlap(task: &ScheduledTask, now: DateTime<Utc>, lease: Duration) -> bool {
    task.overlap_policy == OverlapPolicy::Skip
        && task.last_run_status == Some(RunStatus::Running)
        && task.last_fired_at.is_some_and(|fired| fired > now - lease)
}
