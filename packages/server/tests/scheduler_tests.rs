//! Scheduler ticks over in-memory stores: each occurrence fires once,
//! missed occurrences follow the misfire policy, overlap `skip` holds back
//! a firing while the previous run is still going.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};

use common::{running_run, scheduled_task, test_registry, Sleepy, TestPipelines};
use jobtrack_core::common::UserId;
use jobtrack_core::domains::pipelines::{PipelineRegistry, RunStatus, TriggerSource};
use jobtrack_core::domains::scheduling::{
    occurrence_key, trigger_now, MisfirePolicy, OverlapPolicy, Scheduler, SchedulerConfig,
    TickReport,
};
use jobtrack_core::kernel::test_dependencies::{InMemoryRunStore, InMemoryTaskStore};
use jobtrack_core::kernel::TestDependencies;

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
}

struct Fixture {
    pipelines: TestPipelines,
    scheduler: Scheduler,
    runs: Arc<InMemoryRunStore>,
    tasks: Arc<InMemoryTaskStore>,
}

fn fixture() -> Fixture {
    let pipelines = test_registry();
    let test_deps = TestDependencies::new();
    let runs = test_deps.run_store.clone();
    let tasks = test_deps.task_store.clone();
    let scheduler = Scheduler::new(pipelines.registry.clone(), test_deps.into_lazy_deps());
    Fixture {
        pipelines,
        scheduler,
        runs,
        tasks,
    }
}

#[tokio::test]
async fn test_not_due_task_is_left_alone() {
    let f = fixture();
    let task = scheduled_task(UserId::new(), "echo", "*/5 * * * *", at(10, 5, 0));
    f.tasks.insert(task.clone());

    let report = f.scheduler.tick(at(10, 4, 59)).await.unwrap();

    assert_eq!(report, TickReport::default());
    assert_eq!(f.tasks.get(task.id).unwrap().next_run_at, at(10, 5, 0));
}

#[tokio::test]
async fn test_due_task_fires_once_and_advances() {
    let f = fixture();
    let task = scheduled_task(UserId::new(), "echo", "*/5 * * * *", at(10, 5, 0));
    f.tasks.insert(task.clone());

    let report = f.scheduler.tick(at(10, 5, 3)).await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.fired, 1);
    assert_eq!(report.succeeded, 1);

    // Same instant again: nothing is due any more
    let again = f.scheduler.tick(at(10, 5, 3)).await.unwrap();
    assert_eq!(again.claimed, 0);

    let runs = f.runs.runs_of("echo");
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.trigger, TriggerSource::Schedule);
    assert_eq!(run.scheduled_task_id, Some(task.id));
    assert_eq!(run.scheduled_for, Some(at(10, 5, 0)));
    assert_eq!(run.user_id, Some(task.user_id));
    assert_eq!(
        run.idempotency_key.as_deref(),
        Some(occurrence_key(task.id, at(10, 5, 0)).as_str())
    );

    let stored = f.tasks.get(task.id).unwrap();
    assert_eq!(stored.next_run_at, at(10, 10, 0));
    assert_eq!(stored.last_fired_at, Some(at(10, 5, 0)));
    assert_eq!(stored.last_run_id, Some(run.id));
    assert_eq!(stored.last_run_status, Some(RunStatus::Succeeded));
    assert_eq!(f.pipelines.echo_count(), 1);
}

#[tokio::test]
async fn test_concurrent_ticks_fire_each_occurrence_once() {
    let f = fixture();
    for _ in 0..5 {
        f.tasks
            .insert(scheduled_task(UserId::new(), "echo", "* * * * *", at(9, 0, 0)));
    }

    let other = f.scheduler.clone();
    let (a, b) = tokio::join!(f.scheduler.tick(at(9, 0, 30)), other.tick(at(9, 0, 30)));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.fired + b.fired, 5);
    assert_eq!(a.claimed + b.claimed, 5);
    assert_eq!(f.runs.runs_of("echo").len(), 5);
    assert_eq!(f.pipelines.echo_count(), 5);
}

#[tokio::test]
async fn test_reclaimed_occurrence_is_deduplicated_by_key() {
    // Two instances whose task stores disagree (one missed the other's
    // advance) still share the run store, so the occurrence runs once.
    let pipelines = test_registry();
    let first = TestDependencies::new();
    let shared_runs = first.run_store.clone();
    let mut second = TestDependencies::new();
    second.run_store = shared_runs.clone();

    let task = scheduled_task(UserId::new(), "echo", "0 * * * *", at(8, 0, 0));
    first.task_store.insert(task.clone());
    second.task_store.insert(task.clone());

    let a = Scheduler::new(pipelines.registry.clone(), first.into_lazy_deps());
    let b = Scheduler::new(pipelines.registry.clone(), second.into_lazy_deps());

    let report_a = a.tick(at(8, 0, 10)).await.unwrap();
    let report_b = b.tick(at(8, 0, 20)).await.unwrap();

    assert_eq!(report_a.fired, 1);
    assert_eq!(report_b.fired, 0);
    assert_eq!(report_b.deduplicated, 1);
    assert_eq!(shared_runs.runs_of("echo").len(), 1);
    assert_eq!(pipelines.echo_count(), 1);
}

#[tokio::test]
async fn test_skip_to_latest_fires_only_the_latest_missed_occurrence() {
    let f = fixture();
    let task = scheduled_task(UserId::new(), "echo", "*/5 * * * *", at(10, 5, 0));
    f.tasks.insert(task.clone());

    // Down from 10:05 to 10:32: 10:05 .. 10:30 were missed
    let report = f.scheduler.tick(at(10, 32, 0)).await.unwrap();

    assert_eq!(report.fired, 1);
    assert_eq!(report.dropped_misfires, 5);
    let runs = f.runs.runs_of("echo");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].scheduled_for, Some(at(10, 30, 0)));
    assert_eq!(f.tasks.get(task.id).unwrap().next_run_at, at(10, 35, 0));
}

#[tokio::test]
async fn test_catch_up_fires_every_missed_occurrence_in_order() {
    let f = fixture();
    let mut task = scheduled_task(UserId::new(), "echo", "*/5 * * * *", at(10, 5, 0));
    task.misfire_policy = MisfirePolicy::CatchUp;
    f.tasks.insert(task.clone());

    let report = f.scheduler.tick(at(10, 32, 0)).await.unwrap();

    assert_eq!(report.fired, 6);
    assert_eq!(report.dropped_misfires, 0);
    let fired: Vec<_> = f
        .runs
        .runs_of("echo")
        .into_iter()
        .filter_map(|r| r.scheduled_for)
        .collect();
    let expected: Vec<_> = (1..=6).map(|i| at(10, 5 * i, 0)).collect();
    assert_eq!(fired, expected);
}

#[tokio::test]
async fn test_catch_up_is_capped() {
    let f = fixture();
    let mut task = scheduled_task(UserId::new(), "echo", "* * * * *", at(6, 0, 0));
    task.misfire_policy = MisfirePolicy::CatchUp;
    f.tasks.insert(task.clone());

    // 61 occurrences missed (06:00 .. 07:00)
    let report = f.scheduler.tick(at(7, 0, 30)).await.unwrap();

    assert_eq!(report.fired, 10);
    assert_eq!(report.dropped_misfires, 51);
    let first_fired = f.runs.runs_of("echo")[0].scheduled_for;
    assert_eq!(first_fired, Some(at(6, 51, 0)));
}

#[tokio::test]
async fn test_next_run_always_moves_past_now() {
    let f = fixture();
    let expressions = ["* * * * *", "*/7 * * * *", "0 9 * * 1-5", "30 2 1 * *"];
    let mut ids = Vec::new();
    for expr in expressions {
        let task = scheduled_task(UserId::new(), "echo", expr, at(0, 0, 0) - Duration::days(3));
        ids.push(task.id);
        f.tasks.insert(task);
    }

    let now = at(12, 34, 56);
    f.scheduler.tick(now).await.unwrap();

    for id in ids {
        let task = f.tasks.get(id).unwrap();
        assert!(task.next_run_at > now, "{} -> {}", task.cron_expression, task.next_run_at);
    }
}

#[tokio::test]
async fn test_overlap_skip_holds_back_while_previous_run_is_running() {
    let f = fixture();
    let mut task = scheduled_task(UserId::new(), "echo", "*/5 * * * *", at(10, 5, 0));
    task.last_fired_at = Some(at(10, 0, 0));
    task.last_run_status = Some(RunStatus::Running);
    f.tasks.insert(task.clone());

    let report = f.scheduler.tick(at(10, 5, 1)).await.unwrap();

    assert_eq!(report.fired, 0);
    assert_eq!(report.skipped_overlap, 1);
    assert!(f.runs.runs().is_empty());
    // The occurrence is consumed, not retried
    assert_eq!(f.tasks.get(task.id).unwrap().next_run_at, at(10, 10, 0));
}

#[tokio::test]
async fn test_overlap_allow_fires_anyway() {
    let f = fixture();
    let mut task = scheduled_task(UserId::new(), "echo", "*/5 * * * *", at(10, 5, 0));
    task.overlap_policy = OverlapPolicy::Allow;
    task.last_fired_at = Some(at(10, 0, 0));
    task.last_run_status = Some(RunStatus::Running);
    f.tasks.insert(task);

    let report = f.scheduler.tick(at(10, 5, 1)).await.unwrap();

    assert_eq!(report.fired, 1);
    assert_eq!(report.skipped_overlap, 0);
}

#[tokio::test]
async fn test_stale_running_status_does_not_block_forever() {
    let f = fixture();
    let mut task = scheduled_task(UserId::new(), "echo", "*/5 * * * *", at(10, 5, 0));
    // A run that started long before the lease and never reported back
    task.last_fired_at = Some(at(7, 0, 0));
    task.last_run_status = Some(RunStatus::Running);
    f.tasks.insert(task);

    let report = f.scheduler.tick(at(10, 5, 1)).await.unwrap();
    assert_eq!(report.fired, 1);
}

#[tokio::test]
async fn test_failed_run_is_recorded_on_the_task() {
    let f = fixture();
    let task = scheduled_task(UserId::new(), "always_fails", "0 * * * *", at(8, 0, 0));
    f.tasks.insert(task.clone());

    let report = f.scheduler.tick(at(8, 0, 5)).await.unwrap();

    assert_eq!(report.fired, 1);
    assert_eq!(report.failed, 1);
    let stored = f.tasks.get(task.id).unwrap();
    assert_eq!(stored.last_run_status, Some(RunStatus::Failed));
    assert!(stored.last_run_id.is_some());
    assert_eq!(stored.next_run_at, at(9, 0, 0));
}

#[tokio::test]
async fn test_unknown_pipeline_counts_as_error_and_keeps_schedule() {
    let f = fixture();
    let task = scheduled_task(UserId::new(), "removed_pipeline", "0 * * * *", at(8, 0, 0));
    f.tasks.insert(task.clone());

    let report = f.scheduler.tick(at(8, 0, 5)).await.unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(report.fired, 0);
    let stored = f.tasks.get(task.id).unwrap();
    assert_eq!(stored.last_run_status, Some(RunStatus::Failed));
    assert!(stored.last_run_id.is_none());
    assert!(stored.enabled);
    assert_eq!(stored.next_run_at, at(9, 0, 0));
}

#[tokio::test]
async fn test_invalid_cron_disables_task() {
    let f = fixture();
    let task = scheduled_task(UserId::new(), "echo", "not a cron", at(8, 0, 0));
    f.tasks.insert(task.clone());

    let report = f.scheduler.tick(at(8, 0, 5)).await.unwrap();

    assert_eq!(report.claimed, 1);
    assert_eq!(report.fired, 0);
    assert!(!f.tasks.get(task.id).unwrap().enabled);
}

#[tokio::test]
async fn test_batch_size_limits_claims_per_tick() {
    let pipelines = test_registry();
    let test_deps = TestDependencies::new();
    let tasks = test_deps.task_store.clone();
    for _ in 0..3 {
        tasks.insert(scheduled_task(UserId::new(), "echo", "* * * * *", at(9, 0, 0)));
    }
    let scheduler = Scheduler::with_config(
        pipelines.registry.clone(),
        test_deps.into_lazy_deps(),
        SchedulerConfig {
            batch_size: 2,
            ..Default::default()
        },
    );

    assert_eq!(scheduler.tick(at(9, 0, 1)).await.unwrap().claimed, 2);
    assert_eq!(scheduler.tick(at(9, 0, 2)).await.unwrap().claimed, 1);
}

#[tokio::test]
async fn test_tick_fails_runs_orphaned_by_a_dead_process() {
    let f = fixture();
    let orphan = running_run("echo", Utc::now() - Duration::minutes(2), Some("api:k1"));
    f.runs.insert(orphan.clone());

    f.scheduler.tick(at(10, 0, 0)).await.unwrap();

    let after = f.runs.runs().into_iter().find(|r| r.id == orphan.id).unwrap();
    assert_eq!(after.status, RunStatus::Failed);
    assert_eq!(after.error.as_deref(), Some("interrupted"));
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_firings() {
    let finished = Arc::new(AtomicUsize::new(0));
    let mut registry = PipelineRegistry::new();
    registry.register(Sleepy {
        finished: finished.clone(),
    });
    let test_deps = TestDependencies::new();
    let runs = test_deps.run_store.clone();
    let tasks = test_deps.task_store.clone();

    // Three missed hourly occurrences, fired one after another
    let hour = Utc::now()
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap();
    let mut task = scheduled_task(UserId::new(), "sleepy", "0 * * * *", hour - Duration::hours(2));
    task.input = serde_json::json!({});
    task.misfire_policy = MisfirePolicy::CatchUp;
    tasks.insert(task.clone());

    let scheduler = Scheduler::with_config(
        Arc::new(registry),
        test_deps.into_lazy_deps(),
        SchedulerConfig {
            poll_interval: std::time::Duration::from_millis(100),
            ..Default::default()
        },
    );
    let handle = scheduler.spawn();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    handle.shutdown().await;

    let recorded = runs.runs();
    assert!(recorded.len() >= 3);
    assert_eq!(finished.load(Ordering::SeqCst), recorded.len());
    assert!(recorded.iter().all(|r| r.status == RunStatus::Succeeded));
    let task = tasks.get(task.id).unwrap();
    assert!(task.next_run_at > Utc::now());
    assert_eq!(task.last_run_status, Some(RunStatus::Succeeded));
}

#[tokio::test]
async fn test_run_returns_once_shutdown_is_requested() {
    let f = fixture();
    let scheduler = f.scheduler.clone();
    scheduler.request_shutdown();

    f.scheduler.run().await.unwrap();

    assert!(scheduler.is_shutdown_requested());
    assert!(f.runs.runs().is_empty());
}

#[tokio::test]
async fn test_manual_trigger_keeps_status_of_a_running_scheduled_firing() {
    let pipelines = test_registry();
    let test_deps = TestDependencies::new();
    let tasks = test_deps.task_store.clone();
    let mut task = scheduled_task(UserId::new(), "echo", "*/5 * * * *", at(10, 5, 0));
    task.last_run_status = Some(RunStatus::Running);
    task.last_fired_at = Some(Utc::now());
    tasks.insert(task.clone());
    let deps = test_deps.into_lazy_deps();

    let outcome = trigger_now(&task, &pipelines.registry, &deps).await.unwrap();

    assert_eq!(outcome.run.trigger, TriggerSource::Api);
    assert_eq!(outcome.run.status, RunStatus::Succeeded);
    let stored = tasks.get(task.id).unwrap();
    assert_eq!(stored.last_run_status, Some(RunStatus::Running));
    assert_eq!(stored.last_run_id, None);
    assert_eq!(stored.next_run_at, at(10, 5, 0));
}

#[tokio::test]
async fn test_manual_trigger_records_run_on_idle_task() {
    let pipelines = test_registry();
    let test_deps = TestDependencies::new();
    let tasks = test_deps.task_store.clone();
    let task = scheduled_task(UserId::new(), "always_fails", "*/5 * * * *", at(10, 5, 0));
    tasks.insert(task.clone());
    let deps = test_deps.into_lazy_deps();

    let outcome = trigger_now(&task, &pipelines.registry, &deps).await.unwrap();

    assert_eq!(outcome.run.status, RunStatus::Failed);
    let stored = tasks.get(task.id).unwrap();
    assert_eq!(stored.last_run_status, Some(RunStatus::Failed));
    assert_eq!(stored.last_run_id, Some(outcome.run.id));
}
