// TestDependencies - mock implementations for testing
//
// Doubles for every external service plus in-memory run and task stores, so
// pipelines, the registry, the scheduler and the assistant run without
// network access. The database pool is lazy; only pipelines that touch
// Postgres need a real one.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::sync::{Arc, Mutex};

use super::{
    BaseAI, BaseJobExtractor, BaseJobScraper, BaseMailboxService, ExtractedJob, IncomingEmail,
    MailboxBatch, MailboxCredentials, PipelineSettings, ServerDeps, StreamHub,
};
use crate::common::{PipelineRunId, ScheduledTaskId, ValidatedPage};
use crate::domains::auth::JwtService;
use crate::domains::pipelines::{
    NewPipelineRun, PipelineRun, PipelineRunStore, RunFilter, RunOutcome, RunStatus, StartOutcome,
};
use crate::domains::scheduling::{
    claim_task, ClaimPolicy, ClaimedTask, ScheduledTask, ScheduledTaskStore,
};

pub const TEST_JWT_SECRET: &str = "test_secret_key";
pub const TEST_JWT_ISSUER: &str = "jobtrack-test";

// =============================================================================
// Mock AI (Generic LLM capabilities)
// =============================================================================

pub struct MockAI {
    responses: Arc<Mutex<Vec<Value>>>,
    calls: Arc<Mutex<Vec<String>>>,
    tool_calls: Arc<Mutex<Vec<Vec<Value>>>>,
    configured: bool,
}

impl MockAI {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            tool_calls: Arc::new(Mutex::new(Vec::new())),
            configured: true,
        }
    }

    /// Behave like a client without an API key
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Add a text response to the queue
    pub fn with_response(self, response: impl Into<String>) -> Self {
        let message = json!({"role": "assistant", "content": response.into()});
        self.responses.lock().unwrap().push(message);
        self
    }

    /// Queue an assistant message that calls one tool with `arguments`
    pub fn with_tool_call(self, id: &str, name: &str, arguments: Value) -> Self {
        let message = json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": arguments.to_string()},
            }],
        });
        self.responses.lock().unwrap().push(message);
        self
    }

    /// Get all prompts that were sent to `complete`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Message lists sent to `generate_with_tools`, one per call
    pub fn tool_requests(&self) -> Vec<Vec<Value>> {
        self.tool_calls.lock().unwrap().clone()
    }

    /// Get the number of times the AI was called
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len() + self.tool_calls.lock().unwrap().len()
    }

    fn next_message(&self) -> Value {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            json!({"role": "assistant", "content": "Mock AI response"})
        } else {
            responses.remove(0)
        }
    }
}

impl Default for MockAI {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAI for MockAI {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push(prompt.to_string());
        let message = self.next_message();
        Ok(message["content"].as_str().unwrap_or_default().to_string())
    }

    async fn generate_with_tools(&self, messages: &[Value], _tools: &Value) -> Result<Value> {
        self.tool_calls.lock().unwrap().push(messages.to_vec());
        Ok(self.next_message())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

// =============================================================================
// Mock Mailbox
// =============================================================================

pub struct MockMailbox {
    batches: Arc<Mutex<Vec<MailboxBatch>>>,
    calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
    fail: bool,
}

impl MockMailbox {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn with_batch(self, messages: Vec<IncomingEmail>, next_cursor: Option<&str>) -> Self {
        self.batches.lock().unwrap().push(MailboxBatch {
            messages,
            next_cursor: next_cursor.map(str::to_string),
        });
        self
    }

    /// (address, cursor) of every fetch
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseMailboxService for MockMailbox {
    async fn fetch_messages(
        &self,
        mailbox: &MailboxCredentials,
        cursor: Option<&str>,
        _limit: usize,
    ) -> Result<MailboxBatch> {
        self.calls
            .lock()
            .unwrap()
            .push((mailbox.address.clone(), cursor.map(str::to_string)));
        if self.fail {
            return Err(anyhow!("mock mailbox unavailable"));
        }
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            Ok(MailboxBatch::default())
        } else {
            Ok(batches.remove(0))
        }
    }
}

// =============================================================================
// Mock Job Extractor / Scraper
// =============================================================================

/// Returns the same postings for every email.
pub struct MockJobExtractor {
    jobs: Vec<ExtractedJob>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockJobExtractor {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_jobs(mut self, jobs: Vec<ExtractedJob>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Provider ids of the emails seen
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockJobExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseJobExtractor for MockJobExtractor {
    async fn extract_jobs(&self, email: &IncomingEmail) -> Result<Vec<ExtractedJob>> {
        self.calls
            .lock()
            .unwrap()
            .push(email.provider_message_id.clone());
        Ok(self.jobs.clone())
    }
}

pub struct MockJobScraper {
    jobs: Vec<ExtractedJob>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockJobScraper {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_jobs(mut self, jobs: Vec<ExtractedJob>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn was_scraped(&self, url: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|u| u == url)
    }
}

impl Default for MockJobScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseJobScraper for MockJobScraper {
    async fn scrape(&self, url: &str) -> Result<Vec<ExtractedJob>> {
        self.calls.lock().unwrap().push(url.to_string());
        Ok(self.jobs.clone())
    }
}

// =============================================================================
// In-memory pipeline run store
// =============================================================================

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: Mutex<Vec<PipelineRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every run, oldest first
    pub fn runs(&self) -> Vec<PipelineRun> {
        self.runs.lock().unwrap().clone()
    }

    pub fn runs_of(&self, pipeline: &str) -> Vec<PipelineRun> {
        self.runs()
            .into_iter()
            .filter(|r| r.pipeline_name == pipeline)
            .collect()
    }

    /// Insert a run as-is, e.g. to simulate one left over by a crash
    pub fn insert(&self, run: PipelineRun) {
        self.runs.lock().unwrap().push(run);
    }
}

fn holds_key(run: &PipelineRun, pipeline: &str, key: &str) -> bool {
    run.pipeline_name == pipeline
        && run.idempotency_key.as_deref() == Some(key)
        && matches!(run.status, RunStatus::Running | RunStatus::Succeeded)
}

#[async_trait]
impl PipelineRunStore for InMemoryRunStore {
    async fn start(&self, run: NewPipelineRun) -> Result<StartOutcome> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(key) = run.idempotency_key.as_deref() {
            if runs.iter().any(|r| holds_key(r, &run.pipeline_name, key)) {
                return Ok(StartOutcome::KeyConflict);
            }
        }

        let now = Utc::now();
        let record = PipelineRun {
            id: run.id,
            user_id: run.user_id,
            pipeline_name: run.pipeline_name,
            trigger: run.trigger,
            status: RunStatus::Running,
            input: run.input,
            output: None,
            error: None,
            idempotency_key: run.idempotency_key,
            scheduled_task_id: run.scheduled_task_id,
            scheduled_for: run.scheduled_for,
            started_at: now,
            finished_at: None,
            duration_ms: None,
            heartbeat_at: now,
            created_at: now,
            updated_at: now,
        };
        runs.push(record.clone());
        Ok(StartOutcome::Started(record))
    }

    async fn finish(&self, id: PipelineRunId, outcome: RunOutcome) -> Result<PipelineRun> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("run {} not found", id))?;

        let now = Utc::now();
        match outcome {
            RunOutcome::Succeeded(output) => {
                run.status = RunStatus::Succeeded;
                run.output = Some(output);
            }
            RunOutcome::Failed(error) => {
                run.status = RunStatus::Failed;
                run.error = Some(error);
            }
        }
        run.finished_at = Some(now);
        run.duration_ms = Some((now - run.started_at).num_milliseconds());
        run.updated_at = now;
        Ok(run.clone())
    }

    async fn find_by_idempotency_key(
        &self,
        pipeline: &str,
        key: &str,
    ) -> Result<Option<PipelineRun>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| holds_key(r, pipeline, key))
            .cloned())
    }

    async fn find(&self, id: PipelineRunId) -> Result<Option<PipelineRun>> {
        Ok(self.runs.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, filter: &RunFilter, page: &ValidatedPage) -> Result<Vec<PipelineRun>> {
        let mut runs: Vec<PipelineRun> = self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .filter(|r| page.after.map_or(true, |after| r.id.into_uuid() < after))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.id.cmp(&a.id));
        runs.truncate(page.fetch_limit() as usize);
        Ok(runs)
    }

    async fn heartbeat(&self, id: PipelineRunId) -> Result<()> {
        for run in self.runs.lock().unwrap().iter_mut() {
            if run.id == id && run.status == RunStatus::Running {
                run.heartbeat_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn fail_interrupted(&self, heartbeat_before: DateTime<Utc>) -> Result<u64> {
        let mut count = 0;
        let now = Utc::now();
        for run in self.runs.lock().unwrap().iter_mut() {
            if run.status == RunStatus::Running && run.heartbeat_at < heartbeat_before {
                run.status = RunStatus::Failed;
                run.error = Some("interrupted".to_string());
                run.finished_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut runs = self.runs.lock().unwrap();
        let before = runs.len();
        runs.retain(|r| r.status == RunStatus::Running || r.finished_at.map_or(true, |f| f >= cutoff));
        Ok((before - runs.len()) as u64)
    }
}

// =============================================================================
// In-memory scheduled task store
// =============================================================================

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: ScheduledTask) {
        self.tasks.lock().unwrap().push(task);
    }

    pub fn get(&self, id: ScheduledTaskId) -> Option<ScheduledTask> {
        self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }
}

#[async_trait]
impl ScheduledTaskStore for InMemoryTaskStore {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        policy: &ClaimPolicy,
    ) -> Result<Vec<ClaimedTask>> {
        // One lock for the whole claim mirrors the row locks of the real store
        let mut tasks = self.tasks.lock().unwrap();
        let mut due: Vec<&mut ScheduledTask> = tasks
            .iter_mut()
            .filter(|t| t.enabled && t.next_run_at <= now)
            .collect();
        due.sort_by_key(|t| (t.next_run_at, t.id));

        let mut claimed = Vec::new();
        for task in due.into_iter().take(limit.max(0) as usize) {
            let claim = claim_task(task.clone(), now, policy);
            match claim.plan.next_run_at {
                Some(next) => task.next_run_at = next,
                None => task.enabled = false,
            }
            if let Some(fired_at) = claim.fired_at() {
                task.last_fired_at = Some(fired_at);
                task.last_run_status = Some(RunStatus::Running);
            }
            task.updated_at = now;
            claimed.push(claim);
        }
        Ok(claimed)
    }

    async fn record_run(
        &self,
        id: ScheduledTaskId,
        run_id: Option<PipelineRunId>,
        status: RunStatus,
    ) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            if run_id.is_some() {
                task.last_run_id = run_id;
            }
            task.last_run_status = Some(status);
        }
        Ok(())
    }

    async fn record_manual_run(
        &self,
        id: ScheduledTaskId,
        run_id: PipelineRunId,
        status: RunStatus,
    ) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.iter_mut().find(|t| t.id == id) {
            Some(task) if task.last_run_status != Some(RunStatus::Running) => {
                task.last_run_id = Some(run_id);
                task.last_run_status = Some(status);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find(&self, id: ScheduledTaskId) -> Result<Option<ScheduledTask>> {
        Ok(self.get(id))
    }
}

// =============================================================================
// TestDependencies builder
// =============================================================================

/// Pool that never connects until used. Pipelines that only go through the
/// stores and mocks never touch it.
pub fn lazy_test_pool() -> PgPool {
    PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy_with(PgConnectOptions::new())
}

pub struct TestDependencies {
    pub ai: Arc<dyn BaseAI>,
    pub mailbox: Arc<dyn BaseMailboxService>,
    pub job_extractor: Arc<dyn BaseJobExtractor>,
    pub job_scraper: Arc<dyn BaseJobScraper>,
    pub run_store: Arc<InMemoryRunStore>,
    pub task_store: Arc<InMemoryTaskStore>,
    pub stream_hub: StreamHub,
    pub settings: PipelineSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            ai: Arc::new(MockAI::new()),
            mailbox: Arc::new(MockMailbox::new()),
            job_extractor: Arc::new(MockJobExtractor::new()),
            job_scraper: Arc::new(MockJobScraper::new()),
            run_store: Arc::new(InMemoryRunStore::new()),
            task_store: Arc::new(InMemoryTaskStore::new()),
            stream_hub: StreamHub::new(),
            settings: PipelineSettings::default(),
        }
    }

    /// Set a mock AI
    pub fn mock_ai(mut self, ai: MockAI) -> Self {
        self.ai = Arc::new(ai);
        self
    }

    /// Share a mock AI the test keeps inspecting
    pub fn shared_ai(mut self, ai: Arc<MockAI>) -> Self {
        self.ai = ai;
        self
    }

    pub fn mock_mailbox(mut self, mailbox: MockMailbox) -> Self {
        self.mailbox = Arc::new(mailbox);
        self
    }

    pub fn mock_extractor(mut self, extractor: MockJobExtractor) -> Self {
        self.job_extractor = Arc::new(extractor);
        self
    }

    pub fn mock_scraper(mut self, scraper: MockJobScraper) -> Self {
        self.job_scraper = Arc::new(scraper);
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Convert into ServerDeps backed by `db_pool`
    pub fn into_deps(self, db_pool: PgPool) -> Arc<ServerDeps> {
        Arc::new(ServerDeps::new(
            db_pool,
            self.ai,
            self.mailbox,
            self.job_extractor,
            self.job_scraper,
            self.run_store,
            self.task_store,
            Arc::new(JwtService::new(TEST_JWT_SECRET, TEST_JWT_ISSUER.to_string())),
            self.stream_hub,
            self.settings,
        ))
    }

    /// Convert into ServerDeps with a pool that is never connected
    pub fn into_lazy_deps(self) -> Arc<ServerDeps> {
        self.into_deps(lazy_test_pool())
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
