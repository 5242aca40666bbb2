//! The typed pipeline contract and its type-erased form.
//!
//! A pipeline declares its name, a JSON-schema-described input type and a
//! serializable output. The blanket [`ErasedPipeline`] impl lets the registry
//! store every pipeline behind one trait object and drive it with JSON.
//!
//! ```rust,ignore
//! pub struct ArchiveStaleJobs;
//!
//! #[async_trait]
//! impl Pipeline for ArchiveStaleJobs {
//!     const NAME: &'static str = "archive_stale_jobs";
//!     const DESCRIPTION: &'static str = "Archive postings nobody touched in N days";
//!     type Input = ArchiveInput;
//!     type Output = ArchiveOutput;
//!
//!     async fn execute(&self, input: ArchiveInput, ctx: &PipelineContext) -> Result<ArchiveOutput> {
//!         ...
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::models::TriggerSource;
use crate::common::{PipelineRunId, UserId};
use crate::kernel::ServerDeps;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// What a running pipeline knows about its invocation.
#[derive(Clone)]
pub struct PipelineContext {
    pub run_id: PipelineRunId,
    pub user_id: Option<UserId>,
    pub trigger: TriggerSource,
    pub deps: Arc<ServerDeps>,
}

impl PipelineContext {
    /// The owning user; user-scoped pipelines fail without one.
    pub fn require_user(&self) -> Result<UserId> {
        self.user_id
            .ok_or_else(|| anyhow!("this pipeline must be run on behalf of a user"))
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    /// May be started by a signed webhook delivery.
    const WEBHOOK: bool = false;
    /// Offered to the assistant as a tool.
    const AGENT_TOOL: bool = true;

    type Input: DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + Send;

    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    async fn execute(&self, input: Self::Input, ctx: &PipelineContext) -> Result<Self::Output>;
}

/// Registry-facing description of a pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub webhook: bool,
    pub agent_tool: bool,
    pub timeout_secs: u64,
    pub input_schema: serde_json::Value,
}

/// Object-safe pipeline driven by JSON values.
#[async_trait]
pub trait ErasedPipeline: Send + Sync {
    fn name(&self) -> &'static str;

    fn descriptor(&self) -> PipelineDescriptor;

    fn timeout(&self) -> Duration;

    /// Check that `input` deserializes into the pipeline's input type.
    fn validate(&self, input: &serde_json::Value) -> Result<(), String>;

    async fn execute_json(
        &self,
        input: serde_json::Value,
        ctx: &PipelineContext,
    ) -> Result<serde_json::Value>;
}

/// JSON schema of `T` with the `$schema` marker stripped, as LLM tool
/// definitions expect.
pub fn input_schema<T: JsonSchema>() -> serde_json::Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    schema
}

#[async_trait]
impl<P: Pipeline> ErasedPipeline for P {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn descriptor(&self) -> PipelineDescriptor {
        PipelineDescriptor {
            name: P::NAME,
            description: P::DESCRIPTION,
            webhook: P::WEBHOOK,
            agent_tool: P::AGENT_TOOL,
            timeout_secs: Pipeline::timeout(self).as_secs(),
            input_schema: input_schema::<P::Input>(),
        }
    }

    fn timeout(&self) -> Duration {
        Pipeline::timeout(self)
    }

    fn validate(&self, input: &serde_json::Value) -> Result<(), String> {
        P::Input::deserialize(input)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn execute_json(
        &self,
        input: serde_json::Value,
        ctx: &PipelineContext,
    ) -> Result<serde_json::Value> {
        let typed: P::Input = serde_json::from_value(input)
            .map_err(|e| anyhow!("invalid input for {}: {}", P::NAME, e))?;
        let output = self.execute(typed, ctx).await?;
        Ok(serde_json::to_value(output)?)
    }
}
