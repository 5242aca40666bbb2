//! Tool-calling loop over [`BaseAI`].
//!
//! Every agent-visible pipeline is offered as a chat-completions function
//! tool whose parameters are the pipeline's input schema. Tool calls run
//! through the registry with trigger `agent`, so they are recorded like any
//! other run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::common::UserId;
use crate::domains::pipelines::{
    InvokeRequest, PipelineRegistry, PipelineRunData, SharedPipelineRegistry, TriggerSource,
};
use crate::kernel::{BaseAI, ServerDeps};

pub const DEFAULT_MAX_ITERATIONS: usize = 6;

const SYSTEM_PROMPT: &str = "You are a job-search assistant. You help the user track job \
postings, keep their search profile useful and automate routine work. Use the available \
tools to act on the user's data instead of guessing, and summarize what each tool did. \
Keep answers short.";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("the assistant is not configured (set OPENAI_API_KEY)")]
    NotConfigured,

    #[error("assistant model call failed: {0:#}")]
    Ai(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One prior turn of the conversation, as the client keeps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub reply: String,
    /// Runs started by tool calls, in call order.
    pub runs: Vec<PipelineRunData>,
    pub iterations: usize,
}

/// Function tool definitions for every agent-visible pipeline.
pub fn tool_definitions(registry: &PipelineRegistry) -> Value {
    let tools: Vec<Value> = registry
        .describe()
        .into_iter()
        .filter(|d| d.agent_tool)
        .map(|d| {
            json!({
                "type": "function",
                "function": {
                    "name": d.name,
                    "description": d.description,
                    "parameters": d.input_schema,
                }
            })
        })
        .collect();
    Value::Array(tools)
}

pub struct Assistant {
    registry: SharedPipelineRegistry,
    deps: Arc<ServerDeps>,
    max_iterations: usize,
}

impl Assistant {
    pub fn new(registry: SharedPipelineRegistry, deps: Arc<ServerDeps>) -> Self {
        Self {
            registry,
            deps,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    fn ai(&self) -> &Arc<dyn BaseAI> {
        &self.deps.ai
    }

    pub async fn chat(
        &self,
        user_id: UserId,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<AssistantReply, AssistantError> {
        if !self.ai().is_configured() {
            return Err(AssistantError::NotConfigured);
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(json!({"role": "system", "content": SYSTEM_PROMPT}));
        for turn in history {
            messages.push(json!({"role": turn.role, "content": turn.content}));
        }
        messages.push(json!({"role": "user", "content": message}));

        let tools = tool_definitions(&self.registry);
        let mut runs = Vec::new();

        for iteration in 1..=self.max_iterations {
            let response = self.ai().generate_with_tools(&messages, &tools).await?;

            let tool_calls = response
                .get("tool_calls")
                .and_then(Value::as_array)
                .filter(|calls| !calls.is_empty())
                .cloned();

            let Some(tool_calls) = tool_calls else {
                let reply = response
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                info!(user_id = %user_id, iterations = iteration, runs = runs.len(), "assistant replied");
                return Ok(AssistantReply {
                    reply,
                    runs,
                    iterations: iteration,
                });
            };

            messages.push(response);
            for call in &tool_calls {
                let (tool_call_id, content) = self.run_tool_call(user_id, call, &mut runs).await;
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": content.to_string(),
                }));
            }
        }

        warn!(user_id = %user_id, max_iterations = self.max_iterations, "assistant hit the tool-call limit");
        Ok(AssistantReply {
            reply: format!(
                "I stopped after {} rounds of tool calls. Check the runs below for what was done.",
                self.max_iterations
            ),
            runs,
            iterations: self.max_iterations,
        })
    }

    /// Execute one tool call. Returns the call id and the JSON result the
    /// model sees.
    async fn run_tool_call(
        &self,
        user_id: UserId,
        call: &Value,
        runs: &mut Vec<PipelineRunData>,
    ) -> (String, Value) {
        let tool_call_id = call
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let function = call.get("function").cloned().unwrap_or(Value::Null);
        let name = function
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let arguments = function
            .get("arguments")
            .and_then(Value::as_str)
            .unwrap_or("{}");

        let input: Value = match serde_json::from_str(arguments) {
            Ok(input) => input,
            Err(e) => {
                return (
                    tool_call_id,
                    json!({"error": format!("arguments are not valid JSON: {}", e)}),
                )
            }
        };

        debug!(tool = %name, "assistant calling pipeline");
        let request = InvokeRequest::builder()
            .pipeline(name)
            .input(input)
            .user_id(Some(user_id))
            .trigger(TriggerSource::Agent)
            .build();

        let content = match self.registry.invoke(request, &self.deps).await {
            Ok(outcome) => {
                let run = PipelineRunData::from(outcome.run);
                let content = json!({
                    "run_id": run.id,
                    "status": run.status,
                    "output": run.output,
                    "error": run.error,
                });
                runs.push(run);
                content
            }
            Err(e) => json!({"error": e.to_string()}),
        };

        (tool_call_id, content)
    }
}
