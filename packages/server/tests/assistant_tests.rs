//! The assistant's tool-calling loop against a scripted model.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use common::test_registry;
use jobtrack_core::common::UserId;
use jobtrack_core::domains::assistant::{
    tool_definitions, Assistant, AssistantError, ChatMessage, ChatRole,
};
use jobtrack_core::domains::pipelines::{RunStatus, TriggerSource};
use jobtrack_core::kernel::test_dependencies::MockAI;
use jobtrack_core::kernel::TestDependencies;

fn tool_messages(request: &[Value]) -> Vec<&Value> {
    request.iter().filter(|m| m["role"] == "tool").collect()
}

#[tokio::test]
async fn test_plain_answer_without_tools() {
    let pipelines = test_registry();
    let ai = Arc::new(MockAI::new().with_response("Nothing to do."));
    let deps = TestDependencies::new().shared_ai(ai.clone()).into_lazy_deps();

    let reply = Assistant::new(pipelines.registry.clone(), deps)
        .chat(UserId::new(), &[], "hello")
        .await
        .unwrap();

    assert_eq!(reply.reply, "Nothing to do.");
    assert_eq!(reply.iterations, 1);
    assert!(reply.runs.is_empty());

    let requests = ai.tool_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0][0]["role"], "system");
    assert_eq!(requests[0].last().unwrap()["content"], "hello");
}

#[tokio::test]
async fn test_history_is_sent_before_the_new_message() {
    let pipelines = test_registry();
    let ai = Arc::new(MockAI::new().with_response("ok"));
    let deps = TestDependencies::new().shared_ai(ai.clone()).into_lazy_deps();
    let history = vec![
        ChatMessage {
            role: ChatRole::User,
            content: "first question".into(),
        },
        ChatMessage {
            role: ChatRole::Assistant,
            content: "first answer".into(),
        },
    ];

    Assistant::new(pipelines.registry.clone(), deps)
        .chat(UserId::new(), &history, "second question")
        .await
        .unwrap();

    let sent = &ai.tool_requests()[0];
    let roles: Vec<&str> = sent.iter().filter_map(|m| m["role"].as_str()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    assert_eq!(sent[2]["content"], "first answer");
}

#[tokio::test]
async fn test_tool_call_runs_pipeline_as_agent() {
    let pipelines = test_registry();
    let ai = Arc::new(
        MockAI::new()
            .with_tool_call("call_1", "echo", json!({"message": "from the model"}))
            .with_response("I echoed it."),
    );
    let test_deps = TestDependencies::new().shared_ai(ai.clone());
    let runs = test_deps.run_store.clone();
    let deps = test_deps.into_lazy_deps();
    let user = UserId::new();

    let reply = Assistant::new(pipelines.registry.clone(), deps)
        .chat(user, &[], "echo something")
        .await
        .unwrap();

    assert_eq!(reply.reply, "I echoed it.");
    assert_eq!(reply.iterations, 2);
    assert_eq!(reply.runs.len(), 1);
    assert_eq!(reply.runs[0].trigger, TriggerSource::Agent);
    assert_eq!(reply.runs[0].status, RunStatus::Succeeded);

    let recorded = runs.runs_of("echo");
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].user_id, Some(user));
    assert_eq!(pipelines.echo_count(), 1);

    // The second model call sees the tool result
    let requests = ai.tool_requests();
    assert_eq!(requests.len(), 2);
    let tools = tool_messages(&requests[1]);
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["tool_call_id"], "call_1");
    let content: Value = serde_json::from_str(tools[0]["content"].as_str().unwrap()).unwrap();
    assert_eq!(content["status"], "succeeded");
    assert_eq!(content["output"]["echoed"], "from the model");
}

#[tokio::test]
async fn test_tool_errors_are_reported_back_to_the_model() {
    let pipelines = test_registry();
    let ai = Arc::new(
        MockAI::new()
            .with_tool_call("call_1", "does_not_exist", json!({}))
            .with_tool_call("call_2", "echo", json!({"wrong": true}))
            .with_response("Sorry, that did not work."),
    );
    let deps = TestDependencies::new().shared_ai(ai.clone()).into_lazy_deps();

    let reply = Assistant::new(pipelines.registry.clone(), deps)
        .chat(UserId::new(), &[], "try things")
        .await
        .unwrap();

    assert_eq!(reply.iterations, 3);
    assert!(reply.runs.is_empty());

    let last_request = ai.tool_requests().pop().unwrap();
    let tools = tool_messages(&last_request);
    assert_eq!(tools.len(), 2);
    for tool in tools {
        let content: Value = serde_json::from_str(tool["content"].as_str().unwrap()).unwrap();
        assert!(content["error"].is_string(), "{}", content);
    }
}

#[tokio::test]
async fn test_pipelines_hidden_from_agent_are_not_offered_or_runnable() {
    let pipelines = test_registry();

    let tools = tool_definitions(&pipelines.registry);
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["function"]["name"].as_str())
        .collect();
    assert!(names.contains(&"echo"));
    assert!(!names.contains(&"whoami"));

    let ai = Arc::new(
        MockAI::new()
            .with_tool_call("call_1", "whoami", json!({}))
            .with_response("done"),
    );
    let test_deps = TestDependencies::new().shared_ai(ai.clone());
    let runs = test_deps.run_store.clone();

    let reply = Assistant::new(pipelines.registry.clone(), test_deps.into_lazy_deps())
        .chat(UserId::new(), &[], "who am I")
        .await
        .unwrap();

    assert!(reply.runs.is_empty());
    assert!(runs.runs().is_empty());
}

#[tokio::test]
async fn test_tool_definitions_carry_input_schema() {
    let pipelines = test_registry();
    let tools = tool_definitions(&pipelines.registry);
    let echo = tools
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["function"]["name"] == "echo")
        .unwrap();

    assert_eq!(echo["type"], "function");
    let parameters = &echo["function"]["parameters"];
    assert!(parameters.get("$schema").is_none());
    assert!(parameters["properties"]["message"].is_object());
}

#[tokio::test]
async fn test_loop_stops_at_iteration_limit() {
    let pipelines = test_registry();
    let mut ai = MockAI::new();
    for i in 0..5 {
        ai = ai.with_tool_call(&format!("call_{}", i), "echo", json!({"message": "again"}));
    }
    let ai = Arc::new(ai);
    let deps = TestDependencies::new().shared_ai(ai.clone()).into_lazy_deps();

    let reply = Assistant::new(pipelines.registry.clone(), deps)
        .with_max_iterations(3)
        .chat(UserId::new(), &[], "loop forever")
        .await
        .unwrap();

    assert_eq!(reply.iterations, 3);
    assert_eq!(reply.runs.len(), 3);
    assert!(reply.reply.contains("stopped after 3"));
    assert_eq!(ai.tool_requests().len(), 3);
}

#[tokio::test]
async fn test_unconfigured_model_is_reported() {
    let pipelines = test_registry();
    let deps = TestDependencies::new()
        .mock_ai(MockAI::unconfigured())
        .into_lazy_deps();

    let err = Assistant::new(pipelines.registry.clone(), deps)
        .chat(UserId::new(), &[], "hello")
        .await
        .unwrap_err();

    assert!(matches!(err, AssistantError::NotConfigured));
}
