use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use agent_provider::{
    MessageRecord, ModelResponse, ProviderError, RequestPart, ResponsePart, ToolArguments,
};
use agent_provider_mock::ScriptedProvider;
use coding_agent::runtime::{AgentRuntime, RuntimeError};
use coding_agent::tools::ShellTool;
use serde_json::{Map, Value};
use session_store::{audit_session, InteractionKind, SessionLogger};
use tempfile::tempdir;

const SYSTEM_PROMPT: &str = "You are a test agent.";

fn runtime_with(provider: ScriptedProvider, base_dir: &Path) -> AgentRuntime {
    let logger = SessionLogger::create(base_dir).expect("session should be created");
    AgentRuntime::new(
        Arc::new(provider),
        ShellTool::new(None),
        logger,
        SYSTEM_PROMPT,
    )
}

fn interaction_dirs(session_dir: &Path) -> Vec<String> {
    let mut names = fs::read_dir(session_dir)
        .expect("session dir should be readable")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(|c: char| c.is_ascii_digit()))
        .collect::<Vec<_>>();
    names.sort();
    names
}

fn read_json(path: &Path) -> Value {
    let raw = fs::read_to_string(path)
        .unwrap_or_else(|error| panic!("reading {}: {error}", path.display()));
    serde_json::from_str(&raw).expect("interaction file should be valid json")
}

#[test]
fn plain_prompt_logs_user_and_llm_interactions() {
    let base = tempdir().expect("tempdir");
    let mut runtime = runtime_with(ScriptedProvider::new("mock-small"), base.path());

    let outcome = runtime.run_turn("hello there").expect("turn should succeed");
    assert_eq!(outcome.texts, vec!["You said: hello there".to_string()]);

    let report = outcome.report.expect("turn should be logged");
    assert_eq!(report.numbers(), vec![2]);
    assert_eq!(report.count(InteractionKind::Llm), 1);

    let session_dir = runtime.logger().session().dir().to_path_buf();
    assert_eq!(interaction_dirs(&session_dir), vec!["001-user", "002-llm"]);

    let user = read_json(&session_dir.join("001-user/001-request.json"));
    assert_eq!(user["role"], "user");
    assert_eq!(user["content"], "hello there");

    let request = read_json(&session_dir.join("002-llm/002-request.json"));
    assert_eq!(request["model"], "mock-small");
    assert_eq!(request["messages"][0]["role"], "system");
    assert_eq!(request["messages"][0]["content"], SYSTEM_PROMPT);
    assert_eq!(request["messages"][1]["content"], "hello there");

    let response = read_json(&session_dir.join("002-llm/003-response.json"));
    assert_eq!(response["choices"][0]["finish_reason"], "stop");
    assert_eq!(
        response["choices"][0]["message"]["content"],
        "You said: hello there"
    );
}

#[test]
fn shell_tool_turn_logs_every_model_and_tool_call() {
    let base = tempdir().expect("tempdir");
    let mut runtime = runtime_with(ScriptedProvider::default(), base.path());

    let outcome = runtime.run_turn("$ printf hi").expect("turn should succeed");
    assert_eq!(
        outcome.texts,
        vec!["Received output from 1 tool call(s).".to_string()]
    );
    assert_eq!(runtime.history().len(), 4);

    let session_dir = runtime.logger().session().dir().to_path_buf();
    assert_eq!(
        interaction_dirs(&session_dir),
        vec!["001-user", "002-llm", "003-tool", "004-llm"]
    );

    let tool_request = read_json(&session_dir.join("003-tool/003-request.json"));
    assert_eq!(tool_request["tool_name"], "shell");
    assert_eq!(tool_request["content"], "printf hi");

    let tool_response = read_json(&session_dir.join("003-tool/004-response.json"));
    assert_eq!(tool_response["matched"], true);
    let output = tool_response["content"].as_str().expect("tool output text");
    assert!(output.ends_with("hi"), "unexpected tool output: {output}");

    let follow_up = read_json(&session_dir.join("004-llm/004-request.json"));
    let roles = follow_up["messages"]
        .as_array()
        .expect("messages array")
        .iter()
        .map(|message| message["role"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);

    let audit = audit_session(&session_dir).expect("audit should run");
    assert!(audit.is_clean(), "divergences: {:?}", audit.divergences);
    assert_eq!(audit.expected, 3);
}

#[test]
fn second_turn_continues_the_logged_transcript() {
    let base = tempdir().expect("tempdir");
    let mut runtime = runtime_with(ScriptedProvider::default(), base.path());

    runtime.run_turn("$ printf hi").expect("first turn");
    let outcome = runtime.run_turn("thanks").expect("second turn");
    assert_eq!(outcome.report.expect("logged").numbers(), vec![6]);

    let session_dir = runtime.logger().session().dir().to_path_buf();
    let request = read_json(&session_dir.join("006-llm/006-request.json"));
    let messages = request["messages"].as_array().expect("messages array");
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[5]["role"], "user");
    assert_eq!(messages[5]["content"], "thanks");

    let record = runtime.logger().validation_record();
    assert_eq!(record.turns.len(), 2);
    assert_eq!(record.slots().count(), 4);
}

#[test]
fn cancelled_turn_is_rolled_back_and_not_logged() {
    let base = tempdir().expect("tempdir");
    let mut runtime = runtime_with(ScriptedProvider::default(), base.path());

    let cancel = runtime.cancel_signal();
    cancel.store(true, Ordering::SeqCst);
    let error = runtime.run_turn("hello").expect_err("cancelled turn must fail");
    assert!(matches!(
        error,
        RuntimeError::Provider(ProviderError::Cancelled)
    ));
    assert!(runtime.history().is_empty());

    cancel.store(false, Ordering::SeqCst);
    runtime.run_turn("hello again").expect("turn after cancel");

    let first = &runtime.history()[0];
    let request = first.as_request().expect("first record is a request");
    assert!(request.has_system_prompt());

    let session_dir = runtime.logger().session().dir().to_path_buf();
    assert_eq!(
        interaction_dirs(&session_dir),
        vec!["001-user", "002-user", "003-llm"]
    );
}

#[test]
fn runaway_tool_loop_is_bounded() {
    let base = tempdir().expect("tempdir");
    let looping_call = || {
        ModelResponse::new(vec![ResponsePart::ToolCall {
            tool_call_id: "loop".to_string(),
            tool_name: "shell".to_string(),
            args: ToolArguments::Structured(Map::new()),
        }])
    };
    let provider = ScriptedProvider::with_responses("mock", vec![looping_call(), looping_call()]);
    let mut runtime = runtime_with(provider, base.path()).with_max_model_calls(2);

    let error = runtime.run_turn("go").expect_err("loop must be cut off");
    assert!(matches!(error, RuntimeError::TooManyModelCalls(2)));
    assert!(runtime.history().is_empty());
}

#[test]
fn new_conversation_reopens_with_system_prompt() {
    let base = tempdir().expect("tempdir");
    let mut runtime = runtime_with(ScriptedProvider::default(), base.path());

    runtime.run_turn("one").expect("first turn");
    runtime.new_conversation();
    let outcome = runtime.run_turn("two").expect("turn after reset");
    assert!(outcome.report.is_some());

    assert!(matches!(
        &runtime.history()[0],
        MessageRecord::Request(request)
            if matches!(request.parts.first(), Some(RequestPart::SystemPrompt { .. }))
    ));

    let session_dir = runtime.logger().session().dir().to_path_buf();
    let request = read_json(&session_dir.join("004-llm/004-request.json"));
    assert_eq!(request["messages"].as_array().map(Vec::len), Some(2));
}
