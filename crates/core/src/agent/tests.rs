use std::future::ready;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use turnstile_model::{
    ErrorKind, ModelMessage, ModelTool, StreamFragment, ToolCallDelta,
};
use turnstile_test_model::{
    PresetFailure, PresetFragment, PresetResponse, TestModelProvider,
};

use crate::augment::{Augmenter, BoxError, Retriever};
use crate::tool::{
    Error as ToolError, LocalProvider, READ_SKILL_TOOL, Registry,
    SkillSource, Tool, ToolProvider, ToolResult,
};
use crate::{AgentBuilder, Error, LoopStage, TranscriptSource};

#[derive(Deserialize)]
struct AddInput {
    a: i64,
    b: i64,
}

struct AddTool(Value);

impl AddTool {
    fn new() -> Self {
        Self(json!({
            "type": "object",
            "properties": {
                "a": { "type": "integer" },
                "b": { "type": "integer" }
            },
            "required": ["a", "b"]
        }))
    }
}

impl Tool for AddTool {
    type Input = AddInput;

    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Adds two integers."
    }

    fn parameter_schema(&self) -> &Value {
        &self.0
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(Ok(json!(input.a + input.b)))
    }
}

async fn calc_registry() -> Registry {
    let provider = LocalProvider::new("calc").with_tool(AddTool::new());
    Registry::connect(vec![Box::new(provider)], None).await
}

type Transcript = Arc<Mutex<Vec<(String, TranscriptSource)>>>;

fn recorder() -> (Transcript, impl Fn(&str, TranscriptSource) + Send + Sync)
{
    let transcript: Transcript = Default::default();
    let sink = Arc::clone(&transcript);
    let on_transcript = move |text: &str, source| {
        sink.lock().unwrap().push((text.to_owned(), source));
    };
    (transcript, on_transcript)
}

fn tool_turns(messages: &[ModelMessage]) -> Vec<(String, Value)> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            ModelMessage::Tool(result) => Some((
                result.id.clone(),
                serde_json::from_str(&result.content).unwrap(),
            )),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_simple_message() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::text("Hi, what can I do?"));

    let mut agent = AgentBuilder::with_model_provider(model_provider).build();
    let outcome = agent.run("Hello").await.unwrap();

    assert_eq!(outcome.answer, "Hi, what can I do?");
    assert_eq!(outcome.stage, LoopStage::Done);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(agent.transcript().len(), 2);
    assert_eq!(agent.transcript()[0], ModelMessage::user("Hello"));
}

#[tokio::test]
async fn test_tool_round() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(
        PresetResponse::text("Let me add.").with_tool_call(
            0,
            "call_1",
            "calc__add",
            r#"{"a":1,"b":2}"#,
        ),
    );
    model_provider.add_response(PresetResponse::text("The sum is 3."));

    let (transcript, on_transcript) = recorder();
    let mut agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_system_prompt("You are a calculator.")
        .with_registry(calc_registry().await)
        .on_transcript(on_transcript)
        .build();
    let answer = agent.send_message("What is 1 + 2?").await.unwrap();
    assert_eq!(answer, "The sum is 3.");

    let messages = agent.transcript();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0], ModelMessage::system("You are a calculator."));
    assert_eq!(messages[1], ModelMessage::user("What is 1 + 2?"));
    let ModelMessage::Assistant(assistant) = &messages[2] else {
        panic!("expected an assistant turn, got {:?}", messages[2]);
    };
    assert_eq!(assistant.content_or_empty(), "Let me add.");
    assert_eq!(assistant.tool_calls.len(), 1);
    assert_eq!(assistant.tool_calls[0].arguments, r#"{"a":1,"b":2}"#);
    assert_eq!(messages[3], ModelMessage::tool("call_1", "3"));

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "calc__add");
    assert_eq!(requests[1].messages, messages[..4]);

    let transcript = transcript.lock().unwrap();
    let sources: Vec<_> = transcript.iter().map(|(_, s)| *s).collect();
    assert_eq!(sources.first(), Some(&TranscriptSource::User));
    let tool_pieces: Vec<_> = transcript
        .iter()
        .filter(|(_, s)| *s == TranscriptSource::Tool)
        .map(|(text, _)| text.as_str())
        .collect();
    assert_eq!(tool_pieces, [r#"calc__add({"a":1,"b":2})"#, "3"]);
    let streamed: String = transcript
        .iter()
        .filter(|(_, s)| *s == TranscriptSource::Assistant)
        .map(|(text, _)| text.as_str())
        .collect();
    assert_eq!(streamed, "Let me add.The sum is 3.");
}

#[tokio::test]
async fn test_every_call_gets_a_tool_turn() {
    let mut first = PresetResponse::default()
        .with_tool_call(0, "call_1", "nope__add", r#"{"a":1,"b":2}"#)
        .with_tool_call(1, "call_2", "add", r#"{"a":1,"b":2}"#)
        .with_tool_call(2, "call_3", "calc__add", r#"{"a":"#)
        .with_tool_call(3, "call_4", "calc__add", r#"{"a":1}"#);
    first.fragments.push(PresetFragment::Raw(StreamFragment::tool_call(
        ToolCallDelta::at(4)
            .with_id("call_5")
            .with_kind("retrieval")
            .with_name("search"),
    )));
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(first);
    model_provider.add_response(PresetResponse::text("Sorry."));

    let mut agent = AgentBuilder::with_model_provider(model_provider)
        .with_registry(calc_registry().await)
        .build();
    let outcome = agent.run("add them").await.unwrap();
    assert_eq!(outcome.answer, "Sorry.");
    assert_eq!(outcome.iterations, 2);

    let turns = tool_turns(agent.transcript());
    let ids: Vec<_> = turns.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["call_1", "call_2", "call_3", "call_4", "call_5"]);
    for (id, payload) in &turns {
        assert!(payload["error"].is_string(), "{id}: {payload}");
    }
    assert_eq!(
        turns[4].1,
        json!({ "error": "unsupported tool call type: retrieval" })
    );
}

#[tokio::test]
async fn test_iteration_budget() {
    let mut model_provider = TestModelProvider::default();
    for idx in 0..3 {
        model_provider.add_response(PresetResponse::default().with_tool_call(
            0,
            &format!("call_{idx}"),
            "calc__add",
            r#"{"a":1,"b":1}"#,
        ));
    }

    let mut agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_registry(calc_registry().await)
        .with_max_iterations(3)
        .build();
    let outcome = agent.run("loop forever").await.unwrap();

    assert_eq!(outcome.stage, LoopStage::Exhausted);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.answer, "");
    assert_eq!(model_provider.requests().len(), 3);
    assert_eq!(tool_turns(agent.transcript()).len(), 3);
}

#[tokio::test]
async fn test_exhausted_answer_keeps_last_text() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(
        PresetResponse::text("Working on it.").with_tool_call(
            0,
            "call_1",
            "calc__add",
            r#"{"a":1,"b":1}"#,
        ),
    );
    model_provider.add_response(PresetResponse::default().with_tool_call(
        0,
        "call_2",
        "calc__add",
        r#"{"a":2,"b":2}"#,
    ));

    let mut agent = AgentBuilder::with_model_provider(model_provider)
        .with_registry(calc_registry().await)
        .with_max_iterations(2)
        .build();
    let outcome = agent.run("keep going").await.unwrap();
    assert_eq!(outcome.stage, LoopStage::Exhausted);
    assert_eq!(outcome.answer, "Working on it.");
}

#[tokio::test]
async fn test_zero_budget_still_calls_once() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::text("ok"));

    let mut agent = AgentBuilder::with_model_provider(model_provider)
        .with_max_iterations(0)
        .build();
    let outcome = agent.run("hi").await.unwrap();
    assert_eq!(outcome.stage, LoopStage::Done);
    assert_eq!(outcome.answer, "ok");
}

#[tokio::test]
async fn test_model_failures() {
    // Nothing scripted, the provider refuses the call.
    let model_provider = TestModelProvider::default();
    let mut agent = AgentBuilder::with_model_provider(model_provider).build();
    match agent.run("hi").await {
        Err(Error::Transport(err)) => {
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded)
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(
        PresetResponse::text("partial").with_failure(PresetFailure::Stream),
    );
    let mut agent = AgentBuilder::with_model_provider(model_provider).build();
    match agent.run("hi").await {
        Err(Error::Transport(err)) => {
            assert_eq!(err.kind(), ErrorKind::Network)
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::default());
    let mut agent = AgentBuilder::with_model_provider(model_provider).build();
    assert!(matches!(agent.run("hi").await, Err(Error::EmptyResponse)));
}

#[tokio::test]
async fn test_reset_transcript() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::text("hello"));

    let counts = Arc::new(Counts::default());
    let provider = CountingProvider(Arc::clone(&counts));
    let registry = Registry::connect(vec![Box::new(provider)], None).await;
    let mut agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_system_prompt("Be brief.")
        .with_registry(registry)
        .build();
    assert_eq!(agent.send_message("hi").await.unwrap(), "hello");
    assert_eq!(agent.transcript().len(), 3);

    agent.reset_transcript();
    assert_eq!(agent.transcript(), [ModelMessage::system("Be brief.")]);
    assert_eq!(agent.tool_definitions().len(), 1);

    // The conversation starts over from the first step.
    assert_eq!(agent.send_message("hi again").await.unwrap(), "hello");
    assert_eq!(agent.transcript().len(), 3);
    let requests = model_provider.requests();
    assert_eq!(requests[1].tools, requests[0].tools);

    // Providers were neither reconnected nor listed again.
    assert_eq!(counts.connects.load(Ordering::SeqCst), 1);
    assert_eq!(counts.lists.load(Ordering::SeqCst), 1);
    assert_eq!(counts.disconnects.load(Ordering::SeqCst), 0);
}

struct FixedRetriever;

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve_context(
        &self,
        _query: &str,
        _top_k: usize,
    ) -> Result<String, BoxError> {
        Ok("Doc A".to_owned())
    }
}

#[tokio::test]
async fn test_augmented_input() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::text("X is Doc A."));

    let (transcript, on_transcript) = recorder();
    let mut agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_augmenter(
            Augmenter::new().with_retriever(Arc::new(FixedRetriever)),
        )
        .on_transcript(on_transcript)
        .build();
    agent.send_message("what is X").await.unwrap();

    let expected =
        "Reference material:\n\nDoc A\n\n---\n\nUser question: what is X";
    assert_eq!(agent.transcript()[0], ModelMessage::user(expected));
    assert_eq!(
        model_provider.requests()[0].messages,
        [ModelMessage::user(expected)]
    );
    assert_eq!(
        transcript.lock().unwrap()[0],
        ("what is X".to_owned(), TranscriptSource::User)
    );

    agent.set_retrieval_enabled(false);
    agent.reset_transcript();
    agent.send_message("what is X").await.unwrap();
    assert_eq!(agent.transcript()[0], ModelMessage::user("what is X"));
}

#[tokio::test]
async fn test_empty_input() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::text("Anything else?"));

    let (transcript, on_transcript) = recorder();
    let mut agent = AgentBuilder::with_model_provider(model_provider.clone())
        .on_transcript(on_transcript)
        .build();

    for input in ["", "  \n"] {
        let outcome = agent.run(input).await.unwrap();
        assert_eq!(outcome.answer, "");
        assert_eq!(outcome.stage, LoopStage::Done);
        assert_eq!(outcome.iterations, 0);
    }
    assert!(model_provider.requests().is_empty());
    assert!(agent.transcript().is_empty());
    assert!(transcript.lock().unwrap().is_empty());

    // The unused step is still served to the next real input.
    assert_eq!(agent.send_message("hi").await.unwrap(), "Anything else?");
}

struct PoemSkills;

#[async_trait]
impl SkillSource for PoemSkills {
    fn summary(&self) -> String {
        "Available skills: poem".to_owned()
    }

    fn tool_definition(&self) -> Option<ModelTool> {
        Some(ModelTool {
            name: READ_SKILL_TOOL.to_owned(),
            description: "Reads a skill.".to_owned(),
            parameters: json!({ "type": "object" }),
        })
    }

    async fn read(&self, name: &str) -> Result<String, ToolError> {
        match name {
            "poem" => Ok("Use rhymes.".to_owned()),
            _ => Err(ToolError::skill_not_found().with_reason(name)),
        }
    }
}

#[tokio::test]
async fn test_skills() {
    let mut model_provider = TestModelProvider::default();
    let poem = r#"{"skillName":"poem"}"#;
    let missing = r#"{"skillName":"x"}"#;
    model_provider.add_response(
        PresetResponse::default()
            .with_tool_call(0, "call_1", READ_SKILL_TOOL, poem)
            .with_tool_call(1, "call_2", READ_SKILL_TOOL, missing),
    );
    model_provider.add_response(PresetResponse::text("Roses are red."));

    let registry = Registry::connect(vec![], Some(Arc::new(PoemSkills))).await;
    let mut agent = AgentBuilder::with_model_provider(model_provider)
        .with_system_prompt("Be creative.")
        .with_registry(registry)
        .build();
    assert_eq!(
        agent.transcript(),
        [ModelMessage::system("Be creative.\n\nAvailable skills: poem")]
    );
    assert_eq!(agent.tool_definitions()[0].name, READ_SKILL_TOOL);

    agent.send_message("write a poem").await.unwrap();
    let turns = tool_turns(agent.transcript());
    assert_eq!(
        turns[0].1,
        json!({ "skillName": "poem", "content": "Use rhymes." })
    );
    assert!(turns[1].1["error"].is_string());
}

#[derive(Default)]
struct Counts {
    connects: AtomicUsize,
    lists: AtomicUsize,
    disconnects: AtomicUsize,
}

struct CountingProvider(Arc<Counts>);

#[async_trait]
impl ToolProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    async fn connect(&mut self) -> Result<(), ToolError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ModelTool>, ToolError> {
        self.0.lists.fetch_add(1, Ordering::SeqCst);
        Ok(vec![ModelTool {
            name: "tick".to_owned(),
            description: "Counts.".to_owned(),
            parameters: json!({ "type": "object" }),
        }])
    }

    async fn invoke(&self, _name: &str, _arguments: Value) -> ToolResult {
        Ok(Value::Null)
    }

    async fn disconnect(&mut self) -> Result<(), ToolError> {
        self.0.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_end_session() {
    let counts = Arc::new(Counts::default());
    let provider = CountingProvider(Arc::clone(&counts));
    let registry = Registry::connect(vec![Box::new(provider)], None).await;

    let mut agent = AgentBuilder::with_model_provider(
        TestModelProvider::default(),
    )
    .with_registry(registry)
    .build();
    agent.end_session().await;
    agent.end_session().await;
    assert_eq!(counts.disconnects.load(Ordering::SeqCst), 1);
}
