//! Orchestration loop tests over a scripted transport: tool cycles, depth
//! limiting, degraded tool failures, kickoff synthesis, and terminal errors.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use colloquy::engine::sink::{EventSink, SinkEvent};
use colloquy::transport::{PendingRequest, StreamHandle, Transport};
use colloquy::{
    ChatEngine, ConversationContext, EngineConfig, EngineError, Message, ToolSpec, TurnOptions,
    Vendor,
};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeTransport {
    responses: Mutex<VecDeque<Result<Bytes, EngineError>>>,
    requests: Mutex<Vec<PendingRequest>>,
}

impl FakeTransport {
    fn scripted(responses: Vec<Result<Bytes, EngineError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_bodies(&self) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(
        &self,
        request: PendingRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.requests.lock().push(request);
        match self.responses.lock().pop_front() {
            Some(Ok(body)) => Ok(StreamHandle::from_bytes(200, body)),
            Some(Err(err)) => Err(err),
            None => Err(EngineError::Network("no scripted response".into())),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl EventSink for RecordingSink {
    fn emit(&self, event: SinkEvent) {
        self.events.lock().push(event);
    }
}

impl RecordingSink {
    fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn sse(frames: &[Value]) -> Bytes {
    let mut body = String::new();
    for frame in frames {
        body.push_str("data: ");
        body.push_str(&frame.to_string());
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    Bytes::from(body)
}

fn text_response(text: &str) -> Bytes {
    sse(&[
        json!({"choices":[{"delta":{"content":text}}]}),
        json!({"choices":[{"delta":{},"finish_reason":"stop"}]}),
    ])
}

fn tool_call_response(id: &str, name: &str, arguments: &str) -> Bytes {
    sse(&[
        json!({"choices":[{"delta":{"tool_calls":[
            {"index":0,"id":id,"function":{"name":name,"arguments":""}}]}}]}),
        json!({"choices":[{"delta":{"tool_calls":[
            {"index":0,"function":{"arguments":arguments}}]}}]}),
        json!({"choices":[{"delta":{},"finish_reason":"tool_calls"}]}),
    ])
}

fn test_config(vendor: Vendor) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.vendors.insert(
        vendor.as_str().to_string(),
        colloquy::config::VendorConfig {
            base_url: None,
            api_key: Some("test-key".into()),
        },
    );
    config
}

fn weather_spec() -> ToolSpec {
    ToolSpec {
        name: "get_weather".into(),
        description: "current weather for a city".into(),
        parameters: json!({
            "type": "object",
            "properties": { "city": { "type": "string" } },
            "required": ["city"]
        }),
    }
}

fn engine_with(
    vendor: Vendor,
    transport: Arc<FakeTransport>,
) -> (ChatEngine, ConversationContext) {
    let engine = ChatEngine::with_transport(test_config(vendor), transport);
    let context = ConversationContext::new("You are concise.", 10);
    (engine, context)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plain_text_turn_assembles_and_appends() {
    let transport = FakeTransport::scripted(vec![Ok(text_response("Hello there"))]);
    let (engine, mut context) = engine_with(Vendor::OpenAi, Arc::clone(&transport));
    let sink = RecordingSink::default();

    let result = engine
        .run_turn(
            &mut context,
            Some(Message::user("hi")),
            &TurnOptions::new(Vendor::OpenAi, "gpt-4.1"),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.text, "Hello there");
    assert_eq!(result.finish_reason, Some(colloquy::FinishReason::Stop));

    // Context gained the user and assistant messages.
    let texts: Vec<&str> = context.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["You are concise.", "hi", "Hello there"]);

    // Sink order: echo, wait, first fragment, done.
    let events = sink.events();
    assert!(matches!(&events[0], SinkEvent::UserEcho { text } if text == "hi"));
    assert!(matches!(&events[1], SinkEvent::Wait { status } if status == "THINKING"));
    assert!(matches!(
        &events[2],
        SinkEvent::Fragment { first: true, .. }
    ));
    assert!(matches!(events.last(), Some(SinkEvent::Done { .. })));
}

#[tokio::test]
async fn tool_cycle_executes_and_resubmits() {
    let transport = FakeTransport::scripted(vec![
        Ok(tool_call_response("call_1", "get_weather", "{\"city\":\"Paris\"}")),
        Ok(text_response("It is sunny in Paris.")),
    ]);
    let (mut engine, mut context) = engine_with(Vendor::OpenAi, Arc::clone(&transport));
    engine.tools_mut().register(
        weather_spec(),
        Arc::new(|args: &Map<String, Value>| {
            assert_eq!(args["city"], "Paris");
            Ok("sunny, 24C".to_string())
        }),
    );
    let sink = RecordingSink::default();

    let result = engine
        .run_turn(
            &mut context,
            Some(Message::user("weather in Paris?")),
            &TurnOptions::new(Vendor::OpenAi, "gpt-4.1"),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.text, "It is sunny in Paris.");

    // Second request carried the assistant tool call and the tool result.
    let bodies = transport.request_bodies();
    assert_eq!(bodies.len(), 2);
    let messages = bodies[1]["messages"].as_array().unwrap();
    let assistant = messages
        .iter()
        .find(|m| m["role"] == "assistant" && m["tool_calls"].is_array())
        .unwrap();
    assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
    let tool = messages.iter().find(|m| m["role"] == "tool").unwrap();
    assert_eq!(tool["tool_call_id"], "call_1");
    assert_eq!(tool["content"], "sunny, 24C");

    // The wait notice switched to function calling between cycles.
    assert!(sink
        .events()
        .iter()
        .any(|e| matches!(e, SinkEvent::Wait { status } if status == "CALLING FUNCTIONS")));
}

#[tokio::test]
async fn failed_tool_degrades_to_error_text() {
    let transport = FakeTransport::scripted(vec![
        Ok(tool_call_response("call_1", "get_weather", "{\"city\":\"Atlantis\"}")),
        Ok(text_response("I could not find that city.")),
    ]);
    let (mut engine, mut context) = engine_with(Vendor::OpenAi, Arc::clone(&transport));
    engine.tools_mut().register(
        weather_spec(),
        Arc::new(|_: &Map<String, Value>| {
            Err(EngineError::ToolExecution("no such station".into()))
        }),
    );

    let result = engine
        .run_turn(
            &mut context,
            Some(Message::user("weather in Atlantis?")),
            &TurnOptions::new(Vendor::OpenAi, "gpt-4.1"),
            &RecordingSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // The turn still completed; the failure went back as tool-result text.
    assert_eq!(result.text, "I could not find that city.");
    let bodies = transport.request_bodies();
    let tool = bodies[1]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["role"] == "tool")
        .unwrap()
        .clone();
    let content = tool["content"].as_str().unwrap();
    assert!(content.starts_with("ERROR:"), "got: {content}");
    assert!(content.contains("no such station"));
}

#[tokio::test]
async fn depth_limit_stops_without_another_request() {
    let responses = (0..3)
        .map(|i| {
            Ok(tool_call_response(
                &format!("call_{i}"),
                "get_weather",
                "{\"city\":\"Paris\"}",
            ))
        })
        .collect();
    let transport = FakeTransport::scripted(responses);
    let mut config = test_config(Vendor::OpenAi);
    config.max_call_depth = 2;
    let mut engine =
        ChatEngine::with_transport(config, Arc::clone(&transport) as Arc<dyn Transport>);
    engine.tools_mut().register(
        weather_spec(),
        Arc::new(|_: &Map<String, Value>| Ok("sunny".to_string())),
    );
    let mut context = ConversationContext::new("sys", 10);
    let sink = RecordingSink::default();

    let result = engine
        .run_turn(
            &mut context,
            Some(Message::user("loop forever")),
            &TurnOptions::new(Vendor::OpenAi, "gpt-4.1"),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // max_call_depth tool cycles ran, then the limit tripped: one request
    // per cycle plus the initial one, and no fourth request.
    assert_eq!(transport.request_bodies().len(), 3);
    assert!(sink.events().iter().any(|e| matches!(
        e,
        SinkEvent::SystemInfo { text } if text.contains("call depth")
    )));
    assert!(matches!(
        sink.events().last(),
        Some(SinkEvent::Done { .. })
    ));
    assert_eq!(result.finish_reason, Some(colloquy::FinishReason::ToolCalls));
}

#[tokio::test]
async fn empty_window_gets_kickoff_message() {
    let transport = FakeTransport::scripted(vec![Ok(text_response("Welcome!"))]);
    let (engine, mut context) = engine_with(Vendor::OpenAi, Arc::clone(&transport));

    engine
        .run_turn(
            &mut context,
            None,
            &TurnOptions::new(Vendor::OpenAi, "gpt-4.1"),
            &RecordingSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let bodies = transport.request_bodies();
    let messages = bodies[0]["messages"].as_array().unwrap();
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "Let's start");
}

#[tokio::test]
async fn missing_api_key_fails_before_any_request() {
    let transport = FakeTransport::scripted(vec![Ok(text_response("never sent"))]);
    std::env::remove_var("XAI_API_KEY");
    let engine = ChatEngine::with_transport(
        EngineConfig::default(),
        Arc::clone(&transport) as Arc<dyn Transport>,
    );
    let mut context = ConversationContext::new("sys", 10);
    let sink = RecordingSink::default();

    let err = engine
        .run_turn(
            &mut context,
            Some(Message::user("hi")),
            &TurnOptions::new(Vendor::Grok, "grok-3"),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Config(_)));
    assert!(transport.request_bodies().is_empty());
    // The conversation was not mutated by the failed turn.
    assert_eq!(context.messages().len(), 1);
    assert!(matches!(
        sink.events().last(),
        Some(SinkEvent::Error { message }) if message.starts_with("CONFIGURATION ERROR:")
    ));
}

#[tokio::test]
async fn transport_error_surfaces_with_sink_notice() {
    let transport = FakeTransport::scripted(vec![Err(EngineError::Protocol {
        status: 429,
        message: "rate limited".into(),
    })]);
    let (engine, mut context) = engine_with(Vendor::OpenAi, Arc::clone(&transport));
    let sink = RecordingSink::default();

    let err = engine
        .run_turn(
            &mut context,
            Some(Message::user("hi")),
            &TurnOptions::new(Vendor::OpenAi, "gpt-4.1"),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Protocol { status: 429, .. }));
    assert!(matches!(
        sink.events().last(),
        Some(SinkEvent::Error { message }) if message == "API ERROR: rate limited"
    ));
}

#[tokio::test]
async fn cancelled_token_aborts_the_turn() {
    let transport = FakeTransport::scripted(vec![Ok(text_response("never"))]);
    let (engine, mut context) = engine_with(Vendor::OpenAi, Arc::clone(&transport));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .run_turn(
            &mut context,
            Some(Message::user("hi")),
            &TurnOptions::new(Vendor::OpenAi, "gpt-4.1"),
            &RecordingSink::default(),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}

#[tokio::test]
async fn perplexity_citations_renumbered_to_first_use() {
    let body = sse(&[
        json!({"citations":["https://b.example","https://a.example"],
            "choices":[{"delta":{"content":"See [2] then [1]."}}]}),
        json!({"citations":["https://b.example","https://a.example"],
            "choices":[{"delta":{},"finish_reason":"stop"}]}),
    ]);
    let transport = FakeTransport::scripted(vec![Ok(body)]);
    let (engine, mut context) = engine_with(Vendor::Perplexity, Arc::clone(&transport));

    let result = engine
        .run_turn(
            &mut context,
            Some(Message::user("sources?")),
            &TurnOptions::new(Vendor::Perplexity, "sonar"),
            &RecordingSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.text, "See [1] then [2].");
    assert_eq!(
        result.citations,
        vec!["https://a.example", "https://b.example"]
    );
}

#[tokio::test]
async fn anthropic_turn_round_trips_tool_results() {
    let first = Bytes::from(concat!(
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":",
        "{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"get_weather\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":",
        "{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\":\\\"Kyoto\\\"}\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"}}\n\n",
    ));
    let second = Bytes::from(concat!(
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":",
        "{\"type\":\"text_delta\",\"text\":\"Rainy in Kyoto.\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n",
    ));
    let transport = FakeTransport::scripted(vec![Ok(first), Ok(second)]);
    let (mut engine, mut context) = engine_with(Vendor::Anthropic, Arc::clone(&transport));
    engine.tools_mut().register(
        weather_spec(),
        Arc::new(|args: &Map<String, Value>| {
            assert_eq!(args["city"], "Kyoto");
            Ok("rainy".to_string())
        }),
    );

    let result = engine
        .run_turn(
            &mut context,
            Some(Message::user("weather in Kyoto?")),
            &TurnOptions::new(Vendor::Anthropic, "claude-sonnet-4"),
            &RecordingSink::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.text, "Rainy in Kyoto.");

    let bodies = transport.request_bodies();
    let messages = bodies[1]["messages"].as_array().unwrap();
    let tool_result = messages
        .iter()
        .flat_map(|m| m["content"].as_array().unwrap())
        .find(|b| b["type"] == "tool_result")
        .unwrap();
    assert_eq!(tool_result["tool_use_id"], "toolu_1");
    assert_eq!(tool_result["content"], "rainy");
}
