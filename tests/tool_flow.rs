use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use localchat_rs::chat::{ChatSession, Conversation};
use localchat_rs::config::ServerConfig;
use localchat_rs::fc::{default_registry, FlowObserver, FlowStage, ToolCallingFlow, ToolOutcome, TOOL_SYSTEM_PROMPT};
use localchat_rs::protocol::canonical::{ChatMessage, ChatRole};
use localchat_rs::protocol::openai_chat::encoder::SamplingParams;
use localchat_rs::protocol::openai_chat::stream::Fragment;
use localchat_rs::transport::HttpTransport;
use serde_json::Value;
use tokio::task::JoinHandle;

const TOOL_CALL_STREAM: &str = concat!(
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"Sure, {\\\"expression\\\": \"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"\\\"2+2\\\"}\"}}]}\n\n",
    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":90,\"completion_tokens\":9,\"total_tokens\":99}}\n\n",
    "data: [DONE]\n\n"
);

const FINAL_ANSWER_STREAM: &str = concat!(
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"The answer \"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"is 4.\"}}]}\n\n",
    "data: [DONE]\n\n"
);

const PLAIN_ANSWER_STREAM: &str = concat!(
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"No tool needed.\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello there!\"}}]}\n\n",
    "data: [DONE]\n\n"
);

async fn spawn_upstream(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, server)
}

fn session_for(addr: SocketAddr) -> ChatSession {
    let config = ServerConfig {
        base_url: format!("http://{addr}/v1"),
        api_key: Some("not-needed".to_string()),
        model: Some("gpt-oss-20b".to_string()),
        ..ServerConfig::default()
    };
    ChatSession::new(
        HttpTransport::new(&config).expect("transport"),
        "gpt-oss-20b",
        SamplingParams {
            temperature: 1.0,
            max_tokens: 512,
        },
    )
}

fn sse_response(body: &'static str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .body(Body::from(body))
        .expect("stream response")
}

/// Serves `responses` in order and records every request body.
fn scripted_upstream(
    responses: Vec<&'static str>,
) -> (Router, Arc<AtomicUsize>, Arc<Mutex<Vec<Value>>>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let hits_clone = Arc::clone(&hits);
    let bodies_clone = Arc::clone(&bodies);
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |Json(body): Json<Value>| {
            let hits = Arc::clone(&hits_clone);
            let bodies = Arc::clone(&bodies_clone);
            let responses = responses.clone();
            async move {
                let index = hits.fetch_add(1, Ordering::SeqCst);
                bodies.lock().unwrap().push(body);
                sse_response(responses[index.min(responses.len() - 1)])
            }
        }),
    );
    (app, hits, bodies)
}

#[derive(Default)]
struct Recorder {
    initial: String,
    follow_up: String,
    outcomes: Vec<String>,
}

impl FlowObserver for Recorder {
    fn on_fragment(&mut self, stage: FlowStage, fragment: &Fragment) {
        match stage {
            FlowStage::Initial => self.initial.push_str(&fragment.text),
            FlowStage::FollowUp => self.follow_up.push_str(&fragment.text),
        }
    }

    fn on_outcome(&mut self, outcome: &ToolOutcome) {
        self.outcomes
            .push(format!("{}={}", outcome.invocation.tool_name, outcome.result_text()));
    }
}

#[tokio::test]
async fn test_tool_call_in_reasoning_triggers_follow_up() {
    let (app, hits, bodies) = scripted_upstream(vec![TOOL_CALL_STREAM, FINAL_ANSWER_STREAM]);
    let (addr, server) = spawn_upstream(app).await;

    let session = session_for(addr);
    let registry = default_registry();
    let flow = ToolCallingFlow::new(&session, &registry, true);

    let mut conversation = Conversation::new(TOOL_SYSTEM_PROMPT);
    conversation.push(ChatMessage::user("What is 2+2?"));

    let mut recorder = Recorder::default();
    let turn = flow
        .run(conversation.messages(), &mut recorder)
        .await
        .expect("tool turn");

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.initial, r#"Sure, {"expression": "2+2"}"#);
    assert_eq!(recorder.outcomes, vec!["calculate=4"]);
    assert_eq!(recorder.follow_up, "The answer is 4.");
    assert_eq!(turn.final_text(), "The answer is 4.");

    let expected_results = "Tool results:\n- calculate: 4\n\nPlease provide the final answer based on these results.";
    assert_eq!(
        turn.messages,
        vec![
            ChatMessage::assistant(r#"Sure, {"expression": "2+2"}"#),
            ChatMessage::user(expected_results),
            ChatMessage::assistant("The answer is 4."),
        ]
    );

    let bodies = bodies.lock().unwrap();
    let first_tools = bodies[0]["tools"].as_array().expect("tools sent first");
    assert_eq!(first_tools.len(), 2);
    assert_eq!(first_tools[1]["function"]["name"], "calculate");
    assert!(bodies[1].get("tools").is_none(), "follow-up is sent without tools");
    let follow_up_messages = bodies[1]["messages"].as_array().expect("messages");
    assert_eq!(follow_up_messages.len(), 4);
    assert_eq!(follow_up_messages[3]["content"], expected_results);

    conversation.extend(turn.messages);
    assert_eq!(conversation.len(), 5);
    assert_eq!(conversation.messages()[4].role, ChatRole::Assistant);

    server.abort();
}

#[tokio::test]
async fn test_plain_answer_makes_no_follow_up() {
    let (app, hits, _bodies) = scripted_upstream(vec![PLAIN_ANSWER_STREAM]);
    let (addr, server) = spawn_upstream(app).await;

    let session = session_for(addr);
    let registry = default_registry();
    let flow = ToolCallingFlow::new(&session, &registry, false);

    let history = [ChatMessage::system(TOOL_SYSTEM_PROMPT), ChatMessage::user("Hi")];
    let turn = flow.run(&history, &mut ()).await.expect("turn");

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(turn.outcomes.is_empty());
    assert!(turn.follow_up.is_none());
    assert_eq!(turn.messages, vec![ChatMessage::assistant("Hello there!")]);
    assert_eq!(turn.final_text(), "Hello there!");

    server.abort();
}

#[tokio::test]
async fn test_follow_up_failure_is_reported() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let hits = Arc::clone(&hits_clone);
            async move {
                if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                    sse_response(TOOL_CALL_STREAM)
                } else {
                    Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .body(Body::from("engine crashed"))
                        .expect("error response")
                }
            }
        }),
    );
    let (addr, server) = spawn_upstream(app).await;

    let session = session_for(addr);
    let registry = default_registry();
    let flow = ToolCallingFlow::new(&session, &registry, true);
    let history = [ChatMessage::user("What is 2+2?")];
    let err = flow.run(&history, &mut ()).await.expect_err("follow-up fails");
    assert_eq!(err.to_string(), "Upstream error: status=500, message=engine crashed");

    server.abort();
}
