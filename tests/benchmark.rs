use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use localchat_rs::bench::{BenchmarkMode, LatencyProfiler, RunOutcome, Ttft};
use localchat_rs::config::{BenchmarkCase, ServerConfig};
use localchat_rs::transport::HttpTransport;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

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

fn profiler_for(addr: SocketAddr) -> LatencyProfiler {
    let config = ServerConfig {
        base_url: format!("http://{addr}/v1"),
        api_key: Some("not-needed".to_string()),
        model: Some("gpt-oss-20b".to_string()),
        ..ServerConfig::default()
    };
    LatencyProfiler::new(HttpTransport::new(&config).expect("transport"), "gpt-oss-20b", 1.0)
}

fn short_case() -> BenchmarkCase {
    BenchmarkCase::new("Short prompt", "What is 2+2?", 50)
}

fn sse_response(body: &'static str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .body(Body::from(body))
        .expect("stream response")
}

#[tokio::test]
async fn test_non_streaming_uses_server_token_counts() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |Json(body): Json<Value>| {
            let hits = Arc::clone(&hits_clone);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                assert_eq!(body["max_tokens"], 50);
                assert_eq!(body["messages"][0]["role"], "user");
                Json(json!({
                    "id": "chatcmpl-bench",
                    "object": "chat.completion",
                    "model": "gpt-oss-20b",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": null, "reasoning_content": "2 + 2 = 4"},
                        "finish_reason": "length"
                    }],
                    "usage": {"prompt_tokens": 14, "completion_tokens": 50, "total_tokens": 64}
                }))
            }
        }),
    );
    let (addr, server) = spawn_upstream(app).await;

    let mut progress = Vec::new();
    let report = profiler_for(addr)
        .run(&short_case(), BenchmarkMode::NonStreaming, 3, |index, outcome| {
            progress.push((index, outcome.sample().is_some()));
        })
        .await;

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(progress, vec![(0, true), (1, true), (2, true)]);
    assert_eq!(report.summary.completed, 3);
    assert_eq!(report.summary.failed, 0);
    assert!((report.summary.mean_generated_tokens - 50.0).abs() < f64::EPSILON);
    for outcome in &report.outcomes {
        let sample = outcome.sample().expect("completed");
        assert_eq!(sample.generated_tokens, 50);
        assert_eq!(sample.prompt_tokens, Some(14));
        assert_eq!(sample.ttft, None);
        assert!(sample.tokens_per_second > 0.0);
        assert_eq!(sample.response_chars, 9);
    }

    server.abort();
}

#[tokio::test]
async fn test_streaming_measures_ttft_from_reasoning() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["stream_options"]["include_usage"], true);
            sse_response(concat!(
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"Four\"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\".\"}}]}\n\n",
                "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":14,\"completion_tokens\":60,\"total_tokens\":74}}\n\n",
                "data: [DONE]\n\n"
            ))
        }),
    );
    let (addr, server) = spawn_upstream(app).await;

    let report = profiler_for(addr)
        .run(&short_case(), BenchmarkMode::Streaming, 2, |_, _| {})
        .await;

    assert_eq!(report.summary.ttft_valid, 2);
    for outcome in &report.outcomes {
        let sample = outcome.sample().expect("completed");
        let ttft = sample.ttft.and_then(Ttft::measured).expect("valid ttft");
        assert!(ttft <= sample.total_time);
        assert_eq!(sample.generated_tokens, 60);
        assert_eq!(sample.chunk_count, 4);
        assert_eq!(sample.content_events, 2);
        assert_eq!(sample.response_chars, 5);
    }

    server.abort();
}

#[tokio::test]
async fn test_stream_without_text_marks_ttft_invalid() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            sse_response(concat!(
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"\"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"\",\"reasoning_content\":\"\"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":null}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                "data: [DONE]\n\n"
            ))
        }),
    );
    let (addr, server) = spawn_upstream(app).await;

    let report = profiler_for(addr)
        .run(&short_case(), BenchmarkMode::Streaming, 1, |_, _| {})
        .await;

    let sample = report.outcomes[0].sample().expect("completed");
    assert_eq!(sample.ttft, Some(Ttft::NoFragment));
    assert_eq!(sample.chunk_count, 5);
    assert_eq!(sample.tokens_per_second, 0.0);
    assert_eq!(report.summary.ttft_valid, 0);
    assert_eq!(report.summary.mean_ttft, std::time::Duration::ZERO);

    server.abort();
}

#[tokio::test]
async fn test_unreachable_server_fails_each_repetition() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let report = profiler_for(addr)
        .run(&short_case(), BenchmarkMode::Streaming, 2, |_, _| {})
        .await;

    assert_eq!(report.summary.completed, 0);
    assert_eq!(report.summary.failed, 2);
    assert!(report
        .outcomes
        .iter()
        .all(|outcome| matches!(outcome, RunOutcome::Failed(err) if err.is_connection_failure())));

    let json = serde_json::to_value(&report).expect("report json");
    assert_eq!(json["mode"], "streaming");
    assert_eq!(json["outcomes"][0]["status"], "failed");
}
