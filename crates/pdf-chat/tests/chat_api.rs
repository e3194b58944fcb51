//! End-to-end tests: router + chain + Ollama client against a mocked Ollama

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

use pdf_chat::{
    config::{ChatConfig, RetryPolicy},
    generation::{ChainSettings, ConversationChain},
    ingestion::{build_index, IngestPipeline},
    providers::ollama_providers,
    retrieval::{IndexEntry, VectorIndex},
    server::{state::AppState, ChatServer},
    types::Chunk,
};

/// Embeds each input as counts of the tokens A1, A2, A3
struct KeywordEmbeddings;

fn keyword_vector(text: &str) -> Vec<f32> {
    ["A1", "A2", "A3"]
        .iter()
        .map(|k| text.matches(k).count() as f32)
        .collect()
}

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| keyword_vector(t.as_str().unwrap()))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "llama3.2",
        "message": {"role": "assistant", "content": content},
        "done": true
    }))
}

fn test_config(ollama: &MockServer) -> ChatConfig {
    let mut config = ChatConfig::default();
    config.llm.base_url = ollama.uri();
    config.llm.timeout_secs = 5;
    config.llm.retry = RetryPolicy::none();
    config.chunking.chunk_size = 5;
    config.chunking.chunk_overlap = 2;
    config.server.static_dir = None;
    config
}

fn app_for(config: ChatConfig, index: VectorIndex) -> (Router, AppState) {
    let (embedder, llm) = ollama_providers(&config.llm).unwrap();
    let chain = ConversationChain::new(
        embedder,
        llm,
        Arc::new(index),
        &config.prompts,
        ChainSettings::from(&config.retrieval),
    )
    .unwrap();
    let state = AppState::new(config.clone(), chain);
    let router = ChatServer::new(config, state.clone()).build_router();
    (router, state)
}

fn router_for(config: ChatConfig, index: VectorIndex) -> Router {
    app_for(config, index).0
}

/// Startup path: document "A1 A2 A3" chunked (5, 2) and embedded through Ollama
async fn started_app_with_state(ollama: &MockServer) -> (Router, AppState) {
    let config = test_config(ollama);

    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    write!(file, "A1 A2 A3").unwrap();

    let pipeline = IngestPipeline::from_config(&config).unwrap();
    let (_, chunks) = pipeline.prepare(file.path()).unwrap();
    let (embedder, _) = ollama_providers(&config.llm).unwrap();
    let index = build_index(chunks, embedder.as_ref(), config.llm.embed_batch_size)
        .await
        .unwrap();
    assert_eq!(index.len(), 2);

    app_for(config, index)
}

async fn started_app(ollama: &MockServer) -> Router {
    started_app_with_state(ollama).await.0
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_chat(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_history() -> Request<Body> {
    Request::builder()
        .uri("/chat/history")
        .body(Body::empty())
        .unwrap()
}

async fn mount_embeddings(ollama: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbeddings)
        .mount(ollama)
        .await;
}

#[tokio::test]
async fn test_first_question_is_answered_from_context() {
    let ollama = MockServer::start().await;
    mount_embeddings(&ollama).await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains("based on the following context: A2 A3"))
        .respond_with(chat_reply("A3 comes after A2."))
        .expect(1)
        .mount(&ollama)
        .await;

    let app = started_app(&ollama).await;

    let (status, body) = send(&app, post_chat(json!({"message": "What is A3?"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "A3 comes after A2."}));

    let (status, body) = send(&app, get_history()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "default");
    assert_eq!(
        body["messages"],
        json!([
            {"role": "human", "content": "What is A3?"},
            {"role": "ai", "content": "A3 comes after A2."}
        ])
    );
}

#[tokio::test]
async fn test_follow_up_uses_rewritten_query() {
    let ollama = MockServer::start().await;
    mount_embeddings(&ollama).await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains("Given the above conversation"))
        .respond_with(chat_reply("A3 definition"))
        .expect(1)
        .mount(&ollama)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains("based on the following context"))
        .respond_with(chat_reply("It follows A2."))
        .expect(2)
        .mount(&ollama)
        .await;

    let app = started_app(&ollama).await;

    let (status, _) = send(&app, post_chat(json!({"message": "What is A3?"}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, post_chat(json!({"message": "Where is it?"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "It follows A2.");

    let (_, body) = send(&app, get_history()).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2]["content"], "Where is it?");
    assert_eq!(messages[3]["role"], "ai");
}

#[tokio::test]
async fn test_embedding_outage_returns_error_and_keeps_history() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ollama)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply("never used"))
        .expect(0)
        .mount(&ollama)
        .await;

    let chunk = |text: &str, index: u32| Chunk {
        text: text.to_string(),
        source_offset: index as usize * 3,
        page_number: 1,
        index,
    };
    let index = VectorIndex::build(vec![
        IndexEntry::new(keyword_vector("A1 A2"), chunk("A1 A2", 0)),
        IndexEntry::new(keyword_vector("A2 A3"), chunk("A2 A3", 1)),
    ])
    .unwrap();
    let (app, state) = app_for(test_config(&ollama), index);

    let (status, body) = send(&app, post_chat(json!({"message": "What is A3?"}))).await;
    assert!(!status.is_success());
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["type"], "orchestration_error");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("embedding_error"));
    assert!(!message.contains(&ollama.uri()));

    let (_, body) = send(&app, get_history()).await;
    assert!(body["messages"].as_array().unwrap().is_empty());

    for i in 0..20 {
        let (status, _) = send(
            &app,
            post_chat(json!({"message": "What is A3?", "session_id": format!("user-{}", i)})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
    assert!(state.sessions().is_empty(), "failed turns must not create sessions");
}

#[tokio::test]
async fn test_sessions_are_isolated_and_removable() {
    let ollama = MockServer::start().await;
    mount_embeddings(&ollama).await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply("answer"))
        .mount(&ollama)
        .await;

    let (app, state) = started_app_with_state(&ollama).await;

    let (status, _) = send(
        &app,
        post_chat(json!({"message": "What is A1?", "session_id": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, get_history()).await;
    assert!(body["messages"].as_array().unwrap().is_empty());

    let alice = || {
        Request::builder()
            .uri("/chat/history?session_id=alice")
            .body(Body::empty())
            .unwrap()
    };
    let (_, body) = send(&app, alice()).await;
    assert_eq!(body["session_id"], "alice");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);

    let clear = Request::builder()
        .method(Method::DELETE)
        .uri("/chat/history?session_id=alice")
        .body(Body::empty())
        .unwrap();
    assert_eq!(state.sessions().len(), 1);
    let (status, _) = send(&app, clear).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.sessions().is_empty());

    let (_, body) = send(&app, alice()).await;
    assert!(body["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_overlong_session_id_is_rejected() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&ollama)
        .await;
    let (app, state) = app_for(test_config(&ollama), VectorIndex::default());

    let (status, body) = send(
        &app,
        post_chat(json!({"message": "What is A3?", "session_id": "s".repeat(10_000)})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");
    assert!(state.sessions().is_empty());
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&ollama)
        .await;
    let app = router_for(test_config(&ollama), VectorIndex::default());

    let (status, body) = send(&app, post_chat(json!({"message": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"message\": "))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");

    let (status, body) = send(&app, post_chat(json!({"message": "x".repeat(4001)}))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["type"], "payload_too_large");

    let (_, body) = send(&app, get_history()).await;
    assert!(body["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_options_and_health() {
    let ollama = MockServer::start().await;
    let app = router_for(test_config(&ollama), VectorIndex::default());

    let bare = Request::builder()
        .method(Method::OPTIONS)
        .uri("/chat")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(bare).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/chat")
        .header(header::ORIGIN, "http://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(preflight).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );

    let health = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(health).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}
