#![allow(dead_code)]

use book_tagger::{Book, EnrichmentClient, EnrichmentSettings};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockBuilder, MockServer};

pub const API_KEY: &str = "test-key";

pub fn settings(server: &MockServer, max_retries: u32) -> EnrichmentSettings {
    EnrichmentSettings {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        max_retries,
        retry_backoff: Duration::from_millis(1),
        ..EnrichmentSettings::default()
    }
}

pub fn client(server: &MockServer, max_retries: u32) -> EnrichmentClient {
    EnrichmentClient::new(API_KEY, settings(server, max_retries)).unwrap()
}

pub fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ]
    })
}

pub fn chat_completions() -> MockBuilder {
    Mock::given(method("POST")).and(path("/chat/completions"))
}

pub fn library() -> Vec<Book> {
    vec![
        Book::with_id(1, "Dune", "Frank Herbert"),
        Book::with_id(2, "Emma", "Jane Austen"),
        Book::with_id(3, "SPQR", "Mary Beard"),
    ]
}

/// The user message of every chat completion request the server saw.
pub async fn prompts(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            body["messages"][0]["content"].as_str().unwrap().to_string()
        })
        .collect()
}
