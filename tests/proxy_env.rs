//! The chat client must talk to the endpoint directly even when the
//! environment points every scheme at a proxy.
//!
//! Lives in its own test binary: it mutates process-wide environment
//! variables, which would leak into tests running on sibling threads.

use axum::routing::post;
use axum::{Json, Router};
use edgequake_patent2docx::{ChatClient, ChatMessage, ChatReply};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Discard port; nothing answers there.
const DEAD_PROXY: &str = "http://127.0.0.1:9";

const PROXY_VARS: [&str; 6] = [
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "all_proxy",
];

async fn completions(Json(_body): Json<Value>) -> Json<Value> {
    Json(json!({
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": "direct"}}
        ]
    }))
}

#[tokio::test]
async fn ambient_proxy_variables_are_ignored() {
    for var in PROXY_VARS {
        std::env::set_var(var, DEAD_PROXY);
    }
    std::env::remove_var("NO_PROXY");
    std::env::remove_var("no_proxy");

    let app = Router::new().route("/v1/chat/completions", post(completions));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = ChatClient::builder("sk-test")
        .base_url(format!("http://{addr}/v1"))
        .default_model("mock-model")
        .build()
        .unwrap();

    let reply = client
        .chat(&[ChatMessage::user("ping")], 0.2, 16, None)
        .await
        .unwrap();

    assert_eq!(reply, ChatReply::Text("direct".to_string()));
}
