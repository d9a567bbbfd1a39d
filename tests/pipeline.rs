//! Integration tests for the chat client and the full analysis pipeline.
//!
//! The chat endpoint is an in-process axum server on `127.0.0.1:0` that
//! replays a scripted list of responses, so rate limiting, error bodies and
//! odd payloads can be exercised without network access or an API key.
//! PDFs are built in memory with lopdf.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use edgequake_patent2docx::config::AnalysisConfig;
use edgequake_patent2docx::pipeline::chat::ChatRequest;
use edgequake_patent2docx::pipeline::extract::page_marker;
use edgequake_patent2docx::pipeline::report::{BRIEF_PLACEHOLDER, TRANSLATION_PLACEHOLDER};
use edgequake_patent2docx::prompts::SYSTEM_PROMPT;
use edgequake_patent2docx::{
    write_report, AnalysisProgressCallback, Analyzer, ChatClient, ChatMessage, ChatReply,
    Patent2DocxError, Sleeper, Stage,
};
use futures::future::BoxFuture;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

// ── Mock chat server ─────────────────────────────────────────────────────────

#[derive(Clone)]
enum Scripted {
    RateLimited(Option<&'static str>),
    Status(u16, &'static str),
    Reply(Value),
}

#[derive(Clone, Default)]
struct MockState {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

impl MockState {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn last_body(&self) -> Value {
        self.bodies.lock().unwrap().last().cloned().expect("no request recorded")
    }
}

async fn completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.bodies.lock().unwrap().push(body);
    if let Some(auth) = headers.get(header::AUTHORIZATION) {
        state
            .auth
            .lock()
            .unwrap()
            .push(auth.to_str().unwrap_or_default().to_string());
    }

    let next = state.script.lock().unwrap().pop_front();
    match next {
        Some(Scripted::RateLimited(None)) => {
            (StatusCode::TOO_MANY_REQUESTS, "rate limit reached").into_response()
        }
        Some(Scripted::RateLimited(Some(retry_after))) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after)],
            "rate limit reached",
        )
            .into_response(),
        Some(Scripted::Status(code, body)) => {
            (StatusCode::from_u16(code).unwrap(), body).into_response()
        }
        Some(Scripted::Reply(payload)) => Json(payload).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "script exhausted").into_response(),
    }
}

async fn spawn_mock(script: Vec<Scripted>) -> (String, MockState) {
    let state = MockState {
        script: Arc::new(Mutex::new(script.into())),
        ..MockState::default()
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/v1"), state)
}

fn completion(content: &str) -> Value {
    json!({
        "id": "cmpl-test",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ]
    })
}

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Records requested delays and returns immediately.
#[derive(Default)]
struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.sleeps.lock().unwrap().push(duration);
        Box::pin(std::future::ready(()))
    }
}

/// Cancels the given token the moment a wait starts, then never wakes.
struct CancellingSleeper {
    token: CancellationToken,
}

impl Sleeper for CancellingSleeper {
    fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        self.token.cancel();
        Box::pin(futures::future::pending())
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl AnalysisProgressCallback for EventLog {
    fn on_stage_start(&self, stage: Stage) {
        self.events.lock().unwrap().push(format!("start {}", stage.ordinal()));
    }

    fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
        self.events.lock().unwrap().push(format!("done {}", stage.ordinal()));
    }

    fn on_rate_limited(&self, attempt: u32, max_attempts: u32, _delay: Duration) {
        self.events
            .lock()
            .unwrap()
            .push(format!("429 {attempt}/{max_attempts}"));
    }
}

fn client(base_url: &str, sleeper: Arc<dyn Sleeper>) -> ChatClient {
    ChatClient::builder("sk-test")
        .base_url(base_url)
        .default_model("mock-model")
        .sleeper(sleeper)
        .build()
        .unwrap()
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user("analyse claim 1"),
    ]
}

// ── PDF fixtures ─────────────────────────────────────────────────────────────

/// One page per entry; `None` draws a rectangle and no text.
fn build_pdf(pages: &[Option<&str>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for page in pages {
        let operations = match page {
            Some(text) => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
            None => vec![
                Operation::new("re", vec![50.into(), 50.into(), 100.into(), 100.into()]),
                Operation::new("f", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            Content { operations }.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn prompt_file(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("prompt.txt");
    std::fs::write(&path, "第一篇：简洁版本\n第二篇：完整版本\n原文翻译\n").unwrap();
    path
}

fn analyzer(
    base_url: &str,
    prompt_path: PathBuf,
    sleeper: Arc<dyn Sleeper>,
    progress: Option<Arc<EventLog>>,
) -> Analyzer {
    let mut builder = AnalysisConfig::builder()
        .api_key("sk-test")
        .base_url(base_url)
        .model("mock-model")
        .prompt_path(prompt_path);
    if let Some(cb) = progress.clone() {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().unwrap();

    let mut client = ChatClient::builder("sk-test")
        .base_url(base_url)
        .default_model("mock-model")
        .sleeper(sleeper);
    if let Some(cb) = progress {
        client = client.progress_callback(cb);
    }
    Analyzer::with_client(config, client.build().unwrap())
}

fn read_document_xml(docx: &[u8]) -> String {
    let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
    let mut part = archive.by_name("word/document.xml").unwrap();
    let mut xml = String::new();
    part.read_to_string(&mut xml).unwrap();
    xml
}

const THREE_PART_REPLY: &str = "第一篇：简洁版本\n一种散热装置。\n\n\
第二篇：完整版本\n1. 基本信息\n2. 技术方案\n\n\
原文翻译\nA heat sink device.";

// ── Chat client ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_posts_bearer_token_and_request_body() {
    let (url, mock) = spawn_mock(vec![Scripted::Reply(completion("hello"))]).await;
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&url, sleeper.clone());

    let reply = client.chat(&messages(), 0.2, 2000, None).await.unwrap();

    assert_eq!(reply, ChatReply::Text("hello".into()));
    assert_eq!(mock.hits(), 1);
    assert_eq!(mock.auth.lock().unwrap().as_slice(), ["Bearer sk-test"]);

    let body = mock.last_body();
    assert_eq!(body["model"], "mock-model");
    assert_eq!(body["max_tokens"], 2000);
    assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
    assert_eq!(body["messages"][1]["role"], "user");
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn chat_model_override() {
    let (url, mock) = spawn_mock(vec![Scripted::Reply(completion("ok"))]).await;
    let client = client(&url, Arc::new(RecordingSleeper::default()));

    client
        .chat(&messages(), 0.0, 16, Some("moonshot-v1-128k"))
        .await
        .unwrap();
    assert_eq!(mock.last_body()["model"], "moonshot-v1-128k");
}

#[tokio::test]
async fn three_rate_limits_then_success_backs_off_exponentially() {
    let (url, mock) = spawn_mock(vec![
        Scripted::RateLimited(None),
        Scripted::RateLimited(None),
        Scripted::RateLimited(None),
        Scripted::Reply(completion("finally")),
    ])
    .await;
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&url, sleeper.clone());

    let request = ChatRequest {
        model: "mock-model".into(),
        messages: messages(),
        temperature: 0.2,
        max_tokens: 100,
    };
    let outcome = client.send(&request).await.unwrap();

    assert_eq!(outcome.reply, ChatReply::Text("finally".into()));
    assert_eq!(outcome.attempts, 4);
    assert_eq!(mock.hits(), 4);

    let sleeps = sleeper.sleeps();
    assert_eq!(sleeps.len(), 3);
    for (attempt, delay) in sleeps.iter().enumerate() {
        let base = Duration::from_secs(1 << attempt);
        assert!(*delay >= base, "attempt {attempt}: {delay:?} < {base:?}");
        assert!(
            *delay < base + Duration::from_millis(500),
            "attempt {attempt}: {delay:?} has too much jitter"
        );
    }
}

#[tokio::test]
async fn six_rate_limits_exhaust_without_a_final_sleep() {
    let (url, mock) = spawn_mock(vec![Scripted::RateLimited(None); 6]).await;
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&url, sleeper.clone());

    let err = client.chat(&messages(), 0.2, 100, None).await.unwrap_err();

    assert!(
        matches!(err, Patent2DocxError::RateLimitExhausted { attempts: 6 }),
        "unexpected error: {err:?}"
    );
    assert!(err.is_user_actionable());
    assert_eq!(mock.hits(), 6);
    assert_eq!(sleeper.sleeps().len(), 5);
}

#[tokio::test]
async fn retry_after_header_is_honoured_exactly() {
    let (url, mock) = spawn_mock(vec![
        Scripted::RateLimited(Some("2")),
        Scripted::Reply(completion("ok")),
    ])
    .await;
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&url, sleeper.clone());

    client.chat(&messages(), 0.2, 100, None).await.unwrap();

    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(2)]);
    assert_eq!(mock.hits(), 2);
}

#[tokio::test]
async fn http_date_retry_after_falls_back_to_backoff() {
    let (url, _mock) = spawn_mock(vec![
        Scripted::RateLimited(Some("Wed, 21 Oct 2015 07:28:00 GMT")),
        Scripted::Reply(completion("ok")),
    ])
    .await;
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&url, sleeper.clone());

    client.chat(&messages(), 0.2, 100, None).await.unwrap();

    let sleeps = sleeper.sleeps();
    assert_eq!(sleeps.len(), 1);
    assert!(sleeps[0] >= Duration::from_secs(1));
    assert!(sleeps[0] < Duration::from_millis(1500));
}

#[tokio::test]
async fn server_error_fails_immediately_with_body() {
    let (url, mock) = spawn_mock(vec![Scripted::Status(500, "upstream exploded")]).await;
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&url, sleeper.clone());

    let err = client.chat(&messages(), 0.2, 100, None).await.unwrap_err();

    match &err {
        Patent2DocxError::Api { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("upstream exploded"));
    assert_eq!(mock.hits(), 1);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn unauthorised_is_not_retried() {
    let (url, mock) = spawn_mock(vec![Scripted::Status(
        401,
        r#"{"error":{"message":"Invalid Authentication"}}"#,
    )])
    .await;
    let client = client(&url, Arc::new(RecordingSleeper::default()));

    let err = client.chat(&messages(), 0.2, 100, None).await.unwrap_err();
    assert!(matches!(err, Patent2DocxError::Api { .. }));
    assert!(err.to_string().contains("Invalid Authentication"));
    assert_eq!(mock.hits(), 1);
}

// Loose contract edge: a success body without choices[0].message.content is
// handed back whole instead of failing.
#[tokio::test]
async fn missing_choices_returns_raw_payload() {
    let payload = json!({"id": "cmpl-odd", "result": "no choices here"});
    let (url, _mock) = spawn_mock(vec![Scripted::Reply(payload.clone())]).await;
    let client = client(&url, Arc::new(RecordingSleeper::default()));

    let reply = client.chat(&messages(), 0.2, 100, None).await.unwrap();
    assert_eq!(reply, ChatReply::Raw(payload));
}

#[tokio::test]
async fn non_json_success_is_invalid_response() {
    let (url, _mock) = spawn_mock(vec![Scripted::Status(200, "<html>gateway</html>")]).await;
    let client = client(&url, Arc::new(RecordingSleeper::default()));

    let err = client.chat(&messages(), 0.2, 100, None).await.unwrap_err();
    assert!(matches!(err, Patent2DocxError::InvalidResponse { .. }));
}

#[tokio::test]
async fn invalid_request_never_reaches_the_server() {
    let (url, mock) = spawn_mock(vec![]).await;
    let client = client(&url, Arc::new(RecordingSleeper::default()));

    let err = client.chat(&[], 0.2, 100, None).await.unwrap_err();
    assert!(matches!(err, Patent2DocxError::InvalidRequest(_)));

    let err = client.chat(&messages(), 1.2, 100, None).await.unwrap_err();
    assert!(matches!(err, Patent2DocxError::InvalidRequest(_)));

    let err = client.chat(&messages(), 0.2, 0, None).await.unwrap_err();
    assert!(matches!(err, Patent2DocxError::InvalidRequest(_)));

    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn cancellation_during_backoff() {
    let (url, mock) = spawn_mock(vec![
        Scripted::RateLimited(None),
        Scripted::Reply(completion("too late")),
    ])
    .await;
    let token = CancellationToken::new();
    let client = ChatClient::builder("sk-test")
        .base_url(&url)
        .sleeper(Arc::new(CancellingSleeper {
            token: token.clone(),
        }))
        .cancellation_token(token)
        .build()
        .unwrap();

    let err = client.chat(&messages(), 0.2, 100, None).await.unwrap_err();
    assert!(matches!(err, Patent2DocxError::Cancelled));
    assert_eq!(mock.hits(), 1);
}

#[tokio::test]
async fn cancelled_client_sends_nothing() {
    let (url, mock) = spawn_mock(vec![Scripted::Reply(completion("ok"))]).await;
    let client = client(&url, Arc::new(RecordingSleeper::default()));
    client.cancellation_token().cancel();

    let err = client.chat(&messages(), 0.2, 100, None).await.unwrap_err();
    assert!(matches!(err, Patent2DocxError::Cancelled));
    assert_eq!(mock.hits(), 0);
}

// ── Full pipeline ────────────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_produces_sectioned_report() {
    let (url, mock) = spawn_mock(vec![Scripted::Reply(completion(THREE_PART_REPLY))]).await;
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(EventLog::default());
    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        Some(events.clone()),
    );

    let pdf = build_pdf(&[Some("A heat sink with fins"), None, Some("Claim 1 recites")]);
    let output = analyzer.analyze(pdf, "CN1234567A.pdf").await.unwrap();

    assert_eq!(output.file_name, "CN1234567A_patent-analysis-report.docx");
    assert_eq!(output.raw_text, THREE_PART_REPLY);
    assert_eq!(output.sections.brief, "第一篇：简洁版本\n一种散热装置。");
    assert_eq!(output.sections.full, "第二篇：完整版本\n1. 基本信息\n2. 技术方案");
    assert_eq!(output.sections.translation, "原文翻译\nA heat sink device.");

    let stats = &output.stats;
    assert_eq!(stats.total_pages, 3);
    assert_eq!(stats.processed_pages, 3);
    assert_eq!(stats.chat_attempts, 1);
    assert!(stats.cleaned_chars > 0);
    assert!(stats.cleaned_chars <= stats.extracted_chars);

    // The user turn carries the template, then the cleaned page text.
    let body = mock.last_body();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.starts_with("第一篇：简洁版本"));
    assert!(user.contains("A heat sink with fins"));
    assert!(user.contains(&page_marker(1)));
    assert!(!user.contains(&page_marker(2)));
    assert!(user.contains(&page_marker(3)));
    assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);

    let xml = read_document_xml(&output.report);
    assert!(xml.contains("Source file: CN1234567A.pdf"));
    assert!(xml.contains("一种散热装置。"));
    assert!(xml.contains("2. 技术方案"));
    assert!(xml.contains("A heat sink device."));
    assert!(!xml.contains(BRIEF_PLACEHOLDER));

    assert_eq!(
        events.events.lock().unwrap().as_slice(),
        ["start 1", "done 1", "start 2", "done 2", "start 3", "done 3"]
    );
    assert!(!analyzer.is_busy());
}

#[tokio::test]
async fn unmarked_reply_fills_full_section_and_placeholders() {
    let reply = "This patent describes a valve.\nIt has two chambers.";
    let (url, _mock) = spawn_mock(vec![Scripted::Reply(completion(reply))]).await;
    let dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        None,
    );

    let output = analyzer
        .analyze(build_pdf(&[Some("valve")]), "US1.pdf")
        .await
        .unwrap();

    assert_eq!(output.sections.brief, "");
    assert_eq!(output.sections.full, reply);
    assert_eq!(output.sections.translation, "");

    let xml = read_document_xml(&output.report);
    assert!(xml.contains(BRIEF_PLACEHOLDER));
    assert!(xml.contains(TRANSLATION_PLACEHOLDER));
    assert!(xml.contains("This patent describes a valve."));
    assert!(xml.contains("It has two chambers."));
}

#[tokio::test]
async fn page_cap_limits_what_is_sent() {
    let (url, mock) = spawn_mock(vec![Scripted::Reply(completion("ok"))]).await;
    let dir = tempfile::tempdir().unwrap();
    let config = AnalysisConfig::builder()
        .api_key("sk-test")
        .base_url(&url)
        .prompt_path(prompt_file(&dir))
        .max_pages(1)
        .build()
        .unwrap();
    let analyzer = Analyzer::new(config).unwrap();

    let output = analyzer
        .analyze(build_pdf(&[Some("first page"), Some("second page")]), "EP1.pdf")
        .await
        .unwrap();

    assert_eq!(output.stats.total_pages, 2);
    assert_eq!(output.stats.processed_pages, 1);
    let body = mock.last_body();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("first page"));
    assert!(!user.contains("second page"));
}

#[tokio::test]
async fn rate_limits_surface_through_progress_callback() {
    let (url, _mock) = spawn_mock(vec![
        Scripted::RateLimited(None),
        Scripted::Reply(completion("ok")),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(EventLog::default());
    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        Some(events.clone()),
    );

    let output = analyzer
        .analyze(build_pdf(&[Some("text")]), "JP1.pdf")
        .await
        .unwrap();

    assert_eq!(output.stats.chat_attempts, 2);
    assert!(events
        .events
        .lock()
        .unwrap()
        .contains(&"429 1/6".to_string()));
}

#[tokio::test]
async fn concurrent_analysis_is_rejected_as_busy() {
    let (url, mock) = spawn_mock(vec![
        Scripted::Reply(completion("first")),
        Scripted::Reply(completion("third")),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        None,
    );

    let pdf = build_pdf(&[Some("busy test")]);
    let (first, second) = tokio::join!(
        analyzer.analyze(pdf.clone(), "A.pdf"),
        analyzer.analyze(pdf.clone(), "B.pdf"),
    );

    assert_eq!(first.unwrap().sections.full, "first");
    assert!(matches!(second, Err(Patent2DocxError::Busy)));
    assert_eq!(mock.hits(), 1);

    // Released after success.
    assert!(!analyzer.is_busy());
    let third = analyzer.analyze(pdf, "C.pdf").await.unwrap();
    assert_eq!(third.sections.full, "third");
}

#[tokio::test]
async fn session_is_released_after_failure() {
    let (url, _mock) = spawn_mock(vec![
        Scripted::Status(503, "maintenance"),
        Scripted::Reply(completion("recovered")),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        None,
    );
    let pdf = build_pdf(&[Some("retry me")]);

    let err = analyzer.analyze(pdf.clone(), "A.pdf").await.unwrap_err();
    assert!(matches!(err, Patent2DocxError::Api { .. }));
    assert!(!analyzer.is_busy());

    let output = analyzer.analyze(pdf, "A.pdf").await.unwrap();
    assert_eq!(output.sections.full, "recovered");
}

#[tokio::test]
async fn missing_prompt_is_a_config_error() {
    let (url, mock) = spawn_mock(vec![Scripted::Reply(completion("unused"))]).await;
    let dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        &url,
        dir.path().join("missing_prompt.txt"),
        Arc::new(RecordingSleeper::default()),
        None,
    );

    let err = analyzer
        .analyze(build_pdf(&[Some("text")]), "A.pdf")
        .await
        .unwrap_err();

    assert!(matches!(err, Patent2DocxError::PromptNotFound { .. }));
    assert!(err.is_config_error());
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn scanned_pdf_asks_for_ocr() {
    let (url, mock) = spawn_mock(vec![]).await;
    let dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        None,
    );

    let err = analyzer
        .analyze(build_pdf(&[None, None]), "scan.pdf")
        .await
        .unwrap_err();

    assert!(matches!(err, Patent2DocxError::NoExtractableText));
    assert!(err.is_user_actionable());
    assert!(err.to_string().contains("OCR"));
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn corrupt_pdf_keeps_parser_error() {
    let (url, _mock) = spawn_mock(vec![]).await;
    let dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        None,
    );

    let err = analyzer
        .analyze(b"%PDF-1.4\nthis is not a real document".to_vec(), "bad.pdf")
        .await
        .unwrap_err();

    assert!(matches!(err, Patent2DocxError::CorruptPdf { .. }));
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn preamble_before_pdf_header_is_accepted() {
    let prefixes: [&[u8]; 3] = [b"\r\n", b"\xEF\xBB\xBF", b"garbage header\n"];
    let (url, mock) = spawn_mock(
        prefixes
            .iter()
            .map(|_| Scripted::Reply(completion(THREE_PART_REPLY)))
            .collect(),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        None,
    );

    for prefix in prefixes {
        let mut pdf = prefix.to_vec();
        pdf.extend(build_pdf(&[Some("prefixed document")]));

        let output = analyzer.analyze(pdf, "JP2024123456A.pdf").await.unwrap();
        assert_eq!(output.stats.total_pages, 1);
        assert_eq!(output.sections.translation, "原文翻译\nA heat sink device.");

        let body = mock.last_body();
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("prefixed document"), "prefix {prefix:?}");
    }
    assert_eq!(mock.hits(), prefixes.len());
}

#[tokio::test]
async fn analyze_file_and_write_report() {
    let (url, _mock) = spawn_mock(vec![Scripted::Reply(completion(THREE_PART_REPLY))]).await;
    let dir = tempfile::tempdir().unwrap();
    let pdf_path = dir.path().join("WO2024000001A1.pdf");
    std::fs::write(&pdf_path, build_pdf(&[Some("international application")])).unwrap();

    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        None,
    );
    let output = analyzer.analyze_file(&pdf_path).await.unwrap();
    assert_eq!(
        output.file_name,
        "WO2024000001A1_patent-analysis-report.docx"
    );

    let out_path = dir.path().join("reports").join(&output.file_name);
    write_report(&out_path, &output.report).await.unwrap();

    let written = std::fs::read(&out_path).unwrap();
    assert_eq!(written, output.report);
    let xml = read_document_xml(&written);
    assert!(xml.contains("Source file: WO2024000001A1.pdf"));
}

#[test]
fn analyze_blocking_outside_a_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (url, _mock) = runtime.block_on(spawn_mock(vec![Scripted::Reply(completion("sync"))]));
    let dir = tempfile::tempdir().unwrap();
    let analyzer = analyzer(
        &url,
        prompt_file(&dir),
        Arc::new(RecordingSleeper::default()),
        None,
    );

    let output = analyzer
        .analyze_blocking(build_pdf(&[Some("blocking")]), "KR1.pdf")
        .unwrap();
    assert_eq!(output.sections.full, "sync");
}
