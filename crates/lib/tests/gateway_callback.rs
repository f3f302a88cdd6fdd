//! Integration tests: serve the gateway on a free port against an in-process mock of the
//! LINE and Dify APIs, then POST signed webhooks with reqwest.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use relay::channels::signature::sign_body;
use relay::config::{AnalysisStrategy, Config, MessagesConfig};
use relay::gateway::{self, GatewayState};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SECRET: &str = "test-channel-secret";

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    body: String,
}

struct MockApis {
    calls: Mutex<Vec<Recorded>>,
    dify_status: StatusCode,
    dify_reply: String,
}

/// LINE rejects text messages longer than this.
const LINE_TEXT_LIMIT: usize = 5000;

impl MockApis {
    fn record(&self, path: String, body: &[u8]) {
        self.calls.lock().unwrap().push(Recorded {
            path,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }

    fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.path).collect()
    }

    fn pushes(&self) -> Vec<serde_json::Value> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == "/v2/bot/message/push")
            .map(|c| serde_json::from_str(&c.body).expect("push body is JSON"))
            .collect()
    }
}

async fn line_reply(State(m): State<Arc<MockApis>>, body: Bytes) -> StatusCode {
    m.record("/v2/bot/message/reply".to_string(), &body);
    StatusCode::OK
}

async fn line_push(State(m): State<Arc<MockApis>>, body: Bytes) -> StatusCode {
    m.record("/v2/bot/message/push".to_string(), &body);
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
    let too_long = v["messages"]
        .as_array()
        .map(|msgs| {
            msgs.iter().any(|msg| {
                msg["text"]
                    .as_str()
                    .is_some_and(|t| t.chars().count() > LINE_TEXT_LIMIT)
            })
        })
        .unwrap_or(false);
    if too_long {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    }
}

async fn line_content(
    State(m): State<Arc<MockApis>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    m.record(format!("/v2/bot/message/{}/content", id), b"");
    if id == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [(header::CONTENT_TYPE, "image/png")],
        vec![0x89u8, b'P', b'N', b'G'],
    )
        .into_response()
}

async fn dify_analyze(State(m): State<Arc<MockApis>>, body: Bytes) -> impl IntoResponse {
    m.record("/analyze".to_string(), &body);
    (
        m.dify_status,
        [(header::CONTENT_TYPE, "application/json")],
        m.dify_reply.clone(),
    )
}

async fn dify_upload(State(m): State<Arc<MockApis>>, body: Bytes) -> impl IntoResponse {
    m.record("/v1/files/upload".to_string(), &body);
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"id":"file-1","name":"image.png"}"#,
    )
}

async fn dify_chat(State(m): State<Arc<MockApis>>, body: Bytes) -> impl IntoResponse {
    m.record("/v1/chat-messages".to_string(), &body);
    (
        [(header::CONTENT_TYPE, "application/json")],
        m.dify_reply.clone(),
    )
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

async fn start_mock(dify_reply: &str) -> (Arc<MockApis>, String) {
    start_mock_with_status(StatusCode::OK, dify_reply).await
}

async fn start_mock_with_status(
    dify_status: StatusCode,
    dify_reply: &str,
) -> (Arc<MockApis>, String) {
    let mock = Arc::new(MockApis {
        calls: Mutex::new(Vec::new()),
        dify_status,
        dify_reply: dify_reply.to_string(),
    });
    let app = Router::new()
        .route("/v2/bot/message/reply", post(line_reply))
        .route("/v2/bot/message/push", post(line_push))
        .route("/v2/bot/message/:id/content", get(line_content))
        .route("/analyze", post(dify_analyze))
        .route("/v1/files/upload", post(dify_upload))
        .route("/v1/chat-messages", post(dify_chat))
        .with_state(mock.clone());
    let base = serve(app).await;
    (mock, base)
}

fn test_config(mock_base: &str, strategy: AnalysisStrategy) -> Config {
    let mut config = Config::default();
    config.line.channel_secret = Some(SECRET.to_string());
    config.line.channel_access_token = Some("test-token".to_string());
    config.line.api_base = mock_base.to_string();
    config.line.data_api_base = mock_base.to_string();
    config.line.timeout_secs = 5;
    config.analysis.api_key = Some("app-key".to_string());
    config.analysis.api_url = Some(match strategy {
        AnalysisStrategy::Multipart => format!("{}/analyze", mock_base),
        AnalysisStrategy::UploadThenReference => format!("{}/v1", mock_base),
    });
    config.analysis.strategy = strategy;
    config.analysis.timeout_secs = 5;
    config
}

async fn start_gateway(config: Config) -> String {
    let state = GatewayState::from_config(config).expect("gateway state");
    serve(gateway::router(state)).await
}

async fn post_callback(
    gateway_base: &str,
    body: &str,
    signature: Option<&str>,
) -> (reqwest::StatusCode, String) {
    let client = reqwest::Client::new();
    let mut req = client
        .post(format!("{}/callback", gateway_base))
        .header("Content-Type", "application/json")
        .body(body.to_string());
    if let Some(sig) = signature {
        req = req.header("X-Line-Signature", sig);
    }
    let res = req.send().await.expect("send callback");
    let status = res.status();
    let text = res.text().await.expect("callback body");
    (status, text)
}

fn text_and_image_body(image_id: &str) -> String {
    serde_json::json!({
        "destination": "Ubot",
        "events": [
            {
                "type": "message",
                "replyToken": "reply-text",
                "source": { "type": "user", "userId": "U-text" },
                "message": { "type": "text", "id": "1", "text": "hello" }
            },
            {
                "type": "message",
                "replyToken": "reply-image",
                "source": { "type": "user", "userId": "U-image" },
                "message": { "type": "image", "id": image_id }
            }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn text_and_image_round_trip_with_multipart() {
    let (mock, base) = start_mock(r#"{"answer":"no leaks found"}"#).await;
    let gw = start_gateway(test_config(&base, AnalysisStrategy::Multipart)).await;

    let body = text_and_image_body("42");
    let (status, text) = post_callback(&gw, &body, Some(&sign_body(SECRET, body.as_bytes()))).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(text, "OK");

    assert_eq!(
        mock.paths(),
        vec![
            "/v2/bot/message/reply",
            "/v2/bot/message/reply",
            "/v2/bot/message/42/content",
            "/analyze",
            "/v2/bot/message/push",
        ]
    );
    let calls = mock.calls();
    let messages = MessagesConfig::default();
    let text_reply: serde_json::Value = serde_json::from_str(&calls[0].body).unwrap();
    assert_eq!(text_reply["replyToken"], "reply-text");
    assert_eq!(text_reply["messages"][0]["text"], messages.text_reply.as_str());
    let ack: serde_json::Value = serde_json::from_str(&calls[1].body).unwrap();
    assert_eq!(ack["replyToken"], "reply-image");
    assert_eq!(ack["messages"][0]["text"], messages.image_received.as_str());

    let form = &calls[3].body;
    assert!(form.contains("name=\"pipe_drawing_image\""));
    assert!(form.contains("filename=\"image.png\""));
    assert!(form.contains("U-image"));
    assert!(form.contains("blocking"));

    let pushes = mock.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["to"], "U-image");
    assert_eq!(pushes[0]["messages"][0]["text"], "no leaks found");
}

#[tokio::test]
async fn upload_then_reference_strategy() {
    let (mock, base) = start_mock(r#"{"answer":"flange misaligned"}"#).await;
    let gw = start_gateway(test_config(&base, AnalysisStrategy::UploadThenReference)).await;

    let body = serde_json::json!({
        "events": [{
            "type": "message",
            "replyToken": "r",
            "source": { "type": "user", "userId": "U1" },
            "message": { "type": "image", "id": "7" }
        }]
    })
    .to_string();
    let (status, _) = post_callback(&gw, &body, Some(&sign_body(SECRET, body.as_bytes()))).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    assert_eq!(
        mock.paths(),
        vec![
            "/v2/bot/message/reply",
            "/v2/bot/message/7/content",
            "/v1/files/upload",
            "/v1/chat-messages",
            "/v2/bot/message/push",
        ]
    );
    let chat = mock
        .calls()
        .into_iter()
        .find(|c| c.path == "/v1/chat-messages")
        .unwrap();
    let chat: serde_json::Value = serde_json::from_str(&chat.body).unwrap();
    assert_eq!(chat["user"], "U1");
    assert_eq!(chat["conversation_id"], "");
    assert_eq!(chat["response_mode"], "blocking");
    assert_eq!(chat["files"][0]["upload_file_id"], "file-1");
    assert!(!chat["query"].as_str().unwrap().is_empty());
    assert_eq!(mock.pushes()[0]["messages"][0]["text"], "flange misaligned");
}

#[tokio::test]
async fn missing_or_bad_signature_is_rejected_without_calls() {
    let (mock, base) = start_mock(r#"{"answer":"x"}"#).await;
    let gw = start_gateway(test_config(&base, AnalysisStrategy::Multipart)).await;
    let body = text_and_image_body("42");

    let (status, _) = post_callback(&gw, &body, None).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    let wrong = sign_body("other-secret", body.as_bytes());
    let (status, _) = post_callback(&gw, &body, Some(&wrong)).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    // Signature of the body, sent with a tampered body.
    let sig = sign_body(SECRET, body.as_bytes());
    let tampered = body.replace("hello", "hellp");
    let (status, _) = post_callback(&gw, &tampered, Some(&sig)).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn signed_garbage_is_a_server_error() {
    let (mock, base) = start_mock(r#"{"answer":"x"}"#).await;
    let gw = start_gateway(test_config(&base, AnalysisStrategy::Multipart)).await;
    let body = "not json";
    let (status, _) = post_callback(&gw, body, Some(&sign_body(SECRET, body.as_bytes()))).await;
    assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn download_failure_pushes_one_notice_and_skips_analysis() {
    let (mock, base) = start_mock(r#"{"answer":"x"}"#).await;
    let gw = start_gateway(test_config(&base, AnalysisStrategy::Multipart)).await;
    let body = text_and_image_body("missing");
    let (status, _) = post_callback(&gw, &body, Some(&sign_body(SECRET, body.as_bytes()))).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    assert!(!mock.paths().iter().any(|p| p == "/analyze"));
    let pushes = mock.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(
        pushes[0]["messages"][0]["text"],
        MessagesConfig::default().download_failed.as_str()
    );
}

#[tokio::test]
async fn answer_missing_pushes_one_fallback() {
    let (mock, base) = start_mock(r#"{"event":"message","conversation_id":"c1"}"#).await;
    let gw = start_gateway(test_config(&base, AnalysisStrategy::Multipart)).await;
    let body = text_and_image_body("42");
    let (status, _) = post_callback(&gw, &body, Some(&sign_body(SECRET, body.as_bytes()))).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let pushes = mock.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(
        pushes[0]["messages"][0]["text"],
        MessagesConfig::default().no_answer.as_str()
    );
}

#[tokio::test]
async fn large_backend_error_still_reaches_user() {
    let error_page = format!("<html>{}</html>", "bad gateway ".repeat(700));
    let (mock, base) = start_mock_with_status(StatusCode::BAD_GATEWAY, &error_page).await;
    let gw = start_gateway(test_config(&base, AnalysisStrategy::Multipart)).await;
    let body = text_and_image_body("42");
    let (status, _) = post_callback(&gw, &body, Some(&sign_body(SECRET, body.as_bytes()))).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let pushes = mock.pushes();
    assert_eq!(pushes.len(), 1);
    let text = pushes[0]["messages"][0]["text"].as_str().unwrap();
    assert!(text.starts_with(&MessagesConfig::default().analysis_failed));
    assert!(text.contains("502"));
    assert!(text.chars().count() <= LINE_TEXT_LIMIT);
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
        listener.local_addr().expect("local_addr").port()
    };
    let mut config = test_config("http://127.0.0.1:9", AnalysisStrategy::Multipart);
    config.server.bind = "127.0.0.1".to_string();
    config.server.port = port;
    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                gateway_handle.abort();
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    gateway_handle.abort();
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}
