use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use typebot_config::{Config, Dispatcher, Logging, Server, Store};
use typebot_server::build_app;

fn test_config() -> Config {
    Config {
        server: Server {
            listen_addr: "127.0.0.1:0".to_string(),
        },
        store: Store {
            kind: "memory".to_string(),
            sqlite_path: None,
        },
        dispatcher: Dispatcher {
            timeout_ms: 2_000,
            user_agent: Some("typebot-webhooks-test".to_string()),
        },
        logging: Logging::default(),
    }
}

fn test_config_sqlite(db_path: &str) -> Config {
    let mut cfg = test_config();
    cfg.store.kind = "sqlite".to_string();
    cfg.store.sqlite_path = Some(db_path.to_string());
    cfg
}

#[derive(Debug, Clone)]
struct Captured {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

type Captures = Arc<Mutex<Vec<Captured>>>;

/// Local webhook target that records every request and answers with the
/// given status and body.
async fn spawn_target(status: StatusCode, reply: Value) -> (String, Captures) {
    let captures: Captures = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .fallback(
            move |State(captures): State<Captures>,
                  method: Method,
                  uri: Uri,
                  headers: HeaderMap,
                  body: Bytes| {
                let reply = reply.clone();
                async move {
                    captures.lock().await.push(Captured {
                        method,
                        uri,
                        headers,
                        body,
                    });
                    (status, axum::Json(reply))
                }
            },
        )
        .with_state(captures.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), captures)
}

fn typebot(webhook: Value, step_options: Value) -> Value {
    json!({
        "id": "tb1",
        "name": "Lead form",
        "blocks": [
            {"id": "b1", "title": "Email", "steps": [
                {"id": "s_email", "blockId": "b1", "type": "email input",
                 "options": {"variableId": "v_email"}}
            ]},
            {"id": "b2", "title": "Send", "steps": [
                {"id": "s_hook", "blockId": "b2", "type": "Webhook", "webhookId": "wh1",
                 "options": step_options},
                {"id": "s_text", "blockId": "b2", "type": "text"}
            ]}
        ],
        "variables": [
            {"id": "v_email", "name": "Email"},
            {"id": "v_id", "name": "id"}
        ],
        "edges": [
            {"id": "e1", "from": {"blockId": "b1", "stepId": "s_email"}, "to": {"blockId": "b2"}}
        ],
        "webhooks": [webhook]
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).to_string())
        })
    };
    (status, value)
}

async fn publish(app: &Router, document: Value) {
    let (status, _) = send(app, "PUT", "/v1/typebots/tb1", document).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

const EXECUTE: &str = "/v1/typebots/tb1/blocks/b2/steps/s_hook/executeWebhook";

#[tokio::test]
async fn healthz_ok() {
    let app = build_app(test_config()).await.unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_typebot_is_not_found() {
    let app = build_app(test_config()).await.unwrap();
    let (status, body) = send(&app, "POST", EXECUTE, json!({"variables": []})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"statusCode": 404, "data": {"message": "Typebot not found"}}));
}

#[tokio::test]
async fn publish_rejects_mismatched_id() {
    let app = build_app(test_config()).await.unwrap();
    let (status, body) = send(&app, "PUT", "/v1/typebots/other", typebot(json!({"id": "wh1"}), json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn executes_configured_webhook_with_resolved_parts() {
    let (base, captures) = spawn_target(StatusCode::OK, json!({"accepted": true})).await;
    let app = build_app(test_config()).await.unwrap();
    publish(
        &app,
        typebot(
            json!({
                "id": "wh1",
                "url": format!("{base}/leads/{{{{id}}}}"),
                "method": "POST",
                "headers": [
                    {"id": "h1", "key": "Authorization", "value": "Basic foo:bar"},
                    {"id": "h2", "key": "X-Source", "value": "{{Email}}"},
                    {"id": "h3", "key": "", "value": "dropped"}
                ],
                "queryParams": [{"id": "q1", "key": "ref", "value": "{{id}}"}],
                "body": "{\"email\": \"{{Email}}\", \"missing\": \"{{nope}}\"}"
            }),
            json!({"isAdvancedConfig": true, "isCustomBody": true}),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        EXECUTE,
        json!({"variables": [
            {"id": "v_email", "name": "Email", "value": "ada@example.com"},
            {"id": "v_id", "name": "id", "value": "42"}
        ]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"statusCode": 200, "data": {"accepted": true}}));

    let captured = captures.lock().await;
    assert_eq!(captured.len(), 1);
    let request = &captured[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.uri.to_string(), "/leads/42?ref=42");
    assert_eq!(request.headers["authorization"], "Basic Zm9vOmJhcg==");
    assert_eq!(request.headers["x-source"], "ada@example.com");
    assert_eq!(request.headers["user-agent"], "typebot-webhooks-test");
    let sent: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(sent, json!({"email": "ada@example.com", "missing": "{{nope}}"}));
}

#[tokio::test]
async fn remote_error_is_returned_and_logged() {
    let (base, _captures) = spawn_target(StatusCode::NOT_FOUND, json!({"error": "nope"})).await;
    let app = build_app(test_config()).await.unwrap();
    publish(
        &app,
        typebot(json!({"id": "wh1", "url": base, "method": "POST"}), json!({})),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("{EXECUTE}?resultId=result-1"),
        json!({"variables": []}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"statusCode": 404, "data": {"error": "nope"}}));

    let (status, logs) = send(&app, "GET", "/v1/results/result-1/logs", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["status"], "error");
    assert_eq!(logs[0]["description"], "Webhook returned an error");

    send(&app, "POST", EXECUTE, json!({"variables": []})).await;
    let (_, logs) = send(&app, "GET", "/v1/results/result-1/logs", Value::Null).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_target_yields_500_and_error_log() {
    let app = build_app(test_config()).await.unwrap();
    publish(
        &app,
        typebot(
            json!({"id": "wh1", "url": "http://127.0.0.1:1/hook", "method": "POST"}),
            json!({}),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("{EXECUTE}?resultId=result-2"),
        json!({"variables": []}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statusCode"], 500);
    assert!(body["data"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Error from Typebot server"));

    let (_, logs) = send(&app, "GET", "/v1/results/result-2/logs", Value::Null).await;
    assert_eq!(logs[0]["description"], "Webhook failed to execute");
}

#[tokio::test]
async fn form_content_type_sends_urlencoded_body() {
    let (base, captures) = spawn_target(StatusCode::OK, json!({})).await;
    let app = build_app(test_config()).await.unwrap();
    publish(
        &app,
        typebot(
            json!({
                "id": "wh1",
                "url": base,
                "method": "POST",
                "headers": [{"id": "h1", "key": "Content-Type", "value": "x-www-form-urlencoded"}],
                "body": "{\"name\": \"Ada Lovelace\", \"age\": 36}"
            }),
            json!({}),
        ),
    )
    .await;

    send(&app, "POST", EXECUTE, json!({})).await;
    let captured = captures.lock().await;
    assert_eq!(captured[0].headers["content-type"], "x-www-form-urlencoded");
    assert_eq!(&captured[0].body[..], b"name=Ada+Lovelace&age=36");
}

#[tokio::test]
async fn result_state_is_sent_as_full_state() {
    let (base, captures) = spawn_target(StatusCode::OK, json!({})).await;
    let app = build_app(test_config()).await.unwrap();
    publish(
        &app,
        typebot(
            json!({"id": "wh1", "url": base, "method": "POST", "body": "{{state}}"}),
            json!({}),
        ),
    )
    .await;

    send(
        &app,
        "POST",
        EXECUTE,
        json!({
            "variables": [],
            "resultValues": {
                "createdAt": "2026-03-01T10:00:00Z",
                "answers": [{"stepId": "s_email", "blockId": "b1", "content": "ada@example.com", "variableId": "v_email"}],
                "prefilledVariables": []
            }
        }),
    )
    .await;
    let captured = captures.lock().await;
    let sent: Value = serde_json::from_slice(&captured[0].body).unwrap();
    assert_eq!(
        sent,
        json!({"submittedAt": "2026-03-01T10:00:00Z", "Email": "ada@example.com"})
    );
}

#[tokio::test]
async fn subscription_creates_webhook_and_sends_sample_state() {
    let (base, captures) = spawn_target(StatusCode::OK, json!({"ok": 1})).await;
    let app = build_app(test_config()).await.unwrap();
    let mut document = typebot(json!({"id": "unused"}), json!({}));
    document["blocks"][1]["steps"][0]
        .as_object_mut()
        .unwrap()
        .remove("webhookId");
    publish(&app, document).await;

    let subscribe = "/v1/typebots/tb1/blocks/b2/steps/s_hook/subscribeWebhook";
    let (status, body) = send(&app, "POST", subscribe, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"message": "url is missing in body"}));

    let (status, body) = send(&app, "POST", subscribe, json!({"url": base})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "success"}));

    let (status, body) = send(&app, "POST", EXECUTE, json!({"variables": []})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"ok": 1}));
    let captured = captures.lock().await;
    assert_eq!(captured[0].method, Method::POST);
    let sent: Value = serde_json::from_slice(&captured[0].body).unwrap();
    assert_eq!(sent, json!({"Email": "test@email.com"}));
}

#[tokio::test]
async fn subscription_errors_are_reported() {
    let app = build_app(test_config()).await.unwrap();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/typebots/tb1/blocks/b2/steps/s_hook/subscribeWebhook",
        json!({"url": "https://hooks.test"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": "Typebot not found"}));

    publish(&app, typebot(json!({"id": "wh1"}), json!({}))).await;
    let (status, body) = send(
        &app,
        "POST",
        "/v1/typebots/tb1/blocks/b2/steps/s_text/subscribeWebhook",
        json!({"url": "https://hooks.test"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": "stepId doesn't point to a Webhook step"}));
}

#[tokio::test]
async fn unsubscribed_webhook_reports_missing_url() {
    let (base, captures) = spawn_target(StatusCode::OK, json!({})).await;
    let app = build_app(test_config()).await.unwrap();
    publish(
        &app,
        typebot(json!({"id": "wh1", "url": base, "method": "POST"}), json!({})),
    )
    .await;

    let (status, _) = send(
        &app,
        "POST",
        "/v1/typebots/tb1/blocks/b2/steps/s_hook/unsubscribeWebhook",
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", &format!("{EXECUTE}?resultId=r"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"statusCode": 400, "data": {"message": "Webhook doesn't have url or method"}})
    );
    assert!(captures.lock().await.is_empty());
    let (_, logs) = send(&app, "GET", "/v1/results/r/logs", Value::Null).await;
    assert_eq!(logs, json!([]));
}

#[tokio::test]
async fn simple_mode_ignores_manual_configuration() {
    let (base, captures) = spawn_target(StatusCode::OK, json!({})).await;
    let app = build_app(test_config()).await.unwrap();
    publish(
        &app,
        typebot(
            json!({
                "id": "wh1",
                "url": base,
                "method": "GET",
                "headers": [{"id": "h1", "key": "X-Secret", "value": "s"}],
                "queryParams": [{"id": "q1", "key": "page", "value": "1"}],
                "body": "{\"custom\": true}"
            }),
            json!({"isAdvancedConfig": false}),
        ),
    )
    .await;

    send(&app, "POST", EXECUTE, json!({})).await;
    let captured = captures.lock().await;
    assert_eq!(captured[0].method, Method::POST);
    assert_eq!(captured[0].uri.to_string(), "/");
    assert!(captured[0].headers.get("x-secret").is_none());
    let sent: Value = serde_json::from_slice(&captured[0].body).unwrap();
    assert_eq!(sent, json!({"Email": "test@email.com"}));
}

#[tokio::test]
async fn legacy_route_looks_up_step_across_blocks() {
    let (base, captures) = spawn_target(StatusCode::CREATED, json!("made")).await;
    let app = build_app(test_config()).await.unwrap();
    publish(
        &app,
        typebot(json!({"id": "wh1", "url": base, "method": "PUT"}), json!({})),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/typebots/tb1/blocks/s_hook/executeWebhook",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"statusCode": 201, "data": "made"}));
    assert_eq!(captures.lock().await[0].method, Method::PUT);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/typebots/tb1/blocks/nope/executeWebhook",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["statusCode"], 404);
}

#[tokio::test]
async fn legacy_subscription_finds_step_across_blocks_and_resets_webhook() {
    let (base, captures) = spawn_target(StatusCode::OK, json!({})).await;
    let app = build_app(test_config()).await.unwrap();
    publish(
        &app,
        typebot(
            json!({
                "id": "wh1",
                "url": "https://old.test",
                "method": "GET",
                "body": "{\"custom\": true}"
            }),
            json!({}),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/typebots/tb1/blocks/s_hook/subscribeWebhook",
        json!({"url": base}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "success"}));

    send(&app, "POST", EXECUTE, json!({})).await;
    let captured = captures.lock().await;
    assert_eq!(captured[0].method, Method::POST);
    let sent: Value = serde_json::from_slice(&captured[0].body).unwrap();
    assert_eq!(sent, json!({"Email": "test@email.com"}));
    drop(captured);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/typebots/tb1/blocks/s_text/subscribeWebhook",
        json!({"url": base}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": "blockId doesn't point to a Webhook step"}));
}

#[tokio::test]
async fn execute_routes_answer_browser_preflight() {
    let app = build_app(test_config()).await.unwrap();
    for uri in [EXECUTE, "/v1/typebots/tb1/blocks/s_hook/executeWebhook"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri(uri)
                    .header("origin", "https://bot.example.com")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(EXECUTE)
                .header("origin", "https://bot.example.com")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn sqlite_store_persists_typebots_and_logs() {
    let (base, _captures) = spawn_target(StatusCode::OK, json!({"ok": true})).await;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    let db_path = std::env::temp_dir()
        .join(format!("typebot-webhooks-{nanos}.db"))
        .to_string_lossy()
        .to_string();

    let app = build_app(test_config_sqlite(&db_path)).await.unwrap();
    publish(
        &app,
        typebot(json!({"id": "wh1", "url": base, "method": "POST"}), json!({})),
    )
    .await;
    let (status, _) = send(&app, "POST", &format!("{EXECUTE}?resultId=persisted"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    drop(app);

    let app = build_app(test_config_sqlite(&db_path)).await.unwrap();
    let (_, logs) = send(&app, "GET", "/v1/results/persisted/logs", Value::Null).await;
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["status"], "success");
    assert_eq!(logs[0]["details"]["response"]["data"], json!({"ok": true}));

    let (status, body) = send(&app, "POST", EXECUTE, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statusCode"], 200);
}
