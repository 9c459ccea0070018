use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use typebot_config::Config;
use tower_http::cors::CorsLayer;
use typebot_contracts::{
    ExecuteWebhookRequest, HttpMethod, LogRecord, Typebot, Webhook, WebhookResponse, STATE_BODY,
};
use typebot_kernel::{
    find_webhook_step, linked_typebot_ids, prepare_webhook, step_position, BotGraph,
};

mod audit;
mod dispatch;
mod store;

use audit::AuditLog;
use dispatch::{Execution, ReqwestTransport, WebhookExecutor};
use store::StoreBackend;

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    let state = AppState::new(&cfg)?;
    // Published bots call these from the browser.
    let execute_routes = Router::new()
        .route(
            "/v1/typebots/{typebotId}/blocks/{blockId}/steps/{stepId}/executeWebhook",
            post(execute_step_webhook),
        )
        .route(
            "/v1/typebots/{typebotId}/blocks/{blockId}/executeWebhook",
            post(execute_legacy_webhook),
        )
        .layer(CorsLayer::permissive());
    Ok(Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/typebots/{typebotId}", put(put_typebot))
        .merge(execute_routes)
        .route(
            "/v1/typebots/{typebotId}/blocks/{blockId}/steps/{stepId}/subscribeWebhook",
            post(subscribe_webhook),
        )
        .route(
            "/v1/typebots/{typebotId}/blocks/{blockId}/subscribeWebhook",
            post(subscribe_legacy_webhook),
        )
        .route(
            "/v1/typebots/{typebotId}/blocks/{blockId}/steps/{stepId}/unsubscribeWebhook",
            post(unsubscribe_webhook),
        )
        .route("/v1/results/{resultId}/logs", get(result_logs))
        .with_state(state))
}

#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<StoreBackend>>,
    executor: Arc<WebhookExecutor<ReqwestTransport>>,
}

impl AppState {
    fn new(cfg: &Config) -> Result<Self, String> {
        let store = Arc::new(Mutex::new(StoreBackend::open(
            &cfg.store.kind,
            cfg.store.sqlite_path.as_deref(),
        )?));
        let transport = ReqwestTransport::new(
            Duration::from_millis(cfg.dispatcher.timeout_ms),
            cfg.dispatcher.user_agent.as_deref(),
        )?;
        Ok(Self {
            executor: Arc::new(WebhookExecutor::new(
                transport,
                AuditLog::new(store.clone()),
            )),
            store,
        })
    }

    async fn load_typebot(&self, id: &str) -> Result<Option<Typebot>, String> {
        self.store.lock().await.get_typebot(id)
    }

    async fn load_linked(&self, root: &Typebot) -> Result<Vec<Typebot>, String> {
        let mut seen: HashSet<String> = HashSet::from([root.id.clone()]);
        let mut queue: VecDeque<String> = linked_typebot_ids(root).into();
        let mut linked = Vec::new();
        let store = self.store.lock().await;
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            match store.get_typebot(&id)? {
                Some(typebot) => {
                    queue.extend(linked_typebot_ids(&typebot));
                    linked.push(typebot);
                }
                None => tracing::warn!(typebot_id = %id, "linked typebot not found"),
            }
        }
        Ok(linked)
    }

    async fn execute_webhook(
        &self,
        typebot_id: &str,
        block_id: Option<&str>,
        step_id: &str,
        result_id: Option<&str>,
        input: ExecuteWebhookRequest,
    ) -> Result<WebhookResponse, WebhookResponse> {
        let typebot = self
            .load_typebot(typebot_id)
            .await
            .map_err(|e| WebhookResponse::message(500, e))?
            .ok_or_else(|| WebhookResponse::message(404, "Typebot not found"))?;
        let linked = self
            .load_linked(&typebot)
            .await
            .map_err(|e| WebhookResponse::message(500, e))?;
        let graph = BotGraph::new(&typebot, &linked);

        let target = find_webhook_step(graph, block_id, step_id).map_err(|e| {
            tracing::warn!(typebot_id, step_id, error = %e, "webhook step lookup failed");
            WebhookResponse::message(404, e.to_string())
        })?;
        let webhook = prepare_webhook(target.webhook, target.step.webhook_options());

        Ok(self
            .executor
            .execute(Execution {
                graph,
                webhook: &webhook,
                variables: &input.variables,
                block_id: &target.block.id,
                result_values: input.result_values.as_ref(),
                result_id,
            })
            .await)
    }

    // Without a block id the step is searched across all blocks, and an
    // existing webhook is reset to POST with the state body.
    async fn set_webhook_url(
        &self,
        typebot_id: &str,
        block_id: Option<&str>,
        step_id: &str,
        url: Option<&str>,
    ) -> Result<(), String> {
        let mut store = self.store.lock().await;
        let mut typebot = store
            .get_typebot(typebot_id)?
            .ok_or_else(|| "Typebot not found".to_string())?;
        let (block_idx, step_idx) = step_position(&typebot, block_id, step_id)
            .filter(|&(b, s)| typebot.blocks[b].steps[s].kind.has_webhook())
            .ok_or_else(|| match block_id {
                Some(_) => "stepId doesn't point to a Webhook step".to_string(),
                None => "blockId doesn't point to a Webhook step".to_string(),
            })?;

        let step = &mut typebot.blocks[block_idx].steps[step_idx];
        let webhook_id = step
            .webhook_id
            .get_or_insert_with(|| format!("webhook_{}", uuid::Uuid::new_v4().as_simple()))
            .clone();
        match typebot.webhooks.iter_mut().find(|w| w.id == webhook_id) {
            Some(webhook) => {
                webhook.url = url.map(str::to_string);
                if block_id.is_none() {
                    webhook.method = Some(HttpMethod::Post);
                    webhook.body = Some(STATE_BODY.to_string());
                }
            }
            None => typebot.webhooks.push(Webhook {
                url: url.map(str::to_string),
                ..Webhook::subscribed(&webhook_id, typebot_id, "")
            }),
        }
        store.save_typebot(&typebot)?;
        tracing::info!(typebot_id, step_id, subscribed = url.is_some(), "webhook url updated");
        Ok(())
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn put_typebot(
    State(state): State<AppState>,
    Path(typebot_id): Path<String>,
    Json(typebot): Json<Typebot>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    if typebot.id != typebot_id {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(
                json!({"error": {"code":"validation_error","message":"typebot id does not match path"}}),
            ),
        ));
    }
    state
        .store
        .lock()
        .await
        .save_typebot(&typebot)
        .map_err(|e| {
            tracing::error!(typebot_id = %typebot_id, error = %e, "failed to save typebot");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"code":"store_error","message": e}})),
            )
        })?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteQuery {
    result_id: Option<String>,
}

async fn execute_step_webhook(
    State(state): State<AppState>,
    Path((typebot_id, block_id, step_id)): Path<(String, String, String)>,
    Query(query): Query<ExecuteQuery>,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    run_execution(state, &typebot_id, Some(&block_id), &step_id, query, &body).await
}

async fn execute_legacy_webhook(
    State(state): State<AppState>,
    Path((typebot_id, step_id)): Path<(String, String)>,
    Query(query): Query<ExecuteQuery>,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    run_execution(state, &typebot_id, None, &step_id, query, &body).await
}

async fn run_execution(
    state: AppState,
    typebot_id: &str,
    block_id: Option<&str>,
    step_id: &str,
    query: ExecuteQuery,
    body: &[u8],
) -> (StatusCode, Json<WebhookResponse>) {
    let input = match parse_execute_body(body) {
        Ok(input) => input,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::message(400, e)),
            )
        }
    };
    match state
        .execute_webhook(typebot_id, block_id, step_id, query.result_id.as_deref(), input)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(response) => (
            StatusCode::from_u16(response.status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(response),
        ),
    }
}

fn parse_execute_body(body: &[u8]) -> Result<ExecuteWebhookRequest, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExecuteWebhookRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| format!("invalid request body: {e}"))
}

#[derive(Debug, Deserialize)]
struct SubscribeInput {
    url: Option<String>,
}

async fn subscribe_webhook(
    State(state): State<AppState>,
    Path((typebot_id, block_id, step_id)): Path<(String, String, String)>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    run_subscription(state, &typebot_id, Some(&block_id), &step_id, &body).await
}

async fn subscribe_legacy_webhook(
    State(state): State<AppState>,
    Path((typebot_id, step_id)): Path<(String, String)>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    run_subscription(state, &typebot_id, None, &step_id, &body).await
}

async fn run_subscription(
    state: AppState,
    typebot_id: &str,
    block_id: Option<&str>,
    step_id: &str,
    body: &[u8],
) -> (StatusCode, Json<Value>) {
    let url = serde_json::from_slice::<SubscribeInput>(body)
        .ok()
        .and_then(|input| input.url)
        .filter(|url| !url.is_empty());
    let Some(url) = url else {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"message": "url is missing in body"})),
        );
    };
    subscription_reply(
        state
            .set_webhook_url(typebot_id, block_id, step_id, Some(&url))
            .await,
    )
}

async fn unsubscribe_webhook(
    State(state): State<AppState>,
    Path((typebot_id, block_id, step_id)): Path<(String, String, String)>,
) -> (StatusCode, Json<Value>) {
    subscription_reply(
        state
            .set_webhook_url(&typebot_id, Some(&block_id), &step_id, None)
            .await,
    )
}

fn subscription_reply(outcome: Result<(), String>) -> (StatusCode, Json<Value>) {
    match outcome {
        Ok(()) => (StatusCode::OK, Json(json!({"message": "success"}))),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({"message": e}))),
    }
}

async fn result_logs(
    State(state): State<AppState>,
    Path(result_id): Path<String>,
) -> Result<Json<Vec<LogRecord>>, (StatusCode, Json<Value>)> {
    state
        .store
        .lock()
        .await
        .list_logs(&result_id)
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"code":"store_error","message": e}})),
            )
        })
}
