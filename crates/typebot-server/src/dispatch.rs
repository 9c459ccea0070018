use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Map, Value};
use typebot_contracts::{HttpMethod, LogStatus, ResultValues, Variable, Webhook, WebhookResponse};
use typebot_kernel::{
    compile_key_values, extract_basic_auth, materialize_body, resolve_variables, BasicAuth,
    BotGraph, KeyValueMap, MaterializedBody,
};

use crate::audit::AuditLog;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    None,
    Json(Value),
    Form(Vec<(String, String)>),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub basic_auth: Option<BasicAuth>,
    pub body: RequestBody,
}

impl OutboundRequest {
    fn to_log_value(&self) -> Value {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut out = json!({
            "url": self.url,
            "method": self.method.as_str(),
            "headers": headers,
        });
        if let Some(auth) = &self.basic_auth {
            out["username"] = Value::String(auth.username.clone());
        }
        match &self.body {
            RequestBody::None => {}
            RequestBody::Json(value) => out["json"] = value.clone(),
            RequestBody::Form(pairs) => {
                out["form"] = Value::Object(
                    pairs
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                )
            }
            RequestBody::Text(text) => out["body"] = Value::String(text.clone()),
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        request: &OutboundRequest,
    ) -> impl Future<Output = Result<TransportResponse, String>> + Send;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self, String> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(user_agent) = user_agent {
            builder = builder.user_agent(user_agent.to_string());
        }
        let client = builder.build().map_err(|e| e.to_string())?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, String> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| e.to_string())?;
        let mut builder = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(auth) = &request.basic_auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }
        builder = match &request.body {
            RequestBody::None => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(pairs) => builder.form(pairs),
            RequestBody::Text(text) => builder.body(text.clone()),
        };

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Execution<'a> {
    pub graph: BotGraph<'a>,
    pub webhook: &'a Webhook,
    pub variables: &'a [Variable],
    pub block_id: &'a str,
    pub result_values: Option<&'a ResultValues>,
    pub result_id: Option<&'a str>,
}

pub struct WebhookExecutor<T> {
    transport: T,
    audit: AuditLog,
}

impl<T: HttpTransport> WebhookExecutor<T> {
    pub(crate) fn new(transport: T, audit: AuditLog) -> Self {
        Self { transport, audit }
    }

    pub async fn execute(&self, execution: Execution<'_>) -> WebhookResponse {
        let webhook = execution.webhook;
        let (Some(url), Some(method)) = (
            webhook.url.as_deref().filter(|u| !u.is_empty()),
            webhook.method,
        ) else {
            tracing::warn!(webhook_id = %webhook.id, "webhook has no url or method");
            return WebhookResponse::message(400, "Webhook doesn't have url or method");
        };

        let request = build_request(&execution, url, method);
        let (status, description, response) = match self.transport.send(&request).await {
            Ok(reply) if (200..300).contains(&reply.status) => (
                LogStatus::Success,
                "Webhook successfully executed.",
                WebhookResponse {
                    status_code: reply.status,
                    data: parse_body(&reply.body),
                },
            ),
            Ok(reply) => (
                LogStatus::Error,
                "Webhook returned an error",
                WebhookResponse {
                    status_code: reply.status,
                    data: parse_body(&reply.body),
                },
            ),
            Err(e) => {
                tracing::error!(
                    webhook_id = %webhook.id,
                    url = %request.url,
                    error = %e,
                    "webhook call failed"
                );
                (
                    LogStatus::Error,
                    "Webhook failed to execute",
                    WebhookResponse::message(500, format!("Error from Typebot server: {e}")),
                )
            }
        };
        tracing::info!(
            webhook_id = %webhook.id,
            method = method.as_str(),
            status_code = response.status_code,
            outcome = status.as_str(),
            "webhook executed"
        );

        let details = json!({
            "request": request.to_log_value(),
            "response": response,
        });
        self.audit
            .record(execution.result_id, status, description, details)
            .await;
        response
    }
}

pub(crate) fn build_request(
    execution: &Execution<'_>,
    url: &str,
    method: HttpMethod,
) -> OutboundRequest {
    let webhook = execution.webhook;
    let headers =
        compile_key_values(Some(webhook.headers.as_slice()), execution.variables).unwrap_or_default();
    let (headers, basic_auth) = extract_basic_auth(&headers);
    let query =
        compile_key_values(Some(webhook.query_params.as_slice()), execution.variables).unwrap_or_default();

    let body = if method == HttpMethod::Get {
        MaterializedBody::Absent
    } else {
        materialize_body(
            webhook.body.as_deref(),
            execution.graph,
            execution.block_id,
            execution.result_values,
            execution.variables,
        )
    };
    let as_form = headers
        .get_ignore_case("content-type")
        .map(is_form_media_type)
        .unwrap_or(false);

    OutboundRequest {
        url: with_query(&resolve_variables(url, execution.variables), &query),
        method,
        headers: headers.into_pairs(),
        basic_auth,
        body: encode_body(body, as_form),
    }
}

fn with_query(url: &str, query: &KeyValueMap) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter())
        .finish();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{encoded}")
}

fn is_form_media_type(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    value == "x-www-form-urlencoded" || value.starts_with("application/x-www-form-urlencoded")
}

fn encode_body(body: MaterializedBody, as_form: bool) -> RequestBody {
    let value = match body {
        MaterializedBody::Absent => return RequestBody::None,
        MaterializedBody::FullState(map) | MaterializedBody::SampleState(map) => {
            Value::Object(map)
        }
        MaterializedBody::Literal(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(_) => return RequestBody::Text(text),
        },
    };
    if !as_form {
        return RequestBody::Json(value);
    }
    match value {
        Value::Object(map) => RequestBody::Form(
            map.into_iter()
                .map(|(k, v)| (k, form_value(v)))
                .collect(),
        ),
        other => RequestBody::Text(form_value(other)),
    }
}

fn form_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}
