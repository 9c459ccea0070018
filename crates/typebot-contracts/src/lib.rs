use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const STATE_BODY: &str = "{{state}}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Get,
    Put,
    Delete,
    Patch,
    Head,
    Connect,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    #[serde(default)]
    pub query_params: Vec<KeyValue>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typebot_id: Option<String>,
}

impl Webhook {
    pub fn subscribed(id: &str, typebot_id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            url: Some(url.to_string()),
            method: Some(HttpMethod::Post),
            headers: Vec::new(),
            query_params: Vec::new(),
            body: Some(STATE_BODY.to_string()),
            typebot_id: Some(typebot_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOptions {
    #[serde(default)]
    pub is_advanced_config: Option<bool>,
    #[serde(default)]
    pub is_custom_body: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StepType {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "text")]
    TextBubble,
    #[serde(rename = "image")]
    ImageBubble,
    #[serde(rename = "video")]
    VideoBubble,
    #[serde(rename = "embed")]
    EmbedBubble,
    #[serde(rename = "text input")]
    TextInput,
    #[serde(rename = "number input")]
    NumberInput,
    #[serde(rename = "email input")]
    EmailInput,
    #[serde(rename = "url input")]
    UrlInput,
    #[serde(rename = "date input")]
    DateInput,
    #[serde(rename = "phone number input")]
    PhoneInput,
    #[serde(rename = "choice input")]
    ChoiceInput,
    #[serde(rename = "payment input")]
    PaymentInput,
    #[serde(rename = "Set variable")]
    SetVariable,
    #[serde(rename = "Condition")]
    Condition,
    #[serde(rename = "Redirect")]
    Redirect,
    #[serde(rename = "Code")]
    Code,
    #[serde(rename = "Typebot link")]
    TypebotLink,
    #[serde(rename = "Google Sheets")]
    GoogleSheets,
    #[serde(rename = "Google Analytics")]
    GoogleAnalytics,
    #[serde(rename = "Webhook")]
    Webhook,
    #[serde(rename = "Email")]
    Email,
    #[serde(rename = "Zapier")]
    Zapier,
    #[serde(rename = "Make.com")]
    MakeCom,
    #[serde(rename = "Pabbly")]
    PabblyConnect,
    #[serde(untagged)]
    Other(String),
}

impl StepType {
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            StepType::TextInput
                | StepType::NumberInput
                | StepType::EmailInput
                | StepType::UrlInput
                | StepType::DateInput
                | StepType::PhoneInput
                | StepType::ChoiceInput
                | StepType::PaymentInput
        )
    }

    pub fn has_webhook(&self) -> bool {
        matches!(
            self,
            StepType::Webhook | StepType::Zapier | StepType::MakeCom | StepType::PabblyConnect
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_advanced_config: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_custom_body: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_multiple_choice: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typebot_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    #[serde(default)]
    pub block_id: String,
    #[serde(rename = "type")]
    pub kind: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,
    #[serde(default)]
    pub options: StepOptions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ChoiceItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Step {
    pub fn webhook_options(&self) -> WebhookOptions {
        WebhookOptions {
            is_advanced_config: self.options.is_advanced_config,
            is_custom_body: self.options.is_custom_body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSource {
    pub block_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeTarget {
    pub block_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub id: String,
    pub from: EdgeSource,
    pub to: EdgeTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Typebot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub webhooks: Vec<Webhook>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub step_id: String,
    pub block_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultValues {
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub prefilled_variables: Vec<Variable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status_code: u16,
    pub data: Value,
}

impl WebhookResponse {
    pub fn message(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            data: serde_json::json!({ "message": message.into() }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Error,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: String,
    pub result_id: String,
    pub status: LogStatus,
    pub description: String,
    pub details: Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWebhookRequest {
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub result_values: Option<ResultValues>,
}
