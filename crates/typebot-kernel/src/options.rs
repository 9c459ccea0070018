use typebot_contracts::{HttpMethod, Webhook, WebhookOptions, STATE_BODY};

pub fn prepare_webhook(webhook: &Webhook, options: WebhookOptions) -> Webhook {
    if options.is_advanced_config == Some(false) {
        return Webhook {
            body: Some(STATE_BODY.to_string()),
            method: Some(HttpMethod::Post),
            headers: Vec::new(),
            query_params: Vec::new(),
            ..webhook.clone()
        };
    }
    if options.is_custom_body == Some(false) {
        return Webhook {
            body: Some(STATE_BODY.to_string()),
            ..webhook.clone()
        };
    }
    webhook.clone()
}
