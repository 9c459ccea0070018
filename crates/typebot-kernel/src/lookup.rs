use thiserror::Error;
use typebot_contracts::{Block, Step, StepType, Typebot, Webhook};

use crate::body::BotGraph;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("step {0} not found")]
    StepNotFound(String),
    #[error("step {0} is not a webhook step")]
    NotAWebhookStep(String),
    #[error("Couldn't find webhook")]
    WebhookNotFound,
}

#[derive(Debug, Clone, Copy)]
pub struct WebhookTarget<'a> {
    pub typebot: &'a Typebot,
    pub block: &'a Block,
    pub step: &'a Step,
    pub webhook: &'a Webhook,
}

pub fn step_position(
    typebot: &Typebot,
    block_id: Option<&str>,
    step_id: &str,
) -> Option<(usize, usize)> {
    typebot
        .blocks
        .iter()
        .enumerate()
        .filter(|(_, block)| block_id.map_or(true, |id| block.id == id))
        .find_map(|(block_idx, block)| {
            block
                .steps
                .iter()
                .position(|s| s.id == step_id)
                .map(|step_idx| (block_idx, step_idx))
        })
}

pub fn find_webhook_step<'a>(
    graph: BotGraph<'a>,
    block_id: Option<&str>,
    step_id: &str,
) -> Result<WebhookTarget<'a>, LookupError> {
    let (typebot, block, step) = graph
        .bots()
        .find_map(|typebot| {
            step_position(typebot, block_id, step_id).map(|(b, s)| {
                let block = &typebot.blocks[b];
                (typebot, block, &block.steps[s])
            })
        })
        .ok_or_else(|| LookupError::StepNotFound(step_id.to_string()))?;

    if !step.kind.has_webhook() {
        return Err(LookupError::NotAWebhookStep(step_id.to_string()));
    }
    let webhook_id = step
        .webhook_id
        .as_deref()
        .ok_or(LookupError::WebhookNotFound)?;
    let webhook = typebot
        .webhooks
        .iter()
        .chain(graph.bots().flat_map(|t| t.webhooks.iter()))
        .find(|w| w.id == webhook_id)
        .ok_or(LookupError::WebhookNotFound)?;

    Ok(WebhookTarget {
        typebot,
        block,
        step,
        webhook,
    })
}

pub fn linked_typebot_ids(typebot: &Typebot) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let targets = typebot
        .blocks
        .iter()
        .flat_map(|b| b.steps.iter())
        .filter(|s| s.kind == StepType::TypebotLink)
        .filter_map(|s| s.options.typebot_id.as_deref());
    for id in targets {
        if id != typebot.id && !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    ids
}
