use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use typebot_contracts::{ResultValues, Step, StepType, Typebot, Variable, STATE_BODY};

use crate::variables::resolve_variables;

#[derive(Debug, Clone, PartialEq)]
pub enum MaterializedBody {
    Absent,
    Literal(String),
    FullState(Map<String, Value>),
    SampleState(Map<String, Value>),
}

#[derive(Debug, Clone, Copy)]
pub struct BotGraph<'a> {
    pub typebot: &'a Typebot,
    pub linked: &'a [Typebot],
}

impl<'a> BotGraph<'a> {
    pub fn new(typebot: &'a Typebot, linked: &'a [Typebot]) -> Self {
        Self { typebot, linked }
    }

    pub fn bots(self) -> impl Iterator<Item = &'a Typebot> {
        std::iter::once(self.typebot).chain(self.linked.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCell {
    pub label: String,
    pub variable_id: Option<String>,
    pub step_ids: Vec<String>,
}

pub fn materialize_body(
    body: Option<&str>,
    graph: BotGraph<'_>,
    block_id: &str,
    result_values: Option<&ResultValues>,
    variables: &[Variable],
) -> MaterializedBody {
    match body {
        None | Some("") => MaterializedBody::Absent,
        Some(STATE_BODY) => match result_values {
            Some(values) => {
                MaterializedBody::FullState(parse_answers(&result_header(graph), values))
            }
            None => MaterializedBody::SampleState(parse_sample_result(graph, block_id)),
        },
        Some(text) => MaterializedBody::Literal(resolve_variables(text, variables)),
    }
}

pub fn result_header(graph: BotGraph<'_>) -> Vec<HeaderCell> {
    let variables: Vec<&Variable> = graph.bots().flat_map(|t| t.variables.iter()).collect();
    let mut cells: Vec<HeaderCell> = Vec::new();

    for block in graph.bots().flat_map(|t| t.blocks.iter()) {
        for step in block.steps.iter().filter(|s| s.kind.is_input()) {
            let saved_into = step
                .options
                .variable_id
                .as_deref()
                .and_then(|id| variables.iter().find(|v| v.id == id));
            match saved_into {
                Some(variable) => {
                    let existing = cells
                        .iter_mut()
                        .find(|c| c.variable_id.as_deref() == Some(variable.id.as_str()));
                    match existing {
                        Some(cell) => cell.step_ids.push(step.id.clone()),
                        None => {
                            let label = unique_label(&cells, &variable.name);
                            cells.push(HeaderCell {
                                label,
                                variable_id: Some(variable.id.clone()),
                                step_ids: vec![step.id.clone()],
                            });
                        }
                    }
                }
                None => {
                    let label = unique_label(&cells, &block.title);
                    cells.push(HeaderCell {
                        label,
                        variable_id: None,
                        step_ids: vec![step.id.clone()],
                    });
                }
            }
        }
    }

    for variable in variables {
        if cells
            .iter()
            .any(|c| c.variable_id.as_deref() == Some(variable.id.as_str()))
        {
            continue;
        }
        let label = unique_label(&cells, &variable.name);
        cells.push(HeaderCell {
            label,
            variable_id: Some(variable.id.clone()),
            step_ids: Vec::new(),
        });
    }
    cells
}

pub fn parse_answers(header: &[HeaderCell], values: &ResultValues) -> Map<String, Value> {
    let mut out = Map::new();
    if !values.created_at.is_empty() {
        out.insert(
            "submittedAt".to_string(),
            Value::String(values.created_at.clone()),
        );
    }
    for cell in header {
        let answer = match &cell.variable_id {
            None => values
                .answers
                .iter()
                .find(|a| cell.step_ids.contains(&a.step_id))
                .map(|a| a.content.clone()),
            Some(variable_id) => values
                .answers
                .iter()
                .rev()
                .find(|a| {
                    a.variable_id.as_deref() == Some(variable_id.as_str())
                        || cell.step_ids.contains(&a.step_id)
                })
                .map(|a| a.content.clone())
                .or_else(|| {
                    values
                        .prefilled_variables
                        .iter()
                        .find(|v| &v.id == variable_id)
                        .and_then(|v| v.value.clone())
                }),
        };
        if let Some(answer) = answer {
            out.insert(cell.label.clone(), Value::String(answer));
        }
    }
    out
}

pub fn parse_sample_result(graph: BotGraph<'_>, block_id: &str) -> Map<String, Value> {
    let eligible = eligible_input_steps(graph, block_id);
    let mut out = Map::new();
    for cell in result_header(graph) {
        if let Some(step) = cell
            .step_ids
            .iter()
            .find_map(|id| eligible.get(id.as_str()))
        {
            out.insert(cell.label, Value::String(sample_value(step)));
        }
    }
    out
}

fn eligible_input_steps<'a>(graph: BotGraph<'a>, block_id: &str) -> HashMap<&'a str, &'a Step> {
    let upstream = upstream_blocks(graph.typebot, block_id);
    let root_steps = graph
        .typebot
        .blocks
        .iter()
        .filter(|b| upstream.contains(b.id.as_str()))
        .flat_map(|b| b.steps.iter());
    let linked_steps = graph
        .linked
        .iter()
        .flat_map(|t| t.blocks.iter())
        .flat_map(|b| b.steps.iter());
    root_steps
        .chain(linked_steps)
        .filter(|s| s.kind.is_input())
        .map(|s| (s.id.as_str(), s))
        .collect()
}

fn upstream_blocks<'a>(typebot: &'a Typebot, block_id: &'a str) -> HashSet<&'a str> {
    let mut reached = HashSet::from([block_id]);
    let mut frontier = vec![block_id];
    while let Some(current) = frontier.pop() {
        for edge in typebot.edges.iter().filter(|e| e.to.block_id == current) {
            let from = edge.from.block_id.as_str();
            if reached.insert(from) {
                frontier.push(from);
            }
        }
    }
    reached
}

fn sample_value(step: &Step) -> String {
    let fixed = match step.kind {
        StepType::ChoiceInput if step.options.is_multiple_choice == Some(true) => {
            return step
                .items
                .iter()
                .filter_map(|i| i.content.as_deref())
                .collect::<Vec<_>>()
                .join(", ");
        }
        StepType::ChoiceInput => {
            return step
                .items
                .first()
                .and_then(|i| i.content.clone())
                .unwrap_or_else(|| "Item".to_string());
        }
        StepType::NumberInput => "20",
        StepType::EmailInput => "test@email.com",
        StepType::UrlInput => "https://test.com",
        StepType::DateInput => "2022-01-01",
        StepType::PhoneInput => "+33665566773",
        StepType::PaymentInput => "Payment successful",
        _ => "answer value",
    };
    fixed.to_string()
}

fn unique_label(cells: &[HeaderCell], base: &str) -> String {
    let taken = |label: &str| cells.iter().any(|c| c.label == label);
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base} ({n})"))
        .find(|label| !taken(label))
        .unwrap_or_else(|| base.to_string())
}
