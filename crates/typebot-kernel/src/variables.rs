use std::sync::OnceLock;

use regex::{Captures, Regex};
use typebot_contracts::Variable;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("valid reference pattern"))
}

/// Substitutes `{{name}}` references with the bound values.
///
/// A known variable without a value becomes the empty string. Unknown names
/// stay in the text as written.
pub fn resolve_variables(text: &str, variables: &[Variable]) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    reference_pattern()
        .replace_all(text, |caps: &Captures| {
            let name = caps[1].trim();
            match variables.iter().find(|v| v.name == name) {
                Some(v) => v.value.clone().unwrap_or_default(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
