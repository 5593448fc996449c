use crate::domain::contract::LlmNarrative;
use crate::domain::narrative::Narrative;
use anyhow::Context;
use chrono::{DateTime, Utc};

/// Pulls the JSON object out of a model reply.
///
/// A fenced block anywhere in the reply wins; otherwise the first balanced `{...}` is taken.
/// Braces inside string literals do not count toward the balance.
pub fn extract_json(text: &str) -> Option<&str> {
    let body = fenced_block(text).unwrap_or(text);
    first_object(body)
}

fn fenced_block(text: &str) -> Option<&str> {
    let (_, after_open) = text.split_once("```")?;
    // Skip the info string (`json`, `JSON`, nothing) up to the end of the fence line.
    let (_, inner) = after_open.split_once('\n')?;
    let end = inner.find("```").unwrap_or(inner.len());
    Some(inner[..end].trim())
}

fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_narrative(text: &str, generated_at: DateTime<Utc>) -> anyhow::Result<Narrative> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim());
    let parsed = serde_json::from_str::<LlmNarrative>(json_str)
        .with_context(|| format!("narrative output is not valid JSON for the schema: {json_str}"))?;
    parsed.validate_and_into_narrative(generated_at)
}
