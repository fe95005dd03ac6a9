//! Prompt and response handling for LLM entity extraction.
//!
//! The model is asked for a JSON object grouping entities by category; the
//! categories are flattened into a single `Vec<Entity>` whose `type` is the
//! singular category name.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use intake_core::{Entity, Error, Result};

/// System prompt for entity extraction.
pub const ENTITY_SYSTEM_PROMPT: &str =
    "You are a document analyst. Extract entities accurately and return valid JSON.";

/// Build the user prompt for a (possibly truncated) document text.
pub fn entity_prompt(text: &str) -> String {
    format!(
        "Extract all entities from this document. Return a JSON object with:\n\
         - \"people\": list of people with {{name, role, description}}\n\
         - \"organizations\": list of organizations with {{name, type, description}}\n\
         - \"locations\": list of locations with {{name, description}}\n\
         - \"dates\": list of important dates with {{date, event, description}}\n\n\
         Return ONLY valid JSON, no other text.\n\n\
         Document text:\n{}",
        text
    )
}

/// Truncate to at most `limit` characters on a char boundary.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Default, Deserialize)]
struct EntityGroups {
    #[serde(default)]
    people: Vec<JsonValue>,
    #[serde(default)]
    organizations: Vec<JsonValue>,
    #[serde(default)]
    locations: Vec<JsonValue>,
    #[serde(default)]
    dates: Vec<JsonValue>,
}

/// Strip a surrounding markdown code fence, if present.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// First non-empty string among the given keys.
fn field(item: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| item.get(key).and_then(JsonValue::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn flatten(
    out: &mut Vec<Entity>,
    items: &[JsonValue],
    entity_type: &str,
    name_key: &str,
    description_keys: &[&str],
) {
    for item in items {
        // Models occasionally answer with bare strings instead of objects.
        let (name, description) = match item {
            JsonValue::String(s) if !s.trim().is_empty() => (s.trim().to_string(), None),
            JsonValue::Object(_) => match field(item, &[name_key]) {
                Some(name) => (name, field(item, description_keys)),
                None => continue,
            },
            _ => continue,
        };
        out.push(Entity {
            name,
            entity_type: entity_type.to_string(),
            description,
        });
    }
}

/// Parse the model's JSON answer into a flat entity list.
pub fn parse_entity_response(content: &str) -> Result<Vec<Entity>> {
    let groups: EntityGroups = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| Error::Inference(format!("Invalid entity JSON: {}", e)))?;

    let mut entities = Vec::new();
    flatten(&mut entities, &groups.people, "person", "name", &["description", "role"]);
    flatten(
        &mut entities,
        &groups.organizations,
        "organization",
        "name",
        &["description", "type"],
    );
    flatten(&mut entities, &groups.locations, "location", "name", &["description"]);
    flatten(&mut entities, &groups.dates, "date", "date", &["event", "description"]);
    Ok(entities)
}
