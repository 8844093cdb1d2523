//! Turn raw tool-call content into text the model can read.

use serde_json::{Map, Value};
use tether_types::ellipsize;

/// Arrays shorter than this made only of primitives print on one line.
const COMPACT_ARRAY_LIMIT: usize = 10;
/// Listing entries shown before the `... and N more` line.
const DIGEST_ITEMS: usize = 10;

const TOTAL_KEYS: [&str; 3] = ["total_count", "totalCount", "total"];
const LABEL_KEYS: [&str; 5] = ["full_name", "name", "title", "login", "id"];

/// Normalize a tool result. `None` means the server sent no content at all.
pub fn format_tool_response(raw: Option<&Value>) -> String {
    match raw {
        None => "undefined".to_string(),
        Some(value) => format_value(value),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) if is_content_list(items) => format_content_list(items),
        Value::Array(items) if items.len() < COMPACT_ARRAY_LIMIT && items.iter().all(is_primitive) => {
            value.to_string()
        }
        Value::Object(map) => match listing(map) {
            Some((total, items)) => format_listing(total, items),
            None => pretty(value),
        },
        Value::Array(_) => pretty(value),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn is_primitive(value: &Value) -> bool {
    !(value.is_array() || value.is_object())
}

/// MCP `content`: a non-empty list of `{type: ...}` items with known types.
fn is_content_list(items: &[Value]) -> bool {
    !items.is_empty()
        && items.iter().all(|item| {
            matches!(
                item.get("type").and_then(Value::as_str),
                Some("text") if item.get("text").is_some_and(Value::is_string)
            ) || matches!(
                item.get("type").and_then(Value::as_str),
                Some("image" | "audio" | "resource" | "resource_link")
            )
        })
}

fn format_content_list(items: &[Value]) -> String {
    items
        .iter()
        .map(format_content_item)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_content_item(item: &Value) -> String {
    let field = |key: &str| item.get(key).and_then(Value::as_str).unwrap_or_default();
    match field("type") {
        "text" => {
            let text = field("text");
            // JSON payloads wrapped in text get the same treatment as bare ones.
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(parsed) if parsed.is_object() || parsed.is_array() => format_value(&parsed),
                _ => text.to_string(),
            }
        }
        "image" => format!("[image: {}]", field("mimeType")),
        "audio" => format!("[audio: {}]", field("mimeType")),
        "resource" => {
            let resource = item.get("resource");
            let text = resource.and_then(|r| r.get("text")).and_then(Value::as_str);
            let uri = resource.and_then(|r| r.get("uri")).and_then(Value::as_str);
            match (text, uri) {
                (Some(text), _) => text.to_string(),
                (None, Some(uri)) => format!("[resource: {uri}]"),
                (None, None) => "[resource]".to_string(),
            }
        }
        _ => format!("[resource: {}]", field("uri")),
    }
}

fn listing(map: &Map<String, Value>) -> Option<(u64, &[Value])> {
    let total = TOTAL_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_u64))?;
    let items = map.get("items")?.as_array()?;
    Some((total, items))
}

fn format_listing(total: u64, items: &[Value]) -> String {
    let mut out = format!("Found {total} results:");
    for (i, item) in items.iter().take(DIGEST_ITEMS).enumerate() {
        out.push_str(&format!("\n{}. {}", i + 1, item_summary(item)));
    }
    let shown = items.len().min(DIGEST_ITEMS) as u64;
    let remaining = total.max(items.len() as u64).saturating_sub(shown);
    if remaining > 0 {
        out.push_str(&format!("\n... and {remaining} more"));
    }
    out
}

fn item_summary(item: &Value) -> String {
    let Value::Object(map) = item else {
        return format_value(item);
    };

    let label = LABEL_KEYS.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });

    let description = map
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty());

    match (label, description) {
        (Some(label), Some(description)) => format!("{label} - {}", ellipsize(description, 120)),
        (Some(label), None) => label,
        (None, _) => ellipsize(&item.to_string(), 120),
    }
}
