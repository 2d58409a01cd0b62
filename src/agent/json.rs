//! Lenient extraction of JSON from model output.

use serde::de::DeserializeOwned;

use crate::error::AgentError;

/// Strips markdown code fences and surrounding prose around a JSON value.
#[must_use]
pub fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();

    let unfenced = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    if unfenced.starts_with('{') || unfenced.starts_with('[') {
        return unfenced;
    }

    // Prose around a JSON object: take the outermost braces.
    match (unfenced.find(['{', '[']), unfenced.rfind(['}', ']'])) {
        (Some(start), Some(end)) if end > start => &unfenced[start..=end],
        _ => unfenced,
    }
}

/// Parses model output as `T`, tolerating fences and surrounding prose.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] with a short preview on failure.
pub fn parse_lenient<T: DeserializeOwned>(content: &str, what: &str) -> Result<T, AgentError> {
    let json_str = extract_json(content);
    serde_json::from_str::<T>(json_str).map_err(|e| {
        let preview: String = json_str.chars().take(200).collect();
        AgentError::ResponseParse {
            message: format!("Failed to parse {what}: {e}. Preview: {preview:?}"),
            content: content.to_string(),
        }
    })
}
