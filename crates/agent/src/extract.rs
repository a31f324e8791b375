//! Pulls a JSON object out of free-form model text.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::llm::ModelError;

/// Removes Markdown code fences such as ```` ```json ````.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```JSON", "").replace("```", "").trim().to_string()
}

/// First balanced `{...}` span, honouring string literals and escapes.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
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
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

pub fn extract_json(text: &str) -> Result<Value, ModelError> {
    let cleaned = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(value);
    }

    let candidate = first_json_object(&cleaned)
        .ok_or_else(|| ModelError::Malformed("no JSON object found in model text".to_string()))?;
    serde_json::from_str(candidate)
        .map_err(|error| ModelError::Malformed(format!("model JSON did not parse: {error}")))
}

pub fn extract_as<T>(text: &str) -> Result<T, ModelError>
where
    T: DeserializeOwned,
{
    let value = extract_json(text)?;
    serde_json::from_value(value)
        .map_err(|error| ModelError::Malformed(format!("model JSON had unexpected shape: {error}")))
}
