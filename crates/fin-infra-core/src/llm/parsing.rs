//! JSON extraction from model output
//!
//! Even with a response schema, models sometimes wrap the JSON object in
//! prose or markdown fences. These helpers pull out the outermost object.

use serde_json::Value;

use crate::error::{Error, Result};

/// Longest raw snippet quoted in error messages
const MAX_SNIPPET: usize = 200;

fn snippet(s: &str) -> String {
    if s.chars().count() > MAX_SNIPPET {
        format!("{}...", s.chars().take(MAX_SNIPPET).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Extract the outermost JSON object from a model response
pub fn extract_json_object(response: &str) -> Result<Value> {
    let response = response.trim();
    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            let value: Value = serde_json::from_str(json_str).map_err(|e| {
                Error::InvalidData(format!(
                    "Invalid JSON from LLM: {} | Raw: {}",
                    e,
                    snippet(json_str)
                ))
            })?;
            if value.is_object() {
                Ok(value)
            } else {
                Err(Error::InvalidData(format!(
                    "LLM response is not a JSON object | Raw: {}",
                    snippet(json_str)
                )))
            }
        }
        _ => Err(Error::InvalidData(format!(
            "No JSON found in LLM response | Raw: {}",
            snippet(response)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        let value = extract_json_object(r#"{"canonical_name": "netflix", "confidence": 0.9}"#)
            .unwrap();
        assert_eq!(value["canonical_name"], "netflix");
    }

    #[test]
    fn test_extract_fenced_object() {
        let response = "Here you go:\n```json\n{\"is_recurring\": true, \"nested\": {\"a\": 1}}\n```";
        let value = extract_json_object(response).unwrap();
        assert_eq!(value["is_recurring"], true);
        assert_eq!(value["nested"]["a"], 1);
    }

    #[test]
    fn test_no_json() {
        let err = extract_json_object("I cannot help with that").unwrap_err();
        assert!(err.to_string().contains("No JSON found"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(extract_json_object("{not json}").is_err());
    }

    #[test]
    fn test_long_snippet_truncated() {
        let long = "x".repeat(500);
        let err = extract_json_object(&long).unwrap_err().to_string();
        assert!(err.ends_with("..."));
        assert!(err.len() < 300);
    }
}
