use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static CDT_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"D[0-9]{4}").expect("CDT code pattern is valid"));

/// Pull CDT codes out of a model response.
///
/// Prefers a JSON object with a `cdt_codes` array of `{"code": ...}` entries.
/// Anything else (prose, malformed JSON, a missing key) is scanned for
/// `D` + four digits. Codes come back unique, in first-occurrence order.
pub fn extract_codes(content: &str) -> Vec<String> {
    match codes_from_json(content) {
        Some(codes) => dedup_preserving_order(codes),
        None => dedup_preserving_order(
            CDT_CODE
                .find_iter(content)
                .map(|m| m.as_str().to_string()),
        ),
    }
}

/// `None` when the content is not a JSON object carrying a `cdt_codes` array.
fn codes_from_json(content: &str) -> Option<Vec<String>> {
    let parsed: Value = serde_json::from_str(content.trim()).ok()?;
    let entries = parsed.get("cdt_codes")?.as_array()?;

    let codes = entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(obj) => obj.get("code").and_then(code_to_string),
            other => code_to_string(other),
        })
        .collect();

    Some(codes)
}

fn code_to_string(value: &Value) -> Option<String> {
    let code = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match code.is_empty() || code == "N/A" {
        true => None,
        false => Some(code),
    }
}

fn dedup_preserving_order(codes: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .into_iter()
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_duplicates_collapsed_in_order() {
        let content = r#"{"cdt_codes": [
            {"code": "D0120", "description": "Periodic oral evaluation", "confidence": "high"},
            {"code": "D0120", "description": "Periodic oral evaluation", "confidence": "high"},
            {"code": "D1110", "description": "Prophylaxis - adult", "confidence": "high"}
        ], "explanation": "Routine visit"}"#;
        assert_eq!(extract_codes(content), vec!["D0120", "D1110"]);
    }

    #[test]
    fn test_json_codes_trimmed_and_blank_skipped() {
        let content = r#"{"cdt_codes": [{"code": " D2331 "}, {"code": ""}, {"description": "no code"}, {"code": "N/A"}]}"#;
        assert_eq!(extract_codes(content), vec!["D2331"]);
    }

    #[test]
    fn test_json_order_is_array_order() {
        let content = r#"{"cdt_codes": [{"code": "D2954"}, {"code": "D2750"}]}"#;
        assert_eq!(extract_codes(content), vec!["D2954", "D2750"]);
    }

    #[test]
    fn test_json_explanation_codes_ignored() {
        // Codes mentioned only in the explanation are not answers.
        let content = r#"{"cdt_codes": [{"code": "D7140"}], "explanation": "Not D7210 since the tooth was erupted"}"#;
        assert_eq!(extract_codes(content), vec!["D7140"]);
    }

    #[test]
    fn test_json_empty_array_is_empty() {
        assert!(extract_codes(r#"{"cdt_codes": []}"#).is_empty());
    }

    #[test]
    fn test_text_fallback_dedups() {
        let content = "The limited exam maps to D0140 and D0140 again for the follow-up.";
        assert_eq!(extract_codes(content), vec!["D0140"]);
    }

    #[test]
    fn test_missing_key_falls_back_to_text() {
        let content = r#"{"codes": ["D1206", "D1330"]}"#;
        assert_eq!(extract_codes(content), vec!["D1206", "D1330"]);
    }

    #[test]
    fn test_malformed_json_falls_back_to_text() {
        let content = r#"{"cdt_codes": [{"code": "D4341"}, {"code": "D4355""#;
        assert_eq!(extract_codes(content), vec!["D4341", "D4355"]);
    }

    #[test]
    fn test_no_matches_is_empty_not_error() {
        assert!(extract_codes("I am not sure which procedure this is.").is_empty());
        assert!(extract_codes("").is_empty());
        assert!(extract_codes("d0120 is lowercase").is_empty());
    }
}
