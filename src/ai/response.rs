//! Parsing and repair of the backend's reply.
//!
//! Models wrap JSON in code fences often enough that stripping them is
//! part of the contract. A reply that still fails to parse, or is
//! missing a key, substitutes the deterministic fallback: original
//! filename, fixed fallback bucket. Classification failure must never
//! strand a file unprocessed-and-untouched forever.

use serde::Deserialize;

/// Destination for files whose classification could not be validated.
pub const FALLBACK_FOLDER: &str = "/Unprocessed Files";

/// Validated classification answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassificationResult {
    #[serde(rename = "newFilename")]
    pub new_filename: String,
    #[serde(rename = "destinationFolder")]
    pub destination_folder: String,
}

impl ClassificationResult {
    pub fn fallback(original_name: &str) -> Self {
        Self {
            new_filename: original_name.to_string(),
            destination_folder: FALLBACK_FOLDER.to_string(),
        }
    }
}

/// Strip markdown code fences from a model reply, if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and repair the reply into a usable result, falling back to
/// the deterministic substitute when it cannot be validated.
pub fn parse_classification(raw: &str, original_name: &str) -> ClassificationResult {
    let body = strip_code_fences(raw);
    let Ok(mut result) = serde_json::from_str::<ClassificationResult>(body) else {
        return ClassificationResult::fallback(original_name);
    };

    result.new_filename = result.new_filename.trim().to_string();
    result.destination_folder = result.destination_folder.trim().to_string();

    if result.new_filename.is_empty() {
        result.new_filename = original_name.to_string();
    }
    if result.destination_folder.is_empty() {
        return ClassificationResult::fallback(original_name);
    }
    // Repairable shape issues rather than rejection: missing leading
    // slash, stray trailing slash.
    if !result.destination_folder.starts_with('/') {
        result.destination_folder = format!("/{}", result.destination_folder);
    }
    while result.destination_folder.len() > 1 && result.destination_folder.ends_with('/') {
        result.destination_folder.pop();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let result = parse_classification(
            r#"{"newFilename":"invoice-oct.pdf","destinationFolder":"/Finance"}"#,
            "scan.pdf",
        );
        assert_eq!(result.new_filename, "invoice-oct.pdf");
        assert_eq!(result.destination_folder, "/Finance");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"newFilename\":\"a.txt\",\"destinationFolder\":\"/Docs\"}\n```";
        let result = parse_classification(raw, "x.txt");
        assert_eq!(result.new_filename, "a.txt");
        assert_eq!(result.destination_folder, "/Docs");
    }

    #[test]
    fn test_garbage_yields_fallback() {
        let result = parse_classification("I think this is an invoice.", "scan.pdf");
        assert_eq!(result.new_filename, "scan.pdf");
        assert_eq!(result.destination_folder, FALLBACK_FOLDER);
    }

    #[test]
    fn test_missing_key_yields_fallback() {
        let result = parse_classification(r#"{"newFilename":"a.pdf"}"#, "scan.pdf");
        assert_eq!(result, ClassificationResult::fallback("scan.pdf"));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let a = parse_classification("not json", "report.docx");
        let b = parse_classification("also { not json", "report.docx");
        assert_eq!(a, b);
        assert_eq!(a.destination_folder, "/Unprocessed Files");
        assert_eq!(a.new_filename, "report.docx");
    }

    #[test]
    fn test_repairs_missing_leading_slash() {
        let result = parse_classification(
            r#"{"newFilename":"a.pdf","destinationFolder":"Finance/Taxes"}"#,
            "scan.pdf",
        );
        assert_eq!(result.destination_folder, "/Finance/Taxes");
    }

    #[test]
    fn test_repairs_trailing_slash() {
        let result = parse_classification(
            r#"{"newFilename":"a.pdf","destinationFolder":"/Finance/"}"#,
            "scan.pdf",
        );
        assert_eq!(result.destination_folder, "/Finance");
    }

    #[test]
    fn test_empty_filename_keeps_original() {
        let result = parse_classification(
            r#"{"newFilename":"  ","destinationFolder":"/Docs"}"#,
            "scan.pdf",
        );
        assert_eq!(result.new_filename, "scan.pdf");
        assert_eq!(result.destination_folder, "/Docs");
    }

    #[test]
    fn test_strip_fences_without_language_tag() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }
}
