/// System prompt for file classification.
pub const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are a filing assistant. You are given one file and a list of existing destination folders. Decide what the file should be called and where it belongs.

RULES:
1. Suggest a concise, human-friendly filename. Keep the original file extension.
2. NEVER invent a date. Only include a date if one is clearly present in the file content itself.
3. Choose exactly ONE destination folder from the supplied list. Do not invent folders that are not in the list.
4. Reply with minified JSON containing exactly two keys: "newFilename" and "destinationFolder".
5. The destinationFolder value must be one of the supplied paths, verbatim.
6. No explanation, no markdown, no code fences. JSON only.

EXAMPLE REPLY:
{"newFilename":"insurance-policy-2024.pdf","destinationFolder":"/Finance/Insurance"}"#;

/// Build the per-file user prompt: file name plus the folder list the
/// model must choose from.
pub fn build_classification_prompt(file_name: &str, folders: &[String]) -> String {
    let mut prompt = format!(
        "Classify the attached file.\n\nORIGINAL FILENAME: {}\n\nAVAILABLE DESTINATION FOLDERS:\n",
        file_name
    );
    for folder in folders {
        prompt.push_str(folder);
        prompt.push('\n');
    }
    prompt.push_str(
        "\nReply with minified JSON: {\"newFilename\":\"...\",\"destinationFolder\":\"...\"}",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_folders() {
        let folders = vec!["/Finance".to_string(), "/Finance/Taxes".to_string()];
        let prompt = build_classification_prompt("scan001.pdf", &folders);
        assert!(prompt.contains("scan001.pdf"));
        assert!(prompt.contains("/Finance\n"));
        assert!(prompt.contains("/Finance/Taxes\n"));
        assert!(prompt.contains("newFilename"));
    }
}
