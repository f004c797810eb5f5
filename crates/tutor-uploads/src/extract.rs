use crate::types::UploadError;

const CHARS_PER_TOKEN: usize = 4;

/// Approximate, provider-agnostic token estimate — kept independent of
/// `tutor-llm` so this crate has no provider dependency.
pub fn estimate_tokens(text: &str) -> usize {
    std::cmp::max(1, text.chars().count() / CHARS_PER_TOKEN)
}

fn normalise_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Decodes arbitrary bytes into text via the fallback chain `{utf-8, utf-16,
/// latin-1, utf-8-with-replacement}`.
fn decode_text_bytes(content: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(content) {
        return text.to_string();
    }

    let (utf16, _, had_errors) = encoding_rs::UTF_16LE.decode(content);
    if !had_errors {
        return utf16.into_owned();
    }

    let (latin1, _, had_errors) = encoding_rs::WINDOWS_1252.decode(content);
    if !had_errors {
        return latin1.into_owned();
    }

    String::from_utf8_lossy(content).into_owned()
}

fn extract_pdf_text(content: &[u8]) -> Result<String, UploadError> {
    pdf_extract::extract_text_from_mem(content)
        .map_err(|e| UploadError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))
}

fn extract_ipynb_text(content: &[u8]) -> Result<String, UploadError> {
    let notebook_text = decode_text_bytes(content);
    let parsed: serde_json::Value = serde_json::from_str(&notebook_text)
        .map_err(|e| UploadError::InvalidNotebook(e.to_string()))?;

    let cells = parsed.get("cells").and_then(|c| c.as_array()).cloned().unwrap_or_default();
    let parts: Vec<String> = cells
        .iter()
        .filter_map(|cell| {
            let source = cell.get("source")?;
            let text = if let Some(lines) = source.as_array() {
                lines.iter().filter_map(|l| l.as_str()).collect::<Vec<_>>().join("")
            } else {
                source.as_str().unwrap_or_default().to_string()
            };
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect();
    Ok(parts.join("\n\n"))
}

/// Extracts document text: PDFs via a streaming page
/// extractor, notebooks by concatenating cell sources, everything else
/// through the fallback decoding chain.
pub fn extract_document_text(filename: &str, content: &[u8]) -> Result<String, UploadError> {
    let extension = normalise_extension(filename);
    let extracted = match extension.as_str() {
        "pdf" => extract_pdf_text(content)?,
        "ipynb" => extract_ipynb_text(content)?,
        _ => decode_text_bytes(content),
    };
    Ok(extracted.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_floors_at_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"a".repeat(40)), 10);
    }

    #[test]
    fn decodes_plain_utf8() {
        assert_eq!(decode_text_bytes(b"hello world"), "hello world");
    }

    #[test]
    fn extracts_notebook_cell_sources() {
        let notebook = r#"{"cells":[{"cell_type":"code","source":["print(1)\n","print(2)"]},{"cell_type":"markdown","source":"# Title"}]}"#;
        let text = extract_document_text("notes.ipynb", notebook.as_bytes()).unwrap();
        assert!(text.contains("print(1)"));
        assert!(text.contains("# Title"));
    }

    #[test]
    fn invalid_notebook_json_is_rejected() {
        assert!(extract_document_text("notes.ipynb", b"not json").is_err());
    }

    #[test]
    fn plain_text_file_round_trips() {
        let text = extract_document_text("notes.txt", b"hello\nworld").unwrap();
        assert_eq!(text, "hello\nworld");
    }
}
