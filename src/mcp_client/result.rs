//! Tool reply decoding and normalization to plain text.
//!
//! A `tools/call` reply is decoded once into [`ToolReply`], in fixed
//! precedence: structured `result` field, then the first textual content
//! block, then the raw value itself.

/// A tool reply, classified by the shape that will supply its text.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReply {
    /// `structuredContent` object carrying a `result` field.
    Structured(serde_json::Value),
    /// Text of the first content block that has one.
    Text(String),
    /// Anything else; rendered as its textual form.
    Opaque(serde_json::Value),
}

impl ToolReply {
    /// Classify a raw reply. Each field is inspected on its own, so a
    /// malformed `content` does not hide a usable `structuredContent`.
    pub fn decode(raw: &serde_json::Value) -> Self {
        if let Some(result) = raw
            .get("structuredContent")
            .and_then(|v| v.as_object())
            .and_then(|map| map.get("result"))
        {
            return ToolReply::Structured(result.clone());
        }

        if let Some(text) = raw
            .get("content")
            .and_then(|v| v.as_array())
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find_map(|block| block.get("text").and_then(|t| t.as_str()))
            })
        {
            return ToolReply::Text(text.to_string());
        }

        ToolReply::Opaque(raw.clone())
    }

    /// Render the reply as plain text. Never fails.
    pub fn into_text(self) -> String {
        match self {
            ToolReply::Text(text) => text,
            ToolReply::Structured(value) | ToolReply::Opaque(value) => value_to_text(value),
        }
    }
}

/// Whether the peer flagged the reply as a tool-side failure.
pub fn is_error_reply(raw: &serde_json::Value) -> bool {
    raw.get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Normalize a raw tool reply to plain text.
pub fn normalize(raw: &serde_json::Value) -> String {
    ToolReply::decode(raw).into_text()
}

fn value_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_result_preferred() {
        let raw = json!({
            "structuredContent": {"result": "X"},
            "content": [{"type": "text", "text": "Y"}]
        });
        assert_eq!(normalize(&raw), "X");
    }

    #[test]
    fn test_first_text_block() {
        let raw = json!({"content": [{"text": "Y"}]});
        assert_eq!(normalize(&raw), "Y");
    }

    #[test]
    fn test_opaque_number() {
        assert_eq!(normalize(&json!(42)), "42");
    }

    #[test]
    fn test_plain_string_passes_through() {
        assert_eq!(normalize(&json!("already text")), "already text");
    }

    #[test]
    fn test_structured_without_result_falls_through_to_content() {
        let raw = json!({
            "structuredContent": {"winner": "India"},
            "content": [{"type": "text", "text": "Predicted winner: India"}]
        });
        assert_eq!(normalize(&raw), "Predicted winner: India");
    }

    #[test]
    fn test_non_string_structured_result_is_json_text() {
        let raw = json!({"structuredContent": {"result": {"runs": 1200}}});
        assert_eq!(normalize(&raw), r#"{"runs":1200}"#);
    }

    #[test]
    fn test_empty_content_list_is_opaque() {
        let raw = json!({"content": []});
        assert_eq!(
            ToolReply::decode(&raw),
            ToolReply::Opaque(json!({"content": []}))
        );
        assert_eq!(normalize(&raw), r#"{"content":[]}"#);
    }

    #[test]
    fn test_skips_non_text_blocks() {
        let raw = json!({"content": [
            {"type": "image", "data": "...", "mimeType": "image/png"},
            {"type": "text", "text": "caption"}
        ]});
        assert_eq!(normalize(&raw), "caption");
    }

    #[test]
    fn test_malformed_content_is_opaque() {
        let raw = json!({"content": "not a list"});
        assert_eq!(normalize(&raw), r#"{"content":"not a list"}"#);
    }

    #[test]
    fn test_is_error_reply() {
        assert!(is_error_reply(&json!({"isError": true, "content": []})));
        assert!(!is_error_reply(&json!({"content": []})));
        assert!(!is_error_reply(&json!(42)));
    }
}
