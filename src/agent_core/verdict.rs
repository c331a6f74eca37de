//! Parser for the routing verdict emitted by the decision model.
//!
//! The model is asked for a single JSON object:
//!
//! ```json
//! {"needs_tool": true, "tool_name": "predict_winner",
//!  "arguments": {"team1": "India", "team2": "Australia"},
//!  "needs_direct_response": false, "direct_response": null}
//! ```
//!
//! Models wrap this in prose or code fences often enough that the object is
//! cut out of the surrounding text before parsing. Booleans given as strings
//! are accepted, and a scalar direct response is taken as its text.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::types::Decision;

#[derive(Debug, Default, Deserialize)]
struct RoutingVerdict {
    #[serde(default, deserialize_with = "lenient_bool")]
    needs_tool: bool,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
    #[serde(default, deserialize_with = "lenient_bool")]
    needs_direct_response: bool,
    #[serde(default, deserialize_with = "lenient_text")]
    direct_response: Option<String>,
}

/// Turn raw model output into a [`Decision`].
///
/// A tool verdict wins over a direct one. A verdict asserting neither, or
/// asserting one without its payload, is `Unresolved`.
pub fn parse_verdict(text: &str) -> Result<Decision, String> {
    let json_str = extract_json(text);
    let verdict: RoutingVerdict = serde_json::from_str(json_str)
        .map_err(|e| format!("failed to parse routing verdict JSON: {e}"))?;

    if verdict.needs_tool {
        if let Some(tool_name) = verdict
            .tool_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
        {
            return Ok(Decision::NeedsTool {
                tool_name,
                arguments: normalize_arguments(verdict.arguments),
            });
        }
        tracing::debug!("verdict asked for a tool without naming one");
    }

    if verdict.needs_direct_response {
        if let Some(text) = verdict.direct_response {
            return Ok(Decision::NeedsDirectResponse { text });
        }
        tracing::debug!("verdict asked for a direct response without text");
    }

    Ok(Decision::Unresolved)
}

/// Missing arguments mean `{}`; arguments sent as a JSON-encoded string are
/// decoded. Anything else passes through for schema validation to judge.
fn normalize_arguments(arguments: Option<Value>) -> Value {
    match arguments {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::String(s),
        },
        Some(other) => other,
    }
}

/// Extract JSON from text that may be wrapped in markdown code fences.
fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return &text[start..=end];
            }
        }
    }
    text
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => Ok(s.trim().eq_ignore_ascii_case("true")),
        Value::Number(n) => Ok(n.as_i64().is_some_and(|v| v != 0)),
        _ => Ok(false),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Ok(Some(other.to_string())),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
