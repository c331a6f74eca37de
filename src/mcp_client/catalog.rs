//! Capability catalog: the tool descriptors discovered from one peer session.
//!
//! Provides:
//! - Exact-name lookup (no fuzzy matching)
//! - Structural argument validation against each tool's input schema
//! - Rendering of the catalog for the decision prompt
//!
//! A catalog is only valid for the session that produced it; it is rebuilt
//! wholesale on every refresh.

use std::collections::HashMap;

use super::errors::McpError;
use super::types::McpToolDefinition;

// ─── ToolCatalog ─────────────────────────────────────────────────────────────

/// Snapshot of the peer's tools, in the order the peer listed them.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<McpToolDefinition>,
    /// `tool_name → index into tools`.
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a `tools/list` reply.
    ///
    /// A name listed twice keeps its first descriptor.
    pub fn from_tools(tools: Vec<McpToolDefinition>) -> Self {
        let mut catalog = Self::new();
        for tool in tools {
            if catalog.index.contains_key(&tool.name) {
                tracing::warn!(tool = %tool.name, "peer listed duplicate tool name; keeping first");
                continue;
            }
            catalog.index.insert(tool.name.clone(), catalog.tools.len());
            catalog.tools.push(tool);
        }
        catalog
    }

    /// Look up a tool by exact name.
    pub fn resolve(&self, name: &str) -> Option<&McpToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tool names, in discovery order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate that arguments are structurally valid for a tool.
    ///
    /// Checks that `arguments` is an object and carries every `required`
    /// property. Full JSON Schema validation is left to the peer.
    pub fn validate_arguments(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<(), McpError> {
        let def = self.resolve(tool_name).ok_or(McpError::UnknownTool {
            name: tool_name.to_string(),
        })?;

        let Some(args_obj) = arguments.as_object() else {
            return Err(McpError::InvalidArguments {
                tool: tool_name.to_string(),
                reason: format!("arguments must be an object, got {arguments}"),
            });
        };

        let required = def
            .input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|f| f.as_str()).collect::<Vec<_>>())
            .unwrap_or_default();

        for field_name in required {
            if !args_obj.contains_key(field_name) {
                return Err(McpError::InvalidArguments {
                    tool: tool_name.to_string(),
                    reason: format!("missing required field: '{field_name}'"),
                });
            }
        }

        Ok(())
    }

    /// Render the catalog for inclusion in the decision prompt.
    ///
    /// One line per tool: `- name(arg*, opt): description`, where `*` marks
    /// a required argument.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No tools are currently available.".to_string();
        }

        self.tools
            .iter()
            .map(|tool| {
                let required: Vec<&str> = tool
                    .input_schema
                    .get("required")
                    .and_then(|r| r.as_array())
                    .map(|arr| arr.iter().filter_map(|f| f.as_str()).collect())
                    .unwrap_or_default();

                let args: Vec<String> = tool
                    .input_schema
                    .get("properties")
                    .and_then(|p| p.as_object())
                    .map(|props| {
                        props
                            .keys()
                            .map(|k| {
                                if required.contains(&k.as_str()) {
                                    format!("{k}*")
                                } else {
                                    k.clone()
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let description = tool.description.lines().next().unwrap_or("").trim();
                format!("- {}({}): {description}", tool.name, args.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool(name: &str, required: &[&str]) -> McpToolDefinition {
        let properties: serde_json::Map<String, serde_json::Value> = required
            .iter()
            .map(|r| (r.to_string(), serde_json::json!({"type": "string"})))
            .collect();
        McpToolDefinition {
            name: name.to_string(),
            description: format!("Test tool: {name}"),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    #[test]
    fn test_resolve_is_exact() {
        let catalog = ToolCatalog::from_tools(vec![sample_tool("predict_winner", &[])]);
        assert!(catalog.resolve("predict_winner").is_some());
        assert!(catalog.resolve("Predict_Winner").is_none());
        assert!(catalog.resolve("predict").is_none());
    }

    #[test]
    fn test_discovery_order_preserved() {
        let catalog = ToolCatalog::from_tools(vec![
            sample_tool("zeta", &[]),
            sample_tool("alpha", &[]),
        ]);
        assert_eq!(catalog.tool_names(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let mut second = sample_tool("dup", &[]);
        second.description = "second".into();
        let catalog = ToolCatalog::from_tools(vec![sample_tool("dup", &[]), second]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.resolve("dup").unwrap().description, "Test tool: dup");
    }

    #[test]
    fn test_validate_arguments_ok() {
        let catalog =
            ToolCatalog::from_tools(vec![sample_tool("predict_winner", &["team1", "team2"])]);
        let args = serde_json::json!({"team1": "India", "team2": "Australia"});
        assert!(catalog.validate_arguments("predict_winner", &args).is_ok());
    }

    #[test]
    fn test_validate_arguments_missing_required() {
        let catalog =
            ToolCatalog::from_tools(vec![sample_tool("predict_winner", &["team1", "team2"])]);
        let args = serde_json::json!({"team1": "India"});
        let err = catalog.validate_arguments("predict_winner", &args).unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { .. }));
        assert!(err.to_string().contains("team2"));
    }

    #[test]
    fn test_validate_arguments_not_an_object() {
        let catalog = ToolCatalog::from_tools(vec![sample_tool("ping", &[])]);
        let err = catalog
            .validate_arguments("ping", &serde_json::json!("x"))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { .. }));
    }

    #[test]
    fn test_validate_arguments_unknown_tool() {
        let catalog = ToolCatalog::new();
        let err = catalog
            .validate_arguments("nonexistent", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }

    #[test]
    fn test_summary_marks_required_args() {
        let catalog = ToolCatalog::from_tools(vec![sample_tool("get_player_stats", &["player_name"])]);
        let summary = catalog.summary();
        assert_eq!(
            summary,
            "- get_player_stats(player_name*): Test tool: get_player_stats"
        );
    }

    #[test]
    fn test_summary_empty() {
        assert_eq!(ToolCatalog::new().summary(), "No tools are currently available.");
    }
}
