//! Detection of tool-invocation markup in finished responses
//!
//! Runs only after a stream completes, never on partial text, so split
//! markup cannot cause a false positive. Detection is all this module
//! does; invocation belongs to the caller.

use std::collections::HashSet;

/// Tool tags look like `<tool:name ...>`.
pub const TOOL_TAG_PREFIX: &str = "tool:";

/// The set of tool names a session accepts, supplied by the embedding
/// application.
pub trait ToolRegistry: Send + Sync {
    fn is_known_tool(&self, name: &str) -> bool;
}

/// Registry over a fixed name set.
#[derive(Debug, Default, Clone)]
pub struct StaticToolRegistry {
    names: HashSet<String>,
}

impl StaticToolRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToolRegistry for StaticToolRegistry {
    fn is_known_tool(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// True when `content` contains at least one tag naming a registered tool.
/// Unknown tool names and stray angle brackets are ignored.
pub fn has_tool_calls(content: &str, registry: &dyn ToolRegistry) -> bool {
    let mut rest = content;
    while let Some(pos) = rest.find('<') {
        rest = &rest[pos + 1..];
        if let Some(after_prefix) = rest.strip_prefix(TOOL_TAG_PREFIX) {
            let name_end = after_prefix
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
                .unwrap_or(after_prefix.len());
            let name = &after_prefix[..name_end];
            if !name.is_empty() && registry.is_known_tool(name) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StaticToolRegistry {
        StaticToolRegistry::new(["read_files", "execute_command"])
    }

    #[test]
    fn detects_registered_tool_tag() {
        let content = "Let me check.\n<tool:read_files>\n<param:path>src/main.rs</param:path>\n</tool:read_files>";
        assert!(has_tool_calls(content, &registry()));
    }

    #[test]
    fn ignores_unregistered_tool_name() {
        assert!(!has_tool_calls("<tool:make_coffee>", &registry()));
    }

    #[test]
    fn ignores_plain_text_and_stray_brackets() {
        assert!(!has_tool_calls("a < b, and <em>markup</em>", &registry()));
        assert!(!has_tool_calls("mentioning tool: read_files in prose", &registry()));
    }

    #[test]
    fn prefix_without_name_does_not_match() {
        assert!(!has_tool_calls("dangling <tool: bracket", &registry()));
    }

    #[test]
    fn finds_tag_after_unknown_one() {
        let content = "<tool:unknown> then <tool:execute_command>";
        assert!(has_tool_calls(content, &registry()));
    }
}
