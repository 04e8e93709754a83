//! The set of tools the service advertises, keyed by bare name.

use convoforge_core::{ForgeError, ForgeResult, ToolDescriptor};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: IndexMap<String, ToolDescriptor>,
}

impl ToolCatalog {
    /// Decode a `tools/list` result (`{ tools: [{ name, description, inputSchema }] }`).
    ///
    /// Names carrying `prefix` are stored without it. Entries without a name
    /// are skipped.
    pub fn from_list_result(result: &Value, prefix: &str) -> ForgeResult<Self> {
        let entries = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| ForgeError::Decode("tools/list result has no tools array".into()))?;

        let mut tools = IndexMap::with_capacity(entries.len());
        for entry in entries {
            let raw_name = entry.get("name").and_then(Value::as_str).unwrap_or("");
            let name = strip_prefix(raw_name, prefix);
            if name.is_empty() {
                warn!(entry = %entry, "Skipping catalog entry without a name");
                continue;
            }
            let descriptor = ToolDescriptor {
                name: name.to_string(),
                description: entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                parameters: entry
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| json!({})),
            };
            debug!(tool = %descriptor.name, "Catalog tool");
            tools.insert(descriptor.name.clone(), descriptor);
        }
        Ok(Self { tools })
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn available_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn tool_info(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn all_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.values().cloned().collect()
    }

    /// OpenAI-style function schemas with `prefix` in front of every name.
    pub fn function_schemas(&self, prefix: &str) -> Vec<Value> {
        self.tools
            .values()
            .map(|t| t.function_schema(prefix))
            .collect()
    }
}

/// `name` without `prefix`, or unchanged if it does not carry it.
pub fn strip_prefix<'a>(name: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return name;
    }
    name.strip_prefix(prefix).unwrap_or(name)
}
