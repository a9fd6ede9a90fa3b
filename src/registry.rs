//! Tool Registry.
//!
//! Holds name → `{schema, handler, enabled}` bindings so the executor and
//! protocol layer can look tools up by name and list only the enabled
//! ones.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ServerError;
use crate::schema::Schema;

/// A tool handler: takes validated raw arguments, returns content or a
/// domain error. Boxed and pinned so the registry can store heterogeneous
/// async closures behind one type.
pub type ToolHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, ServerError>> + Send>> + Send + Sync,
>;

/// One registered tool.
#[derive(Clone)]
pub struct ToolEntry {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description, surfaced in `tools/list`.
    pub description: String,
    /// Argument schema, driving validation and the listed JSON Schema.
    pub schema: Schema,
    /// The handler invoked by the executor on a validated call.
    pub handler: ToolHandler,
    /// Whether this tool is currently callable.
    pub enabled: bool,
}

/// A listing entry, as emitted by `tools/list`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolListing {
    /// Tool name.
    pub name: String,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema fragment for the tool's arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Name → `ToolEntry` map with enable/disable and listing.
#[derive(Default)]
pub struct ToolRegistry {
    entries: HashMap<String, ToolEntry>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers a new tool.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidArguments`] wrapping an
    /// "already registered" message if `name` is already taken — mirrors
    /// the taxonomy's closed set rather than inventing a new kind for a
    /// startup-only condition.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Schema,
        handler: ToolHandler,
    ) -> Result<(), ServerError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(ServerError::InvalidArguments {
                tool: name.clone(),
                message: format!("tool '{name}' is already registered"),
            });
        }

        self.entries.insert(
            name.clone(),
            ToolEntry {
                name,
                description: description.into(),
                schema,
                handler,
                enabled: true,
            },
        );
        Ok(())
    }

    /// Removes a tool entirely.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ToolNotFound`] if `name` is absent.
    pub fn unregister(&mut self, name: &str) -> Result<(), ServerError> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ServerError::ToolNotFound { name: name.to_string() })
    }

    /// Enables a registered tool.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ToolNotFound`] if `name` is absent.
    pub fn enable(&mut self, name: &str) -> Result<(), ServerError> {
        self.set_enabled(name, true)
    }

    /// Disables a registered tool without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ToolNotFound`] if `name` is absent.
    pub fn disable(&mut self, name: &str) -> Result<(), ServerError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ServerError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ServerError::ToolNotFound { name: name.to_string() })?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Looks up a tool by name, regardless of whether it is enabled.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.entries.get(name)
    }

    /// Lists every enabled tool with its derived JSON Schema.
    #[must_use]
    pub fn list(&self) -> Vec<ToolListing> {
        let mut listings: Vec<_> = self
            .entries
            .values()
            .filter(|e| e.enabled)
            .map(|e| ToolListing {
                name: e.name.clone(),
                description: Some(e.description.clone()),
                input_schema: e.schema.to_json_schema(),
            })
            .collect();
        listings.sort_by(|a, b| a.name.cmp(&b.name));
        listings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn noop_handler() -> ToolHandler {
        Arc::new(|_args| Box::pin(async { Ok(Value::Null) }))
    }

    #[test]
    fn register_and_list_roundtrip() {
        let mut registry = ToolRegistry::new();
        registry
            .register("ping", "health check", Schema::default(), noop_handler())
            .unwrap();

        let listing = registry.list();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "ping");
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry
            .register("ping", "health check", Schema::default(), noop_handler())
            .unwrap();
        let err = registry
            .register("ping", "health check", Schema::default(), noop_handler())
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidArguments { .. }));
    }

    #[test]
    fn disabled_tools_are_excluded_from_list() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                "read_file",
                "reads a file",
                Schema::new(vec![Field::string("path", "target path")]),
                noop_handler(),
            )
            .unwrap();
        registry.disable("read_file").unwrap();
        assert!(registry.list().is_empty());
        assert!(registry.get("read_file").is_some());
    }

    #[test]
    fn operations_on_unknown_tool_fail() {
        let mut registry = ToolRegistry::new();
        assert!(matches!(
            registry.enable("missing").unwrap_err(),
            ServerError::ToolNotFound { .. }
        ));
        assert!(matches!(
            registry.unregister("missing").unwrap_err(),
            ServerError::ToolNotFound { .. }
        ));
    }
}
