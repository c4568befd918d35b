//! Action-execution collaborator boundary.
//!
//! The controller never knows what an action does; it hands the press to a
//! [`PluginInvoker`] together with the button's styling so the action can
//! redraw its own tile consistently. [`PluginRegistry`] is the stock
//! invoker: a flat id→plugin table.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tracing::info;

use crate::config::Rgb;
use crate::error::{DeckError, Result};

/// Styling of the pressed button, passed through to the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    pub bg_color: Rgb,
    pub text_color: Rgb,
    pub font_size: u32,
}

/// Executes a named action for a pressed button.
///
/// Callers must not assume `execute` returns quickly; the controller runs
/// it on a worker so a slow action cannot stall key-event delivery.
pub trait PluginInvoker: Send + Sync {
    /// Run the plugin registered under `plugin_id`.
    ///
    /// # Errors
    ///
    /// `PluginNotFound` for an unknown id; a plugin's own failure is
    /// propagated unchanged.
    fn execute(
        &self,
        plugin_id: &str,
        slot: u8,
        parameters: &serde_json::Map<String, Value>,
        context: &RenderContext,
    ) -> Result<()>;
}

/// A single registered action implementation.
pub trait ButtonPlugin: Send + Sync {
    /// Stable identifier the configuration refers to.
    fn id(&self) -> &str;

    /// Human-readable name for listings.
    fn name(&self) -> &str {
        self.id()
    }

    /// Execute the action for a pressed slot.
    fn execute(
        &self,
        slot: u8,
        parameters: &serde_json::Map<String, Value>,
        context: &RenderContext,
    ) -> Result<()>;
}

/// Flat id→plugin registry implementing [`PluginInvoker`].
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Box<dyn ButtonPlugin>>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own id.
    ///
    /// # Errors
    ///
    /// Rejects empty and duplicate ids.
    pub fn register(&self, plugin: Box<dyn ButtonPlugin>) -> Result<()> {
        let id = plugin.id().to_string();
        if id.is_empty() {
            return Err(DeckError::Other("plugin id must not be empty".to_string()));
        }
        let mut plugins = self.plugins.write().expect("plugin registry poisoned");
        if plugins.contains_key(&id) {
            return Err(DeckError::Other(format!(
                "plugin '{id}' already registered"
            )));
        }
        info!(plugin = %id, "Registered plugin");
        plugins.insert(id, plugin);
        Ok(())
    }

    /// Ids of all registered plugins.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .plugins
            .read()
            .expect("plugin registry poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

impl PluginInvoker for PluginRegistry {
    fn execute(
        &self,
        plugin_id: &str,
        slot: u8,
        parameters: &serde_json::Map<String, Value>,
        context: &RenderContext,
    ) -> Result<()> {
        let plugins = self.plugins.read().expect("plugin registry poisoned");
        let plugin = plugins.get(plugin_id).ok_or_else(|| DeckError::PluginNotFound {
            id: plugin_id.to_string(),
        })?;
        plugin.execute(slot, parameters, context)
    }
}
