//! Persistence for the page/button model.
//!
//! The persisted document is JSON: `{ "pages": { "<id>": Page }, "current_page_id": "<id>" }`.
//! An older, single-page layout (a flat slot→button object with no `pages`
//! key) is still accepted and upgraded on load. Load never fails upward:
//! anything unreadable degrades to the default single-page configuration so
//! a storage hiccup cannot take the controller down.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::model::{Button, DeckConfig, Page, DEFAULT_PAGE_ID, DEFAULT_PAGE_TITLE};

/// Loads and saves [`DeckConfig`] documents.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store backed by the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by the per-user default location.
    #[must_use]
    pub fn at_default_path() -> Self {
        Self::new(default_config_path())
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, migrating legacy documents.
    ///
    /// Missing, empty, or corrupt documents all yield the default
    /// single-page configuration; failures are logged, never raised.
    #[must_use]
    pub fn load(&self) -> DeckConfig {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config document, using defaults");
                return DeckConfig::default_config();
            }
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "Failed to read config, using defaults");
                return DeckConfig::default_config();
            }
        };

        if raw.trim().is_empty() {
            debug!(path = %self.path.display(), "Empty config document, using defaults");
            return DeckConfig::default_config();
        }

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "Config parse failed, using defaults");
                return DeckConfig::default_config();
            }
        };

        let Value::Object(doc) = value else {
            error!(path = %self.path.display(), "Config document is not an object, using defaults");
            return DeckConfig::default_config();
        };

        // Format detection is by the presence of the `pages` key; a legacy
        // document is a flat slot→button object.
        let mut config = if doc.contains_key("pages") {
            parse_multi_page(&doc)
        } else {
            migrate_legacy(&doc)
        };
        config.repair();

        info!(
            pages = config.pages.len(),
            current = %config.current_page_id,
            "Configuration loaded"
        );
        config
    }

    /// Persist the full multi-page document.
    ///
    /// The document is written to a sibling temp file and renamed into
    /// place, so readers never observe a half-written state. Failures are
    /// logged, not raised.
    pub fn save(&self, config: &DeckConfig) {
        let mut pages = serde_json::Map::new();
        for page in &config.pages {
            match serde_json::to_value(page) {
                Ok(value) => {
                    pages.insert(page.id.clone(), value);
                }
                Err(err) => {
                    error!(page = %page.id, error = %err, "Failed to serialize page");
                    return;
                }
            }
        }
        let doc = serde_json::json!({
            "pages": pages,
            "current_page_id": config.current_page_id,
        });

        if let Err(err) = self.write_document(&doc) {
            error!(path = %self.path.display(), error = %err, "Failed to save configuration");
        } else {
            debug!(path = %self.path.display(), pages = config.pages.len(), "Configuration saved");
        }
    }

    fn write_document(&self, doc: &Value) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let rendered = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, rendered)?;
        fs::rename(&tmp, &self.path)
    }
}

/// Per-user default document location.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deckhand")
        .join("deck.json")
}

fn parse_multi_page(doc: &serde_json::Map<String, Value>) -> DeckConfig {
    let mut pages = Vec::new();
    if let Some(Value::Object(page_map)) = doc.get("pages") {
        // serde_json is built with preserve_order, so document order is
        // navigation order.
        for (id, value) in page_map {
            match serde_json::from_value::<Page>(value.clone()) {
                Ok(mut page) => {
                    page.id = id.clone();
                    pages.push(page);
                }
                Err(err) => {
                    warn!(page = %id, error = %err, "Skipping unreadable page entry");
                }
            }
        }
    }

    let current_page_id = doc
        .get("current_page_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    DeckConfig {
        pages,
        current_page_id,
    }
}

/// Upgrade a flat slot→button document into a single default page.
fn migrate_legacy(doc: &serde_json::Map<String, Value>) -> DeckConfig {
    let mut page = Page::new(DEFAULT_PAGE_ID, DEFAULT_PAGE_TITLE);
    for (key, value) in doc {
        let Ok(slot) = key.parse::<u8>() else {
            warn!(key = %key, "Skipping non-numeric key in legacy document");
            continue;
        };
        match serde_json::from_value::<Button>(value.clone()) {
            Ok(mut button) => {
                button.slot = slot;
                page.buttons.insert(slot, button);
            }
            Err(err) => {
                warn!(slot, error = %err, "Skipping unreadable legacy button");
            }
        }
    }

    if !page.buttons.is_empty() {
        info!(
            buttons = page.buttons.len(),
            "Migrated legacy single-page document"
        );
    }

    DeckConfig {
        pages: vec![page],
        current_page_id: DEFAULT_PAGE_ID.to_string(),
    }
}
