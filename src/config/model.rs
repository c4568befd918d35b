//! Page/button model types.
//!
//! These types map directly to the persisted JSON document: buttons are keyed
//! by slot index, pages by an opaque id, and a `current_page_id` pointer
//! selects the page shown on the panel. Colors are RGB triples serialized as
//! `[r, g, b]` arrays.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// RGB color triple.
pub type Rgb = (u8, u8, u8);

/// Hardcoded default button background (black).
pub const DEFAULT_BG_COLOR: Rgb = (0, 0, 0);

/// Hardcoded default button text color (white).
pub const DEFAULT_TEXT_COLOR: Rgb = (255, 255, 255);

/// Default button font size in pixels.
pub const DEFAULT_FONT_SIZE: u32 = 14;

/// Id of the page created by migration and empty-config fallback.
pub const DEFAULT_PAGE_ID: &str = "default";

/// Title of the page created by migration and empty-config fallback.
pub const DEFAULT_PAGE_TITLE: &str = "Home";

/// Kind of action bound to a button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    None,
    Plugin,
    Script,
    Http,
}

/// Action executed when a button is pressed.
///
/// Immutable once constructed; edits replace the whole value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub plugin_id: Option<String>,
    /// Plugin-specific parameters, passed through opaquely.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// A single button configuration. Identity is the `slot` within a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    /// Physical slot index on the panel (0-based).
    #[serde(rename = "key")]
    pub slot: u8,
    #[serde(default)]
    pub label: String,
    /// Optional icon image path, drawn in the upper half of the tile.
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub action: Option<ButtonAction>,
    #[serde(default = "default_bg_color")]
    pub bg_color: Rgb,
    #[serde(default = "default_text_color")]
    pub text_color: Rgb,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_bg_color() -> Rgb {
    DEFAULT_BG_COLOR
}

const fn default_text_color() -> Rgb {
    DEFAULT_TEXT_COLOR
}

const fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

const fn default_true() -> bool {
    true
}

impl Button {
    /// Create an empty, enabled button for a slot with default styling.
    #[must_use]
    pub fn new(slot: u8) -> Self {
        Self {
            slot,
            label: String::new(),
            icon: None,
            action: None,
            bg_color: DEFAULT_BG_COLOR,
            text_color: DEFAULT_TEXT_COLOR,
            font_size: DEFAULT_FONT_SIZE,
            enabled: true,
        }
    }

    /// Resolve the colors to render with, applying page inheritance.
    ///
    /// A button still carrying the hardcoded defaults inherits the page's
    /// palette; any explicit button color wins. Each channel (background,
    /// text) is resolved independently.
    #[must_use]
    pub fn effective_colors(&self, page: &Page) -> (Rgb, Rgb) {
        let bg = match page.bg_color {
            Some(page_bg) if self.bg_color == DEFAULT_BG_COLOR => page_bg,
            _ => self.bg_color,
        };
        let text = match page.text_color {
            Some(page_text) if self.text_color == DEFAULT_TEXT_COLOR => page_text,
            _ => self.text_color,
        };
        (bg, text)
    }
}

/// A named set of button configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    /// Buttons keyed by slot. Serialized with stringified keys.
    #[serde(default)]
    pub buttons: BTreeMap<u8, Button>,
    #[serde(default)]
    pub bg_color: Option<Rgb>,
    #[serde(default)]
    pub text_color: Option<Rgb>,
}

impl Page {
    /// Create an empty page.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            buttons: BTreeMap::new(),
            bg_color: None,
            text_color: None,
        }
    }

    /// Lowest slot index in `[0, capacity)` without a button.
    #[must_use]
    pub fn first_free_slot(&self, capacity: u8) -> Option<u8> {
        (0..capacity).find(|slot| !self.buttons.contains_key(slot))
    }

    /// Exchange the buttons at two slots, updating their `slot` fields.
    ///
    /// Either side may be empty; a lone button simply moves to the other
    /// slot. Applying the same swap twice restores the original layout.
    pub fn swap_slots(&mut self, slot_a: u8, slot_b: u8) {
        if slot_a == slot_b {
            return;
        }
        let a = self.buttons.remove(&slot_a);
        let b = self.buttons.remove(&slot_b);
        if let Some(mut button) = a {
            button.slot = slot_b;
            self.buttons.insert(slot_b, button);
        }
        if let Some(mut button) = b {
            button.slot = slot_a;
            self.buttons.insert(slot_a, button);
        }
    }
}

/// The full in-memory model: ordered pages plus the current-page pointer.
///
/// `pages` preserves insertion order, which defines next/previous
/// navigation. The invariant that `current_page_id` names an existing page
/// is restored by [`DeckConfig::repair`] whenever the model is loaded or a
/// page is removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckConfig {
    pub pages: Vec<Page>,
    pub current_page_id: String,
}

impl DeckConfig {
    /// The single-"Home"-page configuration used when nothing is persisted.
    #[must_use]
    pub fn default_config() -> Self {
        Self {
            pages: vec![Page::new(DEFAULT_PAGE_ID, DEFAULT_PAGE_TITLE)],
            current_page_id: DEFAULT_PAGE_ID.to_string(),
        }
    }

    /// Restore the `current_page_id` invariant, falling back to the first
    /// page. An empty page list gains the default page first.
    pub fn repair(&mut self) {
        if self.pages.is_empty() {
            self.pages.push(Page::new(DEFAULT_PAGE_ID, DEFAULT_PAGE_TITLE));
        }
        if !self.pages.iter().any(|p| p.id == self.current_page_id) {
            self.current_page_id = self.pages[0].id.clone();
        }
    }

    #[must_use]
    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    pub fn page_mut(&mut self, id: &str) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| p.id == id)
    }

    #[must_use]
    pub fn current_page(&self) -> &Page {
        self.page(&self.current_page_id)
            .unwrap_or(&self.pages[0])
    }

    pub fn current_page_mut(&mut self) -> &mut Page {
        let id = self.current_page_id.clone();
        let idx = self
            .pages
            .iter()
            .position(|p| p.id == id)
            .unwrap_or(0);
        &mut self.pages[idx]
    }

    /// 1-based position of the current page, with the page total.
    #[must_use]
    pub fn current_position(&self) -> (usize, usize) {
        let idx = self
            .pages
            .iter()
            .position(|p| p.id == self.current_page_id)
            .unwrap_or(0);
        (idx + 1, self.pages.len())
    }

    /// Id of the page after the current one, wrapping around.
    #[must_use]
    pub fn next_page_id(&self) -> &str {
        let (pos, total) = self.current_position();
        &self.pages[pos % total].id
    }

    /// Id of the page before the current one, wrapping around.
    #[must_use]
    pub fn prev_page_id(&self) -> &str {
        let (pos, total) = self.current_position();
        &self.pages[(pos + total - 2) % total].id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_page_config() -> DeckConfig {
        DeckConfig {
            pages: vec![
                Page::new("a", "First"),
                Page::new("b", "Second"),
                Page::new("c", "Third"),
            ],
            current_page_id: "b".to_string(),
        }
    }

    #[test]
    fn test_repair_unknown_current_page() {
        let mut config = three_page_config();
        config.current_page_id = "missing".to_string();
        config.repair();
        assert_eq!(config.current_page_id, "a");
    }

    #[test]
    fn test_repair_empty_pages() {
        let mut config = DeckConfig {
            pages: Vec::new(),
            current_page_id: "whatever".to_string(),
        };
        config.repair();
        assert_eq!(config.pages.len(), 1);
        assert_eq!(config.current_page_id, DEFAULT_PAGE_ID);
        assert_eq!(config.pages[0].title, DEFAULT_PAGE_TITLE);
    }

    #[test]
    fn test_cyclic_navigation() {
        let config = three_page_config();
        assert_eq!(config.next_page_id(), "c");
        assert_eq!(config.prev_page_id(), "a");

        let mut at_end = config.clone();
        at_end.current_page_id = "c".to_string();
        assert_eq!(at_end.next_page_id(), "a");

        let mut at_start = config;
        at_start.current_page_id = "a".to_string();
        assert_eq!(at_start.prev_page_id(), "c");
    }

    #[test]
    fn test_single_page_navigation_is_identity() {
        let config = DeckConfig::default_config();
        assert_eq!(config.next_page_id(), DEFAULT_PAGE_ID);
        assert_eq!(config.prev_page_id(), DEFAULT_PAGE_ID);
    }

    #[test]
    fn test_first_free_slot() {
        let mut page = Page::new("p", "P");
        page.buttons.insert(0, Button::new(0));
        page.buttons.insert(1, Button::new(1));
        page.buttons.insert(3, Button::new(3));
        assert_eq!(page.first_free_slot(6), Some(2));

        for slot in 0..6 {
            page.buttons.insert(slot, Button::new(slot));
        }
        assert_eq!(page.first_free_slot(6), None);
    }

    #[test]
    fn test_swap_slots_involution() {
        let mut page = Page::new("p", "P");
        let mut left = Button::new(2);
        left.label = "left".to_string();
        let mut right = Button::new(5);
        right.label = "right".to_string();
        page.buttons.insert(2, left.clone());
        page.buttons.insert(5, right.clone());

        page.swap_slots(2, 5);
        assert_eq!(page.buttons[&2].label, "right");
        assert_eq!(page.buttons[&2].slot, 2);
        assert_eq!(page.buttons[&5].label, "left");
        assert_eq!(page.buttons[&5].slot, 5);

        page.swap_slots(2, 5);
        assert_eq!(page.buttons[&2], left);
        assert_eq!(page.buttons[&5], right);
    }

    #[test]
    fn test_swap_slots_with_empty_side() {
        let mut page = Page::new("p", "P");
        page.buttons.insert(1, Button::new(1));

        page.swap_slots(1, 4);
        assert!(!page.buttons.contains_key(&1));
        assert_eq!(page.buttons[&4].slot, 4);

        page.swap_slots(1, 4);
        assert_eq!(page.buttons[&1].slot, 1);
        assert!(!page.buttons.contains_key(&4));
    }

    #[test]
    fn test_color_inheritance() {
        let mut page = Page::new("p", "P");
        page.bg_color = Some((10, 20, 30));
        page.text_color = Some((200, 200, 200));

        // Defaults inherit from the page
        let plain = Button::new(0);
        assert_eq!(plain.effective_colors(&page), ((10, 20, 30), (200, 200, 200)));

        // Explicit button colors win
        let mut styled = Button::new(1);
        styled.bg_color = (5, 5, 5);
        let (bg, text) = styled.effective_colors(&page);
        assert_eq!(bg, (5, 5, 5));
        assert_eq!(text, (200, 200, 200));

        // No page palette: defaults stand
        let bare_page = Page::new("q", "Q");
        assert_eq!(
            plain.effective_colors(&bare_page),
            (DEFAULT_BG_COLOR, DEFAULT_TEXT_COLOR)
        );
    }

    #[test]
    fn test_button_doc_roundtrip() {
        let mut button = Button::new(3);
        button.label = "Lights".to_string();
        button.action = Some(ButtonAction {
            kind: ActionKind::Plugin,
            plugin_id: Some("homeassistant".to_string()),
            config: serde_json::Map::new(),
        });

        let json = serde_json::to_value(&button).unwrap();
        assert_eq!(json["key"], 3);
        assert_eq!(json["action"]["type"], "plugin");
        assert_eq!(json["bg_color"], serde_json::json!([0, 0, 0]));

        let back: Button = serde_json::from_value(json).unwrap();
        assert_eq!(back, button);
    }

    #[test]
    fn test_button_doc_defaults() {
        let button: Button = serde_json::from_value(serde_json::json!({"key": 7})).unwrap();
        assert_eq!(button.slot, 7);
        assert!(button.enabled);
        assert_eq!(button.bg_color, DEFAULT_BG_COLOR);
        assert_eq!(button.text_color, DEFAULT_TEXT_COLOR);
        assert_eq!(button.font_size, DEFAULT_FONT_SIZE);
        assert!(button.action.is_none());
    }
}
