//! Page/button model and persistence.
//!
//! `model` holds the in-memory types; `store` maps them to the persisted
//! JSON document, including migration of the legacy single-page layout.

mod model;
mod store;

pub use model::{
    ActionKind, Button, ButtonAction, DeckConfig, Page, Rgb, DEFAULT_BG_COLOR, DEFAULT_FONT_SIZE,
    DEFAULT_PAGE_ID, DEFAULT_PAGE_TITLE, DEFAULT_TEXT_COLOR,
};
pub use store::{default_config_path, ConfigStore};
