//! Device abstraction layer for Stream Deck panels.
//!
//! This module provides a trait-based abstraction over real and mock
//! panel implementations, enabling testability without hardware.

mod info;
pub mod mock;
mod real;
pub mod wire;

pub use info::{ConnectionOptions, DeviceInfo, PanelEvent, PanelModel, StripInfo};
pub use real::HidPanel;

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;

use crate::error::Result;

/// The owned link to a physical panel.
///
/// A link may be connected or not; every device-mutating call made while
/// disconnected returns [`crate::error::DeckError::NotConnected`].
/// Implementations serialize all writes to the underlying handle behind one
/// mutual-exclusion boundary, and hold that boundary across an entire strip
/// transfer so its frames never interleave with other writes.
pub trait DeviceLink: Send + Sync {
    /// Enumerate attached panels, open the first, reset its display state,
    /// and read its identity.
    fn connect(&self) -> Result<DeviceInfo>;

    /// Blank the display and release the handle. Idempotent; safe to call
    /// when not connected.
    fn disconnect(&self);

    /// Whether a handle is currently open.
    fn is_connected(&self) -> bool;

    /// Identity of the connected panel, if any.
    fn info(&self) -> Option<DeviceInfo>;

    /// Set display brightness. The value is clamped to `[0, 100]` before
    /// being sent.
    fn set_brightness(&self, percent: u8) -> Result<()>;

    /// Upload a tile bitmap to a slot; `None` blanks the tile.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` when `slot` is at or beyond the key count.
    fn set_button_bitmap(&self, slot: u8, bitmap: Option<&RgbImage>) -> Result<()>;

    /// Blank every slot in `[0, key_count)`.
    fn clear_all(&self) -> Result<()>;

    /// Transfer a bitmap to the auxiliary strip.
    ///
    /// Uses the vendor transport when the panel supports it, otherwise the
    /// manual chunked report protocol in [`wire`]. Any write failure aborts
    /// the transfer with `TransferFailed`; retry the whole image, partial
    /// transfers cannot be resumed.
    fn send_strip_image(&self, bitmap: &RgbImage) -> Result<()>;

    /// Collect pending input events, waiting up to `timeout`.
    ///
    /// Only key press edges and touch taps are reported; releases are
    /// swallowed. Returns an empty vector when disconnected.
    fn poll_events(&self, timeout: Duration) -> Vec<PanelEvent>;
}

/// Shared handle to a device link, as held by the controller and tests.
pub type SharedLink = Arc<dyn DeviceLink>;
