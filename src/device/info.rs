//! Device information and event types.

use serde::Serialize;

/// Geometry of the auxiliary bitmap strip, when the panel has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StripInfo {
    /// Strip width in pixels.
    pub width: u32,
    /// Strip height in pixels.
    pub height: u32,
    /// True when the vendor transport can set the strip image directly.
    /// False means the manual chunked report protocol is required, and the
    /// image must be pre-rotated for the panel's mounting orientation.
    pub native: bool,
}

/// Information about a connected panel, read once per connection.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Device serial number
    pub serial: String,
    /// Human-readable product name
    pub product_name: String,
    /// Firmware version string
    pub firmware_version: String,
    /// Number of keys on the device
    pub key_count: u8,
    /// Width of key images in pixels
    pub key_width: usize,
    /// Height of key images in pixels
    pub key_height: usize,
    /// Number of key rows
    pub rows: u8,
    /// Number of key columns
    pub cols: u8,
    /// Device kind/model identifier
    pub kind: String,
    /// Auxiliary strip geometry, if the model has one
    pub strip: Option<StripInfo>,
}

impl DeviceInfo {
    /// Key tile dimensions as a `(width, height)` pair.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Tile dimensions are always small
    pub const fn tile_size(&self) -> (u32, u32) {
        (self.key_width as u32, self.key_height as u32)
    }
}

/// Panel models the mock implementation can emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PanelModel {
    /// Stream Deck Mini (6 keys, 3x2)
    Mini,
    /// Stream Deck MK.2 (15 keys, 5x3)
    Mk2,
    /// Stream Deck XL (32 keys, 8x4)
    Xl,
    /// Stream Deck + (8 keys + LCD strip)
    Plus,
    /// Stream Deck Neo (8 keys + info bar)
    Neo,
}

impl PanelModel {
    /// Returns the number of keys for this model.
    #[must_use]
    pub const fn key_count(self) -> u8 {
        match self {
            Self::Mini => 6,
            Self::Mk2 => 15,
            Self::Xl => 32,
            Self::Plus | Self::Neo => 8,
        }
    }

    /// Returns the key image dimensions (width, height) in pixels.
    #[must_use]
    pub const fn key_dimensions(self) -> (u32, u32) {
        match self {
            Self::Mini | Self::Mk2 | Self::Neo => (72, 72),
            Self::Xl => (96, 96),
            Self::Plus => (120, 120),
        }
    }

    /// Returns the key layout (columns, rows).
    #[must_use]
    pub const fn layout(self) -> (u8, u8) {
        match self {
            Self::Mini => (3, 2),
            Self::Mk2 => (5, 3),
            Self::Xl => (8, 4),
            Self::Plus | Self::Neo => (4, 2),
        }
    }

    /// Auxiliary strip geometry, if the model has one.
    ///
    /// The Plus LCD is driven through the vendor transport; the Neo info
    /// bar needs the manual chunked protocol.
    #[must_use]
    pub const fn strip(self) -> Option<StripInfo> {
        match self {
            Self::Plus => Some(StripInfo {
                width: 800,
                height: 100,
                native: true,
            }),
            Self::Neo => Some(StripInfo {
                width: 248,
                height: 58,
                native: false,
            }),
            _ => None,
        }
    }

    /// Returns a human-readable name for this model.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Mini => "Stream Deck Mini",
            Self::Mk2 => "Stream Deck MK.2",
            Self::Xl => "Stream Deck XL",
            Self::Plus => "Stream Deck +",
            Self::Neo => "Stream Deck Neo",
        }
    }
}

/// Input event delivered by a panel.
///
/// Key releases are swallowed at the device layer; only press edges are
/// forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PanelEvent {
    /// A key press edge.
    KeyDown {
        /// Slot index (0-based).
        slot: u8,
    },
    /// A tap on the touch strip.
    Touch {
        /// X coordinate in strip pixels.
        x: u16,
        /// Y coordinate in strip pixels.
        y: u16,
    },
}

/// Connection retry options for opening devices.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Maximum number of connection attempts (default: 3).
    pub max_retries: u32,
    /// Initial delay between retries (default: 1000ms).
    pub retry_delay: std::time::Duration,
    /// Exponential backoff factor (default: 1.5).
    pub backoff_factor: f32,
    /// Maximum delay cap (default: 10000ms).
    pub max_delay: std::time::Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        use std::time::Duration;
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff_factor: 1.5,
            max_delay: Duration::from_millis(10000),
        }
    }
}
