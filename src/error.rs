//! Error types for panel operations.

use thiserror::Error;

/// Primary error type for deckhand operations.
#[derive(Error, Debug)]
pub enum DeckError {
    // Device errors
    #[error("No Stream Deck devices found")]
    NoDevicesFound,

    #[error("Failed to open device: {reason}")]
    DeviceOpenFailed { reason: String },

    #[error("Device not connected")]
    NotConnected,

    #[error("Device communication error: {0}")]
    DeviceCommunication(String),

    #[error("Invalid slot {slot}: device has {key_count} keys")]
    InvalidSlot { slot: u8, key_count: u8 },

    #[error("Strip transfer failed: {reason}")]
    TransferFailed { reason: String },

    // Configuration errors
    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    // Page/button validation errors
    #[error("Page not found: {id}")]
    PageNotFound { id: String },

    #[error("No button at slot {slot} on page {page}")]
    ButtonNotFound { page: String, slot: u8 },

    #[error("Page {id} has no free slot")]
    TargetPageFull { id: String },

    #[error("Cannot delete the last remaining page")]
    LastPage,

    // Plugin errors
    #[error("Plugin not found: {id}")]
    PluginNotFound { id: String },

    #[error("Plugin '{id}' failed: {reason}")]
    PluginFailed { id: String, reason: String },

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl DeckError {
    /// Returns true if the error is a connection-class failure that a
    /// retry of `connect()` may resolve.
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NoDevicesFound | Self::DeviceOpenFailed { .. } | Self::NotConnected
        )
    }

    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoDevicesFound
                | Self::NotConnected
                | Self::InvalidSlot { .. }
                | Self::PageNotFound { .. }
                | Self::ButtonNotFound { .. }
                | Self::TargetPageFull { .. }
                | Self::LastPage
                | Self::PluginNotFound { .. }
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NoDevicesFound => Some("Ensure the Stream Deck is connected via USB"),
            Self::NotConnected => Some("Call start() to connect first"),
            Self::TransferFailed { .. } => Some("Retry the full strip transfer"),
            Self::LastPage => Some("Create another page before deleting this one"),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using DeckError.
pub type Result<T> = std::result::Result<T, DeckError>;
