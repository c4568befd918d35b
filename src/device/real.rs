//! Real Stream Deck panel implementation.
//!
//! Wraps the `elgato-streamdeck` crate for key bitmaps, brightness, and
//! input, and falls back to a raw `hidapi` handle for panels whose strip
//! image can only be set through the manual chunked report protocol.

use std::sync::Mutex;
use std::time::Duration;

use elgato_streamdeck::images::ImageRect;
use elgato_streamdeck::info::Kind;
use elgato_streamdeck::{StreamDeck, StreamDeckInput};
use hidapi::{HidApi, HidDevice};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use tracing::{debug, error, info, trace, warn};

use super::info::{ConnectionOptions, DeviceInfo, PanelEvent, StripInfo};
use super::{wire, DeviceLink};
use crate::error::{DeckError, Result};

const ELGATO_VENDOR_ID: u16 = 0x0fd9;

/// JPEG quality for the manual strip transfer.
const STRIP_JPEG_QUALITY: u8 = 95;

struct OpenPanel {
    deck: StreamDeck,
    hid: HidApi,
    info: DeviceInfo,
    /// Raw handle for the chunked strip protocol, opened on first use.
    raw: Option<HidDevice>,
    key_states: Vec<bool>,
}

/// Real panel link over HID.
///
/// One mutex guards the whole open handle; every write path locks it, so a
/// strip transfer in progress cannot interleave with key uploads.
pub struct HidPanel {
    state: Mutex<Option<OpenPanel>>,
    retry: Option<ConnectionOptions>,
}

impl HidPanel {
    /// Create an unconnected link.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            retry: None,
        }
    }

    /// Create an unconnected link whose `connect()` retries connection-class
    /// failures with exponential backoff.
    #[must_use]
    pub fn with_retry(opts: ConnectionOptions) -> Self {
        Self {
            state: Mutex::new(None),
            retry: Some(opts),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<OpenPanel>> {
        self.state.lock().expect("panel lock poisoned")
    }
}

impl Default for HidPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLink for HidPanel {
    fn connect(&self) -> Result<DeviceInfo> {
        let mut guard = self.lock();
        if let Some(panel) = guard.as_ref() {
            debug!(serial = %panel.info.serial, "Already connected");
            return Ok(panel.info.clone());
        }

        let opts = self.retry.clone().unwrap_or(ConnectionOptions {
            max_retries: 1,
            ..ConnectionOptions::default()
        });
        let panel = open_first_panel_with_retry(&opts)?;
        let info = panel.info.clone();
        *guard = Some(panel);
        Ok(info)
    }

    fn disconnect(&self) {
        let mut guard = self.lock();
        if let Some(panel) = guard.take() {
            // Best-effort blanking; the handle is released regardless.
            if let Err(err) = panel
                .deck
                .clear_all_button_images()
                .and_then(|()| panel.deck.flush())
            {
                warn!(error = %err, "Failed to blank panel on disconnect");
            }
            info!(serial = %panel.info.serial, "Disconnected from panel");
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn info(&self) -> Option<DeviceInfo> {
        self.lock().as_ref().map(|panel| panel.info.clone())
    }

    fn set_brightness(&self, percent: u8) -> Result<()> {
        let level = percent.min(100);
        let guard = self.lock();
        let panel = guard.as_ref().ok_or(DeckError::NotConnected)?;
        trace!(level, "Setting brightness");
        panel
            .deck
            .set_brightness(level)
            .map_err(|e| DeckError::DeviceCommunication(e.to_string()))
    }

    fn set_button_bitmap(&self, slot: u8, bitmap: Option<&RgbImage>) -> Result<()> {
        let guard = self.lock();
        let panel = guard.as_ref().ok_or(DeckError::NotConnected)?;
        if slot >= panel.info.key_count {
            return Err(DeckError::InvalidSlot {
                slot,
                key_count: panel.info.key_count,
            });
        }

        match bitmap {
            Some(img) => {
                let (tile_w, tile_h) = panel.info.tile_size();
                let mut dynamic = DynamicImage::ImageRgb8(img.clone());
                if img.dimensions() != (tile_w, tile_h) {
                    dynamic =
                        dynamic.resize_exact(tile_w, tile_h, image::imageops::FilterType::Lanczos3);
                }
                panel
                    .deck
                    .set_button_image(slot, dynamic)
                    .map_err(|e| DeckError::DeviceCommunication(e.to_string()))?;
            }
            None => {
                panel
                    .deck
                    .clear_button_image(slot)
                    .map_err(|e| DeckError::DeviceCommunication(e.to_string()))?;
            }
        }

        panel
            .deck
            .flush()
            .map_err(|e| DeckError::DeviceCommunication(e.to_string()))
    }

    fn clear_all(&self) -> Result<()> {
        let guard = self.lock();
        let panel = guard.as_ref().ok_or(DeckError::NotConnected)?;
        panel
            .deck
            .clear_all_button_images()
            .map_err(|e| DeckError::DeviceCommunication(e.to_string()))?;
        panel
            .deck
            .flush()
            .map_err(|e| DeckError::DeviceCommunication(e.to_string()))
    }

    fn send_strip_image(&self, bitmap: &RgbImage) -> Result<()> {
        let mut guard = self.lock();
        let panel = guard.as_mut().ok_or(DeckError::NotConnected)?;
        let strip = panel.info.strip.ok_or_else(|| DeckError::TransferFailed {
            reason: "panel has no auxiliary strip".to_string(),
        })?;

        if strip.native {
            send_strip_native(panel, bitmap)
        } else {
            send_strip_chunked(panel, bitmap)
        }
    }

    fn poll_events(&self, timeout: Duration) -> Vec<PanelEvent> {
        let mut guard = self.lock();
        let Some(panel) = guard.as_mut() else {
            return Vec::new();
        };

        match panel.deck.read_input(Some(timeout)) {
            Ok(StreamDeckInput::ButtonStateChange(states)) => {
                let mut events = Vec::new();
                for (slot, pressed) in states.iter().enumerate() {
                    let was_pressed = panel.key_states.get(slot).copied().unwrap_or(false);
                    // Forward press edges only; releases are swallowed here.
                    if *pressed && !was_pressed {
                        #[allow(clippy::cast_possible_truncation)] // Key count is always < 256
                        events.push(PanelEvent::KeyDown { slot: slot as u8 });
                    }
                    if let Some(state) = panel.key_states.get_mut(slot) {
                        *state = *pressed;
                    }
                }
                events
            }
            Ok(StreamDeckInput::TouchScreenPress(x, y)) => vec![PanelEvent::Touch { x, y }],
            Ok(_) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "Failed to read panel input");
                Vec::new()
            }
        }
    }
}

/// Vendor transport path: the crate converts and writes the LCD region.
fn send_strip_native(panel: &OpenPanel, bitmap: &RgbImage) -> Result<()> {
    let rect = ImageRect::from_image(DynamicImage::ImageRgb8(bitmap.clone())).map_err(|e| {
        DeckError::TransferFailed {
            reason: e.to_string(),
        }
    })?;
    panel
        .deck
        .write_lcd(0, 0, &rect)
        .map_err(|e| DeckError::TransferFailed {
            reason: e.to_string(),
        })
}

/// Manual path: JPEG-encode and write the chunked report sequence.
fn send_strip_chunked(panel: &mut OpenPanel, bitmap: &RgbImage) -> Result<()> {
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, STRIP_JPEG_QUALITY);
    encoder
        .encode_image(bitmap)
        .map_err(|e| DeckError::TransferFailed {
            reason: e.to_string(),
        })?;

    if panel.raw.is_none() {
        panel.raw = Some(open_raw_handle(&panel.hid, &panel.info.serial)?);
    }
    let Some(raw) = panel.raw.as_ref() else {
        return Err(DeckError::TransferFailed {
            reason: "raw handle unavailable".to_string(),
        });
    };

    let reports = wire::chunk_strip_reports(&encoded);
    debug!(
        bytes = encoded.len(),
        frames = reports.len(),
        "Sending strip image"
    );
    for report in &reports {
        raw.write(report).map_err(|e| {
            error!(error = %e, "Strip transfer aborted");
            DeckError::TransferFailed {
                reason: e.to_string(),
            }
        })?;
    }
    Ok(())
}

/// Second handle to the same panel for raw report writes.
///
/// The vendor crate owns its handle privately; the chunked protocol needs
/// direct access, so the panel is opened once more by serial.
fn open_raw_handle(hid: &HidApi, serial: &str) -> Result<HidDevice> {
    let device = hid
        .device_list()
        .find(|d| d.vendor_id() == ELGATO_VENDOR_ID && d.serial_number() == Some(serial))
        .ok_or_else(|| DeckError::TransferFailed {
            reason: format!("device {serial} not found for raw access"),
        })?;
    device.open_device(hid).map_err(|e| DeckError::TransferFailed {
        reason: e.to_string(),
    })
}

fn open_first_panel_with_retry(opts: &ConnectionOptions) -> Result<OpenPanel> {
    let max_retries = opts.max_retries.max(1);
    let mut delay = opts.retry_delay;

    for attempt in 1..=max_retries {
        debug!(attempt, max_retries, "Opening panel");
        match open_first_panel() {
            Ok(panel) => {
                info!(
                    attempt,
                    serial = %panel.info.serial,
                    model = %panel.info.product_name,
                    "Panel connected"
                );
                return Ok(panel);
            }
            Err(err) if err.is_connection_error() && attempt < max_retries => {
                warn!(
                    attempt,
                    max_retries,
                    error = %err,
                    delay_ms = delay.as_millis(),
                    "Connection failed, retrying"
                );
                std::thread::sleep(delay);
                let next_delay_secs =
                    (delay.as_secs_f32() * opts.backoff_factor).min(opts.max_delay.as_secs_f32());
                delay = Duration::from_secs_f32(next_delay_secs);
            }
            Err(err) => {
                error!(attempt, max_retries, error = %err, "Connection failed");
                return Err(err);
            }
        }
    }

    unreachable!("retry loop guarantees a return before exhaustion");
}

fn open_first_panel() -> Result<OpenPanel> {
    let hid = elgato_streamdeck::new_hidapi()
        .map_err(|e| DeckError::DeviceCommunication(e.to_string()))?;

    let devices = elgato_streamdeck::list_devices(&hid);
    let (kind, serial) = devices
        .into_iter()
        .next()
        .ok_or(DeckError::NoDevicesFound)?;

    let deck =
        StreamDeck::connect(&hid, kind, &serial).map_err(|e| DeckError::DeviceOpenFailed {
            reason: e.to_string(),
        })?;

    let firmware = deck
        .firmware_version()
        .unwrap_or_else(|_| "unknown".to_string());

    let image_format = kind.key_image_format();
    let key_count = kind.key_count();
    let info = DeviceInfo {
        serial,
        product_name: kind_to_name(kind),
        firmware_version: firmware,
        key_count,
        key_width: image_format.size.0,
        key_height: image_format.size.1,
        rows: kind.row_count(),
        cols: kind.column_count(),
        kind: format!("{kind:?}"),
        strip: strip_for_kind(kind),
    };

    // Start from a blank display.
    deck.clear_all_button_images()
        .and_then(|()| deck.flush())
        .map_err(|e| DeckError::DeviceOpenFailed {
            reason: e.to_string(),
        })?;

    Ok(OpenPanel {
        deck,
        hid,
        info,
        raw: None,
        key_states: vec![false; key_count as usize],
    })
}

/// Auxiliary strip geometry by device kind.
const fn strip_for_kind(kind: Kind) -> Option<StripInfo> {
    match kind {
        Kind::Plus => Some(StripInfo {
            width: 800,
            height: 100,
            native: true,
        }),
        Kind::Neo => Some(StripInfo {
            width: 248,
            height: 58,
            native: false,
        }),
        _ => None,
    }
}

/// Convert device kind to human-readable name.
#[allow(clippy::missing_const_for_fn)] // Returns String which requires allocation
fn kind_to_name(kind: Kind) -> String {
    match kind {
        Kind::Original => "Stream Deck (Original)",
        Kind::OriginalV2 => "Stream Deck (Original V2)",
        Kind::Mini => "Stream Deck Mini",
        Kind::MiniMk2 => "Stream Deck Mini MK.2",
        Kind::Xl => "Stream Deck XL",
        Kind::XlV2 => "Stream Deck XL V2",
        Kind::Mk2 => "Stream Deck MK.2",
        Kind::Pedal => "Stream Deck Pedal",
        Kind::Plus => "Stream Deck +",
        Kind::Neo => "Stream Deck Neo",
        _ => "Unknown Stream Deck",
    }
    .to_string()
}
