//! Mock panel implementation for unit testing.
//!
//! Records every operation, captures uploaded bitmaps per tile, and lets
//! tests script key and touch input without hardware.
//!
//! # Example
//!
//! ```rust,ignore
//! use deckhand::device::mock::MockPanel;
//! use deckhand::device::DeviceLink;
//!
//! let mock = MockPanel::neo();
//! mock.connect().unwrap();
//! mock.queue_key_press(3);
//! let events = mock.poll_events(std::time::Duration::ZERO);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use image::RgbImage;
use tracing::trace;

use super::info::{DeviceInfo, PanelEvent, PanelModel};
use super::DeviceLink;
use crate::error::{DeckError, Result};

/// Recorded operation for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Disconnect,
    SetBrightness { level: u8 },
    SetTile { slot: u8 },
    ClearTile { slot: u8 },
    ClearAll,
    SendStrip,
}

/// State of a tile on the mock panel.
#[derive(Debug, Clone, PartialEq)]
pub enum TileState {
    /// Tile is blank (black).
    Blank,
    /// Tile shows an uploaded bitmap.
    Bitmap(RgbImage),
}

/// Mock panel for testing without real hardware.
pub struct MockPanel {
    info: DeviceInfo,
    connected: AtomicBool,
    brightness: AtomicU8,
    tiles: Mutex<Vec<TileState>>,
    strip_images: Mutex<Vec<RgbImage>>,
    event_queue: Mutex<VecDeque<PanelEvent>>,
    operation_log: Mutex<Vec<Operation>>,
    error_injection: Mutex<Option<DeckError>>,
    connect_error: Mutex<Option<DeckError>>,
}

impl MockPanel {
    /// Create a new mock panel for the specified model.
    #[must_use]
    pub fn new(model: PanelModel) -> Self {
        let (cols, rows) = model.layout();
        let (width, height) = model.key_dimensions();
        let key_count = model.key_count();

        Self {
            info: DeviceInfo {
                serial: format!("MOCK-{model:?}-001"),
                product_name: model.display_name().to_string(),
                firmware_version: "1.0.0-mock".to_string(),
                key_count,
                key_width: width as usize,
                key_height: height as usize,
                rows,
                cols,
                kind: format!("{model:?}"),
                strip: model.strip(),
            },
            connected: AtomicBool::new(false),
            brightness: AtomicU8::new(100),
            tiles: Mutex::new(vec![TileState::Blank; key_count as usize]),
            strip_images: Mutex::new(Vec::new()),
            event_queue: Mutex::new(VecDeque::new()),
            operation_log: Mutex::new(Vec::new()),
            error_injection: Mutex::new(None),
            connect_error: Mutex::new(None),
        }
    }

    /// Mock Stream Deck Neo (8 keys + info bar, manual strip protocol).
    #[must_use]
    pub fn neo() -> Self {
        Self::new(PanelModel::Neo)
    }

    /// Mock Stream Deck MK.2 (15 keys, no strip).
    #[must_use]
    pub fn mk2() -> Self {
        Self::new(PanelModel::Mk2)
    }

    /// Mock Stream Deck Mini (6 keys).
    #[must_use]
    pub fn mini() -> Self {
        Self::new(PanelModel::Mini)
    }

    // === Configuration ===

    /// Inject an error for the next device-mutating operation.
    pub fn inject_error(&self, error: DeckError) {
        *self.error_injection.lock().unwrap() = Some(error);
    }

    /// Make the next `connect()` fail.
    pub fn fail_next_connect(&self, error: DeckError) {
        *self.connect_error.lock().unwrap() = Some(error);
    }

    // === Input Simulation ===

    /// Queue a key press edge.
    pub fn queue_key_press(&self, slot: u8) {
        self.event_queue
            .lock()
            .unwrap()
            .push_back(PanelEvent::KeyDown { slot });
    }

    /// Queue a touch tap.
    pub fn queue_touch(&self, x: u16, y: u16) {
        self.event_queue
            .lock()
            .unwrap()
            .push_back(PanelEvent::Touch { x, y });
    }

    // === Assertions ===

    /// Get all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.operation_log.lock().unwrap().clone()
    }

    /// Assert a specific operation was performed at least once.
    ///
    /// # Panics
    ///
    /// Panics if the operation was not found.
    pub fn assert_contains(&self, expected: &Operation) {
        let ops = self.operations();
        assert!(
            ops.contains(expected),
            "Expected operation {expected:?} not found in: {ops:#?}",
        );
    }

    /// Clear the operation log for fresh assertions.
    pub fn clear_operations(&self) {
        self.operation_log.lock().unwrap().clear();
    }

    /// Get the state of a tile.
    #[must_use]
    pub fn tile(&self, slot: u8) -> Option<TileState> {
        self.tiles.lock().unwrap().get(slot as usize).cloned()
    }

    /// Assert a tile shows a bitmap and return it.
    ///
    /// # Panics
    ///
    /// Panics if the tile is blank or out of range.
    #[must_use]
    pub fn tile_bitmap(&self, slot: u8) -> RgbImage {
        match self.tile(slot) {
            Some(TileState::Bitmap(img)) => img,
            other => panic!("Tile {slot} expected to show a bitmap, but is: {other:?}"),
        }
    }

    /// Assert a tile is blank.
    ///
    /// # Panics
    ///
    /// Panics if the tile shows a bitmap.
    pub fn assert_tile_blank(&self, slot: u8) {
        match self.tile(slot) {
            None | Some(TileState::Blank) => {}
            other => panic!("Tile {slot} expected to be blank, but is: {other:?}"),
        }
    }

    /// All bitmaps sent to the auxiliary strip, in order.
    #[must_use]
    pub fn strip_images(&self) -> Vec<RgbImage> {
        self.strip_images.lock().unwrap().clone()
    }

    /// Current brightness level.
    #[must_use]
    pub fn get_brightness(&self) -> u8 {
        self.brightness.load(Ordering::SeqCst)
    }

    // === Internal Helpers ===

    fn record_op(&self, op: Operation) {
        trace!(?op, "Recording operation");
        self.operation_log.lock().unwrap().push(op);
    }

    fn check_ready(&self) -> Result<()> {
        if let Some(error) = self.error_injection.lock().unwrap().take() {
            return Err(error);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DeckError::NotConnected);
        }
        Ok(())
    }

    fn check_slot(&self, slot: u8) -> Result<()> {
        if slot >= self.info.key_count {
            return Err(DeckError::InvalidSlot {
                slot,
                key_count: self.info.key_count,
            });
        }
        Ok(())
    }
}

impl DeviceLink for MockPanel {
    fn connect(&self) -> Result<DeviceInfo> {
        if let Some(error) = self.connect_error.lock().unwrap().take() {
            return Err(error);
        }
        self.record_op(Operation::Connect);
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.info.clone())
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.record_op(Operation::Disconnect);
            let mut tiles = self.tiles.lock().unwrap();
            for tile in tiles.iter_mut() {
                *tile = TileState::Blank;
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn info(&self) -> Option<DeviceInfo> {
        if self.is_connected() {
            Some(self.info.clone())
        } else {
            None
        }
    }

    fn set_brightness(&self, percent: u8) -> Result<()> {
        self.check_ready()?;
        let level = percent.min(100);
        self.record_op(Operation::SetBrightness { level });
        self.brightness.store(level, Ordering::SeqCst);
        Ok(())
    }

    fn set_button_bitmap(&self, slot: u8, bitmap: Option<&RgbImage>) -> Result<()> {
        self.check_ready()?;
        self.check_slot(slot)?;

        let mut tiles = self.tiles.lock().unwrap();
        match bitmap {
            Some(img) => {
                self.record_op(Operation::SetTile { slot });
                tiles[slot as usize] = TileState::Bitmap(img.clone());
            }
            None => {
                self.record_op(Operation::ClearTile { slot });
                tiles[slot as usize] = TileState::Blank;
            }
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        self.check_ready()?;
        self.record_op(Operation::ClearAll);
        let mut tiles = self.tiles.lock().unwrap();
        for tile in tiles.iter_mut() {
            *tile = TileState::Blank;
        }
        Ok(())
    }

    fn send_strip_image(&self, bitmap: &RgbImage) -> Result<()> {
        self.check_ready()?;
        if self.info.strip.is_none() {
            return Err(DeckError::TransferFailed {
                reason: "panel has no auxiliary strip".to_string(),
            });
        }
        self.record_op(Operation::SendStrip);
        self.strip_images.lock().unwrap().push(bitmap.clone());
        Ok(())
    }

    fn poll_events(&self, _timeout: Duration) -> Vec<PanelEvent> {
        if !self.is_connected() {
            return Vec::new();
        }
        self.event_queue.lock().unwrap().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_starts_disconnected() {
        let mock = MockPanel::neo();
        assert!(!mock.is_connected());
        assert!(matches!(
            mock.set_brightness(50),
            Err(DeckError::NotConnected)
        ));
    }

    #[test]
    fn test_connect_reports_model_identity() {
        let mock = MockPanel::neo();
        let info = mock.connect().unwrap();
        assert_eq!(info.key_count, 8);
        let strip = info.strip.unwrap();
        assert_eq!((strip.width, strip.height), (248, 58));
        assert!(!strip.native);
    }

    #[test]
    fn test_set_brightness_clamps() {
        let mock = MockPanel::mk2();
        mock.connect().unwrap();
        mock.set_brightness(250).unwrap();
        assert_eq!(mock.get_brightness(), 100);
        mock.assert_contains(&Operation::SetBrightness { level: 100 });
    }

    #[test]
    fn test_tile_upload_and_clear() {
        let mock = MockPanel::mini();
        mock.connect().unwrap();

        let img = RgbImage::from_pixel(72, 72, image::Rgb([1, 2, 3]));
        mock.set_button_bitmap(2, Some(&img)).unwrap();
        assert_eq!(mock.tile_bitmap(2).get_pixel(0, 0).0, [1, 2, 3]);

        mock.set_button_bitmap(2, None).unwrap();
        mock.assert_tile_blank(2);
    }

    #[test]
    fn test_invalid_slot() {
        let mock = MockPanel::mini(); // 6 keys, slots 0-5
        mock.connect().unwrap();
        let img = RgbImage::new(72, 72);
        assert!(matches!(
            mock.set_button_bitmap(6, Some(&img)),
            Err(DeckError::InvalidSlot { slot: 6, .. })
        ));
    }

    #[test]
    fn test_strip_rejected_without_strip() {
        let mock = MockPanel::mk2();
        mock.connect().unwrap();
        let img = RgbImage::new(248, 58);
        assert!(matches!(
            mock.send_strip_image(&img),
            Err(DeckError::TransferFailed { .. })
        ));
    }

    #[test]
    fn test_queued_events_drain_in_order() {
        let mock = MockPanel::neo();
        mock.connect().unwrap();
        mock.queue_key_press(1);
        mock.queue_touch(200, 30);
        mock.queue_key_press(4);

        let events = mock.poll_events(Duration::ZERO);
        assert_eq!(
            events,
            vec![
                PanelEvent::KeyDown { slot: 1 },
                PanelEvent::Touch { x: 200, y: 30 },
                PanelEvent::KeyDown { slot: 4 },
            ]
        );
        assert!(mock.poll_events(Duration::ZERO).is_empty());
    }

    #[test]
    fn test_error_injection() {
        let mock = MockPanel::neo();
        mock.connect().unwrap();
        mock.inject_error(DeckError::DeviceCommunication("test error".to_string()));
        assert!(mock.set_brightness(50).is_err());
        // Injection is one-shot
        mock.set_brightness(50).unwrap();
    }

    #[test]
    fn test_disconnect_blanks_and_is_idempotent() {
        let mock = MockPanel::mini();
        mock.connect().unwrap();
        let img = RgbImage::new(72, 72);
        mock.set_button_bitmap(0, Some(&img)).unwrap();

        mock.disconnect();
        assert!(!mock.is_connected());
        mock.assert_tile_blank(0);
        mock.disconnect();
    }
}
