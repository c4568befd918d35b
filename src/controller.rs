//! Deck orchestration: page state, key dispatch, and re-renders.
//!
//! The controller owns the live page/button model and keeps it consistent
//! with the panel and the persisted document. Every mutating operation runs
//! mutate → persist → re-render under one critical section, so a concurrent
//! reader never sees a mutated-but-unpersisted page or a stale bitmap for a
//! persisted change. Device writes themselves serialize behind the link's
//! own lock.
//!
//! Key events arrive from [`DeviceLink::poll_events`] and are interpreted
//! here: presses on the reserved paging slots (`key_count` and
//! `key_count + 1` — panels that map strip tap zones onto nominal extra key
//! indices) and taps on the strip edges page through the model; any other
//! slot resolves to a button whose action is handed to the plugin worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use image::RgbImage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{
    ActionKind, Button, ConfigStore, DeckConfig, Page, Rgb, DEFAULT_BG_COLOR, DEFAULT_TEXT_COLOR,
};
use crate::device::{DeviceInfo, PanelEvent, SharedLink};
use crate::error::{DeckError, Result};
use crate::plugin::{PluginInvoker, RenderContext};
use crate::render::{self, StripOrientation};

/// Touch x at or below this selects the previous page (info bar geometry).
const TOUCH_PREV_MAX_X: u16 = 60;

/// Touch x at or above this selects the next page.
const TOUCH_NEXT_MIN_X: u16 = 180;

/// Reserved paging slots past the panel's key count.
const RESERVED_PAGING_SLOTS: u8 = 2;

/// Capacity of the action dispatch queue.
const ACTION_QUEUE_DEPTH: usize = 32;

/// One press handed to the plugin worker.
struct ActionJob {
    plugin_id: String,
    slot: u8,
    parameters: serde_json::Map<String, serde_json::Value>,
    context: RenderContext,
}

/// State guarded by the controller's critical section.
struct Shared {
    config: DeckConfig,
    info: Option<DeviceInfo>,
}

/// What a key press resolved to, decided under the state lock.
enum Dispatch {
    PrevPage,
    NextPage,
    Action(ActionJob),
    Ignore,
}

/// The deck controller.
pub struct DeckController {
    device: SharedLink,
    plugins: Arc<dyn PluginInvoker>,
    store: ConfigStore,
    state: Mutex<Shared>,
    actions: Mutex<Option<SyncSender<ActionJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl DeckController {
    /// Create a controller, loading the persisted configuration.
    ///
    /// The controller starts disconnected; call [`DeckController::start`].
    #[must_use]
    pub fn new(device: SharedLink, store: ConfigStore, plugins: Arc<dyn PluginInvoker>) -> Self {
        let config = store.load();
        Self {
            device,
            plugins,
            store,
            state: Mutex::new(Shared { config, info: None }),
            actions: Mutex::new(None),
            worker: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Connect to the panel and render the current page.
    ///
    /// On failure the controller stays disconnected and `start()` may be
    /// retried.
    pub fn start(&self) -> Result<DeviceInfo> {
        let mut state = self.lock_state();
        let info = self.device.connect()?;
        info!(
            model = %info.product_name,
            serial = %info.serial,
            keys = info.key_count,
            "Panel connected"
        );

        if let Err(err) = self.device.set_brightness(100) {
            error!(error = %err, "Failed to set brightness");
        }

        state.info = Some(info.clone());
        self.spawn_worker()?;
        self.render_full(&state);
        Ok(info)
    }

    /// Stop dispatch, blank the panel, and release the handle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(sender) = self.actions.lock().expect("action sender poisoned").take() {
            drop(sender);
        }
        if let Some(handle) = self.worker.lock().expect("worker handle poisoned").take() {
            let _ = handle.join();
        }
        self.device.disconnect();
        self.lock_state().info = None;
    }

    /// Blocking event loop: poll the panel and dispatch until [`stop`].
    ///
    /// [`stop`]: DeckController::stop
    pub fn run(&self, poll_interval: Duration) {
        self.running.store(true, Ordering::SeqCst);
        while self.running.load(Ordering::SeqCst) {
            if self.device.is_connected() {
                for event in self.device.poll_events(poll_interval) {
                    self.handle_event(event);
                }
            } else {
                std::thread::sleep(poll_interval);
            }
        }
    }

    /// Drain and dispatch whatever input is pending right now.
    ///
    /// Lets embedders and tests drive the event path deterministically.
    pub fn pump_events(&self) {
        for event in self.device.poll_events(Duration::ZERO) {
            self.handle_event(event);
        }
    }

    /// Whether a panel is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.device.is_connected()
    }

    /// Identity of the connected panel, if any.
    #[must_use]
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.lock_state().info.clone()
    }

    /// Snapshot of the current page/button model.
    #[must_use]
    pub fn config_snapshot(&self) -> DeckConfig {
        self.lock_state().config.clone()
    }

    /// Pass-through brightness control, clamped by the link.
    pub fn set_brightness(&self, percent: u8) -> Result<()> {
        self.device.set_brightness(percent)
    }

    /// Re-read the persisted document and fully re-render.
    pub fn reload(&self) {
        let mut state = self.lock_state();
        state.config = self.store.load();
        self.render_full(&state);
    }

    // === Paging ===

    /// Switch to the next page in stored order, wrapping. No-op with a
    /// single page.
    pub fn next_page(&self) {
        let mut state = self.lock_state();
        if state.config.pages.len() <= 1 {
            return;
        }
        let id = state.config.next_page_id().to_string();
        self.activate_page(&mut state, id);
    }

    /// Switch to the previous page in stored order, wrapping. No-op with a
    /// single page.
    pub fn prev_page(&self) {
        let mut state = self.lock_state();
        if state.config.pages.len() <= 1 {
            return;
        }
        let id = state.config.prev_page_id().to_string();
        self.activate_page(&mut state, id);
    }

    /// Switch to a specific page. Unknown ids are a no-op.
    pub fn switch_page(&self, id: &str) {
        let mut state = self.lock_state();
        if state.config.page(id).is_none() {
            debug!(page = %id, "Ignoring switch to unknown page");
            return;
        }
        self.activate_page(&mut state, id.to_string());
    }

    /// Append an empty page and return its fresh id.
    pub fn create_page(&self, title: &str) -> String {
        let mut state = self.lock_state();
        let id = Uuid::new_v4().to_string();
        state.config.pages.push(Page::new(id.clone(), title));
        self.store.save(&state.config);
        // The page total changed; the visible tiles did not.
        self.refresh_strip(&state);
        info!(page = %id, title = %title, "Page created");
        id
    }

    /// Delete a page. The last remaining page cannot be deleted; deleting
    /// the current page activates the first remaining one.
    pub fn delete_page(&self, id: &str) -> Result<()> {
        let mut state = self.lock_state();
        if state.config.page(id).is_none() {
            return Err(DeckError::PageNotFound { id: id.to_string() });
        }
        if state.config.pages.len() <= 1 {
            return Err(DeckError::LastPage);
        }

        let was_current = state.config.current_page_id == id;
        state.config.pages.retain(|p| p.id != id);
        if was_current {
            state.config.current_page_id = state.config.pages[0].id.clone();
        }
        self.store.save(&state.config);

        if was_current {
            self.render_full(&state);
        } else {
            self.refresh_strip(&state);
        }
        info!(page = %id, "Page deleted");
        Ok(())
    }

    /// Update a page's title and palette; colors are replaced wholesale.
    pub fn update_page(
        &self,
        id: &str,
        title: &str,
        bg_color: Option<Rgb>,
        text_color: Option<Rgb>,
    ) -> Result<()> {
        let mut state = self.lock_state();
        {
            let page = state
                .config
                .page_mut(id)
                .ok_or_else(|| DeckError::PageNotFound { id: id.to_string() })?;
            page.title = title.to_string();
            page.bg_color = bg_color;
            page.text_color = text_color;
        }
        self.store.save(&state.config);
        if state.config.current_page_id == id {
            self.refresh_strip(&state);
        }
        Ok(())
    }

    // === Buttons ===

    /// Write a button into the current page and reflect it on the tile.
    ///
    /// A disabled button blanks its tile. The slot is validated against the
    /// panel when one is connected; offline edits are persisted as-is.
    pub fn update_button(&self, slot: u8, button: Button) -> Result<()> {
        let mut state = self.lock_state();
        if let Some(info) = &state.info {
            if slot >= info.key_count {
                return Err(DeckError::InvalidSlot {
                    slot,
                    key_count: info.key_count,
                });
            }
        }

        let mut button = button;
        button.slot = slot;
        state.config.current_page_mut().buttons.insert(slot, button);
        self.store.save(&state.config);
        self.refresh_tile(&state, slot);
        Ok(())
    }

    /// Remove a button from the current page and blank its tile.
    /// Absent entries are a no-op.
    pub fn clear_button(&self, slot: u8) {
        let mut state = self.lock_state();
        if state
            .config
            .current_page_mut()
            .buttons
            .remove(&slot)
            .is_none()
        {
            return;
        }
        self.store.save(&state.config);
        self.refresh_tile(&state, slot);
    }

    /// Exchange two slots on a page.
    ///
    /// Both moves land in a single save, so a reader of the persisted
    /// document never sees the swap half-applied.
    pub fn swap_buttons(&self, page_id: &str, slot_a: u8, slot_b: u8) -> Result<()> {
        let mut state = self.lock_state();
        let page = state
            .config
            .page_mut(page_id)
            .ok_or_else(|| DeckError::PageNotFound {
                id: page_id.to_string(),
            })?;
        page.swap_slots(slot_a, slot_b);
        self.store.save(&state.config);

        if state.config.current_page_id == page_id {
            self.refresh_tile(&state, slot_a);
            self.refresh_tile(&state, slot_b);
        }
        Ok(())
    }

    /// Move a button to the first free slot on another page.
    ///
    /// Fails with `TargetPageFull` when the target has no free slot in
    /// `[0, key_count)`, leaving both pages untouched, and with
    /// `ButtonNotFound` when the source slot is empty. Needs a connection
    /// to know the panel's capacity.
    pub fn move_button(
        &self,
        source_page_id: &str,
        source_slot: u8,
        target_page_id: &str,
    ) -> Result<()> {
        let mut state = self.lock_state();
        let key_count = state
            .info
            .as_ref()
            .ok_or(DeckError::NotConnected)?
            .key_count;

        match state
            .config
            .page(source_page_id)
            .map(|p| p.buttons.contains_key(&source_slot))
        {
            None => {
                return Err(DeckError::PageNotFound {
                    id: source_page_id.to_string(),
                });
            }
            Some(false) => {
                return Err(DeckError::ButtonNotFound {
                    page: source_page_id.to_string(),
                    slot: source_slot,
                });
            }
            Some(true) => {}
        }

        let target = state
            .config
            .page(target_page_id)
            .ok_or_else(|| DeckError::PageNotFound {
                id: target_page_id.to_string(),
            })?;
        let free_slot = target
            .first_free_slot(key_count)
            .ok_or_else(|| DeckError::TargetPageFull {
                id: target_page_id.to_string(),
            })?;

        let Some(mut button) = state
            .config
            .page_mut(source_page_id)
            .and_then(|p| p.buttons.remove(&source_slot))
        else {
            return Err(DeckError::ButtonNotFound {
                page: source_page_id.to_string(),
                slot: source_slot,
            });
        };
        button.slot = free_slot;
        if let Some(target) = state.config.page_mut(target_page_id) {
            target.buttons.insert(free_slot, button);
        }
        self.store.save(&state.config);

        if state.config.current_page_id == source_page_id {
            self.refresh_tile(&state, source_slot);
        }
        if state.config.current_page_id == target_page_id {
            self.refresh_tile(&state, free_slot);
        }
        debug!(
            source = %source_page_id,
            target = %target_page_id,
            from = source_slot,
            to = free_slot,
            "Button moved"
        );
        Ok(())
    }

    // === Event dispatch ===

    fn handle_event(&self, event: PanelEvent) {
        match event {
            PanelEvent::Touch { x, .. } => {
                if x < TOUCH_PREV_MAX_X {
                    debug!(x, "Left strip tap");
                    self.prev_page();
                } else if x > TOUCH_NEXT_MIN_X {
                    debug!(x, "Right strip tap");
                    self.next_page();
                }
            }
            PanelEvent::KeyDown { slot } => self.handle_key_down(slot),
        }
    }

    fn handle_key_down(&self, slot: u8) {
        let decision = {
            let state = self.lock_state();
            let Some(info) = &state.info else {
                return;
            };
            let key_count = info.key_count;

            if slot == key_count {
                Dispatch::PrevPage
            } else if slot == key_count + 1 {
                Dispatch::NextPage
            } else if slot >= key_count + RESERVED_PAGING_SLOTS {
                debug!(slot, "Ignoring key beyond panel range");
                Dispatch::Ignore
            } else {
                resolve_button_action(&state.config, slot)
            }
        };

        match decision {
            Dispatch::PrevPage => self.prev_page(),
            Dispatch::NextPage => self.next_page(),
            Dispatch::Action(job) => self.dispatch_action(job),
            Dispatch::Ignore => {}
        }
    }

    /// Hand a press to the worker. A full queue drops the press rather
    /// than stalling event delivery.
    fn dispatch_action(&self, job: ActionJob) {
        let guard = self.actions.lock().expect("action sender poisoned");
        let Some(sender) = guard.as_ref() else {
            warn!(plugin = %job.plugin_id, "No action worker running, dropping press");
            return;
        };
        match sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                warn!(plugin = %job.plugin_id, slot = job.slot, "Action queue full, dropping press");
            }
            Err(TrySendError::Disconnected(job)) => {
                warn!(plugin = %job.plugin_id, slot = job.slot, "Action worker gone, dropping press");
            }
        }
    }

    fn spawn_worker(&self) -> Result<()> {
        let mut guard = self.actions.lock().expect("action sender poisoned");
        if guard.is_some() {
            return Ok(());
        }
        let (sender, receiver) = sync_channel::<ActionJob>(ACTION_QUEUE_DEPTH);
        let plugins = Arc::clone(&self.plugins);
        let handle = std::thread::Builder::new()
            .name("deckhand-actions".to_string())
            .spawn(move || {
                // Single consumer: presses execute in press order, and one
                // failing action never blocks the next.
                while let Ok(job) = receiver.recv() {
                    if let Err(err) =
                        plugins.execute(&job.plugin_id, job.slot, &job.parameters, &job.context)
                    {
                        error!(
                            plugin = %job.plugin_id,
                            slot = job.slot,
                            error = %err,
                            "Action failed"
                        );
                    }
                }
            })?;
        *guard = Some(sender);
        *self.worker.lock().expect("worker handle poisoned") = Some(handle);
        Ok(())
    }

    // === Rendering ===

    /// Repaint every visible surface for the current page.
    fn render_full(&self, state: &Shared) {
        let Some(info) = &state.info else { return };
        if let Err(err) = self.device.clear_all() {
            warn!(error = %err, "Failed to clear panel");
        }
        self.refresh_strip(state);

        let page = state.config.current_page();
        for (slot, button) in &page.buttons {
            if *slot >= info.key_count {
                warn!(slot = *slot, "Skipping button beyond panel capacity");
                continue;
            }
            if !button.enabled {
                continue;
            }
            let tile = render_tile(button, page, info.tile_size());
            if let Err(err) = self.device.set_button_bitmap(*slot, Some(&tile)) {
                warn!(slot = *slot, error = %err, "Tile upload failed");
            }
        }
    }

    /// Repaint a single tile from the current page's state.
    fn refresh_tile(&self, state: &Shared, slot: u8) {
        let Some(info) = &state.info else { return };
        if slot >= info.key_count {
            return;
        }
        let page = state.config.current_page();
        let bitmap = page
            .buttons
            .get(&slot)
            .filter(|button| button.enabled)
            .map(|button| render_tile(button, page, info.tile_size()));
        if let Err(err) = self.device.set_button_bitmap(slot, bitmap.as_ref()) {
            warn!(slot, error = %err, "Tile update failed");
        }
    }

    /// Redraw the paging strip, if the panel has one.
    fn refresh_strip(&self, state: &Shared) {
        let Some(info) = &state.info else { return };
        let Some(strip) = info.strip else { return };

        let page = state.config.current_page();
        let (index, total) = state.config.current_position();
        let bg = page.bg_color.unwrap_or(DEFAULT_BG_COLOR);
        let fg = page.text_color.unwrap_or(DEFAULT_TEXT_COLOR);
        let orientation = if strip.native {
            StripOrientation::Native
        } else {
            StripOrientation::Rotated180
        };
        let image = render::render_strip(
            &page.title,
            index,
            total,
            bg,
            fg,
            (strip.width, strip.height),
            orientation,
        );
        if let Err(err) = self.device.send_strip_image(&image) {
            warn!(error = %err, "Strip update failed");
        }
    }

    /// Make a page current, persist, and repaint everything.
    fn activate_page(&self, state: &mut MutexGuard<'_, Shared>, id: String) {
        info!(page = %id, "Switching page");
        state.config.current_page_id = id;
        self.store.save(&state.config);
        self.render_full(state);
    }

    fn lock_state(&self) -> MutexGuard<'_, Shared> {
        self.state.lock().expect("controller state poisoned")
    }
}

/// Resolve what a press on a content slot should do.
///
/// Unconfigured, disabled, and action-less buttons are a no-op, as is an
/// action without a plugin id.
fn resolve_button_action(config: &DeckConfig, slot: u8) -> Dispatch {
    let page = config.current_page();
    let Some(button) = page.buttons.get(&slot) else {
        debug!(slot, "Press on unconfigured slot");
        return Dispatch::Ignore;
    };
    if !button.enabled {
        return Dispatch::Ignore;
    }
    let Some(action) = &button.action else {
        return Dispatch::Ignore;
    };
    if action.kind == ActionKind::None {
        return Dispatch::Ignore;
    }
    let Some(plugin_id) = &action.plugin_id else {
        return Dispatch::Ignore;
    };

    Dispatch::Action(ActionJob {
        plugin_id: plugin_id.clone(),
        slot,
        parameters: action.config.clone(),
        context: RenderContext {
            bg_color: button.bg_color,
            text_color: button.text_color,
            font_size: button.font_size,
        },
    })
}

/// Render one button's bitmap with page color inheritance applied.
fn render_tile(button: &Button, page: &Page, tile_size: (u32, u32)) -> RgbImage {
    let (bg, fg) = button.effective_colors(page);
    render::render_button(
        &button.label,
        button.icon.as_deref(),
        button.font_size,
        bg,
        fg,
        tile_size,
    )
}
