//! Integration tests for the deck controller.
//!
//! Everything runs against the mock panel and a recording plugin invoker;
//! no hardware is required.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use deckhand::config::{
    ActionKind, Button, ButtonAction, ConfigStore, DeckConfig, Page, DEFAULT_PAGE_ID,
};
use deckhand::controller::DeckController;
use deckhand::device::mock::{MockPanel, Operation};
use deckhand::device::SharedLink;
use deckhand::error::{DeckError, Result};
use deckhand::plugin::{PluginInvoker, RenderContext};

// ===== Test Doubles =====

/// Invoker that records calls and can be told to fail specific plugin ids.
#[derive(Default)]
struct RecordingInvoker {
    calls: Mutex<Vec<(String, u8, RenderContext)>>,
    failing_ids: Vec<String>,
}

impl RecordingInvoker {
    fn failing(ids: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing_ids: ids.iter().map(ToString::to_string).collect(),
        }
    }

    fn calls(&self) -> Vec<(String, u8, RenderContext)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PluginInvoker for RecordingInvoker {
    fn execute(
        &self,
        plugin_id: &str,
        slot: u8,
        _parameters: &serde_json::Map<String, serde_json::Value>,
        context: &RenderContext,
    ) -> Result<()> {
        if self.failing_ids.iter().any(|id| id == plugin_id) {
            return Err(DeckError::PluginFailed {
                id: plugin_id.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        self.calls
            .lock()
            .unwrap()
            .push((plugin_id.to_string(), slot, *context));
        Ok(())
    }
}

// ===== Fixtures =====

struct Fixture {
    panel: Arc<MockPanel>,
    invoker: Arc<RecordingInvoker>,
    controller: DeckController,
    store: ConfigStore,
    _dir: TempDir,
}

fn fixture_with(panel: MockPanel, invoker: RecordingInvoker, seed: Option<&DeckConfig>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deck.json");
    if let Some(config) = seed {
        ConfigStore::new(&path).save(config);
    }
    let panel = Arc::new(panel);
    let invoker = Arc::new(invoker);
    let link: SharedLink = panel.clone();
    let controller = DeckController::new(link, ConfigStore::new(&path), invoker.clone());
    Fixture {
        panel,
        invoker,
        controller,
        store: ConfigStore::new(&path),
        _dir: dir,
    }
}

fn plugin_button(slot: u8, plugin_id: &str) -> Button {
    let mut button = Button::new(slot);
    button.label = format!("btn-{slot}");
    button.action = Some(ButtonAction {
        kind: ActionKind::Plugin,
        plugin_id: Some(plugin_id.to_string()),
        config: serde_json::Map::new(),
    });
    button
}

fn two_page_seed() -> DeckConfig {
    DeckConfig {
        pages: vec![Page::new("first", "First"), Page::new("second", "Second")],
        current_page_id: "first".to_string(),
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not met within deadline");
}

// ===== Startup and Rendering =====

#[test]
fn test_start_renders_current_page() {
    let mut seed = DeckConfig::default_config();
    seed.pages[0]
        .buttons
        .insert(0, plugin_button(0, "shell"));
    seed.pages[0]
        .buttons
        .insert(2, plugin_button(2, "lights"));

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();

    fx.panel.assert_contains(&Operation::SetBrightness { level: 100 });
    fx.panel.assert_contains(&Operation::ClearAll);
    fx.panel.assert_contains(&Operation::SetTile { slot: 0 });
    fx.panel.assert_contains(&Operation::SetTile { slot: 2 });
    fx.panel.assert_contains(&Operation::SendStrip);
    fx.panel.assert_tile_blank(1);

    let strips = fx.panel.strip_images();
    assert_eq!(strips.len(), 1);
    assert_eq!(strips[0].dimensions(), (248, 58));

    fx.controller.stop();
}

#[test]
fn test_start_failure_leaves_controller_disconnected() {
    let panel = MockPanel::neo();
    panel.fail_next_connect(DeckError::NoDevicesFound);
    let fx = fixture_with(panel, RecordingInvoker::default(), None);

    assert!(matches!(
        fx.controller.start(),
        Err(DeckError::NoDevicesFound)
    ));
    assert!(!fx.controller.is_connected());

    // A retry succeeds once the device shows up.
    fx.controller.start().unwrap();
    assert!(fx.controller.is_connected());
    fx.controller.stop();
}

#[test]
fn test_disabled_button_is_not_rendered() {
    let mut seed = DeckConfig::default_config();
    let mut button = plugin_button(3, "shell");
    button.enabled = false;
    seed.pages[0].buttons.insert(3, button);

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();
    fx.panel.assert_tile_blank(3);
    fx.controller.stop();
}

#[test]
fn test_color_inheritance_on_rendered_tiles() {
    let mut seed = DeckConfig::default_config();
    seed.pages[0].bg_color = Some((10, 20, 30));
    // Default colors inherit the page palette.
    seed.pages[0].buttons.insert(0, plugin_button(0, "a"));
    // Explicit colors win.
    let mut styled = plugin_button(1, "b");
    styled.bg_color = (5, 5, 5);
    seed.pages[0].buttons.insert(1, styled);

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();

    assert_eq!(fx.panel.tile_bitmap(0).get_pixel(0, 0).0, [10, 20, 30]);
    assert_eq!(fx.panel.tile_bitmap(1).get_pixel(0, 0).0, [5, 5, 5]);
    fx.controller.stop();
}

// ===== Key Dispatch =====

#[test]
fn test_press_dispatches_actions_in_order() {
    let mut seed = DeckConfig::default_config();
    seed.pages[0].buttons.insert(0, plugin_button(0, "shell"));
    seed.pages[0].buttons.insert(2, plugin_button(2, "lights"));

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();

    fx.panel.queue_key_press(2);
    fx.panel.queue_key_press(0);
    fx.controller.pump_events();

    wait_until(|| fx.invoker.calls().len() == 2);
    let calls = fx.invoker.calls();
    assert_eq!(calls[0].0, "lights");
    assert_eq!(calls[0].1, 2);
    assert_eq!(calls[1].0, "shell");
    assert_eq!(calls[1].1, 0);
    fx.controller.stop();
}

#[test]
fn test_press_on_unconfigured_slot_is_noop() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), None);
    fx.controller.start().unwrap();

    fx.panel.queue_key_press(5);
    fx.controller.pump_events();

    std::thread::sleep(Duration::from_millis(50));
    assert!(fx.invoker.calls().is_empty());
    fx.controller.stop();
}

#[test]
fn test_press_on_disabled_button_is_noop() {
    let mut seed = DeckConfig::default_config();
    let mut button = plugin_button(1, "shell");
    button.enabled = false;
    seed.pages[0].buttons.insert(1, button);

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();
    fx.panel.queue_key_press(1);
    fx.controller.pump_events();

    std::thread::sleep(Duration::from_millis(50));
    assert!(fx.invoker.calls().is_empty());
    fx.controller.stop();
}

#[test]
fn test_render_context_carries_button_styling() {
    let mut seed = DeckConfig::default_config();
    let mut button = plugin_button(0, "shell");
    button.bg_color = (1, 2, 3);
    button.text_color = (4, 5, 6);
    button.font_size = 18;
    seed.pages[0].buttons.insert(0, button);

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();
    fx.panel.queue_key_press(0);
    fx.controller.pump_events();

    wait_until(|| fx.invoker.calls().len() == 1);
    let context = fx.invoker.calls()[0].2;
    assert_eq!(context.bg_color, (1, 2, 3));
    assert_eq!(context.text_color, (4, 5, 6));
    assert_eq!(context.font_size, 18);
    fx.controller.stop();
}

#[test]
fn test_failing_action_does_not_block_subsequent_presses() {
    let mut seed = DeckConfig::default_config();
    seed.pages[0].buttons.insert(0, plugin_button(0, "boom"));
    seed.pages[0].buttons.insert(1, plugin_button(1, "ok"));

    let fx = fixture_with(
        MockPanel::neo(),
        RecordingInvoker::failing(&["boom"]),
        Some(&seed),
    );
    fx.controller.start().unwrap();

    fx.panel.queue_key_press(0);
    fx.panel.queue_key_press(1);
    fx.controller.pump_events();

    wait_until(|| fx.invoker.calls().len() == 1);
    assert_eq!(fx.invoker.calls()[0].0, "ok");
    fx.controller.stop();
}

#[test]
fn test_reserved_slots_page_through_the_model() {
    // Neo has 8 keys; slots 8 and 9 are the reserved paging slots.
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&two_page_seed()));
    fx.controller.start().unwrap();

    fx.panel.queue_key_press(9);
    fx.controller.pump_events();
    assert_eq!(fx.controller.config_snapshot().current_page_id, "second");

    fx.panel.queue_key_press(8);
    fx.controller.pump_events();
    assert_eq!(fx.controller.config_snapshot().current_page_id, "first");

    // Presses past the reserved slots are ignored.
    fx.panel.queue_key_press(10);
    fx.controller.pump_events();
    assert_eq!(fx.controller.config_snapshot().current_page_id, "first");
    fx.controller.stop();
}

#[test]
fn test_touch_edges_page_through_the_model() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&two_page_seed()));
    fx.controller.start().unwrap();

    fx.panel.queue_touch(200, 29);
    fx.controller.pump_events();
    assert_eq!(fx.controller.config_snapshot().current_page_id, "second");

    fx.panel.queue_touch(10, 29);
    fx.controller.pump_events();
    assert_eq!(fx.controller.config_snapshot().current_page_id, "first");

    // The middle of the bar is not a paging zone.
    fx.panel.queue_touch(120, 29);
    fx.controller.pump_events();
    assert_eq!(fx.controller.config_snapshot().current_page_id, "first");
    fx.controller.stop();
}

// ===== Paging =====

#[test]
fn test_navigation_is_cyclic_in_stored_order() {
    let seed = DeckConfig {
        pages: vec![
            Page::new("a", "A"),
            Page::new("b", "B"),
            Page::new("c", "C"),
        ],
        current_page_id: "a".to_string(),
    };
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();

    for expected in ["b", "c", "a"] {
        fx.controller.next_page();
        assert_eq!(fx.controller.config_snapshot().current_page_id, expected);
    }
    fx.controller.prev_page();
    assert_eq!(fx.controller.config_snapshot().current_page_id, "c");
    fx.controller.stop();
}

#[test]
fn test_navigation_noop_with_single_page() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), None);
    fx.controller.start().unwrap();
    fx.panel.clear_operations();

    fx.controller.next_page();
    fx.controller.prev_page();

    assert_eq!(
        fx.controller.config_snapshot().current_page_id,
        DEFAULT_PAGE_ID
    );
    assert!(fx.panel.operations().is_empty(), "no-op must not touch the panel");
    fx.controller.stop();
}

#[test]
fn test_switch_page_persists_and_rerenders() {
    let mut seed = two_page_seed();
    seed.pages[1].buttons.insert(4, plugin_button(4, "shell"));

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();
    fx.panel.clear_operations();

    fx.controller.switch_page("second");

    fx.panel.assert_contains(&Operation::ClearAll);
    fx.panel.assert_contains(&Operation::SetTile { slot: 4 });
    fx.panel.assert_contains(&Operation::SendStrip);

    // The switch is persisted before returning.
    assert_eq!(fx.store.load().current_page_id, "second");
    fx.controller.stop();
}

#[test]
fn test_switch_to_unknown_page_is_noop() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&two_page_seed()));
    fx.controller.start().unwrap();
    fx.panel.clear_operations();

    fx.controller.switch_page("nope");
    assert_eq!(fx.controller.config_snapshot().current_page_id, "first");
    assert!(fx.panel.operations().is_empty());
    fx.controller.stop();
}

#[test]
fn test_create_page_refreshes_strip_only() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), None);
    fx.controller.start().unwrap();
    fx.panel.clear_operations();

    let id = fx.controller.create_page("Ops");

    let snapshot = fx.controller.config_snapshot();
    assert_eq!(snapshot.pages.len(), 2);
    assert_eq!(snapshot.pages[1].id, id);
    assert_eq!(snapshot.pages[1].title, "Ops");
    // Still on the original page: strip update only, no tile repaint.
    assert_eq!(snapshot.current_page_id, DEFAULT_PAGE_ID);
    assert_eq!(fx.panel.operations(), vec![Operation::SendStrip]);

    // Persisted immediately.
    assert_eq!(fx.store.load().pages.len(), 2);
    fx.controller.stop();
}

#[test]
fn test_delete_last_page_is_rejected() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), None);
    fx.controller.start().unwrap();

    let result = fx.controller.delete_page(DEFAULT_PAGE_ID);
    assert!(matches!(result, Err(DeckError::LastPage)));
    assert_eq!(fx.controller.config_snapshot().pages.len(), 1);
    fx.controller.stop();
}

#[test]
fn test_delete_current_page_activates_first_remaining() {
    let mut seed = two_page_seed();
    seed.current_page_id = "second".to_string();
    seed.pages[0].buttons.insert(1, plugin_button(1, "shell"));

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();
    fx.panel.clear_operations();

    fx.controller.delete_page("second").unwrap();

    let snapshot = fx.controller.config_snapshot();
    assert_eq!(snapshot.current_page_id, "first");
    assert_eq!(snapshot.pages.len(), 1);
    // Full re-render of the newly current page.
    fx.panel.assert_contains(&Operation::ClearAll);
    fx.panel.assert_contains(&Operation::SetTile { slot: 1 });
    fx.controller.stop();
}

#[test]
fn test_delete_other_page_refreshes_strip_only() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&two_page_seed()));
    fx.controller.start().unwrap();
    fx.panel.clear_operations();

    fx.controller.delete_page("second").unwrap();

    assert_eq!(fx.panel.operations(), vec![Operation::SendStrip]);
    assert_eq!(fx.controller.config_snapshot().current_page_id, "first");
    fx.controller.stop();
}

#[test]
fn test_update_current_page_title_refreshes_strip() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&two_page_seed()));
    fx.controller.start().unwrap();
    fx.panel.clear_operations();

    fx.controller
        .update_page("first", "Renamed", Some((40, 40, 40)), None)
        .unwrap();
    assert_eq!(fx.panel.operations(), vec![Operation::SendStrip]);

    fx.panel.clear_operations();
    fx.controller
        .update_page("second", "Also Renamed", None, None)
        .unwrap();
    assert!(fx.panel.operations().is_empty(), "non-current page rename is invisible");

    let persisted = fx.store.load();
    assert_eq!(persisted.pages[0].title, "Renamed");
    assert_eq!(persisted.pages[0].bg_color, Some((40, 40, 40)));
    assert_eq!(persisted.pages[1].title, "Also Renamed");
    fx.controller.stop();
}

// ===== Button CRUD =====

#[test]
fn test_update_button_persists_and_paints_tile() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), None);
    fx.controller.start().unwrap();
    fx.panel.clear_operations();

    fx.controller
        .update_button(3, plugin_button(3, "shell"))
        .unwrap();
    fx.panel.assert_contains(&Operation::SetTile { slot: 3 });
    assert_eq!(fx.store.load().pages[0].buttons[&3].label, "btn-3");

    // Disabling the button blanks the tile.
    let mut disabled = plugin_button(3, "shell");
    disabled.enabled = false;
    fx.controller.update_button(3, disabled).unwrap();
    fx.panel.assert_tile_blank(3);
    fx.controller.stop();
}

#[test]
fn test_update_button_rejects_out_of_range_slot() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), None);
    fx.controller.start().unwrap();

    let result = fx.controller.update_button(8, plugin_button(8, "shell"));
    assert!(matches!(
        result,
        Err(DeckError::InvalidSlot { slot: 8, key_count: 8 })
    ));
    fx.controller.stop();
}

#[test]
fn test_clear_button_blanks_tile_and_absent_is_noop() {
    let mut seed = DeckConfig::default_config();
    seed.pages[0].buttons.insert(2, plugin_button(2, "shell"));

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();
    fx.panel.clear_operations();

    fx.controller.clear_button(2);
    fx.panel.assert_contains(&Operation::ClearTile { slot: 2 });
    assert!(!fx.store.load().pages[0].buttons.contains_key(&2));

    fx.panel.clear_operations();
    fx.controller.clear_button(2);
    assert!(fx.panel.operations().is_empty());
    fx.controller.stop();
}

#[test]
fn test_swap_buttons_is_an_involution_in_the_document() {
    let mut seed = DeckConfig::default_config();
    seed.pages[0].buttons.insert(0, plugin_button(0, "a"));
    seed.pages[0].buttons.insert(5, plugin_button(5, "b"));

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();

    fx.controller.swap_buttons(DEFAULT_PAGE_ID, 0, 5).unwrap();
    let swapped = fx.store.load();
    assert_eq!(swapped.pages[0].buttons[&0].label, "btn-5");
    assert_eq!(swapped.pages[0].buttons[&0].slot, 0);
    assert_eq!(swapped.pages[0].buttons[&5].label, "btn-0");

    fx.controller.swap_buttons(DEFAULT_PAGE_ID, 0, 5).unwrap();
    let restored = fx.store.load();
    assert_eq!(restored.pages[0].buttons[&0].label, "btn-0");
    assert_eq!(restored.pages[0].buttons[&5].label, "btn-5");
    fx.controller.stop();
}

#[test]
fn test_swap_buttons_unknown_page() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), None);
    fx.controller.start().unwrap();
    assert!(matches!(
        fx.controller.swap_buttons("ghost", 0, 1),
        Err(DeckError::PageNotFound { .. })
    ));
    fx.controller.stop();
}

#[test]
fn test_move_button_lands_on_lowest_free_slot() {
    let mut seed = two_page_seed();
    seed.pages[0].buttons.insert(6, plugin_button(6, "mover"));
    seed.pages[1].buttons.insert(0, plugin_button(0, "x"));
    seed.pages[1].buttons.insert(1, plugin_button(1, "y"));

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();

    fx.controller.move_button("first", 6, "second").unwrap();

    let persisted = fx.store.load();
    assert!(!persisted.pages[0].buttons.contains_key(&6));
    let moved = &persisted.pages[1].buttons[&2];
    assert_eq!(moved.label, "btn-6");
    assert_eq!(moved.slot, 2);
    // Source tile was blanked on the current page.
    fx.panel.assert_tile_blank(6);
    fx.controller.stop();
}

#[test]
fn test_move_button_to_full_page_changes_nothing() {
    let mut seed = two_page_seed();
    seed.pages[0].buttons.insert(0, plugin_button(0, "mover"));
    for slot in 0..8 {
        seed.pages[1].buttons.insert(slot, plugin_button(slot, "filler"));
    }

    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();

    let result = fx.controller.move_button("first", 0, "second");
    assert!(matches!(result, Err(DeckError::TargetPageFull { .. })));

    let persisted = fx.store.load();
    assert!(persisted.pages[0].buttons.contains_key(&0));
    assert_eq!(persisted.pages[1].buttons.len(), 8);
    fx.controller.stop();
}

#[test]
fn test_move_button_from_empty_slot() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), Some(&two_page_seed()));
    fx.controller.start().unwrap();

    let result = fx.controller.move_button("first", 3, "second");
    assert!(matches!(result, Err(DeckError::ButtonNotFound { .. })));
    fx.controller.stop();
}

// ===== Degradation =====

#[test]
fn test_device_write_failure_does_not_poison_operations() {
    let fx = fixture_with(MockPanel::neo(), RecordingInvoker::default(), None);
    fx.controller.start().unwrap();

    // The next device write fails; the edit must still persist.
    fx.panel
        .inject_error(DeckError::DeviceCommunication("hiccup".to_string()));
    fx.controller
        .update_button(0, plugin_button(0, "shell"))
        .unwrap();
    assert!(fx.store.load().pages[0].buttons.contains_key(&0));

    // Subsequent operations work again.
    fx.controller
        .update_button(1, plugin_button(1, "shell"))
        .unwrap();
    fx.panel.assert_contains(&Operation::SetTile { slot: 1 });
    fx.controller.stop();
}

#[test]
fn test_strip_is_skipped_on_panels_without_one() {
    let mut seed = DeckConfig::default_config();
    seed.pages[0].buttons.insert(0, plugin_button(0, "shell"));

    let fx = fixture_with(MockPanel::mk2(), RecordingInvoker::default(), Some(&seed));
    fx.controller.start().unwrap();

    assert!(
        !fx.panel.operations().contains(&Operation::SendStrip),
        "stripless panel must not receive strip transfers"
    );
    fx.panel.assert_contains(&Operation::SetTile { slot: 0 });
    fx.controller.stop();
}
