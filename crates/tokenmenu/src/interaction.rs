//! Click/drag disambiguation for owned tokens.
//!
//! Left presses reach us through a wrapper around the host's per-token click
//! method, after which the host performs its own selection. Right presses are
//! observed on the token layer. Every press on an owned token arms an
//! interaction record that either turns into a drag (menu suppressed) or is
//! released as a click (toggle, deferred open, or nothing).

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{InteractionConfig, MODULE_ID};
use crate::geometry::Vec2;
use crate::host::{
    Canvas, ClickWrapper, CloseReason, Coordinator, Hook, HookArgs, HookBus, HostError,
    MenuActions, PointerEvent, PointerEventKind, SceneId, Settings, TokenHandle, TokenId,
    TokenRef, WrapperMode, WrapperRegistry,
};
use crate::runtime::{
    DragTracker, FrameScheduler, MergeOptions, ResourceTracker, StateContainer, StateError,
    TaskHandle, TimingMarks, TrackedListener, WeakTokenMap,
};
use crate::scene_graph::SceneNode;

/// Wrapped host method receiving primary presses on tokens.
pub const LEFT_CLICK_TARGET: &str = "Token.prototype._onClickLeft";

const DEFERRED_OPEN_TASK: &str = "tokenmenu.deferred-open";
const SELECTION_CLEAR_TASK: &str = "tokenmenu.selection-clear";
const HOUSEKEEPING_TASK: &str = "tokenmenu.housekeeping";
const MENU_TOGGLED_MARK: &str = "menu-toggled";

#[derive(Debug, Clone, Copy)]
struct InteractionRecord {
    start: Vec2,
    is_dragging: bool,
    was_already_selected: bool,
    opened_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct TokenListeners {
    pointer_move: TrackedListener,
    pointer_up: TrackedListener,
    pointer_up_outside: TrackedListener,
}

#[derive(Debug, Clone)]
struct PendingOpen {
    handle: TaskHandle,
    token: TokenId,
}

struct LayerHandler {
    layer: Weak<SceneNode>,
    listener: TrackedListener,
}

#[derive(Default)]
struct ClickState {
    layer_handler: Option<LayerHandler>,
    pending_open: Option<PendingOpen>,
    last_scene_id: Option<SceneId>,
    controlled: WeakTokenMap<()>,
    active_presses: WeakTokenMap<InteractionRecord>,
    listeners: WeakTokenMap<TokenListeners>,
}

pub struct InteractionDeps {
    pub canvas: Rc<dyn Canvas>,
    pub hooks: Rc<dyn HookBus>,
    pub wrappers: Rc<dyn WrapperRegistry>,
    pub coordinator: Rc<dyn Coordinator>,
    pub settings: Rc<dyn Settings>,
    pub menus: Rc<dyn MenuActions>,
    pub scheduler: Rc<FrameScheduler>,
    pub drags: Rc<DragTracker>,
}

pub struct TokenInteraction {
    me: Weak<TokenInteraction>,
    canvas: Rc<dyn Canvas>,
    hooks: Rc<dyn HookBus>,
    wrappers: Rc<dyn WrapperRegistry>,
    coordinator: Rc<dyn Coordinator>,
    settings: Rc<dyn Settings>,
    menus: Rc<dyn MenuActions>,
    scheduler: Rc<FrameScheduler>,
    drags: Rc<DragTracker>,
    config: RefCell<StateContainer<InteractionConfig>>,
    state: RefCell<ClickState>,
    marks: TimingMarks,
    resources: ResourceTracker,
    active: Cell<bool>,
}

impl TokenInteraction {
    pub fn new(deps: InteractionDeps, config: &InteractionConfig) -> Result<Rc<Self>, StateError> {
        let config = StateContainer::with_initial(config)?;
        let marks = TimingMarks::new(deps.scheduler.clock());
        Ok(Rc::new_cyclic(|me| Self {
            me: me.clone(),
            canvas: deps.canvas,
            hooks: deps.hooks,
            wrappers: deps.wrappers,
            coordinator: deps.coordinator,
            settings: deps.settings,
            menus: deps.menus,
            scheduler: deps.scheduler,
            drags: deps.drags,
            config: RefCell::new(config),
            state: RefCell::new(ClickState::default()),
            marks,
            resources: ResourceTracker::new("token_interaction"),
            active: Cell::new(false),
        }))
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn config(&self) -> InteractionConfig {
        match self.config.borrow().get_copy() {
            Ok(config) => config,
            Err(error) => {
                warn!(error = %error, "interaction_config_unreadable");
                InteractionConfig::default()
            }
        }
    }

    /// Deep-merges a camelCase partial into the live thresholds.
    pub fn update_config(&self, partial: &Value) -> Result<InteractionConfig, StateError> {
        let mut config = self.config.borrow_mut();
        config.update(partial, MergeOptions::default())?;
        config.get_copy()
    }

    pub fn reset_config(&self) -> Result<(), StateError> {
        self.config.borrow_mut().reset()
    }

    /// Installs the click wrapper, the host hooks and the housekeeping ticker.
    pub fn activate(&self) -> Result<(), HostError> {
        if self.active.replace(true) {
            return Ok(());
        }

        let me = self.me.clone();
        let wrapper: ClickWrapper = Rc::new(move |token, event, original| match me.upgrade() {
            Some(this) => this.handle_left_press(token, event, original),
            None => original(),
        });
        if let Err(error) =
            self.wrappers
                .register(MODULE_ID, LEFT_CLICK_TARGET, wrapper, WrapperMode::Wrapper)
        {
            self.active.set(false);
            return Err(error);
        }
        let wrappers = Rc::clone(&self.wrappers);
        self.resources.on_teardown(move || {
            wrappers.unregister(MODULE_ID, LEFT_CLICK_TARGET);
        });

        self.register_hooks();

        let me = self.me.clone();
        let every = self.config().selection_timeout();
        let housekeeping = self.scheduler.repeat(HOUSEKEEPING_TASK, every, move || {
            if let Some(this) = me.upgrade() {
                this.prune_dropped_tokens();
            }
        });
        self.resources
            .register_ticker(HOUSEKEEPING_TASK, &self.scheduler, housekeeping);

        if self.canvas.is_ready() {
            self.state.borrow_mut().last_scene_id = self.canvas.scene_id();
            self.ensure_layer_handler();
            for token in self.coordinator.controlled_tokens() {
                if token.is_owner() {
                    self.state.borrow_mut().controlled.insert(&token, ());
                }
            }
        }

        info!(module = MODULE_ID, "token_interaction_activated");
        Ok(())
    }

    fn register_hooks(&self) {
        let me = self.me.clone();
        self.resources.on_canvas_ready(&self.hooks, move |scene_id: &SceneId| {
            if let Some(this) = me.upgrade() {
                this.on_canvas_ready(scene_id);
            }
        });

        let me = self.me.clone();
        self.resources.register_hook(
            &self.hooks,
            Hook::ControlToken,
            Rc::new(move |args| {
                if let (Some(this), HookArgs::ControlToken { token, controlled }) =
                    (me.upgrade(), args)
                {
                    this.on_control_token(token, *controlled);
                }
                Ok(())
            }),
        );

        let me = self.me.clone();
        self.resources.register_hook(
            &self.hooks,
            Hook::DeleteToken,
            Rc::new(move |args| {
                if let (Some(this), HookArgs::DeleteToken { token_id }) = (me.upgrade(), args) {
                    this.on_delete_token(token_id);
                }
                Ok(())
            }),
        );
    }

    /// Releases everything `activate` installed. Safe to call repeatedly.
    pub fn teardown(&self) {
        if !self.active.replace(false) {
            return;
        }
        self.cancel_pending_open("teardown");
        self.resources.teardown();
        self.marks.clear(MENU_TOGGLED_MARK);
        *self.state.borrow_mut() = ClickState::default();
        self.drags.clear_all();
        info!(module = MODULE_ID, "token_interaction_torn_down");
    }

    fn debug_enabled(&self) -> bool {
        self.settings.is_debug_enabled()
    }

    fn is_sole_selection(&self, token: &TokenRef) -> bool {
        token.is_controlled() && self.coordinator.is_only_controlled_token(token)
    }

    fn handle_left_press(&self, token: &TokenRef, event: &PointerEvent, original: &dyn Fn()) {
        if !self.active.get() || !token.is_owner() {
            original();
            return;
        }

        self.cancel_pending_open("press");
        let was_already_selected = self.is_sole_selection(token);
        self.ensure_token_listeners(token);
        let record = InteractionRecord {
            start: event.global,
            is_dragging: false,
            was_already_selected,
            opened_at: self.scheduler.clock().now(),
        };
        self.state
            .borrow_mut()
            .active_presses
            .insert(token, record);
        self.drags.start_drag(token, event.global);

        if self.debug_enabled() {
            debug!(
                token = %token.id(),
                was_already_selected,
                x = event.global.x,
                y = event.global.y,
                "token_press_armed"
            );
        }

        original();
    }

    fn ensure_token_listeners(&self, token: &TokenRef) {
        if self.state.borrow().listeners.contains(token) {
            return;
        }
        // Listeners left behind by a different token object with the same id.
        self.detach_token_listeners(&token.id());

        let listeners = TokenListeners {
            pointer_move: self.track_token_event(token, PointerEventKind::Move),
            pointer_up: self.track_token_event(token, PointerEventKind::Up),
            pointer_up_outside: self.track_token_event(token, PointerEventKind::UpOutside),
        };
        self.state.borrow_mut().listeners.insert(token, listeners);
        self.drags.set_listeners_installed(token, true);
    }

    fn track_token_event(&self, token: &TokenRef, kind: PointerEventKind) -> TrackedListener {
        let me = self.me.clone();
        let weak_token = Rc::downgrade(token);
        self.resources.register_listener(
            token,
            kind,
            Rc::new(move |event: &PointerEvent| {
                let (Some(this), Some(token)) = (me.upgrade(), weak_token.upgrade()) else {
                    return;
                };
                match kind {
                    PointerEventKind::Move => this.on_pointer_move(&token, event),
                    _ => this.on_pointer_release(&token, event),
                }
            }),
        )
    }

    fn detach_token_listeners(&self, token_id: &TokenId) {
        let removed = self.state.borrow_mut().listeners.remove_id(token_id);
        let Some((token, listeners)) = removed else {
            return;
        };
        self.release_listeners(listeners);
        if let Some(token) = token {
            self.drags.set_listeners_installed(&token, false);
        }
    }

    fn release_listeners(&self, listeners: TokenListeners) {
        self.resources.release_listener(listeners.pointer_move);
        self.resources.release_listener(listeners.pointer_up);
        self.resources.release_listener(listeners.pointer_up_outside);
    }

    fn on_pointer_move(&self, token: &TokenRef, event: &PointerEvent) {
        let threshold = self.config().drag_threshold_pixels;
        self.drags.update_movement(token, event.global, threshold);

        let started_drag = {
            let mut state = self.state.borrow_mut();
            let Some(record) = state.active_presses.get_mut(token) else {
                return;
            };
            if record.is_dragging {
                return;
            }
            let dx = (event.global.x - record.start.x).abs();
            let dy = (event.global.y - record.start.y).abs();
            if dx > threshold || dy > threshold {
                record.is_dragging = true;
                Some(record.was_already_selected)
            } else {
                None
            }
        };
        let Some(was_already_selected) = started_drag else {
            return;
        };

        if self.debug_enabled() {
            debug!(token = %token.id(), "token_drag_detected");
        }
        self.cancel_pending_open("drag");
        if was_already_selected && self.coordinator.is_menu_open() {
            self.close_menu(CloseReason::Drag);
        }
    }

    fn on_pointer_release(&self, token: &TokenRef, event: &PointerEvent) {
        let record = self.state.borrow_mut().active_presses.remove(token);
        let Some(record) = record else {
            return;
        };
        self.drags.end_drag(token);

        if record.is_dragging {
            if self.debug_enabled() {
                debug!(token = %token.id(), "token_drag_released");
            }
            return;
        }
        if self.is_within_click_debounce() {
            if self.debug_enabled() {
                debug!(token = %token.id(), "token_release_debounced");
            }
            return;
        }

        let now_selected = self.is_sole_selection(token);
        if self.debug_enabled() {
            let held_ms = self
                .scheduler
                .clock()
                .now()
                .saturating_duration_since(record.opened_at)
                .as_millis();
            debug!(
                token = %token.id(),
                was_selected = record.was_already_selected,
                now_selected,
                held_ms,
                x = event.global.x,
                y = event.global.y,
                "token_click_released"
            );
        }

        match (record.was_already_selected, now_selected) {
            (true, true) => {
                if self.coordinator.is_menu_open() {
                    self.close_menu(CloseReason::Toggle);
                    self.marks.mark(MENU_TOGGLED_MARK);
                } else {
                    self.open_menu(token);
                }
            }
            (false, true) if self.settings.show_menu_on_selection() => {
                self.schedule_deferred_open(token);
            }
            _ => {}
        }
    }

    /// A click released shortly after the menu was last opened or toggled shut is ignored.
    fn is_within_click_debounce(&self) -> bool {
        let debounce = self.config().click_debounce();
        self.marks
            .elapsed(MENU_TOGGLED_MARK)
            .is_some_and(|elapsed| elapsed < debounce)
    }

    fn schedule_deferred_open(&self, token: &TokenRef) {
        let me = self.me.clone();
        let weak_token = Rc::downgrade(token);
        let delay = self.config().drag_detection_delay();
        let handle = self.scheduler.delay(DEFERRED_OPEN_TASK, delay, move || {
            if let Some(this) = me.upgrade() {
                this.run_deferred_open(weak_token.upgrade());
            }
        });
        self.state.borrow_mut().pending_open = Some(PendingOpen {
            handle,
            token: token.id(),
        });
    }

    fn run_deferred_open(&self, token: Option<TokenRef>) {
        self.state.borrow_mut().pending_open = None;
        let Some(token) = token else {
            return;
        };
        let still_pressed = self.state.borrow().active_presses.contains(&token);
        if !self.canvas.is_ready()
            || !token.is_owner()
            || still_pressed
            || self.drags.is_dragging(&token)
            || !self.is_sole_selection(&token)
        {
            if self.debug_enabled() {
                debug!(token = %token.id(), "deferred_open_skipped");
            }
            return;
        }
        self.open_menu(&token);
    }

    fn cancel_pending_open(&self, reason: &'static str) {
        let pending = self.state.borrow_mut().pending_open.take();
        if let Some(pending) = pending {
            self.scheduler.cancel(pending.handle);
            if self.debug_enabled() {
                debug!(token = %pending.token, reason, "deferred_open_cancelled");
            }
        }
    }

    fn open_menu(&self, token: &TokenRef) {
        if self.coordinator.is_processing_selection() {
            if self.debug_enabled() {
                debug!(token = %token.id(), "menu_open_skipped_busy");
            }
            return;
        }
        self.coordinator.start_selection_processing();
        if let Err(error) = self.menus.show_weapon_menu_under_token(token) {
            warn!(token = %token.id(), error = %error, "weapon_menu_open_failed");
        }
        self.coordinator.clear_selection_processing();
        self.marks.mark(MENU_TOGGLED_MARK);
    }

    fn close_menu(&self, reason: CloseReason) {
        if let Err(error) = self.menus.close_weapon_menu(reason) {
            warn!(reason = reason.as_str(), error = %error, "weapon_menu_close_failed");
        }
    }

    fn on_control_token(&self, token: &TokenRef, controlled: bool) {
        if !token.is_owner() {
            return;
        }
        if controlled {
            self.state.borrow_mut().controlled.insert(token, ());
        } else {
            let had_press = {
                let mut state = self.state.borrow_mut();
                state.controlled.remove(token);
                state.active_presses.remove(token).is_some()
            };
            self.detach_token_listeners(&token.id());
            if had_press {
                self.drags.reset(token);
            }
        }

        let selection = self.coordinator.controlled_tokens();
        let count = selection.len();
        if self.debug_enabled() {
            debug!(token = %token.id(), controlled, count, "token_control_changed");
        }
        if count > 0 {
            self.resources.release_ticker(SELECTION_CLEAR_TASK);
        }
        if count > 1 {
            self.cancel_pending_open("multi_select");
            if self.coordinator.is_menu_open() {
                self.close_menu(CloseReason::MultiSelect);
            }
        } else if count == 0 {
            if self.coordinator.is_menu_open() {
                self.schedule_selection_clear();
            }
        } else if self.menu_owner_left_selection(&selection) {
            self.close_menu(CloseReason::Deselected);
        }
    }

    /// True when our menu is open for a token that is not among `selection`.
    fn menu_owner_left_selection(&self, selection: &[TokenRef]) -> bool {
        self.menus
            .menu_token()
            .is_some_and(|owner| selection.iter().all(|token| token.id() != owner))
    }

    fn schedule_selection_clear(&self) {
        let me = self.me.clone();
        let delay = self.config().selection_clear_delay();
        let handle = self.scheduler.delay(SELECTION_CLEAR_TASK, delay, move || {
            if let Some(this) = me.upgrade() {
                this.run_selection_clear();
            }
        });
        self.resources
            .register_ticker(SELECTION_CLEAR_TASK, &self.scheduler, handle);
    }

    fn run_selection_clear(&self) {
        if !self.coordinator.is_menu_open() {
            return;
        }
        let selection = self.coordinator.controlled_tokens();
        if selection.len() != 1 || self.menu_owner_left_selection(&selection) {
            self.close_menu(CloseReason::Deselected);
        }
    }

    fn on_canvas_ready(&self, scene_id: &SceneId) {
        let previous = self
            .state
            .borrow_mut()
            .last_scene_id
            .replace(scene_id.clone());
        if previous.as_ref() == Some(scene_id) {
            self.ensure_layer_handler();
            return;
        }

        self.cancel_pending_open("scene_change");
        self.resources.release_ticker(SELECTION_CLEAR_TASK);
        self.marks.clear(MENU_TOGGLED_MARK);
        let listeners = {
            let mut state = self.state.borrow_mut();
            state.controlled = WeakTokenMap::default();
            state.active_presses = WeakTokenMap::default();
            state.listeners.drain_values()
        };
        for listeners in listeners {
            self.release_listeners(listeners);
        }
        self.drags.clear_all();
        if self.coordinator.is_menu_open() || self.menus.menu_token().is_some() {
            self.close_menu(CloseReason::SceneChange);
        }
        self.ensure_layer_handler();

        info!(
            scene = %scene_id,
            previous = previous.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
            "interaction_scene_changed"
        );
    }

    fn ensure_layer_handler(&self) {
        let layer = self.canvas.token_layer();
        let stale = {
            let mut state = self.state.borrow_mut();
            let current = state
                .layer_handler
                .as_ref()
                .is_some_and(|handler| std::ptr::eq(handler.layer.as_ptr(), Rc::as_ptr(&layer)));
            if current {
                return;
            }
            state.layer_handler.take()
        };
        if let Some(stale) = stale {
            self.resources.release_listener(stale.listener);
        }

        let me = self.me.clone();
        let listener = self.resources.register_listener(
            &layer,
            PointerEventKind::RightDown,
            Rc::new(move |event: &PointerEvent| {
                if let Some(this) = me.upgrade() {
                    this.on_layer_right_press(event);
                }
            }),
        );
        self.state.borrow_mut().layer_handler = Some(LayerHandler {
            layer: Rc::downgrade(&layer),
            listener,
        });
    }

    fn on_layer_right_press(&self, event: &PointerEvent) {
        let Some(token_id) = event
            .target
            .as_ref()
            .and_then(|target| target.find_token_ancestor())
        else {
            return;
        };
        let Some(token) = self.canvas.token(&token_id) else {
            return;
        };
        if !token.is_owner() {
            return;
        }
        if self.debug_enabled() {
            debug!(token = %token_id, "token_right_press");
        }
        self.cancel_pending_open("right_click");
        if self.coordinator.is_menu_open() {
            self.close_menu(CloseReason::RightClick);
        }
    }

    fn on_delete_token(&self, token_id: &TokenId) {
        let pending_for_token = self
            .state
            .borrow()
            .pending_open
            .as_ref()
            .is_some_and(|pending| &pending.token == token_id);
        if pending_for_token {
            self.cancel_pending_open("token_deleted");
        }

        let token = {
            let mut state = self.state.borrow_mut();
            let controlled = state.controlled.remove_id(token_id);
            let pressed = state.active_presses.remove_id(token_id);
            controlled
                .and_then(|(token, _)| token)
                .or_else(|| pressed.and_then(|(token, _)| token))
        };
        self.detach_token_listeners(token_id);
        if let Some(token) = token {
            self.drags.forget(&token);
        }
        self.coordinator.remove_movement_tracker(token_id);

        if self.menus.menu_token().as_ref() == Some(token_id) {
            self.close_menu(CloseReason::TokenDeleted);
        }
        if self.debug_enabled() {
            debug!(token = %token_id, "token_evicted");
        }
    }

    fn prune_dropped_tokens(&self) {
        let dead_listeners = {
            let mut state = self.state.borrow_mut();
            state.controlled.prune();
            state.active_presses.prune();
            state.listeners.take_dead()
        };
        let released = dead_listeners.len();
        for listeners in dead_listeners {
            self.release_listeners(listeners);
        }
        let drags = self.drags.prune();
        if released + drags > 0 && self.debug_enabled() {
            debug!(listeners = released, drags, "dropped_tokens_pruned");
        }
    }

    pub fn has_pending_open(&self) -> bool {
        self.state.borrow().pending_open.is_some()
    }

    pub fn controlled_count(&self) -> usize {
        self.state.borrow().controlled.len()
    }

    pub fn is_tracking_controlled(&self, token: &TokenRef) -> bool {
        self.state.borrow().controlled.contains(token)
    }

    pub fn has_active_press(&self, token: &TokenRef) -> bool {
        self.state.borrow().active_presses.contains(token)
    }

    pub fn has_token_listeners(&self, token: &TokenRef) -> bool {
        self.state.borrow().listeners.contains(token)
    }

    pub fn listener_token_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn is_layer_handler_installed(&self) -> bool {
        self.state
            .borrow()
            .layer_handler
            .as_ref()
            .is_some_and(|handler| handler.layer.strong_count() > 0)
    }
}
