//! In-memory host: a canvas with tokens, a hook bus, a wrapper registry and a
//! selection coordinator. It reproduces the host behaviours the interaction
//! core depends on, most importantly that left presses on tokens go through the
//! wrapped click method and perform selection before any listener sees them.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::warn;

use crate::geometry::{Rect, Vec2};
use crate::host::{
    Actor, ActorRef, Canvas, ClickWrapper, Coordinator, EventEmitter, EventTarget, Hook, HookArgs,
    HookBus, HookHandler, HookId, HostError, ItemId, Localization, MenuItem, Notifications,
    PointerEvent, PointerEventKind, SceneId, Settings, TokenHandle, TokenId, TokenRef,
    WrapperMode, WrapperRegistry,
};
use crate::interaction::LEFT_CLICK_TARGET;
use crate::overlay::Document;
use crate::runtime::{Clock, TimingMarks};
use crate::scene_graph::{NodeKind, SceneNode};

const SELECTION_MARK: &str = "selection-started";
const DEFAULT_TOKEN_SIZE_PX: f32 = 100.0;
const TOKEN_PLACEHOLDER_COLOR: u32 = 0x4a_6f_a5;

pub struct SimToken {
    id: TokenId,
    name: String,
    controlled: Cell<bool>,
    owner: bool,
    size: Vec2,
    actor: Option<ActorRef>,
    events: EventEmitter,
    node: Rc<SceneNode>,
}

pub struct SimTokenBuilder {
    id: String,
    name: Option<String>,
    owner: bool,
    controlled: bool,
    position: Vec2,
    size: Vec2,
    actor: Option<ActorRef>,
}

impl SimTokenBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn owner(mut self, owner: bool) -> Self {
        self.owner = owner;
        self
    }

    pub fn controlled(mut self, controlled: bool) -> Self {
        self.controlled = controlled;
        self
    }

    pub fn position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn size(mut self, size: Vec2) -> Self {
        self.size = size;
        self
    }

    pub fn actor(mut self, actor: ActorRef) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn build(self) -> Rc<SimToken> {
        let node = SceneNode::new(
            format!("token:{}", self.id),
            NodeKind::RoundedRect {
                width: self.size.x,
                height: self.size.y,
                radius: 0.0,
                fill: TOKEN_PLACEHOLDER_COLOR,
                alpha: 1.0,
                stroke: None,
            },
        );
        node.set_position(self.position);
        node.set_interactive(true);
        node.set_token_id(Some(TokenId(self.id.clone())));
        Rc::new(SimToken {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: TokenId(self.id),
            controlled: Cell::new(self.controlled),
            owner: self.owner,
            size: self.size,
            actor: self.actor,
            events: EventEmitter::default(),
            node,
        })
    }
}

impl SimToken {
    pub fn builder(id: &str) -> SimTokenBuilder {
        SimTokenBuilder {
            id: id.to_string(),
            name: None,
            owner: true,
            controlled: false,
            position: Vec2::ZERO,
            size: Vec2::new(DEFAULT_TOKEN_SIZE_PX, DEFAULT_TOKEN_SIZE_PX),
            actor: None,
        }
    }

    pub fn node(&self) -> Rc<SceneNode> {
        Rc::clone(&self.node)
    }

    pub fn set_controlled(&self, controlled: bool) {
        self.controlled.set(controlled);
    }

    pub fn bounds(&self) -> Rect {
        let origin = self.global_position();
        let size = self.size();
        Rect::new(origin.x, origin.y, size.x, size.y)
    }
}

impl EventTarget for SimToken {
    fn events(&self) -> &EventEmitter {
        &self.events
    }
}

impl TokenHandle for SimToken {
    fn id(&self) -> TokenId {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_controlled(&self) -> bool {
        self.controlled.get()
    }

    fn is_owner(&self) -> bool {
        self.owner
    }

    fn global_position(&self) -> Vec2 {
        self.node.to_global(Vec2::ZERO)
    }

    fn size(&self) -> Vec2 {
        let origin = self.node.to_global(Vec2::ZERO);
        let corner = self.node.to_global(self.size);
        Vec2::new(corner.x - origin.x, corner.y - origin.y)
    }

    fn actor(&self) -> Option<ActorRef> {
        self.actor.clone()
    }
}

#[derive(Default)]
pub struct SimActor {
    id: String,
    name: String,
    items: RefCell<Vec<MenuItem>>,
    activations: RefCell<Vec<ItemId>>,
    opened_sheets: RefCell<Vec<ItemId>>,
}

impl SimActor {
    pub fn new(id: &str, name: &str, items: Vec<MenuItem>) -> Rc<Self> {
        Rc::new(Self {
            id: id.to_string(),
            name: name.to_string(),
            items: RefCell::new(items),
            ..Self::default()
        })
    }

    pub fn set_items(&self, items: Vec<MenuItem>) {
        *self.items.borrow_mut() = items;
    }

    pub fn activations(&self) -> Vec<ItemId> {
        self.activations.borrow().clone()
    }

    pub fn opened_sheets(&self) -> Vec<ItemId> {
        self.opened_sheets.borrow().clone()
    }

    fn require_item(&self, item: &ItemId) -> Result<(), HostError> {
        if self.items.borrow().iter().any(|candidate| &candidate.id == item) {
            Ok(())
        } else {
            Err(HostError::ItemNotFound {
                actor: self.id.clone(),
                item: item.0.clone(),
            })
        }
    }
}

impl Actor for SimActor {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn items(&self) -> Vec<MenuItem> {
        self.items.borrow().clone()
    }

    fn activate_item(&self, item: &ItemId) -> Result<(), HostError> {
        self.require_item(item)?;
        self.activations.borrow_mut().push(item.clone());
        Ok(())
    }

    fn open_item_sheet(&self, item: &ItemId) -> Result<(), HostError> {
        self.require_item(item)?;
        self.opened_sheets.borrow_mut().push(item.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct LocalHookBus {
    next_id: Cell<u64>,
    handlers: RefCell<Vec<(HookId, Hook, HookHandler)>>,
}

impl LocalHookBus {
    pub fn handler_count(&self, hook: Hook) -> usize {
        self.handlers
            .borrow()
            .iter()
            .filter(|(_, registered, _)| *registered == hook)
            .count()
    }
}

impl HookBus for LocalHookBus {
    fn on(&self, hook: Hook, handler: HookHandler) -> HookId {
        let id = HookId(self.next_id.get());
        self.next_id.set(self.next_id.get().saturating_add(1));
        self.handlers.borrow_mut().push((id, hook, handler));
        id
    }

    fn off(&self, hook: Hook, id: HookId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(registered_id, registered, _)| !(*registered_id == id && *registered == hook));
        handlers.len() != before
    }

    fn call_all(&self, args: &mut HookArgs<'_>) -> usize {
        let hook = args.hook();
        let handlers = self
            .handlers
            .borrow()
            .iter()
            .filter(|(_, registered, _)| *registered == hook)
            .map(|(_, _, handler)| Rc::clone(handler))
            .collect::<Vec<_>>();

        let mut called = 0;
        for handler in handlers {
            if let Err(error) = handler(args) {
                warn!(hook = hook.as_str(), error = %error, "hook_handler_failed");
            }
            called += 1;
        }
        called
    }
}

#[derive(Default)]
pub struct LocalWrapperRegistry {
    wrappers: RefCell<HashMap<(String, String), ClickWrapper>>,
}

impl LocalWrapperRegistry {
    pub fn is_registered(&self, module_id: &str, target: &str) -> bool {
        self.wrappers
            .borrow()
            .contains_key(&(module_id.to_string(), target.to_string()))
    }

    /// Calls the wrapped method: every registered wrapper for `target` (there is
    /// normally one), or `original` directly when nothing wraps it.
    pub fn invoke(&self, target: &str, token: &TokenRef, event: &PointerEvent, original: &dyn Fn()) {
        let wrapper = self
            .wrappers
            .borrow()
            .iter()
            .find(|((_, registered_target), _)| registered_target == target)
            .map(|(_, wrapper)| Rc::clone(wrapper));
        match wrapper {
            Some(wrapper) => wrapper(token, event, original),
            None => original(),
        }
    }
}

impl WrapperRegistry for LocalWrapperRegistry {
    fn register(
        &self,
        module_id: &str,
        target: &str,
        wrapper: ClickWrapper,
        _mode: WrapperMode,
    ) -> Result<(), HostError> {
        let key = (module_id.to_string(), target.to_string());
        let mut wrappers = self.wrappers.borrow_mut();
        if wrappers.contains_key(&key) {
            return Err(HostError::WrapperConflict {
                module_id: module_id.to_string(),
                target: target.to_string(),
            });
        }
        wrappers.insert(key, wrapper);
        Ok(())
    }

    fn unregister(&self, module_id: &str, target: &str) -> bool {
        self.wrappers
            .borrow_mut()
            .remove(&(module_id.to_string(), target.to_string()))
            .is_some()
    }
}

struct PressedToken {
    token: Rc<SimToken>,
}

/// Canvas with a stage, a token layer and host-side selection behaviour.
pub struct SimCanvas {
    ready: Cell<bool>,
    scene_id: RefCell<Option<SceneId>>,
    stage: Rc<SceneNode>,
    token_layer: RefCell<Rc<SceneNode>>,
    scene_rect: Cell<Rect>,
    tokens: RefCell<Vec<Rc<SimToken>>>,
    hooks: Rc<LocalHookBus>,
    wrappers: Rc<LocalWrapperRegistry>,
    document: RefCell<Option<Rc<Document>>>,
    pressed: RefCell<Option<PressedToken>>,
}

impl SimCanvas {
    pub fn new(
        scene_id: &str,
        scene_rect: Rect,
        hooks: Rc<LocalHookBus>,
        wrappers: Rc<LocalWrapperRegistry>,
    ) -> Rc<Self> {
        let stage = SceneNode::container("stage");
        let token_layer = SceneNode::container("tokens");
        stage.add_child(Rc::clone(&token_layer));
        Rc::new(Self {
            ready: Cell::new(true),
            scene_id: RefCell::new(Some(SceneId::from(scene_id))),
            stage,
            token_layer: RefCell::new(token_layer),
            scene_rect: Cell::new(scene_rect),
            tokens: RefCell::new(Vec::new()),
            hooks,
            wrappers,
            document: RefCell::new(None),
            pressed: RefCell::new(None),
        })
    }

    pub fn attach_document(&self, document: Rc<Document>) {
        *self.document.borrow_mut() = Some(document);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.set(ready);
    }

    pub fn place_token(&self, token: Rc<SimToken>) {
        self.token_layer.borrow().add_child(token.node());
        self.tokens.borrow_mut().push(token);
    }

    pub fn sim_token(&self, id: &str) -> Option<Rc<SimToken>> {
        self.tokens
            .borrow()
            .iter()
            .find(|token| token.id.0 == id)
            .cloned()
    }

    /// Removes the token from the scene and announces the deletion.
    pub fn delete_token(&self, id: &str) -> bool {
        let removed = {
            let mut tokens = self.tokens.borrow_mut();
            let position = tokens.iter().position(|token| token.id.0 == id);
            position.map(|index| tokens.remove(index))
        };
        let Some(token) = removed else {
            return false;
        };
        token.node().destroy();
        let token_id = token.id.clone();
        drop(token);
        self.hooks
            .call_all(&mut HookArgs::DeleteToken { token_id: &token_id });
        true
    }

    /// Fires the ready signal for the current scene without changing it.
    pub fn announce_ready(&self) {
        let Some(scene_id) = self.scene_id.borrow().clone() else {
            return;
        };
        self.hooks
            .call_all(&mut HookArgs::CanvasReady { scene_id: &scene_id });
    }

    /// Tears down the current scene's tokens and layer, then announces the new scene.
    pub fn switch_scene(&self, scene_id: &str, scene_rect: Rect) {
        self.pressed.borrow_mut().take();
        let old_tokens = std::mem::take(&mut *self.tokens.borrow_mut());
        for token in &old_tokens {
            token.set_controlled(false);
        }
        let old_layer = self.token_layer.replace(SceneNode::container("tokens"));
        old_layer.destroy();
        self.stage.add_child(Rc::clone(&self.token_layer.borrow()));
        self.scene_rect.set(scene_rect);
        *self.scene_id.borrow_mut() = Some(SceneId::from(scene_id));
        drop(old_tokens);
        self.announce_ready();
    }

    /// Host selection: optionally releases the others, then controls `id`.
    pub fn control(&self, id: &str, release_others: bool) {
        if release_others {
            let others = self
                .tokens
                .borrow()
                .iter()
                .filter(|token| token.id.0 != id && token.is_controlled())
                .cloned()
                .collect::<Vec<_>>();
            for other in others {
                self.set_controlled(&other, false);
            }
        }
        if let Some(token) = self.sim_token(id) {
            if !token.is_controlled() {
                self.set_controlled(&token, true);
            }
        }
    }

    pub fn release(&self, id: &str) {
        if let Some(token) = self.sim_token(id) {
            if token.is_controlled() {
                self.set_controlled(&token, false);
            }
        }
    }

    pub fn release_all(&self) {
        let controlled = self
            .tokens
            .borrow()
            .iter()
            .filter(|token| token.is_controlled())
            .cloned()
            .collect::<Vec<_>>();
        for token in controlled {
            self.set_controlled(&token, false);
        }
    }

    /// Marquee selection: controls every listed token without any per-token click.
    pub fn marquee_select(&self, ids: &[&str], additive: bool) {
        if !additive {
            self.release_all();
        }
        for id in ids {
            self.control(id, false);
        }
    }

    fn set_controlled(&self, token: &Rc<SimToken>, controlled: bool) {
        token.set_controlled(controlled);
        let token_ref: TokenRef = Rc::clone(token) as TokenRef;
        self.hooks.call_all(&mut HookArgs::ControlToken {
            token: &token_ref,
            controlled,
        });
    }

    /// Primary press. Presses on tokens go through the wrapped click method and
    /// never bubble; presses elsewhere bubble from the hit node up to the stage.
    pub fn left_press(&self, at: Vec2) {
        let target = self.stage.hit_test(at);
        let token = target
            .as_ref()
            .and_then(|node| node.find_token_ancestor())
            .and_then(|id| self.sim_token(&id.0));

        match token {
            Some(token) => {
                let mut event = PointerEvent::new(PointerEventKind::Down, at);
                if let Some(target) = target {
                    event = event.with_target(target);
                }
                *self.pressed.borrow_mut() = Some(PressedToken {
                    token: Rc::clone(&token),
                });
                let token_ref: TokenRef = Rc::clone(&token) as TokenRef;
                let token_id = token.id.0.clone();
                let original = || self.control(&token_id, true);
                self.wrappers
                    .invoke(LEFT_CLICK_TARGET, &token_ref, &event, &original);
            }
            None => {
                let event = PointerEvent::new(PointerEventKind::Down, at);
                match target {
                    Some(target) => {
                        let event = event.with_target(Rc::clone(&target));
                        target.dispatch_bubbling(&event);
                    }
                    None => {
                        self.stage.events().emit(&event);
                        self.release_all();
                    }
                }
            }
        }
    }

    pub fn right_press(&self, at: Vec2) {
        let event = PointerEvent::new(PointerEventKind::RightDown, at);
        match self.stage.hit_test(at) {
            Some(target) => {
                let event = event.with_target(Rc::clone(&target));
                target.dispatch_bubbling(&event);
            }
            None => {
                self.token_layer.borrow().events().emit(&event);
            }
        }
    }

    pub fn pointer_move(&self, at: Vec2) {
        if let Some(document) = self.document.borrow().clone() {
            document
                .events()
                .emit(&PointerEvent::new(PointerEventKind::Move, at));
        }
        let pressed = self
            .pressed
            .borrow()
            .as_ref()
            .map(|pressed| Rc::clone(&pressed.token));
        if let Some(token) = pressed {
            token
                .events()
                .emit(&PointerEvent::new(PointerEventKind::Move, at));
        }
    }

    /// Hover: emits `Over` on the node under the cursor.
    pub fn hover(&self, at: Vec2) {
        if let Some(target) = self.stage.hit_test(at) {
            let event = PointerEvent::new(PointerEventKind::Over, at).with_target(Rc::clone(&target));
            target.events().emit(&event);
        }
    }

    pub fn left_release(&self, at: Vec2) {
        let pressed = self.pressed.borrow_mut().take();
        match pressed {
            Some(PressedToken { token }) => {
                let kind = if token.bounds().contains(at) {
                    PointerEventKind::Up
                } else {
                    PointerEventKind::UpOutside
                };
                token.events().emit(&PointerEvent::new(kind, at));
            }
            None => {
                if let Some(target) = self.stage.hit_test(at) {
                    let event =
                        PointerEvent::new(PointerEventKind::Up, at).with_target(Rc::clone(&target));
                    target.dispatch_bubbling(&event);
                }
            }
        }
    }

    pub fn tokens(&self) -> Vec<Rc<SimToken>> {
        self.tokens.borrow().clone()
    }
}

impl Canvas for SimCanvas {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    fn scene_id(&self) -> Option<SceneId> {
        self.scene_id.borrow().clone()
    }

    fn token_layer(&self) -> Rc<SceneNode> {
        Rc::clone(&self.token_layer.borrow())
    }

    fn stage(&self) -> Rc<SceneNode> {
        Rc::clone(&self.stage)
    }

    fn scene_rect(&self) -> Rect {
        self.scene_rect.get()
    }

    fn placed_tokens(&self) -> Vec<TokenRef> {
        self.tokens
            .borrow()
            .iter()
            .map(|token| Rc::clone(token) as TokenRef)
            .collect()
    }

    fn token(&self, id: &TokenId) -> Option<TokenRef> {
        self.sim_token(&id.0).map(|token| token as TokenRef)
    }
}

/// Selection coordinator backed by the canvas' controlled flags.
pub struct LocalCoordinator {
    canvas: Rc<dyn Canvas>,
    marks: TimingMarks,
    selection_timeout_ms: u64,
    processing: Cell<bool>,
    open_menu: RefCell<Option<TokenId>>,
    movement_trackers: RefCell<HashSet<TokenId>>,
}

impl LocalCoordinator {
    pub fn new(
        canvas: Rc<dyn Canvas>,
        clock: Rc<dyn Clock>,
        selection_timeout_ms: u64,
    ) -> Self {
        Self {
            canvas,
            marks: TimingMarks::new(clock),
            selection_timeout_ms,
            processing: Cell::new(false),
            open_menu: RefCell::new(None),
            movement_trackers: RefCell::new(HashSet::new()),
        }
    }

    pub fn open_menu(&self) -> Option<TokenId> {
        self.open_menu.borrow().clone()
    }

    pub fn track_movement(&self, token: TokenId) {
        self.movement_trackers.borrow_mut().insert(token);
    }

    pub fn is_tracking_movement(&self, token: &TokenId) -> bool {
        self.movement_trackers.borrow().contains(token)
    }
}

impl Coordinator for LocalCoordinator {
    fn is_menu_open(&self) -> bool {
        self.open_menu.borrow().is_some()
    }

    fn is_only_controlled_token(&self, token: &TokenRef) -> bool {
        let controlled = self.controlled_tokens();
        controlled.len() == 1 && controlled[0].id() == token.id()
    }

    fn controlled_tokens(&self) -> Vec<TokenRef> {
        self.canvas
            .placed_tokens()
            .into_iter()
            .filter(|token| token.is_controlled())
            .collect()
    }

    fn is_processing_selection(&self) -> bool {
        self.processing.get() && !self.marks.has_elapsed(SELECTION_MARK, self.selection_timeout_ms)
    }

    fn start_selection_processing(&self) {
        self.processing.set(true);
        self.marks.mark(SELECTION_MARK);
    }

    fn clear_selection_processing(&self) {
        self.processing.set(false);
        self.marks.clear(SELECTION_MARK);
    }

    fn remove_movement_tracker(&self, token: &TokenId) {
        self.movement_trackers.borrow_mut().remove(token);
    }

    fn set_open_menu(&self, token: Option<TokenId>) {
        *self.open_menu.borrow_mut() = token;
    }
}

#[derive(Debug)]
pub struct StaticSettings {
    show_menu_on_selection: Cell<bool>,
    debug: Cell<bool>,
    detailed_tooltips: Cell<bool>,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl StaticSettings {
    pub fn new(show_menu_on_selection: bool, debug: bool) -> Self {
        Self {
            show_menu_on_selection: Cell::new(show_menu_on_selection),
            debug: Cell::new(debug),
            detailed_tooltips: Cell::new(false),
        }
    }

    pub fn set_show_menu_on_selection(&self, value: bool) {
        self.show_menu_on_selection.set(value);
    }

    pub fn set_detailed_tooltips(&self, value: bool) {
        self.detailed_tooltips.set(value);
    }
}

impl Settings for StaticSettings {
    fn show_menu_on_selection(&self) -> bool {
        self.show_menu_on_selection.get()
    }

    fn is_debug_enabled(&self) -> bool {
        self.debug.get()
    }

    fn detailed_tooltips(&self) -> bool {
        self.detailed_tooltips.get()
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotifications {
    errors: RefCell<Vec<String>>,
}

impl MemoryNotifications {
    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }
}

impl Notifications for MemoryNotifications {
    fn error(&self, message: &str) {
        warn!(message, "user_notification");
        self.errors.borrow_mut().push(message.to_string());
    }
}

/// Key-value localization; unknown keys localize to themselves.
#[derive(Debug, Default)]
pub struct KeyLocalization {
    strings: HashMap<String, String>,
}

impl KeyLocalization {
    pub fn english() -> Self {
        let strings = [
            ("TOKENMENU.EditWeapon", "Edit Weapon"),
            ("TOKENMENU.EnhancementFailed", "Enhancement action failed"),
            ("TOKENMENU.Favorite", "Favorite"),
            ("TOKENMENU.NotFavorite", "Not favorite"),
            ("TOKENMENU.Equip.TwoHands", "Two hands"),
            ("TOKENMENU.Equip.MainHand", "Main hand"),
            ("TOKENMENU.Equip.OffHand", "Off hand"),
            ("TOKENMENU.Equip.Carried", "Carried"),
            ("TOKENMENU.Equip.Stored", "Stored"),
            ("TOKENMENU.Stat.Ammo", "Ammo"),
            ("TOKENMENU.Stat.Damage", "Damage"),
            ("TOKENMENU.Stat.Range", "Range"),
            ("TOKENMENU.Stat.AP", "AP"),
            ("TOKENMENU.Stat.TraitMod", "Trait Mod"),
            ("TOKENMENU.Stat.PP", "PP"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        Self { strings }
    }
}

impl Localization for KeyLocalization {
    fn localize(&self, key: &str) -> String {
        self.strings
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualClock;

    fn canvas() -> (Rc<LocalHookBus>, Rc<SimCanvas>) {
        let hooks = Rc::new(LocalHookBus::default());
        let canvas = SimCanvas::new(
            "s1",
            Rect::new(0.0, 0.0, 1000.0, 1000.0),
            Rc::clone(&hooks),
            Rc::new(LocalWrapperRegistry::default()),
        );
        (hooks, canvas)
    }

    #[test]
    fn left_press_on_token_selects_it_through_host() {
        let (_, canvas) = canvas();
        canvas.place_token(SimToken::builder("t1").position(Vec2::new(50.0, 50.0)).build());
        canvas.left_press(Vec2::new(100.0, 100.0));
        assert!(canvas.sim_token("t1").expect("token").is_controlled());
    }

    #[test]
    fn control_with_release_emits_deselect_then_select() {
        let (hooks, canvas) = canvas();
        canvas.place_token(SimToken::builder("a").build());
        canvas.place_token(SimToken::builder("b").position(Vec2::new(200.0, 0.0)).build());
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_for_hook = Rc::clone(&log);
        hooks.on(
            Hook::ControlToken,
            Rc::new(move |args| {
                if let HookArgs::ControlToken { token, controlled } = args {
                    log_for_hook
                        .borrow_mut()
                        .push(format!("{}:{}", token.id(), controlled));
                }
                Ok(())
            }),
        );

        canvas.control("a", true);
        canvas.control("b", true);
        assert_eq!(*log.borrow(), vec!["a:true", "a:false", "b:true"]);
    }

    #[test]
    fn coordinator_reports_sole_controlled_token() {
        let (_, canvas) = canvas();
        let a = SimToken::builder("a").build();
        let b = SimToken::builder("b").build();
        canvas.place_token(Rc::clone(&a));
        canvas.place_token(Rc::clone(&b));
        let coordinator = LocalCoordinator::new(
            Rc::clone(&canvas) as Rc<dyn Canvas>,
            Rc::new(ManualClock::new()),
            500,
        );
        let a_ref: TokenRef = a;

        canvas.control("a", true);
        assert!(coordinator.is_only_controlled_token(&a_ref));
        canvas.control("b", false);
        assert!(!coordinator.is_only_controlled_token(&a_ref));
    }

    #[test]
    fn cleared_processing_does_not_leak_into_next_selection() {
        let (_, canvas) = canvas();
        let coordinator = LocalCoordinator::new(canvas, Rc::new(ManualClock::new()), 500);
        assert!(!coordinator.is_processing_selection());

        coordinator.start_selection_processing();
        assert!(coordinator.is_processing_selection());
        coordinator.clear_selection_processing();
        assert!(!coordinator.is_processing_selection());
        coordinator.start_selection_processing();
        assert!(coordinator.is_processing_selection());
    }

    #[test]
    fn stale_processing_flag_expires_after_timeout() {
        let (_, canvas) = canvas();
        let clock = ManualClock::new();
        let coordinator = LocalCoordinator::new(canvas, Rc::new(clock.clone()), 500);
        coordinator.start_selection_processing();
        clock.advance_ms(500);
        assert!(!coordinator.is_processing_selection());
    }

    #[test]
    fn wrapper_registry_rejects_duplicate_registration() {
        let registry = LocalWrapperRegistry::default();
        let wrapper: ClickWrapper = Rc::new(|_, _, original| original());
        registry
            .register("m", LEFT_CLICK_TARGET, Rc::clone(&wrapper), WrapperMode::Wrapper)
            .expect("first");
        assert!(registry
            .register("m", LEFT_CLICK_TARGET, wrapper, WrapperMode::Wrapper)
            .is_err());
        assert!(registry.unregister("m", LEFT_CLICK_TARGET));
        assert!(!registry.is_registered("m", LEFT_CLICK_TARGET));
    }

    #[test]
    fn failing_hook_does_not_stop_later_handlers() {
        let bus = LocalHookBus::default();
        let ran = Rc::new(Cell::new(false));
        bus.on(
            Hook::CanvasReady,
            Rc::new(|_| {
                Err(crate::host::HookError::HandlerFailed {
                    hook: "canvasReady",
                    message: "boom".to_string(),
                })
            }),
        );
        let flag = Rc::clone(&ran);
        bus.on(
            Hook::CanvasReady,
            Rc::new(move |_| {
                flag.set(true);
                Ok(())
            }),
        );
        let scene = SceneId::from("s");
        assert_eq!(bus.call_all(&mut HookArgs::CanvasReady { scene_id: &scene }), 2);
        assert!(ran.get());
    }
}
