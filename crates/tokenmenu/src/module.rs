//! Root container: builds every service once, wires the menus into the
//! interaction core and owns the activate/deactivate lifecycle.

use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;
use tracing::info;

use crate::config::{ModuleConfig, MODULE_ID};
use crate::host::{
    Canvas, CloseReason, Coordinator, EnhancementProvider, HookBus, HostError, Localization,
    MenuActions, Notifications, Settings, WrapperRegistry,
};
use crate::interaction::{InteractionDeps, TokenInteraction};
use crate::menu::{EnhancementMenu, TooltipController, WeaponMenu, WeaponMenuDeps};
use crate::overlay::Document;
use crate::runtime::{Clock, DragTracker, FrameScheduler, StateError};

/// Everything the module needs from the host.
pub struct HostContext {
    pub canvas: Rc<dyn Canvas>,
    pub hooks: Rc<dyn HookBus>,
    pub wrappers: Rc<dyn WrapperRegistry>,
    pub coordinator: Rc<dyn Coordinator>,
    pub settings: Rc<dyn Settings>,
    pub localization: Rc<dyn Localization>,
    pub notifications: Rc<dyn Notifications>,
    pub document: Rc<Document>,
    pub clock: Rc<dyn Clock>,
    pub enhancement_provider: Option<Rc<dyn EnhancementProvider>>,
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("invalid interaction config: {0}")]
    Config(#[from] StateError),
    #[error("failed to install host integration: {0}")]
    Host(#[from] HostError),
}

pub struct TokenMenuModule {
    scheduler: Rc<FrameScheduler>,
    drags: Rc<DragTracker>,
    tooltip: Rc<TooltipController>,
    enhancements: Rc<EnhancementMenu>,
    weapon_menu: Rc<WeaponMenu>,
    interaction: Rc<TokenInteraction>,
    active: Cell<bool>,
}

impl TokenMenuModule {
    pub fn new(context: HostContext, config: ModuleConfig) -> Result<Self, ModuleError> {
        let scheduler = Rc::new(FrameScheduler::new(Rc::clone(&context.clock)));
        let drags = Rc::new(DragTracker::default());
        let tooltip = TooltipController::new(Rc::clone(&context.document), config.tooltip.clone());
        let enhancements = EnhancementMenu::new(
            Rc::clone(&context.canvas),
            Rc::clone(&context.document),
            context.enhancement_provider.clone(),
            Rc::clone(&context.localization),
            Rc::clone(&context.notifications),
            Rc::clone(&context.clock),
            config.menu.clone(),
        );
        let weapon_menu = WeaponMenu::new(
            WeaponMenuDeps {
                canvas: Rc::clone(&context.canvas),
                coordinator: Rc::clone(&context.coordinator),
                hooks: Rc::clone(&context.hooks),
                localization: Rc::clone(&context.localization),
                settings: Rc::clone(&context.settings),
                tooltip: Rc::clone(&tooltip),
                enhancements: Rc::clone(&enhancements),
            },
            config.menu.clone(),
        );
        let interaction = TokenInteraction::new(
            InteractionDeps {
                canvas: context.canvas,
                hooks: context.hooks,
                wrappers: context.wrappers,
                coordinator: context.coordinator,
                settings: context.settings,
                menus: Rc::clone(&weapon_menu) as Rc<dyn MenuActions>,
                scheduler: Rc::clone(&scheduler),
                drags: Rc::clone(&drags),
            },
            &config.interaction,
        )?;

        Ok(Self {
            scheduler,
            drags,
            tooltip,
            enhancements,
            weapon_menu,
            interaction,
            active: Cell::new(false),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn activate(&self) -> Result<(), ModuleError> {
        if self.active.get() {
            return Ok(());
        }
        self.interaction.activate()?;
        self.active.set(true);
        info!(module = MODULE_ID, "module_activated");
        Ok(())
    }

    /// Render tick: runs every scheduled task that is due. Returns how many ran.
    pub fn frame(&self) -> usize {
        self.scheduler.tick()
    }

    pub fn deactivate(&self) {
        if !self.active.replace(false) {
            return;
        }
        self.weapon_menu.close(CloseReason::Teardown);
        self.enhancements.hide();
        self.tooltip.teardown();
        self.interaction.teardown();
        let cancelled = self.scheduler.cancel_all();
        self.drags.clear_all();
        info!(module = MODULE_ID, cancelled_tasks = cancelled, "module_deactivated");
    }

    pub fn weapon_menu(&self) -> &Rc<WeaponMenu> {
        &self.weapon_menu
    }

    pub fn enhancements(&self) -> &Rc<EnhancementMenu> {
        &self.enhancements
    }

    pub fn tooltip(&self) -> &Rc<TooltipController> {
        &self.tooltip
    }

    pub fn interaction(&self) -> &Rc<TokenInteraction> {
        &self.interaction
    }

    pub fn scheduler(&self) -> &Rc<FrameScheduler> {
        &self.scheduler
    }
}

impl Drop for TokenMenuModule {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::geometry::{Rect, Vec2};
    use crate::host::{
        EquipStatus, EventTarget, Hook, ItemId, ItemKind, MenuItem, TokenHandle, TokenId,
    };
    use crate::interaction::LEFT_CLICK_TARGET;
    use crate::menu::TOOLTIP_ELEMENT_ID;
    use crate::runtime::ManualClock;
    use crate::sim::{
        KeyLocalization, LocalCoordinator, LocalHookBus, LocalWrapperRegistry, MemoryNotifications,
        SimActor, SimCanvas, SimToken, StaticSettings,
    };

    const T1_CENTRE: Vec2 = Vec2::new(100.0, 100.0);

    struct Harness {
        clock: ManualClock,
        hooks: Rc<LocalHookBus>,
        wrappers: Rc<LocalWrapperRegistry>,
        canvas: Rc<SimCanvas>,
        coordinator: Rc<LocalCoordinator>,
        document: Rc<Document>,
        actor: Rc<SimActor>,
        closes: Rc<RefCell<Vec<String>>>,
        module: TokenMenuModule,
    }

    fn arsenal() -> Vec<MenuItem> {
        let mut sword = MenuItem::new("sword", "Sword", ItemKind::Weapon);
        sword.equip_status = EquipStatus::MainHand;
        let bow = MenuItem::new("bow", "Bow", ItemKind::Weapon);
        let bolt = MenuItem::new("bolt", "Bolt", ItemKind::Power);
        vec![sword, bow, bolt]
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(ModuleConfig::default())
        }

        fn with_config(config: ModuleConfig) -> Self {
            let clock = ManualClock::new();
            let hooks = Rc::new(LocalHookBus::default());
            let wrappers = Rc::new(LocalWrapperRegistry::default());
            let canvas = SimCanvas::new(
                "s1",
                Rect::new(0.0, 0.0, 2000.0, 2000.0),
                Rc::clone(&hooks),
                Rc::clone(&wrappers),
            );
            let document = Rc::new(Document::new(Vec2::new(1280.0, 720.0)));
            canvas.attach_document(Rc::clone(&document));
            let coordinator = Rc::new(LocalCoordinator::new(
                Rc::clone(&canvas) as Rc<dyn Canvas>,
                Rc::new(clock.clone()),
                config.interaction.selection_timeout_ms,
            ));

            let actor = SimActor::new("a1", "Hero", arsenal());
            canvas.place_token(
                SimToken::builder("t1")
                    .name("Hero")
                    .position(Vec2::new(50.0, 50.0))
                    .actor(Rc::clone(&actor) as crate::host::ActorRef)
                    .build(),
            );
            canvas.place_token(
                SimToken::builder("t2")
                    .name("Sidekick")
                    .position(Vec2::new(400.0, 50.0))
                    .actor(SimActor::new("a2", "Sidekick", arsenal()) as crate::host::ActorRef)
                    .build(),
            );

            let module = TokenMenuModule::new(
                HostContext {
                    canvas: Rc::clone(&canvas) as Rc<dyn Canvas>,
                    hooks: Rc::clone(&hooks) as Rc<dyn HookBus>,
                    wrappers: Rc::clone(&wrappers) as Rc<dyn WrapperRegistry>,
                    coordinator: Rc::clone(&coordinator) as Rc<dyn Coordinator>,
                    settings: Rc::new(StaticSettings::default()),
                    localization: Rc::new(KeyLocalization::english()),
                    notifications: Rc::new(MemoryNotifications::default()),
                    document: Rc::clone(&document),
                    clock: Rc::new(clock.clone()),
                    enhancement_provider: None,
                },
                config,
            )
            .expect("module");
            module.activate().expect("activate");

            let closes = Rc::new(RefCell::new(Vec::new()));
            let log = Rc::clone(&closes);
            module.weapon_menu().on_close(Rc::new(move |token: &TokenId, reason: CloseReason| {
                log.borrow_mut().push(format!("{token}:{}", reason.as_str()));
            }));

            Self {
                clock,
                hooks,
                wrappers,
                canvas,
                coordinator,
                document,
                actor,
                closes,
                module,
            }
        }

        fn advance(&self, ms: u64) {
            self.clock.advance_ms(ms);
            self.module.frame();
        }

        fn click(&self, at: Vec2) {
            self.canvas.left_press(at);
            self.canvas.left_release(at);
        }

        fn open_token(&self) -> Option<TokenId> {
            self.module.weapon_menu().open_token()
        }

        fn closes(&self) -> Vec<String> {
            self.closes.borrow().clone()
        }

        /// Selects T1 without opening anything, then toggles the menu open.
        fn open_menu_on_t1(&self) {
            self.canvas.control("t1", true);
            self.advance(100);
            self.click(T1_CENTRE);
            assert_eq!(self.open_token(), Some(TokenId::from("t1")));
            self.advance(100);
        }
    }

    #[test]
    fn fresh_selection_opens_menu_after_drag_detection_delay() {
        let h = Harness::new();
        h.canvas.left_press(T1_CENTRE);
        h.advance(50);
        h.canvas.left_release(Vec2::new(101.0, 100.0));

        h.advance(149);
        assert_eq!(h.open_token(), None);
        h.advance(1);
        assert_eq!(h.open_token(), Some(TokenId::from("t1")));
        assert_eq!(h.coordinator.open_menu(), Some(TokenId::from("t1")));
        assert!(!h.module.interaction().has_pending_open());
    }

    #[test]
    fn fresh_selection_with_drag_never_opens() {
        let h = Harness::new();
        h.canvas.left_press(T1_CENTRE);
        h.advance(40);
        h.canvas.pointer_move(Vec2::new(110.0, 100.0));
        h.advance(40);
        h.canvas.left_release(Vec2::new(110.0, 100.0));

        h.advance(120);
        assert_eq!(h.open_token(), None);
        assert!(!h.module.interaction().has_pending_open());
        assert!(h.closes().is_empty());
    }

    #[test]
    fn click_on_selected_token_toggles_menu_immediately() {
        let h = Harness::new();
        h.canvas.control("t1", true);
        h.advance(100);

        h.click(T1_CENTRE);
        assert_eq!(h.open_token(), Some(TokenId::from("t1")));

        h.advance(100);
        h.click(T1_CENTRE);
        assert_eq!(h.open_token(), None);
        assert_eq!(h.closes(), vec!["t1:toggle"]);
    }

    #[test]
    fn right_press_on_owned_token_closes_menu_and_cancels_pending_open() {
        let h = Harness::new();
        h.open_menu_on_t1();

        h.canvas.right_press(T1_CENTRE);
        assert_eq!(h.open_token(), None);
        assert_eq!(h.closes(), vec!["t1:right_click"]);

        h.canvas.release_all();
        h.advance(200);
        h.click(T1_CENTRE);
        assert!(h.module.interaction().has_pending_open());
        h.canvas.right_press(T1_CENTRE);
        assert!(!h.module.interaction().has_pending_open());

        h.advance(200);
        assert_eq!(h.open_token(), None);
    }

    #[test]
    fn dragging_another_token_closes_menu_of_previous_one() {
        let h = Harness::new();
        h.open_menu_on_t1();

        h.canvas.left_press(Vec2::new(450.0, 100.0));
        h.canvas.pointer_move(Vec2::new(480.0, 100.0));
        h.canvas.left_release(Vec2::new(480.0, 100.0));
        h.advance(500);

        assert_eq!(h.open_token(), None);
        assert_eq!(h.coordinator.open_menu(), None);
        assert_eq!(h.closes(), vec!["t1:deselected"]);
        assert!(h.canvas.sim_token("t2").expect("t2").is_controlled());
        assert!(!h.module.interaction().has_pending_open());
    }

    #[test]
    fn marquee_adding_second_token_closes_menu() {
        let h = Harness::new();
        h.open_menu_on_t1();

        h.canvas.marquee_select(&["t2"], true);
        assert_eq!(h.module.interaction().controlled_count(), 2);
        assert_eq!(h.open_token(), None);
        assert_eq!(h.closes(), vec!["t1:multi_select"]);
    }

    #[test]
    fn scene_change_closes_menu_and_drops_token_state() {
        let h = Harness::new();
        h.open_menu_on_t1();
        let t1 = h.canvas.sim_token("t1").expect("t1");
        assert!(t1.events().listener_count() > 0);

        h.canvas.switch_scene("s2", Rect::new(0.0, 0.0, 1000.0, 1000.0));
        assert_eq!(h.open_token(), None);
        assert_eq!(h.closes(), vec!["t1:scene_change"]);
        assert_eq!(h.module.interaction().controlled_count(), 0);
        assert_eq!(h.module.interaction().listener_token_count(), 0);
        assert_eq!(t1.events().listener_count(), 0);
        assert!(h.module.interaction().is_layer_handler_installed());
    }

    #[test]
    fn open_then_close_leaves_no_residue() {
        let h = Harness::new();
        h.canvas.control("t1", true);
        h.advance(100);
        let stage = h.canvas.stage();
        let layer = h.canvas.token_layer();
        let nodes = stage.descendant_count();
        let layer_listeners = layer.events().listener_count();
        let document_listeners = h.document.events().listener_count();

        h.click(T1_CENTRE);
        let sword = h.module.weapon_menu().item_bounds("sword").expect("sword");
        h.canvas.hover(Vec2::new(sword.x + 4.0, sword.y + 4.0));
        assert!(h.document.element(TOOLTIP_ELEMENT_ID).is_some());
        assert!(stage.descendant_count() > nodes);

        h.advance(100);
        h.click(T1_CENTRE);
        h.module.weapon_menu().close(CloseReason::Toggle);
        assert_eq!(h.closes(), vec!["t1:toggle"]);
        assert_eq!(stage.descendant_count(), nodes);
        assert_eq!(layer.events().listener_count(), layer_listeners);
        assert_eq!(h.document.events().listener_count(), document_listeners);
        assert_eq!(h.document.element_count(), 0);
    }

    #[test]
    fn pressing_item_icon_activates_it_and_keeps_selection() {
        let h = Harness::new();
        h.open_menu_on_t1();
        let bow = h.module.weapon_menu().item_bounds("bow").expect("bow");

        h.canvas.left_press(Vec2::new(bow.x + 4.0, bow.y + 4.0));
        assert_eq!(h.actor.activations(), vec![ItemId::from("bow")]);
        assert_eq!(h.closes(), vec!["t1:item_activated"]);
        let t1 = h.canvas.sim_token("t1").expect("t1");
        assert!(t1.is_controlled());
    }

    #[test]
    fn deleting_menu_token_closes_menu() {
        let h = Harness::new();
        h.open_menu_on_t1();

        assert!(h.canvas.delete_token("t1"));
        assert_eq!(h.open_token(), None);
        assert_eq!(h.closes(), vec!["t1:token_deleted"]);
        assert_eq!(h.module.interaction().listener_token_count(), 0);
    }

    #[test]
    fn deactivate_releases_host_integration_and_can_reactivate() {
        let h = Harness::new();
        h.open_menu_on_t1();

        assert!(h.module.is_active());
        h.module.deactivate();
        h.module.deactivate();
        assert!(!h.module.is_active());
        assert_eq!(h.closes(), vec!["t1:teardown"]);
        assert!(!h.wrappers.is_registered(MODULE_ID, LEFT_CLICK_TARGET));
        for hook in [Hook::CanvasReady, Hook::ControlToken, Hook::DeleteToken] {
            assert_eq!(h.hooks.handler_count(hook), 0);
        }
        assert_eq!(h.canvas.token_layer().events().listener_count(), 0);
        assert_eq!(h.module.scheduler().pending_count(), 0);

        h.advance(100);
        h.click(T1_CENTRE);
        assert_eq!(h.open_token(), None);

        h.module.activate().expect("reactivate");
        h.advance(100);
        h.click(T1_CENTRE);
        assert_eq!(h.open_token(), Some(TokenId::from("t1")));
    }

    #[test]
    fn configured_drag_detection_delay_postpones_open() {
        let config = ModuleConfig::from_json_str(r#"{"interaction": {"dragDetectionDelayMs": 300}}"#)
            .expect("config");
        let h = Harness::with_config(config);
        h.click(T1_CENTRE);

        h.advance(150);
        assert_eq!(h.open_token(), None);
        h.advance(150);
        assert_eq!(h.open_token(), Some(TokenId::from("t1")));
    }
}
