use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use crate::config::MenuStyle;
use crate::geometry::{Rect, Vec2};
use crate::host::{
    Canvas, CloseReason, Coordinator, HookBus, Localization, MenuActions, MenuError, MenuItem,
    PointerEvent, PointerEventKind, Settings, TokenHandle, TokenId, TokenRef,
};
use crate::runtime::ResourceTracker;
use crate::scene_graph::{NodeKind, SceneNode};

use super::enhancement::{EnhancementMenu, EnhancementRequest};
use super::layout::{layout_rows, sort_menu_items, weapon_menu_origin};
use super::tooltip::{build_tooltip_content, TooltipContext, TooltipController};

pub const WEAPON_MENU_CONTAINER_NAME: &str = "tokenmenu-weapon-menu";

const ICON_FRAME_FILL: u32 = 0x33_33_33;
const ICON_FRAME_STROKE: u32 = 0x88_88_88;
const ICON_EQUIPPED_STROKE: u32 = 0xd4_a0_17;
const ICON_INSET_PX: f32 = 2.0;

pub type CloseListener = Rc<dyn Fn(&TokenId, CloseReason)>;

struct OpenMenu {
    token: Weak<dyn TokenHandle>,
    token_id: TokenId,
    container: Rc<SceneNode>,
    items: Vec<MenuItem>,
    resources: ResourceTracker,
}

pub struct WeaponMenuDeps {
    pub canvas: Rc<dyn Canvas>,
    pub coordinator: Rc<dyn Coordinator>,
    pub hooks: Rc<dyn HookBus>,
    pub localization: Rc<dyn Localization>,
    pub settings: Rc<dyn Settings>,
    pub tooltip: Rc<TooltipController>,
    pub enhancements: Rc<EnhancementMenu>,
}

/// The one weapon menu per scene. Opening replaces any open menu; closing is idempotent.
pub struct WeaponMenu {
    me: Weak<WeaponMenu>,
    canvas: Rc<dyn Canvas>,
    coordinator: Rc<dyn Coordinator>,
    hooks: Rc<dyn HookBus>,
    localization: Rc<dyn Localization>,
    settings: Rc<dyn Settings>,
    tooltip: Rc<TooltipController>,
    enhancements: Rc<EnhancementMenu>,
    style: MenuStyle,
    current: RefCell<Option<OpenMenu>>,
    next_listener: Cell<u64>,
    close_listeners: RefCell<Vec<(u64, CloseListener)>>,
}

impl WeaponMenu {
    pub fn new(deps: WeaponMenuDeps, style: MenuStyle) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            canvas: deps.canvas,
            coordinator: deps.coordinator,
            hooks: deps.hooks,
            localization: deps.localization,
            settings: deps.settings,
            tooltip: deps.tooltip,
            enhancements: deps.enhancements,
            style,
            current: RefCell::new(None),
            next_listener: Cell::new(0),
            close_listeners: RefCell::new(Vec::new()),
        })
    }

    pub fn on_close(&self, listener: CloseListener) -> u64 {
        let id = self.next_listener.get();
        self.next_listener.set(id.saturating_add(1));
        self.close_listeners.borrow_mut().push((id, listener));
        id
    }

    pub fn remove_close_listener(&self, id: u64) -> bool {
        let mut listeners = self.close_listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub fn is_open(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub fn open_token(&self) -> Option<TokenId> {
        self.current
            .borrow()
            .as_ref()
            .map(|open| open.token_id.clone())
    }

    pub fn container(&self) -> Option<Rc<SceneNode>> {
        self.current
            .borrow()
            .as_ref()
            .map(|open| Rc::clone(&open.container))
    }

    pub fn item_names(&self) -> Vec<String> {
        self.current
            .borrow()
            .as_ref()
            .map(|open| open.items.iter().map(|item| item.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Global bounds of the icon for `item_id`.
    pub fn item_bounds(&self, item_id: &str) -> Option<Rect> {
        let current = self.current.borrow();
        let open = current.as_ref()?;
        let icon = open.container.find_child(&format!("item:{item_id}"))?;
        icon.global_bounds()
    }

    pub fn open(&self, token: &TokenRef) -> Result<(), MenuError> {
        if !self.canvas.is_ready() {
            return Err(MenuError::CanvasNotReady);
        }
        self.close(CloseReason::Replaced);

        let Some(actor) = token.actor() else {
            debug!(token = %token.id(), "weapon_menu_without_actor");
            return Ok(());
        };
        let mut items = actor.items();
        sort_menu_items(&mut items);
        let Some(layout) = layout_rows(&items, &self.style) else {
            debug!(token = %token.id(), "weapon_menu_without_items");
            return Ok(());
        };

        let resources = ResourceTracker::new("weapon_menu");
        let container = SceneNode::container(WEAPON_MENU_CONTAINER_NAME);
        let background = SceneNode::new(
            "background",
            NodeKind::RoundedRect {
                width: layout.size.x,
                height: layout.size.y,
                radius: self.style.corner_radius,
                fill: self.style.background_color,
                alpha: self.style.background_alpha,
                stroke: None,
            },
        );
        background.set_interactive(true);
        resources.register_listener(
            &background,
            PointerEventKind::Down,
            Rc::new(|event: &PointerEvent| event.stop_propagation()),
        );
        container.add_child(background);

        for slot in &layout.slots {
            let item = &items[slot.item_index];
            let icon = self.build_icon(item, slot.rect);
            self.install_icon_listeners(&resources, &icon, slot.item_index);
            container.add_child(icon);
        }

        let layer = self.canvas.token_layer();
        let token_rect = token_rect_in_layer(token, &layer);
        let origin = weapon_menu_origin(
            token_rect,
            layout.size,
            self.canvas.scene_rect(),
            self.style.y_offset,
        );
        container.set_position(origin);
        layer.add_child(Rc::clone(&container));

        let token_id = token.id();
        info!(
            token = %token_id,
            items = items.len(),
            x = origin.x,
            y = origin.y,
            "weapon_menu_opened"
        );
        *self.current.borrow_mut() = Some(OpenMenu {
            token: Rc::downgrade(token),
            token_id: token_id.clone(),
            container,
            items,
            resources,
        });
        self.coordinator.set_open_menu(Some(token_id));
        Ok(())
    }

    fn build_icon(&self, item: &MenuItem, rect: Rect) -> Rc<SceneNode> {
        let equipped = item.is_weapon() && item.equip_status.sort_rank() < 3;
        let frame = SceneNode::new(
            format!("item:{}", item.id),
            NodeKind::RoundedRect {
                width: rect.width,
                height: rect.height,
                radius: self.style.icon_corner_radius,
                fill: ICON_FRAME_FILL,
                alpha: 1.0,
                stroke: Some(if equipped {
                    ICON_EQUIPPED_STROKE
                } else {
                    ICON_FRAME_STROKE
                }),
            },
        );
        frame.set_position(rect.origin());
        frame.set_interactive(true);
        frame.set_hit_area(Some(Rect::new(0.0, 0.0, rect.width, rect.height)));

        let image = SceneNode::new(
            "image",
            NodeKind::Sprite {
                texture: item.img.clone(),
                width: rect.width - ICON_INSET_PX * 2.0,
                height: rect.height - ICON_INSET_PX * 2.0,
            },
        );
        image.set_position(Vec2::new(ICON_INSET_PX, ICON_INSET_PX));
        frame.add_child(image);
        frame
    }

    fn install_icon_listeners(&self, resources: &ResourceTracker, icon: &Rc<SceneNode>, index: usize) {
        let me = self.me.clone();
        resources.register_listener(
            icon,
            PointerEventKind::Over,
            Rc::new(move |event: &PointerEvent| {
                if let Some(this) = me.upgrade() {
                    this.show_item_tooltip(index, event.global);
                }
            }),
        );

        let tooltip = Rc::downgrade(&self.tooltip);
        resources.register_listener(
            icon,
            PointerEventKind::Out,
            Rc::new(move |_: &PointerEvent| {
                if let Some(tooltip) = tooltip.upgrade() {
                    tooltip.hide();
                }
            }),
        );

        let me = self.me.clone();
        resources.register_listener(
            icon,
            PointerEventKind::Down,
            Rc::new(move |event: &PointerEvent| {
                event.stop_propagation();
                if let Some(this) = me.upgrade() {
                    this.activate_item(index);
                }
            }),
        );

        let me = self.me.clone();
        let weak_icon = Rc::downgrade(icon);
        resources.register_listener(
            icon,
            PointerEventKind::RightDown,
            Rc::new(move |event: &PointerEvent| {
                event.stop_propagation();
                if let (Some(this), Some(icon)) = (me.upgrade(), weak_icon.upgrade()) {
                    this.show_enhancements(index, icon);
                }
            }),
        );
    }

    fn item_and_token(&self, index: usize) -> Option<(MenuItem, TokenRef)> {
        let current = self.current.borrow();
        let open = current.as_ref()?;
        let item = open.items.get(index)?.clone();
        let token = open.token.upgrade()?;
        Some((item, token))
    }

    fn show_item_tooltip(&self, index: usize, cursor: Vec2) {
        let Some((item, _)) = self.item_and_token(index) else {
            return;
        };
        let context = TooltipContext {
            hooks: self.hooks.as_ref(),
            localization: self.localization.as_ref(),
        };
        let html = build_tooltip_content(&item, &context, self.settings.detailed_tooltips());
        self.tooltip.show(&html, cursor);
    }

    fn activate_item(&self, index: usize) {
        let Some((item, token)) = self.item_and_token(index) else {
            return;
        };
        let Some(actor) = token.actor() else {
            return;
        };
        match actor.activate_item(&item.id) {
            Ok(()) => {
                info!(token = %token.id(), item = %item.id, "weapon_menu_item_activated");
                self.close(CloseReason::ItemActivated);
            }
            Err(error) => {
                warn!(token = %token.id(), item = %item.id, error = %error, "weapon_menu_item_failed");
            }
        }
    }

    fn show_enhancements(&self, index: usize, icon: Rc<SceneNode>) {
        let Some((item, token)) = self.item_and_token(index) else {
            return;
        };
        if !item.is_weapon() {
            return;
        }
        let Some(actor) = token.actor() else {
            return;
        };
        self.tooltip.hide();

        let me = self.me.clone();
        self.enhancements.show(EnhancementRequest {
            actor,
            weapon: item,
            token,
            anchor: icon,
            icon_radius: self.style.icon_size / 2.0,
            on_close: Some(Rc::new(move || {
                if let Some(this) = me.upgrade() {
                    this.close(CloseReason::ItemActivated);
                }
            })),
        });
    }

    /// Releases listeners, destroys the container and notifies close listeners.
    /// Does nothing when no menu is open.
    pub fn close(&self, reason: CloseReason) {
        let open = self.current.borrow_mut().take();
        let Some(open) = open else {
            return;
        };
        open.resources.teardown();
        open.container.destroy();
        self.tooltip.hide();
        self.enhancements.hide();
        self.coordinator.set_open_menu(None);
        info!(token = %open.token_id, reason = reason.as_str(), "weapon_menu_closed");

        let listeners = self
            .close_listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(&open.token_id, reason);
        }
    }

    pub fn teardown(&self) {
        self.close(CloseReason::Teardown);
        self.close_listeners.borrow_mut().clear();
    }
}

impl MenuActions for WeaponMenu {
    fn show_weapon_menu_under_token(&self, token: &TokenRef) -> Result<(), MenuError> {
        self.open(token)
    }

    fn close_weapon_menu(&self, reason: CloseReason) -> Result<(), MenuError> {
        self.close(reason);
        Ok(())
    }

    fn menu_token(&self) -> Option<TokenId> {
        self.open_token()
    }
}

fn token_rect_in_layer(token: &TokenRef, layer: &Rc<SceneNode>) -> Rect {
    let global = token.global_position();
    let size = token.size();
    let top_left = layer.to_local(global);
    let bottom_right = layer.to_local(Vec2::new(global.x + size.x, global.y + size.y));
    Rect::new(
        top_left.x,
        top_left.y,
        bottom_right.x - top_left.x,
        bottom_right.y - top_left.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModuleConfig, TooltipConfig};
    use crate::host::{EquipStatus, EventTarget, ItemKind};
    use crate::menu::tooltip::TOOLTIP_ELEMENT_ID;
    use crate::overlay::Document;
    use crate::runtime::ManualClock;
    use crate::sim::{
        KeyLocalization, LocalCoordinator, LocalHookBus, LocalWrapperRegistry, MemoryNotifications,
        SimActor, SimCanvas, SimToken, StaticSettings,
    };

    struct Fixture {
        canvas: Rc<SimCanvas>,
        coordinator: Rc<LocalCoordinator>,
        document: Rc<Document>,
        actor: Rc<SimActor>,
        enhancements: Rc<EnhancementMenu>,
        settings: Rc<StaticSettings>,
        menu: Rc<WeaponMenu>,
        token: TokenRef,
    }

    fn items() -> Vec<MenuItem> {
        let mut sword = MenuItem::new("sword", "Sword", ItemKind::Weapon);
        sword.equip_status = EquipStatus::MainHand;
        let knife = MenuItem::new("knife", "Knife", ItemKind::Weapon);
        let bolt = MenuItem::new("bolt", "Bolt", ItemKind::Power);
        vec![bolt, knife, sword]
    }

    fn fixture(scene: Rect, token_at: Vec2) -> Fixture {
        let clock = ManualClock::new();
        let hooks = Rc::new(LocalHookBus::default());
        let canvas = SimCanvas::new(
            "s1",
            scene,
            Rc::clone(&hooks),
            Rc::new(LocalWrapperRegistry::default()),
        );
        let coordinator = Rc::new(LocalCoordinator::new(
            Rc::clone(&canvas) as Rc<dyn Canvas>,
            Rc::new(clock.clone()),
            500,
        ));
        let document = Rc::new(Document::new(Vec2::new(scene.width, scene.height)));
        let localization: Rc<dyn Localization> = Rc::new(KeyLocalization::english());
        let config = ModuleConfig::default();
        let settings = Rc::new(StaticSettings::default());
        let tooltip = TooltipController::new(Rc::clone(&document), TooltipConfig::default());
        let enhancements = EnhancementMenu::new(
            Rc::clone(&canvas) as Rc<dyn Canvas>,
            Rc::clone(&document),
            None,
            Rc::clone(&localization),
            Rc::new(MemoryNotifications::default()),
            Rc::new(clock),
            config.menu.clone(),
        );
        let menu = WeaponMenu::new(
            WeaponMenuDeps {
                canvas: Rc::clone(&canvas) as Rc<dyn Canvas>,
                coordinator: Rc::clone(&coordinator) as Rc<dyn Coordinator>,
                hooks,
                localization,
                settings: Rc::clone(&settings) as Rc<dyn Settings>,
                tooltip,
                enhancements: Rc::clone(&enhancements),
            },
            config.menu,
        );
        let actor = SimActor::new("a1", "Hero", items());
        let token = SimToken::builder("t1")
            .position(token_at)
            .actor(Rc::clone(&actor) as crate::host::ActorRef)
            .build();
        canvas.place_token(Rc::clone(&token));
        Fixture {
            canvas,
            coordinator,
            document,
            actor,
            enhancements,
            settings,
            menu,
            token,
        }
    }

    fn roomy() -> Fixture {
        fixture(Rect::new(0.0, 0.0, 1000.0, 1000.0), Vec2::new(100.0, 100.0))
    }

    fn centre(bounds: Rect) -> Vec2 {
        Vec2::new(bounds.x + bounds.width / 2.0, bounds.y + bounds.height / 2.0)
    }

    #[test]
    fn open_sorts_items_and_registers_with_coordinator() {
        let fx = roomy();
        fx.menu.open(&fx.token).expect("open");

        assert_eq!(fx.menu.item_names(), vec!["Sword", "Knife", "Bolt"]);
        assert_eq!(fx.coordinator.open_menu(), Some(TokenId::from("t1")));
        assert!(fx.coordinator.is_menu_open());
    }

    #[test]
    fn menu_is_centred_below_token() {
        let fx = roomy();
        fx.menu.open(&fx.token).expect("open");
        let container = fx.menu.container().expect("container");
        // Two rows, two icons wide: 88 x 88.
        assert_eq!(container.position(), Vec2::new(106.0, 210.0));
    }

    #[test]
    fn menu_flips_above_token_near_bottom_edge() {
        let fx = fixture(Rect::new(0.0, 0.0, 1000.0, 400.0), Vec2::new(100.0, 280.0));
        fx.menu.open(&fx.token).expect("open");
        let container = fx.menu.container().expect("container");
        assert_eq!(container.position().y, 182.0);
    }

    #[test]
    fn open_then_close_restores_layer() {
        let fx = roomy();
        let layer = fx.canvas.token_layer();
        let children = layer.child_count();
        let descendants = layer.descendant_count();

        fx.menu.open(&fx.token).expect("open");
        let container = fx.menu.container().expect("container");
        assert_eq!(layer.child_count(), children + 1);

        fx.menu.close(CloseReason::Toggle);
        fx.menu.close(CloseReason::Toggle);
        assert_eq!(layer.child_count(), children);
        assert_eq!(layer.descendant_count(), descendants);
        assert!(container.is_destroyed());
        assert!(!fx.coordinator.is_menu_open());
    }

    #[test]
    fn reopening_replaces_existing_menu() {
        let fx = roomy();
        let reasons = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&reasons);
        let listener = fx.menu.on_close(Rc::new(move |token: &TokenId, reason: CloseReason| {
            log.borrow_mut().push(format!("{token}:{}", reason.as_str()));
        }));

        fx.menu.open(&fx.token).expect("open");
        fx.menu.open(&fx.token).expect("reopen");
        assert_eq!(*reasons.borrow(), vec!["t1:replaced"]);

        assert!(fx.menu.remove_close_listener(listener));
        assert!(!fx.menu.remove_close_listener(listener));
        fx.menu.close(CloseReason::Toggle);
        assert_eq!(reasons.borrow().len(), 1);
        fx.menu.open(&fx.token).expect("open again");
        assert_eq!(
            fx.canvas
                .token_layer()
                .children()
                .iter()
                .filter(|child| child.name() == WEAPON_MENU_CONTAINER_NAME)
                .count(),
            1
        );
    }

    #[test]
    fn token_without_items_opens_nothing() {
        let fx = roomy();
        fx.actor.set_items(Vec::new());
        fx.menu.open(&fx.token).expect("open");
        assert!(!fx.menu.is_open());
        assert!(!fx.coordinator.is_menu_open());
    }

    #[test]
    fn canvas_not_ready_is_reported() {
        let fx = roomy();
        fx.canvas.set_ready(false);
        assert!(matches!(fx.menu.open(&fx.token), Err(MenuError::CanvasNotReady)));
    }

    #[test]
    fn press_on_icon_activates_item_and_closes() {
        let fx = roomy();
        fx.menu.open(&fx.token).expect("open");
        let bounds = fx.menu.item_bounds("knife").expect("knife icon");

        fx.canvas.left_press(centre(bounds));
        assert_eq!(fx.actor.activations(), vec![crate::host::ItemId::from("knife")]);
        assert!(!fx.menu.is_open());
        assert!(!fx.token.is_controlled());
    }

    #[test]
    fn press_on_background_does_not_reach_stage() {
        let fx = roomy();
        let stage_hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&stage_hits);
        fx.canvas.stage().events().add_listener(
            PointerEventKind::Down,
            Rc::new(move |_: &PointerEvent| counter.set(counter.get() + 1)),
        );
        fx.menu.open(&fx.token).expect("open");
        let container = fx.menu.container().expect("container");
        let bounds = container.global_bounds().expect("bounds");

        fx.canvas.left_press(Vec2::new(bounds.x + 1.0, bounds.y + 1.0));
        assert_eq!(stage_hits.get(), 0);
        assert!(fx.menu.is_open());
    }

    #[test]
    fn hover_shows_tooltip_and_close_hides_it() {
        let fx = roomy();
        fx.menu.open(&fx.token).expect("open");
        let bounds = fx.menu.item_bounds("sword").expect("sword icon");

        fx.canvas.hover(centre(bounds));
        let element = fx.document.element(TOOLTIP_ELEMENT_ID).expect("tooltip");
        assert!(element.html.contains("Sword"));
        assert!(element.html.contains("Main hand"));
        assert!(!element.html.contains("class=\"stats\""));

        fx.settings.set_detailed_tooltips(true);
        fx.canvas.hover(centre(bounds));
        let element = fx.document.element(TOOLTIP_ELEMENT_ID).expect("detailed tooltip");
        assert!(element.html.contains("class=\"stats\""));

        fx.menu.close(CloseReason::Toggle);
        assert!(fx.document.element(TOOLTIP_ELEMENT_ID).is_none());
    }

    #[test]
    fn right_press_on_weapon_opens_enhancements_but_not_on_power() {
        let fx = roomy();
        fx.menu.open(&fx.token).expect("open");

        let bolt = fx.menu.item_bounds("bolt").expect("bolt icon");
        fx.canvas.right_press(centre(bolt));
        assert!(!fx.enhancements.is_open());

        let sword = fx.menu.item_bounds("sword").expect("sword icon");
        fx.canvas.right_press(centre(sword));
        assert!(fx.enhancements.is_open());
        assert_eq!(fx.enhancements.option_names(), vec!["Edit Weapon"]);

        fx.menu.close(CloseReason::Toggle);
        assert!(!fx.enhancements.is_open());
    }

    #[test]
    fn choosing_enhancement_closes_weapon_menu() {
        let fx = roomy();
        fx.menu.open(&fx.token).expect("open");
        let sword = fx.menu.item_bounds("sword").expect("sword icon");
        fx.canvas.right_press(centre(sword));

        let badge = fx.enhancements.badge_bounds(0).expect("badge");
        fx.canvas.left_press(Vec2::new(badge.x + 2.0, badge.y + 2.0));
        assert!(!fx.menu.is_open());
        assert_eq!(fx.actor.opened_sheets(), vec![crate::host::ItemId::from("sword")]);
    }
}
