use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::config::MenuStyle;
use crate::geometry::{Rect, Vec2};
use crate::host::{
    ActorRef, Canvas, EnhancementError, EnhancementOption, EnhancementProvider, KeyEventKind,
    KeyboardEvent, Localization, MenuItem, Notifications, PointerEvent, PointerEventKind,
    TokenHandle, TokenRef,
};
use crate::overlay::Document;
use crate::runtime::{Clock, ResourceTracker};
use crate::scene_graph::{NodeKind, SceneNode};

const BADGE_FONT_PX: f32 = 12.0;
const BADGE_HEIGHT_PX: f32 = 22.0;
const BADGE_PADDING_PX: f32 = 8.0;
const BADGE_GAP_PX: f32 = 2.0;
const BADGE_FILL: u32 = 0x2a_2a_2a;
const BADGE_STROKE: u32 = 0x6b_6b_6b;
const BADGE_TEXT_COLOR: u32 = 0xff_ff_ff;
const LIST_PADDING_PX: f32 = 4.0;
const ICON_GAP_PX: f32 = 4.0;

pub const ENHANCEMENT_CONTAINER_NAME: &str = "tokenmenu-enhancements";

pub struct EnhancementRequest {
    pub actor: ActorRef,
    pub weapon: MenuItem,
    pub token: TokenRef,
    /// The weapon icon the list attaches to.
    pub anchor: Rc<SceneNode>,
    pub icon_radius: f32,
    pub on_close: Option<Rc<dyn Fn()>>,
}

struct OpenEnhancements {
    container: Rc<SceneNode>,
    options: Vec<EnhancementOption>,
    weapon: MenuItem,
    on_close: Option<Rc<dyn Fn()>>,
    opened_at: Instant,
    resources: ResourceTracker,
}

pub struct EnhancementMenu {
    me: Weak<EnhancementMenu>,
    canvas: Rc<dyn Canvas>,
    document: Rc<Document>,
    provider: Option<Rc<dyn EnhancementProvider>>,
    localization: Rc<dyn Localization>,
    notifications: Rc<dyn Notifications>,
    clock: Rc<dyn Clock>,
    style: MenuStyle,
    current: RefCell<Option<OpenEnhancements>>,
}

impl EnhancementMenu {
    pub fn new(
        canvas: Rc<dyn Canvas>,
        document: Rc<Document>,
        provider: Option<Rc<dyn EnhancementProvider>>,
        localization: Rc<dyn Localization>,
        notifications: Rc<dyn Notifications>,
        clock: Rc<dyn Clock>,
        style: MenuStyle,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            canvas,
            document,
            provider,
            localization,
            notifications,
            clock,
            style,
            current: RefCell::new(None),
        })
    }

    pub fn is_open(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub fn option_names(&self) -> Vec<String> {
        self.current
            .borrow()
            .as_ref()
            .map(|open| open.options.iter().map(|option| option.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Global bounds of the badge at `index`, for driving clicks.
    pub fn badge_bounds(&self, index: usize) -> Option<Rect> {
        let current = self.current.borrow();
        let badge = current.as_ref()?.container.children().into_iter().nth(index + 1)?;
        badge.global_bounds()
    }

    pub fn container(&self) -> Option<Rc<SceneNode>> {
        self.current
            .borrow()
            .as_ref()
            .map(|open| Rc::clone(&open.container))
    }

    fn collect_options(&self, request: &EnhancementRequest) -> Vec<EnhancementOption> {
        let mut options = match &self.provider {
            Some(provider) => {
                match provider.menu_options(&request.actor, &request.weapon, &request.token) {
                    Ok(options) => options,
                    Err(error) => {
                        warn!(
                            weapon = %request.weapon.id,
                            error = %error,
                            "enhancement_provider_failed"
                        );
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        let actor = Rc::clone(&request.actor);
        options.push(EnhancementOption {
            name: self.localization.localize("TOKENMENU.EditWeapon"),
            callback: Rc::new(move |weapon: &MenuItem| {
                actor.open_item_sheet(&weapon.id).map_err(EnhancementError::from)
            }),
        });
        options
    }

    pub fn show(&self, request: EnhancementRequest) {
        self.hide();
        if !self.canvas.is_ready() {
            return;
        }

        let options = self.collect_options(&request);
        let layer = self.canvas.token_layer();

        let labels = options
            .iter()
            .map(|option| {
                SceneNode::new(
                    "label",
                    NodeKind::Text {
                        content: option.name.clone(),
                        size_px: BADGE_FONT_PX,
                        color: BADGE_TEXT_COLOR,
                    },
                )
            })
            .collect::<Vec<_>>();
        let badge_width = labels
            .iter()
            .filter_map(|label| label.local_bounds())
            .map(|bounds| bounds.width)
            .fold(0.0_f32, f32::max)
            + BADGE_PADDING_PX * 2.0;
        let rows = options.len() as f32;
        let size = Vec2::new(
            badge_width + LIST_PADDING_PX * 2.0,
            LIST_PADDING_PX * 2.0 + rows * BADGE_HEIGHT_PX + (rows - 1.0).max(0.0) * BADGE_GAP_PX,
        );

        let container = SceneNode::container(ENHANCEMENT_CONTAINER_NAME);
        let background = SceneNode::new(
            "background",
            NodeKind::RoundedRect {
                width: size.x,
                height: size.y,
                radius: self.style.corner_radius,
                fill: self.style.background_color,
                alpha: self.style.background_alpha,
                stroke: None,
            },
        );
        background.set_interactive(true);
        container.add_child(Rc::clone(&background));

        let resources = ResourceTracker::new("enhancement_menu");
        resources.register_listener(
            &background,
            PointerEventKind::Down,
            Rc::new(|event: &PointerEvent| event.stop_propagation()),
        );

        for (index, label) in labels.into_iter().enumerate() {
            let badge = SceneNode::new(
                format!("badge:{index}"),
                NodeKind::RoundedRect {
                    width: badge_width,
                    height: BADGE_HEIGHT_PX,
                    radius: self.style.icon_corner_radius,
                    fill: BADGE_FILL,
                    alpha: 1.0,
                    stroke: Some(BADGE_STROKE),
                },
            );
            badge.set_position(Vec2::new(
                LIST_PADDING_PX,
                LIST_PADDING_PX + index as f32 * (BADGE_HEIGHT_PX + BADGE_GAP_PX),
            ));
            badge.set_interactive(true);
            label.set_position(Vec2::new(
                BADGE_PADDING_PX,
                (BADGE_HEIGHT_PX - BADGE_FONT_PX * 1.2) / 2.0,
            ));
            badge.add_child(label);

            let me = self.me.clone();
            resources.register_listener(
                &badge,
                PointerEventKind::Down,
                Rc::new(move |event: &PointerEvent| {
                    event.stop_propagation();
                    if let Some(this) = me.upgrade() {
                        this.activate(index);
                    }
                }),
            );
            container.add_child(badge);
        }

        let icon = anchor_rect_in_layer(&request.anchor, &layer, request.icon_radius);
        let origin = crate::menu::layout::enhancement_menu_origin(
            icon,
            size,
            self.canvas.scene_rect(),
            ICON_GAP_PX,
        );
        container.set_position(origin);
        layer.add_child(Rc::clone(&container));

        let me = self.me.clone();
        resources.register_listener(
            &self.canvas.stage(),
            PointerEventKind::Down,
            Rc::new(move |event: &PointerEvent| {
                if let Some(this) = me.upgrade() {
                    this.on_stage_press(event);
                }
            }),
        );
        let me = self.me.clone();
        resources.register_key_listener(
            &self.document,
            KeyEventKind::KeyDown,
            Rc::new(move |event: &KeyboardEvent| {
                if event.key == PhysicalKey::Code(KeyCode::Escape) {
                    if let Some(this) = me.upgrade() {
                        this.hide();
                    }
                }
            }),
        );

        info!(
            token = %request.token.id(),
            weapon = %request.weapon.id,
            options = options.len(),
            "enhancement_menu_opened"
        );
        *self.current.borrow_mut() = Some(OpenEnhancements {
            container,
            options,
            weapon: request.weapon,
            on_close: request.on_close,
            opened_at: self.clock.now(),
            resources,
        });
    }

    fn on_stage_press(&self, event: &PointerEvent) {
        let outside = {
            let current = self.current.borrow();
            let Some(open) = current.as_ref() else {
                return;
            };
            let debounce = Duration::from_millis(self.style.enhancement_click_debounce_ms);
            if self.clock.now().saturating_duration_since(open.opened_at) < debounce {
                return;
            }
            !open
                .container
                .global_bounds()
                .is_some_and(|bounds| bounds.contains(event.global))
        };
        if outside {
            debug!("enhancement_menu_outside_press");
            self.hide();
        }
    }

    fn activate(&self, index: usize) {
        let selected = {
            let current = self.current.borrow();
            current.as_ref().and_then(|open| {
                open.options
                    .get(index)
                    .cloned()
                    .map(|option| (option, open.weapon.clone(), open.on_close.clone()))
            })
        };
        let Some((option, weapon, on_close)) = selected else {
            return;
        };

        self.hide();
        if let Some(on_close) = on_close {
            on_close();
        }
        info!(weapon = %weapon.id, action = %option.name, "enhancement_selected");
        if let Err(error) = (option.callback)(&weapon) {
            warn!(weapon = %weapon.id, action = %option.name, error = %error, "enhancement_action_failed");
            self.notifications.error(&format!(
                "{}: {}",
                self.localization.localize("TOKENMENU.EnhancementFailed"),
                option.name
            ));
        }
    }

    pub fn hide(&self) {
        let open = self.current.borrow_mut().take();
        if let Some(open) = open {
            open.resources.teardown();
            open.container.destroy();
            debug!("enhancement_menu_closed");
        }
    }
}

fn anchor_rect_in_layer(anchor: &Rc<SceneNode>, layer: &Rc<SceneNode>, icon_radius: f32) -> Rect {
    let global = anchor.global_bounds().unwrap_or_else(|| {
        let centre = anchor.to_global(Vec2::ZERO);
        Rect::new(
            centre.x - icon_radius,
            centre.y - icon_radius,
            icon_radius * 2.0,
            icon_radius * 2.0,
        )
    });
    let top_left = layer.to_local(global.origin());
    let bottom_right = layer.to_local(Vec2::new(global.right(), global.bottom()));
    Rect::new(
        top_left.x,
        top_left.y,
        bottom_right.x - top_left.x,
        bottom_right.y - top_left.y,
    )
}
