use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::config::TooltipConfig;
use crate::geometry::{clamp_span, Vec2};
use crate::host::{
    HookArgs, HookBus, ItemKind, Localization, MenuItem, PointerEvent, PointerEventKind, StatRow,
    StatValue,
};
use crate::overlay::{Document, OverlayElement};
use crate::runtime::{ResourceTracker, TrackedListener};

pub const TOOLTIP_ELEMENT_ID: &str = "tokenmenu-tooltip";

/// Collaborators consulted while building tooltip markup.
pub struct TooltipContext<'a> {
    pub hooks: &'a dyn HookBus,
    pub localization: &'a dyn Localization,
}

/// Viewport position for a tooltip of `size`: centred on the cursor and below
/// it, above it when it would leave the bottom, then clamped with edge padding.
pub fn tooltip_origin(cursor: Vec2, size: Vec2, viewport: Vec2, config: &TooltipConfig) -> Vec2 {
    let pad = config.edge_padding;
    let left = cursor.x - size.x / 2.0;
    let mut top = cursor.y + config.cursor_y_offset;
    if top + size.y > viewport.y - pad {
        top = cursor.y - config.cursor_y_offset - size.y;
    }
    Vec2::new(
        clamp_span(left, size.x, pad, viewport.x - pad),
        clamp_span(top, size.y, pad, viewport.y - pad),
    )
}

pub struct TooltipController {
    me: Weak<TooltipController>,
    document: Rc<Document>,
    config: TooltipConfig,
    resources: ResourceTracker,
    follow: RefCell<Option<TrackedListener>>,
    size: Cell<Vec2>,
}

impl TooltipController {
    pub fn new(document: Rc<Document>, config: TooltipConfig) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            document,
            config,
            resources: ResourceTracker::new("tooltip"),
            follow: RefCell::new(None),
            size: Cell::new(Vec2::ZERO),
        })
    }

    pub fn show(&self, html: &str, cursor: Vec2) {
        self.hide();

        let size = self.document.measure(html);
        self.size.set(size);
        let origin = tooltip_origin(cursor, size, self.document.viewport(), &self.config);
        self.document.append(OverlayElement {
            id: TOOLTIP_ELEMENT_ID.to_string(),
            html: html.to_string(),
            z_index: self.config.z_index,
            left: origin.x,
            top: origin.y,
            size,
        });

        let me = self.me.clone();
        let listener = self.resources.register_listener(
            &self.document,
            PointerEventKind::Move,
            Rc::new(move |event: &PointerEvent| {
                if let Some(this) = me.upgrade() {
                    this.follow_cursor(event.global);
                }
            }),
        );
        *self.follow.borrow_mut() = Some(listener);
    }

    fn follow_cursor(&self, cursor: Vec2) {
        let origin = tooltip_origin(
            cursor,
            self.size.get(),
            self.document.viewport(),
            &self.config,
        );
        self.document
            .set_element_position(TOOLTIP_ELEMENT_ID, origin.x, origin.y);
    }

    pub fn hide(&self) {
        let listener = self.follow.borrow_mut().take();
        if let Some(listener) = listener {
            self.resources.release_listener(listener);
        }
        self.document.remove(TOOLTIP_ELEMENT_ID);
    }

    pub fn is_visible(&self) -> bool {
        self.document.element(TOOLTIP_ELEMENT_ID).is_some()
    }

    pub fn teardown(&self) {
        self.hide();
        self.resources.teardown();
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// `+3`, `-2`, `+1.5`; zero and non-finite values produce nothing.
pub fn format_signed(value: f64) -> Option<String> {
    if value == 0.0 || !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 {
        Some(format!("{:+}", value as i64))
    } else {
        Some(format!("{value:+}"))
    }
}

fn base_rows(item: &MenuItem, localization: &dyn Localization) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    if let Some(ammo) = item.ammo {
        rows.push((
            localization.localize("TOKENMENU.Stat.Ammo"),
            format!("{}/{}", ammo.current, ammo.max),
        ));
    }
    if let Some(damage) = item.damage.as_deref().filter(|damage| !damage.is_empty()) {
        rows.push((localization.localize("TOKENMENU.Stat.Damage"), damage.to_string()));
    }
    if let Some(range) = item.range.as_deref().filter(|range| !range.is_empty()) {
        rows.push((localization.localize("TOKENMENU.Stat.Range"), range.to_string()));
    }
    if let Some(ap) = format_signed(f64::from(item.ap)) {
        rows.push((localization.localize("TOKENMENU.Stat.AP"), ap));
    }
    if let Some(trait_mod) = format_signed(f64::from(item.trait_mod)) {
        rows.push((localization.localize("TOKENMENU.Stat.TraitMod"), trait_mod));
    }
    if let Some(pp) = item.power_points {
        rows.push((localization.localize("TOKENMENU.Stat.PP"), pp.to_string()));
    }
    rows
}

fn validated_row(row: StatRow) -> Option<(String, String, String)> {
    let label = row.label.trim();
    if label.is_empty() {
        return None;
    }
    let value = match row.value {
        StatValue::Number(number) => format_signed(number)?,
        StatValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            text.to_string()
        }
    };
    Some((row.icon.trim().to_string(), label.to_string(), value))
}

fn extension_rows(item: &MenuItem, hooks: &dyn HookBus) -> Vec<(String, String, String)> {
    let mut stats = Vec::new();
    hooks.call_all(&mut HookArgs::TooltipBuildStats {
        item,
        stats: &mut stats,
    });
    let offered = stats.len();
    let rows = stats
        .into_iter()
        .filter_map(validated_row)
        .collect::<Vec<_>>();
    if rows.len() < offered {
        warn!(
            item = %item.id,
            dropped = offered - rows.len(),
            "tooltip_stat_rows_rejected"
        );
    }
    rows
}

/// Header with name and ammo, a subtitle (equipment status for weapons,
/// favourite state for powers) and, when `detailed`, the stat list including
/// rows contributed through the build-stats hook.
pub fn build_tooltip_content(item: &MenuItem, context: &TooltipContext<'_>, detailed: bool) -> String {
    let mut html = String::from("<div class=\"tokenmenu-tooltip\">");
    let _ = write!(html, "<header><strong>{}</strong>", escape_html(&item.name));
    if let Some(ammo) = item.ammo {
        let _ = write!(html, " <span class=\"ammo\">{}/{}</span>", ammo.current, ammo.max);
    }
    html.push_str("</header>");

    let subtitle = match item.kind {
        ItemKind::Weapon => Some(context.localization.localize(item.equip_status.localization_key())),
        ItemKind::Power => Some(context.localization.localize(if item.favorite {
            "TOKENMENU.Favorite"
        } else {
            "TOKENMENU.NotFavorite"
        })),
        ItemKind::Other => None,
    };
    if let Some(subtitle) = subtitle {
        let _ = write!(html, "<div class=\"subtitle\">{}</div>", escape_html(&subtitle));
    }

    if detailed {
        html.push_str("<ul class=\"stats\">");
        for (label, value) in base_rows(item, context.localization) {
            let _ = write!(
                html,
                "<li><span class=\"label\">{}:</span> {}</li>",
                escape_html(&label),
                escape_html(&value)
            );
        }
        for (icon, label, value) in extension_rows(item, context.hooks) {
            html.push_str("<li>");
            if !icon.is_empty() {
                let _ = write!(html, "<i class=\"{}\"></i> ", escape_html(&icon));
            }
            let _ = write!(
                html,
                "<span class=\"label\">{}:</span> {}</li>",
                escape_html(&label),
                escape_html(&value)
            );
        }
        html.push_str("</ul>");
    }

    html.push_str("</div>");
    debug!(item = %item.id, detailed, "tooltip_content_built");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Ammo, EquipStatus, EventTarget, Hook};
    use crate::sim::{KeyLocalization, LocalHookBus};

    fn rifle() -> MenuItem {
        let mut item = MenuItem::new("rifle", "Rifle <M1>", ItemKind::Weapon);
        item.equip_status = EquipStatus::TwoHands;
        item.ammo = Some(Ammo { current: 5, max: 8 });
        item.damage = Some("2d8".to_string());
        item.ap = 2;
        item
    }

    #[test]
    fn tooltip_sits_below_cursor_and_flips_near_bottom() {
        let config = TooltipConfig::default();
        let viewport = Vec2::new(800.0, 600.0);
        let size = Vec2::new(100.0, 50.0);

        assert_eq!(
            tooltip_origin(Vec2::new(400.0, 100.0), size, viewport, &config),
            Vec2::new(350.0, 120.0)
        );
        assert_eq!(
            tooltip_origin(Vec2::new(400.0, 560.0), size, viewport, &config),
            Vec2::new(350.0, 490.0)
        );
        assert_eq!(
            tooltip_origin(Vec2::new(5.0, 100.0), size, viewport, &config),
            Vec2::new(10.0, 120.0)
        );
    }

    #[test]
    fn show_follow_hide_manages_single_element() {
        let document = Rc::new(Document::new(Vec2::new(800.0, 600.0)));
        let tooltip = TooltipController::new(Rc::clone(&document), TooltipConfig::default());

        tooltip.show("<div>Sword</div>", Vec2::new(200.0, 200.0));
        tooltip.show("<div>Axe</div>", Vec2::new(200.0, 200.0));
        assert_eq!(document.element_count(), 1);
        let element = document.element(TOOLTIP_ELEMENT_ID).expect("element");
        assert_eq!(element.z_index, 100_000);
        assert_eq!(element.top, 220.0);

        document
            .events()
            .emit(&PointerEvent::new(PointerEventKind::Move, Vec2::new(300.0, 250.0)));
        let moved = document.element(TOOLTIP_ELEMENT_ID).expect("element");
        assert_eq!(moved.top, 270.0);

        tooltip.hide();
        tooltip.hide();
        assert!(!tooltip.is_visible());
        assert_eq!(document.events().listener_count(), 0);
    }

    #[test]
    fn content_has_header_and_subtitle() {
        let hooks = LocalHookBus::default();
        let localization = KeyLocalization::english();
        let context = TooltipContext {
            hooks: &hooks,
            localization: &localization,
        };
        let html = build_tooltip_content(&rifle(), &context, false);
        assert!(html.contains("<strong>Rifle &lt;M1&gt;</strong>"));
        assert!(html.contains("5/8"));
        assert!(html.contains("Two hands"));
        assert!(!html.contains("stats"));

        let mut power = MenuItem::new("bolt", "Bolt", ItemKind::Power);
        power.favorite = true;
        assert!(build_tooltip_content(&power, &context, false).contains("Favorite"));
    }

    #[test]
    fn detailed_content_includes_stats_and_validated_hook_rows() {
        let hooks = LocalHookBus::default();
        hooks.on(
            Hook::TooltipBuildStats,
            Rc::new(|args| {
                if let HookArgs::TooltipBuildStats { stats, .. } = args {
                    stats.push(StatRow {
                        icon: "fa-bolt".to_string(),
                        label: "Reach".to_string(),
                        value: StatValue::Number(1.0),
                    });
                    stats.push(StatRow {
                        icon: String::new(),
                        label: "Parry".to_string(),
                        value: StatValue::Number(0.0),
                    });
                    stats.push(StatRow {
                        icon: String::new(),
                        label: " ".to_string(),
                        value: StatValue::Text("x".to_string()),
                    });
                }
                Ok(())
            }),
        );
        let localization = KeyLocalization::english();
        let context = TooltipContext {
            hooks: &hooks,
            localization: &localization,
        };
        let html = build_tooltip_content(&rifle(), &context, true);

        assert!(html.contains("Damage:</span> 2d8"));
        assert!(html.contains("AP:</span> +2"));
        assert!(!html.contains("Trait Mod"));
        assert!(html.contains("Reach:</span> +1"));
        assert!(!html.contains("Parry"));
        assert_eq!(html.matches("<li>").count(), 4);
    }

    #[test]
    fn signed_format_drops_zero() {
        assert_eq!(format_signed(3.0).as_deref(), Some("+3"));
        assert_eq!(format_signed(-2.0).as_deref(), Some("-2"));
        assert_eq!(format_signed(1.5).as_deref(), Some("+1.5"));
        assert_eq!(format_signed(0.0), None);
    }
}
