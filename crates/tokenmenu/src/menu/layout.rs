use std::cmp::Ordering;

use crate::config::MenuStyle;
use crate::geometry::{clamp_span, Rect, Vec2};
use crate::host::{ItemKind, MenuItem};

fn special_rank(item: &MenuItem) -> u8 {
    let name = item.name.to_lowercase();
    if name.contains("unarmed") {
        3
    } else if name.contains("claw") {
        2
    } else if name.contains("knife") {
        1
    } else {
        0
    }
}

fn compare_items(a: &MenuItem, b: &MenuItem) -> Ordering {
    a.kind
        .sort_rank()
        .cmp(&b.kind.sort_rank())
        .then_with(|| a.equip_status.sort_rank().cmp(&b.equip_status.sort_rank()))
        .then_with(|| a.group.sort_rank().cmp(&b.group.sort_rank()))
        .then_with(|| special_rank(a).cmp(&special_rank(b)))
        .then_with(|| a.name.cmp(&b.name))
}

/// Weapons first, then powers, then everything else. Within a kind: equipment
/// status, weapon group, then knife < claws < unarmed, then name.
pub fn sort_menu_items(items: &mut [MenuItem]) {
    items.sort_by(compare_items);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconSlot {
    pub item_index: usize,
    /// Relative to the menu's top-left corner.
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuLayout {
    pub size: Vec2,
    pub slots: Vec<IconSlot>,
}

/// One row per item kind, in the order the items arrive. Expects sorted items.
pub fn layout_rows(items: &[MenuItem], style: &MenuStyle) -> Option<MenuLayout> {
    if items.is_empty() {
        return None;
    }

    let mut rows: Vec<(ItemKind, Vec<usize>)> = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match rows.last_mut() {
            Some((kind, members)) if *kind == item.kind => members.push(index),
            _ => rows.push((item.kind, vec![index])),
        }
    }

    let stride = style.icon_size + style.icon_gap;
    let mut slots = Vec::with_capacity(items.len());
    for (row, (_, members)) in rows.iter().enumerate() {
        for (column, item_index) in members.iter().enumerate() {
            slots.push(IconSlot {
                item_index: *item_index,
                rect: Rect::new(
                    style.padding + column as f32 * stride,
                    style.padding + row as f32 * stride,
                    style.icon_size,
                    style.icon_size,
                ),
            });
        }
    }

    let widest = rows.iter().map(|(_, members)| members.len()).max().unwrap_or(0) as f32;
    let row_count = rows.len() as f32;
    let size = Vec2::new(
        style.padding * 2.0 + widest * style.icon_size + (widest - 1.0).max(0.0) * style.icon_gap,
        style.padding * 2.0 + row_count * style.icon_size + (row_count - 1.0).max(0.0) * style.icon_gap,
    );
    Some(MenuLayout { size, slots })
}

/// Top-left of the weapon menu in token-layer space: centred under the token,
/// clamped horizontally to the scene, flipped above the token when it would
/// leave the bottom edge, and pinned to the top edge as a last resort.
pub fn weapon_menu_origin(token: Rect, menu: Vec2, scene: Rect, y_offset: f32) -> Vec2 {
    let centred = token.x + token.width / 2.0 - menu.x / 2.0;
    let x = clamp_span(centred, menu.x, scene.x, scene.right());

    let below = token.bottom() + y_offset;
    let y = if below + menu.y <= scene.bottom() {
        below
    } else {
        let above = token.y - y_offset - menu.y;
        if above >= scene.y {
            above
        } else {
            scene.y
        }
    };
    Vec2::new(x, y)
}

/// Top-left of the enhancement list: right of the icon, or left of it when the
/// right side would leave the scene; clamped vertically.
pub fn enhancement_menu_origin(icon: Rect, menu: Vec2, scene: Rect, gap: f32) -> Vec2 {
    let right = icon.right() + gap;
    let x = if right + menu.x <= scene.right() {
        right
    } else {
        clamp_span(icon.x - gap - menu.x, menu.x, scene.x, scene.right())
    };
    let y = clamp_span(icon.y, menu.y, scene.y, scene.bottom());
    Vec2::new(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EquipStatus, WeaponGroup};

    fn weapon(name: &str, equip: EquipStatus, group: WeaponGroup) -> MenuItem {
        let mut item = MenuItem::new(name, name, ItemKind::Weapon);
        item.equip_status = equip;
        item.group = group;
        item
    }

    fn names(items: &[MenuItem]) -> Vec<&str> {
        items.iter().map(|item| item.name.as_str()).collect()
    }

    #[test]
    fn sort_orders_by_kind_equipment_group_and_special_names() {
        let mut items = vec![
            MenuItem::new("misc", "Rope", ItemKind::Other),
            MenuItem::new("bolt", "Bolt", ItemKind::Power),
            weapon("Unarmed Strike", EquipStatus::Carried, WeaponGroup::Natural),
            weapon("Claws", EquipStatus::Carried, WeaponGroup::Natural),
            weapon("Knife", EquipStatus::Carried, WeaponGroup::Natural),
            weapon("Bow", EquipStatus::TwoHands, WeaponGroup::Ranged),
            weapon("Sword", EquipStatus::MainHand, WeaponGroup::Melee),
            weapon("Axe", EquipStatus::MainHand, WeaponGroup::Melee),
            weapon("Pistol", EquipStatus::MainHand, WeaponGroup::Ranged),
        ];
        sort_menu_items(&mut items);
        assert_eq!(
            names(&items),
            vec![
                "Bow",
                "Axe",
                "Sword",
                "Pistol",
                "Knife",
                "Claws",
                "Unarmed Strike",
                "Bolt",
                "Rope"
            ]
        );
    }

    #[test]
    fn layout_puts_each_kind_on_its_own_row() {
        let mut items = vec![
            MenuItem::new("a", "A", ItemKind::Weapon),
            MenuItem::new("b", "B", ItemKind::Weapon),
            MenuItem::new("c", "C", ItemKind::Weapon),
            MenuItem::new("p", "P", ItemKind::Power),
        ];
        sort_menu_items(&mut items);
        let layout = layout_rows(&items, &MenuStyle::default()).expect("layout");

        // 6 + 3 * 36 + 2 * 4 + 6 wide, 6 + 2 * 36 + 4 + 6 high.
        assert_eq!(layout.size, Vec2::new(128.0, 88.0));
        assert_eq!(layout.slots[2].rect, Rect::new(86.0, 6.0, 36.0, 36.0));
        assert_eq!(layout.slots[3].rect, Rect::new(6.0, 46.0, 36.0, 36.0));
        assert!(layout_rows(&[], &MenuStyle::default()).is_none());
    }

    #[test]
    fn menu_sits_centred_below_token() {
        let origin = weapon_menu_origin(
            Rect::new(100.0, 100.0, 100.0, 100.0),
            Vec2::new(60.0, 40.0),
            Rect::new(0.0, 0.0, 1000.0, 1000.0),
            10.0,
        );
        assert_eq!(origin, Vec2::new(120.0, 210.0));
    }

    #[test]
    fn menu_is_clamped_then_flipped_then_pinned() {
        let scene = Rect::new(0.0, 0.0, 400.0, 300.0);
        let clamped = weapon_menu_origin(Rect::new(-20.0, 0.0, 50.0, 50.0), Vec2::new(100.0, 40.0), scene, 10.0);
        assert_eq!(clamped.x, 0.0);

        let flipped = weapon_menu_origin(Rect::new(100.0, 230.0, 50.0, 50.0), Vec2::new(60.0, 40.0), scene, 10.0);
        assert_eq!(flipped.y, 180.0);

        let pinned = weapon_menu_origin(Rect::new(100.0, 20.0, 50.0, 260.0), Vec2::new(60.0, 40.0), scene, 10.0);
        assert_eq!(pinned.y, 0.0);
    }

    #[test]
    fn enhancement_menu_flips_left_near_right_edge() {
        let scene = Rect::new(0.0, 0.0, 500.0, 500.0);
        let right = enhancement_menu_origin(Rect::new(100.0, 100.0, 36.0, 36.0), Vec2::new(80.0, 60.0), scene, 4.0);
        assert_eq!(right, Vec2::new(140.0, 100.0));

        let left = enhancement_menu_origin(Rect::new(440.0, 470.0, 36.0, 36.0), Vec2::new(80.0, 60.0), scene, 4.0);
        assert_eq!(left, Vec2::new(356.0, 440.0));
    }
}
