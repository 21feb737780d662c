//! Menus shown for a selected token: the weapon menu, the enhancement list
//! anchored on a weapon icon, and the overlay tooltip.

pub mod enhancement;
pub mod layout;
pub mod tooltip;
pub mod weapon;

pub use enhancement::{EnhancementMenu, EnhancementRequest, ENHANCEMENT_CONTAINER_NAME};
pub use layout::{enhancement_menu_origin, layout_rows, sort_menu_items, weapon_menu_origin, MenuLayout};
pub use tooltip::{build_tooltip_content, TooltipContext, TooltipController, TOOLTIP_ELEMENT_ID};
pub use weapon::{CloseListener, WeaponMenu, WeaponMenuDeps, WEAPON_MENU_CONTAINER_NAME};
