use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MODULE_ID: &str = "tokenmenu";

pub const CLICK_DEBOUNCE_MS: u64 = 75;
pub const SELECTION_CLEAR_DELAY_MS: u64 = 100;
pub const SELECTION_TIMEOUT_MS: u64 = 500;
pub const DRAG_THRESHOLD_PX: f32 = 5.0;
pub const DRAG_DETECTION_DELAY_MS: u64 = 150;
pub const MENU_CLICK_DEBOUNCE_MS: u64 = 75;

pub const MENU_Y_OFFSET_PX: f32 = 10.0;
pub const MENU_CORNER_RADIUS_PX: f32 = 5.0;
pub const ICON_CORNER_RADIUS_PX: f32 = 3.0;
pub const MENU_ICON_SIZE_PX: f32 = 36.0;
pub const MENU_ICON_GAP_PX: f32 = 4.0;
pub const MENU_PADDING_PX: f32 = 6.0;
pub const MENU_BACKGROUND_COLOR: u32 = 0x1a_1a_1a;
pub const MENU_BACKGROUND_ALPHA: f32 = 0.85;

pub const TOOLTIP_Z_INDEX: i32 = 100_000;
pub const TOOLTIP_CURSOR_Y_OFFSET_PX: f32 = 20.0;
pub const TOOLTIP_EDGE_PADDING_PX: f32 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InteractionConfig {
    pub click_debounce_ms: u64,
    pub selection_clear_delay_ms: u64,
    pub selection_timeout_ms: u64,
    pub drag_threshold_pixels: f32,
    pub drag_detection_delay_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            click_debounce_ms: CLICK_DEBOUNCE_MS,
            selection_clear_delay_ms: SELECTION_CLEAR_DELAY_MS,
            selection_timeout_ms: SELECTION_TIMEOUT_MS,
            drag_threshold_pixels: DRAG_THRESHOLD_PX,
            drag_detection_delay_ms: DRAG_DETECTION_DELAY_MS,
        }
    }
}

impl InteractionConfig {
    pub fn drag_detection_delay(&self) -> Duration {
        Duration::from_millis(self.drag_detection_delay_ms)
    }

    pub fn selection_clear_delay(&self) -> Duration {
        Duration::from_millis(self.selection_clear_delay_ms)
    }

    pub fn selection_timeout(&self) -> Duration {
        Duration::from_millis(self.selection_timeout_ms)
    }

    pub fn click_debounce(&self) -> Duration {
        Duration::from_millis(self.click_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MenuStyle {
    pub y_offset: f32,
    pub corner_radius: f32,
    pub icon_corner_radius: f32,
    pub icon_size: f32,
    pub icon_gap: f32,
    pub padding: f32,
    pub background_color: u32,
    pub background_alpha: f32,
    pub enhancement_click_debounce_ms: u64,
}

impl Default for MenuStyle {
    fn default() -> Self {
        Self {
            y_offset: MENU_Y_OFFSET_PX,
            corner_radius: MENU_CORNER_RADIUS_PX,
            icon_corner_radius: ICON_CORNER_RADIUS_PX,
            icon_size: MENU_ICON_SIZE_PX,
            icon_gap: MENU_ICON_GAP_PX,
            padding: MENU_PADDING_PX,
            background_color: MENU_BACKGROUND_COLOR,
            background_alpha: MENU_BACKGROUND_ALPHA,
            enhancement_click_debounce_ms: MENU_CLICK_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TooltipConfig {
    pub z_index: i32,
    pub cursor_y_offset: f32,
    pub edge_padding: f32,
}

impl Default for TooltipConfig {
    fn default() -> Self {
        Self {
            z_index: TOOLTIP_Z_INDEX,
            cursor_y_offset: TOOLTIP_CURSOR_Y_OFFSET_PX,
            edge_padding: TOOLTIP_EDGE_PADDING_PX,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub interaction: InteractionConfig,
    pub menu: MenuStyle,
    pub tooltip: TooltipConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid module config at {path}: {message}")]
    Invalid { path: String, message: String },
}

impl ModuleConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let deserializer = &mut serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize(deserializer).map_err(|error| ConfigError::Invalid {
            path: error.path().to_string(),
            message: error.inner().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_named_constants() {
        let config = ModuleConfig::default();
        assert_eq!(config.interaction.click_debounce_ms, 75);
        assert_eq!(config.interaction.selection_clear_delay_ms, 100);
        assert_eq!(config.interaction.selection_timeout_ms, 500);
        assert_eq!(config.interaction.drag_threshold_pixels, 5.0);
        assert_eq!(config.interaction.drag_detection_delay_ms, 150);
        assert_eq!(config.menu.y_offset, 10.0);
        assert_eq!(config.menu.corner_radius, 5.0);
        assert_eq!(config.menu.icon_corner_radius, 3.0);
        assert_eq!(config.tooltip.z_index, 100_000);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config = ModuleConfig::from_json_str(r#"{"interaction":{"dragThresholdPixels":8}}"#)
            .expect("config");
        assert_eq!(config.interaction.drag_threshold_pixels, 8.0);
        assert_eq!(config.interaction.drag_detection_delay_ms, 150);
        assert_eq!(config.menu, MenuStyle::default());
    }

    #[test]
    fn invalid_field_reports_its_path() {
        let error = ModuleConfig::from_json_str(r#"{"menu":{"backgroundAlpha":"opaque"}}"#)
            .expect_err("should fail");
        let ConfigError::Invalid { path, .. } = error;
        assert_eq!(path, "menu.backgroundAlpha");
    }
}
