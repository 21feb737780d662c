pub mod config;
pub mod geometry;
pub mod host;
pub mod interaction;
pub mod menu;
pub mod module;
pub mod overlay;
pub mod runtime;
pub mod scene_graph;
pub mod sim;

pub use config::{ConfigError, InteractionConfig, MenuStyle, ModuleConfig, TooltipConfig, MODULE_ID};
pub use geometry::{Rect, Vec2};
pub use interaction::{InteractionDeps, TokenInteraction};
pub use menu::{EnhancementMenu, TooltipController, WeaponMenu};
pub use module::{HostContext, ModuleError, TokenMenuModule};
pub use overlay::Document;
pub use scene_graph::{NodeKind, SceneNode};
