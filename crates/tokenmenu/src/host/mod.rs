//! Narrow capabilities the module needs from the tabletop host.
//!
//! Every collaborator is a trait object so that the interaction core and the
//! menus can be driven by the in-memory host in `crate::sim` as easily as by a
//! real canvas adapter.

mod events;
mod hooks;
mod items;

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::geometry::{Rect, Vec2};
use crate::scene_graph::SceneNode;

pub use events::{
    Dispatch, Emitter, EventEmitter, EventTarget, KeyEmitter, KeyEventKind, KeyboardEvent,
    ListenerId, PointerEvent, PointerEventKind,
};
pub use hooks::{Hook, HookArgs, HookBus, HookError, HookHandler, HookId, StatRow, StatValue};
pub use items::{Ammo, EquipStatus, ItemId, ItemKind, MenuItem, WeaponGroup};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub String);

impl From<&str> for TokenId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneId(pub String);

impl From<&str> for SceneId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("item {item} not found on actor {actor}")]
    ItemNotFound { actor: String, item: String },
    #[error("host rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
    #[error("wrapper for {target} is already registered by {module_id}")]
    WrapperConflict { module_id: String, target: String },
}

pub type TokenRef = Rc<dyn TokenHandle>;
pub type ActorRef = Rc<dyn Actor>;

pub trait TokenHandle: EventTarget {
    fn id(&self) -> TokenId;
    fn name(&self) -> String;
    fn is_controlled(&self) -> bool;
    fn is_owner(&self) -> bool;
    /// Top-left corner in global coordinates.
    fn global_position(&self) -> Vec2;
    /// Width and height in global pixels.
    fn size(&self) -> Vec2;
    fn actor(&self) -> Option<ActorRef>;

    fn to_global(&self, local: Vec2) -> Vec2 {
        let origin = self.global_position();
        Vec2::new(origin.x + local.x, origin.y + local.y)
    }
}

pub trait Actor {
    fn id(&self) -> String;
    fn name(&self) -> String;
    fn items(&self) -> Vec<MenuItem>;
    fn activate_item(&self, item: &ItemId) -> Result<(), HostError>;
    fn open_item_sheet(&self, item: &ItemId) -> Result<(), HostError>;
}

pub trait Canvas {
    fn is_ready(&self) -> bool;
    fn scene_id(&self) -> Option<SceneId>;
    fn token_layer(&self) -> Rc<SceneNode>;
    fn stage(&self) -> Rc<SceneNode>;
    /// The scene's bounding rectangle in world (token layer) coordinates.
    fn scene_rect(&self) -> Rect;
    fn placed_tokens(&self) -> Vec<TokenRef>;
    fn token(&self, id: &TokenId) -> Option<TokenRef>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperMode {
    Wrapper,
    Mixed,
    Override,
}

/// `(token, event, original)`; the wrapper decides whether and when to call `original`.
pub type ClickWrapper = Rc<dyn Fn(&TokenRef, &PointerEvent, &dyn Fn())>;

pub trait WrapperRegistry {
    fn register(
        &self,
        module_id: &str,
        target: &str,
        wrapper: ClickWrapper,
        mode: WrapperMode,
    ) -> Result<(), HostError>;
    fn unregister(&self, module_id: &str, target: &str) -> bool;
}

pub trait Localization {
    fn localize(&self, key: &str) -> String;
}

pub trait Notifications {
    fn error(&self, message: &str);
}

pub trait Settings {
    fn show_menu_on_selection(&self) -> bool;
    fn is_debug_enabled(&self) -> bool;
    fn detailed_tooltips(&self) -> bool {
        false
    }
}

pub trait Coordinator {
    fn is_menu_open(&self) -> bool;
    fn is_only_controlled_token(&self, token: &TokenRef) -> bool;
    fn controlled_tokens(&self) -> Vec<TokenRef>;
    fn is_processing_selection(&self) -> bool;
    fn start_selection_processing(&self);
    fn clear_selection_processing(&self);
    fn remove_movement_tracker(&self, token: &TokenId);
    fn set_open_menu(&self, token: Option<TokenId>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Toggle,
    Drag,
    RightClick,
    MultiSelect,
    Deselected,
    SceneChange,
    TokenDeleted,
    Replaced,
    ItemActivated,
    Teardown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Toggle => "toggle",
            Self::Drag => "drag",
            Self::RightClick => "right_click",
            Self::MultiSelect => "multi_select",
            Self::Deselected => "deselected",
            Self::SceneChange => "scene_change",
            Self::TokenDeleted => "token_deleted",
            Self::Replaced => "replaced",
            Self::ItemActivated => "item_activated",
            Self::Teardown => "teardown",
        }
    }
}

#[derive(Debug, Error)]
pub enum MenuError {
    #[error("canvas is not ready")]
    CanvasNotReady,
    #[error("menu for token {0} failed: {1}")]
    Host(TokenId, #[source] HostError),
    #[error("menu is busy with another selection")]
    Busy,
}

/// The open/close capability injected into the interaction core.
pub trait MenuActions {
    fn show_weapon_menu_under_token(&self, token: &TokenRef) -> Result<(), MenuError>;
    fn close_weapon_menu(&self, reason: CloseReason) -> Result<(), MenuError>;
    /// The token whose menu is currently shown, if any.
    fn menu_token(&self) -> Option<TokenId>;
}

#[derive(Debug, Error)]
pub enum EnhancementError {
    #[error("enhancement provider failed: {0}")]
    Provider(String),
    #[error("enhancement action {name} failed: {message}")]
    Action { name: String, message: String },
    #[error(transparent)]
    Host(#[from] HostError),
}

pub type EnhancementCallback = Rc<dyn Fn(&MenuItem) -> Result<(), EnhancementError>>;

#[derive(Clone)]
pub struct EnhancementOption {
    pub name: String,
    pub callback: EnhancementCallback,
}

impl fmt::Debug for EnhancementOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnhancementOption")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub trait EnhancementProvider {
    fn menu_options(
        &self,
        actor: &ActorRef,
        weapon: &MenuItem,
        token: &TokenRef,
    ) -> Result<Vec<EnhancementOption>, EnhancementError>;
}
