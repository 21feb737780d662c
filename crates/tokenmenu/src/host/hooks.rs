use std::rc::Rc;

use thiserror::Error;

use super::{MenuItem, SceneId, TokenId, TokenRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    CanvasReady,
    DeleteToken,
    ControlToken,
    TooltipBuildStats,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CanvasReady => "canvasReady",
            Self::DeleteToken => "deleteToken",
            Self::ControlToken => "controlToken",
            Self::TooltipBuildStats => "tokenmenu.tooltip.buildStats",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookId(pub u64);

/// A row appended to a detailed tooltip by a `TooltipBuildStats` subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub icon: String,
    pub label: String,
    pub value: StatValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Number(f64),
    Text(String),
}

pub enum HookArgs<'a> {
    CanvasReady {
        scene_id: &'a SceneId,
    },
    DeleteToken {
        token_id: &'a TokenId,
    },
    ControlToken {
        token: &'a TokenRef,
        controlled: bool,
    },
    TooltipBuildStats {
        item: &'a MenuItem,
        stats: &'a mut Vec<StatRow>,
    },
}

impl HookArgs<'_> {
    pub fn hook(&self) -> Hook {
        match self {
            Self::CanvasReady { .. } => Hook::CanvasReady,
            Self::DeleteToken { .. } => Hook::DeleteToken,
            Self::ControlToken { .. } => Hook::ControlToken,
            Self::TooltipBuildStats { .. } => Hook::TooltipBuildStats,
        }
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook handler for {hook} failed: {message}")]
    HandlerFailed { hook: &'static str, message: String },
}

pub type HookHandler = Rc<dyn Fn(&mut HookArgs<'_>) -> Result<(), HookError>>;

/// Named-signal bus owned by the host.
pub trait HookBus {
    fn on(&self, hook: Hook, handler: HookHandler) -> HookId;
    fn off(&self, hook: Hook, id: HookId) -> bool;
    /// Runs every subscriber; a failing subscriber is logged and the rest still run.
    fn call_all(&self, args: &mut HookArgs<'_>) -> usize;
}
