mod drag;
mod resources;
mod state;
mod timing;
mod weak_map;

pub use drag::{DragState, DragTracker};
pub use resources::{ResourceTracker, TrackedListener};
pub use state::{MergeOptions, StateContainer, StateError};
pub use timing::{Clock, FrameScheduler, ManualClock, SystemClock, TaskHandle, TimingMarks};
pub use weak_map::WeakTokenMap;
