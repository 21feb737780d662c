use std::cell::RefCell;

use crate::geometry::Vec2;
use crate::host::TokenRef;

use super::weak_map::WeakTokenMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DragState {
    pub is_dragging: bool,
    pub start_coords: Option<Vec2>,
    pub has_moved: bool,
    pub listeners_installed: bool,
}

/// Per-token drag bookkeeping. `has_moved` implies `is_dragging` until `end_drag`.
#[derive(Default)]
pub struct DragTracker {
    states: RefCell<WeakTokenMap<DragState>>,
}

impl DragTracker {
    pub fn initialize(&self, token: &TokenRef) -> DragState {
        let mut states = self.states.borrow_mut();
        if let Some(state) = states.get(token) {
            return *state;
        }
        states.insert(token, DragState::default());
        DragState::default()
    }

    pub fn get(&self, token: &TokenRef) -> Option<DragState> {
        self.states.borrow().get(token).copied()
    }

    pub fn start_drag(&self, token: &TokenRef, start_coords: Vec2) {
        let mut states = self.states.borrow_mut();
        let listeners_installed = states
            .get(token)
            .map(|state| state.listeners_installed)
            .unwrap_or(false);
        states.insert(
            token,
            DragState {
                is_dragging: true,
                start_coords: Some(start_coords),
                has_moved: false,
                listeners_installed,
            },
        );
    }

    /// Marks the drag as moved once the Euclidean distance from the start
    /// exceeds `threshold`. Returns the current `has_moved`.
    pub fn update_movement(&self, token: &TokenRef, coords: Vec2, threshold: f32) -> bool {
        let mut states = self.states.borrow_mut();
        let Some(state) = states.get_mut(token) else {
            return false;
        };
        if !state.is_dragging {
            return false;
        }
        if !state.has_moved {
            if let Some(start) = state.start_coords {
                if start.distance(coords) > threshold {
                    state.has_moved = true;
                }
            }
        }
        state.has_moved
    }

    /// Ends the drag and reports whether it moved past the threshold.
    pub fn end_drag(&self, token: &TokenRef) -> bool {
        let mut states = self.states.borrow_mut();
        let Some(state) = states.get_mut(token) else {
            return false;
        };
        let has_moved = state.has_moved;
        state.is_dragging = false;
        state.has_moved = false;
        state.start_coords = None;
        has_moved
    }

    pub fn reset(&self, token: &TokenRef) {
        self.states.borrow_mut().insert(token, DragState::default());
    }

    pub fn is_dragging(&self, token: &TokenRef) -> bool {
        self.get(token).is_some_and(|state| state.is_dragging)
    }

    pub fn has_moved(&self, token: &TokenRef) -> bool {
        self.get(token).is_some_and(|state| state.has_moved)
    }

    pub fn set_listeners_installed(&self, token: &TokenRef, installed: bool) {
        let mut states = self.states.borrow_mut();
        match states.get_mut(token) {
            Some(state) => state.listeners_installed = installed,
            None => {
                states.insert(
                    token,
                    DragState {
                        listeners_installed: installed,
                        ..DragState::default()
                    },
                );
            }
        }
    }

    pub fn forget(&self, token: &TokenRef) {
        self.states.borrow_mut().remove(token);
    }

    pub fn clear_all(&self) {
        *self.states.borrow_mut() = WeakTokenMap::default();
    }

    pub fn prune(&self) -> usize {
        self.states.borrow_mut().prune()
    }

    pub fn tracked_count(&self) -> usize {
        self.states.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimToken;

    fn token() -> TokenRef {
        SimToken::builder("t1").build()
    }

    #[test]
    fn movement_within_threshold_is_not_a_move() {
        let tracker = DragTracker::default();
        let token = token();
        tracker.start_drag(&token, Vec2::new(100.0, 100.0));

        assert!(!tracker.update_movement(&token, Vec2::new(103.0, 104.0), 5.0));
        assert!(tracker.is_dragging(&token));
        assert!(!tracker.has_moved(&token));
    }

    #[test]
    fn movement_past_threshold_sticks_until_end() {
        let tracker = DragTracker::default();
        let token = token();
        tracker.start_drag(&token, Vec2::new(100.0, 100.0));

        assert!(tracker.update_movement(&token, Vec2::new(110.0, 100.0), 5.0));
        assert!(tracker.update_movement(&token, Vec2::new(100.0, 100.0), 5.0));
        assert!(tracker.end_drag(&token));
        assert!(!tracker.is_dragging(&token));
        assert!(!tracker.has_moved(&token));
        assert!(!tracker.end_drag(&token));
    }

    #[test]
    fn update_without_drag_reports_no_movement() {
        let tracker = DragTracker::default();
        let token = token();
        tracker.initialize(&token);
        assert!(!tracker.update_movement(&token, Vec2::new(500.0, 500.0), 5.0));
    }

    #[test]
    fn start_drag_keeps_listener_flag() {
        let tracker = DragTracker::default();
        let token = token();
        tracker.set_listeners_installed(&token, true);
        tracker.start_drag(&token, Vec2::ZERO);
        assert!(tracker.get(&token).expect("state").listeners_installed);
    }

    #[test]
    fn entries_disappear_with_their_token() {
        let tracker = DragTracker::default();
        let token = token();
        tracker.start_drag(&token, Vec2::ZERO);
        assert_eq!(tracker.tracked_count(), 1);
        drop(token);
        assert_eq!(tracker.tracked_count(), 0);
        assert_eq!(tracker.prune(), 1);
    }
}
