use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::geometry::{Rect, Vec2};
use crate::host::{EventEmitter, EventTarget, PointerEvent, TokenId};

const TEXT_CHAR_WIDTH_FACTOR: f32 = 0.6;
const TEXT_LINE_HEIGHT_FACTOR: f32 = 1.2;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container,
    RoundedRect {
        width: f32,
        height: f32,
        radius: f32,
        fill: u32,
        alpha: f32,
        stroke: Option<u32>,
    },
    Text {
        content: String,
        size_px: f32,
        color: u32,
    },
    Sprite {
        texture: String,
        width: f32,
        height: f32,
    },
}

/// Retained scene-graph node. Positions are local to the parent; scale is uniform.
pub struct SceneNode {
    name: String,
    kind: NodeKind,
    position: Cell<Vec2>,
    scale: Cell<f32>,
    interactive: Cell<bool>,
    hit_area: Cell<Option<Rect>>,
    token_id: RefCell<Option<TokenId>>,
    parent: RefCell<Weak<SceneNode>>,
    children: RefCell<Vec<Rc<SceneNode>>>,
    destroyed: Cell<bool>,
    events: EventEmitter,
}

impl fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneNode")
            .field("name", &self.name)
            .field("position", &self.position.get())
            .field("children", &self.children.borrow().len())
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}

impl EventTarget for SceneNode {
    fn events(&self) -> &EventEmitter {
        &self.events
    }
}

impl SceneNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            kind,
            position: Cell::new(Vec2::ZERO),
            scale: Cell::new(1.0),
            interactive: Cell::new(false),
            hit_area: Cell::new(None),
            token_id: RefCell::new(None),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
            events: EventEmitter::default(),
        })
    }

    pub fn container(name: impl Into<String>) -> Rc<Self> {
        Self::new(name, NodeKind::Container)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind.clone()
    }

    pub fn position(&self) -> Vec2 {
        self.position.get()
    }

    pub fn set_position(&self, position: Vec2) {
        self.position.set(position);
    }

    pub fn scale(&self) -> f32 {
        self.scale.get()
    }

    pub fn set_scale(&self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.scale.set(scale);
        }
    }

    pub fn set_interactive(&self, interactive: bool) {
        self.interactive.set(interactive);
    }

    pub fn hit_area(&self) -> Option<Rect> {
        self.hit_area.get()
    }

    pub fn set_hit_area(&self, hit_area: Option<Rect>) {
        self.hit_area.set(hit_area);
    }

    pub fn token_id(&self) -> Option<TokenId> {
        self.token_id.borrow().clone()
    }

    pub fn set_token_id(&self, token_id: Option<TokenId>) {
        *self.token_id.borrow_mut() = token_id;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn parent(&self) -> Option<Rc<SceneNode>> {
        self.parent.borrow().upgrade()
    }

    pub fn children(&self) -> Vec<Rc<SceneNode>> {
        self.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn descendant_count(&self) -> usize {
        self.children
            .borrow()
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    pub fn find_child(&self, name: &str) -> Option<Rc<SceneNode>> {
        self.children
            .borrow()
            .iter()
            .find(|child| child.name == name)
            .cloned()
    }

    pub fn add_child(self: &Rc<Self>, child: Rc<SceneNode>) {
        child.remove_from_parent();
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(child);
    }

    pub fn remove_from_parent(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        parent
            .children
            .borrow_mut()
            .retain(|child| !std::ptr::eq(Rc::as_ptr(child), self));
        *self.parent.borrow_mut() = Weak::new();
    }

    /// Detaches the node, then destroys every descendant and drops their listeners.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.remove_from_parent();
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            *child.parent.borrow_mut() = Weak::new();
            child.destroy();
        }
        self.events.clear();
    }

    pub fn to_global(&self, local: Vec2) -> Vec2 {
        let scale = self.scale.get();
        let position = self.position.get();
        let in_parent = Vec2::new(local.x * scale + position.x, local.y * scale + position.y);
        match self.parent() {
            Some(parent) => parent.to_global(in_parent),
            None => in_parent,
        }
    }

    pub fn to_local(&self, global: Vec2) -> Vec2 {
        let in_parent = match self.parent() {
            Some(parent) => parent.to_local(global),
            None => global,
        };
        let scale = self.scale.get();
        let position = self.position.get();
        Vec2::new(
            (in_parent.x - position.x) / scale,
            (in_parent.y - position.y) / scale,
        )
    }

    /// Bounds in this node's local space, covering its own shape and its children.
    pub fn local_bounds(&self) -> Option<Rect> {
        let own = match &self.kind {
            NodeKind::Container => None,
            NodeKind::RoundedRect { width, height, .. } | NodeKind::Sprite { width, height, .. } => {
                Some(Rect::new(0.0, 0.0, *width, *height))
            }
            NodeKind::Text {
                content, size_px, ..
            } => {
                let longest = content
                    .lines()
                    .map(|line| line.chars().count())
                    .max()
                    .unwrap_or(0);
                let lines = content.lines().count().max(1);
                Some(Rect::new(
                    0.0,
                    0.0,
                    longest as f32 * size_px * TEXT_CHAR_WIDTH_FACTOR,
                    lines as f32 * size_px * TEXT_LINE_HEIGHT_FACTOR,
                ))
            }
        };

        let mut bounds = own;
        for child in self.children.borrow().iter() {
            let Some(child_bounds) = child.local_bounds() else {
                continue;
            };
            let scale = child.scale();
            let position = child.position();
            let mapped = Rect::new(
                position.x + child_bounds.x * scale,
                position.y + child_bounds.y * scale,
                child_bounds.width * scale,
                child_bounds.height * scale,
            );
            bounds = Some(match bounds {
                Some(current) => union(current, mapped),
                None => mapped,
            });
        }
        bounds
    }

    pub fn global_bounds(&self) -> Option<Rect> {
        let local = self.local_bounds()?;
        let top_left = self.to_global(local.origin());
        let bottom_right = self.to_global(Vec2::new(local.right(), local.bottom()));
        Some(Rect::new(
            top_left.x,
            top_left.y,
            bottom_right.x - top_left.x,
            bottom_right.y - top_left.y,
        ))
    }

    fn hit_region_global(&self) -> Option<Rect> {
        match self.hit_area.get() {
            Some(area) => {
                let top_left = self.to_global(area.origin());
                let bottom_right = self.to_global(Vec2::new(area.right(), area.bottom()));
                Some(Rect::new(
                    top_left.x,
                    top_left.y,
                    bottom_right.x - top_left.x,
                    bottom_right.y - top_left.y,
                ))
            }
            None => self.global_bounds(),
        }
    }

    /// Deepest interactive node under the global point; later children win.
    pub fn hit_test(self: &Rc<Self>, global: Vec2) -> Option<Rc<SceneNode>> {
        for child in self.children.borrow().iter().rev() {
            if let Some(hit) = child.hit_test(global) {
                return Some(hit);
            }
        }
        if self.interactive.get()
            && self
                .hit_region_global()
                .is_some_and(|region| region.contains(global))
        {
            return Some(Rc::clone(self));
        }
        None
    }

    pub fn find_token_ancestor(&self) -> Option<TokenId> {
        if let Some(id) = self.token_id() {
            return Some(id);
        }
        let mut current = self.parent();
        while let Some(node) = current {
            if let Some(id) = node.token_id() {
                return Some(id);
            }
            current = node.parent();
        }
        None
    }

    /// Emits on this node, then on each ancestor until a handler stops propagation.
    pub fn dispatch_bubbling(self: &Rc<Self>, event: &PointerEvent) {
        let mut current = Some(Rc::clone(self));
        while let Some(node) = current {
            node.events.emit(event);
            if event.is_propagation_stopped() {
                return;
            }
            current = node.parent();
        }
    }
}

fn union(a: Rect, b: Rect) -> Rect {
    let left = a.x.min(b.x);
    let top = a.y.min(b.y);
    let right = a.right().max(b.right());
    let bottom = a.bottom().max(b.bottom());
    Rect::new(left, top, right - left, bottom - top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PointerEventKind;

    fn rect_node(name: &str, width: f32, height: f32) -> Rc<SceneNode> {
        SceneNode::new(
            name,
            NodeKind::RoundedRect {
                width,
                height,
                radius: 0.0,
                fill: 0,
                alpha: 1.0,
                stroke: None,
            },
        )
    }

    #[test]
    fn to_local_inverts_to_global_through_scaled_parents() {
        let stage = SceneNode::container("stage");
        stage.set_position(Vec2::new(50.0, -20.0));
        stage.set_scale(2.0);
        let layer = SceneNode::container("layer");
        layer.set_position(Vec2::new(10.0, 10.0));
        stage.add_child(Rc::clone(&layer));

        let global = layer.to_global(Vec2::new(5.0, 5.0));
        assert_eq!(global, Vec2::new(80.0, 10.0));
        assert_eq!(layer.to_local(global), Vec2::new(5.0, 5.0));
    }

    #[test]
    fn destroy_detaches_and_clears_descendants() {
        let root = SceneNode::container("root");
        let menu = SceneNode::container("menu");
        let icon = rect_node("icon", 10.0, 10.0);
        icon.events().add_listener(PointerEventKind::Down, Rc::new(|_| {}));
        menu.add_child(Rc::clone(&icon));
        root.add_child(Rc::clone(&menu));
        assert_eq!(root.descendant_count(), 2);

        menu.destroy();
        menu.destroy();

        assert_eq!(root.child_count(), 0);
        assert!(icon.is_destroyed());
        assert!(icon.parent().is_none());
        assert_eq!(icon.events().listener_count(), 0);
    }

    #[test]
    fn hit_test_prefers_topmost_interactive_child() {
        let root = SceneNode::container("root");
        let below = rect_node("below", 20.0, 20.0);
        below.set_interactive(true);
        let above = rect_node("above", 20.0, 20.0);
        above.set_interactive(true);
        above.set_position(Vec2::new(10.0, 10.0));
        root.add_child(Rc::clone(&below));
        root.add_child(Rc::clone(&above));

        let hit = root.hit_test(Vec2::new(15.0, 15.0)).expect("hit");
        assert_eq!(hit.name(), "above");
        let hit = root.hit_test(Vec2::new(5.0, 5.0)).expect("hit");
        assert_eq!(hit.name(), "below");
        assert!(root.hit_test(Vec2::new(100.0, 100.0)).is_none());
    }

    #[test]
    fn token_ancestor_walk_finds_tagged_parent() {
        let token = SceneNode::container("token");
        token.set_token_id(Some(TokenId::from("t1")));
        let mesh = rect_node("mesh", 10.0, 10.0);
        token.add_child(Rc::clone(&mesh));

        assert_eq!(mesh.find_token_ancestor(), Some(TokenId::from("t1")));
        assert_eq!(rect_node("loose", 1.0, 1.0).find_token_ancestor(), None);
    }

    #[test]
    fn stopped_event_does_not_bubble() {
        let parent = SceneNode::container("parent");
        let child = rect_node("child", 10.0, 10.0);
        parent.add_child(Rc::clone(&child));
        let parent_hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&parent_hits);
        parent.events().add_listener(
            PointerEventKind::Down,
            Rc::new(move |_| counter.set(counter.get() + 1)),
        );

        child.dispatch_bubbling(&PointerEvent::new(PointerEventKind::Down, Vec2::ZERO));
        assert_eq!(parent_hits.get(), 1);

        child
            .events()
            .add_listener(PointerEventKind::Down, Rc::new(|event| event.stop_propagation()));
        child.dispatch_bubbling(&PointerEvent::new(PointerEventKind::Down, Vec2::ZERO));
        assert_eq!(parent_hits.get(), 1);
    }

    #[test]
    fn container_bounds_cover_children() {
        let container = SceneNode::container("menu");
        let a = rect_node("a", 10.0, 10.0);
        let b = rect_node("b", 10.0, 10.0);
        b.set_position(Vec2::new(20.0, 5.0));
        container.add_child(a);
        container.add_child(b);
        container.set_position(Vec2::new(100.0, 100.0));

        assert_eq!(
            container.global_bounds(),
            Some(Rect::new(100.0, 100.0, 30.0, 15.0))
        );
    }
}
