use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use winit::event::{ElementState, MouseButton};
use winit::keyboard::PhysicalKey;

use crate::geometry::Vec2;
use crate::scene_graph::SceneNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

pub trait Dispatch {
    type Kind: Copy + Eq + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerEventKind {
    Down,
    RightDown,
    Move,
    Up,
    UpOutside,
    Over,
    Out,
}

#[derive(Clone)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub button: MouseButton,
    pub global: Vec2,
    pub target: Option<Rc<SceneNode>>,
    propagation_stopped: Cell<bool>,
}

impl PointerEvent {
    pub fn new(kind: PointerEventKind, global: Vec2) -> Self {
        let button = match kind {
            PointerEventKind::RightDown => MouseButton::Right,
            _ => MouseButton::Left,
        };
        Self {
            kind,
            button,
            global,
            target: None,
            propagation_stopped: Cell::new(false),
        }
    }

    pub fn with_target(mut self, target: Rc<SceneNode>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }
}

impl fmt::Debug for PointerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerEvent")
            .field("kind", &self.kind)
            .field("button", &self.button)
            .field("global", &self.global)
            .field("target", &self.target.as_ref().map(|node| node.name().to_string()))
            .field("propagation_stopped", &self.propagation_stopped.get())
            .finish()
    }
}

impl Dispatch for PointerEvent {
    type Kind = PointerEventKind;

    fn kind(&self) -> PointerEventKind {
        self.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardEvent {
    pub key: PhysicalKey,
    pub state: ElementState,
}

impl Dispatch for KeyboardEvent {
    type Kind = KeyEventKind;

    fn kind(&self) -> KeyEventKind {
        match self.state {
            ElementState::Pressed => KeyEventKind::KeyDown,
            ElementState::Released => KeyEventKind::KeyUp,
        }
    }
}

struct Listener<E: Dispatch> {
    id: ListenerId,
    kind: E::Kind,
    handler: Rc<dyn Fn(&E)>,
}

pub struct Emitter<E: Dispatch> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<Listener<E>>>,
}

pub type EventEmitter = Emitter<PointerEvent>;
pub type KeyEmitter = Emitter<KeyboardEvent>;

impl<E: Dispatch> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<E: Dispatch> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<E: Dispatch> Emitter<E> {
    pub fn add_listener(&self, kind: E::Kind, handler: Rc<dyn Fn(&E)>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(self.next_id.get().saturating_add(1));
        self.listeners
            .borrow_mut()
            .push(Listener { id, kind, handler });
        id
    }

    pub fn remove_listener(&self, kind: E::Kind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|listener| !(listener.id == id && listener.kind == kind));
        listeners.len() != before
    }

    pub fn has_listener(&self, kind: E::Kind, id: ListenerId) -> bool {
        self.listeners
            .borrow()
            .iter()
            .any(|listener| listener.id == id && listener.kind == kind)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn listener_count_for(&self, kind: E::Kind) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|listener| listener.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    /// Invokes every listener for the event's kind. Handlers are cloned out
    /// first so they may add or remove listeners on this emitter.
    pub fn emit(&self, event: &E) -> usize {
        let kind = event.kind();
        let handlers = self
            .listeners
            .borrow()
            .iter()
            .filter(|listener| listener.kind == kind)
            .map(|listener| (listener.id, Rc::clone(&listener.handler)))
            .collect::<Vec<_>>();

        let mut invoked = 0;
        for (id, handler) in handlers {
            // Skip listeners removed by an earlier handler in this dispatch.
            if !self.has_listener(kind, id) {
                continue;
            }
            handler(event);
            invoked += 1;
        }
        invoked
    }
}

/// Anything that accepts pointer listeners: tokens, scene nodes, the overlay document.
pub trait EventTarget {
    fn events(&self) -> &EventEmitter;
}
