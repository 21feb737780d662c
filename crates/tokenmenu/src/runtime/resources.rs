use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::host::{
    EventTarget, Hook, HookArgs, HookBus, HookHandler, HookId, KeyEventKind, KeyboardEvent,
    ListenerId, PointerEvent, PointerEventKind, SceneId,
};
use crate::overlay::Document;

use super::timing::{FrameScheduler, TaskHandle};

type Release = Box<dyn FnOnce()>;

/// Handle for a listener registered through a [`ResourceTracker`]; lets the
/// owner release one listener early without waiting for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackedListener {
    pub id: ListenerId,
    key: u64,
}

#[derive(Default)]
struct TrackedResources {
    hooks: Vec<Release>,
    listeners: HashMap<u64, Release>,
    tickers: HashMap<String, Release>,
    teardown_callbacks: Vec<Release>,
}

impl TrackedResources {
    fn len(&self) -> usize {
        self.hooks.len() + self.listeners.len() + self.tickers.len() + self.teardown_callbacks.len()
    }
}

/// Scoped ownership of hooks, listeners and recurring tasks. `teardown`
/// releases each registered resource exactly once; the tracker stays usable
/// afterwards and a later `teardown` releases whatever was registered since.
pub struct ResourceTracker {
    label: &'static str,
    next_key: Cell<u64>,
    resources: RefCell<TrackedResources>,
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("label", &self.label)
            .field("resources", &self.resource_count())
            .finish()
    }
}

impl ResourceTracker {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            next_key: Cell::new(0),
            resources: RefCell::new(TrackedResources::default()),
        }
    }

    pub fn register_hook(&self, bus: &Rc<dyn HookBus>, hook: Hook, handler: HookHandler) -> HookId {
        let id = bus.on(hook, handler);
        let bus = Rc::clone(bus);
        self.resources.borrow_mut().hooks.push(Box::new(move || {
            bus.off(hook, id);
        }));
        id
    }

    /// Installs the owner's canvas-ready handler, fed the id of the scene that became ready.
    pub fn on_canvas_ready(
        &self,
        bus: &Rc<dyn HookBus>,
        handler: impl Fn(&SceneId) + 'static,
    ) -> HookId {
        self.register_hook(
            bus,
            Hook::CanvasReady,
            Rc::new(move |args| {
                if let HookArgs::CanvasReady { scene_id } = args {
                    handler(*scene_id);
                }
                Ok(())
            }),
        )
    }

    pub fn register_listener<T>(
        &self,
        target: &Rc<T>,
        kind: PointerEventKind,
        handler: Rc<dyn Fn(&PointerEvent)>,
    ) -> TrackedListener
    where
        T: EventTarget + ?Sized + 'static,
    {
        let id = target.events().add_listener(kind, handler);
        let weak = Rc::downgrade(target);
        self.track_listener(
            id,
            Box::new(move || {
                if let Some(target) = weak.upgrade() {
                    target.events().remove_listener(kind, id);
                }
            }),
        )
    }

    pub fn register_key_listener(
        &self,
        document: &Rc<Document>,
        kind: KeyEventKind,
        handler: Rc<dyn Fn(&KeyboardEvent)>,
    ) -> TrackedListener {
        let id = document.keys().add_listener(kind, handler);
        let weak = Rc::downgrade(document);
        self.track_listener(
            id,
            Box::new(move || {
                if let Some(document) = weak.upgrade() {
                    document.keys().remove_listener(kind, id);
                }
            }),
        )
    }

    fn track_listener(&self, id: ListenerId, release: Release) -> TrackedListener {
        let key = self.next_key.get();
        self.next_key.set(key.saturating_add(1));
        self.resources.borrow_mut().listeners.insert(key, release);
        TrackedListener { id, key }
    }

    /// Releases one listener now. Returns false if it was already released.
    pub fn release_listener(&self, listener: TrackedListener) -> bool {
        let release = self.resources.borrow_mut().listeners.remove(&listener.key);
        match release {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }

    /// Tracks a scheduled task under `id`; re-registering an id cancels the previous task.
    pub fn register_ticker(&self, id: &str, scheduler: &Rc<FrameScheduler>, handle: TaskHandle) {
        let weak = Rc::downgrade(scheduler);
        let previous = self.resources.borrow_mut().tickers.insert(
            id.to_string(),
            Box::new(move || {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.cancel(handle);
                }
            }),
        );
        if let Some(previous) = previous {
            previous();
        }
    }

    pub fn release_ticker(&self, id: &str) -> bool {
        let release = self.resources.borrow_mut().tickers.remove(id);
        match release {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }

    pub fn on_teardown(&self, callback: impl FnOnce() + 'static) {
        self.resources
            .borrow_mut()
            .teardown_callbacks
            .push(Box::new(callback));
    }

    pub fn resource_count(&self) -> usize {
        self.resources.borrow().len()
    }

    pub fn teardown(&self) {
        let resources = std::mem::take(&mut *self.resources.borrow_mut());
        let released = resources.len();
        for release in resources.hooks {
            release();
        }
        for (_, release) in resources.listeners {
            release();
        }
        for (_, release) in resources.tickers {
            release();
        }
        for callback in resources.teardown_callbacks {
            callback();
        }
        if released > 0 {
            debug!(tracker = self.label, released, "resources_released");
        }
    }
}
