use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to; shared between clones.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Named monotonic timestamps.
pub struct TimingMarks {
    clock: Rc<dyn Clock>,
    marks: RefCell<HashMap<String, Instant>>,
}

impl fmt::Debug for TimingMarks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingMarks")
            .field("marks", &self.marks.borrow().len())
            .finish()
    }
}

impl TimingMarks {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            marks: RefCell::new(HashMap::new()),
        }
    }

    pub fn mark(&self, name: &str) {
        self.marks
            .borrow_mut()
            .insert(name.to_string(), self.clock.now());
    }

    pub fn clear(&self, name: &str) {
        self.marks.borrow_mut().remove(name);
    }

    pub fn elapsed(&self, name: &str) -> Option<Duration> {
        let marked_at = *self.marks.borrow().get(name)?;
        Some(self.clock.now().saturating_duration_since(marked_at))
    }

    /// False when no mark exists under `name`.
    pub fn has_elapsed(&self, name: &str, ms: u64) -> bool {
        self.elapsed(name)
            .is_some_and(|elapsed| elapsed >= Duration::from_millis(ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u64);

enum TaskCallback {
    Once(Box<dyn FnOnce()>),
    Repeat(Rc<dyn Fn()>, Duration),
}

struct ScheduledTask {
    id: String,
    due: Instant,
    callback: TaskCallback,
}

/// Cancellable tasks advanced by the render tick rather than wall-clock timers,
/// so clamped background timers never delay them.
pub struct FrameScheduler {
    clock: Rc<dyn Clock>,
    next_handle: Cell<u64>,
    tasks: RefCell<BTreeMap<TaskHandle, ScheduledTask>>,
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl FrameScheduler {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            next_handle: Cell::new(0),
            tasks: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock)
    }

    /// Runs `callback` on the first tick at least `after` from now. A pending
    /// task scheduled under the same `id` is cancelled and replaced.
    pub fn delay(&self, id: &str, after: Duration, callback: impl FnOnce() + 'static) -> TaskHandle {
        self.insert(id, after, TaskCallback::Once(Box::new(callback)))
    }

    pub fn repeat(&self, id: &str, every: Duration, callback: impl Fn() + 'static) -> TaskHandle {
        self.insert(id, every, TaskCallback::Repeat(Rc::new(callback), every))
    }

    fn insert(&self, id: &str, after: Duration, callback: TaskCallback) -> TaskHandle {
        let handle = TaskHandle(self.next_handle.get());
        self.next_handle.set(self.next_handle.get().saturating_add(1));
        let due = self.clock.now() + after;
        let mut tasks = self.tasks.borrow_mut();
        tasks.retain(|_, task| task.id != id);
        tasks.insert(
            handle,
            ScheduledTask {
                id: id.to_string(),
                due,
                callback,
            },
        );
        handle
    }

    /// Returns false when the task already ran or was cancelled.
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        self.tasks.borrow_mut().remove(&handle).is_some()
    }

    pub fn cancel_all(&self) -> usize {
        let mut tasks = self.tasks.borrow_mut();
        let count = tasks.len();
        tasks.clear();
        count
    }

    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.tasks.borrow().contains_key(&handle)
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Runs every task that is due, earliest first. Returns how many ran.
    pub fn tick(&self) -> usize {
        let now = self.clock.now();
        let mut due = self
            .tasks
            .borrow()
            .iter()
            .filter(|(_, task)| task.due <= now)
            .map(|(handle, task)| (task.due, *handle))
            .collect::<Vec<_>>();
        due.sort();

        let mut ran = 0;
        for (_, handle) in due {
            // A task run earlier in this tick may have cancelled this one.
            let Some(task) = self.tasks.borrow_mut().remove(&handle) else {
                continue;
            };
            match task.callback {
                TaskCallback::Once(callback) => callback(),
                TaskCallback::Repeat(callback, every) => {
                    self.tasks.borrow_mut().insert(
                        handle,
                        ScheduledTask {
                            id: task.id,
                            due: now + every,
                            callback: TaskCallback::Repeat(Rc::clone(&callback), every),
                        },
                    );
                    callback();
                }
            }
            ran += 1;
        }
        ran
    }
}
