use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// FIFO task queue standing in for the host's macrotask queue.
///
/// Transport deliveries and promise callbacks are both queued here, so a
/// callback never runs inside the call that scheduled it. Handles are cheap
/// to clone and all clones share one queue.
#[derive(Clone, Default)]
pub struct EventLoop {
    queue: Rc<RefCell<VecDeque<Task>>>,
}

impl EventLoop {
    /// Create an empty event loop.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the back of the queue.
    pub fn queue_task(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Run the task at the front of the queue, if any.
    pub fn run_next(&self) -> bool {
        // The borrow must end before the task runs: tasks queue more tasks.
        let task = self.queue.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks queued meanwhile.
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0usize;
        while self.run_next() {
            ran = ran.saturating_add(1);
        }
        ran
    }

    /// Run at most `max_tasks` tasks. Returns the number of tasks run.
    pub fn run_at_most(&self, max_tasks: usize) -> usize {
        let mut ran = 0usize;
        while ran < max_tasks && self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Number of tasks waiting to run.
    pub fn pending_tasks(&self) -> usize {
        self.queue.borrow().len()
    }

    /// True when no task is waiting.
    pub fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// True if both handles share the same queue.
    pub fn ptr_eq(&self, other: &EventLoop) -> bool {
        Rc::ptr_eq(&self.queue, &other.queue)
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}
