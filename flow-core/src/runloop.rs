use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};

type Task = Box<dyn FnOnce()>;

/// A single-threaded FIFO scheduler.
///
/// [`post`](Self::post) is the only way a flow yields to a later turn; flows
/// use it to guarantee that user handlers never run inline with the call that
/// armed them. Clones share the same queue.
#[derive(Clone, Default)]
pub struct Runloop {
    queue: Rc<RefCell<VecDeque<Task>>>,
}

impl Runloop {
    /// Creates an empty runloop.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a closure to run on a later turn.
    pub fn post(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Runs the closure at the head of the queue, if any. Returns whether a
    /// closure ran.
    pub fn run_once(&self) -> bool {
        let task = self.queue.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Drains the queue, including closures posted while draining. Returns
    /// the number of closures run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }

    /// Number of closures currently queued.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl fmt::Debug for Runloop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runloop")
            .field("pending", &self.pending())
            .finish()
    }
}
