use std::{collections::VecDeque, fmt};

use crate::Outcome;

/// Callback attached to a timer registration.
pub type Closure = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Where the timer list hands off callbacks it has decided to run.
///
/// The list never calls a closure itself; it only enqueues, and always
/// after releasing its shard locks. Implementations must not run the
/// closure from inside `enqueue`, since a closure that touches the list
/// again would then run on the list's call stack.
pub trait ExecutionQueue {
    fn enqueue(&mut self, closure: Closure, outcome: Outcome);
}

/// Collects closures without running them.
impl ExecutionQueue for Vec<(Closure, Outcome)> {
    #[inline]
    fn enqueue(&mut self, closure: Closure, outcome: Outcome) {
        self.push((closure, outcome));
    }
}

/// Deferred closure queue owned by one thread.
///
/// Closures run in enqueue order on [`ExecCtx::flush`], or when the context
/// is dropped.
#[derive(Default)]
pub struct ExecCtx {
    queue: VecDeque<(Closure, Outcome)>,
}

impl ExecCtx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every queued closure. Returns how many ran.
    pub fn flush(&mut self) -> usize {
        let mut ran = 0;
        while let Some((closure, outcome)) = self.queue.pop_front() {
            closure(outcome);
            ran += 1;
        }
        ran
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl ExecutionQueue for ExecCtx {
    #[inline]
    fn enqueue(&mut self, closure: Closure, outcome: Outcome) {
        self.queue.push_back((closure, outcome));
    }
}

impl fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecCtx")
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Drop for ExecCtx {
    fn drop(&mut self) {
        self.flush();
    }
}
