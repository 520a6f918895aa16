//! Sharded deadline timer list.
//!
//! Many threads register one-shot timers; an event loop calls
//! [`TimerList::check`] with the current time to fire whatever is due.
//!
//! ```
//! use std::time::{Duration, Instant};
//! use timerlist::{CheckResult, ExecCtx, Outcome, Timer, TimerList};
//!
//! let start = Instant::now();
//! let list = TimerList::new(start);
//! let mut ctx = ExecCtx::new();
//!
//! let timer = Timer::new();
//! list.register(
//!     &timer,
//!     start + Duration::from_millis(10),
//!     |outcome| assert_eq!(outcome, Outcome::Ok),
//!     start,
//!     &mut ctx,
//! );
//!
//! assert_eq!(list.check(start + Duration::from_millis(5), &mut ctx), CheckResult::Empty);
//! assert_eq!(list.check(start + Duration::from_millis(10), &mut ctx), CheckResult::Fired);
//! ctx.flush();
//!
//! list.shutdown(&mut ctx);
//! ```

mod config;
mod epoch;
mod exec;
mod heap;
mod list;
mod shard;
mod slab;
mod timer;

pub use config::{
    ConfigError, DEFAULT_EPOCH, DEFAULT_SHARD_COUNT, MAX_SHARDS, MIN_EPOCH, TimerListConfig,
    TimerListConfigBuilder,
};
pub use exec::{Closure, ExecCtx, ExecutionQueue};
pub use list::TimerList;
pub use timer::{Timer, TimerState};

/// How a timer ended, as seen by its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The deadline was reached.
    Ok,
    /// Cancelled explicitly, or swept up by shutdown.
    Cancelled,
}

impl Outcome {
    #[inline]
    pub fn is_ok(self) -> bool {
        self == Outcome::Ok
    }

    #[inline]
    pub fn is_cancelled(self) -> bool {
        self == Outcome::Cancelled
    }
}

/// Result of [`TimerList::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckResult {
    /// At least one timer fired.
    Fired,
    /// The check ran and nothing was due.
    Empty,
    /// Another thread was already checking; this call did nothing.
    NotChecked,
}
