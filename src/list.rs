use std::{
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{
    CheckResult, Outcome,
    config::{ConfigError, TimerListConfig},
    epoch::{EMPTY, EpochClock},
    exec::{Closure, ExecCtx, ExecutionQueue},
    shard::{Rejected, Shard},
    timer::{Timer, TimerState},
};

const TIMER_TARGET: &str = "timerlist::timer";
const CHECK_TARGET: &str = "timerlist::check";

/// Sharded deadline scheduler.
///
/// Registrations hash onto one of a fixed set of independently locked
/// shards. Each shard keeps the timers of the current epoch in a deadline
/// heap and parks later timers in per-epoch buckets until their epoch
/// comes round. [`TimerList::check`] consults a lock-free aggregate hint
/// first, so an idle poll costs a couple of atomic loads.
///
/// The list never reads a clock; every `now` comes from the caller.
/// Callbacks are never run by the list. They are handed to the caller's
/// [`ExecutionQueue`] once no shard lock is held.
pub struct TimerList {
    clock: EpochClock,
    shards: Box<[Shard]>,
    /// Highest epoch any check has observed.
    epoch: AtomicU64,
    /// Lower bound over all shard hints.
    min_deadline: AtomicU64,
    /// Serialises publication of `min_deadline`; never held with a shard lock.
    hint_lock: Mutex<()>,
    /// Held by the one thread currently running a full check.
    checker: Mutex<()>,
    pending: AtomicUsize,
    shut_down: AtomicBool,
}

impl TimerList {
    /// Create a list with the default configuration.
    pub fn new(start: Instant) -> Self {
        Self::build(start, TimerListConfig::default())
    }

    pub fn with_config(start: Instant, config: TimerListConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(start, config))
    }

    fn build(start: Instant, config: TimerListConfig) -> Self {
        let clock = EpochClock::new(start, config.epoch_duration);
        let shards = (0..config.shard_count)
            .map(|_| Shard::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        tracing::debug!(
            target: TIMER_TARGET,
            shards = config.shard_count,
            epoch_ms = config.epoch_duration.as_millis() as u64,
            "timer list initialised"
        );

        Self {
            clock,
            shards,
            epoch: AtomicU64::new(0),
            min_deadline: AtomicU64::new(EMPTY),
            hint_lock: Mutex::new(()),
            checker: Mutex::new(()),
            pending: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Arrange for `callback` to run with [`Outcome::Ok`] once a check sees
    /// `deadline`, unless the timer is cancelled first.
    ///
    /// A deadline at or before `now` completes immediately: the callback
    /// is queued with `Ok` without touching any shard.
    ///
    /// Registering a timer that is still pending, or registering on a list
    /// that has been shut down, queues the new callback with
    /// [`Outcome::Cancelled`]. The earlier registration is unaffected.
    pub fn register<F, Q>(
        &self,
        timer: &Timer,
        deadline: Instant,
        callback: F,
        now: Instant,
        queue: &mut Q,
    ) where
        F: FnOnce(Outcome) + Send + 'static,
        Q: ExecutionQueue + ?Sized,
    {
        let callback: Closure = Box::new(callback);

        if self.shut_down.load(Ordering::Acquire) {
            tracing::debug!(target: TIMER_TARGET, "register after shutdown");
            queue.enqueue(callback, Outcome::Cancelled);
            return;
        }

        if deadline <= now {
            if timer.shared.arm(TimerState::Fired) {
                tracing::trace!(target: TIMER_TARGET, "timer already due at registration");
                queue.enqueue(callback, Outcome::Ok);
            } else {
                tracing::error!(target: TIMER_TARGET, "timer registered while still pending");
                queue.enqueue(callback, Outcome::Cancelled);
            }
            return;
        }

        let idx = self.shard_index(timer);
        // Counted up front so a racing fire or cancel never underflows it
        self.pending.fetch_add(1, Ordering::Relaxed);
        match self.shards[idx].insert(&self.clock, &timer.shared, deadline, callback, now) {
            Ok(lowered) => {
                tracing::trace!(
                    target: TIMER_TARGET,
                    shard = idx,
                    deadline_ns = self.clock.offset(deadline),
                    "timer registered"
                );
                if let Some(bound) = lowered {
                    let _hint = self.hint_lock.lock();
                    self.min_deadline.fetch_min(bound, Ordering::AcqRel);
                }
            }
            Err(Rejected::AlreadyPending(callback)) => {
                self.pending.fetch_sub(1, Ordering::Relaxed);
                tracing::error!(
                    target: TIMER_TARGET,
                    shard = idx,
                    "timer registered while still pending"
                );
                queue.enqueue(callback, Outcome::Cancelled);
            }
            Err(Rejected::Closed(callback)) => {
                self.pending.fetch_sub(1, Ordering::Relaxed);
                tracing::debug!(target: TIMER_TARGET, shard = idx, "register after shutdown");
                queue.enqueue(callback, Outcome::Cancelled);
            }
        }
    }

    /// Cancel a pending timer, queueing its callback with
    /// [`Outcome::Cancelled`].
    ///
    /// Returns false, and does nothing, if the timer is not pending on this
    /// list: it already fired, was cancelled, was never registered, or is
    /// registered on a different list.
    pub fn cancel<Q>(&self, timer: &Timer, queue: &mut Q) -> bool
    where
        Q: ExecutionQueue + ?Sized,
    {
        if !timer.is_pending() {
            return false;
        }

        let idx = self.shard_index(timer);
        let Some(callback) = self.shards[idx].cancel(&timer.shared) else {
            return false;
        };

        self.pending.fetch_sub(1, Ordering::Relaxed);
        tracing::trace!(target: TIMER_TARGET, shard = idx, "timer cancelled");
        queue.enqueue(callback, Outcome::Cancelled);
        true
    }

    /// Fire every timer whose deadline is at or before `now`.
    pub fn check<Q>(&self, now: Instant, queue: &mut Q) -> CheckResult
    where
        Q: ExecutionQueue + ?Sized,
    {
        self.check_with_next(now, queue).0
    }

    /// Like [`TimerList::check`], also returning the earliest deadline the
    /// list knows of afterwards. The returned instant is a lower bound; it
    /// can be early for timers still parked in a future epoch.
    pub fn check_with_next<Q>(
        &self,
        now: Instant,
        queue: &mut Q,
    ) -> (CheckResult, Option<Instant>)
    where
        Q: ExecutionQueue + ?Sized,
    {
        let now_offset = self.clock.offset(now);

        let hint = self.min_deadline.load(Ordering::Acquire);
        if now_offset < hint {
            return (CheckResult::Empty, self.clock.instant_at(hint));
        }

        let Some(_checker) = self.checker.try_lock() else {
            tracing::trace!(target: CHECK_TARGET, "check already in progress");
            return (CheckResult::NotChecked, self.next_deadline());
        };

        if self.shut_down.load(Ordering::Acquire) {
            return (CheckResult::Empty, None);
        }

        let epoch = self.roll_epoch(now);

        let mut fired = Vec::new();
        for (idx, shard) in self.shards.iter().enumerate() {
            if shard.min_deadline() > now_offset {
                continue;
            }
            let n = shard.expire(&self.clock, epoch, now, &mut fired);
            if n > 0 {
                tracing::trace!(
                    target: CHECK_TARGET,
                    shard = idx,
                    fired = n,
                    "shard expired timers"
                );
            }
        }

        let next = self.publish_min_deadline();

        let result = if fired.is_empty() {
            CheckResult::Empty
        } else {
            self.pending.fetch_sub(fired.len(), Ordering::Relaxed);
            tracing::debug!(
                target: CHECK_TARGET,
                fired = fired.len(),
                now_ns = now_offset,
                "check fired timers"
            );
            for callback in fired {
                queue.enqueue(callback, Outcome::Ok);
            }
            CheckResult::Fired
        };

        (result, self.clock.instant_at(next))
    }

    /// Cancel every pending timer and make the list inert.
    ///
    /// Returns how many callbacks were queued. Calling it again, or on a
    /// list with nothing pending, queues nothing.
    pub fn shutdown<Q>(&self, queue: &mut Q) -> usize
    where
        Q: ExecutionQueue + ?Sized,
    {
        self.shut_down.store(true, Ordering::Release);

        let mut cancelled = Vec::new();
        for shard in self.shards.iter() {
            shard.drain(&mut cancelled);
        }

        {
            let _hint = self.hint_lock.lock();
            self.min_deadline.store(EMPTY, Ordering::Release);
        }

        let count = cancelled.len();
        self.pending.fetch_sub(count, Ordering::Relaxed);
        if count > 0 {
            tracing::debug!(target: TIMER_TARGET, cancelled = count, "timer list shut down");
        }

        for callback in cancelled {
            queue.enqueue(callback, Outcome::Cancelled);
        }
        count
    }

    /// Earliest deadline the list knows of, as a lower bound.
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.clock
            .instant_at(self.min_deadline.load(Ordering::Acquire))
    }

    /// Time from `now` until the next check could fire anything.
    /// Zero if something may already be due.
    #[inline]
    pub fn duration_until_next(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|next| next.saturating_duration_since(now))
    }

    /// Number of pending timers.
    #[inline]
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn epoch_duration(&self) -> Duration {
        self.clock.epoch_duration()
    }

    #[inline]
    pub fn start(&self) -> Instant {
        self.clock.start()
    }

    #[inline]
    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Advance the list epoch to `now`'s epoch and, if it moved, promote
    /// the matching buckets in every shard. Returns the epoch to expire at.
    fn roll_epoch(&self, now: Instant) -> u64 {
        let observed = self.clock.epoch_of(now);
        let previous = self.epoch.fetch_max(observed, Ordering::AcqRel);
        if observed <= previous {
            return previous;
        }

        let promoted: usize = self
            .shards
            .iter()
            .map(|shard| shard.advance(&self.clock, observed))
            .sum();

        tracing::debug!(
            target: CHECK_TARGET,
            from = previous,
            to = observed,
            promoted,
            "epoch rollover"
        );
        observed
    }

    fn publish_min_deadline(&self) -> u64 {
        let _hint = self.hint_lock.lock();
        let min = self
            .shards
            .iter()
            .map(Shard::min_deadline)
            .min()
            .unwrap_or(EMPTY);
        self.min_deadline.store(min, Ordering::Release);
        min
    }

    #[inline(always)]
    fn shard_index(&self, timer: &Timer) -> usize {
        shard_for(timer.identity(), self.shards.len())
    }
}

/// Fibonacci hash of a timer address onto `[0, shards)`.
#[inline(always)]
fn shard_for(identity: usize, shards: usize) -> usize {
    let mixed = (identity as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    ((mixed >> 32) % shards as u64) as usize
}

impl Drop for TimerList {
    /// Dropping without [`TimerList::shutdown`] cancels whatever is still
    /// pending and runs those callbacks inline, so every handle ends up
    /// terminal and can be registered again elsewhere.
    fn drop(&mut self) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }

        let mut ctx = ExecCtx::new();
        let cancelled = self.shutdown(&mut ctx);
        if cancelled > 0 {
            tracing::warn!(
                target: TIMER_TARGET,
                cancelled,
                "timer list dropped without shutdown; pending timers cancelled"
            );
        }
    }
}
