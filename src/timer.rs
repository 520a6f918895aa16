use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering},
};

/// Owner value of a timer that is not filed in any shard.
pub(crate) const UNOWNED: u64 = 0;

/// Lifecycle of a [`Timer`].
///
/// `Fired` and `Cancelled` are terminal for a registration. A terminal
/// timer may be registered again, which moves it back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimerState {
    /// Never registered.
    Idle = 0,
    Pending = 1,
    Fired = 2,
    Cancelled = 3,
}

impl TimerState {
    #[inline(always)]
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TimerState::Pending,
            2 => TimerState::Fired,
            3 => TimerState::Cancelled,
            _ => TimerState::Idle,
        }
    }

    #[inline(always)]
    pub fn is_terminal(self) -> bool {
        matches!(self, TimerState::Fired | TimerState::Cancelled)
    }
}

/// Caller-owned timer.
///
/// The caller creates and keeps the `Timer`; the list only records where
/// it filed the registration and moves its state. Clones share identity,
/// so a clone handed to another thread cancels the same registration.
///
/// # Exactly-once
///
/// Firing and cancelling both need to move the state out of `Pending`.
/// Only the first transition succeeds, and only the winner delivers the
/// callback.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    pub(crate) shared: Arc<TimerShared>,
}

#[derive(Debug, Default)]
pub(crate) struct TimerShared {
    state: AtomicU8,
    /// Slab key inside the owning shard. Only meaningful while `Pending`,
    /// and only read or written under that shard's lock.
    key: AtomicUsize,
    /// Id of the shard holding the registration, or [`UNOWNED`]. Set and
    /// cleared under that shard's lock, so a shard that sees its own id
    /// knows the slab key is one of its entries.
    owner: AtomicU64,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> TimerState {
        self.shared.state()
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state() == TimerState::Pending
    }

    /// Whether two handles refer to the same timer.
    #[inline]
    pub fn same_timer(&self, other: &Timer) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Address used to pick a shard. Stable for the lifetime of the timer.
    #[inline(always)]
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }
}

impl TimerShared {
    #[inline(always)]
    pub(crate) fn state(&self) -> TimerState {
        TimerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move any non-pending state to `target`.
    ///
    /// Fails if the timer is already pending, which means the caller tried
    /// to register a timer twice.
    pub(crate) fn arm(&self, target: TimerState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == TimerState::Pending as u8 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// `Pending -> target`. Returns true for the single winner.
    #[inline]
    pub(crate) fn finish(&self, target: TimerState) -> bool {
        debug_assert!(target.is_terminal());
        self.state
            .compare_exchange(
                TimerState::Pending as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    #[inline(always)]
    pub(crate) fn key(&self) -> usize {
        self.key.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub(crate) fn set_key(&self, key: usize) {
        self.key.store(key, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn owner(&self) -> u64 {
        self.owner.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn set_owner(&self, owner: u64) {
        self.owner.store(owner, Ordering::Release);
    }
}
