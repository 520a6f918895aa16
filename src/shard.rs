use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;

use crate::{
    epoch::{EMPTY, EpochClock},
    exec::Closure,
    heap::DeadlineHeap,
    slab::Slab,
    timer::{TimerShared, TimerState, UNOWNED},
};

static NEXT_SHARD_ID: AtomicU64 = AtomicU64::new(UNOWNED + 1);

/// Where a pending entry is filed inside its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Heap,
    Bucket { epoch: u64, index: usize },
}

struct Entry {
    timer: Arc<TimerShared>,
    deadline: Instant,
    callback: Closure,
    location: Location,
}

/// Why a registration was refused. Carries the callback back so the
/// caller can still deliver it.
pub(crate) enum Rejected {
    AlreadyPending(Closure),
    Closed(Closure),
}

struct ShardInner {
    entries: Slab<Entry>,
    /// Current-epoch timers, ordered by deadline.
    heap: DeadlineHeap,
    /// Future-epoch timers, unordered within a bucket.
    buckets: BTreeMap<u64, Vec<usize>>,
    /// Epoch this shard has been rolled forward to.
    epoch: u64,
    closed: bool,
}

/// One independently locked partition of the timer set.
pub(crate) struct Shard {
    /// Process-unique, recorded in every timer filed here.
    id: u64,
    inner: Mutex<ShardInner>,
    /// Lower bound on the earliest pending deadline, as an offset from the
    /// list start. Readable without the lock, written only under it.
    min_deadline: AtomicU64,
}

impl Shard {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_SHARD_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(ShardInner {
                entries: Slab::new(),
                heap: DeadlineHeap::new(),
                buckets: BTreeMap::new(),
                epoch: 0,
                closed: false,
            }),
            min_deadline: AtomicU64::new(EMPTY),
        }
    }

    #[inline(always)]
    pub(crate) fn min_deadline(&self) -> u64 {
        self.min_deadline.load(Ordering::Acquire)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// File a timer. On success returns the new shard hint if this
    /// registration lowered it.
    ///
    /// Deadlines in the epoch of `now` go straight to the heap even if no
    /// check has rolled the shard that far yet.
    pub(crate) fn insert(
        &self,
        clock: &EpochClock,
        timer: &Arc<TimerShared>,
        deadline: Instant,
        callback: Closure,
        now: Instant,
    ) -> Result<Option<u64>, Rejected> {
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(Rejected::Closed(callback));
        }
        if !timer.arm(TimerState::Pending) {
            return Err(Rejected::AlreadyPending(callback));
        }

        let target = clock.epoch_of(deadline);
        let key = inner.entries.insert(Entry {
            timer: Arc::clone(timer),
            deadline,
            callback,
            location: Location::Heap,
        });
        timer.set_key(key);
        timer.set_owner(self.id);

        let current = inner.epoch.max(clock.epoch_of(now));
        let bound = if target <= current {
            inner.heap.push(deadline, key);
            clock.offset(deadline)
        } else {
            let bucket = inner.buckets.entry(target).or_default();
            let index = bucket.len();
            bucket.push(key);
            if let Some(entry) = inner.entries.get_mut(key) {
                entry.location = Location::Bucket {
                    epoch: target,
                    index,
                };
            }
            clock.epoch_start(target)
        };

        if bound < self.min_deadline.load(Ordering::Acquire) {
            self.min_deadline.store(bound, Ordering::Release);
            Ok(Some(bound))
        } else {
            Ok(None)
        }
    }

    /// `Pending -> Cancelled` under the shard lock. Returns the callback
    /// if this call won the transition. A timer filed in another shard, or
    /// another list, is left alone.
    pub(crate) fn cancel(&self, timer: &Arc<TimerShared>) -> Option<Closure> {
        let mut inner = self.inner.lock();

        if timer.owner() != self.id {
            return None;
        }
        if !timer.finish(TimerState::Cancelled) {
            return None;
        }
        timer.set_owner(UNOWNED);

        let entry = inner.unlink(timer.key());
        debug_assert!(
            entry
                .as_ref()
                .is_some_and(|e| Arc::ptr_eq(&e.timer, timer)),
            "pending timer not filed at its recorded key"
        );
        entry.map(|e| e.callback)
    }

    /// Promote every bucket up to and including `epoch` into the heap.
    /// Returns how many timers moved.
    pub(crate) fn advance(&self, clock: &EpochClock, epoch: u64) -> usize {
        let mut inner = self.inner.lock();
        let promoted = inner.promote(epoch);
        if promoted > 0 {
            self.publish_min(&inner, clock);
        }
        promoted
    }

    /// Pop every timer due at `now`, moving each to `Fired`. Callbacks are
    /// appended to `fired`; the caller dispatches them after this returns
    /// and the lock is gone.
    pub(crate) fn expire(
        &self,
        clock: &EpochClock,
        epoch: u64,
        now: Instant,
        fired: &mut Vec<Closure>,
    ) -> usize {
        let mut inner = self.inner.lock();
        inner.promote(epoch);

        let before = fired.len();
        while let Some((_, key)) = inner.heap.pop_due(now) {
            let Some(entry) = inner.entries.remove(key) else {
                debug_assert!(false, "heap key {key} has no entry");
                continue;
            };
            entry.timer.set_owner(UNOWNED);
            if entry.timer.finish(TimerState::Fired) {
                fired.push(entry.callback);
            }
        }

        self.publish_min(&inner, clock);
        fired.len() - before
    }

    /// Cancel everything and refuse further registrations.
    pub(crate) fn drain(&self, cancelled: &mut Vec<Closure>) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.heap.clear();
        inner.buckets.clear();

        let before = cancelled.len();
        for entry in inner.entries.drain() {
            entry.timer.set_owner(UNOWNED);
            if entry.timer.finish(TimerState::Cancelled) {
                cancelled.push(entry.callback);
            }
        }

        self.min_deadline.store(EMPTY, Ordering::Release);
        cancelled.len() - before
    }

    /// Earliest deadline in the heap, else the start of the earliest bucket.
    #[inline]
    fn publish_min(&self, inner: &ShardInner, clock: &EpochClock) {
        let heap_min = inner
            .heap
            .peek()
            .map_or(EMPTY, |(deadline, _)| clock.offset(deadline));
        let bucket_min = inner
            .buckets
            .first_key_value()
            .map_or(EMPTY, |(&epoch, _)| clock.epoch_start(epoch));
        self.min_deadline
            .store(heap_min.min(bucket_min), Ordering::Release);
    }
}

impl ShardInner {
    fn promote(&mut self, epoch: u64) -> usize {
        if epoch <= self.epoch {
            return 0;
        }
        self.epoch = epoch;

        let later = self.buckets.split_off(&epoch.saturating_add(1));
        let due = std::mem::replace(&mut self.buckets, later);

        let mut promoted = 0;
        for key in due.into_values().flatten() {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.location = Location::Heap;
                self.heap.push(entry.deadline, key);
                promoted += 1;
            }
        }
        promoted
    }

    fn unlink(&mut self, key: usize) -> Option<Entry> {
        let entry = self.entries.remove(key)?;

        match entry.location {
            Location::Heap => {
                self.heap.remove(key);
            }
            Location::Bucket { epoch, index } => {
                if let Some(bucket) = self.buckets.get_mut(&epoch) {
                    bucket.swap_remove(index);
                    if let Some(&moved) = bucket.get(index) {
                        if let Some(moved_entry) = self.entries.get_mut(moved) {
                            moved_entry.location = Location::Bucket { epoch, index };
                        }
                    }
                    if bucket.is_empty() {
                        self.buckets.remove(&epoch);
                    }
                }
            }
        }

        Some(entry)
    }
}
