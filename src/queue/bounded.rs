//! Fixed-capacity retry queue
//!
//! Slots are allocated once in [`BoundedRetryQueue::new`]. A slot is busy while
//! it holds an item; a drain step visits one slot per call in round-robin
//! order and runs the caller's action on it when it is due.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Shape of an item stored in a [`BoundedRetryQueue`]
pub trait WorkItem: Clone + Send + 'static {
    /// Whether `self` targets the same thing as an already queued `other`
    fn is_duplicate_of(&self, _other: &Self) -> bool {
        false
    }

    /// Attempts allowed before the item is dropped; `None` retries forever
    fn attempt_budget(&self) -> Option<u32> {
        None
    }
}

/// Result of an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateIgnored,
    Full,
}

/// Result of a single drain step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome<T> {
    /// Slot at the cursor holds nothing
    Empty,
    /// Slot is busy but its next attempt is in the future
    NotDue,
    /// Slot is being worked on by another drain step
    InFlight,
    /// Action succeeded, slot freed
    Succeeded(T),
    /// Action failed, slot rescheduled
    Rescheduled { remaining: Option<u32> },
    /// Action failed on the last allowed attempt, slot freed
    Exhausted(T),
}

/// Sizing and timing of a queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Name used in log lines
    pub name: &'static str,
    /// Number of slots
    pub capacity: usize,
    /// Delay before a failed item is eligible again
    pub retry_delay: Duration,
    /// Sleep between insert attempts while the queue is full
    pub full_backoff: Duration,
}

#[derive(Debug)]
struct Slot<T> {
    item: Option<T>,
    next_eligible: Instant,
    remaining: Option<u32>,
    in_flight: bool,
}

impl<T> Slot<T> {
    fn vacant() -> Self {
        Self {
            item: None,
            next_eligible: Instant::now(),
            remaining: None,
            in_flight: false,
        }
    }

    /// Free and not still referenced by a running action
    fn is_claimable(&self) -> bool {
        self.item.is_none() && !self.in_flight
    }
}

#[derive(Debug)]
struct Inner<T> {
    slots: Box<[Slot<T>]>,
    cursor: usize,
}

/// Bounded, lock-guarded retry queue shared by producers and one consumer
#[derive(Debug)]
pub struct BoundedRetryQueue<T> {
    config: QueueConfig,
    inner: Mutex<Inner<T>>,
    work: Notify,
}

impl<T: WorkItem> BoundedRetryQueue<T> {
    /// Create a queue with `config.capacity` vacant slots
    pub fn new(config: QueueConfig) -> Self {
        let capacity = config.capacity.max(1);
        let slots = (0..capacity).map(|_| Slot::vacant()).collect();

        Self {
            config,
            inner: Mutex::new(Inner { slots, cursor: 0 }),
            work: Notify::new(),
        }
    }

    pub async fn capacity(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    /// Claim the first free slot for `item` unless it duplicates a busy one
    pub async fn try_insert(&self, item: T) -> InsertOutcome {
        match self.insert_once(item).await {
            Ok(outcome) => outcome,
            Err(_) => InsertOutcome::Full,
        }
    }

    /// Insert, sleeping while the queue is full
    ///
    /// Only call this from a context that may block: it returns once a slot
    /// frees up or the item turns out to be a duplicate.
    pub async fn insert(&self, item: T) -> InsertOutcome {
        let mut item = item;
        loop {
            match self.insert_once(item).await {
                Ok(outcome) => return outcome,
                Err(rejected) => {
                    warn!(
                        "[{}] queue full, retrying insert in {}ms",
                        self.config.name,
                        self.config.full_backoff.as_millis()
                    );
                    tokio::time::sleep(self.config.full_backoff).await;
                    item = rejected;
                }
            }
        }
    }

    async fn insert_once(&self, item: T) -> Result<InsertOutcome, T> {
        let mut inner = self.inner.lock().await;

        let duplicate = inner
            .slots
            .iter()
            .filter_map(|slot| slot.item.as_ref())
            .any(|queued| item.is_duplicate_of(queued));
        if duplicate {
            return Ok(InsertOutcome::DuplicateIgnored);
        }

        let Some(slot) = inner.slots.iter_mut().find(|slot| slot.is_claimable()) else {
            return Err(item);
        };

        slot.remaining = item.attempt_budget().map(|n| n.max(1));
        slot.next_eligible = Instant::now();
        slot.item = Some(item);
        drop(inner);

        self.work.notify_one();
        Ok(InsertOutcome::Inserted)
    }

    /// Visit the slot at the cursor and run `action` on it if it is due
    ///
    /// The lock is released while `action` runs; the slot stays busy and
    /// marked in flight so no other context can claim or drain it meanwhile.
    pub async fn drain_step<F, Fut>(&self, now: Instant, action: F) -> DrainOutcome<T>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = bool>,
    {
        let (index, item) = {
            let mut inner = self.inner.lock().await;
            let index = inner.cursor;
            inner.cursor = (index + 1) % inner.slots.len();

            let slot = &mut inner.slots[index];
            let Some(item) = slot.item.as_ref() else {
                return DrainOutcome::Empty;
            };
            if slot.in_flight {
                return DrainOutcome::InFlight;
            }
            if now < slot.next_eligible {
                return DrainOutcome::NotDue;
            }

            let item = item.clone();
            slot.in_flight = true;
            (index, item)
        };

        let ok = action(item).await;

        let mut inner = self.inner.lock().await;
        let slot = &mut inner.slots[index];
        slot.in_flight = false;

        // Released while the action ran.
        if slot.item.is_none() {
            return DrainOutcome::Empty;
        }

        if ok {
            return slot
                .item
                .take()
                .map(DrainOutcome::Succeeded)
                .unwrap_or(DrainOutcome::Empty);
        }

        match slot.remaining {
            Some(n) if n <= 1 => {
                slot.remaining = None;
                slot.item
                    .take()
                    .map(DrainOutcome::Exhausted)
                    .unwrap_or(DrainOutcome::Empty)
            }
            Some(n) => {
                slot.remaining = Some(n - 1);
                slot.next_eligible = now + self.config.retry_delay;
                DrainOutcome::Rescheduled {
                    remaining: Some(n - 1),
                }
            }
            None => {
                slot.next_eligible = now + self.config.retry_delay;
                DrainOutcome::Rescheduled { remaining: None }
            }
        }
    }

    /// Free a slot explicitly, returning what it held
    pub async fn release(&self, index: usize) -> Option<T> {
        let mut inner = self.inner.lock().await;
        let slot = inner.slots.get_mut(index)?;
        slot.remaining = None;
        let item = slot.item.take();
        if item.is_some() {
            debug!("[{}] released slot {}", self.config.name, index);
        }
        item
    }

    /// Number of busy slots
    pub async fn busy_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.slots.iter().filter(|slot| slot.item.is_some()).count()
    }

    pub async fn is_idle(&self) -> bool {
        self.busy_count().await == 0
    }

    /// Earliest time a busy, not in-flight slot becomes eligible
    pub async fn next_due(&self) -> Option<Instant> {
        let inner = self.inner.lock().await;
        inner
            .slots
            .iter()
            .filter(|slot| slot.item.is_some() && !slot.in_flight)
            .map(|slot| slot.next_eligible)
            .min()
    }

    /// Resolve once an item has been inserted since the last wait
    pub async fn wait_for_work(&self) {
        self.work.notified().await
    }
}
