//! Severity-ordered dispatch queue

use crate::mailbox::Take;
use crate::shutdown::Shutdown;
use emberwatch_shared::{Event, Severity};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::{Mutex, Notify};

/// Heap entry ordered by severity rank, then submission order
#[derive(Debug)]
struct Entry {
    rank: u8,
    seq: u64,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap pops the greatest entry, so lower rank and earlier
    // submission compare as greater
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

/// Events waiting for a drone, most severe first
#[derive(Debug, Default)]
pub struct DispatchQueue {
    inner: Mutex<Inner>,
    ready: Notify,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for dispatch
    pub async fn submit(&self, event: Event) {
        {
            let mut inner = self.inner.lock().await;
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(Entry {
                rank: event.severity().rank(),
                seq,
                event,
            });
        }
        self.ready.notify_waiters();
    }

    /// Remove the most urgent event without waiting
    pub async fn try_take_next(&self) -> Option<Event> {
        self.inner.lock().await.heap.pop().map(|entry| entry.event)
    }

    /// Wait for an event, then remove the most urgent one
    pub async fn take_next(&self) -> Event {
        loop {
            let notified = self.ready.notified();
            if let Some(event) = self.try_take_next().await {
                return event;
            }
            notified.await;
        }
    }

    /// Like `take_next`, but gives up when shutdown fires
    pub async fn take_next_until(&self, shutdown: &mut Shutdown) -> Take<Event> {
        tokio::select! {
            event = self.take_next() => Take::Item(event),
            _ = shutdown.wait() => Take::Interrupted,
        }
    }

    /// Remove the head only if it is strictly more severe than `than`
    pub async fn take_if_higher(&self, than: Severity) -> Option<Event> {
        let mut inner = self.inner.lock().await;
        let outranks = inner
            .heap
            .peek()
            .is_some_and(|entry| entry.event.severity().outranks(than));
        if outranks {
            inner.heap.pop().map(|entry| entry.event)
        } else {
            None
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
