//! Per-destination blocking multi-queue

use super::Destination;
use crate::shutdown::Shutdown;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

const DESTINATIONS: usize = Destination::ALL.len();

/// Result of a take that can give up before an item arrives
#[derive(Debug, Clone, PartialEq)]
pub enum Take<T> {
    /// An item was removed from the queue
    Item(T),
    /// Shutdown fired first; nothing was removed
    Interrupted,
    /// The timeout elapsed first; nothing was removed
    TimedOut,
}

/// Unbounded FIFO queue per destination.
///
/// Every destination has a queue for the whole lifetime of the mailbox.
/// `put` wakes only the waiters of its destination.
pub struct Mailbox<T> {
    queues: Mutex<[VecDeque<T>; DESTINATIONS]>,
    ready: [Notify; DESTINATIONS],
}

impl<T: Send> Mailbox<T> {
    /// Create a mailbox with an empty queue for every destination
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(std::array::from_fn(|_| VecDeque::new())),
            ready: std::array::from_fn(|_| Notify::new()),
        }
    }

    /// Append an item to a destination's queue
    pub async fn put(&self, destination: Destination, item: T) {
        self.queues.lock().await[destination.index()].push_back(item);
        self.ready[destination.index()].notify_waiters();
    }

    /// Remove the head of a destination's queue without waiting
    pub async fn try_take(&self, destination: Destination) -> Option<T> {
        self.queues.lock().await[destination.index()].pop_front()
    }

    /// Wait until the destination has an item, then remove it.
    ///
    /// Dropping the returned future before it resolves removes nothing.
    pub async fn take(&self, destination: Destination) -> T {
        let ready = &self.ready[destination.index()];
        loop {
            // Register before checking so a put between the check and the
            // await still wakes us
            let notified = ready.notified();
            if let Some(item) = self.try_take(destination).await {
                return item;
            }
            notified.await;
        }
    }

    /// Like `take`, but gives up when shutdown fires
    pub async fn take_until(&self, destination: Destination, shutdown: &mut Shutdown) -> Take<T> {
        tokio::select! {
            item = self.take(destination) => Take::Item(item),
            _ = shutdown.wait() => Take::Interrupted,
        }
    }

    /// Like `take`, but gives up after `timeout`
    pub async fn take_timeout(&self, destination: Destination, timeout: Duration) -> Take<T> {
        match tokio::time::timeout(timeout, self.take(destination)).await {
            Ok(item) => Take::Item(item),
            Err(_) => Take::TimedOut,
        }
    }

    /// Number of items waiting for a destination
    pub async fn len(&self, destination: Destination) -> usize {
        self.queues.lock().await[destination.index()].len()
    }

    pub async fn is_empty(&self, destination: Destination) -> bool {
        self.len(destination).await == 0
    }
}

impl<T: Send> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_fifo_per_destination() {
        let mailbox = Mailbox::new();
        for i in 0..5 {
            mailbox.put(Destination::Scheduler, i).await;
        }

        let mut taken = Vec::new();
        for _ in 0..5 {
            taken.push(mailbox.take(Destination::Scheduler).await);
        }

        assert_eq!(taken, vec![0, 1, 2, 3, 4]);
        assert!(mailbox.is_empty(Destination::Scheduler).await);
    }

    #[tokio::test]
    async fn test_take_ignores_other_destinations() {
        let mailbox = Mailbox::new();
        mailbox.put(Destination::FireIncident, "confirmation").await;

        let result = mailbox
            .take_timeout(Destination::Scheduler, Duration::from_millis(50))
            .await;

        assert_eq!(result, Take::TimedOut);
        assert_eq!(mailbox.len(Destination::FireIncident).await, 1);
    }

    #[tokio::test]
    async fn test_blocked_take_wakes_on_put() {
        let mailbox = Arc::new(Mailbox::<u32>::new());
        let consumer = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move { mailbox.take(Destination::DroneSubsystem).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        mailbox.put(Destination::DroneSubsystem, 42).await;

        let item = tokio::time::timeout(WAIT, consumer)
            .await
            .expect("take never woke")
            .expect("consumer panicked");
        assert_eq!(item, 42);
    }

    #[tokio::test]
    async fn test_interrupted_take_leaves_queue_intact() {
        let mailbox = Arc::new(Mailbox::<u32>::new());
        let (trigger, mut shutdown) = shutdown::channel();

        let waiter = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move {
                mailbox
                    .take_until(Destination::Scheduler, &mut shutdown)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();

        let result = tokio::time::timeout(WAIT, waiter)
            .await
            .expect("take was not interrupted")
            .expect("waiter panicked");
        assert_eq!(result, Take::Interrupted);

        mailbox.put(Destination::Scheduler, 7u32).await;
        assert_eq!(mailbox.len(Destination::Scheduler).await, 1);
        assert_eq!(mailbox.try_take(Destination::Scheduler).await, Some(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_lose_nothing() {
        let mailbox = Arc::new(Mailbox::<(u32, u32)>::new());
        let producers: Vec<_> = (0..4u32)
            .map(|producer| {
                let mailbox = mailbox.clone();
                tokio::spawn(async move {
                    for seq in 0..50u32 {
                        mailbox.put(Destination::Scheduler, (producer, seq)).await;
                    }
                })
            })
            .collect();

        let mut received = Vec::new();
        for _ in 0..200 {
            let item = tokio::time::timeout(WAIT, mailbox.take(Destination::Scheduler))
                .await
                .expect("item lost");
            received.push(item);
        }
        for producer in producers {
            producer.await.expect("producer panicked");
        }

        assert!(mailbox.is_empty(Destination::Scheduler).await);
        for producer in 0..4u32 {
            let seqs: Vec<u32> = received
                .iter()
                .filter(|(p, _)| *p == producer)
                .map(|(_, seq)| *seq)
                .collect();
            assert_eq!(seqs, (0..50).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_each_item_delivered_once() {
        let mailbox = Arc::new(Mailbox::<u32>::new());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let mailbox = mailbox.clone();
                tokio::spawn(async move { mailbox.take(Destination::FireIncident).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        for i in 0..3u32 {
            mailbox.put(Destination::FireIncident, i).await;
        }

        let mut items = Vec::new();
        for consumer in consumers {
            let item = tokio::time::timeout(WAIT, consumer)
                .await
                .expect("consumer starved")
                .expect("consumer panicked");
            items.push(item);
        }
        items.sort();
        assert_eq!(items, vec![0, 1, 2]);
    }
}
