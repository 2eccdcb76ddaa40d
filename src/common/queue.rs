//! Message queues for inter-component communication.
//!
//! Provides both point-to-point (Queue) and broadcast (BroadcastQueue) messaging.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{RelayflowError, Result};

/// Bounded MPMC (multi-producer, multi-consumer) queue.
///
/// Used for run command queues and the engine's completion queue, where each
/// message is consumed by exactly one receiver. Backed by flume.
#[derive(Clone)]
pub struct Queue<T> {
    receiver: Arc<flume::Receiver<T>>,
    sender: Arc<flume::Sender<T>>,
}

impl<T> Queue<T> {
    /// create a new queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, rx) = flume::bounded(cap);

        Arc::new(Self {
            receiver: Arc::new(rx),
            sender: Arc::new(tx),
        })
    }

    /// take a message if one is waiting, without blocking
    pub fn try_next(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// send a message to the queue, failing if it is full
    pub fn send(
        &self,
        msg: T,
    ) -> Result<()> {
        self.sender.try_send(msg).map_err(|e| RelayflowError::Queue(e.to_string()))
    }

    /// receive a message from the queue asynchronously
    pub async fn next_async(&self) -> Option<T> {
        self.receiver.recv_async().await.ok()
    }
}

/// Broadcast queue for one-to-many message distribution.
///
/// Used for event broadcasting where all subscribers receive every message.
/// Backed by tokio's broadcast channel.
#[derive(Clone)]
pub struct BroadcastQueue<T> {
    sender: Arc<broadcast::Sender<T>>,
}

impl<T: Clone> BroadcastQueue<T> {
    /// create a new broadcast queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(cap);

        Arc::new(Self {
            sender: Arc::new(tx),
        })
    }

    /// send a message to every current subscriber
    ///
    /// Sending with no subscriber is not an error: events are fire-and-forget.
    pub fn send(
        &self,
        msg: T,
    ) -> Result<()> {
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender.send(msg).map_err(|e| RelayflowError::Queue(e.to_string()))?;
        Ok(())
    }

    /// subscribe to the queue
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod test {
    use super::{BroadcastQueue, Queue};

    #[test]
    fn test_queue_try_next() {
        let queue = Queue::new(2);
        assert_eq!(queue.try_next(), None::<u8>);
        queue.send(1).unwrap();
        queue.send(2).unwrap();
        assert!(queue.send(3).is_err());
        assert_eq!(queue.try_next(), Some(1));
        assert_eq!(queue.try_next(), Some(2));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let queue = BroadcastQueue::new(8);
        queue.send("dropped").unwrap();
        let mut a = queue.subscribe();
        let mut b = queue.subscribe();
        queue.send("hello").unwrap();
        assert_eq!(a.recv().await.unwrap(), "hello");
        assert_eq!(b.recv().await.unwrap(), "hello");
    }
}
