use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::Notify;

/// One-shot termination signal shared between a producer and any number of waiters.
#[derive(Debug, Default)]
pub struct Shutdown {
    terminated: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal termination. Only the first call wakes waiters.
    pub fn shutdown(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Resolves once `shutdown` has been called, immediately if it already was.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let terminated = self.terminated.clone();
        let notify = self.notify.clone();
        async move {
            loop {
                // register before checking the flag so a concurrent shutdown is not lost
                let notified = notify.notified();
                if terminated.load(Ordering::SeqCst) {
                    return;
                }
                notified.await;
            }
        }
    }
}
