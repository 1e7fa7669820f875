//! Trailing-edge debouncer.
//!
//! A burst of `trigger()` calls runs the action once, `window` after the
//! last trigger of the burst. Dropping the debouncer runs a pending action
//! immediately.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    pub fn new<F, Fut>(window: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // keep extending the window while triggers arrive
                let closed = loop {
                    match tokio::time::timeout(window, rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => break true,
                        Err(_) => break false,
                    }
                };
                action().await;
                if closed {
                    break;
                }
            }
        });

        Self { tx }
    }

    pub fn trigger(&self) {
        // the task only exits once every sender is gone
        let _ = self.tx.send(());
    }
}
