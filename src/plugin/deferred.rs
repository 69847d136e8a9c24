//! One-shot delayed task with guaranteed cancellation

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs a closure once after a delay unless cancelled first.
///
/// Cancelling (or dropping) joins the helper thread, so once it returns
/// the closure has either completed or will never run.
pub struct DeferredInit {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeferredInit {
    pub fn schedule<F>(delay: Duration, task: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("deferred-init".into())
            .spawn(move || match cancel_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => task(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("Deferred initialisation cancelled");
                }
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
            thread: Some(thread),
        })
    }

    /// Whether the task has neither run nor been cancelled
    pub fn is_pending(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Deferred initialisation panicked");
            }
        }
    }
}

impl Drop for DeferredInit {
    fn drop(&mut self) {
        self.cancel();
    }
}
