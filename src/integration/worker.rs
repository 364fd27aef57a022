//! Stop handles for background threads.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::error::Result;

/// Owns a background thread and the channel used to ask it to stop.
///
/// Dropping the handle signals the thread to stop without waiting for it.
pub struct WorkerHandle {
    name: String,
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn `body` on a named thread. `body` receives the stop channel and
    /// should return once it yields a message or disconnects.
    pub fn spawn<F>(name: String, body: F) -> Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (stop, stop_rx) = crossbeam_channel::bounded(1);
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(stop_rx))?;
        Ok(Self {
            name,
            stop,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        let _ = self.stop.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!(worker = %self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
    }
}
