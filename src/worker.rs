//! Background thread with cooperative stop and bounded shutdown.
//!
//! `std::thread::JoinHandle::join` cannot time out, so the thread reports its
//! own completion over a channel. [`StoppableThread::stop`] raises the stop flag,
//! waits on that channel for at most the given timeout, and only joins once the
//! body has returned. If the timeout expires the thread is detached and left to
//! finish on its own: leaking a thread (and whatever it owns) beats crashing
//! during teardown.

use log::error;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct StoppableThread {
    name: String,
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

impl StoppableThread {
    /// Spawns `body` on a named thread. `body` must poll the flag it is given
    /// and return promptly once it is set.
    pub fn spawn<F>(name: &str, body: F) -> io::Result<Self>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = mpsc::channel();
        let flag = stop.clone();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            body(&flag);
            let _ = done_tx.send(());
        })?;
        Ok(Self {
            name: name.to_string(),
            stop,
            done,
            handle,
        })
    }

    /// Raise the stop flag without waiting.
    pub fn signal(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// `true` once the body has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal, then wait up to `timeout` for the body to return.
    ///
    /// Returns `false` if the thread was detached instead of joined. Calling this
    /// from the thread itself detaches immediately.
    pub fn stop(self, timeout: Duration) -> bool {
        self.signal();

        if self.handle.thread().id() == thread::current().id() {
            return false;
        }

        match self.done.recv_timeout(timeout) {
            // Disconnected: the body panicked and dropped the sender.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    error!("thread '{}' panicked", self.name);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    "thread '{}' did not stop within {:?}; detaching",
                    self.name, timeout
                );
                false
            }
        }
    }
}
