//! Periodic background tasks
//!
//! Each [`PeriodicTask`] owns one named thread that runs its tick every
//! interval until stopped. Stopping never interrupts a tick in progress.

use crate::error::{Error, Result};

use log::{debug, info};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A thread running `tick` once per interval
pub struct PeriodicTask {
    name: String,
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Start the task; the first tick runs one `interval` from now
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the thread cannot be spawned.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("confkeep-{name}"))
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            debug!("Running scheduled task '{thread_name}'");
                            tick();
                        }
                        // Explicit stop or the owner went away
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Scheduled task '{thread_name}' finished");
            })
            .map_err(|e| Error::Config(format!("Failed to spawn task '{name}': {e}")))?;

        info!("Started task '{name}' every {}s", interval.as_secs());
        Ok(Self {
            name: name.to_string(),
            interval,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop scheduling ticks and wait for the current one to finish
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Task '{}' panicked", self.name);
            }
            info!("Stopped task '{}'", self.name);
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut task = PeriodicTask::spawn("ticker", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(task.is_running());
        task.stop();
        assert!(!task.is_running());

        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 3);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_before_first_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let task = PeriodicTask::spawn("slow", Duration::from_secs(3600), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let started = Instant::now();
        drop(task);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_waits_for_running_tick() {
        let done = Arc::new(AtomicUsize::new(0));
        let flag = done.clone();
        let mut task = PeriodicTask::spawn("long", Duration::from_millis(5), move || {
            thread::sleep(Duration::from_millis(50));
            flag.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        task.stop();
        // Whatever tick had started has completed
        let finished = done.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(done.load(Ordering::SeqCst), finished);
    }
}
