use crate::{Result, StereoCamError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handle to a cooperative background thread.
///
/// The thread body receives the run flag and must return once it reads
/// `false`. Stopping clears the flag, runs the caller's wake-up and joins.
pub(crate) struct Worker {
    name: &'static str,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: &'static str, body: F) -> Result<Worker>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let thread = std::thread::Builder::new()
            .name(format!("stereocam-{}", name))
            .spawn(move || body(flag))
            .map_err(|source| StereoCamError::Spawn { name, source })?;

        Ok(Worker {
            name,
            running,
            thread: Some(thread),
        })
    }

    /// Whether the run flag is set and the thread has not exited.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Clear the run flag, wake the thread and wait for it to exit.
    /// Calling it again is a no-op.
    pub fn stop(&mut self, wake: impl FnOnce()) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        wake();
        if thread.join().is_err() {
            log::error!("{} thread panicked", self.name);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop(|| {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_stop_joins_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();
        let mut worker = Worker::spawn("test", move |running| {
            while running.load(Ordering::Acquire) {
                t.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        assert!(worker.is_running());
        while ticks.load(Ordering::Relaxed) == 0 {
            std::thread::yield_now();
        }
        worker.stop(|| {});
        assert!(!worker.is_running());

        let after = ticks.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::Relaxed), after);

        worker.stop(|| panic!("second stop must not wake"));
    }

    #[test]
    fn test_exited_body_not_running() {
        let mut worker = Worker::spawn("test", |_running| {}).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while worker.is_running() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!worker.is_running());
        worker.stop(|| {});
    }
}
