use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking writer cannot leave a Vec half-updated, so a poisoned
    // lock is still usable.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Consumer-facing buffer drained by the application.
///
/// Every read takes the whole content under the lock, so a caller never
/// observes part of a batch that a writer pushed with [`push_all`].
/// When a cap is set and a push takes the queue past it, the entire
/// backlog is dropped.
///
/// [`push_all`]: ResultQueue::push_all
pub struct ResultQueue<T> {
    items: Mutex<Vec<T>>,
    cap: Option<usize>,
}

impl<T> ResultQueue<T> {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            cap,
        }
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }

    /// Append one item. Returns the number of items dropped by an overflow
    /// reset.
    pub fn push(&self, item: T) -> usize {
        let mut items = lock(&self.items);
        Self::push_locked(&mut items, self.cap, item)
    }

    /// Append a batch under a single lock, applying the cap after every item.
    pub fn push_all<I: IntoIterator<Item = T>>(&self, batch: I) -> usize {
        let mut items = lock(&self.items);
        batch
            .into_iter()
            .map(|item| Self::push_locked(&mut items, self.cap, item))
            .sum()
    }

    fn push_locked(items: &mut Vec<T>, cap: Option<usize>, item: T) -> usize {
        items.push(item);
        match cap {
            Some(cap) if items.len() > cap => {
                let dropped = items.len();
                items.clear();
                dropped
            }
            _ => 0,
        }
    }

    /// Move out everything buffered.
    pub fn drain_all(&self) -> Vec<T> {
        std::mem::take(&mut *lock(&self.items))
    }

    /// Move out the newest item and discard the rest.
    pub fn take_latest(&self) -> Option<T> {
        let mut items = lock(&self.items);
        let latest = items.pop();
        items.clear();
        latest
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Internal hand-off list between the capture thread and the synthesizer,
/// signalled on every append.
pub struct StagingQueue<T> {
    items: Mutex<Vec<T>>,
    ready: Condvar,
}

impl<T> StagingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            ready: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        lock(&self.items).push(item);
        self.ready.notify_one();
    }

    /// Wait up to `timeout` for a signal, then take whatever is staged.
    ///
    /// Returns immediately when items are already staged.
    pub fn wait_take(&self, timeout: Duration) -> Vec<T> {
        let items = lock(&self.items);
        let mut items = if items.is_empty() {
            match self.ready.wait_timeout(items, timeout) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            }
        } else {
            items
        };
        std::mem::take(&mut *items)
    }

    /// Wake every thread blocked in [`wait_take`](StagingQueue::wait_take).
    pub fn notify_all(&self) {
        let _guard = lock(&self.items);
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }
}

impl<T> Default for StagingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_overflow_drops_backlog() {
        let q = ResultQueue::new(Some(30));
        for i in 0..30 {
            assert_eq!(q.push(i), 0);
        }
        assert_eq!(q.len(), 30);

        assert_eq!(q.push(30), 31);
        assert!(q.is_empty());

        for i in 31..35 {
            q.push(i);
        }
        assert_eq!(q.drain_all(), vec![31, 32, 33, 34]);
    }

    #[test]
    fn test_uncapped_grows() {
        let q = ResultQueue::new(None);
        assert_eq!(q.push_all(0..500), 0);
        assert_eq!(q.len(), 500);
    }

    #[test]
    fn test_drain_and_latest() {
        let q = ResultQueue::new(Some(30));
        assert!(q.drain_all().is_empty());
        assert_eq!(q.take_latest(), None);

        q.push_all([1, 2, 3]);
        assert_eq!(q.take_latest(), Some(3));
        assert!(q.is_empty());

        q.push_all([4, 5]);
        assert_eq!(q.drain_all(), vec![4, 5]);
        assert!(q.drain_all().is_empty());
    }

    #[test]
    fn test_drain_sees_whole_batches() {
        const BATCH: usize = 8;
        let q = Arc::new(ResultQueue::new(None));
        let writer = {
            let q = q.clone();
            std::thread::spawn(move || {
                for b in 0..500 {
                    q.push_all((0..BATCH).map(|i| b * BATCH + i));
                }
            })
        };

        let mut seen = Vec::new();
        while !writer.is_finished() {
            let batch = q.drain_all();
            assert_eq!(batch.len() % BATCH, 0);
            seen.extend(batch);
        }
        writer.join().unwrap();
        seen.extend(q.drain_all());
        assert_eq!(seen, (0..500 * BATCH).collect::<Vec<_>>());
    }

    #[test]
    fn test_staging_wakes_on_push() {
        let q = Arc::new(StagingQueue::new());
        let producer = {
            let q = q.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                q.push(7u16);
            })
        };

        let start = Instant::now();
        let mut got = Vec::new();
        while got.is_empty() && start.elapsed() < Duration::from_secs(5) {
            got = q.wait_take(Duration::from_secs(1));
        }
        producer.join().unwrap();
        assert_eq!(got, vec![7]);
    }

    #[test]
    fn test_staging_times_out_empty() {
        let q: StagingQueue<u16> = StagingQueue::new();
        assert!(q.wait_take(Duration::from_millis(30)).is_empty());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_staging_returns_pending_without_wait() {
        let q = StagingQueue::new();
        q.push(1u16);
        q.push(2);
        let start = Instant::now();
        assert_eq!(q.wait_take(Duration::from_secs(10)), vec![1, 2]);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
