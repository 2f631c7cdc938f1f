//! Background worker for fire-and-forget deletes.
//!
//! Callers enqueue keys and return immediately. The worker removes them in
//! batches, puts failed keys back at the head of the queue and retries after a
//! backoff, so an enqueued delete keeps being attempted until it applies while
//! the worker runs. On shutdown the queue is drained with a bounded number of
//! attempts per key; keys that still fail are handed back by [`Reaper::stop`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::config::ReaperConfig;
use crate::error::Error;

/// Removes one encoded key from the backing store.
pub(crate) type RemoveFn = Arc<dyn Fn(&[u8]) -> Result<(), Error> + Send + Sync>;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Vec<u8>>,
    in_flight: usize,
    shutdown: bool,
    /// Keys given up on during shutdown.
    abandoned: Vec<Vec<u8>>,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when work arrives or shutdown is requested.
    work: Condvar,
    /// Signalled when a batch completes.
    progress: Condvar,
}

/// Background delete worker owned by a store.
pub(crate) struct Reaper {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    config: ReaperConfig,
}

impl Reaper {
    /// Start the worker thread.
    pub(crate) fn start(remove: RemoveFn, config: ReaperConfig) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            work: Condvar::new(),
            progress: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker_config = config.clone();
        let handle = thread::spawn(move || {
            Self::worker_loop(worker_shared, remove, worker_config);
        });

        Self {
            shared,
            handle: Mutex::new(Some(handle)),
            config,
        }
    }

    /// Queue a key for deletion.
    pub(crate) fn enqueue(&self, key: Vec<u8>) {
        let mut state = self.shared.state.lock();
        state.pending.push_back(key);
        self.shared.work.notify_one();
    }

    /// Number of keys waiting or being processed.
    pub(crate) fn backlog(&self) -> usize {
        let state = self.shared.state.lock();
        state.pending.len() + state.in_flight
    }

    /// Block until every queued delete has applied or the flush timeout passes.
    pub(crate) fn wait_idle(&self) -> Result<(), Error> {
        let deadline = Instant::now() + self.config.flush_timeout;
        let mut state = self.shared.state.lock();
        while !state.pending.is_empty() || state.in_flight > 0 {
            if self.shared.progress.wait_until(&mut state, deadline).timed_out() {
                let pending = state.pending.len() + state.in_flight;
                if pending > 0 {
                    return Err(Error::FlushTimeout { pending });
                }
            }
        }
        Ok(())
    }

    /// Stop the worker after draining the queue.
    ///
    /// Returns the keys that still failed after the shutdown attempts. They
    /// were not removed from the store.
    pub(crate) fn stop(&self) -> Vec<Vec<u8>> {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.work.notify_all();
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
        std::mem::take(&mut self.shared.state.lock().abandoned)
    }

    fn worker_loop(shared: Arc<Shared>, remove: RemoveFn, config: ReaperConfig) {
        loop {
            let (batch, shutting_down) = {
                let mut state = shared.state.lock();
                while state.pending.is_empty() && !state.shutdown {
                    shared.work.wait_for(&mut state, config.poll_interval);
                }
                if state.pending.is_empty() && state.shutdown {
                    break;
                }
                let batch: Vec<Vec<u8>> = state.pending.drain(..).collect();
                state.in_flight = batch.len();
                (batch, state.shutdown)
            };

            let attempts = if shutting_down {
                config.shutdown_attempts.max(1)
            } else {
                1
            };

            let mut failed = Vec::new();
            for key in batch {
                if let Err(e) = Self::remove_with_attempts(&remove, &key, attempts) {
                    tracing::warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "queued delete failed"
                    );
                    failed.push(key);
                }
            }

            let retry = {
                let mut state = shared.state.lock();
                state.in_flight = 0;
                if shutting_down && !failed.is_empty() {
                    tracing::error!(
                        count = failed.len(),
                        "giving up on queued deletes during shutdown"
                    );
                    state.abandoned.extend(failed);
                } else {
                    for key in failed.into_iter().rev() {
                        state.pending.push_front(key);
                    }
                }
                shared.progress.notify_all();
                !state.pending.is_empty() && !state.shutdown
            };

            if retry {
                thread::sleep(config.retry_backoff);
            }
        }

        shared.progress.notify_all();
    }

    fn remove_with_attempts(remove: &RemoveFn, key: &[u8], attempts: usize) -> Result<(), Error> {
        let mut last = Ok(());
        for _ in 0..attempts {
            last = remove(key);
            if last.is_ok() {
                break;
            }
        }
        last
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}
