//! Background thread pool for frame quantization.
//!
//! Closures are queued on an unbounded crossbeam channel and picked up by a
//! fixed set of named threads. Dropping the pool closes the channel and
//! joins every worker.

use std::thread;

use crossbeam_channel::{unbounded, Sender};
use loopforge_common::{EngineError, EngineResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool executing closures on worker threads.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `num_threads` workers (at least one).
    pub fn new(num_threads: usize, name: &str) -> EngineResult<Self> {
        let (tx, rx) = unbounded::<Job>();
        let mut handles = Vec::with_capacity(num_threads.max(1));

        for worker_id in 0..num_threads.max(1) {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{worker_id}"))
                .spawn(move || {
                    tracing::trace!(worker_id, "Worker started");
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                    tracing::trace!(worker_id, "Worker stopped");
                })
                .map_err(|e| EngineError::encoder(format!("failed to spawn worker thread: {e}")))?;
            handles.push(handle);
        }

        tracing::debug!(workers = handles.len(), "Worker pool started");
        Ok(Self {
            sender: Some(tx),
            handles,
        })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queue `f` on the next free worker.
    pub fn execute<F>(&self, f: F) -> EngineResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .as_ref()
            .ok_or_else(|| EngineError::encoder("worker pool is shut down"))?
            .send(Box::new(f))
            .map_err(|_| EngineError::encoder("worker pool channel closed"))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends each worker's recv loop.
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_every_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(3, "test-worker").unwrap();
            assert_eq!(pool.size(), 3);
            for _ in 0..50 {
                let counter = Arc::clone(&counter);
                pool.execute(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_zero_threads_still_works() {
        let pool = WorkerPool::new(0, "test-worker").unwrap();
        assert_eq!(pool.size(), 1);
    }
}
