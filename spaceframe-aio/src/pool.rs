//! Fixed worker pool.
//!
//! Constructed once per context with a fixed number of workers. Root
//! machines are placed round-robin at construction time and stay on their
//! worker for life; children inherit the parent's worker.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::fsm::lock;
use crate::worker::{Worker, WorkerHandle};

/// A fixed set of engine workers.
pub struct Pool<E: Send + 'static> {
    workers: Mutex<Vec<Worker<E>>>,
    handles: Vec<Arc<WorkerHandle<E>>>,
    next: AtomicUsize,
}

impl<E: Send + 'static> Pool<E> {
    /// Spawn `count` workers (at least one).
    pub fn new(count: usize) -> io::Result<Self> {
        let count = count.max(1);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            workers.push(Worker::spawn(index)?);
        }
        let handles = workers.iter().map(Worker::handle).collect();
        Ok(Self {
            workers: Mutex::new(workers),
            handles,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Pick a worker for a new root machine, round-robin.
    pub(crate) fn choose(&self) -> Arc<WorkerHandle<E>> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        Arc::clone(&self.handles[index])
    }

    /// Stop and join every worker. Idempotent.
    pub fn shutdown(&self) {
        let mut workers = lock(&self.workers);
        for worker in workers.iter_mut() {
            worker.shutdown();
        }
        workers.clear();
    }
}

impl<E: Send + 'static> Drop for Pool<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
