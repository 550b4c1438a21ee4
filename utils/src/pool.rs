//! A bounded, thread-backed worker pool fronting each node's listening
//! socket (§5: "Each node owns a listening socket and a bounded worker pool
//! (default 10 workers)... no global event loop; concurrency is
//! thread-based").

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    id: usize,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Self {
        let handle = thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || loop {
                let job = {
                    let receiver = receiver.lock().expect("worker pool mutex poisoned");
                    receiver.recv()
                };
                match job {
                    Ok(job) => {
                        tracing::debug!(worker = id, "executing job");
                        job();
                    }
                    Err(_) => {
                        tracing::debug!(worker = id, "channel closed, shutting down");
                        break;
                    }
                }
            })
            .expect("failed to spawn worker thread");
        Self {
            id,
            handle: Some(handle),
        }
    }
}

/// Fixed-size pool of OS threads accepting jobs over a bounded channel.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// # Panics
    /// Panics if `size` is zero; a pool with no workers can never make
    /// progress.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "worker pool size must be non-zero");
        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size).map(|id| Worker::new(id, Arc::clone(&receiver))).collect();
        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job for execution by the next free worker; blocks the
    /// submitter only if the internal channel cannot accept it, never on
    /// completion.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                tracing::debug!(worker = worker.id, "joining worker thread");
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn executes_every_submitted_job() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn rejects_zero_sized_pool() {
        WorkerPool::new(0);
    }
}
