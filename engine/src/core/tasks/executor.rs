//! Fixed-size worker pool.
//!
//! Jobs are submitted from any thread through a channel and executed by a
//! fixed set of worker threads in FIFO order; completion order is
//! non-deterministic. Dropping the executor drains outstanding jobs and joins
//! every worker.

use crossbeam::channel::{Receiver, Sender, unbounded};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A concurrent job executor based on a thread pool.
pub struct Executor {
    sender: Sender<Message>,
    workers: Vec<Worker>,
}

enum Message {
    Job(Job),
    Shutdown,
}

struct Worker {
    id: usize,
    handle: Option<thread::JoinHandle<()>>,
}

impl Executor {
    /// Creates a new executor with the specified number of worker threads.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "thread pool size must be greater than 0");

        let (sender, receiver) = unbounded();
        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            workers.push(Worker::new(id, receiver.clone()));
        }

        log::debug!("executor started with {size} workers");

        Executor { sender, workers }
    }

    /// Creates a single-threaded executor.
    pub fn single_threaded() -> Self {
        Self::new(1)
    }

    /// Number of worker threads the default executor uses: one per hardware
    /// thread.
    pub fn default_parallelism() -> usize {
        thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(4)
    }

    /// Executes a job on the thread pool.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute_boxed(Box::new(f));
    }

    pub(crate) fn execute_boxed(&self, job: Job) {
        self.sender
            .send(Message::Job(job))
            .expect("executor workers are gone");
    }

    /// Returns a handle that can be used to submit jobs from other threads.
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            sender: self.sender.clone(),
        }
    }

    /// Returns the number of worker threads in the pool.
    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Default for Executor {
    /// An executor with one worker per hardware thread.
    fn default() -> Self {
        Self::new(Self::default_parallelism())
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        // Queued jobs drain before the shutdown markers arrive.
        for _ in &self.workers {
            let _ = self.sender.send(Message::Shutdown);
        }

        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                handle.join().expect("worker thread panicked");
            }
        }
    }
}

impl Worker {
    fn new(id: usize, receiver: Receiver<Message>) -> Self {
        let handle = thread::spawn(move || {
            log::trace!("worker {id} running");
            loop {
                match receiver.recv() {
                    Ok(Message::Job(job)) => {
                        job();
                    }
                    Ok(Message::Shutdown) => {
                        break;
                    }
                    Err(_) => {
                        // Channel disconnected, exit
                        break;
                    }
                }
            }
        });

        Worker {
            id,
            handle: Some(handle),
        }
    }
}

/// A handle to submit jobs to an executor from other threads.
/// Clone this handle to share it across threads.
#[derive(Clone)]
pub struct ExecutorHandle {
    sender: Sender<Message>,
}

impl ExecutorHandle {
    /// Executes a job on the thread pool.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Message::Job(Box::new(f)))
            .expect("executor workers are gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };
    use std::time::Duration;

    #[test]
    fn executes_submitted_jobs() {
        // Given
        let executor = Executor::new(4);
        let counter = Arc::new(AtomicU32::new(0));

        // When
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            executor.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Then - dropping drains the queue
        drop(executor);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn handle_submits_from_other_threads() {
        // Given
        let executor = Executor::new(2);
        let counter = Arc::new(AtomicU32::new(0));

        // When
        let spawners: Vec<_> = (0..2)
            .map(|_| {
                let handle = executor.handle();
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..5 {
                        let counter = Arc::clone(&counter);
                        handle.execute(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        for spawner in spawners {
            spawner.join().unwrap();
        }

        // Then
        drop(executor);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn drop_waits_for_in_flight_jobs() {
        // Given
        let executor = Executor::new(2);
        let completed = Arc::new(AtomicU32::new(0));

        let completed_clone = Arc::clone(&completed);
        executor.execute(move || {
            thread::sleep(Duration::from_millis(50));
            completed_clone.fetch_add(1, Ordering::SeqCst);
        });

        // When
        drop(executor);

        // Then
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn size_reports_worker_count() {
        // Given
        let executor = Executor::new(3);

        // Then
        assert_eq!(executor.size(), 3);
        assert_eq!(Executor::single_threaded().size(), 1);
    }

    #[test]
    #[should_panic(expected = "thread pool size must be greater than 0")]
    fn zero_workers_is_rejected() {
        let _ = Executor::new(0);
    }
}
