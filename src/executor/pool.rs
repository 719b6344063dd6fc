use crate::error::{AknnError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads fed by a bounded queue.
///
/// `submit` blocks once `queue_capacity` tasks are waiting. A task that
/// panics fails its own handle; the worker keeps running.
pub struct WorkerPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `workers` threads named `<name>-<n>`.
    pub fn new(name: &str, workers: usize, queue_capacity: usize) -> Result<Self> {
        if workers == 0 || queue_capacity == 0 {
            return Err(AknnError::Config(format!(
                "pool {name} needs at least one worker and one queue slot"
            )));
        }

        let (sender, receiver) = bounded::<Job>(queue_capacity);
        let handles = (0..workers)
            .map(|n| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("{name}-{n}"))
                    .spawn(move || run_worker(receiver))
                    .map_err(AknnError::from)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Started pool {} with {} workers, queue capacity {}",
            name, workers, queue_capacity
        );

        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            workers: handles,
        })
    }

    /// Queues `task`, blocking while the queue is full.
    pub fn submit<F, R>(&self, task: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| self.shut_down_error())?;

        let (result_tx, result_rx) = bounded(1);
        let job: Job = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(task)).map_err(panic_message);
            let _ = result_tx.send(result);
        });
        sender.send(job).map_err(|_| self.shut_down_error())?;

        Ok(TaskHandle {
            receiver: result_rx,
        })
    }

    /// Runs `task` on the pool and waits for its result.
    pub fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task)?.wait()?
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Name of the pool, also the prefix of its thread names.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn shut_down_error(&self) -> AknnError {
        AknnError::Executor(format!("pool {} is shut down", self.name))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue lets workers drain it and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker of pool {} exited abnormally", self.name);
            }
        }
        debug!("Stopped pool {}", self.name);
    }
}

/// Pending result of a submitted task.
pub struct TaskHandle<R> {
    receiver: Receiver<std::result::Result<R, String>>,
}

impl<R> TaskHandle<R> {
    /// Blocks until the task finishes.
    pub fn wait(self) -> Result<R> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(AknnError::Executor(format!("task panicked: {message}"))),
            Err(_) => Err(AknnError::Executor("task was dropped before running".into())),
        }
    }
}

fn run_worker(receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        job();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn test_runs_tasks() {
        let pool = WorkerPool::new("test", 2, 4).unwrap();
        let handles: Vec<_> = (0..10).map(|i| pool.submit(move || i * 2).unwrap()).collect();
        let results: Vec<i32> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_flattens_results() {
        let pool = WorkerPool::new("test", 1, 1).unwrap();
        assert_eq!(pool.run(|| Ok(7)).unwrap(), 7);
        let err = pool
            .run(|| -> Result<()> { Err(AknnError::Validation("bad".into())) })
            .unwrap_err();
        assert!(matches!(err, AknnError::Validation(_)));
    }

    #[test]
    fn test_panic_fails_only_its_task() {
        let pool = WorkerPool::new("test", 1, 2).unwrap();
        let err = pool
            .submit(|| -> i32 { panic!("boom") })
            .unwrap()
            .wait()
            .unwrap_err();
        match err {
            AknnError::Executor(message) => assert!(message.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(pool.submit(|| 1).unwrap().wait().unwrap(), 1);
    }

    #[test]
    fn test_parallel_workers() {
        let pool = WorkerPool::new("test", 3, 3).unwrap();
        let barrier = Arc::new(Barrier::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let barrier = barrier.clone();
                pool.submit(move || {
                    barrier.wait();
                })
                .unwrap()
            })
            .collect();
        for handle in handles {
            handle.wait().unwrap();
        }
    }

    #[test]
    fn test_drop_drains_queue() {
        let done = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new("test", 1, 8).unwrap();
            for _ in 0..5 {
                let done = done.clone();
                pool.submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_rejects_empty_pool() {
        assert!(matches!(
            WorkerPool::new("test", 0, 4),
            Err(AknnError::Config(_))
        ));
        assert!(matches!(
            WorkerPool::new("test", 1, 0),
            Err(AknnError::Config(_))
        ));
    }
}
