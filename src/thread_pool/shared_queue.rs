use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, instrument};

use super::ThreadPool;
use crate::{FortuneError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed number of worker threads taking connections from one shared queue.
///
/// The queue is a crossbeam MPMC [`channel`]: the pool is the only producer and every worker
/// is a consumer, so a connection goes to whichever worker is free first.
///
/// A worker whose job panics is replaced by a new thread with the same number, so the pool
/// keeps its size. If the replacement cannot be created the pool shrinks; once no worker is
/// left, spawned jobs are dropped and logged.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
#[derive(Debug)]
pub struct SharedQueueThreadPool {
    tx: Sender<Job>,
}

impl ThreadPool for SharedQueueThreadPool {
    /// Starts `threads` workers.
    ///
    /// # Errors
    /// `threads` must be at least one, and every worker thread must start
    fn new(threads: u32) -> Result<Self> {
        if threads == 0 {
            return Err(FortuneError::StringErr(String::from(
                "a shared queue pool needs at least one thread",
            )));
        }
        let (tx, rx) = channel::unbounded::<Job>();
        for id in 0..threads {
            start_worker(Worker { id, rx: rx.clone() })?;
        }
        debug!("started {} queue workers", threads);
        Ok(SharedQueueThreadPool { tx })
    }

    /// Queues `job` for the next free worker.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            error!("no queue workers left, dropping job");
        }
    }
}

/// The receiving end held by one worker thread. Dropping it while the thread unwinds starts a
/// replacement worker.
#[derive(Clone, Debug)]
struct Worker {
    id: u32,
    rx: Receiver<Job>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!(worker = self.id, "job panicked, restarting worker");
            if let Err(e) = start_worker(self.clone()) {
                error!(worker = self.id, "could not restart worker: {}", e);
            }
        }
    }
}

fn start_worker(worker: Worker) -> std::io::Result<()> {
    thread::Builder::new()
        .name(format!("fortune-worker-{}", worker.id))
        .spawn(move || run_jobs(worker))?;
    Ok(())
}

/// runs jobs from the queue until the pool is dropped
#[instrument(skip(worker), fields(worker = worker.id))]
fn run_jobs(worker: Worker) {
    while let Ok(job) = worker.rx.recv() {
        job();
    }
    debug!("pool dropped, worker exiting");
}
