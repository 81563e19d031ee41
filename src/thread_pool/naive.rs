use std::thread;

use tracing::error;

use super::ThreadPool;
use crate::Result;

/// a simple thread-pool that is not actually a pool. It starts a new thread on every spawn
/// request, so the number of live threads is unbounded
#[derive(Debug, Default)]
pub struct NaiveThreadPool;

impl ThreadPool for NaiveThreadPool {
    /// `threads` is ignored
    fn new(_threads: u32) -> Result<Self> {
        Ok(NaiveThreadPool)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = thread::Builder::new()
            .name(String::from("fortune-conn"))
            .spawn(job)
        {
            error!("Failed to spawn a thread: {}", e);
        }
    }
}
