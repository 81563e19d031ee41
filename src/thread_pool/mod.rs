//! Worker pools that run connection handlers.
//!
//! Which pool a server uses is its resource policy:
//! - [`NaiveThreadPool`] starts a fresh thread for every job, so the number of threads is
//!   unbounded and follows the number of open connections.
//! - [`SharedQueueThreadPool`] and [`RayonThreadPool`] run jobs on a fixed number of threads;
//!   extra connections wait in a queue until a thread frees up.
use crate::Result;

/// A pool of threads that jobs can be spawned onto.
pub trait ThreadPool {
    /// Creates a new thread pool with the given number of `threads`.
    ///
    /// # Errors
    /// returns an error if a thread could not be created
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a function into the thread pool.
    ///
    /// A job that panics must not take the pool down with it.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

mod naive;
mod rayon_pool;
mod shared_queue;

pub use self::naive::NaiveThreadPool;
pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;
