//! This module provides the fortune storage engine.
//!
//! The server only talks to storage through the [`FortuneEngine`] trait. The one real
//! implementation is [`RecordStore`], an in-memory list of fortunes mirrored into an
//! append-only backing file.
use crate::Result;

/// A trait for the basic functionality of a fortune storage engine.
///
/// Implementations are shared across worker threads by cloning a handle, so every method takes
/// `&self` and any synchronization lives inside the engine.
pub trait FortuneEngine: Clone + Send + 'static {
    /// Returns one stored fortune, picked uniformly at random.
    ///
    /// # Errors
    ///
    /// Returns `FortuneError::EmptyStore` if there is nothing to read.
    fn read(&self) -> Result<String>;

    /// Stores a new `fortune`.
    ///
    /// The fortune is durable once this returns `Ok`.
    fn write(&self, fortune: String) -> Result<()>;
}

mod fortunes;

pub use self::fortunes::{Backing, RecordStore, StoreOptions, DELIMITER};
