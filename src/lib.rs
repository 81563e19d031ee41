#![deny(missing_docs)]
//! A multithreaded, persistent fortune database, that hands out random text records
//! ("fortunes") to many clients at once.
//!
//! This crate provides the [`RecordStore`] implementation itself, as well as a
//! [`fortune-client`] and [`fortune-server`] executable that can be used to interact with it.
//! Requests and responses travel between client and server as single lines of JSON, one request
//! per TCP connection.
//!
//! ## Supported Operations
//! The fortune database supports two operations (a.k.a "methods"):
//!
//! - `read` a fortune, picked uniformly at random from all stored fortunes
//! - `write` a new fortune into the database
//!
//! See the [`FortuneEngine`] trait and the [`Request`] and [`Response`] types for more
//! information on the structure of these operations.
//!
//! ## RecordStore
//! [`RecordStore`] is the implementor of the [`FortuneEngine`] trait.
//! It is responsible for the following tasks:
//! - keeping every fortune in memory, in the order it was written
//! - appending every new fortune to the backing file before the write completes
//! - loading the fortunes from the backing file at start-up, dropping a trailing fortune that
//! was only partially written
//! - guarding all of the above with a [`ReadWriteLock`], so reads run in parallel while writes
//! run alone
//!
//! ## Client / Server
//! Client and server logic is contained in the [`FortuneClient`] and [`FortuneServer`] structs.
//! The server accepts connections and runs one [`ConnectionHandler`] per connection on a
//! [`ThreadPool`]. The handler reads one request line, lets the [`Dispatcher`] run it against
//! the engine, writes one response line and closes the connection.
//!
//! ## Protocol
//! A request is `{"method": "read", "args": []}` or `{"method": "write", "args": ["..."]}`.
//! If the server was able to service the request, it answers `{"result": ...}` (the fortune for
//! `read`, `null` for `write`). Otherwise it answers
//! `{"error": {"name": <kind>, "args": <description>}}`, where `<kind>` is one of the
//! [`ErrorKind`] names.
//!
//! ## Backing File
//! The backing file is plain text. Every fortune is followed by the [`DELIMITER`] `"\n%\n"`,
//! there is no header and the file is only ever appended to.
//!
//! [`fortune-server`]: ./fortune-server.rs
//! [`fortune-client`]: ./fortune-client.rs

pub use client::FortuneClient;
pub use dispatch::Dispatcher;
pub use engine::{Backing, FortuneEngine, RecordStore, StoreOptions, DELIMITER};
pub use error::{FortuneError, Result};
pub use lock::{ReadGuard, ReadWriteLock, WriteGuard};
pub use protocol::{ErrorBody, ErrorKind, Method, Request, Response};
pub use server::{ConnectionHandler, FortuneServer, MAX_REQUEST_BYTES};
pub use thread_pool::{NaiveThreadPool, RayonThreadPool, SharedQueueThreadPool, ThreadPool};

mod client;
mod dispatch;
mod engine;
mod error;
pub mod lock;
pub mod protocol;
mod server;
pub mod thread_pool;
