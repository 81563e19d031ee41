//! Maps decoded [`Request`]s onto [`FortuneEngine`] operations.
//!
//! The set of callable methods is closed: a request's `method` is parsed into a [`Method`] and
//! every `Method` has exactly one handler. Nothing else on the engine can be reached from the
//! wire.
use serde_json::Value;
use tracing::debug;

use crate::engine::FortuneEngine;
use crate::protocol::{Method, Request, Response};
use crate::{FortuneError, Result};

/// signature shared by all method handlers
type Handler<E> = fn(&E, Vec<Value>) -> Result<Value>;

/// Validates requests and invokes the matching engine operation.
#[derive(Debug, Clone)]
pub struct Dispatcher<E: FortuneEngine> {
    engine: E,
}

impl<E: FortuneEngine> Dispatcher<E> {
    /// creates a dispatcher that executes requests against `engine`
    pub fn new(engine: E) -> Self {
        Dispatcher { engine }
    }

    /// the engine requests are executed against
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Executes `req` and packs the outcome into a [`Response`] envelope. Never fails: every
    /// error becomes an error envelope.
    pub fn dispatch(&self, req: Request) -> Response {
        match self.call(req) {
            Ok(value) => Response::Result(value),
            Err(e) => {
                debug!("request failed: {}", e);
                Response::from_error(&e)
            }
        }
    }

    /// Executes `req`, returning the raw result value.
    ///
    /// # Errors
    /// [`FortuneError::UnknownMethod`] for methods outside the closed set,
    /// [`FortuneError::InvalidArguments`] when the arguments don't fit the method, otherwise
    /// whatever the engine reports.
    pub fn call(&self, req: Request) -> Result<Value> {
        let method: Method = req.method.parse()?;
        handler::<E>(method)(&self.engine, req.args)
    }
}

/// the method table
fn handler<E: FortuneEngine>(method: Method) -> Handler<E> {
    match method {
        Method::Read => read::<E>,
        Method::Write => write::<E>,
    }
}

/// `read()`, returns a random fortune
fn read<E: FortuneEngine>(engine: &E, args: Vec<Value>) -> Result<Value> {
    if !args.is_empty() {
        return Err(FortuneError::InvalidArguments(format!(
            "read takes no arguments, got {}",
            args.len()
        )));
    }
    engine.read().map(Value::String)
}

/// `write(fortune)`, returns `null`
fn write<E: FortuneEngine>(engine: &E, args: Vec<Value>) -> Result<Value> {
    let count = args.len();
    let mut args = args.into_iter();
    match (args.next(), count) {
        (Some(Value::String(fortune)), 1) => {
            engine.write(fortune)?;
            Ok(Value::Null)
        }
        (Some(other), 1) => Err(FortuneError::InvalidArguments(format!(
            "write expects a string argument, got {}",
            other
        ))),
        _ => Err(FortuneError::InvalidArguments(format!(
            "write takes exactly one argument, got {}",
            count
        ))),
    }
}
