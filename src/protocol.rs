//! The line-delimited JSON protocol spoken between [`FortuneClient`] and [`FortuneServer`].
//!
//! A request is a single line holding `{"method": <string>, "args": <array>}` and the reply is a
//! single line holding either `{"result": <value>}` or `{"error": {"name": <kind>, "args": <msg>}}`.
//!
//! [`FortuneClient`]: ../struct.FortuneClient.html
//! [`FortuneServer`]: ../struct.FortuneServer.html
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FortuneError, Result};

/// A decoded request, exactly as it arrived over the wire.
///
/// `method` is kept as a plain string here; it is only checked against the closed [`Method`] set
/// by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// the name of the method to call
    pub method: String,
    /// the positional arguments of the call
    pub args: Vec<Value>,
}

impl Request {
    /// builds a `read` request
    pub fn read() -> Self {
        Request {
            method: Method::Read.to_string(),
            args: vec![],
        }
    }

    /// builds a `write` request carrying `fortune`
    pub fn write(fortune: impl Into<String>) -> Self {
        Request {
            method: Method::Write.to_string(),
            args: vec![Value::String(fortune.into())],
        }
    }

    /// Decodes a request from one payload line (with or without its trailing newline).
    ///
    /// # Errors
    /// [`FortuneError::MalformedRequest`] if the payload is not JSON or lacks `method`/`args`.
    pub fn decode(line: &str) -> Result<Request> {
        serde_json::from_str(line.trim_end_matches(&['\r', '\n'][..]))
            .map_err(|e| FortuneError::MalformedRequest(e.to_string()))
    }

    /// encodes this request as one newline terminated line
    pub fn encode(&self) -> Result<String> {
        encode_line(self)
    }
}

/// The closed set of methods a fortune server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// read a random fortune, takes no arguments
    Read,
    /// store a new fortune, takes exactly one string argument
    Write,
}

impl Method {
    /// the wire name of this method
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Read => "read",
            Method::Write => "write",
        }
    }
}

impl FromStr for Method {
    type Err = FortuneError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Method::Read),
            "write" => Ok(Method::Write),
            other => Err(FortuneError::UnknownMethod(other.to_owned())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stable error kinds reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// `read` on a store without fortunes
    EmptyStore,
    /// the backing file could not be written
    PersistenceError,
    /// the method is not `read` or `write`
    UnknownMethod,
    /// wrong number or type of arguments
    InvalidArguments,
    /// the request line could not be decoded
    MalformedRequest,
    /// connection level I/O failure
    TransportError,
    /// the database lock was not acquired in time
    LockTimeout,
    /// an unexpected failure inside the server
    InternalError,
}

impl ErrorKind {
    /// the wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EmptyStore => "EmptyStore",
            ErrorKind::PersistenceError => "PersistenceError",
            ErrorKind::UnknownMethod => "UnknownMethod",
            ErrorKind::InvalidArguments => "InvalidArguments",
            ErrorKind::MalformedRequest => "MalformedRequest",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::LockTimeout => "LockTimeout",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// the body of an error envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// what went wrong
    pub name: ErrorKind,
    /// a human readable description
    pub args: String,
}

/// The response envelope sent back for every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    /// this variant is returned when a request was successful, `null` for a `write`
    Result(Value),
    /// this variant is returned if an error occurred while processing the request
    Error(ErrorBody),
}

impl Response {
    /// wraps a [`FortuneError`] into an error envelope
    pub fn from_error(err: &FortuneError) -> Self {
        Response::Error(ErrorBody {
            name: err.kind(),
            args: err.to_string(),
        })
    }

    /// Decodes a response from one payload line.
    pub fn decode(line: &str) -> Result<Response> {
        Ok(serde_json::from_str(line.trim_end_matches(&['\r', '\n'][..]))?)
    }

    /// encodes this response as one newline terminated line
    pub fn encode(&self) -> Result<String> {
        encode_line(self)
    }

    /// Converts the envelope into a `Result`, an error envelope becomes
    /// [`FortuneError::Remote`].
    pub fn into_result(self) -> Result<Value> {
        match self {
            Response::Result(value) => Ok(value),
            Response::Error(ErrorBody { name, args }) => Err(FortuneError::Remote {
                name,
                message: args,
            }),
        }
    }
}

fn encode_line<T: Serialize>(value: &T) -> Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}
