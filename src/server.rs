use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::engine::FortuneEngine;
use crate::protocol::{ErrorBody, ErrorKind, Request, Response};
use crate::thread_pool::ThreadPool;
use crate::{FortuneError, Result};

/// requests longer than this (in bytes, newline included) are rejected as malformed
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// A TCP socket server implementation over a fortune storage engine.
/// It listens for incoming connections on a [`SocketAddr`](https://doc.rust-lang.org/std/net/enum.SocketAddr.html)
/// and hands every connection to a [`ConnectionHandler`] running on the [`ThreadPool`].
///
/// Each connection carries exactly one request and one response.
///
/// # Example
/// Run a server on "127.0.0.1:4000", spawning one thread per connection
/// ```rust
/// use fortune::{FortuneServer, RecordStore};
/// use fortune::thread_pool::{NaiveThreadPool, ThreadPool};
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let pool = NaiveThreadPool::new(0)?; // thread count is ignored by the naive pool
/// let store = RecordStore::open("dbs/fortune.db")?;
/// let server = FortuneServer::new(store, pool);
/// //server.run("127.0.0.1:4000")?;
/// #
/// # Ok(())
/// # }
/// ```
pub struct FortuneServer<E: FortuneEngine, P: ThreadPool> {
    /// shared by every connection, cloning it clones the engine handle
    dispatcher: Dispatcher<E>,
    /// runs the connection handlers
    pool: P,
}

impl<E: FortuneEngine, P: ThreadPool> FortuneServer<E, P> {
    /// Create a new `FortuneServer` using the given [`FortuneEngine`] and [`ThreadPool`]
    /// implementation.
    pub fn new(engine: E, pool: P) -> Self {
        FortuneServer {
            dispatcher: Dispatcher::new(engine),
            pool,
        }
    }

    /// binds to the given address and serves connections on it until the process exits
    ///
    /// # Errors
    /// returns [`FortuneError::Io`] if the address could not be bound
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        self.serve(listener)
    }

    /// Serves connections arriving on an already bound `listener`.
    /// A failed accept is logged and skipped; it never stops the server.
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        info!("accepting connections on {}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let handler = ConnectionHandler::new(self.dispatcher.clone());
                    self.pool.spawn(move || handler.handle_tcp(stream));
                }
                Err(e) => error!("Connection failed: {}", e),
            }
        }
        Ok(())
    }
}

/// Owns the lifecycle of one connection: receive one line, decode it, dispatch it, send one
/// line back, close.
///
/// Protocol level failures (malformed payloads, unknown methods, engine errors, even panics)
/// are always answered with an error envelope. Only I/O failures on the connection itself end it
/// without a response.
#[derive(Debug, Clone)]
pub struct ConnectionHandler<E: FortuneEngine> {
    dispatcher: Dispatcher<E>,
}

impl<E: FortuneEngine> ConnectionHandler<E> {
    /// creates a handler that executes requests through `dispatcher`
    pub fn new(dispatcher: Dispatcher<E>) -> Self {
        ConnectionHandler { dispatcher }
    }

    /// Serves one request on `tcp`. The stream is closed when this returns, whatever happened.
    pub fn handle_tcp(self, tcp: TcpStream) {
        let peer = tcp
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| String::from("<unknown>"));

        match self.handle(BufReader::new(&tcp), &tcp) {
            Ok(Response::Result(_)) => debug!("Response sent to {}", peer),
            Ok(Response::Error(body)) => {
                debug!("Error response sent to {}: {}: {}", peer, body.name, body.args)
            }
            Err(e) => warn!("The connection to {} has died: {}", peer, e),
        }
    }

    /// Runs the request/response exchange over any reader/writer pair and returns the response
    /// that was sent.
    ///
    /// # Errors
    /// returns [`FortuneError::Transport`] if nothing could be received or the response could
    /// not be sent
    pub fn handle<R: BufRead, W: Write>(&self, mut reader: R, mut writer: W) -> Result<Response> {
        let response = match receive(&mut reader) {
            Ok(line) => self.process(&line),
            Err(e @ FortuneError::MalformedRequest(_)) => Response::from_error(&e),
            Err(e) => return Err(e),
        };

        let line = response.encode()?;
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(FortuneError::Transport)?;
        Ok(response)
    }

    /// decodes and dispatches one payload line
    fn process(&self, line: &str) -> Response {
        let req = match Request::decode(line) {
            Ok(req) => req,
            Err(e) => return Response::from_error(&e),
        };
        debug!("Receive request: {:?}", req);

        let dispatcher = &self.dispatcher;
        match panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(req))) {
            Ok(response) => response,
            Err(_) => {
                error!("request handler panicked");
                Response::Error(ErrorBody {
                    name: ErrorKind::InternalError,
                    args: String::from("the server failed while handling the request"),
                })
            }
        }
    }
}

/// Reads one newline terminated payload, at most [`MAX_REQUEST_BYTES`] long.
/// A final line without newline is accepted as long as it is not empty.
fn receive<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    let n = reader
        .by_ref()
        .take(MAX_REQUEST_BYTES as u64 + 1)
        .read_until(b'\n', &mut buf)
        .map_err(FortuneError::Transport)?;

    if n == 0 {
        return Err(FortuneError::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before a request was received",
        )));
    }
    if n > MAX_REQUEST_BYTES {
        return Err(FortuneError::MalformedRequest(format!(
            "request exceeds {} bytes",
            MAX_REQUEST_BYTES
        )));
    }
    String::from_utf8(buf).map_err(|e| FortuneError::MalformedRequest(e.to_string()))
}

