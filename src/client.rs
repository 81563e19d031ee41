use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use serde_json::Value;
use tracing::debug;

use crate::protocol::{Request, Response};
use crate::{FortuneError, Result};

/// `FortuneClient` contains the functionality for communication with a [`FortuneServer`].
///
/// The protocol allows one request per connection, so every call opens a fresh connection.
///
/// [`FortuneServer`]: ./struct.FortuneServer.html
#[derive(Debug, Clone)]
pub struct FortuneClient {
    addr: SocketAddr,
}

impl FortuneClient {
    /// creates a client for the server at `addr`. Nothing is sent until the first request
    ///
    /// # Errors
    /// `Err<FortuneError::StringErr>` if `addr` does not resolve to a socket address
    pub fn new<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let addr = addr
            .to_socket_addrs()
            .map_err(FortuneError::Transport)?
            .next()
            .ok_or_else(|| FortuneError::StringErr(String::from("no address to connect to")))?;
        Ok(FortuneClient { addr })
    }

    /// the server address this client talks to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// reads a random fortune from the server
    /// ## Returns
    /// `Ok<String>` with the fortune.
    /// `Err<FortuneError::Remote>` if the server answered with an error, e.g. `EmptyStore`
    pub fn read(&self) -> Result<String> {
        match self.request(&Request::read())? {
            Value::String(fortune) => Ok(fortune),
            other => Err(FortuneError::StringErr(format!(
                "unexpected read result from server: {}",
                other
            ))),
        }
    }

    /// writes a new fortune to the server
    /// # Errors
    /// `Err<FortuneError::Remote>` if the server could not store the fortune
    pub fn write(&self, fortune: impl Into<String>) -> Result<()> {
        self.request(&Request::write(fortune)).map(|_| ())
    }

    /// Performs one request over a new connection and returns the result value.
    pub fn request(&self, req: &Request) -> Result<Value> {
        self.exchange(req)?.into_result()
    }

    /// Sends `req` and returns the response envelope as received.
    pub fn exchange(&self, req: &Request) -> Result<Response> {
        let tcp = TcpStream::connect(self.addr).map_err(FortuneError::Transport)?;
        let mut writer = &tcp;
        writer
            .write_all(req.encode()?.as_bytes())
            .and_then(|_| writer.flush())
            .and_then(|_| tcp.shutdown(Shutdown::Write))
            .map_err(FortuneError::Transport)?;
        debug!("request sent to {}: {:?}", self.addr, req);

        let mut line = String::new();
        BufReader::new(&tcp)
            .read_line(&mut line)
            .map_err(FortuneError::Transport)?;
        if line.is_empty() {
            return Err(FortuneError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection without a response",
            )));
        }
        Response::decode(&line)
    }
}
