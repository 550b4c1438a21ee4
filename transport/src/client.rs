use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use types::{Request, Response};

use crate::error::TransportError;
use crate::wire::{read_message, write_message};

/// Blocking request/response exchange with a single peer. The sender
/// always waits for the response (§5 "Requests are synchronous: a sender
/// blocks on the response").
#[tracing::instrument(skip(request))]
pub fn send_request(
    addr: SocketAddr,
    request: &Request,
    max_message_size: usize,
    timeout: Option<Duration>,
) -> Result<Response, TransportError> {
    let mut stream = TcpStream::connect(addr)?;
    if let Some(timeout) = timeout {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
    }
    write_message(&mut stream, request)?;
    read_message(&mut stream, max_message_size)
}
