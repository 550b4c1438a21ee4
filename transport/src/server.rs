use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use types::{Request, Response};
use utils::WorkerPool;

use crate::error::TransportError;
use crate::wire::{read_message, write_message};

pub type Handler = Arc<dyn Fn(Request) -> Response + Send + Sync>;

/// Accepts connections forever, handing each one to the worker pool. Every
/// connection carries exactly one request/response exchange, mirroring the
/// original node's blocking per-call socket pattern.
pub fn serve_forever(listener: TcpListener, pool: &WorkerPool, max_message_size: usize, handler: Handler) {
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let handler = Arc::clone(&handler);
                pool.execute(move || {
                    if let Err(error) = handle_connection(stream, max_message_size, &handler) {
                        tracing::warn!(%error, "connection handling failed");
                    }
                });
            }
            Err(error) => tracing::warn!(%error, "failed to accept connection"),
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    max_message_size: usize,
    handler: &Handler,
) -> Result<(), TransportError> {
    let request: Request = read_message(&mut stream, max_message_size)?;
    let response = handler(request);
    write_message(&mut stream, &response)
}
