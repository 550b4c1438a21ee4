pub mod client;
pub mod error;
pub mod server;
pub mod wire;

pub use client::send_request;
pub use error::TransportError;
pub use server::{serve_forever, Handler};

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;

    use identifier::Identifier;
    use types::{Operation, Request, Response, ResponsePayload};
    use utils::WorkerPool;

    use super::*;

    #[test]
    fn round_trips_a_request_through_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let pool = WorkerPool::new(2);

        let handler: Handler = Arc::new(|request: Request| {
            assert!(matches!(request.operation, Operation::GetLeafSet));
            Response::success("ok", request.hops, ResponsePayload::Empty)
        });

        thread::spawn(move || {
            // Handle exactly one connection for this test, then return.
            if let Ok((mut stream, _)) = listener.accept() {
                let request: Request = crate::wire::read_message(&mut stream, 65_536).unwrap();
                let response = handler(request);
                crate::wire::write_message(&mut stream, &response).unwrap();
            }
        });

        let request = Request::new(Operation::GetLeafSet);
        let response = send_request(addr, &request, 65_536, None).unwrap();
        assert_eq!(response.status, types::Status::Success);
        assert_eq!(response.message, "ok");
    }

    #[test]
    fn identifier_survives_the_wire_format() {
        let id = Identifier::new("4b19", 4).unwrap();
        let request = Request::new(Operation::Join {
            joining_node_id: id.clone(),
        });
        let mut buffer = Vec::new();
        crate::wire::write_message(&mut buffer, &request).unwrap();
        let decoded: Request = crate::wire::read_message(&mut buffer.as_slice(), 65_536).unwrap();
        assert_eq!(decoded, request);
    }
}
