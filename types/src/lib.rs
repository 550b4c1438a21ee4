pub mod bincode;
pub mod errors;
pub mod message;
pub mod version;

pub use errors::DhtError;
pub use message::{Criteria, Operation, Point, Request, Response, ResponsePayload, Status, UpdateFields};
pub use version::{Version, VERSION};
