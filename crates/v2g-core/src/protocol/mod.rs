pub mod app_protocol;
pub mod constants;
pub mod header;
pub mod message;
pub mod response;
pub mod types;
pub mod v2;
pub mod v20;
pub mod validation;

pub use header::{MessageHeader, SessionId};
pub use message::{MessageKind, Request, Response, failed_response_for};
pub use response::{ResponseCategory, ResponseCode};
pub use validation::{Validate, ValidationError};
