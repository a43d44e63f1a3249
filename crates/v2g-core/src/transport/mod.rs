//! Transport layer module.

pub mod channel;
pub mod traits;

pub use channel::{ChannelTransport, channel_pair};
pub use traits::{MessageTransport, TransportError};
