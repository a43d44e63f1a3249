//! Message transport abstraction.
//!
//! Defines the `MessageTransport` trait the session host reads requests from
//! and writes responses to. Encoding (EXI, V2GTP framing) lives below this
//! boundary.

use std::future::Future;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peer closed the connection")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract message transport.
///
/// Implementations:
/// - [`ChannelTransport`](super::ChannelTransport): in-memory, for loopback
///   sessions and tests
pub trait MessageTransport: Send {
    type Inbound: Send;
    type Outbound: Send;

    /// Wait for the next decoded message. Cancel-safe.
    fn recv(&mut self) -> impl Future<Output = Result<Self::Inbound, TransportError>> + Send;

    /// Send one message.
    fn send(
        &mut self,
        message: Self::Outbound,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
