//! In-memory transport over tokio mpsc channels.

use tokio::sync::mpsc;

use super::traits::{MessageTransport, TransportError};

/// One end of an in-memory link: receives `In`, sends `Out`.
pub struct ChannelTransport<In, Out> {
    rx: mpsc::Receiver<In>,
    tx: mpsc::Sender<Out>,
}

/// Two connected ends, e.g. SECC (`Request` in, `Response` out) and EVCC
/// (`Response` in, `Request` out).
pub fn channel_pair<A, B>(capacity: usize) -> (ChannelTransport<A, B>, ChannelTransport<B, A>) {
    let (a_tx, a_rx) = mpsc::channel(capacity);
    let (b_tx, b_rx) = mpsc::channel(capacity);
    (
        ChannelTransport { rx: a_rx, tx: b_tx },
        ChannelTransport { rx: b_rx, tx: a_tx },
    )
}

impl<In: Send, Out: Send> MessageTransport for ChannelTransport<In, Out> {
    type Inbound = In;
    type Outbound = Out;

    async fn recv(&mut self) -> Result<In, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn send(&mut self, message: Out) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::SendFailed("peer dropped".into()))
    }
}
