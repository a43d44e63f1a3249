//! Event system for host decoupling.
//!
//! Lets a CLI, a charger backend or a test harness follow a session
//! without reaching into the state machine.

use std::fmt;

use crate::protocol::types::{AuthorizationStatus, ChargeProgress, Protocol};
use crate::protocol::{MessageKind, ResponseCode, SessionId};
use crate::state::SessionState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Which side of the link a message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// EVCC -> SECC
    Rx,
    /// SECC -> EVCC
    Tx,
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDirection::Rx => write!(f, "RX"),
            MessageDirection::Tx => write!(f, "TX"),
        }
    }
}

/// Events emitted while a session runs.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Handshake picked an application protocol.
    ProtocolNegotiated { protocol: Protocol, schema_id: u8 },
    /// SessionSetup answered.
    SessionEstablished { session_id: SessionId, joined: bool },
    /// A request arrived or a response left.
    Message {
        direction: MessageDirection,
        kind: MessageKind,
        code: Option<ResponseCode>,
    },
    /// The committed state changed.
    StateChanged { from: SessionState, to: SessionState },
    /// A request did not fit the current state.
    SequenceError {
        state: SessionState,
        received: MessageKind,
    },
    /// Authorization decision reported by the charger.
    Authorization { status: AuthorizationStatus },
    /// PowerDeliveryReq accepted.
    PowerDelivery { progress: ChargeProgress },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// The session ended.
    Stopped { successful: bool, reason: String },
}

/// Observer trait for receiving session events.
///
/// Implement this in the host to mirror the session in a UI or backend.
pub trait SessionObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SessionEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::ProtocolNegotiated {
                protocol,
                schema_id,
            } => {
                tracing::info!(protocol = %protocol, schema_id = schema_id, "Protocol negotiated");
            }
            SessionEvent::SessionEstablished { session_id, joined } => {
                tracing::info!(session_id = %session_id, joined = joined, "Session established");
            }
            SessionEvent::Message {
                direction,
                kind,
                code,
            } => match code {
                Some(code) if code.is_failed() => {
                    tracing::warn!(dir = %direction, kind = %kind, code = %code, "Message");
                }
                Some(code) => {
                    tracing::debug!(dir = %direction, kind = %kind, code = %code, "Message");
                }
                None => tracing::debug!(dir = %direction, kind = %kind, "Message"),
            },
            SessionEvent::StateChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "State changed");
            }
            SessionEvent::SequenceError { state, received } => {
                tracing::warn!(state = %state, received = %received, "Sequence error");
            }
            SessionEvent::Authorization { status } => {
                tracing::info!(status = ?status, "Authorization");
            }
            SessionEvent::PowerDelivery { progress } => {
                tracing::info!(progress = ?progress, "Power delivery");
            }
            SessionEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            SessionEvent::Stopped { successful, reason } => {
                if *successful {
                    tracing::info!(reason = %reason, "Session stopped");
                } else {
                    tracing::warn!(reason = %reason, "Session stopped");
                }
            }
        }
    }
}

/// Observer that keeps every event, for tests and post-mortem dumps.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<SessionEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_event(&self, event: &SessionEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
    }
}

impl<O: SessionObserver + ?Sized> SessionObserver for std::sync::Arc<O> {
    fn on_event(&self, event: &SessionEvent) {
        (**self).on_event(event);
    }
}
