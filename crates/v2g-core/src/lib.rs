//! V2G-Core: ISO 15118-2 / ISO 15118-20 SECC session logic in Rust.
//!
//! This crate implements the charging-station side of a high-level
//! communication session: protocol handshake, session setup, authorization,
//! service and parameter negotiation, schedules, power delivery, the charge
//! loop and session stop. Message encoding (EXI, V2GTP, TLS) lives outside.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Rational**: exact `mantissa × 10^exponent` quantities
//! - **Protocol**: message catalogue, constrained types, response codes
//! - **Context**: EV and EVSE data gathered over a session
//! - **Negotiation**: pure functions that pick protocols, services and limits
//! - **Controller**: EVSE and EV interfaces plus simulated implementations
//! - **State**: the synchronous SECC state machine and per-state handlers
//! - **Events**: observer pattern for host decoupling
//! - **Transport**: message transport abstraction (in-memory channels)
//! - **Session**: async host with sequence timeout and stop signal
//! - **EVCC**: simulated vehicle that drives a session end to end
//!
//! # Example
//!
//! ```no_run
//! use v2g_core::controller::SimEvController;
//! use v2g_core::protocol::types::Protocol;
//! use v2g_core::{SessionConfig, run_loopback};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//! let config = SessionConfig::default();
//! let stop = run_loopback(&config, Protocol::Iso15118_2, SimEvController::default(), stop_rx)
//!     .await?;
//! println!("{}", stop.reason);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod controller;
pub mod evcc;
pub mod events;
pub mod negotiation;
pub mod protocol;
pub mod rational;
pub mod session;
pub mod state;
pub mod tasks;
pub mod transport;

// Re-exports for convenience
pub use config::{ConfigError, SeccSettings, SessionConfig};
pub use context::{EvDataContext, EvseDataContext, EvseUpdate};
pub use controller::{ControllerError, EvController, EvseController};
pub use evcc::SimulatedEvcc;
pub use events::{LogLevel, NullObserver, SessionEvent, SessionObserver, TracingObserver};
pub use protocol::{Request, Response, ResponseCode, SessionId};
pub use rational::{RangeError, RationalQuantity};
pub use session::{SeccSession, StopReason, run_loopback};
pub use state::{SessionState, SessionStateMachine};
pub use tasks::wait_for_tasks;
pub use transport::{ChannelTransport, MessageTransport, TransportError, channel_pair};
