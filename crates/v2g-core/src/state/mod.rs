//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::HandlerContext;
pub use machine::{
    SessionContext, SessionState, SessionStateMachine, Transition, V2State, V20State,
};
