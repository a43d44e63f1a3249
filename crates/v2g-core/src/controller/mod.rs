//! Controller abstraction layer.
//!
//! The state machine asks an [`EvseController`] for everything it cannot
//! decide from the message flow alone. The simulated EVCC asks an
//! [`EvController`] the same way.

pub mod ev;
pub mod external;
pub mod sim;
pub mod traits;

pub use ev::SimEvController;
pub use external::{ChargerProfile, EvseFeeds, ExternalEvseController};
pub use sim::{ControllerCall, SimEvseController};
pub use traits::{
    AuthorizationResponse, ControllerError, EvChargeParamsV20, EvController, EvseController,
};
