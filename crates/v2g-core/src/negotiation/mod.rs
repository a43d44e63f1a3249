//! Pure negotiation functions.
//!
//! Each takes the session's contexts plus a decoded request and returns
//! response parameters or the response code to fail with. Nothing here
//! talks to a controller or mutates session state.

pub mod app_protocol;
pub mod charge_loop;
pub mod charge_params;
pub mod power_delivery;
pub mod schedule;
pub mod service;

use thiserror::Error;

use crate::protocol::ResponseCode;
use crate::protocol::validation::ValidationError;
use crate::rational::{RangeError, RationalQuantity};

pub use app_protocol::{NegotiatedProtocol, negotiate_app_protocol};
pub use charge_loop::{LimitsAchieved, LoopShape};
pub use power_delivery::{PowerDeliveryOutcome, power_delivery_outcome};
pub use service::OfferedServices;

/// A response could not be built from the EVSE side of the session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NegotiationError {
    #[error("EVSE value {0} is not available")]
    MissingEvseValue(&'static str),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("offered schedule covers {covered}s, {required}s required")]
    ScheduleCoverage { covered: u32, required: u32 },

    #[error("too many entries for {0}")]
    TooMany(&'static str),
}

impl NegotiationError {
    /// Code sent to the EV when negotiation fails.
    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::Failed
    }
}

pub(crate) fn require(field: &'static str, value: Option<f64>) -> Result<f64, NegotiationError> {
    value.ok_or(NegotiationError::MissingEvseValue(field))
}

/// Encode a required EVSE value.
pub(crate) fn rq(
    field: &'static str,
    value: Option<f64>,
) -> Result<RationalQuantity, NegotiationError> {
    Ok(RationalQuantity::from_f64(require(field, value)?)?)
}

/// Encode an optional EVSE value.
pub(crate) fn orq(value: Option<f64>) -> Result<Option<RationalQuantity>, NegotiationError> {
    Ok(value.map(RationalQuantity::from_f64).transpose()?)
}
