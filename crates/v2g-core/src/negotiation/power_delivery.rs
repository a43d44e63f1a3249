//! PowerDeliveryReq gating.

use crate::protocol::ResponseCode;
use crate::protocol::types::{ChargeProgress, CpState};

/// Where a successful PowerDeliveryReq leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDeliveryOutcome {
    /// Energy flows: enter the charge loop.
    ChargeLoop,
    /// EV ends energy transfer.
    Stop,
    /// -2: back to ChargeParameterDiscovery.
    Renegotiate,
    /// -20: back to ScheduleExchange.
    ScheduleRenegotiation,
}

/// Decide a PowerDeliveryReq from the most recent control pilot state.
///
/// Starting (or staying in standby, which keeps the contactors closed)
/// requires C2 or D2; anything else fails with
/// `FAILED_PowerDeliveryNotApplied`.
pub fn power_delivery_outcome(
    progress: ChargeProgress,
    cp_state: CpState,
) -> Result<PowerDeliveryOutcome, ResponseCode> {
    match progress {
        ChargeProgress::Start | ChargeProgress::Standby => {
            if cp_state.is_energized_closed() {
                Ok(PowerDeliveryOutcome::ChargeLoop)
            } else {
                Err(ResponseCode::FailedPowerDeliveryNotApplied)
            }
        }
        ChargeProgress::Stop => Ok(PowerDeliveryOutcome::Stop),
        ChargeProgress::Renegotiate => Ok(PowerDeliveryOutcome::Renegotiate),
        ChargeProgress::ScheduleRenegotiation => Ok(PowerDeliveryOutcome::ScheduleRenegotiation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_requires_energized_state() {
        for cp in [CpState::C2, CpState::D2] {
            assert_eq!(
                power_delivery_outcome(ChargeProgress::Start, cp),
                Ok(PowerDeliveryOutcome::ChargeLoop)
            );
        }
        for cp in [CpState::B1, CpState::B2, CpState::C1, CpState::D1, CpState::A1] {
            assert_eq!(
                power_delivery_outcome(ChargeProgress::Start, cp),
                Err(ResponseCode::FailedPowerDeliveryNotApplied)
            );
        }
    }

    #[test]
    fn test_stop_is_never_gated() {
        assert_eq!(
            power_delivery_outcome(ChargeProgress::Stop, CpState::B1),
            Ok(PowerDeliveryOutcome::Stop)
        );
        assert_eq!(
            power_delivery_outcome(ChargeProgress::Renegotiate, CpState::C2),
            Ok(PowerDeliveryOutcome::Renegotiate)
        );
    }
}
