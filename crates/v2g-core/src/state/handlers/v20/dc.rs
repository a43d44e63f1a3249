//! DC-only steps: cable check, pre-charge, welding detection.

use anyhow::Result;
use tracing::{debug, info};

use super::super::HandlerContext;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionObserver};
use crate::negotiation::charge_loop::present_dc_output;
use crate::protocol::types::Processing;
use crate::protocol::v20::{
    DcCableCheckRes, DcPreChargeReq, DcPreChargeRes, DcWeldingDetectionReq, DcWeldingDetectionRes,
};
use crate::protocol::{Request, ResponseCode};
use crate::rational::RationalQuantity;
use crate::state::machine::{SessionState, Transition, V20State};

pub fn handle_cable_check<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
) -> Result<Transition> {
    info!("DcCableCheck");

    let processing = ctx.controller.cable_check_status()?;
    let next = if processing.is_ongoing() {
        if ctx.ongoing_expired() {
            return Ok(ctx.fail(request, ResponseCode::Failed));
        }
        None
    } else {
        ctx.ongoing_finished();
        ctx.log(LogLevel::Info, "Isolation check finished");
        Some(SessionState::V20(V20State::DcPreCharge))
    };

    let res = DcCableCheckRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        evse_processing: if processing.is_ongoing() {
            Processing::Ongoing
        } else {
            Processing::Finished
        },
    };
    Ok(Transition {
        response: ctx.v20_response(res),
        next_state: next,
    })
}

pub fn handle_pre_charge<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &DcPreChargeReq,
) -> Result<Transition> {
    info!(
        ev_processing = ?req.ev_processing,
        target_voltage = req.ev_target_voltage.decode(),
        "DcPreCharge"
    );
    ctx.session.ev_data.present_voltage = Some(req.ev_present_voltage.decode());
    ctx.session.ev_data.target_voltage = Some(req.ev_target_voltage.decode());
    ctx.session.evse_data.merge(&ctx.controller.present_values()?);

    let (_, voltage) = present_dc_output(&ctx.session.ev_data, &ctx.session.evse_data);
    debug!(voltage, "Pre-charge voltage");
    let evse_present_voltage = match RationalQuantity::from_f64(voltage) {
        Ok(value) => value,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err.into())),
    };
    let res = DcPreChargeRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        evse_present_voltage,
    };
    if req.ev_processing.is_ongoing() {
        return Ok(Transition::stay(ctx.v20_response(res)));
    }
    Ok(Transition::to(
        ctx.v20_response(res),
        SessionState::V20(V20State::PowerDelivery),
    ))
}

pub fn handle_welding_detection<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &DcWeldingDetectionReq,
) -> Result<Transition> {
    info!(ev_processing = ?req.ev_processing, "DcWeldingDetection");
    ctx.session.evse_data.merge(&ctx.controller.present_values()?);

    let voltage = ctx.session.evse_data.present_voltage.unwrap_or(0.0);
    let evse_present_voltage = match RationalQuantity::from_f64(voltage) {
        Ok(value) => value,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err.into())),
    };
    let res = DcWeldingDetectionRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        evse_present_voltage,
    };
    if req.ev_processing.is_ongoing() {
        return Ok(Transition::stay(ctx.v20_response(res)));
    }
    Ok(Transition::to(
        ctx.v20_response(res),
        SessionState::V20(V20State::SessionStop),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::super::test_support::*;
    use crate::config::SeccSettings;
    use crate::context::EvseUpdate;
    use crate::controller::SimEvseController;
    use crate::protocol::types::{
        ChargeProgress, ChargingSession, ControlMode, Processing, Protocol, ServiceV20,
    };
    use crate::protocol::v20;
    use crate::protocol::{Request, Response, ResponseCode};
    use crate::rational::RationalQuantity;
    use crate::state::machine::{SessionState, V20State};

    fn to_cable_check(sm: &mut TestMachine) {
        v20_selected(sm, Protocol::Iso15118_20Dc, ServiceV20::Dc, 2);
        assert_eq!(sm.session().control_mode, Some(ControlMode::Dynamic));
        sm.ok(v20_charge_parameters(sm));
        sm.ok(v20_schedule_exchange(sm));
        assert_eq!(sm.state(), SessionState::V20(V20State::DcCableCheck));
    }

    fn cable_check(sm: &TestMachine) -> Request {
        sm.v20(v20::DcCableCheckReq { header: sm.header() })
    }

    fn pre_charge(sm: &TestMachine, processing: Processing) -> Request {
        sm.v20(v20::DcPreChargeReq {
            header: sm.header(),
            ev_processing: processing,
            ev_present_voltage: RationalQuantity::new(395, 0),
            ev_target_voltage: RationalQuantity::new(400, 0),
        })
    }

    fn dynamic_loop(sm: &TestMachine) -> Request {
        sm.v20(v20::DcChargeLoopReq {
            header: sm.header(),
            display_parameters: None,
            meter_info_requested: false,
            ev_present_voltage: RationalQuantity::new(400, 0),
            control: v20::DcChargeLoopReqControl::Dynamic(v20::DynamicDcChargeLoopReqParams {
                ev_max_charge_power: RationalQuantity::new(150, 3),
                ev_max_charge_current: RationalQuantity::new(300, 0),
                ev_max_voltage: RationalQuantity::new(500, 0),
                ..Default::default()
            }),
        })
    }

    fn power_delivery(sm: &TestMachine, progress: ChargeProgress) -> Request {
        sm.v20(v20::PowerDeliveryReq {
            header: sm.header(),
            ev_processing: Processing::Finished,
            charge_progress: progress,
            ev_power_profile: None,
            bpt_channel_selection: None,
        })
    }

    #[test]
    fn test_cable_check_ongoing_then_finished() {
        let evse = SimEvseController::default();
        evse.queue_cable_check(Processing::Ongoing);
        let mut sm = machine_with(evse, SeccSettings::default());
        to_cable_check(&mut sm);

        sm.ok(cable_check(&sm));
        assert_eq!(sm.state(), SessionState::V20(V20State::DcCableCheck));
        sm.ok(cable_check(&sm));
        assert_eq!(sm.state(), SessionState::V20(V20State::DcPreCharge));
    }

    #[test]
    fn test_pre_charge_waits_for_ev() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        to_cable_check(&mut sm);
        sm.ok(cable_check(&sm));

        let res = sm.ok(pre_charge(&sm, Processing::Ongoing));
        let Response::V20(v20::Response::DcPreCharge(res)) = res else {
            panic!("expected DcPreChargeRes");
        };
        assert_eq!(res.evse_present_voltage.decode(), 400.0);
        assert_eq!(sm.state(), SessionState::V20(V20State::DcPreCharge));

        sm.ok(pre_charge(&sm, Processing::Finished));
        assert_eq!(sm.state(), SessionState::V20(V20State::PowerDelivery));
    }

    #[test]
    fn test_unencodable_pre_charge_voltage_fails_session() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        to_cable_check(&mut sm);
        sm.ok(cable_check(&sm));
        sm.controller().update_present(&EvseUpdate {
            present_voltage: Some(1.0e9),
            ..Default::default()
        });

        let res = sm.step(&pre_charge(&sm, Processing::Ongoing)).unwrap();
        assert_eq!(res.response_code(), ResponseCode::Failed);
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_dc_dynamic_session_end_to_end() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        to_cable_check(&mut sm);
        sm.ok(cable_check(&sm));
        sm.ok(pre_charge(&sm, Processing::Finished));
        sm.ok(power_delivery(&sm, ChargeProgress::Start));
        assert_eq!(sm.state(), SessionState::V20(V20State::ChargeLoop));

        sm.controller().update_present(&EvseUpdate {
            present_current: Some(120.0),
            ..Default::default()
        });
        let res = sm.ok(dynamic_loop(&sm));
        let Response::V20(v20::Response::DcChargeLoop(res)) = res else {
            panic!("expected DcChargeLoopRes");
        };
        assert_eq!(res.evse_present_voltage.decode(), 400.0);
        assert_eq!(res.evse_present_current.decode(), 120.0);
        assert!(matches!(res.control, v20::DcChargeLoopResControl::Dynamic(_)));
        assert_eq!(sm.session().ev_data.present_voltage, Some(400.0));

        sm.ok(power_delivery(&sm, ChargeProgress::Stop));
        assert_eq!(sm.state(), SessionState::V20(V20State::DcWeldingDetection));
        sm.ok(sm.v20(v20::DcWeldingDetectionReq {
            header: sm.header(),
            ev_processing: Processing::Finished,
        }));
        assert_eq!(sm.state(), SessionState::V20(V20State::SessionStop));
        sm.ok(sm.v20(v20::SessionStopReq {
            header: sm.header(),
            charging_session: ChargingSession::Terminate,
            ev_termination_code: None,
            ev_termination_explanation: None,
        }));
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_pause_keeps_session_id() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        to_cable_check(&mut sm);
        sm.ok(cable_check(&sm));
        sm.ok(pre_charge(&sm, Processing::Finished));
        let id = sm.session().session_id.clone();
        sm.ok(sm.v20(v20::SessionStopReq {
            header: sm.header(),
            charging_session: ChargingSession::Pause,
            ev_termination_code: None,
            ev_termination_explanation: None,
        }));
        assert_eq!(sm.state(), SessionState::Pause);
        assert_eq!(sm.session().paused_session_id, Some(id));
    }

    #[test]
    fn test_charge_loop_before_power_delivery_is_sequence_error() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        to_cable_check(&mut sm);
        sm.ok(cable_check(&sm));
        let res = sm.step(&dynamic_loop(&sm)).unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedSequenceError);
    }
}
