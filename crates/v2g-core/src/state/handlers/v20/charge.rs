//! Charge parameters, schedule exchange, power delivery, the charge loop
//! and session stop.

use anyhow::Result;
use tracing::{debug, info, warn};

use super::super::HandlerContext;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionEvent, SessionObserver};
use crate::negotiation::charge_loop::{
    ac_charge_loop_res, dc_charge_loop_res, dc_limits_achieved, present_dc_output_v20,
};
use crate::negotiation::charge_params::{ac_cpd_res_params, dc_cpd_res_params};
use crate::negotiation::schedule::{dynamic_se_res_params, scheduled_se_res_params};
use crate::negotiation::{LoopShape, PowerDeliveryOutcome, power_delivery_outcome};
use crate::protocol::types::{ChargeProgress, ChargingSession, ControlMode, Processing};
use crate::protocol::v20::{
    AcChargeLoopReq, AcChargeLoopRes, AcChargeParameterDiscoveryReq,
    AcChargeParameterDiscoveryRes, AcCpdReqParamsKind, DcChargeLoopReq, DcChargeLoopRes,
    DcChargeParameterDiscoveryReq, DcChargeParameterDiscoveryRes, DcCpdReqParamsKind,
    PowerDeliveryReq, PowerDeliveryRes, ScheduleExchangeReq, ScheduleExchangeReqParams,
    ScheduleExchangeRes, ScheduleExchangeResParams, SessionStopReq, SessionStopRes,
};
use crate::protocol::{Request, ResponseCode};
use crate::rational::RationalQuantity;
use crate::state::machine::{SessionState, Transition, V20State};

/// Whether the bound service matches a request of the given kind.
fn service_matches<C: EvseController, O: SessionObserver>(
    ctx: &HandlerContext<'_, C, O>,
    dc: bool,
    bpt: bool,
) -> bool {
    ctx.session
        .selected_energy_service
        .as_ref()
        .is_some_and(|s| s.service.is_dc() == dc && s.service.is_bpt() == bpt)
}

/// Capabilities plus present values, stored as the session's EVSE data.
fn refresh_evse_data<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
) -> Result<()> {
    let mut evse = ctx.controller.data_context()?;
    evse.merge(&ctx.controller.present_values()?);
    ctx.session.evse_data = evse;
    Ok(())
}

pub fn handle_ac_charge_parameter_discovery<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &AcChargeParameterDiscoveryReq,
) -> Result<Transition> {
    let bpt = matches!(req.params, AcCpdReqParamsKind::Bpt(_));
    info!(bpt, "AcChargeParameterDiscovery");

    if !service_matches(ctx, false, bpt) {
        warn!(service = ?ctx.session.selected_energy_service, bpt, "AC parameters for another service");
        return Ok(ctx.fail(request, ResponseCode::FailedWrongChargeParameter));
    }
    ctx.session.ev_data.merge(&req.params);
    refresh_evse_data(ctx)?;

    let params = match ac_cpd_res_params(&ctx.session.evse_data, bpt) {
        Ok(params) => params,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err)),
    };
    let res = AcChargeParameterDiscoveryRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        params,
    };
    Ok(Transition::to(
        ctx.v20_response(res),
        SessionState::V20(V20State::ScheduleExchange),
    ))
}

pub fn handle_dc_charge_parameter_discovery<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &DcChargeParameterDiscoveryReq,
) -> Result<Transition> {
    let bpt = matches!(req.params, DcCpdReqParamsKind::Bpt(_));
    info!(bpt, "DcChargeParameterDiscovery");

    if !service_matches(ctx, true, bpt) {
        warn!(service = ?ctx.session.selected_energy_service, bpt, "DC parameters for another service");
        return Ok(ctx.fail(request, ResponseCode::FailedWrongChargeParameter));
    }
    ctx.session.ev_data.merge(&req.params);
    refresh_evse_data(ctx)?;

    let params = match dc_cpd_res_params(&ctx.session.evse_data, bpt) {
        Ok(params) => params,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err)),
    };
    let res = DcChargeParameterDiscoveryRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        params,
    };
    Ok(Transition::to(
        ctx.v20_response(res),
        SessionState::V20(V20State::ScheduleExchange),
    ))
}

pub fn handle_schedule_exchange<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &ScheduleExchangeReq,
) -> Result<Transition> {
    info!(max_supporting_points = req.max_supporting_points, "ScheduleExchange");

    let max_points = req.max_supporting_points.min(ctx.settings.max_supporting_points);
    let mode = ctx.session.control_mode.unwrap_or_default();
    let shape_ok = matches!(
        (mode, &req.params),
        (ControlMode::Scheduled, ScheduleExchangeReqParams::Scheduled(_))
            | (ControlMode::Dynamic, ScheduleExchangeReqParams::Dynamic(_))
    );
    if !shape_ok {
        warn!(mode = ?mode, "Schedule parameters do not match the control mode");
        return Ok(ctx.fail(request, ResponseCode::FailedWrongChargeParameter));
    }
    ctx.session.ev_data.merge(&req.params);

    if ctx.controller.schedule_exchange_status()?.is_ongoing() {
        if ctx.ongoing_expired() {
            return Ok(ctx.fail(request, ResponseCode::Failed));
        }
        debug!("Schedule not ready yet");
        let res = ScheduleExchangeRes {
            header: ctx.header(),
            response_code: ResponseCode::Ok,
            evse_processing: Processing::Ongoing,
            go_to_pause: None,
            params: None,
        };
        return Ok(Transition::stay(ctx.v20_response(res)));
    }
    ctx.ongoing_finished();
    refresh_evse_data(ctx)?;

    let params = match mode {
        ControlMode::Scheduled => {
            match scheduled_se_res_params(
                &ctx.session.evse_data,
                &ctx.session.ev_data,
                ctx.session.is_bpt(),
                max_points,
            ) {
                Ok(params) => ScheduleExchangeResParams::Scheduled(params),
                Err(err) => return Ok(ctx.negotiation_failed(request, &err)),
            }
        }
        ControlMode::Dynamic => ScheduleExchangeResParams::Dynamic(dynamic_se_res_params(
            &ctx.session.evse_data,
            &ctx.session.ev_data,
        )),
    };

    let next = if ctx.session.is_dc() {
        V20State::DcCableCheck
    } else {
        V20State::PowerDelivery
    };
    let res = ScheduleExchangeRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        evse_processing: Processing::Finished,
        go_to_pause: None,
        params: Some(params),
    };
    Ok(Transition::to(ctx.v20_response(res), SessionState::V20(next)))
}

pub fn handle_power_delivery<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &PowerDeliveryReq,
) -> Result<Transition> {
    info!(progress = ?req.charge_progress, ev_processing = ?req.ev_processing, "PowerDelivery");

    let res = PowerDeliveryRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        evse_status: Some(ctx.v20_evse_status()?),
    };
    if req.ev_processing.is_ongoing() {
        return Ok(Transition::to(
            ctx.v20_response(res),
            SessionState::V20(V20State::PowerDelivery),
        ));
    }

    let outcome = match power_delivery_outcome(req.charge_progress, ctx.controller.cp_state()?) {
        Ok(outcome) => outcome,
        Err(code) => {
            warn!(code = %code, "Power delivery refused");
            ctx.log(LogLevel::Warn, "Control pilot does not allow energy transfer");
            return Ok(ctx.fail(request, code));
        }
    };
    let next = match outcome {
        PowerDeliveryOutcome::ChargeLoop => {
            if req.charge_progress == ChargeProgress::Start {
                ctx.controller.set_hlc_charging(true)?;
            }
            V20State::ChargeLoop
        }
        PowerDeliveryOutcome::Stop => {
            ctx.controller.set_hlc_charging(false)?;
            if ctx.session.is_dc() {
                V20State::DcWeldingDetection
            } else {
                V20State::SessionStop
            }
        }
        PowerDeliveryOutcome::ScheduleRenegotiation => V20State::ScheduleExchange,
        PowerDeliveryOutcome::Renegotiate => {
            warn!("Renegotiate is not a -20 charge progress");
            return Ok(ctx.fail(request, ResponseCode::Failed));
        }
    };
    ctx.emit(SessionEvent::PowerDelivery {
        progress: req.charge_progress,
    });
    Ok(Transition::to(ctx.v20_response(res), SessionState::V20(next)))
}

/// Loop shape the session committed to, or the code to fail with.
fn expected_shape<C: EvseController, O: SessionObserver>(
    ctx: &HandlerContext<'_, C, O>,
    dc: bool,
    received: LoopShape,
) -> Result<(), ResponseCode> {
    let expected = LoopShape::new(ctx.session.control_mode.unwrap_or_default(), ctx.session.is_bpt());
    if ctx.session.is_dc() != dc || received != expected {
        warn!(expected = ?expected, received = ?received, dc, "Charge loop shape mismatch");
        return Err(ResponseCode::FailedWrongChargeParameter);
    }
    Ok(())
}

pub fn handle_ac_charge_loop<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &AcChargeLoopReq,
) -> Result<Transition> {
    let shape = LoopShape::of_ac(&req.control);
    info!(shape = ?shape, "AcChargeLoop");
    if let Err(code) = expected_shape(ctx, false, shape) {
        return Ok(ctx.fail(request, code));
    }

    ctx.session.ev_data.merge(&req.control);
    if let Some(display) = &req.display_parameters {
        ctx.session.ev_data.merge(display);
    }
    ctx.session.evse_data.merge(&ctx.controller.present_values()?);

    let control = match ac_charge_loop_res(shape, &ctx.session.evse_data) {
        Ok(control) => control,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err)),
    };
    let evse_target_frequency = match ctx
        .session
        .evse_data
        .target_frequency
        .map(RationalQuantity::from_f64)
        .transpose()
    {
        Ok(value) => value,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err.into())),
    };
    let meter_info = if req.meter_info_requested {
        ctx.controller.meter_info()?
    } else {
        None
    };
    let res = AcChargeLoopRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        evse_status: Some(ctx.v20_evse_status()?),
        meter_info,
        evse_target_frequency,
        control,
    };
    Ok(Transition::stay(ctx.v20_response(res)))
}

pub fn handle_dc_charge_loop<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &DcChargeLoopReq,
) -> Result<Transition> {
    let shape = LoopShape::of_dc(&req.control);
    info!(shape = ?shape, present_voltage = req.ev_present_voltage.decode(), "DcChargeLoop");
    if let Err(code) = expected_shape(ctx, true, shape) {
        return Ok(ctx.fail(request, code));
    }

    ctx.session.ev_data.merge(&req.control);
    if let Some(display) = &req.display_parameters {
        ctx.session.ev_data.merge(display);
    }
    ctx.session.ev_data.present_voltage = Some(req.ev_present_voltage.decode());
    ctx.session.evse_data.merge(&ctx.controller.present_values()?);

    let (ev, evse) = (ctx.session.ev_data, ctx.session.evse_data);
    let (current, voltage) = match present_dc_output_v20(&ev, &evse) {
        Ok(present) => present,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err)),
    };
    let control = match dc_charge_loop_res(shape, &evse) {
        Ok(control) => control,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err)),
    };
    let limits = dc_limits_achieved(&ev, &evse);

    let meter_info = if req.meter_info_requested {
        ctx.controller.meter_info()?
    } else {
        None
    };
    let res = DcChargeLoopRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        evse_status: Some(ctx.v20_evse_status()?),
        meter_info,
        evse_present_current: current,
        evse_present_voltage: voltage,
        evse_power_limit_achieved: limits.power,
        evse_current_limit_achieved: limits.current,
        evse_voltage_limit_achieved: limits.voltage,
        control,
    };
    Ok(Transition::stay(ctx.v20_response(res)))
}

pub fn handle_session_stop<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &SessionStopReq,
) -> Result<Transition> {
    info!(
        charging_session = ?req.charging_session,
        termination_code = ?req.ev_termination_code.as_ref().map(|c| c.as_str()),
        "SessionStop"
    );

    let next = match req.charging_session {
        ChargingSession::ServiceRenegotiation => {
            warn!("EV asked for service renegotiation");
            return Ok(ctx.fail(request, ResponseCode::FailedNoServiceRenegotiationSupported));
        }
        ChargingSession::Pause => {
            ctx.log(LogLevel::Info, "Session paused");
            ctx.session.paused_session_id = Some(ctx.session.session_id.clone());
            SessionState::Pause
        }
        ChargingSession::Terminate => {
            ctx.log(LogLevel::Info, "Session terminated by the EV");
            SessionState::Terminate
        }
    };
    ctx.controller.stop_charger()?;

    let res = SessionStopRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
    };
    Ok(Transition::to(ctx.v20_response(res), next))
}
