//! DC-only steps: cable check, pre-charge, current demand, welding detection.

use anyhow::Result;
use tracing::{debug, info};

use super::super::HandlerContext;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionObserver};
use crate::negotiation::charge_loop::{current_demand_res, present_dc_output};
use crate::protocol::constants::DEFAULT_SA_SCHEDULE_TUPLE_ID;
use crate::protocol::types::{Processing, Protocol};
use crate::protocol::v2::{
    CableCheckReq, CableCheckRes, CurrentDemandReq, PhysicalValue, PreChargeReq, PreChargeRes,
    WeldingDetectionReq, WeldingDetectionRes,
};
use crate::protocol::{Request, ResponseCode};
use crate::state::machine::{SessionState, Transition, V2State};

pub fn handle_cable_check<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &CableCheckReq,
) -> Result<Transition> {
    info!(ev_ready = req.dc_ev_status.ev_ready, "CableCheck");
    ctx.session.ev_data.merge(&req.dc_ev_status);

    let processing = ctx.controller.cable_check_status()?;
    let next = if processing.is_ongoing() {
        if ctx.ongoing_expired() {
            return Ok(ctx.fail(request, ResponseCode::Failed));
        }
        None
    } else {
        ctx.ongoing_finished();
        ctx.log(LogLevel::Info, "Isolation check finished");
        Some(SessionState::V2(V2State::PreCharge))
    };

    let res = CableCheckRes {
        response_code: ResponseCode::Ok,
        dc_evse_status: ctx.controller.dc_evse_status()?,
        evse_processing: if processing.is_ongoing() {
            Processing::Ongoing
        } else {
            Processing::Finished
        },
    };
    Ok(Transition {
        response: ctx.v2_response(res),
        next_state: next,
    })
}

pub fn handle_pre_charge<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &PreChargeReq,
) -> Result<Transition> {
    info!(target_voltage = req.ev_target_voltage.decode(), "PreCharge");
    ctx.session.ev_data.merge(req);
    ctx.session.evse_data.merge(&ctx.controller.present_values()?);

    let (_, voltage) = present_dc_output(&ctx.session.ev_data, &ctx.session.evse_data);
    debug!(voltage, "Pre-charge voltage");
    let evse_present_voltage = match PhysicalValue::volts(voltage) {
        Ok(value) => value,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err.into())),
    };
    let res = PreChargeRes {
        response_code: ResponseCode::Ok,
        dc_evse_status: ctx.controller.dc_evse_status()?,
        evse_present_voltage,
    };
    Ok(Transition::stay(ctx.v2_response(res)))
}

pub fn handle_current_demand<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &CurrentDemandReq,
) -> Result<Transition> {
    info!(
        target_current = req.ev_target_current.decode(),
        target_voltage = req.ev_target_voltage.decode(),
        "CurrentDemand"
    );
    ctx.session.ev_data.merge(req);
    ctx.session.evse_data.merge(&ctx.controller.present_values()?);

    let res = current_demand_res(
        &ctx.session.ev_data,
        &ctx.session.evse_data,
        ctx.controller.dc_evse_status()?,
        ctx.controller.evse_id(Protocol::Iso15118_2)?,
        ctx.session
            .selected_schedule
            .unwrap_or(DEFAULT_SA_SCHEDULE_TUPLE_ID),
        ctx.controller.meter_info()?,
    );
    match res {
        Ok(res) => Ok(Transition::stay(ctx.v2_response(res))),
        Err(err) => Ok(ctx.negotiation_failed(request, &err)),
    }
}

pub fn handle_welding_detection<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &WeldingDetectionReq,
) -> Result<Transition> {
    info!("WeldingDetection");
    ctx.session.ev_data.merge(&req.dc_ev_status);
    ctx.session.evse_data.merge(&ctx.controller.present_values()?);

    let voltage = ctx.session.evse_data.present_voltage.unwrap_or(0.0);
    let evse_present_voltage = match PhysicalValue::volts(voltage) {
        Ok(value) => value,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err.into())),
    };
    let res = WeldingDetectionRes {
        response_code: ResponseCode::Ok,
        dc_evse_status: ctx.controller.dc_evse_status()?,
        evse_present_voltage,
    };
    Ok(Transition::to(
        ctx.v2_response(res),
        SessionState::V2(V2State::WeldingDetection),
    ))
}
