//! Charge parameters, power delivery, AC charging status and session stop.

use anyhow::Result;
use tracing::{debug, info, warn};

use super::super::HandlerContext;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionEvent, SessionObserver};
use crate::negotiation::charge_params::v2_evse_charge_parameter;
use crate::negotiation::schedule::{
    check_schedule_coverage, offer_sa_schedules, profile_within_schedule,
};
use crate::negotiation::{PowerDeliveryOutcome, power_delivery_outcome};
use crate::protocol::constants::{DEFAULT_SA_SCHEDULE_TUPLE_ID, V2_MAX_CURRENT_LIMIT_A};
use crate::protocol::types::{ChargeProgress, ChargingSession, Processing, Protocol};
use crate::protocol::v2::{
    ChargeParameterDiscoveryReq, ChargeParameterDiscoveryRes, ChargingStatusRes, EvseStatus,
    PhysicalValue, PowerDeliveryReq, PowerDeliveryRes, SessionStopReq, SessionStopRes,
};
use crate::protocol::validation::BoundedList;
use crate::protocol::{Request, ResponseCode};
use crate::state::machine::{SessionState, Transition, V2State};

pub fn handle_charge_parameter_discovery<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &ChargeParameterDiscoveryReq,
) -> Result<Transition> {
    let mode = req.requested_energy_transfer_mode;
    info!(mode = ?mode, "ChargeParameterDiscovery");
    ctx.log(LogLevel::Info, format!("EV requests {mode:?}"));

    if !ctx.controller.supported_energy_transfer_modes()?.contains(&mode) {
        warn!(mode = ?mode, "Energy transfer mode not supported");
        return Ok(ctx.fail(request, ResponseCode::FailedWrongEnergyTransferMode));
    }
    ctx.session.energy_transfer_mode = Some(mode);
    ctx.session.ev_data.merge(&req.ev_charge_parameter);

    let mut evse = ctx.controller.data_context()?;
    evse.merge(&ctx.controller.present_values()?);
    ctx.session.evse_data = evse;

    let departure_time = req.ev_charge_parameter.departure_time();
    let offered = match ctx.controller.sa_schedules(departure_time)? {
        Some(schedules) => Ok(schedules),
        None => offer_sa_schedules(&evse, departure_time),
    };
    let mut schedules = match offered
        .and_then(|s| check_schedule_coverage(&s, departure_time).map(|()| s))
    {
        Ok(schedules) => schedules,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err)),
    };
    if let Some(max) = req.max_entries_sa_schedule_tuple {
        schedules.truncate(usize::from(max));
    }

    let evse_charge_parameter = match v2_evse_charge_parameter(
        &evse,
        mode,
        ctx.controller.ac_evse_status()?,
        ctx.controller.dc_evse_status()?,
    ) {
        Ok(param) => param,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err)),
    };
    let Ok(sa_schedule_list) = BoundedList::new(schedules.clone()) else {
        warn!(count = schedules.len(), "Too many schedules from the charger");
        return Ok(ctx.fail(request, ResponseCode::Failed));
    };
    debug!(tuples = schedules.len(), departure_time = ?departure_time, "Schedules offered");
    ctx.session.offered_schedules = schedules;

    let next = if mode.is_dc() {
        V2State::CableCheck
    } else {
        V2State::PowerDelivery
    };
    let res = ChargeParameterDiscoveryRes {
        response_code: ResponseCode::Ok,
        evse_processing: Processing::Finished,
        sa_schedule_list: Some(sa_schedule_list),
        evse_charge_parameter: Some(evse_charge_parameter),
    };
    Ok(Transition::to(ctx.v2_response(res), SessionState::V2(next)))
}

pub fn handle_power_delivery<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &PowerDeliveryReq,
) -> Result<Transition> {
    info!(progress = ?req.charge_progress, tuple = req.sa_schedule_tuple_id, "PowerDelivery");

    if req.charge_progress == ChargeProgress::Start {
        let Some(tuple) = ctx
            .session
            .offered_schedules
            .iter()
            .find(|t| t.sa_schedule_tuple_id == req.sa_schedule_tuple_id)
        else {
            warn!(tuple = req.sa_schedule_tuple_id, "SAScheduleTupleID was not offered");
            return Ok(ctx.fail(request, ResponseCode::FailedTariffSelectionInvalid));
        };
        if let Some(profile) = &req.charging_profile
            && !profile_within_schedule(profile, tuple)
        {
            warn!("Charging profile exceeds the selected schedule");
            return Ok(ctx.fail(request, ResponseCode::FailedChargingProfileInvalid));
        }
    }
    if let Some(params) = &req.dc_ev_power_delivery_parameter {
        ctx.session.ev_data.merge(&params.dc_ev_status);
    }

    let outcome = match power_delivery_outcome(req.charge_progress, ctx.controller.cp_state()?) {
        Ok(outcome) => outcome,
        Err(code) => {
            warn!(code = %code, "Power delivery refused");
            ctx.log(LogLevel::Warn, "Control pilot does not allow energy transfer");
            return Ok(ctx.fail(request, code));
        }
    };

    let dc = ctx.session.is_dc();
    let next = match outcome {
        PowerDeliveryOutcome::ChargeLoop => {
            ctx.controller.set_hlc_charging(true)?;
            ctx.session.selected_schedule = Some(req.sa_schedule_tuple_id);
            if dc {
                V2State::CurrentDemand
            } else {
                V2State::ChargingStatus
            }
        }
        PowerDeliveryOutcome::Stop => {
            ctx.controller.set_hlc_charging(false)?;
            if dc {
                V2State::WeldingDetection
            } else {
                V2State::SessionStop
            }
        }
        PowerDeliveryOutcome::Renegotiate => V2State::ChargeParameterDiscovery,
        PowerDeliveryOutcome::ScheduleRenegotiation => {
            warn!("ScheduleRenegotiation is not a -2 charge progress");
            return Ok(ctx.fail(request, ResponseCode::Failed));
        }
    };
    ctx.emit(SessionEvent::PowerDelivery {
        progress: req.charge_progress,
    });

    let evse_status = if dc {
        EvseStatus::Dc(ctx.controller.dc_evse_status()?)
    } else {
        EvseStatus::Ac(ctx.controller.ac_evse_status()?)
    };
    let res = PowerDeliveryRes {
        response_code: ResponseCode::Ok,
        evse_status,
    };
    Ok(Transition::to(ctx.v2_response(res), SessionState::V2(next)))
}

pub fn handle_charging_status<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
) -> Result<Transition> {
    info!("ChargingStatus");
    ctx.session.evse_data.merge(&ctx.controller.present_values()?);

    let evse_max_current = match ctx
        .session
        .evse_data
        .max_charge_current
        .map(|a| PhysicalValue::amperes(a.min(V2_MAX_CURRENT_LIMIT_A)))
        .transpose()
    {
        Ok(value) => value,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err.into())),
    };
    let res = ChargingStatusRes {
        response_code: ResponseCode::Ok,
        evse_id: ctx.controller.evse_id(Protocol::Iso15118_2)?,
        sa_schedule_tuple_id: ctx
            .session
            .selected_schedule
            .unwrap_or(DEFAULT_SA_SCHEDULE_TUPLE_ID),
        evse_max_current,
        meter_info: ctx.controller.meter_info()?,
        receipt_required: Some(false),
        ac_evse_status: ctx.controller.ac_evse_status()?,
    };
    Ok(Transition::stay(ctx.v2_response(res)))
}

pub fn handle_session_stop<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    req: &SessionStopReq,
) -> Result<Transition> {
    info!(charging_session = ?req.charging_session, "SessionStop");
    ctx.controller.stop_charger()?;

    let next = match req.charging_session {
        ChargingSession::Pause => {
            ctx.log(LogLevel::Info, "Session paused");
            ctx.session.paused_session_id = Some(ctx.session.session_id.clone());
            SessionState::Pause
        }
        _ => {
            ctx.log(LogLevel::Info, "Session terminated by the EV");
            SessionState::Terminate
        }
    };
    let res = SessionStopRes {
        response_code: ResponseCode::Ok,
    };
    Ok(Transition::to(ctx.v2_response(res), next))
}

#[cfg(test)]
mod tests {
    use super::super::super::test_support::*;
    use crate::config::SeccSettings;
    use crate::controller::{ControllerCall, SimEvseController};
    use crate::events::SessionEvent;
    use crate::negotiation::schedule::charging_profile;
    use crate::protocol::types::{ChargeProgress, ChargingSession, CpState, EnergyTransferMode};
    use crate::protocol::v2::{self, ResponseBody};
    use crate::protocol::{Response, ResponseCode};
    use crate::state::machine::{SessionState, V2State};

    fn discovered(sm: &mut TestMachine) -> v2::ChargeParameterDiscoveryRes {
        v2_authorized(sm);
        let res = sm.ok(sm.v2(v2_charge_parameters(EnergyTransferMode::AcThreePhaseCore)));
        match res {
            Response::V2(v2::Response {
                body: ResponseBody::ChargeParameterDiscovery(res),
                ..
            }) => res,
            other => panic!("unexpected {other}"),
        }
    }

    fn start(sm: &TestMachine) -> v2::PowerDeliveryReq {
        let tuple = sm.session().offered_schedules[0].clone();
        v2::PowerDeliveryReq {
            charge_progress: ChargeProgress::Start,
            sa_schedule_tuple_id: tuple.sa_schedule_tuple_id,
            charging_profile: Some(charging_profile(&tuple).unwrap()),
            dc_ev_power_delivery_parameter: None,
        }
    }

    fn stop() -> v2::PowerDeliveryReq {
        v2::PowerDeliveryReq {
            charge_progress: ChargeProgress::Stop,
            sa_schedule_tuple_id: 1,
            charging_profile: None,
            dc_ev_power_delivery_parameter: None,
        }
    }

    #[test]
    fn test_ac_discovery_offers_default_schedule() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        let res = discovered(&mut sm);
        let schedules = res.sa_schedule_list.expect("schedule list");
        assert_eq!(schedules.len(), 1);
        assert!(matches!(
            res.evse_charge_parameter,
            Some(v2::EvseChargeParameter::Ac(_))
        ));
        assert_eq!(sm.state(), SessionState::V2(V2State::PowerDelivery));
        assert_eq!(sm.session().ev_data.max_charge_current, Some(32.0));
        assert_eq!(sm.session().evse_data.max_charge_power, Some(30000.0));
    }

    #[test]
    fn test_dc_discovery_goes_to_cable_check() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        v2_authorized(&mut sm);
        sm.ok(sm.v2(v2_charge_parameters(EnergyTransferMode::DcExtended)));
        assert_eq!(sm.state(), SessionState::V2(V2State::CableCheck));
        assert!(sm.session().is_dc());
    }

    #[test]
    fn test_unsupported_mode_fails() {
        let evse = SimEvseController::default()
            .with_energy_modes(vec![EnergyTransferMode::AcThreePhaseCore]);
        let mut sm = machine_with(evse, SeccSettings::default());
        v2_authorized(&mut sm);
        let res = sm
            .step(&sm.v2(v2_charge_parameters(EnergyTransferMode::DcCore)))
            .unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedWrongEnergyTransferMode);
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_ac_charge_cycle() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        discovered(&mut sm);
        sm.ok(sm.v2(start(&sm)));
        assert_eq!(sm.state(), SessionState::V2(V2State::ChargingStatus));
        assert!(sm.controller().hlc_charging());

        let res = sm.ok(sm.v2(v2::ChargingStatusReq::default()));
        let Response::V2(v2::Response {
            body: ResponseBody::ChargingStatus(status),
            ..
        }) = res
        else {
            panic!("expected ChargingStatusRes");
        };
        assert_eq!(status.sa_schedule_tuple_id, 1);
        assert!(status.meter_info.is_some());
        assert_eq!(sm.state(), SessionState::V2(V2State::ChargingStatus));

        sm.ok(sm.v2(stop()));
        assert_eq!(sm.state(), SessionState::V2(V2State::SessionStop));
        assert!(!sm.controller().hlc_charging());

        sm.ok(sm.v2(v2::SessionStopReq {
            charging_session: ChargingSession::Terminate,
        }));
        assert_eq!(sm.state(), SessionState::Terminate);
        assert_eq!(sm.controller().calls().last(), Some(&ControllerCall::StopCharger));
        assert!(sm.observer().events().iter().any(|e| matches!(
            e,
            SessionEvent::PowerDelivery {
                progress: ChargeProgress::Start
            }
        )));
    }

    #[test]
    fn test_unknown_tuple_is_tariff_error() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        discovered(&mut sm);
        let mut req = start(&sm);
        req.sa_schedule_tuple_id = 9;
        let res = sm.step(&sm.v2(req)).unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedTariffSelectionInvalid);
    }

    #[test]
    fn test_start_without_closed_pilot_is_refused() {
        let evse = SimEvseController::default();
        evse.set_cp_state(CpState::B2);
        let mut sm = machine_with(evse, SeccSettings::default());
        discovered(&mut sm);
        let res = sm.step(&sm.v2(start(&sm))).unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedPowerDeliveryNotApplied);
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_pause_remembers_session() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        discovered(&mut sm);
        sm.ok(sm.v2(start(&sm)));
        sm.ok(sm.v2(stop()));
        let id = sm.session().session_id.clone();
        sm.ok(sm.v2(v2::SessionStopReq {
            charging_session: ChargingSession::Pause,
        }));
        assert_eq!(sm.state(), SessionState::Pause);
        assert_eq!(sm.session().paused_session_id, Some(id));
    }
}
