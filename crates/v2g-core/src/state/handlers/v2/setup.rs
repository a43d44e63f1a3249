//! Session setup and service negotiation.

use anyhow::Result;
use tracing::{info, warn};

use super::super::HandlerContext;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionObserver};
use crate::negotiation::service::{
    V2_CHARGE_SERVICE_ID, V2_INTERNET_SERVICE_ID, check_service_detail_v2, parameter_sets_v2,
    select_services_v2,
};
use crate::protocol::header::now_timestamp;
use crate::protocol::types::{AuthMode, Protocol, ServiceV20};
use crate::protocol::v2::{
    ChargeService, PaymentServiceSelectionReq, PaymentServiceSelectionRes, ServiceCategory,
    ServiceDetailReq, ServiceDetailRes, ServiceDiscoveryReq, ServiceDiscoveryRes,
    ServiceSummary, SessionSetupReq, SessionSetupRes,
};
use crate::protocol::{MessageHeader, Request, ResponseCode};
use crate::state::machine::{SessionState, Transition, V2State};

pub fn handle_session_setup<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    header: &MessageHeader,
    req: &SessionSetupReq,
) -> Result<Transition> {
    info!(evcc_id = %req.evcc_id, "SessionSetup");
    ctx.log(LogLevel::Info, format!("SessionSetup from EVCC {}", req.evcc_id));

    let code = ctx.establish_session(&header.session_id, req.evcc_id.clone());
    let evse_id = ctx.controller.evse_id(Protocol::Iso15118_2)?;
    let res = SessionSetupRes {
        response_code: code,
        evse_id,
        evse_timestamp: Some(now_timestamp()),
    };
    Ok(Transition::to(
        ctx.v2_response(res),
        SessionState::V2(V2State::ServiceDiscovery),
    ))
}

pub fn handle_service_discovery<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    req: &ServiceDiscoveryReq,
) -> Result<Transition> {
    info!(category = ?req.service_category, "ServiceDiscovery");
    ctx.log(LogLevel::Info, "Announcing charge service");

    let modes = ctx.controller.supported_energy_transfer_modes()?;
    let internet_offered = ctx.settings.energy_services.contains(&ServiceV20::Internet)
        && ctx.controller.offered_energy_services()?.contains(&ServiceV20::Internet)
        && matches!(req.service_category, None | Some(ServiceCategory::Internet));

    let mut service_list = Vec::new();
    if internet_offered {
        service_list.push(ServiceSummary {
            service_id: V2_INTERNET_SERVICE_ID,
            service_name: None,
            service_category: ServiceCategory::Internet,
            free_service: true,
        });
    }

    ctx.session.offered_auth_modes = ctx.settings.auth_modes.clone();
    ctx.session.offered_service_ids_v2 = std::iter::once(V2_CHARGE_SERVICE_ID)
        .chain(service_list.iter().map(|s| s.service_id))
        .collect();

    let res = ServiceDiscoveryRes {
        response_code: ResponseCode::Ok,
        payment_option_list: ctx.session.offered_auth_modes.clone(),
        charge_service: ChargeService {
            service_id: V2_CHARGE_SERVICE_ID,
            service_name: None,
            service_category: ServiceCategory::EvCharging,
            free_service: ctx.settings.free_charging_service,
            supported_energy_transfer_modes: modes,
        },
        service_list,
    };
    Ok(Transition::to(
        ctx.v2_response(res),
        SessionState::V2(V2State::ServiceDetail),
    ))
}

pub fn handle_service_detail<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &ServiceDetailReq,
) -> Result<Transition> {
    info!(service_id = req.service_id, "ServiceDetail");

    if let Err(code) = check_service_detail_v2(&ctx.session.offered_service_ids_v2, req.service_id) {
        warn!(service_id = req.service_id, "ServiceDetail for a service that was not offered");
        return Ok(ctx.fail(request, code));
    }
    let res = ServiceDetailRes {
        response_code: ResponseCode::Ok,
        service_id: req.service_id,
        service_parameter_list: parameter_sets_v2(req.service_id)?,
    };
    Ok(Transition::stay(ctx.v2_response(res)))
}

pub fn handle_payment_service_selection<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &PaymentServiceSelectionReq,
) -> Result<Transition> {
    info!(payment = ?req.selected_payment_option, "PaymentServiceSelection");
    ctx.log(
        LogLevel::Info,
        format!("EV selected {}", req.selected_payment_option.name()),
    );

    if let Err(code) = select_services_v2(
        &ctx.session.offered_auth_modes,
        &ctx.session.offered_service_ids_v2,
        req,
    ) {
        warn!(code = %code, "Payment/service selection rejected");
        return Ok(ctx.fail(request, code));
    }

    ctx.session.selected_auth_mode = Some(req.selected_payment_option);
    let next = match req.selected_payment_option {
        AuthMode::Eim => V2State::Authorization,
        AuthMode::Pnc => V2State::PaymentDetails,
    };
    let res = PaymentServiceSelectionRes {
        response_code: ResponseCode::Ok,
    };
    Ok(Transition::to(ctx.v2_response(res), SessionState::V2(next)))
}

#[cfg(test)]
mod tests {
    use super::super::super::test_support::*;
    use crate::config::SeccSettings;
    use crate::controller::SimEvseController;
    use crate::protocol::header::SessionId;
    use crate::protocol::types::{AuthMode, Protocol, SelectedService, ServiceV20};
    use crate::protocol::v2::{self, ResponseBody};
    use crate::protocol::{MessageHeader, Request, Response, ResponseCode};
    use crate::state::machine::{SessionState, V2State};

    fn setup(sm: &mut TestMachine) -> Response {
        sm.ok(handshake(Protocol::Iso15118_2));
        sm.ok(sm.v2(v2::SessionSetupReq {
            evcc_id: "0A0B0C0D0E0F".to_string(),
        }))
    }

    fn selection(option: AuthMode, ids: &[u16]) -> v2::PaymentServiceSelectionReq {
        v2::PaymentServiceSelectionReq {
            selected_payment_option: option,
            selected_service_list: ids
                .iter()
                .map(|&service_id| SelectedService {
                    service_id,
                    parameter_set_id: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_new_session_gets_fresh_id() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        let res = setup(&mut sm);
        assert_eq!(res.response_code(), ResponseCode::OkNewSessionEstablished);
        assert!(!sm.session().session_id.is_zero());
        let Response::V2(res) = res else {
            panic!("expected a -2 response");
        };
        assert_eq!(res.header.session_id, sm.session().session_id);
        assert_eq!(sm.state(), SessionState::V2(V2State::ServiceDiscovery));
    }

    #[test]
    fn test_paused_session_is_joined() {
        let paused = SessionId::new("0102030405060708").unwrap();
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default())
            .resume_from(paused.clone());
        sm.ok(handshake(Protocol::Iso15118_2));
        let res = sm.ok(Request::V2(v2::Request::new(
            MessageHeader::new(paused.clone()),
            v2::SessionSetupReq {
                evcc_id: "0A0B0C0D0E0F".to_string(),
            },
        )));
        assert_eq!(res.response_code(), ResponseCode::OkOldSessionJoined);
        assert_eq!(sm.session().session_id, paused);
    }

    #[test]
    fn test_discovery_then_eim_selection() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        setup(&mut sm);
        let res = sm.ok(sm.v2(v2::ServiceDiscoveryReq::default()));
        let Response::V2(v2::Response {
            body: ResponseBody::ServiceDiscovery(res),
            ..
        }) = res
        else {
            panic!("expected ServiceDiscoveryRes");
        };
        assert_eq!(res.charge_service.service_id, 1);
        assert_eq!(res.payment_option_list, vec![AuthMode::Eim, AuthMode::Pnc]);
        assert!(res.service_list.is_empty());

        sm.ok(sm.v2(selection(AuthMode::Eim, &[1])));
        assert_eq!(sm.state(), SessionState::V2(V2State::Authorization));
        assert_eq!(sm.session().selected_auth_mode, Some(AuthMode::Eim));
    }

    #[test]
    fn test_pnc_selection_goes_to_payment_details() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        setup(&mut sm);
        sm.ok(sm.v2(v2::ServiceDiscoveryReq::default()));
        sm.ok(sm.v2(selection(AuthMode::Pnc, &[1])));
        assert_eq!(sm.state(), SessionState::V2(V2State::PaymentDetails));
    }

    #[test]
    fn test_unknown_service_detail_fails() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        setup(&mut sm);
        sm.ok(sm.v2(v2::ServiceDiscoveryReq::default()));
        let transition = sm
            .process_message(&sm.v2(v2::ServiceDetailReq { service_id: 3 }))
            .unwrap();
        assert_eq!(transition.response_code(), ResponseCode::FailedServiceIdInvalid);
        assert_eq!(sm.state(), SessionState::V2(V2State::ServiceDetail));
        assert_eq!(transition.next_state, Some(SessionState::Terminate));
    }

    #[test]
    fn test_repeated_discovery_is_sequence_error() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        setup(&mut sm);
        sm.ok(sm.v2(v2::ServiceDiscoveryReq::default()));
        let res = sm.step(&sm.v2(v2::ServiceDiscoveryReq::default())).unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedSequenceError);
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_internet_vas_offered_when_configured() {
        let mut settings = SeccSettings::default();
        settings.energy_services.push(ServiceV20::Internet);
        let mut sm = machine_with(SimEvseController::default(), settings);
        setup(&mut sm);
        sm.ok(sm.v2(v2::ServiceDiscoveryReq::default()));
        assert_eq!(sm.session().offered_service_ids_v2, vec![1, 3]);

        let res = sm.ok(sm.v2(v2::ServiceDetailReq { service_id: 3 }));
        let Response::V2(v2::Response {
            body: ResponseBody::ServiceDetail(res),
            ..
        }) = res
        else {
            panic!("expected ServiceDetailRes");
        };
        assert_eq!(res.service_parameter_list.len(), 2);
        assert_eq!(sm.state(), SessionState::V2(V2State::ServiceDetail));

        let bad = sm.step(&sm.v2(selection(AuthMode::Eim, &[3]))).unwrap();
        assert_eq!(bad.response_code(), ResponseCode::FailedNoChargeServiceSelected);
    }
}
