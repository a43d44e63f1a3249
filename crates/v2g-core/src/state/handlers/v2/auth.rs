//! Payment details and authorization.

use anyhow::Result;
use tracing::{info, warn};

use super::super::HandlerContext;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionEvent, SessionObserver};
use crate::protocol::header::now_timestamp;
use crate::protocol::types::{AuthMode, AuthorizationStatus, Processing};
use crate::protocol::v2::{AuthorizationReq, AuthorizationRes, PaymentDetailsReq, PaymentDetailsRes};
use crate::protocol::{Request, ResponseCode};
use crate::state::machine::{SessionState, Transition, V2State};

pub fn handle_payment_details<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &PaymentDetailsReq,
) -> Result<Transition> {
    info!(emaid = %req.emaid.as_str(), "PaymentDetails");
    ctx.log(LogLevel::Info, format!("Contract {} presented", req.emaid.as_str()));

    let emaid = req.emaid.as_str().to_string();
    let response = ctx.controller.is_authorized(AuthMode::Pnc, Some(&emaid))?;
    ctx.session.contract_id = Some(emaid);
    ctx.emit(SessionEvent::Authorization {
        status: response.status,
    });

    if response.status == AuthorizationStatus::Rejected {
        warn!(code = %response.response_code, "Contract rejected");
        return Ok(ctx.fail(request, response.rejection_code()));
    }

    let res = PaymentDetailsRes {
        response_code: ResponseCode::Ok,
        gen_challenge: ctx.new_challenge(),
        evse_timestamp: now_timestamp(),
    };
    Ok(Transition::to(
        ctx.v2_response(res),
        SessionState::V2(V2State::Authorization),
    ))
}

pub fn handle_authorization<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &AuthorizationReq,
) -> Result<Transition> {
    info!("Authorization");
    let mode = ctx.session.selected_auth_mode.unwrap_or(AuthMode::Eim);

    if mode == AuthMode::Pnc && req.gen_challenge != ctx.session.gen_challenge {
        warn!("GenChallenge does not match PaymentDetailsRes");
        ctx.log(LogLevel::Warn, "Challenge mismatch");
        return Ok(ctx.fail(request, ResponseCode::FailedChallengeInvalid));
    }

    let id_token = match mode {
        AuthMode::Pnc => ctx.session.contract_id.clone(),
        AuthMode::Eim => req.id.as_ref().map(|id| id.as_str().to_string()),
    };
    let response = ctx.controller.is_authorized(mode, id_token.as_deref())?;
    ctx.emit(SessionEvent::Authorization {
        status: response.status,
    });

    match response.status {
        AuthorizationStatus::Accepted => {
            ctx.ongoing_finished();
            ctx.log(LogLevel::Info, "Authorization accepted");
            let res = AuthorizationRes {
                response_code: ResponseCode::Ok,
                evse_processing: Processing::Finished,
            };
            Ok(Transition::to(
                ctx.v2_response(res),
                SessionState::V2(V2State::ChargeParameterDiscovery),
            ))
        }
        AuthorizationStatus::Ongoing => {
            if ctx.ongoing_expired() {
                return Ok(ctx.fail(request, ResponseCode::Failed));
            }
            let res = AuthorizationRes {
                response_code: ResponseCode::Ok,
                evse_processing: Processing::Ongoing,
            };
            Ok(Transition::stay(ctx.v2_response(res)))
        }
        AuthorizationStatus::Rejected => {
            warn!(code = %response.response_code, "Authorization rejected");
            ctx.log(LogLevel::Warn, "Authorization rejected");
            Ok(ctx.fail(request, response.rejection_code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::super::test_support::*;
    use crate::config::SeccSettings;
    use crate::controller::{AuthorizationResponse, ControllerCall, SimEvseController};
    use crate::protocol::types::{AuthMode, CertificateChain, Processing, Protocol, SelectedService};
    use crate::protocol::v2::{self, ResponseBody};
    use crate::protocol::validation::Identifier;
    use crate::protocol::{Response, ResponseCode};
    use crate::state::machine::{SessionState, V2State};

    fn to_selection(sm: &mut TestMachine, mode: AuthMode) {
        sm.ok(handshake(Protocol::Iso15118_2));
        sm.ok(sm.v2(v2::SessionSetupReq {
            evcc_id: "0A0B0C0D0E0F".to_string(),
        }));
        sm.ok(sm.v2(v2::ServiceDiscoveryReq::default()));
        sm.ok(sm.v2(v2::PaymentServiceSelectionReq {
            selected_payment_option: mode,
            selected_service_list: vec![SelectedService {
                service_id: 1,
                parameter_set_id: None,
            }],
        }));
    }

    fn payment_details() -> v2::PaymentDetailsReq {
        v2::PaymentDetailsReq {
            emaid: Identifier::new("DE8AA0000000001").unwrap(),
            contract_cert_chain: CertificateChain {
                id: None,
                certificate: vec![0x30, 0x82],
                sub_certificates: vec![],
            },
        }
    }

    fn eim() -> v2::AuthorizationReq {
        v2::AuthorizationReq::default()
    }

    fn processing(res: &Response) -> Processing {
        match res {
            Response::V2(v2::Response {
                body: ResponseBody::Authorization(res),
                ..
            }) => res.evse_processing,
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_accepted_advances() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        to_selection(&mut sm, AuthMode::Eim);
        let res = sm.ok(sm.v2(eim()));
        assert_eq!(processing(&res), Processing::Finished);
        assert_eq!(sm.state(), SessionState::V2(V2State::ChargeParameterDiscovery));
    }

    #[test]
    fn test_ongoing_stays_for_one_more_request() {
        let evse = SimEvseController::default();
        evse.queue_authorization(AuthorizationResponse::ongoing());
        let mut sm = machine_with(evse, SeccSettings::default());
        to_selection(&mut sm, AuthMode::Eim);

        let res = sm.ok(sm.v2(eim()));
        assert_eq!(processing(&res), Processing::Ongoing);
        assert_eq!(sm.state(), SessionState::V2(V2State::Authorization));

        sm.ok(sm.v2(eim()));
        assert_eq!(sm.state(), SessionState::V2(V2State::ChargeParameterDiscovery));
        assert!(sm.session().ongoing_since.is_none());
    }

    #[test]
    fn test_rejected_terminates() {
        let evse = SimEvseController::default();
        evse.queue_authorization(AuthorizationResponse::rejected(ResponseCode::Failed));
        let mut sm = machine_with(evse, SeccSettings::default());
        to_selection(&mut sm, AuthMode::Eim);
        let res = sm.step(&sm.v2(eim())).unwrap();
        assert_eq!(res.response_code(), ResponseCode::Failed);
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_ongoing_timeout_fails() {
        let evse = SimEvseController::default();
        evse.queue_authorization(AuthorizationResponse::ongoing());
        let settings = SeccSettings {
            ongoing_timeout: Duration::ZERO,
            ..Default::default()
        };
        let mut sm = machine_with(evse, settings);
        to_selection(&mut sm, AuthMode::Eim);
        let res = sm.step(&sm.v2(eim())).unwrap();
        assert_eq!(res.response_code(), ResponseCode::Failed);
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_pnc_challenge_round_trip() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        to_selection(&mut sm, AuthMode::Pnc);
        sm.ok(sm.v2(payment_details()));
        assert_eq!(sm.state(), SessionState::V2(V2State::Authorization));
        let challenge = sm.session().gen_challenge.clone();
        assert_eq!(challenge.as_ref().map(Vec::len), Some(16));

        sm.ok(sm.v2(v2::AuthorizationReq {
            id: None,
            gen_challenge: challenge,
        }));
        assert_eq!(sm.state(), SessionState::V2(V2State::ChargeParameterDiscovery));
        assert!(sm.controller().calls().contains(&ControllerCall::IsAuthorized {
            mode: AuthMode::Pnc,
            id_token: Some("DE8AA0000000001".to_string()),
        }));
    }

    #[test]
    fn test_pnc_wrong_challenge_fails() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        to_selection(&mut sm, AuthMode::Pnc);
        sm.ok(sm.v2(payment_details()));
        let res = sm
            .step(&sm.v2(v2::AuthorizationReq {
                id: None,
                gen_challenge: Some(vec![0; 16]),
            }))
            .unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedChallengeInvalid);
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_rejected_contract_terminates_payment_details() {
        let evse = SimEvseController::default();
        evse.queue_authorization(AuthorizationResponse::rejected(
            ResponseCode::FailedCertificateRevoked,
        ));
        let mut sm = machine_with(evse, SeccSettings::default());
        to_selection(&mut sm, AuthMode::Pnc);
        let res = sm.step(&sm.v2(payment_details())).unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedCertificateRevoked);
        assert_eq!(sm.state(), SessionState::Terminate);
    }
}
