//! Request handlers - dispatch logic for each state.
//!
//! This module is split into submodules by protocol:
//! - `app_protocol`: SupportedAppProtocol handshake
//! - `v2`: ISO 15118-2 (setup, authorization, charging, DC-only steps)
//! - `v20`: ISO 15118-20 (same split)

mod app_protocol;
mod v2;
mod v20;

use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

use super::machine::{SessionContext, SessionState, Transition};
use crate::config::SeccSettings;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionEvent, SessionObserver};
use crate::negotiation::NegotiationError;
use crate::protocol::constants::GEN_CHALLENGE_LEN;
use crate::protocol::{MessageHeader, Request, ResponseCode, SessionId, failed_response_for};

/// Handler context containing all resources.
pub struct HandlerContext<'a, C: EvseController, O: SessionObserver> {
    pub controller: &'a C,
    pub observer: &'a O,
    pub settings: &'a SeccSettings,
    pub session: &'a mut SessionContext,
    /// State the request arrived in.
    pub state: SessionState,
}

impl<'a, C: EvseController, O: SessionObserver> HandlerContext<'a, C, O> {
    pub(crate) fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(SessionEvent::Log {
            level,
            message: message.into(),
        });
    }

    /// Header for the outgoing response.
    pub(crate) fn header(&self) -> MessageHeader {
        MessageHeader::new(self.session.session_id.clone())
    }

    /// Minimal response to `request` carrying `code`, then terminate.
    pub(crate) fn fail(&self, request: &Request, code: ResponseCode) -> Transition {
        Transition::terminate(failed_response_for(request, self.header(), code))
    }

    /// EVSE data could not be turned into a response.
    pub(crate) fn negotiation_failed(&self, request: &Request, err: &NegotiationError) -> Transition {
        warn!(state = %self.state, error = %err, "Negotiation failed");
        self.log(LogLevel::Warn, format!("Negotiation failed: {err}"));
        self.fail(request, err.response_code())
    }

    pub(crate) fn sequence_error(&self, request: &Request) -> Transition {
        warn!(state = %self.state, received = %request, "Unexpected request");
        self.emit(SessionEvent::SequenceError {
            state: self.state,
            received: request.kind(),
        });
        self.fail(request, ResponseCode::FailedSequenceError)
    }

    /// Track a run of `Ongoing` answers; true once it has lasted longer
    /// than the ongoing timeout.
    pub(crate) fn ongoing_expired(&mut self) -> bool {
        let since = *self.session.ongoing_since.get_or_insert_with(Instant::now);
        let expired = since.elapsed() >= self.settings.ongoing_timeout;
        if expired {
            warn!(state = %self.state, "Ongoing timeout reached");
            self.log(LogLevel::Warn, format!("{} stayed ongoing too long", self.state));
        }
        expired
    }

    pub(crate) fn ongoing_finished(&mut self) {
        self.session.ongoing_since = None;
    }

    /// Bind the session id requested in SessionSetupReq. Returns the
    /// response code to answer with.
    pub(crate) fn establish_session(&mut self, requested: &SessionId, evcc_id: String) -> ResponseCode {
        let joined = !requested.is_zero()
            && self.session.paused_session_id.as_ref() == Some(requested);
        let (session_id, code) = if joined {
            (requested.clone(), ResponseCode::OkOldSessionJoined)
        } else {
            (SessionId::generate(), ResponseCode::OkNewSessionEstablished)
        };
        info!(session_id = %session_id, joined, evcc_id = %evcc_id, "Session setup");
        self.session.session_id = session_id.clone();
        self.session.paused_session_id = None;
        self.session.evcc_id = Some(evcc_id);
        self.session.established = true;
        self.emit(SessionEvent::SessionEstablished { session_id, joined });
        code
    }

    /// Fresh challenge for PnC, remembered for the echo check.
    pub(crate) fn new_challenge(&mut self) -> Vec<u8> {
        let challenge: Vec<u8> = (0..GEN_CHALLENGE_LEN).map(|_| rand::random::<u8>()).collect();
        self.session.gen_challenge = Some(challenge.clone());
        challenge
    }
}

/// Route a validated request to the handler for the current state.
pub fn dispatch<C: EvseController, O: SessionObserver>(
    request: &Request,
    ctx: &mut HandlerContext<'_, C, O>,
) -> Result<Transition> {
    match (ctx.state, request) {
        (SessionState::SupportedAppProtocol, Request::AppProtocol(req)) => {
            app_protocol::handle_supported_app_protocol(ctx, req)
        }
        (SessionState::V2(state), Request::V2(req)) => v2::dispatch(state, req, request, ctx),
        (SessionState::V20(state), Request::V20(req)) => v20::dispatch(state, req, request, ctx),
        _ => Ok(ctx.sequence_error(request)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for handler tests.

    use crate::config::SeccSettings;
    use crate::controller::{EvChargeParamsV20, EvController, SimEvController, SimEvseController};
    use crate::events::RecordingObserver;
    use crate::protocol::app_protocol::{AppProtocol, SupportedAppProtocolReq};
    use crate::protocol::types::{
        AuthMode, ControlMode, EnergyTransferMode, Protocol, SelectedService, ServiceV20,
    };
    use crate::protocol::validation::{BoundedList, Identifier};
    use crate::protocol::{v2, v20};
    use crate::protocol::{MessageHeader, Request, Response};
    use crate::state::machine::SessionStateMachine;

    pub type TestMachine = SessionStateMachine<SimEvseController, RecordingObserver>;

    pub fn machine_with(controller: SimEvseController, settings: SeccSettings) -> TestMachine {
        SessionStateMachine::new(controller, RecordingObserver::new(), settings)
    }

    pub fn handshake(protocol: Protocol) -> Request {
        let major = if protocol.is_v20() { 1 } else { 2 };
        Request::AppProtocol(SupportedAppProtocolReq {
            app_protocols: BoundedList::new(vec![AppProtocol {
                protocol_namespace: protocol.namespace().to_string(),
                major_version: major,
                minor_version: 0,
                schema_id: 1,
                priority: 1,
            }])
            .unwrap(),
        })
    }

    /// -2 session driven up to ChargeParameterDiscovery with EIM.
    pub fn v2_authorized(sm: &mut TestMachine) {
        sm.ok(handshake(Protocol::Iso15118_2));
        sm.ok(sm.v2(v2::SessionSetupReq {
            evcc_id: "0A0B0C0D0E0F".to_string(),
        }));
        sm.ok(sm.v2(v2::ServiceDiscoveryReq::default()));
        sm.ok(sm.v2(v2::PaymentServiceSelectionReq {
            selected_payment_option: AuthMode::Eim,
            selected_service_list: vec![SelectedService {
                service_id: 1,
                parameter_set_id: None,
            }],
        }));
        sm.ok(sm.v2(v2::AuthorizationReq::default()));
    }

    pub fn v2_charge_parameters(mode: EnergyTransferMode) -> v2::ChargeParameterDiscoveryReq {
        let ev = SimEvController::new(mode, ServiceV20::Ac);
        v2::ChargeParameterDiscoveryReq {
            max_entries_sa_schedule_tuple: None,
            requested_energy_transfer_mode: mode,
            ev_charge_parameter: ev.charge_params_v2().unwrap(),
        }
    }

    /// -20 session driven up to ServiceDiscovery with EIM.
    pub fn v20_authorized(sm: &mut TestMachine, protocol: Protocol) {
        sm.ok(handshake(protocol));
        sm.ok(sm.v20(v20::SessionSetupReq {
            header: sm.header(),
            evcc_id: Identifier::new("WMIV1234567890ABCDEX").unwrap(),
        }));
        sm.ok(sm.v20(v20::AuthorizationSetupReq { header: sm.header() }));
        sm.ok(sm.v20(v20::AuthorizationReq {
            header: sm.header(),
            selected_auth_service: AuthMode::Eim,
            pnc_params: None,
        }));
    }

    /// -20 session with `service` bound under parameter set `set`, waiting
    /// for ChargeParameterDiscovery.
    pub fn v20_selected(sm: &mut TestMachine, protocol: Protocol, service: ServiceV20, set: u16) {
        v20_authorized(sm, protocol);
        sm.ok(sm.v20(v20::ServiceDiscoveryReq {
            header: sm.header(),
            supported_service_ids: None,
        }));
        sm.ok(sm.v20(v20::ServiceDetailReq {
            header: sm.header(),
            service_id: service.id(),
        }));
        sm.ok(sm.v20(v20::ServiceSelectionReq {
            header: sm.header(),
            selected_energy_service: SelectedService {
                service_id: service.id(),
                parameter_set_id: Some(set),
            },
            selected_vas_list: vec![],
        }));
    }

    /// ChargeParameterDiscoveryReq for the selected -20 service.
    pub fn v20_charge_parameters(sm: &TestMachine) -> Request {
        let selected = sm.session().selected_energy_service.clone().unwrap();
        match SimEvController::default().charge_params_v20(&selected).unwrap() {
            EvChargeParamsV20::Ac(params) => sm.v20(v20::AcChargeParameterDiscoveryReq {
                header: sm.header(),
                params,
            }),
            EvChargeParamsV20::Dc(params) => sm.v20(v20::DcChargeParameterDiscoveryReq {
                header: sm.header(),
                params,
            }),
        }
    }

    /// ScheduleExchangeReq shaped by the bound control mode.
    pub fn v20_schedule_exchange(sm: &TestMachine) -> Request {
        let selected = sm.session().selected_energy_service.clone().unwrap();
        let ev = SimEvController::default();
        let params = match sm.session().control_mode {
            Some(ControlMode::Dynamic) => {
                v20::ScheduleExchangeReqParams::Dynamic(ev.dynamic_se_params(&selected).unwrap())
            }
            _ => v20::ScheduleExchangeReqParams::Scheduled(
                ev.scheduled_se_params(&selected).unwrap(),
            ),
        };
        sm.v20(v20::ScheduleExchangeReq {
            header: sm.header(),
            max_supporting_points: 1024,
            params,
        })
    }

    pub trait Drive {
        /// Header carrying the current session id.
        fn header(&self) -> MessageHeader;
        fn v2(&self, body: impl Into<v2::RequestBody>) -> Request;
        fn v20(&self, req: impl Into<v20::Request>) -> Request;
        /// Step and assert the request was not failed.
        fn ok(&mut self, request: Request) -> Response;
    }

    impl Drive for TestMachine {
        fn header(&self) -> MessageHeader {
            MessageHeader::new(self.session().session_id.clone())
        }

        fn v2(&self, body: impl Into<v2::RequestBody>) -> Request {
            Request::V2(v2::Request::new(self.header(), body))
        }

        fn v20(&self, req: impl Into<v20::Request>) -> Request {
            Request::V20(req.into())
        }

        fn ok(&mut self, request: Request) -> Response {
            let res = self.step(&request).unwrap();
            assert!(
                !res.response_code().is_failed(),
                "{request} failed with {}",
                res.response_code()
            );
            res
        }
    }
}
