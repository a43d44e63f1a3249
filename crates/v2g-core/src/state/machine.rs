//! SECC session state machine.
//!
//! [`SessionStateMachine::process_message`] answers one request without
//! moving the committed state; the host sends the response first and then
//! calls [`SessionStateMachine::commit`]. [`SessionStateMachine::step`] does
//! both for callers that do not need the split.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::handlers::{HandlerContext, dispatch};
use crate::config::SeccSettings;
use crate::context::{EvDataContext, EvseDataContext};
use crate::controller::EvseController;
use crate::events::{MessageDirection, SessionEvent, SessionObserver};
use crate::negotiation::OfferedServices;
use crate::protocol::types::{
    AuthMode, ControlMode, EnergyTransferMode, ParameterSet, Protocol, SelectedEnergyService,
    SelectedVas, ServiceV20,
};
use crate::protocol::v2::SaScheduleTuple;
use crate::protocol::{
    MessageHeader, MessageKind, Request, Response, ResponseCode, SessionId, Validate,
    failed_response_for,
};

/// ISO 15118-2 states, named after the request each one waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum V2State {
    SessionSetup,
    ServiceDiscovery,
    ServiceDetail,
    PaymentDetails,
    Authorization,
    ChargeParameterDiscovery,
    CableCheck,
    PreCharge,
    PowerDelivery,
    ChargingStatus,
    CurrentDemand,
    WeldingDetection,
    SessionStop,
}

/// ISO 15118-20 states, named after the request each one waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum V20State {
    SessionSetup,
    AuthorizationSetup,
    Authorization,
    ServiceDiscovery,
    ServiceDetail,
    ChargeParameterDiscovery,
    ScheduleExchange,
    DcCableCheck,
    DcPreCharge,
    PowerDelivery,
    ChargeLoop,
    DcWeldingDetection,
    SessionStop,
}

/// Where the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Waiting for the handshake.
    #[default]
    SupportedAppProtocol,
    V2(V2State),
    V20(V20State),
    /// EV paused; the session id may be joined again later.
    Pause,
    Terminate,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Pause | SessionState::Terminate)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::SupportedAppProtocol => write!(f, "SupportedAppProtocol"),
            SessionState::V2(state) => write!(f, "V2.{state:?}"),
            SessionState::V20(state) => write!(f, "V20.{state:?}"),
            SessionState::Pause => write!(f, "Pause"),
            SessionState::Terminate => write!(f, "Terminate"),
        }
    }
}

/// Everything negotiated so far in one session.
#[derive(Debug, Default)]
pub struct SessionContext {
    pub session_id: SessionId,
    /// SessionSetup answered; header ids are checked from here on.
    pub established: bool,
    /// Id of a previously paused session the EV may rejoin.
    pub paused_session_id: Option<SessionId>,
    pub protocol: Option<Protocol>,
    pub evcc_id: Option<String>,

    pub ev_data: EvDataContext,
    pub evse_data: EvseDataContext,

    pub offered_auth_modes: Vec<AuthMode>,
    pub selected_auth_mode: Option<AuthMode>,
    pub gen_challenge: Option<Vec<u8>>,
    /// EMAID (-2) or contract id (-20) presented for PnC.
    pub contract_id: Option<String>,

    // ISO 15118-2
    pub offered_service_ids_v2: Vec<u16>,
    pub energy_transfer_mode: Option<EnergyTransferMode>,
    pub offered_schedules: Vec<SaScheduleTuple>,
    pub selected_schedule: Option<u8>,

    // ISO 15118-20
    pub offered_services_v20: OfferedServices,
    pub offered_parameter_sets: HashMap<ServiceV20, Vec<ParameterSet>>,
    pub selected_energy_service: Option<SelectedEnergyService>,
    pub selected_vas: Vec<SelectedVas>,
    pub control_mode: Option<ControlMode>,

    /// Start of the current run of `Ongoing` answers.
    pub ongoing_since: Option<Instant>,
}

impl SessionContext {
    /// Whether the negotiated energy transfer is DC.
    pub fn is_dc(&self) -> bool {
        match self.protocol {
            Some(Protocol::Iso15118_20Dc) => true,
            Some(Protocol::Iso15118_20Ac) => false,
            _ => self.energy_transfer_mode.is_some_and(|m| m.is_dc()),
        }
    }

    /// Whether the selected -20 service is bidirectional.
    pub fn is_bpt(&self) -> bool {
        self.selected_energy_service
            .as_ref()
            .is_some_and(|s| s.service.is_bpt())
    }

    fn release(&mut self) {
        self.ev_data = EvDataContext::default();
        self.evse_data = EvseDataContext::default();
        self.ongoing_since = None;
    }
}

/// A response plus where the session goes once it has been sent.
#[derive(Debug, Clone)]
pub struct Transition {
    pub response: Response,
    /// `None` keeps the current state.
    pub next_state: Option<SessionState>,
}

impl Transition {
    pub fn stay(response: impl Into<Response>) -> Self {
        Self {
            response: response.into(),
            next_state: None,
        }
    }

    pub fn to(response: impl Into<Response>, next: SessionState) -> Self {
        Self {
            response: response.into(),
            next_state: Some(next),
        }
    }

    pub fn terminate(response: impl Into<Response>) -> Self {
        Self::to(response, SessionState::Terminate)
    }

    pub fn response_code(&self) -> ResponseCode {
        self.response.response_code()
    }
}

/// The SECC side of one charging session.
pub struct SessionStateMachine<C: EvseController, O: SessionObserver> {
    controller: C,
    observer: O,
    settings: SeccSettings,
    session: SessionContext,
    state: SessionState,
}

impl<C: EvseController, O: SessionObserver> SessionStateMachine<C, O> {
    pub fn new(controller: C, observer: O, settings: SeccSettings) -> Self {
        Self {
            controller,
            observer,
            settings,
            session: SessionContext::default(),
            state: SessionState::SupportedAppProtocol,
        }
    }

    /// Allow the EV to rejoin a session it paused earlier.
    pub fn resume_from(mut self, paused: SessionId) -> Self {
        self.session.paused_session_id = Some(paused);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn settings(&self) -> &SeccSettings {
        &self.settings
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&event);
    }

    fn response_header(&self) -> MessageHeader {
        MessageHeader::new(self.session.session_id.clone())
    }

    /// After SessionSetup every header must carry the established id.
    fn session_mismatch(&self, request: &Request) -> bool {
        if !self.session.established || request.kind() == MessageKind::SessionSetup {
            return false;
        }
        request
            .header()
            .is_some_and(|h| h.session_id != self.session.session_id)
    }

    /// Answer `request` in the current state. The committed state is left
    /// alone; pass the transition's `next_state` to [`Self::commit`] once the
    /// response is out.
    ///
    /// `Err` is reserved for controller failures that abort the session.
    pub fn process_message(&mut self, request: &Request) -> Result<Transition> {
        self.emit(SessionEvent::Message {
            direction: MessageDirection::Rx,
            kind: request.kind(),
            code: None,
        });
        debug!(state = %self.state, request = %request, "Request received");

        let mut transition = if let Err(err) = request.validate() {
            warn!(state = %self.state, error = %err, "Invalid request");
            Transition::terminate(failed_response_for(
                request,
                self.response_header(),
                ResponseCode::Failed,
            ))
        } else if self.session_mismatch(request) {
            warn!(
                expected = %self.session.session_id,
                received = ?request.header().map(|h| h.session_id.as_str()),
                "Unknown session id"
            );
            Transition::terminate(failed_response_for(
                request,
                self.response_header(),
                ResponseCode::FailedUnknownSession,
            ))
        } else {
            let mut ctx = HandlerContext {
                controller: &self.controller,
                observer: &self.observer,
                settings: &self.settings,
                session: &mut self.session,
                state: self.state,
            };
            dispatch(request, &mut ctx)?
        };

        let code = transition.response_code();
        if code.is_failed() {
            warn!(state = %self.state, response = %transition.response, code = %code, "Request failed");
            transition.next_state = Some(SessionState::Terminate);
        }

        self.emit(SessionEvent::Message {
            direction: MessageDirection::Tx,
            kind: transition.response.kind(),
            code: Some(code),
        });
        debug!(response = %transition.response, code = %code, "Response ready");
        Ok(transition)
    }

    /// Move to `next`, if any.
    pub fn commit(&mut self, next: Option<SessionState>) {
        let Some(to) = next else {
            return;
        };
        if to == self.state {
            return;
        }
        info!(from = %self.state, to = %to, "State transition");
        self.emit(SessionEvent::StateChanged {
            from: self.state,
            to,
        });
        self.state = to;
        if to == SessionState::Terminate {
            self.session.release();
        }
    }

    /// Process and commit in one go.
    pub fn step(&mut self, request: &Request) -> Result<Response> {
        let transition = self.process_message(request)?;
        self.commit(transition.next_state);
        Ok(transition.response)
    }

    /// Abort from outside the message flow (timeout, stop signal).
    pub fn abort(&mut self) -> Result<()> {
        if self.session.established {
            self.controller.stop_charger()?;
        }
        self.commit(Some(SessionState::Terminate));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::SimEvseController;
    use crate::events::RecordingObserver;
    use crate::protocol::v2;
    use crate::protocol::validation::BoundedList;
    use crate::protocol::app_protocol::{AppProtocol, SupportedAppProtocolReq};
    use crate::protocol::types::Protocol;

    fn machine() -> SessionStateMachine<SimEvseController, RecordingObserver> {
        SessionStateMachine::new(
            SimEvseController::default(),
            RecordingObserver::new(),
            SeccSettings::default(),
        )
    }

    fn handshake() -> Request {
        Request::AppProtocol(SupportedAppProtocolReq {
            app_protocols: BoundedList::new(vec![AppProtocol {
                protocol_namespace: Protocol::Iso15118_2.namespace().to_string(),
                major_version: 2,
                minor_version: 0,
                schema_id: 1,
                priority: 1,
            }])
            .unwrap(),
        })
    }

    fn v2_request(session_id: SessionId, body: impl Into<v2::RequestBody>) -> Request {
        Request::V2(v2::Request::new(MessageHeader::new(session_id), body))
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::V2(V2State::ServiceDetail).to_string(), "V2.ServiceDetail");
        assert_eq!(SessionState::V20(V20State::ChargeLoop).to_string(), "V20.ChargeLoop");
        assert_eq!(SessionState::Terminate.to_string(), "Terminate");
    }

    #[test]
    fn test_process_does_not_commit() {
        let mut sm = machine();
        let transition = sm.process_message(&handshake()).unwrap();
        assert_eq!(sm.state(), SessionState::SupportedAppProtocol);
        assert_eq!(
            transition.next_state,
            Some(SessionState::V2(V2State::SessionSetup))
        );
        sm.commit(transition.next_state);
        assert_eq!(sm.state(), SessionState::V2(V2State::SessionSetup));
    }

    #[test]
    fn test_unexpected_request_is_sequence_error() {
        let mut sm = machine();
        let res = sm
            .step(&v2_request(SessionId::zero(), v2::ServiceDiscoveryReq::default()))
            .unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedSequenceError);
        assert_eq!(res.kind(), MessageKind::ServiceDiscovery);
        assert_eq!(sm.state(), SessionState::Terminate);
        assert!(sm.is_finished());
    }

    #[test]
    fn test_invalid_request_fails_and_terminates() {
        let mut sm = machine();
        sm.step(&handshake()).unwrap();
        let res = sm
            .step(&v2_request(
                SessionId::zero(),
                v2::SessionSetupReq {
                    evcc_id: "not-hex".to_string(),
                },
            ))
            .unwrap();
        assert_eq!(res.response_code(), ResponseCode::Failed);
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_foreign_session_id_is_rejected() {
        let mut sm = machine();
        sm.step(&handshake()).unwrap();
        sm.step(&v2_request(
            SessionId::zero(),
            v2::SessionSetupReq {
                evcc_id: "0A0B0C0D0E0F".to_string(),
            },
        ))
        .unwrap();
        assert!(sm.session().established);

        let foreign = SessionId::new("1111111111111111").unwrap();
        let res = sm
            .step(&v2_request(foreign, v2::ServiceDiscoveryReq::default()))
            .unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedUnknownSession);
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_commit_emits_and_releases_contexts() {
        let mut sm = machine();
        sm.session.ev_data.max_voltage = Some(400.0);
        sm.commit(Some(SessionState::Terminate));
        sm.commit(Some(SessionState::Terminate));
        assert!(sm.session().ev_data.is_empty());

        let changes: Vec<_> = sm
            .observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::StateChanged { .. }))
            .collect();
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_abort_before_setup_does_not_stop_charger() {
        let mut sm = machine();
        sm.abort().unwrap();
        assert_eq!(sm.state(), SessionState::Terminate);
        assert!(sm.controller().calls().is_empty());
    }
}
