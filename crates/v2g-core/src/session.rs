//! SECC session host.
//!
//! Owns a transport and a [`SessionStateMachine`] and runs the message loop:
//! wait for the next request (bounded by the sequence timeout and an external
//! stop signal), answer it, commit the transition, stop on a terminal state.

use std::future::{Future, pending};
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::config::SessionConfig;
use crate::controller::{EvController, EvseController, SimEvseController};
use crate::events::{SessionEvent, SessionObserver, TracingObserver};
use crate::evcc::SimulatedEvcc;
use crate::protocol::types::Protocol;
use crate::protocol::{Request, Response, ResponseCode};
use crate::state::machine::{SessionState, SessionStateMachine};
use crate::tasks::wait_for_tasks;
use crate::transport::{MessageTransport, TransportError, channel_pair};

/// Buffered messages per direction on the loopback link.
const LOOPBACK_CAPACITY: usize = 4;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReason {
    pub successful: bool,
    pub reason: String,
}

impl StopReason {
    pub fn successful(reason: impl Into<String>) -> Self {
        Self {
            successful: true,
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            successful: false,
            reason: reason.into(),
        }
    }
}

enum Wakeup {
    Received(Result<Request, TransportError>),
    Timeout,
    Stop,
}

/// Resolves once `true` is published. A dropped sender never stops the session.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let sender_gone = stop.wait_for(|stopped| *stopped).await.is_err();
    if sender_gone {
        pending::<()>().await;
    }
}

pub struct SeccSession<T, C, O>
where
    T: MessageTransport<Inbound = Request, Outbound = Response>,
    C: EvseController,
    O: SessionObserver,
{
    transport: T,
    machine: SessionStateMachine<C, O>,
    stop: watch::Receiver<bool>,
    sequence_timeout: Duration,
}

impl<T, C, O> SeccSession<T, C, O>
where
    T: MessageTransport<Inbound = Request, Outbound = Response>,
    C: EvseController,
    O: SessionObserver,
{
    pub fn new(transport: T, machine: SessionStateMachine<C, O>, stop: watch::Receiver<bool>) -> Self {
        let sequence_timeout = machine.settings().sequence_timeout;
        Self {
            transport,
            machine,
            stop,
            sequence_timeout,
        }
    }

    pub fn machine(&self) -> &SessionStateMachine<C, O> {
        &self.machine
    }

    /// Run until the session reaches `Pause` or `Terminate`, times out, or
    /// is stopped.
    ///
    /// `Err` means the transport or the charger failed; the session has been
    /// aborted by then.
    #[instrument(skip(self), fields(timeout = ?self.sequence_timeout))]
    pub async fn run(&mut self) -> Result<StopReason> {
        info!("SECC session started");
        loop {
            let wakeup = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => Wakeup::Stop,
                received = self.transport.recv() => Wakeup::Received(received),
                _ = tokio::time::sleep(self.sequence_timeout) => Wakeup::Timeout,
            };

            let request = match wakeup {
                Wakeup::Stop => {
                    warn!(state = %self.machine.state(), "Stop requested");
                    return self.abort(StopReason::failed("stop requested"));
                }
                Wakeup::Timeout => {
                    warn!(state = %self.machine.state(), "Sequence timeout");
                    return self.abort(StopReason::failed("sequence timeout"));
                }
                Wakeup::Received(Err(e)) => {
                    error!(error = %e, state = %self.machine.state(), "Receiving request failed");
                    self.abort_after_error();
                    return Err(anyhow::Error::new(e).context("receiving request"));
                }
                Wakeup::Received(Ok(request)) => request,
            };

            let transition = match self.machine.process_message(&request) {
                Ok(transition) => transition,
                Err(e) => {
                    error!(error = %e, request = %request, "Charger failed while answering");
                    self.abort_after_error();
                    return Err(e.context(format!("processing {request}")));
                }
            };
            let code = transition.response_code();

            if let Err(e) = self.transport.send(transition.response).await {
                error!(error = %e, "Sending response failed");
                self.abort_after_error();
                return Err(anyhow::Error::new(e).context("sending response"));
            }
            self.machine.commit(transition.next_state);

            if self.machine.is_finished() {
                let stop = self.finished(code);
                self.report(&stop);
                return Ok(stop);
            }
        }
    }

    fn finished(&self, last_code: ResponseCode) -> StopReason {
        match self.machine.state() {
            SessionState::Pause => StopReason::successful("session paused"),
            _ if last_code.is_failed() => StopReason::failed(format!("terminated with {last_code}")),
            _ => StopReason::successful("session terminated"),
        }
    }

    fn abort(&mut self, stop: StopReason) -> Result<StopReason> {
        self.machine.abort()?;
        self.report(&stop);
        Ok(stop)
    }

    fn abort_after_error(&mut self) {
        if let Err(e) = self.machine.abort() {
            error!(error = %e, "Abort failed");
        }
        self.report(&StopReason::failed("aborted"));
    }

    fn report(&self, stop: &StopReason) {
        info!(successful = stop.successful, reason = %stop.reason, "SECC session stopped");
        self.machine.observer().on_event(&SessionEvent::Stopped {
            successful: stop.successful,
            reason: stop.reason.clone(),
        });
    }
}

type SessionTask = Pin<Box<dyn Future<Output = Result<StopReason>> + Send>>;

/// Play the EV side until the session is over.
///
/// Only returns on a protocol error; afterwards it idles so the SECC side
/// decides how the session ended.
async fn drive_evcc<E, T>(mut evcc: SimulatedEvcc<E>, mut transport: T) -> Result<StopReason>
where
    E: EvController,
    T: MessageTransport<Inbound = Response, Outbound = Request>,
{
    let mut request = evcc.first_request()?;
    loop {
        if let Err(e) = transport.send(request).await {
            warn!(error = %e, "EVCC could not send");
            break;
        }
        let response = match transport.recv().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "EVCC lost the link");
                break;
            }
        };
        match evcc.next_request(&response)? {
            Some(next) => request = next,
            None => break,
        }
    }
    info!("EVCC finished");
    pending().await
}

/// Run one session between the simulated charger and a simulated EV over an
/// in-memory link.
#[instrument(skip(config, ev, stop), fields(protocol = %protocol))]
pub async fn run_loopback<E>(
    config: &SessionConfig,
    protocol: Protocol,
    ev: E,
    stop: watch::Receiver<bool>,
) -> Result<StopReason>
where
    E: EvController + 'static,
{
    let settings = config.resolve().context("invalid session configuration")?;
    if !settings.protocols.contains(&protocol) {
        bail!("{protocol} is not enabled in the configuration");
    }
    if !protocol.is_implemented() {
        bail!("{protocol} is not implemented");
    }

    let controller =
        SimEvseController::new(config.evse_id.clone()).with_capability_overrides(&config.evse);
    let machine = SessionStateMachine::new(controller, TracingObserver, settings);
    let (secc_link, evcc_link) = channel_pair::<Request, Response>(LOOPBACK_CAPACITY);
    let mut session = SeccSession::new(secc_link, machine, stop);
    let evcc = SimulatedEvcc::new(ev, protocol);

    let tasks: Vec<SessionTask> = vec![
        Box::pin(async move { session.run().await }),
        Box::pin(drive_evcc(evcc, evcc_link)),
    ];
    wait_for_tasks(tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeccSettings;
    use crate::controller::{ControllerCall, SimEvController};
    use crate::events::RecordingObserver;
    use crate::protocol::types::{EnergyTransferMode, ServiceV20};
    use crate::protocol::v2;
    use crate::transport::ChannelTransport;

    type TestSession = SeccSession<
        ChannelTransport<Request, Response>,
        SimEvseController,
        RecordingObserver,
    >;

    fn session_with(
        settings: SeccSettings,
    ) -> (
        TestSession,
        ChannelTransport<Response, Request>,
        watch::Sender<bool>,
    ) {
        let (secc, evcc) = channel_pair::<Request, Response>(4);
        let (stop_tx, stop_rx) = watch::channel(false);
        let machine = SessionStateMachine::new(
            SimEvseController::default(),
            RecordingObserver::new(),
            settings,
        );
        (SeccSession::new(secc, machine, stop_rx), evcc, stop_tx)
    }

    fn short_timeout() -> SeccSettings {
        SeccSettings {
            sequence_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_loopback_v2_ac_session() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let ev = SimEvController::default().with_max_cycles(2);
        let stop = run_loopback(&SessionConfig::default(), Protocol::Iso15118_2, ev, stop_rx)
            .await
            .unwrap();
        assert_eq!(stop, StopReason::successful("session terminated"));
    }

    #[tokio::test]
    async fn test_loopback_v20_dc_session() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let ev = SimEvController::new(EnergyTransferMode::DcExtended, ServiceV20::Dc)
            .with_max_cycles(2);
        let stop = run_loopback(&SessionConfig::default(), Protocol::Iso15118_20Dc, ev, stop_rx)
            .await
            .unwrap();
        assert!(stop.successful, "{stop:?}");
    }

    #[tokio::test]
    async fn test_loopback_rejects_disabled_protocol() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let config = SessionConfig {
            protocols: vec!["ISO_15118_2".to_string()],
            ..Default::default()
        };
        let result = run_loopback(
            &config,
            Protocol::Iso15118_20Ac,
            SimEvController::default(),
            stop_rx,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sequence_timeout_terminates() {
        let (mut session, _evcc, _stop_tx) = session_with(short_timeout());
        let stop = session.run().await.unwrap();
        assert_eq!(stop, StopReason::failed("sequence timeout"));
        assert_eq!(session.machine().state(), SessionState::Terminate);
        assert!(session.machine().observer().events().iter().any(|event| matches!(
            event,
            SessionEvent::Stopped { successful: false, .. }
        )));
    }

    #[tokio::test]
    async fn test_stop_signal_ends_session() {
        let (mut session, _evcc, stop_tx) = session_with(SeccSettings::default());
        stop_tx.send(true).unwrap();
        let stop = session.run().await.unwrap();
        assert_eq!(stop, StopReason::failed("stop requested"));
        assert_eq!(session.machine().state(), SessionState::Terminate);
        // Nothing was established, so the charger is left alone.
        assert!(!session
            .machine()
            .controller()
            .calls()
            .contains(&ControllerCall::StopCharger));
    }

    #[tokio::test]
    async fn test_out_of_sequence_request_fails_session() {
        let (mut session, mut evcc, _stop_tx) = session_with(short_timeout());
        evcc.send(Request::V2(v2::Request::new(
            Default::default(),
            v2::SessionSetupReq {
                evcc_id: "0A0B0C0D0E0F".to_string(),
            },
        )))
        .await
        .unwrap();

        let stop = session.run().await.unwrap();
        assert!(!stop.successful);
        let response = evcc.recv().await.unwrap();
        assert!(response.response_code().is_failed());
    }

    #[tokio::test]
    async fn test_closed_link_is_an_error() {
        let (mut session, evcc, _stop_tx) = session_with(SeccSettings::default());
        drop(evcc);
        assert!(session.run().await.is_err());
        assert_eq!(session.machine().state(), SessionState::Terminate);
    }
}
