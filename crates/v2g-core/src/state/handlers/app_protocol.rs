//! SupportedAppProtocol handshake handler.

use anyhow::Result;
use tracing::{info, warn};

use super::HandlerContext;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionEvent, SessionObserver};
use crate::negotiation::negotiate_app_protocol;
use crate::protocol::app_protocol::{SupportedAppProtocolReq, SupportedAppProtocolRes};
use crate::state::machine::{SessionState, Transition, V2State, V20State};

pub fn handle_supported_app_protocol<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    req: &SupportedAppProtocolReq,
) -> Result<Transition> {
    info!(offered = req.app_protocols.len(), "SupportedAppProtocol");
    ctx.log(LogLevel::Info, "Negotiating application protocol");

    let negotiated = match negotiate_app_protocol(&ctx.settings.protocols, req) {
        Ok(negotiated) => negotiated,
        Err(code) => {
            warn!("No offered application protocol is supported");
            ctx.log(LogLevel::Warn, "No common application protocol");
            return Ok(Transition::terminate(SupportedAppProtocolRes {
                response_code: code,
                schema_id: None,
            }));
        }
    };

    ctx.session.protocol = Some(negotiated.protocol);
    ctx.emit(SessionEvent::ProtocolNegotiated {
        protocol: negotiated.protocol,
        schema_id: negotiated.schema_id,
    });
    let next = if negotiated.protocol.is_v20() {
        SessionState::V20(V20State::SessionSetup)
    } else {
        SessionState::V2(V2State::SessionSetup)
    };
    Ok(Transition::to(
        SupportedAppProtocolRes {
            response_code: negotiated.response_code,
            schema_id: Some(negotiated.schema_id),
        },
        next,
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::config::SeccSettings;
    use crate::controller::SimEvseController;
    use crate::protocol::ResponseCode;
    use crate::protocol::types::Protocol;
    use crate::state::machine::{SessionState, V20State};

    #[test]
    fn test_v20_handshake() {
        let mut sm = machine_with(SimEvseController::default(), SeccSettings::default());
        let res = sm.ok(handshake(Protocol::Iso15118_20Dc));
        assert_eq!(res.response_code(), ResponseCode::OkSuccessfulNegotiation);
        assert_eq!(sm.state(), SessionState::V20(V20State::SessionSetup));
        assert_eq!(sm.session().protocol, Some(Protocol::Iso15118_20Dc));
    }

    #[test]
    fn test_unconfigured_protocol_terminates() {
        let settings = SeccSettings {
            protocols: vec![Protocol::Iso15118_2],
            ..Default::default()
        };
        let mut sm = machine_with(SimEvseController::default(), settings);
        let res = sm.step(&handshake(Protocol::Iso15118_20Ac)).unwrap();
        assert_eq!(res.response_code(), ResponseCode::FailedNoNegotiation);
        assert_eq!(sm.state(), SessionState::Terminate);
    }
}
