//! Authorization setup and authorization.

use anyhow::Result;
use tracing::{info, warn};

use super::super::HandlerContext;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionEvent, SessionObserver};
use crate::protocol::types::{AuthMode, AuthorizationStatus, Processing};
use crate::protocol::v20::{AuthorizationReq, AuthorizationRes, AuthorizationSetupRes};
use crate::protocol::{Request, ResponseCode};
use crate::state::machine::{SessionState, Transition, V20State};

pub fn handle_authorization_setup<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
) -> Result<Transition> {
    info!(modes = ?ctx.settings.auth_modes, "AuthorizationSetup");

    ctx.session.offered_auth_modes = ctx.settings.auth_modes.clone();
    let gen_challenge = ctx
        .session
        .offered_auth_modes
        .contains(&AuthMode::Pnc)
        .then(|| ctx.new_challenge());

    let res = AuthorizationSetupRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        auth_services: ctx.session.offered_auth_modes.clone(),
        cert_install_service: false,
        gen_challenge,
    };
    Ok(Transition::to(
        ctx.v20_response(res),
        SessionState::V20(V20State::Authorization),
    ))
}

fn authorization_res<C: EvseController, O: SessionObserver>(
    ctx: &HandlerContext<'_, C, O>,
    response_code: ResponseCode,
    evse_processing: Processing,
) -> AuthorizationRes {
    AuthorizationRes {
        header: ctx.header(),
        response_code,
        evse_processing,
    }
}

pub fn handle_authorization<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &AuthorizationReq,
) -> Result<Transition> {
    let mode = req.selected_auth_service;
    info!(mode = ?mode, "Authorization");

    if !ctx.session.offered_auth_modes.contains(&mode) {
        warn!(mode = ?mode, "Authorization service was not offered");
        let res = authorization_res(
            ctx,
            ResponseCode::WarningAuthorizationSelectionInvalid,
            Processing::Finished,
        );
        return Ok(Transition::stay(ctx.v20_response(res)));
    }
    ctx.session.selected_auth_mode = Some(mode);

    let id_token = match &req.pnc_params {
        Some(pnc) => {
            if ctx.session.gen_challenge.as_deref() != Some(pnc.gen_challenge.as_slice()) {
                warn!("GenChallenge does not match AuthorizationSetupRes");
                ctx.log(LogLevel::Warn, "Challenge mismatch");
                return Ok(ctx.fail(request, ResponseCode::FailedChallengeInvalid));
            }
            let id = pnc.id.as_str().to_string();
            ctx.session.contract_id = Some(id.clone());
            Some(id)
        }
        None => None,
    };

    let response = ctx.controller.is_authorized(mode, id_token.as_deref())?;
    ctx.emit(SessionEvent::Authorization {
        status: response.status,
    });

    match response.status {
        AuthorizationStatus::Accepted => {
            ctx.ongoing_finished();
            ctx.log(LogLevel::Info, "Authorization accepted");
            let res = authorization_res(ctx, ResponseCode::Ok, Processing::Finished);
            Ok(Transition::to(
                ctx.v20_response(res),
                SessionState::V20(V20State::ServiceDiscovery),
            ))
        }
        AuthorizationStatus::Ongoing => {
            if ctx.ongoing_expired() {
                return Ok(ctx.fail(request, ResponseCode::Failed));
            }
            let res = authorization_res(ctx, ResponseCode::Ok, Processing::Ongoing);
            Ok(Transition::stay(ctx.v20_response(res)))
        }
        AuthorizationStatus::Rejected => {
            warn!(code = %response.response_code, "Authorization rejected");
            ctx.log(LogLevel::Warn, "Authorization rejected");
            Ok(ctx.fail(request, response.rejection_code()))
        }
    }
}
