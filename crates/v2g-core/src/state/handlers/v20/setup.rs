//! Session setup and service negotiation.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::super::HandlerContext;
use crate::controller::EvseController;
use crate::events::{LogLevel, SessionObserver};
use crate::negotiation::service::{
    check_service_detail_v20, offer_services_v20, select_services_v20,
};
use crate::protocol::v20::{
    ServiceDetailReq, ServiceDetailRes, ServiceDiscoveryReq, ServiceDiscoveryRes,
    ServiceSelectionReq, ServiceSelectionRes, SessionSetupReq, SessionSetupRes,
};
use crate::protocol::validation::{BoundedList, Identifier};
use crate::protocol::{Request, ResponseCode};
use crate::state::machine::{SessionState, Transition, V20State};

pub fn handle_session_setup<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &SessionSetupReq,
) -> Result<Transition> {
    info!(evcc_id = %req.evcc_id.as_str(), "SessionSetup");
    ctx.log(
        LogLevel::Info,
        format!("SessionSetup from EVCC {}", req.evcc_id.as_str()),
    );

    let code = ctx.establish_session(&req.header.session_id, req.evcc_id.as_str().to_string());
    let protocol = ctx
        .session
        .protocol
        .context("SessionSetup before protocol negotiation")?;
    let evse_id = match Identifier::new(ctx.controller.evse_id(protocol)?) {
        Ok(id) => id,
        Err(err) => return Ok(ctx.negotiation_failed(request, &err.into())),
    };
    let res = SessionSetupRes {
        header: ctx.header(),
        response_code: code,
        evse_id,
    };
    Ok(Transition::to(
        ctx.v20_response(res),
        SessionState::V20(V20State::AuthorizationSetup),
    ))
}

pub fn handle_service_discovery<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &ServiceDiscoveryReq,
) -> Result<Transition> {
    info!(ev_ids = ?req.supported_service_ids, "ServiceDiscovery");

    let offered = offer_services_v20(
        &ctx.settings.energy_services,
        &ctx.controller.offered_energy_services()?,
        req.supported_service_ids.as_deref(),
        ctx.settings.free_charging_service,
    );
    if offered.energy.is_empty() {
        warn!("No energy service left to offer");
        ctx.log(LogLevel::Warn, "No common energy service");
        return Ok(ctx.fail(request, ResponseCode::Failed));
    }
    debug!(energy = offered.energy.len(), vas = offered.vas.len(), "Services offered");

    let res = ServiceDiscoveryRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        service_renegotiation_supported: false,
        energy_service_list: offered.energy.clone(),
        vas_list: offered.vas.clone(),
    };
    ctx.session.offered_services_v20 = offered;
    Ok(Transition::to(
        ctx.v20_response(res),
        SessionState::V20(V20State::ServiceDetail),
    ))
}

pub fn handle_service_detail<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &ServiceDetailReq,
) -> Result<Transition> {
    info!(service_id = req.service_id, "ServiceDetail");

    let service = match check_service_detail_v20(&ctx.session.offered_services_v20, req.service_id)
    {
        Ok(service) => service,
        Err(code) => {
            warn!(service_id = req.service_id, "ServiceDetail for a service that was not offered");
            return Ok(ctx.fail(request, code));
        }
    };
    let sets = ctx.controller.service_parameter_sets(service)?;
    let Ok(service_parameter_list) = BoundedList::new(sets.clone()) else {
        warn!(service = %service, count = sets.len(), "Too many parameter sets");
        return Ok(ctx.fail(request, ResponseCode::Failed));
    };
    ctx.session.offered_parameter_sets.insert(service, sets);

    let res = ServiceDetailRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
        service_id: req.service_id,
        service_parameter_list,
    };
    Ok(Transition::stay(ctx.v20_response(res)))
}

pub fn handle_service_selection<C: EvseController, O: SessionObserver>(
    ctx: &mut HandlerContext<'_, C, O>,
    request: &Request,
    req: &ServiceSelectionReq,
) -> Result<Transition> {
    info!(
        service_id = req.selected_energy_service.service_id,
        parameter_set = ?req.selected_energy_service.parameter_set_id,
        "ServiceSelection"
    );

    let (energy, vas) = match select_services_v20(
        &ctx.session.offered_services_v20,
        &ctx.session.offered_parameter_sets,
        req,
    ) {
        Ok(selected) => selected,
        Err(code) => {
            warn!(code = %code, "Service selection rejected");
            return Ok(ctx.fail(request, code));
        }
    };

    let supported = ctx.controller.supported_control_modes()?;
    let control_mode = energy.control_mode().or_else(|| {
        ctx.settings
            .control_modes
            .iter()
            .copied()
            .find(|mode| supported.contains(mode))
    });
    let Some(control_mode) = control_mode else {
        warn!("No control mode in common with the charger");
        return Ok(ctx.fail(request, ResponseCode::FailedServiceSelectionInvalid));
    };
    ctx.controller.set_control_mode(control_mode)?;
    ctx.log(
        LogLevel::Info,
        format!("Selected {} ({control_mode:?})", energy.service),
    );

    ctx.session.selected_energy_service = Some(energy);
    ctx.session.selected_vas = vas;
    ctx.session.control_mode = Some(control_mode);

    let res = ServiceSelectionRes {
        header: ctx.header(),
        response_code: ResponseCode::Ok,
    };
    Ok(Transition::to(
        ctx.v20_response(res),
        SessionState::V20(V20State::ChargeParameterDiscovery),
    ))
}
