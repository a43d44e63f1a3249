//! ISO 15118-20 handlers.
//!
//! - `setup`: session setup, service discovery and selection
//! - `auth`: authorization setup and authorization
//! - `charge`: charge parameters, schedule exchange, power delivery, charge loop, session stop
//! - `dc`: cable check, pre-charge, welding detection

mod auth;
mod charge;
mod dc;
mod setup;

use anyhow::Result;

use super::HandlerContext;
use crate::controller::EvseController;
use crate::events::SessionObserver;
use crate::protocol::types::EvseStatus;
use crate::protocol::v20::{self, Request as V20Request};
use crate::protocol::{Request, Response};
use crate::state::machine::{Transition, V20State};

impl<C: EvseController, O: SessionObserver> HandlerContext<'_, C, O> {
    pub(crate) fn v20_response(&self, res: impl Into<v20::Response>) -> Response {
        Response::V20(res.into())
    }

    /// EVSEStatus carried by -20 responses.
    pub(crate) fn v20_evse_status(&self) -> Result<EvseStatus> {
        Ok(EvseStatus {
            notification_max_delay: 0,
            evse_notification: self.controller.evse_notification()?,
        })
    }
}

pub(super) fn dispatch<C: EvseController, O: SessionObserver>(
    state: V20State,
    req: &V20Request,
    request: &Request,
    ctx: &mut HandlerContext<'_, C, O>,
) -> Result<Transition> {
    use V20State as S;
    use V20Request as R;

    match (state, req) {
        (S::SessionSetup, R::SessionSetup(body)) => setup::handle_session_setup(ctx, request, body),
        (S::AuthorizationSetup, R::AuthorizationSetup(_)) => {
            auth::handle_authorization_setup(ctx)
        }
        (S::Authorization, R::Authorization(body)) => {
            auth::handle_authorization(ctx, request, body)
        }
        (S::ServiceDiscovery, R::ServiceDiscovery(body)) => {
            setup::handle_service_discovery(ctx, request, body)
        }
        (S::ServiceDetail, R::ServiceDetail(body)) => {
            setup::handle_service_detail(ctx, request, body)
        }
        (S::ServiceDetail, R::ServiceSelection(body)) => {
            setup::handle_service_selection(ctx, request, body)
        }
        (S::ChargeParameterDiscovery, R::AcChargeParameterDiscovery(body)) => {
            charge::handle_ac_charge_parameter_discovery(ctx, request, body)
        }
        (S::ChargeParameterDiscovery, R::DcChargeParameterDiscovery(body)) => {
            charge::handle_dc_charge_parameter_discovery(ctx, request, body)
        }
        (S::ScheduleExchange, R::ScheduleExchange(body)) => {
            charge::handle_schedule_exchange(ctx, request, body)
        }
        (S::DcCableCheck, R::DcCableCheck(_)) => dc::handle_cable_check(ctx, request),
        (S::DcPreCharge, R::DcPreCharge(body)) => dc::handle_pre_charge(ctx, request, body),
        (S::DcPreCharge | S::PowerDelivery | S::ChargeLoop, R::PowerDelivery(body)) => {
            charge::handle_power_delivery(ctx, request, body)
        }
        (S::ChargeLoop, R::AcChargeLoop(body)) => charge::handle_ac_charge_loop(ctx, request, body),
        (S::ChargeLoop, R::DcChargeLoop(body)) => charge::handle_dc_charge_loop(ctx, request, body),
        (S::DcWeldingDetection, R::DcWeldingDetection(body)) => {
            dc::handle_welding_detection(ctx, request, body)
        }
        (
            S::PowerDelivery | S::DcWeldingDetection | S::SessionStop,
            R::SessionStop(body),
        ) => charge::handle_session_stop(ctx, request, body),
        _ => Ok(ctx.sequence_error(request)),
    }
}
