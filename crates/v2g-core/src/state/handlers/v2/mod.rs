//! ISO 15118-2 handlers.
//!
//! - `setup`: session setup, service discovery and selection
//! - `auth`: payment details and authorization
//! - `charge`: charge parameters, power delivery, AC charging, session stop
//! - `dc`: cable check, pre-charge, current demand, welding detection

mod auth;
mod charge;
mod dc;
mod setup;

use anyhow::Result;

use super::HandlerContext;
use crate::controller::EvseController;
use crate::events::SessionObserver;
use crate::protocol::v2::{self, RequestBody};
use crate::protocol::{Request, Response};
use crate::state::machine::{Transition, V2State};

impl<C: EvseController, O: SessionObserver> HandlerContext<'_, C, O> {
    /// Wrap a -2 response body with the session header.
    pub(crate) fn v2_response(&self, body: impl Into<v2::ResponseBody>) -> Response {
        Response::V2(v2::Response::new(self.header(), body))
    }
}

pub(super) fn dispatch<C: EvseController, O: SessionObserver>(
    state: V2State,
    req: &v2::Request,
    request: &Request,
    ctx: &mut HandlerContext<'_, C, O>,
) -> Result<Transition> {
    use V2State as S;

    match (state, &req.body) {
        (S::SessionSetup, RequestBody::SessionSetup(body)) => {
            setup::handle_session_setup(ctx, &req.header, body)
        }
        (S::ServiceDiscovery, RequestBody::ServiceDiscovery(body)) => {
            setup::handle_service_discovery(ctx, body)
        }
        (S::ServiceDetail, RequestBody::ServiceDetail(body)) => {
            setup::handle_service_detail(ctx, request, body)
        }
        (S::ServiceDetail, RequestBody::PaymentServiceSelection(body)) => {
            setup::handle_payment_service_selection(ctx, request, body)
        }
        (S::PaymentDetails, RequestBody::PaymentDetails(body)) => {
            auth::handle_payment_details(ctx, request, body)
        }
        (S::Authorization, RequestBody::Authorization(body)) => {
            auth::handle_authorization(ctx, request, body)
        }
        (S::ChargeParameterDiscovery, RequestBody::ChargeParameterDiscovery(body)) => {
            charge::handle_charge_parameter_discovery(ctx, request, body)
        }
        (S::CableCheck, RequestBody::CableCheck(body)) => dc::handle_cable_check(ctx, request, body),
        (S::PreCharge, RequestBody::PreCharge(body)) => dc::handle_pre_charge(ctx, request, body),
        (
            S::PreCharge | S::PowerDelivery | S::ChargingStatus | S::CurrentDemand,
            RequestBody::PowerDelivery(body),
        ) => charge::handle_power_delivery(ctx, request, body),
        (S::ChargingStatus, RequestBody::ChargingStatus(_)) => charge::handle_charging_status(ctx, request),
        (S::CurrentDemand, RequestBody::CurrentDemand(body)) => {
            dc::handle_current_demand(ctx, request, body)
        }
        (S::PowerDelivery | S::WeldingDetection, RequestBody::WeldingDetection(body)) => {
            dc::handle_welding_detection(ctx, request, body)
        }
        (
            S::PowerDelivery | S::WeldingDetection | S::SessionStop,
            RequestBody::SessionStop(body),
        ) => charge::handle_session_stop(ctx, body),
        _ => Ok(ctx.sequence_error(request)),
    }
}
