//! Controller abstraction traits.

use thiserror::Error;

use crate::context::{EvseDataContext, EvseUpdate};
use crate::protocol::ResponseCode;
use crate::protocol::types::{
    AuthMode, AuthorizationStatus, ChargeProgress, ControlMode, CpState, EnergyTransferMode,
    EvseNotification, MeterInfo, ParameterSet, Processing, Protocol, SelectedEnergyService,
    SelectedVas, ServiceV20,
};
use crate::protocol::v2::{
    AcEvseStatus, ChargingProfile, DcEvseStatus, EvChargeParameter, SaScheduleTuple,
};
use crate::protocol::v20::{
    AcCpdReqParamsKind, DcCpdReqParamsKind, DynamicScheduleExchangeReqParams,
    ScheduledScheduleExchangeReqParams,
};
use crate::protocol::validation::ValidationError;
use crate::rational::RangeError;

/// Controller errors.
///
/// These abort the session: a charger that cannot answer is not a protocol
/// condition the EV can be told about.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Controller unavailable: {0}")]
    Unavailable(String),

    #[error("No value published for {0}")]
    NotPublished(&'static str),

    #[error("Unsupported by this controller: {0}")]
    Unsupported(String),

    #[error("Invalid controller data: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Controller value out of range: {0}")]
    Range(#[from] RangeError),
}

/// Answer to an authorization query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub status: AuthorizationStatus,
    /// Code to send when the status is `Rejected`.
    pub response_code: ResponseCode,
}

impl AuthorizationResponse {
    pub fn accepted() -> Self {
        Self {
            status: AuthorizationStatus::Accepted,
            response_code: ResponseCode::Ok,
        }
    }

    pub fn ongoing() -> Self {
        Self {
            status: AuthorizationStatus::Ongoing,
            response_code: ResponseCode::Ok,
        }
    }

    pub fn rejected(response_code: ResponseCode) -> Self {
        Self {
            status: AuthorizationStatus::Rejected,
            response_code,
        }
    }

    /// Code to answer a rejection with; always a failure.
    pub fn rejection_code(&self) -> ResponseCode {
        if self.response_code.is_failed() {
            self.response_code
        } else {
            ResponseCode::Failed
        }
    }
}

/// Charger-side capability interface used by the SECC state machine.
///
/// All methods are synchronous: implementations keep their own state
/// behind interior mutability and answer from it.
///
/// Implementations:
/// - [`SimEvseController`](super::SimEvseController): scripted, for tests and simulation
/// - [`ExternalEvseController`](super::ExternalEvseController): fed by a charger driver
pub trait EvseController: Send + Sync {
    /// EVSEID announced in SessionSetupRes.
    fn evse_id(&self, protocol: Protocol) -> Result<String, ControllerError>;

    /// Capability snapshot: limits, nominal values, ramp and ripple figures.
    fn data_context(&self) -> Result<EvseDataContext, ControllerError>;

    /// Present and target values for the charge loop.
    fn present_values(&self) -> Result<EvseUpdate, ControllerError>;

    /// Most recently observed control pilot state.
    fn cp_state(&self) -> Result<CpState, ControllerError>;

    /// Authorization decision for `mode`, with the contract id for PnC.
    fn is_authorized(
        &self,
        mode: AuthMode,
        id_token: Option<&str>,
    ) -> Result<AuthorizationResponse, ControllerError>;

    /// -20 services the charger can deliver right now.
    fn offered_energy_services(&self) -> Result<Vec<ServiceV20>, ControllerError>;

    /// -2 energy transfer modes the charger supports.
    fn supported_energy_transfer_modes(&self) -> Result<Vec<EnergyTransferMode>, ControllerError>;

    /// Parameter sets for `service`, most preferred last.
    fn service_parameter_sets(
        &self,
        service: ServiceV20,
    ) -> Result<Vec<ParameterSet>, ControllerError>;

    fn supported_control_modes(&self) -> Result<Vec<ControlMode>, ControllerError>;

    fn set_control_mode(&self, mode: ControlMode) -> Result<(), ControllerError>;

    /// Tell the charger whether high-level-communication charging is active.
    fn set_hlc_charging(&self, enabled: bool) -> Result<(), ControllerError>;

    /// Schedules to offer instead of the default one, if the charger has any.
    fn sa_schedules(
        &self,
        _departure_time: Option<u32>,
    ) -> Result<Option<Vec<SaScheduleTuple>>, ControllerError> {
        Ok(None)
    }

    fn cable_check_status(&self) -> Result<Processing, ControllerError>;

    /// Whether the -20 schedule is ready to hand out.
    fn schedule_exchange_status(&self) -> Result<Processing, ControllerError> {
        Ok(Processing::Finished)
    }

    fn evse_notification(&self) -> Result<EvseNotification, ControllerError>;

    fn ac_evse_status(&self) -> Result<AcEvseStatus, ControllerError>;

    fn dc_evse_status(&self) -> Result<DcEvseStatus, ControllerError>;

    fn meter_info(&self) -> Result<Option<MeterInfo>, ControllerError> {
        Ok(None)
    }

    /// Open contactors and stop energy transfer.
    fn stop_charger(&self) -> Result<(), ControllerError>;
}

/// -20 charge parameters of the EV, shaped by the selected service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvChargeParamsV20 {
    Ac(AcCpdReqParamsKind),
    Dc(DcCpdReqParamsKind),
}

/// Vehicle-side decisions used by the simulated EVCC.
pub trait EvController: Send + Sync {
    fn evcc_id(&self, protocol: Protocol) -> Result<String, ControllerError>;

    /// -2 energy transfer mode to request.
    fn energy_transfer_mode(&self) -> EnergyTransferMode;

    /// -20 energy service to select when offered.
    fn energy_service(&self) -> ServiceV20;

    /// Bind `service`, taking the last offered parameter set.
    fn select_energy_service_v20(
        &self,
        service: ServiceV20,
        is_free: bool,
        parameter_sets: Vec<ParameterSet>,
    ) -> Result<SelectedEnergyService, ControllerError>;

    /// Bind a value-added service, taking the last offered parameter set.
    fn select_vas_v20(
        &self,
        service: ServiceV20,
        is_free: bool,
        parameter_sets: Vec<ParameterSet>,
    ) -> Result<Option<SelectedVas>, ControllerError>;

    fn charge_params_v2(&self) -> Result<EvChargeParameter, ControllerError>;

    fn charge_params_v20(
        &self,
        selected: &SelectedEnergyService,
    ) -> Result<EvChargeParamsV20, ControllerError>;

    fn scheduled_se_params(
        &self,
        selected: &SelectedEnergyService,
    ) -> Result<ScheduledScheduleExchangeReqParams, ControllerError>;

    fn dynamic_se_params(
        &self,
        selected: &SelectedEnergyService,
    ) -> Result<DynamicScheduleExchangeReqParams, ControllerError>;

    /// Pick a schedule and derive the charging profile for PowerDeliveryReq.
    fn process_sa_schedules(
        &self,
        schedules: &[SaScheduleTuple],
    ) -> Result<(ChargeProgress, u8, ChargingProfile), ControllerError>;

    /// Asked once per charge loop cycle.
    fn continue_charging(&self) -> bool;
}
