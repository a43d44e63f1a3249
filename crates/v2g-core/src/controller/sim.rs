//! Scripted EVSE controller for testing and simulation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::traits::{AuthorizationResponse, ControllerError, EvseController};
use crate::context::{EvseDataContext, EvseUpdate};
use crate::negotiation::service::default_parameter_sets;
use crate::protocol::types::{
    AuthMode, ControlMode, CpState, EnergyTransferMode, EvseNotification, MeterInfo, ParameterSet,
    Processing, Protocol, ServiceV20,
};
use crate::protocol::v2::{AcEvseStatus, DcEvseStatus, SaScheduleTuple};
use crate::protocol::validation::MeterId;

/// Side effects requested by the state machine, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCall {
    IsAuthorized {
        mode: AuthMode,
        id_token: Option<String>,
    },
    SetHlcCharging(bool),
    SetControlMode(ControlMode),
    StopCharger,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated charger.
///
/// Queued answers are handed out in order; an empty authorization queue
/// accepts, an empty cable check or schedule queue reports `Finished`.
pub struct SimEvseController {
    evse_id: String,
    capabilities: Mutex<EvseDataContext>,
    present: Mutex<EvseUpdate>,
    cp_state: Mutex<CpState>,
    auth_queue: Mutex<VecDeque<AuthorizationResponse>>,
    cable_check_queue: Mutex<VecDeque<Processing>>,
    schedule_queue: Mutex<VecDeque<Processing>>,
    notification: Mutex<EvseNotification>,
    energy_modes: Vec<EnergyTransferMode>,
    energy_services: Vec<ServiceV20>,
    control_modes: Vec<ControlMode>,
    control_mode: Mutex<Option<ControlMode>>,
    hlc_charging: Mutex<bool>,
    schedules: Option<Vec<SaScheduleTuple>>,
    meter_wh: AtomicU64,
    calls: Mutex<Vec<ControllerCall>>,
}

impl SimEvseController {
    pub fn new(evse_id: impl Into<String>) -> Self {
        Self {
            evse_id: evse_id.into(),
            capabilities: Mutex::new(Self::default_capabilities()),
            present: Mutex::new(EvseUpdate {
                present_voltage: Some(400.0),
                ..Default::default()
            }),
            cp_state: Mutex::new(CpState::C2),
            auth_queue: Mutex::new(VecDeque::new()),
            cable_check_queue: Mutex::new(VecDeque::new()),
            schedule_queue: Mutex::new(VecDeque::new()),
            notification: Mutex::new(EvseNotification::None),
            energy_modes: vec![
                EnergyTransferMode::AcSinglePhaseCore,
                EnergyTransferMode::AcThreePhaseCore,
                EnergyTransferMode::DcCore,
                EnergyTransferMode::DcExtended,
            ],
            energy_services: vec![
                ServiceV20::Ac,
                ServiceV20::Dc,
                ServiceV20::AcBpt,
                ServiceV20::DcBpt,
                ServiceV20::Internet,
            ],
            control_modes: vec![ControlMode::Scheduled, ControlMode::Dynamic],
            control_mode: Mutex::new(None),
            hlc_charging: Mutex::new(false),
            schedules: None,
            meter_wh: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn default_capabilities() -> EvseDataContext {
        EvseDataContext {
            max_charge_power: Some(30000.0),
            min_charge_power: Some(100.0),
            max_discharge_power: Some(11000.0),
            min_discharge_power: Some(100.0),
            max_charge_current: Some(300.0),
            min_charge_current: Some(1.0),
            max_discharge_current: Some(20.0),
            min_discharge_current: Some(0.0),
            max_voltage: Some(1000.0),
            min_voltage: Some(150.0),
            nominal_frequency: Some(50.0),
            nominal_voltage: Some(230.0),
            peak_current_ripple: Some(5.0),
            ..Default::default()
        }
    }

    pub fn with_capabilities(self, capabilities: EvseDataContext) -> Self {
        *lock(&self.capabilities) = capabilities;
        self
    }

    /// Keep the default capabilities but replace every field set in `overrides`.
    pub fn with_capability_overrides(self, overrides: &EvseDataContext) -> Self {
        lock(&self.capabilities).merge(overrides);
        self
    }

    pub fn with_energy_modes(mut self, modes: Vec<EnergyTransferMode>) -> Self {
        self.energy_modes = modes;
        self
    }

    pub fn with_energy_services(mut self, services: Vec<ServiceV20>) -> Self {
        self.energy_services = services;
        self
    }

    pub fn with_control_modes(mut self, modes: Vec<ControlMode>) -> Self {
        self.control_modes = modes;
        self
    }

    /// Offer these schedules instead of the default one.
    pub fn with_schedules(mut self, schedules: Vec<SaScheduleTuple>) -> Self {
        self.schedules = Some(schedules);
        self
    }

    pub fn queue_authorization(&self, response: AuthorizationResponse) {
        lock(&self.auth_queue).push_back(response);
    }

    pub fn queue_cable_check(&self, status: Processing) {
        lock(&self.cable_check_queue).push_back(status);
    }

    pub fn queue_schedule_exchange(&self, status: Processing) {
        lock(&self.schedule_queue).push_back(status);
    }

    pub fn set_cp_state(&self, state: CpState) {
        *lock(&self.cp_state) = state;
    }

    pub fn set_notification(&self, notification: EvseNotification) {
        *lock(&self.notification) = notification;
    }

    /// Merge present or target values over the current ones.
    pub fn update_present(&self, update: &EvseUpdate) {
        lock(&self.present).merge(update);
    }

    /// Get all recorded side effects.
    pub fn calls(&self) -> Vec<ControllerCall> {
        lock(&self.calls).clone()
    }

    pub fn hlc_charging(&self) -> bool {
        *lock(&self.hlc_charging)
    }

    pub fn control_mode(&self) -> Option<ControlMode> {
        *lock(&self.control_mode)
    }

    fn record(&self, call: ControllerCall) {
        lock(&self.calls).push(call);
    }
}

impl Default for SimEvseController {
    fn default() -> Self {
        Self::new("DE*V2G*E0001")
    }
}

impl EvseController for SimEvseController {
    fn evse_id(&self, _protocol: Protocol) -> Result<String, ControllerError> {
        Ok(self.evse_id.clone())
    }

    fn data_context(&self) -> Result<EvseDataContext, ControllerError> {
        Ok(*lock(&self.capabilities))
    }

    fn present_values(&self) -> Result<EvseUpdate, ControllerError> {
        Ok(*lock(&self.present))
    }

    fn cp_state(&self) -> Result<CpState, ControllerError> {
        Ok(*lock(&self.cp_state))
    }

    fn is_authorized(
        &self,
        mode: AuthMode,
        id_token: Option<&str>,
    ) -> Result<AuthorizationResponse, ControllerError> {
        self.record(ControllerCall::IsAuthorized {
            mode,
            id_token: id_token.map(str::to_string),
        });
        Ok(lock(&self.auth_queue)
            .pop_front()
            .unwrap_or_else(AuthorizationResponse::accepted))
    }

    fn offered_energy_services(&self) -> Result<Vec<ServiceV20>, ControllerError> {
        Ok(self.energy_services.clone())
    }

    fn supported_energy_transfer_modes(&self) -> Result<Vec<EnergyTransferMode>, ControllerError> {
        Ok(self.energy_modes.clone())
    }

    fn service_parameter_sets(
        &self,
        service: ServiceV20,
    ) -> Result<Vec<ParameterSet>, ControllerError> {
        let nominal_voltage = lock(&self.capabilities).nominal_voltage;
        Ok(default_parameter_sets(
            service,
            &self.control_modes,
            nominal_voltage,
        )?)
    }

    fn supported_control_modes(&self) -> Result<Vec<ControlMode>, ControllerError> {
        Ok(self.control_modes.clone())
    }

    fn set_control_mode(&self, mode: ControlMode) -> Result<(), ControllerError> {
        self.record(ControllerCall::SetControlMode(mode));
        *lock(&self.control_mode) = Some(mode);
        Ok(())
    }

    fn set_hlc_charging(&self, enabled: bool) -> Result<(), ControllerError> {
        self.record(ControllerCall::SetHlcCharging(enabled));
        *lock(&self.hlc_charging) = enabled;
        Ok(())
    }

    fn sa_schedules(
        &self,
        _departure_time: Option<u32>,
    ) -> Result<Option<Vec<SaScheduleTuple>>, ControllerError> {
        Ok(self.schedules.clone())
    }

    fn cable_check_status(&self) -> Result<Processing, ControllerError> {
        Ok(lock(&self.cable_check_queue)
            .pop_front()
            .unwrap_or(Processing::Finished))
    }

    fn schedule_exchange_status(&self) -> Result<Processing, ControllerError> {
        Ok(lock(&self.schedule_queue)
            .pop_front()
            .unwrap_or(Processing::Finished))
    }

    fn evse_notification(&self) -> Result<EvseNotification, ControllerError> {
        Ok(*lock(&self.notification))
    }

    fn ac_evse_status(&self) -> Result<AcEvseStatus, ControllerError> {
        Ok(AcEvseStatus {
            notification_max_delay: 0,
            evse_notification: *lock(&self.notification),
            rcd: false,
        })
    }

    fn dc_evse_status(&self) -> Result<DcEvseStatus, ControllerError> {
        Ok(DcEvseStatus {
            evse_notification: *lock(&self.notification),
            ..Default::default()
        })
    }

    /// Reading grows by 100 Wh per request.
    fn meter_info(&self) -> Result<Option<MeterInfo>, ControllerError> {
        let reading = self.meter_wh.fetch_add(100, Ordering::Relaxed) + 100;
        Ok(Some(MeterInfo {
            meter_id: MeterId::new("SIM-METER-1")?,
            charged_energy_reading_wh: reading,
            discharged_energy_reading_wh: None,
            meter_signature: None,
            meter_status: None,
            meter_timestamp: None,
        }))
    }

    fn stop_charger(&self) -> Result<(), ControllerError> {
        self.record(ControllerCall::StopCharger);
        *lock(&self.hlc_charging) = false;
        Ok(())
    }
}
