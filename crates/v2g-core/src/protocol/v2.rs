//! ISO 15118-2 messages.
//!
//! A -2 message has one header followed by exactly one body element, so
//! requests and responses are modelled as `{ header, body }` where the body
//! is a closed enum.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::constants::*;
use super::header::MessageHeader;
use super::message::MessageKind;
use super::response::ResponseCode;
use super::types::{
    AuthMode, CertificateChain, ChargeProgress, ChargingSession, DcEvErrorCode, DcEvseStatusCode,
    EnergyTransferMode, EvseNotification, IsolationLevel, MeterInfo, ParameterSet, Processing,
    SelectedService,
};
use super::validation::{
    BoundedList, Identifier, Name, Percent, Validate, ValidationError, check_exact_len, check_hex,
    check_max_len, check_range, no_cross_field_constraints,
};
use crate::rational::{RangeError, RationalQuantity};

// ============================================================================
// Physical values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitSymbol {
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "m")]
    Minutes,
    #[default]
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "A")]
    Amperes,
    #[serde(rename = "V")]
    Volts,
    #[serde(rename = "W")]
    Watts,
    #[serde(rename = "Wh")]
    WattHours,
}

impl fmt::Display for UnitSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitSymbol::Hours => "h",
            UnitSymbol::Minutes => "m",
            UnitSymbol::Seconds => "s",
            UnitSymbol::Amperes => "A",
            UnitSymbol::Volts => "V",
            UnitSymbol::Watts => "W",
            UnitSymbol::WattHours => "Wh",
        };
        f.write_str(s)
    }
}

/// PhysicalValueType: value × 10^multiplier with a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PhysicalValue {
    pub value: RationalQuantity,
    pub unit: UnitSymbol,
}

impl PhysicalValue {
    pub fn new(value: f64, unit: UnitSymbol) -> Result<Self, RangeError> {
        Ok(Self {
            value: RationalQuantity::encode(value, f64::from(i16::MAX), false)?,
            unit,
        })
    }

    pub fn watts(value: f64) -> Result<Self, RangeError> {
        Self::new(value, UnitSymbol::Watts)
    }

    pub fn amperes(value: f64) -> Result<Self, RangeError> {
        Self::new(value, UnitSymbol::Amperes)
    }

    pub fn volts(value: f64) -> Result<Self, RangeError> {
        Self::new(value, UnitSymbol::Volts)
    }

    pub fn watt_hours(value: f64) -> Result<Self, RangeError> {
        Self::new(value, UnitSymbol::WattHours)
    }

    pub fn decode(&self) -> f64 {
        self.value.decode()
    }

    fn check_unit(&self, field: &'static str, unit: UnitSymbol) -> Result<(), ValidationError> {
        if self.unit != unit {
            return Err(ValidationError::new(
                field,
                format!("unit {} where {} is required", self.unit, unit),
            ));
        }
        Ok(())
    }

    fn check(
        &self,
        field: &'static str,
        unit: UnitSymbol,
        max: f64,
    ) -> Result<(), ValidationError> {
        self.check_unit(field, unit)?;
        check_range(field, self.decode(), 0.0, max)
    }
}

impl fmt::Display for PhysicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.decode(), self.unit)
    }
}

// ============================================================================
// Shared records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ServiceCategory {
    #[default]
    EvCharging,
    Internet,
    ContractCertificate,
    OtherCustom,
}

/// The charge service announced in ServiceDiscoveryRes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChargeService {
    pub service_id: u16,
    pub service_name: Option<Name>,
    pub service_category: ServiceCategory,
    pub free_service: bool,
    pub supported_energy_transfer_modes: Vec<EnergyTransferMode>,
}

/// A value-added service announced in ServiceDiscoveryRes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub service_id: u16,
    pub service_name: Option<Name>,
    pub service_category: ServiceCategory,
    pub free_service: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcEvseStatus {
    pub notification_max_delay: u16,
    pub evse_notification: EvseNotification,
    pub rcd: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcEvseStatus {
    pub notification_max_delay: u16,
    pub evse_notification: EvseNotification,
    pub evse_isolation_status: Option<IsolationLevel>,
    pub evse_status_code: DcEvseStatusCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcEvStatus {
    pub ev_ready: bool,
    pub ev_error_code: DcEvErrorCode,
    pub ev_ress_soc: Percent,
}

/// EVSEStatus of PowerDeliveryRes, whose shape follows the energy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvseStatus {
    Ac(AcEvseStatus),
    Dc(DcEvseStatus),
}

impl Default for EvseStatus {
    fn default() -> Self {
        EvseStatus::Ac(AcEvseStatus::default())
    }
}

/// One PMaxSchedule boundary of an offered SA schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PMaxScheduleEntry {
    /// Offset from the start of the schedule, seconds.
    pub start: u32,
    /// Only the last entry may carry a duration.
    pub duration: Option<u32>,
    pub p_max: PhysicalValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaScheduleTuple {
    pub sa_schedule_tuple_id: u8,
    pub p_max_schedule: BoundedList<PMaxScheduleEntry, MAX_PMAX_SCHEDULE_ENTRIES>,
}

impl SaScheduleTuple {
    /// Seconds from the first entry's start to the end of the last entry.
    pub fn covered_duration(&self) -> u32 {
        match (self.p_max_schedule.first(), self.p_max_schedule.last()) {
            (Some(first), Some(last)) => {
                last.start
                    .saturating_sub(first.start)
                    .saturating_add(last.duration.unwrap_or(0))
            }
            _ => 0,
        }
    }
}

impl Validate for SaScheduleTuple {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.sa_schedule_tuple_id == 0 {
            return Err(ValidationError::new("sa_schedule_tuple_id", "must be 1..=255"));
        }
        if self.p_max_schedule.is_empty() {
            return Err(ValidationError::new("p_max_schedule", "empty"));
        }
        check_strictly_increasing(
            "p_max_schedule",
            self.p_max_schedule.iter().map(|e| e.start),
        )?;
        for entry in self.p_max_schedule.iter() {
            if entry.start > V2_MAX_INTERVAL_START {
                return Err(ValidationError::new(
                    "p_max_schedule",
                    format!("start {} beyond {V2_MAX_INTERVAL_START}", entry.start),
                ));
            }
            if let Some(duration) = entry.duration
                && duration > V2_MAX_INTERVAL_DURATION
            {
                return Err(ValidationError::new(
                    "p_max_schedule",
                    format!("duration {duration} beyond {V2_MAX_INTERVAL_DURATION}"),
                ));
            }
            entry
                .p_max
                .check("p_max", UnitSymbol::Watts, V2_MAX_POWER_LIMIT_W)?;
        }
        Ok(())
    }
}

/// One entry of the EV's charging profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntryDetails {
    pub start: u32,
    pub max_power: PhysicalValue,
    pub max_phases_in_use: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChargingProfile {
    pub entries: BoundedList<ProfileEntryDetails, MAX_PROFILE_ENTRIES>,
}

impl Validate for ChargingProfile {
    fn validate(&self) -> Result<(), ValidationError> {
        check_strictly_increasing("charging_profile", self.entries.iter().map(|e| e.start))?;
        for entry in self.entries.iter() {
            entry.max_power.check_unit("max_power", UnitSymbol::Watts)?;
            if let Some(phases) = entry.max_phases_in_use
                && !(1..=3).contains(&phases)
            {
                return Err(ValidationError::new(
                    "max_phases_in_use",
                    format!("{phases} outside 1..=3"),
                ));
            }
        }
        Ok(())
    }
}

fn check_strictly_increasing(
    field: &'static str,
    starts: impl Iterator<Item = u32>,
) -> Result<(), ValidationError> {
    let mut previous: Option<u32> = None;
    for start in starts {
        if let Some(prev) = previous
            && start <= prev
        {
            return Err(ValidationError::new(
                field,
                format!("start {start} does not follow {prev}"),
            ));
        }
        previous = Some(start);
    }
    Ok(())
}

// ============================================================================
// Charge parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcEvChargeParameter {
    pub departure_time: Option<u32>,
    pub e_amount: PhysicalValue,
    pub ev_max_voltage: PhysicalValue,
    pub ev_max_current: PhysicalValue,
    pub ev_min_current: PhysicalValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcEvChargeParameter {
    pub departure_time: Option<u32>,
    pub dc_ev_status: DcEvStatus,
    pub ev_maximum_current_limit: PhysicalValue,
    pub ev_maximum_power_limit: Option<PhysicalValue>,
    pub ev_maximum_voltage_limit: PhysicalValue,
    pub ev_energy_capacity: Option<PhysicalValue>,
    pub ev_energy_request: Option<PhysicalValue>,
    pub full_soc: Option<Percent>,
    pub bulk_soc: Option<Percent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvChargeParameter {
    Ac(AcEvChargeParameter),
    Dc(DcEvChargeParameter),
}

impl EvChargeParameter {
    /// DepartureTime, with 0 read as "not provided".
    pub fn departure_time(&self) -> Option<u32> {
        let dt = match self {
            EvChargeParameter::Ac(p) => p.departure_time,
            EvChargeParameter::Dc(p) => p.departure_time,
        };
        dt.filter(|&t| t > 0)
    }
}

impl Validate for EvChargeParameter {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            EvChargeParameter::Ac(p) => {
                p.e_amount.check_unit("e_amount", UnitSymbol::WattHours)?;
                p.ev_max_voltage
                    .check("ev_max_voltage", UnitSymbol::Volts, V2_MAX_VOLTAGE_LIMIT_V)?;
                p.ev_max_current
                    .check("ev_max_current", UnitSymbol::Amperes, V2_MAX_CURRENT_LIMIT_A)?;
                p.ev_min_current
                    .check("ev_min_current", UnitSymbol::Amperes, V2_MAX_CURRENT_LIMIT_A)
            }
            EvChargeParameter::Dc(p) => {
                p.ev_maximum_current_limit.check(
                    "ev_maximum_current_limit",
                    UnitSymbol::Amperes,
                    V2_MAX_CURRENT_LIMIT_A,
                )?;
                p.ev_maximum_voltage_limit.check(
                    "ev_maximum_voltage_limit",
                    UnitSymbol::Volts,
                    V2_MAX_VOLTAGE_LIMIT_V,
                )?;
                if let Some(power) = &p.ev_maximum_power_limit {
                    power.check(
                        "ev_maximum_power_limit",
                        UnitSymbol::Watts,
                        V2_MAX_POWER_LIMIT_W,
                    )?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcEvseChargeParameter {
    pub ac_evse_status: AcEvseStatus,
    pub evse_nominal_voltage: PhysicalValue,
    pub evse_max_current: PhysicalValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcEvseChargeParameter {
    pub dc_evse_status: DcEvseStatus,
    pub evse_maximum_current_limit: PhysicalValue,
    pub evse_maximum_power_limit: PhysicalValue,
    pub evse_maximum_voltage_limit: PhysicalValue,
    pub evse_minimum_current_limit: PhysicalValue,
    pub evse_minimum_voltage_limit: PhysicalValue,
    pub evse_peak_current_ripple: PhysicalValue,
    pub evse_current_regulation_tolerance: Option<PhysicalValue>,
    pub evse_energy_to_be_delivered: Option<PhysicalValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvseChargeParameter {
    Ac(AcEvseChargeParameter),
    Dc(DcEvseChargeParameter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcEvPowerDeliveryParameter {
    pub dc_ev_status: DcEvStatus,
    pub bulk_charging_complete: Option<bool>,
    pub charging_complete: bool,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSetupReq {
    /// MAC address of the EVCC as 12 hex characters.
    pub evcc_id: String,
}

impl Validate for SessionSetupReq {
    fn validate(&self) -> Result<(), ValidationError> {
        check_exact_len("evcc_id", self.evcc_id.len(), V2_EVCC_ID_HEX_LEN)?;
        check_hex("evcc_id", &self.evcc_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceDiscoveryReq {
    pub service_scope: Option<String>,
    pub service_category: Option<ServiceCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDetailReq {
    pub service_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentServiceSelectionReq {
    pub selected_payment_option: AuthMode,
    pub selected_service_list: Vec<SelectedService>,
}

impl Validate for PaymentServiceSelectionReq {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.selected_service_list.is_empty() {
            return Err(ValidationError::new("selected_service_list", "empty"));
        }
        check_max_len(
            "selected_service_list",
            self.selected_service_list.len(),
            MAX_SERVICES,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetailsReq {
    pub emaid: Identifier,
    pub contract_cert_chain: CertificateChain,
}

impl Validate for PaymentDetailsReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.contract_cert_chain.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationReq {
    pub id: Option<Identifier>,
    /// Echo of PaymentDetailsRes.GenChallenge (PnC only).
    pub gen_challenge: Option<Vec<u8>>,
}

impl Validate for AuthorizationReq {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(challenge) = &self.gen_challenge {
            check_exact_len("gen_challenge", challenge.len(), GEN_CHALLENGE_LEN)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeParameterDiscoveryReq {
    pub max_entries_sa_schedule_tuple: Option<u16>,
    pub requested_energy_transfer_mode: EnergyTransferMode,
    pub ev_charge_parameter: EvChargeParameter,
}

impl Validate for ChargeParameterDiscoveryReq {
    fn validate(&self) -> Result<(), ValidationError> {
        let dc_param = matches!(self.ev_charge_parameter, EvChargeParameter::Dc(_));
        if dc_param != self.requested_energy_transfer_mode.is_dc() {
            return Err(ValidationError::new(
                "ev_charge_parameter",
                "does not match requested_energy_transfer_mode",
            ));
        }
        self.ev_charge_parameter.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CableCheckReq {
    pub dc_ev_status: DcEvStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreChargeReq {
    pub dc_ev_status: DcEvStatus,
    pub ev_target_voltage: PhysicalValue,
    pub ev_target_current: PhysicalValue,
}

impl Validate for PreChargeReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.ev_target_voltage
            .check("ev_target_voltage", UnitSymbol::Volts, V2_MAX_VOLTAGE_LIMIT_V)?;
        self.ev_target_current
            .check("ev_target_current", UnitSymbol::Amperes, V2_MAX_CURRENT_LIMIT_A)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerDeliveryReq {
    pub charge_progress: ChargeProgress,
    pub sa_schedule_tuple_id: u8,
    pub charging_profile: Option<ChargingProfile>,
    pub dc_ev_power_delivery_parameter: Option<DcEvPowerDeliveryParameter>,
}

impl Validate for PowerDeliveryReq {
    fn validate(&self) -> Result<(), ValidationError> {
        if matches!(
            self.charge_progress,
            ChargeProgress::Standby | ChargeProgress::ScheduleRenegotiation
        ) {
            return Err(ValidationError::new(
                "charge_progress",
                "not defined for ISO 15118-2",
            ));
        }
        self.charging_profile.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChargingStatusReq {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentDemandReq {
    pub dc_ev_status: DcEvStatus,
    pub ev_target_current: PhysicalValue,
    pub ev_target_voltage: PhysicalValue,
    pub ev_maximum_voltage_limit: Option<PhysicalValue>,
    pub ev_maximum_current_limit: Option<PhysicalValue>,
    pub ev_maximum_power_limit: Option<PhysicalValue>,
    pub bulk_charging_complete: Option<bool>,
    pub charging_complete: bool,
    pub remaining_time_to_full_soc: Option<PhysicalValue>,
    pub remaining_time_to_bulk_soc: Option<PhysicalValue>,
}

impl Validate for CurrentDemandReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.ev_target_current
            .check("ev_target_current", UnitSymbol::Amperes, V2_MAX_CURRENT_LIMIT_A)?;
        self.ev_target_voltage
            .check("ev_target_voltage", UnitSymbol::Volts, V2_MAX_VOLTAGE_LIMIT_V)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeldingDetectionReq {
    pub dc_ev_status: DcEvStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStopReq {
    pub charging_session: ChargingSession,
}

impl Validate for SessionStopReq {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.charging_session == ChargingSession::ServiceRenegotiation {
            return Err(ValidationError::new(
                "charging_session",
                "ServiceRenegotiation is not defined for ISO 15118-2",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSetupRes {
    pub response_code: ResponseCode,
    pub evse_id: String,
    pub evse_timestamp: Option<u64>,
}

impl Validate for SessionSetupRes {
    fn validate(&self) -> Result<(), ValidationError> {
        check_max_len("evse_id", self.evse_id.len(), MAX_EVSE_ID_LEN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceDiscoveryRes {
    pub response_code: ResponseCode,
    pub payment_option_list: Vec<AuthMode>,
    pub charge_service: ChargeService,
    pub service_list: Vec<ServiceSummary>,
}

impl Validate for ServiceDiscoveryRes {
    fn validate(&self) -> Result<(), ValidationError> {
        check_max_len(
            "payment_option_list",
            self.payment_option_list.len(),
            MAX_AUTH_OPTIONS,
        )?;
        check_max_len("service_list", self.service_list.len(), MAX_SERVICES)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceDetailRes {
    pub response_code: ResponseCode,
    pub service_id: u16,
    pub service_parameter_list: Vec<ParameterSet>,
}

impl Validate for ServiceDetailRes {
    fn validate(&self) -> Result<(), ValidationError> {
        check_max_len(
            "service_parameter_list",
            self.service_parameter_list.len(),
            MAX_PARAMETER_SETS,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentServiceSelectionRes {
    pub response_code: ResponseCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentDetailsRes {
    pub response_code: ResponseCode,
    pub gen_challenge: Vec<u8>,
    pub evse_timestamp: u64,
}

impl Validate for PaymentDetailsRes {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.response_code.permits_continuation() {
            check_exact_len("gen_challenge", self.gen_challenge.len(), GEN_CHALLENGE_LEN)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationRes {
    pub response_code: ResponseCode,
    pub evse_processing: Processing,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChargeParameterDiscoveryRes {
    pub response_code: ResponseCode,
    pub evse_processing: Processing,
    pub sa_schedule_list: Option<BoundedList<SaScheduleTuple, MAX_SA_SCHEDULE_TUPLES>>,
    pub evse_charge_parameter: Option<EvseChargeParameter>,
}

impl Validate for ChargeParameterDiscoveryRes {
    fn validate(&self) -> Result<(), ValidationError> {
        self.sa_schedule_list.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CableCheckRes {
    pub response_code: ResponseCode,
    pub dc_evse_status: DcEvseStatus,
    pub evse_processing: Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreChargeRes {
    pub response_code: ResponseCode,
    pub dc_evse_status: DcEvseStatus,
    pub evse_present_voltage: PhysicalValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PowerDeliveryRes {
    pub response_code: ResponseCode,
    pub evse_status: EvseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChargingStatusRes {
    pub response_code: ResponseCode,
    pub evse_id: String,
    pub sa_schedule_tuple_id: u8,
    pub evse_max_current: Option<PhysicalValue>,
    pub meter_info: Option<MeterInfo>,
    pub receipt_required: Option<bool>,
    pub ac_evse_status: AcEvseStatus,
}

impl Validate for ChargingStatusRes {
    fn validate(&self) -> Result<(), ValidationError> {
        check_max_len("evse_id", self.evse_id.len(), MAX_EVSE_ID_LEN)?;
        self.meter_info.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CurrentDemandRes {
    pub response_code: ResponseCode,
    pub dc_evse_status: DcEvseStatus,
    pub evse_present_voltage: PhysicalValue,
    pub evse_present_current: PhysicalValue,
    pub evse_current_limit_achieved: bool,
    pub evse_voltage_limit_achieved: bool,
    pub evse_power_limit_achieved: bool,
    pub evse_maximum_voltage_limit: Option<PhysicalValue>,
    pub evse_maximum_current_limit: Option<PhysicalValue>,
    pub evse_maximum_power_limit: Option<PhysicalValue>,
    pub evse_id: String,
    pub sa_schedule_tuple_id: u8,
    pub meter_info: Option<MeterInfo>,
    pub receipt_required: Option<bool>,
}

impl Validate for CurrentDemandRes {
    fn validate(&self) -> Result<(), ValidationError> {
        check_max_len("evse_id", self.evse_id.len(), MAX_EVSE_ID_LEN)?;
        self.meter_info.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeldingDetectionRes {
    pub response_code: ResponseCode,
    pub dc_evse_status: DcEvseStatus,
    pub evse_present_voltage: PhysicalValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStopRes {
    pub response_code: ResponseCode,
}

no_cross_field_constraints!(
    ServiceDiscoveryReq,
    ServiceDetailReq,
    CableCheckReq,
    ChargingStatusReq,
    WeldingDetectionReq,
    PaymentServiceSelectionRes,
    AuthorizationRes,
    CableCheckRes,
    PreChargeRes,
    PowerDeliveryRes,
    WeldingDetectionRes,
    SessionStopRes,
);

// ============================================================================
// Envelopes
// ============================================================================

macro_rules! v2_bodies {
    ($($variant:ident($req:ident, $res:ident),)*) => {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum RequestBody {
            $($variant($req),)*
        }

        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum ResponseBody {
            $($variant($res),)*
        }

        impl RequestBody {
            pub fn kind(&self) -> MessageKind {
                match self {
                    $(RequestBody::$variant(_) => MessageKind::$variant,)*
                }
            }

            /// The matching response body, otherwise empty, carrying `code`.
            pub fn failed_response(&self, code: ResponseCode) -> ResponseBody {
                match self {
                    $(RequestBody::$variant(_) => ResponseBody::$variant($res {
                        response_code: code,
                        ..Default::default()
                    }),)*
                }
            }
        }

        impl ResponseBody {
            pub fn kind(&self) -> MessageKind {
                match self {
                    $(ResponseBody::$variant(_) => MessageKind::$variant,)*
                }
            }

            pub fn response_code(&self) -> ResponseCode {
                match self {
                    $(ResponseBody::$variant(res) => res.response_code,)*
                }
            }
        }

        impl Validate for RequestBody {
            fn validate(&self) -> Result<(), ValidationError> {
                match self {
                    $(RequestBody::$variant(req) => req.validate(),)*
                }
            }
        }

        impl Validate for ResponseBody {
            fn validate(&self) -> Result<(), ValidationError> {
                match self {
                    $(ResponseBody::$variant(res) => res.validate(),)*
                }
            }
        }

        $(
            impl From<$req> for RequestBody {
                fn from(req: $req) -> Self {
                    RequestBody::$variant(req)
                }
            }

            impl From<$res> for ResponseBody {
                fn from(res: $res) -> Self {
                    ResponseBody::$variant(res)
                }
            }
        )*
    };
}

v2_bodies! {
    SessionSetup(SessionSetupReq, SessionSetupRes),
    ServiceDiscovery(ServiceDiscoveryReq, ServiceDiscoveryRes),
    ServiceDetail(ServiceDetailReq, ServiceDetailRes),
    PaymentServiceSelection(PaymentServiceSelectionReq, PaymentServiceSelectionRes),
    PaymentDetails(PaymentDetailsReq, PaymentDetailsRes),
    Authorization(AuthorizationReq, AuthorizationRes),
    ChargeParameterDiscovery(ChargeParameterDiscoveryReq, ChargeParameterDiscoveryRes),
    CableCheck(CableCheckReq, CableCheckRes),
    PreCharge(PreChargeReq, PreChargeRes),
    PowerDelivery(PowerDeliveryReq, PowerDeliveryRes),
    ChargingStatus(ChargingStatusReq, ChargingStatusRes),
    CurrentDemand(CurrentDemandReq, CurrentDemandRes),
    WeldingDetection(WeldingDetectionReq, WeldingDetectionRes),
    SessionStop(SessionStopReq, SessionStopRes),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub header: MessageHeader,
    pub body: RequestBody,
}

impl Request {
    pub fn new(header: MessageHeader, body: impl Into<RequestBody>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }
}

impl Validate for Request {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        self.body.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub header: MessageHeader,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(header: MessageHeader, body: impl Into<ResponseBody>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }
}

impl Validate for Response {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        self.body.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(start: u32, duration: Option<u32>, watts: f64) -> PMaxScheduleEntry {
        PMaxScheduleEntry {
            start,
            duration,
            p_max: PhysicalValue::watts(watts).unwrap(),
        }
    }

    #[test]
    fn test_physical_value_encoding() {
        let pv = PhysicalValue::watts(11000.0).unwrap();
        assert_eq!(pv.decode(), 11000.0);
        assert!(PhysicalValue::amperes(-1.0).is_err());
        assert_eq!(pv.to_string(), "11000 W");
    }

    #[test]
    fn test_schedule_coverage() {
        let tuple = SaScheduleTuple {
            sa_schedule_tuple_id: 1,
            p_max_schedule: BoundedList::new(vec![
                entry(0, None, 11000.0),
                entry(3600, Some(7200), 7000.0),
            ])
            .unwrap(),
        };
        assert_eq!(tuple.covered_duration(), 10800);
        assert!(tuple.validate().is_ok());
    }

    #[test]
    fn test_schedule_must_be_strictly_increasing() {
        let tuple = SaScheduleTuple {
            sa_schedule_tuple_id: 1,
            p_max_schedule: BoundedList::new(vec![
                entry(0, None, 11000.0),
                entry(0, Some(60), 7000.0),
            ])
            .unwrap(),
        };
        let err = tuple.validate().unwrap_err();
        assert_eq!(err.field, "p_max_schedule");
    }

    #[test]
    fn test_departure_time_zero_is_absent() {
        let param = EvChargeParameter::Ac(AcEvChargeParameter {
            departure_time: Some(0),
            e_amount: PhysicalValue::watt_hours(20000.0).unwrap(),
            ev_max_voltage: PhysicalValue::volts(400.0).unwrap(),
            ev_max_current: PhysicalValue::amperes(32.0).unwrap(),
            ev_min_current: PhysicalValue::amperes(6.0).unwrap(),
        });
        assert_eq!(param.departure_time(), None);
    }

    #[test]
    fn test_energy_mode_must_match_parameter_shape() {
        let req = ChargeParameterDiscoveryReq {
            max_entries_sa_schedule_tuple: None,
            requested_energy_transfer_mode: EnergyTransferMode::DcCore,
            ev_charge_parameter: EvChargeParameter::Ac(AcEvChargeParameter {
                departure_time: None,
                e_amount: PhysicalValue::watt_hours(20000.0).unwrap(),
                ev_max_voltage: PhysicalValue::volts(400.0).unwrap(),
                ev_max_current: PhysicalValue::amperes(32.0).unwrap(),
                ev_min_current: PhysicalValue::amperes(6.0).unwrap(),
            }),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_failed_response_matches_request() {
        let body = RequestBody::ServiceDetail(ServiceDetailReq { service_id: 9 });
        let res = body.failed_response(ResponseCode::FailedSequenceError);
        assert_eq!(res.kind(), MessageKind::ServiceDetail);
        assert_eq!(res.response_code(), ResponseCode::FailedSequenceError);
    }

    #[test]
    fn test_evcc_id_must_be_mac() {
        assert!(SessionSetupReq { evcc_id: "0A1B2C3D4E5F".into() }.validate().is_ok());
        assert!(SessionSetupReq { evcc_id: "0A1B".into() }.validate().is_err());
    }
}
