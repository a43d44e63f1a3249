//! ISO 15118-20 messages shared by all energy services
//! (`V2G_CI_CommonMessages.xsd`).

use serde::{Deserialize, Serialize};

use crate::protocol::constants::*;
use crate::protocol::header::MessageHeader;
use crate::protocol::response::ResponseCode;
use crate::protocol::types::{
    AuthMode, CertificateChain, ChannelSelection, ChargeProgress, ChargingSession, EvseStatus,
    ParameterSet, Processing, SelectedService,
};
use crate::protocol::validation::{
    BoundedList, Identifier, Name, Percent, Validate, ValidationError, check_exact_len,
    check_max_len, header_only_constraints,
};
use crate::rational::RationalQuantity;

// ============================================================================
// Session setup and authorization
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSetupReq {
    pub header: MessageHeader,
    pub evcc_id: Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSetupRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub evse_id: Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationSetupReq {
    pub header: MessageHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationSetupRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub auth_services: Vec<AuthMode>,
    pub cert_install_service: bool,
    /// Present when PnC is offered.
    pub gen_challenge: Option<Vec<u8>>,
}

impl Validate for AuthorizationSetupRes {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        check_max_len("auth_services", self.auth_services.len(), MAX_AUTH_OPTIONS)?;
        if let Some(challenge) = &self.gen_challenge {
            check_exact_len("gen_challenge", challenge.len(), GEN_CHALLENGE_LEN)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PncAuthReqParams {
    pub id: Identifier,
    pub gen_challenge: Vec<u8>,
    pub contract_certificate_chain: CertificateChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationReq {
    pub header: MessageHeader,
    pub selected_auth_service: AuthMode,
    pub pnc_params: Option<PncAuthReqParams>,
}

impl Validate for AuthorizationReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        match (&self.selected_auth_service, &self.pnc_params) {
            (AuthMode::Pnc, None) => Err(ValidationError::new(
                "pnc_params",
                "required when PnC is selected",
            )),
            (AuthMode::Pnc, Some(pnc)) => {
                check_exact_len("gen_challenge", pnc.gen_challenge.len(), GEN_CHALLENGE_LEN)?;
                pnc.contract_certificate_chain.validate()
            }
            (AuthMode::Eim, Some(_)) => Err(ValidationError::new(
                "pnc_params",
                "not allowed when EIM is selected",
            )),
            (AuthMode::Eim, None) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub evse_processing: Processing,
}

// ============================================================================
// Service discovery and selection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceDiscoveryReq {
    pub header: MessageHeader,
    pub supported_service_ids: Option<Vec<u16>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: u16,
    pub free_service: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceDiscoveryRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub service_renegotiation_supported: bool,
    pub energy_service_list: Vec<Service>,
    pub vas_list: Vec<Service>,
}

impl Validate for ServiceDiscoveryRes {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        check_max_len(
            "energy_service_list",
            self.energy_service_list.len(),
            MAX_SERVICES,
        )?;
        check_max_len("vas_list", self.vas_list.len(), MAX_SERVICES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceDetailReq {
    pub header: MessageHeader,
    pub service_id: u16,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceDetailRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub service_id: u16,
    pub service_parameter_list: BoundedList<ParameterSet, MAX_PARAMETER_SETS>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSelectionReq {
    pub header: MessageHeader,
    pub selected_energy_service: SelectedService,
    pub selected_vas_list: Vec<SelectedService>,
}

impl Validate for ServiceSelectionReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        check_max_len(
            "selected_vas_list",
            self.selected_vas_list.len(),
            MAX_SELECTED_VAS,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceSelectionRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
}

// ============================================================================
// Schedule exchange
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduledScheduleExchangeReqParams {
    pub departure_time: Option<u32>,
    pub ev_target_energy_request: Option<RationalQuantity>,
    pub ev_max_energy_request: Option<RationalQuantity>,
    pub ev_min_energy_request: Option<RationalQuantity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DynamicScheduleExchangeReqParams {
    pub departure_time: u32,
    pub min_soc: Option<Percent>,
    pub target_soc: Option<Percent>,
    pub ev_target_energy_request: RationalQuantity,
    pub ev_max_energy_request: RationalQuantity,
    pub ev_min_energy_request: RationalQuantity,
    pub ev_max_v2x_energy_request: Option<RationalQuantity>,
    pub ev_min_v2x_energy_request: Option<RationalQuantity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleExchangeReqParams {
    Scheduled(ScheduledScheduleExchangeReqParams),
    Dynamic(DynamicScheduleExchangeReqParams),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleExchangeReq {
    pub header: MessageHeader,
    pub max_supporting_points: u16,
    pub params: ScheduleExchangeReqParams,
}

impl Validate for ScheduleExchangeReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        if !(12..=1024).contains(&self.max_supporting_points) {
            return Err(ValidationError::new(
                "max_supporting_points",
                format!("{} outside 12..=1024", self.max_supporting_points),
            ));
        }
        if let ScheduleExchangeReqParams::Dynamic(p) = &self.params
            && let (Some(min), Some(target)) = (p.min_soc, p.target_soc)
            && min > target
        {
            return Err(ValidationError::new("min_soc", "above target_soc"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PowerScheduleEntry {
    /// Seconds.
    pub duration: u32,
    pub power: RationalQuantity,
    pub power_l2: Option<RationalQuantity>,
    pub power_l3: Option<RationalQuantity>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerSchedule {
    pub time_anchor: u64,
    pub available_energy: Option<RationalQuantity>,
    pub power_tolerance: Option<RationalQuantity>,
    pub entries: BoundedList<PowerScheduleEntry, MAX_POWER_SCHEDULE_ENTRIES>,
}

impl PowerSchedule {
    pub fn total_duration(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.duration)).sum()
    }
}

impl Validate for PowerSchedule {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.entries.is_empty() {
            return Err(ValidationError::new("power_schedule", "no entries"));
        }
        if self.entries.iter().any(|e| e.duration == 0) {
            return Err(ValidationError::new("power_schedule", "zero-length entry"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRule {
    pub energy_fee: RationalQuantity,
    pub power_range_start: RationalQuantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRuleStack {
    pub duration: u32,
    pub price_rules: Vec<PriceRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsolutePriceSchedule {
    pub time_anchor: u64,
    pub price_schedule_id: u32,
    pub currency: String,
    pub language: String,
    pub price_algorithm: Identifier,
    pub price_rule_stacks: Vec<PriceRuleStack>,
}

impl Validate for AbsolutePriceSchedule {
    fn validate(&self) -> Result<(), ValidationError> {
        check_max_len("currency", self.currency.len(), MAX_CURRENCY_LEN)?;
        if self.price_rule_stacks.is_empty() {
            return Err(ValidationError::new("price_rule_stacks", "empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChargingSchedule {
    pub power_schedule: PowerSchedule,
    pub absolute_price_schedule: Option<AbsolutePriceSchedule>,
}

impl Validate for ChargingSchedule {
    fn validate(&self) -> Result<(), ValidationError> {
        self.power_schedule.validate()?;
        self.absolute_price_schedule.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleTuple {
    pub schedule_tuple_id: u32,
    pub charging_schedule: ChargingSchedule,
    /// BPT services only.
    pub discharging_schedule: Option<ChargingSchedule>,
}

impl Validate for ScheduleTuple {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.schedule_tuple_id == 0 {
            return Err(ValidationError::new("schedule_tuple_id", "must be non-zero"));
        }
        self.charging_schedule.validate()?;
        self.discharging_schedule.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduledScheduleExchangeResParams {
    pub schedule_tuples: BoundedList<ScheduleTuple, MAX_SCHEDULE_TUPLES>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DynamicScheduleExchangeResParams {
    pub departure_time: Option<u32>,
    pub min_soc: Option<Percent>,
    pub target_soc: Option<Percent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScheduleExchangeResParams {
    Scheduled(ScheduledScheduleExchangeResParams),
    Dynamic(DynamicScheduleExchangeResParams),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleExchangeRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub evse_processing: Processing,
    pub go_to_pause: Option<bool>,
    /// Absent while `evse_processing` is ongoing.
    pub params: Option<ScheduleExchangeResParams>,
}

impl Validate for ScheduleExchangeRes {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        if let Some(ScheduleExchangeResParams::Scheduled(p)) = &self.params {
            p.schedule_tuples.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// Power delivery and session stop
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvPowerProfile {
    pub time_anchor: u64,
    pub entries: BoundedList<PowerScheduleEntry, MAX_POWER_SCHEDULE_ENTRIES>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerDeliveryReq {
    pub header: MessageHeader,
    pub ev_processing: Processing,
    pub charge_progress: ChargeProgress,
    pub ev_power_profile: Option<EvPowerProfile>,
    pub bpt_channel_selection: Option<ChannelSelection>,
}

impl Validate for PowerDeliveryReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        if self.charge_progress == ChargeProgress::Renegotiate {
            return Err(ValidationError::new(
                "charge_progress",
                "Renegotiate is not defined for ISO 15118-20",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PowerDeliveryRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub evse_status: Option<EvseStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStopReq {
    pub header: MessageHeader,
    pub charging_session: ChargingSession,
    pub ev_termination_code: Option<Name>,
    pub ev_termination_explanation: Option<String>,
}

impl Validate for SessionStopReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        if let Some(explanation) = &self.ev_termination_explanation {
            check_max_len(
                "ev_termination_explanation",
                explanation.chars().count(),
                MAX_DESCRIPTION_LEN,
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStopRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
}

// ============================================================================
// Charge loop helpers
// ============================================================================

/// Values an EV may show on the charger display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayParameters {
    pub present_soc: Option<Percent>,
    pub min_soc: Option<Percent>,
    pub target_soc: Option<Percent>,
    pub max_soc: Option<Percent>,
    pub remaining_time_to_min_soc: Option<u32>,
    pub remaining_time_to_target_soc: Option<u32>,
    pub remaining_time_to_max_soc: Option<u32>,
    pub charging_complete: Option<bool>,
    pub battery_energy_capacity: Option<RationalQuantity>,
    pub inlet_hot: Option<bool>,
}

header_only_constraints!(
    SessionSetupReq,
    SessionSetupRes,
    AuthorizationSetupReq,
    AuthorizationRes,
    ServiceDiscoveryReq,
    ServiceDetailReq,
    ServiceSelectionRes,
    PowerDeliveryRes,
    SessionStopRes,
);

impl Validate for ServiceDetailRes {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        let mut ids: Vec<u16> = self.service_parameter_list.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.service_parameter_list.len() {
            return Err(ValidationError::new(
                "service_parameter_list",
                "duplicate parameter set id",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::SessionId;

    #[test]
    fn test_pnc_authorization_requires_params() {
        let req = AuthorizationReq {
            header: MessageHeader::new(SessionId::zero()),
            selected_auth_service: AuthMode::Pnc,
            pnc_params: None,
        };
        assert_eq!(req.validate().unwrap_err().field, "pnc_params");
    }

    #[test]
    fn test_power_schedule_rejects_zero_duration() {
        let schedule = PowerSchedule {
            time_anchor: 0,
            available_energy: None,
            power_tolerance: None,
            entries: BoundedList::new(vec![PowerScheduleEntry {
                duration: 0,
                power: RationalQuantity::new(11, 3),
                power_l2: None,
                power_l3: None,
            }])
            .unwrap(),
        };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn test_schedule_exchange_soc_order() {
        let req = ScheduleExchangeReq {
            header: MessageHeader::new(SessionId::zero()),
            max_supporting_points: 1024,
            params: ScheduleExchangeReqParams::Dynamic(DynamicScheduleExchangeReqParams {
                departure_time: 3600,
                min_soc: Some(Percent::new(80).unwrap()),
                target_soc: Some(Percent::new(60).unwrap()),
                ..Default::default()
            }),
        };
        assert_eq!(req.validate().unwrap_err().field, "min_soc");
    }
}
