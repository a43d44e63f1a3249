//! ISO 15118-20 AC messages (`V2G_CI_AC.xsd`).
//!
//! Every power value may come with per-phase `_l2` / `_l3` companions; the
//! base field is phase L1 (or the total for single-phase).

use serde::{Deserialize, Serialize};

use super::common::DisplayParameters;
use crate::protocol::header::MessageHeader;
use crate::protocol::response::ResponseCode;
use crate::protocol::types::{EvseStatus, MeterInfo};
use crate::protocol::validation::{Percent, Validate, ValidationError, header_only_constraints};
use crate::rational::RationalQuantity;

type Rq = RationalQuantity;

// ============================================================================
// Charge parameter discovery
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcCpdReqParams {
    pub ev_max_charge_power: Rq,
    pub ev_max_charge_power_l2: Option<Rq>,
    pub ev_max_charge_power_l3: Option<Rq>,
    pub ev_min_charge_power: Rq,
    pub ev_min_charge_power_l2: Option<Rq>,
    pub ev_min_charge_power_l3: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptAcCpdReqParams {
    #[serde(flatten)]
    pub base: AcCpdReqParams,
    pub ev_max_discharge_power: Rq,
    pub ev_max_discharge_power_l2: Option<Rq>,
    pub ev_max_discharge_power_l3: Option<Rq>,
    pub ev_min_discharge_power: Rq,
    pub ev_min_discharge_power_l2: Option<Rq>,
    pub ev_min_discharge_power_l3: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcCpdReqParamsKind {
    Ac(AcCpdReqParams),
    Bpt(BptAcCpdReqParams),
}

impl AcCpdReqParamsKind {
    pub fn base(&self) -> &AcCpdReqParams {
        match self {
            AcCpdReqParamsKind::Ac(p) => p,
            AcCpdReqParamsKind::Bpt(p) => &p.base,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcCpdResParams {
    pub evse_max_charge_power: Rq,
    pub evse_max_charge_power_l2: Option<Rq>,
    pub evse_max_charge_power_l3: Option<Rq>,
    pub evse_min_charge_power: Rq,
    pub evse_min_charge_power_l2: Option<Rq>,
    pub evse_min_charge_power_l3: Option<Rq>,
    pub evse_nominal_frequency: Rq,
    pub max_power_asymmetry: Option<Rq>,
    pub evse_power_ramp_limitation: Option<Rq>,
    pub evse_present_active_power: Option<Rq>,
    pub evse_present_active_power_l2: Option<Rq>,
    pub evse_present_active_power_l3: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptAcCpdResParams {
    #[serde(flatten)]
    pub base: AcCpdResParams,
    pub evse_max_discharge_power: Rq,
    pub evse_max_discharge_power_l2: Option<Rq>,
    pub evse_max_discharge_power_l3: Option<Rq>,
    pub evse_min_discharge_power: Rq,
    pub evse_min_discharge_power_l2: Option<Rq>,
    pub evse_min_discharge_power_l3: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcCpdResParamsKind {
    Ac(AcCpdResParams),
    Bpt(BptAcCpdResParams),
}

impl Default for AcCpdResParamsKind {
    fn default() -> Self {
        AcCpdResParamsKind::Ac(AcCpdResParams::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcChargeParameterDiscoveryReq {
    pub header: MessageHeader,
    pub params: AcCpdReqParamsKind,
}

impl Validate for AcChargeParameterDiscoveryReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        let base = self.params.base();
        if base.ev_min_charge_power.decode() > base.ev_max_charge_power.decode() {
            return Err(ValidationError::new(
                "ev_min_charge_power",
                "above ev_max_charge_power",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcChargeParameterDiscoveryRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub params: AcCpdResParamsKind,
}

// ============================================================================
// Charge loop
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduledAcChargeLoopReqParams {
    pub ev_target_energy_request: Option<Rq>,
    pub ev_max_energy_request: Option<Rq>,
    pub ev_min_energy_request: Option<Rq>,
    pub ev_max_charge_power: Option<Rq>,
    pub ev_max_charge_power_l2: Option<Rq>,
    pub ev_max_charge_power_l3: Option<Rq>,
    pub ev_min_charge_power: Option<Rq>,
    pub ev_min_charge_power_l2: Option<Rq>,
    pub ev_min_charge_power_l3: Option<Rq>,
    pub ev_present_active_power: Rq,
    pub ev_present_active_power_l2: Option<Rq>,
    pub ev_present_active_power_l3: Option<Rq>,
    pub ev_present_reactive_power: Option<Rq>,
    pub ev_present_reactive_power_l2: Option<Rq>,
    pub ev_present_reactive_power_l3: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptScheduledAcChargeLoopReqParams {
    #[serde(flatten)]
    pub base: ScheduledAcChargeLoopReqParams,
    pub ev_max_discharge_power: Option<Rq>,
    pub ev_max_discharge_power_l2: Option<Rq>,
    pub ev_max_discharge_power_l3: Option<Rq>,
    pub ev_min_discharge_power: Option<Rq>,
    pub ev_min_discharge_power_l2: Option<Rq>,
    pub ev_min_discharge_power_l3: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DynamicAcChargeLoopReqParams {
    pub departure_time: Option<u32>,
    pub ev_target_energy_request: Rq,
    pub ev_max_energy_request: Rq,
    pub ev_min_energy_request: Rq,
    pub ev_max_charge_power: Rq,
    pub ev_max_charge_power_l2: Option<Rq>,
    pub ev_max_charge_power_l3: Option<Rq>,
    pub ev_min_charge_power: Rq,
    pub ev_min_charge_power_l2: Option<Rq>,
    pub ev_min_charge_power_l3: Option<Rq>,
    pub ev_present_active_power: Rq,
    pub ev_present_active_power_l2: Option<Rq>,
    pub ev_present_active_power_l3: Option<Rq>,
    pub ev_present_reactive_power: Rq,
    pub ev_present_reactive_power_l2: Option<Rq>,
    pub ev_present_reactive_power_l3: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptDynamicAcChargeLoopReqParams {
    #[serde(flatten)]
    pub base: DynamicAcChargeLoopReqParams,
    pub ev_max_discharge_power: Rq,
    pub ev_max_discharge_power_l2: Option<Rq>,
    pub ev_max_discharge_power_l3: Option<Rq>,
    pub ev_min_discharge_power: Rq,
    pub ev_min_discharge_power_l2: Option<Rq>,
    pub ev_min_discharge_power_l3: Option<Rq>,
    pub ev_max_v2x_energy_request: Option<Rq>,
    pub ev_min_v2x_energy_request: Option<Rq>,
}

/// The four request shapes a charge loop can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcChargeLoopReqControl {
    Scheduled(ScheduledAcChargeLoopReqParams),
    Dynamic(DynamicAcChargeLoopReqParams),
    BptScheduled(BptScheduledAcChargeLoopReqParams),
    BptDynamic(BptDynamicAcChargeLoopReqParams),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduledAcChargeLoopResParams {
    pub evse_target_active_power: Option<Rq>,
    pub evse_target_active_power_l2: Option<Rq>,
    pub evse_target_active_power_l3: Option<Rq>,
    pub evse_target_reactive_power: Option<Rq>,
    pub evse_target_reactive_power_l2: Option<Rq>,
    pub evse_target_reactive_power_l3: Option<Rq>,
    pub evse_present_active_power: Option<Rq>,
    pub evse_present_active_power_l2: Option<Rq>,
    pub evse_present_active_power_l3: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DynamicAcChargeLoopResParams {
    pub departure_time: Option<u32>,
    pub min_soc: Option<Percent>,
    pub target_soc: Option<Percent>,
    pub ack_max_delay: Option<u16>,
    pub evse_target_active_power: Rq,
    pub evse_target_active_power_l2: Option<Rq>,
    pub evse_target_active_power_l3: Option<Rq>,
    pub evse_target_reactive_power: Option<Rq>,
    pub evse_target_reactive_power_l2: Option<Rq>,
    pub evse_target_reactive_power_l3: Option<Rq>,
    pub evse_present_active_power: Option<Rq>,
    pub evse_present_active_power_l2: Option<Rq>,
    pub evse_present_active_power_l3: Option<Rq>,
}

/// BPT variants answer with the same fields; the variant tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcChargeLoopResControl {
    Scheduled(ScheduledAcChargeLoopResParams),
    Dynamic(DynamicAcChargeLoopResParams),
    BptScheduled(ScheduledAcChargeLoopResParams),
    BptDynamic(DynamicAcChargeLoopResParams),
}

impl Default for AcChargeLoopResControl {
    fn default() -> Self {
        AcChargeLoopResControl::Scheduled(ScheduledAcChargeLoopResParams::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcChargeLoopReq {
    pub header: MessageHeader,
    pub display_parameters: Option<DisplayParameters>,
    pub meter_info_requested: bool,
    pub control: AcChargeLoopReqControl,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcChargeLoopRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub evse_status: Option<EvseStatus>,
    pub meter_info: Option<MeterInfo>,
    pub evse_target_frequency: Option<Rq>,
    pub control: AcChargeLoopResControl,
}

impl Validate for AcChargeLoopRes {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        self.meter_info.validate()
    }
}

header_only_constraints!(AcChargeParameterDiscoveryRes, AcChargeLoopReq);
