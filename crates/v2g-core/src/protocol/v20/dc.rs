//! ISO 15118-20 DC messages (`V2G_CI_DC.xsd`).

use serde::{Deserialize, Serialize};

use super::common::DisplayParameters;
use crate::protocol::header::MessageHeader;
use crate::protocol::response::ResponseCode;
use crate::protocol::types::{EvseStatus, MeterInfo, Processing};
use crate::protocol::validation::{
    Percent, Validate, ValidationError, header_only_constraints,
};
use crate::rational::RationalQuantity;

type Rq = RationalQuantity;

// ============================================================================
// Charge parameter discovery
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcCpdReqParams {
    pub ev_max_charge_power: Rq,
    pub ev_min_charge_power: Rq,
    pub ev_max_charge_current: Rq,
    pub ev_min_charge_current: Rq,
    pub ev_max_voltage: Rq,
    pub ev_min_voltage: Rq,
    pub target_soc: Option<Percent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptDcCpdReqParams {
    #[serde(flatten)]
    pub base: DcCpdReqParams,
    pub ev_max_discharge_power: Rq,
    pub ev_min_discharge_power: Rq,
    pub ev_max_discharge_current: Rq,
    pub ev_min_discharge_current: Rq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DcCpdReqParamsKind {
    Dc(DcCpdReqParams),
    Bpt(BptDcCpdReqParams),
}

impl DcCpdReqParamsKind {
    pub fn base(&self) -> &DcCpdReqParams {
        match self {
            DcCpdReqParamsKind::Dc(p) => p,
            DcCpdReqParamsKind::Bpt(p) => &p.base,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcCpdResParams {
    pub evse_max_charge_power: Rq,
    pub evse_min_charge_power: Rq,
    pub evse_max_charge_current: Rq,
    pub evse_min_charge_current: Rq,
    pub evse_max_voltage: Rq,
    pub evse_min_voltage: Rq,
    pub evse_power_ramp_limitation: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptDcCpdResParams {
    #[serde(flatten)]
    pub base: DcCpdResParams,
    pub evse_max_discharge_power: Rq,
    pub evse_min_discharge_power: Rq,
    pub evse_max_discharge_current: Rq,
    pub evse_min_discharge_current: Rq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DcCpdResParamsKind {
    Dc(DcCpdResParams),
    Bpt(BptDcCpdResParams),
}

impl Default for DcCpdResParamsKind {
    fn default() -> Self {
        DcCpdResParamsKind::Dc(DcCpdResParams::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcChargeParameterDiscoveryReq {
    pub header: MessageHeader,
    pub params: DcCpdReqParamsKind,
}

impl Validate for DcChargeParameterDiscoveryReq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        let base = self.params.base();
        if base.ev_min_voltage.decode() > base.ev_max_voltage.decode() {
            return Err(ValidationError::new("ev_min_voltage", "above ev_max_voltage"));
        }
        if base.ev_min_charge_current.decode() > base.ev_max_charge_current.decode() {
            return Err(ValidationError::new(
                "ev_min_charge_current",
                "above ev_max_charge_current",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcChargeParameterDiscoveryRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub params: DcCpdResParamsKind,
}

// ============================================================================
// Cable check, pre-charge, welding detection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcCableCheckReq {
    pub header: MessageHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcCableCheckRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub evse_processing: Processing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcPreChargeReq {
    pub header: MessageHeader,
    pub ev_processing: Processing,
    pub ev_present_voltage: Rq,
    pub ev_target_voltage: Rq,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcPreChargeRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub evse_present_voltage: Rq,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcWeldingDetectionReq {
    pub header: MessageHeader,
    pub ev_processing: Processing,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcWeldingDetectionRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub evse_present_voltage: Rq,
}

// ============================================================================
// Charge loop
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduledDcChargeLoopReqParams {
    pub ev_target_energy_request: Option<Rq>,
    pub ev_max_energy_request: Option<Rq>,
    pub ev_min_energy_request: Option<Rq>,
    pub ev_target_current: Rq,
    pub ev_target_voltage: Rq,
    pub ev_max_charge_power: Option<Rq>,
    pub ev_min_charge_power: Option<Rq>,
    pub ev_max_charge_current: Option<Rq>,
    pub ev_max_voltage: Option<Rq>,
    pub ev_min_voltage: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptScheduledDcChargeLoopReqParams {
    #[serde(flatten)]
    pub base: ScheduledDcChargeLoopReqParams,
    pub ev_max_discharge_power: Option<Rq>,
    pub ev_min_discharge_power: Option<Rq>,
    pub ev_max_discharge_current: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DynamicDcChargeLoopReqParams {
    pub departure_time: Option<u32>,
    pub ev_target_energy_request: Rq,
    pub ev_max_energy_request: Rq,
    pub ev_min_energy_request: Rq,
    pub ev_max_charge_power: Rq,
    pub ev_min_charge_power: Rq,
    pub ev_max_charge_current: Rq,
    pub ev_max_voltage: Rq,
    pub ev_min_voltage: Rq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptDynamicDcChargeLoopReqParams {
    #[serde(flatten)]
    pub base: DynamicDcChargeLoopReqParams,
    pub ev_max_discharge_power: Rq,
    pub ev_min_discharge_power: Rq,
    pub ev_max_discharge_current: Rq,
    pub ev_max_v2x_energy_request: Option<Rq>,
    pub ev_min_v2x_energy_request: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DcChargeLoopReqControl {
    Scheduled(ScheduledDcChargeLoopReqParams),
    Dynamic(DynamicDcChargeLoopReqParams),
    BptScheduled(BptScheduledDcChargeLoopReqParams),
    BptDynamic(BptDynamicDcChargeLoopReqParams),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduledDcChargeLoopResParams {
    pub evse_max_charge_power: Option<Rq>,
    pub evse_min_charge_power: Option<Rq>,
    pub evse_max_charge_current: Option<Rq>,
    pub evse_max_voltage: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptScheduledDcChargeLoopResParams {
    #[serde(flatten)]
    pub base: ScheduledDcChargeLoopResParams,
    pub evse_max_discharge_power: Option<Rq>,
    pub evse_min_discharge_power: Option<Rq>,
    pub evse_max_discharge_current: Option<Rq>,
    pub evse_min_voltage: Option<Rq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DynamicDcChargeLoopResParams {
    pub departure_time: Option<u32>,
    pub min_soc: Option<Percent>,
    pub target_soc: Option<Percent>,
    pub ack_max_delay: Option<u16>,
    pub evse_max_charge_power: Rq,
    pub evse_min_charge_power: Rq,
    pub evse_max_charge_current: Rq,
    pub evse_max_voltage: Rq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BptDynamicDcChargeLoopResParams {
    #[serde(flatten)]
    pub base: DynamicDcChargeLoopResParams,
    pub evse_max_discharge_power: Rq,
    pub evse_min_discharge_power: Rq,
    pub evse_max_discharge_current: Rq,
    pub evse_min_voltage: Rq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DcChargeLoopResControl {
    Scheduled(ScheduledDcChargeLoopResParams),
    Dynamic(DynamicDcChargeLoopResParams),
    BptScheduled(BptScheduledDcChargeLoopResParams),
    BptDynamic(BptDynamicDcChargeLoopResParams),
}

impl Default for DcChargeLoopResControl {
    fn default() -> Self {
        DcChargeLoopResControl::Scheduled(ScheduledDcChargeLoopResParams::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcChargeLoopReq {
    pub header: MessageHeader,
    pub display_parameters: Option<DisplayParameters>,
    pub meter_info_requested: bool,
    pub ev_present_voltage: Rq,
    pub control: DcChargeLoopReqControl,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DcChargeLoopRes {
    pub header: MessageHeader,
    pub response_code: ResponseCode,
    pub evse_status: Option<EvseStatus>,
    pub meter_info: Option<MeterInfo>,
    pub evse_present_current: Rq,
    pub evse_present_voltage: Rq,
    pub evse_power_limit_achieved: bool,
    pub evse_current_limit_achieved: bool,
    pub evse_voltage_limit_achieved: bool,
    pub control: DcChargeLoopResControl,
}

impl Validate for DcChargeLoopRes {
    fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        self.meter_info.validate()
    }
}

header_only_constraints!(
    DcChargeParameterDiscoveryRes,
    DcCableCheckReq,
    DcCableCheckRes,
    DcPreChargeReq,
    DcPreChargeRes,
    DcWeldingDetectionReq,
    DcWeldingDetectionRes,
    DcChargeLoopReq,
);
