//! Enumerations and small records shared by both protocol generations.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::constants::{
    MAX_CERTIFICATE_LEN, MAX_METER_SIGNATURE_LEN, MAX_PARAMETERS, MAX_SUB_CERTIFICATES,
};
use super::validation::{
    BoundedList, Identifier, MeterId, Name, Validate, ValidationError, check_max_len,
};
use crate::rational::RationalQuantity;

/// Application protocols a session can be negotiated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "DIN_SPEC_70121")]
    DinSpec70121,
    #[serde(rename = "ISO_15118_2")]
    Iso15118_2,
    #[serde(rename = "ISO_15118_20_AC")]
    Iso15118_20Ac,
    #[serde(rename = "ISO_15118_20_DC")]
    Iso15118_20Dc,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::DinSpec70121,
        Protocol::Iso15118_2,
        Protocol::Iso15118_20Ac,
        Protocol::Iso15118_20Dc,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::DinSpec70121 => "DIN_SPEC_70121",
            Protocol::Iso15118_2 => "ISO_15118_2",
            Protocol::Iso15118_20Ac => "ISO_15118_20_AC",
            Protocol::Iso15118_20Dc => "ISO_15118_20_DC",
        }
    }

    pub fn namespace(&self) -> &'static str {
        use super::constants::*;
        match self {
            Protocol::DinSpec70121 => NS_DIN_SPEC_70121,
            Protocol::Iso15118_2 => NS_ISO_V2,
            Protocol::Iso15118_20Ac => NS_ISO_V20_AC,
            Protocol::Iso15118_20Dc => NS_ISO_V20_DC,
        }
    }

    pub fn from_namespace(ns: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.namespace() == ns)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn is_v20(&self) -> bool {
        matches!(self, Protocol::Iso15118_20Ac | Protocol::Iso15118_20Dc)
    }

    /// Whether the SECC state machine can run a session for this protocol.
    pub fn is_implemented(&self) -> bool {
        !matches!(self, Protocol::DinSpec70121)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ISO 15118-20 service identifiers (Table 204).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceV20 {
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "DC")]
    Dc,
    #[serde(rename = "WPT")]
    Wpt,
    #[serde(rename = "DC_ACDP")]
    DcAcdp,
    #[serde(rename = "AC_BPT")]
    AcBpt,
    #[serde(rename = "DC_BPT")]
    DcBpt,
    #[serde(rename = "DC_ACDP_BPT")]
    DcAcdpBpt,
    #[serde(rename = "INTERNET")]
    Internet,
    #[serde(rename = "PARKING_STATUS")]
    ParkingStatus,
}

impl ServiceV20 {
    pub const ALL: [ServiceV20; 9] = [
        ServiceV20::Ac,
        ServiceV20::Dc,
        ServiceV20::Wpt,
        ServiceV20::DcAcdp,
        ServiceV20::AcBpt,
        ServiceV20::DcBpt,
        ServiceV20::DcAcdpBpt,
        ServiceV20::Internet,
        ServiceV20::ParkingStatus,
    ];

    pub fn id(&self) -> u16 {
        match self {
            ServiceV20::Ac => 1,
            ServiceV20::Dc => 2,
            ServiceV20::Wpt => 3,
            ServiceV20::DcAcdp => 4,
            ServiceV20::AcBpt => 5,
            ServiceV20::DcBpt => 6,
            ServiceV20::DcAcdpBpt => 7,
            ServiceV20::Internet => 65,
            ServiceV20::ParkingStatus => 66,
        }
    }

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceV20::Ac => "AC",
            ServiceV20::Dc => "DC",
            ServiceV20::Wpt => "WPT",
            ServiceV20::DcAcdp => "DC_ACDP",
            ServiceV20::AcBpt => "AC_BPT",
            ServiceV20::DcBpt => "DC_BPT",
            ServiceV20::DcAcdpBpt => "DC_ACDP_BPT",
            ServiceV20::Internet => "INTERNET",
            ServiceV20::ParkingStatus => "PARKING_STATUS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn is_energy_service(&self) -> bool {
        self.id() < 65
    }

    pub fn is_bpt(&self) -> bool {
        matches!(
            self,
            ServiceV20::AcBpt | ServiceV20::DcBpt | ServiceV20::DcAcdpBpt
        )
    }

    pub fn is_ac(&self) -> bool {
        matches!(self, ServiceV20::Ac | ServiceV20::AcBpt)
    }

    pub fn is_dc(&self) -> bool {
        matches!(
            self,
            ServiceV20::Dc | ServiceV20::DcAcdp | ServiceV20::DcBpt | ServiceV20::DcAcdpBpt
        )
    }
}

impl fmt::Display for ServiceV20 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ControlMode {
    #[default]
    Scheduled,
    Dynamic,
}

/// IEC 61851-1 control pilot state as seen by the charger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CpState {
    #[default]
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
    D1,
    D2,
    E,
    F,
}

impl CpState {
    /// Vehicle requests energy and the PWM is on: contactors may close.
    pub fn is_energized_closed(&self) -> bool {
        matches!(self, CpState::C2 | CpState::D2)
    }
}

impl fmt::Display for CpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Identification mode: external identification means or Plug & Charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMode {
    #[serde(rename = "EIM")]
    Eim,
    #[serde(rename = "PNC")]
    Pnc,
}

impl AuthMode {
    pub const ALL: [AuthMode; 2] = [AuthMode::Eim, AuthMode::Pnc];

    pub fn name(&self) -> &'static str {
        match self {
            AuthMode::Eim => "EIM",
            AuthMode::Pnc => "PNC",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    Accepted,
    Ongoing,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Processing {
    #[default]
    Finished,
    Ongoing,
    #[serde(rename = "Ongoing_WaitingForCustomerInteraction")]
    OngoingWaitingForCustomerInteraction,
}

impl Processing {
    pub fn is_ongoing(&self) -> bool {
        !matches!(self, Processing::Finished)
    }
}

/// ChargeProgress of a PowerDeliveryReq. `Renegotiate` is -2 only,
/// `Standby` and `ScheduleRenegotiation` are -20 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChargeProgress {
    #[default]
    Start,
    Stop,
    Renegotiate,
    Standby,
    ScheduleRenegotiation,
}

/// ChargingSession of a SessionStopReq.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChargingSession {
    Pause,
    #[default]
    Terminate,
    ServiceRenegotiation,
}

/// ISO 15118-2 EnergyTransferModeType.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnergyTransferMode {
    #[serde(rename = "AC_single_phase_core")]
    AcSinglePhaseCore,
    #[default]
    #[serde(rename = "AC_three_phase_core")]
    AcThreePhaseCore,
    #[serde(rename = "DC_core")]
    DcCore,
    #[serde(rename = "DC_extended")]
    DcExtended,
    #[serde(rename = "DC_combo_core")]
    DcComboCore,
    #[serde(rename = "DC_unique")]
    DcUnique,
}

impl EnergyTransferMode {
    pub fn is_dc(&self) -> bool {
        !matches!(
            self,
            EnergyTransferMode::AcSinglePhaseCore | EnergyTransferMode::AcThreePhaseCore
        )
    }
}

/// EVSENotification values of both generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EvseNotification {
    #[default]
    None,
    StopCharging,
    ReNegotiation,
    Pause,
    ExitStandby,
    Terminate,
    MeteringConfirmation,
    ScheduleRenegotiation,
    ServiceRenegotiation,
}

/// ISO 15118-2 isolation monitoring result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    #[default]
    Invalid,
    Valid,
    Warning,
    Fault,
    NoImd,
}

/// ISO 15118-2 DC_EVSEStatusCodeType.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DcEvseStatusCode {
    #[serde(rename = "EVSE_NotReady")]
    NotReady,
    #[default]
    #[serde(rename = "EVSE_Ready")]
    Ready,
    #[serde(rename = "EVSE_Shutdown")]
    Shutdown,
    #[serde(rename = "EVSE_UtilityInterruptEvent")]
    UtilityInterruptEvent,
    #[serde(rename = "EVSE_IsolationMonitoringActive")]
    IsolationMonitoringActive,
    #[serde(rename = "EVSE_EmergencyShutdown")]
    EmergencyShutdown,
    #[serde(rename = "EVSE_Malfunction")]
    Malfunction,
}

/// ISO 15118-2 DC_EVErrorCodeType (subset the SECC reacts to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DcEvErrorCode {
    #[default]
    #[serde(rename = "NO_ERROR")]
    NoError,
    #[serde(rename = "FAILED_RESSTemperatureInhibit")]
    RessTemperatureInhibit,
    #[serde(rename = "FAILED_EVShiftPosition")]
    EvShiftPosition,
    #[serde(rename = "FAILED_ChargerConnectorLockFault")]
    ChargerConnectorLockFault,
    #[serde(rename = "FAILED_EVRESSMalfunction")]
    EvRessMalfunction,
    #[serde(rename = "FAILED_ChargingCurrentdifferential")]
    ChargingCurrentDifferential,
    #[serde(rename = "FAILED_ChargingVoltageOutOfRange")]
    ChargingVoltageOutOfRange,
    #[serde(rename = "FAILED_ChargingSystemIncompatibility")]
    ChargingSystemIncompatibility,
    #[serde(rename = "NoData")]
    NoData,
}

/// Which direction a BPT PowerDeliveryReq starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelSelection {
    Charge,
    Discharge,
}

/// -20 EVSEStatus; also used for the AC status of -2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvseStatus {
    pub notification_max_delay: u16,
    pub evse_notification: EvseNotification,
}

/// A typed service parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Finite(RationalQuantity),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Name,
    pub value: ParameterValue,
}

impl Parameter {
    pub fn new(name: &str, value: ParameterValue) -> Result<Self, ValidationError> {
        Ok(Self {
            name: Name::new(name)?,
            value,
        })
    }

    pub fn int(name: &str, value: i32) -> Result<Self, ValidationError> {
        Self::new(name, ParameterValue::Int(value))
    }
}

/// One offered configuration of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub id: u16,
    pub parameters: BoundedList<Parameter, MAX_PARAMETERS>,
}

impl ParameterSet {
    pub fn new(id: u16, parameters: Vec<Parameter>) -> Result<Self, ValidationError> {
        Ok(Self {
            id,
            parameters: BoundedList::new(parameters)?,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters
            .iter()
            .find(|p| p.name.as_str() == name)
            .map(|p| &p.value)
    }
}

/// A service chosen by the EV, optionally with one of its parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectedService {
    pub service_id: u16,
    pub parameter_set_id: Option<u16>,
}

/// The energy service bound during service selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedEnergyService {
    pub service: ServiceV20,
    pub is_free: bool,
    pub parameter_set: Option<ParameterSet>,
}

impl SelectedEnergyService {
    /// Control mode announced in the parameter set, if any.
    pub fn control_mode(&self) -> Option<ControlMode> {
        match self.parameter_set.as_ref()?.get("ControlMode")? {
            ParameterValue::Int(1) => Some(ControlMode::Scheduled),
            ParameterValue::Int(2) => Some(ControlMode::Dynamic),
            _ => None,
        }
    }
}

/// A value-added service bound during service selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedVas {
    pub service: ServiceV20,
    pub is_free: bool,
    pub parameter_set: ParameterSet,
}

/// Contract certificate chain (DER), leaf first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CertificateChain {
    pub id: Option<Identifier>,
    pub certificate: Vec<u8>,
    pub sub_certificates: Vec<Vec<u8>>,
}

impl Validate for CertificateChain {
    fn validate(&self) -> Result<(), ValidationError> {
        check_max_len("certificate", self.certificate.len(), MAX_CERTIFICATE_LEN)?;
        check_max_len(
            "sub_certificates",
            self.sub_certificates.len(),
            MAX_SUB_CERTIFICATES,
        )?;
        for cert in &self.sub_certificates {
            check_max_len("sub_certificate", cert.len(), MAX_CERTIFICATE_LEN)?;
        }
        Ok(())
    }
}

/// Meter reading attached to charge loop / charging status responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterInfo {
    pub meter_id: MeterId,
    pub charged_energy_reading_wh: u64,
    pub discharged_energy_reading_wh: Option<u64>,
    pub meter_signature: Option<Vec<u8>>,
    pub meter_status: Option<i16>,
    pub meter_timestamp: Option<u64>,
}

impl Validate for MeterInfo {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(sig) = &self.meter_signature {
            check_max_len("meter_signature", sig.len(), MAX_METER_SIGNATURE_LEN)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_ids() {
        for service in ServiceV20::ALL {
            assert_eq!(ServiceV20::from_id(service.id()), Some(service));
            assert_eq!(ServiceV20::from_name(service.name()), Some(service));
        }
        assert_eq!(ServiceV20::from_id(8), None);
        assert!(ServiceV20::AcBpt.is_bpt() && ServiceV20::AcBpt.is_ac());
        assert!(ServiceV20::DcAcdp.is_dc() && !ServiceV20::DcAcdp.is_bpt());
        assert!(!ServiceV20::Internet.is_energy_service());
    }

    #[test]
    fn test_cp_state_energized() {
        let closed: Vec<_> = [
            CpState::A1,
            CpState::A2,
            CpState::B1,
            CpState::B2,
            CpState::C1,
            CpState::C2,
            CpState::D1,
            CpState::D2,
            CpState::E,
            CpState::F,
        ]
        .into_iter()
        .filter(CpState::is_energized_closed)
        .collect();
        assert_eq!(closed, vec![CpState::C2, CpState::D2]);
    }

    #[test]
    fn test_protocol_namespaces() {
        for p in Protocol::ALL {
            assert_eq!(Protocol::from_namespace(p.namespace()), Some(p));
        }
        assert!(!Protocol::DinSpec70121.is_implemented());
        assert!(Protocol::Iso15118_20Dc.is_v20());
    }

    #[test]
    fn test_selected_service_control_mode() {
        let set = ParameterSet::new(1, vec![Parameter::int("ControlMode", 2).unwrap()]).unwrap();
        let selected = SelectedEnergyService {
            service: ServiceV20::Ac,
            is_free: false,
            parameter_set: Some(set),
        };
        assert_eq!(selected.control_mode(), Some(ControlMode::Dynamic));
    }

    #[test]
    fn test_meter_signature_limit() {
        let mut info = MeterInfo {
            meter_id: MeterId::new("METER-1").unwrap(),
            charged_energy_reading_wh: 10,
            discharged_energy_reading_wh: None,
            meter_signature: Some(vec![0; 64]),
            meter_status: None,
            meter_timestamp: None,
        };
        assert!(info.validate().is_ok());
        info.meter_signature = Some(vec![0; 65]);
        assert!(info.validate().is_err());
    }
}
