//! Protocol constants from ISO 15118-2 and ISO 15118-20.
//!
//! Length limits follow the XSD types of the respective schemas
//! (`V2G_CI_CommonTypes.xsd` for -20, `V2G_CI_MsgDataTypes.xsd` for -2).

// ============================================================================
// Namespaces (SupportedAppProtocol handshake)
// ============================================================================

pub const NS_ISO_V2: &str = "urn:iso:15118:2:2013:MsgDef";
pub const NS_ISO_V20_AC: &str = "urn:iso:std:iso:15118:-20:AC";
pub const NS_ISO_V20_DC: &str = "urn:iso:std:iso:15118:-20:DC";
pub const NS_DIN_SPEC_70121: &str = "urn:din:70121:2012:MsgDef";

/// Every -20 namespace starts with this.
pub const NS_ISO_V20_BASE: &str = "urn:iso:std:iso:15118:-20";

// ============================================================================
// Field Length Limits
// ============================================================================

/// SessionID: hexBinary, 8 bytes as 16 hex characters.
pub const SESSION_ID_HEX_LEN: usize = 16;

/// identifierType
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// nameType
pub const MAX_NAME_LEN: usize = 80;

/// descriptionType
pub const MAX_DESCRIPTION_LEN: usize = 160;

/// certificateType (DER encoded X.509)
pub const MAX_CERTIFICATE_LEN: usize = 1600;

/// genChallengeType
pub const GEN_CHALLENGE_LEN: usize = 16;

/// MeterID
pub const MAX_METER_ID_LEN: usize = 32;

/// MeterSignature
pub const MAX_METER_SIGNATURE_LEN: usize = 64;

/// v2 EVCCID: MAC address, 6 bytes as hex.
pub const V2_EVCC_ID_HEX_LEN: usize = 12;

/// EVSEID
pub const MAX_EVSE_ID_LEN: usize = 37;

/// Currency code (ISO 4217)
pub const MAX_CURRENCY_LEN: usize = 3;

/// Signature value inside a message header
pub const MAX_SIGNATURE_VALUE_LEN: usize = 256;

// ============================================================================
// List Limits
// ============================================================================

pub const MAX_ROOT_CERT_IDS: usize = 20;
pub const MAX_TAX_COSTS: usize = 10;
pub const MAX_SUB_CERTIFICATES: usize = 3;
pub const MAX_APP_PROTOCOLS: usize = 20;

/// v2 SAScheduleList
pub const MAX_SA_SCHEDULE_TUPLES: usize = 3;
/// v2 PMaxSchedule entries
pub const MAX_PMAX_SCHEDULE_ENTRIES: usize = 1024;
/// v2 ChargingProfile entries
pub const MAX_PROFILE_ENTRIES: usize = 24;
/// v2 ServiceList / v20 ServiceList
pub const MAX_SERVICES: usize = 8;
/// v20 ParameterSet list
pub const MAX_PARAMETER_SETS: usize = 32;
/// v20 parameters inside one ParameterSet
pub const MAX_PARAMETERS: usize = 32;
/// v20 PowerScheduleEntryList
pub const MAX_POWER_SCHEDULE_ENTRIES: usize = 1024;
/// v20 ScheduleTupleList
pub const MAX_SCHEDULE_TUPLES: usize = 3;
/// v20 SelectedVASList
pub const MAX_SELECTED_VAS: usize = 16;
/// v2/v20 supported payment/auth options
pub const MAX_AUTH_OPTIONS: usize = 2;

// ============================================================================
// Schedules
// ============================================================================

/// V2G2-304: without a departure time the offered schedule covers at least this.
pub const MIN_SCHEDULE_COVERAGE_SECS: u32 = 86_400;

/// Largest RelativeTimeInterval start, seconds.
pub const V2_MAX_INTERVAL_START: u32 = 16_777_214;

/// Largest RelativeTimeInterval duration, seconds.
pub const V2_MAX_INTERVAL_DURATION: u32 = 86_400;

/// Default `MaximumSupportingPoints` announced by an EV.
pub const DEFAULT_MAX_SUPPORTING_POINTS: u16 = 1024;

/// Default SAScheduleTupleID offered by the SECC.
pub const DEFAULT_SA_SCHEDULE_TUPLE_ID: u8 = 1;

// ============================================================================
// Timeouts (seconds)
// ============================================================================

/// V2G_SECC_Sequence_Timeout
pub const SECC_SEQUENCE_TIMEOUT_SECS: u64 = 60;

/// V2G_SECC_Ongoing_Timeout
pub const SECC_ONGOING_TIMEOUT_SECS: u64 = 60;

/// V2G_SECC_CommunicationSetup_Timeout
pub const SECC_COMMUNICATION_SETUP_TIMEOUT_SECS: u64 = 20;

// ============================================================================
// Physical Limits
// ============================================================================

/// PVEVSEMaxPowerLimit upper bound (v2), watts.
pub const V2_MAX_POWER_LIMIT_W: f64 = 200_000.0;

/// PVEVMaxCurrent / PVEVSEMaxCurrent upper bound (v2), amperes.
pub const V2_MAX_CURRENT_LIMIT_A: f64 = 400.0;

/// PVEVSEMaxVoltage upper bound (v2), volts.
pub const V2_MAX_VOLTAGE_LIMIT_V: f64 = 1000.0;
