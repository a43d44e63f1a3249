//! SupportedAppProtocol handshake (ISO 15118-2 Annex / -20 clause 8.3.3).

use serde::{Deserialize, Serialize};

use super::constants::MAX_APP_PROTOCOLS;
use super::response::ResponseCode;
use super::validation::{BoundedList, Validate, ValidationError, check_max_len};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppProtocol {
    pub protocol_namespace: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub schema_id: u8,
    /// 1 is the most preferred.
    pub priority: u8,
}

impl Validate for AppProtocol {
    fn validate(&self) -> Result<(), ValidationError> {
        check_max_len("protocol_namespace", self.protocol_namespace.len(), 100)?;
        if !(1..=20).contains(&self.priority) {
            return Err(ValidationError::new(
                "priority",
                format!("{} outside 1..=20", self.priority),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedAppProtocolReq {
    pub app_protocols: BoundedList<AppProtocol, MAX_APP_PROTOCOLS>,
}

impl Validate for SupportedAppProtocolReq {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.app_protocols.is_empty() {
            return Err(ValidationError::new("app_protocols", "empty"));
        }
        self.app_protocols.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupportedAppProtocolRes {
    pub response_code: ResponseCode,
    pub schema_id: Option<u8>,
}

impl SupportedAppProtocolRes {
    pub fn failed() -> Self {
        Self {
            response_code: ResponseCode::FailedNoNegotiation,
            schema_id: None,
        }
    }
}

impl Validate for SupportedAppProtocolRes {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.response_code.permits_continuation() && self.schema_id.is_none() {
            return Err(ValidationError::new(
                "schema_id",
                "required on successful negotiation",
            ));
        }
        Ok(())
    }
}
