//! Message header shared by every V2G message.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::constants::{MAX_SIGNATURE_VALUE_LEN, SESSION_ID_HEX_LEN};
use super::validation::{Identifier, Validate, ValidationError, check_exact_len, check_hex, check_max_len};

/// SessionID: 8 bytes, carried as 16 upper-case hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// All-zero id sent by an EV that wants a fresh session.
    pub const ZERO_STR: &'static str = "0000000000000000";

    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        check_exact_len("session_id", value.len(), SESSION_ID_HEX_LEN)?;
        check_hex("session_id", &value)?;
        Ok(Self(value.to_ascii_uppercase()))
    }

    pub fn zero() -> Self {
        Self(Self::ZERO_STR.to_string())
    }

    /// Draw a fresh random, non-zero id.
    pub fn generate() -> Self {
        loop {
            let bytes = rand::random::<[u8; 8]>();
            if bytes != [0; 8] {
                return Self::from_bytes(bytes);
            }
        }
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes.iter().map(|b| format!("{b:02X}")).collect())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Self::ZERO_STR
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<String> for SessionId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// XML signature over parts of the message body. Verification happens
/// outside this crate; only the shape is checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub id: Option<Identifier>,
    pub signed_element_ids: Vec<Identifier>,
    pub signature_value: Vec<u8>,
}

impl Validate for Signature {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.signature_value.is_empty() {
            return Err(ValidationError::new("signature_value", "empty"));
        }
        check_max_len(
            "signature_value",
            self.signature_value.len(),
            MAX_SIGNATURE_VALUE_LEN,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageHeader {
    pub session_id: SessionId,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub signature: Option<Signature>,
}

impl MessageHeader {
    /// Header stamped with the current time.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            timestamp: now_timestamp(),
            signature: None,
        }
    }
}

impl Validate for MessageHeader {
    fn validate(&self) -> Result<(), ValidationError> {
        self.signature.validate()
    }
}

/// Current Unix time in seconds.
pub fn now_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let id = SessionId::new("00ab12cd34ef5678").unwrap();
        assert_eq!(id.as_str(), "00AB12CD34EF5678");
        assert!(SessionId::new("00AB").is_err());
        assert!(SessionId::new("00AB12CD34EF567G").is_err());
        assert!(SessionId::zero().is_zero());
    }

    #[test]
    fn test_generated_session_id() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 16);
        assert!(!id.is_zero());
        assert!(SessionId::new(id.as_str()).is_ok());
    }

    #[test]
    fn test_session_id_deserialize_validates() {
        let res: Result<SessionId, _> = serde_json::from_str("\"1234\"");
        assert!(res.is_err());
    }

    #[test]
    fn test_header_signature_shape() {
        let mut header = MessageHeader::new(SessionId::zero());
        assert!(header.timestamp > 0);
        header.signature = Some(Signature {
            id: None,
            signed_element_ids: vec![],
            signature_value: vec![],
        });
        assert!(header.validate().is_err());
    }
}
