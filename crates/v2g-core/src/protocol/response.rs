//! Response codes.
//!
//! One closed enumeration covers the SupportedAppProtocol handshake, ISO
//! 15118-2 and ISO 15118-20. Wire names are kept exactly as the schemas
//! spell them; the prefix decides the category.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::validation::ValidationError;

/// OK / WARNING / FAILED partition of [`ResponseCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCategory {
    Ok,
    Warning,
    Failed,
}

macro_rules! response_codes {
    ($($variant:ident => $wire:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub enum ResponseCode {
            #[default]
            $(
                #[serde(rename = $wire)]
                $variant,
            )*
        }

        impl ResponseCode {
            pub const ALL: &'static [ResponseCode] = &[$(ResponseCode::$variant,)*];

            /// Wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ResponseCode::$variant => $wire,)*
                }
            }
        }

        impl FromStr for ResponseCode {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(ResponseCode::$variant),)*
                    _ => Err(ValidationError::new(
                        "response_code",
                        format!("unknown response code '{s}'"),
                    )),
                }
            }
        }
    };
}

// `Ok` must stay first: it is the default.
response_codes! {
    Ok => "OK",
    OkSuccessfulNegotiation => "OK_SuccessfulNegotiation",
    OkSuccessfulNegotiationWithMinorDeviation => "OK_SuccessfulNegotiationWithMinorDeviation",
    OkCertificateExpiresSoon => "OK_CertificateExpiresSoon",
    OkNewSessionEstablished => "OK_NewSessionEstablished",
    OkOldSessionJoined => "OK_OldSessionJoined",
    OkPowerToleranceConfirmed => "OK_PowerToleranceConfirmed",
    WarningAuthorizationSelectionInvalid => "WARNING_AuthorizationSelectionInvalid",
    WarningCertificateExpired => "WARNING_CertificateExpired",
    WarningCertificateNotYetValid => "WARNING_CertificateNotYetValid",
    WarningCertificateRevoked => "WARNING_CertificateRevoked",
    WarningCertificateValidationError => "WARNING_CertificateValidationError",
    WarningChallengeInvalid => "WARNING_ChallengeInvalid",
    WarningEimAuthorizationFailure => "WARNING_EIMAuthorizationFailure",
    WarningEmspUnknown => "WARNING_eMSPUnknown",
    WarningEvPowerProfileViolation => "WARNING_EVPowerProfileViolation",
    WarningGeneralPncAuthorizationError => "WARNING_GeneralPnCAuthorizationError",
    WarningNoCertificateAvailable => "WARNING_NoCertificateAvailable",
    WarningNoContractMatchingPcidFound => "WARNING_NoContractMatchingPCIDFound",
    WarningPowerToleranceNotConfirmed => "WARNING_PowerToleranceNotConfirmed",
    WarningScheduleRenegotiationFailed => "WARNING_ScheduleRenegotiationFailed",
    WarningStandbyNotAllowed => "WARNING_StandbyNotAllowed",
    WarningWpt => "WARNING_WPT",
    Failed => "FAILED",
    FailedNoNegotiation => "Failed_NoNegotiation",
    FailedAssociationError => "FAILED_AssociationError",
    FailedCertChainError => "FAILED_CertChainError",
    FailedCertificateExpired => "FAILED_CertificateExpired",
    FailedCertificateNotAllowedAtThisEvse => "FAILED_CertificateNotAllowedAtThisEVSE",
    FailedCertificateRevoked => "FAILED_CertificateRevoked",
    FailedChallengeInvalid => "FAILED_ChallengeInvalid",
    FailedChargingProfileInvalid => "FAILED_ChargingProfileInvalid",
    FailedContactorError => "FAILED_ContactorError",
    FailedContractCanceled => "FAILED_ContractCanceled",
    FailedEvPowerProfileInvalid => "FAILED_EVPowerProfileInvalid",
    FailedEvPowerProfileViolation => "FAILED_EVPowerProfileViolation",
    FailedMeteringSignatureNotValid => "FAILED_MeteringSignatureNotValid",
    FailedNoCertificateAvailable => "FAILED_NoCertificateAvailable",
    FailedNoChargeServiceSelected => "FAILED_NoChargeServiceSelected",
    FailedNoEnergyTransferServiceSelected => "FAILED_NoEnergyTransferServiceSelected",
    FailedNoServiceRenegotiationSupported => "FAILED_NoServiceRenegotiationSupported",
    FailedPauseNotAllowed => "FAILED_PauseNotAllowed",
    FailedPaymentSelectionInvalid => "FAILED_PaymentSelectionInvalid",
    FailedPowerDeliveryNotApplied => "FAILED_PowerDeliveryNotApplied",
    FailedPowerToleranceNotConfirmed => "FAILED_PowerToleranceNotConfirmed",
    FailedScheduleRenegotiation => "FAILED_ScheduleRenegotiation",
    FailedScheduleSelectionInvalid => "FAILED_ScheduleSelectionInvalid",
    FailedSequenceError => "FAILED_SequenceError",
    FailedServiceIdInvalid => "FAILED_ServiceIDInvalid",
    FailedServiceSelectionInvalid => "FAILED_ServiceSelectionInvalid",
    FailedSignatureError => "FAILED_SignatureError",
    FailedTariffSelectionInvalid => "FAILED_TariffSelectionInvalid",
    FailedUnknownSession => "FAILED_UnknownSession",
    FailedWrongChargeParameter => "FAILED_WrongChargeParameter",
    FailedWrongEnergyTransferMode => "FAILED_WrongEnergyTransferMode",
}

impl ResponseCode {
    pub fn category(&self) -> ResponseCategory {
        let wire = self.as_str();
        if wire.starts_with("OK") {
            ResponseCategory::Ok
        } else if wire.starts_with("WARNING") {
            ResponseCategory::Warning
        } else {
            ResponseCategory::Failed
        }
    }

    /// Only OK and WARNING codes let the session continue.
    pub fn permits_continuation(&self) -> bool {
        self.category() != ResponseCategory::Failed
    }

    pub fn is_failed(&self) -> bool {
        self.category() == ResponseCategory::Failed
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(ResponseCode::Ok.category(), ResponseCategory::Ok);
        assert_eq!(
            ResponseCode::OkOldSessionJoined.category(),
            ResponseCategory::Ok
        );
        assert_eq!(
            ResponseCode::WarningWpt.category(),
            ResponseCategory::Warning
        );
        assert_eq!(
            ResponseCode::FailedSequenceError.category(),
            ResponseCategory::Failed
        );
        assert_eq!(
            ResponseCode::FailedNoNegotiation.category(),
            ResponseCategory::Failed
        );
    }

    #[test]
    fn test_only_failed_codes_stop_the_session() {
        for code in ResponseCode::ALL {
            assert_eq!(
                code.permits_continuation(),
                !code.as_str().to_ascii_uppercase().starts_with("FAILED"),
                "{code}"
            );
        }
    }

    #[test]
    fn test_wire_names_round_trip() {
        for code in ResponseCode::ALL {
            assert_eq!(code.as_str().parse::<ResponseCode>().unwrap(), *code);
        }
        assert!("FAILED_Bogus".parse::<ResponseCode>().is_err());
        assert_eq!(
            serde_json::to_string(&ResponseCode::FailedServiceIdInvalid).unwrap(),
            "\"FAILED_ServiceIDInvalid\""
        );
    }
}
