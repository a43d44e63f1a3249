//! ISO 15118-20 messages.
//!
//! Unlike -2, every -20 message carries its own header, so each message
//! struct has a `header` field and the envelopes are plain enums.

mod ac;
mod common;
mod dc;

pub use ac::*;
pub use common::*;
pub use dc::*;

use serde::{Deserialize, Serialize};

use super::header::MessageHeader;
use super::message::MessageKind;
use super::response::ResponseCode;
use super::validation::{Validate, ValidationError};

macro_rules! v20_messages {
    ($($variant:ident($req:ident, $res:ident) => $kind:ident,)*) => {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum Request {
            $($variant($req),)*
        }

        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum Response {
            $($variant($res),)*
        }

        impl Request {
            pub fn kind(&self) -> MessageKind {
                match self {
                    $(Request::$variant(_) => MessageKind::$kind,)*
                }
            }

            pub fn header(&self) -> &MessageHeader {
                match self {
                    $(Request::$variant(m) => &m.header,)*
                }
            }

            /// The matching response, otherwise empty, carrying `code`.
            pub fn failed_response(&self, header: MessageHeader, code: ResponseCode) -> Response {
                match self {
                    $(Request::$variant(_) => Response::$variant($res {
                        header,
                        response_code: code,
                        ..Default::default()
                    }),)*
                }
            }
        }

        impl Response {
            pub fn kind(&self) -> MessageKind {
                match self {
                    $(Response::$variant(_) => MessageKind::$kind,)*
                }
            }

            pub fn header(&self) -> &MessageHeader {
                match self {
                    $(Response::$variant(m) => &m.header,)*
                }
            }

            pub fn response_code(&self) -> ResponseCode {
                match self {
                    $(Response::$variant(m) => m.response_code,)*
                }
            }
        }

        impl Validate for Request {
            fn validate(&self) -> Result<(), ValidationError> {
                match self {
                    $(Request::$variant(m) => m.validate(),)*
                }
            }
        }

        impl Validate for Response {
            fn validate(&self) -> Result<(), ValidationError> {
                match self {
                    $(Response::$variant(m) => m.validate(),)*
                }
            }
        }

        $(
            impl From<$req> for Request {
                fn from(m: $req) -> Self {
                    Request::$variant(m)
                }
            }

            impl From<$res> for Response {
                fn from(m: $res) -> Self {
                    Response::$variant(m)
                }
            }
        )*
    };
}

v20_messages! {
    SessionSetup(SessionSetupReq, SessionSetupRes) => SessionSetup,
    AuthorizationSetup(AuthorizationSetupReq, AuthorizationSetupRes) => AuthorizationSetup,
    Authorization(AuthorizationReq, AuthorizationRes) => Authorization,
    ServiceDiscovery(ServiceDiscoveryReq, ServiceDiscoveryRes) => ServiceDiscovery,
    ServiceDetail(ServiceDetailReq, ServiceDetailRes) => ServiceDetail,
    ServiceSelection(ServiceSelectionReq, ServiceSelectionRes) => ServiceSelection,
    AcChargeParameterDiscovery(AcChargeParameterDiscoveryReq, AcChargeParameterDiscoveryRes) => ChargeParameterDiscovery,
    DcChargeParameterDiscovery(DcChargeParameterDiscoveryReq, DcChargeParameterDiscoveryRes) => ChargeParameterDiscovery,
    ScheduleExchange(ScheduleExchangeReq, ScheduleExchangeRes) => ScheduleExchange,
    DcCableCheck(DcCableCheckReq, DcCableCheckRes) => CableCheck,
    DcPreCharge(DcPreChargeReq, DcPreChargeRes) => PreCharge,
    PowerDelivery(PowerDeliveryReq, PowerDeliveryRes) => PowerDelivery,
    AcChargeLoop(AcChargeLoopReq, AcChargeLoopRes) => ChargeLoop,
    DcChargeLoop(DcChargeLoopReq, DcChargeLoopRes) => ChargeLoop,
    DcWeldingDetection(DcWeldingDetectionReq, DcWeldingDetectionRes) => WeldingDetection,
    SessionStop(SessionStopReq, SessionStopRes) => SessionStop,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::SessionId;
    use crate::rational::RationalQuantity;

    #[test]
    fn test_failed_response_keeps_shape_and_header() {
        let header = MessageHeader::new(SessionId::new("0011223344556677").unwrap());
        let req = Request::from(AcChargeParameterDiscoveryReq {
            header: MessageHeader::new(SessionId::zero()),
            params: AcCpdReqParamsKind::Ac(AcCpdReqParams {
                ev_max_charge_power: RationalQuantity::new(300, 2),
                ev_min_charge_power: RationalQuantity::new(100, 0),
                ..Default::default()
            }),
        });
        let res = req.failed_response(header.clone(), ResponseCode::FailedSequenceError);
        assert_eq!(res.kind(), MessageKind::ChargeParameterDiscovery);
        assert_eq!(res.response_code(), ResponseCode::FailedSequenceError);
        assert_eq!(res.header().session_id, header.session_id);
        assert!(matches!(res, Response::AcChargeParameterDiscovery(_)));
    }

    #[test]
    fn test_bpt_params_flatten() {
        let params = BptAcCpdReqParams {
            base: AcCpdReqParams {
                ev_max_charge_power: RationalQuantity::new(11, 3),
                ..Default::default()
            },
            ev_max_discharge_power: RationalQuantity::new(7, 3),
            ..Default::default()
        };
        let json = serde_json::to_value(params).unwrap();
        assert!(json.get("ev_max_charge_power").is_some());
        assert!(json.get("ev_max_discharge_power").is_some());
        assert!(json.get("base").is_none());
    }
}
