//! Top-level request/response unions handed across the codec boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::app_protocol::{SupportedAppProtocolReq, SupportedAppProtocolRes};
use super::header::MessageHeader;
use super::response::ResponseCode;
use super::validation::{Validate, ValidationError};
use super::{v2, v20};

/// Message type independent of protocol generation and energy service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    SupportedAppProtocol,
    SessionSetup,
    AuthorizationSetup,
    Authorization,
    ServiceDiscovery,
    ServiceDetail,
    ServiceSelection,
    PaymentServiceSelection,
    PaymentDetails,
    ChargeParameterDiscovery,
    ScheduleExchange,
    CableCheck,
    PreCharge,
    PowerDelivery,
    ChargingStatus,
    CurrentDemand,
    ChargeLoop,
    WeldingDetection,
    SessionStop,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    AppProtocol(SupportedAppProtocolReq),
    V2(v2::Request),
    V20(v20::Request),
}

impl Request {
    pub fn kind(&self) -> MessageKind {
        match self {
            Request::AppProtocol(_) => MessageKind::SupportedAppProtocol,
            Request::V2(req) => req.body.kind(),
            Request::V20(req) => req.kind(),
        }
    }

    /// The V2G header, absent for the handshake.
    pub fn header(&self) -> Option<&MessageHeader> {
        match self {
            Request::AppProtocol(_) => None,
            Request::V2(req) => Some(&req.header),
            Request::V20(req) => Some(req.header()),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Req", self.kind())
    }
}

impl Validate for Request {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Request::AppProtocol(req) => req.validate(),
            Request::V2(req) => req.validate(),
            Request::V20(req) => req.validate(),
        }
    }
}

impl From<SupportedAppProtocolReq> for Request {
    fn from(req: SupportedAppProtocolReq) -> Self {
        Request::AppProtocol(req)
    }
}

impl From<v2::Request> for Request {
    fn from(req: v2::Request) -> Self {
        Request::V2(req)
    }
}

impl From<v20::Request> for Request {
    fn from(req: v20::Request) -> Self {
        Request::V20(req)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    AppProtocol(SupportedAppProtocolRes),
    V2(v2::Response),
    V20(v20::Response),
}

impl Response {
    pub fn kind(&self) -> MessageKind {
        match self {
            Response::AppProtocol(_) => MessageKind::SupportedAppProtocol,
            Response::V2(res) => res.body.kind(),
            Response::V20(res) => res.kind(),
        }
    }

    pub fn response_code(&self) -> ResponseCode {
        match self {
            Response::AppProtocol(res) => res.response_code,
            Response::V2(res) => res.body.response_code(),
            Response::V20(res) => res.response_code(),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Res", self.kind())
    }
}

impl Validate for Response {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Response::AppProtocol(res) => res.validate(),
            Response::V2(res) => res.validate(),
            Response::V20(res) => res.validate(),
        }
    }
}

impl From<SupportedAppProtocolRes> for Response {
    fn from(res: SupportedAppProtocolRes) -> Self {
        Response::AppProtocol(res)
    }
}

impl From<v2::Response> for Response {
    fn from(res: v2::Response) -> Self {
        Response::V2(res)
    }
}

impl From<v20::Response> for Response {
    fn from(res: v20::Response) -> Self {
        Response::V20(res)
    }
}

/// Build the response variant answering `request`, carrying only `code`.
///
/// Used whenever a request cannot be processed (sequence error, invalid
/// field, unknown session) so the EV still gets the response it waits for.
pub fn failed_response_for(
    request: &Request,
    header: MessageHeader,
    code: ResponseCode,
) -> Response {
    match request {
        Request::AppProtocol(_) => Response::AppProtocol(SupportedAppProtocolRes::failed()),
        Request::V2(req) => Response::V2(v2::Response {
            header,
            body: req.body.failed_response(code),
        }),
        Request::V20(req) => Response::V20(req.failed_response(header, code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::SessionId;

    #[test]
    fn test_failed_response_follows_request_generation() {
        let header = MessageHeader::new(SessionId::zero());
        let v2_req = Request::V2(v2::Request::new(
            header.clone(),
            v2::ServiceDiscoveryReq::default(),
        ));
        let res = failed_response_for(&v2_req, header.clone(), ResponseCode::FailedSequenceError);
        assert!(matches!(res, Response::V2(_)));
        assert_eq!(res.kind(), MessageKind::ServiceDiscovery);
        assert_eq!(res.to_string(), "ServiceDiscoveryRes");

        let v20_req = Request::V20(v20::Request::from(v20::ServiceDiscoveryReq {
            header: header.clone(),
            supported_service_ids: None,
        }));
        let res = failed_response_for(&v20_req, header, ResponseCode::FailedUnknownSession);
        assert!(matches!(res, Response::V20(_)));
        assert_eq!(res.response_code(), ResponseCode::FailedUnknownSession);
    }

    #[test]
    fn test_handshake_failure() {
        let req = Request::AppProtocol(SupportedAppProtocolReq {
            app_protocols: Default::default(),
        });
        assert!(req.validate().is_err());
        let res = failed_response_for(
            &req,
            MessageHeader::default(),
            ResponseCode::FailedSequenceError,
        );
        assert_eq!(res.response_code(), ResponseCode::FailedNoNegotiation);
    }
}
