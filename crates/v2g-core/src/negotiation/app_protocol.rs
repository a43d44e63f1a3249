//! SupportedAppProtocol handshake.

use crate::protocol::ResponseCode;
use crate::protocol::app_protocol::{AppProtocol, SupportedAppProtocolReq};
use crate::protocol::types::Protocol;

/// Major version the state machine implements for `protocol`.
fn implemented_major(protocol: Protocol) -> u32 {
    if protocol.is_v20() { 1 } else { 2 }
}

fn implemented_minor(_protocol: Protocol) -> u32 {
    0
}

/// Result of a successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedProtocol {
    pub protocol: Protocol,
    pub schema_id: u8,
    pub response_code: ResponseCode,
}

/// Pick the EV's most preferred entry (lowest priority value) that names a
/// configured, implemented protocol with a matching major version.
///
/// A differing minor version is still accepted, answered with
/// `OK_SuccessfulNegotiationWithMinorDeviation`.
pub fn negotiate_app_protocol(
    supported: &[Protocol],
    req: &SupportedAppProtocolReq,
) -> Result<NegotiatedProtocol, ResponseCode> {
    let mut offered: Vec<&AppProtocol> = req.app_protocols.iter().collect();
    offered.sort_by_key(|p| p.priority);

    offered
        .into_iter()
        .find_map(|entry| {
            let protocol = Protocol::from_namespace(&entry.protocol_namespace)?;
            if !protocol.is_implemented()
                || !supported.contains(&protocol)
                || entry.major_version != implemented_major(protocol)
            {
                return None;
            }
            let response_code = if entry.minor_version == implemented_minor(protocol) {
                ResponseCode::OkSuccessfulNegotiation
            } else {
                ResponseCode::OkSuccessfulNegotiationWithMinorDeviation
            };
            Some(NegotiatedProtocol {
                protocol,
                schema_id: entry.schema_id,
                response_code,
            })
        })
        .ok_or(ResponseCode::FailedNoNegotiation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::validation::BoundedList;

    fn entry(protocol: Protocol, major: u32, minor: u32, schema_id: u8, priority: u8) -> AppProtocol {
        AppProtocol {
            protocol_namespace: protocol.namespace().to_string(),
            major_version: major,
            minor_version: minor,
            schema_id,
            priority,
        }
    }

    fn req(entries: Vec<AppProtocol>) -> SupportedAppProtocolReq {
        SupportedAppProtocolReq {
            app_protocols: BoundedList::new(entries).unwrap(),
        }
    }

    #[test]
    fn test_lowest_priority_value_wins() {
        let req = req(vec![
            entry(Protocol::Iso15118_2, 2, 0, 10, 2),
            entry(Protocol::Iso15118_20Ac, 1, 0, 20, 1),
        ]);
        let negotiated = negotiate_app_protocol(&Protocol::ALL, &req).unwrap();
        assert_eq!(negotiated.protocol, Protocol::Iso15118_20Ac);
        assert_eq!(negotiated.schema_id, 20);
        assert_eq!(negotiated.response_code, ResponseCode::OkSuccessfulNegotiation);
    }

    #[test]
    fn test_unconfigured_and_unimplemented_are_skipped() {
        let req = req(vec![
            entry(Protocol::DinSpec70121, 2, 0, 1, 1),
            entry(Protocol::Iso15118_20Dc, 1, 0, 2, 2),
            entry(Protocol::Iso15118_2, 2, 0, 3, 3),
        ]);
        let negotiated = negotiate_app_protocol(&[Protocol::Iso15118_2], &req).unwrap();
        assert_eq!(negotiated.protocol, Protocol::Iso15118_2);
        assert_eq!(negotiated.schema_id, 3);
    }

    #[test]
    fn test_minor_deviation() {
        let req = req(vec![entry(Protocol::Iso15118_2, 2, 1, 4, 1)]);
        let negotiated = negotiate_app_protocol(&Protocol::ALL, &req).unwrap();
        assert_eq!(
            negotiated.response_code,
            ResponseCode::OkSuccessfulNegotiationWithMinorDeviation
        );
    }

    #[test]
    fn test_no_match_fails() {
        let req = req(vec![
            entry(Protocol::Iso15118_2, 3, 0, 4, 1),
            AppProtocol {
                protocol_namespace: "urn:example:unknown".to_string(),
                major_version: 1,
                minor_version: 0,
                schema_id: 5,
                priority: 2,
            },
        ]);
        assert_eq!(
            negotiate_app_protocol(&Protocol::ALL, &req),
            Err(ResponseCode::FailedNoNegotiation)
        );
    }
}
