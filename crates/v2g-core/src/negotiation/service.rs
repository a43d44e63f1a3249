//! Service discovery, detail and selection for both protocol generations.

use std::collections::HashMap;

use crate::protocol::ResponseCode;
use crate::protocol::types::{
    AuthMode, ControlMode, Parameter, ParameterSet, SelectedEnergyService, SelectedService,
    SelectedVas, ServiceV20,
};
use crate::protocol::v2::PaymentServiceSelectionReq;
use crate::protocol::v20::{Service, ServiceSelectionReq};
use crate::protocol::validation::ValidationError;

/// ServiceID of the -2 charge service.
pub const V2_CHARGE_SERVICE_ID: u16 = 1;
/// ServiceID of the -2 Internet value-added service.
pub const V2_INTERNET_SERVICE_ID: u16 = 3;

/// What a -20 ServiceDiscoveryRes announced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferedServices {
    pub energy: Vec<Service>,
    pub vas: Vec<Service>,
}

impl OfferedServices {
    pub fn find(&self, service_id: u16) -> Option<&Service> {
        self.energy
            .iter()
            .chain(self.vas.iter())
            .find(|s| s.service_id == service_id)
    }
}

/// Services to announce: configured and available at the charger, narrowed
/// to the ids the EV listed if it sent any.
pub fn offer_services_v20(
    configured: &[ServiceV20],
    available: &[ServiceV20],
    ev_supported_ids: Option<&[u16]>,
    free: bool,
) -> OfferedServices {
    let mut offered = OfferedServices::default();
    for service in configured.iter().filter(|s| available.contains(s)) {
        if let Some(ids) = ev_supported_ids
            && service.is_energy_service()
            && !ids.contains(&service.id())
        {
            continue;
        }
        let entry = Service {
            service_id: service.id(),
            free_service: free,
        };
        if service.is_energy_service() {
            offered.energy.push(entry);
        } else {
            offered.vas.push(entry);
        }
    }
    offered
}

/// Check a ServiceDetailReq against what was offered.
pub fn check_service_detail_v20(
    offered: &OfferedServices,
    service_id: u16,
) -> Result<ServiceV20, ResponseCode> {
    offered
        .find(service_id)
        .and_then(|s| ServiceV20::from_id(s.service_id))
        .ok_or(ResponseCode::FailedServiceIdInvalid)
}

fn find_parameter_set(
    parameter_sets: &HashMap<ServiceV20, Vec<ParameterSet>>,
    service: ServiceV20,
    id: u16,
) -> Result<ParameterSet, ResponseCode> {
    parameter_sets
        .get(&service)
        .and_then(|sets| sets.iter().find(|set| set.id == id))
        .cloned()
        .ok_or(ResponseCode::FailedServiceSelectionInvalid)
}

/// Bind the EV's ServiceSelectionReq to offered services and parameter sets.
///
/// `parameter_sets` must hold the sets offered for every service the request
/// names.
pub fn select_services_v20(
    offered: &OfferedServices,
    parameter_sets: &HashMap<ServiceV20, Vec<ParameterSet>>,
    req: &ServiceSelectionReq,
) -> Result<(SelectedEnergyService, Vec<SelectedVas>), ResponseCode> {
    let chosen = req.selected_energy_service;

    if offered.vas.iter().any(|s| s.service_id == chosen.service_id) {
        return Err(ResponseCode::FailedNoEnergyTransferServiceSelected);
    }
    let offer = offered
        .energy
        .iter()
        .find(|s| s.service_id == chosen.service_id)
        .ok_or(ResponseCode::FailedServiceSelectionInvalid)?;
    let service =
        ServiceV20::from_id(offer.service_id).ok_or(ResponseCode::FailedServiceSelectionInvalid)?;
    let parameter_set = chosen
        .parameter_set_id
        .map(|id| find_parameter_set(parameter_sets, service, id))
        .transpose()?;
    let energy = SelectedEnergyService {
        service,
        is_free: offer.free_service,
        parameter_set,
    };

    let mut vas = Vec::with_capacity(req.selected_vas_list.len());
    for SelectedService {
        service_id,
        parameter_set_id,
    } in &req.selected_vas_list
    {
        let offer = offered
            .vas
            .iter()
            .find(|s| s.service_id == *service_id)
            .ok_or(ResponseCode::FailedServiceSelectionInvalid)?;
        let service = ServiceV20::from_id(offer.service_id)
            .ok_or(ResponseCode::FailedServiceSelectionInvalid)?;
        let id = parameter_set_id.ok_or(ResponseCode::FailedServiceSelectionInvalid)?;
        vas.push(SelectedVas {
            service,
            is_free: offer.free_service,
            parameter_set: find_parameter_set(parameter_sets, service, id)?,
        });
    }

    Ok((energy, vas))
}

/// Check a -2 ServiceDetailReq.
pub fn check_service_detail_v2(offered_ids: &[u16], service_id: u16) -> Result<(), ResponseCode> {
    if offered_ids.contains(&service_id) {
        Ok(())
    } else {
        Err(ResponseCode::FailedServiceIdInvalid)
    }
}

/// Check a -2 PaymentServiceSelectionReq.
pub fn select_services_v2(
    offered_auth: &[AuthMode],
    offered_ids: &[u16],
    req: &PaymentServiceSelectionReq,
) -> Result<(), ResponseCode> {
    if !offered_auth.contains(&req.selected_payment_option) {
        return Err(ResponseCode::FailedPaymentSelectionInvalid);
    }
    if req
        .selected_service_list
        .iter()
        .any(|s| !offered_ids.contains(&s.service_id))
    {
        return Err(ResponseCode::FailedServiceSelectionInvalid);
    }
    if !req
        .selected_service_list
        .iter()
        .any(|s| s.service_id == V2_CHARGE_SERVICE_ID)
    {
        return Err(ResponseCode::FailedNoChargeServiceSelected);
    }
    Ok(())
}

/// -2 parameter sets for a value-added service (ISO 15118-2 Table 105).
pub fn parameter_sets_v2(service_id: u16) -> Result<Vec<ParameterSet>, ValidationError> {
    match service_id {
        V2_INTERNET_SERVICE_ID => Ok(vec![
            ParameterSet::new(
                1,
                vec![
                    Parameter::new("Protocol", str_value("ftp"))?,
                    Parameter::int("Port", 21)?,
                ],
            )?,
            ParameterSet::new(
                3,
                vec![
                    Parameter::new("Protocol", str_value("https"))?,
                    Parameter::int("Port", 443)?,
                ],
            )?,
        ]),
        _ => Ok(Vec::new()),
    }
}

fn str_value(value: &str) -> crate::protocol::types::ParameterValue {
    crate::protocol::types::ParameterValue::Str(value.to_string())
}

/// Default -20 parameter sets: one set per supported control mode for
/// energy services, a single set for value-added services. The most
/// preferred set comes last.
pub fn default_parameter_sets(
    service: ServiceV20,
    control_modes: &[ControlMode],
    nominal_voltage: Option<f64>,
) -> Result<Vec<ParameterSet>, ValidationError> {
    if !service.is_energy_service() {
        let params = match service {
            ServiceV20::Internet => vec![
                Parameter::int("Protocol", 3)?,
                Parameter::int("Port", 443)?,
            ],
            _ => vec![Parameter::int("ParkingStatusType", 0)?],
        };
        return Ok(vec![ParameterSet::new(1, params)?]);
    }

    let mut sets = Vec::with_capacity(control_modes.len());
    for (index, mode) in control_modes.iter().enumerate() {
        let (control, mobility_needs) = match mode {
            ControlMode::Scheduled => (1, 1),
            ControlMode::Dynamic => (2, 2),
        };
        let mut params = vec![
            Parameter::int("Connector", if service.is_ac() { 1 } else { 2 })?,
            Parameter::int("ControlMode", control)?,
            Parameter::int("MobilityNeedsMode", mobility_needs)?,
            Parameter::int("Pricing", 0)?,
        ];
        if service.is_ac()
            && let Some(voltage) = nominal_voltage
        {
            params.push(Parameter::int("EVSENominalVoltage", voltage.round() as i32)?);
        }
        if service.is_bpt() {
            params.push(Parameter::int("BPTChannel", 1)?);
            params.push(Parameter::int("GeneratorMode", 1)?);
        }
        let id = u16::try_from(index + 1)
            .map_err(|_| ValidationError::new("parameter_set", "too many control modes"))?;
        sets.push(ParameterSet::new(id, params)?);
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::{MessageHeader, SessionId};

    fn offered() -> OfferedServices {
        offer_services_v20(
            &[ServiceV20::Ac, ServiceV20::AcBpt, ServiceV20::Internet],
            &[ServiceV20::Ac, ServiceV20::AcBpt, ServiceV20::Internet],
            None,
            false,
        )
    }

    fn sets() -> HashMap<ServiceV20, Vec<ParameterSet>> {
        let modes = [ControlMode::Scheduled, ControlMode::Dynamic];
        let mut map = HashMap::new();
        for service in [ServiceV20::Ac, ServiceV20::AcBpt, ServiceV20::Internet] {
            map.insert(
                service,
                default_parameter_sets(service, &modes, Some(230.0)).unwrap(),
            );
        }
        map
    }

    fn selection(service_id: u16, set: Option<u16>, vas: Vec<SelectedService>) -> ServiceSelectionReq {
        ServiceSelectionReq {
            header: MessageHeader::new(SessionId::zero()),
            selected_energy_service: SelectedService {
                service_id,
                parameter_set_id: set,
            },
            selected_vas_list: vas,
        }
    }

    #[test]
    fn test_offer_partitions_energy_and_vas() {
        let offered = offered();
        let energy: Vec<u16> = offered.energy.iter().map(|s| s.service_id).collect();
        let vas: Vec<u16> = offered.vas.iter().map(|s| s.service_id).collect();
        assert_eq!(energy, vec![1, 5]);
        assert_eq!(vas, vec![65]);
    }

    #[test]
    fn test_offer_respects_ev_supported_ids() {
        let offered = offer_services_v20(
            &[ServiceV20::Ac, ServiceV20::Dc],
            &[ServiceV20::Ac, ServiceV20::Dc],
            Some(&[2]),
            true,
        );
        assert_eq!(offered.energy.len(), 1);
        assert_eq!(offered.energy[0].service_id, 2);
        assert!(offered.energy[0].free_service);
    }

    #[test]
    fn test_service_detail_only_for_offered_ids() {
        let offered = offered();
        assert_eq!(check_service_detail_v20(&offered, 1), Ok(ServiceV20::Ac));
        assert_eq!(check_service_detail_v20(&offered, 5), Ok(ServiceV20::AcBpt));
        assert_eq!(
            check_service_detail_v20(&offered, 2),
            Err(ResponseCode::FailedServiceIdInvalid)
        );
    }

    #[test]
    fn test_selection_binds_parameter_set() {
        let (energy, vas) =
            select_services_v20(&offered(), &sets(), &selection(1, Some(2), vec![])).unwrap();
        assert_eq!(energy.service, ServiceV20::Ac);
        assert_eq!(energy.control_mode(), Some(ControlMode::Dynamic));
        assert!(vas.is_empty());
    }

    #[test]
    fn test_selection_rejects_unknown_parameter_set() {
        let res = select_services_v20(&offered(), &sets(), &selection(1, Some(7), vec![]));
        assert_eq!(res.unwrap_err(), ResponseCode::FailedServiceSelectionInvalid);
    }

    #[test]
    fn test_selection_rejects_not_offered_service() {
        let res = select_services_v20(&offered(), &sets(), &selection(2, None, vec![]));
        assert_eq!(res.unwrap_err(), ResponseCode::FailedServiceSelectionInvalid);
    }

    #[test]
    fn test_vas_only_selection() {
        let res = select_services_v20(&offered(), &sets(), &selection(65, Some(1), vec![]));
        assert_eq!(
            res.unwrap_err(),
            ResponseCode::FailedNoEnergyTransferServiceSelected
        );
    }

    #[test]
    fn test_vas_selection_requires_parameter_set() {
        let vas = vec![SelectedService {
            service_id: 65,
            parameter_set_id: None,
        }];
        let res = select_services_v20(&offered(), &sets(), &selection(1, Some(1), vas));
        assert_eq!(res.unwrap_err(), ResponseCode::FailedServiceSelectionInvalid);

        let vas = vec![SelectedService {
            service_id: 65,
            parameter_set_id: Some(1),
        }];
        let (_, vas) = select_services_v20(&offered(), &sets(), &selection(1, Some(1), vas)).unwrap();
        assert_eq!(vas[0].service, ServiceV20::Internet);
    }

    #[test]
    fn test_v2_payment_service_selection() {
        let req = |auth, ids: &[u16]| PaymentServiceSelectionReq {
            selected_payment_option: auth,
            selected_service_list: ids
                .iter()
                .map(|&service_id| SelectedService {
                    service_id,
                    parameter_set_id: None,
                })
                .collect(),
        };
        let offered_auth = [AuthMode::Eim];
        let offered_ids = [V2_CHARGE_SERVICE_ID, V2_INTERNET_SERVICE_ID];
        assert!(select_services_v2(&offered_auth, &offered_ids, &req(AuthMode::Eim, &[1, 3])).is_ok());
        assert_eq!(
            select_services_v2(&offered_auth, &offered_ids, &req(AuthMode::Pnc, &[1])),
            Err(ResponseCode::FailedPaymentSelectionInvalid)
        );
        assert_eq!(
            select_services_v2(&offered_auth, &offered_ids, &req(AuthMode::Eim, &[3])),
            Err(ResponseCode::FailedNoChargeServiceSelected)
        );
        assert_eq!(
            select_services_v2(&offered_auth, &offered_ids, &req(AuthMode::Eim, &[1, 9])),
            Err(ResponseCode::FailedServiceSelectionInvalid)
        );
    }

    #[test]
    fn test_default_parameter_sets_order() {
        let sets = default_parameter_sets(
            ServiceV20::DcBpt,
            &[ControlMode::Scheduled, ControlMode::Dynamic],
            None,
        )
        .unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].id, 2);
        assert!(sets[1].get("BPTChannel").is_some());
        assert!(sets[0].get("EVSENominalVoltage").is_none());
    }
}
