//! Simulated vehicle used by the loopback EVCC.

use std::sync::atomic::{AtomicU32, Ordering};

use super::traits::{ControllerError, EvChargeParamsV20, EvController};
use crate::negotiation::schedule::charging_profile;
use crate::protocol::types::{
    ChargeProgress, EnergyTransferMode, ParameterSet, Protocol, SelectedEnergyService,
    SelectedVas, ServiceV20,
};
use crate::protocol::v2::{
    AcEvChargeParameter, ChargingProfile, DcEvChargeParameter, DcEvStatus, EvChargeParameter,
    PhysicalValue, SaScheduleTuple,
};
use crate::protocol::v20::{
    AcCpdReqParams, AcCpdReqParamsKind, BptAcCpdReqParams, BptDcCpdReqParams, DcCpdReqParams,
    DcCpdReqParamsKind, DynamicScheduleExchangeReqParams, ScheduledScheduleExchangeReqParams,
};
use crate::protocol::validation::Percent;
use crate::rational::RationalQuantity;

const DEFAULT_MAX_CYCLES: u32 = 10;
const DEPARTURE_TIME_SECS: u32 = 7200;

fn rq(value: f64) -> Result<RationalQuantity, ControllerError> {
    Ok(RationalQuantity::from_f64(value)?)
}

/// A vehicle that charges for a fixed number of loop cycles and then stops.
pub struct SimEvController {
    energy_mode: EnergyTransferMode,
    energy_service: ServiceV20,
    max_cycles: u32,
    cycles: AtomicU32,
    departure_time: Option<u32>,
}

impl SimEvController {
    pub fn new(energy_mode: EnergyTransferMode, energy_service: ServiceV20) -> Self {
        Self {
            energy_mode,
            energy_service,
            max_cycles: DEFAULT_MAX_CYCLES,
            cycles: AtomicU32::new(0),
            departure_time: None,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Announce a departure time. -2 requests carry it only when set, -20
    /// schedule requests fall back to two hours.
    pub fn with_departure_time(mut self, departure_time: Option<u32>) -> Self {
        self.departure_time = departure_time;
        self
    }

    fn departure_time_v20(&self) -> u32 {
        self.departure_time.unwrap_or(DEPARTURE_TIME_SECS)
    }

    /// Loop cycles completed so far.
    pub fn cycles(&self) -> u32 {
        self.cycles.load(Ordering::Relaxed)
    }
}

impl Default for SimEvController {
    fn default() -> Self {
        Self::new(EnergyTransferMode::AcThreePhaseCore, ServiceV20::Ac)
    }
}

impl EvController for SimEvController {
    fn evcc_id(&self, protocol: Protocol) -> Result<String, ControllerError> {
        Ok(if protocol.is_v20() {
            "WMIV1234567890ABCDEX".to_string()
        } else {
            "000000000000".to_string()
        })
    }

    fn energy_transfer_mode(&self) -> EnergyTransferMode {
        self.energy_mode
    }

    fn energy_service(&self) -> ServiceV20 {
        self.energy_service
    }

    fn select_energy_service_v20(
        &self,
        service: ServiceV20,
        is_free: bool,
        mut parameter_sets: Vec<ParameterSet>,
    ) -> Result<SelectedEnergyService, ControllerError> {
        Ok(SelectedEnergyService {
            service,
            is_free,
            parameter_set: parameter_sets.pop(),
        })
    }

    fn select_vas_v20(
        &self,
        service: ServiceV20,
        is_free: bool,
        mut parameter_sets: Vec<ParameterSet>,
    ) -> Result<Option<SelectedVas>, ControllerError> {
        Ok(parameter_sets.pop().map(|parameter_set| SelectedVas {
            service,
            is_free,
            parameter_set,
        }))
    }

    fn charge_params_v2(&self) -> Result<EvChargeParameter, ControllerError> {
        if !self.energy_mode.is_dc() {
            return Ok(EvChargeParameter::Ac(AcEvChargeParameter {
                departure_time: self.departure_time,
                e_amount: PhysicalValue::watt_hours(60.0)?,
                ev_max_voltage: PhysicalValue::volts(400.0)?,
                ev_max_current: PhysicalValue::amperes(32.0)?,
                ev_min_current: PhysicalValue::amperes(10.0)?,
            }));
        }
        Ok(EvChargeParameter::Dc(DcEvChargeParameter {
            departure_time: self.departure_time,
            dc_ev_status: DcEvStatus {
                ev_ready: true,
                ev_ress_soc: Percent::new(20)?,
                ..Default::default()
            },
            ev_maximum_current_limit: PhysicalValue::amperes(300.0)?,
            ev_maximum_power_limit: Some(PhysicalValue::watts(150_000.0)?),
            ev_maximum_voltage_limit: PhysicalValue::volts(900.0)?,
            ev_energy_capacity: Some(PhysicalValue::watt_hours(60_000.0)?),
            ev_energy_request: Some(PhysicalValue::watt_hours(40_000.0)?),
            full_soc: Some(Percent::new(100)?),
            bulk_soc: Some(Percent::new(80)?),
        }))
    }

    fn charge_params_v20(
        &self,
        selected: &SelectedEnergyService,
    ) -> Result<EvChargeParamsV20, ControllerError> {
        let bpt = selected.service.is_bpt();
        if selected.service.is_ac() {
            let base = AcCpdReqParams {
                ev_max_charge_power: rq(11_000.0)?,
                ev_max_charge_power_l2: None,
                ev_max_charge_power_l3: None,
                ev_min_charge_power: rq(100.0)?,
                ev_min_charge_power_l2: None,
                ev_min_charge_power_l3: None,
            };
            let kind = if bpt {
                AcCpdReqParamsKind::Bpt(BptAcCpdReqParams {
                    base,
                    ev_max_discharge_power: rq(11_000.0)?,
                    ev_max_discharge_power_l2: None,
                    ev_max_discharge_power_l3: None,
                    ev_min_discharge_power: rq(100.0)?,
                    ev_min_discharge_power_l2: None,
                    ev_min_discharge_power_l3: None,
                })
            } else {
                AcCpdReqParamsKind::Ac(base)
            };
            return Ok(EvChargeParamsV20::Ac(kind));
        }

        let base = DcCpdReqParams {
            ev_max_charge_power: rq(300_000.0)?,
            ev_min_charge_power: rq(100.0)?,
            ev_max_charge_current: rq(300.0)?,
            ev_min_charge_current: rq(10.0)?,
            ev_max_voltage: rq(1000.0)?,
            ev_min_voltage: rq(10.0)?,
            target_soc: None,
        };
        let kind = if bpt {
            DcCpdReqParamsKind::Bpt(BptDcCpdReqParams {
                base,
                ev_max_discharge_power: rq(11_000.0)?,
                ev_min_discharge_power: rq(1_000.0)?,
                ev_max_discharge_current: rq(11.0)?,
                ev_min_discharge_current: rq(0.0)?,
            })
        } else {
            DcCpdReqParamsKind::Dc(base)
        };
        Ok(EvChargeParamsV20::Dc(kind))
    }

    fn scheduled_se_params(
        &self,
        _selected: &SelectedEnergyService,
    ) -> Result<ScheduledScheduleExchangeReqParams, ControllerError> {
        Ok(ScheduledScheduleExchangeReqParams {
            departure_time: Some(self.departure_time_v20()),
            ev_target_energy_request: Some(rq(10_000.0)?),
            ev_max_energy_request: Some(rq(20_000.0)?),
            ev_min_energy_request: Some(rq(5_000.0)?),
        })
    }

    fn dynamic_se_params(
        &self,
        selected: &SelectedEnergyService,
    ) -> Result<DynamicScheduleExchangeReqParams, ControllerError> {
        let (max_v2x, min_v2x) = if selected.service.is_bpt() {
            (Some(rq(5_000.0)?), Some(rq(0.0)?))
        } else {
            (None, None)
        };
        Ok(DynamicScheduleExchangeReqParams {
            departure_time: self.departure_time_v20(),
            min_soc: Some(Percent::new(30)?),
            target_soc: Some(Percent::new(80)?),
            ev_target_energy_request: rq(40_000.0)?,
            ev_max_energy_request: rq(60_000.0)?,
            ev_min_energy_request: rq(20_000.0)?,
            ev_max_v2x_energy_request: max_v2x,
            ev_min_v2x_energy_request: min_v2x,
        })
    }

    /// Takes the last offered tuple.
    fn process_sa_schedules(
        &self,
        schedules: &[SaScheduleTuple],
    ) -> Result<(ChargeProgress, u8, ChargingProfile), ControllerError> {
        let tuple = schedules
            .last()
            .ok_or(ControllerError::NotPublished("sa_schedule_list"))?;
        Ok((
            ChargeProgress::Start,
            tuple.sa_schedule_tuple_id,
            charging_profile(tuple)?,
        ))
    }

    fn continue_charging(&self) -> bool {
        let done = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        done < self.max_cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvseDataContext;
    use crate::negotiation::schedule::offer_sa_schedules;

    #[test]
    fn test_stops_after_max_cycles() {
        let ev = SimEvController::default().with_max_cycles(3);
        assert!(ev.continue_charging());
        assert!(ev.continue_charging());
        assert!(!ev.continue_charging());
        assert_eq!(ev.cycles(), 3);
    }

    #[test]
    fn test_selects_last_parameter_set() {
        let ev = SimEvController::default();
        let sets = vec![
            ParameterSet::new(1, vec![]).unwrap(),
            ParameterSet::new(2, vec![]).unwrap(),
        ];
        let selected = ev
            .select_energy_service_v20(ServiceV20::Ac, false, sets)
            .unwrap();
        assert_eq!(selected.parameter_set.map(|s| s.id), Some(2));
        assert_eq!(
            ev.select_vas_v20(ServiceV20::Internet, true, vec![]).unwrap(),
            None
        );
    }

    #[test]
    fn test_charge_params_follow_service() {
        let ev = SimEvController::default();
        let selected = SelectedEnergyService {
            service: ServiceV20::DcBpt,
            is_free: false,
            parameter_set: None,
        };
        assert!(matches!(
            ev.charge_params_v20(&selected).unwrap(),
            EvChargeParamsV20::Dc(DcCpdReqParamsKind::Bpt(_))
        ));
    }

    #[test]
    fn test_process_schedules_builds_profile() {
        let evse = EvseDataContext {
            max_charge_power: Some(11_000.0),
            ..Default::default()
        };
        let schedules = offer_sa_schedules(&evse, None).unwrap();
        let (progress, id, profile) = SimEvController::default()
            .process_sa_schedules(&schedules)
            .unwrap();
        assert_eq!(progress, ChargeProgress::Start);
        assert_eq!(id, 1);
        assert_eq!(profile.entries.len(), 2);
        assert!(SimEvController::default().process_sa_schedules(&[]).is_err());
    }
}
