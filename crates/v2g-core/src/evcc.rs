//! Simulated EVCC.
//!
//! Produces the EV side of a session one request at a time from the SECC's
//! previous answer. The vehicle-specific choices (parameters, schedule
//! selection, when to stop) come from an [`EvController`]; this type only
//! knows the message order of each protocol.

use std::collections::VecDeque;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::controller::{EvChargeParamsV20, EvController};
use crate::negotiation::LoopShape;
use crate::protocol::app_protocol::{AppProtocol, SupportedAppProtocolReq};
use crate::protocol::constants::DEFAULT_MAX_SUPPORTING_POINTS;
use crate::protocol::types::{
    AuthMode, ChargeProgress, ChargingSession, ControlMode, Processing, Protocol,
    SelectedEnergyService, SelectedService, SelectedVas, ServiceV20,
};
use crate::protocol::v2::{self, DcEvPowerDeliveryParameter, DcEvStatus, PhysicalValue};
use crate::protocol::v20;
use crate::protocol::validation::{BoundedList, Identifier, Percent};
use crate::protocol::{MessageHeader, Request, Response, SessionId};
use crate::rational::RationalQuantity;

const EV_TARGET_VOLTAGE: f64 = 400.0;
const EV_TARGET_CURRENT: f64 = 100.0;
const EV_PRE_CHARGE_CURRENT: f64 = 2.0;
const EV_PRESENT_SOC: u8 = 50;
const EV_PRESENT_ACTIVE_POWER: f64 = 11_000.0;
const PRE_CHARGE_TOLERANCE_V: f64 = 10.0;
const MAX_PRE_CHARGE_ROUNDS: u32 = 20;

fn rq(value: f64) -> Result<RationalQuantity> {
    Ok(RationalQuantity::from_f64(value)?)
}

pub struct SimulatedEvcc<E: EvController> {
    ev: E,
    protocol: Protocol,
    session_id: SessionId,
    offered_services: Vec<v20::Service>,
    pending_details: VecDeque<u16>,
    selected: Option<SelectedEnergyService>,
    selected_vas: Vec<SelectedVas>,
    schedules: Vec<v2::SaScheduleTuple>,
    schedule_tuple_id: u8,
    evse_voltage: Option<f64>,
    pre_charge_rounds: u32,
    stopping: bool,
}

impl<E: EvController> SimulatedEvcc<E> {
    pub fn new(ev: E, protocol: Protocol) -> Self {
        Self {
            ev,
            protocol,
            session_id: SessionId::zero(),
            offered_services: Vec::new(),
            pending_details: VecDeque::new(),
            selected: None,
            selected_vas: Vec::new(),
            schedules: Vec::new(),
            schedule_tuple_id: 0,
            evse_voltage: None,
            pre_charge_rounds: 0,
            stopping: false,
        }
    }

    pub fn ev(&self) -> &E {
        &self.ev
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Session id assigned by the SECC, zero before SessionSetup.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// -20 energy service bound during service selection.
    pub fn selected_service(&self) -> Option<&SelectedEnergyService> {
        self.selected.as_ref()
    }

    /// SupportedAppProtocolReq offering only our protocol.
    pub fn first_request(&self) -> Result<Request> {
        let major_version = if self.protocol.is_v20() { 1 } else { 2 };
        let app_protocols = BoundedList::new(vec![AppProtocol {
            protocol_namespace: self.protocol.namespace().to_string(),
            major_version,
            minor_version: 0,
            schema_id: 1,
            priority: 1,
        }])?;
        Ok(Request::AppProtocol(SupportedAppProtocolReq { app_protocols }))
    }

    /// The request answering `response`, or `None` once the session is over.
    pub fn next_request(&mut self, response: &Response) -> Result<Option<Request>> {
        let code = response.response_code();
        if code.is_failed() {
            warn!(response = %response, code = %code, "SECC ended the session");
            return Ok(None);
        }
        debug!(response = %response, "EVCC received");

        match response {
            Response::AppProtocol(_) => self.session_setup().map(Some),
            Response::V2(res) => {
                let body = self.next_v2(res)?;
                Ok(body.map(|body| Request::V2(v2::Request::new(self.header(), body))))
            }
            Response::V20(res) => Ok(self.next_v20(res)?.map(Request::V20)),
        }
    }

    fn header(&self) -> MessageHeader {
        MessageHeader::new(self.session_id.clone())
    }

    fn session_setup(&self) -> Result<Request> {
        let evcc_id = self.ev.evcc_id(self.protocol)?;
        info!(protocol = %self.protocol.name(), evcc_id = %evcc_id, "EVCC starting session");
        if self.protocol.is_v20() {
            return Ok(Request::V20(
                v20::SessionSetupReq {
                    header: self.header(),
                    evcc_id: Identifier::new(evcc_id)?,
                }
                .into(),
            ));
        }
        Ok(Request::V2(v2::Request::new(
            self.header(),
            v2::SessionSetupReq { evcc_id },
        )))
    }

    /// Counts a pre-charge round and reports whether the EVSE output has
    /// reached the target voltage.
    fn pre_charged(&mut self, voltage: f64) -> Result<bool> {
        self.evse_voltage = Some(voltage);
        self.pre_charge_rounds += 1;
        if (voltage - EV_TARGET_VOLTAGE).abs() <= PRE_CHARGE_TOLERANCE_V {
            return Ok(true);
        }
        if self.pre_charge_rounds >= MAX_PRE_CHARGE_ROUNDS {
            bail!("pre-charge did not reach {EV_TARGET_VOLTAGE} V (last {voltage} V)");
        }
        Ok(false)
    }

    // ------------------------------------------------------------------
    // ISO 15118-2
    // ------------------------------------------------------------------

    fn is_dc_v2(&self) -> bool {
        self.ev.energy_transfer_mode().is_dc()
    }

    fn next_v2(&mut self, res: &v2::Response) -> Result<Option<v2::RequestBody>> {
        use v2::ResponseBody as R;

        let body: v2::RequestBody = match &res.body {
            R::SessionSetup(_) => {
                self.session_id = res.header.session_id.clone();
                v2::ServiceDiscoveryReq::default().into()
            }
            R::ServiceDiscovery(discovery) => {
                if !discovery.payment_option_list.contains(&AuthMode::Eim) {
                    bail!("SECC does not offer external identification");
                }
                v2::PaymentServiceSelectionReq {
                    selected_payment_option: AuthMode::Eim,
                    selected_service_list: vec![SelectedService {
                        service_id: discovery.charge_service.service_id,
                        parameter_set_id: None,
                    }],
                }
                .into()
            }
            R::PaymentServiceSelection(_) => v2::AuthorizationReq::default().into(),
            R::Authorization(auth) if auth.evse_processing.is_ongoing() => {
                v2::AuthorizationReq::default().into()
            }
            R::Authorization(_) => self.v2_charge_parameters()?.into(),
            R::ChargeParameterDiscovery(cpd) if cpd.evse_processing.is_ongoing() => {
                self.v2_charge_parameters()?.into()
            }
            R::ChargeParameterDiscovery(cpd) => {
                let schedules = cpd
                    .sa_schedule_list
                    .as_deref()
                    .context("ChargeParameterDiscoveryRes without SAScheduleList")?;
                self.schedules = schedules.to_vec();
                if self.is_dc_v2() {
                    v2::CableCheckReq {
                        dc_ev_status: dc_ev_status()?,
                    }
                    .into()
                } else {
                    self.v2_power_delivery(ChargeProgress::Start)?.into()
                }
            }
            R::CableCheck(check) if check.evse_processing.is_ongoing() => v2::CableCheckReq {
                dc_ev_status: dc_ev_status()?,
            }
            .into(),
            R::CableCheck(_) => v2_pre_charge()?.into(),
            R::PreCharge(pre_charge) => {
                if self.pre_charged(pre_charge.evse_present_voltage.decode())? {
                    self.v2_power_delivery(ChargeProgress::Start)?.into()
                } else {
                    v2_pre_charge()?.into()
                }
            }
            R::PowerDelivery(_) if self.stopping => {
                if self.is_dc_v2() {
                    v2::WeldingDetectionReq {
                        dc_ev_status: dc_ev_status()?,
                    }
                    .into()
                } else {
                    v2_session_stop().into()
                }
            }
            R::PowerDelivery(_) => self.v2_charge_loop()?,
            R::ChargingStatus(_) | R::CurrentDemand(_) => {
                if self.ev.continue_charging() {
                    self.v2_charge_loop()?
                } else {
                    info!("EV finished charging");
                    self.stopping = true;
                    self.v2_power_delivery(ChargeProgress::Stop)?.into()
                }
            }
            R::WeldingDetection(_) => v2_session_stop().into(),
            R::SessionStop(_) => return Ok(None),
            R::ServiceDetail(_) | R::PaymentDetails(_) => {
                bail!("unexpected {:?} response", res.body.kind())
            }
        };
        Ok(Some(body))
    }

    fn v2_charge_parameters(&self) -> Result<v2::ChargeParameterDiscoveryReq> {
        Ok(v2::ChargeParameterDiscoveryReq {
            max_entries_sa_schedule_tuple: None,
            requested_energy_transfer_mode: self.ev.energy_transfer_mode(),
            ev_charge_parameter: self.ev.charge_params_v2()?,
        })
    }

    fn v2_power_delivery(&mut self, progress: ChargeProgress) -> Result<v2::PowerDeliveryReq> {
        let charging_profile = if progress == ChargeProgress::Start {
            let (_, tuple_id, profile) = self.ev.process_sa_schedules(&self.schedules)?;
            self.schedule_tuple_id = tuple_id;
            Some(profile)
        } else {
            None
        };
        let dc_ev_power_delivery_parameter = if self.is_dc_v2() {
            Some(DcEvPowerDeliveryParameter {
                dc_ev_status: dc_ev_status()?,
                bulk_charging_complete: None,
                charging_complete: progress == ChargeProgress::Stop,
            })
        } else {
            None
        };
        Ok(v2::PowerDeliveryReq {
            charge_progress: progress,
            sa_schedule_tuple_id: self.schedule_tuple_id,
            charging_profile,
            dc_ev_power_delivery_parameter,
        })
    }

    fn v2_charge_loop(&self) -> Result<v2::RequestBody> {
        if !self.is_dc_v2() {
            return Ok(v2::ChargingStatusReq {}.into());
        }
        Ok(v2::CurrentDemandReq {
            dc_ev_status: dc_ev_status()?,
            ev_target_current: PhysicalValue::amperes(EV_TARGET_CURRENT)?,
            ev_target_voltage: PhysicalValue::volts(EV_TARGET_VOLTAGE)?,
            ev_maximum_voltage_limit: None,
            ev_maximum_current_limit: None,
            ev_maximum_power_limit: None,
            bulk_charging_complete: None,
            charging_complete: false,
            remaining_time_to_full_soc: None,
            remaining_time_to_bulk_soc: None,
        }
        .into())
    }

    // ------------------------------------------------------------------
    // ISO 15118-20
    // ------------------------------------------------------------------

    fn selected(&self) -> Result<&SelectedEnergyService> {
        self.selected
            .as_ref()
            .context("no energy service selected")
    }

    fn is_dc_v20(&self) -> bool {
        self.selected
            .as_ref()
            .is_some_and(|selected| selected.service.is_dc())
    }

    fn next_v20(&mut self, res: &v20::Response) -> Result<Option<v20::Request>> {
        use v20::Response as R;

        let req: v20::Request = match res {
            R::SessionSetup(setup) => {
                self.session_id = setup.header.session_id.clone();
                v20::AuthorizationSetupReq {
                    header: self.header(),
                }
                .into()
            }
            R::AuthorizationSetup(setup) => {
                if !setup.auth_services.contains(&AuthMode::Eim) {
                    bail!("SECC does not offer external identification");
                }
                self.v20_eim().into()
            }
            R::Authorization(auth) if auth.evse_processing.is_ongoing() => self.v20_eim().into(),
            R::Authorization(_) => v20::ServiceDiscoveryReq {
                header: self.header(),
                supported_service_ids: None,
            }
            .into(),
            R::ServiceDiscovery(discovery) => {
                let wanted = self.ev.energy_service().id();
                let energy = discovery
                    .energy_service_list
                    .iter()
                    .find(|service| service.service_id == wanted)
                    .or_else(|| discovery.energy_service_list.first())
                    .context("SECC offered no energy service")?;
                self.pending_details = std::iter::once(energy.service_id)
                    .chain(discovery.vas_list.iter().map(|service| service.service_id))
                    .collect();
                self.offered_services = discovery
                    .energy_service_list
                    .iter()
                    .chain(discovery.vas_list.iter())
                    .copied()
                    .collect();
                self.next_service_detail()?
            }
            R::ServiceDetail(detail) => {
                self.bind_service(detail)?;
                if self.pending_details.is_empty() {
                    self.v20_service_selection()?.into()
                } else {
                    self.next_service_detail()?
                }
            }
            R::ServiceSelection(_) => self.v20_charge_parameters()?,
            R::AcChargeParameterDiscovery(_) | R::DcChargeParameterDiscovery(_) => {
                self.v20_schedule_exchange()?.into()
            }
            R::ScheduleExchange(exchange) if exchange.evse_processing.is_ongoing() => {
                self.v20_schedule_exchange()?.into()
            }
            R::ScheduleExchange(_) => {
                if self.is_dc_v20() {
                    v20::DcCableCheckReq {
                        header: self.header(),
                    }
                    .into()
                } else {
                    self.v20_power_delivery(ChargeProgress::Start).into()
                }
            }
            R::DcCableCheck(check) if check.evse_processing.is_ongoing() => v20::DcCableCheckReq {
                header: self.header(),
            }
            .into(),
            R::DcCableCheck(_) => self.v20_pre_charge()?.into(),
            R::DcPreCharge(pre_charge) => {
                if self.pre_charged(pre_charge.evse_present_voltage.decode())? {
                    self.v20_power_delivery(ChargeProgress::Start).into()
                } else {
                    self.v20_pre_charge()?.into()
                }
            }
            R::PowerDelivery(_) if self.stopping => {
                if self.is_dc_v20() {
                    v20::DcWeldingDetectionReq {
                        header: self.header(),
                        ev_processing: Processing::Finished,
                    }
                    .into()
                } else {
                    self.v20_session_stop().into()
                }
            }
            R::PowerDelivery(_) => self.v20_charge_loop()?,
            R::AcChargeLoop(_) => self.v20_next_cycle()?,
            R::DcChargeLoop(cycle) => {
                self.evse_voltage = Some(cycle.evse_present_voltage.decode());
                self.v20_next_cycle()?
            }
            R::DcWeldingDetection(_) => self.v20_session_stop().into(),
            R::SessionStop(_) => return Ok(None),
        };
        Ok(Some(req))
    }

    fn v20_eim(&self) -> v20::AuthorizationReq {
        v20::AuthorizationReq {
            header: self.header(),
            selected_auth_service: AuthMode::Eim,
            pnc_params: None,
        }
    }

    fn next_service_detail(&mut self) -> Result<v20::Request> {
        let service_id = self
            .pending_details
            .pop_front()
            .context("no service detail left to request")?;
        Ok(v20::ServiceDetailReq {
            header: self.header(),
            service_id,
        }
        .into())
    }

    fn bind_service(&mut self, detail: &v20::ServiceDetailRes) -> Result<()> {
        let service = ServiceV20::from_id(detail.service_id)
            .with_context(|| format!("unknown service id {}", detail.service_id))?;
        let is_free = self
            .offered_services
            .iter()
            .any(|offered| offered.service_id == detail.service_id && offered.free_service);
        let sets = detail.service_parameter_list.to_vec();

        if service.is_energy_service() {
            let selected = self.ev.select_energy_service_v20(service, is_free, sets)?;
            debug!(
                service = %service,
                parameter_set = ?selected.parameter_set.as_ref().map(|set| set.id),
                "EVCC bound energy service"
            );
            self.selected = Some(selected);
        } else if let Some(vas) = self.ev.select_vas_v20(service, is_free, sets)? {
            self.selected_vas.push(vas);
        }
        Ok(())
    }

    fn v20_service_selection(&self) -> Result<v20::ServiceSelectionReq> {
        let selected = self.selected()?;
        Ok(v20::ServiceSelectionReq {
            header: self.header(),
            selected_energy_service: SelectedService {
                service_id: selected.service.id(),
                parameter_set_id: selected.parameter_set.as_ref().map(|set| set.id),
            },
            selected_vas_list: self
                .selected_vas
                .iter()
                .map(|vas| SelectedService {
                    service_id: vas.service.id(),
                    parameter_set_id: Some(vas.parameter_set.id),
                })
                .collect(),
        })
    }

    fn v20_charge_parameters(&self) -> Result<v20::Request> {
        let header = self.header();
        Ok(match self.ev.charge_params_v20(self.selected()?)? {
            EvChargeParamsV20::Ac(params) => {
                v20::AcChargeParameterDiscoveryReq { header, params }.into()
            }
            EvChargeParamsV20::Dc(params) => {
                v20::DcChargeParameterDiscoveryReq { header, params }.into()
            }
        })
    }

    fn v20_schedule_exchange(&self) -> Result<v20::ScheduleExchangeReq> {
        let selected = self.selected()?;
        let params = match selected.control_mode().unwrap_or_default() {
            ControlMode::Scheduled => {
                v20::ScheduleExchangeReqParams::Scheduled(self.ev.scheduled_se_params(selected)?)
            }
            ControlMode::Dynamic => {
                v20::ScheduleExchangeReqParams::Dynamic(self.ev.dynamic_se_params(selected)?)
            }
        };
        Ok(v20::ScheduleExchangeReq {
            header: self.header(),
            max_supporting_points: DEFAULT_MAX_SUPPORTING_POINTS,
            params,
        })
    }

    fn v20_pre_charge(&self) -> Result<v20::DcPreChargeReq> {
        Ok(v20::DcPreChargeReq {
            header: self.header(),
            ev_processing: Processing::Ongoing,
            ev_present_voltage: rq(self.evse_voltage.unwrap_or(0.0))?,
            ev_target_voltage: rq(EV_TARGET_VOLTAGE)?,
        })
    }

    fn v20_power_delivery(&self, progress: ChargeProgress) -> v20::PowerDeliveryReq {
        v20::PowerDeliveryReq {
            header: self.header(),
            ev_processing: Processing::Finished,
            charge_progress: progress,
            ev_power_profile: None,
            bpt_channel_selection: None,
        }
    }

    fn v20_charge_loop(&self) -> Result<v20::Request> {
        let selected = self.selected()?;
        let shape = LoopShape::new(
            selected.control_mode().unwrap_or_default(),
            selected.service.is_bpt(),
        );
        if selected.service.is_dc() {
            return Ok(v20::DcChargeLoopReq {
                header: self.header(),
                display_parameters: None,
                meter_info_requested: false,
                ev_present_voltage: rq(self.evse_voltage.unwrap_or(EV_TARGET_VOLTAGE))?,
                control: dc_loop_control(shape)?,
            }
            .into());
        }
        Ok(v20::AcChargeLoopReq {
            header: self.header(),
            display_parameters: None,
            meter_info_requested: false,
            control: ac_loop_control(shape)?,
        }
        .into())
    }

    fn v20_next_cycle(&mut self) -> Result<v20::Request> {
        if self.ev.continue_charging() {
            return self.v20_charge_loop();
        }
        info!("EV finished charging");
        self.stopping = true;
        Ok(self.v20_power_delivery(ChargeProgress::Stop).into())
    }

    fn v20_session_stop(&self) -> v20::SessionStopReq {
        v20::SessionStopReq {
            header: self.header(),
            charging_session: ChargingSession::Terminate,
            ev_termination_code: None,
            ev_termination_explanation: None,
        }
    }
}

fn dc_ev_status() -> Result<DcEvStatus> {
    Ok(DcEvStatus {
        ev_ready: true,
        ev_ress_soc: Percent::new(EV_PRESENT_SOC)?,
        ..Default::default()
    })
}

fn v2_pre_charge() -> Result<v2::PreChargeReq> {
    Ok(v2::PreChargeReq {
        dc_ev_status: dc_ev_status()?,
        ev_target_voltage: PhysicalValue::volts(EV_TARGET_VOLTAGE)?,
        ev_target_current: PhysicalValue::amperes(EV_PRE_CHARGE_CURRENT)?,
    })
}

fn v2_session_stop() -> v2::SessionStopReq {
    v2::SessionStopReq {
        charging_session: ChargingSession::Terminate,
    }
}

fn ac_loop_control(shape: LoopShape) -> Result<v20::AcChargeLoopReqControl> {
    let scheduled = v20::ScheduledAcChargeLoopReqParams {
        ev_present_active_power: rq(EV_PRESENT_ACTIVE_POWER)?,
        ..Default::default()
    };
    let dynamic = v20::DynamicAcChargeLoopReqParams {
        departure_time: None,
        ev_target_energy_request: rq(40_000.0)?,
        ev_max_energy_request: rq(60_000.0)?,
        ev_min_energy_request: rq(20_000.0)?,
        ev_max_charge_power: rq(11_000.0)?,
        ev_min_charge_power: rq(100.0)?,
        ev_present_active_power: rq(EV_PRESENT_ACTIVE_POWER)?,
        ev_present_reactive_power: rq(0.0)?,
        ..Default::default()
    };
    Ok(match shape {
        LoopShape::Scheduled => v20::AcChargeLoopReqControl::Scheduled(scheduled),
        LoopShape::Dynamic => v20::AcChargeLoopReqControl::Dynamic(dynamic),
        LoopShape::BptScheduled => {
            v20::AcChargeLoopReqControl::BptScheduled(v20::BptScheduledAcChargeLoopReqParams {
                base: scheduled,
                ..Default::default()
            })
        }
        LoopShape::BptDynamic => {
            v20::AcChargeLoopReqControl::BptDynamic(v20::BptDynamicAcChargeLoopReqParams {
                base: dynamic,
                ev_max_discharge_power: rq(11_000.0)?,
                ev_min_discharge_power: rq(100.0)?,
                ..Default::default()
            })
        }
    })
}

fn dc_loop_control(shape: LoopShape) -> Result<v20::DcChargeLoopReqControl> {
    let scheduled = v20::ScheduledDcChargeLoopReqParams {
        ev_target_current: rq(EV_TARGET_CURRENT)?,
        ev_target_voltage: rq(EV_TARGET_VOLTAGE)?,
        ..Default::default()
    };
    let dynamic = v20::DynamicDcChargeLoopReqParams {
        departure_time: None,
        ev_target_energy_request: rq(40_000.0)?,
        ev_max_energy_request: rq(60_000.0)?,
        ev_min_energy_request: rq(20_000.0)?,
        ev_max_charge_power: rq(150_000.0)?,
        ev_min_charge_power: rq(100.0)?,
        ev_max_charge_current: rq(300.0)?,
        ev_max_voltage: rq(900.0)?,
        ev_min_voltage: rq(150.0)?,
    };
    Ok(match shape {
        LoopShape::Scheduled => v20::DcChargeLoopReqControl::Scheduled(scheduled),
        LoopShape::Dynamic => v20::DcChargeLoopReqControl::Dynamic(dynamic),
        LoopShape::BptScheduled => {
            v20::DcChargeLoopReqControl::BptScheduled(v20::BptScheduledDcChargeLoopReqParams {
                base: scheduled,
                ..Default::default()
            })
        }
        LoopShape::BptDynamic => {
            v20::DcChargeLoopReqControl::BptDynamic(v20::BptDynamicDcChargeLoopReqParams {
                base: dynamic,
                ev_max_discharge_power: rq(11_000.0)?,
                ev_min_discharge_power: rq(100.0)?,
                ev_max_discharge_current: rq(20.0)?,
                ev_max_v2x_energy_request: None,
                ev_min_v2x_energy_request: None,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeccSettings;
    use crate::controller::{SimEvController, SimEvseController};
    use crate::events::NullObserver;
    use crate::protocol::MessageKind;
    use crate::protocol::types::EnergyTransferMode;
    use crate::state::machine::{SessionState, SessionStateMachine};

    /// Drive an EVCC against a state machine in-process until either side stops.
    fn drive(
        evcc: &mut SimulatedEvcc<SimEvController>,
        sm: &mut SessionStateMachine<SimEvseController, NullObserver>,
    ) -> Vec<Response> {
        let mut responses = Vec::new();
        let mut request = evcc.first_request().unwrap();
        for _ in 0..200 {
            let response = sm.step(&request).unwrap();
            responses.push(response.clone());
            if sm.is_finished() {
                break;
            }
            match evcc.next_request(&response).unwrap() {
                Some(next) => request = next,
                None => break,
            }
        }
        responses
    }

    fn secc() -> SessionStateMachine<SimEvseController, NullObserver> {
        SessionStateMachine::new(
            SimEvseController::default(),
            NullObserver,
            SeccSettings::default(),
        )
    }

    #[test]
    fn test_first_request_offers_own_protocol() {
        let evcc = SimulatedEvcc::new(SimEvController::default(), Protocol::Iso15118_20Ac);
        let Request::AppProtocol(req) = evcc.first_request().unwrap() else {
            panic!("expected SupportedAppProtocolReq");
        };
        assert_eq!(req.app_protocols.len(), 1);
        assert_eq!(
            req.app_protocols[0].protocol_namespace,
            Protocol::Iso15118_20Ac.namespace()
        );
        assert_eq!(req.app_protocols[0].major_version, 1);
    }

    #[test]
    fn test_v2_ac_session_completes() {
        let ev = SimEvController::default().with_max_cycles(3);
        let mut evcc = SimulatedEvcc::new(ev, Protocol::Iso15118_2);
        let mut sm = secc();
        let responses = drive(&mut evcc, &mut sm);

        assert_eq!(sm.state(), SessionState::Terminate);
        assert!(responses.iter().all(|res| !res.response_code().is_failed()));
        let last = responses.last().unwrap();
        assert!(matches!(
            last,
            Response::V2(v2::Response {
                body: v2::ResponseBody::SessionStop(_),
                ..
            })
        ));
        assert_eq!(evcc.ev().cycles(), 3);
    }

    #[test]
    fn test_v2_dc_session_passes_cable_check_and_welding() {
        let ev = SimEvController::new(EnergyTransferMode::DcExtended, ServiceV20::Dc)
            .with_max_cycles(2);
        let mut evcc = SimulatedEvcc::new(ev, Protocol::Iso15118_2);
        let mut sm = secc();
        let responses = drive(&mut evcc, &mut sm);

        let kinds: Vec<_> = responses.iter().map(Response::kind).collect();
        assert!(kinds.contains(&MessageKind::CableCheck));
        assert!(kinds.contains(&MessageKind::PreCharge));
        assert!(kinds.contains(&MessageKind::CurrentDemand));
        assert!(kinds.contains(&MessageKind::WeldingDetection));
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_v20_ac_session_binds_last_parameter_set() {
        let ev = SimEvController::default().with_max_cycles(2);
        let mut evcc = SimulatedEvcc::new(ev, Protocol::Iso15118_20Ac);
        let mut sm = secc();
        let responses = drive(&mut evcc, &mut sm);

        assert!(responses.iter().all(|res| !res.response_code().is_failed()));
        let selected = evcc.selected_service().unwrap();
        assert_eq!(selected.service, ServiceV20::Ac);
        assert_eq!(selected.parameter_set.as_ref().map(|set| set.id), Some(2));
        assert!(!evcc.session_id().is_zero());
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_v20_dc_session_completes() {
        let ev = SimEvController::new(EnergyTransferMode::DcExtended, ServiceV20::Dc)
            .with_max_cycles(2);
        let mut evcc = SimulatedEvcc::new(ev, Protocol::Iso15118_20Dc);
        let mut sm = secc();
        let responses = drive(&mut evcc, &mut sm);

        assert!(responses.iter().all(|res| !res.response_code().is_failed()));
        assert!(matches!(
            responses.last(),
            Some(Response::V20(v20::Response::SessionStop(_)))
        ));
        assert_eq!(sm.state(), SessionState::Terminate);
    }

    #[test]
    fn test_failed_response_ends_evcc() {
        let mut evcc = SimulatedEvcc::new(SimEvController::default(), Protocol::Iso15118_2);
        let failed = Response::AppProtocol(
            crate::protocol::app_protocol::SupportedAppProtocolRes::failed(),
        );
        assert!(evcc.next_request(&failed).unwrap().is_none());
    }
}
