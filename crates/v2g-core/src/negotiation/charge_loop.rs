//! Charge loop parameters: -20 AC/DC ChargeLoopRes and -2 CurrentDemandRes.

use super::{NegotiationError, orq, rq};
use crate::context::{EvDataContext, EvseDataContext};
use crate::protocol::constants::{
    V2_MAX_CURRENT_LIMIT_A, V2_MAX_POWER_LIMIT_W, V2_MAX_VOLTAGE_LIMIT_V,
};
use crate::protocol::types::{ControlMode, MeterInfo};
use crate::protocol::v2::{CurrentDemandRes, DcEvseStatus, PhysicalValue};
use crate::protocol::v20::{
    AcChargeLoopReqControl, AcChargeLoopResControl, BptDynamicDcChargeLoopResParams,
    BptScheduledDcChargeLoopResParams, DcChargeLoopReqControl, DcChargeLoopResControl,
    DynamicAcChargeLoopResParams, DynamicDcChargeLoopResParams, ScheduledAcChargeLoopResParams,
    ScheduledDcChargeLoopResParams,
};
use crate::protocol::validation::Percent;
use crate::rational::RationalQuantity;

/// Parameter shape of a -20 charge loop, fixed by control mode and service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopShape {
    Scheduled,
    Dynamic,
    BptScheduled,
    BptDynamic,
}

impl LoopShape {
    pub fn new(mode: ControlMode, bpt: bool) -> Self {
        match (mode, bpt) {
            (ControlMode::Scheduled, false) => LoopShape::Scheduled,
            (ControlMode::Dynamic, false) => LoopShape::Dynamic,
            (ControlMode::Scheduled, true) => LoopShape::BptScheduled,
            (ControlMode::Dynamic, true) => LoopShape::BptDynamic,
        }
    }

    pub fn of_ac(control: &AcChargeLoopReqControl) -> Self {
        match control {
            AcChargeLoopReqControl::Scheduled(_) => LoopShape::Scheduled,
            AcChargeLoopReqControl::Dynamic(_) => LoopShape::Dynamic,
            AcChargeLoopReqControl::BptScheduled(_) => LoopShape::BptScheduled,
            AcChargeLoopReqControl::BptDynamic(_) => LoopShape::BptDynamic,
        }
    }

    pub fn of_dc(control: &DcChargeLoopReqControl) -> Self {
        match control {
            DcChargeLoopReqControl::Scheduled(_) => LoopShape::Scheduled,
            DcChargeLoopReqControl::Dynamic(_) => LoopShape::Dynamic,
            DcChargeLoopReqControl::BptScheduled(_) => LoopShape::BptScheduled,
            DcChargeLoopReqControl::BptDynamic(_) => LoopShape::BptDynamic,
        }
    }
}

fn percent(value: Option<u8>) -> Option<Percent> {
    value.and_then(|v| Percent::new(v).ok())
}

fn scheduled_ac(evse: &EvseDataContext) -> Result<ScheduledAcChargeLoopResParams, NegotiationError> {
    Ok(ScheduledAcChargeLoopResParams {
        evse_target_active_power: orq(evse.target_active_power)?,
        evse_target_active_power_l2: orq(evse.target_active_power_l2)?,
        evse_target_active_power_l3: orq(evse.target_active_power_l3)?,
        evse_target_reactive_power: orq(evse.target_reactive_power)?,
        evse_target_reactive_power_l2: orq(evse.target_reactive_power_l2)?,
        evse_target_reactive_power_l3: orq(evse.target_reactive_power_l3)?,
        evse_present_active_power: orq(evse.present_active_power)?,
        evse_present_active_power_l2: orq(evse.present_active_power_l2)?,
        evse_present_active_power_l3: orq(evse.present_active_power_l3)?,
    })
}

fn dynamic_ac(evse: &EvseDataContext) -> Result<DynamicAcChargeLoopResParams, NegotiationError> {
    Ok(DynamicAcChargeLoopResParams {
        departure_time: evse.departure_time,
        min_soc: percent(evse.min_soc),
        target_soc: percent(evse.target_soc),
        ack_max_delay: evse.ack_max_delay,
        evse_target_active_power: rq(
            "target_active_power",
            evse.target_active_power.or(evse.max_charge_power),
        )?,
        evse_target_active_power_l2: orq(evse.target_active_power_l2)?,
        evse_target_active_power_l3: orq(evse.target_active_power_l3)?,
        evse_target_reactive_power: orq(evse.target_reactive_power)?,
        evse_target_reactive_power_l2: orq(evse.target_reactive_power_l2)?,
        evse_target_reactive_power_l3: orq(evse.target_reactive_power_l3)?,
        evse_present_active_power: orq(evse.present_active_power)?,
        evse_present_active_power_l2: orq(evse.present_active_power_l2)?,
        evse_present_active_power_l3: orq(evse.present_active_power_l3)?,
    })
}

/// -20 AC loop response in the same shape as the request.
pub fn ac_charge_loop_res(
    shape: LoopShape,
    evse: &EvseDataContext,
) -> Result<AcChargeLoopResControl, NegotiationError> {
    Ok(match shape {
        LoopShape::Scheduled => AcChargeLoopResControl::Scheduled(scheduled_ac(evse)?),
        LoopShape::Dynamic => AcChargeLoopResControl::Dynamic(dynamic_ac(evse)?),
        LoopShape::BptScheduled => AcChargeLoopResControl::BptScheduled(scheduled_ac(evse)?),
        LoopShape::BptDynamic => AcChargeLoopResControl::BptDynamic(dynamic_ac(evse)?),
    })
}

fn scheduled_dc(evse: &EvseDataContext) -> Result<ScheduledDcChargeLoopResParams, NegotiationError> {
    Ok(ScheduledDcChargeLoopResParams {
        evse_max_charge_power: orq(evse.max_charge_power)?,
        evse_min_charge_power: orq(evse.min_charge_power)?,
        evse_max_charge_current: orq(evse.max_charge_current)?,
        evse_max_voltage: orq(evse.max_voltage)?,
    })
}

fn dynamic_dc(evse: &EvseDataContext) -> Result<DynamicDcChargeLoopResParams, NegotiationError> {
    Ok(DynamicDcChargeLoopResParams {
        departure_time: evse.departure_time,
        min_soc: percent(evse.min_soc),
        target_soc: percent(evse.target_soc),
        ack_max_delay: evse.ack_max_delay,
        evse_max_charge_power: rq("max_charge_power", evse.max_charge_power)?,
        evse_min_charge_power: rq("min_charge_power", evse.min_charge_power)?,
        evse_max_charge_current: rq("max_charge_current", evse.max_charge_current)?,
        evse_max_voltage: rq("max_voltage", evse.max_voltage)?,
    })
}

/// -20 DC loop response control in the same shape as the request.
pub fn dc_charge_loop_res(
    shape: LoopShape,
    evse: &EvseDataContext,
) -> Result<DcChargeLoopResControl, NegotiationError> {
    Ok(match shape {
        LoopShape::Scheduled => DcChargeLoopResControl::Scheduled(scheduled_dc(evse)?),
        LoopShape::Dynamic => DcChargeLoopResControl::Dynamic(dynamic_dc(evse)?),
        LoopShape::BptScheduled => {
            DcChargeLoopResControl::BptScheduled(BptScheduledDcChargeLoopResParams {
                base: scheduled_dc(evse)?,
                evse_max_discharge_power: orq(evse.max_discharge_power)?,
                evse_min_discharge_power: orq(evse.min_discharge_power)?,
                evse_max_discharge_current: orq(evse.max_discharge_current)?,
                evse_min_voltage: orq(evse.min_voltage)?,
            })
        }
        LoopShape::BptDynamic => DcChargeLoopResControl::BptDynamic(BptDynamicDcChargeLoopResParams {
            base: dynamic_dc(evse)?,
            evse_max_discharge_power: rq("max_discharge_power", evse.max_discharge_power)?,
            evse_min_discharge_power: rq("min_discharge_power", evse.min_discharge_power)?,
            evse_max_discharge_current: rq("max_discharge_current", evse.max_discharge_current)?,
            evse_min_voltage: rq("min_voltage", evse.min_voltage)?,
        }),
    })
}

/// Which EVSE limits the EV's present targets run into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimitsAchieved {
    pub power: bool,
    pub current: bool,
    pub voltage: bool,
}

/// Compare the EV's targets with the EVSE maxima. Unknown values never
/// count as a limit.
pub fn dc_limits_achieved(ev: &EvDataContext, evse: &EvseDataContext) -> LimitsAchieved {
    let reached = |value: Option<f64>, limit: Option<f64>| match (value, limit) {
        (Some(value), Some(limit)) => value >= limit,
        _ => false,
    };
    let power = match (ev.target_current, ev.target_voltage) {
        (Some(i), Some(u)) => Some(i * u),
        _ => None,
    };
    LimitsAchieved {
        power: reached(power, evse.max_charge_power),
        current: reached(ev.target_current, evse.max_charge_current),
        voltage: reached(ev.target_voltage, evse.max_voltage),
    }
}

/// Present current and voltage the charger reports, falling back to the
/// EV's targets when the charger has not published any.
pub fn present_dc_output(ev: &EvDataContext, evse: &EvseDataContext) -> (f64, f64) {
    let current = evse.present_current.or(ev.target_current).unwrap_or(0.0);
    let voltage = evse.present_voltage.or(ev.target_voltage).unwrap_or(0.0);
    (current, voltage)
}

/// -20 present current/voltage pair.
pub fn present_dc_output_v20(
    ev: &EvDataContext,
    evse: &EvseDataContext,
) -> Result<(RationalQuantity, RationalQuantity), NegotiationError> {
    let (current, voltage) = present_dc_output(ev, evse);
    Ok((
        RationalQuantity::from_f64(current)?,
        RationalQuantity::from_f64(voltage)?,
    ))
}

/// -2 CurrentDemandRes from both contexts.
pub fn current_demand_res(
    ev: &EvDataContext,
    evse: &EvseDataContext,
    dc_evse_status: DcEvseStatus,
    evse_id: String,
    sa_schedule_tuple_id: u8,
    meter_info: Option<MeterInfo>,
) -> Result<CurrentDemandRes, NegotiationError> {
    let (current, voltage) = present_dc_output(ev, evse);
    let limits = dc_limits_achieved(ev, evse);
    let capped = |value: Option<f64>, cap: f64| value.map(|v| v.min(cap));
    Ok(CurrentDemandRes {
        dc_evse_status,
        evse_present_voltage: PhysicalValue::volts(voltage)?,
        evse_present_current: PhysicalValue::amperes(current)?,
        evse_current_limit_achieved: limits.current,
        evse_voltage_limit_achieved: limits.voltage,
        evse_power_limit_achieved: limits.power,
        evse_maximum_voltage_limit: capped(evse.max_voltage, V2_MAX_VOLTAGE_LIMIT_V)
            .map(PhysicalValue::volts)
            .transpose()?,
        evse_maximum_current_limit: capped(evse.max_charge_current, V2_MAX_CURRENT_LIMIT_A)
            .map(PhysicalValue::amperes)
            .transpose()?,
        evse_maximum_power_limit: capped(evse.max_charge_power, V2_MAX_POWER_LIMIT_W)
            .map(PhysicalValue::watts)
            .transpose()?,
        evse_id,
        sa_schedule_tuple_id,
        meter_info,
        receipt_required: Some(false),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evse() -> EvseDataContext {
        EvseDataContext {
            max_charge_power: Some(50000.0),
            min_charge_power: Some(0.0),
            max_charge_current: Some(125.0),
            max_voltage: Some(500.0),
            min_voltage: Some(150.0),
            max_discharge_power: Some(11000.0),
            min_discharge_power: Some(1000.0),
            max_discharge_current: Some(11.0),
            target_active_power: Some(11000.0),
            present_active_power: Some(10500.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_shape_from_mode() {
        assert_eq!(LoopShape::new(ControlMode::Dynamic, true), LoopShape::BptDynamic);
        assert_eq!(LoopShape::new(ControlMode::Scheduled, false), LoopShape::Scheduled);
    }

    #[test]
    fn test_ac_response_follows_shape() {
        let res = ac_charge_loop_res(LoopShape::BptScheduled, &evse()).unwrap();
        let AcChargeLoopResControl::BptScheduled(params) = res else {
            panic!("expected BPT scheduled response");
        };
        assert_eq!(params.evse_target_active_power.map(|q| q.decode()), Some(11000.0));
        assert_eq!(params.evse_present_active_power.map(|q| q.decode()), Some(10500.0));
    }

    #[test]
    fn test_dynamic_ac_falls_back_to_max_power() {
        let mut evse = evse();
        evse.target_active_power = None;
        let AcChargeLoopResControl::Dynamic(params) =
            ac_charge_loop_res(LoopShape::Dynamic, &evse).unwrap()
        else {
            panic!("expected dynamic response");
        };
        assert_eq!(params.evse_target_active_power.decode(), 50000.0);
    }

    #[test]
    fn test_dc_bpt_dynamic_requires_discharge_limits() {
        let mut evse = evse();
        assert!(dc_charge_loop_res(LoopShape::BptDynamic, &evse).is_ok());
        evse.max_discharge_current = None;
        assert_eq!(
            dc_charge_loop_res(LoopShape::BptDynamic, &evse).unwrap_err(),
            NegotiationError::MissingEvseValue("max_discharge_current")
        );
    }

    #[test]
    fn test_limits_achieved() {
        let ev = EvDataContext {
            target_current: Some(125.0),
            target_voltage: Some(400.0),
            ..Default::default()
        };
        let limits = dc_limits_achieved(&ev, &evse());
        assert!(limits.current);
        assert!(limits.power);
        assert!(!limits.voltage);
        assert_eq!(
            dc_limits_achieved(&EvDataContext::default(), &evse()),
            LimitsAchieved::default()
        );
    }

    #[test]
    fn test_current_demand_echoes_targets_without_present_values() {
        let ev = EvDataContext {
            target_current: Some(30.0),
            target_voltage: Some(400.0),
            ..Default::default()
        };
        let res = current_demand_res(&ev, &evse(), DcEvseStatus::default(), "DE*ABC".into(), 1, None)
            .unwrap();
        assert_eq!(res.evse_present_voltage.decode(), 400.0);
        assert_eq!(res.evse_present_current.decode(), 30.0);
        assert_eq!(res.evse_maximum_voltage_limit.map(|v| v.decode()), Some(500.0));
    }
}
