//! EV- and EVSE-side data contexts accumulated over a session.
//!
//! Every value is optional: a context starts empty and fills up as requests
//! arrive (EV side) or as the charger publishes its capabilities and
//! present values (EVSE side). Merging only ever overwrites a field with a
//! value that is actually present, so merges are idempotent and never clear
//! anything.

use serde::{Deserialize, Serialize};

use crate::protocol::v2::{
    AcEvChargeParameter, CurrentDemandReq, DcEvChargeParameter, DcEvStatus, EvChargeParameter,
    PhysicalValue, PreChargeReq,
};
use crate::protocol::v20::{
    AcChargeLoopReqControl, AcCpdReqParams, AcCpdReqParamsKind, BptAcCpdReqParams,
    BptDcCpdReqParams, BptDynamicAcChargeLoopReqParams, BptDynamicDcChargeLoopReqParams,
    BptScheduledAcChargeLoopReqParams, BptScheduledDcChargeLoopReqParams, DcChargeLoopReqControl,
    DcCpdReqParams, DcCpdReqParamsKind, DisplayParameters, DynamicAcChargeLoopReqParams,
    DynamicDcChargeLoopReqParams, DynamicScheduleExchangeReqParams, ScheduleExchangeReqParams,
    ScheduledAcChargeLoopReqParams, ScheduledDcChargeLoopReqParams,
    ScheduledScheduleExchangeReqParams,
};
use crate::rational::RationalQuantity;

macro_rules! data_context {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $($(#[$fmeta:meta])* $field:ident: $ty:ty,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $($(#[$fmeta])* pub $field: Option<$ty>,)*
        }

        impl $name {
            /// Copy every field that is set in `update`.
            pub fn merge_from(&mut self, update: &Self) {
                $(
                    if update.$field.is_some() {
                        self.$field = update.$field;
                    }
                )*
            }

            pub fn is_empty(&self) -> bool {
                $(self.$field.is_none())&&*
            }
        }
    };
}

data_context! {
    /// What the EV has told the SECC so far, as physical values.
    pub struct EvDataContext {
        /// Seconds from now.
        departure_time: u32,
        target_energy_request: f64,
        max_energy_request: f64,
        min_energy_request: f64,
        max_v2x_energy_request: f64,
        min_v2x_energy_request: f64,
        battery_energy_capacity: f64,

        max_charge_power: f64,
        max_charge_power_l2: f64,
        max_charge_power_l3: f64,
        min_charge_power: f64,
        min_charge_power_l2: f64,
        min_charge_power_l3: f64,
        max_discharge_power: f64,
        max_discharge_power_l2: f64,
        max_discharge_power_l3: f64,
        min_discharge_power: f64,
        min_discharge_power_l2: f64,
        min_discharge_power_l3: f64,

        max_charge_current: f64,
        min_charge_current: f64,
        max_discharge_current: f64,
        min_discharge_current: f64,
        max_voltage: f64,
        min_voltage: f64,

        present_active_power: f64,
        present_active_power_l2: f64,
        present_active_power_l3: f64,
        present_reactive_power: f64,
        present_reactive_power_l2: f64,
        present_reactive_power_l3: f64,
        present_voltage: f64,
        target_current: f64,
        target_voltage: f64,

        present_soc: u8,
        min_soc: u8,
        target_soc: u8,
        max_soc: u8,
        full_soc: u8,
        bulk_soc: u8,
        remaining_time_to_target_soc: u32,
        charging_complete: bool,
    }
}

data_context! {
    /// EVSE capabilities and present values, as published by the charger.
    pub struct EvseDataContext {
        max_charge_power: f64,
        max_charge_power_l2: f64,
        max_charge_power_l3: f64,
        min_charge_power: f64,
        min_charge_power_l2: f64,
        min_charge_power_l3: f64,
        max_discharge_power: f64,
        max_discharge_power_l2: f64,
        max_discharge_power_l3: f64,
        min_discharge_power: f64,
        min_discharge_power_l2: f64,
        min_discharge_power_l3: f64,

        max_charge_current: f64,
        min_charge_current: f64,
        max_discharge_current: f64,
        min_discharge_current: f64,
        max_voltage: f64,
        min_voltage: f64,

        nominal_frequency: f64,
        nominal_voltage: f64,
        max_power_asymmetry: f64,
        power_ramp_limitation: f64,
        peak_current_ripple: f64,
        current_regulation_tolerance: f64,
        energy_to_be_delivered: f64,

        present_active_power: f64,
        present_active_power_l2: f64,
        present_active_power_l3: f64,
        present_voltage: f64,
        present_current: f64,
        target_active_power: f64,
        target_active_power_l2: f64,
        target_active_power_l3: f64,
        target_reactive_power: f64,
        target_reactive_power_l2: f64,
        target_reactive_power_l3: f64,
        target_frequency: f64,

        /// Dynamic mode: departure time the EVSE commits to.
        departure_time: u32,
        min_soc: u8,
        target_soc: u8,
        ack_max_delay: u16,
    }
}

/// A partial set of EVSE values, merged over the running context.
pub type EvseUpdate = EvseDataContext;

impl EvDataContext {
    pub fn merge(&mut self, params: &impl EvParameters) {
        self.merge_from(&params.to_update());
    }
}

impl EvseDataContext {
    pub fn merge(&mut self, update: &EvseUpdate) {
        self.merge_from(update);
    }
}

/// An EV-side request parameter shape that carries context values.
pub trait EvParameters {
    /// The values this shape carries; everything else stays unset.
    fn to_update(&self) -> EvDataContext;
}

fn v(q: RationalQuantity) -> Option<f64> {
    Some(q.decode())
}

fn ov(q: Option<RationalQuantity>) -> Option<f64> {
    q.map(|q| q.decode())
}

fn pv(p: PhysicalValue) -> Option<f64> {
    Some(p.decode())
}

// ----------------------------------------------------------------------------
// ISO 15118-20 charge parameter discovery
// ----------------------------------------------------------------------------

impl EvParameters for AcCpdReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            max_charge_power: v(self.ev_max_charge_power),
            max_charge_power_l2: ov(self.ev_max_charge_power_l2),
            max_charge_power_l3: ov(self.ev_max_charge_power_l3),
            min_charge_power: v(self.ev_min_charge_power),
            min_charge_power_l2: ov(self.ev_min_charge_power_l2),
            min_charge_power_l3: ov(self.ev_min_charge_power_l3),
            ..Default::default()
        }
    }
}

impl EvParameters for BptAcCpdReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            max_discharge_power: v(self.ev_max_discharge_power),
            max_discharge_power_l2: ov(self.ev_max_discharge_power_l2),
            max_discharge_power_l3: ov(self.ev_max_discharge_power_l3),
            min_discharge_power: v(self.ev_min_discharge_power),
            min_discharge_power_l2: ov(self.ev_min_discharge_power_l2),
            min_discharge_power_l3: ov(self.ev_min_discharge_power_l3),
            ..self.base.to_update()
        }
    }
}

impl EvParameters for AcCpdReqParamsKind {
    fn to_update(&self) -> EvDataContext {
        match self {
            AcCpdReqParamsKind::Ac(p) => p.to_update(),
            AcCpdReqParamsKind::Bpt(p) => p.to_update(),
        }
    }
}

impl EvParameters for DcCpdReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            max_charge_power: v(self.ev_max_charge_power),
            min_charge_power: v(self.ev_min_charge_power),
            max_charge_current: v(self.ev_max_charge_current),
            min_charge_current: v(self.ev_min_charge_current),
            max_voltage: v(self.ev_max_voltage),
            min_voltage: v(self.ev_min_voltage),
            target_soc: self.target_soc.map(|s| s.value()),
            ..Default::default()
        }
    }
}

impl EvParameters for BptDcCpdReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            max_discharge_power: v(self.ev_max_discharge_power),
            min_discharge_power: v(self.ev_min_discharge_power),
            max_discharge_current: v(self.ev_max_discharge_current),
            min_discharge_current: v(self.ev_min_discharge_current),
            ..self.base.to_update()
        }
    }
}

impl EvParameters for DcCpdReqParamsKind {
    fn to_update(&self) -> EvDataContext {
        match self {
            DcCpdReqParamsKind::Dc(p) => p.to_update(),
            DcCpdReqParamsKind::Bpt(p) => p.to_update(),
        }
    }
}

// ----------------------------------------------------------------------------
// ISO 15118-20 schedule exchange
// ----------------------------------------------------------------------------

impl EvParameters for ScheduledScheduleExchangeReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            departure_time: self.departure_time,
            target_energy_request: ov(self.ev_target_energy_request),
            max_energy_request: ov(self.ev_max_energy_request),
            min_energy_request: ov(self.ev_min_energy_request),
            ..Default::default()
        }
    }
}

impl EvParameters for DynamicScheduleExchangeReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            departure_time: Some(self.departure_time),
            min_soc: self.min_soc.map(|s| s.value()),
            target_soc: self.target_soc.map(|s| s.value()),
            target_energy_request: v(self.ev_target_energy_request),
            max_energy_request: v(self.ev_max_energy_request),
            min_energy_request: v(self.ev_min_energy_request),
            max_v2x_energy_request: ov(self.ev_max_v2x_energy_request),
            min_v2x_energy_request: ov(self.ev_min_v2x_energy_request),
            ..Default::default()
        }
    }
}

impl EvParameters for ScheduleExchangeReqParams {
    fn to_update(&self) -> EvDataContext {
        match self {
            ScheduleExchangeReqParams::Scheduled(p) => p.to_update(),
            ScheduleExchangeReqParams::Dynamic(p) => p.to_update(),
        }
    }
}

// ----------------------------------------------------------------------------
// ISO 15118-20 AC charge loop
// ----------------------------------------------------------------------------

impl EvParameters for ScheduledAcChargeLoopReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            target_energy_request: ov(self.ev_target_energy_request),
            max_energy_request: ov(self.ev_max_energy_request),
            min_energy_request: ov(self.ev_min_energy_request),
            max_charge_power: ov(self.ev_max_charge_power),
            max_charge_power_l2: ov(self.ev_max_charge_power_l2),
            max_charge_power_l3: ov(self.ev_max_charge_power_l3),
            min_charge_power: ov(self.ev_min_charge_power),
            min_charge_power_l2: ov(self.ev_min_charge_power_l2),
            min_charge_power_l3: ov(self.ev_min_charge_power_l3),
            present_active_power: v(self.ev_present_active_power),
            present_active_power_l2: ov(self.ev_present_active_power_l2),
            present_active_power_l3: ov(self.ev_present_active_power_l3),
            present_reactive_power: ov(self.ev_present_reactive_power),
            present_reactive_power_l2: ov(self.ev_present_reactive_power_l2),
            present_reactive_power_l3: ov(self.ev_present_reactive_power_l3),
            ..Default::default()
        }
    }
}

impl EvParameters for BptScheduledAcChargeLoopReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            max_discharge_power: ov(self.ev_max_discharge_power),
            max_discharge_power_l2: ov(self.ev_max_discharge_power_l2),
            max_discharge_power_l3: ov(self.ev_max_discharge_power_l3),
            min_discharge_power: ov(self.ev_min_discharge_power),
            min_discharge_power_l2: ov(self.ev_min_discharge_power_l2),
            min_discharge_power_l3: ov(self.ev_min_discharge_power_l3),
            ..self.base.to_update()
        }
    }
}

impl EvParameters for DynamicAcChargeLoopReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            departure_time: self.departure_time,
            target_energy_request: v(self.ev_target_energy_request),
            max_energy_request: v(self.ev_max_energy_request),
            min_energy_request: v(self.ev_min_energy_request),
            max_charge_power: v(self.ev_max_charge_power),
            max_charge_power_l2: ov(self.ev_max_charge_power_l2),
            max_charge_power_l3: ov(self.ev_max_charge_power_l3),
            min_charge_power: v(self.ev_min_charge_power),
            min_charge_power_l2: ov(self.ev_min_charge_power_l2),
            min_charge_power_l3: ov(self.ev_min_charge_power_l3),
            present_active_power: v(self.ev_present_active_power),
            present_active_power_l2: ov(self.ev_present_active_power_l2),
            present_active_power_l3: ov(self.ev_present_active_power_l3),
            present_reactive_power: v(self.ev_present_reactive_power),
            present_reactive_power_l2: ov(self.ev_present_reactive_power_l2),
            present_reactive_power_l3: ov(self.ev_present_reactive_power_l3),
            ..Default::default()
        }
    }
}

impl EvParameters for BptDynamicAcChargeLoopReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            max_discharge_power: v(self.ev_max_discharge_power),
            max_discharge_power_l2: ov(self.ev_max_discharge_power_l2),
            max_discharge_power_l3: ov(self.ev_max_discharge_power_l3),
            min_discharge_power: v(self.ev_min_discharge_power),
            min_discharge_power_l2: ov(self.ev_min_discharge_power_l2),
            min_discharge_power_l3: ov(self.ev_min_discharge_power_l3),
            max_v2x_energy_request: ov(self.ev_max_v2x_energy_request),
            min_v2x_energy_request: ov(self.ev_min_v2x_energy_request),
            ..self.base.to_update()
        }
    }
}

impl EvParameters for AcChargeLoopReqControl {
    fn to_update(&self) -> EvDataContext {
        match self {
            AcChargeLoopReqControl::Scheduled(p) => p.to_update(),
            AcChargeLoopReqControl::Dynamic(p) => p.to_update(),
            AcChargeLoopReqControl::BptScheduled(p) => p.to_update(),
            AcChargeLoopReqControl::BptDynamic(p) => p.to_update(),
        }
    }
}

// ----------------------------------------------------------------------------
// ISO 15118-20 DC charge loop
// ----------------------------------------------------------------------------

impl EvParameters for ScheduledDcChargeLoopReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            target_energy_request: ov(self.ev_target_energy_request),
            max_energy_request: ov(self.ev_max_energy_request),
            min_energy_request: ov(self.ev_min_energy_request),
            target_current: v(self.ev_target_current),
            target_voltage: v(self.ev_target_voltage),
            max_charge_power: ov(self.ev_max_charge_power),
            min_charge_power: ov(self.ev_min_charge_power),
            max_charge_current: ov(self.ev_max_charge_current),
            max_voltage: ov(self.ev_max_voltage),
            min_voltage: ov(self.ev_min_voltage),
            ..Default::default()
        }
    }
}

impl EvParameters for BptScheduledDcChargeLoopReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            max_discharge_power: ov(self.ev_max_discharge_power),
            min_discharge_power: ov(self.ev_min_discharge_power),
            max_discharge_current: ov(self.ev_max_discharge_current),
            ..self.base.to_update()
        }
    }
}

impl EvParameters for DynamicDcChargeLoopReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            departure_time: self.departure_time,
            target_energy_request: v(self.ev_target_energy_request),
            max_energy_request: v(self.ev_max_energy_request),
            min_energy_request: v(self.ev_min_energy_request),
            max_charge_power: v(self.ev_max_charge_power),
            min_charge_power: v(self.ev_min_charge_power),
            max_charge_current: v(self.ev_max_charge_current),
            max_voltage: v(self.ev_max_voltage),
            min_voltage: v(self.ev_min_voltage),
            ..Default::default()
        }
    }
}

impl EvParameters for BptDynamicDcChargeLoopReqParams {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            max_discharge_power: v(self.ev_max_discharge_power),
            min_discharge_power: v(self.ev_min_discharge_power),
            max_discharge_current: v(self.ev_max_discharge_current),
            max_v2x_energy_request: ov(self.ev_max_v2x_energy_request),
            min_v2x_energy_request: ov(self.ev_min_v2x_energy_request),
            ..self.base.to_update()
        }
    }
}

impl EvParameters for DcChargeLoopReqControl {
    fn to_update(&self) -> EvDataContext {
        match self {
            DcChargeLoopReqControl::Scheduled(p) => p.to_update(),
            DcChargeLoopReqControl::Dynamic(p) => p.to_update(),
            DcChargeLoopReqControl::BptScheduled(p) => p.to_update(),
            DcChargeLoopReqControl::BptDynamic(p) => p.to_update(),
        }
    }
}

impl EvParameters for DisplayParameters {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            present_soc: self.present_soc.map(|s| s.value()),
            min_soc: self.min_soc.map(|s| s.value()),
            target_soc: self.target_soc.map(|s| s.value()),
            max_soc: self.max_soc.map(|s| s.value()),
            remaining_time_to_target_soc: self.remaining_time_to_target_soc,
            charging_complete: self.charging_complete,
            battery_energy_capacity: ov(self.battery_energy_capacity),
            ..Default::default()
        }
    }
}

// ----------------------------------------------------------------------------
// ISO 15118-2
// ----------------------------------------------------------------------------

impl EvParameters for AcEvChargeParameter {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            departure_time: self.departure_time.filter(|&t| t > 0),
            target_energy_request: pv(self.e_amount),
            max_voltage: pv(self.ev_max_voltage),
            max_charge_current: pv(self.ev_max_current),
            min_charge_current: pv(self.ev_min_current),
            ..Default::default()
        }
    }
}

impl EvParameters for DcEvChargeParameter {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            departure_time: self.departure_time.filter(|&t| t > 0),
            max_charge_current: pv(self.ev_maximum_current_limit),
            max_charge_power: self.ev_maximum_power_limit.and_then(pv),
            max_voltage: pv(self.ev_maximum_voltage_limit),
            battery_energy_capacity: self.ev_energy_capacity.and_then(pv),
            target_energy_request: self.ev_energy_request.and_then(pv),
            full_soc: self.full_soc.map(|s| s.value()),
            bulk_soc: self.bulk_soc.map(|s| s.value()),
            ..self.dc_ev_status.to_update()
        }
    }
}

impl EvParameters for EvChargeParameter {
    fn to_update(&self) -> EvDataContext {
        match self {
            EvChargeParameter::Ac(p) => p.to_update(),
            EvChargeParameter::Dc(p) => p.to_update(),
        }
    }
}

impl EvParameters for DcEvStatus {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            present_soc: Some(self.ev_ress_soc.value()),
            ..Default::default()
        }
    }
}

impl EvParameters for PreChargeReq {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            target_voltage: pv(self.ev_target_voltage),
            target_current: pv(self.ev_target_current),
            ..self.dc_ev_status.to_update()
        }
    }
}

impl EvParameters for CurrentDemandReq {
    fn to_update(&self) -> EvDataContext {
        EvDataContext {
            target_current: pv(self.ev_target_current),
            target_voltage: pv(self.ev_target_voltage),
            max_voltage: self.ev_maximum_voltage_limit.and_then(pv),
            max_charge_current: self.ev_maximum_current_limit.and_then(pv),
            max_charge_power: self.ev_maximum_power_limit.and_then(pv),
            charging_complete: Some(self.charging_complete),
            ..self.dc_ev_status.to_update()
        }
    }
}
