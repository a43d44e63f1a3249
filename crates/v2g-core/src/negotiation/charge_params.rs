//! EVSE charge parameters for ChargeParameterDiscoveryRes.

use super::{NegotiationError, orq, require, rq};
use crate::context::EvseDataContext;
use crate::protocol::constants::{
    V2_MAX_CURRENT_LIMIT_A, V2_MAX_POWER_LIMIT_W, V2_MAX_VOLTAGE_LIMIT_V,
};
use crate::protocol::types::EnergyTransferMode;
use crate::protocol::v2::{
    AcEvseChargeParameter, AcEvseStatus, DcEvseChargeParameter, DcEvseStatus,
    EvseChargeParameter, PhysicalValue,
};
use crate::protocol::v20::{
    AcCpdResParams, AcCpdResParamsKind, BptAcCpdResParams, BptDcCpdResParams, DcCpdResParams,
    DcCpdResParamsKind,
};

/// -20 AC response parameters; `bpt` adds the discharge limits.
pub fn ac_cpd_res_params(
    evse: &EvseDataContext,
    bpt: bool,
) -> Result<AcCpdResParamsKind, NegotiationError> {
    let base = AcCpdResParams {
        evse_max_charge_power: rq("max_charge_power", evse.max_charge_power)?,
        evse_max_charge_power_l2: orq(evse.max_charge_power_l2)?,
        evse_max_charge_power_l3: orq(evse.max_charge_power_l3)?,
        evse_min_charge_power: rq("min_charge_power", evse.min_charge_power)?,
        evse_min_charge_power_l2: orq(evse.min_charge_power_l2)?,
        evse_min_charge_power_l3: orq(evse.min_charge_power_l3)?,
        evse_nominal_frequency: rq("nominal_frequency", evse.nominal_frequency)?,
        max_power_asymmetry: orq(evse.max_power_asymmetry)?,
        evse_power_ramp_limitation: orq(evse.power_ramp_limitation)?,
        evse_present_active_power: orq(evse.present_active_power)?,
        evse_present_active_power_l2: orq(evse.present_active_power_l2)?,
        evse_present_active_power_l3: orq(evse.present_active_power_l3)?,
    };
    if !bpt {
        return Ok(AcCpdResParamsKind::Ac(base));
    }
    Ok(AcCpdResParamsKind::Bpt(BptAcCpdResParams {
        base,
        evse_max_discharge_power: rq("max_discharge_power", evse.max_discharge_power)?,
        evse_max_discharge_power_l2: orq(evse.max_discharge_power_l2)?,
        evse_max_discharge_power_l3: orq(evse.max_discharge_power_l3)?,
        evse_min_discharge_power: rq("min_discharge_power", evse.min_discharge_power)?,
        evse_min_discharge_power_l2: orq(evse.min_discharge_power_l2)?,
        evse_min_discharge_power_l3: orq(evse.min_discharge_power_l3)?,
    }))
}

/// -20 DC response parameters; `bpt` adds the discharge limits.
pub fn dc_cpd_res_params(
    evse: &EvseDataContext,
    bpt: bool,
) -> Result<DcCpdResParamsKind, NegotiationError> {
    let base = DcCpdResParams {
        evse_max_charge_power: rq("max_charge_power", evse.max_charge_power)?,
        evse_min_charge_power: rq("min_charge_power", evse.min_charge_power)?,
        evse_max_charge_current: rq("max_charge_current", evse.max_charge_current)?,
        evse_min_charge_current: rq("min_charge_current", evse.min_charge_current)?,
        evse_max_voltage: rq("max_voltage", evse.max_voltage)?,
        evse_min_voltage: rq("min_voltage", evse.min_voltage)?,
        evse_power_ramp_limitation: orq(evse.power_ramp_limitation)?,
    };
    if !bpt {
        return Ok(DcCpdResParamsKind::Dc(base));
    }
    Ok(DcCpdResParamsKind::Bpt(BptDcCpdResParams {
        base,
        evse_max_discharge_power: rq("max_discharge_power", evse.max_discharge_power)?,
        evse_min_discharge_power: rq("min_discharge_power", evse.min_discharge_power)?,
        evse_max_discharge_current: rq("max_discharge_current", evse.max_discharge_current)?,
        evse_min_discharge_current: rq("min_discharge_current", evse.min_discharge_current)?,
    }))
}

/// -2 EVSE charge parameter for the requested energy transfer mode.
///
/// Limits above the -2 physical value ranges are capped to them.
pub fn v2_evse_charge_parameter(
    evse: &EvseDataContext,
    mode: EnergyTransferMode,
    ac_status: AcEvseStatus,
    dc_status: DcEvseStatus,
) -> Result<EvseChargeParameter, NegotiationError> {
    if !mode.is_dc() {
        return Ok(EvseChargeParameter::Ac(AcEvseChargeParameter {
            ac_evse_status: ac_status,
            evse_nominal_voltage: PhysicalValue::volts(require(
                "nominal_voltage",
                evse.nominal_voltage,
            )?)?,
            evse_max_current: PhysicalValue::amperes(
                require("max_charge_current", evse.max_charge_current)?
                    .min(V2_MAX_CURRENT_LIMIT_A),
            )?,
        }));
    }

    Ok(EvseChargeParameter::Dc(DcEvseChargeParameter {
        dc_evse_status: dc_status,
        evse_maximum_current_limit: PhysicalValue::amperes(
            require("max_charge_current", evse.max_charge_current)?.min(V2_MAX_CURRENT_LIMIT_A),
        )?,
        evse_maximum_power_limit: PhysicalValue::watts(
            require("max_charge_power", evse.max_charge_power)?.min(V2_MAX_POWER_LIMIT_W),
        )?,
        evse_maximum_voltage_limit: PhysicalValue::volts(
            require("max_voltage", evse.max_voltage)?.min(V2_MAX_VOLTAGE_LIMIT_V),
        )?,
        evse_minimum_current_limit: PhysicalValue::amperes(require(
            "min_charge_current",
            evse.min_charge_current,
        )?)?,
        evse_minimum_voltage_limit: PhysicalValue::volts(require(
            "min_voltage",
            evse.min_voltage,
        )?)?,
        evse_peak_current_ripple: PhysicalValue::amperes(require(
            "peak_current_ripple",
            evse.peak_current_ripple,
        )?)?,
        evse_current_regulation_tolerance: evse
            .current_regulation_tolerance
            .map(PhysicalValue::amperes)
            .transpose()?,
        evse_energy_to_be_delivered: evse
            .energy_to_be_delivered
            .map(PhysicalValue::watt_hours)
            .transpose()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::RationalQuantity;

    fn evse() -> EvseDataContext {
        EvseDataContext {
            max_charge_power: Some(30000.0),
            min_charge_power: Some(100.0),
            max_discharge_power: Some(30000.0),
            min_discharge_power: Some(100.0),
            nominal_frequency: Some(10.0),
            power_ramp_limitation: Some(10.0),
            present_active_power: Some(100.0),
            nominal_voltage: Some(230.0),
            max_charge_current: Some(32.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_ac_params_encode_evse_values() {
        let AcCpdResParamsKind::Ac(params) = ac_cpd_res_params(&evse(), false).unwrap() else {
            panic!("expected plain AC parameters");
        };
        assert_eq!(params.evse_max_charge_power, RationalQuantity::new(30000, 0));
        assert_eq!(params.evse_min_charge_power, RationalQuantity::new(10000, -2));
        assert_eq!(params.evse_nominal_frequency, RationalQuantity::new(10000, -3));
        assert_eq!(
            params.evse_present_active_power,
            Some(RationalQuantity::new(10000, -2))
        );
        assert_eq!(params.evse_max_charge_power_l2, None);
    }

    #[test]
    fn test_bpt_params_add_discharge() {
        let AcCpdResParamsKind::Bpt(params) = ac_cpd_res_params(&evse(), true).unwrap() else {
            panic!("expected BPT parameters");
        };
        assert_eq!(params.evse_max_discharge_power, RationalQuantity::new(30000, 0));
        assert_eq!(params.base.evse_max_charge_power, RationalQuantity::new(30000, 0));
    }

    #[test]
    fn test_missing_value_is_reported() {
        let mut evse = evse();
        evse.nominal_frequency = None;
        assert_eq!(
            ac_cpd_res_params(&evse, false).unwrap_err(),
            NegotiationError::MissingEvseValue("nominal_frequency")
        );
        assert!(matches!(
            dc_cpd_res_params(&EvseDataContext::default(), false),
            Err(NegotiationError::MissingEvseValue("max_charge_power"))
        ));
    }

    #[test]
    fn test_v2_ac_parameter() {
        let param = v2_evse_charge_parameter(
            &evse(),
            EnergyTransferMode::AcThreePhaseCore,
            AcEvseStatus::default(),
            DcEvseStatus::default(),
        )
        .unwrap();
        let EvseChargeParameter::Ac(ac) = param else {
            panic!("expected AC parameter");
        };
        assert_eq!(ac.evse_nominal_voltage.decode(), 230.0);
        assert_eq!(ac.evse_max_current.decode(), 32.0);
    }

    #[test]
    fn test_v2_dc_parameter_caps_limits() {
        let evse = EvseDataContext {
            max_charge_power: Some(350_000.0),
            max_charge_current: Some(500.0),
            min_charge_current: Some(0.0),
            max_voltage: Some(920.0),
            min_voltage: Some(150.0),
            peak_current_ripple: Some(5.0),
            ..Default::default()
        };
        let param = v2_evse_charge_parameter(
            &evse,
            EnergyTransferMode::DcExtended,
            AcEvseStatus::default(),
            DcEvseStatus::default(),
        )
        .unwrap();
        let EvseChargeParameter::Dc(dc) = param else {
            panic!("expected DC parameter");
        };
        assert_eq!(dc.evse_maximum_power_limit.decode(), 200_000.0);
        assert_eq!(dc.evse_maximum_current_limit.decode(), 400.0);
        assert_eq!(dc.evse_current_regulation_tolerance, None);
    }
}
