//! Schedules: -2 SAScheduleList and charging profile, -20 schedule exchange.

use super::{NegotiationError, orq, require, rq};
use crate::context::{EvDataContext, EvseDataContext};
use crate::protocol::constants::{
    DEFAULT_SA_SCHEDULE_TUPLE_ID, MAX_POWER_SCHEDULE_ENTRIES, MIN_SCHEDULE_COVERAGE_SECS,
    V2_MAX_INTERVAL_DURATION,
    V2_MAX_INTERVAL_START, V2_MAX_POWER_LIMIT_W,
};
use crate::protocol::header::now_timestamp;
use crate::protocol::v2::{
    ChargingProfile, PMaxScheduleEntry, PhysicalValue, ProfileEntryDetails, SaScheduleTuple,
    UnitSymbol,
};
use crate::protocol::v20::{
    ChargingSchedule, DynamicScheduleExchangeResParams, PowerSchedule, PowerScheduleEntry,
    ScheduleTuple, ScheduledScheduleExchangeResParams,
};
use crate::protocol::validation::{BoundedList, Percent, Validate, ValidationError};
use crate::rational::RationalQuantity;

/// Seconds the offered schedule has to cover.
pub fn required_coverage(departure_time: Option<u32>) -> u32 {
    departure_time.unwrap_or(MIN_SCHEDULE_COVERAGE_SECS)
}

/// Default -2 offer: one tuple at the EVSE's maximum power, starting at 0
/// and lasting exactly the departure time (or a full day without one).
///
/// Coverage longer than one interval is split into day-long entries; only
/// the last one carries a duration.
pub fn offer_sa_schedules(
    evse: &EvseDataContext,
    departure_time: Option<u32>,
) -> Result<Vec<SaScheduleTuple>, NegotiationError> {
    let p_max = PhysicalValue::watts(
        require("max_charge_power", evse.max_charge_power)?.min(V2_MAX_POWER_LIMIT_W),
    )?;
    let mut remaining = required_coverage(departure_time);
    let mut start = 0;
    let mut entries = Vec::new();
    while remaining > V2_MAX_INTERVAL_DURATION {
        entries.push(PMaxScheduleEntry {
            start,
            duration: None,
            p_max,
        });
        start += V2_MAX_INTERVAL_DURATION;
        remaining -= V2_MAX_INTERVAL_DURATION;
        if start > V2_MAX_INTERVAL_START {
            return Err(NegotiationError::TooMany("p_max_schedule"));
        }
    }
    entries.push(PMaxScheduleEntry {
        start,
        duration: Some(remaining),
        p_max,
    });
    let p_max_schedule =
        BoundedList::new(entries).map_err(|_| NegotiationError::TooMany("p_max_schedule"))?;
    Ok(vec![SaScheduleTuple {
        sa_schedule_tuple_id: DEFAULT_SA_SCHEDULE_TUPLE_ID,
        p_max_schedule,
    }])
}

/// Every tuple must start at offset 0 and cover the departure time exactly,
/// or at least a day when none was given.
pub fn check_schedule_coverage(
    tuples: &[SaScheduleTuple],
    departure_time: Option<u32>,
) -> Result<(), NegotiationError> {
    let required = required_coverage(departure_time);
    for tuple in tuples {
        let covered = tuple.covered_duration();
        let starts_at_zero = tuple.p_max_schedule.first().is_some_and(|e| e.start == 0);
        let ok = match departure_time {
            Some(_) => covered == required,
            None => covered >= required,
        };
        if !ok || !starts_at_zero {
            return Err(NegotiationError::ScheduleCoverage { covered, required });
        }
    }
    Ok(())
}

/// Translate an offered PMaxSchedule into the EV's charging profile.
///
/// When the last entry carries a duration, a zero-power entry is added at
/// its end so the profile states where the schedule stops.
pub fn charging_profile(tuple: &SaScheduleTuple) -> Result<ChargingProfile, ValidationError> {
    tuple.validate()?;
    let mut entries: Vec<ProfileEntryDetails> = tuple
        .p_max_schedule
        .iter()
        .map(|entry| ProfileEntryDetails {
            start: entry.start,
            max_power: entry.p_max,
            max_phases_in_use: None,
        })
        .collect();
    if let Some(last) = tuple.p_max_schedule.last()
        && let Some(duration) = last.duration
    {
        let start = last
            .start
            .checked_add(duration)
            .ok_or_else(|| ValidationError::new("p_max_schedule", "schedule end overflows"))?;
        entries.push(ProfileEntryDetails {
            start,
            max_power: PhysicalValue {
                value: RationalQuantity::ZERO,
                unit: UnitSymbol::Watts,
            },
            max_phases_in_use: None,
        });
    }
    Ok(ChargingProfile {
        entries: BoundedList::new(entries)?,
    })
}

/// `[start, end)` of each entry; an entry runs until the next one starts.
fn spans(starts: &[u32], last_end: Option<u64>) -> Vec<(u64, u64)> {
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = match starts.get(i + 1) {
                Some(&next) => u64::from(next),
                None => last_end.unwrap_or(u64::MAX),
            };
            (u64::from(start), end)
        })
        .collect()
}

/// Whether every profile entry stays within the PMax of each schedule
/// interval it overlaps. Nothing above zero may be drawn outside the
/// schedule.
pub fn profile_within_schedule(profile: &ChargingProfile, tuple: &SaScheduleTuple) -> bool {
    let schedule_starts: Vec<u32> = tuple.p_max_schedule.iter().map(|e| e.start).collect();
    let schedule_end = tuple
        .p_max_schedule
        .last()
        .and_then(|e| e.duration.map(|d| u64::from(e.start) + u64::from(d)));
    let intervals = spans(&schedule_starts, schedule_end);
    let (Some(&(schedule_start, _)), Some(&(_, schedule_stop))) =
        (intervals.first(), intervals.last())
    else {
        return false;
    };

    let profile_starts: Vec<u32> = profile.entries.iter().map(|e| e.start).collect();
    let requested = spans(&profile_starts, None);
    profile
        .entries
        .iter()
        .zip(requested)
        .all(|(entry, (from, to))| {
            let power = entry.max_power.decode();
            let outside = from < schedule_start || to > schedule_stop;
            if outside && power > 0.0 {
                return false;
            }
            tuple
                .p_max_schedule
                .iter()
                .zip(&intervals)
                .filter(|(_, span)| span.0 < to && from < span.1)
                .all(|(interval, _)| power <= interval.p_max.decode())
        })
}

/// One entry per day of `duration`, at most `max_points` entries; the last
/// entry absorbs whatever does not fit.
fn power_schedule(
    duration: u32,
    max_points: u16,
    power: RationalQuantity,
    power_l2: Option<RationalQuantity>,
    power_l3: Option<RationalQuantity>,
) -> Result<PowerSchedule, NegotiationError> {
    let max_points = u32::from(max_points).min(MAX_POWER_SCHEDULE_ENTRIES as u32);
    if max_points == 0 {
        return Err(NegotiationError::TooMany("power_schedule"));
    }
    let points = duration.div_ceil(MIN_SCHEDULE_COVERAGE_SECS).clamp(1, max_points);
    let entry = |duration| PowerScheduleEntry {
        duration,
        power,
        power_l2,
        power_l3,
    };
    let mut entries: Vec<PowerScheduleEntry> = (1..points)
        .map(|_| entry(MIN_SCHEDULE_COVERAGE_SECS))
        .collect();
    entries.push(entry(duration - (points - 1) * MIN_SCHEDULE_COVERAGE_SECS));
    let entries =
        BoundedList::new(entries).map_err(|_| NegotiationError::TooMany("power_schedule"))?;
    Ok(PowerSchedule {
        time_anchor: now_timestamp(),
        available_energy: None,
        power_tolerance: None,
        entries,
    })
}

fn negate(value: Option<f64>) -> Option<f64> {
    value.map(|v| -v)
}

/// -20 Scheduled mode: one tuple at the EVSE's maximum power covering the
/// EV's departure time. BPT services also get a discharging schedule, with
/// discharge power expressed as negative values. Each power schedule has at
/// most `max_points` entries.
pub fn scheduled_se_res_params(
    evse: &EvseDataContext,
    ev: &EvDataContext,
    bpt: bool,
    max_points: u16,
) -> Result<ScheduledScheduleExchangeResParams, NegotiationError> {
    let duration = required_coverage(ev.departure_time);
    let charging = power_schedule(
        duration,
        max_points,
        rq("max_charge_power", evse.max_charge_power)?,
        orq(evse.max_charge_power_l2)?,
        orq(evse.max_charge_power_l3)?,
    )?;
    let discharging = if bpt {
        Some(ChargingSchedule {
            power_schedule: power_schedule(
                duration,
                max_points,
                rq("max_discharge_power", negate(evse.max_discharge_power))?,
                orq(negate(evse.max_discharge_power_l2))?,
                orq(negate(evse.max_discharge_power_l3))?,
            )?,
            absolute_price_schedule: None,
        })
    } else {
        None
    };
    let tuple = ScheduleTuple {
        schedule_tuple_id: u32::from(DEFAULT_SA_SCHEDULE_TUPLE_ID),
        charging_schedule: ChargingSchedule {
            power_schedule: charging,
            absolute_price_schedule: None,
        },
        discharging_schedule: discharging,
    };
    Ok(ScheduledScheduleExchangeResParams {
        schedule_tuples: BoundedList::new(vec![tuple])
            .map_err(|_| NegotiationError::TooMany("schedule_tuples"))?,
    })
}

/// -20 Dynamic mode: the EVSE's targets where it has any, otherwise the EV's.
pub fn dynamic_se_res_params(
    evse: &EvseDataContext,
    ev: &EvDataContext,
) -> DynamicScheduleExchangeResParams {
    let percent = |v: Option<u8>| v.and_then(|v| Percent::new(v).ok());
    DynamicScheduleExchangeResParams {
        departure_time: evse.departure_time.or(ev.departure_time),
        min_soc: percent(evse.min_soc.or(ev.min_soc)),
        target_soc: percent(evse.target_soc.or(ev.target_soc)),
    }
}
