//! Policy inputs: pure functions of simulated time and current state.
//!
//! Testing allocation policies live next to the testing model in
//! [`crate::model::testing`].

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::state::StateTensor;

/// A simulated instant: fractional days since `start_date`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimTime {
    pub start_date: NaiveDate,
    pub day: f64,
}

impl SimTime {
    pub fn new(start_date: NaiveDate, day: f64) -> Self {
        Self { start_date, day }
    }

    /// Calendar date the instant falls on.
    pub fn date(&self) -> NaiveDate {
        let whole = self.day.max(0.0).floor() as u64;
        self.start_date
            .checked_add_days(Days::new(whole))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Whether `start` is set and has been reached.
    pub fn reached(&self, start: Option<NaiveDate>) -> bool {
        start.is_some_and(|s| self.date() >= s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineDecision {
    /// Unrestricted people mix through the distancing contact matrix.
    pub distancing: bool,
    /// Virus-positive tested people are moved into case isolation.
    pub case_isolation: bool,
}

pub trait QuarantinePolicy: Send + Sync {
    fn decide(&self, time: &SimTime, state: &StateTensor) -> QuarantineDecision;
}

/// Quarantine measures that start on fixed calendar dates and never lift.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduledQuarantine {
    pub social_distancing_start: Option<NaiveDate>,
    pub case_isolation_start: Option<NaiveDate>,
}

impl QuarantinePolicy for ScheduledQuarantine {
    fn decide(&self, time: &SimTime, _state: &StateTensor) -> QuarantineDecision {
        QuarantineDecision {
            distancing: time.reached(self.social_distancing_start),
            case_isolation: time.reached(self.case_isolation_start),
        }
    }
}

/// Social distancing while hospital occupancy (patients only, not staff) is
/// above `threshold`, on top of a schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct HospitalOccupancyTrigger {
    pub threshold: f64,
    pub schedule: ScheduledQuarantine,
}

impl QuarantinePolicy for HospitalOccupancyTrigger {
    fn decide(&self, time: &SimTime, state: &StateTensor) -> QuarantineDecision {
        let mut decision = self.schedule.decide(time, state);
        if state.hospitalised_total() > self.threshold {
            decision.distancing = true;
        }
        decision
    }
}
