use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::rates::TestUsage;
use crate::state::StateTensor;

/// How the new-arrivals tensor accumulates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalsMode {
    /// Reset at the start of every day: each record holds that day's inflows.
    #[default]
    Daily,
    /// Never reset: each record holds inflows since day 0.
    Cumulative,
}

/// State at the end of one whole day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub day: u32,
    pub date: NaiveDate,
    pub state: StateTensor,
    pub arrivals: StateTensor,
    /// Test usage evaluated at the start of the day that led here; empty for
    /// day 0.
    pub tests: Vec<TestUsage>,
    pub substeps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub start_date: NaiveDate,
    pub arrivals_mode: ArrivalsMode,
    pub records: Vec<DailyRecord>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, day: u32) -> Option<&DailyRecord> {
        self.records.iter().find(|r| r.day == day)
    }

    pub fn final_state(&self) -> Option<&StateTensor> {
        self.records.last().map(|r| &r.state)
    }

    /// Restart point at the end of `day`.
    pub fn checkpoint(&self, day: u32) -> Option<Checkpoint> {
        self.record(day).map(|r| Checkpoint {
            day: r.day,
            start_date: self.start_date,
            state: r.state.clone(),
            arrivals: r.arrivals.clone(),
        })
    }
}

/// Everything needed to continue a run from the end of `day`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub day: u32,
    pub start_date: NaiveDate,
    pub state: StateTensor,
    pub arrivals: StateTensor,
}

impl Checkpoint {
    pub fn date(&self) -> NaiveDate {
        self.start_date
            .checked_add_days(Days::new(u64::from(self.day)))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let cp: Checkpoint = serde_json::from_str(s)?;
        anyhow::ensure!(
            cp.state.dims() == cp.arrivals.dims(),
            "checkpoint state and arrivals have different dimensions"
        );
        for t in [&cp.state, &cp.arrivals] {
            t.dims().check()?;
            anyhow::ensure!(
                t.as_slice().len() == t.dims().n_cells(),
                "checkpoint tensor has {} cells, dimensions need {}",
                t.as_slice().len(),
                t.dims().n_cells()
            );
        }
        Ok(cp)
    }
}
