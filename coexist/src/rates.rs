//! Sparse per-capita transition rates and the composer that assembles them.

use serde::{Deserialize, Serialize};

use crate::dims::{Axis, Cell, Dims, HealthKind, SUSCEPTIBLE};
use crate::error::EngineError;
use crate::model::{RateModel, StepContext};

/// One directed edge: people per person per day moving `src -> dst`
/// (flat cell indices).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub src: usize,
    pub dst: usize,
    pub rate: f64,
}

/// Test consumption for one test type over one rate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestUsage {
    pub test: usize,
    pub name: String,
    /// Tests per day the policy asked for.
    pub requested: f64,
    /// Tests per day actually administered after rationing.
    pub consumed: f64,
    pub capacity: f64,
}

/// Sparse transition-rate tensor over (source cell, destination cell).
///
/// Every edge is checked against the structural rules as it is inserted, so a
/// tensor that was built without error is always admissible.
#[derive(Debug, Clone)]
pub struct RateTensor {
    dims: Dims,
    entries: Vec<Transition>,
    tests: Vec<TestUsage>,
    model: &'static str,
    axis: Option<Axis>,
    day: f64,
}

impl RateTensor {
    pub fn new(dims: Dims) -> Self {
        Self {
            dims,
            entries: Vec::new(),
            tests: Vec::new(),
            model: "",
            axis: None,
            day: 0.0,
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    /// Drop all entries and usage, keeping the allocations.
    pub fn reset(&mut self, day: f64) {
        self.entries.clear();
        self.tests.clear();
        self.model = "";
        self.axis = None;
        self.day = day;
    }

    /// Attribute subsequent [`RateTensor::add`] calls to `model`, which may
    /// only change `axis`.
    pub fn begin(&mut self, model: &'static str, axis: Axis) {
        self.model = model;
        self.axis = Some(axis);
    }

    pub fn add(&mut self, from: Cell, to: Cell, rate: f64) -> Result<(), EngineError> {
        if !rate.is_finite() {
            return Err(EngineError::NonFinite {
                quantity: "transition rate",
                value: rate,
                cell: from,
                day: self.day,
            });
        }
        if rate < 0.0 {
            return Err(EngineError::NegativeRate {
                model: self.model,
                rate,
                from,
                to,
                day: self.day,
            });
        }
        self.check_edge(from, to)?;
        if rate > 0.0 {
            self.entries.push(Transition {
                src: self.dims.flat(from),
                dst: self.dims.flat(to),
                rate,
            });
        }
        Ok(())
    }

    fn check_edge(&self, from: Cell, to: Cell) -> Result<(), EngineError> {
        let forbid = |reason: &'static str| EngineError::ForbiddenTransition {
            model: self.model,
            from,
            to,
            reason,
        };
        let d = &self.dims;
        for c in [from, to] {
            if c.age >= d.n_age || c.health >= d.n_health() || c.iso >= d.n_iso || c.test >= d.n_test
            {
                return Err(forbid("cell is outside the registry"));
            }
        }
        let changed = from.changed_axes(&to);
        if changed.contains(&Axis::Age) {
            return Err(forbid("age group never changes"));
        }
        if changed.len() != 1 {
            return Err(forbid("exactly one axis must change"));
        }
        if Some(changed[0]) != self.axis {
            return Err(forbid("model changed an axis it does not own"));
        }
        if d.health_kind(from.health) == HealthKind::Dead {
            return Err(forbid("dead is absorbing"));
        }
        if changed[0] == Axis::Health {
            if to.health == SUSCEPTIBLE {
                return Err(forbid("nothing returns to susceptible"));
            }
            if from.health == d.terminal_recovered() {
                return Err(forbid("terminal recovered stage is absorbing in health"));
            }
            if to.health < from.health {
                return Err(forbid("health only moves forward"));
            }
        }
        Ok(())
    }

    pub fn record_test_usage(&mut self, usage: TestUsage) {
        self.tests.push(usage);
    }

    /// Sort edges by (source, destination) and sum duplicates, so the result
    /// does not depend on the order models ran in.
    pub fn finalize(&mut self) {
        self.entries
            .sort_by(|a, b| (a.src, a.dst).cmp(&(b.src, b.dst)));
        let mut merged: Vec<Transition> = Vec::with_capacity(self.entries.len());
        for e in self.entries.drain(..) {
            match merged.last_mut() {
                Some(last) if last.src == e.src && last.dst == e.dst => last.rate += e.rate,
                _ => merged.push(e),
            }
        }
        self.entries = merged;
        self.model = "";
        self.axis = None;
    }

    pub fn entries(&self) -> &[Transition] {
        &self.entries
    }

    pub fn test_usage(&self) -> &[TestUsage] {
        &self.tests
    }

    /// Summed rate `from -> to`; 0 if there is no such edge.
    pub fn rate(&self, from: Cell, to: Cell) -> f64 {
        let (src, dst) = (self.dims.flat(from), self.dims.flat(to));
        self.entries
            .iter()
            .filter(|e| e.src == src && e.dst == dst)
            .map(|e| e.rate)
            .sum()
    }

    /// Total exit rate per source cell.
    pub fn exit_rates(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.dims.n_cells()];
        for e in &self.entries {
            out[e.src] += e.rate;
        }
        out
    }

    pub fn max_exit_rate(&self) -> f64 {
        self.exit_rates().into_iter().fold(0.0, f64::max)
    }

    /// Write the occupancy derivative into `d_occupancy` and the arrivals
    /// derivative into `d_arrivals`. Flow on an edge is
    /// `rate * max(occupancy[src], 0)`; what leaves the source enters the
    /// destination, so `d_occupancy` always sums to zero.
    pub fn apply(&self, occupancy: &[f64], d_occupancy: &mut [f64], d_arrivals: &mut [f64]) {
        d_occupancy.fill(0.0);
        d_arrivals.fill(0.0);
        for e in &self.entries {
            let flow = e.rate * occupancy[e.src].max(0.0);
            d_occupancy[e.src] -= flow;
            d_occupancy[e.dst] += flow;
            d_arrivals[e.dst] += flow;
        }
    }
}

/// Runs every sub-model against the current state and collects their edges
/// into one tensor.
pub struct RateComposer {
    models: Vec<Box<dyn RateModel>>,
}

impl RateComposer {
    pub fn new(models: Vec<Box<dyn RateModel>>) -> Self {
        Self { models }
    }

    pub fn compose(&self, ctx: &StepContext<'_>, out: &mut RateTensor) -> Result<(), EngineError> {
        out.reset(ctx.time.day);
        for m in &self.models {
            out.begin(m.name(), m.axis());
            m.contribute(ctx, out)?;
        }
        out.finalize();
        Ok(())
    }
}
