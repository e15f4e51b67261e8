//! Forward integration of occupancy and new arrivals.
//!
//! All sub-models act simultaneously: their rates are summed into one
//! generator, re-composed at every RK4 stage from the stage's state, and
//! integrated on the augmented vector `[occupancy; arrivals]`.

use serde::{Deserialize, Serialize};

use crate::config::ModelParams;
use crate::dims::Dims;
use crate::error::{check_rates, ConfigError, EngineError};
use crate::math::ode::{try_rk4_step_ws, Rk4Workspace};
use crate::model::StepContext;
use crate::policy::SimTime;
use crate::rates::RateTensor;
use crate::scenario::Scenario;
use crate::state::StateTensor;
use crate::trajectory::{ArrivalsMode, Checkpoint, DailyRecord, Trajectory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegratorParams {
    /// Largest `rate * dt` allowed for the fastest-draining cell.
    pub max_step_hazard: f64,
    pub min_substeps: u32,
    pub max_substeps: u32,
    /// How many times a sub-step that went negative may be split in half.
    pub max_halvings: u32,
    /// Negatives down to `-negative_tolerance * population` are round-off
    /// and get clamped to 0.
    pub negative_tolerance: f64,
    /// Largest relative population drift accepted at the end of a day.
    pub conservation_tolerance: f64,
}

impl Default for IntegratorParams {
    fn default() -> Self {
        Self {
            max_step_hazard: 0.5,
            min_substeps: 1,
            max_substeps: 4096,
            max_halvings: 6,
            negative_tolerance: 1e-9,
            conservation_tolerance: 1e-6,
        }
    }
}

impl IntegratorParams {
    pub fn check(&self) -> Result<(), ConfigError> {
        if !(self.max_step_hazard.is_finite() && self.max_step_hazard > 0.0) {
            return Err(ConfigError::invalid(
                "integrator.max_step_hazard",
                format!("must be finite and > 0, got {}", self.max_step_hazard),
            ));
        }
        if self.min_substeps == 0 || self.min_substeps > self.max_substeps {
            return Err(ConfigError::invalid(
                "integrator.min_substeps",
                format!(
                    "need 1 <= min_substeps ({}) <= max_substeps ({})",
                    self.min_substeps, self.max_substeps
                ),
            ));
        }
        check_rates("integrator.negative_tolerance", &[self.negative_tolerance])?;
        check_rates(
            "integrator.conservation_tolerance",
            &[self.conservation_tolerance],
        )
    }

    /// Sub-steps for a day whose fastest cell drains at `max_exit_rate`.
    pub fn substeps_for(&self, max_exit_rate: f64) -> u32 {
        let wanted = (max_exit_rate / self.max_step_hazard).ceil();
        if wanted.is_finite() && wanted > 0.0 {
            (wanted.min(f64::from(self.max_substeps)) as u32)
                .clamp(self.min_substeps, self.max_substeps)
        } else {
            self.min_substeps
        }
    }
}

/// Buffers reused across every derivative evaluation of a run.
struct Workspace {
    dims: Dims,
    rk4: Rk4Workspace,
    rates: RateTensor,
    scratch: StateTensor,
}

impl Workspace {
    fn new(dims: Dims) -> Self {
        Self {
            dims,
            rk4: Rk4Workspace::new(2 * dims.n_cells()),
            rates: RateTensor::new(dims),
            scratch: StateTensor::new_zero(dims),
        }
    }
}

/// Recompose the rates for occupancy `y[..n]` at day `t` and write the
/// derivative of `[occupancy; arrivals]` into `dy`.
fn derivative(
    scenario: &Scenario,
    scratch: &mut StateTensor,
    rates: &mut RateTensor,
    t: f64,
    y: &[f64],
    dy: &mut [f64],
) -> Result<(), EngineError> {
    let n = scratch.as_slice().len();
    compose_at(scenario, scratch, rates, t, &y[..n])?;
    let (d_occupancy, d_arrivals) = dy.split_at_mut(n);
    rates.apply(&y[..n], d_occupancy, d_arrivals);
    Ok(())
}

fn compose_at(
    scenario: &Scenario,
    scratch: &mut StateTensor,
    rates: &mut RateTensor,
    t: f64,
    occupancy: &[f64],
) -> Result<(), EngineError> {
    scratch.as_mut_slice().copy_from_slice(occupancy);
    let state: &StateTensor = scratch;
    let time = SimTime::new(scenario.params.start_date, t);
    let ctx = StepContext {
        time,
        state,
        quarantine: scenario.quarantine.decide(&time, state),
        testing_policy: scenario.testing_policy.as_ref(),
        capacity: scenario.capacity.as_ref(),
    };
    scenario.composer.compose(&ctx, rates)
}

pub struct Simulation {
    scenario: Scenario,
}

impl Simulation {
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    fn params(&self) -> &ModelParams {
        &self.scenario.params
    }

    /// Run from the scenario's initial state for `total_days` days.
    pub fn run(&self) -> Result<Trajectory, EngineError> {
        let dims = self.scenario.dims();
        let start = Checkpoint {
            day: 0,
            start_date: self.params().start_date,
            state: self.scenario.initial.clone(),
            arrivals: StateTensor::new_zero(dims),
        };
        self.run_from(&start, self.params().total_days)
    }

    /// Continue from `checkpoint` up to the end of `until_day`. The first
    /// record is the checkpoint itself.
    pub fn run_from(&self, checkpoint: &Checkpoint, until_day: u32) -> Result<Trajectory, EngineError> {
        let dims = self.scenario.dims();
        if checkpoint.state.dims() != dims || checkpoint.arrivals.dims() != dims {
            return Err(ConfigError::invalid(
                "checkpoint",
                "dimensions do not match the scenario",
            )
            .into());
        }
        if checkpoint.start_date != self.params().start_date {
            return Err(ConfigError::invalid(
                "checkpoint",
                format!(
                    "start date {} differs from the scenario's {}",
                    checkpoint.start_date,
                    self.params().start_date
                ),
            )
            .into());
        }
        checkpoint.state.check_occupancy("checkpoint state")?;
        checkpoint.arrivals.check_occupancy("checkpoint arrivals")?;

        let integrator = &self.params().integrator;
        let arrivals_mode = self.params().arrivals_mode;
        let n = dims.n_cells();
        let population = checkpoint.state.total();
        let tolerance = integrator.negative_tolerance * population.max(1.0);

        let mut y = Vec::with_capacity(2 * n);
        y.extend_from_slice(checkpoint.state.as_slice());
        y.extend_from_slice(checkpoint.arrivals.as_slice());

        let mut records = vec![DailyRecord {
            day: checkpoint.day,
            date: checkpoint.date(),
            state: checkpoint.state.clone(),
            arrivals: checkpoint.arrivals.clone(),
            tests: Vec::new(),
            substeps: 0,
        }];

        let _span = tracing::info_span!("run", from_day = checkpoint.day).entered();
        tracing::info!(
            from_day = checkpoint.day,
            until_day,
            population,
            cells = n,
            "simulation started"
        );

        let mut ws = Workspace::new(dims);
        for day in checkpoint.day..until_day {
            if arrivals_mode == ArrivalsMode::Daily {
                y[n..].fill(0.0);
            }
            let t0 = f64::from(day);
            compose_at(&self.scenario, &mut ws.scratch, &mut ws.rates, t0, &y[..n])?;
            let tests = ws.rates.test_usage().to_vec();
            let substeps = integrator.substeps_for(ws.rates.max_exit_rate());

            let dt = 1.0 / f64::from(substeps);
            for i in 0..substeps {
                self.substep(&mut ws, &mut y, t0 + f64::from(i) * dt, dt, 0, tolerance)?;
            }

            let end = f64::from(day + 1);
            let state = StateTensor::from_flat(dims, y[..n].to_vec())?;
            state.check_non_negative(end, tolerance)?;
            let total = state.total();
            if (total - population).abs() > integrator.conservation_tolerance * population.max(1.0)
            {
                return Err(EngineError::ConservationViolated {
                    expected: population,
                    actual: total,
                    day: day + 1,
                });
            }

            let record = DailyRecord {
                day: day + 1,
                date: SimTime::new(self.params().start_date, end).date(),
                arrivals: StateTensor::from_flat(dims, y[n..].to_vec())?,
                tests,
                substeps,
                state,
            };
            tracing::debug!(
                day = record.day,
                population = total,
                infected = record.state.infected_total(),
                hospitalised = record.state.hospitalised_total(),
                dead = record.state.health_total(dims.dead()),
                substeps,
                "day done"
            );
            records.push(record);
        }

        if let Some(last) = records.last() {
            tracing::info!(
                day = last.day,
                infected = last.state.infected_total(),
                dead = last.state.health_total(dims.dead()),
                "simulation finished"
            );
        }
        Ok(Trajectory {
            start_date: checkpoint.start_date,
            arrivals_mode,
            records,
        })
    }

    /// Advance `y` by `dt` from `t`. A step that drives any occupancy below
    /// `-tolerance` is discarded and redone as two half steps.
    fn substep(
        &self,
        ws: &mut Workspace,
        y: &mut [f64],
        t: f64,
        dt: f64,
        halvings: u32,
        tolerance: f64,
    ) -> Result<(), EngineError> {
        let dims = ws.dims;
        let n = dims.n_cells();
        let mut trial = y.to_vec();
        {
            let Workspace {
                rk4, rates, scratch, ..
            } = ws;
            try_rk4_step_ws(&mut trial, t, dt, rk4, |tt, yy, dy| {
                derivative(&self.scenario, scratch, rates, tt, yy, dy)
            })?;
        }

        if let Some(i) = trial.iter().position(|v| !v.is_finite()) {
            return Err(EngineError::NonFinite {
                quantity: if i < n { "occupancy" } else { "new arrivals" },
                value: trial[i],
                cell: dims.cell(i % n),
                day: t + dt,
            });
        }

        if let Some(i) = trial[..n].iter().position(|v| *v < -tolerance) {
            let max_halvings = self.params().integrator.max_halvings;
            if halvings >= max_halvings {
                return Err(EngineError::StepFailed {
                    day: t,
                    halvings,
                    cell: dims.cell(i),
                    value: trial[i],
                });
            }
            tracing::trace!(day = t, dt, halvings = halvings + 1, cell = %dims.cell(i), "halving sub-step");
            let half = 0.5 * dt;
            self.substep(ws, y, t, half, halvings + 1, tolerance)?;
            return self.substep(ws, y, t + half, half, halvings + 1, tolerance);
        }

        let mut clamped = 0;
        for v in trial[..n].iter_mut() {
            if *v < 0.0 {
                *v = 0.0;
                clamped += 1;
            }
        }
        if clamped > 0 {
            tracing::debug!(day = t + dt, clamped, "clamped round-off negatives");
        }
        y.copy_from_slice(&trial);
        Ok(())
    }
}
