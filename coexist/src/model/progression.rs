use serde::{Deserialize, Serialize};

use crate::dims::{Axis, Cell, Dims, SUSCEPTIBLE};
use crate::error::{check_len, check_rates, ConfigError, EngineError};
use crate::math::linalg::outer;
use crate::model::{RateModel, StepContext};
use crate::rates::RateTensor;

/// Baseline per-stage rates (per day). Stage vectors run over the infected
/// stages; age adjustments are applied on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgressionParams {
    /// Stage s -> s+1. The last stage has nowhere to go and must be 0.
    pub forward_by_stage: Vec<f64>,
    /// Stage s -> first recovered stage.
    pub recovery_by_stage: Vec<f64>,
    /// Stage s -> Dead.
    pub death_by_stage: Vec<f64>,
    /// Recovered stage j -> j+1 (IgM to IgG), one entry per gap.
    pub antibody_maturation: Vec<f64>,
}

impl Default for ProgressionParams {
    // Exposed, asymptomatic, early and late symptomatic; IgM, IgG.
    fn default() -> Self {
        Self {
            forward_by_stage: vec![1.0 / 3.0, 0.07, 1.0 / 5.76, 0.0],
            recovery_by_stage: vec![0.0, 0.43, 0.05, 1.0 / 14.51],
            death_by_stage: vec![0.0, 0.0, 0.0, 0.006],
            antibody_maturation: vec![1.0 / 15.0],
        }
    }
}

impl ProgressionParams {
    /// Everything zero: nobody progresses.
    pub fn zeros(dims: &Dims) -> Self {
        Self {
            forward_by_stage: vec![0.0; dims.n_infected],
            recovery_by_stage: vec![0.0; dims.n_infected],
            death_by_stage: vec![0.0; dims.n_infected],
            antibody_maturation: vec![0.0; dims.n_recovered.saturating_sub(1)],
        }
    }

    pub fn check(&self, dims: &Dims) -> Result<(), ConfigError> {
        let n = dims.n_infected;
        check_len("progression.forward_by_stage", Axis::Health, n, &self.forward_by_stage)?;
        check_len("progression.recovery_by_stage", Axis::Health, n, &self.recovery_by_stage)?;
        check_len("progression.death_by_stage", Axis::Health, n, &self.death_by_stage)?;
        check_len(
            "progression.antibody_maturation",
            Axis::Health,
            dims.n_recovered.saturating_sub(1),
            &self.antibody_maturation,
        )?;
        check_rates("progression.forward_by_stage", &self.forward_by_stage)?;
        check_rates("progression.recovery_by_stage", &self.recovery_by_stage)?;
        check_rates("progression.death_by_stage", &self.death_by_stage)?;
        check_rates("progression.antibody_maturation", &self.antibody_maturation)?;
        if self.forward_by_stage.last().is_some_and(|f| *f != 0.0) {
            return Err(ConfigError::invalid(
                "progression.forward_by_stage",
                "the last infected stage cannot progress forward",
            ));
        }
        Ok(())
    }
}

/// Age factor `max(0, 1 + relative_risk)`.
pub fn age_factor(relative: &[f64]) -> Vec<f64> {
    relative.iter().map(|r| (1.0 + r).max(0.0)).collect()
}

/// Within-host disease course. State independent: the edges are built once.
#[derive(Debug, Clone)]
pub struct ProgressionModel {
    dims: Dims,
    forward: Vec<f64>,
    recovery: Vec<Vec<f64>>,
    death: Vec<Vec<f64>>,
    maturation: Vec<f64>,
    edges: Vec<(Cell, Cell, f64)>,
}

impl ProgressionModel {
    pub fn new(
        dims: Dims,
        params: &ProgressionParams,
        relative_death_risk: &[f64],
        relative_recovery_speed: &[f64],
    ) -> Result<Self, ConfigError> {
        params.check(&dims)?;
        check_len("relative_death_risk", Axis::Age, dims.n_age, relative_death_risk)?;
        check_len(
            "relative_recovery_speed",
            Axis::Age,
            dims.n_age,
            relative_recovery_speed,
        )?;

        let mut model = Self {
            dims,
            forward: params.forward_by_stage.clone(),
            recovery: outer(&age_factor(relative_recovery_speed), &params.recovery_by_stage),
            death: outer(&age_factor(relative_death_risk), &params.death_by_stage),
            maturation: params.antibody_maturation.clone(),
            edges: Vec::new(),
        };
        model.edges = model.build_edges();
        Ok(model)
    }

    fn build_edges(&self) -> Vec<(Cell, Cell, f64)> {
        let d = &self.dims;
        let mut edges = Vec::new();
        for a in 0..d.n_age {
            for (k, t) in d.iso_test_pairs() {
                let base = Cell::new(a, SUSCEPTIBLE, k, t);
                for s in 0..d.n_infected {
                    let from = base.with_health(d.infected(s));
                    if s + 1 < d.n_infected {
                        edges.push((from, base.with_health(d.infected(s + 1)), self.forward[s]));
                    }
                    edges.push((from, base.with_health(d.recovered(0)), self.recovery[a][s]));
                    edges.push((from, base.with_health(d.dead()), self.death[a][s]));
                }
                for (j, rate) in self.maturation.iter().enumerate() {
                    edges.push((
                        base.with_health(d.recovered(j)),
                        base.with_health(d.recovered(j + 1)),
                        *rate,
                    ));
                }
            }
        }
        edges.retain(|(_, _, r)| *r > 0.0);
        edges
    }

    /// Total exit rate out of infected `stage` for `age`.
    pub fn exit_rate(&self, age: usize, stage: usize) -> f64 {
        self.forward[stage] + self.recovery[age][stage] + self.death[age][stage]
    }

    /// Probability that an infection in `age` ever reaches each infected stage.
    pub fn reach_probabilities(&self, age: usize) -> Vec<f64> {
        let n = self.dims.n_infected;
        let mut p = vec![0.0; n];
        p[0] = 1.0;
        for s in 1..n {
            let exit = self.exit_rate(age, s - 1);
            p[s] = if exit > 0.0 {
                p[s - 1] * self.forward[s - 1] / exit
            } else {
                0.0
            };
        }
        p
    }

    /// Mean sojourn time in each infected stage for `age`; infinite for a
    /// stage nobody leaves.
    pub fn mean_stage_durations(&self, age: usize) -> Vec<f64> {
        (0..self.dims.n_infected)
            .map(|s| {
                let exit = self.exit_rate(age, s);
                if exit > 0.0 {
                    1.0 / exit
                } else {
                    f64::INFINITY
                }
            })
            .collect()
    }
}

impl RateModel for ProgressionModel {
    fn name(&self) -> &'static str {
        "progression"
    }

    fn axis(&self) -> Axis {
        Axis::Health
    }

    fn contribute(&self, _ctx: &StepContext<'_>, out: &mut RateTensor) -> Result<(), EngineError> {
        for (from, to, rate) in &self.edges {
            out.add(*from, *to, *rate)?;
        }
        Ok(())
    }
}
