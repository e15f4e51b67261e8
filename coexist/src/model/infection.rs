use serde::{Deserialize, Serialize};

use crate::dims::{iso, Axis, Cell, Dims, SUSCEPTIBLE};
use crate::error::{check_len, check_rates, ConfigError, EngineError};
use crate::io::ContactMatrix;
use crate::math::linalg::{mat_vec, spectral_radius_power_iteration, weighted_row_sum};
use crate::model::progression::ProgressionModel;
use crate::model::{RateModel, StepContext};
use crate::policy::QuarantineDecision;
use crate::rates::RateTensor;
use crate::state::StateTensor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InfectionParams {
    /// Transmission probability per contact, per infected stage.
    pub transmission_by_stage: Vec<f64>,
    /// Hospital contact rate relative to the population-weighted mean number
    /// of community contacts.
    pub hospital_mixing_ratio: f64,
}

impl Default for InfectionParams {
    fn default() -> Self {
        Self {
            transmission_by_stage: vec![0.001, 0.01, 0.05, 0.04],
            hospital_mixing_ratio: 3.0,
        }
    }
}

impl InfectionParams {
    pub fn zeros(dims: &Dims) -> Self {
        Self {
            transmission_by_stage: vec![0.0; dims.n_infected],
            hospital_mixing_ratio: 0.0,
        }
    }

    pub fn check(&self, dims: &Dims) -> Result<(), ConfigError> {
        check_len(
            "infection.transmission_by_stage",
            Axis::Health,
            dims.n_infected,
            &self.transmission_by_stage,
        )?;
        check_rates("infection.transmission_by_stage", &self.transmission_by_stage)?;
        check_rates("infection.hospital_mixing_ratio", &[self.hospital_mixing_ratio])
    }
}

/// The three community contact regimes.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactRegimes {
    pub baseline: ContactMatrix,
    pub distancing: ContactMatrix,
    /// Contacts of people in case isolation; all zero when unknown.
    pub isolation: ContactMatrix,
}

/// Within-hospital contact rate: `ratio` times the mean row sum of the
/// baseline matrix weighted by population share.
pub fn hospital_mixing_rate(ratio: f64, population_share: &[f64], baseline: &ContactMatrix) -> f64 {
    ratio * weighted_row_sum(population_share, baseline.rows())
}

/// Force of infection on susceptibles, S -> Exposed.
#[derive(Debug, Clone)]
pub struct InfectionModel {
    dims: Dims,
    transmission: Vec<f64>,
    contacts: ContactRegimes,
    hospital_mixing: f64,
}

impl InfectionModel {
    pub fn new(
        dims: Dims,
        params: &InfectionParams,
        contacts: ContactRegimes,
        population_share: &[f64],
    ) -> Result<Self, ConfigError> {
        params.check(&dims)?;
        for (name, m) in [
            ("contact_baseline", &contacts.baseline),
            ("contact_distancing", &contacts.distancing),
            ("contact_isolation", &contacts.isolation),
        ] {
            if m.n() != dims.n_age {
                return Err(ConfigError::AxisMismatch {
                    what: name.to_string(),
                    axis: Axis::Age,
                    expected: dims.n_age,
                    actual: m.n(),
                });
            }
        }
        check_len("population share", Axis::Age, dims.n_age, population_share)?;
        let hospital_mixing =
            hospital_mixing_rate(params.hospital_mixing_ratio, population_share, &contacts.baseline);
        Ok(Self {
            dims,
            transmission: params.transmission_by_stage.clone(),
            contacts,
            hospital_mixing,
        })
    }

    pub fn hospital_mixing(&self) -> f64 {
        self.hospital_mixing
    }

    pub fn contacts(&self) -> &ContactRegimes {
        &self.contacts
    }

    /// Transmission-weighted infectious occupancy in `roles`, summed over the
    /// testing axis, per age group.
    fn infectious_by_age(&self, state: &StateTensor, roles: &[usize]) -> Vec<f64> {
        let d = &self.dims;
        let mut out = vec![0.0; d.n_age];
        for (a, slot) in out.iter_mut().enumerate() {
            for (s, beta) in self.transmission.iter().enumerate() {
                if *beta == 0.0 {
                    continue;
                }
                let mut n = 0.0;
                for &k in roles.iter().filter(|k| **k < d.n_iso) {
                    for t in 0..d.n_test {
                        n += state.get(Cell::new(a, d.infected(s), k, t)).max(0.0);
                    }
                }
                *slot += beta * n;
            }
        }
        out
    }

    /// Per age group: transmission-weighted infectious people circulating in
    /// the community (unrestricted and staff) over the living population.
    pub fn community_pressure(&self, state: &StateTensor) -> Vec<f64> {
        let living = state.living_by_age();
        self.infectious_by_age(state, &[iso::UNRESTRICTED, iso::STAFF])
            .into_iter()
            .zip(living)
            .map(|(inf, n)| if n > 0.0 { inf / n } else { 0.0 })
            .collect()
    }

    /// Force of infection inside the hospital pool (patients and staff).
    pub fn hospital_pressure(&self, state: &StateTensor) -> f64 {
        let d = &self.dims;
        if !d.has_hospital() || self.hospital_mixing == 0.0 {
            return 0.0;
        }
        let roles = [iso::HOSPITALISED, iso::STAFF];
        let infectious: f64 = self.infectious_by_age(state, &roles).iter().sum();
        let dead = d.dead();
        let living: f64 = d
            .cells()
            .filter(|c| c.health != dead && roles.contains(&c.iso))
            .map(|c| state.get(c).max(0.0))
            .sum();
        if living > 0.0 {
            self.hospital_mixing * infectious / living
        } else {
            0.0
        }
    }

    /// Per-capita infection rate for susceptibles of each age, indexed
    /// `[iso][age]`.
    pub fn force_of_infection(
        &self,
        state: &StateTensor,
        decision: QuarantineDecision,
    ) -> Vec<Vec<f64>> {
        let pressure = self.community_pressure(state);
        let baseline = mat_vec(self.contacts.baseline.rows(), &pressure);
        let hospital = self.hospital_pressure(state);
        (0..self.dims.n_iso)
            .map(|k| match k {
                iso::UNRESTRICTED if decision.distancing => {
                    mat_vec(self.contacts.distancing.rows(), &pressure)
                }
                iso::UNRESTRICTED => baseline.clone(),
                iso::CASE_ISOLATED => mat_vec(self.contacts.isolation.rows(), &pressure),
                iso::HOSPITALISED => vec![hospital; self.dims.n_age],
                _ => baseline.iter().map(|l| l + hospital).collect(),
            })
            .collect()
    }

    /// Basic reproduction number under the baseline regime: spectral radius
    /// of `K[a][b] = C[a][b] * N_a / N_b * Σ_s β_s * T_s(b)`, where `T_s(b)`
    /// is the expected time an infection in age `b` spends in stage `s`.
    /// Infinite when some transmitting stage is never left.
    pub fn basic_reproduction_number(
        &self,
        progression: &ProgressionModel,
        population: &[f64],
    ) -> f64 {
        let n = self.dims.n_age;
        let infectiousness: Vec<f64> = (0..n)
            .map(|b| {
                let reach = progression.reach_probabilities(b);
                let durations = progression.mean_stage_durations(b);
                self.transmission
                    .iter()
                    .zip(reach.iter().zip(&durations))
                    .filter(|(beta, (p, _))| **beta > 0.0 && **p > 0.0)
                    .map(|(beta, (p, dur))| beta * p * dur)
                    .sum()
            })
            .collect();
        if infectiousness.iter().any(|v: &f64| !v.is_finite()) {
            return f64::INFINITY;
        }
        let ngm: Vec<Vec<f64>> = (0..n)
            .map(|a| {
                (0..n)
                    .map(|b| {
                        if population[b] > 0.0 {
                            self.contacts.baseline.get(a, b) * population[a] / population[b]
                                * infectiousness[b]
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect();
        spectral_radius_power_iteration(&ngm, 1000, 1e-12)
    }
}

impl RateModel for InfectionModel {
    fn name(&self) -> &'static str {
        "infection"
    }

    fn axis(&self) -> Axis {
        Axis::Health
    }

    fn contribute(&self, ctx: &StepContext<'_>, out: &mut RateTensor) -> Result<(), EngineError> {
        let d = &self.dims;
        let lambda = self.force_of_infection(ctx.state, ctx.quarantine);
        for a in 0..d.n_age {
            for (k, t) in d.iso_test_pairs() {
                let from = Cell::new(a, SUSCEPTIBLE, k, t);
                let rate = lambda[k][a];
                // NaN has to reach `add` to be reported, so only clip negatives.
                let rate = if rate < 0.0 { 0.0 } else { rate };
                out.add(from, from.with_health(d.infected(0)), rate)?;
            }
        }
        Ok(())
    }
}
