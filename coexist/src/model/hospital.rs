use serde::{Deserialize, Serialize};

use crate::dims::{iso, test_state, Axis, Cell, Dims, HealthKind};
use crate::error::{check_len, check_rates, ConfigError, EngineError};
use crate::math::linalg::outer;
use crate::model::progression::age_factor;
use crate::model::{RateModel, StepContext};
use crate::rates::RateTensor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HospitalParams {
    /// Extra COVID admissions per day on top of the baseline, per infected stage.
    pub covid_admission_by_stage: Vec<f64>,
    /// Unrestricted virus-positive people entering case isolation, per day.
    pub case_isolation_rate: f64,
    /// Case-isolated susceptible or recovered people released, per day.
    pub case_isolation_release_rate: f64,
}

impl Default for HospitalParams {
    fn default() -> Self {
        Self {
            covid_admission_by_stage: vec![1e-4, 1e-3, 2e-2, 1e-2],
            case_isolation_rate: 1.0,
            case_isolation_release_rate: 1.0 / 14.0,
        }
    }
}

impl HospitalParams {
    pub fn zeros(dims: &Dims) -> Self {
        Self {
            covid_admission_by_stage: vec![0.0; dims.n_infected],
            case_isolation_rate: 0.0,
            case_isolation_release_rate: 0.0,
        }
    }

    pub fn check(&self, dims: &Dims) -> Result<(), ConfigError> {
        check_len(
            "hospital.covid_admission_by_stage",
            Axis::Health,
            dims.n_infected,
            &self.covid_admission_by_stage,
        )?;
        check_rates("hospital.covid_admission_by_stage", &self.covid_admission_by_stage)?;
        check_rates("hospital.case_isolation_rate", &[self.case_isolation_rate])?;
        check_rates(
            "hospital.case_isolation_release_rate",
            &[self.case_isolation_release_rate],
        )
    }
}

/// Share of people in hospital when admissions `r` and discharges `k` balance,
/// `r / (r + k)` per age (0 when both are 0).
pub fn equilibrium_ratio(admission: &[f64], discharge: &[f64]) -> Vec<f64> {
    admission
        .iter()
        .zip(discharge)
        .map(|(r, k)| if r + k > 0.0 { r / (r + k) } else { 0.0 })
        .collect()
}

/// Moves people between unrestricted, case-isolated and hospitalised.
#[derive(Debug, Clone)]
pub struct HospitalisationModel {
    dims: Dims,
    admission: Vec<f64>,
    discharge: Vec<f64>,
    /// `[age][stage]`
    covid: Vec<Vec<f64>>,
    case_isolation_rate: f64,
    release_rate: f64,
}

impl HospitalisationModel {
    pub fn new(
        dims: Dims,
        params: &HospitalParams,
        admission: &[f64],
        discharge: &[f64],
        relative_admission_risk: &[f64],
    ) -> Result<Self, ConfigError> {
        params.check(&dims)?;
        check_len("hospital_admission_rate", Axis::Age, dims.n_age, admission)?;
        check_len("hospital_discharge_rate", Axis::Age, dims.n_age, discharge)?;
        check_len(
            "relative_admission_risk",
            Axis::Age,
            dims.n_age,
            relative_admission_risk,
        )?;
        check_rates("hospital_admission_rate", admission)?;
        check_rates("hospital_discharge_rate", discharge)?;
        Ok(Self {
            dims,
            admission: admission.to_vec(),
            discharge: discharge.to_vec(),
            covid: outer(
                &age_factor(relative_admission_risk),
                &params.covid_admission_by_stage,
            ),
            case_isolation_rate: params.case_isolation_rate,
            release_rate: params.case_isolation_release_rate,
        })
    }

    pub fn equilibrium_ratio(&self) -> Vec<f64> {
        equilibrium_ratio(&self.admission, &self.discharge)
    }

    /// Admission rate for `age` in `health`; `None` for the dead.
    pub fn admission_rate(&self, age: usize, health: usize) -> Option<f64> {
        match self.dims.health_kind(health) {
            HealthKind::Dead => None,
            HealthKind::Infected(s) => Some(self.admission[age] + self.covid[age][s]),
            HealthKind::Susceptible | HealthKind::Recovered(_) => Some(self.admission[age]),
        }
    }

    fn hospital_flows(&self, out: &mut RateTensor) -> Result<(), EngineError> {
        let d = &self.dims;
        let mut sources = vec![iso::UNRESTRICTED];
        if d.has_case_isolation() {
            sources.push(iso::CASE_ISOLATED);
        }
        for a in 0..d.n_age {
            for h in 0..d.n_health() {
                let Some(admit) = self.admission_rate(a, h) else {
                    continue;
                };
                // Infected patients stay until they recover or die.
                let discharged = !matches!(d.health_kind(h), HealthKind::Infected(_));
                for t in 0..d.n_test {
                    let ward = Cell::new(a, h, iso::HOSPITALISED, t);
                    for &k in &sources {
                        out.add(ward.with_iso(k), ward, admit)?;
                    }
                    if discharged {
                        out.add(ward, ward.with_iso(iso::UNRESTRICTED), self.discharge[a])?;
                    }
                }
            }
        }
        Ok(())
    }

    fn case_isolation_flows(&self, isolate: bool, out: &mut RateTensor) -> Result<(), EngineError> {
        let d = &self.dims;
        for a in 0..d.n_age {
            for h in 0..d.n_health() {
                let kind = d.health_kind(h);
                for t in 0..d.n_test {
                    let home = Cell::new(a, h, iso::UNRESTRICTED, t);
                    let isolated = home.with_iso(iso::CASE_ISOLATED);
                    match kind {
                        HealthKind::Susceptible | HealthKind::Infected(_)
                            if isolate && (t == test_state::VIRUS || t == test_state::BOTH) =>
                        {
                            out.add(home, isolated, self.case_isolation_rate)?;
                        }
                        _ => {}
                    }
                    if matches!(kind, HealthKind::Susceptible | HealthKind::Recovered(_)) {
                        out.add(isolated, home, self.release_rate)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl RateModel for HospitalisationModel {
    fn name(&self) -> &'static str {
        "hospitalisation"
    }

    fn axis(&self) -> Axis {
        Axis::Isolation
    }

    fn contribute(&self, ctx: &StepContext<'_>, out: &mut RateTensor) -> Result<(), EngineError> {
        if self.dims.has_hospital() {
            self.hospital_flows(out)?;
        }
        if self.dims.has_case_isolation() && self.dims.has_testing() {
            self.case_isolation_flows(ctx.quarantine.case_isolation, out)?;
        }
        Ok(())
    }
}
