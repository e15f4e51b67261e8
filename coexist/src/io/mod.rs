//! Data-provider seam: everything the engine needs from external datasets,
//! validated here before it reaches any model.

pub mod contact;
pub mod debug_log;
pub mod population;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dims::Axis;
use crate::error::{check_len, ConfigError};

pub use contact::ContactMatrix;

/// Fixed numeric arrays supplied by the ingestion collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputData {
    pub age_population: Vec<f64>,
    pub contact_baseline: ContactMatrix,
    pub contact_distancing: ContactMatrix,
    /// Contacts under state-issued home quarantine; none at all when absent.
    #[serde(default)]
    pub contact_isolation: Option<ContactMatrix>,
    /// Non-COVID admissions per person per day.
    pub hospital_admission_rate: Vec<f64>,
    /// Inverse mean length of stay.
    pub hospital_discharge_rate: Vec<f64>,
    pub staff_ratio: Vec<f64>,
    pub relative_death_risk: Vec<f64>,
    pub relative_admission_risk: Vec<f64>,
    pub relative_recovery_speed: Vec<f64>,
}

impl InputData {
    /// Population and contacts only; every rate and risk adjustment is zero.
    pub fn uniform(age_population: Vec<f64>, contact: ContactMatrix) -> Self {
        let n = age_population.len();
        Self {
            age_population,
            contact_distancing: contact.clone(),
            contact_baseline: contact,
            contact_isolation: None,
            hospital_admission_rate: vec![0.0; n],
            hospital_discharge_rate: vec![0.0; n],
            staff_ratio: vec![0.0; n],
            relative_death_risk: vec![0.0; n],
            relative_admission_risk: vec![0.0; n],
            relative_recovery_speed: vec![0.0; n],
        }
    }

    pub fn validate(&self, n_age: usize) -> Result<(), ConfigError> {
        check_len("age_population", Axis::Age, n_age, &self.age_population)?;
        check_len(
            "hospital_admission_rate",
            Axis::Age,
            n_age,
            &self.hospital_admission_rate,
        )?;
        check_len(
            "hospital_discharge_rate",
            Axis::Age,
            n_age,
            &self.hospital_discharge_rate,
        )?;
        check_len("staff_ratio", Axis::Age, n_age, &self.staff_ratio)?;
        check_len("relative_death_risk", Axis::Age, n_age, &self.relative_death_risk)?;
        check_len(
            "relative_admission_risk",
            Axis::Age,
            n_age,
            &self.relative_admission_risk,
        )?;
        check_len(
            "relative_recovery_speed",
            Axis::Age,
            n_age,
            &self.relative_recovery_speed,
        )?;

        let matrices = [
            ("contact_baseline", Some(&self.contact_baseline)),
            ("contact_distancing", Some(&self.contact_distancing)),
            ("contact_isolation", self.contact_isolation.as_ref()),
        ];
        for (name, m) in matrices {
            if let Some(m) = m {
                if m.n() != n_age {
                    return Err(ConfigError::AxisMismatch {
                        what: name.to_string(),
                        axis: Axis::Age,
                        expected: n_age,
                        actual: m.n(),
                    });
                }
            }
        }

        crate::error::check_rates("age_population", &self.age_population)?;
        crate::error::check_rates("hospital_admission_rate", &self.hospital_admission_rate)?;
        crate::error::check_rates("hospital_discharge_rate", &self.hospital_discharge_rate)?;
        for (a, r) in self.staff_ratio.iter().enumerate() {
            if !(0.0..1.0).contains(r) {
                return Err(ConfigError::invalid(
                    "staff_ratio",
                    format!("age {a}: must be in [0, 1), got {r}"),
                ));
            }
        }
        for (name, v) in [
            ("relative_death_risk", &self.relative_death_risk),
            ("relative_admission_risk", &self.relative_admission_risk),
            ("relative_recovery_speed", &self.relative_recovery_speed),
        ] {
            if let Some(a) = v.iter().position(|r| !r.is_finite() || *r < -1.0) {
                return Err(ConfigError::invalid(
                    name,
                    format!("age {a}: relative risk must be finite and >= -1, got {}", v[a]),
                ));
            }
        }
        Ok(())
    }

    pub fn contact_isolation_or_zero(&self) -> ContactMatrix {
        self.contact_isolation
            .clone()
            .unwrap_or_else(|| ContactMatrix::zeros(self.contact_baseline.n()))
    }

    pub fn population_share(&self) -> Vec<f64> {
        let total: f64 = self.age_population.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.age_population.len()];
        }
        self.age_population.iter().map(|p| p / total).collect()
    }
}

/// Supplies [`InputData`] to the engine.
pub trait DataProvider {
    fn load(&self) -> anyhow::Result<InputData>;
}

/// In-memory data, already assembled.
#[derive(Debug, Clone)]
pub struct StaticData(pub InputData);

impl DataProvider for StaticData {
    fn load(&self) -> anyhow::Result<InputData> {
        Ok(self.0.clone())
    }
}

// England, decadal age bands 0-9 .. 80+.
const ENGLAND_POPULATION_UK: [f64; 9] = [
    8044.056, 7642.473, 8558.707, 9295.024, 8604.251, 9173.465, 7286.777, 5830.635, 3450.616,
];
const ENGLAND_SHARE_OF_UK: f64 = 55.98 / 66.27;
const RELATIVE_DEATH_RISK: [f64; 9] = [
    -0.99742186, -0.99728639, -0.98158438, -0.9830432, -0.82983414, -0.84039294, 0.10768979,
    0.38432409, 5.13754904,
];
const RELATIVE_ADMISSION_RISK: [f64; 9] = [
    -0.94886625, -0.96332087, -0.86528671, -0.79828999, -0.61535305, -0.35214767, 0.12567034,
    0.85809052, 3.55950368,
];
const ADMISSIONS_PER_DAY: [f64; 9] = [
    3.0e-4, 1.5e-4, 2.4e-4, 3.1e-4, 3.6e-4, 4.8e-4, 7.4e-4, 1.25e-3, 2.1e-3,
];
const MEAN_LENGTH_OF_STAY_DAYS: [f64; 9] = [2.5, 2.8, 3.0, 3.4, 4.0, 4.8, 5.9, 7.5, 9.8];
const CLINICAL_STAFF_RATIO: [f64; 9] = [0.0, 0.001, 0.03, 0.04, 0.04, 0.035, 0.015, 0.0, 0.0];

impl StaticData {
    /// Built-in England inputs. Contacts are synthetic; distancing keeps 30%
    /// of baseline contacts.
    pub fn england() -> Self {
        let baseline = ContactMatrix::synthetic(9);
        Self(InputData {
            age_population: ENGLAND_POPULATION_UK
                .iter()
                .map(|p| 1000.0 * p * ENGLAND_SHARE_OF_UK)
                .collect(),
            contact_distancing: baseline.scaled(0.3),
            contact_baseline: baseline,
            contact_isolation: None,
            hospital_admission_rate: ADMISSIONS_PER_DAY.to_vec(),
            hospital_discharge_rate: MEAN_LENGTH_OF_STAY_DAYS.iter().map(|d| 1.0 / d).collect(),
            staff_ratio: CLINICAL_STAFF_RATIO.to_vec(),
            relative_death_risk: RELATIVE_DEATH_RISK.to_vec(),
            relative_admission_risk: RELATIVE_ADMISSION_RISK.to_vec(),
            relative_recovery_speed: vec![0.0; 9],
        })
    }
}

/// Reads inputs from a directory of CSV files:
///
/// - `population.csv` (`age_group,pop`)
/// - `contact_baseline.csv`, `contact_distancing.csv`, optional `contact_isolation.csv`
/// - `age_rates.csv` (see [`population::load_age_rates_csv`])
#[derive(Debug, Clone)]
pub struct CsvDataDir {
    pub dir: PathBuf,
    /// Average asymmetric contact matrices with their transpose instead of
    /// rejecting them.
    pub symmetrize: bool,
}

impl CsvDataDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            symmetrize: false,
        }
    }

    fn path(&self, file: &str) -> anyhow::Result<String> {
        let p = self.dir.join(file);
        p.to_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("non UTF-8 path: {:?}", p))
    }

    fn matrix(&self, file: &str) -> anyhow::Result<ContactMatrix> {
        let rows = contact::load_contact_matrix_csv(&self.path(file)?)?;
        let m = if self.symmetrize {
            ContactMatrix::symmetrized(file, rows)?
        } else {
            ContactMatrix::new_named(file, rows)?
        };
        Ok(m)
    }
}

impl DataProvider for CsvDataDir {
    fn load(&self) -> anyhow::Result<InputData> {
        let (pop_labels, age_population) =
            population::load_population_csv(&self.path("population.csv")?)?;
        let rates = population::load_age_rates_csv(&self.path("age_rates.csv")?)?;
        anyhow::ensure!(
            pop_labels == rates.labels,
            "age groups differ between population.csv {:?} and age_rates.csv {:?}",
            pop_labels,
            rates.labels
        );
        let isolation_file = "contact_isolation.csv";
        let contact_isolation = if Path::new(&self.path(isolation_file)?).exists() {
            Some(self.matrix(isolation_file)?)
        } else {
            None
        };
        let data = InputData {
            age_population,
            contact_baseline: self.matrix("contact_baseline.csv")?,
            contact_distancing: self.matrix("contact_distancing.csv")?,
            contact_isolation,
            hospital_admission_rate: rates.hospital_admission_rate,
            hospital_discharge_rate: rates.hospital_discharge_rate,
            staff_ratio: rates.staff_ratio,
            relative_death_risk: rates.relative_death_risk,
            relative_admission_risk: rates.relative_admission_risk,
            relative_recovery_speed: rates.relative_recovery_speed,
        };
        data.validate(data.age_population.len())?;
        tracing::info!(
            dir = %self.dir.display(),
            n_age = data.age_population.len(),
            "loaded input data"
        );
        Ok(data)
    }
}
