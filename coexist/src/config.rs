//! Versioned run configuration.
//!
//! Every group is `#[serde(default, deny_unknown_fields)]`, so a JSON
//! document only needs the options it changes, and misspelt options are
//! rejected instead of silently ignored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dims::{Axis, Dims};
use crate::engine::IntegratorParams;
use crate::error::{check_len, check_rates, ConfigError};
use crate::model::hospital::HospitalParams;
use crate::model::infection::InfectionParams;
use crate::model::progression::ProgressionParams;
use crate::model::testing::TestingParams;
use crate::policy::ScheduledQuarantine;
use crate::trajectory::ArrivalsMode;

pub const SCHEMA_VERSION: u32 = 1;

/// Documentation for one top-level option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub default: &'static str,
    pub doc: &'static str,
}

pub const OPTIONS: &[OptionSpec] = &[
    OptionSpec {
        name: "schema_version",
        kind: "integer",
        default: "1",
        doc: "Version of this option schema; anything else is rejected.",
    },
    OptionSpec {
        name: "dims",
        kind: "object",
        default: "{n_age: 9, n_infected: 4, n_symptomatic: 2, n_recovered: 2, n_iso: 4, n_test: 4}",
        doc: "Sizes of the age, health, isolation and testing axes.",
    },
    OptionSpec {
        name: "total_days",
        kind: "integer",
        default: "80",
        doc: "Number of whole days to simulate.",
    },
    OptionSpec {
        name: "start_date",
        kind: "date",
        default: "2020-03-01",
        doc: "Calendar date of day 0.",
    },
    OptionSpec {
        name: "arrivals_mode",
        kind: "\"daily\" | \"cumulative\"",
        default: "daily",
        doc: "Whether new arrivals are reset at the start of each day.",
    },
    OptionSpec {
        name: "integrator",
        kind: "object",
        default: "{max_step_hazard: 0.5, min_substeps: 1, max_substeps: 4096, max_halvings: 6, negative_tolerance: 1e-9, conservation_tolerance: 1e-6}",
        doc: "Sub-step selection and numerical guards.",
    },
    OptionSpec {
        name: "infection",
        kind: "object",
        default: "{transmission_by_stage: [0.001, 0.01, 0.05, 0.04], hospital_mixing_ratio: 3.0}",
        doc: "Transmission probability per contact and hospital mixing.",
    },
    OptionSpec {
        name: "progression",
        kind: "object",
        default: "{forward_by_stage, recovery_by_stage, death_by_stage, antibody_maturation}",
        doc: "Baseline disease progression rates per infected stage.",
    },
    OptionSpec {
        name: "hospital",
        kind: "object",
        default: "{covid_admission_by_stage: [1e-4, 1e-3, 2e-2, 1e-2], case_isolation_rate: 1.0, case_isolation_release_rate: 0.0714}",
        doc: "COVID admissions on top of the baseline, and case isolation.",
    },
    OptionSpec {
        name: "testing",
        kind: "object",
        default: "{tests: [pcr, antigen, antibody], capacity: {kind: england, antigen_share: 0.5}, policy: symptomatic_first, rationing: proportional, max_tests_per_person: 1.0}",
        doc: "Test types, capacity, allocation policy and rationing.",
    },
    OptionSpec {
        name: "quarantine",
        kind: "object",
        default: "{social_distancing_start: null, case_isolation_start: null}",
        doc: "Dates from which distancing and case isolation apply.",
    },
    OptionSpec {
        name: "initial_exposed",
        kind: "array",
        default: "[]",
        doc: "Exposed people seeded per age group at day 0; empty seeds nobody.",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelParams {
    pub schema_version: u32,
    pub dims: Dims,
    pub total_days: u32,
    pub start_date: NaiveDate,
    pub arrivals_mode: ArrivalsMode,
    pub integrator: IntegratorParams,
    pub infection: InfectionParams,
    pub progression: ProgressionParams,
    pub hospital: HospitalParams,
    pub testing: TestingParams,
    pub quarantine: ScheduledQuarantine,
    pub initial_exposed: Vec<f64>,
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 3, 1).unwrap_or_default()
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            dims: Dims::default(),
            total_days: 80,
            start_date: default_start_date(),
            arrivals_mode: ArrivalsMode::default(),
            integrator: IntegratorParams::default(),
            infection: InfectionParams::default(),
            progression: ProgressionParams::default(),
            hospital: HospitalParams::default(),
            testing: TestingParams::default(),
            quarantine: ScheduledQuarantine::default(),
            initial_exposed: Vec::new(),
        }
    }
}

impl ModelParams {
    /// All rates zero and no tests, sized to `dims`.
    pub fn neutral(dims: Dims) -> Self {
        Self {
            dims,
            infection: InfectionParams::zeros(&dims),
            progression: ProgressionParams::zeros(&dims),
            hospital: HospitalParams::zeros(&dims),
            testing: TestingParams::none(),
            ..Self::default()
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ConfigError::Parse("options must be a JSON object".to_string()))?;
        if let Some(name) = obj.keys().find(|k| !OPTIONS.iter().any(|o| o.name == *k)) {
            return Err(ConfigError::UnknownOption {
                name: name.clone(),
                known: OPTIONS
                    .iter()
                    .map(|o| o.name)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        if let Some(v) = obj.get("schema_version") {
            let found = v
                .as_u64()
                .ok_or_else(|| ConfigError::Parse("schema_version must be an integer".into()))?;
            if found != u64::from(SCHEMA_VERSION) {
                return Err(ConfigError::SchemaVersion {
                    expected: SCHEMA_VERSION,
                    found: u32::try_from(found).unwrap_or(u32::MAX),
                });
            }
        }
        let params: ModelParams = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        params.check()?;
        Ok(params)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_json(&value)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ConfigError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: self.schema_version,
            });
        }
        self.dims.check()?;
        self.integrator.check()?;
        self.infection.check(&self.dims)?;
        self.progression.check(&self.dims)?;
        self.hospital.check(&self.dims)?;
        self.testing.check(&self.dims)?;
        if !self.initial_exposed.is_empty() {
            check_len("initial_exposed", Axis::Age, self.dims.n_age, &self.initial_exposed)?;
            check_rates("initial_exposed", &self.initial_exposed)?;
        }
        Ok(())
    }
}

