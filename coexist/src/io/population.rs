use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PopRow {
    age_group: String,
    pop: f64,
}

/// Load population by age from a CSV file with columns: `age_group,pop`.
/// Returns the labels and populations in file order.
pub fn load_population_csv(path: &str) -> anyhow::Result<(Vec<String>, Vec<f64>)> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open population CSV: {}", path))?;
    let mut labels = Vec::new();
    let mut pops = Vec::new();
    for result in rdr.deserialize::<PopRow>() {
        let row = result.with_context(|| format!("Bad population row in {}", path))?;
        anyhow::ensure!(
            row.pop.is_finite() && row.pop >= 0.0,
            "population for '{}' must be finite and >= 0, got {}",
            row.age_group,
            row.pop
        );
        labels.push(row.age_group);
        pops.push(row.pop);
    }
    Ok((labels, pops))
}

/// Per-age rate table, one row per age group in axis order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgeRates {
    pub labels: Vec<String>,
    pub hospital_admission_rate: Vec<f64>,
    pub hospital_discharge_rate: Vec<f64>,
    pub staff_ratio: Vec<f64>,
    pub relative_death_risk: Vec<f64>,
    pub relative_admission_risk: Vec<f64>,
    pub relative_recovery_speed: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct AgeRateRow {
    age_group: String,
    hospital_admission_rate: f64,
    hospital_discharge_rate: f64,
    staff_ratio: f64,
    relative_death_risk: f64,
    relative_admission_risk: f64,
    #[serde(default)]
    relative_recovery_speed: f64,
}

/// Load per-age rates from a CSV with columns
/// `age_group,hospital_admission_rate,hospital_discharge_rate,staff_ratio,relative_death_risk,relative_admission_risk[,relative_recovery_speed]`.
pub fn load_age_rates_csv(path: &str) -> anyhow::Result<AgeRates> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open age rates CSV: {}", path))?;
    let mut out = AgeRates::default();
    for result in rdr.deserialize::<AgeRateRow>() {
        let row = result.with_context(|| format!("Bad age rate row in {}", path))?;
        out.labels.push(row.age_group);
        out.hospital_admission_rate.push(row.hospital_admission_rate);
        out.hospital_discharge_rate.push(row.hospital_discharge_rate);
        out.staff_ratio.push(row.staff_ratio);
        out.relative_death_risk.push(row.relative_death_risk);
        out.relative_admission_risk.push(row.relative_admission_risk);
        out.relative_recovery_speed.push(row.relative_recovery_speed);
    }
    anyhow::ensure!(!out.labels.is_empty(), "age rates CSV has no rows: {}", path);
    Ok(out)
}
