use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::linalg::max_asymmetry;

/// Entries closer than this (relative to their magnitude) count as symmetric.
pub const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Square, non-negative, symmetric age-by-age contact matrix (contacts per day).
///
/// Symmetry is a precondition: asymmetric input is rejected unless the caller
/// explicitly asks for [`ContactMatrix::symmetrized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct ContactMatrix {
    rows: Vec<Vec<f64>>,
}

impl ContactMatrix {
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self, ConfigError> {
        Self::new_named("contact", rows)
    }

    pub fn new_named(name: &str, rows: Vec<Vec<f64>>) -> Result<Self, ConfigError> {
        check_square(name, &rows)?;
        let n = rows.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (rows[i][j], rows[j][i]);
                let scale = a.abs().max(b.abs()).max(1.0);
                if (a - b).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(ConfigError::AsymmetricContact {
                        name: name.to_string(),
                        row: i,
                        col: j,
                        value: a,
                        transposed: b,
                    });
                }
            }
        }
        Ok(Self { rows })
    }

    /// Average `rows` with its transpose. Only for data sources known to be
    /// asymmetric; the worst asymmetry is logged.
    pub fn symmetrized(name: &str, rows: Vec<Vec<f64>>) -> Result<Self, ConfigError> {
        check_square(name, &rows)?;
        let (i, j, diff) = max_asymmetry(&rows);
        if diff > 0.0 {
            tracing::warn!(
                matrix = name,
                row = i,
                col = j,
                max_abs_diff = diff,
                "contact matrix is asymmetric, averaging with its transpose"
            );
        }
        let n = rows.len();
        let sym = (0..n)
            .map(|a| (0..n).map(|b| 0.5 * (rows[a][b] + rows[b][a])).collect())
            .collect();
        Ok(Self { rows: sym })
    }

    /// Stand-in for survey data: `10 * exp(-0.7 * |a - b|) + 0.5` contacts
    /// per day, so people mostly meet their own and neighbouring age bands.
    pub fn synthetic(n_age: usize) -> Self {
        let rows = (0..n_age)
            .map(|a| {
                (0..n_age)
                    .map(|b| 10.0 * (-0.7 * a.abs_diff(b) as f64).exp() + 0.5)
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn zeros(n: usize) -> Self {
        Self {
            rows: vec![vec![0.0; n]; n],
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .map(|r| r.iter().map(|v| v * factor).collect())
                .collect(),
        }
    }

    pub fn n(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i][j]
    }
}

fn check_square(name: &str, rows: &[Vec<f64>]) -> Result<(), ConfigError> {
    let n = rows.len();
    if n == 0 {
        return Err(ConfigError::invalid(name, "contact matrix is empty"));
    }
    if let Some(i) = rows.iter().position(|r| r.len() != n) {
        return Err(ConfigError::invalid(
            name,
            format!("row {i} has {} entries, matrix must be {n} x {n}", rows[i].len()),
        ));
    }
    for (i, r) in rows.iter().enumerate() {
        if let Some(j) = r.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::invalid(
                name,
                format!("entry ({i}, {j}) must be finite and >= 0, got {}", r[j]),
            ));
        }
    }
    Ok(())
}

impl TryFrom<Vec<Vec<f64>>> for ContactMatrix {
    type Error = ConfigError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<ContactMatrix> for Vec<Vec<f64>> {
    fn from(m: ContactMatrix) -> Self {
        m.rows
    }
}

/// Load a square contact matrix from CSV. Attempts to parse numeric cells; ignores
/// non-numeric headers if present. All rows must have the same number of numeric cells.
pub fn load_contact_matrix_csv(path: &str) -> anyhow::Result<Vec<Vec<f64>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open contact CSV: {}", path))?;

    let mut matrix: Vec<Vec<f64>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let mut row_vals: Vec<f64> = Vec::new();
        for field in record.iter() {
            if let Ok(v) = field.trim().parse::<f64>() {
                row_vals.push(v);
            }
        }
        if !row_vals.is_empty() {
            matrix.push(row_vals);
        }
    }
    let n = matrix.len();
    anyhow::ensure!(n > 0, "contact matrix empty or unparsable: {}", path);
    anyhow::ensure!(
        matrix.iter().all(|r| r.len() == n),
        "contact matrix must be square (n x n): {}",
        path
    );
    Ok(matrix)
}
