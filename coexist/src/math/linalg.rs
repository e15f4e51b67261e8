//! Small dense primitives for the rank-1 factorised rates. Matrices are
//! row-major `Vec<Vec<f64>>`.

/// Outer product `u v^T`: `out[i][j] = u[i] * v[j]`, shape (u.len(), v.len()).
pub fn outer(u: &[f64], v: &[f64]) -> Vec<Vec<f64>> {
    u.iter()
        .map(|ui| v.iter().map(|vj| ui * vj).collect())
        .collect()
}

/// Matrix-vector product `A x` for an (n x m) matrix and an m-vector.
pub fn mat_vec(a: &[Vec<f64>], x: &[f64]) -> Vec<f64> {
    a.iter()
        .map(|row| row.iter().zip(x).map(|(aij, xj)| aij * xj).sum())
        .collect()
}

/// `Σ_i w[i] * Σ_j A[i][j]`: mean row sum of `A` under weights `w`.
pub fn weighted_row_sum(w: &[f64], a: &[Vec<f64>]) -> f64 {
    w.iter()
        .zip(a)
        .map(|(wi, row)| wi * row.iter().sum::<f64>())
        .sum()
}

/// Largest `|A[i][j] - A[j][i]|` and where it occurs.
pub fn max_asymmetry(a: &[Vec<f64>]) -> (usize, usize, f64) {
    let mut worst = (0, 0, 0.0);
    for i in 0..a.len() {
        for j in (i + 1)..a.len() {
            let d = (a[i][j] - a[j][i]).abs();
            if d > worst.2 {
                worst = (i, j, d);
            }
        }
    }
    worst
}

/// Simple power iteration to approximate spectral radius (dominant eigenvalue)
/// of a non-negative square matrix.
pub fn spectral_radius_power_iteration(a: &[Vec<f64>], max_iter: usize, tol: f64) -> f64 {
    let n = a.len();
    if n == 0 {
        return 0.0;
    }

    let mut x = vec![1.0 / (n as f64); n];
    let mut lambda_old = 0.0;

    for _ in 0..max_iter {
        let y = mat_vec(a, &x);
        // Rayleigh quotient approx
        let num: f64 = y.iter().zip(&x).map(|(yi, xi)| yi * xi).sum();
        let den: f64 = x.iter().map(|xi| xi * xi).sum();
        let lambda = if den > 0.0 { num / den } else { 0.0 };

        let norm = y.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (xi, yi) in x.iter_mut().zip(&y) {
                *xi = yi / norm;
            }
        } else {
            return 0.0;
        }
        if (lambda - lambda_old).abs() < tol {
            return lambda;
        }
        lambda_old = lambda;
    }
    lambda_old
}
