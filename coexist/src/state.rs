use serde::{Deserialize, Serialize};

use crate::dims::{iso, test_state, Axis, Cell, Dims, SUSCEPTIBLE};
use crate::error::{check_len, ConfigError, EngineError};

/// Expected number of people per joint (age, health, isolation, testing) state.
///
/// The same type holds the new-arrivals accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTensor {
    dims: Dims,
    data: Vec<f64>,
}

impl StateTensor {
    pub fn new_zero(dims: Dims) -> Self {
        Self {
            dims,
            data: vec![0.0; dims.n_cells()],
        }
    }

    /// Wrap a flat row-major buffer of shape (A, H, K, T).
    pub fn from_flat(dims: Dims, data: Vec<f64>) -> Result<Self, ConfigError> {
        if data.len() != dims.n_cells() {
            return Err(ConfigError::AxisMismatch {
                what: "state tensor cells".to_string(),
                axis: Axis::Age,
                expected: dims.n_cells(),
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    /// Initial condition from demographics: everyone susceptible, a
    /// `staff_ratio` share of each age working in hospitals, and the baseline
    /// equilibrium share of the remaining unrestricted people hospitalised.
    pub fn from_demographics(
        dims: Dims,
        population: &[f64],
        hospital_equilibrium_ratio: &[f64],
        staff_ratio: &[f64],
    ) -> Result<Self, ConfigError> {
        check_len("age population", Axis::Age, dims.n_age, population)?;
        check_len(
            "hospital equilibrium ratio",
            Axis::Age,
            dims.n_age,
            hospital_equilibrium_ratio,
        )?;
        check_len("hospital staff ratio", Axis::Age, dims.n_age, staff_ratio)?;

        let mut s = Self::new_zero(dims);
        for a in 0..dims.n_age {
            let pop = population[a].max(0.0);
            let staff = if dims.has_staff() {
                pop * staff_ratio[a]
            } else {
                0.0
            };
            let free = pop - staff;
            let hospitalised = if dims.has_hospital() {
                free * hospital_equilibrium_ratio[a]
            } else {
                0.0
            };
            let base = Cell::new(a, SUSCEPTIBLE, iso::UNRESTRICTED, test_state::NEGATIVE);
            s.set(base, free - hospitalised);
            if dims.has_hospital() {
                s.set(base.with_iso(iso::HOSPITALISED), hospitalised);
            }
            if dims.has_staff() {
                s.set(base.with_iso(iso::STAFF), staff);
            }
        }
        Ok(s)
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn get(&self, c: Cell) -> f64 {
        self.data[self.dims.flat(c)]
    }

    pub fn set(&mut self, c: Cell, value: f64) {
        let i = self.dims.flat(c);
        self.data[i] = value;
    }

    pub fn add(&mut self, c: Cell, value: f64) {
        let i = self.dims.flat(c);
        self.data[i] += value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Move `amount` people from one cell to another. Total is unchanged.
    pub fn move_mass(&mut self, from: Cell, to: Cell, amount: f64) {
        self.add(from, -amount);
        self.add(to, amount);
    }

    /// Move `count` unrestricted, untested susceptibles of `age` into the
    /// first infected (Exposed) stage.
    pub fn seed_exposed(&mut self, age: usize, count: f64) -> Result<(), EngineError> {
        let from = Cell::new(age, SUSCEPTIBLE, iso::UNRESTRICTED, test_state::NEGATIVE);
        let available = self.get(from);
        if count > available {
            return Err(EngineError::InsufficientSusceptibles {
                age,
                requested: count,
                available,
            });
        }
        let to = from.with_health(self.dims.infected(0));
        self.move_mass(from, to, count);
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    fn sum_where(&self, pred: impl Fn(&Cell) -> bool) -> f64 {
        self.dims
            .cells()
            .zip(self.data.iter())
            .filter(|(c, _)| pred(c))
            .map(|(_, v)| *v)
            .sum()
    }

    pub fn age_total(&self, age: usize) -> f64 {
        let block = self.dims.block_len();
        self.data[age * block..(age + 1) * block].iter().sum()
    }

    pub fn health_total(&self, health: usize) -> f64 {
        self.sum_where(|c| c.health == health)
    }

    pub fn age_health_total(&self, age: usize, health: usize) -> f64 {
        self.sum_where(|c| c.age == age && c.health == health)
    }

    pub fn iso_total(&self, iso: usize) -> f64 {
        self.sum_where(|c| c.iso == iso)
    }

    pub fn test_total(&self, test: usize) -> f64 {
        self.sum_where(|c| c.test == test)
    }

    /// Hospital patients (staff excluded); 0 without a hospitalised role.
    pub fn hospitalised_total(&self) -> f64 {
        if self.dims.has_hospital() {
            self.iso_total(iso::HOSPITALISED)
        } else {
            0.0
        }
    }

    /// People in any infected stage.
    pub fn infected_total(&self) -> f64 {
        let n = self.dims.n_infected;
        self.sum_where(|c| c.health >= 1 && c.health <= n)
    }

    /// Living (non-dead) people per age group, negative cells counted as 0.
    pub fn living_by_age(&self) -> Vec<f64> {
        let dead = self.dims.dead();
        let mut out = vec![0.0; self.dims.n_age];
        for (c, v) in self.dims.cells().zip(self.data.iter()) {
            if c.health != dead {
                out[c.age] += v.max(0.0);
            }
        }
        out
    }

    /// Every cell finite and >= 0. For states handed in from outside a run.
    pub fn check_occupancy(&self, what: &str) -> Result<(), ConfigError> {
        match self.data.iter().position(|v| !v.is_finite() || *v < 0.0) {
            Some(i) => Err(ConfigError::invalid(
                what,
                format!(
                    "cell {} holds {}, must be finite and >= 0",
                    self.dims.cell(i),
                    self.data[i]
                ),
            )),
            None => Ok(()),
        }
    }

    pub fn check_non_negative(&self, day: f64, tolerance: f64) -> Result<(), EngineError> {
        match self.first_negative(tolerance) {
            Some((cell, value)) => Err(EngineError::NegativeState { value, cell, day }),
            None => Ok(()),
        }
    }

    /// First cell below `-tolerance`, if any.
    pub fn first_negative(&self, tolerance: f64) -> Option<(Cell, f64)> {
        self.data
            .iter()
            .position(|v| *v < -tolerance)
            .map(|i| (self.dims.cell(i), self.data[i]))
    }
}
