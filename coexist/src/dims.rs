//! Dimension registry: the four classification axes and their index layout.
//!
//! Health layout per age block:
//! `S | I_0 .. I_{n_infected-1} | R_0 .. R_{n_recovered-1} | D`
//!
//! The first infected stage is Exposed; the last `n_symptomatic` infected
//! stages are symptomatic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Isolation role indices. Roles at or above `Dims::n_iso` don't exist.
pub mod iso {
    pub const UNRESTRICTED: usize = 0;
    pub const CASE_ISOLATED: usize = 1;
    pub const HOSPITALISED: usize = 2;
    pub const STAFF: usize = 3;
}

/// Testing role indices, only meaningful when `Dims::has_testing()`.
pub mod test_state {
    pub const NEGATIVE: usize = 0;
    pub const VIRUS: usize = 1;
    pub const ANTIBODY: usize = 2;
    pub const BOTH: usize = 3;
}

pub const SUSCEPTIBLE: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Age,
    Health,
    Isolation,
    Testing,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::Age => "age",
            Axis::Health => "health",
            Axis::Isolation => "isolation",
            Axis::Testing => "testing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthKind {
    Susceptible,
    Infected(usize),
    Recovered(usize),
    Dead,
}

/// A joint state: one cell of the state tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub age: usize,
    pub health: usize,
    pub iso: usize,
    pub test: usize,
}

impl Cell {
    pub fn new(age: usize, health: usize, iso: usize, test: usize) -> Self {
        Self {
            age,
            health,
            iso,
            test,
        }
    }

    pub fn with_health(self, health: usize) -> Self {
        Self { health, ..self }
    }

    pub fn with_iso(self, iso: usize) -> Self {
        Self { iso, ..self }
    }

    pub fn with_test(self, test: usize) -> Self {
        Self { test, ..self }
    }

    /// Axes along which `self` and `other` differ.
    pub fn changed_axes(&self, other: &Cell) -> Vec<Axis> {
        let mut axes = Vec::with_capacity(4);
        if self.age != other.age {
            axes.push(Axis::Age);
        }
        if self.health != other.health {
            axes.push(Axis::Health);
        }
        if self.iso != other.iso {
            axes.push(Axis::Isolation);
        }
        if self.test != other.test {
            axes.push(Axis::Testing);
        }
        axes
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(age={}, health={}, iso={}, test={})",
            self.age, self.health, self.iso, self.test
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Dims {
    pub n_age: usize,
    pub n_infected: usize,
    pub n_symptomatic: usize,
    pub n_recovered: usize,
    pub n_iso: usize,
    pub n_test: usize,
}

impl Default for Dims {
    fn default() -> Self {
        Self {
            n_age: 9,
            n_infected: 4,
            n_symptomatic: 2,
            n_recovered: 2,
            n_iso: 4,
            n_test: 4,
        }
    }
}

impl Dims {
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.n_age == 0 {
            return Err(ConfigError::invalid("dims.n_age", "must be >= 1"));
        }
        if self.n_infected == 0 {
            return Err(ConfigError::invalid("dims.n_infected", "must be >= 1"));
        }
        if self.n_symptomatic > self.n_infected {
            return Err(ConfigError::invalid(
                "dims.n_symptomatic",
                format!("must be <= n_infected ({})", self.n_infected),
            ));
        }
        if self.n_recovered == 0 {
            return Err(ConfigError::invalid("dims.n_recovered", "must be >= 1"));
        }
        if !(1..=4).contains(&self.n_iso) {
            return Err(ConfigError::invalid("dims.n_iso", "must be between 1 and 4"));
        }
        if self.n_test != 1 && self.n_test != 4 {
            return Err(ConfigError::invalid("dims.n_test", "must be 1 or 4"));
        }
        Ok(())
    }

    pub fn n_health(&self) -> usize {
        2 + self.n_infected + self.n_recovered
    }

    pub fn n_cells(&self) -> usize {
        self.n_age * self.n_health() * self.n_iso * self.n_test
    }

    /// Cells in one age block.
    pub fn block_len(&self) -> usize {
        self.n_health() * self.n_iso * self.n_test
    }

    pub fn infected(&self, stage: usize) -> usize {
        1 + stage
    }

    pub fn recovered(&self, stage: usize) -> usize {
        1 + self.n_infected + stage
    }

    pub fn terminal_recovered(&self) -> usize {
        self.recovered(self.n_recovered - 1)
    }

    pub fn dead(&self) -> usize {
        self.n_health() - 1
    }

    pub fn health_kind(&self, health: usize) -> HealthKind {
        if health == SUSCEPTIBLE {
            HealthKind::Susceptible
        } else if health <= self.n_infected {
            HealthKind::Infected(health - 1)
        } else if health < self.dead() {
            HealthKind::Recovered(health - 1 - self.n_infected)
        } else {
            HealthKind::Dead
        }
    }

    pub fn is_symptomatic_stage(&self, stage: usize) -> bool {
        stage < self.n_infected && stage >= self.n_infected - self.n_symptomatic
    }

    pub fn has_case_isolation(&self) -> bool {
        self.n_iso > iso::CASE_ISOLATED
    }

    pub fn has_hospital(&self) -> bool {
        self.n_iso > iso::HOSPITALISED
    }

    pub fn has_staff(&self) -> bool {
        self.n_iso > iso::STAFF
    }

    pub fn has_testing(&self) -> bool {
        self.n_test == 4
    }

    pub fn flat(&self, c: Cell) -> usize {
        ((c.age * self.n_health() + c.health) * self.n_iso + c.iso) * self.n_test + c.test
    }

    pub fn cell(&self, flat: usize) -> Cell {
        let test = flat % self.n_test;
        let rest = flat / self.n_test;
        let iso = rest % self.n_iso;
        let rest = rest / self.n_iso;
        let health = rest % self.n_health();
        let age = rest / self.n_health();
        Cell {
            age,
            health,
            iso,
            test,
        }
    }

    /// All cells in flat order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.n_cells()).map(move |i| self.cell(i))
    }

    /// All (iso, test) pairs for a fixed age and health.
    pub fn iso_test_pairs(&self) -> impl Iterator<Item = (usize, usize)> {
        let (n_iso, n_test) = (self.n_iso, self.n_test);
        (0..n_iso).flat_map(move |k| (0..n_test).map(move |t| (k, t)))
    }
}
