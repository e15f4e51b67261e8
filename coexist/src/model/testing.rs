//! Testing: who gets tested, how many tests exist, and the resulting
//! test-state transitions.

use serde::{Deserialize, Serialize};

use crate::dims::{iso, test_state, Axis, Cell, Dims, HealthKind};
use crate::error::{check_len, ConfigError, EngineError};
use crate::model::{RateModel, StepContext};
use crate::policy::SimTime;
use crate::rates::{RateTensor, TestUsage};
use crate::state::StateTensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestTarget {
    Virus,
    Antibody,
}

impl TestTarget {
    /// Test state after a positive result, or `None` if the result changes
    /// nothing.
    pub fn positive_transition(self, from: usize) -> Option<usize> {
        match (self, from) {
            (TestTarget::Virus, test_state::NEGATIVE) => Some(test_state::VIRUS),
            (TestTarget::Virus, test_state::ANTIBODY) => Some(test_state::BOTH),
            (TestTarget::Antibody, test_state::NEGATIVE) => Some(test_state::ANTIBODY),
            (TestTarget::Antibody, test_state::VIRUS) => Some(test_state::BOTH),
            _ => None,
        }
    }

    /// Whether `test` already records a positive result for this target.
    pub fn is_positive(self, test: usize) -> bool {
        self.positive_transition(test).is_none()
    }
}

/// A test type and its probability of a positive result in each health state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSpec {
    pub name: String,
    pub target: TestTarget,
    /// Indexed by health state: false positive rate for S, sensitivity
    /// elsewhere.
    pub positive_by_health: Vec<f64>,
}

// Health order for the default registry: S, E, A, I1, I2, IgM, IgG, D.
impl TestSpec {
    pub fn pcr() -> Self {
        Self {
            name: "pcr".to_string(),
            target: TestTarget::Virus,
            positive_by_health: vec![0.001, 0.2, 0.6, 0.9, 0.8, 0.2, 0.02, 0.0],
        }
    }

    pub fn antigen() -> Self {
        Self {
            name: "antigen".to_string(),
            target: TestTarget::Virus,
            positive_by_health: vec![0.01, 0.05, 0.4, 0.8, 0.6, 0.1, 0.01, 0.0],
        }
    }

    pub fn antibody() -> Self {
        Self {
            name: "antibody".to_string(),
            target: TestTarget::Antibody,
            positive_by_health: vec![0.02, 0.0, 0.05, 0.1, 0.5, 0.85, 0.95, 0.0],
        }
    }

    pub fn check(&self, dims: &Dims) -> Result<(), ConfigError> {
        check_len(
            &format!("testing.tests[{}].positive_by_health", self.name),
            Axis::Health,
            dims.n_health(),
            &self.positive_by_health,
        )?;
        if let Some(p) = self
            .positive_by_health
            .iter()
            .find(|p| !(0.0..=1.0).contains(*p))
        {
            return Err(ConfigError::invalid(
                format!("testing.tests[{}].positive_by_health", self.name),
                format!("probabilities must be in [0, 1], got {p}"),
            ));
        }
        Ok(())
    }
}

/// Tests available per day, one entry per test type.
pub trait TestCapacity: Send + Sync {
    fn capacity(&self, day: f64) -> Vec<f64>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantCapacity(pub Vec<f64>);

impl TestCapacity for ConstantCapacity {
    fn capacity(&self, _day: f64) -> Vec<f64> {
        self.0.clone()
    }
}

/// `total / (1 + exp(-slope * (day - midpoint_day)))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogisticRamp {
    pub total: f64,
    pub midpoint_day: f64,
    pub slope: f64,
}

impl LogisticRamp {
    pub fn value(&self, day: f64) -> f64 {
        self.total / (1.0 + (-self.slope * (day - self.midpoint_day)).exp())
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            total: self.total * factor,
            ..self
        }
    }
}

/// Share of lateral-flow production that goes to antigen tests.
pub const DEFAULT_ANTIGEN_SHARE: f64 = 0.5;

/// Capacity per test type as a sum of logistic ramps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogisticCapacity {
    pub ramps_by_test: Vec<Vec<LogisticRamp>>,
}

impl LogisticCapacity {
    /// PCR (lab pillars 1 and 2), antigen and antibody. Antigen and antibody
    /// split one lateral-flow production ramp, `antigen_share` of it going to
    /// antigen tests.
    pub fn england(antigen_share: f64) -> Result<Self, ConfigError> {
        check_share(antigen_share)?;
        Ok(Self::england_split(antigen_share))
    }

    fn england_split(antigen_share: f64) -> Self {
        let lateral_flow = LogisticRamp {
            total: 0.5e6,
            midpoint_day: 100.0,
            slope: 0.1,
        };
        Self {
            ramps_by_test: vec![
                vec![
                    LogisticRamp {
                        total: 10_000.0,
                        midpoint_day: 25.0,
                        slope: 0.3,
                    },
                    LogisticRamp {
                        total: 90_000.0,
                        midpoint_day: 60.0,
                        slope: 0.15,
                    },
                ],
                vec![lateral_flow.scaled(antigen_share)],
                vec![lateral_flow.scaled(1.0 - antigen_share)],
            ],
        }
    }
}

fn check_share(antigen_share: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&antigen_share) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "testing.capacity.antigen_share",
            format!("{antigen_share} is not in [0, 1]"),
        ))
    }
}

impl TestCapacity for LogisticCapacity {
    fn capacity(&self, day: f64) -> Vec<f64> {
        self.ramps_by_test
            .iter()
            .map(|ramps| ramps.iter().map(|r| r.value(day)).sum())
            .collect()
    }
}

/// Capacity configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapacityChoice {
    England { antigen_share: f64 },
    Logistic { ramps_by_test: Vec<Vec<LogisticRamp>> },
    Constant { per_day: Vec<f64> },
}

impl Default for CapacityChoice {
    fn default() -> Self {
        CapacityChoice::England {
            antigen_share: DEFAULT_ANTIGEN_SHARE,
        }
    }
}

impl CapacityChoice {
    pub fn n_tests(&self) -> usize {
        match self {
            CapacityChoice::England { .. } => 3,
            CapacityChoice::Logistic { ramps_by_test } => ramps_by_test.len(),
            CapacityChoice::Constant { per_day } => per_day.len(),
        }
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        match self {
            CapacityChoice::England { antigen_share } => check_share(*antigen_share),
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Box<dyn TestCapacity> {
        match self {
            CapacityChoice::England { antigen_share } => {
                Box::new(LogisticCapacity::england_split(*antigen_share))
            }
            CapacityChoice::Logistic { ramps_by_test } => Box::new(LogisticCapacity {
                ramps_by_test: ramps_by_test.clone(),
            }),
            CapacityChoice::Constant { per_day } => Box::new(ConstantCapacity(per_day.clone())),
        }
    }
}

/// Tests per day assigned to each cell, per test type.
#[derive(Debug, Clone, PartialEq)]
pub struct TestAllocation {
    dims: Dims,
    per_test: Vec<Vec<f64>>,
}

impl TestAllocation {
    pub fn zeros(dims: Dims, n_tests: usize) -> Self {
        Self {
            dims,
            per_test: vec![vec![0.0; dims.n_cells()]; n_tests],
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn n_tests(&self) -> usize {
        self.per_test.len()
    }

    pub fn add(&mut self, test: usize, cell: Cell, tests: f64) {
        let i = self.dims.flat(cell);
        self.per_test[test][i] += tests;
    }

    pub fn get(&self, test: usize, cell: Cell) -> f64 {
        self.per_test[test][self.dims.flat(cell)]
    }

    pub fn total(&self, test: usize) -> f64 {
        self.per_test[test].iter().sum()
    }

    pub fn scale(&mut self, test: usize, factor: f64) {
        for v in self.per_test[test].iter_mut() {
            *v *= factor;
        }
    }

    fn per_cell(&self, test: usize) -> &[f64] {
        &self.per_test[test]
    }
}

/// Decides who is tested with which test, given current state and capacity.
pub trait TestingPolicy: Send + Sync {
    fn allocate(
        &self,
        time: &SimTime,
        state: &StateTensor,
        tests: &[TestSpec],
        capacity: &[f64],
    ) -> TestAllocation;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoTesting;

impl TestingPolicy for NoTesting {
    fn allocate(&self, _: &SimTime, state: &StateTensor, tests: &[TestSpec], _: &[f64]) -> TestAllocation {
        TestAllocation::zeros(state.dims(), tests.len())
    }
}

/// Tests symptomatic people with one test type: hospital patients first,
/// then symptomatic people in the community. Each tier is served in full or,
/// if capacity runs out, pro rata.
#[derive(Debug, Clone, Copy)]
pub struct SymptomaticFirst {
    pub test: usize,
}

impl TestingPolicy for SymptomaticFirst {
    fn allocate(
        &self,
        _time: &SimTime,
        state: &StateTensor,
        tests: &[TestSpec],
        capacity: &[f64],
    ) -> TestAllocation {
        let d = state.dims();
        let mut alloc = TestAllocation::zeros(d, tests.len());
        let (Some(spec), Some(cap)) = (tests.get(self.test), capacity.get(self.test)) else {
            return alloc;
        };

        let symptomatic_untested = |c: &Cell| {
            matches!(d.health_kind(c.health), HealthKind::Infected(s) if d.is_symptomatic_stage(s))
                && !spec.target.is_positive(c.test)
        };
        let tiers: [&[usize]; 2] = [&[iso::HOSPITALISED], &[iso::UNRESTRICTED, iso::STAFF]];

        let mut remaining = cap.max(0.0);
        for roles in tiers {
            let demand: Vec<(Cell, f64)> = d
                .cells()
                .filter(|c| roles.contains(&c.iso) && symptomatic_untested(c))
                .map(|c| (c, state.get(c).max(0.0)))
                .filter(|(_, n)| *n > 0.0)
                .collect();
            let total: f64 = demand.iter().map(|(_, n)| n).sum();
            if total <= 0.0 {
                continue;
            }
            let share = (remaining / total).min(1.0);
            for (c, n) in demand {
                alloc.add(self.test, c, n * share);
            }
            remaining -= total * share;
            if remaining <= 0.0 {
                break;
            }
        }
        alloc
    }
}

/// Spreads each listed test's capacity evenly over living people not yet
/// positive for its target, at most one test per person per day.
#[derive(Debug, Clone)]
pub struct MassTesting {
    pub tests: Vec<usize>,
}

impl TestingPolicy for MassTesting {
    fn allocate(
        &self,
        _time: &SimTime,
        state: &StateTensor,
        tests: &[TestSpec],
        capacity: &[f64],
    ) -> TestAllocation {
        let d = state.dims();
        let dead = d.dead();
        let mut alloc = TestAllocation::zeros(d, tests.len());
        for &j in &self.tests {
            let (Some(spec), Some(cap)) = (tests.get(j), capacity.get(j)) else {
                continue;
            };
            let eligible: Vec<(Cell, f64)> = d
                .cells()
                .filter(|c| c.health != dead && !spec.target.is_positive(c.test))
                .map(|c| (c, state.get(c).max(0.0)))
                .filter(|(_, n)| *n > 0.0)
                .collect();
            let total: f64 = eligible.iter().map(|(_, n)| n).sum();
            if total <= 0.0 {
                continue;
            }
            let share = (cap.max(0.0) / total).min(1.0);
            for (c, n) in eligible {
                alloc.add(j, c, n * share);
            }
        }
        alloc
    }
}

/// Testing policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestingPolicyChoice {
    None,
    SymptomaticFirst { test: usize },
    Mass { tests: Vec<usize> },
}

impl Default for TestingPolicyChoice {
    fn default() -> Self {
        TestingPolicyChoice::SymptomaticFirst { test: 0 }
    }
}

impl TestingPolicyChoice {
    pub fn check(&self, n_tests: usize) -> Result<(), ConfigError> {
        let used: Vec<usize> = match self {
            TestingPolicyChoice::None => Vec::new(),
            TestingPolicyChoice::SymptomaticFirst { test } => vec![*test],
            TestingPolicyChoice::Mass { tests } => tests.clone(),
        };
        match used.into_iter().find(|j| *j >= n_tests) {
            Some(j) => Err(ConfigError::invalid(
                "testing.policy",
                format!("test index {j} out of range, {n_tests} tests configured"),
            )),
            None => Ok(()),
        }
    }

    pub fn build(&self) -> Box<dyn TestingPolicy> {
        match self {
            TestingPolicyChoice::None => Box::new(NoTesting),
            TestingPolicyChoice::SymptomaticFirst { test } => {
                Box::new(SymptomaticFirst { test: *test })
            }
            TestingPolicyChoice::Mass { tests } => Box::new(MassTesting {
                tests: tests.clone(),
            }),
        }
    }
}

/// What to do when a policy asks for more tests than exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rationing {
    /// Scale every cell's allocation down by the same factor.
    #[default]
    Proportional,
    /// Fail the run with [`EngineError::CapacityExceeded`].
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestingParams {
    pub tests: Vec<TestSpec>,
    pub capacity: CapacityChoice,
    pub policy: TestingPolicyChoice,
    pub rationing: Rationing,
    /// Upper bound on tests per person per day in any cell.
    pub max_tests_per_person: f64,
}

impl Default for TestingParams {
    fn default() -> Self {
        Self {
            tests: vec![TestSpec::pcr(), TestSpec::antigen(), TestSpec::antibody()],
            capacity: CapacityChoice::default(),
            policy: TestingPolicyChoice::default(),
            rationing: Rationing::default(),
            max_tests_per_person: 1.0,
        }
    }
}

impl TestingParams {
    /// No tests at all.
    pub fn none() -> Self {
        Self {
            tests: Vec::new(),
            capacity: CapacityChoice::Constant {
                per_day: Vec::new(),
            },
            policy: TestingPolicyChoice::None,
            rationing: Rationing::default(),
            max_tests_per_person: 1.0,
        }
    }

    pub fn check(&self, dims: &Dims) -> Result<(), ConfigError> {
        for t in &self.tests {
            t.check(dims)?;
        }
        if self.capacity.n_tests() != self.tests.len() {
            return Err(ConfigError::invalid(
                "testing.capacity",
                format!(
                    "{} capacity entries for {} tests",
                    self.capacity.n_tests(),
                    self.tests.len()
                ),
            ));
        }
        self.capacity.check()?;
        self.policy.check(self.tests.len())?;
        if !(self.max_tests_per_person.is_finite() && self.max_tests_per_person > 0.0) {
            return Err(ConfigError::invalid(
                "testing.max_tests_per_person",
                format!("must be finite and > 0, got {}", self.max_tests_per_person),
            ));
        }
        Ok(())
    }
}

/// Turns a policy's test allocation into test-state transitions.
#[derive(Debug, Clone)]
pub struct TestingModel {
    dims: Dims,
    tests: Vec<TestSpec>,
    rationing: Rationing,
    max_tests_per_person: f64,
}

impl TestingModel {
    pub fn new(dims: Dims, params: &TestingParams) -> Result<Self, ConfigError> {
        params.check(&dims)?;
        Ok(Self {
            dims,
            tests: params.tests.clone(),
            rationing: params.rationing,
            max_tests_per_person: params.max_tests_per_person,
        })
    }

    pub fn tests(&self) -> &[TestSpec] {
        &self.tests
    }

    fn checked_capacity(&self, raw: Vec<f64>) -> Result<Vec<f64>, EngineError> {
        if raw.len() != self.tests.len() {
            return Err(ConfigError::invalid(
                "testing.capacity",
                format!("capacity has {} entries for {} tests", raw.len(), self.tests.len()),
            )
            .into());
        }
        if let Some((j, c)) = raw
            .iter()
            .enumerate()
            .find(|(_, c)| !c.is_finite() || **c < 0.0)
        {
            return Err(ConfigError::invalid(
                "testing.capacity",
                format!("capacity for '{}' must be finite and >= 0, got {c}", self.tests[j].name),
            )
            .into());
        }
        Ok(raw)
    }

    fn check_allocation(&self, alloc: &TestAllocation, day: f64) -> Result<(), EngineError> {
        let (want, got) = (self.dims, alloc.dims());
        let axes = [
            (Axis::Age, want.n_age, got.n_age),
            (Axis::Health, want.n_health(), got.n_health()),
            (Axis::Isolation, want.n_iso, got.n_iso),
            (Axis::Testing, want.n_test, got.n_test),
        ];
        if let Some((axis, expected, actual)) = axes.into_iter().find(|(_, e, a)| e != a) {
            return Err(ConfigError::AxisMismatch {
                what: "test allocation".to_string(),
                axis,
                expected,
                actual,
            }
            .into());
        }
        if alloc.n_tests() != self.tests.len() {
            return Err(ConfigError::invalid(
                "testing.policy",
                format!("allocation covers {} of {} tests", alloc.n_tests(), self.tests.len()),
            )
            .into());
        }
        for j in 0..alloc.n_tests() {
            for (i, n) in alloc.per_cell(j).iter().enumerate() {
                if !n.is_finite() {
                    return Err(EngineError::NonFinite {
                        quantity: "test allocation",
                        value: *n,
                        cell: self.dims.cell(i),
                        day,
                    });
                }
                if *n < 0.0 {
                    return Err(ConfigError::invalid(
                        "testing.policy",
                        format!("negative allocation {n} in cell {}", self.dims.cell(i)),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl RateModel for TestingModel {
    fn name(&self) -> &'static str {
        "testing"
    }

    fn axis(&self) -> Axis {
        Axis::Testing
    }

    fn contribute(&self, ctx: &StepContext<'_>, out: &mut RateTensor) -> Result<(), EngineError> {
        if !self.dims.has_testing() || self.tests.is_empty() {
            return Ok(());
        }
        let day = ctx.time.day;
        let capacity = self.checked_capacity(ctx.capacity.capacity(day))?;
        let mut alloc = ctx
            .testing_policy
            .allocate(&ctx.time, ctx.state, &self.tests, &capacity);
        self.check_allocation(&alloc, day)?;

        let dead = self.dims.dead();
        for (j, spec) in self.tests.iter().enumerate() {
            let requested = alloc.total(j);
            let cap = capacity[j];
            if requested > cap * (1.0 + 1e-12) {
                match self.rationing {
                    Rationing::Reject => {
                        return Err(EngineError::CapacityExceeded {
                            test: spec.name.clone(),
                            requested,
                            capacity: cap,
                            day,
                        })
                    }
                    Rationing::Proportional => alloc.scale(j, cap / requested),
                }
            }

            let mut consumed = 0.0;
            for (i, n) in alloc.per_cell(j).iter().enumerate() {
                let cell = self.dims.cell(i);
                let occupancy = ctx.state.as_slice()[i];
                if *n <= 0.0 || occupancy <= 0.0 || cell.health == dead {
                    continue;
                }
                let tau = (n / occupancy).min(self.max_tests_per_person);
                consumed += tau * occupancy;
                if let Some(to) = spec.target.positive_transition(cell.test) {
                    out.add(cell, cell.with_test(to), tau * spec.positive_by_health[cell.health])?;
                }
            }
            out.record_test_usage(TestUsage {
                test: j,
                name: spec.name.clone(),
                requested,
                consumed,
                capacity: cap,
            });
        }
        Ok(())
    }
}
