mod common;

use chrono::NaiveDate;

use coexist::dims::{iso, test_state, Cell, SUSCEPTIBLE};
use coexist::io::ContactMatrix;
use coexist::model::hospital::{equilibrium_ratio, HospitalParams, HospitalisationModel};
use coexist::model::infection::{ContactRegimes, InfectionModel, InfectionParams};
use coexist::model::progression::{ProgressionModel, ProgressionParams};
use coexist::model::testing::{
    CapacityChoice, ConstantCapacity, LogisticCapacity, LogisticRamp, MassTesting, NoTesting,
    Rationing, TestAllocation,
    TestCapacity, TestSpec, TestTarget, TestingModel, TestingParams, TestingPolicy,
    TestingPolicyChoice,
};
use coexist::model::{RateModel, StepContext};
use coexist::policy::{
    HospitalOccupancyTrigger, QuarantineDecision, QuarantinePolicy, ScheduledQuarantine, SimTime,
};
use coexist::{Axis, ConfigError, Dims, EngineError, RateComposer, RateTensor, StateTensor};

use common::assert_close;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 3, 1).expect("valid date")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Compose `model` alone against `state` at day 0.
fn compose_one(
    model: impl RateModel + 'static,
    state: &StateTensor,
    quarantine: QuarantineDecision,
    policy: &dyn TestingPolicy,
    capacity: &dyn TestCapacity,
) -> Result<RateTensor, EngineError> {
    let composer = RateComposer::new(vec![Box::new(model)]);
    let ctx = StepContext {
        time: SimTime::new(start(), 0.0),
        state,
        quarantine,
        testing_policy: policy,
        capacity,
    };
    let mut out = RateTensor::new(state.dims());
    composer.compose(&ctx, &mut out)?;
    Ok(out)
}

#[test]
fn progression_reach_and_durations() {
    let dims = Dims {
        n_age: 1,
        n_infected: 2,
        n_symptomatic: 1,
        n_recovered: 1,
        n_iso: 1,
        n_test: 1,
    };
    let params = ProgressionParams {
        forward_by_stage: vec![0.5, 0.0],
        recovery_by_stage: vec![0.5, 0.25],
        death_by_stage: vec![0.0, 0.25],
        antibody_maturation: vec![],
    };
    let model = ProgressionModel::new(dims, &params, &[0.0], &[0.0]).expect("valid");
    assert_eq!(model.reach_probabilities(0), vec![1.0, 0.5]);
    assert_eq!(model.mean_stage_durations(0), vec![1.0, 2.0]);
}

#[test]
fn age_adjustments_scale_progression_rates() {
    let dims = Dims {
        n_age: 2,
        n_infected: 1,
        n_symptomatic: 1,
        n_recovered: 1,
        n_iso: 1,
        n_test: 1,
    };
    let params = ProgressionParams {
        forward_by_stage: vec![0.0],
        recovery_by_stage: vec![0.2],
        death_by_stage: vec![0.1],
        antibody_maturation: vec![],
    };
    // Risks below -1 floor the factor at zero.
    let model = ProgressionModel::new(dims, &params, &[-2.0, 1.0], &[0.5, 0.0]).expect("valid");
    assert_close(model.exit_rate(0, 0), 0.3, 1e-15);
    assert_close(model.exit_rate(1, 0), 0.2 + 0.2, 1e-15);
}

#[test]
fn hospital_equilibrium_ratio() {
    let r = equilibrium_ratio(&[0.01, 0.0, 0.5], &[0.09, 0.0, 0.5]);
    assert_close(r[0], 0.1, 1e-15);
    assert_eq!(r[1], 0.0);
    assert_close(r[2], 0.5, 1e-15);
}

fn ward_dims() -> Dims {
    Dims {
        n_age: 1,
        n_infected: 1,
        n_symptomatic: 1,
        n_recovered: 1,
        n_iso: 3,
        n_test: 4,
    }
}

fn ward_model(dims: Dims) -> HospitalisationModel {
    let params = HospitalParams {
        covid_admission_by_stage: vec![0.2],
        case_isolation_rate: 1.0,
        case_isolation_release_rate: 0.5,
    };
    HospitalisationModel::new(dims, &params, &[0.01], &[0.1], &[1.0]).expect("valid")
}

#[test]
fn admission_rates_by_health() {
    let dims = ward_dims();
    let model = ward_model(dims);
    assert_eq!(model.admission_rate(0, SUSCEPTIBLE), Some(0.01));
    assert_close(model.admission_rate(0, dims.infected(0)).expect("alive"), 0.41, 1e-15);
    assert_eq!(model.admission_rate(0, dims.dead()), None);
}

#[test]
fn infected_patients_are_not_discharged() {
    let dims = ward_dims();
    let state = StateTensor::new_zero(dims);
    let rates = compose_one(
        ward_model(dims),
        &state,
        QuarantineDecision::default(),
        &NoTesting,
        &ConstantCapacity(vec![]),
    )
    .expect("compose");

    let s = Cell::new(0, SUSCEPTIBLE, iso::HOSPITALISED, test_state::NEGATIVE);
    let i = s.with_health(dims.infected(0));
    let r = s.with_health(dims.recovered(0));
    assert_eq!(rates.rate(s, s.with_iso(iso::UNRESTRICTED)), 0.1);
    assert_eq!(rates.rate(r, r.with_iso(iso::UNRESTRICTED)), 0.1);
    assert_eq!(rates.rate(i, i.with_iso(iso::UNRESTRICTED)), 0.0);
    assert_close(rates.rate(i.with_iso(iso::UNRESTRICTED), i), 0.41, 1e-15);
    assert_close(rates.rate(i.with_iso(iso::CASE_ISOLATED), i), 0.41, 1e-15);
}

#[test]
fn case_isolation_follows_the_decision() {
    let dims = ward_dims();
    let state = StateTensor::new_zero(dims);
    let home = Cell::new(0, dims.infected(0), iso::UNRESTRICTED, test_state::VIRUS);
    let untested = home.with_test(test_state::NEGATIVE);
    let recovered = Cell::new(0, dims.recovered(0), iso::CASE_ISOLATED, test_state::VIRUS);

    for active in [false, true] {
        let decision = QuarantineDecision {
            distancing: false,
            case_isolation: active,
        };
        let rates = compose_one(
            ward_model(dims),
            &state,
            decision,
            &NoTesting,
            &ConstantCapacity(vec![]),
        )
        .expect("compose");
        let expected = if active { 1.0 } else { 0.0 };
        assert_eq!(rates.rate(home, home.with_iso(iso::CASE_ISOLATED)), expected);
        assert_eq!(rates.rate(untested, untested.with_iso(iso::CASE_ISOLATED)), 0.0);
        // Release never depends on the decision.
        assert_eq!(rates.rate(recovered, recovered.with_iso(iso::UNRESTRICTED)), 0.5);
    }
}

fn four_role_dims() -> Dims {
    Dims {
        n_age: 1,
        n_infected: 1,
        n_symptomatic: 1,
        n_recovered: 1,
        n_iso: 4,
        n_test: 1,
    }
}

fn matrix(v: f64) -> ContactMatrix {
    ContactMatrix::new(vec![vec![v]]).expect("1x1 is symmetric")
}

#[test]
fn force_of_infection_by_role() {
    let dims = four_role_dims();
    let params = InfectionParams {
        transmission_by_stage: vec![0.5],
        hospital_mixing_ratio: 1.0,
    };
    let contacts = ContactRegimes {
        baseline: matrix(2.0),
        distancing: matrix(1.0),
        isolation: matrix(0.5),
    };
    let model = InfectionModel::new(dims, &params, contacts, &[1.0]).expect("valid");
    assert_close(model.hospital_mixing(), 2.0, 1e-15);

    let mut state = StateTensor::new_zero(dims);
    let s = Cell::new(0, SUSCEPTIBLE, iso::UNRESTRICTED, test_state::NEGATIVE);
    let i = s.with_health(dims.infected(0));
    state.set(s, 90.0);
    state.set(i, 10.0);
    state.set(s.with_iso(iso::HOSPITALISED), 5.0);
    state.set(i.with_iso(iso::HOSPITALISED), 5.0);

    let pressure = 0.5 * 10.0 / 110.0;
    assert_close(model.community_pressure(&state)[0], pressure, 1e-15);
    assert_close(model.hospital_pressure(&state), 2.0 * 0.5 * 5.0 / 10.0, 1e-15);

    let open = model.force_of_infection(&state, QuarantineDecision::default());
    assert_close(open[iso::UNRESTRICTED][0], 2.0 * pressure, 1e-15);
    assert_close(open[iso::CASE_ISOLATED][0], 0.5 * pressure, 1e-15);
    assert_close(open[iso::HOSPITALISED][0], 0.5, 1e-15);
    assert_close(open[iso::STAFF][0], 2.0 * pressure + 0.5, 1e-15);

    let distanced = model.force_of_infection(
        &state,
        QuarantineDecision {
            distancing: true,
            case_isolation: false,
        },
    );
    assert_close(distanced[iso::UNRESTRICTED][0], pressure, 1e-15);
    assert_close(distanced[iso::STAFF][0], open[iso::STAFF][0], 1e-15);
}

fn tested_dims() -> Dims {
    Dims {
        n_age: 1,
        n_infected: 1,
        n_symptomatic: 1,
        n_recovered: 1,
        n_iso: 1,
        n_test: 4,
    }
}

fn swab() -> TestSpec {
    TestSpec {
        name: "swab".to_string(),
        target: TestTarget::Virus,
        positive_by_health: vec![0.0, 0.9, 0.0, 0.0],
    }
}

fn testing_params(rationing: Rationing) -> TestingParams {
    TestingParams {
        tests: vec![swab()],
        capacity: CapacityChoice::Constant {
            per_day: vec![100.0],
        },
        policy: TestingPolicyChoice::Mass { tests: vec![0] },
        rationing,
        max_tests_per_person: 1.0,
    }
}

fn tested_population() -> StateTensor {
    let dims = tested_dims();
    let mut state = StateTensor::new_zero(dims);
    let s = Cell::new(0, SUSCEPTIBLE, 0, test_state::NEGATIVE);
    state.set(s, 900.0);
    state.set(s.with_health(dims.infected(0)), 100.0);
    state
}

#[test]
fn mass_testing_spreads_capacity_evenly() {
    let dims = tested_dims();
    let state = tested_population();
    let model = TestingModel::new(dims, &testing_params(Rationing::Proportional)).expect("valid");
    let rates = compose_one(
        model,
        &state,
        QuarantineDecision::default(),
        &MassTesting { tests: vec![0] },
        &ConstantCapacity(vec![100.0]),
    )
    .expect("compose");

    let i = Cell::new(0, dims.infected(0), 0, test_state::NEGATIVE);
    assert_close(rates.rate(i, i.with_test(test_state::VIRUS)), 0.09, 1e-15);
    // No false positives from this test.
    let s = i.with_health(SUSCEPTIBLE);
    assert_eq!(rates.rate(s, s.with_test(test_state::VIRUS)), 0.0);

    let usage = &rates.test_usage()[0];
    assert_eq!(usage.name, "swab");
    assert_close(usage.requested, 100.0, 1e-9);
    assert_close(usage.consumed, 100.0, 1e-9);
}

/// Asks for twice the capacity, all of it on the infected cell.
struct Greedy;

impl TestingPolicy for Greedy {
    fn allocate(
        &self,
        _time: &SimTime,
        state: &StateTensor,
        tests: &[TestSpec],
        capacity: &[f64],
    ) -> TestAllocation {
        let dims = state.dims();
        let mut alloc = TestAllocation::zeros(dims, tests.len());
        let i = Cell::new(0, dims.infected(0), 0, test_state::NEGATIVE);
        alloc.add(0, i, 2.0 * capacity[0]);
        alloc
    }
}

#[test]
fn over_allocation_is_rationed_or_rejected() {
    let dims = tested_dims();
    let state = tested_population();

    let model = TestingModel::new(dims, &testing_params(Rationing::Reject)).expect("valid");
    let err = compose_one(
        model,
        &state,
        QuarantineDecision::default(),
        &Greedy,
        &ConstantCapacity(vec![100.0]),
    )
    .unwrap_err();
    match err {
        EngineError::CapacityExceeded {
            test,
            requested,
            capacity,
            ..
        } => {
            assert_eq!(test, "swab");
            assert_eq!(requested, 200.0);
            assert_eq!(capacity, 100.0);
        }
        other => panic!("unexpected {other:?}"),
    }

    let model = TestingModel::new(dims, &testing_params(Rationing::Proportional)).expect("valid");
    let rates = compose_one(
        model,
        &state,
        QuarantineDecision::default(),
        &Greedy,
        &ConstantCapacity(vec![100.0]),
    )
    .expect("compose");
    let usage = &rates.test_usage()[0];
    assert_eq!(usage.requested, 200.0);
    assert!(usage.consumed <= usage.capacity + 1e-9);
    let i = Cell::new(0, dims.infected(0), 0, test_state::NEGATIVE);
    assert_close(rates.rate(i, i.with_test(test_state::VIRUS)), 0.9, 1e-12);
}

#[test]
fn mass_testing_allocates_by_occupancy() {
    let dims = tested_dims();
    let state = tested_population();
    let alloc = MassTesting { tests: vec![0] }.allocate(
        &SimTime::new(start(), 0.0),
        &state,
        &[swab()],
        &[100.0],
    );
    let s = Cell::new(0, SUSCEPTIBLE, 0, test_state::NEGATIVE);
    assert_close(alloc.get(0, s), 90.0, 1e-12);
    assert_close(alloc.get(0, s.with_health(dims.infected(0))), 10.0, 1e-12);
    assert_eq!(alloc.get(0, s.with_health(dims.dead())), 0.0);
    assert_close(alloc.total(0), 100.0, 1e-12);
}

/// Sizes its allocation for a population with an extra age group.
struct WrongShape;

impl TestingPolicy for WrongShape {
    fn allocate(
        &self,
        _time: &SimTime,
        state: &StateTensor,
        tests: &[TestSpec],
        _capacity: &[f64],
    ) -> TestAllocation {
        let dims = Dims {
            n_age: state.dims().n_age + 9,
            ..state.dims()
        };
        TestAllocation::zeros(dims, tests.len())
    }
}

#[test]
fn allocation_shaped_for_other_dims_is_rejected() {
    let dims = tested_dims();
    let model = TestingModel::new(dims, &testing_params(Rationing::Proportional)).expect("valid");
    let err = compose_one(
        model,
        &tested_population(),
        QuarantineDecision::default(),
        &WrongShape,
        &ConstantCapacity(vec![100.0]),
    )
    .unwrap_err();
    match err {
        EngineError::Config(ConfigError::AxisMismatch {
            axis,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(axis, Axis::Age);
            assert_eq!(expected, 1);
            assert_eq!(actual, 10);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn lateral_flow_production_is_shared() {
    let ramp = LogisticRamp {
        total: 0.5e6,
        midpoint_day: 100.0,
        slope: 0.1,
    };
    for share in [0.0, 0.3, 0.5, 1.0] {
        let capacity = LogisticCapacity::england(share).expect("share in range");
        for day in [0.0, 100.0, 10_000.0] {
            let cap = capacity.capacity(day);
            assert_eq!(cap.len(), 3);
            assert_close(cap[1] + cap[2], ramp.value(day), 1e-6);
            assert_close(cap[1], share * ramp.value(day), 1e-6);
        }
    }
    let late = LogisticCapacity::england(0.5).expect("valid").capacity(10_000.0);
    assert_close(late[0], 100_000.0, 1e-6);
    assert_close(late[1] + late[2], 500_000.0, 1e-6);

    let default = CapacityChoice::default();
    assert_eq!(default.n_tests(), 3);
    assert_eq!(
        default.build().capacity(10_000.0),
        LogisticCapacity::england(0.5).expect("valid").capacity(10_000.0)
    );
}

#[test]
fn antigen_share_outside_unit_interval_is_rejected() {
    for share in [-0.1, 1.5, f64::NAN] {
        assert!(matches!(
            LogisticCapacity::england(share),
            Err(ConfigError::InvalidValue { .. })
        ));
        let params = TestingParams {
            capacity: CapacityChoice::England {
                antigen_share: share,
            },
            ..TestingParams::default()
        };
        assert!(params.check(&Dims::default()).is_err(), "share {share}");
    }
}

#[test]
fn capacity_of_wrong_length_is_rejected() {
    let dims = tested_dims();
    let model = TestingModel::new(dims, &testing_params(Rationing::Proportional)).expect("valid");
    let err = compose_one(
        model,
        &tested_population(),
        QuarantineDecision::default(),
        &MassTesting { tests: vec![0] },
        &ConstantCapacity(vec![100.0, 5.0]),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Config(_)), "{err:?}");
}

#[test]
fn scheduled_quarantine_switches_on_its_date() {
    let policy = ScheduledQuarantine {
        social_distancing_start: Some(date(2020, 3, 23)),
        case_isolation_start: None,
    };
    let state = StateTensor::new_zero(Dims::default());

    let before = policy.decide(&SimTime::new(start(), 21.5), &state);
    assert!(!before.distancing);
    let on = policy.decide(&SimTime::new(start(), 22.0), &state);
    assert!(on.distancing);
    assert!(!on.case_isolation);
    assert_eq!(SimTime::new(start(), 22.0).date(), date(2020, 3, 23));
}

#[test]
fn hospital_occupancy_triggers_distancing() {
    let policy = HospitalOccupancyTrigger {
        threshold: 10.0,
        schedule: ScheduledQuarantine::default(),
    };
    let dims = Dims::default();
    let mut state = StateTensor::new_zero(dims);
    let now = SimTime::new(start(), 3.0);
    assert_eq!(policy.decide(&now, &state), QuarantineDecision::default());

    state.set(
        Cell::new(4, SUSCEPTIBLE, iso::HOSPITALISED, test_state::NEGATIVE),
        50.0,
    );
    assert!(policy.decide(&now, &state).distancing);

    // Staff do not count as occupancy.
    let mut staffed = StateTensor::new_zero(dims);
    staffed.set(Cell::new(4, SUSCEPTIBLE, iso::STAFF, test_state::NEGATIVE), 50.0);
    assert!(!policy.decide(&now, &staffed).distancing);
}
