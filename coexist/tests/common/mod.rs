#![allow(dead_code)]

use coexist::io::{ContactMatrix, InputData, StaticData};
use coexist::{ArrivalsMode, Dims, ModelParams, Scenario, StateTensor, Trajectory};

/// Two age groups, one infected and one recovered stage, no isolation or
/// testing roles.
pub fn toy_dims() -> Dims {
    Dims {
        n_age: 2,
        n_infected: 1,
        n_symptomatic: 1,
        n_recovered: 1,
        n_iso: 1,
        n_test: 1,
    }
}

pub fn ones(n: usize) -> ContactMatrix {
    ContactMatrix::new(vec![vec![1.0; n]; n]).expect("ones matrix is symmetric")
}

pub fn toy_data(population: Vec<f64>) -> InputData {
    let n = population.len();
    InputData::uniform(population, ones(n))
}

/// SIR with transmission `beta`, recovery `gamma`, 100 people per age and
/// `seed` exposed in age 0.
pub fn toy_sir(beta: f64, gamma: f64, seed: f64, days: u32) -> Scenario {
    let mut params = ModelParams::neutral(toy_dims());
    params.total_days = days;
    params.infection.transmission_by_stage = vec![beta];
    params.progression.recovery_by_stage = vec![gamma];
    params.initial_exposed = vec![seed, 0.0];
    Scenario::new(params, &toy_data(vec![100.0, 100.0])).expect("toy scenario is valid")
}

pub fn england(days: u32) -> Scenario {
    let mut params = ModelParams::default();
    params.total_days = days;
    params.initial_exposed = vec![0.0, 0.0, 1000.0, 1000.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    Scenario::new(params, &StaticData::england().0).expect("england scenario is valid")
}

pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected} +/- {tol}, got {actual}"
    );
}

pub fn per_age_health(state: &StateTensor, health: usize) -> Vec<f64> {
    (0..state.dims().n_age)
        .map(|a| state.age_health_total(a, health))
        .collect()
}

/// Population is conserved, no occupancy or arrivals cell is negative on any
/// day, and with daily arrivals the inflow into Dead matches the rise in
/// deaths.
pub fn assert_mass_invariants(traj: &Trajectory, rel_tol: f64) {
    let first = &traj.records[0].state;
    let dims = first.dims();
    let age0: Vec<f64> = (0..dims.n_age).map(|a| first.age_total(a)).collect();
    for r in &traj.records {
        for (a, expected) in age0.iter().enumerate() {
            assert_close(r.state.age_total(a), *expected, rel_tol * expected.max(1.0));
        }
        if let Some(v) = r.state.as_slice().iter().find(|v| **v < 0.0) {
            panic!("negative occupancy {v} on day {}", r.day);
        }
        if let Some(v) = r.arrivals.as_slice().iter().find(|v| **v < 0.0) {
            panic!("negative arrivals {v} on day {}", r.day);
        }
    }
    if traj.arrivals_mode != ArrivalsMode::Daily {
        return;
    }
    for w in traj.records.windows(2) {
        for (a, n) in age0.iter().enumerate() {
            let rise = w[1].state.age_health_total(a, dims.dead())
                - w[0].state.age_health_total(a, dims.dead());
            let inflow = w[1].arrivals.age_health_total(a, dims.dead());
            assert_close(inflow, rise, rel_tol * n.max(1.0));
        }
    }
}
