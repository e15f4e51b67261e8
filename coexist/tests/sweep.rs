mod common;

use coexist::sweep::run_sweep;
use coexist::dims::{Cell, SUSCEPTIBLE};
use coexist::model::{RateModel, StepContext};
use coexist::{Axis, EngineError, RateTensor, Simulation};

#[test]
fn sweep_matches_serial_runs_in_order() {
    let betas = [0.0, 0.5, 3.0];
    let serial: Vec<_> = betas
        .iter()
        .map(|b| Simulation::new(common::toy_sir(*b, 0.5, 1.0, 15)).run().expect("run"))
        .collect();
    let parallel = run_sweep(betas.iter().map(|b| common::toy_sir(*b, 0.5, 1.0, 15)).collect());

    assert_eq!(parallel.len(), serial.len());
    for (p, s) in parallel.into_iter().zip(serial) {
        assert_eq!(p.expect("run"), s);
    }
}

/// Sends the recovered back to susceptible, which the rate tensor refuses.
struct Relapse;

impl RateModel for Relapse {
    fn name(&self) -> &'static str {
        "relapse"
    }

    fn axis(&self) -> Axis {
        Axis::Health
    }

    fn contribute(&self, ctx: &StepContext<'_>, out: &mut RateTensor) -> Result<(), EngineError> {
        let r = Cell::new(0, ctx.state.dims().recovered(0), 0, 0);
        out.add(r, r.with_health(SUSCEPTIBLE), 0.1)
    }
}

#[test]
fn failing_scenario_does_not_spoil_the_sweep() {
    let scenarios = vec![
        common::toy_sir(3.0, 0.5, 1.0, 10),
        common::toy_sir(3.0, 0.5, 1.0, 10).with_models(vec![Box::new(Relapse)]),
        common::toy_sir(1.0, 0.5, 1.0, 10),
    ];
    let results = run_sweep(scenarios);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().expect("first run").len(), 11);
    assert!(matches!(
        results[1],
        Err(EngineError::ForbiddenTransition { model: "relapse", .. })
    ));
    assert_eq!(results[2].as_ref().expect("third run").len(), 11);
}
