use rayon::prelude::*;

use crate::engine::Simulation;
use crate::error::EngineError;
use crate::scenario::Scenario;
use crate::trajectory::Trajectory;

/// Run independent scenarios in parallel. Results come back in input order;
/// a failing run leaves the others untouched.
pub fn run_sweep(scenarios: Vec<Scenario>) -> Vec<Result<Trajectory, EngineError>> {
    tracing::info!(
        scenarios = scenarios.len(),
        threads = rayon::current_num_threads(),
        "starting sweep"
    );
    scenarios
        .into_par_iter()
        .enumerate()
        .map(|(i, scenario)| {
            let _span = tracing::info_span!("scenario", index = i).entered();
            let result = Simulation::new(scenario).run();
            if let Err(e) = &result {
                tracing::warn!(index = i, error = %e, "scenario failed");
            }
            result
        })
        .collect()
}
