use anyhow::Context;

use crate::dims::HealthKind;
use crate::state::StateTensor;
use crate::trajectory::Trajectory;

/// Arrivals into the first infected stage.
fn new_infections(arrivals: &StateTensor) -> f64 {
    let dims = arrivals.dims();
    dims.cells()
        .filter(|c| dims.health_kind(c.health) == HealthKind::Infected(0))
        .map(|c| arrivals.get(c))
        .sum()
}

/// Write per-day totals of a trajectory to `<out_dir>/coexist_<run_id>.txt`
/// for external reporting.
pub fn write_trajectory_log(
    out_dir: impl AsRef<std::path::Path>,
    run_id: &str,
    trajectory: &Trajectory,
) -> anyhow::Result<std::path::PathBuf> {
    use std::io::Write;

    std::fs::create_dir_all(out_dir.as_ref()).context("create logs dir failed")?;
    let path = out_dir.as_ref().join(format!("coexist_{}.txt", run_id));
    let mut f = std::fs::File::create(&path)
        .with_context(|| format!("create trajectory log file failed (path={:?})", path))?;

    writeln!(f, "run_id={}", run_id)?;
    writeln!(f, "start_date={}", trajectory.start_date)?;
    writeln!(f, "days={}", trajectory.records.len().saturating_sub(1))?;
    writeln!(f)?;
    writeln!(f, "day,date,population,infected,hospitalised,dead,new_infections")?;

    for r in &trajectory.records {
        let dims = r.state.dims();
        writeln!(
            f,
            "{},{},{:.3},{:.3},{:.3},{:.3},{:.3}",
            r.day,
            r.date,
            r.state.total(),
            r.state.infected_total(),
            r.state.hospitalised_total(),
            r.state.health_total(dims.dead()),
            new_infections(&r.arrivals)
        )?;
    }

    Ok(path)
}
