use coexist::io::StaticData;
use coexist::{ModelParams, Scenario, Simulation};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // England defaults, lockdown from 23 March, 500 exposed people aged 20-39.
    let mut params = ModelParams::from_json_str(
        r#"{ "total_days": 120, "quarantine": { "social_distancing_start": "2020-03-23" } }"#,
    )?;
    params.initial_exposed = vec![0.0, 0.0, 250.0, 250.0, 0.0, 0.0, 0.0, 0.0, 0.0];

    let data = StaticData::england().0;
    let scenario = Scenario::new(params, &data)?;
    println!("# R0 = {:.2}", scenario.basic_reproduction_number());

    let traj = Simulation::new(scenario).run()?;
    let dead = traj.records[0].state.dims().dead();

    println!("day,date,infected,hospitalised,dead,substeps");
    for r in &traj.records {
        println!(
            "{},{},{:.0},{:.0},{:.0},{}",
            r.day,
            r.date,
            r.state.infected_total(),
            r.state.hospitalised_total(),
            r.state.health_total(dead),
            r.substeps
        );
    }

    Ok(())
}
