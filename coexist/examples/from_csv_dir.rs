use coexist::io::debug_log::write_trajectory_log;
use coexist::io::CsvDataDir;
use coexist::{ModelParams, Scenario, Simulation};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Input directory with population.csv, age_rates.csv and contact_*.csv.
    // You can override with COEXIST_DATA_DIR / COEXIST_OPTIONS env vars.
    let dir = std::env::var("COEXIST_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let params = match std::env::var("COEXIST_OPTIONS") {
        Ok(path) => ModelParams::from_json_str(&std::fs::read_to_string(path)?)?,
        Err(_) => ModelParams::default(),
    };
    let symmetrize = std::env::var("COEXIST_SYMMETRIZE").is_ok_and(|v| v == "1");

    let provider = CsvDataDir {
        symmetrize,
        ..CsvDataDir::new(dir)
    };
    let scenario = Scenario::from_provider(params, &provider)?;
    let traj = Simulation::new(scenario).run()?;

    let path = write_trajectory_log("logs", "csv-dir", &traj)?;
    println!("wrote {}", path.display());

    Ok(())
}
