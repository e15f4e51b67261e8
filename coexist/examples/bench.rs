use std::time::Instant;

use coexist::io::StaticData;
use coexist::sweep::run_sweep;
use coexist::{ModelParams, Scenario, Simulation};

fn scenarios(n: usize) -> anyhow::Result<Vec<Scenario>> {
    let data = StaticData::england().0;
    (0..n)
        .map(|i| {
            let mut params = ModelParams::default();
            params.total_days = 90;
            // Spread the transmission scale to make the runs differ.
            let scale = 0.6 + 0.1 * i as f64;
            for beta in params.infection.transmission_by_stage.iter_mut() {
                *beta *= scale;
            }
            params.initial_exposed = vec![0.0, 0.0, 500.0, 500.0, 0.0, 0.0, 0.0, 0.0, 0.0];
            Ok(Scenario::new(params, &data)?)
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let n = 8;

    let t_start = Instant::now();
    for s in scenarios(n)? {
        Simulation::new(s).run()?;
    }
    let serial = t_start.elapsed();

    let t_start2 = Instant::now();
    let results = run_sweep(scenarios(n)?);
    let parallel = t_start2.elapsed();
    for r in results {
        r?;
    }

    println!("scenarios,serial_ms,parallel_ms,speedup_x");
    let s_ms = serial.as_secs_f64() * 1000.0;
    let p_ms = parallel.as_secs_f64() * 1000.0;
    println!("{},{:.3},{:.3},{:.2}", n, s_ms, p_ms, s_ms.max(1e-9) / p_ms.max(1e-9));

    Ok(())
}
