mod bootstrap;
mod scenarios;
mod snapshot;

use tracing::{error, info};

use bootstrap::DemoError;

fn main() {
    if let Err(err) = run() {
        error!(error = %err, "demo_failed");
        std::process::exit(1);
    }
}

fn run() -> Result<(), DemoError> {
    let options = bootstrap::build_options()?;
    if let Some(dir) = &options.snapshot_dir {
        std::fs::create_dir_all(dir).map_err(|source| DemoError::SnapshotDir {
            path: dir.clone(),
            source,
        })?;
    }

    let catalogue = scenarios::all();
    let selected = scenarios::select(&catalogue, &options.scenario_filter)?;
    let mut reports = Vec::with_capacity(selected.len());
    for scenario in selected {
        reports.push(scenarios::run(
            scenario,
            &options.config,
            options.snapshot_dir.as_deref(),
        )?);
    }

    if options.json_report {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    let failed = reports.iter().filter(|report| !report.passed).count();
    info!(total = reports.len(), failed, "demo_finished");
    if failed > 0 {
        return Err(DemoError::ScenariosFailed {
            failed,
            total: reports.len(),
        });
    }
    Ok(())
}
