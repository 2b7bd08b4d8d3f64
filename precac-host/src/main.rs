use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use miette::{IntoDiagnostic, Result};
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};

use precac_host::config::HostConfig;
use precac_host::executor::Executor;
use precac_host::scenario::Scenario;
use precac_host::{Cli, TimeScale};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let scale = TimeScale::new(cli.time_scale).into_diagnostic()?;
    let config = HostConfig::load(&cli.config).into_diagnostic()?;
    let scenario = match &cli.scenario {
        Some(path) => {
            let scenario = Scenario::load(path).into_diagnostic()?;
            scenario.validate(config.radios.len()).into_diagnostic()?;
            Some(scenario)
        }
        None => None,
    };

    let chip = Arc::new(config.build_chip().into_diagnostic()?);
    info!(
        "Chip ready: {} radio(s), agile mode {}",
        chip.radio_count(),
        chip.config().mode
    );

    let executor = Executor::new(chip.clone(), scale);
    let handle = executor.handle();
    let scenario_chip = chip.clone();

    Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("executor", move |s| executor.run(s)));
        if let Some(scenario) = scenario {
            s.start(SubsystemBuilder::new("scenario", move |s| {
                scenario.run(scenario_chip, handle, scale, s)
            }));
        }
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await?;

    if cli.dump {
        for radio in 0..chip.radio_count() {
            match chip.dump(radio) {
                Ok(lines) => {
                    for line in lines {
                        println!("{}", line);
                    }
                }
                Err(e) => warn!("Cannot dump radio {}: {}", radio, e),
            }
        }
    }
    Ok(())
}
