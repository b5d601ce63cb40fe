#![warn(clippy::unwrap_used, clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]
use std::path::PathBuf;

use color_eyre::eyre::{self, OptionExt, WrapErr};
use orbsim::{system::Snapshot, SolarSystem};
use scenario::Scenario;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod report;
mod scenario;

fn handle<T>(f: impl FnOnce() -> eyre::Result<T>) -> Option<T> {
    match f() {
        Ok(v) => Some(v),
        Err(e) => {
            error!("{:#}", e);
            None
        }
    }
}

fn run(scenario: &Scenario, system: &mut SolarSystem, all: bool) -> eyre::Result<Snapshot> {
    let step = scenario.step();
    let unit = system.config().length_unit_m;
    let mut epoch = scenario.epoch();

    system
        .update(epoch, time::Duration::ZERO)
        .wrap_err("failed to place bodies")?;
    report::log(&system.snapshot(), true, unit);

    for tick in 0..scenario.steps {
        for command in scenario.due(tick) {
            handle(|| {
                command
                    .action
                    .apply(system, &command.ship)
                    .wrap_err_with(|| format!("tick {tick}: {:?} on {}", command.action, command.ship))
            });
        }
        system
            .update(epoch, step)
            .wrap_err_with(|| format!("tick {tick} at {epoch} failed"))?;
        epoch += step;
        if (tick + 1) % scenario.report_every == 0 {
            report::log(&system.snapshot(), all, unit);
        }
    }
    Ok(system.snapshot())
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args_os().skip(1);
    let path = PathBuf::from(args.next().ok_or_eyre("usage: orbsim <scenario.toml> [snapshot.ron] [--all]")?);
    let mut output = None;
    let mut all = false;
    for arg in args {
        if arg == "--all" {
            all = true;
        } else {
            output = Some(PathBuf::from(arg));
        }
    }

    let scenario = Scenario::load(&path)?;
    let mut system = scenario.build()?;
    info!(
        "running {} steps of {} s from {}",
        scenario.steps,
        scenario.step_seconds,
        scenario.epoch()
    );
    let snapshot = run(&scenario, &mut system, all)?;

    if let Some(output) = output {
        let text = ron::ser::to_string_pretty(&snapshot, ron::ser::PrettyConfig::default())?;
        std::fs::write(&output, text)
            .wrap_err_with(|| format!("failed to write {}", output.display()))?;
        info!("wrote final snapshot to {}", output.display());
    }
    Ok(())
}
