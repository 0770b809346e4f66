//! Simulate command implementation.

use super::output::format_report_text;
use super::{CliError, OutputFormat};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use wavebattle::BattleSettings;
use wavebattle::registry::{EventSink, JsonLinesSink};
use wavebattle::scenario::{Scenario, ScenarioRunner};

/// Execute the simulate command.
///
/// # Errors
///
/// Returns an error if the scenario or settings cannot be loaded, or the
/// battle fails.
pub(crate) fn execute(
    scenario: PathBuf,
    config: Option<PathBuf>,
    format: OutputFormat,
    events: bool,
) -> Result<(), CliError> {
    let mut script = Scenario::load(&scenario)?;
    match config {
        Some(path) => script.settings = BattleSettings::load(Some(&path))?,
        None => {
            script.settings.apply_env(|var| std::env::var(var).ok())?;
            script.settings.validate()?;
        }
    }

    info!(
        scenario = %script.name,
        waves = script.settings.battle.wave_count,
        lanes = script.settings.battle.lane_count,
        "simulating"
    );

    let report = if events {
        let sink = JsonLinesSink::new(io::stdout());
        let mut runner = ScenarioRunner::new(script)?;
        let battle = runner.session().battle().id;
        while !runner.is_finished() {
            let outcome = runner.step()?;
            sink.publish(battle, &outcome.events);
        }
        sink.into_inner().flush()?;
        runner.report()
    } else {
        ScenarioRunner::new(script)?.run_to_end()?
    };

    match format {
        OutputFormat::Text => print!("{}", format_report_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(())
}
