//! Settings validation command implementation.

use super::CliError;
use std::path::PathBuf;
use wavebattle::BattleSettings;

/// Execute the validate-config command.
///
/// # Errors
///
/// Returns an error if the settings cannot be read or are invalid.
pub(crate) fn execute(path: Option<PathBuf>) -> Result<(), CliError> {
    match &path {
        Some(path) => println!("Validating: {}", path.display()),
        None => println!("Validating: built-in settings"),
    }
    println!();

    let settings = match BattleSettings::load(path.as_deref()) {
        Ok(settings) => {
            print_check("parse and environment overrides", true);
            print_check("value ranges", true);
            settings
        }
        Err(e) => {
            print_check("settings", false);
            return Err(e.into());
        }
    };

    let battle = &settings.battle;
    let timing = &settings.timing;
    println!();
    println!("Summary:");
    println!("  Waves:            {}", battle.wave_count);
    println!("  Lanes:            {}", battle.lane_count);
    println!("  Wave interval:    {}s", battle.wave_interval);
    println!("  Combat budget:    {}ms", settings.combat_budget_ms());
    println!("  Tick:             {}ms", timing.tick_ms());
    println!("  Max duration:     {}ms", timing.max_duration_ms());
    println!("  Deploys per wave: {}", timing.deployment_lanes);
    println!(
        "  Flags:            cross-lane={} ranged-support={} early-deployment={}",
        battle.allow_cross_lane_movement,
        battle.allow_ranged_support,
        battle.early_deployment_enabled
    );
    if let Some(threads) = settings.runtime.worker_threads {
        println!("  Worker threads:   {threads}");
    }

    println!();
    println!("Validation successful!");

    Ok(())
}

fn print_check(name: &str, ok: bool) {
    let status = if ok { "OK" } else { "FAILED" };
    let symbol = if ok { "✓" } else { "✗" };
    println!("  {symbol} {name}: {status}");
}
