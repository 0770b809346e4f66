//! Stress command implementation.

use super::output::StressStats;
use super::{CliError, OutputFormat};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::time::Instant;
use tracing::warn;
use wavebattle::scenario::{random_scenario, run_scenario};

/// Execute the stress command.
///
/// # Errors
///
/// Returns an error if the progress bar or JSON output cannot be built.
pub(crate) fn execute(
    games: u64,
    seed: Option<u64>,
    threads: Option<usize>,
    format: OutputFormat,
    progress: bool,
) -> Result<(), CliError> {
    // Set thread pool size if specified
    if let Some(num_threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .ok(); // Ignore error if already initialized
    }

    let base_seed = seed.unwrap_or_else(|| {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() ^ u64::from(d.subsec_nanos()))
            .unwrap_or(42)
    });

    let pb = if progress {
        let pb = ProgressBar::new(games);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} battles ({per_sec})",
                )
                .map_err(|e| CliError::new(format!("Invalid progress template: {e}")))?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();

    // Each worker folds into its own stats; they are merged once at the end.
    let stats = (0..games)
        .into_par_iter()
        .fold(StressStats::default, |mut local, i| {
            let battle_seed = base_seed.wrapping_add(i);
            let scenario = random_scenario(battle_seed);
            match run_scenario(&scenario) {
                Ok(report) => local.add_report(&report, &scenario.players[0]),
                Err(err) => {
                    warn!(seed = battle_seed, %err, "battle failed");
                    local.add_failure(battle_seed);
                }
            }
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            local
        })
        .reduce(StressStats::default, |mut a, b| {
            a.merge(&b);
            a
        });

    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }

    let elapsed = start.elapsed().as_secs_f64();

    match format {
        OutputFormat::Text => {
            println!("Base seed: {base_seed}");
            println!();
            print!("{}", stats.format_text(elapsed));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    if stats.failures > 0 {
        return Err(CliError::new(format!(
            "{} of {} battles failed",
            stats.failures, stats.battles
        )));
    }

    Ok(())
}
