//! Output formatting utilities for CLI.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use wavebattle::scenario::ScenarioReport;
use wavebattle::{FinishReason, PlayerId};

/// Format a scenario report as human-readable text.
#[allow(clippy::cast_precision_loss)]
pub(super) fn format_report_text(report: &ScenarioReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Battle Result ({})", report.name);
    match (&report.winner, report.finish_reason) {
        (Some(winner), Some(reason)) => {
            let _ = writeln!(output, "  Winner: {winner} ({reason})");
        }
        (None, Some(reason)) => {
            let _ = writeln!(output, "  Winner: Draw ({reason})");
        }
        (_, None) => output.push_str("  Winner: still running\n"),
    }
    let _ = writeln!(
        output,
        "  Waves: {} ({} drawing phases)",
        report.waves_played, report.drawing_phases
    );
    let _ = writeln!(
        output,
        "  Duration: {:.1}s over {} ticks",
        report.duration_ms as f64 / 1000.0,
        report.steps
    );
    let _ = writeln!(
        output,
        "  Control: player1 {:.2}% / player2 {:.2}%\n",
        report.final_control.player1.percent(),
        report.final_control.player2.percent()
    );

    for lane in &report.lanes {
        let _ = write!(
            output,
            "  Lane {}: {} {}",
            lane.index,
            control_bar(lane.player1, lane.player2, 30),
            format_args!("{:.2}% / {:.2}%", lane.player1, lane.player2)
        );
        match lane.owner {
            Some(owner) if lane.closed => {
                let _ = write!(output, " [closed by {owner}]");
            }
            _ => {}
        }
        output.push('\n');
    }

    if !report.rejections.is_empty() {
        output.push_str("\n  Rejected deployments:\n");
        for rejection in &report.rejections {
            let _ = writeln!(
                output,
                "    wave {} {} lane {}: {} ({})",
                rejection.wave, rejection.player, rejection.lane, rejection.message, rejection.code
            );
        }
    }

    output.push_str("\n  Events:\n");
    for (name, count) in &report.event_counts {
        let _ = writeln!(output, "    {name:<26} {count}");
    }

    output
}

/// Render a lane as `[###.....---]`: player 1 from the left, player 2 from the right.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub(super) fn control_bar(player1: f64, player2: f64, width: usize) -> String {
    let cells = |percent: f64| -> usize {
        let cells = (percent / 100.0 * width as f64).round();
        (cells.max(0.0) as usize).min(width)
    };
    let left = cells(player1);
    let right = cells(player2).min(width - left);
    let neutral = width - left - right;
    format!("[{}{}{}]", "#".repeat(left), ".".repeat(neutral), "-".repeat(right))
}

/// Stress-run statistics for aggregated results.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StressStats {
    /// Battles run.
    pub(super) battles: u64,
    /// Wins per side.
    pub(super) player1_wins: u64,
    /// Wins per side.
    pub(super) player2_wins: u64,
    /// Draws.
    pub(super) draws: u64,
    /// Battles that errored or never finished.
    pub(super) failures: u64,
    /// Finish reasons.
    pub(super) reasons: BTreeMap<String, u64>,
    /// Refused deployments across all battles.
    pub(super) rejections: u64,
    /// Ticks simulated.
    pub(super) total_steps: u64,
    /// Drawing phases opened.
    pub(super) drawing_phases: u64,
    /// Lanes closed at the end of a battle.
    pub(super) closed_lanes: u64,
    /// Seeds of failed battles, for reproduction.
    pub(super) failed_seeds: Vec<u64>,
}

impl StressStats {
    /// Add a finished battle.
    pub(super) fn add_report(&mut self, report: &ScenarioReport, player1: &PlayerId) {
        self.battles += 1;
        self.total_steps += report.steps;
        self.drawing_phases += u64::from(report.drawing_phases);
        self.rejections += report.rejections.len() as u64;
        self.closed_lanes += report.lanes.iter().filter(|lane| lane.closed).count() as u64;

        match &report.winner {
            Some(winner) if winner == player1 => self.player1_wins += 1,
            Some(_) => self.player2_wins += 1,
            None => self.draws += 1,
        }
        let reason = report
            .finish_reason
            .map_or_else(|| "unfinished".to_string(), |r: FinishReason| r.to_string());
        *self.reasons.entry(reason).or_default() += 1;
    }

    /// Record a battle that failed.
    pub(super) fn add_failure(&mut self, seed: u64) {
        self.battles += 1;
        self.failures += 1;
        self.failed_seeds.push(seed);
    }

    /// Merge another set of stats into this one.
    pub(super) fn merge(&mut self, other: &StressStats) {
        self.battles += other.battles;
        self.player1_wins += other.player1_wins;
        self.player2_wins += other.player2_wins;
        self.draws += other.draws;
        self.failures += other.failures;
        self.rejections += other.rejections;
        self.total_steps += other.total_steps;
        self.drawing_phases += other.drawing_phases;
        self.closed_lanes += other.closed_lanes;
        for (reason, count) in &other.reasons {
            *self.reasons.entry(reason.clone()).or_default() += count;
        }
        self.failed_seeds.extend_from_slice(&other.failed_seeds);
        self.failed_seeds.sort_unstable();
    }

    /// Format as human-readable text.
    #[allow(clippy::cast_precision_loss)]
    pub(super) fn format_text(&self, elapsed_secs: f64) -> String {
        let mut output = String::new();
        let total = self.battles.max(1) as f64;
        let rate = |n: u64| n as f64 / total * 100.0;

        let _ = writeln!(output, "Stress Results ({} battles)", self.battles);
        let _ = writeln!(
            output,
            "  player1 wins: {} ({:.1}%)",
            self.player1_wins,
            rate(self.player1_wins)
        );
        let _ = writeln!(
            output,
            "  player2 wins: {} ({:.1}%)",
            self.player2_wins,
            rate(self.player2_wins)
        );
        let _ = writeln!(output, "  draws:        {} ({:.1}%)", self.draws, rate(self.draws));
        let _ = writeln!(output, "  failures:     {}", self.failures);
        output.push('\n');
        for (reason, count) in &self.reasons {
            let _ = writeln!(output, "  {reason:<20} {count}");
        }
        output.push('\n');
        let _ = writeln!(
            output,
            "  Avg ticks: {:.1}, drawing phases: {:.2}, closed lanes: {:.2}",
            self.total_steps as f64 / total,
            self.drawing_phases as f64 / total,
            self.closed_lanes as f64 / total
        );
        let _ = writeln!(output, "  Rejected deployments: {}", self.rejections);
        if !self.failed_seeds.is_empty() {
            let seeds: Vec<String> = self.failed_seeds.iter().map(u64::to_string).collect();
            let _ = writeln!(output, "  Failed seeds: {}", seeds.join(", "));
        }
        if elapsed_secs > 0.0 {
            let _ = writeln!(
                output,
                "  Time: {elapsed_secs:.2}s ({:.0} battles/sec)",
                self.battles as f64 / elapsed_secs
            );
        }

        output
    }
}
