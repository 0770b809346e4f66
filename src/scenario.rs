//! Scripted battles.
//!
//! A scenario is a JSON file naming two players, battle settings, and the
//! creatures each player deploys per wave. [`ScenarioRunner`] drives a
//! [`BattleSession`] on simulated time, submitting scripted deployments as
//! soon as each wave opens for drawing.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::battle::{BattleId, FinishReason, PlayerId};
use crate::config::{BattleSettings, ConfigError, TerritorialBattleConfig};
use crate::error::BattleError;
use crate::session::{BattleEvent, BattleSession, TickOutcome};
use crate::territory::{
    AggregateControl, Creature, CreatureStats, ElementType, Side, SpecialAbility, check_invariants,
};
use crate::wave::WavePhase;

/// Errors from loading or running a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not a valid scenario.
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),
    /// The scenario's settings are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The battle failed.
    #[error(transparent)]
    Battle(#[from] BattleError),
    /// The battle did not finish within the step limit.
    #[error("battle still running after {steps} steps")]
    Unfinished {
        /// Steps taken.
        steps: u64,
    },
}

/// One creature a player deploys in a given wave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedDeployment {
    /// Wave number, starting at 1.
    pub wave: u32,
    /// Deploying player.
    pub player: PlayerId,
    /// Target lane.
    pub lane: usize,
    /// Creature to deploy.
    pub creature: Creature,
}

/// A forfeit at a fixed point in the battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedForfeit {
    /// Forfeiting player.
    pub player: PlayerId,
    /// Wave in which to forfeit.
    pub wave: u32,
    /// Delay after the wave starts.
    #[serde(default)]
    pub after_ms: u64,
}

/// A complete scripted battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Label used in reports.
    #[serde(default)]
    pub name: String,
    /// Player 1 then player 2.
    pub players: [PlayerId; 2],
    /// Battle settings; missing fields take defaults.
    #[serde(default)]
    pub settings: BattleSettings,
    /// Deployments in submission order.
    #[serde(default)]
    pub deployments: Vec<ScriptedDeployment>,
    /// Optional forfeit.
    #[serde(default)]
    pub forfeit: Option<ScriptedForfeit>,
    /// Both players ready as soon as their deployments are in.
    #[serde(default)]
    pub ready_early: bool,
}

impl Scenario {
    /// Parse and validate a scenario.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or invalid settings.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_json::from_str(json)?;
        scenario.settings.validate()?;
        Ok(scenario)
    }

    /// Load a scenario file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let json = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

/// A deployment the session refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    /// Wave of the attempt.
    pub wave: u32,
    /// Player.
    pub player: PlayerId,
    /// Target lane.
    pub lane: usize,
    /// Error code.
    pub code: &'static str,
    /// Human-readable reason.
    pub message: String,
}

/// Final control of one lane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneSummary {
    /// Lane index.
    pub index: usize,
    /// Player 1 control, percent.
    pub player1: f64,
    /// Player 2 control, percent.
    pub player2: f64,
    /// Whether the lane closed.
    pub closed: bool,
    /// Owner of a closed lane.
    pub owner: Option<Side>,
}

/// Outcome of a scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    /// Scenario label.
    pub name: String,
    /// Winner, `None` on a draw.
    pub winner: Option<PlayerId>,
    /// Why the battle ended.
    pub finish_reason: Option<FinishReason>,
    /// Last wave reached.
    pub waves_played: u32,
    /// Drawing phases entered.
    pub drawing_phases: u32,
    /// Simulated battle length.
    pub duration_ms: u64,
    /// Simulation steps.
    pub steps: u64,
    /// Final aggregate control.
    pub final_control: AggregateControl,
    /// Final per-lane control.
    pub lanes: Vec<LaneSummary>,
    /// Event counts by socket name.
    pub event_counts: BTreeMap<String, usize>,
    /// Refused deployments.
    pub rejections: Vec<Rejection>,
}

/// Steps a scripted battle on simulated time.
#[derive(Debug)]
pub struct ScenarioRunner {
    scenario: Scenario,
    session: BattleSession,
    now: u64,
    steps: u64,
    submitted_wave: u32,
    forfeited: bool,
    rejections: Vec<Rejection>,
    event_counts: BTreeMap<String, usize>,
}

impl ScenarioRunner {
    /// Create the battle and join both players at time zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the roster is unusable.
    pub fn new(scenario: Scenario) -> Result<Self, ScenarioError> {
        let mut session = BattleSession::create(
            BattleId(1),
            scenario.players.clone(),
            scenario.settings.clone(),
            0,
        )?;
        for player in &scenario.players {
            session.join(player, 0)?;
        }
        let mut runner = Self {
            scenario,
            session,
            now: 0,
            steps: 0,
            submitted_wave: 0,
            forfeited: false,
            rejections: Vec::new(),
            event_counts: BTreeMap::new(),
        };
        let events = runner.session.drain_events();
        runner.count(&events);
        Ok(runner)
    }

    /// The session being driven.
    #[must_use]
    pub fn session(&self) -> &BattleSession {
        &self.session
    }

    /// Simulated time.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Whether the battle has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.session.battle().is_finished()
    }

    /// Apply scripted actions, then advance one tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the session hits a fatal error.
    pub fn step(&mut self) -> Result<TickOutcome, ScenarioError> {
        self.script_actions();
        self.now += self.session.settings().timing.tick_ms();
        self.steps += 1;
        let mut outcome = self.session.tick(self.now)?;
        let late = self.session.drain_events();
        outcome.events.extend(late);
        self.count(&outcome.events);
        Ok(outcome)
    }

    /// Step until the battle finishes.
    ///
    /// # Errors
    ///
    /// Returns an error on a fatal session error, or if the battle overruns
    /// its maximum duration.
    pub fn run_to_end(mut self) -> Result<ScenarioReport, ScenarioError> {
        let timing = &self.session.settings().timing;
        let limit = timing.max_duration_ms() / timing.tick_ms() + 4;
        while !self.is_finished() {
            if self.steps > limit {
                return Err(ScenarioError::Unfinished { steps: self.steps });
            }
            self.step()?;
        }
        Ok(self.report())
    }

    /// Summarize the battle so far.
    #[must_use]
    pub fn report(&self) -> ScenarioReport {
        let battle = self.session.battle();
        ScenarioReport {
            name: self.scenario.name.clone(),
            winner: battle.winner.clone(),
            finish_reason: battle.finish_reason,
            waves_played: battle.current_wave,
            drawing_phases: self.session.drawing_phases(),
            duration_ms: battle
                .ended_at
                .unwrap_or(self.now)
                .saturating_sub(battle.started_at.unwrap_or(0)),
            steps: self.steps,
            final_control: battle.state.aggregate_control,
            lanes: battle
                .state
                .lanes
                .iter()
                .map(|lane| LaneSummary {
                    index: lane.lane_index,
                    player1: lane.player1_control.percent(),
                    player2: lane.player2_control.percent(),
                    closed: lane.closed,
                    owner: lane.owner(),
                })
                .collect(),
            event_counts: self.event_counts.clone(),
            rejections: self.rejections.clone(),
        }
    }

    fn script_actions(&mut self) {
        let battle = self.session.battle();
        let wave = battle.current_wave;
        let wave_start = battle.wave_start_time;

        if let Some(forfeit) = &self.scenario.forfeit
            && !self.forfeited
            && wave == forfeit.wave
            && self.now >= wave_start + forfeit.after_ms
        {
            self.forfeited = true;
            let player = forfeit.player.clone();
            if let Err(err) = self.session.forfeit(&player, self.now) {
                debug!(%player, %err, "scripted forfeit refused");
            }
            return;
        }

        if self.submitted_wave >= wave
            || !matches!(self.session.phase(), Some(WavePhase::Drawing { .. }))
        {
            return;
        }
        self.submitted_wave = wave;
        let scripted: Vec<ScriptedDeployment> = self
            .scenario
            .deployments
            .iter()
            .filter(|d| d.wave == wave)
            .cloned()
            .collect();
        for deployment in scripted {
            let result = self.session.deploy(
                &deployment.player,
                deployment.creature,
                deployment.lane,
                self.now,
            );
            if let Err(err) = result {
                self.rejections.push(Rejection {
                    wave,
                    player: deployment.player,
                    lane: deployment.lane,
                    code: err.code(),
                    message: err.to_string(),
                });
            }
        }
        if self.scenario.ready_early && self.session.settings().battle.early_deployment_enabled {
            for player in self.scenario.players.clone() {
                if let Err(err) = self.session.ready(&player, self.now) {
                    debug!(%player, %err, "scripted ready refused");
                }
            }
        }
    }

    fn count(&mut self, events: &[BattleEvent]) {
        for event in events {
            if let BattleEvent::TerritoryUpdate { state } = event {
                debug_assert!(check_invariants(state, state.lanes.len()).is_empty());
            }
            *self.event_counts.entry(event.name().to_string()).or_default() += 1;
        }
    }
}

/// Run a scenario to completion.
///
/// # Errors
///
/// Returns an error if the battle cannot be created or fails.
pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
    ScenarioRunner::new(scenario.clone())?.run_to_end()
}

/// Build a random but valid scenario from `seed`, for stress runs.
#[must_use]
pub fn random_scenario(seed: u64) -> Scenario {
    let mut rng = StdRng::seed_from_u64(seed);
    let players = [PlayerId::from("red"), PlayerId::from("blue")];

    let mut settings = BattleSettings {
        battle: TerritorialBattleConfig {
            wave_count: rng.gen_range(1..=3),
            wave_interval: rng.gen_range(1..=5),
            lane_count: rng.gen_range(1..=3),
            allow_cross_lane_movement: rng.gen_range(0..2) == 1,
            allow_ranged_support: rng.gen_range(0..2) == 1,
            ..TerritorialBattleConfig::default()
        },
        ..BattleSettings::default()
    };
    settings.timing.min_combat_budget_secs = rng.gen_range(5..=20);
    settings.timing.max_battle_duration_secs = 120;

    let abilities = [
        None,
        Some(SpecialAbility::Heal),
        Some(SpecialAbility::Shield),
        Some(SpecialAbility::Burst),
        Some(SpecialAbility::Poison),
        Some(SpecialAbility::Stun),
    ];
    let mut deployments = Vec::new();
    for wave in 1..=settings.battle.wave_count {
        for player in &players {
            for slot in 0..rng.gen_range(0..=settings.timing.deployment_lanes) {
                let stats = CreatureStats {
                    health: rng.gen_range(10..=60),
                    attack: rng.gen_range(3..=15),
                    defense: rng.gen_range(1..=6),
                    speed: rng.gen_range(4..=16),
                    element: ElementType::ALL[rng.gen_range(0..ElementType::ALL.len())],
                    special_ability: abilities[rng.gen_range(0..abilities.len())],
                };
                let creature = Creature::new(
                    format!("{player}-{wave}-{slot}"),
                    format!("{} {}", stats.element, slot + 1),
                    stats,
                )
                .with_ranged(rng.gen_range(0..4) == 0);
                deployments.push(ScriptedDeployment {
                    wave,
                    player: player.clone(),
                    lane: rng.gen_range(0..settings.battle.lane_count),
                    creature,
                });
            }
        }
    }

    Scenario {
        name: format!("random-{seed}"),
        players,
        settings,
        deployments,
        forfeit: None,
        ready_early: rng.gen_range(0..2) == 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRE_VS_EARTH: &str = r#"{
        "name": "fire vs earth",
        "players": ["alice", "bob"],
        "settings": {"battle": {"waveCount": 1, "waveInterval": 1, "laneCount": 1}},
        "deployments": [
            {"wave": 1, "player": "alice", "lane": 0, "creature": {
                "id": "a1", "name": "Blaze",
                "stats": {"health": 20, "attack": 10, "defense": 2, "speed": 10, "element": "fire"}}},
            {"wave": 1, "player": "bob", "lane": 0, "creature": {
                "id": "b1", "name": "Pebble",
                "stats": {"health": 20, "attack": 8, "defense": 2, "speed": 10, "element": "earth"}}}
        ]
    }"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_json(FIRE_VS_EARTH).unwrap();
        assert_eq!(scenario.settings.battle.lane_count, 1);
        assert_eq!(scenario.settings.battle.wave_interval, 1);
        assert_eq!(scenario.deployments.len(), 2);
        assert!(scenario.forfeit.is_none());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let json = r#"{"players": ["a", "b"], "settings": {"battle": {"laneCount": 0}}}"#;
        assert!(matches!(
            Scenario::from_json(json),
            Err(ScenarioError::Config(_))
        ));
    }

    #[test]
    fn test_fire_beats_earth() {
        let report = run_scenario(&Scenario::from_json(FIRE_VS_EARTH).unwrap()).unwrap();
        assert_eq!(report.winner, Some(PlayerId::from("alice")));
        assert_eq!(report.finish_reason, Some(FinishReason::AllLanesCaptured));
        assert!(report.rejections.is_empty());
        assert_eq!(report.lanes[0].owner, Some(Side::Player1));
    }

    #[test]
    fn test_rejections_recorded() {
        let mut scenario = Scenario::from_json(FIRE_VS_EARTH).unwrap();
        scenario.deployments[1].lane = 4;
        let report = run_scenario(&scenario).unwrap();
        assert_eq!(report.rejections.len(), 1);
        assert_eq!(report.rejections[0].code, "invalid_lane");
    }

    #[test]
    fn test_random_scenario_is_seeded() {
        assert_eq!(random_scenario(9), random_scenario(9));
        let scenario = random_scenario(9);
        assert!(scenario.settings.validate().is_ok());
        for d in &scenario.deployments {
            assert!(d.lane < scenario.settings.battle.lane_count);
            assert!(d.creature.stats.validate().is_ok());
        }
    }

    #[test]
    fn test_random_scenarios_finish() {
        for seed in 0..8 {
            let report = run_scenario(&random_scenario(seed)).unwrap();
            assert!(report.finish_reason.is_some(), "seed {seed}");
            assert!(report.drawing_phases <= 3);
        }
    }
}
