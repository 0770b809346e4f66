//! Battle configuration.
//!
//! Settings are layered: built-in defaults, then an optional JSON file, then
//! `WAVEBATTLE_*` environment variables. Every numeric balance coefficient
//! lives here so the resolver never hardcodes one.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Waves per battle.
pub const WAVE_COUNT: u32 = 5;
/// Seconds of drawing per wave.
pub const WAVE_INTERVAL_SECS: u64 = 180;
/// Parallel lanes.
pub const LANE_COUNT: usize = 3;
/// Hard cap on battle length.
pub const MAX_BATTLE_DURATION_SECS: u64 = 900;
/// Deployments per player per wave.
pub const DEPLOYMENT_LANES: u32 = 2;
/// Simulation tick and `territory:update` cadence.
pub const TERRITORY_UPDATE_INTERVAL_MS: u64 = 500;
/// Lane length in battlefield units.
pub const BATTLEFIELD_LENGTH: f64 = 30.0;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "WAVEBATTLE_";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The settings file is not valid JSON for these settings.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    /// An environment override could not be parsed.
    #[error("environment variable {var} has invalid value {value:?}")]
    Env {
        /// Variable name.
        var: String,
        /// Raw value.
        value: String,
    },
    /// A value is outside its allowed range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Why it is invalid.
        reason: &'static str,
    },
    /// The simulation worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Per-battle rules visible to clients.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TerritorialBattleConfig {
    /// Waves per battle.
    pub wave_count: u32,
    /// Drawing time per wave, in seconds.
    pub wave_interval: u64,
    /// Number of lanes.
    pub lane_count: usize,
    /// Lane length in battlefield units.
    pub battlefield_length: f64,
    /// Let creatures leave a lane that closes in their favor.
    pub allow_cross_lane_movement: bool,
    /// Let ranged creatures attack from range.
    pub allow_ranged_support: bool,
    /// End drawing early once both players are ready.
    pub early_deployment_enabled: bool,
}

impl Default for TerritorialBattleConfig {
    fn default() -> Self {
        Self {
            wave_count: WAVE_COUNT,
            wave_interval: WAVE_INTERVAL_SECS,
            lane_count: LANE_COUNT,
            battlefield_length: BATTLEFIELD_LENGTH,
            allow_cross_lane_movement: false,
            allow_ranged_support: true,
            early_deployment_enabled: true,
        }
    }
}

/// Session timing.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimingConfig {
    /// Hard cap on battle length, in seconds.
    pub max_battle_duration_secs: u64,
    /// Deployments per player per wave.
    pub deployment_lanes: u32,
    /// Simulation tick, in milliseconds.
    pub territory_update_interval_ms: u64,
    /// Countdown before each drawing phase, in seconds.
    pub countdown_secs: u64,
    /// Lower bound on the combat phase, in seconds.
    pub min_combat_budget_secs: u64,
    /// Time a disconnected player has to come back, in seconds.
    pub disconnect_grace_secs: u64,
    /// Most ticks one `tick` call may catch up on.
    pub max_catch_up_ticks: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_battle_duration_secs: MAX_BATTLE_DURATION_SECS,
            deployment_lanes: DEPLOYMENT_LANES,
            territory_update_interval_ms: TERRITORY_UPDATE_INTERVAL_MS,
            countdown_secs: 0,
            min_combat_budget_secs: 30,
            disconnect_grace_secs: 30,
            max_catch_up_ticks: 20,
        }
    }
}

impl TimingConfig {
    /// Tick interval in milliseconds.
    #[must_use]
    pub fn tick_ms(&self) -> u64 {
        self.territory_update_interval_ms
    }

    /// Maximum battle duration in milliseconds.
    #[must_use]
    pub fn max_duration_ms(&self) -> u64 {
        self.max_battle_duration_secs.saturating_mul(1_000)
    }

    /// Disconnect grace in milliseconds.
    #[must_use]
    pub fn disconnect_grace_ms(&self) -> u64 {
        self.disconnect_grace_secs.saturating_mul(1_000)
    }
}

/// Special ability coefficients.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AbilityConfig {
    /// Percent of max health restored per heal.
    pub heal_percent: u32,
    /// Time between heals.
    pub heal_interval_ms: u32,
    /// Damage a shield absorbs per wave.
    pub shield_amount: u32,
    /// Attack multiplier of the first attack.
    pub burst_multiplier: f64,
    /// Poison damage per tick.
    pub poison_damage_per_tick: u32,
    /// Poison duration.
    pub poison_duration_ms: u32,
    /// Stun duration.
    pub stun_duration_ms: u32,
    /// Time before a creature can stun again.
    pub stun_cooldown_ms: u32,
}

impl Default for AbilityConfig {
    fn default() -> Self {
        Self {
            heal_percent: 10,
            heal_interval_ms: 3_000,
            shield_amount: 15,
            burst_multiplier: 2.0,
            poison_damage_per_tick: 2,
            poison_duration_ms: 3_000,
            stun_duration_ms: 1_000,
            stun_cooldown_ms: 4_000,
        }
    }
}

/// Combat resolver coefficients.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CombatConfig {
    /// Melee attack range, in battlefield units.
    pub melee_range: f64,
    /// Ranged attack range, in battlefield units.
    pub ranged_range: f64,
    /// Battlefield units per second per point of speed.
    pub speed_scale: f64,
    /// Ability coefficients.
    pub abilities: AbilityConfig,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            melee_range: 2.0,
            ranged_range: 8.0,
            speed_scale: 0.2,
            abilities: AbilityConfig::default(),
        }
    }
}

/// Lane control coefficients.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControlConfig {
    /// Most control that can move in one tick, in basis points.
    pub max_shift_per_tick_bp: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_shift_per_tick_bp: 250,
        }
    }
}

/// Process-level runtime settings.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Simulation worker threads (default: CPU count).
    pub worker_threads: Option<usize>,
}

/// All engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BattleSettings {
    /// Rules visible to clients.
    pub battle: TerritorialBattleConfig,
    /// Session timing.
    pub timing: TimingConfig,
    /// Combat coefficients.
    pub combat: CombatConfig,
    /// Lane control coefficients.
    pub control: ControlConfig,
    /// Runtime settings.
    pub runtime: RuntimeConfig,
}

impl BattleSettings {
    /// Parse settings from JSON. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the result is invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Defaults, then the optional file, then the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any layer fails to load or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|var| std::env::var(var).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `WAVEBATTLE_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] for a value that does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            let var = format!("{ENV_PREFIX}{key}");
            lookup(&var).map(|value| (var, value))
        };

        if let Some((var, value)) = read("WAVE_COUNT") {
            self.battle.wave_count = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("WAVE_INTERVAL_SECS") {
            self.battle.wave_interval = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("LANE_COUNT") {
            self.battle.lane_count = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("MAX_BATTLE_DURATION_SECS") {
            self.timing.max_battle_duration_secs = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("DEPLOYMENT_LANES") {
            self.timing.deployment_lanes = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("TERRITORY_UPDATE_INTERVAL_MS") {
            self.timing.territory_update_interval_ms = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("DISCONNECT_GRACE_SECS") {
            self.timing.disconnect_grace_secs = parse_env(&var, &value)?;
        }
        if let Some((var, value)) = read("WORKER_THREADS") {
            self.runtime.worker_threads = Some(parse_env(&var, &value)?);
        }
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if self.battle.wave_count == 0 {
            return invalid("waveCount", "must be at least 1");
        }
        if self.battle.lane_count == 0 {
            return invalid("laneCount", "must be at least 1");
        }
        if !self.battle.battlefield_length.is_finite() || self.battle.battlefield_length <= 0.0 {
            return invalid("battlefieldLength", "must be positive");
        }
        if self.timing.territory_update_interval_ms == 0 {
            return invalid("territoryUpdateIntervalMs", "must be positive");
        }
        if self.timing.deployment_lanes == 0 {
            return invalid("deploymentLanes", "must be at least 1");
        }
        if self.timing.max_battle_duration_secs == 0 {
            return invalid("maxBattleDurationSecs", "must be positive");
        }
        if self.timing.max_catch_up_ticks == 0 {
            return invalid("maxCatchUpTicks", "must be at least 1");
        }
        if !is_non_negative(self.combat.melee_range) || !is_non_negative(self.combat.ranged_range) {
            return invalid("range", "must not be negative");
        }
        if !is_non_negative(self.combat.speed_scale) {
            return invalid("speedScale", "must not be negative");
        }
        if self.combat.abilities.heal_percent > 100 {
            return invalid("healPercent", "must be at most 100");
        }
        if self.combat.abilities.burst_multiplier.is_nan()
            || self.combat.abilities.burst_multiplier < 1.0
        {
            return invalid("burstMultiplier", "must be at least 1");
        }
        if self.control.max_shift_per_tick_bp == 0
            || self.control.max_shift_per_tick_bp > crate::territory::FULL_CONTROL_BP
        {
            return invalid("maxShiftPerTickBp", "must be in 1..=10000");
        }
        if self.runtime.worker_threads == Some(0) {
            return invalid("workerThreads", "must be at least 1");
        }
        Ok(())
    }

    /// Drawing phase length in milliseconds.
    #[must_use]
    pub fn drawing_ms(&self) -> u64 {
        self.battle.wave_interval.saturating_mul(1_000)
    }

    /// Combat phase budget: the wave interval, but never below the minimum.
    #[must_use]
    pub fn combat_budget_ms(&self) -> u64 {
        self.battle
            .wave_interval
            .max(self.timing.min_combat_budget_secs)
            .saturating_mul(1_000)
    }
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_battle_constants() {
        let settings = BattleSettings::default();
        assert_eq!(settings.battle.wave_count, 5);
        assert_eq!(settings.battle.wave_interval, 180);
        assert_eq!(settings.battle.lane_count, 3);
        assert_eq!(settings.timing.max_battle_duration_secs, 900);
        assert_eq!(settings.timing.deployment_lanes, 2);
        assert_eq!(settings.timing.territory_update_interval_ms, 500);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings =
            BattleSettings::from_json(r#"{"battle": {"laneCount": 1, "waveCount": 2}}"#).unwrap();
        assert_eq!(settings.battle.lane_count, 1);
        assert_eq!(settings.battle.wave_count, 2);
        assert_eq!(settings.battle.wave_interval, 180);
        assert_eq!(settings.combat.abilities.shield_amount, 15);
    }

    #[test]
    fn test_invalid_json_value_rejected() {
        let err = BattleSettings::from_json(r#"{"battle": {"laneCount": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "laneCount", .. }));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WAVEBATTLE_WAVE_COUNT", "3"),
            ("WAVEBATTLE_WORKER_THREADS", "4"),
            ("WAVEBATTLE_DISCONNECT_GRACE_SECS", " 10 "),
        ]
        .into_iter()
        .collect();

        let mut settings = BattleSettings::default();
        settings
            .apply_env(|var| vars.get(var).map(ToString::to_string))
            .unwrap();
        assert_eq!(settings.battle.wave_count, 3);
        assert_eq!(settings.runtime.worker_threads, Some(4));
        assert_eq!(settings.timing.disconnect_grace_secs, 10);
    }

    #[test]
    fn test_env_parse_error() {
        let mut settings = BattleSettings::default();
        let err = settings
            .apply_env(|var| (var == "WAVEBATTLE_LANE_COUNT").then(|| "three".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"control": {{"maxShiftPerTickBp": 500}}}}"#).unwrap();
        let settings = BattleSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.control.max_shift_per_tick_bp, 500);
    }

    #[test]
    fn test_missing_file() {
        let err = BattleSettings::from_file(Path::new("/nonexistent/wavebattle.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_combat_budget_floor() {
        let mut settings = BattleSettings::default();
        settings.battle.wave_interval = 1;
        assert_eq!(settings.drawing_ms(), 1_000);
        assert_eq!(settings.combat_budget_ms(), 30_000);
        settings.battle.wave_interval = 180;
        assert_eq!(settings.combat_budget_ms(), 180_000);
    }

    #[test]
    fn test_non_finite_battlefield_rejected() {
        for length in [f64::INFINITY, f64::NAN, 0.0] {
            let mut settings = BattleSettings::default();
            settings.battle.battlefield_length = length;
            assert!(matches!(
                settings.validate(),
                Err(ConfigError::Invalid { field: "battlefieldLength", .. })
            ));
        }
    }
}
