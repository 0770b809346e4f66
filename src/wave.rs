//! Wave scheduler.
//!
//! A battle runs `wave_count` waves, each cycling through
//! countdown → drawing → deployment → battling → wave-complete. The scheduler
//! only tracks time and phase; the session reacts to the transitions it
//! returns (inserting queued creatures on [`WaveTransition::Deployment`],
//! finishing the battle on [`WaveTransition::WavesExhausted`], and so on).

use serde::Serialize;

use crate::battle::BattleStatus;
use crate::config::BattleSettings;

/// Durations and limits that drive the scheduler, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveSchedule {
    /// Waves in the battle.
    pub wave_count: u32,
    /// Countdown before each drawing phase.
    pub countdown_ms: u64,
    /// Drawing phase length.
    pub drawing_ms: u64,
    /// Combat budget per wave.
    pub combat_ms: u64,
    /// Whether both players readying ends drawing early.
    pub early_deployment: bool,
}

impl WaveSchedule {
    /// Derive the schedule from battle settings.
    #[must_use]
    pub fn from_settings(settings: &BattleSettings) -> Self {
        Self {
            wave_count: settings.battle.wave_count,
            countdown_ms: settings.timing.countdown_secs.saturating_mul(1_000),
            drawing_ms: settings.drawing_ms(),
            combat_ms: settings.combat_budget_ms(),
            early_deployment: settings.battle.early_deployment_enabled,
        }
    }
}

/// Phase of the current wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum WavePhase {
    /// Short pause before drawing starts.
    Countdown {
        /// When drawing starts.
        ends_at: u64,
    },
    /// Players draw and submit deployments.
    Drawing {
        /// Submissions at or after this time are rejected.
        deadline: u64,
    },
    /// Queued creatures are being placed.
    Deployment,
    /// Combat ticks run.
    Battling {
        /// When the combat budget runs out.
        deadline: u64,
    },
    /// The wave ended.
    WaveComplete,
}

impl WavePhase {
    /// Battle status reported to clients for this phase.
    #[must_use]
    pub fn status(self) -> BattleStatus {
        match self {
            WavePhase::Countdown { .. } | WavePhase::Drawing { .. } | WavePhase::Deployment => {
                BattleStatus::Drawing
            }
            WavePhase::Battling { .. } | WavePhase::WaveComplete => BattleStatus::Battling,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            WavePhase::Countdown { .. } => "countdown",
            WavePhase::Drawing { .. } => "drawing",
            WavePhase::Deployment => "deployment",
            WavePhase::Battling { .. } => "battling",
            WavePhase::WaveComplete => "wave-complete",
        }
    }
}

/// Facts about the battle the scheduler cannot see on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveSignals {
    /// Both players asked to end drawing early.
    pub both_ready: bool,
    /// No lane has live creatures from the current wave.
    pub combat_settled: bool,
    /// A global win condition was met.
    pub battle_decided: bool,
}

/// A phase change, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WaveTransition {
    /// A countdown started.
    Countdown {
        /// Wave about to start.
        wave: u32,
        /// When drawing starts.
        ends_at: u64,
    },
    /// Drawing opened.
    DrawingStarted {
        /// Wave number.
        wave: u32,
        /// Submission deadline.
        deadline: u64,
    },
    /// Drawing closed.
    DrawingComplete {
        /// Wave number.
        wave: u32,
        /// Closed because both players readied.
        early: bool,
    },
    /// Queued creatures should be inserted now.
    Deployment {
        /// Wave number.
        wave: u32,
    },
    /// Combat started.
    CombatStarted {
        /// Wave number.
        wave: u32,
        /// Combat budget deadline.
        deadline: u64,
    },
    /// The wave ended.
    WaveComplete {
        /// Wave number.
        wave: u32,
    },
    /// The last wave ended or the battle was decided.
    WavesExhausted,
}

/// Drives waves for one battle.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone)]
pub struct WaveScheduler {
    schedule: WaveSchedule,
    wave: u32,
    phase: Option<WavePhase>,
    drawing_phases: u32,
    finished: bool,
}

impl WaveScheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new(schedule: WaveSchedule) -> Self {
        Self {
            schedule,
            wave: 0,
            phase: None,
            drawing_phases: 0,
            finished: false,
        }
    }

    /// The schedule in use.
    #[must_use]
    pub fn schedule(&self) -> &WaveSchedule {
        &self.schedule
    }

    /// Current wave, 0 before start.
    #[must_use]
    pub fn wave(&self) -> u32 {
        self.wave
    }

    /// Current phase, `None` before start and after finishing.
    #[must_use]
    pub fn phase(&self) -> Option<WavePhase> {
        if self.finished { None } else { self.phase }
    }

    /// Drawing phases entered so far.
    #[must_use]
    pub fn drawing_phases(&self) -> u32 {
        self.drawing_phases
    }

    /// Whether the scheduler has stopped for good.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether a submission made at `now` would be on time.
    #[must_use]
    pub fn accepts_deployments(&self, now: u64) -> bool {
        matches!(self.phase(), Some(WavePhase::Drawing { deadline }) if now < deadline)
    }

    /// Start wave 1. Does nothing if already started.
    pub fn start(&mut self, now: u64) -> Vec<WaveTransition> {
        if self.phase.is_some() || self.finished {
            return Vec::new();
        }
        let mut transitions = Vec::new();
        self.begin_wave(1, now, &mut transitions);
        transitions.extend(self.advance(now, WaveSignals::default()));
        transitions
    }

    /// Stop immediately, e.g. after a forfeit or timeout.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Apply every transition due at `now`.
    ///
    /// Signals describe the state before this call; they are dropped once the
    /// wave they refer to has ended.
    pub fn advance(&mut self, now: u64, signals: WaveSignals) -> Vec<WaveTransition> {
        let mut transitions = Vec::new();
        let mut signals = signals;
        while !self.finished {
            let Some(phase) = self.phase else { break };
            match phase {
                WavePhase::Countdown { ends_at } if now >= ends_at => {
                    let deadline = ends_at + self.schedule.drawing_ms;
                    self.phase = Some(WavePhase::Drawing { deadline });
                    self.drawing_phases += 1;
                    transitions.push(WaveTransition::DrawingStarted {
                        wave: self.wave,
                        deadline,
                    });
                }
                WavePhase::Drawing { deadline } => {
                    let early = self.schedule.early_deployment && signals.both_ready;
                    if now < deadline && !early {
                        break;
                    }
                    transitions.push(WaveTransition::DrawingComplete {
                        wave: self.wave,
                        early: now < deadline,
                    });
                    self.phase = Some(WavePhase::Deployment);
                    transitions.push(WaveTransition::Deployment { wave: self.wave });
                    let deadline = now + self.schedule.combat_ms;
                    self.phase = Some(WavePhase::Battling { deadline });
                    transitions.push(WaveTransition::CombatStarted {
                        wave: self.wave,
                        deadline,
                    });
                    // Settled refers to the wave before deployment.
                    break;
                }
                WavePhase::Battling { deadline }
                    if now >= deadline || signals.combat_settled || signals.battle_decided =>
                {
                    self.phase = Some(WavePhase::WaveComplete);
                    transitions.push(WaveTransition::WaveComplete { wave: self.wave });
                    if signals.battle_decided || self.wave >= self.schedule.wave_count {
                        self.finished = true;
                        transitions.push(WaveTransition::WavesExhausted);
                        break;
                    }
                    signals = WaveSignals::default();
                    self.begin_wave(self.wave + 1, now, &mut transitions);
                }
                _ => break,
            }
        }
        transitions
    }

    fn begin_wave(&mut self, wave: u32, now: u64, transitions: &mut Vec<WaveTransition>) {
        self.wave = wave;
        let ends_at = now + self.schedule.countdown_ms;
        self.phase = Some(WavePhase::Countdown { ends_at });
        transitions.push(WaveTransition::Countdown { wave, ends_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> WaveSchedule {
        WaveSchedule {
            wave_count: 2,
            countdown_ms: 0,
            drawing_ms: 1_000,
            combat_ms: 5_000,
            early_deployment: true,
        }
    }

    #[test]
    fn test_start_enters_drawing_immediately() {
        let mut scheduler = WaveScheduler::new(schedule());
        let transitions = scheduler.start(100);
        assert_eq!(
            transitions,
            vec![
                WaveTransition::Countdown { wave: 1, ends_at: 100 },
                WaveTransition::DrawingStarted { wave: 1, deadline: 1_100 },
            ]
        );
        assert_eq!(scheduler.phase(), Some(WavePhase::Drawing { deadline: 1_100 }));
        assert_eq!(scheduler.phase().map(WavePhase::status), Some(BattleStatus::Drawing));
        assert!(scheduler.start(200).is_empty(), "start is idempotent");
    }

    #[test]
    fn test_countdown_delays_drawing() {
        let mut scheduler = WaveScheduler::new(WaveSchedule {
            countdown_ms: 3_000,
            ..schedule()
        });
        scheduler.start(0);
        assert!(matches!(scheduler.phase(), Some(WavePhase::Countdown { ends_at: 3_000 })));
        assert!(scheduler.advance(2_999, WaveSignals::default()).is_empty());
        let transitions = scheduler.advance(3_000, WaveSignals::default());
        assert_eq!(
            transitions,
            vec![WaveTransition::DrawingStarted { wave: 1, deadline: 4_000 }]
        );
    }

    #[test]
    fn test_deadline_rejects_late_submissions() {
        let mut scheduler = WaveScheduler::new(schedule());
        scheduler.start(0);
        assert!(scheduler.accepts_deployments(999));
        assert!(!scheduler.accepts_deployments(1_000));
    }

    #[test]
    fn test_drawing_to_battling_on_timer() {
        let mut scheduler = WaveScheduler::new(schedule());
        scheduler.start(0);
        assert!(scheduler.advance(500, WaveSignals::default()).is_empty());
        let transitions = scheduler.advance(1_000, WaveSignals::default());
        assert_eq!(
            transitions,
            vec![
                WaveTransition::DrawingComplete { wave: 1, early: false },
                WaveTransition::Deployment { wave: 1 },
                WaveTransition::CombatStarted { wave: 1, deadline: 6_000 },
            ]
        );
        assert_eq!(scheduler.phase().map(WavePhase::status), Some(BattleStatus::Battling));
    }

    #[test]
    fn test_early_ready_respects_flag() {
        let ready = WaveSignals {
            both_ready: true,
            ..WaveSignals::default()
        };
        let mut scheduler = WaveScheduler::new(schedule());
        scheduler.start(0);
        let transitions = scheduler.advance(200, ready);
        assert_eq!(
            transitions[0],
            WaveTransition::DrawingComplete { wave: 1, early: true }
        );

        let mut disabled = WaveScheduler::new(WaveSchedule {
            early_deployment: false,
            ..schedule()
        });
        disabled.start(0);
        assert!(disabled.advance(200, ready).is_empty());
    }

    #[test]
    fn test_settled_combat_starts_next_wave() {
        let settled = WaveSignals {
            combat_settled: true,
            ..WaveSignals::default()
        };
        let mut scheduler = WaveScheduler::new(schedule());
        scheduler.start(0);
        scheduler.advance(1_000, WaveSignals::default());
        let transitions = scheduler.advance(1_500, settled);
        assert_eq!(
            transitions,
            vec![
                WaveTransition::WaveComplete { wave: 1 },
                WaveTransition::Countdown { wave: 2, ends_at: 1_500 },
                WaveTransition::DrawingStarted { wave: 2, deadline: 2_500 },
            ]
        );
        assert_eq!(scheduler.wave(), 2);
    }

    #[test]
    fn test_last_wave_exhausts() {
        let mut scheduler = WaveScheduler::new(schedule());
        scheduler.start(0);
        let mut now = 0;
        let mut exhausted = false;
        while now < 100_000 && !exhausted {
            now += 500;
            exhausted = scheduler
                .advance(now, WaveSignals::default())
                .contains(&WaveTransition::WavesExhausted);
        }
        assert!(exhausted);
        assert!(scheduler.is_finished());
        assert_eq!(scheduler.drawing_phases(), 2);
        assert_eq!(scheduler.phase(), None);
        assert!(scheduler.advance(now + 10_000, WaveSignals::default()).is_empty());
    }

    #[test]
    fn test_decided_battle_stops_after_current_wave() {
        let mut scheduler = WaveScheduler::new(schedule());
        scheduler.start(0);
        scheduler.advance(1_000, WaveSignals::default());
        let transitions = scheduler.advance(
            1_500,
            WaveSignals {
                battle_decided: true,
                ..WaveSignals::default()
            },
        );
        assert_eq!(
            transitions,
            vec![WaveTransition::WaveComplete { wave: 1 }, WaveTransition::WavesExhausted]
        );
        assert_eq!(scheduler.drawing_phases(), 1);
    }
}
