//! Battle session: the single writer of one battle.
//!
//! All mutation of a [`Battle`] goes through a [`BattleSession`]. Deployments
//! are validated and queued as they arrive, then placed into lanes at the
//! next tick boundary in arrival order (ties broken by player id). The
//! simulation advances in fixed steps of `territory_update_interval_ms`;
//! each call to [`BattleSession::tick`] runs every step that is due.
//!
//! Events produced by any operation are buffered and handed out by
//! [`BattleSession::drain_events`] or in the [`TickOutcome`], so callers can
//! publish them after releasing the session lock.

pub mod clock;
pub mod events;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use events::{BattleEvent, DeploymentRequest};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::battle::{Battle, BattleId, BattleStatus, FinishReason, PlayerId};
use crate::combat::{self, TickContext, abilities};
use crate::config::BattleSettings;
use crate::control;
use crate::error::{BattleError, BattleResult};
use crate::territory::{Creature, CreatureId, CreatureInLane, Side, TerritoryState, validate_transition};
use crate::wave::{WavePhase, WaveSchedule, WaveScheduler, WaveSignals, WaveTransition};

/// Receipt for a queued deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentAck {
    /// Battle id.
    pub battle_id: BattleId,
    /// Submitting player.
    pub player: PlayerId,
    /// Wave the creature will fight in.
    pub wave: u32,
    /// Target lane.
    pub lane: usize,
    /// Arrival sequence number within the battle.
    pub sequence: u64,
    /// Deployments the player has left this wave.
    pub slots_remaining: u32,
}

/// Result of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Territory after the tick.
    pub state: TerritoryState,
    /// Events for broadcast, in order.
    pub events: Vec<BattleEvent>,
    /// Simulation steps run.
    pub steps: u32,
}

/// A deployment waiting for the next tick boundary.
#[derive(Debug, Clone)]
struct PendingDeployment {
    submitted_at: u64,
    player: PlayerId,
    sequence: u64,
    side: Side,
    lane: usize,
    creature: Creature,
}

/// One battle and everything needed to run it.
#[derive(Debug)]
pub struct BattleSession {
    battle: Battle,
    settings: BattleSettings,
    scheduler: WaveScheduler,
    joined: [bool; 2],
    ready: [bool; 2],
    deployed_this_wave: [u32; 2],
    pending: Vec<PendingDeployment>,
    next_sequence: u64,
    next_creature_id: u64,
    last_step_ms: u64,
    disconnected_at: [Option<u64>; 2],
    outbox: Vec<BattleEvent>,
}

impl BattleSession {
    /// Create a battle in `waiting`.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidRoster`] if a player id is empty or both
    /// ids are the same, and [`BattleError::InvalidSettings`] if the settings
    /// fail [`BattleSettings::validate`].
    pub fn create(
        id: BattleId,
        players: [PlayerId; 2],
        settings: BattleSettings,
        now: u64,
    ) -> BattleResult<Self> {
        if players.iter().any(|p| p.as_str().is_empty()) {
            return Err(BattleError::InvalidRoster {
                reason: "player ids must not be empty",
            });
        }
        if players[0] == players[1] {
            return Err(BattleError::InvalidRoster {
                reason: "a player cannot fight themselves",
            });
        }
        settings
            .validate()
            .map_err(|err| BattleError::InvalidSettings(err.to_string()))?;
        let battle = Battle::new(id, players, settings.battle.clone(), now);
        let scheduler = WaveScheduler::new(WaveSchedule::from_settings(&settings));
        info!(battle = %id, "battle created");
        Ok(Self {
            battle,
            settings,
            scheduler,
            joined: [false; 2],
            ready: [false; 2],
            deployed_this_wave: [0; 2],
            pending: Vec::new(),
            next_sequence: 0,
            next_creature_id: 1,
            last_step_ms: now,
            disconnected_at: [None; 2],
            outbox: Vec::new(),
        })
    }

    /// The battle as it stands.
    #[must_use]
    pub fn battle(&self) -> &Battle {
        &self.battle
    }

    /// Read-only copy of the battle.
    #[must_use]
    pub fn snapshot(&self) -> Battle {
        self.battle.clone()
    }

    /// Settings this battle runs with.
    #[must_use]
    pub fn settings(&self) -> &BattleSettings {
        &self.settings
    }

    /// Current wave phase, `None` while waiting or finished.
    #[must_use]
    pub fn phase(&self) -> Option<WavePhase> {
        self.scheduler.phase()
    }

    /// Drawing phases entered so far.
    #[must_use]
    pub fn drawing_phases(&self) -> u32 {
        self.scheduler.drawing_phases()
    }

    /// Deployments queued for the next tick boundary.
    #[must_use]
    pub fn pending_deployments(&self) -> usize {
        self.pending.len()
    }

    /// Take buffered events.
    pub fn drain_events(&mut self) -> Vec<BattleEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Join, or reconnect after a disconnect. The battle starts once both
    /// players have joined.
    ///
    /// # Errors
    ///
    /// [`BattleError::InvalidPhase`] once finished, [`BattleError::AlreadyFull`]
    /// for anyone outside the roster.
    pub fn join(&mut self, player: &PlayerId, now: u64) -> BattleResult<Side> {
        if self.battle.is_finished() {
            return Err(self.reject(player, "join", BattleError::InvalidPhase {
                operation: "join",
                status: self.battle.status,
            }));
        }
        let Some(side) = self.battle.side_of(player) else {
            return Err(self.reject(player, "join", BattleError::AlreadyFull {
                battle: self.battle.id,
            }));
        };

        let reconnect = self.joined[side.index()];
        self.joined[side.index()] = true;
        if self.disconnected_at[side.index()].take().is_some() {
            info!(battle = %self.battle.id, %player, "player reconnected");
        }
        self.outbox.push(BattleEvent::Join {
            player: player.clone(),
            side,
            reconnect,
        });

        if self.battle.status == BattleStatus::Waiting && self.joined.iter().all(|&j| j) {
            self.start(now);
        }
        Ok(side)
    }

    fn start(&mut self, now: u64) {
        self.battle.started_at = Some(now);
        self.last_step_ms = now;
        self.battle.state.timestamp = self.battle.state.timestamp.max(now);
        info!(
            battle = %self.battle.id,
            player1 = %self.battle.players[0],
            player2 = %self.battle.players[1],
            "battle started"
        );
        self.outbox.push(BattleEvent::Start {
            players: self.battle.players.clone(),
            started_at: now,
        });
        let transitions = self.scheduler.start(now);
        self.apply_transitions(transitions, now);
    }

    /// Queue a creature for the current wave.
    ///
    /// # Errors
    ///
    /// - [`BattleError::PlayerNotFound`] for anyone outside the roster
    /// - [`BattleError::SessionTimeout`] past the maximum battle duration
    /// - [`BattleError::InvalidPhase`] outside drawing or after the deadline
    /// - [`BattleError::InvalidLane`] / [`BattleError::LaneClosed`] for a bad lane
    /// - [`BattleError::InvalidCreature`] for unusable stats
    /// - [`BattleError::DeployLimitExceeded`] once the wave's slots are used
    pub fn deploy(
        &mut self,
        player: &PlayerId,
        creature: Creature,
        lane: usize,
        now: u64,
    ) -> BattleResult<DeploymentAck> {
        let side = self.side_of(player, "deploy")?;
        self.check_duration(player, now)?;
        if !self.scheduler.accepts_deployments(now) {
            return Err(self.reject(player, "deploy", BattleError::InvalidPhase {
                operation: "deploy",
                status: self.battle.status,
            }));
        }
        let lane_count = self.battle.state.lanes.len();
        match self.battle.state.lane(lane) {
            None => {
                return Err(self.reject(player, "deploy", BattleError::InvalidLane {
                    lane,
                    lane_count,
                }));
            }
            Some(state) if state.closed => {
                return Err(self.reject(player, "deploy", BattleError::LaneClosed { lane }));
            }
            Some(_) => {}
        }
        if let Err(err) = creature.stats.validate() {
            return Err(self.reject(player, "deploy", err));
        }
        let limit = self.settings.timing.deployment_lanes;
        if self.deployed_this_wave[side.index()] >= limit {
            return Err(self.reject(player, "deploy", BattleError::DeployLimitExceeded {
                player: player.clone(),
                limit,
            }));
        }

        self.deployed_this_wave[side.index()] += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.push(PendingDeployment {
            submitted_at: now,
            player: player.clone(),
            sequence,
            side,
            lane,
            creature,
        });
        debug!(battle = %self.battle.id, %player, lane, sequence, "deployment queued");
        Ok(DeploymentAck {
            battle_id: self.battle.id,
            player: player.clone(),
            wave: self.battle.current_wave,
            lane,
            sequence,
            slots_remaining: limit - self.deployed_this_wave[side.index()],
        })
    }

    /// Ask to end drawing early. Takes effect at the next tick once both
    /// players are ready.
    ///
    /// # Errors
    ///
    /// [`BattleError::FeatureDisabled`] when early deployment is off,
    /// [`BattleError::InvalidPhase`] outside drawing.
    pub fn ready(&mut self, player: &PlayerId, now: u64) -> BattleResult<()> {
        let side = self.side_of(player, "ready")?;
        if !self.settings.battle.early_deployment_enabled {
            return Err(self.reject(player, "ready", BattleError::FeatureDisabled {
                feature: "early deployment",
            }));
        }
        self.check_duration(player, now)?;
        if !self.scheduler.accepts_deployments(now) {
            return Err(self.reject(player, "ready", BattleError::InvalidPhase {
                operation: "ready",
                status: self.battle.status,
            }));
        }
        self.ready[side.index()] = true;
        Ok(())
    }

    /// End the battle now; the opponent wins.
    ///
    /// # Errors
    ///
    /// [`BattleError::InvalidPhase`] if already finished.
    pub fn forfeit(&mut self, player: &PlayerId, now: u64) -> BattleResult<()> {
        let side = self.side_of(player, "forfeit")?;
        if self.battle.is_finished() {
            return Err(self.reject(player, "forfeit", BattleError::InvalidPhase {
                operation: "forfeit",
                status: self.battle.status,
            }));
        }
        info!(battle = %self.battle.id, %player, "player forfeited");
        self.finish(Some(side.opponent()), FinishReason::Forfeit, now);
        Ok(())
    }

    /// Record a dropped connection. The player forfeits unless they rejoin
    /// within the grace period.
    ///
    /// # Errors
    ///
    /// [`BattleError::PlayerNotFound`] for anyone outside the roster.
    pub fn disconnect(&mut self, player: &PlayerId, now: u64) -> BattleResult<()> {
        let side = self.side_of(player, "disconnect")?;
        if self.battle.is_finished() {
            return Ok(());
        }
        warn!(battle = %self.battle.id, %player, "player disconnected");
        self.disconnected_at[side.index()].get_or_insert(now);
        Ok(())
    }

    /// Run every simulation step due at `now`.
    ///
    /// Waiting and finished battles return an empty outcome. At most
    /// `max_catch_up_ticks` steps run per call; when further behind, the
    /// backlog is dropped and the last step runs at the latest boundary.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvariantViolation`] if the territory reaches an
    /// impossible state. The battle is finished with a diagnostic and its
    /// `battle:end` event stays buffered for [`Self::drain_events`].
    pub fn tick(&mut self, now: u64) -> BattleResult<TickOutcome> {
        let mut steps = 0;
        if matches!(self.battle.status, BattleStatus::Drawing | BattleStatus::Battling) {
            // A timeout preempts any backlog still waiting to be simulated.
            if self.timed_out(now) {
                self.last_step_ms = self.last_step_ms.max(now);
                self.time_out(now);
            }
            let tick_ms = self.settings.timing.tick_ms();
            let max_steps = self.settings.timing.max_catch_up_ticks;
            while !self.battle.is_finished() && self.last_step_ms + tick_ms <= now {
                let behind = now - self.last_step_ms;
                if steps + 1 >= max_steps && behind >= 2 * tick_ms {
                    // Skip to the latest step boundary so the final step lands on `now`.
                    warn!(battle = %self.battle.id, behind_ms = behind, "dropping tick backlog");
                    self.last_step_ms = now - behind % tick_ms - tick_ms;
                }
                let at = self.last_step_ms + tick_ms;
                self.last_step_ms = at;
                self.step(at)?;
                steps += 1;
            }
        }
        Ok(TickOutcome {
            state: self.battle.state.clone(),
            events: self.drain_events(),
            steps,
        })
    }

    fn timed_out(&self, at: u64) -> bool {
        let max = self.settings.timing.max_duration_ms();
        self.battle
            .started_at
            .is_some_and(|started| at.saturating_sub(started) >= max)
    }

    /// Finish on time; the aggregate leader wins, a tie is a draw.
    fn time_out(&mut self, at: u64) {
        let elapsed = self.battle.started_at.map_or(0, |started| at.saturating_sub(started));
        warn!(battle = %self.battle.id, elapsed_ms = elapsed, "battle timed out");
        let leader = self.battle.state.leader();
        self.finish(leader, FinishReason::Timeout, at);
    }

    fn step(&mut self, at: u64) -> BattleResult<()> {
        if self.timed_out(at) {
            self.time_out(at);
            return Ok(());
        }
        let grace = self.settings.timing.disconnect_grace_ms();
        for side in Side::BOTH {
            if let Some(since) = self.disconnected_at[side.index()]
                && at.saturating_sub(since) >= grace
            {
                warn!(battle = %self.battle.id, %side, "disconnect grace expired");
                self.finish(Some(side.opponent()), FinishReason::Disconnect, at);
                return Ok(());
            }
        }

        if matches!(self.scheduler.phase(), Some(WavePhase::Battling { .. })) {
            self.simulate(at)?;
        } else {
            self.battle.state.timestamp = self.battle.state.timestamp.max(at);
        }

        let state = &self.battle.state;
        let wave = self.battle.current_wave;
        let signals = WaveSignals {
            both_ready: self.ready.iter().all(|&r| r),
            combat_settled: state.lanes.iter().all(|lane| {
                lane.closed || !lane.creatures.iter().any(|c| c.wave == wave && c.is_alive())
            }),
            battle_decided: state.sole_owner().is_some() || state.all_closed(),
        };
        let transitions = self.scheduler.advance(at, signals);
        self.apply_transitions(transitions, at);
        Ok(())
    }

    /// One combat and territory step across every lane.
    fn simulate(&mut self, at: u64) -> BattleResult<()> {
        let previous = self.battle.state.clone();
        let tick_ms = u32::try_from(self.settings.timing.tick_ms()).unwrap_or(u32::MAX);
        let ctx = TickContext {
            dt_ms: tick_ms,
            battlefield_length: self.settings.battle.battlefield_length,
            ranged_support: self.settings.battle.allow_ranged_support,
            config: &self.settings.combat,
        };

        for lane in &mut self.battle.state.lanes {
            let lane_events = combat::resolve_lane_tick(lane, &ctx);
            self.outbox.extend(lane_events.into_iter().map(BattleEvent::from));
        }

        let captures = control::update_territory(
            &mut self.battle.state,
            &self.settings.control,
            self.settings.battle.allow_cross_lane_movement,
            at,
        );
        for capture in captures {
            let player = self.battle.player(capture.side).clone();
            info!(battle = %self.battle.id, lane = capture.lane, %player, "lane captured");
            self.outbox.push(BattleEvent::LaneCaptured {
                lane: capture.lane,
                side: capture.side,
                player,
            });
            for (id, lane) in capture.relocated {
                if let Some(moved) = self.find_creature(id, lane) {
                    self.outbox.push(BattleEvent::CreatureMove {
                        creature: id,
                        owner: moved.owner,
                        lane,
                        position: moved.position,
                    });
                }
            }
        }

        if let Err(violation) = validate_transition(
            &previous,
            &self.battle.state,
            self.settings.battle.lane_count,
        ) {
            error!(battle = %self.battle.id, %violation, "territory invariant violated");
            self.battle.diagnostic = Some(violation);
            self.finish(None, FinishReason::InvariantViolation, at);
            return Err(violation.into());
        }

        debug!(
            battle = %self.battle.id,
            at,
            creatures = self.battle.state.creature_count(),
            player1 = %self.battle.state.aggregate_control.player1,
            player2 = %self.battle.state.aggregate_control.player2,
            "combat step"
        );
        self.outbox.push(BattleEvent::TerritoryUpdate {
            state: self.battle.state.clone(),
        });
        Ok(())
    }

    fn apply_transitions(&mut self, transitions: Vec<WaveTransition>, at: u64) {
        for transition in transitions {
            match transition {
                WaveTransition::Countdown { wave, ends_at } => {
                    self.battle.current_wave = wave;
                    self.battle.wave_start_time = at;
                    self.ready = [false; 2];
                    self.deployed_this_wave = [0; 2];
                    info!(battle = %self.battle.id, wave, "wave starting");
                    self.outbox.push(BattleEvent::Countdown { wave, ends_at });
                }
                WaveTransition::DrawingStarted { wave, deadline } => {
                    self.outbox.push(BattleEvent::DrawingStart {
                        wave,
                        deadline,
                        deployment_slots: self.settings.timing.deployment_lanes,
                    });
                }
                WaveTransition::DrawingComplete { wave, early } => {
                    self.outbox.push(BattleEvent::DrawingComplete { wave, early });
                }
                WaveTransition::Deployment { wave } => self.place_pending(wave),
                WaveTransition::CombatStarted { wave, deadline } => {
                    debug!(battle = %self.battle.id, wave, deadline, "combat started");
                }
                WaveTransition::WaveComplete { wave } => {
                    info!(battle = %self.battle.id, wave, "wave complete");
                }
                WaveTransition::WavesExhausted => {
                    let state = &self.battle.state;
                    let (winner, reason) = match state.sole_owner() {
                        Some(owner) => (Some(owner), FinishReason::AllLanesCaptured),
                        None if state.all_closed() => {
                            (state.leader(), FinishReason::AllLanesClosed)
                        }
                        None => (state.leader(), FinishReason::WavesExhausted),
                    };
                    self.finish(winner, reason, at);
                }
            }
        }
        if let Some(phase) = self.scheduler.phase()
            && !self.battle.is_finished()
        {
            self.battle.status = phase.status();
        }
    }

    /// Insert queued creatures in arrival order, ties by player id.
    fn place_pending(&mut self, wave: u32) {
        let tuning = &self.settings.combat.abilities;
        for lane in &mut self.battle.state.lanes {
            for creature in &mut lane.creatures {
                abilities::reset_for_wave(creature, tuning);
            }
        }

        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by(|a, b| {
            (a.submitted_at, &a.player, a.sequence).cmp(&(b.submitted_at, &b.player, b.sequence))
        });
        for deployment in pending {
            let id = CreatureId(self.next_creature_id);
            self.next_creature_id += 1;
            let mut spawned = CreatureInLane::spawn(
                id,
                &deployment.creature,
                deployment.side,
                deployment.lane,
                wave,
                self.settings.battle.allow_ranged_support,
            );
            abilities::reset_for_wave(&mut spawned, tuning);
            let Some(lane) = self.battle.state.lanes.get_mut(deployment.lane) else {
                continue;
            };
            match lane.insert(spawned.clone()) {
                Ok(()) => {
                    debug!(battle = %self.battle.id, creature = %id, lane = deployment.lane, "spawned");
                    self.outbox.push(BattleEvent::Spawn {
                        wave,
                        creature: spawned,
                    });
                }
                Err(err) => {
                    warn!(battle = %self.battle.id, player = %deployment.player, %err, "deployment dropped");
                }
            }
        }
    }

    fn finish(&mut self, winner: Option<Side>, reason: FinishReason, at: u64) {
        if self.battle.is_finished() {
            return;
        }
        self.scheduler.finish();
        self.pending.clear();
        self.battle.status = BattleStatus::Finished;
        self.battle.winner = winner.map(|side| self.battle.player(side).clone());
        self.battle.finish_reason = Some(reason);
        self.battle.ended_at = Some(at);
        info!(
            battle = %self.battle.id,
            winner = self.battle.winner.as_ref().map_or("draw", PlayerId::as_str),
            ?reason,
            "battle finished"
        );
        self.outbox.push(BattleEvent::End {
            winner: self.battle.winner.clone(),
            reason,
            aggregate_control: self.battle.state.aggregate_control,
            ended_at: at,
        });
    }

    fn find_creature(&self, id: CreatureId, lane: usize) -> Option<&CreatureInLane> {
        self.battle
            .state
            .lane(lane)?
            .creatures
            .iter()
            .find(|c| c.id == id)
    }

    fn side_of(&self, player: &PlayerId, operation: &'static str) -> BattleResult<Side> {
        self.battle.side_of(player).ok_or_else(|| {
            self.reject(player, operation, BattleError::PlayerNotFound(player.clone()))
        })
    }

    fn check_duration(&self, player: &PlayerId, now: u64) -> BattleResult<()> {
        let Some(started) = self.battle.started_at else {
            return Ok(());
        };
        let elapsed = now.saturating_sub(started);
        if elapsed >= self.settings.timing.max_duration_ms() && !self.battle.is_finished() {
            return Err(self.reject(player, "act", BattleError::SessionTimeout { elapsed_ms: elapsed }));
        }
        Ok(())
    }

    fn reject(&self, player: &PlayerId, operation: &str, err: BattleError) -> BattleError {
        warn!(battle = %self.battle.id, %player, operation, code = err.code(), %err, "request rejected");
        err
    }
}
