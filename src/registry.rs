//! Registry of running battles.
//!
//! Each battle sits behind its own mutex; nothing is shared between
//! sessions. Readers get the latest published snapshot without touching the
//! session lock. [`BattleRegistry::tick_all`] advances every session in
//! parallel on a bounded rayon pool, then publishes events in battle-id order
//! after every lock has been released.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use rayon::prelude::*;
use tracing::{error, info};

use crate::battle::{Battle, BattleId, PlayerId};
use crate::config::{BattleSettings, ConfigError};
use crate::error::{BattleError, BattleResult};
use crate::session::{BattleEvent, BattleSession, Clock, DeploymentAck, DeploymentRequest};
use crate::territory::{Creature, Side};

/// Destination for session events. Implementations must not block for long;
/// they are called from the driver thread.
pub trait EventSink: Send + Sync {
    /// Deliver events for one battle, in order.
    fn publish(&self, battle: BattleId, events: &[BattleEvent]);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _battle: BattleId, _events: &[BattleEvent]) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<(BattleId, BattleEvent)>>,
}

impl CollectingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything collected so far.
    pub fn take(&self) -> Vec<(BattleId, BattleEvent)> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Events collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, battle: BattleId, events: &[BattleEvent]) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(events.iter().cloned().map(|e| (battle, e)));
    }
}

/// Writes one JSON object per event.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap a writer.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn publish(&self, battle: BattleId, events: &[BattleEvent]) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for event in events {
            let written = event
                .to_json(battle)
                .map_err(std::io::Error::other)
                .and_then(|line| writeln!(out, "{line}"));
            if let Err(err) = written {
                error!(%battle, event = event.name(), %err, "failed to write event");
            }
        }
    }
}

struct SessionEntry {
    session: Mutex<BattleSession>,
    snapshot: RwLock<Arc<Battle>>,
}

impl SessionEntry {
    fn publish_snapshot(&self, session: &BattleSession) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(session.snapshot());
    }
}

/// Summary of one [`BattleRegistry::tick_all`] pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    /// Sessions visited.
    pub battles: usize,
    /// Simulation steps run across all sessions.
    pub steps: u64,
    /// Sessions that are finished after the pass.
    pub finished: usize,
    /// Sessions that failed with a fatal error.
    pub failed: Vec<(BattleId, BattleError)>,
}

/// All battles served by one process.
pub struct BattleRegistry {
    sessions: RwLock<BTreeMap<BattleId, Arc<SessionEntry>>>,
    next_id: AtomicU64,
    settings: BattleSettings,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for BattleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleRegistry")
            .field("battles", &self.len())
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl BattleRegistry {
    /// Create a registry whose worker pool is sized by `settings.runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the pool cannot start.
    pub fn new(
        settings: BattleSettings,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("battle-tick-{i}"));
        if let Some(threads) = settings.runtime.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;
        Ok(Self {
            sessions: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            settings,
            clock,
            sink,
            pool,
        })
    }

    /// Default settings for new battles.
    #[must_use]
    pub fn settings(&self) -> &BattleSettings {
        &self.settings
    }

    /// Battles currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no battles are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered battle ids in ascending order.
    #[must_use]
    pub fn battle_ids(&self) -> Vec<BattleId> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Create a battle with the registry's default settings.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidRoster`] for an unusable player pair.
    pub fn create(&self, players: [PlayerId; 2]) -> BattleResult<BattleId> {
        self.create_with(players, self.settings.clone())
    }

    /// Create a battle with its own settings.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidRoster`] for an unusable player pair and
    /// [`BattleError::InvalidSettings`] for settings that fail validation.
    pub fn create_with(
        &self,
        players: [PlayerId; 2],
        settings: BattleSettings,
    ) -> BattleResult<BattleId> {
        let id = BattleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = BattleSession::create(id, players, settings, self.clock.now_ms())?;
        let entry = Arc::new(SessionEntry {
            snapshot: RwLock::new(Arc::new(session.snapshot())),
            session: Mutex::new(session),
        });
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);
        Ok(id)
    }

    /// Join or reconnect.
    ///
    /// # Errors
    ///
    /// See [`BattleSession::join`]; also [`BattleError::BattleNotFound`].
    pub fn join(&self, id: BattleId, player: &PlayerId) -> BattleResult<Side> {
        self.with_session(id, |session, now| session.join(player, now))
    }

    /// Queue a deployment.
    ///
    /// # Errors
    ///
    /// See [`BattleSession::deploy`]; also [`BattleError::BattleNotFound`].
    pub fn deploy(
        &self,
        id: BattleId,
        player: &PlayerId,
        creature: Creature,
        lane: usize,
    ) -> BattleResult<DeploymentAck> {
        self.with_session(id, |session, now| session.deploy(player, creature, lane, now))
    }

    /// Handle a `wave:deployment` message.
    ///
    /// # Errors
    ///
    /// Same as [`Self::deploy`].
    pub fn submit(&self, request: DeploymentRequest) -> BattleResult<DeploymentAck> {
        let DeploymentRequest {
            battle_id,
            player_id,
            creature,
            lane_index,
        } = request;
        self.deploy(battle_id, &player_id, creature, lane_index)
    }

    /// Signal early deployment.
    ///
    /// # Errors
    ///
    /// See [`BattleSession::ready`]; also [`BattleError::BattleNotFound`].
    pub fn ready(&self, id: BattleId, player: &PlayerId) -> BattleResult<()> {
        self.with_session(id, |session, now| session.ready(player, now))
    }

    /// Forfeit a battle.
    ///
    /// # Errors
    ///
    /// See [`BattleSession::forfeit`]; also [`BattleError::BattleNotFound`].
    pub fn forfeit(&self, id: BattleId, player: &PlayerId) -> BattleResult<()> {
        self.with_session(id, |session, now| session.forfeit(player, now))
    }

    /// Report a dropped connection.
    ///
    /// # Errors
    ///
    /// See [`BattleSession::disconnect`]; also [`BattleError::BattleNotFound`].
    pub fn disconnect(&self, id: BattleId, player: &PlayerId) -> BattleResult<()> {
        self.with_session(id, |session, now| session.disconnect(player, now))
    }

    /// Latest published state of a battle. Never waits on a running tick.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::BattleNotFound`] for an unknown id.
    pub fn state(&self, id: BattleId) -> BattleResult<Arc<Battle>> {
        let entry = self.entry(id)?;
        let snapshot = entry.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(&snapshot))
    }

    /// Tick every session once, in parallel, then publish their events.
    pub fn tick_all(&self) -> TickReport {
        let entries: Vec<(BattleId, Arc<SessionEntry>)> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(entry)))
            .collect();
        let now = self.clock.now_ms();

        let results: Vec<_> = self.pool.install(|| {
            entries
                .par_iter()
                .map(|(id, entry)| {
                    let mut session = entry.session.lock().unwrap_or_else(PoisonError::into_inner);
                    let (steps, events, failure) = match session.tick(now) {
                        Ok(outcome) => (outcome.steps, outcome.events, None),
                        Err(err) => (0, session.drain_events(), Some(err)),
                    };
                    entry.publish_snapshot(&session);
                    (*id, steps, events, failure, session.battle().is_finished())
                })
                .collect()
        });

        let mut report = TickReport {
            battles: results.len(),
            ..TickReport::default()
        };
        for (id, steps, events, failure, finished) in results {
            report.steps += u64::from(steps);
            if finished {
                report.finished += 1;
            }
            if let Some(err) = failure {
                error!(battle = %id, %err, "session failed");
                report.failed.push((id, err));
            }
            if !events.is_empty() {
                self.sink.publish(id, &events);
            }
        }
        report
    }

    /// Drop finished battles. Returns how many were removed.
    pub fn remove_finished(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, entry| {
            !entry
                .snapshot
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_finished()
        });
        before - sessions.len()
    }

    /// Tick on the configured interval until `stop` is set.
    pub fn run(&self, stop: &AtomicBool) {
        let interval = Duration::from_millis(self.settings.timing.tick_ms());
        info!(
            interval_ms = self.settings.timing.tick_ms(),
            threads = self.pool.current_num_threads(),
            "battle loop started"
        );
        while !stop.load(Ordering::Relaxed) {
            let report = self.tick_all();
            if report.finished > 0 {
                let removed = self.remove_finished();
                tracing::debug!(removed, "finished battles removed");
            }
            std::thread::sleep(interval);
        }
        info!("battle loop stopped");
    }

    fn entry(&self, id: BattleId) -> BattleResult<Arc<SessionEntry>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(BattleError::BattleNotFound(id))
    }

    fn with_session<T>(
        &self,
        id: BattleId,
        op: impl FnOnce(&mut BattleSession, u64) -> BattleResult<T>,
    ) -> BattleResult<T> {
        let entry = self.entry(id)?;
        let (result, events) = {
            let mut session = entry.session.lock().unwrap_or_else(PoisonError::into_inner);
            let result = op(&mut session, self.clock.now_ms());
            let events = session.drain_events();
            entry.publish_snapshot(&session);
            (result, events)
        };
        if !events.is_empty() {
            self.sink.publish(id, &events);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::BattleStatus;
    use crate::session::{ManualClock, events};
    use crate::territory::{CreatureStats, ElementType};

    fn registry() -> (BattleRegistry, Arc<ManualClock>, Arc<CollectingSink>) {
        let clock = Arc::new(ManualClock::new(0));
        let sink = Arc::new(CollectingSink::new());
        let mut settings = BattleSettings::default();
        settings.runtime.worker_threads = Some(2);
        let registry = BattleRegistry::new(settings, clock.clone(), sink.clone()).unwrap();
        (registry, clock, sink)
    }

    fn players() -> [PlayerId; 2] {
        [PlayerId::from("alice"), PlayerId::from("bob")]
    }

    #[test]
    fn test_unknown_battle_not_found() {
        let (registry, _, _) = registry();
        assert_eq!(
            registry.join(BattleId(99), &PlayerId::from("alice")),
            Err(BattleError::BattleNotFound(BattleId(99)))
        );
        assert!(registry.state(BattleId(99)).is_err());
    }

    #[test]
    fn test_join_publishes_events_and_snapshot() {
        let (registry, _, sink) = registry();
        let id = registry.create(players()).unwrap();
        assert_eq!(registry.state(id).unwrap().status, BattleStatus::Waiting);

        registry.join(id, &PlayerId::from("alice")).unwrap();
        registry.join(id, &PlayerId::from("bob")).unwrap();
        assert_eq!(registry.state(id).unwrap().status, BattleStatus::Drawing);

        let names: Vec<_> = sink.take().iter().map(|(_, e)| e.name()).collect();
        assert!(names.contains(&events::BATTLE_START));
    }

    #[test]
    fn test_create_with_rejects_bad_settings() {
        let (registry, clock, _) = registry();
        let good = registry.create(players()).unwrap();
        let mut settings = BattleSettings::default();
        settings.timing.territory_update_interval_ms = 0;
        assert!(matches!(
            registry.create_with(players(), settings),
            Err(BattleError::InvalidSettings(_))
        ));
        assert_eq!(registry.battle_ids(), vec![good]);

        registry.join(good, &PlayerId::from("alice")).unwrap();
        registry.join(good, &PlayerId::from("bob")).unwrap();
        clock.advance(500);
        let report = registry.tick_all();
        assert_eq!(report.battles, 1);
        assert_eq!(report.steps, 1);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_submit_routes_deployment() {
        let (registry, _, _) = registry();
        let id = registry.create(players()).unwrap();
        registry.join(id, &PlayerId::from("alice")).unwrap();
        registry.join(id, &PlayerId::from("bob")).unwrap();
        let request = DeploymentRequest {
            battle_id: id,
            player_id: PlayerId::from("bob"),
            lane_index: 1,
            creature: Creature::new(
                "d1",
                "Pebble",
                CreatureStats {
                    health: 20,
                    attack: 8,
                    defense: 2,
                    speed: 10,
                    element: ElementType::Earth,
                    special_ability: None,
                },
            ),
        };
        let ack = registry.submit(request).unwrap();
        assert_eq!(ack.lane, 1);
        assert_eq!(ack.battle_id, id);
    }

    #[test]
    fn test_tick_all_publishes_in_id_order() {
        let (registry, clock, sink) = registry();
        let ids: Vec<_> = (0..4).map(|_| registry.create(players()).unwrap()).collect();
        for &id in &ids {
            registry.join(id, &PlayerId::from("alice")).unwrap();
            registry.join(id, &PlayerId::from("bob")).unwrap();
        }
        sink.take();

        clock.set(181_000);
        let report = registry.tick_all();
        assert_eq!(report.battles, 4);
        assert!(report.failed.is_empty());
        assert!(report.steps > 0);

        let order: Vec<BattleId> = sink.take().into_iter().map(|(id, _)| id).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }

    #[test]
    fn test_remove_finished() {
        let (registry, _, _) = registry();
        let id = registry.create(players()).unwrap();
        let keep = registry.create(players()).unwrap();
        registry.forfeit(id, &PlayerId::from("alice")).unwrap();
        assert_eq!(registry.remove_finished(), 1);
        assert_eq!(registry.battle_ids(), vec![keep]);
    }

    #[test]
    fn test_json_lines_sink_writes_names() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.publish(
            BattleId(2),
            &[BattleEvent::DrawingComplete {
                wave: 1,
                early: false,
            }],
        );
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.contains("\"event\":\"wave:drawing:complete\""));
        assert!(text.ends_with('\n'));
    }
}
