//! Events exchanged with clients.
//!
//! Names match the socket vocabulary used by the game client. Events are
//! serialized as `{"event": <name>, "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::battle::{BattleId, FinishReason, PlayerId};
use crate::combat::CombatEvent;
use crate::territory::{
    AggregateControl, Creature, CreatureId, CreatureInLane, Side, TerritoryState,
};

/// `battle:join`
pub const BATTLE_JOIN: &str = "battle:join";
/// `battle:start`
pub const BATTLE_START: &str = "battle:start";
/// `battle:end`
pub const BATTLE_END: &str = "battle:end";
/// `wave:countdown`
pub const WAVE_COUNTDOWN: &str = "wave:countdown";
/// `wave:drawing:start`
pub const WAVE_DRAWING_START: &str = "wave:drawing:start";
/// `wave:drawing:complete`
pub const WAVE_DRAWING_COMPLETE: &str = "wave:drawing:complete";
/// `wave:deployment`, sent by clients.
pub const WAVE_DEPLOYMENT: &str = "wave:deployment";
/// `wave:spawn`
pub const WAVE_SPAWN: &str = "wave:spawn";
/// `territory:update`
pub const TERRITORY_UPDATE: &str = "territory:update";
/// `territory:lane:captured`
pub const TERRITORY_LANE_CAPTURED: &str = "territory:lane:captured";
/// `combat:creature:move`
pub const COMBAT_CREATURE_MOVE: &str = "combat:creature:move";
/// `combat:creature:attack`
pub const COMBAT_CREATURE_ATTACK: &str = "combat:creature:attack";
/// `combat:creature:death`
pub const COMBAT_CREATURE_DEATH: &str = "combat:creature:death";

/// An event broadcast from a session to its clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum BattleEvent {
    /// A player joined or reconnected.
    #[serde(rename = "battle:join", rename_all = "camelCase")]
    Join {
        /// Player id.
        player: PlayerId,
        /// Side assigned.
        side: Side,
        /// Whether this was a reconnect.
        reconnect: bool,
    },
    /// Both players are in; wave 1 begins.
    #[serde(rename = "battle:start", rename_all = "camelCase")]
    Start {
        /// Player 1 then player 2.
        players: [PlayerId; 2],
        /// Start time.
        started_at: u64,
    },
    /// The battle finished.
    #[serde(rename = "battle:end", rename_all = "camelCase")]
    End {
        /// Winner, `None` on a draw.
        winner: Option<PlayerId>,
        /// Why it ended.
        reason: FinishReason,
        /// Final aggregate control.
        aggregate_control: AggregateControl,
        /// End time.
        ended_at: u64,
    },
    /// A wave is about to open for drawing.
    #[serde(rename = "wave:countdown", rename_all = "camelCase")]
    Countdown {
        /// Wave number.
        wave: u32,
        /// When drawing opens.
        ends_at: u64,
    },
    /// Drawing opened.
    #[serde(rename = "wave:drawing:start", rename_all = "camelCase")]
    DrawingStart {
        /// Wave number.
        wave: u32,
        /// Submission deadline.
        deadline: u64,
        /// Deployments allowed per player.
        deployment_slots: u32,
    },
    /// Drawing closed.
    #[serde(rename = "wave:drawing:complete", rename_all = "camelCase")]
    DrawingComplete {
        /// Wave number.
        wave: u32,
        /// Closed early because both players readied.
        early: bool,
    },
    /// A queued creature entered its lane.
    #[serde(rename = "wave:spawn", rename_all = "camelCase")]
    Spawn {
        /// Wave number.
        wave: u32,
        /// The creature as placed.
        creature: CreatureInLane,
    },
    /// Territory snapshot.
    #[serde(rename = "territory:update", rename_all = "camelCase")]
    TerritoryUpdate {
        /// Current territory.
        state: TerritoryState,
    },
    /// A lane reached full control and closed.
    #[serde(rename = "territory:lane:captured", rename_all = "camelCase")]
    LaneCaptured {
        /// Lane index.
        lane: usize,
        /// Capturing side.
        side: Side,
        /// Capturing player.
        player: PlayerId,
    },
    /// A creature moved, or was moved to another lane.
    #[serde(rename = "combat:creature:move", rename_all = "camelCase")]
    CreatureMove {
        /// Creature.
        creature: CreatureId,
        /// Owner.
        owner: Side,
        /// Lane index.
        lane: usize,
        /// Position relative to the owner's base.
        position: f64,
    },
    /// A creature attacked.
    #[serde(rename = "combat:creature:attack", rename_all = "camelCase")]
    CreatureAttack {
        /// Attacker.
        attacker: CreatureId,
        /// Target.
        defender: CreatureId,
        /// Lane index.
        lane: usize,
        /// Health removed.
        damage: u32,
        /// Damage soaked by a shield.
        absorbed: u32,
        /// Element multiplier.
        multiplier: f64,
        /// Target health after the hit.
        defender_health: u32,
    },
    /// A creature died.
    #[serde(rename = "combat:creature:death", rename_all = "camelCase")]
    CreatureDeath {
        /// Creature.
        creature: CreatureId,
        /// Owner.
        owner: Side,
        /// Lane index.
        lane: usize,
        /// Lethal attacker, `None` for poison.
        killer: Option<CreatureId>,
    },
}

impl BattleEvent {
    /// Socket event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            BattleEvent::Join { .. } => BATTLE_JOIN,
            BattleEvent::Start { .. } => BATTLE_START,
            BattleEvent::End { .. } => BATTLE_END,
            BattleEvent::Countdown { .. } => WAVE_COUNTDOWN,
            BattleEvent::DrawingStart { .. } => WAVE_DRAWING_START,
            BattleEvent::DrawingComplete { .. } => WAVE_DRAWING_COMPLETE,
            BattleEvent::Spawn { .. } => WAVE_SPAWN,
            BattleEvent::TerritoryUpdate { .. } => TERRITORY_UPDATE,
            BattleEvent::LaneCaptured { .. } => TERRITORY_LANE_CAPTURED,
            BattleEvent::CreatureMove { .. } => COMBAT_CREATURE_MOVE,
            BattleEvent::CreatureAttack { .. } => COMBAT_CREATURE_ATTACK,
            BattleEvent::CreatureDeath { .. } => COMBAT_CREATURE_DEATH,
        }
    }

    /// Serialize with the battle id attached.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self, battle: BattleId) -> serde_json::Result<String> {
        serde_json::to_string(&Envelope {
            battle_id: battle,
            event: self,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    battle_id: BattleId,
    #[serde(flatten)]
    event: &'a BattleEvent,
}

impl From<CombatEvent> for BattleEvent {
    fn from(event: CombatEvent) -> Self {
        match event {
            CombatEvent::Moved {
                creature,
                owner,
                lane,
                position,
            } => BattleEvent::CreatureMove {
                creature,
                owner,
                lane,
                position,
            },
            CombatEvent::Attacked {
                attacker,
                defender,
                lane,
                damage,
                absorbed,
                multiplier,
                defender_health,
            } => BattleEvent::CreatureAttack {
                attacker,
                defender,
                lane,
                damage,
                absorbed,
                multiplier,
                defender_health,
            },
            CombatEvent::Died {
                creature,
                owner,
                lane,
                killer,
            } => BattleEvent::CreatureDeath {
                creature,
                owner,
                lane,
                killer,
            },
        }
    }
}

/// A `wave:deployment` message from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    /// Target battle.
    pub battle_id: BattleId,
    /// Submitting player.
    pub player_id: PlayerId,
    /// Creature to deploy.
    pub creature: Creature,
    /// Target lane.
    pub lane_index: usize,
}
