//! The battle record shared with clients.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::TerritorialBattleConfig;
use crate::territory::{InvariantViolation, Side, TerritoryState};

/// Unique identifier of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BattleId(pub u64);

impl fmt::Display for BattleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "battle-{}", self.0)
    }
}

/// Identity of a player, as issued by the account service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleStatus {
    /// Created, waiting for both players.
    Waiting,
    /// Players are drawing and deploying.
    Drawing,
    /// Creatures are fighting.
    Battling,
    /// Terminal.
    Finished,
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BattleStatus::Waiting => "waiting",
            BattleStatus::Drawing => "drawing",
            BattleStatus::Battling => "battling",
            BattleStatus::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Why a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinishReason {
    /// One side closed every lane.
    AllLanesCaptured,
    /// Every lane closed, split between the sides.
    AllLanesClosed,
    /// The last wave completed.
    WavesExhausted,
    /// The maximum battle duration elapsed.
    Timeout,
    /// A player forfeited.
    Forfeit,
    /// A player stayed disconnected past the grace period.
    Disconnect,
    /// The territory reached an impossible state.
    InvariantViolation,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinishReason::AllLanesCaptured => "all lanes captured",
            FinishReason::AllLanesClosed => "all lanes closed",
            FinishReason::WavesExhausted => "waves exhausted",
            FinishReason::Timeout => "timeout",
            FinishReason::Forfeit => "forfeit",
            FinishReason::Disconnect => "disconnect",
            FinishReason::InvariantViolation => "invariant violation",
        };
        f.write_str(name)
    }
}

/// One match between two players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    /// Battle id.
    pub id: BattleId,
    /// Player 1 then player 2.
    pub players: [PlayerId; 2],
    /// Battle configuration.
    pub config: TerritorialBattleConfig,
    /// Current territory.
    pub state: TerritoryState,
    /// Current wave, starting at 1 (0 before the battle starts).
    pub current_wave: u32,
    /// Session clock time the current wave started.
    pub wave_start_time: u64,
    /// Lifecycle status.
    pub status: BattleStatus,
    /// Winner; `None` while running or on a draw.
    pub winner: Option<PlayerId>,
    /// Why the battle ended.
    pub finish_reason: Option<FinishReason>,
    /// Creation time.
    pub created_at: u64,
    /// Time both players had joined.
    pub started_at: Option<u64>,
    /// End time.
    pub ended_at: Option<u64>,
    /// Violation that aborted the battle, kept for diagnostics.
    pub diagnostic: Option<InvariantViolation>,
}

impl Battle {
    /// Create a battle in `waiting`.
    #[must_use]
    pub fn new(
        id: BattleId,
        players: [PlayerId; 2],
        config: TerritorialBattleConfig,
        created_at: u64,
    ) -> Self {
        let mut state = TerritoryState::new(config.lane_count);
        state.timestamp = created_at;
        Self {
            id,
            players,
            config,
            state,
            current_wave: 0,
            wave_start_time: created_at,
            status: BattleStatus::Waiting,
            winner: None,
            finish_reason: None,
            created_at,
            started_at: None,
            ended_at: None,
            diagnostic: None,
        }
    }

    /// Side played by `player`.
    #[must_use]
    pub fn side_of(&self, player: &PlayerId) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| &self.players[side.index()] == player)
    }

    /// Player on `side`.
    #[must_use]
    pub fn player(&self, side: Side) -> &PlayerId {
        &self.players[side.index()]
    }

    /// Whether the battle has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status == BattleStatus::Finished
    }

    /// Whether the battle ended without a winner.
    #[must_use]
    pub fn is_draw(&self) -> bool {
        self.is_finished() && self.winner.is_none()
    }
}
