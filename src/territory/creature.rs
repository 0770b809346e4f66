//! Creatures as deployed into lanes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BattleError;
use crate::territory::ElementType;

/// Lane position of a side's own base edge.
pub const BASE_EDGE: f64 = 0.0;

/// Lane position of the opposing base edge.
pub const ENEMY_EDGE: f64 = 100.0;

/// Optional special ability assigned during drawing analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialAbility {
    /// Periodically restores a share of max health.
    Heal,
    /// Absorbs a fixed amount of damage once per wave.
    Shield,
    /// First attack deals multiplied damage.
    Burst,
    /// Hits apply damage over time.
    Poison,
    /// Hits disable the target's movement and attacks for a while.
    Stun,
}

/// Combat stats of a finished creature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatureStats {
    /// Maximum health.
    pub health: u32,
    /// Base attack.
    pub attack: u32,
    /// Flat damage reduction.
    pub defense: u32,
    /// Movement speed.
    pub speed: u32,
    /// Elemental affinity.
    pub element: ElementType,
    /// Optional special ability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_ability: Option<SpecialAbility>,
}

impl CreatureStats {
    /// Check that every numeric stat is positive.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidCreature`] naming the first zero stat.
    pub fn validate(&self) -> Result<(), BattleError> {
        let checks = [
            (self.health, "health must be positive"),
            (self.attack, "attack must be positive"),
            (self.defense, "defense must be positive"),
            (self.speed, "speed must be positive"),
        ];
        for (value, reason) in checks {
            if value == 0 {
                return Err(BattleError::InvalidCreature { reason });
            }
        }
        Ok(())
    }
}

/// A finished creature handed to the engine by the drawing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creature {
    /// External creature identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Assigned stats.
    pub stats: CreatureStats,
    /// Whether the creature fights at range (needs ranged support enabled).
    #[serde(default)]
    pub ranged: bool,
}

impl Creature {
    /// Create a melee creature.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, stats: CreatureStats) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stats,
            ranged: false,
        }
    }

    /// Mark the creature as ranged.
    #[must_use]
    pub fn with_ranged(mut self, ranged: bool) -> Self {
        self.ranged = ranged;
        self
    }
}

/// One of the two sides of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// First player; base at absolute lane position 0.
    Player1,
    /// Second player; base at absolute lane position 100.
    Player2,
}

impl Side {
    /// Both sides in index order.
    pub const BOTH: [Side; 2] = [Side::Player1, Side::Player2];

    /// The other side.
    #[must_use]
    pub const fn opponent(self) -> Side {
        match self {
            Side::Player1 => Side::Player2,
            Side::Player2 => Side::Player1,
        }
    }

    /// Array index (0 or 1).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Side::Player1 => 0,
            Side::Player2 => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Player1 => f.write_str("player1"),
            Side::Player2 => f.write_str("player2"),
        }
    }
}

/// Identity of a creature inside one battle, assigned in spawn order.
///
/// Ordering on this id is the tie-breaker for every simultaneous event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatureId(pub u64);

impl fmt::Display for CreatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Timers and one-shot flags driven by special abilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityState {
    /// Remaining stun, in milliseconds.
    pub stunned_ms: u32,
    /// Remaining poison, in milliseconds.
    pub poison_ms: u32,
    /// Damage dealt per tick while poisoned.
    pub poison_damage: u32,
    /// Shield points left this wave.
    pub shield: u32,
    /// Time accumulated towards the next heal.
    pub heal_elapsed_ms: u32,
    /// Whether the burst attack has been used.
    pub burst_spent: bool,
    /// Time until this creature may stun again.
    pub stun_cooldown_ms: u32,
}

/// A creature occupying a lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatureInLane {
    /// Battle-local identity.
    pub id: CreatureId,
    /// External creature id this was spawned from.
    pub source_id: String,
    /// Display name.
    pub name: String,
    /// Owning side.
    pub owner: Side,
    /// Lane index.
    pub lane: usize,
    /// Distance from the owner's base edge, in [0, 100].
    pub position: f64,
    /// Current health; never above `stats.health`.
    pub health: u32,
    /// Copy of the creature's stats.
    pub stats: CreatureStats,
    /// Whether the creature moves towards the enemy base.
    pub is_advancing: bool,
    /// Whether the creature attacks at range.
    pub is_ranged: bool,
    /// Wave the creature was deployed in.
    pub wave: u32,
    /// Ability timers.
    pub effects: AbilityState,
}

impl CreatureInLane {
    /// Spawn a creature at its owner's base edge.
    #[must_use]
    pub fn spawn(
        id: CreatureId,
        creature: &Creature,
        owner: Side,
        lane: usize,
        wave: u32,
        ranged_enabled: bool,
    ) -> Self {
        Self {
            id,
            source_id: creature.id.clone(),
            name: creature.name.clone(),
            owner,
            lane,
            position: BASE_EDGE,
            health: creature.stats.health,
            stats: creature.stats,
            is_advancing: true,
            is_ranged: creature.ranged && ranged_enabled,
            wave,
            effects: AbilityState::default(),
        }
    }

    /// Maximum health from stats.
    #[must_use]
    pub fn max_health(&self) -> u32 {
        self.stats.health
    }

    /// Whether the creature still has health left.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Whether a stun currently prevents acting.
    #[must_use]
    pub fn is_stunned(&self) -> bool {
        self.effects.stunned_ms > 0
    }

    /// Position measured from player 1's base edge.
    #[must_use]
    pub fn absolute_position(&self) -> f64 {
        match self.owner {
            Side::Player1 => self.position,
            Side::Player2 => ENEMY_EDGE - self.position,
        }
    }

    /// Signed gap to an enemy measured in the direction of advance.
    ///
    /// Positive while the enemy is still ahead.
    #[must_use]
    pub fn gap_to(&self, enemy: &CreatureInLane) -> f64 {
        ENEMY_EDGE - self.position - enemy.position
    }

    /// Absolute distance to another creature.
    #[must_use]
    pub fn distance_to(&self, other: &CreatureInLane) -> f64 {
        (self.absolute_position() - other.absolute_position()).abs()
    }

    /// Apply damage, clamping health at zero. Returns damage actually taken.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let taken = amount.min(self.health);
        self.health -= taken;
        taken
    }

    /// Restore health up to the maximum. Returns health actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let restored = amount.min(self.max_health() - self.health);
        self.health += restored;
        restored
    }
}
