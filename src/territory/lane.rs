//! Lanes and per-lane territory control.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BattleError;
use crate::territory::{CreatureInLane, Side};

/// Basis points representing full control of a lane (100%).
pub const FULL_CONTROL_BP: u16 = 10_000;

/// Share of a lane held by one side, stored exactly in basis points.
///
/// Serialized as a percentage with two decimals of precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Control(u16);

impl Control {
    /// No control.
    pub const NONE: Control = Control(0);
    /// Full control.
    pub const FULL: Control = Control(FULL_CONTROL_BP);

    /// Create from basis points, rejecting values above 100%.
    #[must_use]
    pub const fn from_basis_points(bp: u16) -> Option<Self> {
        if bp > FULL_CONTROL_BP {
            None
        } else {
            Some(Control(bp))
        }
    }

    /// Create from a percentage in [0, 100], rounded to the nearest basis point.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_percent(percent: f64) -> Option<Self> {
        if !(0.0..=100.0).contains(&percent) {
            return None;
        }
        Self::from_basis_points((percent * 100.0).round() as u16)
    }

    /// Raw basis points.
    #[must_use]
    pub const fn basis_points(self) -> u16 {
        self.0
    }

    /// Value as a percentage.
    #[must_use]
    pub fn percent(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Whether this is full control.
    #[must_use]
    pub const fn is_full(self) -> bool {
        self.0 == FULL_CONTROL_BP
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.percent())
    }
}

impl Serialize for Control {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.percent())
    }
}

impl<'de> Deserialize<'de> for Control {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let percent = f64::deserialize(deserializer)?;
        Control::from_percent(percent)
            .ok_or_else(|| serde::de::Error::custom(format!("control {percent} outside [0, 100]")))
    }
}

/// State of one lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneState {
    /// Lane index.
    pub lane_index: usize,
    /// Share held by player 1.
    pub player1_control: Control,
    /// Share held by player 2.
    pub player2_control: Control,
    /// Both sides have live creatures in the lane.
    pub contested: bool,
    /// One side reached full control; the lane no longer changes.
    pub closed: bool,
    /// Creatures in ascending id order.
    pub creatures: Vec<CreatureInLane>,
}

impl LaneState {
    /// Create an open, fully neutral lane.
    #[must_use]
    pub fn new(lane_index: usize) -> Self {
        Self {
            lane_index,
            player1_control: Control::NONE,
            player2_control: Control::NONE,
            contested: false,
            closed: false,
            creatures: Vec::new(),
        }
    }

    /// Control held by `side`.
    #[must_use]
    pub fn control(&self, side: Side) -> Control {
        match side {
            Side::Player1 => self.player1_control,
            Side::Player2 => self.player2_control,
        }
    }

    /// Neutral ground in basis points.
    #[must_use]
    pub fn neutral_bp(&self) -> u16 {
        FULL_CONTROL_BP
            .saturating_sub(self.player1_control.basis_points())
            .saturating_sub(self.player2_control.basis_points())
    }

    /// Side with full control, if any.
    #[must_use]
    pub fn owner(&self) -> Option<Side> {
        Side::BOTH.into_iter().find(|&side| self.control(side).is_full())
    }

    /// Whether `side` has a live creature here.
    #[must_use]
    pub fn has_presence(&self, side: Side) -> bool {
        self.creatures
            .iter()
            .any(|c| c.owner == side && c.is_alive())
    }

    /// Live creatures belonging to `side`.
    pub fn live_creatures(&self, side: Side) -> impl Iterator<Item = &CreatureInLane> {
        self.creatures
            .iter()
            .filter(move |c| c.owner == side && c.is_alive())
    }

    /// Recompute the contested flag from live presence.
    pub fn refresh_contested(&mut self) {
        self.contested = !self.closed
            && self.has_presence(Side::Player1)
            && self.has_presence(Side::Player2);
    }

    /// Insert a creature, keeping id order.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::LaneClosed`] if the lane is closed; the lane
    /// is left untouched.
    pub fn insert(&mut self, mut creature: CreatureInLane) -> Result<(), BattleError> {
        if self.closed {
            return Err(BattleError::LaneClosed {
                lane: self.lane_index,
            });
        }
        creature.lane = self.lane_index;
        let at = self.creatures.partition_point(|c| c.id < creature.id);
        self.creatures.insert(at, creature);
        self.refresh_contested();
        Ok(())
    }

    /// Set both control values, refusing anything that breaks lane invariants.
    ///
    /// Returns `false` without changing state if the lane is closed or the
    /// values would exceed 100% combined.
    pub fn set_control(&mut self, player1: Control, player2: Control) -> bool {
        if self.closed {
            return false;
        }
        let sum = u32::from(player1.basis_points()) + u32::from(player2.basis_points());
        if sum > u32::from(FULL_CONTROL_BP) {
            return false;
        }
        self.player1_control = player1;
        self.player2_control = player2;
        true
    }

    /// Close the lane for good and evict its creatures.
    pub fn close(&mut self) -> Vec<CreatureInLane> {
        self.closed = true;
        self.contested = false;
        std::mem::take(&mut self.creatures)
    }
}
