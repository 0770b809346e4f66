//! Territory model for the wave battle engine.
//!
//! Pure data plus invariant checks:
//! - Elements and the fixed advantage table
//! - Creatures and their in-lane records
//! - Lanes with per-side control
//! - The aggregate territory state of a battle

mod creature;
mod element;
mod invariants;
mod lane;

pub use creature::{
    AbilityState, BASE_EDGE, Creature, CreatureId, CreatureInLane, CreatureStats, ENEMY_EDGE, Side,
    SpecialAbility,
};
pub use element::{
    ADVANTAGE_MULTIPLIER, DISADVANTAGE_MULTIPLIER, ElementType, NEUTRAL_MULTIPLIER,
    element_multiplier,
};
pub use invariants::{InvariantViolation, check_invariants, validate, validate_transition};
pub use lane::{Control, FULL_CONTROL_BP, LaneState};

use serde::{Deserialize, Serialize};

/// Control of the whole battlefield, the mean of per-lane control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateControl {
    /// Player 1's mean control.
    pub player1: Control,
    /// Player 2's mean control.
    pub player2: Control,
}

impl AggregateControl {
    /// Control held by `side`.
    #[must_use]
    pub fn of(&self, side: Side) -> Control {
        match side {
            Side::Player1 => self.player1,
            Side::Player2 => self.player2,
        }
    }

    /// Side with strictly more control, `None` on a tie.
    #[must_use]
    pub fn leader(&self) -> Option<Side> {
        match self.player1.cmp(&self.player2) {
            std::cmp::Ordering::Greater => Some(Side::Player1),
            std::cmp::Ordering::Less => Some(Side::Player2),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Territory of one battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerritoryState {
    /// Lanes in index order.
    pub lanes: Vec<LaneState>,
    /// Mean control across lanes.
    pub aggregate_control: AggregateControl,
    /// Session clock time of the last update, in milliseconds.
    pub timestamp: u64,
}

impl TerritoryState {
    /// Create a fully neutral battlefield.
    #[must_use]
    pub fn new(lane_count: usize) -> Self {
        Self {
            lanes: (0..lane_count).map(LaneState::new).collect(),
            aggregate_control: AggregateControl::default(),
            timestamp: 0,
        }
    }

    /// Mean control across `lanes`, rounded down to whole basis points.
    #[must_use]
    pub fn mean_control(lanes: &[LaneState]) -> AggregateControl {
        if lanes.is_empty() {
            return AggregateControl::default();
        }
        let count = lanes.len() as u64;
        let mean = |side: Side| {
            let total: u64 = lanes
                .iter()
                .map(|lane| u64::from(lane.control(side).basis_points()))
                .sum();
            let bp = u16::try_from(total / count).unwrap_or(FULL_CONTROL_BP);
            Control::from_basis_points(bp).unwrap_or(Control::FULL)
        };
        AggregateControl {
            player1: mean(Side::Player1),
            player2: mean(Side::Player2),
        }
    }

    /// Recompute the aggregate from the lanes.
    pub fn recompute_aggregate(&mut self) {
        self.aggregate_control = Self::mean_control(&self.lanes);
    }

    /// Lane by index.
    #[must_use]
    pub fn lane(&self, index: usize) -> Option<&LaneState> {
        self.lanes.get(index)
    }

    /// Whether every lane is closed.
    #[must_use]
    pub fn all_closed(&self) -> bool {
        self.lanes.iter().all(|lane| lane.closed)
    }

    /// Side that holds every lane, if any.
    #[must_use]
    pub fn sole_owner(&self) -> Option<Side> {
        Side::BOTH.into_iter().find(|&side| {
            !self.lanes.is_empty() && self.lanes.iter().all(|lane| lane.owner() == Some(side))
        })
    }

    /// Side leading on aggregate control.
    #[must_use]
    pub fn leader(&self) -> Option<Side> {
        self.aggregate_control.leader()
    }

    /// Total live creatures on the battlefield.
    #[must_use]
    pub fn creature_count(&self) -> usize {
        self.lanes.iter().map(|lane| lane.creatures.len()).sum()
    }
}
