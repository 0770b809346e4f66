//! Territory invariants - sanity checks that detect resolver bugs.
//!
//! Every mutator in the engine is written so these never trigger. A
//! violation means a bug, so sessions abort on one instead of repairing it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::territory::{BASE_EDGE, CreatureId, ENEMY_EDGE, FULL_CONTROL_BP, TerritoryState};

/// A violated territory invariant.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InvariantViolation {
    /// Lane count differs from the configured count.
    #[error("expected {expected} lanes, found {actual}")]
    LaneCountMismatch {
        /// Configured lane count.
        expected: usize,
        /// Lanes present.
        actual: usize,
    },
    /// A lane sits at the wrong position in the sequence.
    #[error("lane at position {position} reports index {reported}")]
    LaneIndexMismatch {
        /// Position in the lane list.
        position: usize,
        /// Index stored on the lane.
        reported: usize,
    },
    /// Combined control exceeds 100%.
    #[error("lane {lane} control sums to {sum_bp} basis points")]
    ControlSumExceeded {
        /// Lane index.
        lane: usize,
        /// Combined basis points.
        sum_bp: u32,
    },
    /// A lane is closed without either side at full control.
    #[error("lane {lane} is closed but no side holds it")]
    ClosedWithoutOwner {
        /// Lane index.
        lane: usize,
    },
    /// A lane reached full control but was not closed.
    #[error("lane {lane} is fully held but still open")]
    FullControlOpen {
        /// Lane index.
        lane: usize,
    },
    /// A closed lane still holds creatures.
    #[error("closed lane {lane} still holds {count} creatures")]
    ClosedLaneOccupied {
        /// Lane index.
        lane: usize,
        /// Creatures left in it.
        count: usize,
    },
    /// A closed lane was reopened.
    #[error("lane {lane} was reopened")]
    ClosedLaneReopened {
        /// Lane index.
        lane: usize,
    },
    /// A closed lane changed control.
    #[error("closed lane {lane} changed control")]
    ClosedLaneChanged {
        /// Lane index.
        lane: usize,
    },
    /// A creature position fell outside the lane.
    #[error("creature {creature} in lane {lane} at position {position}")]
    PositionOutOfRange {
        /// Lane index.
        lane: usize,
        /// Offending creature.
        creature: CreatureId,
        /// Reported position.
        position: f64,
    },
    /// A creature has more health than its stats allow.
    #[error("creature {creature} has {health} health, max {max}")]
    HealthExceeded {
        /// Offending creature.
        creature: CreatureId,
        /// Current health.
        health: u32,
        /// Max health.
        max: u32,
    },
    /// A dead creature was left in a lane.
    #[error("dead creature {creature} left in lane {lane}")]
    DeadCreaturePresent {
        /// Lane index.
        lane: usize,
        /// Offending creature.
        creature: CreatureId,
    },
    /// A creature's lane index does not match the lane holding it.
    #[error("creature {creature} claims lane {claimed} but sits in lane {lane}")]
    CreatureLaneMismatch {
        /// Lane holding the creature.
        lane: usize,
        /// Lane recorded on the creature.
        claimed: usize,
        /// Offending creature.
        creature: CreatureId,
    },
    /// Creatures are not in ascending id order.
    #[error("creatures in lane {lane} are out of id order")]
    CreatureOrder {
        /// Lane index.
        lane: usize,
    },
    /// Aggregate control is not the mean of lane control.
    #[error("aggregate control {player1_bp}/{player2_bp} does not match lanes")]
    AggregateMismatch {
        /// Reported player 1 aggregate.
        player1_bp: u16,
        /// Reported player 2 aggregate.
        player2_bp: u16,
    },
    /// The timestamp went backwards.
    #[error("timestamp went backwards from {previous} to {current}")]
    TimestampRegressed {
        /// Previous timestamp.
        previous: u64,
        /// New timestamp.
        current: u64,
    },
}

/// Check every invariant of a single state.
///
/// Returns all violations found, or an empty list if the state is valid.
#[must_use]
pub fn check_invariants(state: &TerritoryState, lane_count: usize) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    if state.lanes.len() != lane_count {
        violations.push(InvariantViolation::LaneCountMismatch {
            expected: lane_count,
            actual: state.lanes.len(),
        });
    }

    for (position, lane) in state.lanes.iter().enumerate() {
        let index = lane.lane_index;
        if index != position {
            violations.push(InvariantViolation::LaneIndexMismatch {
                position,
                reported: index,
            });
        }

        let sum_bp = u32::from(lane.player1_control.basis_points())
            + u32::from(lane.player2_control.basis_points());
        if sum_bp > u32::from(FULL_CONTROL_BP) {
            violations.push(InvariantViolation::ControlSumExceeded { lane: index, sum_bp });
        }

        match (lane.closed, lane.owner().is_some()) {
            (true, false) => violations.push(InvariantViolation::ClosedWithoutOwner { lane: index }),
            (false, true) => violations.push(InvariantViolation::FullControlOpen { lane: index }),
            _ => {}
        }

        if lane.closed && !lane.creatures.is_empty() {
            violations.push(InvariantViolation::ClosedLaneOccupied {
                lane: index,
                count: lane.creatures.len(),
            });
        }

        if lane.creatures.windows(2).any(|w| w[0].id >= w[1].id) {
            violations.push(InvariantViolation::CreatureOrder { lane: index });
        }

        for creature in &lane.creatures {
            if !(BASE_EDGE..=ENEMY_EDGE).contains(&creature.position) {
                violations.push(InvariantViolation::PositionOutOfRange {
                    lane: index,
                    creature: creature.id,
                    position: creature.position,
                });
            }
            if creature.health > creature.max_health() {
                violations.push(InvariantViolation::HealthExceeded {
                    creature: creature.id,
                    health: creature.health,
                    max: creature.max_health(),
                });
            }
            if !creature.is_alive() {
                violations.push(InvariantViolation::DeadCreaturePresent {
                    lane: index,
                    creature: creature.id,
                });
            }
            if creature.lane != index {
                violations.push(InvariantViolation::CreatureLaneMismatch {
                    lane: index,
                    claimed: creature.lane,
                    creature: creature.id,
                });
            }
        }
    }

    let expected = TerritoryState::mean_control(&state.lanes);
    if expected != state.aggregate_control {
        violations.push(InvariantViolation::AggregateMismatch {
            player1_bp: state.aggregate_control.player1.basis_points(),
            player2_bp: state.aggregate_control.player2.basis_points(),
        });
    }

    violations
}

/// Return the first violated invariant of a state.
///
/// # Errors
///
/// Returns the first [`InvariantViolation`] found.
pub fn validate(state: &TerritoryState, lane_count: usize) -> Result<(), InvariantViolation> {
    match check_invariants(state, lane_count).into_iter().next() {
        Some(violation) => Err(violation),
        None => Ok(()),
    }
}

/// Validate `next` on its own and as a successor of `previous`.
///
/// Closed lanes must stay closed with identical control, and the timestamp
/// must not go backwards.
///
/// # Errors
///
/// Returns the first [`InvariantViolation`] found.
pub fn validate_transition(
    previous: &TerritoryState,
    next: &TerritoryState,
    lane_count: usize,
) -> Result<(), InvariantViolation> {
    validate(next, lane_count)?;

    if next.timestamp < previous.timestamp {
        return Err(InvariantViolation::TimestampRegressed {
            previous: previous.timestamp,
            current: next.timestamp,
        });
    }

    for (before, after) in previous.lanes.iter().zip(&next.lanes) {
        if !before.closed {
            continue;
        }
        if !after.closed {
            return Err(InvariantViolation::ClosedLaneReopened {
                lane: before.lane_index,
            });
        }
        if before.player1_control != after.player1_control
            || before.player2_control != after.player2_control
        {
            return Err(InvariantViolation::ClosedLaneChanged {
                lane: before.lane_index,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::territory::{
        Control, Creature, CreatureInLane, CreatureStats, ElementType, Side,
    };

    fn creature(id: u64, owner: Side) -> CreatureInLane {
        let stats = CreatureStats {
            health: 10,
            attack: 5,
            defense: 1,
            speed: 5,
            element: ElementType::Air,
            special_ability: None,
        };
        CreatureInLane::spawn(
            CreatureId(id),
            &Creature::new("src", "X", stats),
            owner,
            0,
            1,
            false,
        )
    }

    fn valid_state() -> TerritoryState {
        let mut state = TerritoryState::new(3);
        state.lanes[0].insert(creature(1, Side::Player1)).unwrap();
        state.lanes[0].set_control(
            Control::from_percent(30.0).unwrap(),
            Control::from_percent(10.0).unwrap(),
        );
        state.recompute_aggregate();
        state
    }

    #[test]
    fn test_valid_state_passes() {
        let state = valid_state();
        assert!(check_invariants(&state, 3).is_empty());
        assert!(validate(&state, 3).is_ok());
    }

    #[test]
    fn test_lane_count_mismatch_detected() {
        let state = valid_state();
        assert_eq!(
            validate(&state, 4),
            Err(InvariantViolation::LaneCountMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_control_sum_exceeded_detected() {
        let mut state = valid_state();
        // Bypass set_control to plant an impossible value.
        state.lanes[1].player1_control = Control::from_percent(70.0).unwrap();
        state.lanes[1].player2_control = Control::from_percent(40.0).unwrap();
        state.recompute_aggregate();
        let violations = check_invariants(&state, 3);
        assert!(violations.contains(&InvariantViolation::ControlSumExceeded {
            lane: 1,
            sum_bp: 11_000
        }));
    }

    #[test]
    fn test_full_control_must_close() {
        let mut state = valid_state();
        state.lanes[2].player2_control = Control::FULL;
        state.recompute_aggregate();
        assert_eq!(
            validate(&state, 3),
            Err(InvariantViolation::FullControlOpen { lane: 2 })
        );
    }

    #[test]
    fn test_dead_creature_detected() {
        let mut state = valid_state();
        state.lanes[0].creatures[0].health = 0;
        assert_eq!(
            validate(&state, 3),
            Err(InvariantViolation::DeadCreaturePresent {
                lane: 0,
                creature: CreatureId(1)
            })
        );
    }

    #[test]
    fn test_position_out_of_range_detected() {
        let mut state = valid_state();
        state.lanes[0].creatures[0].position = 100.5;
        let violations = check_invariants(&state, 3);
        assert!(matches!(
            violations[0],
            InvariantViolation::PositionOutOfRange { lane: 0, .. }
        ));
    }

    #[test]
    fn test_stale_aggregate_detected() {
        let mut state = valid_state();
        state.lanes[1].player1_control = Control::from_percent(90.0).unwrap();
        let violations = check_invariants(&state, 3);
        assert!(matches!(
            violations[0],
            InvariantViolation::AggregateMismatch { .. }
        ));
    }

    #[test]
    fn test_closed_lane_change_detected() {
        let mut before = valid_state();
        before.lanes[1].player1_control = Control::FULL;
        before.lanes[1].close();
        before.recompute_aggregate();
        assert!(validate(&before, 3).is_ok());

        let mut after = before.clone();
        after.timestamp += 500;
        after.lanes[1].player1_control = Control::from_percent(99.0).unwrap();
        after.lanes[1].player2_control = Control::from_percent(1.0).unwrap();
        after.lanes[1].closed = false;
        after.recompute_aggregate();
        assert!(validate_transition(&before, &after, 3).is_err());
    }

    #[test]
    fn test_timestamp_regression_detected() {
        let mut before = valid_state();
        before.timestamp = 1_000;
        let mut after = before.clone();
        after.timestamp = 500;
        assert_eq!(
            validate_transition(&before, &after, 3),
            Err(InvariantViolation::TimestampRegressed {
                previous: 1_000,
                current: 500
            })
        );
    }
}
