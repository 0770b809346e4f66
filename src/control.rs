//! Lane control updates driven by creature presence.
//!
//! Presence of a side in a lane is the sum of `health * attack` over its live
//! creatures. Each update moves at most `max_shift_per_tick_bp` towards the
//! stronger side, scaled by how lopsided presence is. Gains come out of
//! neutral ground first, then out of the opponent's share. A lane reaching
//! full control closes for the rest of the battle.

use crate::config::ControlConfig;
use crate::territory::{
    Control, CreatureId, CreatureInLane, FULL_CONTROL_BP, LaneState, Side, TerritoryState,
};

/// Combined strength of `side`'s live creatures in `lane`.
#[must_use]
pub fn presence(lane: &LaneState, side: Side) -> u64 {
    lane.live_creatures(side)
        .map(|c| u64::from(c.health) * u64::from(c.stats.attack))
        .sum()
}

/// Basis points gained by the stronger side for one update.
#[must_use]
pub fn control_shift(stronger: u64, weaker: u64, max_shift_bp: u16) -> u16 {
    if stronger <= weaker {
        return 0;
    }
    let numerator = u128::from(max_shift_bp) * u128::from(stronger - weaker);
    let denominator = u128::from(stronger) + u128::from(weaker);
    u16::try_from(numerator / denominator).unwrap_or(max_shift_bp)
}

/// A lane that reached full control during an update.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneCapture {
    /// Lane index.
    pub lane: usize,
    /// Side that captured it.
    pub side: Side,
    /// Creatures removed from the battlefield.
    pub removed: Vec<CreatureId>,
    /// Creatures moved to another open lane, with their new lane.
    pub relocated: Vec<(CreatureId, usize)>,
}

/// Update one lane's control from current presence.
///
/// Returns the evicted creatures when the lane closes. Closed lanes and
/// lanes with equal presence are left as they are.
pub fn update_lane_control(
    lane: &mut LaneState,
    config: &ControlConfig,
) -> Option<(Side, Vec<CreatureInLane>)> {
    lane.refresh_contested();
    if lane.closed {
        return None;
    }
    let p1 = presence(lane, Side::Player1);
    let p2 = presence(lane, Side::Player2);
    let (gainer, strong, weak) = match p1.cmp(&p2) {
        std::cmp::Ordering::Greater => (Side::Player1, p1, p2),
        std::cmp::Ordering::Less => (Side::Player2, p2, p1),
        std::cmp::Ordering::Equal => return None,
    };
    let shift = control_shift(strong, weak, config.max_shift_per_tick_bp);
    if shift == 0 {
        return None;
    }

    let neutral = lane.neutral_bp();
    let gained = lane.control(gainer).basis_points();
    let lost = lane.control(gainer.opponent()).basis_points();
    let from_neutral = shift.min(neutral);
    let from_opponent = (shift - from_neutral).min(lost);
    let gained = Control::from_basis_points(gained + from_neutral + from_opponent)
        .unwrap_or(Control::FULL);
    let lost = Control::from_basis_points(lost - from_opponent).unwrap_or(Control::NONE);

    let applied = match gainer {
        Side::Player1 => lane.set_control(gained, lost),
        Side::Player2 => lane.set_control(lost, gained),
    };
    debug_assert!(applied, "control shift kept lane within bounds");

    if gained.basis_points() == FULL_CONTROL_BP {
        Some((gainer, lane.close()))
    } else {
        None
    }
}

/// Update every lane, close captured lanes and refresh the aggregate.
///
/// With `cross_lane` set, the capturing side's evicted creatures move to the
/// nearest open lane (ties go to the lower index); everything else evicted
/// leaves the battlefield.
pub fn update_territory(
    state: &mut TerritoryState,
    config: &ControlConfig,
    cross_lane: bool,
    now_ms: u64,
) -> Vec<LaneCapture> {
    let mut closed = Vec::new();
    for lane in &mut state.lanes {
        if let Some((side, evicted)) = update_lane_control(lane, config) {
            closed.push((lane.lane_index, side, evicted));
        }
    }

    let mut captures = Vec::with_capacity(closed.len());
    for (lane_index, side, evicted) in closed {
        let mut capture = LaneCapture {
            lane: lane_index,
            side,
            removed: Vec::new(),
            relocated: Vec::new(),
        };
        for creature in evicted {
            let target = if cross_lane && creature.owner == side && creature.is_alive() {
                nearest_open_lane(&state.lanes, lane_index)
            } else {
                None
            };
            match target {
                Some(to) => {
                    capture.relocated.push((creature.id, to));
                    let id = creature.id;
                    if state.lanes[to].insert(creature).is_err() {
                        capture.relocated.pop();
                        capture.removed.push(id);
                    }
                }
                None => capture.removed.push(creature.id),
            }
        }
        captures.push(capture);
    }

    state.recompute_aggregate();
    state.timestamp = state.timestamp.max(now_ms);
    captures
}

/// Nearest open lane to `from`, ties to the lower index.
#[must_use]
pub fn nearest_open_lane(lanes: &[LaneState], from: usize) -> Option<usize> {
    lanes
        .iter()
        .filter(|lane| !lane.closed)
        .map(|lane| lane.lane_index)
        .min_by_key(|&index| (index.abs_diff(from), index))
}
