//! Combat resolution inside a single lane.
//!
//! One call to [`resolve_lane_tick`] advances a lane by one fixed step:
//!
//! 1. Status upkeep (stun timers, poison, heals); poison kills are removed.
//! 2. Every creature that is not stunned picks the nearest enemy in range.
//! 3. Damage is computed from the start-of-step snapshot and applied
//!    simultaneously, so two creatures can kill each other.
//! 4. Dead creatures are removed in id order.
//! 5. Survivors that have nothing in range move forward, in id order.
//!
//! Iteration order is always ascending creature id, which makes the outcome
//! a pure function of the lane and the context.

pub mod abilities;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::CombatConfig;
use crate::territory::{
    CreatureId, CreatureInLane, ENEMY_EDGE, LaneState, Side, element_multiplier,
};

/// Slack for comparing lane positions after repeated float steps.
const POSITION_EPSILON: f64 = 1e-9;

/// Parameters for one combat step.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    /// Step length in milliseconds.
    pub dt_ms: u32,
    /// Lane length in battlefield units.
    pub battlefield_length: f64,
    /// Whether ranged creatures use the ranged range.
    pub ranged_support: bool,
    /// Combat tuning.
    pub config: &'a CombatConfig,
}

impl TickContext<'_> {
    /// Attack range of `creature` as a share of the lane, in percent.
    #[must_use]
    pub fn range_percent(&self, creature: &CreatureInLane) -> f64 {
        let units = if self.ranged_support && creature.is_ranged {
            self.config.ranged_range
        } else {
            self.config.melee_range
        };
        units / self.battlefield_length * 100.0
    }

    /// Distance `creature` covers in one step, in percent of the lane.
    #[must_use]
    pub fn step_percent(&self, creature: &CreatureInLane) -> f64 {
        let seconds = f64::from(self.dt_ms) / 1000.0;
        f64::from(creature.stats.speed) * self.config.speed_scale * seconds
            / self.battlefield_length
            * 100.0
    }
}

/// Something that happened during a combat step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CombatEvent {
    /// A creature advanced.
    Moved {
        /// Creature that moved.
        creature: CreatureId,
        /// Owner.
        owner: Side,
        /// Lane index.
        lane: usize,
        /// New position, relative to the owner's base.
        position: f64,
    },
    /// One creature hit another.
    Attacked {
        /// Attacker.
        attacker: CreatureId,
        /// Target.
        defender: CreatureId,
        /// Lane index.
        lane: usize,
        /// Health removed from the target.
        damage: u32,
        /// Damage soaked by a shield.
        absorbed: u32,
        /// Element multiplier applied.
        multiplier: f64,
        /// Target health after the hit.
        defender_health: u32,
    },
    /// A creature died and left the lane.
    Died {
        /// Creature that died.
        creature: CreatureId,
        /// Owner.
        owner: Side,
        /// Lane index.
        lane: usize,
        /// Creature whose hit was lethal; `None` for poison.
        killer: Option<CreatureId>,
    },
}

/// Damage from one attack: `max(1, floor(attack * factor * multiplier) - defense)`.
///
/// `factor` carries ability bonuses such as burst; pass `1.0` for a plain hit.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn calculate_damage(attack: u32, defense: u32, factor: f64, multiplier: f64) -> u32 {
    let raw = (f64::from(attack) * factor * multiplier).floor();
    let raw = if raw >= f64::from(u32::MAX) {
        u32::MAX
    } else if raw > 0.0 {
        raw as u32
    } else {
        0
    };
    raw.saturating_sub(defense).max(1)
}

/// A hit decided from the start-of-step snapshot.
#[derive(Debug, Clone, Copy)]
struct Strike {
    attacker: usize,
    defender: usize,
    damage: u32,
    multiplier: f64,
}

/// Advance one lane by a single combat step.
///
/// Closed lanes are left untouched. Returned events are ordered by phase,
/// then by creature id.
pub fn resolve_lane_tick(lane: &mut LaneState, ctx: &TickContext<'_>) -> Vec<CombatEvent> {
    let mut events = Vec::new();
    if lane.closed {
        return events;
    }
    debug_assert!(lane.creatures.windows(2).all(|w| w[0].id < w[1].id));

    let tuning = &ctx.config.abilities;
    for creature in &mut lane.creatures {
        abilities::upkeep(creature, ctx.dt_ms, tuning);
    }
    remove_dead(lane, &BTreeMap::new(), &mut events);

    let strikes = plan_strikes(&lane.creatures, ctx);
    let mut killers = BTreeMap::new();
    for strike in strikes {
        let (attacker_id, ability, stun_ready) = {
            let a = &lane.creatures[strike.attacker];
            (a.id, a.stats.special_ability, a.effects.stun_cooldown_ms == 0)
        };
        let defender = &mut lane.creatures[strike.defender];
        if !defender.is_alive() {
            continue;
        }
        let (through, absorbed) = abilities::absorb(defender, strike.damage);
        let damage = defender.take_damage(through);
        let stunned = abilities::on_hit(ability, stun_ready, defender, tuning);
        if !defender.is_alive() {
            killers.insert(defender.id, attacker_id);
        }
        events.push(CombatEvent::Attacked {
            attacker: attacker_id,
            defender: defender.id,
            lane: lane.lane_index,
            damage,
            absorbed,
            multiplier: strike.multiplier,
            defender_health: defender.health,
        });
        abilities::after_attack(&mut lane.creatures[strike.attacker], stunned, tuning);
    }
    remove_dead(lane, &killers, &mut events);

    advance(lane, ctx, &mut events);
    lane.refresh_contested();
    events
}

/// Nearest enemy within range of `creatures[index]`, ties to the lowest id.
fn target_of(creatures: &[CreatureInLane], index: usize, range: f64) -> Option<usize> {
    let me = &creatures[index];
    creatures
        .iter()
        .enumerate()
        .filter(|(_, other)| other.owner != me.owner && other.is_alive())
        .map(|(j, other)| (j, me.distance_to(other)))
        .filter(|&(_, distance)| distance <= range + POSITION_EPSILON)
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(j, _)| j)
}

fn plan_strikes(creatures: &[CreatureInLane], ctx: &TickContext<'_>) -> Vec<Strike> {
    creatures
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_alive() && !c.is_stunned())
        .filter_map(|(i, attacker)| {
            let defender = target_of(creatures, i, ctx.range_percent(attacker))?;
            let target = &creatures[defender];
            let multiplier = element_multiplier(attacker.stats.element, target.stats.element);
            let factor = abilities::attack_factor(attacker, &ctx.config.abilities);
            Some(Strike {
                attacker: i,
                defender,
                damage: calculate_damage(
                    attacker.stats.attack,
                    target.stats.defense,
                    factor,
                    multiplier,
                ),
                multiplier,
            })
        })
        .collect()
}

fn remove_dead(
    lane: &mut LaneState,
    killers: &BTreeMap<CreatureId, CreatureId>,
    events: &mut Vec<CombatEvent>,
) {
    let lane_index = lane.lane_index;
    lane.creatures.retain(|c| {
        if c.is_alive() {
            return true;
        }
        events.push(CombatEvent::Died {
            creature: c.id,
            owner: c.owner,
            lane: lane_index,
            killer: killers.get(&c.id).copied(),
        });
        false
    });
}

fn advance(lane: &mut LaneState, ctx: &TickContext<'_>, events: &mut Vec<CombatEvent>) {
    for i in 0..lane.creatures.len() {
        let creature = &lane.creatures[i];
        if !creature.is_advancing || creature.is_stunned() {
            continue;
        }
        let range = ctx.range_percent(creature);
        let enemies = lane
            .creatures
            .iter()
            .filter(|other| other.owner != creature.owner);

        let mut engaged = false;
        let mut room = ENEMY_EDGE - creature.position;
        for enemy in enemies {
            if creature.distance_to(enemy) <= range + POSITION_EPSILON {
                engaged = true;
                break;
            }
            let gap = creature.gap_to(enemy);
            if gap > 0.0 {
                room = room.min(gap - range);
            }
        }
        if engaged {
            continue;
        }

        let step = ctx.step_percent(creature).min(room.max(0.0));
        let creature = &mut lane.creatures[i];
        let position = (creature.position + step).min(ENEMY_EDGE);
        if position >= ENEMY_EDGE {
            creature.is_advancing = false;
        }
        if position > creature.position {
            creature.position = position;
            events.push(CombatEvent::Moved {
                creature: creature.id,
                owner: creature.owner,
                lane: lane.lane_index,
                position,
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::territory::{Creature, CreatureStats, ElementType, SpecialAbility};

    fn stats(element: ElementType, health: u32, attack: u32) -> CreatureStats {
        CreatureStats {
            health,
            attack,
            defense: 2,
            speed: 10,
            element,
            special_ability: None,
        }
    }

    fn spawn(id: u64, owner: Side, stats: CreatureStats, position: f64) -> CreatureInLane {
        let mut c = CreatureInLane::spawn(
            CreatureId(id),
            &Creature::new(format!("src-{id}"), "C", stats),
            owner,
            0,
            1,
            false,
        );
        c.position = position;
        c
    }

    fn lane_with(creatures: Vec<CreatureInLane>) -> LaneState {
        let mut lane = LaneState::new(0);
        for c in creatures {
            lane.insert(c).unwrap();
        }
        lane
    }

    fn ctx(config: &CombatConfig) -> TickContext<'_> {
        TickContext {
            dt_ms: 500,
            battlefield_length: 30.0,
            ranged_support: true,
            config,
        }
    }

    #[test]
    fn test_damage_formula() {
        assert_eq!(calculate_damage(10, 2, 1.0, 1.5), 13);
        assert_eq!(calculate_damage(10, 2, 1.0, 0.75), 5);
        assert_eq!(calculate_damage(10, 50, 1.0, 1.0), 1, "minimum one damage");
        assert_eq!(calculate_damage(10, 2, 2.0, 1.0), 18, "burst doubles");
        assert_eq!(calculate_damage(7, 0, 1.0, 1.5), 10, "floored");
    }

    #[test]
    fn test_step_and_range_conversion() {
        let config = CombatConfig::default();
        let ctx = ctx(&config);
        let c = spawn(1, Side::Player1, stats(ElementType::Fire, 10, 10), 0.0);
        // 10 speed * 0.2 * 0.5s = 1 unit of 30.
        assert!((ctx.step_percent(&c) - 100.0 / 30.0).abs() < 1e-9);
        assert!((ctx.range_percent(&c) - 2.0 / 30.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_creatures_advance_without_enemies() {
        let config = CombatConfig::default();
        let mut lane = lane_with(vec![spawn(1, Side::Player1, stats(ElementType::Fire, 10, 10), 0.0)]);
        let events = resolve_lane_tick(&mut lane, &ctx(&config));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CombatEvent::Moved { creature: CreatureId(1), .. }));
        assert!(lane.creatures[0].position > 0.0);
    }

    #[test]
    fn test_movement_stops_at_enemy_edge() {
        let config = CombatConfig::default();
        let mut lane = lane_with(vec![spawn(1, Side::Player1, stats(ElementType::Fire, 10, 10), 99.0)]);
        resolve_lane_tick(&mut lane, &ctx(&config));
        assert_eq!(lane.creatures[0].position, ENEMY_EDGE);
        assert!(!lane.creatures[0].is_advancing);
        let events = resolve_lane_tick(&mut lane, &ctx(&config));
        assert!(events.is_empty());
    }

    #[test]
    fn test_movement_halts_at_range() {
        let config = CombatConfig::default();
        let ctx = ctx(&config);
        let mut lane = lane_with(vec![
            spawn(1, Side::Player1, stats(ElementType::Fire, 100, 10), 40.0),
            spawn(2, Side::Player2, stats(ElementType::Fire, 100, 10), 50.0),
        ]);
        resolve_lane_tick(&mut lane, &ctx);
        let range = ctx.range_percent(&lane.creatures[0]);
        let distance = lane.creatures[0].distance_to(&lane.creatures[1]);
        assert!(distance + 1e-9 >= range, "never walks through the enemy");
    }

    #[test]
    fn test_advantage_kills_in_two_hits() {
        let config = CombatConfig::default();
        let ctx = ctx(&config);
        let mut lane = lane_with(vec![
            spawn(1, Side::Player1, stats(ElementType::Fire, 20, 10), 49.0),
            spawn(2, Side::Player2, stats(ElementType::Earth, 20, 10), 50.0),
        ]);

        let events = resolve_lane_tick(&mut lane, &ctx);
        assert!(events.contains(&CombatEvent::Attacked {
            attacker: CreatureId(1),
            defender: CreatureId(2),
            lane: 0,
            damage: 13,
            absorbed: 0,
            multiplier: 1.5,
            defender_health: 7,
        }));
        assert_eq!(lane.creatures[0].health, 15);

        let events = resolve_lane_tick(&mut lane, &ctx);
        assert!(events.contains(&CombatEvent::Died {
            creature: CreatureId(2),
            owner: Side::Player2,
            lane: 0,
            killer: Some(CreatureId(1)),
        }));
        assert_eq!(lane.creatures.len(), 1);
        assert_eq!(lane.creatures[0].health, 10, "both hits landed");
        assert!(!lane.contested);
    }

    #[test]
    fn test_simultaneous_lethal_exchange() {
        let config = CombatConfig::default();
        let mut lane = lane_with(vec![
            spawn(1, Side::Player1, stats(ElementType::Fire, 5, 10), 49.0),
            spawn(2, Side::Player2, stats(ElementType::Fire, 5, 10), 50.0),
        ]);
        let events = resolve_lane_tick(&mut lane, &ctx(&config));
        assert!(lane.creatures.is_empty());
        let deaths: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                CombatEvent::Died { creature, .. } => Some(creature.0),
                _ => None,
            })
            .collect();
        assert_eq!(deaths, vec![1, 2]);
    }

    #[test]
    fn test_target_ties_break_to_lowest_id() {
        let config = CombatConfig::default();
        let mut lane = lane_with(vec![
            spawn(1, Side::Player1, stats(ElementType::Air, 100, 10), 49.0),
            spawn(2, Side::Player2, stats(ElementType::Air, 100, 10), 50.0),
            spawn(3, Side::Player2, stats(ElementType::Air, 100, 10), 50.0),
        ]);
        let events = resolve_lane_tick(&mut lane, &ctx(&config));
        assert!(events.iter().any(|e| matches!(
            e,
            CombatEvent::Attacked { attacker: CreatureId(1), defender: CreatureId(2), .. }
        )));
    }

    #[test]
    fn test_stunned_creature_does_not_act() {
        let config = CombatConfig::default();
        let mut stunner = stats(ElementType::Air, 100, 10);
        stunner.special_ability = Some(SpecialAbility::Stun);
        let mut lane = lane_with(vec![
            spawn(1, Side::Player1, stunner, 49.0),
            spawn(2, Side::Player2, stats(ElementType::Air, 100, 10), 50.0),
        ]);
        let ctx = ctx(&config);
        resolve_lane_tick(&mut lane, &ctx);
        assert!(lane.creatures[1].is_stunned());

        let events = resolve_lane_tick(&mut lane, &ctx);
        assert!(!events.iter().any(|e| matches!(
            e,
            CombatEvent::Attacked { attacker: CreatureId(2), .. }
        )));
    }

    #[test]
    fn test_closed_lane_untouched() {
        let config = CombatConfig::default();
        let mut lane = LaneState::new(0);
        lane.player1_control = crate::territory::Control::FULL;
        lane.close();
        let before = lane.clone();
        assert!(resolve_lane_tick(&mut lane, &ctx(&config)).is_empty());
        assert_eq!(lane, before);
    }

    #[test]
    fn test_deterministic() {
        let config = CombatConfig::default();
        let build = || {
            lane_with(vec![
                spawn(1, Side::Player1, stats(ElementType::Water, 30, 9), 10.0),
                spawn(2, Side::Player2, stats(ElementType::Fire, 30, 11), 20.0),
                spawn(3, Side::Player1, stats(ElementType::Dark, 30, 7), 0.0),
            ])
        };
        let (mut a, mut b) = (build(), build());
        let ctx = ctx(&config);
        for _ in 0..80 {
            assert_eq!(resolve_lane_tick(&mut a, &ctx), resolve_lane_tick(&mut b, &ctx));
        }
        assert_eq!(a, b);
    }
}
