#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use wavebattle::combat::{resolve_lane_tick, TickContext};
use wavebattle::config::{CombatConfig, ControlConfig};
use wavebattle::control::update_lane_control;
use wavebattle::{
    Creature, CreatureId, CreatureInLane, CreatureStats, ElementType, LaneState, Side,
    SpecialAbility,
};

/// One creature placed in the lane.
#[derive(Arbitrary, Debug)]
struct FuzzCreature {
    player2: bool,
    health: u16,
    attack: u16,
    defense: u16,
    speed: u8,
    element: u8,
    ability: u8,
    ranged: bool,
    /// Starting position in tenths of a percent.
    position: u16,
}

/// Structured input for combat fuzzing.
#[derive(Arbitrary, Debug)]
struct CombatInput {
    creatures: Vec<FuzzCreature>,
    /// Ticks to run.
    ticks: u8,
    /// Step length.
    dt_ms: u16,
    ranged_support: bool,
    /// Lane length in units.
    length: u8,
}

fn ability(code: u8) -> Option<SpecialAbility> {
    match code % 6 {
        0 => None,
        1 => Some(SpecialAbility::Heal),
        2 => Some(SpecialAbility::Shield),
        3 => Some(SpecialAbility::Burst),
        4 => Some(SpecialAbility::Poison),
        _ => Some(SpecialAbility::Stun),
    }
}

fuzz_target!(|input: CombatInput| {
    let config = CombatConfig::default();
    let ctx = TickContext {
        dt_ms: u32::from(input.dt_ms.clamp(1, 5_000)),
        battlefield_length: f64::from(input.length.max(1)),
        ranged_support: input.ranged_support,
        config: &config,
    };

    let mut lane = LaneState::new(0);
    for (i, c) in input.creatures.iter().take(64).enumerate() {
        let stats = CreatureStats {
            health: u32::from(c.health.max(1)),
            attack: u32::from(c.attack),
            defense: u32::from(c.defense),
            speed: u32::from(c.speed),
            element: ElementType::ALL[usize::from(c.element) % ElementType::ALL.len()],
            special_ability: ability(c.ability),
        };
        let owner = if c.player2 { Side::Player2 } else { Side::Player1 };
        let mut creature = CreatureInLane::spawn(
            CreatureId(i as u64 + 1),
            &Creature::new(format!("f{i}"), "Fuzz", stats).with_ranged(c.ranged),
            owner,
            0,
            1,
            true,
        );
        creature.position = f64::from(c.position % 1_001) / 10.0;
        if lane.insert(creature).is_err() {
            return;
        }
    }

    let control = ControlConfig::default();
    for _ in 0..input.ticks {
        let closed = lane.closed;
        let held = (lane.player1_control, lane.player2_control);
        let before: Vec<(CreatureId, f64)> =
            lane.creatures.iter().map(|c| (c.id, c.position)).collect();

        resolve_lane_tick(&mut lane, &ctx);
        update_lane_control(&mut lane, &control);

        let sum = u32::from(lane.player1_control.basis_points())
            + u32::from(lane.player2_control.basis_points());
        assert!(sum <= 10_000, "control sum {sum}");
        if closed {
            assert!(lane.closed, "lane reopened");
            assert_eq!((lane.player1_control, lane.player2_control), held);
        }
        for creature in &lane.creatures {
            assert!(creature.is_alive(), "dead creature left in lane");
            assert!(creature.health <= creature.max_health());
            assert!((0.0..=100.0).contains(&creature.position));
            if let Some((_, old)) = before.iter().find(|(id, _)| *id == creature.id) {
                assert!(creature.position >= *old, "creature moved backwards");
            }
        }
        assert!(lane.creatures.windows(2).all(|w| w[0].id < w[1].id));
    }
});
