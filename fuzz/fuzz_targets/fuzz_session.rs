#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use wavebattle::territory::validate_transition;
use wavebattle::{
    BattleId, BattleSession, BattleSettings, BattleStatus, Creature, CreatureStats, ElementType,
    PlayerId, TerritorialBattleConfig,
};

/// A client action against the session.
#[derive(Arbitrary, Debug)]
enum Action {
    Join { second: bool },
    Deploy { second: bool, lane: u8, health: u8, attack: u8, speed: u8, element: u8 },
    Ready { second: bool },
    Forfeit { second: bool },
    Disconnect { second: bool },
    Tick { after_ms: u16 },
}

/// Structured input for session fuzzing.
#[derive(Arbitrary, Debug)]
struct SessionInput {
    waves: u8,
    lanes: u8,
    interval: u8,
    cross_lane: bool,
    actions: Vec<Action>,
}

fuzz_target!(|input: SessionInput| {
    let settings = BattleSettings {
        battle: TerritorialBattleConfig {
            wave_count: u32::from(input.waves % 4 + 1),
            lane_count: usize::from(input.lanes % 4 + 1),
            wave_interval: u64::from(input.interval % 5 + 1),
            allow_cross_lane_movement: input.cross_lane,
            ..TerritorialBattleConfig::default()
        },
        ..BattleSettings::default()
    };
    let lane_count = settings.battle.lane_count;
    let players = [PlayerId::from("p1"), PlayerId::from("p2")];
    let Ok(mut session) = BattleSession::create(BattleId(1), players.clone(), settings, 0) else {
        return;
    };
    let pick = |second: bool| &players[usize::from(second)];

    let mut now = 0u64;
    let mut previous = session.battle().state.clone();
    let mut started = false;
    for action in input.actions.iter().take(512) {
        // Rejections are expected; only panics and broken state are bugs.
        match action {
            Action::Join { second } => {
                let _ = session.join(pick(*second), now);
            }
            Action::Deploy { second, lane, health, attack, speed, element } => {
                let stats = CreatureStats {
                    health: u32::from(*health),
                    attack: u32::from(*attack),
                    defense: 1,
                    speed: u32::from(*speed),
                    element: ElementType::ALL[usize::from(*element) % ElementType::ALL.len()],
                    special_ability: None,
                };
                let creature = Creature::new("fuzz", "Fuzz", stats);
                let _ = session.deploy(pick(*second), creature, usize::from(*lane % 6), now);
            }
            Action::Ready { second } => {
                let _ = session.ready(pick(*second), now);
            }
            Action::Forfeit { second } => {
                let _ = session.forfeit(pick(*second), now);
            }
            Action::Disconnect { second } => {
                let _ = session.disconnect(pick(*second), now);
            }
            Action::Tick { after_ms } => {
                now += u64::from(*after_ms);
                let _ = session.tick(now);
            }
        }

        let battle = session.battle();
        if battle.status != BattleStatus::Waiting {
            started = true;
        }
        if started {
            assert_ne!(battle.status, BattleStatus::Waiting, "status went back to waiting");
        }
        assert!(session.drawing_phases() <= battle.config.wave_count);
        if battle.diagnostic.is_none() {
            assert!(validate_transition(&previous, &battle.state, lane_count).is_ok());
        }
        previous = battle.state.clone();
    }
});
