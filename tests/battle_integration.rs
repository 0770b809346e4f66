//! End-to-end battles driven through sessions and scenario files.
//!
//! These tests play whole battles on simulated time and check the outcome,
//! the wave lifecycle, and that finished battles stay frozen.
//!
//! Run with: cargo test --release battle_integration

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use wavebattle::scenario::{Scenario, ScenarioRunner, random_scenario, run_scenario};
use wavebattle::session::events;
use wavebattle::{
    BattleError, BattleEvent, BattleId, BattleSession, BattleSettings, BattleStatus, Creature,
    CreatureStats, ElementType, FinishReason, PlayerId, Side, TerritorialBattleConfig,
};

/// Load a scenario from the scenarios directory.
fn load_scenario(name: &str) -> Scenario {
    let path = format!("{}/scenarios/{}.json", env!("CARGO_MANIFEST_DIR"), name);
    Scenario::load(std::path::Path::new(&path))
        .unwrap_or_else(|e| panic!("Failed to load {path}: {e}"))
}

fn players() -> [PlayerId; 2] {
    [PlayerId::from("alice"), PlayerId::from("bob")]
}

fn creature(element: ElementType) -> Creature {
    Creature::new(
        format!("{element}-drawing"),
        "Sketch",
        CreatureStats {
            health: 20,
            attack: 10,
            defense: 2,
            speed: 10,
            element,
            special_ability: None,
        },
    )
}

fn started(settings: BattleSettings) -> BattleSession {
    let mut session = BattleSession::create(BattleId(1), players(), settings, 0).unwrap();
    for player in players() {
        session.join(&player, 0).unwrap();
    }
    session
}

#[test]
fn test_fire_beats_earth_from_file() {
    let report = run_scenario(&load_scenario("fire_vs_earth")).unwrap();
    assert_eq!(report.winner, Some(PlayerId::from("alice")));
    assert_eq!(report.finish_reason, Some(FinishReason::AllLanesCaptured));
    assert_eq!(report.waves_played, 1);
    assert!(report.lanes[0].closed);
    assert_eq!(report.lanes[0].owner, Some(Side::Player1));
    assert!((report.lanes[0].player1 - 100.0).abs() < 1e-9);
    assert_eq!(report.event_counts.get(events::TERRITORY_LANE_CAPTURED), Some(&1));
    assert_eq!(report.event_counts.get(events::BATTLE_END), Some(&1));
}

#[test]
fn test_three_lane_scenario_finishes() {
    let scenario = load_scenario("three_lanes");
    let report = run_scenario(&scenario).unwrap();
    assert!(report.finish_reason.is_some());
    assert!(report.drawing_phases <= scenario.settings.battle.wave_count);
    // Wave 2 creatures may target lanes already closed in wave 1.
    assert!(
        report.rejections.iter().all(|r| r.code == "lane_closed"),
        "{:?}",
        report.rejections
    );
    let spawns = report.event_counts.get(events::WAVE_SPAWN).copied().unwrap_or(0);
    assert_eq!(spawns + report.rejections.len(), scenario.deployments.len());
}

#[test]
fn test_same_scenario_same_report() {
    let scenario = load_scenario("three_lanes");
    assert_eq!(run_scenario(&scenario).unwrap(), run_scenario(&scenario).unwrap());
}

#[test]
fn test_status_never_returns_to_waiting() {
    for seed in 100..110 {
        let scenario = random_scenario(seed);
        let wave_count = scenario.settings.battle.wave_count;
        let mut runner = ScenarioRunner::new(scenario).unwrap();
        let mut last_wave = 0;
        while !runner.is_finished() {
            runner.step().unwrap();
            let battle = runner.session().battle();
            assert_ne!(battle.status, BattleStatus::Waiting, "seed {seed}");
            assert!(battle.current_wave >= last_wave, "seed {seed}: wave went back");
            assert!(battle.current_wave <= wave_count, "seed {seed}");
            assert!(runner.session().drawing_phases() <= wave_count, "seed {seed}");
            last_wave = battle.current_wave;
        }
    }
}

#[test]
fn test_deploy_into_closed_lane_is_rejected() {
    let json = r#"{
        "name": "closed lane",
        "players": ["alice", "bob"],
        "settings": {"battle": {"waveCount": 2, "waveInterval": 1, "laneCount": 2}},
        "deployments": [
            {"wave": 1, "player": "alice", "lane": 0, "creature": {
                "id": "a1", "name": "Blaze",
                "stats": {"health": 20, "attack": 10, "defense": 2, "speed": 10, "element": "fire"}}},
            {"wave": 2, "player": "bob", "lane": 0, "creature": {
                "id": "b1", "name": "Pebble",
                "stats": {"health": 20, "attack": 8, "defense": 2, "speed": 10, "element": "earth"}}}
        ]
    }"#;
    let report = run_scenario(&Scenario::from_json(json).unwrap()).unwrap();
    assert_eq!(report.rejections.len(), 1);
    assert_eq!(report.rejections[0].code, "lane_closed");
    assert_eq!(report.rejections[0].wave, 2);
    assert!(report.lanes[0].closed);
    assert!(!report.lanes[1].closed);
    assert_eq!(report.finish_reason, Some(FinishReason::WavesExhausted));
    assert_eq!(report.winner, Some(PlayerId::from("alice")));
}

#[test]
fn test_timeout_during_drawing_is_a_draw() {
    let settings = BattleSettings {
        battle: TerritorialBattleConfig {
            wave_interval: 10,
            ..TerritorialBattleConfig::default()
        },
        timing: wavebattle::config::TimingConfig {
            max_battle_duration_secs: 5,
            ..wavebattle::config::TimingConfig::default()
        },
        ..BattleSettings::default()
    };
    let mut session = started(settings);
    let alice = PlayerId::from("alice");

    assert!(matches!(
        session.deploy(&alice, creature(ElementType::Water), 0, 5_000),
        Err(BattleError::SessionTimeout { .. })
    ));

    session.tick(5_000).unwrap();
    let battle = session.battle();
    assert_eq!(battle.finish_reason, Some(FinishReason::Timeout));
    assert!(battle.is_draw());
    assert!(matches!(
        session.deploy(&alice, creature(ElementType::Water), 0, 5_500),
        Err(BattleError::InvalidPhase { .. })
    ));
}

#[test]
fn test_forfeit_mid_wave_freezes_battle() {
    let settings = BattleSettings {
        battle: TerritorialBattleConfig {
            wave_interval: 1,
            lane_count: 1,
            ..TerritorialBattleConfig::default()
        },
        ..BattleSettings::default()
    };
    let mut session = started(settings);
    let alice = PlayerId::from("alice");
    let bob = PlayerId::from("bob");
    session.deploy(&alice, creature(ElementType::Fire), 0, 0).unwrap();
    session.deploy(&bob, creature(ElementType::Earth), 0, 0).unwrap();

    let mut now = 0;
    while session.battle().status != BattleStatus::Battling {
        now += 500;
        session.tick(now).unwrap();
    }
    now += 2_000;
    session.tick(now).unwrap();
    session.drain_events();

    session.forfeit(&alice, now).unwrap();
    let events = session.drain_events();
    assert!(matches!(
        events.as_slice(),
        [BattleEvent::End { winner: Some(w), reason: FinishReason::Forfeit, .. }] if *w == bob
    ));

    let frozen = session.snapshot();
    let outcome = session.tick(now + 30_000).unwrap();
    assert_eq!(outcome.steps, 0);
    assert!(outcome.events.is_empty());
    assert_eq!(session.snapshot(), frozen);
    assert!(matches!(
        session.deploy(&bob, creature(ElementType::Air), 0, now + 30_000),
        Err(BattleError::InvalidPhase { .. })
    ));
}

#[test]
fn test_stranger_cannot_join() {
    let mut session = started(BattleSettings::default());
    assert!(matches!(
        session.join(&PlayerId::from("mallory"), 10),
        Err(BattleError::AlreadyFull { .. })
    ));
    assert!(matches!(
        session.deploy(&PlayerId::from("mallory"), creature(ElementType::Dark), 0, 10),
        Err(BattleError::PlayerNotFound(_))
    ));
}

#[test]
fn test_territory_updates_stay_valid() {
    let mut runner = ScenarioRunner::new(load_scenario("three_lanes")).unwrap();
    while !runner.is_finished() {
        let outcome = runner.step().unwrap();
        let violations = wavebattle::territory::check_invariants(&outcome.state, 3);
        assert!(violations.is_empty(), "{violations:?}");
        for lane in &outcome.state.lanes {
            let total = u32::from(lane.player1_control.basis_points())
                + u32::from(lane.player2_control.basis_points());
            assert!(total <= 10_000);
        }
    }
}
