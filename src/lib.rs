// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! Wavebattle: a territorial wave battle engine for two-player creature battles.
//!
//! Two players draw creatures, deploy them into parallel lanes, and the
//! engine fights them out on a fixed tick. Winning fights pushes lane
//! control toward the winner; a lane held completely closes for good.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Battle Registry (many sessions)   │
//! ├─────────────────────────────────────┤
//! │  Battle Session + Wave Scheduler    │
//! ├─────────────────────────────────────┤
//! │  Lane Territory Engine (control)    │
//! ├─────────────────────────────────────┤
//! │  Combat Resolver (per lane, tick)   │
//! ├─────────────────────────────────────┤
//! │  Territory Model (lanes, elements)  │
//! └─────────────────────────────────────┘
//! ```
//!
//! Everything below the registry is single-threaded and deterministic:
//! the same deployments and the same clock readings produce the same
//! battle, event for event.

pub mod battle;
pub mod combat;
pub mod config;
pub mod control;
pub mod error;
pub mod registry;
pub mod scenario;
pub mod session;
pub mod territory;
pub mod wave;

pub use battle::{Battle, BattleId, BattleStatus, FinishReason, PlayerId};
pub use config::{BattleSettings, ConfigError, TerritorialBattleConfig};
pub use error::{BattleError, BattleResult};
pub use registry::{BattleRegistry, EventSink, TickReport};
pub use session::{BattleEvent, BattleSession, Clock, DeploymentRequest, TickOutcome};

// Re-export key territory types at crate root for convenience
pub use territory::{
    AggregateControl, Control, Creature, CreatureId, CreatureInLane, CreatureStats, ElementType,
    LaneState, Side, SpecialAbility, TerritoryState,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_battle_starts_neutral() {
        let battle = Battle::new(
            BattleId(1),
            [PlayerId::from("a"), PlayerId::from("b")],
            TerritorialBattleConfig::default(),
            0,
        );
        let debug = format!("{:?}", battle.state.aggregate_control);
        assert!(debug.contains("player1"));
        assert_eq!(battle.state.aggregate_control.of(Side::Player1), Control::NONE);
    }
}
