//! Error types for battle operations.

use thiserror::Error;

use crate::battle::{BattleId, BattleStatus, PlayerId};
use crate::territory::InvariantViolation;

/// How callers should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A client action was refused; only the requesting client is told.
    Rejected,
    /// The caller may retry later or fix the request at the transport layer.
    Recoverable,
    /// The session cannot continue.
    Fatal,
}

/// Errors returned by battle sessions and the registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BattleError {
    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {operation} while battle is {status}")]
    InvalidPhase {
        /// Operation attempted.
        operation: &'static str,
        /// Battle status at the time.
        status: BattleStatus,
    },
    /// The target lane is closed.
    #[error("lane {lane} is closed")]
    LaneClosed {
        /// Lane index.
        lane: usize,
    },
    /// The lane index does not exist.
    #[error("lane {lane} does not exist (battle has {lane_count} lanes)")]
    InvalidLane {
        /// Requested lane.
        lane: usize,
        /// Lanes in the battle.
        lane_count: usize,
    },
    /// The player used every deployment slot this wave.
    #[error("player {player} already deployed {limit} creatures this wave")]
    DeployLimitExceeded {
        /// Player that hit the limit.
        player: PlayerId,
        /// Slots per wave.
        limit: u32,
    },
    /// Both player slots are taken.
    #[error("battle {battle} already has two players")]
    AlreadyFull {
        /// Battle id.
        battle: BattleId,
    },
    /// Unknown battle id.
    #[error("battle {0} not found")]
    BattleNotFound(BattleId),
    /// The player is not part of this battle.
    #[error("player {0} is not part of this battle")]
    PlayerNotFound(PlayerId),
    /// The battle roster is unusable.
    #[error("invalid roster: {reason}")]
    InvalidRoster {
        /// What is wrong.
        reason: &'static str,
    },
    /// The battle settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    /// The submitted creature has unusable stats.
    #[error("invalid creature: {reason}")]
    InvalidCreature {
        /// What is wrong.
        reason: &'static str,
    },
    /// The action depends on a feature flag that is off.
    #[error("{feature} is disabled for this battle")]
    FeatureDisabled {
        /// Feature name.
        feature: &'static str,
    },
    /// The battle hit its maximum duration.
    #[error("battle timed out after {elapsed_ms} ms")]
    SessionTimeout {
        /// Time since the battle started.
        elapsed_ms: u64,
    },
    /// The territory reached an impossible state.
    #[error("invariant violation: {0}")]
    InvariantViolation(#[from] InvariantViolation),
}

impl BattleError {
    /// Classify this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::LaneClosed { .. }
            | Self::InvalidLane { .. }
            | Self::DeployLimitExceeded { .. }
            | Self::AlreadyFull { .. }
            | Self::InvalidRoster { .. }
            | Self::InvalidSettings(_)
            | Self::InvalidCreature { .. }
            | Self::FeatureDisabled { .. } => ErrorClass::Rejected,
            Self::InvalidPhase { .. } | Self::BattleNotFound(_) | Self::PlayerNotFound(_) => {
                ErrorClass::Recoverable
            }
            Self::SessionTimeout { .. } | Self::InvariantViolation(_) => ErrorClass::Fatal,
        }
    }

    /// Stable machine-readable code for clients.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPhase { .. } => "invalid_phase",
            Self::LaneClosed { .. } => "lane_closed",
            Self::InvalidLane { .. } => "invalid_lane",
            Self::DeployLimitExceeded { .. } => "deploy_limit_exceeded",
            Self::AlreadyFull { .. } => "already_full",
            Self::BattleNotFound(_) | Self::PlayerNotFound(_) => "not_found",
            Self::InvalidRoster { .. } => "invalid_roster",
            Self::InvalidSettings(_) => "invalid_settings",
            Self::InvalidCreature { .. } => "invalid_creature",
            Self::FeatureDisabled { .. } => "feature_disabled",
            Self::SessionTimeout { .. } => "session_timeout",
            Self::InvariantViolation(_) => "invariant_violation",
        }
    }
}

/// Result type for battle operations.
pub type BattleResult<T> = Result<T, BattleError>;
