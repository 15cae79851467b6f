// Three-level referral hierarchy
//
// Only the A-level (direct) edge is ever stored: a user's B-level referrer
// is their A-level referrer's A-level referrer, and so on. Deriving B/C at
// read time from the single A-chain removes any possibility of the levels
// drifting apart.

mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    config::{MANAGEMENT_BONUS_BPS, REFERRAL_REWARD_BPS},
    ledger::EntryKind,
    time::TimestampMillis,
    UserId,
};

/// Maximum depth of the ancestor chain
pub const MAX_ANCESTOR_LEVELS: usize = 3;

/// Ancestor level relative to a given user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq, Hash)]
pub enum ReferralLevel {
    /// Direct referrer
    A,
    /// Referrer's referrer
    B,
    /// Third tier
    C,
}

impl ReferralLevel {
    pub const ALL: [ReferralLevel; MAX_ANCESTOR_LEVELS] =
        [ReferralLevel::A, ReferralLevel::B, ReferralLevel::C];

    /// Zero-based depth in the ancestor chain
    pub fn depth(&self) -> usize {
        match self {
            ReferralLevel::A => 0,
            ReferralLevel::B => 1,
            ReferralLevel::C => 2,
        }
    }

    /// One-time signup reward ratio for this level, in basis points
    pub fn referral_reward_bps(&self) -> u16 {
        REFERRAL_REWARD_BPS[self.depth()]
    }

    /// Daily management bonus ratio for this level, in basis points
    pub fn management_bonus_bps(&self) -> u16 {
        MANAGEMENT_BONUS_BPS[self.depth()]
    }

    /// Ledger kind credited for the one-time signup reward
    pub fn reward_kind(&self) -> EntryKind {
        match self {
            ReferralLevel::A => EntryKind::ReferralRewardA,
            ReferralLevel::B => EntryKind::ReferralRewardB,
            ReferralLevel::C => EntryKind::ReferralRewardC,
        }
    }

    /// Ledger kind credited for the daily management bonus
    pub fn bonus_kind(&self) -> EntryKind {
        match self {
            ReferralLevel::A => EntryKind::ManagementBonusA,
            ReferralLevel::B => EntryKind::ManagementBonusB,
            ReferralLevel::C => EntryKind::ManagementBonusC,
        }
    }
}

/// The stored A-level edge, written once at referee registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferralBinding {
    pub referrer: UserId,
    pub referee: UserId,

    /// Timestamp when the binding occurred (Unix millis)
    pub bound_at: TimestampMillis,
}

/// Up to three ancestors of a user, derived by walking the A-chain.
///
/// Missing hops are simply absent: a user whose referrer has no referrer
/// yields an A ancestor only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AncestorChain {
    pub a: Option<UserId>,
    pub b: Option<UserId>,
    pub c: Option<UserId>,
}

impl AncestorChain {
    /// Build a chain from an upline walk ordered direct-referrer first.
    /// Anything beyond three hops is ignored.
    pub fn from_walk(walk: &[UserId]) -> Self {
        Self {
            a: walk.first().copied(),
            b: walk.get(1).copied(),
            c: walk.get(2).copied(),
        }
    }

    /// Ancestor at the given level, if present.
    pub fn get(&self, level: ReferralLevel) -> Option<UserId> {
        match level {
            ReferralLevel::A => self.a,
            ReferralLevel::B => self.b,
            ReferralLevel::C => self.c,
        }
    }

    /// Iterate over the existing ancestors, shallowest first.
    pub fn iter(&self) -> impl Iterator<Item = (ReferralLevel, UserId)> + '_ {
        ReferralLevel::ALL
            .iter()
            .filter_map(move |level| self.get(*level).map(|user| (*level, user)))
    }

    /// Number of existing ancestor levels.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check if the user has no ancestors at all.
    pub fn is_empty(&self) -> bool {
        self.a.is_none()
    }
}
