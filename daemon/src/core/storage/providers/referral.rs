// Referral hierarchy provider
//
// Only A-level edges are persisted: the referee's account carries its
// referrer and the children tree indexes the reverse direction. B and C
// ancestors are derived by walking the A-chain at read time, so the levels
// can never disagree with each other.

use std::collections::HashSet;

use log::trace;
use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;
use upline_common::{
    account::UserAccount,
    referral::{AncestorChain, ReferralBinding, ReferralError, ReferralLevel, MAX_ANCESTOR_LEVELS},
    time::get_current_time_in_millis,
    UserId,
};

use crate::core::{
    error::EngineError,
    storage::{abort, from_json, to_json, trailing_id, user_key, SledStorage},
};

use super::LedgerProvider;

pub trait ReferralProvider {
    /// Bind `referee` to `referrer`, once. Fails with `AlreadyBound` if the
    /// referee already has an A-level referrer.
    fn record_referral(&self, referrer: UserId, referee: UserId) -> Result<(), EngineError>;

    /// The A-level referrer of a user, if bound.
    fn get_referrer(&self, user: UserId) -> Result<Option<UserId>, EngineError>;

    /// Walk the A-chain up to three hops; missing hops are simply absent.
    fn get_ancestors(&self, user: UserId) -> Result<AncestorChain, EngineError>;

    /// All descendants exactly at the given level below a user.
    fn get_descendants_at_level(
        &self,
        user: UserId,
        level: ReferralLevel,
    ) -> Result<Vec<UserId>, EngineError>;

    /// Direct (A-level) referrals of a user.
    fn get_direct_referrals(&self, user: UserId) -> Result<Vec<UserId>, EngineError>;
}

impl ReferralProvider for SledStorage {
    fn record_referral(&self, referrer: UserId, referee: UserId) -> Result<(), EngineError> {
        if referrer == referee {
            return Err(ReferralError::SelfReferral.into());
        }

        trace!("record referral {} -> {}", referrer, referee);

        // The referrer must exist as an account before collecting referees
        self.get_or_create_account(referrer)?;

        let now = get_current_time_in_millis();
        let binding = ReferralBinding {
            referrer,
            referee,
            bound_at: now,
        };

        (&self.accounts, &self.children).transaction(
            |(accounts, children)| -> ConflictableTransactionResult<(), EngineError> {
                // Binding the referee under one of its own descendants would
                // close a cycle. The walk happens inside the transaction so
                // a concurrent mutual binding conflicts on the read set and
                // retries against the committed edge instead of slipping in.
                let mut visited = HashSet::new();
                let mut cursor = Some(referrer);
                while let Some(current) = cursor {
                    if current == referee || !visited.insert(current) {
                        return Err(abort(ReferralError::CircularReference));
                    }

                    cursor = match accounts.get(user_key(current))? {
                        Some(raw) => from_json::<UserAccount>(&raw)?.referrer,
                        None => None,
                    };
                }

                let referee_key = user_key(referee);
                let mut account = match accounts.get(referee_key)? {
                    Some(raw) => from_json::<UserAccount>(&raw)?,
                    None => UserAccount::new(referee, now),
                };

                if account.has_referrer() {
                    return Err(abort(ReferralError::AlreadyBound(referee)));
                }

                account.referrer = Some(referrer);
                accounts.insert(&referee_key[..], to_json(&account)?)?;

                let mut edge_key = [0u8; 16];
                edge_key[..8].copy_from_slice(&referrer.to_be_bytes());
                edge_key[8..].copy_from_slice(&referee.to_be_bytes());
                children.insert(&edge_key[..], to_json(&binding)?)?;

                Ok(())
            },
        )?;

        Ok(())
    }

    fn get_referrer(&self, user: UserId) -> Result<Option<UserId>, EngineError> {
        Ok(self.get_account(user)?.and_then(|account| account.referrer))
    }

    fn get_ancestors(&self, user: UserId) -> Result<AncestorChain, EngineError> {
        trace!("get ancestors of {}", user);

        let mut walk = Vec::with_capacity(MAX_ANCESTOR_LEVELS);
        let mut cursor = user;
        for _ in 0..MAX_ANCESTOR_LEVELS {
            match self.get_referrer(cursor)? {
                Some(ancestor) => {
                    // Write-once edges cannot form cycles, checked anyway
                    // so a corrupted index degrades instead of looping
                    if ancestor == user || walk.contains(&ancestor) {
                        return Err(ReferralError::CircularReference.into());
                    }

                    walk.push(ancestor);
                    cursor = ancestor;
                }
                None => break,
            }
        }

        Ok(AncestorChain::from_walk(&walk))
    }

    fn get_descendants_at_level(
        &self,
        user: UserId,
        level: ReferralLevel,
    ) -> Result<Vec<UserId>, EngineError> {
        trace!("get descendants of {} at level {}", user, level);

        let mut frontier = vec![user];
        for _ in 0..=level.depth() {
            let mut next = Vec::new();
            for parent in frontier {
                next.extend(self.get_direct_referrals(parent)?);
            }

            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }

        Ok(frontier)
    }

    fn get_direct_referrals(&self, user: UserId) -> Result<Vec<UserId>, EngineError> {
        let mut referrals = Vec::new();
        for row in self.children.scan_prefix(user_key(user)) {
            let (key, _) = row?;
            referrals.push(trailing_id(&key)?);
        }

        Ok(referrals)
    }
}
