// Withdrawal request provider

use log::trace;
use sled::transaction::ConflictableTransactionResult;
use upline_common::{
    withdrawal::{WithdrawalError, WithdrawalRequest},
    UserId, WithdrawalId,
};

use crate::core::{
    error::EngineError,
    storage::{
        abort, trailing_id, user_key, user_withdrawal_key, withdrawal_key, SledStorage,
        NEXT_WITHDRAWAL_ID_KEY,
    },
};

pub trait WithdrawalProvider {
    /// Allocate the next request id.
    fn next_withdrawal_id(&self) -> Result<WithdrawalId, EngineError>;

    /// Insert or update a request row and its per-user index entry.
    fn put_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), EngineError>;

    /// Fetch one request.
    fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRequest>, EngineError>;

    /// Fetch one request, erroring when absent.
    fn expect_withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, EngineError>;

    /// Remove a request row and its index entry (admin deletion of a
    /// pending request; the ledger keeps the audit trail).
    fn remove_withdrawal(&self, id: WithdrawalId) -> Result<(), EngineError>;

    /// All requests of a user, oldest id first.
    fn get_withdrawals_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<WithdrawalRequest>, EngineError>;
}

impl WithdrawalProvider for SledStorage {
    fn next_withdrawal_id(&self) -> Result<WithdrawalId, EngineError> {
        let id = self.meta.transaction(
            |meta| -> ConflictableTransactionResult<WithdrawalId, EngineError> {
                let current = match meta.get(NEXT_WITHDRAWAL_ID_KEY)? {
                    Some(raw) => {
                        let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
                            abort(EngineError::CorruptedKey(
                                "next_withdrawal_id".to_string(),
                            ))
                        })?;
                        u64::from_be_bytes(bytes)
                    }
                    None => 1,
                };

                meta.insert(NEXT_WITHDRAWAL_ID_KEY, &(current + 1).to_be_bytes())?;
                Ok(current)
            },
        )?;

        Ok(id)
    }

    fn put_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), EngineError> {
        trace!("put withdrawal {} for user {}", request.id, request.user);
        self.save_json(&self.withdrawals, &withdrawal_key(request.id), request)?;
        self.withdrawals_by_user
            .insert(user_withdrawal_key(request.user, request.id), &[][..])?;
        Ok(())
    }

    fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRequest>, EngineError> {
        self.load_json(&self.withdrawals, &withdrawal_key(id))
    }

    fn expect_withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, EngineError> {
        self.get_withdrawal(id)?
            .ok_or_else(|| EngineError::Withdrawal(WithdrawalError::NotFound(id)))
    }

    fn remove_withdrawal(&self, id: WithdrawalId) -> Result<(), EngineError> {
        let request = self.expect_withdrawal(id)?;
        self.withdrawals.remove(withdrawal_key(id))?;
        self.withdrawals_by_user
            .remove(user_withdrawal_key(request.user, id))?;
        Ok(())
    }

    fn get_withdrawals_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<WithdrawalRequest>, EngineError> {
        let mut requests = Vec::new();
        for row in self.withdrawals_by_user.scan_prefix(user_key(user)) {
            let (key, _) = row?;
            let id = trailing_id(&key)?;
            // Index entries may briefly outlive a deleted row
            if let Some(request) = self.get_withdrawal(id)? {
                requests.push(request);
            }
        }

        Ok(requests)
    }
}
