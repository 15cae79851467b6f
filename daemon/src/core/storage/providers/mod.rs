mod bonus;
mod ledger;
mod referral;
mod run;
mod task;
mod withdrawal;

pub use bonus::ManagementBonusProvider;
pub use ledger::LedgerProvider;
pub use referral::ReferralProvider;
pub use run::SettlementRunProvider;
pub use task::TaskProvider;
pub use withdrawal::WithdrawalProvider;
