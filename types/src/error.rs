use crate::Coins;
use thiserror::Error;
use uuid::Uuid;

/// Typed failure surface of the ledger. Business-rule violations never
/// crash the caller; only [`LedgerError::Storage`] wraps a fault the caller
/// cannot reason about and may retry as a whole.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid source tag: {0:?}")]
    InvalidSource(String),

    #[error("conversion below the minimum of {min} coins")]
    BelowMinimum { min: u64 },

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: Coins, need: Coins },

    #[error("insufficient vault funds: have {have}, need {need}")]
    InsufficientVaultFunds { have: Coins, need: Coins },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("conversion request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("conversion request {0} was already processed")]
    AlreadyProcessed(Uuid),

    #[error("tip {0} has already been redeemed")]
    TipAlreadyRedeemed(String),

    #[error("no recent tip of at least {min_credits} credits found")]
    NoQualifyingTip { min_credits: u64 },

    #[error("at least one public project is required")]
    NotEligible,

    #[error("{0}")]
    PerkConflict(&'static str),

    #[error("admin role required")]
    Forbidden,

    #[error("storage failure")]
    Storage(#[source] anyhow::Error),
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::Storage(err)
    }
}
