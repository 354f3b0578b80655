//! Common types used throughout coinworks.

pub mod account;
pub mod api;
pub mod coins;
pub mod error;
pub mod ledger;

pub use account::{Account, Role, Session};
pub use coins::Coins;
pub use error::LedgerError;
pub use ledger::{
    conversion_credits, tip_coins, AdminVault, ConversionRequest, RequestStatus, Transaction,
    TransactionKind, UsedTipRedemption, VaultTransaction, BOOST_AWARD_BPS, BOOST_COST, BOOST_USES,
    CONVERSION_COINS_PER_CREDIT, MIN_CONVERSION_COINS, SOURCE_ADMIN_ADJUSTMENT,
    SOURCE_ADMIN_GRANT, SOURCE_CREDIT_CONVERSION, SOURCE_PURCHASE_BOOST, SOURCE_PURCHASE_VIP,
    SOURCE_REQUEST_REJECTION, SOURCE_VIP_PAYMENT, TIP_COINS_PER_CREDIT, TIP_COINS_PER_CREDIT_VIP,
    VIP_AWARD_BONUS, VIP_CONVERSION_CREDIT_BONUS, VIP_COST, VIP_DURATION_MS, VIP_UPKEEP_FEE,
    VIP_UPKEEP_PERIOD_MS,
};
