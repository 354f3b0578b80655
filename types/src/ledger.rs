use crate::Coins;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source tag for conversion debits and tip-funded grants; awards with this
/// source never receive perk bonuses.
pub const SOURCE_CREDIT_CONVERSION: &str = "credit_conversion";
/// The one source tag allowed to carry a negative award amount.
pub const SOURCE_ADMIN_ADJUSTMENT: &str = "admin_adjustment";
pub const SOURCE_ADMIN_GRANT: &str = "admin_grant";
pub const SOURCE_VIP_PAYMENT: &str = "vip_payment";
pub const SOURCE_PURCHASE_VIP: &str = "purchase_vip";
pub const SOURCE_PURCHASE_BOOST: &str = "purchase_boost";
pub const SOURCE_REQUEST_REJECTION: &str = "request_rejection";

/// Flat per-award bonus while VIP is active.
pub const VIP_AWARD_BONUS: Coins = Coins::from_whole(75);
/// Coin-Boost bonus, in basis points of the original base amount.
pub const BOOST_AWARD_BPS: i64 = 500;

/// Minimum coins for an admin-approved conversion request.
pub const MIN_CONVERSION_COINS: u64 = 100;
/// Request-path rate: credits = floor(coins / this).
pub const CONVERSION_COINS_PER_CREDIT: u64 = 4;
/// Flat credit bonus on the request path for VIP accounts.
pub const VIP_CONVERSION_CREDIT_BONUS: u64 = 25;

/// Tip-purchase-path rate: coins granted per credit tipped.
pub const TIP_COINS_PER_CREDIT: u64 = 3;
pub const TIP_COINS_PER_CREDIT_VIP: u64 = 6;

pub const VIP_COST: Coins = Coins::from_whole(2000);
pub const VIP_DURATION_MS: u64 = 3 * 24 * 60 * 60 * 1000;
pub const BOOST_COST: Coins = Coins::from_whole(50);
pub const BOOST_USES: u32 = 10;

/// Recurring VIP upkeep fee, charged to the vault once per period.
pub const VIP_UPKEEP_FEE: Coins = Coins::from_hundredths(10);
pub const VIP_UPKEEP_PERIOD_MS: u64 = 1_000;

/// Credits granted on the request path, before escrow.
pub fn conversion_credits(coins: u64, vip: bool) -> u64 {
    let base = coins / CONVERSION_COINS_PER_CREDIT;
    if vip {
        base + VIP_CONVERSION_CREDIT_BONUS
    } else {
        base
    }
}

/// Coins granted for a verified tip of `credits` on the purchase path.
pub fn tip_coins(credits: u64, vip: bool) -> u64 {
    let rate = if vip {
        TIP_COINS_PER_CREDIT_VIP
    } else {
        TIP_COINS_PER_CREDIT
    };
    credits.saturating_mul(rate)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Earned,
    Spent,
    Refund,
}

/// One immutable row in a user's transaction log. Every balance mutation
/// appends exactly one of these in the same atomic batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub username: String,
    pub user_id: Uuid,
    pub amount: Coins,
    pub source: String,
    pub kind: TransactionKind,
    pub timestamp: u64,
    pub session_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// A two-phase credit-conversion request. Coins are debited into escrow at
/// creation; `pending -> approved` and `pending -> rejected` are the only
/// legal transitions, and rejection refunds the escrow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub id: Uuid,
    pub username: String,
    pub user_id: Uuid,
    pub coins_amount: u64,
    pub credits_amount: u64,
    pub status: RequestStatus,
    pub requested_at: u64,
    pub approved_at: Option<u64>,
    pub approved_by: Option<String>,
    pub rejected_at: Option<u64>,
    pub rejected_by: Option<String>,
}

impl ConversionRequest {
    pub fn pending(
        username: impl Into<String>,
        user_id: Uuid,
        coins_amount: u64,
        credits_amount: u64,
        now_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            user_id,
            coins_amount,
            credits_amount,
            status: RequestStatus::Pending,
            requested_at: now_ms,
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
        }
    }
}

/// Marker that an external tip has been redeemed. The record's existence is
/// the lock: a tip id may back at most one coin grant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsedTipRedemption {
    pub tip_id: String,
    pub user_id: Uuid,
    pub credits_spent: u64,
    pub coins_gained: Coins,
    pub processed_at: u64,
}

/// The shared admin coin pool. A singleton record mutated opposite to user
/// balances on every vault transfer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminVault {
    pub coins: Coins,
}

/// Admin-initiated transfer record, logged separately from the recipient's
/// personal transaction feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VaultTransaction {
    pub admin_user_id: Uuid,
    pub recipient_user_id: Uuid,
    pub recipient_username: String,
    pub amount: Coins,
    pub reason: String,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_rate_floors_and_adds_vip_bonus() {
        assert_eq!(conversion_credits(200, false), 50);
        assert_eq!(conversion_credits(203, false), 50);
        assert_eq!(conversion_credits(100, true), 50);
    }

    #[test]
    fn tip_rate_doubles_for_vip() {
        assert_eq!(tip_coins(10, false), 30);
        assert_eq!(tip_coins(10, true), 60);
    }

    #[test]
    fn request_starts_pending_and_unstamped() {
        let request = ConversionRequest::pending("alice", Uuid::new_v4(), 200, 50, 5);
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.requested_at, 5);
        assert!(request.approved_at.is_none());
        assert!(request.rejected_by.is_none());
    }

    #[test]
    fn transaction_kind_serializes_lowercase() {
        let json = serde_json::to_string(&TransactionKind::Refund).unwrap();
        assert_eq!(json, "\"refund\"");
    }
}
