//! Request/response bodies for the HTTP service. The presentation layer
//! (games, admin UI) speaks only these shapes; it never writes to storage.

use crate::{Coins, ConversionRequest, Transaction, VaultTransaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AwardRequest {
    pub amount: f64,
    pub source: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AwardResponse {
    pub new_balance: Coins,
    /// Bonus-adjusted amount actually applied.
    pub awarded: Coins,
    pub vip_bonus_applied: bool,
    pub boost_applied: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub username: String,
    pub coins: Coins,
    pub total_coins_earned: Coins,
    pub games_played: u64,
    pub vip: bool,
    pub boost_uses_remaining: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub transactions: Vec<Transaction>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionBody {
    pub coins: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub request_id: Uuid,
    pub new_balance: Coins,
    pub credits: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionListResponse {
    pub requests: Vec<ConversionRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub request: ConversionRequest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultChargeBody {
    pub amount: f64,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultGrantBody {
    pub username: String,
    pub amount: f64,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultResponse {
    pub coins: Coins,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<VaultTransaction>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TipRedeemBody {
    pub credits: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TipRedeemResponse {
    pub tip_id: String,
    pub coins_granted: Coins,
    pub new_balance: Coins,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub new_balance: Coins,
    pub vip_until: Option<u64>,
    pub boost_uses_remaining: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub coins: Coins,
    pub games_played: u64,
    pub vip: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
