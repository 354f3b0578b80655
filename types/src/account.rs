use crate::Coins;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's ledger record, keyed uniquely by username.
///
/// Created lazily on first reference with all numeric fields at zero and
/// never hard-deleted. Every mutation flows through the ledger engine so
/// that `coins` stays non-negative and each balance change has a matching
/// transaction row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: Uuid,
    pub username: String,
    pub coins: Coins,
    /// Monotonically non-decreasing; only grows on positive net awards.
    pub total_coins_earned: Coins,
    pub games_played: u64,
    /// Cached eligibility from the public-project lookup.
    pub has_public_project: bool,
    pub projects_checked_at: Option<u64>,
    /// VIP is active iff `now < vip_until`.
    pub vip_until: Option<u64>,
    /// Coin-Boost uses left; decremented once per qualifying award.
    pub boost_uses_remaining: u32,
    pub created_at: u64,
    pub last_active_at: u64,
}

impl Account {
    pub fn new(user_id: Uuid, username: impl Into<String>, now_ms: u64) -> Self {
        Self {
            user_id,
            username: username.into(),
            coins: Coins::ZERO,
            total_coins_earned: Coins::ZERO,
            games_played: 0,
            has_public_project: false,
            projects_checked_at: None,
            vip_until: None,
            boost_uses_remaining: 0,
            created_at: now_ms,
            last_active_at: now_ms,
        }
    }

    pub fn is_vip(&self, now_ms: u64) -> bool {
        self.vip_until.is_some_and(|until| now_ms < until)
    }

    pub fn has_boost(&self) -> bool {
        self.boost_uses_remaining > 0
    }
}

/// Capability roles attached to a session by the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Admin,
}

/// The caller's identity as supplied by the identity provider. The ledger
/// trusts it as-is and performs no further authentication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<Role>,
}

impl Session {
    pub fn player(user_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            roles: vec![Role::Player],
        }
    }

    pub fn admin(user_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            roles: vec![Role::Player, Role::Admin],
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vip_is_strictly_before_expiry() {
        let mut account = Account::new(Uuid::new_v4(), "alice", 0);
        assert!(!account.is_vip(1_000));
        account.vip_until = Some(2_000);
        assert!(account.is_vip(1_999));
        assert!(!account.is_vip(2_000));
        assert!(!account.is_vip(3_000));
    }

    #[test]
    fn admin_session_carries_both_roles() {
        let session = Session::admin(Uuid::new_v4(), "ops");
        assert!(session.has_role(Role::Admin));
        assert!(session.has_role(Role::Player));
        let player = Session::player(Uuid::new_v4(), "alice");
        assert!(!player.has_role(Role::Admin));
    }
}
