use crate::locks::KeyLocks;
use crate::store::{Key, Staged, Store, Value};
use coinworks_types::{
    Account, Coins, LedgerError, Transaction, TransactionKind, BOOST_AWARD_BPS,
    SOURCE_ADMIN_ADJUSTMENT, SOURCE_CREDIT_CONVERSION, VIP_AWARD_BONUS,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Upper bound on the entries a history read returns.
const HISTORY_LIMIT: usize = 100;

/// The coin-ledger engine. Wraps a [`Store`] and serializes every mutation
/// of a record behind its [`KeyLocks`] entry, so two requests for the same
/// user cannot interleave their read-modify-write cycles.
pub struct Ledger<S: Store> {
    pub(crate) store: RwLock<S>,
    pub(crate) locks: KeyLocks,
}

/// What an award did, after bonuses.
#[derive(Clone, Debug, PartialEq)]
pub struct AwardOutcome {
    pub new_balance: Coins,
    pub awarded: Coins,
    pub vip_bonus_applied: bool,
    pub boost_applied: bool,
}

impl<S: Store> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: RwLock::new(store),
            locks: KeyLocks::default(),
        }
    }

    /// Fetches an account, creating a zeroed record on first reference.
    /// Creation is idempotent under concurrency: the account lock is taken
    /// and the store re-checked before writing.
    pub async fn get_or_create_account(
        &self,
        username: &str,
        user_id: Uuid,
        now_ms: u64,
    ) -> Result<Account, LedgerError> {
        {
            let store = self.store.read().await;
            if let Some(account) = Staged::new(&*store).account(username).await? {
                return Ok(account);
            }
        }

        let lock = self.locks.account(username);
        let _guard = lock.lock_owned().await;

        let batch = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            if let Some(account) = staged.account(username).await? {
                return Ok(account);
            }
            let account = Account::new(user_id, username, now_ms);
            staged.insert(
                Key::Account(username.to_string()),
                Value::Account(account),
            );
            staged.into_batch()
        };
        self.store.write().await.apply(batch).await?;

        let store = self.store.read().await;
        Staged::new(&*store)
            .account(username)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))
    }

    /// Applies a coin award (or an admin adjustment, the only source that
    /// may carry a negative amount). Perk bonuses stack on top of positive
    /// awards from any source except credit conversion: VIP adds a flat
    /// bonus, Coin-Boost adds a share of the original base and burns one
    /// use. The balance may never go negative, even for adjustments.
    pub async fn award(
        &self,
        username: &str,
        user_id: Uuid,
        amount: f64,
        source: &str,
        session_id: Option<String>,
        now_ms: u64,
    ) -> Result<AwardOutcome, LedgerError> {
        if source.trim().is_empty() {
            return Err(LedgerError::InvalidSource(source.to_string()));
        }
        let base = Coins::parse(amount)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{amount}")))?;
        if base.is_zero() {
            return Err(LedgerError::InvalidAmount("amount must be non-zero".into()));
        }
        if base.is_negative() && source != SOURCE_ADMIN_ADJUSTMENT {
            return Err(LedgerError::InvalidAmount(
                "negative amounts are reserved for admin adjustments".into(),
            ));
        }

        let lock = self.locks.account(username);
        let _guard = lock.lock_owned().await;

        let (batch, outcome) = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            let mut account = match staged.account(username).await? {
                Some(account) => account,
                None => Account::new(user_id, username, now_ms),
            };

            let bonus_eligible = base.is_positive() && source != SOURCE_CREDIT_CONVERSION;
            let vip = bonus_eligible && account.is_vip(now_ms);
            let boost = bonus_eligible && account.has_boost();

            let mut awarded = base;
            if vip {
                awarded = awarded
                    .checked_add(VIP_AWARD_BONUS)
                    .ok_or_else(|| LedgerError::InvalidAmount("award overflow".into()))?;
            }
            if boost {
                awarded = awarded
                    .checked_add(base.scale_bps(BOOST_AWARD_BPS))
                    .ok_or_else(|| LedgerError::InvalidAmount("award overflow".into()))?;
                account.boost_uses_remaining -= 1;
            }

            let new_balance = account
                .coins
                .checked_add(awarded)
                .ok_or_else(|| LedgerError::InvalidAmount("balance overflow".into()))?;
            if new_balance.is_negative() {
                return Err(LedgerError::InsufficientFunds {
                    have: account.coins,
                    need: awarded.abs(),
                });
            }

            account.coins = new_balance;
            if awarded.is_positive() {
                account.total_coins_earned = account.total_coins_earned.saturating_add(awarded);
            }
            if bonus_eligible {
                account.games_played += 1;
            }
            account.last_active_at = now_ms;

            staged.append_transaction(Transaction {
                username: username.to_string(),
                user_id: account.user_id,
                amount: awarded,
                source: source.to_string(),
                kind: if awarded.is_negative() {
                    TransactionKind::Spent
                } else {
                    TransactionKind::Earned
                },
                timestamp: now_ms,
                session_id,
            });
            staged.insert(
                Key::Account(username.to_string()),
                Value::Account(account),
            );

            let outcome = AwardOutcome {
                new_balance,
                awarded,
                vip_bonus_applied: vip,
                boost_applied: boost,
            };
            (staged.into_batch(), outcome)
        };

        self.store.write().await.apply(batch).await?;
        Ok(outcome)
    }

    pub async fn account(&self, username: &str) -> Result<Account, LedgerError> {
        let store = self.store.read().await;
        Staged::new(&*store)
            .account(username)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))
    }

    pub async fn balance(&self, username: &str) -> Result<Coins, LedgerError> {
        Ok(self.account(username).await?.coins)
    }

    /// A user's transaction history, newest first, capped for display.
    pub async fn history(&self, username: &str) -> Result<Vec<Transaction>, LedgerError> {
        let store = self.store.read().await;
        let mut transactions = store.transactions(username).await?;
        transactions.reverse();
        transactions.truncate(HISTORY_LIMIT);
        Ok(transactions)
    }

    /// Top accounts by current balance.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<Account>, LedgerError> {
        let store = self.store.read().await;
        let mut accounts = store.accounts().await?;
        accounts.sort_by(|a, b| b.coins.cmp(&a.coins).then(a.username.cmp(&b.username)));
        accounts.truncate(limit);
        Ok(accounts)
    }
}
