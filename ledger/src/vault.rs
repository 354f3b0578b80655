//! Vault transfers: the double-entry moves between user balances and the
//! shared admin pool, plus the perk purchases that ride on them.

use crate::engine::Ledger;
use crate::store::{Key, Staged, Store, Value};
use coinworks_types::{
    Coins, LedgerError, Role, Session, Transaction, TransactionKind, VaultTransaction,
    BOOST_COST, BOOST_USES, SOURCE_ADMIN_GRANT, SOURCE_PURCHASE_BOOST, SOURCE_PURCHASE_VIP,
    VIP_COST, VIP_DURATION_MS,
};

#[derive(Clone, Debug, PartialEq)]
pub struct VaultChargeOutcome {
    pub new_balance: Coins,
    pub vault_balance: Coins,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PurchaseOutcome {
    pub new_balance: Coins,
    pub vip_until: Option<u64>,
    pub boost_uses_remaining: u32,
}

impl<S: Store> Ledger<S> {
    /// Moves `amount` from a user's balance into the vault, appending a
    /// spent transaction tagged with `reason`. Both sides move in one batch
    /// so coins are conserved.
    pub async fn charge_to_vault(
        &self,
        username: &str,
        amount: Coins,
        reason: &str,
        now_ms: u64,
    ) -> Result<VaultChargeOutcome, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(
                "charge amount must be positive".into(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(LedgerError::InvalidSource(reason.to_string()));
        }

        let account_lock = self.locks.account(username);
        let _account_guard = account_lock.lock_owned().await;
        let vault_lock = self.locks.vault();
        let _vault_guard = vault_lock.lock_owned().await;

        let (batch, outcome) = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            let mut account = staged
                .account(username)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))?;
            if account.coins < amount {
                return Err(LedgerError::InsufficientFunds {
                    have: account.coins,
                    need: amount,
                });
            }
            let mut vault = staged.vault().await?;

            account.coins = account.coins.saturating_sub(amount);
            vault.coins = vault.coins.saturating_add(amount);

            staged.append_transaction(Transaction {
                username: username.to_string(),
                user_id: account.user_id,
                amount: -amount,
                source: reason.to_string(),
                kind: TransactionKind::Spent,
                timestamp: now_ms,
                session_id: None,
            });
            let outcome = VaultChargeOutcome {
                new_balance: account.coins,
                vault_balance: vault.coins,
            };
            staged.insert(
                Key::Account(username.to_string()),
                Value::Account(account),
            );
            staged.insert(Key::Vault, Value::Vault(vault));
            (staged.into_batch(), outcome)
        };

        self.store.write().await.apply(batch).await?;
        Ok(outcome)
    }

    /// Moves `amount` from the vault to an existing user. Grants append to
    /// both the recipient's feed and the vault transfer log, and do not
    /// count toward `total_coins_earned`.
    pub async fn grant_from_vault(
        &self,
        session: &Session,
        username: &str,
        amount: Coins,
        reason: &str,
        now_ms: u64,
    ) -> Result<VaultChargeOutcome, LedgerError> {
        if !session.has_role(Role::Admin) {
            return Err(LedgerError::Forbidden);
        }
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(
                "grant amount must be positive".into(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(LedgerError::InvalidSource(reason.to_string()));
        }

        let account_lock = self.locks.account(username);
        let _account_guard = account_lock.lock_owned().await;
        let vault_lock = self.locks.vault();
        let _vault_guard = vault_lock.lock_owned().await;

        let (batch, outcome) = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            let mut account = staged
                .account(username)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))?;
            let mut vault = staged.vault().await?;
            if vault.coins < amount {
                return Err(LedgerError::InsufficientVaultFunds {
                    have: vault.coins,
                    need: amount,
                });
            }

            vault.coins = vault.coins.saturating_sub(amount);
            account.coins = account.coins.saturating_add(amount);

            staged.append_transaction(Transaction {
                username: username.to_string(),
                user_id: account.user_id,
                amount,
                source: SOURCE_ADMIN_GRANT.to_string(),
                kind: TransactionKind::Earned,
                timestamp: now_ms,
                session_id: None,
            });
            staged.append_vault_transaction(VaultTransaction {
                admin_user_id: session.user_id,
                recipient_user_id: account.user_id,
                recipient_username: username.to_string(),
                amount,
                reason: reason.to_string(),
                timestamp: now_ms,
            });
            let outcome = VaultChargeOutcome {
                new_balance: account.coins,
                vault_balance: vault.coins,
            };
            staged.insert(
                Key::Account(username.to_string()),
                Value::Account(account),
            );
            staged.insert(Key::Vault, Value::Vault(vault));
            (staged.into_batch(), outcome)
        };

        self.store.write().await.apply(batch).await?;
        Ok(outcome)
    }

    /// Buys a VIP pass, routing the cost through the vault. Rejected while
    /// Coin-Boost uses remain or a pass is already active.
    pub async fn purchase_vip(
        &self,
        session: &Session,
        now_ms: u64,
    ) -> Result<PurchaseOutcome, LedgerError> {
        let username = session.username.as_str();

        let account_lock = self.locks.account(username);
        let _account_guard = account_lock.lock_owned().await;
        let vault_lock = self.locks.vault();
        let _vault_guard = vault_lock.lock_owned().await;

        let (batch, outcome) = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            let mut account = staged
                .account(username)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))?;
            if account.coins < VIP_COST {
                return Err(LedgerError::InsufficientFunds {
                    have: account.coins,
                    need: VIP_COST,
                });
            }
            if account.has_boost() {
                return Err(LedgerError::PerkConflict(
                    "cannot buy a VIP pass while Coin-Boost uses remain",
                ));
            }
            if account.is_vip(now_ms) {
                return Err(LedgerError::PerkConflict("a VIP pass is already active"));
            }
            let mut vault = staged.vault().await?;

            account.coins = account.coins.saturating_sub(VIP_COST);
            vault.coins = vault.coins.saturating_add(VIP_COST);
            account.vip_until = Some(now_ms + VIP_DURATION_MS);
            account.last_active_at = now_ms;

            staged.append_transaction(Transaction {
                username: username.to_string(),
                user_id: account.user_id,
                amount: -VIP_COST,
                source: SOURCE_PURCHASE_VIP.to_string(),
                kind: TransactionKind::Spent,
                timestamp: now_ms,
                session_id: None,
            });
            let outcome = PurchaseOutcome {
                new_balance: account.coins,
                vip_until: account.vip_until,
                boost_uses_remaining: account.boost_uses_remaining,
            };
            staged.insert(
                Key::Account(username.to_string()),
                Value::Account(account),
            );
            staged.insert(Key::Vault, Value::Vault(vault));
            (staged.into_batch(), outcome)
        };

        self.store.write().await.apply(batch).await?;
        Ok(outcome)
    }

    /// Buys a Coin-Boost pack. Rejected while uses remain or VIP is active.
    pub async fn purchase_boost(
        &self,
        session: &Session,
        now_ms: u64,
    ) -> Result<PurchaseOutcome, LedgerError> {
        let username = session.username.as_str();

        let account_lock = self.locks.account(username);
        let _account_guard = account_lock.lock_owned().await;
        let vault_lock = self.locks.vault();
        let _vault_guard = vault_lock.lock_owned().await;

        let (batch, outcome) = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            let mut account = staged
                .account(username)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))?;
            if account.coins < BOOST_COST {
                return Err(LedgerError::InsufficientFunds {
                    have: account.coins,
                    need: BOOST_COST,
                });
            }
            if account.has_boost() {
                return Err(LedgerError::PerkConflict(
                    "a Coin-Boost pack is already active",
                ));
            }
            if account.is_vip(now_ms) {
                return Err(LedgerError::PerkConflict(
                    "cannot buy Coin-Boost while a VIP pass is active",
                ));
            }
            let mut vault = staged.vault().await?;

            account.coins = account.coins.saturating_sub(BOOST_COST);
            vault.coins = vault.coins.saturating_add(BOOST_COST);
            account.boost_uses_remaining = BOOST_USES;
            account.last_active_at = now_ms;

            staged.append_transaction(Transaction {
                username: username.to_string(),
                user_id: account.user_id,
                amount: -BOOST_COST,
                source: SOURCE_PURCHASE_BOOST.to_string(),
                kind: TransactionKind::Spent,
                timestamp: now_ms,
                session_id: None,
            });
            let outcome = PurchaseOutcome {
                new_balance: account.coins,
                vip_until: account.vip_until,
                boost_uses_remaining: account.boost_uses_remaining,
            };
            staged.insert(
                Key::Account(username.to_string()),
                Value::Account(account),
            );
            staged.insert(Key::Vault, Value::Vault(vault));
            (staged.into_batch(), outcome)
        };

        self.store.write().await.apply(batch).await?;
        Ok(outcome)
    }

    pub async fn vault_balance(&self) -> Result<Coins, LedgerError> {
        let store = self.store.read().await;
        Ok(Staged::new(&*store).vault().await?.coins)
    }

    /// The vault transfer log, oldest first. Admin only.
    pub async fn vault_history(
        &self,
        session: &Session,
    ) -> Result<Vec<VaultTransaction>, LedgerError> {
        if !session.has_role(Role::Admin) {
            return Err(LedgerError::Forbidden);
        }
        let store = self.store.read().await;
        Ok(store.vault_transactions().await?)
    }
}
