//! The two coin-to-credit paths: admin-approved conversion requests (coins
//! held in escrow until resolution) and instant tip redemption (coins
//! granted for a verified platform tip).

use crate::engine::Ledger;
use crate::external::{ProjectDirectory, TipFeed};
use crate::store::{Key, Staged, Store, Value};
use coinworks_types::{
    conversion_credits, tip_coins, Coins, ConversionRequest, LedgerError, RequestStatus, Role,
    Session, Transaction, TransactionKind, UsedTipRedemption, MIN_CONVERSION_COINS,
    SOURCE_CREDIT_CONVERSION, SOURCE_REQUEST_REJECTION,
};
use tracing::warn;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct ConversionOutcome {
    pub request_id: Uuid,
    pub new_balance: Coins,
    pub credits: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TipOutcome {
    pub tip_id: String,
    pub coins_granted: Coins,
    pub new_balance: Coins,
}

impl<S: Store> Ledger<S> {
    /// Opens a conversion request: verifies public-project eligibility,
    /// debits `coins` into escrow, and records a pending request. Credits
    /// are computed at request time so a later VIP change cannot alter the
    /// payout.
    pub async fn request_conversion<P: ProjectDirectory>(
        &self,
        session: &Session,
        coins: u64,
        projects: &P,
        now_ms: u64,
    ) -> Result<ConversionOutcome, LedgerError> {
        if coins < MIN_CONVERSION_COINS {
            return Err(LedgerError::BelowMinimum {
                min: MIN_CONVERSION_COINS,
            });
        }
        let debit = Coins::from_whole_u64(coins)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{coins} coins")))?;

        let username = session.username.as_str();
        let lock = self.locks.account(username);
        let _guard = lock.lock_owned().await;

        // The lookup goes out over the network; resolve it before taking
        // the store guard so a slow platform cannot stall operations on
        // other accounts. The account lock already serializes this user.
        let lookup = projects.has_public_project(username).await;

        let (batch, outcome) = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            let mut account = staged
                .account(username)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))?;

            // A failed lookup denies the request but keeps the cached flag,
            // so a platform outage cannot strip eligibility state.
            let eligible = match lookup {
                Ok(flag) => {
                    account.has_public_project = flag;
                    account.projects_checked_at = Some(now_ms);
                    flag
                }
                Err(err) => {
                    warn!(username, error = %err, "public-project lookup failed");
                    false
                }
            };
            if !eligible {
                staged.insert(
                    Key::Account(username.to_string()),
                    Value::Account(account),
                );
                let batch = staged.into_batch();
                drop(store);
                self.store.write().await.apply(batch).await?;
                return Err(LedgerError::NotEligible);
            }

            if account.coins < debit {
                return Err(LedgerError::InsufficientFunds {
                    have: account.coins,
                    need: debit,
                });
            }

            let vip = account.is_vip(now_ms);
            let credits = conversion_credits(coins, vip);
            let request =
                ConversionRequest::pending(username, account.user_id, coins, credits, now_ms);

            account.coins = account.coins.saturating_sub(debit);
            account.last_active_at = now_ms;

            staged.append_transaction(Transaction {
                username: username.to_string(),
                user_id: account.user_id,
                amount: -debit,
                source: SOURCE_CREDIT_CONVERSION.to_string(),
                kind: TransactionKind::Spent,
                timestamp: now_ms,
                session_id: None,
            });
            let outcome = ConversionOutcome {
                request_id: request.id,
                new_balance: account.coins,
                credits,
            };
            staged.insert(Key::Request(request.id), Value::Request(request));
            staged.insert(
                Key::Account(username.to_string()),
                Value::Account(account),
            );
            (staged.into_batch(), outcome)
        };

        self.store.write().await.apply(batch).await?;
        Ok(outcome)
    }

    /// Stamps a pending request approved. The coins were already taken into
    /// escrow at request time, so approval moves no balance; the credit
    /// grant happens off-ledger.
    pub async fn approve_conversion(
        &self,
        request_id: Uuid,
        session: &Session,
        now_ms: u64,
    ) -> Result<ConversionRequest, LedgerError> {
        if !session.has_role(Role::Admin) {
            return Err(LedgerError::Forbidden);
        }

        let lock = self.locks.request(&request_id);
        let _guard = lock.lock_owned().await;

        let (batch, request) = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            let mut request = staged
                .request(&request_id)
                .await?
                .ok_or(LedgerError::RequestNotFound(request_id))?;
            if request.status != RequestStatus::Pending {
                return Err(LedgerError::AlreadyProcessed(request_id));
            }
            request.status = RequestStatus::Approved;
            request.approved_at = Some(now_ms);
            request.approved_by = Some(session.username.clone());
            staged.insert(Key::Request(request_id), Value::Request(request.clone()));
            (staged.into_batch(), request)
        };

        self.store.write().await.apply(batch).await?;
        Ok(request)
    }

    /// Stamps a pending request rejected and refunds the escrowed coins in
    /// the same atomic batch.
    pub async fn reject_conversion(
        &self,
        request_id: Uuid,
        session: &Session,
        now_ms: u64,
    ) -> Result<ConversionRequest, LedgerError> {
        if !session.has_role(Role::Admin) {
            return Err(LedgerError::Forbidden);
        }

        let request_lock = self.locks.request(&request_id);
        let _request_guard = request_lock.lock_owned().await;

        let username = {
            let store = self.store.read().await;
            let request = Staged::new(&*store)
                .request(&request_id)
                .await?
                .ok_or(LedgerError::RequestNotFound(request_id))?;
            if request.status != RequestStatus::Pending {
                return Err(LedgerError::AlreadyProcessed(request_id));
            }
            request.username
        };

        let account_lock = self.locks.account(&username);
        let _account_guard = account_lock.lock_owned().await;

        let (batch, request) = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            let mut request = staged
                .request(&request_id)
                .await?
                .ok_or(LedgerError::RequestNotFound(request_id))?;
            if request.status != RequestStatus::Pending {
                return Err(LedgerError::AlreadyProcessed(request_id));
            }
            let mut account = staged
                .account(&request.username)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(request.username.clone()))?;

            let refund = Coins::from_whole_u64(request.coins_amount).ok_or_else(|| {
                LedgerError::InvalidAmount(format!("{} coins", request.coins_amount))
            })?;
            account.coins = account.coins.saturating_add(refund);

            request.status = RequestStatus::Rejected;
            request.rejected_at = Some(now_ms);
            request.rejected_by = Some(session.username.clone());

            staged.append_transaction(Transaction {
                username: request.username.clone(),
                user_id: request.user_id,
                amount: refund,
                source: SOURCE_REQUEST_REJECTION.to_string(),
                kind: TransactionKind::Refund,
                timestamp: now_ms,
                session_id: None,
            });
            staged.insert(
                Key::Account(request.username.clone()),
                Value::Account(account),
            );
            staged.insert(Key::Request(request_id), Value::Request(request.clone()));
            (staged.into_batch(), request)
        };

        self.store.write().await.apply(batch).await?;
        Ok(request)
    }

    /// All conversion requests, oldest first. Admin only.
    pub async fn conversion_requests(
        &self,
        session: &Session,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ConversionRequest>, LedgerError> {
        if !session.has_role(Role::Admin) {
            return Err(LedgerError::Forbidden);
        }
        let store = self.store.read().await;
        Ok(store.requests(status).await?)
    }

    /// One user's conversion requests, newest first.
    pub async fn conversions_for(
        &self,
        username: &str,
    ) -> Result<Vec<ConversionRequest>, LedgerError> {
        let store = self.store.read().await;
        let mut requests: Vec<ConversionRequest> = store
            .requests(None)
            .await?
            .into_iter()
            .filter(|request| request.username == username)
            .collect();
        requests.reverse();
        Ok(requests)
    }

    /// Redeems the newest unclaimed tip of at least `credits` paid by the
    /// caller, granting coins at the tip rate. A tip id backs at most one
    /// grant; the used-tip record is the idempotency marker.
    pub async fn redeem_tip<F: TipFeed>(
        &self,
        session: &Session,
        credits: u64,
        tips: &F,
        now_ms: u64,
    ) -> Result<TipOutcome, LedgerError> {
        if credits == 0 {
            return Err(LedgerError::InvalidAmount("credits must be positive".into()));
        }

        let feed = tips.recent_tips().await.map_err(LedgerError::Storage)?;

        let username = session.username.as_str();
        let account = self
            .get_or_create_account(username, session.user_id, now_ms)
            .await?;
        let vip = account.is_vip(now_ms);

        let mut candidates: Vec<_> = feed
            .into_iter()
            .filter(|tip| tip.payer == username && tip.credits_spent >= credits)
            .collect();
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let tip = candidates
            .into_iter()
            .next()
            .ok_or(LedgerError::NoQualifyingTip {
                min_credits: credits,
            })?;

        let tip_lock = self.locks.tip(&tip.id);
        let _tip_guard = tip_lock.lock_owned().await;

        {
            let store = self.store.read().await;
            if Staged::new(&*store).used_tip(&tip.id).await?.is_some() {
                return Err(LedgerError::TipAlreadyRedeemed(tip.id));
            }
        }

        let coins = tip_coins(credits, vip);
        let outcome = self
            .award(
                username,
                session.user_id,
                coins as f64,
                SOURCE_CREDIT_CONVERSION,
                None,
                now_ms,
            )
            .await?;

        // The coins are already granted; a failure to record the marker is
        // logged rather than rolled back.
        // Record the tip's actual size, not the amount claimed.
        let record = UsedTipRedemption {
            tip_id: tip.id.clone(),
            user_id: session.user_id,
            credits_spent: tip.credits_spent,
            coins_gained: outcome.awarded,
            processed_at: now_ms,
        };
        let batch = {
            let store = self.store.read().await;
            let mut staged = Staged::new(&*store);
            staged.insert(Key::UsedTip(tip.id.clone()), Value::UsedTip(record));
            staged.into_batch()
        };
        if let Err(err) = self.store.write().await.apply(batch).await {
            warn!(tip_id = %tip.id, error = %err, "failed to record tip redemption");
        }

        Ok(TipOutcome {
            tip_id: tip.id,
            coins_granted: outcome.awarded,
            new_balance: outcome.new_balance,
        })
    }
}
