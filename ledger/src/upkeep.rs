//! Recurring VIP upkeep: while a pass is active, a small fee drains from
//! the holder's balance into the vault once per period. Each tracked user
//! gets one background task; the task retires itself when the pass lapses
//! or the balance cannot cover the fee.

use crate::engine::Ledger;
use crate::store::Store;
use crate::system_now_ms;
use coinworks_types::{LedgerError, SOURCE_VIP_PAYMENT, VIP_UPKEEP_FEE, VIP_UPKEEP_PERIOD_MS};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

pub struct VipUpkeep<S: Store> {
    ledger: Arc<Ledger<S>>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    period: Duration,
}

impl<S: Store + Send + Sync + 'static> VipUpkeep<S> {
    pub fn new(ledger: Arc<Ledger<S>>) -> Self {
        Self::with_period(ledger, Duration::from_millis(VIP_UPKEEP_PERIOD_MS))
    }

    pub fn with_period(ledger: Arc<Ledger<S>>, period: Duration) -> Self {
        Self {
            ledger,
            tasks: Mutex::new(HashMap::new()),
            period,
        }
    }

    /// Starts charging upkeep for `username`. Replaces any prior task for
    /// the same user, so re-tracking after a fresh purchase is harmless.
    pub fn track(&self, username: &str) {
        let ledger = self.ledger.clone();
        let username = username.to_string();
        let period = self.period;
        let handle = tokio::spawn({
            let username = username.clone();
            async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick fires immediately; skip it so the first
                // charge lands one full period after purchase.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let now_ms = system_now_ms();
                    let account = match ledger.account(&username).await {
                        Ok(account) => account,
                        Err(err) => {
                            warn!(username, error = %err, "upkeep: account lookup failed");
                            break;
                        }
                    };
                    if !account.is_vip(now_ms) {
                        info!(username, "upkeep: VIP pass lapsed");
                        break;
                    }
                    match ledger
                        .charge_to_vault(&username, VIP_UPKEEP_FEE, SOURCE_VIP_PAYMENT, now_ms)
                        .await
                    {
                        Ok(_) => {}
                        Err(LedgerError::InsufficientFunds { have, .. }) => {
                            info!(username, balance = %have, "upkeep: balance exhausted");
                            break;
                        }
                        Err(err) => {
                            warn!(username, error = %err, "upkeep: charge failed");
                            break;
                        }
                    }
                }
            }
        });
        if let Some(previous) = self.tasks.lock().unwrap().insert(username, handle) {
            previous.abort();
        }
    }

    /// Stops charging `username`, typically on session close. The pass
    /// itself stays active until its expiry.
    pub fn stop(&self, username: &str) {
        if let Some(handle) = self.tasks.lock().unwrap().remove(username) {
            handle.abort();
        }
    }

    pub fn is_tracking(&self, username: &str) -> bool {
        self.tasks
            .lock()
            .unwrap()
            .get(username)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn shutdown(&self) {
        for (_, handle) in self.tasks.lock().unwrap().drain() {
            handle.abort();
        }
    }
}

impl<S: Store> Drop for VipUpkeep<S> {
    fn drop(&mut self) {
        for handle in self.tasks.lock().unwrap().values() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Memory;
    use coinworks_types::Coins;
    use uuid::Uuid;

    async fn vip_ledger(balance: Coins) -> Arc<Ledger<Memory>> {
        let ledger = Arc::new(Ledger::new(Memory::default()));
        let username = "alice";
        ledger
            .get_or_create_account(username, Uuid::new_v4(), 0)
            .await
            .unwrap();
        // Seed balance and a far-future pass directly.
        let batch = {
            let store = ledger.store.read().await;
            let mut staged = crate::store::Staged::new(&*store);
            let mut account = staged.account(username).await.unwrap().unwrap();
            account.coins = balance;
            account.vip_until = Some(u64::MAX);
            staged.insert(
                crate::store::Key::Account(username.into()),
                crate::store::Value::Account(account),
            );
            staged.into_batch()
        };
        ledger.store.write().await.apply(batch).await.unwrap();
        ledger
    }

    async fn wait_until_retired(upkeep: &VipUpkeep<Memory>, username: &str) {
        for _ in 0..1_000 {
            if !upkeep.is_tracking(username) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        panic!("upkeep task never retired");
    }

    #[tokio::test(start_paused = true)]
    async fn drains_balance_then_retires() {
        let ledger = vip_ledger(Coins::from_hundredths(30)).await;
        let upkeep = VipUpkeep::new(ledger.clone());
        upkeep.track("alice");
        wait_until_retired(&upkeep, "alice").await;

        assert_eq!(ledger.balance("alice").await.unwrap(), Coins::ZERO);
        assert_eq!(
            ledger.vault_balance().await.unwrap(),
            Coins::from_hundredths(30)
        );
        let history = ledger.history("alice").await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|tx| tx.source == SOURCE_VIP_PAYMENT));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_fee_is_never_taken() {
        let ledger = vip_ledger(Coins::from_hundredths(5)).await;
        let upkeep = VipUpkeep::new(ledger.clone());
        upkeep.track("alice");
        wait_until_retired(&upkeep, "alice").await;

        assert_eq!(
            ledger.balance("alice").await.unwrap(),
            Coins::from_hundredths(5)
        );
        assert_eq!(ledger.vault_balance().await.unwrap(), Coins::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn non_vip_task_retires_without_charging() {
        let ledger = Arc::new(Ledger::new(Memory::default()));
        ledger
            .get_or_create_account("bob", Uuid::new_v4(), 0)
            .await
            .unwrap();
        let upkeep = VipUpkeep::new(ledger.clone());
        upkeep.track("bob");
        wait_until_retired(&upkeep, "bob").await;
        assert!(ledger.history("bob").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_tracking() {
        let ledger = vip_ledger(Coins::from_whole(1_000)).await;
        let upkeep = VipUpkeep::new(ledger.clone());
        upkeep.track("alice");
        assert!(upkeep.is_tracking("alice"));
        upkeep.stop("alice");
        assert!(!upkeep.is_tracking("alice"));
    }
}
