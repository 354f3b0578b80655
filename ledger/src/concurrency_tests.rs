//! Races against the per-key locks: concurrent creation, concurrent
//! awards, and double redemption of a single tip.

use crate::external::{FixedTips, ProjectDirectory, TipEvent};
use crate::store::Memory;
use crate::Ledger;
use anyhow::Result;
use coinworks_types::{Coins, LedgerError, Session};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;
use uuid::Uuid;

const NOW: u64 = 1_700_000_000_000;

#[tokio::test]
async fn concurrent_creation_yields_one_account() {
    let ledger = Arc::new(Ledger::new(Memory::default()));
    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .get_or_create_account("alice", Uuid::new_v4(), NOW)
                    .await
                    .unwrap()
            })
        })
        .collect();
    let accounts: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    // Every caller observed the same record.
    let first = &accounts[0];
    assert!(accounts.iter().all(|account| account.user_id == first.user_id));
    assert_eq!(ledger.leaderboard(100).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_awards_never_lose_an_update() {
    let ledger = Arc::new(Ledger::new(Memory::default()));
    let user_id = Uuid::new_v4();
    ledger
        .get_or_create_account("alice", user_id, NOW)
        .await
        .unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .award("alice", user_id, 10.0, "quiz", None, NOW)
                    .await
                    .unwrap();
            })
        })
        .collect();
    for joined in join_all(tasks).await {
        joined.unwrap();
    }

    let account = ledger.account("alice").await.unwrap();
    assert_eq!(account.coins, Coins::from_whole(200));
    assert_eq!(account.games_played, 20);
    assert_eq!(ledger.history("alice").await.unwrap().len(), 20);
}

/// Project directory that blocks inside the lookup until released,
/// signalling when a caller has entered it.
struct StalledProjects {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl ProjectDirectory for StalledProjects {
    async fn has_public_project(&self, _username: &str) -> Result<bool> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(true)
    }
}

#[tokio::test]
async fn stalled_eligibility_lookup_does_not_block_other_accounts() {
    let ledger = Arc::new(Ledger::new(Memory::default()));
    let alice = Session::player(Uuid::new_v4(), "alice");
    let bob_id = Uuid::new_v4();
    ledger
        .get_or_create_account("alice", alice.user_id, NOW)
        .await
        .unwrap();
    ledger
        .award("alice", alice.user_id, 500.0, "quiz", None, NOW)
        .await
        .unwrap();
    ledger
        .get_or_create_account("bob", bob_id, NOW)
        .await
        .unwrap();

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let conversion = tokio::spawn({
        let ledger = ledger.clone();
        let alice = alice.clone();
        let projects = StalledProjects {
            entered: entered.clone(),
            release: release.clone(),
        };
        async move { ledger.request_conversion(&alice, 200, &projects, NOW).await }
    });
    timeout(Duration::from_secs(5), entered.notified())
        .await
        .expect("conversion never reached the lookup");

    // Alice is stuck mid-lookup; bob's award must still go through.
    timeout(
        Duration::from_secs(5),
        ledger.award("bob", bob_id, 10.0, "quiz", None, NOW),
    )
    .await
    .expect("award stalled behind another account's eligibility lookup")
    .unwrap();

    release.notify_one();
    let outcome = conversion.await.unwrap().unwrap();
    assert_eq!(outcome.credits, 50);
    assert_eq!(outcome.new_balance, Coins::from_whole(300));
}

#[tokio::test]
async fn one_tip_survives_a_double_redeem() {
    let ledger = Arc::new(Ledger::new(Memory::default()));
    let session = Session::player(Uuid::new_v4(), "alice");
    ledger
        .get_or_create_account("alice", session.user_id, NOW)
        .await
        .unwrap();
    let tips = Arc::new(FixedTips(vec![TipEvent {
        id: "tip-1".into(),
        payer: "alice".into(),
        credits_spent: 10,
        created_at: "2026-08-01T00:00:00Z".into(),
    }]));

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let ledger = ledger.clone();
            let session = session.clone();
            let tips = tips.clone();
            tokio::spawn(async move { ledger.redeem_tip(&session, 10, &*tips, NOW).await })
        })
        .collect();
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .any(|result| matches!(result, Err(LedgerError::TipAlreadyRedeemed(_)))));
    assert_eq!(ledger.balance("alice").await.unwrap(), Coins::from_whole(30));
}
