use anyhow::Result;
use coinworks_types::{
    Account, AdminVault, ConversionRequest, RequestStatus, Transaction, UsedTipRedemption,
    VaultTransaction,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use uuid::Uuid;

#[cfg(any(test, feature = "mocks"))]
use std::collections::HashMap;

/// Address of a stored record. `Account` is keyed uniquely by username,
/// `Vault` is the singleton admin pool, `UsedTip` is keyed by the external
/// tip event id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Account(String),
    Vault,
    Request(Uuid),
    UsedTip(String),
}

impl Key {
    pub fn storage_key(&self) -> String {
        match self {
            Key::Account(username) => format!("account/{username}"),
            Key::Vault => "vault".to_string(),
            Key::Request(id) => format!("request/{id}"),
            Key::UsedTip(id) => format!("tip/{id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Value {
    Account(Account),
    Vault(AdminVault),
    Request(ConversionRequest),
    UsedTip(UsedTipRedemption),
}

/// One atomic unit of writes: record upserts plus append-only log entries.
/// A store must persist the whole batch or none of it.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub updates: Vec<(Key, Value)>,
    pub transactions: Vec<Transaction>,
    pub vault_transactions: Vec<VaultTransaction>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
            && self.transactions.is_empty()
            && self.vault_transactions.is_empty()
    }
}

/// Backing storage for the ledger. Records never get deleted; the two logs
/// are append-only, so unordered concurrent appends are safe.
pub trait Store {
    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<Value>>> + Send;

    /// Applies a batch as one atomic unit.
    fn apply(&mut self, batch: Batch) -> impl Future<Output = Result<()>> + Send;

    /// A user's transaction log, oldest first.
    fn transactions(&self, username: &str) -> impl Future<Output = Result<Vec<Transaction>>> + Send;

    /// The admin vault transfer log, oldest first.
    fn vault_transactions(&self) -> impl Future<Output = Result<Vec<VaultTransaction>>> + Send;

    /// Conversion requests, optionally filtered by status, ordered by
    /// request time.
    fn requests(
        &self,
        status: Option<RequestStatus>,
    ) -> impl Future<Output = Result<Vec<ConversionRequest>>> + Send;

    /// All account records, in no particular order.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Account>>> + Send;
}

/// A write overlay on top of a store. Reads observe pending writes;
/// `into_batch` hands everything staged to [`Store::apply`] as one unit.
/// Dropping the overlay before `apply` discards it, which is what makes a
/// failed multi-step mutation leave no trace.
pub struct Staged<'a, S: Store> {
    base: &'a S,
    pending: BTreeMap<Key, Value>,
    transactions: Vec<Transaction>,
    vault_transactions: Vec<VaultTransaction>,
}

impl<'a, S: Store> Staged<'a, S> {
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
            transactions: Vec::new(),
            vault_transactions: Vec::new(),
        }
    }

    pub async fn get(&self, key: &Key) -> Result<Option<Value>> {
        if let Some(value) = self.pending.get(key) {
            return Ok(Some(value.clone()));
        }
        self.base.get(key).await
    }

    pub fn insert(&mut self, key: Key, value: Value) {
        self.pending.insert(key, value);
    }

    pub fn append_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    pub fn append_vault_transaction(&mut self, transaction: VaultTransaction) {
        self.vault_transactions.push(transaction);
    }

    pub async fn account(&self, username: &str) -> Result<Option<Account>> {
        Ok(match self.get(&Key::Account(username.to_string())).await? {
            Some(Value::Account(account)) => Some(account),
            _ => None,
        })
    }

    pub async fn vault(&self) -> Result<AdminVault> {
        Ok(match self.get(&Key::Vault).await? {
            Some(Value::Vault(vault)) => vault,
            _ => AdminVault::default(),
        })
    }

    pub async fn request(&self, id: &Uuid) -> Result<Option<ConversionRequest>> {
        Ok(match self.get(&Key::Request(*id)).await? {
            Some(Value::Request(request)) => Some(request),
            _ => None,
        })
    }

    pub async fn used_tip(&self, tip_id: &str) -> Result<Option<UsedTipRedemption>> {
        Ok(match self.get(&Key::UsedTip(tip_id.to_string())).await? {
            Some(Value::UsedTip(tip)) => Some(tip),
            _ => None,
        })
    }

    pub fn into_batch(self) -> Batch {
        Batch {
            updates: self.pending.into_iter().collect(),
            transactions: self.transactions,
            vault_transactions: self.vault_transactions,
        }
    }
}

/// In-memory store for tests and simulations.
#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
pub struct Memory {
    records: HashMap<Key, Value>,
    transactions: HashMap<String, Vec<Transaction>>,
    vault_log: Vec<VaultTransaction>,
}

#[cfg(any(test, feature = "mocks"))]
impl Store for Memory {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.records.get(key).cloned())
    }

    async fn apply(&mut self, batch: Batch) -> Result<()> {
        for (key, value) in batch.updates {
            self.records.insert(key, value);
        }
        for transaction in batch.transactions {
            self.transactions
                .entry(transaction.username.clone())
                .or_default()
                .push(transaction);
        }
        self.vault_log.extend(batch.vault_transactions);
        Ok(())
    }

    async fn transactions(&self, username: &str) -> Result<Vec<Transaction>> {
        Ok(self.transactions.get(username).cloned().unwrap_or_default())
    }

    async fn vault_transactions(&self) -> Result<Vec<VaultTransaction>> {
        Ok(self.vault_log.clone())
    }

    async fn requests(&self, status: Option<RequestStatus>) -> Result<Vec<ConversionRequest>> {
        let mut requests: Vec<ConversionRequest> = self
            .records
            .values()
            .filter_map(|value| match value {
                Value::Request(request) => Some(request.clone()),
                _ => None,
            })
            .filter(|request| status.is_none_or(|wanted| request.status == wanted))
            .collect();
        requests.sort_by_key(|request| request.requested_at);
        Ok(requests)
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self
            .records
            .values()
            .filter_map(|value| match value {
                Value::Account(account) => Some(account.clone()),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinworks_types::Coins;
    use uuid::Uuid;

    fn account(username: &str) -> Account {
        Account::new(Uuid::new_v4(), username, 0)
    }

    #[tokio::test]
    async fn staged_reads_observe_pending_writes() {
        let memory = Memory::default();
        let mut staged = Staged::new(&memory);
        assert!(staged.account("alice").await.unwrap().is_none());

        let mut alice = account("alice");
        alice.coins = Coins::from_whole(10);
        staged.insert(Key::Account("alice".into()), Value::Account(alice.clone()));
        assert_eq!(staged.account("alice").await.unwrap(), Some(alice));
    }

    #[tokio::test]
    async fn dropped_overlay_leaves_no_trace() {
        let mut memory = Memory::default();
        {
            let mut staged = Staged::new(&memory);
            staged.insert(
                Key::Account("alice".into()),
                Value::Account(account("alice")),
            );
            // Dropped without apply.
        }
        assert!(memory.get(&Key::Account("alice".into())).await.unwrap().is_none());

        let mut staged = Staged::new(&memory);
        staged.insert(
            Key::Account("alice".into()),
            Value::Account(account("alice")),
        );
        let batch = staged.into_batch();
        memory.apply(batch).await.unwrap();
        assert!(memory.get(&Key::Account("alice".into())).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn requests_filter_and_order_by_request_time() {
        let mut memory = Memory::default();
        let mut batch = Batch::default();
        let older = ConversionRequest::pending("alice", Uuid::new_v4(), 200, 50, 10);
        let newer = ConversionRequest::pending("bob", Uuid::new_v4(), 400, 100, 20);
        batch.updates.push((Key::Request(newer.id), Value::Request(newer.clone())));
        batch.updates.push((Key::Request(older.id), Value::Request(older.clone())));
        memory.apply(batch).await.unwrap();

        let pending = memory.requests(Some(RequestStatus::Pending)).await.unwrap();
        assert_eq!(pending, vec![older, newer]);
        let approved = memory.requests(Some(RequestStatus::Approved)).await.unwrap();
        assert!(approved.is_empty());
    }
}
