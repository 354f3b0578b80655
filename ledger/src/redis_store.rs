//! Redis-backed [`Store`]. Records are JSON strings under their storage
//! key; sets index the account and request keyspaces; the transaction and
//! vault logs are lists. Batches go through a single `MULTI`/`EXEC`
//! pipeline so they land atomically.

use crate::store::{Batch, Key, Store, Value};
use anyhow::{Context, Result};
use coinworks_types::{Account, ConversionRequest, RequestStatus, Transaction, VaultTransaction};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const ACCOUNT_INDEX: &str = "accounts";
const REQUEST_INDEX: &str = "requests";
const VAULT_LOG: &str = "vaultlog";

fn transaction_log(username: &str) -> String {
    format!("txlog/{username}")
}

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.context("redis get failed")?;
        match raw {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).context("corrupt record in redis")?,
            )),
            None => Ok(None),
        }
    }
}

impl Store for RedisStore {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.get_json(&key.storage_key()).await
    }

    async fn apply(&mut self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &batch.updates {
            let raw = serde_json::to_string(value).context("failed to encode record")?;
            pipe.set(key.storage_key(), raw);
            match key {
                Key::Account(username) => {
                    pipe.sadd(ACCOUNT_INDEX, username);
                }
                Key::Request(id) => {
                    pipe.sadd(REQUEST_INDEX, id.to_string());
                }
                Key::Vault | Key::UsedTip(_) => {}
            }
        }
        for transaction in &batch.transactions {
            let raw =
                serde_json::to_string(transaction).context("failed to encode transaction")?;
            pipe.rpush(transaction_log(&transaction.username), raw);
        }
        for transaction in &batch.vault_transactions {
            let raw = serde_json::to_string(transaction)
                .context("failed to encode vault transaction")?;
            pipe.rpush(VAULT_LOG, raw);
        }
        let _: () = pipe
            .query_async(&mut self.conn)
            .await
            .context("redis batch apply failed")?;
        Ok(())
    }

    async fn transactions(&self, username: &str) -> Result<Vec<Transaction>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(transaction_log(username), 0, -1)
            .await
            .context("redis lrange failed")?;
        raw.iter()
            .map(|entry| serde_json::from_str(entry).context("corrupt transaction in redis"))
            .collect()
    }

    async fn vault_transactions(&self) -> Result<Vec<VaultTransaction>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(VAULT_LOG, 0, -1)
            .await
            .context("redis lrange failed")?;
        raw.iter()
            .map(|entry| serde_json::from_str(entry).context("corrupt vault transaction in redis"))
            .collect()
    }

    async fn requests(&self, status: Option<RequestStatus>) -> Result<Vec<ConversionRequest>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(REQUEST_INDEX)
            .await
            .context("redis smembers failed")?;
        let mut requests = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(Value::Request(request)) =
                self.get_json::<Value>(&format!("request/{id}")).await?
            else {
                continue;
            };
            if status.is_none_or(|wanted| request.status == wanted) {
                requests.push(request);
            }
        }
        requests.sort_by_key(|request| request.requested_at);
        Ok(requests)
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        let mut conn = self.conn.clone();
        let usernames: Vec<String> = conn
            .smembers(ACCOUNT_INDEX)
            .await
            .context("redis smembers failed")?;
        let mut accounts = Vec::with_capacity(usernames.len());
        for username in usernames {
            if let Some(Value::Account(account)) =
                self.get_json::<Value>(&format!("account/{username}")).await?
            {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }
}
