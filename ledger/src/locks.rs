use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Per-key async locks serializing all mutations of a given record.
///
/// Lock order when an operation needs more than one: request before
/// account before vault, and tip before account. Nothing ever holds two
/// account locks at once.
#[derive(Default)]
pub struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    fn entry(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn account(&self, username: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.entry(&format!("account/{username}"))
    }

    pub fn vault(&self) -> Arc<tokio::sync::Mutex<()>> {
        self.entry("vault")
    }

    pub fn request(&self, id: &Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.entry(&format!("request/{id}"))
    }

    pub fn tip(&self, tip_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.entry(&format!("tip/{tip_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_yields_same_lock() {
        let locks = KeyLocks::default();
        let first = locks.account("alice");
        let second = locks.account("alice");
        let _guard = first.lock().await;
        assert!(second.try_lock().is_err());
        assert!(locks.account("bob").try_lock().is_ok());
    }
}
