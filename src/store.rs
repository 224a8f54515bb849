/// Key-value storage (chrome.storage.local) and the persisted wallet session
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const WALLET_ADDRESS_KEY: &str = "walletAddress";
pub const WALLET_PROVIDER_KEY: &str = "walletProvider";
pub const CONFIG_KEY: &str = "handshakeConfig";

pub const PROVIDER_PHANTOM: &str = "phantom";

#[async_trait(?Send)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, String>;

    async fn set(&self, key: &str, value: Value) -> Result<(), String>;
}

/// Who is logged in. Written on every successful connect, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSession {
    pub address: String,
    pub provider: String,
}

impl WalletSession {
    pub fn phantom(address: &str) -> WalletSession {
        WalletSession {
            address: address.to_string(),
            provider: PROVIDER_PHANTOM.to_string(),
        }
    }

    /// None unless a non-empty address is stored
    pub async fn load(store: &dyn KeyValueStore) -> Result<Option<WalletSession>, String> {
        let address = match store.get(WALLET_ADDRESS_KEY).await? {
            Some(Value::String(address)) if !address.is_empty() => address,
            _ => return Ok(None),
        };

        let provider = match store.get(WALLET_PROVIDER_KEY).await? {
            Some(Value::String(provider)) => provider,
            _ => PROVIDER_PHANTOM.to_string(),
        };

        Ok(Some(WalletSession { address, provider }))
    }

    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<(), String> {
        store
            .set(WALLET_ADDRESS_KEY, Value::String(self.address.clone()))
            .await?;
        store
            .set(WALLET_PROVIDER_KEY, Value::String(self.provider.clone()))
            .await
    }
}

/// Process-local store for tests and for contexts without extension storage
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, String> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), String> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}
