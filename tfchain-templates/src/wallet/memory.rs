//! In-process wallets, keyed by API address or, for wallets that outlive their daemon, by passphrase.

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use super::{WalletAmount, WalletClient, WalletConnector};
use crate::error::SalError;

#[derive(Default)]
struct Inner {
    persistent: bool,
    /// Calls that fail as if the daemon were still starting.
    unreachable_calls: usize,
    wallets: HashMap<String, WalletData>,
    amount: WalletAmount,
    report: Map<String, Value>,
    calls: Vec<String>,
}

#[derive(Default)]
struct WalletData {
    passphrase: String,
    seed: Option<String>,
    addresses: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryWalletConnector {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWalletConnector {
    pub fn new() -> Self {
        let connector = Self::default();
        connector.inner.lock().report = json!({
            "wallet_status": "unlocked",
            "block_height": 0,
            "active_blockstakes": "0",
            "confirmed_balance": "0",
            "connected_peers": [],
            "address": "",
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        connector
    }

    /// Wallets are found again by passphrase after their daemon moves to a new address, the way a restarted
    /// tfchaind finds its wallet on the data volume.
    pub fn persistent() -> Self {
        let connector = Self::new();
        connector.inner.lock().persistent = true;
        connector
    }

    /// The next `calls` calls, on any wallet, fail with [`SalError::Unreachable`].
    pub fn unreachable_for(&self, calls: usize) {
        self.inner.lock().unreachable_calls = calls;
    }

    pub fn set_amount(&self, amount: WalletAmount) {
        self.inner.lock().amount = amount;
    }

    pub fn set_report(&self, report: Map<String, Value>) {
        self.inner.lock().report = report;
    }

    /// `"<api_addr> <method>"` for every call that reached a wallet, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    /// The passphrase the wallet behind `key` was created with.
    pub fn passphrase(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .wallets
            .get(key)
            .filter(|w| w.seed.is_some())
            .map(|w| w.passphrase.clone())
    }

    /// Number of wallets created so far.
    pub fn wallet_count(&self) -> usize {
        self.inner
            .lock()
            .wallets
            .values()
            .filter(|w| w.seed.is_some())
            .count()
    }
}

impl WalletConnector for MemoryWalletConnector {
    fn connect(&self, api_addr: &str, passphrase: &str) -> Result<Arc<dyn WalletClient>> {
        let key = if self.inner.lock().persistent {
            passphrase.to_owned()
        } else {
            api_addr.to_owned()
        };
        Ok(Arc::new(MemoryWallet {
            api_addr: api_addr.to_owned(),
            key,
            passphrase: passphrase.to_owned(),
            inner: self.inner.clone(),
        }))
    }
}

pub struct MemoryWallet {
    api_addr: String,
    key: String,
    passphrase: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWallet {
    fn call<T>(&self, method: &str, f: impl FnOnce(&mut Inner, &Self) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.lock();
        if inner.unreachable_calls > 0 {
            inner.unreachable_calls -= 1;
            return Err(SalError::Unreachable(self.api_addr.clone()).into());
        }
        inner.calls.push(format!("{} {method}", self.api_addr));
        f(&mut inner, self)
    }
}

#[async_trait]
impl WalletClient for MemoryWallet {
    async fn wallet_init(&self) -> Result<Option<String>> {
        self.call("wallet_init", |inner, client| {
            let wallet = inner.wallets.entry(client.key.clone()).or_default();
            if wallet.seed.is_some() {
                if wallet.passphrase != client.passphrase {
                    return Err(SalError::Failed {
                        what: format!("{}/wallet/unlock", client.api_addr),
                        reason: "provided encryption key is incorrect".to_owned(),
                    }
                    .into());
                }
                return Ok(None);
            }
            let seed = format!("recovery seed of {}", client.api_addr);
            wallet.passphrase = client.passphrase.clone();
            wallet.seed = Some(seed.clone());
            Ok(Some(seed))
        })
    }

    async fn new_address(&self) -> Result<String> {
        self.call("new_address", |inner, client| {
            let wallet = inner.wallets.entry(client.key.clone()).or_default();
            let address = format!("01{:064x}", wallet.addresses.len() + 1);
            wallet.addresses.push(address.clone());
            Ok(address)
        })
    }

    async fn wallet_amount(&self) -> Result<WalletAmount> {
        self.call("wallet_amount", |inner, _| Ok(inner.amount.clone()))
    }

    async fn consensus_stat(&self) -> Result<Value> {
        self.call("consensus_stat", |inner, _| {
            Ok(json!({
                "synced": true,
                "height": inner.report.get("block_height").cloned().unwrap_or(json!(0)),
            }))
        })
    }

    async fn report(&self) -> Result<Map<String, Value>> {
        self.call("report", |inner, _| Ok(inner.report.clone()))
    }
}
