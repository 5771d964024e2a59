//! Client side of the tfchaind wallet, as used by the block creator.

pub mod http;
pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coin and block stake balances, as decimal strings of the smallest unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAmount {
    pub confirmed_coins: String,
    pub confirmed_locked_coins: String,
    pub unconfirmed_incoming_coins: String,
    pub unconfirmed_outgoing_coins: String,
    pub block_stakes: String,
}

#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Creates and unlocks the wallet, returning its recovery seed. A wallet that already exists on the
    /// daemon's data volume is only unlocked, and `None` is returned.
    async fn wallet_init(&self) -> Result<Option<String>>;

    async fn new_address(&self) -> Result<String>;

    async fn wallet_amount(&self) -> Result<WalletAmount>;

    async fn consensus_stat(&self) -> Result<Value>;

    /// Raw report fields: `wallet_status`, `block_height`, `active_blockstakes`, `confirmed_balance`,
    /// `connected_peers` and `address`.
    async fn report(&self) -> Result<Map<String, Value>>;
}

/// Opens wallet clients against a daemon's API address.
pub trait WalletConnector: Send + Sync {
    fn connect(&self, api_addr: &str, passphrase: &str) -> Result<Arc<dyn WalletClient>>;
}
