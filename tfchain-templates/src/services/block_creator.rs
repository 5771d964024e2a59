//! tfchaind, run as a block creator with its own wallet.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use super::{default_network, TFCHAIN_FLIST};
use crate::{
    host::Host,
    retry::{retry, RetryPolicy},
    sal::{ContainerSpec, Mount, PortForward},
    state::flags,
    template::{lifecycle_action, new_guid, parse_data, Base, ServiceInfo, Template},
    uid::TemplateUid,
    wallet::{WalletAmount, WalletClient},
};

pub const NAME: &str = "block_creator";
pub const VERSION: &str = "0.0.2";

pub const DATA_DIR: &str = "/mnt/data";
pub const BACKUP_DIR: &str = "/mnt/backups";

pub fn uid() -> TemplateUid {
    TemplateUid::tfchain(NAME, VERSION)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockCreatorData {
    #[serde(default)]
    pub node: String,
    pub rpc_port: u16,
    pub api_port: u16,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_flist")]
    pub tfchain_flist: String,
    #[serde(default)]
    pub wallet_seed: String,
    #[serde(default)]
    pub wallet_passphrase: String,
    #[serde(default)]
    pub wallet_addr: String,
    /// Node port forwarded to `rpc_port`, picked at start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_rpc_port: Option<u16>,
}

fn default_flist() -> String {
    TFCHAIN_FLIST.to_owned()
}

pub struct BlockCreator {
    base: Base,
    data: BlockCreatorData,
    wallet: Option<Arc<dyn WalletClient>>,
}

pub fn create(info: ServiceInfo, data: Value, host: Host) -> Result<Box<dyn Template>> {
    Ok(Box::new(BlockCreator::new(info, parse_data(NAME, data)?, host)))
}

impl BlockCreator {
    pub fn new(info: ServiceInfo, mut data: BlockCreatorData, host: Host) -> Self {
        if data.wallet_passphrase.is_empty() {
            data.wallet_passphrase = new_guid();
        }
        Self {
            base: Base::new(info, host),
            data,
            wallet: None,
        }
    }

    pub fn config(&self) -> &BlockCreatorData {
        &self.data
    }

    fn env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("TFCHAIND_RPC_ADDR".to_owned(), format!("0.0.0.0:{}", self.data.rpc_port)),
            ("TFCHAIND_API_ADDR".to_owned(), format!("0.0.0.0:{}", self.data.api_port)),
            ("TFCHAIND_DATA_DIR".to_owned(), DATA_DIR.to_owned()),
            ("TFCHAIND_NETWORK".to_owned(), self.data.network.clone()),
        ])
    }

    async fn create_container(&mut self) -> Result<()> {
        self.base.check(flags::INSTALL)?;
        let fs = self.base.filesystem().await?;
        let wallet = self.base.volume(&fs, "wallet").await?;
        let backups = self.base.volume(&fs, "backups").await?;

        let host_rpc_port = self.base.host_port().await?;
        self.data.host_rpc_port = Some(host_rpc_port);

        self.base
            .provision(ContainerSpec {
                name: self.base.container_name(),
                flist: self.data.tfchain_flist.clone(),
                mounts: vec![
                    Mount {
                        source: wallet,
                        target: DATA_DIR.to_owned(),
                    },
                    Mount {
                        source: backups,
                        target: BACKUP_DIR.to_owned(),
                    },
                ],
                ports: vec![PortForward::tcp(host_rpc_port, self.data.rpc_port)],
                env: self.env(),
                files: BTreeMap::new(),
            })
            .await?;
        Ok(())
    }

    /// Address of the daemon's RPC port as seen from outside the node.
    pub fn get_rpc_addr(&self) -> String {
        let port = self.data.host_rpc_port.unwrap_or(self.data.rpc_port);
        format!("http://{}:{port}", self.base.host.node.addr())
    }

    /// Address of the daemon's HTTP API on the node's NAT network.
    pub async fn get_api_addr(&self) -> Result<String> {
        let ip = self.base.container().await?.default_ip(Some("nat0")).await?;
        Ok(format!("http://{ip}:{}", self.data.api_port))
    }

    async fn wallet(&mut self) -> Result<Arc<dyn WalletClient>> {
        if let Some(wallet) = &self.wallet {
            return Ok(wallet.clone());
        }
        let api_addr = self.get_api_addr().await?;
        let wallet = self
            .base
            .host
            .wallets
            .connect(&api_addr, &self.data.wallet_passphrase)?;
        self.wallet = Some(wallet.clone());
        Ok(wallet)
    }

    async fn wallet_init(&mut self) -> Result<()> {
        if self.base.is_ok(flags::WALLET_INIT) {
            return Ok(());
        }
        info!(service = %self.base.name(), "initializing wallet");
        let wallet = self.wallet().await?;
        match retry(RetryPolicy::WALLET_INIT, "wallet init", || wallet.wallet_init()).await? {
            Some(seed) => self.data.wallet_seed = seed,
            None => info!(service = %self.base.name(), "unlocked existing wallet"),
        }
        self.base.set_ok(flags::WALLET_INIT)
    }

    /// The wallet's receiving address, generated on first use.
    pub async fn wallet_address(&mut self) -> Result<String> {
        self.base.check(flags::WALLET_INIT)?;
        if !self.data.wallet_addr.is_empty() {
            return Ok(self.data.wallet_addr.clone());
        }
        let wallet = self.wallet().await?;
        let address = retry(RetryPolicy::QUERY, "wallet address", || wallet.new_address()).await?;
        self.data.wallet_addr = address.clone();
        Ok(address)
    }

    pub async fn wallet_amount(&mut self) -> Result<WalletAmount> {
        self.base.check(flags::WALLET_INIT)?;
        self.base.check(flags::RUNNING)?;
        let wallet = self.wallet().await?;
        retry(RetryPolicy::QUERY, "wallet amount", || wallet.wallet_amount()).await
    }

    pub async fn consensus_stat(&mut self) -> Result<Value> {
        self.base.check(flags::WALLET_INIT)?;
        self.base.check(flags::RUNNING)?;
        let wallet = self.wallet().await?;
        retry(RetryPolicy::QUERY, "consensus stat", || wallet.consensus_stat()).await
    }

    /// Wallet status, chain height, balances and peer count of the daemon, tagged with its network.
    pub async fn report(&mut self) -> Result<Map<String, Value>> {
        self.base.check(flags::WALLET_INIT)?;
        self.base.check(flags::RUNNING)?;
        let wallet = self.wallet().await?;
        let mut report = retry(RetryPolicy::QUERY, "report", || wallet.report()).await?;

        report.insert("network".to_owned(), json!(self.data.network));
        let peers = match report.get("connected_peers") {
            Some(Value::Array(peers)) => peers.len() as u64,
            Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
            Some(Value::String(s)) => s.parse().unwrap_or_default(),
            _ => 0,
        };
        report.insert("connected_peers".to_owned(), json!(peers));
        Ok(report)
    }
}

#[async_trait]
impl Template for BlockCreator {
    fn uid(&self) -> TemplateUid {
        uid()
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn data(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.data)?)
    }

    fn set_image(&mut self, image: String) {
        self.data.tfchain_flist = image;
    }

    async fn install(&mut self) -> Result<()> {
        info!(service = %self.base.name(), "installing tfchaind");
        self.base.ensure_filesystem().await?;
        self.base.set_ok(flags::INSTALL)
    }

    async fn start(&mut self) -> Result<()> {
        self.base.check(flags::INSTALL)?;
        self.create_container().await?;
        // A new container means a new API address.
        self.wallet = None;
        self.base.set_ok(flags::RUNNING)?;
        self.wallet_init().await?;
        self.base.set_ok(flags::START)
    }

    async fn stop(&mut self) -> Result<()> {
        info!(service = %self.base.name(), "stopping tfchaind");
        self.base.stop_container().await;
        self.wallet = None;
        self.base.delete(flags::RUNNING);
        self.base.delete(flags::START);
        self.base.delete(flags::WALLET_INIT);
        Ok(())
    }

    async fn uninstall(&mut self) -> Result<()> {
        self.base.stop_container().await;
        self.wallet = None;
        self.base.release_storage().await;
        self.base.delete(flags::INSTALL);
        Ok(())
    }

    async fn action(&mut self, name: &str, args: Value) -> Result<Value> {
        match name {
            "get_rpc_addr" => Ok(json!(self.get_rpc_addr())),
            "get_api_addr" => Ok(json!(self.get_api_addr().await?)),
            "wallet_address" => Ok(json!(self.wallet_address().await?)),
            "wallet_amount" => Ok(serde_json::to_value(self.wallet_amount().await?)?),
            "consensus_stat" => self.consensus_stat().await,
            "report" => Ok(Value::Object(self.report().await?)),
            _ => lifecycle_action(self, name, args).await,
        }
    }
}
