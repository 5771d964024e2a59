//! The token faucet, paying out from the wallet of its own block creator.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{block_creator, default_network, linked::LinkedBlockCreator, FAUCET_FLIST};
use crate::{
    host::Host,
    render::{self, Proxy},
    sal::{ContainerSpec, Mount, PortForward},
    state::flags,
    template::{lifecycle_action, parse_data, Base, ServiceInfo, Template},
    uid::TemplateUid,
};

pub const NAME: &str = "faucet";
pub const VERSION: &str = "0.0.2";

const DATA_DIR: &str = "/mnt/data";
const CADDY_DIR: &str = "/.caddy/";
pub const CADDYFILE_PATH: &str = "/var/www/faucet/caddy/Caddyfile";

pub fn uid() -> TemplateUid {
    TemplateUid::tfchain(NAME, VERSION)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetData {
    #[serde(default)]
    pub node: String,
    pub rpc_port: u16,
    pub api_port: u16,
    pub domain: String,
    #[serde(default = "default_network")]
    pub network: String,
    pub eth_port: u16,
    #[serde(default = "default_faucet_port")]
    pub faucet_port: u16,
    #[serde(default = "default_flist")]
    pub faucet_flist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_creator_flist: Option<String>,
    #[serde(default)]
    pub wallet_seed: String,
    #[serde(default)]
    pub wallet_passphrase: String,
    #[serde(default)]
    pub wallet_addr: String,
}

fn default_faucet_port() -> u16 {
    8080
}

fn default_flist() -> String {
    FAUCET_FLIST.to_owned()
}

pub struct Faucet {
    base: Base,
    data: FaucetData,
    block_creator: LinkedBlockCreator,
}

pub fn create(info: ServiceInfo, data: Value, host: Host) -> Result<Box<dyn Template>> {
    let base = Base::new(info, host);
    let block_creator = LinkedBlockCreator::new(base.child_name(block_creator::NAME));
    Ok(Box::new(Faucet {
        base,
        data: parse_data(NAME, data)?,
        block_creator,
    }))
}

impl Faucet {
    pub fn block_creator_name(&self) -> &str {
        &self.block_creator.name
    }

    fn block_creator_data(&self) -> Value {
        let mut data = json!({
            "node": self.base.host.node.name(),
            "rpcPort": self.data.rpc_port,
            "apiPort": self.data.api_port,
            "walletSeed": self.data.wallet_seed,
            "walletPassphrase": self.data.wallet_passphrase,
            "walletAddr": self.data.wallet_addr,
            "network": self.data.network,
        });
        if let Some(flist) = &self.data.block_creator_flist {
            data["tfchainFlist"] = json!(flist);
        }
        data
    }

    fn env(&self, block_creator_api_addr: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("TFCHAIND_RPC_ADDR".to_owned(), format!("0.0.0.0:{}", self.data.rpc_port)),
            ("TFCHAIND_API_ADDR".to_owned(), format!("0.0.0.0:{}", self.data.api_port)),
            ("TFCHAIND_DATA_DIR".to_owned(), DATA_DIR.to_owned()),
            ("TFCHAIND_NETWORK".to_owned(), self.data.network.clone()),
            ("TFCHAIND_ETHPORT".to_owned(), self.data.eth_port.to_string()),
            ("BLOCK_CREATOR_API_ADDR".to_owned(), block_creator_api_addr.to_owned()),
            ("FAUCET_PORT".to_owned(), self.data.faucet_port.to_string()),
        ])
    }

    /// The faucet serves its own pages; caddy only terminates TLS in front of it.
    pub fn caddyfile(&self) -> Result<String> {
        render::caddyfile(
            &self.data.domain,
            None,
            &[Proxy::transparent(
                "/",
                &format!("localhost:{}", self.data.faucet_port),
            )],
        )
    }

    async fn create_container(&self, block_creator_api_addr: &str) -> Result<()> {
        self.base.check(flags::INSTALL)?;
        let fs = self.base.ensure_filesystem().await?;
        let wallet = self.base.volume(&fs, "wallet").await?;
        let caddy = self.base.volume(&fs, "caddy-certs").await?;

        self.base
            .provision(ContainerSpec {
                name: self.base.container_name(),
                flist: self.data.faucet_flist.clone(),
                mounts: vec![
                    Mount {
                        source: wallet,
                        target: DATA_DIR.to_owned(),
                    },
                    Mount {
                        source: caddy,
                        target: CADDY_DIR.to_owned(),
                    },
                ],
                ports: vec![
                    PortForward::tcp(80, 80),
                    PortForward::tcp(443, 443),
                    PortForward::tcp(self.data.eth_port, self.data.eth_port),
                ],
                env: self.env(block_creator_api_addr),
                files: BTreeMap::from([(CADDYFILE_PATH.to_owned(), self.caddyfile()?)]),
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Template for Faucet {
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
        self.data.faucet_flist = image;
    }

    async fn install(&mut self) -> Result<()> {
        info!(service = %self.base.name(), block_creator = %self.block_creator.name, "installing faucet");
        let host = &self.base.host;
        self.block_creator
            .find_or_create(host, self.block_creator_data())
            .await?;
        self.block_creator.call(host, "install").await?;
        self.base.set_ok(flags::INSTALL)
    }

    async fn start(&mut self) -> Result<()> {
        let host = &self.base.host;
        self.base.check(flags::INSTALL)?;
        self.block_creator.check_installed(host).await?;
        self.block_creator.call(host, "start").await?;

        let api_addr = self.block_creator.api_addr(host).await?;
        self.create_container(&api_addr).await?;
        self.base.set_ok(flags::RUNNING)?;
        self.base.set_ok(flags::START)
    }

    async fn stop(&mut self) -> Result<()> {
        info!(service = %self.base.name(), "stopping faucet");
        self.base.stop_container().await;
        self.base.delete(flags::RUNNING);
        self.base.delete(flags::START);
        self.block_creator.call(&self.base.host, "stop").await?;
        Ok(())
    }

    async fn uninstall(&mut self) -> Result<()> {
        self.base.stop_container().await;
        self.base.release_storage().await;
        self.block_creator.uninstall(&self.base.host).await?;
        self.base.delete(flags::INSTALL);
        Ok(())
    }

    async fn action(&mut self, name: &str, args: Value) -> Result<Value> {
        match name {
            "block_creator" => Ok(json!(self.block_creator.name)),
            _ => lifecycle_action(self, name, args).await,
        }
    }
}
