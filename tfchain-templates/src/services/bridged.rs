//! bridged, the daemon moving TFT between tfchain and its ERC20 counterpart.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{default_network, BRIDGED_FLIST};
use crate::{
    host::Host,
    render,
    sal::{ContainerSpec, Mount, PortForward},
    state::flags,
    template::{parse_data, Base, ServiceInfo, Template},
    uid::TemplateUid,
};

pub const NAME: &str = "bridged";
pub const VERSION: &str = "0.0.2";

const DATA_DIR: &str = "/mnt/data";
const BACKUP_DIR: &str = "/mnt/backups";
const STARTUP_PATH: &str = "/.startup.toml";

pub fn uid() -> TemplateUid {
    TemplateUid::tfchain(NAME, VERSION)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgedData {
    #[serde(default)]
    pub node: String,
    pub rpc_port: u16,
    #[serde(default = "default_network")]
    pub network: String,
    pub eth_port: u16,
    #[serde(default)]
    pub account_json: String,
    #[serde(default)]
    pub account_password: String,
    #[serde(default = "default_flist")]
    pub bridged_flist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_rpc_port: Option<u16>,
}

fn default_flist() -> String {
    BRIDGED_FLIST.to_owned()
}

pub struct Bridged {
    base: Base,
    data: BridgedData,
}

pub fn create(info: ServiceInfo, data: Value, host: Host) -> Result<Box<dyn Template>> {
    Ok(Box::new(Bridged {
        base: Base::new(info, host),
        data: parse_data(NAME, data)?,
    }))
}

impl Bridged {
    fn env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("BRIDGED_RPC_ADDR".to_owned(), self.rpc_addr()),
            ("TFCHAIND_NETWORK".to_owned(), self.data.network.clone()),
            ("ETH_PORT".to_owned(), self.data.eth_port.to_string()),
            ("ETH_ACCOUNT_JSON".to_owned(), self.data.account_json.clone()),
            ("ETH_ACCOUNT_PASSWORD".to_owned(), self.data.account_password.clone()),
        ])
    }

    fn rpc_addr(&self) -> String {
        format!("0.0.0.0:{}", self.data.rpc_port)
    }

    async fn create_container(&mut self) -> Result<()> {
        self.base.check(flags::INSTALL)?;
        let fs = self.base.filesystem().await?;
        let wallet = self.base.volume(&fs, "wallet").await?;
        let backups = self.base.volume(&fs, "backups").await?;

        let host_rpc_port = self.base.host_port().await?;
        self.data.host_rpc_port = Some(host_rpc_port);

        // Without an account the flist's own boot descriptor would refuse to start.
        let mut files = BTreeMap::new();
        if self.data.account_json.is_empty() {
            files.insert(
                STARTUP_PATH.to_owned(),
                render::bridged_startup(&self.rpc_addr(), &self.data.network, self.data.eth_port)?,
            );
        }

        self.base
            .provision(ContainerSpec {
                name: self.base.container_name(),
                flist: self.data.bridged_flist.clone(),
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
                ports: vec![
                    PortForward::tcp(host_rpc_port, self.data.rpc_port),
                    PortForward::tcp(self.data.eth_port, self.data.eth_port),
                ],
                env: self.env(),
                files,
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Template for Bridged {
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
        self.data.bridged_flist = image;
    }

    async fn install(&mut self) -> Result<()> {
        info!(service = %self.base.name(), "installing bridged");
        self.base.ensure_filesystem().await?;
        self.base.set_ok(flags::INSTALL)
    }

    async fn start(&mut self) -> Result<()> {
        self.base.check(flags::INSTALL)?;
        self.create_container().await?;
        self.base.set_ok(flags::RUNNING)?;
        self.base.set_ok(flags::START)
    }

    async fn stop(&mut self) -> Result<()> {
        self.base.stop_container().await;
        self.base.delete(flags::RUNNING);
        self.base.delete(flags::START);
        Ok(())
    }

    async fn uninstall(&mut self) -> Result<()> {
        self.base.stop_container().await;
        self.base.release_storage().await;
        self.base.delete(flags::INSTALL);
        Ok(())
    }
}
