//! CoreDNS with the threebot plugin, answering for a zone from the 3bot explorers.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::COREDNS_FLIST;
use crate::{
    host::Host,
    render,
    sal::{ContainerSpec, PortForward},
    state::flags,
    template::{lifecycle_action, parse_data, Base, ServiceInfo, Template},
    uid::TemplateUid,
};

pub const NAME: &str = "coredns3bot";
pub const VERSION: &str = "0.0.1";

const COREFILE_PATH: &str = "/Corefile";
const DNS_PORT: u16 = 53;

pub fn uid() -> TemplateUid {
    TemplateUid::tfchain(NAME, VERSION)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorednsData {
    #[serde(default)]
    pub node: String,
    /// Fully qualified, so it ends with a dot.
    pub zone: String,
    #[serde(default)]
    pub explorers: Vec<String>,
    #[serde(default = "default_dns_port")]
    pub dns_port: u16,
    #[serde(default = "default_flist")]
    pub coredns3bot_flist: String,
}

fn default_dns_port() -> u16 {
    DNS_PORT
}

fn default_flist() -> String {
    COREDNS_FLIST.to_owned()
}

pub struct Coredns {
    base: Base,
    data: CorednsData,
}

pub fn create(info: ServiceInfo, data: Value, host: Host) -> Result<Box<dyn Template>> {
    let coredns = Coredns {
        base: Base::new(info, host),
        data: parse_data(NAME, data)?,
    };
    coredns.validate()?;
    Ok(Box::new(coredns))
}

impl Coredns {
    pub fn validate(&self) -> Result<()> {
        self.base.delete(flags::RUNNING);
        if !self.data.zone.ends_with('.') {
            bail!("invalid zone {}: needs to end with `.`", self.data.zone);
        }
        Ok(())
    }

    pub fn corefile(&self) -> Result<String> {
        render::corefile(&self.data.zone, &self.data.explorers)
    }

    async fn create_container(&self) -> Result<()> {
        self.base.check(flags::INSTALL)?;

        let mut files = BTreeMap::new();
        if !self.data.explorers.is_empty() {
            files.insert(COREFILE_PATH.to_owned(), self.corefile()?);
        }

        self.base
            .provision(ContainerSpec {
                name: self.base.container_name(),
                flist: self.data.coredns3bot_flist.clone(),
                mounts: Vec::new(),
                ports: vec![PortForward::udp(DNS_PORT, self.data.dns_port)],
                env: BTreeMap::from([("COREDNS_PORT".to_owned(), self.data.dns_port.to_string())]),
                files,
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Template for Coredns {
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
        self.data.coredns3bot_flist = image;
    }

    /// Nothing to prepare: the container keeps no state.
    async fn install(&mut self) -> Result<()> {
        info!(service = %self.base.name(), zone = %self.data.zone, "installing coredns");
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
        self.base.delete(flags::INSTALL);
        Ok(())
    }

    async fn action(&mut self, name: &str, args: Value) -> Result<Value> {
        match name {
            "corefile" => Ok(Value::String(self.corefile()?)),
            _ => lifecycle_action(self, name, args).await,
        }
    }
}
