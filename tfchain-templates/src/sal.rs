//! Narrow view of the host node: containers, storage and ports.
//!
//! Templates never talk to Zero-OS directly. They describe what they need with a [`ContainerSpec`] and hand it to
//! a [`Node`]. Lookups of things that do not exist fail with [`SalError::NotFound`](crate::error::SalError).

pub mod memory;

use std::{collections::BTreeMap, fmt, net::IpAddr, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The storage pool every template keeps its persistent filesystem in.
pub const STORAGE_POOL: &str = "zos-cache";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortForward {
    pub protocol: Protocol,
    pub host: u16,
    pub container: u16,
}

impl PortForward {
    pub fn tcp(host: u16, container: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            host,
            container,
        }
    }

    pub fn udp(host: u16, container: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            host,
            container,
        }
    }
}

/// Rendered as `<host>:<container>`, with a `udp|` prefix for UDP: `8080:80` or `udp|53:53`.
impl fmt::Display for PortForward {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.protocol {
            Protocol::Tcp => write!(f, "{}:{}", self.host, self.container),
            Protocol::Udp => write!(f, "udp|{}:{}", self.host, self.container),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
}

/// Everything needed to boot a container from a flist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub flist: String,
    pub mounts: Vec<Mount>,
    pub ports: Vec<PortForward>,
    pub env: BTreeMap<String, String>,
    /// Files written into the container's root filesystem before boot, keyed by absolute path.
    pub files: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filesystem {
    pub pool: String,
    pub name: String,
    /// Where the filesystem is mounted on the node.
    pub path: String,
}

impl Filesystem {
    pub fn subdir(&self, name: &str) -> String {
        format!("{}/{name}", self.path.trim_end_matches('/'))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait Container: Send + Sync {
    fn name(&self) -> &str;

    async fn stop(&self) -> Result<()>;

    /// Address of the container on the given interface, or on its first one.
    async fn default_ip(&self, interface: Option<&str>) -> Result<IpAddr>;

    async fn upload_content(&self, path: &str, content: &[u8]) -> Result<()>;

    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Runs a command inside the container and waits for it.
    async fn system(&self, command: &str) -> Result<CommandOutput>;
}

#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    /// Public address of the node, used to build addresses for forwarded ports.
    fn addr(&self) -> &str;

    async fn create_container(&self, spec: ContainerSpec) -> Result<Arc<dyn Container>>;

    async fn container(&self, name: &str) -> Result<Arc<dyn Container>>;

    async fn delete_container(&self, name: &str) -> Result<()>;

    async fn filesystem(&self, pool: &str, name: &str) -> Result<Filesystem>;

    async fn create_filesystem(&self, pool: &str, name: &str) -> Result<Filesystem>;

    async fn delete_filesystem(&self, pool: &str, name: &str) -> Result<()>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Host ports currently free for forwarding. Possibly empty.
    async fn free_ports(&self, count: usize) -> Result<Vec<u16>>;

    /// Description of the node: operating system, version, hostname.
    async fn info(&self) -> Result<Value>;

    /// Aggregated statistics by kind, each with a `history` keyed by aggregation period in seconds.
    async fn stats(&self) -> Result<Map<String, Value>>;
}
