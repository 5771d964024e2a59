//! An in-process [`Node`], used by `tfrobot simulate` and the tests.
//!
//! It keeps containers, filesystems and directories in memory, hands out free ports from a fixed list and can be
//! told to fail specific operations.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Weak},
};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{CommandOutput, Container, ContainerSpec, Filesystem, Node};
use crate::error::SalError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateContainer,
    StopContainer,
    GetFilesystem,
    CreateFilesystem,
    DeleteFilesystem,
    FreePorts,
    NodeStats,
    System,
}

#[derive(Default)]
struct Inner {
    containers: BTreeMap<String, Arc<MemoryContainer>>,
    created: Vec<ContainerSpec>,
    stopped: Vec<String>,
    filesystems: BTreeMap<(String, String), Filesystem>,
    dirs: BTreeSet<String>,
    free_ports: VecDeque<u16>,
    failures: HashMap<Operation, VecDeque<SalError>>,
    command_outputs: Vec<(String, CommandOutput)>,
    stats: Map<String, Value>,
    next_ip: u8,
}

impl Inner {
    fn take_failure(&mut self, op: Operation) -> Result<(), SalError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub struct MemoryNode {
    name: String,
    addr: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryNode {
    pub fn new(name: &str, addr: &str) -> Self {
        Self {
            name: name.to_owned(),
            addr: addr.to_owned(),
            inner: Arc::new(Mutex::new(Inner {
                next_ip: 2,
                ..Default::default()
            })),
        }
    }

    /// Statistics returned by [`Node::stats`]. Empty until set.
    pub fn set_stats(&self, stats: Map<String, Value>) {
        self.inner.lock().stats = stats;
    }

    pub fn with_free_ports(self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.inner.lock().free_ports.extend(ports);
        self
    }

    /// Makes the next call of `op` fail with `err`. Failures queue up.
    pub fn fail_next(&self, op: Operation, err: SalError) {
        self.inner.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Commands starting with `prefix` run inside any container will produce `output`.
    pub fn on_command(&self, prefix: &str, output: CommandOutput) {
        self.inner
            .lock()
            .command_outputs
            .push((prefix.to_owned(), output));
    }

    /// Specs of every container created so far, oldest first.
    pub fn created(&self) -> Vec<ContainerSpec> {
        self.inner.lock().created.clone()
    }

    pub fn last_created(&self, name: &str) -> Option<ContainerSpec> {
        self.inner
            .lock()
            .created
            .iter()
            .rev()
            .find(|spec| spec.name == name)
            .cloned()
    }

    /// Names of containers that were stopped, in order.
    pub fn stopped(&self) -> Vec<String> {
        self.inner.lock().stopped.clone()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.inner.lock().containers.contains_key(name)
    }

    pub fn has_filesystem(&self, pool: &str, name: &str) -> bool {
        self.inner
            .lock()
            .filesystems
            .contains_key(&(pool.to_owned(), name.to_owned()))
    }

    pub fn dirs(&self) -> BTreeSet<String> {
        self.inner.lock().dirs.clone()
    }

    pub fn memory_container(&self, name: &str) -> Option<Arc<MemoryContainer>> {
        self.inner.lock().containers.get(name).cloned()
    }
}

#[async_trait]
impl Node for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn addr(&self) -> &str {
        &self.addr
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<Arc<dyn Container>> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::CreateContainer)?;
        let ip = IpAddr::V4(Ipv4Addr::new(172, 18, 0, inner.next_ip));
        inner.next_ip = inner.next_ip.wrapping_add(1);

        let container = Arc::new(MemoryContainer {
            name: spec.name.clone(),
            ip,
            files: Mutex::new(
                spec.files
                    .iter()
                    .map(|(path, content)| (path.clone(), content.clone().into_bytes()))
                    .collect(),
            ),
            commands: Mutex::new(Vec::new()),
            node: Arc::downgrade(&self.inner),
        });
        debug!(container = %spec.name, flist = %spec.flist, "creating container");
        inner.created.push(spec.clone());
        inner.containers.insert(spec.name, container.clone());
        Ok(container)
    }

    async fn container(&self, name: &str) -> Result<Arc<dyn Container>> {
        let inner = self.inner.lock();
        let container = inner
            .containers
            .get(name)
            .cloned()
            .ok_or_else(|| SalError::NotFound(format!("container {name}")))?;
        Ok(container)
    }

    async fn delete_container(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .containers
            .remove(name)
            .ok_or_else(|| SalError::NotFound(format!("container {name}")))?;
        Ok(())
    }

    async fn filesystem(&self, pool: &str, name: &str) -> Result<Filesystem> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::GetFilesystem)?;
        let fs = inner
            .filesystems
            .get(&(pool.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| SalError::NotFound(format!("filesystem {pool}/{name}")))?;
        Ok(fs)
    }

    async fn create_filesystem(&self, pool: &str, name: &str) -> Result<Filesystem> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::CreateFilesystem)?;
        let fs = Filesystem {
            pool: pool.to_owned(),
            name: name.to_owned(),
            path: format!("/mnt/storagepools/{pool}/filesystems/{name}"),
        };
        inner
            .filesystems
            .insert((pool.to_owned(), name.to_owned()), fs.clone());
        Ok(fs)
    }

    async fn delete_filesystem(&self, pool: &str, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::DeleteFilesystem)?;
        let fs = inner
            .filesystems
            .remove(&(pool.to_owned(), name.to_owned()))
            .ok_or_else(|| SalError::NotFound(format!("filesystem {pool}/{name}")))?;
        inner.dirs.retain(|dir| !dir.starts_with(&fs.path));
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.inner.lock().dirs.insert(path.to_owned());
        Ok(())
    }

    async fn free_ports(&self, count: usize) -> Result<Vec<u16>> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::FreePorts)?;
        let count = count.min(inner.free_ports.len());
        Ok(inner.free_ports.drain(..count).collect())
    }

    async fn info(&self) -> Result<Value> {
        Ok(json!({
            "os": "zero-os",
            "hostname": self.name,
            "addr": self.addr,
        }))
    }

    async fn stats(&self) -> Result<Map<String, Value>> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::NodeStats)?;
        Ok(inner.stats.clone())
    }
}

pub struct MemoryContainer {
    name: String,
    ip: IpAddr,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    commands: Mutex<Vec<String>>,
    node: Weak<Mutex<Inner>>,
}

impl MemoryContainer {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    fn node(&self) -> Result<Arc<Mutex<Inner>>, SalError> {
        self.node
            .upgrade()
            .ok_or_else(|| SalError::Unreachable(format!("node of container {}", self.name)))
    }

    /// Commands run through [`Container::system`], in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl Container for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stop(&self) -> Result<()> {
        let node = self.node()?;
        let mut node = node.lock();
        node.take_failure(Operation::StopContainer)?;
        node.containers.remove(&self.name);
        node.stopped.push(self.name.clone());
        Ok(())
    }

    async fn default_ip(&self, _interface: Option<&str>) -> Result<IpAddr> {
        Ok(self.ip)
    }

    async fn upload_content(&self, path: &str, content: &[u8]) -> Result<()> {
        self.files.lock().insert(path.to_owned(), content.to_vec());
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.lock().contains_key(path))
    }

    async fn system(&self, command: &str) -> Result<CommandOutput> {
        let output = {
            let node = self.node()?;
            let mut node = node.lock();
            node.take_failure(Operation::System)?;
            node.command_outputs
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or(CommandOutput {
                    success: true,
                    ..Default::default()
                })
        };
        self.commands.lock().push(command.to_owned());
        Ok(output)
    }
}
