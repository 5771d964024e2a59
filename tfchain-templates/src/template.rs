//! The lifecycle every service template implements, and the plumbing they share.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::{is_not_found, SalError, UnknownActionError},
    host::Host,
    sal::{Container, ContainerSpec, Filesystem, STORAGE_POOL},
    state::{Flag, State, StateMap},
    uid::TemplateUid,
};

/// Flag set shared between a template and its recurring actions.
pub type SharedState = Arc<Mutex<State>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub guid: String,
}

impl ServiceInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            guid: new_guid(),
        }
    }
}

pub fn new_guid() -> String {
    let mut data = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut data);
    hex::encode(data)
}

/// The persisted form of a service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub template: TemplateUid,
    pub name: String,
    pub guid: String,
    pub data: Value,
    #[serde(default)]
    pub state: StateMap,
}

/// Identity, flags and host capabilities of one service.
pub struct Base {
    pub info: ServiceInfo,
    pub state: SharedState,
    pub host: Host,
}

impl Base {
    pub fn new(info: ServiceInfo, host: Host) -> Self {
        Self {
            info,
            state: Arc::new(Mutex::new(State::lifecycle())),
            host,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn container_name(&self) -> String {
        format!("container-{}", self.info.guid)
    }

    /// Name of a service owned by this one.
    pub fn child_name(&self, template: &str) -> String {
        format!("{template}-{}", self.info.guid)
    }

    pub fn check(&self, flag: Flag) -> Result<()> {
        Ok(self.state.lock().check_ok(flag)?)
    }

    pub fn set_ok(&self, flag: Flag) -> Result<()> {
        Ok(self.state.lock().set_ok(flag)?)
    }

    pub fn delete(&self, flag: Flag) {
        self.state.lock().delete(flag);
    }

    pub fn is_ok(&self, flag: Flag) -> bool {
        self.state.lock().is_ok(flag)
    }

    pub async fn container(&self) -> Result<Arc<dyn Container>> {
        self.host.node.container(&self.container_name()).await
    }

    /// The service's filesystem in the storage pool, created on first use.
    pub async fn ensure_filesystem(&self) -> Result<Filesystem> {
        let node = &self.host.node;
        match node.filesystem(STORAGE_POOL, &self.info.guid).await {
            Ok(fs) => Ok(fs),
            Err(e) if is_not_found(&e) => {
                debug!(service = %self.info.name, pool = STORAGE_POOL, "creating filesystem");
                node.create_filesystem(STORAGE_POOL, &self.info.guid).await
            }
            Err(e) => Err(e),
        }
    }

    /// The service's filesystem, which `install` must already have created.
    pub async fn filesystem(&self) -> Result<Filesystem> {
        self.host.node.filesystem(STORAGE_POOL, &self.info.guid).await
    }

    /// Creates `dir` on the filesystem and returns its path on the node.
    pub async fn volume(&self, fs: &Filesystem, dir: &str) -> Result<String> {
        let path = fs.subdir(dir);
        self.host.node.mkdir(&path).await?;
        Ok(path)
    }

    /// A free port on the node, for forwarding into the container.
    pub async fn host_port(&self) -> Result<u16> {
        self.host
            .node
            .free_ports(1)
            .await?
            .first()
            .copied()
            .ok_or_else(|| SalError::NoFreePort.into())
    }

    pub async fn provision(&self, spec: ContainerSpec) -> Result<Arc<dyn Container>> {
        info!(
            service = %self.info.name,
            container = %spec.name,
            flist = %spec.flist,
            ports = ?spec.ports.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "creating container"
        );
        self.host.node.create_container(spec).await
    }

    /// Stops the service's container. Failures are logged and otherwise ignored.
    pub async fn stop_container(&self) {
        let name = self.container_name();
        let result = match self.host.node.container(&name).await {
            Ok(container) => container.stop().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(service = %self.info.name, container = %name, "container stopped"),
            Err(e) if is_not_found(&e) => {
                debug!(service = %self.info.name, container = %name, "no container to stop")
            }
            Err(e) => warn!(service = %self.info.name, container = %name, "stopping container: {e:#}"),
        }
    }

    /// Deletes the service's filesystem. Failures are logged and otherwise ignored.
    pub async fn release_storage(&self) {
        match self
            .host
            .node
            .delete_filesystem(STORAGE_POOL, &self.info.guid)
            .await
        {
            Ok(()) => debug!(service = %self.info.name, "filesystem deleted"),
            Err(e) if is_not_found(&e) => debug!(service = %self.info.name, "no filesystem to delete"),
            Err(e) => warn!(service = %self.info.name, "deleting filesystem: {e:#}"),
        }
    }
}

#[async_trait]
pub trait Template: Send + Sync {
    fn uid(&self) -> TemplateUid;

    fn base(&self) -> &Base;

    /// Current configuration, including the values the service wrote back into it.
    fn data(&self) -> Result<Value>;

    fn info(&self) -> &ServiceInfo {
        &self.base().info
    }

    /// A snapshot of the service's flags.
    fn state(&self) -> State {
        self.base().state.lock().clone()
    }

    fn restore(&self, state: StateMap) {
        self.base().state.lock().restore(state);
    }

    fn record(&self) -> Result<ServiceRecord> {
        let info = self.info();
        Ok(ServiceRecord {
            template: self.uid(),
            name: info.name.clone(),
            guid: info.guid.clone(),
            data: self.data()?,
            state: self.state().to_map(),
        })
    }

    /// Replaces the image the container is booted from. Templates without a container ignore it.
    fn set_image(&mut self, _image: String) {}

    async fn install(&mut self) -> Result<()>;

    async fn start(&mut self) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;

    /// Restarts the service, from `image` if one is given. A failing start leaves the service stopped.
    async fn upgrade(&mut self, image: Option<String>) -> Result<()> {
        if let Some(image) = image.filter(|image| !image.is_empty()) {
            info!(service = %self.info().name, %image, "switching image");
            self.set_image(image);
        }
        self.stop().await?;
        self.start().await
    }

    async fn uninstall(&mut self) -> Result<()>;

    /// Runs an operation by name. Arguments and result are JSON.
    async fn action(&mut self, name: &str, args: Value) -> Result<Value> {
        lifecycle_action(self, name, args).await
    }
}

/// Dispatches the operations every template has. Templates with their own actions fall back to this.
pub async fn lifecycle_action<T: Template + ?Sized>(service: &mut T, name: &str, args: Value) -> Result<Value> {
    match name {
        "install" => service.install().await?,
        "start" => service.start().await?,
        "stop" => service.stop().await?,
        "upgrade" => {
            let image = args
                .get("image")
                .and_then(Value::as_str)
                .map(str::to_owned);
            service.upgrade(image).await?
        }
        "uninstall" => service.uninstall().await?,
        _ => {
            return Err(UnknownActionError {
                template: service.uid().name,
                action: name.to_owned(),
            }
            .into());
        }
    }
    Ok(Value::Null)
}

/// Decodes a template's configuration. Missing configuration is an empty one.
pub fn parse_data<T: serde::de::DeserializeOwned>(template: &str, data: Value) -> Result<T> {
    let data = match data {
        Value::Null => Value::Object(Default::default()),
        data => data,
    };
    serde_json::from_value(data).with_context(|| format!("invalid {template} data"))
}
