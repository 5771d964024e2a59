//! go-ethereum, with a recurring check of its sync progress.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::GETH_FLIST;
use crate::{
    error::{InvalidResponseError, SalError},
    host::Host,
    recurring::RecurringAction,
    rpc::{self, HttpTransport},
    sal::{CommandOutput, ContainerSpec, Mount, Node, PortForward},
    state::{flags, State},
    template::{lifecycle_action, parse_data, Base, ServiceInfo, SharedState, Template},
    uid::TemplateUid,
};

pub const NAME: &str = "geth";
pub const VERSION: &str = "0.0.2";

const DATA_DIR: &str = "/mnt/data";
const GETH_BIN: &str = "/sandbox/bin/geth";
const BOOTNODE_BIN: &str = "/sandbox/bin/bootnode";
pub const SYNC_CHECK_PERIOD: Duration = Duration::from_secs(60);

pub fn uid() -> TemplateUid {
    TemplateUid::tfchain(NAME, VERSION)
}

/// Command line settings may be given as numbers or strings. An empty string means "use the default", which
/// `run` fills in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GethData {
    #[serde(default)]
    pub node: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub verbosity: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub lightserv: String,
    #[serde(default)]
    pub nat: String,
    #[serde(default)]
    pub v5disc: String,
    #[serde(default)]
    pub syncmode: String,
    #[serde(default = "default_datadir")]
    pub datadir: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub ethport: String,
    #[serde(default)]
    pub nodekey: String,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default = "default_flist")]
    pub geth_flist: String,
}

fn default_network() -> String {
    "testnet".to_owned()
}

fn default_datadir() -> String {
    DATA_DIR.to_owned()
}

fn default_rpc_port() -> u16 {
    8545
}

fn default_flist() -> String {
    GETH_FLIST.to_owned()
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Setting {
        String(String),
        Number(u64),
    }
    Ok(match Option::<Setting>::deserialize(deserializer)? {
        Some(Setting::String(s)) => s,
        Some(Setting::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

impl GethData {
    /// Replaces empty settings with geth's defaults for a light-serving full node.
    pub fn fill_defaults(&mut self) {
        fn or(value: &mut String, default: &str) {
            if value.is_empty() {
                *value = default.to_owned();
            }
        }
        or(&mut self.verbosity, "4");
        or(&mut self.lightserv, "90");
        or(&mut self.nat, "none");
        or(&mut self.v5disc, "v5disc");
        or(&mut self.syncmode, "full");
        or(&mut self.ethport, "30303");
        or(&mut self.nodekey, "/mnt/data/bootnode.key");
    }

    pub fn eth_port(&self) -> Result<u16> {
        if self.ethport.is_empty() {
            return Ok(30303);
        }
        self.ethport
            .parse()
            .with_context(|| format!("invalid ethport {:?}", self.ethport))
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            "--rpc".to_owned(),
            format!("--{}", self.network),
            format!("--verbosity={}", self.verbosity),
            format!("--lightserv={}", self.lightserv),
            format!("--nat={}", self.nat),
            format!("--{}", self.v5disc),
            format!("--syncmode={}", self.syncmode),
            format!("--datadir={}", self.datadir),
            "--rpcaddr=0.0.0.0".to_owned(),
            format!("--rpcport={}", self.rpc_port),
            format!("--port={}", self.ethport),
            format!("--nodekey={}", self.nodekey),
        ]
    }
}

/// Block heights reported by `eth_syncing` while a sync is in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncStatus {
    pub current_block: u64,
    pub highest_block: u64,
}

impl SyncStatus {
    pub fn is_synced(&self) -> bool {
        self.current_block >= self.highest_block
    }
}

/// Asks a geth container over JSON-RPC whether it is syncing.
#[derive(Clone)]
pub struct SyncProbe {
    pub node: Arc<dyn Node>,
    pub http: Arc<dyn HttpTransport>,
    pub container: String,
    pub rpc_port: u16,
}

impl SyncProbe {
    /// `None` when geth reports no sync in progress.
    pub async fn syncing_status(&self) -> Result<Option<SyncStatus>> {
        let ip = self
            .node
            .container(&self.container)
            .await?
            .default_ip(None)
            .await?;
        eth_syncing(self.http.as_ref(), &format!("http://{ip}:{}", self.rpc_port)).await
    }

    /// Updates the sync flags from one probe. A failed probe counts as not syncing.
    pub async fn reconcile(&self, state: &SharedState) {
        let status = match self.syncing_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(container = %self.container, "checking sync status: {e:#}");
                None
            }
        };
        apply_sync_status(&mut state.lock(), status);
    }
}

/// Calls `eth_syncing` on the geth JSON-RPC endpoint at `url`.
pub async fn eth_syncing(http: &dyn HttpTransport, url: &str) -> Result<Option<SyncStatus>> {
    let id = rpc::random_id();
    let response = http
        .post_json(url, &rpc::request("eth_syncing", json!([]), &id))
        .await?;
    parse_syncing(rpc::into_result(&id, response)?)
}

/// Interprets the `result` of an `eth_syncing` call.
pub fn parse_syncing(result: Value) -> Result<Option<SyncStatus>> {
    let progress = match result {
        Value::Null | Value::Bool(false) => return Ok(None),
        Value::Object(progress) if progress.is_empty() => return Ok(None),
        Value::Object(progress) => progress,
        other => {
            return Err(InvalidResponseError {
                message: "unexpected eth_syncing result".to_owned(),
                response: other,
            }
            .into());
        }
    };
    let block = |key: &str| -> Result<u64> {
        let hex = progress.get(key).and_then(Value::as_str).unwrap_or("0x0");
        let digits = hex.trim_start_matches("0x");
        if digits.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(digits, 16).with_context(|| format!("invalid {key} {hex:?}"))
    };
    Ok(Some(SyncStatus {
        current_block: block("currentBlock")?,
        highest_block: block("highestBlock")?,
    }))
}

/// Sets exactly one of `ethereum.synced` and `ethereum.syncing`, or clears both when geth is not syncing.
pub fn apply_sync_status(state: &mut State, status: Option<SyncStatus>) {
    let (set, clear) = match status {
        None => {
            state.delete(flags::SYNCING);
            state.delete(flags::SYNCED);
            return;
        }
        Some(status) if status.is_synced() => (flags::SYNCED, flags::SYNCING),
        Some(_) => (flags::SYNCING, flags::SYNCED),
    };
    state.delete(clear);
    if let Err(e) = state.set_ok(set) {
        // The container is not running, or stopped while the probe ran.
        debug!("not recording sync status: {e}");
    }
}

pub struct Geth {
    base: Base,
    data: GethData,
    _sync_check: RecurringAction,
}

pub fn create(info: ServiceInfo, data: Value, host: Host) -> Result<Box<dyn Template>> {
    Ok(Box::new(Geth::new(info, parse_data(NAME, data)?, host)))
}

impl Geth {
    pub fn new(info: ServiceInfo, data: GethData, host: Host) -> Self {
        let base = Base::new(info, host);
        let probe = SyncProbe {
            node: base.host.node.clone(),
            http: base.host.http.clone(),
            container: base.container_name(),
            rpc_port: data.rpc_port,
        };
        let state = base.state.clone();
        let sync_check = RecurringAction::spawn(
            format!("{} sync check", base.name()),
            SYNC_CHECK_PERIOD,
            move || {
                let probe = probe.clone();
                let state = state.clone();
                async move { probe.reconcile(&state).await }
            },
        );
        Self {
            base,
            data,
            _sync_check: sync_check,
        }
    }

    pub fn probe(&self) -> SyncProbe {
        SyncProbe {
            node: self.base.host.node.clone(),
            http: self.base.host.http.clone(),
            container: self.base.container_name(),
            rpc_port: self.data.rpc_port,
        }
    }

    fn env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("GETH_NETWORK".to_owned(), self.data.network.clone()),
            ("GETH_VERBOSITY".to_owned(), self.data.verbosity.clone()),
            ("GETH_LIGHTSERV".to_owned(), self.data.lightserv.clone()),
            ("GETH_SYNCMODE".to_owned(), self.data.syncmode.clone()),
            ("GETH_NAT".to_owned(), self.data.nat.clone()),
            ("GETH_V5DISC".to_owned(), self.data.v5disc.clone()),
            ("GETH_DATADIR".to_owned(), self.data.datadir.clone()),
            ("GETH_PORT".to_owned(), self.data.ethport.clone()),
            ("GETH_NODEKEY".to_owned(), self.data.nodekey.clone()),
        ])
    }

    async fn create_container(&self) -> Result<()> {
        self.base.check(flags::INSTALL)?;
        let fs = self.base.filesystem().await?;
        let data = self.base.volume(&fs, &self.base.info.guid).await?;
        let eth_port = self.data.eth_port()?;

        self.base
            .provision(ContainerSpec {
                name: self.base.container_name(),
                flist: self.data.geth_flist.clone(),
                mounts: vec![Mount {
                    source: data,
                    target: DATA_DIR.to_owned(),
                }],
                ports: vec![PortForward::tcp(eth_port, eth_port)],
                env: self.env(),
                files: BTreeMap::new(),
            })
            .await?;
        Ok(())
    }

    /// The command `run` starts geth with.
    pub fn get_args(&self) -> String {
        format!("{GETH_BIN} {}", self.data.args().join(" "))
    }

    /// Starts geth inside the container, generating its node key on first run.
    pub async fn run(&mut self) -> Result<()> {
        self.base.check(flags::START)?;
        self.data.fill_defaults();

        let container = self.base.container().await?;
        if !container.file_exists(&self.data.nodekey).await? {
            info!(service = %self.base.name(), nodekey = %self.data.nodekey, "generating bootnode key");
            checked(
                container
                    .system(&format!("{BOOTNODE_BIN} -genkey {}", self.data.nodekey))
                    .await?,
                "bootnode -genkey",
            )?;
        }

        let command = self.get_args();
        info!(service = %self.base.name(), %command, "starting geth");
        checked(container.system(&command).await?, "geth")?;

        self.base.set_ok(flags::RUNNING)?;
        self.base.set_ok(flags::RUN)
    }

    /// `enode://<node id>@<container ip>:<ethport>`.
    pub async fn get_enode_address(&self) -> Result<String> {
        let container = self.base.container().await?;
        let ip = container.default_ip(None).await?;
        let nodekey: &str = if self.data.nodekey.is_empty() {
            "/mnt/data/bootnode.key"
        } else {
            &self.data.nodekey
        };
        let output = checked(
            container
                .system(&format!("{BOOTNODE_BIN} -nodekey {nodekey} -writeaddress"))
                .await?,
            "bootnode -writeaddress",
        )?;
        Ok(format!(
            "enode://{}@{ip}:{}",
            output.trim(),
            self.data.eth_port()?
        ))
    }

    pub async fn get_syncing_status(&self) -> Result<Option<SyncStatus>> {
        self.probe().syncing_status().await
    }

    /// Runs one sync check now instead of waiting for the next scheduled one.
    pub async fn check_sync(&self) {
        self.probe().reconcile(&self.base.state).await;
    }
}

fn checked(output: CommandOutput, what: &str) -> Result<String> {
    if output.success {
        Ok(output.stdout)
    } else {
        Err(SalError::Failed {
            what: what.to_owned(),
            reason: output.stderr,
        }
        .into())
    }
}

#[async_trait]
impl Template for Geth {
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
        self.data.geth_flist = image;
    }

    async fn install(&mut self) -> Result<()> {
        info!(service = %self.base.name(), "installing geth");
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
        info!(service = %self.base.name(), "stopping geth");
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

    async fn action(&mut self, name: &str, args: Value) -> Result<Value> {
        match name {
            "run" => {
                self.run().await?;
                Ok(Value::Null)
            }
            "get_args" => Ok(json!(self.get_args())),
            "get_enode_address" => Ok(json!(self.get_enode_address().await?)),
            "get_syncing_status" => Ok(match self.get_syncing_status().await? {
                Some(status) => json!({
                    "currentBlock": status.current_block,
                    "highestBlock": status.highest_block,
                }),
                None => Value::Null,
            }),
            "check_sync" => {
                self.check_sync().await;
                Ok(Value::Null)
            }
            _ => lifecycle_action(self, name, args).await,
        }
    }
}
