mod coredns;
mod explorer;
mod lifecycle;
mod robot;
mod status_reporter;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tfchain_templates::{
    host::{ServiceHandle, ServiceRegistry},
    robot::Robot,
    rpc::HttpTransport,
    sal::memory::MemoryNode,
    state::State,
    uid::TemplateUid,
    wallet::memory::MemoryWalletConnector,
};

pub const NODE_ADDR: &str = "10.102.0.1";
pub const FIRST_FREE_PORT: u16 = 23000;

type Responder = Box<dyn Fn(&str, &Value) -> Result<Value> + Send + Sync>;

/// An [`HttpTransport`] answering from a test-supplied function and remembering what it was sent.
#[derive(Default)]
pub struct ScriptedTransport {
    responder: Mutex<Option<Responder>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn respond(&self, responder: impl Fn(&str, &Value) -> Result<Value> + Send + Sync + 'static) {
        *self.responder.lock() = Some(Box::new(responder));
    }

    /// Answers every request as a JSON-RPC 2.0 server would, echoing the request id.
    pub fn respond_rpc(&self, result: Value) {
        self.respond(move |_, request| {
            Ok(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": result,
            }))
        });
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        self.requests.lock().push((url.to_owned(), body.clone()));
        match &*self.responder.lock() {
            Some(responder) => responder(url, body),
            None => Ok(Value::Null),
        }
    }
}

/// A robot on an in-memory node, with in-memory wallets and a scripted HTTP transport.
pub struct Harness {
    pub node: Arc<MemoryNode>,
    pub wallets: MemoryWalletConnector,
    pub http: Arc<ScriptedTransport>,
    pub robot: Arc<Robot>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_free_ports(FIRST_FREE_PORT..FIRST_FREE_PORT + 10)
    }

    pub fn with_free_ports(ports: impl IntoIterator<Item = u16>) -> Self {
        Self::build(ports, MemoryWalletConnector::new())
    }

    /// Wallets survive container restarts, as they do on a real node.
    pub fn with_persistent_wallets() -> Self {
        Self::build(
            FIRST_FREE_PORT..FIRST_FREE_PORT + 10,
            MemoryWalletConnector::persistent(),
        )
    }

    fn build(ports: impl IntoIterator<Item = u16>, wallets: MemoryWalletConnector) -> Self {
        let node = Arc::new(MemoryNode::new("local", NODE_ADDR).with_free_ports(ports));
        let http = Arc::new(ScriptedTransport::default());
        let robot = Robot::new(node.clone(), Arc::new(wallets.clone()), http.clone());
        Self {
            node,
            wallets,
            http,
            robot,
        }
    }

    pub async fn create(&self, template: TemplateUid, name: &str, data: Value) -> ServiceHandle {
        self.robot.create(&template, name, data).await.unwrap()
    }

    pub async fn get(&self, template: TemplateUid, name: &str) -> Result<ServiceHandle> {
        self.robot.get(&template, name).await
    }
}

pub async fn act(service: &ServiceHandle, action: &str) -> Result<Value> {
    service.lock().await.action(action, Value::Null).await
}

pub async fn state(service: &ServiceHandle) -> State {
    service.lock().await.state()
}

pub async fn data(service: &ServiceHandle) -> Value {
    service.lock().await.data().unwrap()
}

pub async fn guid(service: &ServiceHandle) -> String {
    service.lock().await.info().guid.clone()
}

pub async fn container_name(service: &ServiceHandle) -> String {
    format!("container-{}", guid(service).await)
}

pub fn block_creator_data() -> Value {
    json!({
        "node": "local",
        "rpcPort": 23112,
        "apiPort": 23110,
        "network": "testnet",
        "walletPassphrase": "supersecret",
    })
}

pub fn explorer_data() -> Value {
    json!({
        "node": "local",
        "rpcPort": 23112,
        "apiPort": 23110,
        "domain": "https://explorer.testnet.threefoldtoken.com",
        "network": "testnet",
        "ethbootnodes": "enode://abc@10.0.0.2:30301",
    })
}

pub fn faucet_data() -> Value {
    json!({
        "node": "local",
        "rpcPort": 23112,
        "apiPort": 23110,
        "domain": "faucet.testnet.threefoldtoken.com",
        "network": "testnet",
        "ethPort": 3003,
        "faucetPort": 8080,
    })
}

pub fn bridged_data() -> Value {
    json!({
        "node": "local",
        "rpcPort": 23113,
        "network": "testnet",
        "ethPort": 3003,
        "accountJson": "",
        "accountPassword": "",
    })
}

pub fn coredns_data() -> Value {
    json!({
        "node": "local",
        "zone": "grid.tf.",
        "explorers": ["https://explorer.threefoldtoken.com"],
    })
}

pub fn geth_data() -> Value {
    json!({
        "node": "local",
        "network": "rinkeby",
        "ethport": 30303,
    })
}

pub fn status_reporter_data() -> Value {
    json!({
        "node": "local",
        "blockCreator": "bc",
        "blockCreatorIdentifier": "5",
        "postUrlTemplate": "http://127.0.0.1:4567/blockcreators/{block_creator_identifier}/",
        "interval": 300,
    })
}
