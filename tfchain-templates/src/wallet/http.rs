use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{WalletAmount, WalletClient, WalletConnector};
use crate::error::SalError;

/// The daemon rejects requests without this user agent.
const USER_AGENT: &str = "Rivine-Agent";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to the tfchaind HTTP API.
pub struct HttpWalletClient {
    client: Client,
    api_addr: String,
    passphrase: String,
}

#[derive(Deserialize)]
struct InitResponse {
    primaryseed: String,
}

#[derive(Deserialize)]
struct AddressResponse {
    address: String,
}

#[derive(Deserialize)]
struct AddressesResponse {
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Deserialize)]
struct WalletResponse {
    #[serde(default)]
    encrypted: bool,
    #[serde(default)]
    unlocked: bool,
    #[serde(default)]
    confirmedcoinbalance: String,
    #[serde(default)]
    confirmedlockedcoinbalance: String,
    #[serde(default)]
    unconfirmedincomingcoins: String,
    #[serde(default)]
    unconfirmedoutgoingcoins: String,
    #[serde(default)]
    blockstakebalance: String,
}

#[derive(Deserialize)]
struct ConsensusResponse {
    height: u64,
}

#[derive(Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    peers: Vec<Value>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    message: String,
}

impl HttpWalletClient {
    pub fn new(api_addr: &str, passphrase: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_addr: api_addr.trim_end_matches('/').to_owned(),
            passphrase: passphrase.to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_addr)
    }

    async fn execute(&self, path: &str, request: RequestBuilder) -> Result<Response> {
        debug!(api = %self.api_addr, path, "wallet api request");
        let response = request.send().await.map_err(|err| {
            if err.is_connect() || err.is_timeout() {
                anyhow!(SalError::Unreachable(self.api_addr.clone()))
            } else {
                anyhow!(err)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.message)
            .unwrap_or_else(|_| status.to_string());
        match status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                Err(SalError::Busy(format!("{}{path}: {message}", self.api_addr)).into())
            }
            _ => Err(SalError::Failed {
                what: format!("{}{path}", self.api_addr),
                reason: message,
            }
            .into()),
        }
    }

    async fn send<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<T> {
        self.execute(path, request)
            .await?
            .json()
            .await
            .with_context(|| format!("decoding response of {path}"))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(path, self.client.get(self.url(path))).await
    }

    fn post_passphrase(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .form(&[("passphrase", self.passphrase.as_str())])
    }

    async fn wallet(&self) -> Result<WalletResponse> {
        self.get("/wallet").await
    }
}

#[async_trait]
impl WalletClient for HttpWalletClient {
    async fn wallet_init(&self) -> Result<Option<String>> {
        let wallet = self.wallet().await?;
        let seed = if wallet.encrypted {
            None
        } else {
            let init: InitResponse = self
                .send("/wallet/init", self.post_passphrase("/wallet/init"))
                .await?;
            Some(init.primaryseed)
        };
        if !wallet.unlocked {
            // Unlock answers with an empty body.
            self.execute("/wallet/unlock", self.post_passphrase("/wallet/unlock"))
                .await?;
        }
        Ok(seed)
    }

    async fn new_address(&self) -> Result<String> {
        let response: AddressResponse = self.get("/wallet/address").await?;
        Ok(response.address)
    }

    async fn wallet_amount(&self) -> Result<WalletAmount> {
        let wallet = self.wallet().await?;
        Ok(WalletAmount {
            confirmed_coins: wallet.confirmedcoinbalance,
            confirmed_locked_coins: wallet.confirmedlockedcoinbalance,
            unconfirmed_incoming_coins: wallet.unconfirmedincomingcoins,
            unconfirmed_outgoing_coins: wallet.unconfirmedoutgoingcoins,
            block_stakes: wallet.blockstakebalance,
        })
    }

    async fn consensus_stat(&self) -> Result<Value> {
        self.get("/consensus").await
    }

    async fn report(&self) -> Result<Map<String, Value>> {
        let wallet = self.wallet().await?;
        let consensus: ConsensusResponse = self.get("/consensus").await?;
        let gateway: GatewayResponse = self.get("/gateway").await?;
        let addresses: AddressesResponse = self.get("/wallet/addresses").await?;

        let mut report = Map::new();
        report.insert(
            "wallet_status".into(),
            json!(if wallet.unlocked { "unlocked" } else { "locked" }),
        );
        report.insert("block_height".into(), json!(consensus.height));
        report.insert("active_blockstakes".into(), json!(wallet.blockstakebalance));
        report.insert("confirmed_balance".into(), json!(wallet.confirmedcoinbalance));
        report.insert("connected_peers".into(), Value::Array(gateway.peers));
        report.insert(
            "address".into(),
            json!(addresses.addresses.first().cloned().unwrap_or_default()),
        );
        Ok(report)
    }
}

/// Opens [`HttpWalletClient`]s.
#[derive(Default)]
pub struct HttpWalletConnector;

impl WalletConnector for HttpWalletConnector {
    fn connect(&self, api_addr: &str, passphrase: &str) -> Result<Arc<dyn WalletClient>> {
        Ok(Arc::new(HttpWalletClient::new(api_addr, passphrase)?))
    }
}
