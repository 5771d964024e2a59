//! JSON over HTTP, and the JSON-RPC 2.0 envelope on top of it.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::RngCore;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{InvalidResponseError, SalError};

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POSTs `body` as JSON and returns the decoded reply, or `null` for an empty one.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() || err.is_timeout() {
                    anyhow!(SalError::Unreachable(url.to_owned()))
                } else {
                    anyhow!(err)
                }
            })?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SalError::Failed {
                what: format!("POST {url}"),
                reason: format!("{status}: {text}"),
            }
            .into());
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// A fresh correlation id for one request.
pub fn random_id() -> String {
    let mut data = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut data);
    hex::encode(data)
}

pub fn request(method: &str, params: Value, id: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": id,
    })
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Checks that `response` answers the request with id `id` and returns its `result`.
///
/// The id and the protocol version must be echoed back exactly. A JSON-RPC error object is reported as an
/// ordinary error.
pub fn into_result(id: &str, response: Value) -> Result<Value> {
    let envelope: Envelope = serde_json::from_value(response.clone()).map_err(|_| InvalidResponseError {
        message: "malformed json rpc response".to_owned(),
        response: response.clone(),
    })?;

    if envelope.id.as_ref().and_then(Value::as_str) != Some(id) {
        return Err(InvalidResponseError {
            message: "wrong response id".to_owned(),
            response,
        }
        .into());
    }
    if envelope.jsonrpc.as_deref() != Some("2.0") {
        return Err(InvalidResponseError {
            message: "wrong json rpc version".to_owned(),
            response,
        }
        .into());
    }
    if let Some(error) = envelope.error {
        return Err(anyhow!("json rpc error: {error}"));
    }
    Ok(envelope.result.unwrap_or(Value::Null))
}
