//! The block creator an explorer or faucet runs its daemon through.

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::debug;

use super::block_creator;
use crate::{
    error::ServiceNotFoundError,
    host::{Host, ServiceHandle},
    state::flags,
};

/// Handle on a block creator owned by another service. Only the name is kept; the service itself is looked up
/// in the registry on every call.
pub struct LinkedBlockCreator {
    pub name: String,
}

impl LinkedBlockCreator {
    pub fn new(name: String) -> Self {
        Self { name }
    }

    pub async fn find_or_create(&self, host: &Host, data: Value) -> Result<ServiceHandle> {
        host.services()?
            .find_or_create(&block_creator::uid(), &self.name, data)
            .await
    }

    pub async fn get(&self, host: &Host) -> Result<ServiceHandle> {
        host.services()?.get(&block_creator::uid(), &self.name).await
    }

    /// Runs `action` on the block creator and waits for it.
    pub async fn call(&self, host: &Host, action: &str) -> Result<Value> {
        debug!(block_creator = %self.name, action, "calling block creator");
        let handle = self.get(host).await?;
        let mut service = handle.lock().await;
        service.action(action, Value::Null).await
    }

    pub async fn check_installed(&self, host: &Host) -> Result<()> {
        let handle = self.get(host).await?;
        let service = handle.lock().await;
        Ok(service.state().check_ok(flags::INSTALL)?)
    }

    pub async fn api_addr(&self, host: &Host) -> Result<String> {
        match self.call(host, "get_api_addr").await? {
            Value::String(addr) => Ok(addr),
            other => Err(anyhow!("block creator {} returned api address {other}", self.name)),
        }
    }

    /// Uninstalls the block creator. One that was never created is already gone.
    pub async fn uninstall(&self, host: &Host) -> Result<()> {
        match self.call(host, "uninstall").await {
            Ok(_) => Ok(()),
            Err(e) if e.downcast_ref::<ServiceNotFoundError>().is_some() => {
                debug!(block_creator = %self.name, "no block creator to uninstall");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
