//! The capabilities a template is handed when it is created.

use std::sync::{Arc, Weak};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::{rpc::HttpTransport, sal::Node, template::Template, uid::TemplateUid, wallet::WalletConnector};

/// A live service. Lifecycle operations hold the lock until they complete, so a service only ever runs one
/// operation at a time.
pub type ServiceHandle = Arc<tokio::sync::Mutex<Box<dyn Template>>>;

/// Lookup of sibling services by template and name.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Returns the service called `name`, creating it from `data` if it does not exist yet. `data` is ignored
    /// for an existing service.
    async fn find_or_create(&self, template: &TemplateUid, name: &str, data: Value) -> Result<ServiceHandle>;

    /// Fails with [`ServiceNotFoundError`](crate::error::ServiceNotFoundError) if there is no such service.
    async fn get(&self, template: &TemplateUid, name: &str) -> Result<ServiceHandle>;
}

#[derive(Clone)]
pub struct Host {
    pub node: Arc<dyn Node>,
    /// The registry owns the services, so services only point back at it.
    pub services: Weak<dyn ServiceRegistry>,
    pub wallets: Arc<dyn WalletConnector>,
    pub http: Arc<dyn HttpTransport>,
}

impl Host {
    pub fn services(&self) -> Result<Arc<dyn ServiceRegistry>> {
        self.services
            .upgrade()
            .ok_or_else(|| anyhow!("service registry has shut down"))
    }
}
