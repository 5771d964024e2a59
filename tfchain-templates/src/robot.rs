//! The in-process collection of services.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Arc, Weak},
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    error::ServiceNotFoundError,
    host::{Host, ServiceHandle, ServiceRegistry},
    rpc::HttpTransport,
    sal::Node,
    services::{self, Factory},
    template::{ServiceInfo, ServiceRecord},
    uid::TemplateUid,
    wallet::WalletConnector,
};

type ServiceKey = (String, String);

/// Owns every service, creates them from the registered templates and lets them find each other.
pub struct Robot {
    host: Host,
    factories: BTreeMap<String, Factory>,
    services: Mutex<BTreeMap<ServiceKey, ServiceHandle>>,
}

fn key(template: &TemplateUid, name: &str) -> ServiceKey {
    (template.to_string(), name.to_owned())
}

impl Robot {
    /// A robot knowing every template of this crate.
    pub fn new(
        node: Arc<dyn Node>,
        wallets: Arc<dyn WalletConnector>,
        http: Arc<dyn HttpTransport>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|robot: &Weak<Robot>| {
            let registry: Weak<dyn ServiceRegistry> = robot.clone();
            Robot {
                host: Host {
                    node,
                    services: registry,
                    wallets,
                    http,
                },
                factories: services::factories()
                    .into_iter()
                    .map(|(uid, factory)| (uid.to_string(), factory))
                    .collect(),
                services: Mutex::new(BTreeMap::new()),
            }
        })
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    fn build(&self, template: &TemplateUid, info: ServiceInfo, data: Value) -> Result<ServiceHandle> {
        let factory = self
            .factories
            .get(&template.to_string())
            .ok_or_else(|| anyhow!("unknown template {template}"))?;
        let service = factory(info, data, self.host.clone())?;
        Ok(Arc::new(Mutex::new(service)))
    }

    /// Creates a new service. Fails if one with the same template and name exists.
    pub async fn create(&self, template: &TemplateUid, name: &str, data: Value) -> Result<ServiceHandle> {
        let mut services = self.services.lock().await;
        if services.contains_key(&key(template, name)) {
            bail!("service {}/{name} already exists", template.name);
        }
        self.insert_new(&mut services, template, name, data)
    }

    fn insert_new(
        &self,
        services: &mut BTreeMap<ServiceKey, ServiceHandle>,
        template: &TemplateUid,
        name: &str,
        data: Value,
    ) -> Result<ServiceHandle> {
        let info = ServiceInfo::new(name);
        info!(template = %template, service = name, guid = %info.guid, "creating service");
        let handle = self.build(template, info, data)?;
        services.insert(key(template, name), handle.clone());
        Ok(handle)
    }

    pub async fn list(&self) -> Vec<ServiceHandle> {
        self.services.lock().await.values().cloned().collect()
    }

    /// Uninstalls the service and forgets it. The uninstall must succeed for the service to be removed.
    pub async fn delete(&self, template: &TemplateUid, name: &str) -> Result<()> {
        let handle = self.get(template, name).await?;
        handle.lock().await.uninstall().await?;
        self.services.lock().await.remove(&key(template, name));
        info!(template = %template, service = name, "service deleted");
        Ok(())
    }

    /// The persisted form of every service.
    pub async fn records(&self) -> Result<Vec<ServiceRecord>> {
        let mut records = Vec::new();
        for handle in self.list().await {
            records.push(handle.lock().await.record()?);
        }
        Ok(records)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let records = self.records().await?;
        let yaml = serde_yaml::to_string(&records)?;
        tokio::fs::write(path, yaml)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), services = records.len(), "services saved");
        Ok(())
    }

    /// Recreates services from saved records, keeping their guids and flags. Returns how many were loaded.
    pub async fn load(&self, path: &Path) -> Result<usize> {
        let yaml = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let records: Vec<ServiceRecord> = serde_yaml::from_str(&yaml)?;
        let mut services = self.services.lock().await;
        for record in &records {
            let info = ServiceInfo {
                name: record.name.clone(),
                guid: record.guid.clone(),
            };
            let handle = self.build(&record.template, info, record.data.clone())?;
            handle.lock().await.restore(record.state.clone());
            services.insert(key(&record.template, &record.name), handle);
        }
        info!(path = %path.display(), services = records.len(), "services loaded");
        Ok(records.len())
    }
}

#[async_trait]
impl ServiceRegistry for Robot {
    async fn find_or_create(&self, template: &TemplateUid, name: &str, data: Value) -> Result<ServiceHandle> {
        let mut services = self.services.lock().await;
        if let Some(handle) = services.get(&key(template, name)) {
            return Ok(handle.clone());
        }
        self.insert_new(&mut services, template, name, data)
    }

    async fn get(&self, template: &TemplateUid, name: &str) -> Result<ServiceHandle> {
        self.services
            .lock()
            .await
            .get(&key(template, name))
            .cloned()
            .ok_or_else(|| {
                ServiceNotFoundError {
                    template: template.name.clone(),
                    name: name.to_owned(),
                }
                .into()
            })
    }
}
