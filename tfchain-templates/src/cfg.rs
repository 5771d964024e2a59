//! Input of `tfrobot simulate`: the node to simulate and the services to drive on it.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{services, uid::TemplateUid};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    /// Created in order, each running its actions before the next one is created.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    #[serde(default = "node_name_default")]
    pub name: String,
    /// Public address, used in the RPC addresses handed out by block creators.
    #[serde(default = "node_addr_default")]
    pub addr: String,
    /// Host ports the node hands out for forwarding, in order.
    #[serde(default = "free_ports_default")]
    pub free_ports: Vec<u16>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: node_name_default(),
            addr: node_addr_default(),
            free_ports: free_ports_default(),
        }
    }
}

pub fn node_name_default() -> String {
    "local".to_owned()
}

pub fn node_addr_default() -> String {
    "127.0.0.1".to_owned()
}

pub fn free_ports_default() -> Vec<u16> {
    (23000..23016).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// A full template uid, or just the template name for the templates of this crate.
    pub template: String,
    pub name: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl ServiceConfig {
    pub fn template_uid(&self) -> Result<TemplateUid> {
        if self.template.contains('/') {
            return Ok(TemplateUid::from_str(&self.template)?);
        }
        services::factories()
            .into_iter()
            .map(|(uid, _)| uid)
            .find(|uid| uid.name == self.template)
            .ok_or_else(|| anyhow!("unknown template {}", self.template))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionConfig {
    Name(String),
    WithArgs {
        action: String,
        #[serde(default)]
        args: Value,
    },
}

impl ActionConfig {
    pub fn name(&self) -> &str {
        match self {
            ActionConfig::Name(name) => name,
            ActionConfig::WithArgs { action, .. } => action,
        }
    }

    pub fn args(&self) -> Value {
        match self {
            ActionConfig::Name(_) => Value::Null,
            ActionConfig::WithArgs { args, .. } => args.clone(),
        }
    }
}
