//! Periodically publishes the report of a block creator to an HTTP endpoint.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::block_creator;
use crate::{
    host::Host,
    recurring::RecurringAction,
    state::flags,
    template::{lifecycle_action, parse_data, Base, ServiceInfo, SharedState, Template},
    uid::TemplateUid,
};

pub const NAME: &str = "block_creator_status_reporter";
pub const VERSION: &str = "0.0.1";

const IDENTIFIER_PLACEHOLDER: &str = "{block_creator_identifier}";

pub fn uid() -> TemplateUid {
    TemplateUid::tfchain(NAME, VERSION)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReporterData {
    #[serde(default)]
    pub node: String,
    /// Name of the block creator service to report on.
    pub block_creator: String,
    pub block_creator_identifier: String,
    /// Where to POST the report. `{block_creator_identifier}` is replaced.
    pub post_url_template: String,
    /// Seconds between two reports.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    300
}

impl StatusReporterData {
    pub fn post_url(&self) -> String {
        self.post_url_template
            .replace(IDENTIFIER_PLACEHOLDER, &self.block_creator_identifier)
    }
}

/// What the recurring action needs to publish one report.
#[derive(Clone)]
pub struct Monitor {
    pub host: Host,
    pub state: SharedState,
    pub block_creator: String,
    pub url: String,
    /// Seconds between reports, also the stats history period that gets published.
    pub interval: u64,
}

impl Monitor {
    /// Publishes one report if the reporter is running. Failures are logged.
    pub async fn tick(&self) {
        let running = self.state.lock().is_ok(flags::RUNNING);
        if !running {
            debug!(block_creator = %self.block_creator, "reporter not running");
            return;
        }
        if let Err(e) = self.publish().await {
            warn!(block_creator = %self.block_creator, url = %self.url, "publishing report: {e:#}");
        }
    }

    pub async fn publish(&self) -> Result<()> {
        let handle = self
            .host
            .services()?
            .get(&block_creator::uid(), &self.block_creator)
            .await?;
        let mut report = handle.lock().await.action("report", Value::Null).await?;
        let info = self.host.node.info().await?;
        let stats = self.host.node.stats().await?;
        if let Value::Object(report) = &mut report {
            report.insert("node_info".to_owned(), info);
            report.insert("node_stats".to_owned(), Value::Object(self.stats_history(&stats)));
        }
        self.host.http.post_json(&self.url, &report).await?;
        debug!(block_creator = %self.block_creator, url = %self.url, "report published");
        Ok(())
    }

    /// The value of each stat over the last reporting period.
    fn stats_history(&self, stats: &Map<String, Value>) -> Map<String, Value> {
        let period = self.interval.to_string();
        stats
            .iter()
            .map(|(kind, stat)| (kind.clone(), stat["history"][&period].clone()))
            .collect()
    }
}

pub struct StatusReporter {
    base: Base,
    data: StatusReporterData,
    _monitor: RecurringAction,
}

pub fn create(info: ServiceInfo, data: Value, host: Host) -> Result<Box<dyn Template>> {
    Ok(Box::new(StatusReporter::new(info, parse_data(NAME, data)?, host)))
}

impl StatusReporter {
    pub fn new(info: ServiceInfo, data: StatusReporterData, host: Host) -> Self {
        let base = Base::new(info, host);
        let monitor = Monitor {
            host: base.host.clone(),
            state: base.state.clone(),
            block_creator: data.block_creator.clone(),
            url: data.post_url(),
            interval: data.interval,
        };
        let action = RecurringAction::spawn(
            format!("{} monitor", base.name()),
            Duration::from_secs(data.interval.max(1)),
            move || {
                let monitor = monitor.clone();
                async move { monitor.tick().await }
            },
        );
        Self {
            base,
            data,
            _monitor: action,
        }
    }

    pub fn monitor(&self) -> Monitor {
        Monitor {
            host: self.base.host.clone(),
            state: self.base.state.clone(),
            block_creator: self.data.block_creator.clone(),
            url: self.data.post_url(),
            interval: self.data.interval,
        }
    }
}

#[async_trait]
impl Template for StatusReporter {
    fn uid(&self) -> TemplateUid {
        uid()
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn data(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.data)?)
    }

    /// Nothing to prepare: reporting needs neither storage nor a container.
    async fn install(&mut self) -> Result<()> {
        self.base.set_ok(flags::INSTALL)
    }

    async fn start(&mut self) -> Result<()> {
        self.base.check(flags::INSTALL)?;
        info!(service = %self.base.name(), block_creator = %self.data.block_creator, "starting reporter");
        self.base.set_ok(flags::RUNNING)
    }

    async fn stop(&mut self) -> Result<()> {
        self.base.delete(flags::RUNNING);
        Ok(())
    }

    async fn uninstall(&mut self) -> Result<()> {
        self.base.delete(flags::INSTALL);
        Ok(())
    }

    async fn action(&mut self, name: &str, args: Value) -> Result<Value> {
        match name {
            "report_now" => {
                self.monitor().tick().await;
                Ok(Value::Null)
            }
            _ => lifecycle_action(self, name, args).await,
        }
    }
}
