//! The service templates.

pub mod block_creator;
pub mod bridged;
pub mod coredns;
pub mod explorer;
pub mod faucet;
pub mod geth;
mod linked;
pub mod status_reporter;

use anyhow::Result;
use serde_json::Value;

use crate::{
    host::Host,
    template::{ServiceInfo, Template},
    uid::TemplateUid,
};

pub const TFCHAIN_FLIST: &str =
    "https://hub.grid.tf/tf-autobuilder/threefoldfoundation-tfchain-tfchain-autostart-master.flist";
pub const EXPLORER_FLIST: &str =
    "https://hub.grid.tf/tf-autobuilder/threefoldfoundation-tfchain-explorer-autostart-master.flist";
pub const FAUCET_FLIST: &str = "https://hub.grid.tf/tf-autobuilder/threefoldfoundation-tfchain-faucet-autostart-master_faucetexplorerautobuild.flist";
pub const BRIDGED_FLIST: &str = "https://hub.grid.tf/tf-autobuilder/threefoldfoundation-tfchain-bridged-autostart-master_faucetexplorerautobuild.flist";
pub const COREDNS_FLIST: &str = "https://hub.grid.tf/tf-autobuilder/threefoldtech-coredns-autostart-master.flist";
pub const GETH_FLIST: &str = "https://hub.grid.tf/tf-autobuilder/threefoldfoundation-tfchain-geth-autostart-master.flist";

pub(crate) fn default_network() -> String {
    "standard".to_owned()
}

/// Builds a template from its name, identity, configuration and host.
pub type Factory = fn(ServiceInfo, Value, Host) -> Result<Box<dyn Template>>;

/// Every template this crate provides.
pub fn factories() -> Vec<(TemplateUid, Factory)> {
    vec![
        (block_creator::uid(), block_creator::create as Factory),
        (bridged::uid(), bridged::create),
        (coredns::uid(), coredns::create),
        (explorer::uid(), explorer::create),
        (faucet::uid(), faucet::create),
        (geth::uid(), geth::create),
        (status_reporter::uid(), status_reporter::create),
    ]
}
