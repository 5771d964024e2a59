use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tfchain_templates::{
    cfg::Config,
    host::ServiceRegistry,
    render::{self, Proxy},
    robot::Robot,
    rpc::ReqwestTransport,
    sal::memory::MemoryNode,
    services::geth,
    wallet::{http::HttpWalletClient, memory::MemoryWalletConnector, WalletClient},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(about = "Drive tfchain service templates")]
struct Args {
    #[clap(long, default_value = "false")]
    log_json: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the services of a config file on an in-memory node and run their actions.
    Simulate {
        config: PathBuf,
        /// Services to restore before applying the config.
        #[clap(long)]
        load: Option<PathBuf>,
        /// Where to write the resulting service records.
        #[clap(long)]
        save: Option<PathBuf>,
    },
    /// Print the CoreDNS configuration for a zone.
    RenderCorefile {
        #[clap(long)]
        zone: String,
        #[clap(long = "explorer")]
        explorers: Vec<String>,
    },
    /// Print a caddy configuration.
    RenderCaddyfile {
        #[clap(long)]
        domain: String,
        #[clap(long)]
        root: Option<String>,
        /// `<path>=<upstream>`, proxied with the Rivine user agent unless `--transparent` is given.
        #[clap(long = "proxy")]
        proxies: Vec<String>,
        #[clap(long, default_value = "false")]
        transparent: bool,
    },
    /// Print the report of a running tfchaind daemon.
    WalletReport {
        #[clap(long, default_value = "http://127.0.0.1:23110")]
        api: String,
        #[clap(long, default_value = "")]
        passphrase: String,
    },
    /// Ask a geth node whether it is syncing.
    SyncStatus {
        #[clap(long, default_value = "http://127.0.0.1:8545")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match args.command {
        Command::Simulate { config, load, save } => simulate(config, load, save).await,
        Command::RenderCorefile { zone, explorers } => {
            print!("{}", render::corefile(&zone, &explorers)?);
            Ok(())
        }
        Command::RenderCaddyfile {
            domain,
            root,
            proxies,
            transparent,
        } => {
            let proxies = proxies
                .iter()
                .map(|proxy| {
                    let (path, upstream) = proxy
                        .split_once('=')
                        .ok_or_else(|| anyhow!("proxy {proxy:?} is not <path>=<upstream>"))?;
                    Ok(if transparent {
                        Proxy::transparent(path, upstream)
                    } else {
                        Proxy::daemon(path, upstream)
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            print!("{}", render::caddyfile(&domain, root.as_deref(), &proxies)?);
            Ok(())
        }
        Command::WalletReport { api, passphrase } => {
            let wallet = HttpWalletClient::new(&api, &passphrase)?;
            let report = wallet.report().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::SyncStatus { url } => {
            let http = ReqwestTransport::new(Duration::from_secs(10))?;
            match geth::eth_syncing(&http, &url).await? {
                Some(status) if status.is_synced() => {
                    println!("synced at block {}", status.current_block)
                }
                Some(status) => println!(
                    "syncing: block {} of {}",
                    status.current_block, status.highest_block
                ),
                None => println!("not syncing"),
            }
            Ok(())
        }
    }
}

async fn simulate(config: PathBuf, load: Option<PathBuf>, save: Option<PathBuf>) -> Result<()> {
    let config: Config = serde_yaml::from_str(
        &fs::read_to_string(&config).with_context(|| format!("reading {}", config.display()))?,
    )?;

    let node = MemoryNode::new(&config.node.name, &config.node.addr)
        .with_free_ports(config.node.free_ports.iter().copied());
    let robot = Robot::new(
        Arc::new(node),
        Arc::new(MemoryWalletConnector::new()),
        Arc::new(ReqwestTransport::new(Duration::from_secs(5))?),
    );
    if let Some(load) = &load {
        robot.load(load).await?;
    }

    for service in &config.services {
        let template = service.template_uid()?;
        let handle = robot
            .find_or_create(&template, &service.name, service.data.clone())
            .await?;
        for action in &service.actions {
            info!(service = %service.name, action = action.name(), "running action");
            let result = handle
                .lock()
                .await
                .action(action.name(), action.args())
                .await
                .with_context(|| format!("{} {}", service.name, action.name()))?;
            if result != Value::Null {
                println!("{} {}: {result}", service.name, action.name());
            }
        }
    }

    print!("{}", serde_yaml::to_string(&robot.records().await?)?);
    if let Some(save) = &save {
        robot.save(save).await?;
    }
    Ok(())
}
