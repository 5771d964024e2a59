//! Configuration files injected into containers, rendered with tera.

use anyhow::Result;
use serde::Serialize;
use tera::{Context, Tera};
use url::Url;

const CADDYFILE: &str = include_str!("../resources/Caddyfile.tera");
const COREFILE: &str = include_str!("../resources/Corefile.tera");
const BRIDGED_STARTUP: &str = include_str!("../resources/bridged_startup.tera.toml");

pub const TLS_EMAIL: &str = "support@threefoldtoken.com";
pub const DNS_UPSTREAMS: [&str; 2] = ["8.8.8.8", "9.9.9.9"];

/// One reverse-proxied path of a Caddyfile.
#[derive(Clone, Debug, Serialize)]
pub struct Proxy {
    pub path: String,
    pub upstream: String,
    /// tfchaind only answers clients announcing themselves as `Rivine-Agent`.
    pub rivine_agent: bool,
}

impl Proxy {
    pub fn daemon(path: &str, upstream: &str) -> Self {
        Self {
            path: path.to_owned(),
            upstream: upstream.to_owned(),
            rivine_agent: true,
        }
    }

    pub fn transparent(path: &str, upstream: &str) -> Self {
        Self {
            path: path.to_owned(),
            upstream: upstream.to_owned(),
            rivine_agent: false,
        }
    }
}

/// The bare host of a configured domain, which may have been given as a URL.
pub fn bare_domain(domain: &str) -> String {
    match Url::parse(domain) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            _ => domain.to_owned(),
        },
        _ => domain.trim_end_matches('/').to_owned(),
    }
}

/// HTTPS reverse-proxy configuration serving `domain`.
pub fn caddyfile(domain: &str, root: Option<&str>, proxies: &[Proxy]) -> Result<String> {
    let mut ctx = Context::new();
    ctx.insert("domain", &bare_domain(domain));
    ctx.insert("root", &root);
    ctx.insert("proxies", proxies);
    ctx.insert("tls_email", TLS_EMAIL);
    Ok(Tera::one_off(CADDYFILE, &ctx, false)?)
}

/// CoreDNS configuration resolving `zone` through the given 3bot explorers.
pub fn corefile(zone: &str, explorers: &[String]) -> Result<String> {
    let mut ctx = Context::new();
    ctx.insert("zone", zone);
    ctx.insert("explorers", explorers);
    ctx.insert("upstreams", &DNS_UPSTREAMS);
    Ok(Tera::one_off(COREFILE, &ctx, false)?)
}

/// Boot descriptor replacing the bridged flist's own, for when no account is pre-supplied.
pub fn bridged_startup(rpc_addr: &str, network: &str, eth_port: u16) -> Result<String> {
    let mut ctx = Context::new();
    ctx.insert("rpc_addr", rpc_addr);
    ctx.insert("network", network);
    ctx.insert("eth_port", &eth_port);
    Ok(Tera::one_off(BRIDGED_STARTUP, &ctx, false)?)
}
