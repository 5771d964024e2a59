use serde_json::json;
use tfchain_templates::{
    error::StateCheckError,
    host::ServiceHandle,
    sal::{PortForward, STORAGE_POOL},
    services::{block_creator, explorer, EXPLORER_FLIST},
    state::flags,
};

use crate::{act, container_name, data, explorer_data, guid, state, Harness};

const BLOCK_CREATOR_API_ADDR: &str = "http://172.18.0.2:23110";

async fn child(h: &Harness, service: &ServiceHandle) -> ServiceHandle {
    let name = act(service, "block_creator").await.unwrap();
    h.get(block_creator::uid(), name.as_str().unwrap())
        .await
        .unwrap()
}

#[tfchain_macros::test]
async fn install_creates_and_installs_the_block_creator(h: Harness) {
    let service = h.create(explorer::uid(), "explorer", explorer_data()).await;

    act(&service, "install").await.unwrap();

    let name = act(&service, "block_creator").await.unwrap();
    assert_eq!(name, json!(format!("block_creator-{}", guid(&service).await)));
    let bc = child(&h, &service).await;
    assert!(state(&bc).await.is_ok(flags::INSTALL));
    let bc_data = data(&bc).await;
    assert_eq!(bc_data["node"], "local");
    assert_eq!(bc_data["rpcPort"], 23112);
    assert_eq!(bc_data["apiPort"], 23110);
    assert_eq!(bc_data["network"], "testnet");
    assert!(state(&service).await.is_ok(flags::INSTALL));
}

#[tfchain_macros::test]
async fn block_creator_image_is_forwarded(h: Harness) {
    let mut config = explorer_data();
    config["blockCreatorFlist"] = json!("https://hub.grid.tf/tf-autobuilder/tfchain-edge.flist");
    let service = h.create(explorer::uid(), "explorer", config).await;

    act(&service, "install").await.unwrap();

    let bc = child(&h, &service).await;
    assert_eq!(
        data(&bc).await["tfchainFlist"],
        "https://hub.grid.tf/tf-autobuilder/tfchain-edge.flist"
    );
}

#[tfchain_macros::test]
async fn start_runs_behind_the_block_creator(h: Harness) {
    let service = h.create(explorer::uid(), "explorer", explorer_data()).await;
    act(&service, "install").await.unwrap();

    act(&service, "start").await.unwrap();

    let bc = child(&h, &service).await;
    assert!(state(&bc).await.is_ok(flags::START));
    assert!(state(&service).await.is_ok(flags::START));

    let created = h.node.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].name, container_name(&bc).await);

    let spec = &created[1];
    assert_eq!(spec.name, container_name(&service).await);
    assert_eq!(spec.flist, EXPLORER_FLIST);
    assert_eq!(spec.ports, vec![PortForward::tcp(80, 80), PortForward::tcp(443, 443)]);
    assert_eq!(spec.env["BLOCK_CREATOR_API_ADDR"], BLOCK_CREATOR_API_ADDR);
    assert_eq!(spec.env["TFCHAIND_ETHBOOTNODES"], "enode://abc@10.0.0.2:30301");
    assert_eq!(spec.env["TFCHAIND_NETWORK"], "testnet");
    let targets: Vec<&str> = spec.mounts.iter().map(|m| m.target.as_str()).collect();
    assert_eq!(targets, vec!["/mnt/data", "/.caddy/"]);

    let caddyfile = &spec.files[explorer::CADDYFILE_PATH];
    assert!(caddyfile.contains("https://explorer.testnet.threefoldtoken.com {"));
    assert!(caddyfile.contains("root ../public"));
    assert!(caddyfile.contains(&format!("proxy /explorer {BLOCK_CREATOR_API_ADDR} {{")));
    assert!(caddyfile.contains(&format!(
        "proxy /transactionpool/transactions {BLOCK_CREATOR_API_ADDR} {{"
    )));
    assert!(caddyfile.contains("header_upstream User-Agent Rivine-Agent"));

    let uploaded = h
        .node
        .memory_container(&spec.name)
        .unwrap()
        .file(explorer::CADDYFILE_PATH)
        .unwrap();
    assert_eq!(String::from_utf8(uploaded).unwrap(), *caddyfile);
}

#[tfchain_macros::test]
async fn start_needs_an_installed_block_creator(h: Harness) {
    let service = h.create(explorer::uid(), "explorer", explorer_data()).await;
    act(&service, "install").await.unwrap();
    let bc = child(&h, &service).await;
    act(&bc, "uninstall").await.unwrap();

    let err = act(&service, "start").await.unwrap_err();

    assert_eq!(err.downcast_ref::<StateCheckError>().unwrap().tag, "install");
    assert!(h.node.created().is_empty());
}

#[tfchain_macros::test]
async fn stop_is_forwarded(h: Harness) {
    let service = h.create(explorer::uid(), "explorer", explorer_data()).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();
    let bc = child(&h, &service).await;

    act(&service, "stop").await.unwrap();

    assert_eq!(
        h.node.stopped(),
        vec![container_name(&service).await, container_name(&bc).await]
    );
    assert!(!state(&service).await.is_ok(flags::RUNNING));
    assert!(!state(&bc).await.is_ok(flags::RUNNING));
    assert!(state(&bc).await.is_ok(flags::INSTALL));
}

#[tfchain_macros::test]
async fn uninstall_is_forwarded(h: Harness) {
    let service = h.create(explorer::uid(), "explorer", explorer_data()).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();
    let bc = child(&h, &service).await;

    act(&service, "uninstall").await.unwrap();

    assert!(state(&service).await.to_map().is_empty());
    assert!(state(&bc).await.to_map().is_empty());
    assert!(!h.node.has_filesystem(STORAGE_POOL, &guid(&service).await));
    assert!(!h.node.has_filesystem(STORAGE_POOL, &guid(&bc).await));
}

#[tfchain_macros::test]
async fn uninstall_tolerates_a_deleted_block_creator(h: Harness) {
    let service = h.create(explorer::uid(), "explorer", explorer_data()).await;
    act(&service, "install").await.unwrap();
    let name = act(&service, "block_creator").await.unwrap();
    h.robot
        .delete(&block_creator::uid(), name.as_str().unwrap())
        .await
        .unwrap();

    act(&service, "uninstall").await.unwrap();

    assert!(state(&service).await.to_map().is_empty());
}

#[tfchain_macros::test]
async fn stop_fails_without_its_block_creator(h: Harness) {
    let service = h.create(explorer::uid(), "explorer", explorer_data()).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();
    let name = act(&service, "block_creator").await.unwrap();
    h.robot
        .delete(&block_creator::uid(), name.as_str().unwrap())
        .await
        .unwrap();

    assert!(act(&service, "stop").await.is_err());

    let s = state(&service).await;
    assert!(!s.is_ok(flags::RUNNING));
    assert!(s.is_ok(flags::INSTALL));
    assert!(!h.node.is_running(&container_name(&service).await));
}

#[tfchain_macros::test]
async fn upgrade_restarts_the_block_creator_on_its_wallet(_h: Harness) {
    let h = Harness::with_persistent_wallets();
    let service = h.create(explorer::uid(), "explorer", explorer_data()).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();
    let bc = child(&h, &service).await;
    let seed = data(&bc).await["walletSeed"].clone();

    act(&service, "upgrade").await.unwrap();

    assert!(state(&service).await.is_ok(flags::START));
    let s = state(&bc).await;
    assert!(s.is_ok(flags::WALLET_INIT));
    assert!(s.is_ok(flags::START));
    assert_eq!(data(&bc).await["walletSeed"], seed);
    assert_eq!(h.wallets.wallet_count(), 1);
}
