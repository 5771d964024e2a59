use serde_json::json;
use tfchain_templates::{
    error::ServiceNotFoundError,
    host::ServiceRegistry,
    services::{block_creator, coredns, explorer, geth},
    state::flags,
};

use crate::{
    act, block_creator_data, coredns_data, data, explorer_data, geth_data, guid, state, Harness,
};

#[tfchain_macros::test]
async fn knows_every_template(h: Harness) {
    let templates: Vec<&str> = h.robot.templates().collect();

    assert_eq!(templates.len(), 7);
    assert!(templates.contains(&"github.com/threefoldfoundation/tfchain-templates/block_creator/0.0.2"));
    assert!(templates.contains(&"github.com/threefoldfoundation/tfchain-templates/coredns3bot/0.0.1"));
}

#[tfchain_macros::test]
async fn names_are_unique_per_template(h: Harness) {
    h.create(block_creator::uid(), "main", block_creator_data()).await;

    assert!(h
        .robot
        .create(&block_creator::uid(), "main", block_creator_data())
        .await
        .is_err());
    // Another template may reuse the name.
    h.create(geth::uid(), "main", geth_data()).await;
    assert_eq!(h.robot.list().await.len(), 2);
}

#[tfchain_macros::test]
async fn find_or_create_returns_the_existing_service(h: Harness) {
    let first = h.create(block_creator::uid(), "bc", block_creator_data()).await;

    let mut other = block_creator_data();
    other["rpcPort"] = json!(1);
    let second = h
        .robot
        .find_or_create(&block_creator::uid(), "bc", other)
        .await
        .unwrap();

    assert_eq!(guid(&first).await, guid(&second).await);
    assert_eq!(data(&second).await["rpcPort"], 23112);
}

#[tfchain_macros::test]
async fn get_missing_service(h: Harness) {
    let Err(err) = h.get(explorer::uid(), "nope").await else {
        panic!("found a service that was never created");
    };

    assert_eq!(
        err.downcast_ref::<ServiceNotFoundError>(),
        Some(&ServiceNotFoundError {
            template: "explorer".into(),
            name: "nope".into(),
        })
    );
}

#[tfchain_macros::test]
async fn delete_uninstalls_and_forgets(h: Harness) {
    let service = h.create(coredns::uid(), "dns", coredns_data()).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();

    h.robot.delete(&coredns::uid(), "dns").await.unwrap();

    assert!(state(&service).await.to_map().is_empty());
    assert!(h.get(coredns::uid(), "dns").await.is_err());
    assert!(h.robot.delete(&coredns::uid(), "dns").await.is_err());
}

#[tfchain_macros::test]
async fn services_survive_save_and_load(h: Harness) {
    let service = h.create(explorer::uid(), "explorer", explorer_data()).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();
    let bc_name = act(&service, "block_creator").await.unwrap();
    let bc_name = bc_name.as_str().unwrap();
    let bc = h.get(block_creator::uid(), bc_name).await.unwrap();
    let seed = data(&bc).await["walletSeed"].clone();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("services.yaml");
    h.robot.save(&path).await.unwrap();

    let restored = Harness::new();
    assert_eq!(restored.robot.load(&path).await.unwrap(), 2);

    let explorer = restored.get(explorer::uid(), "explorer").await.unwrap();
    assert_eq!(guid(&explorer).await, guid(&service).await);
    assert!(state(&explorer).await.is_ok(flags::START));
    assert_eq!(act(&explorer, "block_creator").await.unwrap(), json!(bc_name));

    let bc = restored.get(block_creator::uid(), bc_name).await.unwrap();
    let s = state(&bc).await;
    assert!(s.is_ok(flags::WALLET_INIT));
    assert!(s.is_ok(flags::RUNNING));
    assert_eq!(data(&bc).await["walletSeed"], seed);
    assert_eq!(data(&bc).await["hostRpcPort"], 23000);
}

#[tfchain_macros::test]
async fn records_are_yaml(h: Harness) {
    let service = h.create(geth::uid(), "geth", geth_data()).await;
    act(&service, "install").await.unwrap();

    let yaml = serde_yaml::to_string(&h.robot.records().await.unwrap()).unwrap();

    assert!(yaml.contains("template: github.com/threefoldfoundation/tfchain-templates/geth/0.0.2"));
    assert!(yaml.contains("name: geth"));
    assert!(yaml.contains("install: ok"));
}

#[tfchain_macros::test]
async fn load_rejects_unknown_templates(h: Harness) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("services.yaml");
    std::fs::write(
        &path,
        "- template: github.com/example/templates/nginx/0.0.1\n  name: web\n  guid: abc\n  data: {}\n",
    )
    .unwrap();

    assert!(h.robot.load(&path).await.is_err());
    assert!(h.robot.list().await.is_empty());
}
