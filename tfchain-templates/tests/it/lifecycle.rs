use serde_json::{json, Value};
use tfchain_templates::{
    error::{SalError, StateCheckError, UnknownActionError},
    sal::memory::Operation,
    services::{block_creator, bridged, coredns, explorer, faucet, geth, status_reporter, TFCHAIN_FLIST},
    state::{flags, Category},
    uid::TemplateUid,
};

use crate::{
    act, block_creator_data, bridged_data, container_name, coredns_data, data, explorer_data, faucet_data,
    geth_data, state, status_reporter_data, Harness,
};

fn every_template() -> Vec<(TemplateUid, Value)> {
    vec![
        (block_creator::uid(), block_creator_data()),
        (bridged::uid(), bridged_data()),
        (coredns::uid(), coredns_data()),
        (explorer::uid(), explorer_data()),
        (faucet::uid(), faucet_data()),
        (geth::uid(), geth_data()),
        (status_reporter::uid(), status_reporter_data()),
    ]
}

#[tfchain_macros::test]
async fn start_requires_install(h: Harness) {
    for (template, data) in every_template() {
        let service = h.create(template.clone(), "svc", data).await;

        let err = act(&service, "start").await.unwrap_err();

        let err = err
            .downcast_ref::<StateCheckError>()
            .unwrap_or_else(|| panic!("{}: {err:#}", template.name));
        assert_eq!(err.category, Category::Actions);
        assert_eq!(err.tag, "install");
        assert!(!state(&service).await.is_ok(flags::RUNNING));
    }
    assert!(h.node.created().is_empty());
}

#[tfchain_macros::test]
async fn uninstall_without_install_is_harmless(h: Harness) {
    for (template, data) in every_template() {
        let service = h.create(template.clone(), "svc", data).await;

        act(&service, "uninstall")
            .await
            .unwrap_or_else(|e| panic!("{}: {e:#}", template.name));

        assert!(state(&service).await.to_map().is_empty(), "{}", template.name);
    }
}

#[tfchain_macros::test]
async fn stop_without_start_is_harmless(h: Harness) {
    for (template, data) in every_template() {
        let service = h.create(template.clone(), "svc", data).await;
        act(&service, "install").await.unwrap();

        act(&service, "stop")
            .await
            .unwrap_or_else(|e| panic!("{}: {e:#}", template.name));

        let state = state(&service).await;
        assert!(state.is_ok(flags::INSTALL), "{}", template.name);
        assert!(!state.is_ok(flags::RUNNING), "{}", template.name);
    }
}

#[tfchain_macros::test]
async fn stop_clears_running_and_start(h: Harness) {
    for (template, data) in every_template() {
        let service = h.create(template.clone(), "svc", data).await;
        act(&service, "install").await.unwrap();
        act(&service, "start")
            .await
            .unwrap_or_else(|e| panic!("{}: {e:#}", template.name));
        assert!(state(&service).await.is_ok(flags::RUNNING), "{}", template.name);

        act(&service, "stop").await.unwrap();

        let state = state(&service).await;
        assert_eq!(state.get(flags::RUNNING), None, "{}", template.name);
        assert_eq!(state.get(flags::START), None, "{}", template.name);
        assert_eq!(state.get(flags::WALLET_INIT), None, "{}", template.name);
        assert!(state.is_ok(flags::INSTALL), "{}", template.name);
    }
}

#[tfchain_macros::test]
async fn install_start_stop_uninstall(h: Harness) {
    let service = h.create(block_creator::uid(), "bc", block_creator_data()).await;

    act(&service, "install").await.unwrap();
    assert!(state(&service).await.is_ok(flags::INSTALL));

    act(&service, "start").await.unwrap();
    let s = state(&service).await;
    for flag in [flags::INSTALL, flags::RUNNING, flags::START, flags::WALLET_INIT] {
        assert!(s.is_ok(flag), "{flag} not set");
    }

    act(&service, "stop").await.unwrap();
    let s = state(&service).await;
    assert!(s.is_ok(flags::INSTALL));
    for flag in [flags::RUNNING, flags::START, flags::WALLET_INIT] {
        assert_eq!(s.get(flag), None, "{flag} survived stop");
    }
    assert!(!h.node.is_running(&container_name(&service).await));

    act(&service, "uninstall").await.unwrap();
    assert!(state(&service).await.to_map().is_empty());
}

#[tfchain_macros::test]
async fn upgrade_switches_image_and_restarts(h: Harness) {
    let service = h.create(block_creator::uid(), "bc", block_creator_data()).await;
    let name = container_name(&service).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();
    assert_eq!(h.node.last_created(&name).unwrap().flist, TFCHAIN_FLIST);

    let image = "https://hub.grid.tf/tf-autobuilder/tfchain-1.2.flist";
    service
        .lock()
        .await
        .action("upgrade", json!({"image": image}))
        .await
        .unwrap();

    assert_eq!(h.node.stopped(), vec![name.clone()]);
    assert_eq!(h.node.created().len(), 2);
    assert_eq!(h.node.last_created(&name).unwrap().flist, image);
    assert_eq!(data(&service).await["tfchainFlist"], image);
    assert!(state(&service).await.is_ok(flags::START));
}

#[tfchain_macros::test]
async fn upgrade_without_image_keeps_it(h: Harness) {
    let service = h.create(geth::uid(), "geth", geth_data()).await;
    let name = container_name(&service).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();

    for args in [Value::Null, json!({"image": ""})] {
        service.lock().await.action("upgrade", args).await.unwrap();
    }

    let created = h.node.created();
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|spec| spec.name == name));
    assert!(created.iter().all(|spec| spec.flist == created[0].flist));
}

#[tfchain_macros::test]
async fn failed_upgrade_leaves_the_service_stopped(h: Harness) {
    let service = h.create(bridged::uid(), "bridged", bridged_data()).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();

    h.node
        .fail_next(Operation::CreateContainer, SalError::Busy("node".into()));
    let err = act(&service, "upgrade").await.unwrap_err();

    assert_eq!(err.downcast_ref::<SalError>(), Some(&SalError::Busy("node".into())));
    let s = state(&service).await;
    assert!(s.is_ok(flags::INSTALL));
    assert!(!s.is_ok(flags::RUNNING));
    assert!(!s.is_ok(flags::START));
}

#[tfchain_macros::test]
async fn unknown_actions_are_rejected(h: Harness) {
    let service = h.create(coredns::uid(), "dns", coredns_data()).await;

    let err = act(&service, "reboot").await.unwrap_err();

    let err = err.downcast_ref::<UnknownActionError>().unwrap();
    assert_eq!(err.template, "coredns3bot");
    assert_eq!(err.action, "reboot");
}
