use serde_json::json;
use tfchain_templates::{
    sal::PortForward,
    services::{coredns, COREDNS_FLIST},
    state::flags,
};

use crate::{act, container_name, coredns_data, state, Harness};

#[tfchain_macros::test]
async fn zone_must_be_fully_qualified(h: Harness) {
    let Err(err) = h
        .robot
        .create(&coredns::uid(), "dns", json!({"zone": "grid.tf"}))
        .await
    else {
        panic!("created a coredns without a trailing dot in its zone");
    };

    assert!(err.to_string().contains("grid.tf"));
    assert!(h.get(coredns::uid(), "dns").await.is_err());
}

#[tfchain_macros::test]
async fn start_serves_the_zone(h: Harness) {
    let service = h.create(coredns::uid(), "dns", coredns_data()).await;
    act(&service, "install").await.unwrap();

    act(&service, "start").await.unwrap();

    let spec = h.node.last_created(&container_name(&service).await).unwrap();
    assert_eq!(spec.flist, COREDNS_FLIST);
    assert_eq!(spec.ports, vec![PortForward::udp(53, 53)]);
    assert_eq!(spec.env["COREDNS_PORT"], "53");
    assert!(spec.mounts.is_empty());
    let corefile = &spec.files["/Corefile"];
    assert!(corefile.contains("threebot grid.tf. {"));
    assert!(corefile.contains("explorer https://explorer.threefoldtoken.com"));
    assert!(state(&service).await.is_ok(flags::RUNNING));
}

#[tfchain_macros::test]
async fn custom_port_and_no_explorers(h: Harness) {
    let service = h
        .create(coredns::uid(), "dns", json!({"zone": "grid.tf.", "dnsPort": 5353}))
        .await;
    act(&service, "install").await.unwrap();

    act(&service, "start").await.unwrap();

    let spec = h.node.last_created(&container_name(&service).await).unwrap();
    assert_eq!(spec.ports, vec![PortForward::udp(53, 5353)]);
    assert_eq!(spec.env["COREDNS_PORT"], "5353");
    assert!(spec.files.is_empty());
}

#[tfchain_macros::test]
async fn corefile_action(h: Harness) {
    let service = h.create(coredns::uid(), "dns", coredns_data()).await;

    let corefile = act(&service, "corefile").await.unwrap();

    assert!(corefile.as_str().unwrap().contains("forward . 8.8.8.8 9.9.9.9"));
}

#[tfchain_macros::test]
async fn uninstall_stops_the_container(h: Harness) {
    let service = h.create(coredns::uid(), "dns", coredns_data()).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();

    act(&service, "uninstall").await.unwrap();

    assert!(!h.node.is_running(&container_name(&service).await));
    assert!(state(&service).await.to_map().is_empty());
}
