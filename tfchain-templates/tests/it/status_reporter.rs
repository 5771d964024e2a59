use std::time::Duration;

use serde_json::json;
use tfchain_templates::{
    error::SalError,
    host::ServiceHandle,
    sal::memory::Operation,
    services::{block_creator, status_reporter},
    state::flags,
};

use crate::{act, block_creator_data, state, status_reporter_data, Harness};

const POST_URL: &str = "http://127.0.0.1:4567/blockcreators/5/";
const INTERVAL: Duration = Duration::from_secs(300);

async fn block_creator(h: &Harness) -> ServiceHandle {
    let service = h.create(block_creator::uid(), "bc", block_creator_data()).await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();
    service
}

async fn reporter(h: &Harness) -> ServiceHandle {
    let service = h
        .create(status_reporter::uid(), "reporter", status_reporter_data())
        .await;
    act(&service, "install").await.unwrap();
    act(&service, "start").await.unwrap();
    service
}

#[tfchain_macros::test]
async fn publishes_the_report_every_interval(h: Harness) {
    block_creator(&h).await;
    let service = reporter(&h).await;
    assert!(state(&service).await.is_ok(flags::RUNNING));

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;

    let requests = h.http.requests();
    assert_eq!(requests.len(), 1);
    let (url, report) = &requests[0];
    assert_eq!(url, POST_URL);
    assert_eq!(report["network"], "testnet");
    assert_eq!(report["connected_peers"], 0);
    assert_eq!(report["wallet_status"], "unlocked");

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(h.http.requests().len(), 2);
}

#[tfchain_macros::test]
async fn stopped_reporter_stays_quiet(h: Harness) {
    block_creator(&h).await;
    let service = reporter(&h).await;
    act(&service, "stop").await.unwrap();

    tokio::time::sleep(INTERVAL * 2).await;

    assert!(h.http.requests().is_empty());
}

#[tfchain_macros::test]
async fn report_now(h: Harness) {
    block_creator(&h).await;
    let service = reporter(&h).await;

    act(&service, "report_now").await.unwrap();

    assert_eq!(h.http.requests().len(), 1);
}

#[tfchain_macros::test]
async fn failures_are_not_fatal(h: Harness) {
    let service = reporter(&h).await;

    // No block creator yet.
    act(&service, "report_now").await.unwrap();
    assert!(h.http.requests().is_empty());

    // A block creator that is not running cannot report.
    let bc = h.create(block_creator::uid(), "bc", block_creator_data()).await;
    act(&bc, "install").await.unwrap();
    act(&service, "report_now").await.unwrap();
    assert!(h.http.requests().is_empty());

    act(&bc, "start").await.unwrap();
    act(&service, "report_now").await.unwrap();
    assert_eq!(h.http.requests().len(), 1);
}

#[tfchain_macros::test]
async fn report_carries_node_info_and_stats(h: Harness) {
    block_creator(&h).await;
    let service = reporter(&h).await;
    h.node.set_stats(
        json!({
            "cpu.percent": {"history": {"300": 12.5, "3600": 9.0}},
            "mem.available": {"history": {"300": 2048}},
            "disk.iops": {"history": {"3600": 4}},
        })
        .as_object()
        .cloned()
        .unwrap(),
    );

    act(&service, "report_now").await.unwrap();

    let requests = h.http.requests();
    let report = &requests[0].1;
    assert_eq!(report["node_info"]["hostname"], "local");
    assert_eq!(
        report["node_stats"],
        json!({"cpu.percent": 12.5, "mem.available": 2048, "disk.iops": null})
    );
    assert_eq!(report["network"], "testnet");
}

#[tfchain_macros::test]
async fn unreadable_node_stats_skip_the_report(h: Harness) {
    block_creator(&h).await;
    let service = reporter(&h).await;
    h.node
        .fail_next(Operation::NodeStats, SalError::Busy("node".into()));

    act(&service, "report_now").await.unwrap();
    assert!(h.http.requests().is_empty());

    act(&service, "report_now").await.unwrap();
    assert_eq!(h.http.requests().len(), 1);
}
