//! LE scanning and advertising.

mod support;

use blued_sil::events::AdapterEvent;
use blued_sil::fake::FakeCall;
use blued_sil::types::DeviceProperty;
use serde_json::json;

use support::{ADAPTER, addr};

fn le_found(scan_id: u32, device: &str) -> AdapterEvent {
    AdapterEvent::LeDeviceFound {
        scan_id,
        properties: vec![DeviceProperty::Address(addr(device))],
    }
}

#[tokio::test]
async fn scan_filters_are_independent() {
    let harness = support::start().await;

    let (first, mut heart_rate) = harness
        .subscribe(
            "/le",
            "startScan",
            json!({"subscribe": true, "serviceUuid": {"uuid": "180d"}}),
        )
        .await;
    assert_eq!(first["returnValue"], json!(true));

    let (_, mut vendor) = harness
        .subscribe_from(
            "/le",
            "startScan",
            json!({"subscribe": true, "manufacturerData": {"id": 76}}),
            "com.test.other",
        )
        .await;

    // The stack matched a heart-rate advertiser against filter 1 only.
    harness
        .fake
        .emit_adapter(addr(ADAPTER), le_found(1, "c0:00:00:00:00:01"));
    let update = heart_rate.next().await;
    assert_eq!(update["devices"][0]["address"], json!("c0:00:00:00:00:01"));
    vendor.assert_silent().await;

    // A vendor beacon matched filter 2 only.
    harness
        .fake
        .emit_adapter(addr(ADAPTER), le_found(2, "c0:00:00:00:00:02"));
    let update = vendor.next().await;
    assert_eq!(update["devices"][0]["address"], json!("c0:00:00:00:00:02"));
    heart_rate.assert_silent().await;

    // A device passing both filters reaches both subscribers.
    harness
        .fake
        .emit_adapter(addr(ADAPTER), le_found(1, "c0:00:00:00:00:03"));
    harness
        .fake
        .emit_adapter(addr(ADAPTER), le_found(2, "c0:00:00:00:00:03"));
    let update = heart_rate.next().await;
    assert_eq!(update["devices"].as_array().expect("devices").len(), 2);
    let update = vendor.next().await;
    assert_eq!(update["devices"].as_array().expect("devices").len(), 2);
}

#[tokio::test]
async fn le_discovery_is_refcounted_by_scan_filters() {
    let harness = support::start().await;

    let (_, first_scan) = harness
        .subscribe("/le", "startScan", json!({"subscribe": true}))
        .await;
    let calls = harness.fake.take_calls();
    assert!(calls.contains(&FakeCall::AddLeDiscoveryFilter(addr(ADAPTER), 1)));
    assert!(calls.contains(&FakeCall::StartLeDiscovery(addr(ADAPTER))));
    assert!(calls.contains(&FakeCall::MatchLeDiscoveryFilterDevices(addr(ADAPTER), 1)));

    let (_, second_scan) = harness
        .subscribe_from(
            "/le",
            "startScan",
            json!({"subscribe": true}),
            "com.test.other",
        )
        .await;
    // The engine is already running; only the filter is added.
    let calls = harness.fake.take_calls();
    assert!(calls.contains(&FakeCall::AddLeDiscoveryFilter(addr(ADAPTER), 2)));
    assert!(!calls.contains(&FakeCall::StartLeDiscovery(addr(ADAPTER))));

    first_scan.drop_client();
    support::settle().await;
    let calls = harness.fake.take_calls();
    assert!(calls.contains(&FakeCall::RemoveLeDiscoveryFilter(addr(ADAPTER), 1)));
    assert!(!calls.contains(&FakeCall::CancelLeDiscovery(addr(ADAPTER))));

    // Dropping the last filter stops the shared engine.
    second_scan.drop_client();
    support::settle().await;
    let calls = harness.fake.take_calls();
    assert!(calls.contains(&FakeCall::RemoveLeDiscoveryFilter(addr(ADAPTER), 2)));
    assert!(calls.contains(&FakeCall::CancelLeDiscovery(addr(ADAPTER))));
}

#[tokio::test]
async fn dropped_scan_subscriber_releases_its_filter() {
    let harness = support::start().await;

    let (_, scan) = harness
        .subscribe("/le", "startScan", json!({"subscribe": true}))
        .await;
    scan.drop_client();
    support::settle().await;

    let calls = harness.fake.calls();
    assert!(calls.contains(&FakeCall::RemoveLeDiscoveryFilter(addr(ADAPTER), 1)));
    assert!(calls.contains(&FakeCall::CancelLeDiscovery(addr(ADAPTER))));
}

#[tokio::test]
async fn advertising_lifecycle() {
    let harness = support::start().await;

    let (first, advertiser) = harness
        .subscribe(
            "/le",
            "startAdvertising",
            json!({
                "subscribe": true,
                "advertiseData": {"manufacturerData": [76, 0, 2, 21]},
            }),
        )
        .await;
    assert_eq!(first["returnValue"], json!(true));
    assert_eq!(first["advertiserId"], json!(1));
    let calls = harness.fake.calls();
    assert!(calls.contains(&FakeCall::RegisterAdvertiser(addr(ADAPTER), 1)));
    assert!(calls.contains(&FakeCall::StartAdvertising(addr(ADAPTER), 1)));

    let reply = harness.call("/le", "getStatus", json!({})).await;
    assert_eq!(reply["advertising"], json!(true));

    // Losing the subscriber disables, then unregisters the advertiser.
    advertiser.drop_client();
    support::settle().await;
    let calls = harness.fake.calls();
    assert!(calls.contains(&FakeCall::DisableAdvertiser(addr(ADAPTER), 1)));
    assert!(calls.contains(&FakeCall::UnregisterAdvertiser(addr(ADAPTER), 1)));

    let reply = harness.call("/le", "getStatus", json!({})).await;
    assert_eq!(reply["advertising"], json!(false));
}

#[tokio::test]
async fn oversized_advertise_data_is_rejected() {
    let harness = support::start().await;

    let reply = harness
        .call(
            "/le",
            "startAdvertising",
            json!({
                "subscribe": true,
                "advertiseData": {"manufacturerData": (0..27).collect::<Vec<u8>>()},
            }),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(284));
}

#[tokio::test]
async fn update_advertising_touches_only_supplied_parts() {
    let harness = support::start().await;

    let (_, _advertiser) = harness
        .subscribe("/le", "startAdvertising", json!({"subscribe": true}))
        .await;
    harness.fake.take_calls();

    let reply = harness
        .call(
            "/le",
            "updateAdvertising",
            json!({
                "advertiserId": 1,
                "scanResponse": {"includeTxPower": true},
            }),
        )
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert_eq!(reply["advertiserId"], json!(1));

    let calls = harness.fake.calls();
    assert!(calls.contains(&FakeCall::SetAdvertiserData(addr(ADAPTER), 1, true)));
    assert!(!calls.contains(&FakeCall::SetAdvertiserParameters(addr(ADAPTER), 1)));
}

#[tokio::test]
async fn disable_advertising_notifies_the_subscriber() {
    let harness = support::start().await;

    let (_, mut advertiser) = harness
        .subscribe("/le", "startAdvertising", json!({"subscribe": true}))
        .await;

    let reply = harness
        .call("/le", "disableAdvertising", json!({"advertiserId": 1}))
        .await;
    assert_eq!(reply["returnValue"], json!(true));

    let last = advertiser.next().await;
    assert_eq!(last["subscribed"], json!(false));
    assert_eq!(last["advertiserId"], json!(1));
}
