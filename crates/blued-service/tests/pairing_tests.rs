//! Pairing flows: outgoing, incoming, secrets and cancellation.

mod support;

use blued_service::DaemonConfig;
use blued_sil::events::AdapterEvent;
use blued_sil::fake::FakeCall;
use blued_sil::types::{AdapterProperty, PairingIoCapability, PairingSecret};
use serde_json::json;

use support::{ADAPTER, DEVICE, addr};

#[tokio::test]
async fn outgoing_pairing_walks_the_two_step_flow() {
    let harness = support::start().await;
    harness.add_device(DEVICE, "Headphones").await;

    // Keep the stack-side pair call pending so prompts can arrive.
    harness.fake.park("pair");

    let (first, mut pairing) = harness
        .subscribe(
            "/adapter",
            "pair",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    assert_eq!(first["subscribed"], json!(true));
    assert_eq!(first["returnValue"], json!(true));
    support::settle().await;

    // Discovery is canceled before the stack pair call goes out.
    let calls = harness.fake.calls();
    let cancel_at = calls
        .iter()
        .position(|call| *call == FakeCall::CancelDiscovery(addr(ADAPTER)))
        .expect("discovery canceled");
    let pair_at = calls
        .iter()
        .position(|call| *call == FakeCall::Pair(addr(ADAPTER), addr(DEVICE)))
        .expect("pair issued");
    assert!(cancel_at < pair_at);

    harness.fake.emit_adapter(
        addr(ADAPTER),
        AdapterEvent::PairingPasskeyDisplayed {
            address: addr(DEVICE),
            passkey: 123_456,
        },
    );
    let prompt = pairing.next().await;
    assert_eq!(prompt["request"], json!("displayPasskey"));
    assert_eq!(prompt["passkey"], json!(123_456));
    assert_eq!(prompt["address"], json!(DEVICE));

    harness.fake.release("pair");
    let end = pairing.next().await;
    assert_eq!(end["request"], json!("endPairing"));
    assert_eq!(end["returnValue"], json!(true));
    assert_eq!(end["subscribed"], json!(false));
}

#[tokio::test]
async fn pairing_state_is_reflected_in_adapter_status() {
    let harness = support::start().await;
    harness.add_device(DEVICE, "Headphones").await;
    let (_, mut status) = harness
        .subscribe("/adapter", "getStatus", json!({"subscribe": true}))
        .await;

    harness.fake.park("pair");
    let (_, _pairing) = harness
        .subscribe(
            "/adapter",
            "pair",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;

    let update = status.next().await;
    assert_eq!(update["adapters"][0]["pairing"], json!(true));

    harness.fake.release("pair");
    let update = status.next().await;
    assert_eq!(update["adapters"][0]["pairing"], json!(false));
}

#[tokio::test]
async fn second_pair_while_pairing_is_rejected() {
    let harness = support::start().await;
    harness.add_device(DEVICE, "Headphones").await;
    harness.add_device("aa:bb:cc:dd:ee:02", "Speaker").await;

    harness.fake.park("pair");
    let (_, _pairing) = harness
        .subscribe(
            "/adapter",
            "pair",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    support::settle().await;

    let reply = harness
        .call_from(
            "/adapter",
            "pair",
            json!({"address": "aa:bb:cc:dd:ee:02", "subscribe": true}),
            "com.test.other",
        )
        .await;
    assert_eq!(reply["errorCode"], json!(104));
    harness.fake.release("pair");
}

#[tokio::test]
async fn pairing_an_unknown_device_fails() {
    let harness = support::start().await;

    let reply = harness
        .call(
            "/adapter",
            "pair",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(106));
}

#[tokio::test]
async fn supplying_a_secret_without_pairing_fails() {
    let harness = support::start().await;
    harness.add_device(DEVICE, "Headphones").await;

    let reply = harness
        .call(
            "/adapter",
            "supplyPasskey",
            json!({"address": DEVICE, "passkey": 123456}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(108));
}

#[tokio::test]
async fn supplying_a_secret_for_another_address_fails() {
    let harness = support::start().await;
    harness.add_device(DEVICE, "Headphones").await;
    harness.add_device("aa:bb:cc:dd:ee:02", "Speaker").await;

    harness.fake.park("pair");
    let (_, _pairing) = harness
        .subscribe(
            "/adapter",
            "pair",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    support::settle().await;

    let reply = harness
        .call(
            "/adapter",
            "supplyPasskey",
            json!({"address": "aa:bb:cc:dd:ee:02", "passkey": 1}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(197));

    let reply = harness
        .call(
            "/adapter",
            "supplyPasskey",
            json!({"address": DEVICE, "passkey": 123456}),
        )
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness.fake.calls().contains(&FakeCall::SupplyPairingSecret(
        addr(ADAPTER),
        addr(DEVICE),
        PairingSecret::Passkey(123_456),
    )));
    harness.fake.release("pair");
}

#[tokio::test]
async fn await_pairing_requests_allows_one_listener() {
    let harness = support::start().await;

    let (first, _listener) = harness
        .subscribe("/adapter", "awaitPairingRequests", json!({"subscribe": true}))
        .await;
    assert_eq!(first["subscribed"], json!(true));

    // A different caller is turned away...
    let reply = harness
        .call_from(
            "/adapter",
            "awaitPairingRequests",
            json!({"subscribe": true}),
            "com.test.other",
        )
        .await;
    assert_eq!(reply["errorCode"], json!(104));

    // ...while the same caller may renew its subscription.
    let (renewed, _listener2) = harness
        .subscribe("/adapter", "awaitPairingRequests", json!({"subscribe": true}))
        .await;
    assert_eq!(renewed["subscribed"], json!(true));
}

#[tokio::test]
async fn incoming_pairing_rides_the_await_subscription() {
    let harness = support::start().await;
    harness.add_device(DEVICE, "Phone").await;

    let (_, mut listener) = harness
        .subscribe("/adapter", "awaitPairingRequests", json!({"subscribe": true}))
        .await;

    harness.fake.emit_adapter(
        addr(ADAPTER),
        AdapterEvent::PairingConfirmationRequested {
            address: addr(DEVICE),
            passkey: 654_321,
        },
    );

    let incoming = listener.next().await;
    assert_eq!(incoming["request"], json!("incomingPairRequest"));
    assert_eq!(incoming["address"], json!(DEVICE));
    assert_eq!(incoming["name"], json!("Phone"));

    let prompt = listener.next().await;
    assert_eq!(prompt["request"], json!("confirmPasskey"));
    assert_eq!(prompt["passkey"], json!(654_321));

    let reply = harness
        .call(
            "/adapter",
            "supplyPasskeyConfirmation",
            json!({"address": DEVICE, "accept": true}),
        )
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::SupplyPairingConfirmation(
            addr(ADAPTER),
            addr(DEVICE),
            true,
        )));

    // The incoming subscription stays open after the confirmation.
    harness.fake.emit_adapter(
        addr(ADAPTER),
        AdapterEvent::PairingConfirmationRequested {
            address: addr(DEVICE),
            passkey: 111_111,
        },
    );
    let incoming = listener.next().await;
    assert_eq!(incoming["request"], json!("incomingPairRequest"));
}

#[tokio::test]
async fn cancel_pairing_reports_pairing_canceled() {
    let harness = support::start().await;
    harness.add_device(DEVICE, "Headphones").await;

    harness.fake.park("pair");
    let (_, mut pairing) = harness
        .subscribe(
            "/adapter",
            "pair",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    support::settle().await;

    let reply = harness
        .call("/adapter", "cancelPairing", json!({"address": DEVICE}))
        .await;
    assert_eq!(reply["returnValue"], json!(true));

    let end = pairing.next().await;
    assert_eq!(end["request"], json!("endPairing"));
    assert_eq!(end["returnValue"], json!(false));
    assert_eq!(end["errorCode"], json!(107));
    assert_eq!(end["subscribed"], json!(false));
    harness.fake.release("pair");
}

#[tokio::test]
async fn cancel_pairing_for_another_address_fails() {
    let harness = support::start().await;
    harness.add_device(DEVICE, "Headphones").await;
    harness.add_device("aa:bb:cc:dd:ee:02", "Speaker").await;

    harness.fake.park("pair");
    let (_, _pairing) = harness
        .subscribe(
            "/adapter",
            "pair",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    support::settle().await;

    let reply = harness
        .call(
            "/adapter",
            "cancelPairing",
            json!({"address": "aa:bb:cc:dd:ee:02"}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(197));
    harness.fake.release("pair");
}

#[tokio::test]
async fn client_loss_aborts_an_outgoing_pairing() {
    let harness = support::start().await;
    harness.add_device(DEVICE, "Headphones").await;

    harness.fake.park("pair");
    let (_, pairing) = harness
        .subscribe(
            "/adapter",
            "pair",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    support::settle().await;

    pairing.drop_client();
    support::settle().await;

    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::CancelPairing(addr(ADAPTER), addr(DEVICE))));

    let reply = harness.call("/adapter", "getStatus", json!({})).await;
    assert_eq!(reply["adapters"][0]["pairing"], json!(false));
    harness.fake.release("pair");
}

#[tokio::test]
async fn pairable_timeout_tears_down_the_incoming_subscription() {
    let config = DaemonConfig {
        pairing_io_capability: PairingIoCapability::DisplayYesNo,
        ..DaemonConfig::default()
    };
    let harness = support::start_with(config).await;

    let (_, mut listener) = harness
        .subscribe("/adapter", "awaitPairingRequests", json!({"subscribe": true}))
        .await;

    // The stack flips pairable off when the pairable timeout expires.
    harness.fake.emit_adapter(
        addr(ADAPTER),
        AdapterEvent::PropertiesChanged(vec![AdapterProperty::Pairable(false)]),
    );

    let dropped = listener.next().await;
    assert_eq!(dropped["errorCode"], json!(126));
    assert_eq!(dropped["subscribed"], json!(false));
}
