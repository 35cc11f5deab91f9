//! The common profile contract, exercised through A2DP.

mod support;

use blued_sil::fake::FakeCall;
use blued_sil::types::ProfileId;
use blued_sil::SilError;
use serde_json::json;

use support::{DEVICE, addr};

async fn a2dp_harness() -> support::Harness {
    let harness = support::start().await;
    harness.power_on().await;
    harness.add_device(DEVICE, "Speaker").await;
    harness
}

#[tokio::test]
async fn connect_reports_connecting_before_connected() {
    let harness = a2dp_harness().await;

    let (_, mut status) = harness
        .subscribe(
            "/a2dp",
            "getStatus",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;

    let (first, _connection) = harness
        .subscribe(
            "/a2dp",
            "connect",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    assert_eq!(first["returnValue"], json!(true));
    assert_eq!(first["subscribed"], json!(true));

    // The connecting flag goes out strictly before connected=true.
    let connecting = status.next().await;
    assert_eq!(connecting["connecting"], json!(true));
    assert_eq!(connecting["connected"], json!(false));

    harness
        .profile_connected(ProfileId::A2dp, DEVICE, true)
        .await;
    let connected = status.next().await;
    assert_eq!(connected["connected"], json!(true));
    assert_eq!(connected["connecting"], json!(false));
}

#[tokio::test]
async fn connect_rejects_unknown_devices_and_double_connects() {
    let harness = a2dp_harness().await;

    let reply = harness
        .call("/a2dp", "connect", json!({"address": "aa:bb:cc:dd:ee:99"}))
        .await;
    assert_eq!(reply["errorCode"], json!(106));

    harness
        .fake
        .set_profile_connected(ProfileId::A2dp, addr(DEVICE), true);
    let reply = harness
        .call("/a2dp", "connect", json!({"address": DEVICE}))
        .await;
    assert_eq!(reply["errorCode"], json!(131));
}

#[tokio::test]
async fn connect_in_flight_rejects_a_second_attempt() {
    let harness = a2dp_harness().await;
    harness.fake.park("connect");

    // The first reply only arrives once the stack call resolves, so
    // submit without waiting and probe while the call is parked.
    let mut connection = harness.submit(
        "/a2dp",
        "connect",
        json!({"address": DEVICE, "subscribe": true}),
    );
    support::settle().await;

    let second = harness
        .call_from(
            "/a2dp",
            "connect",
            json!({"address": DEVICE}),
            "com.test.other",
        )
        .await;
    assert_eq!(second["errorCode"], json!(128));

    harness.fake.release("connect");
    let first = connection.next().await;
    assert_eq!(first["returnValue"], json!(true));
}

#[tokio::test]
async fn stack_connect_failure_unmarks_connecting() {
    let harness = a2dp_harness().await;
    harness.fake.fail_next("connect", SilError::Failed);

    let reply = harness
        .call("/a2dp", "connect", json!({"address": DEVICE}))
        .await;
    assert_eq!(reply["returnValue"], json!(false));
    assert_eq!(reply["errorCode"], json!(SilError::Failed.code()));

    // The connecting slot is free again.
    let reply = harness
        .call("/a2dp", "getStatus", json!({"address": DEVICE}))
        .await;
    assert_eq!(reply["connecting"], json!(false));
}

#[tokio::test]
async fn local_disconnect_is_not_remote() {
    let harness = a2dp_harness().await;

    let (_, mut connection) = harness
        .subscribe(
            "/a2dp",
            "connect",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    harness
        .profile_connected(ProfileId::A2dp, DEVICE, true)
        .await;

    let reply = harness
        .call("/a2dp", "disconnect", json!({"address": DEVICE}))
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::ProfileDisconnect(ProfileId::A2dp, addr(DEVICE))));

    let teardown = connection.next().await;
    assert_eq!(teardown["subscribed"], json!(false));
    assert_eq!(teardown["disconnectByRemote"], json!(false));
}

#[tokio::test]
async fn remote_disconnect_is_flagged_as_remote() {
    let harness = a2dp_harness().await;

    let (_, mut connection) = harness
        .subscribe(
            "/a2dp",
            "connect",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    harness
        .profile_connected(ProfileId::A2dp, DEVICE, true)
        .await;

    // The stack reports the link dropping without a local disconnect.
    harness
        .profile_connected(ProfileId::A2dp, DEVICE, false)
        .await;

    let teardown = connection.next().await;
    assert_eq!(teardown["subscribed"], json!(false));
    assert_eq!(teardown["disconnectByRemote"], json!(true));
}

#[tokio::test]
async fn disconnect_requires_a_connection() {
    let harness = a2dp_harness().await;

    let reply = harness
        .call("/a2dp", "disconnect", json!({"address": DEVICE}))
        .await;
    assert_eq!(reply["errorCode"], json!(136));
}

#[tokio::test]
async fn client_loss_disconnects_the_profile() {
    let harness = a2dp_harness().await;

    let (_, connection) = harness
        .subscribe(
            "/a2dp",
            "connect",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    harness
        .profile_connected(ProfileId::A2dp, DEVICE, true)
        .await;

    connection.drop_client();
    support::settle().await;

    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::ProfileDisconnect(ProfileId::A2dp, addr(DEVICE))));
}

#[tokio::test]
async fn every_structural_profile_serves_the_contract() {
    let harness = support::start().await;
    harness.power_on().await;
    harness.add_device(DEVICE, "Peer").await;

    for category in ["/gatt", "/pbap", "/map", "/hfp", "/pan", "/hid", "/spp", "/mesh"] {
        let reply = harness
            .call(category, "getStatus", json!({"address": DEVICE}))
            .await;
        assert_eq!(
            reply["returnValue"],
            json!(true),
            "getStatus failed for {category}"
        );
        assert_eq!(reply["connected"], json!(false));
    }
}

#[tokio::test]
async fn roles_enable_and_disable_sequentially() {
    let harness = a2dp_harness().await;

    let reply = harness
        .call("/a2dp", "enable", json!({"role": "A2DP_SRC"}))
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness.fake.calls().contains(&FakeCall::EnableRole(
        ProfileId::A2dp,
        ProfileId::A2dp.uuids()[0].to_owned(),
    )));

    let reply = harness
        .call("/a2dp", "enable", json!({"role": "A2DP_SRC"}))
        .await;
    assert_eq!(reply["errorCode"], json!(248));

    let reply = harness
        .call("/a2dp", "disable", json!({"role": "A2DP_SRC"}))
        .await;
    assert_eq!(reply["returnValue"], json!(true));

    let reply = harness
        .call("/a2dp", "disable", json!({"role": "A2DP_SRC"}))
        .await;
    assert_eq!(reply["errorCode"], json!(249));
}

#[tokio::test]
async fn role_enable_failure_reports_the_stack_error() {
    let harness = a2dp_harness().await;
    harness.fake.fail_next("enable_role", SilError::Unsupported);

    let reply = harness.call("/a2dp", "enable", json!({})).await;
    assert_eq!(reply["returnValue"], json!(false));
    assert_eq!(reply["errorCode"], json!(SilError::Unsupported.code()));
}
