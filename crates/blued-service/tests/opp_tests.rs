//! OPP transfers: outgoing pushes and incoming arbitration.

mod support;

use blued_service::DaemonConfig;
use blued_sil::events::{OppEvent, ProfileEvent};
use blued_sil::fake::FakeCall;
use blued_sil::types::ProfileId;
use serde_json::json;

use support::{ADAPTER, DEVICE, addr};

async fn opp_harness() -> support::Harness {
    let harness = support::start().await;
    harness.power_on().await;
    harness.add_device(DEVICE, "Phone").await;
    harness
        .profile_connected(ProfileId::Opp, DEVICE, true)
        .await;
    harness
}

fn incoming_transfer(transfer_id: u64, file_name: &str, file_size: u64) -> ProfileEvent {
    ProfileEvent::Opp(OppEvent::TransferConfirmationRequested {
        transfer_id,
        device: addr(DEVICE),
        device_name: "Phone".to_owned(),
        file_name: file_name.to_owned(),
        file_size,
    })
}

fn progress(transfer_id: u64, transferred: u64, finished: bool) -> ProfileEvent {
    ProfileEvent::Opp(OppEvent::TransferStateChanged {
        transfer_id,
        transferred,
        finished,
    })
}

#[tokio::test]
async fn incoming_transfer_accept_and_progress() {
    let harness = opp_harness().await;

    let (first, mut awaiting) = harness
        .subscribe("/opp", "awaitTransferRequest", json!({"subscribe": true}))
        .await;
    assert_eq!(first["subscribed"], json!(true));

    let (_, mut monitor) = harness
        .subscribe("/opp", "monitorTransfer", json!({"subscribe": true}))
        .await;

    harness
        .fake
        .emit_profile(addr(ADAPTER), ProfileId::Opp, incoming_transfer(7, "hello.txt", 1024));

    let announced = awaiting.next().await;
    assert_eq!(announced["request"]["requestId"], json!("001"));
    assert_eq!(announced["request"]["fileName"], json!("hello.txt"));
    assert_eq!(announced["request"]["fileSize"], json!(1024));

    let reply = harness
        .call("/opp", "acceptTransferRequest", json!({"requestId": "001"}))
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::SupplyTransferConfirmation(7, true)));

    harness
        .fake
        .emit_profile(addr(ADAPTER), ProfileId::Opp, progress(7, 512, false));
    let update = monitor.next().await;
    assert_eq!(update["transfers"][0]["transferred"], json!(512));

    harness
        .fake
        .emit_profile(addr(ADAPTER), ProfileId::Opp, progress(7, 512, false));
    let update = monitor.next().await;
    assert_eq!(update["transfers"][0]["transferred"], json!(1024));
    support::settle().await;

    // Fully transferred: the request is gone.
    let reply = harness
        .call("/opp", "acceptTransferRequest", json!({"requestId": "001"}))
        .await;
    assert_eq!(reply["errorCode"], json!(158));
}

#[tokio::test]
async fn await_transfer_request_allows_one_listener() {
    let harness = opp_harness().await;

    let (_, _listener) = harness
        .subscribe("/opp", "awaitTransferRequest", json!({"subscribe": true}))
        .await;

    let reply = harness
        .call_from(
            "/opp",
            "awaitTransferRequest",
            json!({"subscribe": true}),
            "com.test.other",
        )
        .await;
    assert_eq!(reply["errorCode"], json!(104));
}

#[tokio::test]
async fn transfers_are_refused_without_a_listener() {
    let harness = opp_harness().await;

    harness
        .fake
        .emit_profile(addr(ADAPTER), ProfileId::Opp, incoming_transfer(7, "a.bin", 10));
    support::settle().await;

    let reply = harness
        .call("/opp", "acceptTransferRequest", json!({"requestId": "001"}))
        .await;
    assert_eq!(reply["errorCode"], json!(155));
}

#[tokio::test]
async fn reject_clears_the_push_request() {
    let harness = opp_harness().await;

    let (_, mut awaiting) = harness
        .subscribe("/opp", "awaitTransferRequest", json!({"subscribe": true}))
        .await;
    harness
        .fake
        .emit_profile(addr(ADAPTER), ProfileId::Opp, incoming_transfer(7, "a.bin", 10));
    awaiting.next().await;

    let reply = harness
        .call("/opp", "rejectTransferRequest", json!({"requestId": "001"}))
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::SupplyTransferConfirmation(7, false)));

    let reply = harness
        .call("/opp", "rejectTransferRequest", json!({"requestId": "001"}))
        .await;
    assert_eq!(reply["errorCode"], json!(158));
}

#[tokio::test]
async fn cancel_transfer_stops_listing_the_request() {
    let harness = opp_harness().await;

    let (_, mut awaiting) = harness
        .subscribe("/opp", "awaitTransferRequest", json!({"subscribe": true}))
        .await;
    harness
        .fake
        .emit_profile(addr(ADAPTER), ProfileId::Opp, incoming_transfer(9, "b.bin", 100));
    awaiting.next().await;

    let reply = harness
        .call("/opp", "cancelTransfer", json!({"requestId": "001"}))
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness.fake.calls().contains(&FakeCall::CancelTransfer(9)));

    let (first, _monitor) = harness
        .subscribe("/opp", "monitorTransfer", json!({"subscribe": true}))
        .await;
    assert_eq!(first["transfers"].as_array().expect("transfers").len(), 0);

    let reply = harness
        .call("/opp", "cancelTransfer", json!({"requestId": "001"}))
        .await;
    assert_eq!(reply["errorCode"], json!(158));
}

#[tokio::test]
async fn push_file_rejects_a_missing_source() {
    let harness = opp_harness().await;

    let reply = harness
        .call(
            "/opp",
            "pushFile",
            json!({"address": DEVICE, "sourceFile": "no/such/file.bin", "subscribe": true}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(142));

    // Escaping the storage root is just as invalid.
    let reply = harness
        .call(
            "/opp",
            "pushFile",
            json!({"address": DEVICE, "sourceFile": "../etc/passwd", "subscribe": true}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(142));
}

#[tokio::test]
async fn push_file_streams_progress_and_cancels_with_its_client() {
    let root = std::env::temp_dir().join(format!("blued-opp-{}", std::process::id()));
    std::fs::create_dir_all(&root).expect("storage root");
    std::fs::write(root.join("song.mp3"), b"0123456789").expect("source file");

    let config = DaemonConfig {
        storage_root: root.clone(),
        ..DaemonConfig::default()
    };
    let harness = support::start_with(config).await;
    harness.power_on().await;
    harness.add_device(DEVICE, "Phone").await;
    harness
        .profile_connected(ProfileId::Opp, DEVICE, true)
        .await;

    let (first, mut push) = harness
        .subscribe(
            "/opp",
            "pushFile",
            json!({"address": DEVICE, "sourceFile": "song.mp3", "subscribe": true}),
        )
        .await;
    assert_eq!(first["returnValue"], json!(true));
    support::settle().await;

    let transfer_id = harness
        .fake
        .calls()
        .into_iter()
        .find_map(|call| match call {
            FakeCall::PushFile(_, _, transfer_id) => Some(transfer_id),
            _ => None,
        })
        .expect("push issued");

    harness.fake.emit_profile(
        addr(ADAPTER),
        ProfileId::Opp,
        ProfileEvent::Opp(OppEvent::PushProgress {
            transfer_id,
            error: None,
            transferred: 4,
            total: 10,
            finished: false,
        }),
    );
    let update = push.next().await;
    assert_eq!(update["transferred"], json!(4));
    assert_eq!(update["size"], json!(10));
    assert_eq!(update["subscribed"], json!(true));

    // The pushing client disappears: the transfer is canceled on the
    // stack and stays alive until the stack confirms.
    push.drop_client();
    support::settle().await;
    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::CancelTransfer(transfer_id)));

    std::fs::remove_dir_all(&root).expect("cleanup");
}

#[tokio::test]
async fn push_requires_an_opp_connection() {
    let harness = support::start().await;
    harness.power_on().await;
    harness.add_device(DEVICE, "Phone").await;

    let reply = harness
        .call(
            "/opp",
            "pushFile",
            json!({"address": DEVICE, "sourceFile": "song.mp3", "subscribe": true}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(154));
}
