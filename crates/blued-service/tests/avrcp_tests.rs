//! AVRCP: media request brokerage, pass-through, volume and settings.

mod support;

use blued_sil::events::{AvrcpEvent, ProfileEvent};
use blued_sil::fake::FakeCall;
use blued_sil::types::{
    MediaMetaData, PassThroughKeyCode, PassThroughKeyStatus, PlayerApplicationSetting, ProfileId,
    Repeat,
};
use serde_json::json;

use support::{ADAPTER, DEVICE, addr};

async fn avrcp_harness() -> support::Harness {
    let harness = support::start().await;
    harness.power_on().await;
    harness.add_device(DEVICE, "Phone").await;
    harness
        .profile_connected(ProfileId::Avrcp, DEVICE, true)
        .await;
    harness
}

fn media_request(stack_id: u64) -> ProfileEvent {
    ProfileEvent::Avrcp(AvrcpEvent::MediaMetaDataRequested {
        request_id: stack_id,
        device: addr(DEVICE),
    })
}

#[tokio::test]
async fn metadata_brokerage_round_trip() {
    let harness = avrcp_harness().await;

    let (first, mut awaiting) = harness
        .subscribe(
            "/avrcp",
            "awaitMediaMetaDataRequest",
            json!({"subscribe": true}),
        )
        .await;
    assert_eq!(first["subscribed"], json!(true));

    harness
        .fake
        .emit_profile(addr(ADAPTER), ProfileId::Avrcp, media_request(42));

    let announced = awaiting.next().await;
    assert_eq!(announced["requestId"], json!("001"));
    assert_eq!(announced["address"], json!(DEVICE));
    assert_eq!(announced["adapterAddress"], json!(ADAPTER));

    let reply = harness
        .call(
            "/avrcp",
            "supplyMediaMetaData",
            json!({
                "requestId": "001",
                "metaData": {"title": "t", "duration": 1000},
            }),
        )
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert_eq!(reply["requestId"], json!("001"));

    let supplied = harness
        .fake
        .calls()
        .into_iter()
        .find_map(|call| match call {
            FakeCall::SupplyMediaMetaData(stack_id, meta_data) => Some((stack_id, meta_data)),
            _ => None,
        })
        .expect("metadata supplied to the stack");
    assert_eq!(supplied.0, 42);
    assert_eq!(supplied.1.title, "t");
    assert_eq!(supplied.1.duration, 1000);

    // The brokered request is gone once supplied.
    let reply = harness
        .call(
            "/avrcp",
            "supplyMediaMetaData",
            json!({"requestId": "001", "metaData": {"title": "t"}}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(188));
}

#[tokio::test]
async fn await_media_metadata_allows_one_listener() {
    let harness = avrcp_harness().await;

    let (_, _listener) = harness
        .subscribe(
            "/avrcp",
            "awaitMediaMetaDataRequest",
            json!({"subscribe": true}),
        )
        .await;

    let reply = harness
        .call_from(
            "/avrcp",
            "awaitMediaMetaDataRequest",
            json!({"subscribe": true}),
            "com.test.other",
        )
        .await;
    assert_eq!(reply["errorCode"], json!(104));
}

#[tokio::test]
async fn media_requests_without_a_listener_are_dropped() {
    let harness = avrcp_harness().await;

    harness
        .fake
        .emit_profile(addr(ADAPTER), ProfileId::Avrcp, media_request(42));
    support::settle().await;

    // Nothing was brokered, so the first listener starts at "001".
    let (_, mut awaiting) = harness
        .subscribe(
            "/avrcp",
            "awaitMediaMetaDataRequest",
            json!({"subscribe": true}),
        )
        .await;
    harness
        .fake
        .emit_profile(addr(ADAPTER), ProfileId::Avrcp, media_request(43));
    let announced = awaiting.next().await;
    assert_eq!(announced["requestId"], json!("001"));
}

#[tokio::test]
async fn request_ids_increment_per_brokered_request() {
    let harness = avrcp_harness().await;
    let (_, mut awaiting) = harness
        .subscribe(
            "/avrcp",
            "awaitMediaMetaDataRequest",
            json!({"subscribe": true}),
        )
        .await;

    for (stack_id, expected) in [(10, "001"), (11, "002"), (12, "003")] {
        harness
            .fake
            .emit_profile(addr(ADAPTER), ProfileId::Avrcp, media_request(stack_id));
        let announced = awaiting.next().await;
        assert_eq!(announced["requestId"], json!(expected));
    }
}

#[tokio::test]
async fn pass_through_commands_reach_the_stack() {
    let harness = avrcp_harness().await;

    let reply = harness
        .call(
            "/avrcp",
            "sendPassThroughCommand",
            json!({"address": DEVICE, "keyCode": "play", "keyStatus": "pressed"}),
        )
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::SendPassThroughCommand(
            addr(DEVICE),
            PassThroughKeyCode::Play,
            PassThroughKeyStatus::Pressed,
        )));
}

#[tokio::test]
async fn unknown_key_code_is_rejected() {
    let harness = avrcp_harness().await;

    let reply = harness
        .call(
            "/avrcp",
            "sendPassThroughCommand",
            json!({"address": DEVICE, "keyCode": "eject", "keyStatus": "pressed"}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(240));
}

#[tokio::test]
async fn incoming_pass_through_commands_fan_out() {
    let harness = avrcp_harness().await;

    let (_, mut commands) = harness
        .subscribe(
            "/avrcp",
            "receivePassThroughCommand",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;

    harness.fake.emit_profile(
        addr(ADAPTER),
        ProfileId::Avrcp,
        ProfileEvent::Avrcp(AvrcpEvent::PassThroughCommandReceived {
            device: addr(DEVICE),
            key_code: PassThroughKeyCode::Next,
            key_status: PassThroughKeyStatus::Released,
        }),
    );

    let command = commands.next().await;
    assert_eq!(command["keyCode"], json!("next"));
    assert_eq!(command["keyStatus"], json!("released"));
}

#[tokio::test]
async fn absolute_volume_round_trip() {
    let harness = avrcp_harness().await;

    let reply = harness
        .call(
            "/avrcp",
            "setAbsoluteVolume",
            json!({"address": DEVICE, "volume": 50}),
        )
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::SetAbsoluteVolume(addr(DEVICE), 64)));

    let (_, mut volume) = harness
        .subscribe(
            "/avrcp",
            "getRemoteVolume",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;

    harness.fake.emit_profile(
        addr(ADAPTER),
        ProfileId::Avrcp,
        ProfileEvent::Avrcp(AvrcpEvent::VolumeChanged {
            device: addr(DEVICE),
            volume: 64,
        }),
    );

    let update = volume.next().await;
    assert_eq!(update["volume"], json!(50));
}

#[tokio::test]
async fn volume_out_of_range_is_rejected() {
    let harness = avrcp_harness().await;

    let reply = harness
        .call(
            "/avrcp",
            "setAbsoluteVolume",
            json!({"address": DEVICE, "volume": 101}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(253));
}

#[tokio::test]
async fn adapter_wide_volume_subscription_hears_every_device() {
    let harness = avrcp_harness().await;

    let (_, mut volume) = harness
        .subscribe("/avrcp", "getRemoteVolume", json!({"subscribe": true}))
        .await;

    harness.fake.emit_profile(
        addr(ADAPTER),
        ProfileId::Avrcp,
        ProfileEvent::Avrcp(AvrcpEvent::VolumeChanged {
            device: addr(DEVICE),
            volume: 127,
        }),
    );

    let update = volume.next().await;
    assert_eq!(update["volume"], json!(100));
    assert_eq!(update["address"], json!(DEVICE));
}

#[tokio::test]
async fn player_settings_only_forward_deltas() {
    let harness = avrcp_harness().await;

    let reply = harness
        .call(
            "/avrcp",
            "setPlayerApplicationSettings",
            json!({"address": DEVICE, "repeat": "allTracks", "shuffle": "off"}),
        )
        .await;
    assert_eq!(reply["returnValue"], json!(true));

    // `shuffle` already mirrors "off", so only the repeat delta goes out.
    assert!(harness
        .fake
        .calls()
        .contains(&FakeCall::SetPlayerApplicationSettings(
            addr(DEVICE),
            vec![PlayerApplicationSetting::Repeat(Repeat::AllTracks)],
        )));
}

#[tokio::test]
async fn player_settings_reject_unknown_aliases() {
    let harness = avrcp_harness().await;

    let reply = harness
        .call(
            "/avrcp",
            "setPlayerApplicationSettings",
            json!({"address": DEVICE, "repeat": "sometimes"}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(244));
}

#[tokio::test]
async fn settings_changes_update_the_mirror_and_subscribers() {
    let harness = avrcp_harness().await;

    let (first, mut settings) = harness
        .subscribe(
            "/avrcp",
            "getPlayerApplicationSettings",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    assert_eq!(first["repeat"], json!("off"));

    harness.fake.emit_profile(
        addr(ADAPTER),
        ProfileId::Avrcp,
        ProfileEvent::Avrcp(AvrcpEvent::PlayerApplicationSettingsReceived {
            device: addr(DEVICE),
            settings: vec![PlayerApplicationSetting::Repeat(Repeat::Group)],
        }),
    );

    let update = settings.next().await;
    assert_eq!(update["repeat"], json!("group"));

    // Setting the now-current value again is a no-op towards the stack.
    harness.fake.take_calls();
    let reply = harness
        .call(
            "/avrcp",
            "setPlayerApplicationSettings",
            json!({"address": DEVICE, "repeat": "group"}),
        )
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness.fake.calls().is_empty());
}

#[tokio::test]
async fn metadata_cache_serves_late_subscribers() {
    let harness = avrcp_harness().await;

    harness.fake.emit_profile(
        addr(ADAPTER),
        ProfileId::Avrcp,
        ProfileEvent::Avrcp(AvrcpEvent::MediaMetaDataReceived {
            device: addr(DEVICE),
            meta_data: MediaMetaData {
                title: "song".into(),
                artist: "band".into(),
                ..MediaMetaData::default()
            },
        }),
    );
    support::settle().await;

    let (first, _subscription) = harness
        .subscribe(
            "/avrcp",
            "getMediaMetaData",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    assert_eq!(first["metaData"]["title"], json!("song"));
    assert_eq!(first["metaData"]["artist"], json!("band"));
}

#[tokio::test]
async fn per_device_state_clears_on_disconnect() {
    let harness = avrcp_harness().await;

    harness.fake.emit_profile(
        addr(ADAPTER),
        ProfileId::Avrcp,
        ProfileEvent::Avrcp(AvrcpEvent::VolumeChanged {
            device: addr(DEVICE),
            volume: 64,
        }),
    );
    support::settle().await;

    harness
        .profile_connected(ProfileId::Avrcp, DEVICE, false)
        .await;
    harness
        .profile_connected(ProfileId::Avrcp, DEVICE, true)
        .await;

    // The mirrored volume is gone after the link dropped.
    let (first, _subscription) = harness
        .subscribe(
            "/avrcp",
            "getRemoteVolume",
            json!({"address": DEVICE, "subscribe": true}),
        )
        .await;
    assert!(first.get("volume").is_none());
}

#[tokio::test]
async fn browse_calls_are_forwarded() {
    let harness = avrcp_harness().await;
    harness.fake.set_number_of_items(12);

    let reply = harness
        .call(
            "/avrcp/browse",
            "getNumberOfItems",
            json!({"address": DEVICE}),
        )
        .await;
    assert_eq!(reply["numberOfItems"], json!(12));

    let reply = harness
        .call(
            "/avrcp/browse",
            "changePath",
            json!({"address": DEVICE, "itemPath": "/root/albums"}),
        )
        .await;
    assert_eq!(reply["returnValue"], json!(true));
    assert!(harness.fake.calls().contains(&FakeCall::ChangePath(
        addr(DEVICE),
        "/root/albums".to_owned(),
    )));

    let reply = harness
        .call(
            "/avrcp/browse",
            "search",
            json!({"address": DEVICE, "searchString": "love"}),
        )
        .await;
    assert_eq!(reply["searchResult"], json!("/search"));
}

#[tokio::test]
async fn browse_requires_a_connected_device() {
    let harness = support::start().await;
    harness.power_on().await;
    harness.add_device(DEVICE, "Phone").await;

    let reply = harness
        .call(
            "/avrcp/browse",
            "getNumberOfItems",
            json!({"address": DEVICE}),
        )
        .await;
    assert_eq!(reply["errorCode"], json!(136));
}
