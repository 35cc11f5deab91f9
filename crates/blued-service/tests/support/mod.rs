//! Harness driving the service dispatch loop against the scripted
//! stack.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use blued_common::{Address, BusRequest, ReplyReceiver};
use blued_service::{DaemonConfig, Service, ServiceHandle};
use blued_sil::events::{AdapterEvent, ProfileEvent};
use blued_sil::fake::FakeSil;
use blued_sil::types::{DeviceProperty, ProfileId};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Address the harness adapter reports.
pub const ADAPTER: &str = "00:11:22:33:44:55";
/// Address used for the remote device in most scenarios.
pub const DEVICE: &str = "aa:bb:cc:dd:ee:ff";
/// Default sender identity attached to requests.
pub const SENDER: &str = "com.test.client";

pub fn addr(raw: &str) -> Address {
    raw.parse().expect("well-formed address")
}

/// A running service plus the scripted stack feeding it.
pub struct Harness {
    pub fake: FakeSil,
    pub handle: ServiceHandle,
}

pub async fn start() -> Harness {
    start_with(DaemonConfig::default()).await
}

pub async fn start_with(config: DaemonConfig) -> Harness {
    let fake = FakeSil::new(&[addr(ADAPTER)]);
    let (handle, _task) = Service::spawn(config, Arc::new(fake.clone()));
    settle().await;
    Harness { fake, handle }
}

/// Lets queued messages and deferred completions drain.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn recv(replies: &mut ReplyReceiver) -> Value {
    tokio::time::timeout(Duration::from_secs(2), replies.recv())
        .await
        .expect("timely reply")
        .expect("reply channel open")
}

/// A live subscription: its reply stream plus the client-gone token
/// the transport would trip on disconnect.
pub struct Subscription {
    pub replies: ReplyReceiver,
    token: CancellationToken,
}

impl Subscription {
    pub async fn next(&mut self) -> Value {
        recv(&mut self.replies).await
    }

    /// Simulates the subscribing client dropping off the bus.
    pub fn drop_client(&self) {
        self.token.cancel();
    }

    pub async fn assert_silent(&mut self) {
        let outcome =
            tokio::time::timeout(Duration::from_millis(100), self.replies.recv()).await;
        if let Ok(Some(body)) = outcome {
            panic!("expected no further post, got {body}");
        }
    }
}

fn build_request(
    category: &str,
    method: &str,
    payload: Value,
    sender: &str,
) -> (BusRequest, ReplyReceiver) {
    let subscribe = payload
        .get("subscribe")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    BusRequest::new(category, method, payload, subscribe, sender)
}

impl Harness {
    pub async fn call(&self, category: &str, method: &str, payload: Value) -> Value {
        self.call_from(category, method, payload, SENDER).await
    }

    pub async fn call_from(
        &self,
        category: &str,
        method: &str,
        payload: Value,
        sender: &str,
    ) -> Value {
        let (request, mut replies) = build_request(category, method, payload, sender);
        self.handle.submit(request);
        recv(&mut replies).await
    }

    /// Submits a subscription and returns its first reply plus the
    /// live subscription.
    pub async fn subscribe(
        &self,
        category: &str,
        method: &str,
        payload: Value,
    ) -> (Value, Subscription) {
        self.subscribe_from(category, method, payload, SENDER).await
    }

    pub async fn subscribe_from(
        &self,
        category: &str,
        method: &str,
        payload: Value,
        sender: &str,
    ) -> (Value, Subscription) {
        let (request, mut replies) = build_request(category, method, payload, sender);
        let token = request.client_gone_token();
        self.handle.submit(request);
        let first = recv(&mut replies).await;
        (first, Subscription { replies, token })
    }

    /// Submits a subscription without waiting for its first reply, for
    /// flows whose initial response is itself deferred.
    pub fn submit(&self, category: &str, method: &str, payload: Value) -> Subscription {
        let (request, replies) = build_request(category, method, payload, SENDER);
        let token = request.client_gone_token();
        self.handle.submit(request);
        Subscription { replies, token }
    }

    /// Powers the harness adapter on through the stack observer.
    pub async fn power_on(&self) {
        self.fake
            .emit_adapter(addr(ADAPTER), AdapterEvent::StateChanged { powered: true });
        settle().await;
    }

    /// Makes a classic device known to the adapter inventory.
    pub async fn add_device(&self, device: &str, name: &str) {
        self.fake.emit_adapter(
            addr(ADAPTER),
            AdapterEvent::DeviceFound {
                properties: vec![
                    DeviceProperty::Address(addr(device)),
                    DeviceProperty::Name(name.to_owned()),
                    DeviceProperty::Paired(false),
                ],
            },
        );
        settle().await;
    }

    /// Marks a profile link up the way the stack reports it.
    pub async fn profile_connected(&self, profile: ProfileId, device: &str, connected: bool) {
        self.fake.emit_profile(
            addr(ADAPTER),
            profile,
            ProfileEvent::PropertiesChanged {
                device: addr(device),
                properties: vec![DeviceProperty::Connected(connected)],
            },
        );
        settle().await;
    }
}
