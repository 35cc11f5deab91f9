//! D-Bus transport.
//!
//! Each RPC category is served as one object exposing a generic
//! `org.blued.Category1` interface: `Call` for request/response
//! methods, `Watch` for subscriptions and `Cancel` to end one. Events
//! of a subscription are delivered as unicast `Event` signals carrying
//! the watch token; a client dropping off the bus cancels every watch
//! it held, which is what drives the service's client-disappearance
//! callbacks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use blued_common::BusRequest;
use blued_service::ServiceHandle;
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zbus::message::Header;
use zbus::names::BusName;
use zbus::object_server::SignalEmitter;
use zbus::{Connection, connection, fdo, interface};

/// Well-known bus name of the daemon.
pub const BUS_NAME: &str = "org.blued.Manager1";

const INTERFACE: &str = "org.blued.Category1";

/// Every category served on the bus.
const CATEGORIES: &[&str] = &[
    "/adapter",
    "/adapter/internal",
    "/device",
    "/device/internal",
    "/le",
    "/a2dp",
    "/avrcp",
    "/avrcp/internal",
    "/avrcp/browse",
    "/gatt",
    "/hfp",
    "/hid",
    "/map",
    "/mesh",
    "/opp",
    "/pan",
    "/pbap",
    "/spp",
];

fn object_path(category: &str) -> String {
    format!("/org/blued{category}")
}

#[derive(Default)]
struct SubscriptionState {
    next_token: u64,
    by_token: HashMap<u64, CancellationToken>,
    by_client: HashMap<String, Vec<u64>>,
}

/// Tracks live watches so they can be canceled explicitly or when
/// their client leaves the bus.
#[derive(Clone, Default)]
struct Subscriptions {
    state: Arc<Mutex<SubscriptionState>>,
}

impl Subscriptions {
    fn locked(&self) -> std::sync::MutexGuard<'_, SubscriptionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn register(&self, client: &str, token: CancellationToken) -> u64 {
        let mut state = self.locked();
        state.next_token += 1;
        let id = state.next_token;
        state.by_token.insert(id, token);
        state.by_client.entry(client.to_owned()).or_default().push(id);
        id
    }

    fn cancel(&self, id: u64) -> bool {
        let token = self.locked().by_token.remove(&id);
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn client_gone(&self, client: &str) {
        let ids = self.locked().by_client.remove(client);
        for id in ids.unwrap_or_default() {
            if let Some(token) = self.locked().by_token.remove(&id) {
                token.cancel();
            }
        }
    }

    fn forget(&self, id: u64) {
        self.locked().by_token.remove(&id);
    }
}

struct CategoryEndpoint {
    category: &'static str,
    handle: ServiceHandle,
    subscriptions: Subscriptions,
}

fn sender_of(header: &Header<'_>) -> String {
    header
        .sender()
        .map(|name| name.to_string())
        .unwrap_or_default()
}

fn parse_payload(payload: &str) -> Value {
    if payload.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(payload).unwrap_or(Value::Null)
}

#[interface(name = "org.blued.Category1")]
impl CategoryEndpoint {
    /// Performs one request/response method call.
    async fn call(
        &self,
        method: String,
        payload: String,
        #[zbus(header)] header: Header<'_>,
    ) -> fdo::Result<String> {
        let (request, mut replies) = BusRequest::new(
            self.category,
            &method,
            parse_payload(&payload),
            false,
            sender_of(&header),
        );
        self.handle.submit(request);
        let reply = replies
            .recv()
            .await
            .ok_or_else(|| fdo::Error::Failed("service dropped the request".into()))?;
        Ok(reply.to_string())
    }

    /// Starts a subscription; returns the watch token and the initial
    /// reply. Further replies arrive as unicast `Event` signals.
    async fn watch(
        &self,
        method: String,
        payload: String,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<(u64, String)> {
        let sender = sender_of(&header);
        let (request, mut replies) = BusRequest::new(
            self.category,
            &method,
            parse_payload(&payload),
            true,
            sender.clone(),
        );
        let token = self.subscriptions.register(&sender, request.client_gone_token());
        self.handle.submit(request);

        let first = replies
            .recv()
            .await
            .ok_or_else(|| fdo::Error::Failed("service dropped the request".into()))?;

        let connection = connection.clone();
        let subscriptions = self.subscriptions.clone();
        let path = object_path(self.category);
        tokio::spawn(async move {
            while let Some(body) = replies.recv().await {
                let destination = match BusName::try_from(sender.clone()) {
                    Ok(name) => name,
                    Err(_) => break,
                };
                let sent = connection
                    .emit_signal(
                        Some(destination),
                        path.as_str(),
                        INTERFACE,
                        "Event",
                        &(token, body.to_string()),
                    )
                    .await;
                if let Err(error) = sent {
                    debug!(%error, "cannot deliver subscription event");
                    break;
                }
            }
            subscriptions.forget(token);
        });

        Ok((token, first.to_string()))
    }

    /// Ends a subscription previously started with `Watch`.
    async fn cancel(&self, token: u64) -> fdo::Result<()> {
        if self.subscriptions.cancel(token) {
            Ok(())
        } else {
            Err(fdo::Error::InvalidArgs("unknown watch token".into()))
        }
    }

    /// Placeholder signal definition; events are emitted unicast.
    #[zbus(signal)]
    async fn event(emitter: &SignalEmitter<'_>, token: u64, payload: String) -> zbus::Result<()>;
}

/// Serves the daemon's categories on the bus.
///
/// # Errors
///
/// Returns the underlying zbus error when the connection cannot be
/// established or a well-known name cannot be acquired.
pub async fn serve(handle: ServiceHandle, session_bus: bool) -> zbus::Result<Connection> {
    let builder = if session_bus {
        connection::Builder::session()?
    } else {
        connection::Builder::system()?
    };
    let connection = builder.name(BUS_NAME)?.build().await?;

    let subscriptions = Subscriptions::default();
    for category in CATEGORIES.iter().copied() {
        let endpoint = CategoryEndpoint {
            category,
            handle: handle.clone(),
            subscriptions: subscriptions.clone(),
        };
        connection
            .object_server()
            .at(object_path(category), endpoint)
            .await?;
    }

    spawn_disconnect_watcher(&connection, subscriptions).await?;
    info!(name = BUS_NAME, "serving rpc categories");
    Ok(connection)
}

/// Cancels the watches of clients that drop off the bus.
async fn spawn_disconnect_watcher(
    connection: &Connection,
    subscriptions: Subscriptions,
) -> zbus::Result<()> {
    let dbus = fdo::DBusProxy::new(connection).await?;
    let mut stream = dbus.receive_name_owner_changed().await?;
    tokio::spawn(async move {
        while let Some(signal) = stream.next().await {
            let Ok(args) = signal.args() else {
                continue;
            };
            if args.new_owner().is_none() {
                let name = args.name().to_string();
                debug!(client = %name, "bus client disappeared");
                subscriptions.client_gone(&name);
            }
        }
        warn!("name-owner watcher ended");
    });
    Ok(())
}
