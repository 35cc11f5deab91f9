//! Process-wide service root and dispatch loop.
//!
//! All daemon state is owned by one [`Service`] value driven by a single
//! message loop: RPC requests, stack observations and deferred SIL
//! completions are serialized through the same channel, so no handler
//! needs locking. A SIL call is issued from the loop and completes by
//! sending a [`Message::Resume`] back into it; state may have changed in
//! between, so completions re-validate what they touch.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use blued_common::{Address, BusRequest, ErrorCode, SubscriptionPoint};
use blued_sil::types::PairingIoCapability;
use blued_sil::{AdapterProperty, Sil, SilError, SilEvent};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::AdapterManager;
use crate::config::DaemonConfig;
use crate::display::DisplayAssignments;
use crate::profile::Profiles;

/// A deferred continuation executed on the dispatch loop.
pub type Resume = Box<dyn FnOnce(&mut Service) + Send + 'static>;

/// Messages driving the dispatch loop.
pub enum Message {
    /// An RPC request from the bus transport.
    Request(BusRequest),
    /// An observation from the stack.
    Stack(SilEvent),
    /// A deferred SIL completion or watch-drop continuation.
    Resume(Resume),
}

/// Sender half of the dispatch channel.
pub type MessageSender = mpsc::UnboundedSender<Message>;

/// Runs `future` off the loop and re-enters the loop with its output.
pub(crate) fn defer<T, F, C>(tx: &MessageSender, future: F, then: C)
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
    C: FnOnce(&mut Service, T) + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let output = future.await;
        let _ = tx.send(Message::Resume(Box::new(move |service: &mut Service| {
            then(service, output);
        })));
    });
}

/// Builds the error payload for a fault reported by the stack.
///
/// Stack faults are translated 1:1; their codes live in the stack's own
/// numeric series, distinct from the service table.
pub(crate) fn sil_error_body(adapter: &Address, error: SilError) -> Value {
    json!({
        "adapterAddress": adapter,
        "returnValue": false,
        "errorCode": error.code(),
        "errorText": error.to_string(),
    })
}

/// Client handle used by transports and tests to feed the loop.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: MessageSender,
}

impl ServiceHandle {
    /// Submits an RPC request to the dispatch loop.
    pub fn submit(&self, request: BusRequest) {
        let _ = self.tx.send(Message::Request(request));
    }

    /// The raw message sender, for wiring auxiliary inputs.
    pub fn sender(&self) -> MessageSender {
        self.tx.clone()
    }
}

/// State shared by the adapter-level handlers.
pub(crate) struct Core {
    pub(crate) config: DaemonConfig,
    pub(crate) sil: Arc<dyn Sil>,
    pub(crate) tx: MessageSender,
    pub(crate) default_address: Option<Address>,
    pub(crate) adapters: BTreeMap<Address, AdapterManager>,
    pub(crate) status_subscriptions: SubscriptionPoint,
    pub(crate) available_subscriptions: SubscriptionPoint,
    pub(crate) advertising_subscriptions: SubscriptionPoint,
    pub(crate) display: DisplayAssignments,
}

impl Core {
    /// Resolves the adapter a request addresses, replying with the
    /// matching error when it is not available.
    pub(crate) fn resolve_adapter(&self, request: &BusRequest) -> Option<Address> {
        match request.payload().get("adapterAddress") {
            Some(value) => {
                let address = value
                    .as_str()
                    .and_then(|raw| raw.parse::<Address>().ok());
                match address {
                    Some(address) if self.adapters.contains_key(&address) => Some(address),
                    _ => {
                        request.reply_error(ErrorCode::InvalidAdapterAddress);
                        None
                    }
                }
            }
            None => match self.default_address {
                Some(address) if self.adapters.contains_key(&address) => Some(address),
                _ => {
                    request.reply_error(ErrorCode::AdapterNotAvailable);
                    None
                }
            },
        }
    }

    /// The manager of `address`, if the adapter is still present.
    pub(crate) fn adapter_mut(&mut self, address: &Address) -> Option<&mut AdapterManager> {
        self.adapters.get_mut(address)
    }

    /// Read-only manager lookup.
    pub(crate) fn adapter(&self, address: &Address) -> Option<&AdapterManager> {
        self.adapters.get(address)
    }

    /// Whether `device` is known on `adapter`.
    pub(crate) fn is_device_available(&self, adapter: &Address, device: &Address) -> bool {
        self.adapters
            .get(adapter)
            .map(|manager| manager.inventory.device(device).is_some())
            .unwrap_or(false)
    }

    /// Posts the current adapter status set to `getStatus` subscribers.
    pub(crate) fn notify_status_subscribers(&mut self) {
        let body = json!({
            "adapters": self
                .adapters
                .values()
                .map(AdapterManager::status_json)
                .collect::<Vec<_>>(),
            "returnValue": true,
        });
        self.status_subscriptions.post(&body);
    }

    /// Posts the available-adapter set to `queryAvailable` subscribers.
    pub(crate) fn notify_available_subscribers(&mut self) {
        let body = json!({
            "adapters": self
                .adapters
                .values()
                .map(AdapterManager::available_json)
                .collect::<Vec<_>>(),
            "returnValue": true,
        });
        self.available_subscriptions.post(&body);
    }

    /// Posts an advertising-state change to `/le getStatus` subscribers.
    pub(crate) fn notify_advertising_subscribers(&mut self, adapter: Address) {
        let advertising = self
            .adapters
            .get(&adapter)
            .map(|manager| manager.advertising())
            .unwrap_or(false);
        let body = json!({
            "adapterAddress": adapter,
            "advertising": advertising,
            "returnValue": true,
            "subscribed": true,
        });
        self.advertising_subscriptions.post(&body);
    }
}

/// The daemon core.
pub struct Service {
    pub(crate) core: Core,
    pub(crate) profiles: Profiles,
}

impl Service {
    /// Spawns the dispatch loop and returns the handle feeding it.
    pub fn spawn(config: DaemonConfig, sil: Arc<dyn Sil>) -> (ServiceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let (sil_tx, mut sil_rx) = mpsc::unbounded_channel();
        sil.register_observer(sil_tx);
        let forward = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = sil_rx.recv().await {
                if forward.send(Message::Stack(event)).is_err() {
                    break;
                }
            }
        });

        let display = DisplayAssignments::load(config.display_assignment_path.clone());
        let profiles = Profiles::new(&config);
        let service = Self {
            core: Core {
                config,
                sil,
                tx: tx.clone(),
                default_address: None,
                adapters: BTreeMap::new(),
                status_subscriptions: SubscriptionPoint::new(),
                available_subscriptions: SubscriptionPoint::new(),
                advertising_subscriptions: SubscriptionPoint::new(),
                display,
            },
            profiles,
        };

        let _ = tx.send(Message::Stack(SilEvent::AdaptersChanged));
        let task = tokio::spawn(service.run(rx));
        (ServiceHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        info!("bluetooth service dispatch loop running");
        while let Some(message) = rx.recv().await {
            self.dispatch(message);
        }
        info!("bluetooth service dispatch loop stopped");
    }

    fn dispatch(&mut self, message: Message) {
        match message {
            Message::Request(request) => self.dispatch_request(request),
            Message::Stack(event) => self.dispatch_stack(event),
            Message::Resume(resume) => resume(self),
        }
    }

    fn dispatch_request(&mut self, request: BusRequest) {
        debug!(
            category = request.category(),
            method = request.method(),
            sender = request.sender(),
            "request"
        );
        match request.category() {
            "/adapter" | "/adapter/internal" | "/device" | "/device/internal" | "/le" => {
                crate::adapter::dispatch(self, request);
            }
            "/avrcp" | "/avrcp/internal" | "/avrcp/browse" => {
                crate::profile::avrcp::dispatch(self, request);
            }
            "/opp" => crate::profile::opp::dispatch(self, request),
            _ => crate::profile::dispatch_generic(self, request),
        }
    }

    fn dispatch_stack(&mut self, event: SilEvent) {
        match event {
            SilEvent::AdaptersChanged => self.handle_adapters_changed(),
            SilEvent::Adapter { adapter, event } => {
                crate::adapter::handle_stack_event(self, adapter, event);
            }
            SilEvent::Profile {
                adapter,
                profile,
                event,
            } => crate::profile::handle_stack_event(self, adapter, profile, event),
        }
    }

    /// Re-synchronizes the adapter set with what the stack exposes.
    fn handle_adapters_changed(&mut self) {
        let sil_adapters = self.core.sil.adapters();
        let default = self.core.sil.default_adapter().map(|adapter| adapter.address());
        self.core.default_address = default;

        let known: Vec<Address> = self.core.adapters.keys().copied().collect();
        for address in known {
            let still_present = sil_adapters
                .iter()
                .any(|adapter| adapter.address() == address);
            if !still_present {
                info!(adapter = %address, "adapter removed by stack");
                self.core.adapters.remove(&address);
                self.profiles.reset_adapter(&address);
            }
        }

        for sil_adapter in sil_adapters {
            let address = sil_adapter.address();
            let is_default = Some(address) == default;
            if let Some(manager) = self.core.adapters.get_mut(&address) {
                manager.set_default(is_default);
                continue;
            }

            info!(adapter = %address, default = is_default, "adapter appeared");
            let manager = AdapterManager::new(
                address,
                sil_adapter.clone(),
                self.core.tx.clone(),
                is_default,
                self.core.config.pairing_io_capability,
            );
            self.core.adapters.insert(address, manager);
            self.profiles.initialize_adapter(address, sil_adapter.as_ref());
            crate::profile::apply_display_role(self, address);

            // Without any means for user interaction the adapter has to
            // stay pairable so just-works pairing keeps functioning.
            if self.core.config.pairing_io_capability == PairingIoCapability::NoInputNoOutput {
                let sil = sil_adapter.clone();
                defer(
                    &self.core.tx,
                    async move {
                        sil.set_adapter_property(AdapterProperty::Pairable(true))
                            .await
                    },
                    move |service, result| {
                        if result.is_ok() {
                            if let Some(manager) = service.core.adapter_mut(&address) {
                                manager.pair_state.set_pairable(true);
                            }
                            service.core.notify_status_subscribers();
                        }
                    },
                );
            }

            let sil = sil_adapter.clone();
            defer(
                &self.core.tx,
                async move { sil.adapter_properties().await },
                move |service, result| match result {
                    Ok(properties) => {
                        crate::adapter::apply_adapter_properties(service, address, properties);
                    }
                    Err(error) => {
                        warn!(adapter = %address, %error, "cannot read adapter properties");
                    }
                },
            );
        }

        self.core.notify_status_subscribers();
        self.core.notify_available_subscribers();
    }
}
