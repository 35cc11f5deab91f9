//! Shared connect/disconnect/status state for every profile.
//!
//! The base tracks per-(adapter, device) connecting and connected sets,
//! the `getStatus` subscription points and the connect watches whose
//! disappearance triggers a stack-side disconnect. The stack's
//! `connected=true` property change, not the connect completion, is
//! what clears the connecting flag and fans out to status subscribers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use blued_common::{Address, BusRequest, ClientWatch, ErrorCode, SubscriptionPoint, WatchContext, params};
use blued_sil::types::{DeviceProperty, ProfileId};
use blued_sil::{SilAdapter, SilProfile};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::service::{Message, Resume, Service, defer, sil_error_body};

/// Connect/disconnect/status state of one profile.
pub(crate) struct ProfileBase {
    pub(crate) id: ProfileId,
    impls: HashMap<Address, Arc<dyn SilProfile>>,
    connecting: HashSet<(Address, Address)>,
    connected: HashSet<(Address, Address)>,
    status_subscriptions: HashMap<(Address, String), SubscriptionPoint>,
    connect_watches: HashMap<(Address, Address), ClientWatch>,
    enabled_roles: HashMap<Address, Vec<String>>,
}

impl ProfileBase {
    pub(crate) fn new(id: ProfileId) -> Self {
        Self {
            id,
            impls: HashMap::new(),
            connecting: HashSet::new(),
            connected: HashSet::new(),
            status_subscriptions: HashMap::new(),
            connect_watches: HashMap::new(),
            enabled_roles: HashMap::new(),
        }
    }

    /// Binds the profile to the backend of a newly appeared adapter.
    pub(crate) fn initialize(&mut self, adapter: Address, sil: &dyn SilAdapter) {
        if let Some(backend) = sil.profile(self.id) {
            self.impls.insert(adapter, backend);
        }
    }

    /// Drops everything belonging to a removed adapter.
    pub(crate) fn reset(&mut self, adapter: &Address) {
        self.impls.remove(adapter);
        self.connecting.retain(|(a, _)| a != adapter);
        self.connected.retain(|(a, _)| a != adapter);
        self.status_subscriptions.retain(|(a, _), _| a != adapter);
        self.connect_watches.retain(|(a, _), _| a != adapter);
        self.enabled_roles.remove(adapter);
    }

    pub(crate) fn impl_for(&self, adapter: &Address) -> Option<Arc<dyn SilProfile>> {
        self.impls.get(adapter).cloned()
    }

    pub(crate) fn is_connecting(&self, adapter: Address, device: Address) -> bool {
        self.connecting.contains(&(adapter, device))
    }

    pub(crate) fn is_connected(&self, adapter: Address, device: Address) -> bool {
        self.connected.contains(&(adapter, device))
    }

    pub(crate) fn mark_connecting(&mut self, adapter: Address, device: Address) {
        self.connecting.insert((adapter, device));
    }

    pub(crate) fn unmark_connecting(&mut self, adapter: Address, device: Address) {
        self.connecting.remove(&(adapter, device));
    }

    pub(crate) fn mark_connected(&mut self, adapter: Address, device: Address) {
        self.connected.insert((adapter, device));
    }

    pub(crate) fn unmark_connected(&mut self, adapter: Address, device: Address) {
        self.connected.remove(&(adapter, device));
    }

    /// Posts the current status to the (adapter, device) subscribers.
    pub(crate) fn notify_status(&mut self, adapter: Address, device: Address) {
        let body = json!({
            "connected": self.is_connected(adapter, device),
            "connecting": self.is_connecting(adapter, device),
            "subscribed": true,
            "returnValue": true,
            "adapterAddress": adapter,
            "address": device,
        });
        if let Some(point) = self
            .status_subscriptions
            .get_mut(&(adapter, device.to_string()))
        {
            point.post(&body);
        }
    }

    fn subscribe_status(&mut self, adapter: Address, key: String, request: BusRequest) {
        self.status_subscriptions
            .entry((adapter, key))
            .or_default()
            .subscribe(request);
    }

    /// Tears down the connect watch of a device, reporting who ended
    /// the connection.
    pub(crate) fn remove_connect_watch(
        &mut self,
        adapter: Address,
        device: Address,
        disconnected: bool,
        by_remote: bool,
    ) {
        let Some(watch) = self.connect_watches.remove(&(adapter, device)) else {
            return;
        };
        debug!(
            profile = self.id.mnemonic(),
            device = %device,
            by_remote,
            "tearing down connect watch"
        );
        let mut body = json!({
            "subscribed": false,
            "returnValue": true,
            "adapterAddress": adapter,
        });
        if disconnected {
            if let Some(object) = body.as_object_mut() {
                object.insert("disconnectByRemote".into(), json!(by_remote));
            }
        }
        watch.post(body);
    }

    /// Resolves a role name to the UUID set to apply.
    fn resolve_roles(&self, role: &str) -> Vec<String> {
        let uuids = self.id.uuids();
        if role.is_empty() || role.eq_ignore_ascii_case(self.id.mnemonic()) {
            return uuids.iter().map(|uuid| (*uuid).to_owned()).collect();
        }
        self.id
            .role_names()
            .iter()
            .zip(uuids.iter())
            .filter(|(name, _)| name.eq_ignore_ascii_case(role))
            .map(|(_, uuid)| (*uuid).to_owned())
            .collect()
    }

    fn roles_enabled(&self, adapter: Address, roles: &[String]) -> bool {
        self.enabled_roles
            .get(&adapter)
            .is_some_and(|enabled| roles.iter().all(|role| enabled.contains(role)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConnectParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

pub(crate) fn handle_connect(service: &mut Service, id: ProfileId, request: BusRequest) {
    let parsed: ConnectParams =
        match params::parse(request.payload(), &[("address", ErrorCode::AddrParamMissing)]) {
            Ok(parsed) => parsed,
            Err(code) => return request.reply_error(code),
        };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let device = parsed.address;
    if !service.core.is_device_available(&adapter, &device) {
        return request.reply_error(ErrorCode::DeviceNotAvail);
    }
    let Some(base) = service.profiles.base_mut(id) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let Some(backend) = base.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    if base.is_connecting(adapter, device) {
        return request.reply_error(ErrorCode::DevConnecting);
    }

    // Make sure we are not already connected before touching the stack.
    let probe = backend.clone();
    defer(
        &service.core.tx,
        async move { probe.is_connected(device).await },
        move |service, result| match result {
            Err(_) => request.reply_error(ErrorCode::ProfileConnectFail),
            Ok(true) => request.reply_error(ErrorCode::ProfileConnected),
            Ok(false) => {
                let Some(base) = service.profiles.base_mut(id) else {
                    return request.reply_error(ErrorCode::ProfileUnavail);
                };
                base.mark_connecting(adapter, device);
                base.notify_status(adapter, device);

                let connect = backend.clone();
                defer(
                    &service.core.tx,
                    async move { connect.connect(device).await },
                    move |service, result| {
                        connect_finished(service, id, adapter, device, request, result);
                    },
                );
            }
        },
    );
}

fn connect_finished(
    service: &mut Service,
    id: ProfileId,
    adapter: Address,
    device: Address,
    request: BusRequest,
    result: Result<(), blued_sil::SilError>,
) {
    let tx = service.core.tx.clone();
    let Some(base) = service.profiles.base_mut(id) else {
        return;
    };
    match result {
        Err(error) => {
            request.reply(sil_error_body(&adapter, error));
            base.unmark_connecting(adapter, device);
            base.notify_status(adapter, device);
        }
        Ok(()) => {
            // Connected as far as the stack call goes; subscribers hear
            // about it when the property change arrives.
            let subscribed = request.is_subscription();
            base.mark_connected(adapter, device);
            let body = json!({
                "subscribed": subscribed,
                "returnValue": true,
                "adapterAddress": adapter,
                "address": device,
            });
            if subscribed {
                let watch = ClientWatch::new(
                    request,
                    WatchContext::device(adapter, device),
                    move || {
                        let _ = tx.send(Message::Resume(Box::new(move |service: &mut Service| {
                            connect_watch_dropped(service, id, adapter, device);
                        }) as Resume));
                    },
                );
                watch.post(body);
                base.connect_watches.insert((adapter, device), watch);
            } else {
                request.reply(body);
            }
        }
    }
}

/// Compensation when a connect subscriber disappears: the profile link
/// it held open is taken down.
fn connect_watch_dropped(service: &mut Service, id: ProfileId, adapter: Address, device: Address) {
    let Some(base) = service.profiles.base_mut(id) else {
        return;
    };
    if base.connect_watches.remove(&(adapter, device)).is_none() {
        return;
    }
    let Some(backend) = base.impl_for(&adapter) else {
        return;
    };
    debug!(profile = id.mnemonic(), device = %device, "connect listener dropped, disconnecting");
    defer(
        &service.core.tx,
        async move { backend.disconnect(device).await },
        move |service, _result| {
            if let Some(base) = service.profiles.base_mut(id) {
                base.unmark_connected(adapter, device);
                base.unmark_connecting(adapter, device);
            }
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DisconnectParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
}

pub(crate) fn handle_disconnect(service: &mut Service, id: ProfileId, request: BusRequest) {
    let parsed: DisconnectParams =
        match params::parse(request.payload(), &[("address", ErrorCode::AddrParamMissing)]) {
            Ok(parsed) => parsed,
            Err(code) => return request.reply_error(code),
        };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let device = parsed.address;
    if !service.core.is_device_available(&adapter, &device) {
        return request.reply_error(ErrorCode::DeviceNotAvail);
    }
    let Some(base) = service.profiles.base_mut(id) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    if !base.is_connected(adapter, device) {
        return request.reply_error(ErrorCode::ProfileNotConnected);
    }
    let Some(backend) = base.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    defer(
        &service.core.tx,
        async move { backend.disconnect(device).await },
        move |service, result| match result {
            Err(_) => request.reply_error(ErrorCode::ProfileDisconnectFail),
            Ok(()) => {
                request.reply(json!({
                    "returnValue": true,
                    "adapterAddress": adapter,
                    "address": device,
                }));
                if let Some(base) = service.profiles.base_mut(id) {
                    base.remove_connect_watch(adapter, device, true, false);
                    base.unmark_connected(adapter, device);
                    base.unmark_connecting(adapter, device);
                }
            }
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GetStatusParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
    instance_name: Option<String>,
}

pub(crate) fn handle_get_status(service: &mut Service, id: ProfileId, request: BusRequest) {
    let parsed: GetStatusParams =
        match params::parse(request.payload(), &[("address", ErrorCode::AddrParamMissing)]) {
            Ok(parsed) => parsed,
            Err(code) => return request.reply_error(code),
        };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let device = parsed.address;
    if !service.core.is_device_available(&adapter, &device) {
        return request.reply_error(ErrorCode::DeviceNotAvail);
    }
    let Some(base) = service.profiles.base_mut(id) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let Some(backend) = base.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    // MAP sessions are scoped by `<deviceAddress>_<instanceName>`.
    let key = match parsed.instance_name {
        Some(instance) => format!("{device}_{instance}"),
        None => device.to_string(),
    };

    defer(
        &service.core.tx,
        async move { backend.is_connected(device).await },
        move |service, result| {
            let Ok(connected) = result else {
                return request.reply_error(ErrorCode::ProfileStateErr);
            };
            let Some(base) = service.profiles.base_mut(id) else {
                return request.reply_error(ErrorCode::ProfileUnavail);
            };
            let subscribed = request.is_subscription();
            request.reply(json!({
                "connected": connected,
                "connecting": base.is_connecting(adapter, device),
                "subscribed": subscribed,
                "returnValue": true,
                "adapterAddress": adapter,
                "address": device,
            }));
            if subscribed {
                base.subscribe_status(adapter, key, request);
            }
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RoleParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    role: Option<String>,
}

pub(crate) fn handle_enable(service: &mut Service, id: ProfileId, request: BusRequest) {
    let parsed: RoleParams = match params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let powered = service
        .core
        .adapter(&adapter)
        .map(|manager| manager.powered)
        .unwrap_or(false);
    if !powered {
        return request.reply_error(ErrorCode::AdapterTurnedOff);
    }
    let Some(base) = service.profiles.base_mut(id) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let Some(backend) = base.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    let role = parsed.role.unwrap_or_default();
    let roles = base.resolve_roles(&role);
    if roles.is_empty() {
        return request.reply_error(ErrorCode::BadJson);
    }
    if !role.is_empty() && base.roles_enabled(adapter, &roles) {
        return request.reply_error(ErrorCode::ProfileEnabled);
    }

    let applying = roles.clone();
    defer(
        &service.core.tx,
        async move {
            for uuid in &applying {
                backend.enable_role(uuid).await?;
            }
            Ok::<(), blued_sil::SilError>(())
        },
        move |service, result| match result {
            Err(error) => request.reply(sil_error_body(&adapter, error)),
            Ok(()) => {
                if let Some(base) = service.profiles.base_mut(id) {
                    let enabled = base.enabled_roles.entry(adapter).or_default();
                    for uuid in roles {
                        if !enabled.contains(&uuid) {
                            enabled.push(uuid);
                        }
                    }
                }
                request.reply(json!({
                    "returnValue": true,
                    "adapterAddress": adapter,
                }));
            }
        },
    );
}

pub(crate) fn handle_disable(service: &mut Service, id: ProfileId, request: BusRequest) {
    let parsed: RoleParams = match params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(base) = service.profiles.base_mut(id) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let Some(backend) = base.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    let role = parsed.role.unwrap_or_default();
    let roles = base.resolve_roles(&role);
    if roles.is_empty() {
        return request.reply_error(ErrorCode::BadJson);
    }
    if !base.roles_enabled(adapter, &roles) {
        return request.reply_error(ErrorCode::ProfileNotEnabled);
    }

    let applying = roles.clone();
    defer(
        &service.core.tx,
        async move {
            for uuid in &applying {
                backend.disable_role(uuid).await?;
            }
            Ok::<(), blued_sil::SilError>(())
        },
        move |service, result| match result {
            Err(error) => request.reply(sil_error_body(&adapter, error)),
            Ok(()) => {
                if let Some(base) = service.profiles.base_mut(id) {
                    if let Some(enabled) = base.enabled_roles.get_mut(&adapter) {
                        enabled.retain(|uuid| !roles.contains(uuid));
                    }
                }
                request.reply(json!({
                    "returnValue": true,
                    "adapterAddress": adapter,
                }));
            }
        },
    );
}

/// Applies a profile property change; returns the new connected state
/// when the change carried one.
pub(crate) fn handle_properties_changed(
    service: &mut Service,
    id: ProfileId,
    adapter: Address,
    device: Address,
    properties: &[DeviceProperty],
) -> Option<bool> {
    let connected = properties.iter().rev().find_map(|property| match property {
        DeviceProperty::Connected(connected) => Some(*connected),
        _ => None,
    })?;

    let base = service.profiles.base_mut(id)?;
    if connected {
        base.unmark_connecting(adapter, device);
        base.mark_connected(adapter, device);
    } else {
        base.unmark_connected(adapter, device);
    }
    base.notify_status(adapter, device);

    // A watch still present at this point belongs to a connection we
    // did not take down ourselves; the remote end did.
    if !connected {
        base.remove_connect_watch(adapter, device, true, true);
    }
    Some(connected)
}

/// Record of enabled roles, exposed for the display-assignment logic.
pub(crate) fn record_enabled_role(base: &mut ProfileBase, adapter: Address, uuid: String) {
    let enabled = base.enabled_roles.entry(adapter).or_default();
    if !enabled.contains(&uuid) {
        enabled.push(uuid);
    }
}
