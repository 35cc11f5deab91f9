//! Pairing protocol: outgoing and incoming flows, secret prompts and
//! cancellation.
//!
//! Outgoing pairing is a two-step sequence: discovery is canceled
//! first, and only once the stack confirms discovery stopped is the
//! actual pair call issued. Incoming pairing rides on the
//! `awaitPairingRequests` subscription; prompts are routed to whichever
//! watch matches the pairing direction.

use blued_common::{Address, BusRequest, ClientWatch, ErrorCode, WatchContext, params};
use blued_sil::types::{AdapterProperty, PairingIoCapability, PairingSecret, PairingSecretType};
use blued_sil::SilError;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::adapter::AdapterManager;
use crate::adapter::pair::PairingDirection;
use crate::service::{Message, Resume, Service, defer, sil_error_body};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PairParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

pub(crate) fn pair(service: &mut Service, request: BusRequest) {
    let parsed: PairParams =
        match params::parse(request.payload(), &[("address", ErrorCode::AddrParamMissing)]) {
            Ok(parsed) => parsed,
            Err(code) => return request.reply_error(code),
        };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };

    if manager.outgoing_pairing_watch.is_some() {
        return request.reply_error(ErrorCode::AllowOneSubscribe);
    }
    if manager.pair_state.is_pairing() {
        return request.reply_error(ErrorCode::PairingInProg);
    }
    let device = parsed.address;
    let Some(entry) = manager.inventory.device(&device) else {
        return request.reply_error(ErrorCode::DeviceNotAvail);
    };
    if entry.paired {
        return request.reply(sil_error_body(&adapter, SilError::DeviceAlreadyPaired));
    }

    let tx = manager.tx.clone();
    let watch = ClientWatch::new(
        request,
        WatchContext::device(adapter, device),
        move || {
            let _ = tx.send(Message::Resume(Box::new(move |service: &mut Service| {
                pairing_watch_dropped(service, adapter, false);
            }) as Resume));
        },
    );
    watch.post(json!({
        "adapterAddress": adapter,
        "subscribed": true,
        "returnValue": true,
    }));
    manager.outgoing_pairing_watch = Some(watch);
    manager.start_pairing(device, PairingDirection::Outgoing);

    // Device discovery has to be stopped before the stack will pair.
    let sil = manager.sil.clone();
    defer(
        &service.core.tx,
        async move { sil.cancel_discovery().await },
        move |service, result| cancel_discovery_done(service, adapter, device, result.is_ok()),
    );
}

fn stop_disc_fail_body(adapter: &Address, subscribed: bool) -> Value {
    json!({
        "adapterAddress": adapter,
        "subscribed": subscribed,
        "returnValue": false,
        "errorCode": ErrorCode::StopDiscFail.code(),
        "errorText": ErrorCode::StopDiscFail.text(),
    })
}

fn cancel_discovery_done(service: &mut Service, adapter: Address, device: Address, stopped: bool) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };

    if !stopped {
        if manager.pair_state.is_outgoing() {
            if let Some(watch) = manager.outgoing_pairing_watch.take() {
                watch.post(stop_disc_fail_body(&adapter, false));
            }
            manager.stop_pairing();
        } else if manager.pair_state.is_incoming() {
            if let Some(watch) = &manager.incoming_pairing_watch {
                watch.post(stop_disc_fail_body(&adapter, true));
            }
        }
        return;
    }

    if !manager.pair_state.is_outgoing() || manager.outgoing_pairing_watch.is_none() {
        return;
    }

    if manager.discovering {
        // The stack reported success but discovery is still running;
        // pairing cannot proceed and state is restored.
        if let Some(watch) = manager.outgoing_pairing_watch.take() {
            watch.post(stop_disc_fail_body(&adapter, false));
        }
        manager.stop_pairing();
        return;
    }

    let sil = manager.sil.clone();
    defer(
        &service.core.tx,
        async move { sil.pair(device).await },
        move |service, result| pair_done(service, adapter, result),
    );
}

fn pair_done(service: &mut Service, adapter: Address, result: Result<(), SilError>) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };
    if !manager.pair_state.is_pairing() {
        return;
    }
    debug!(adapter = %adapter, success = result.is_ok(), "outgoing pairing finished");

    let body = match result {
        Ok(()) => json!({
            "adapterAddress": adapter,
            "subscribed": false,
            "returnValue": true,
            "request": "endPairing",
        }),
        Err(error) => json!({
            "adapterAddress": adapter,
            "subscribed": false,
            "returnValue": false,
            "request": "endPairing",
            "errorCode": error.code(),
            "errorText": error.to_string(),
        }),
    };
    manager.stop_pairing();
    if let Some(watch) = manager.outgoing_pairing_watch.take() {
        watch.post(body);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SupplyPasskeyParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    passkey: u32,
}

pub(crate) fn supply_passkey(service: &mut Service, request: BusRequest) {
    let parsed: SupplyPasskeyParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AddrParamMissing),
            ("passkey", ErrorCode::PasskeyParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    supply_secret(
        service,
        request,
        parsed.address,
        PairingSecret::Passkey(parsed.passkey),
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SupplyPinCodeParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    pin: String,
}

pub(crate) fn supply_pin_code(service: &mut Service, request: BusRequest) {
    let parsed: SupplyPinCodeParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AddrParamMissing),
            ("pin", ErrorCode::PinParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    supply_secret(
        service,
        request,
        parsed.address,
        PairingSecret::PinCode(parsed.pin),
    );
}

fn supply_secret(
    service: &mut Service,
    request: BusRequest,
    address: Address,
    secret: PairingSecret,
) {
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    if !manager.pair_state.is_pairing() {
        return request.reply_error(ErrorCode::NoPairing);
    }
    if manager.pair_state.device() != Some(address) {
        return request.reply_error(ErrorCode::NoPairingForRequestedAddress);
    }

    match manager.sil.supply_pairing_secret(address, secret) {
        Ok(()) => request.reply(json!({
            "adapterAddress": adapter,
            "returnValue": true,
        })),
        Err(error) => request.reply(sil_error_body(&adapter, error)),
    }

    // An incoming pairing is done once the secret left for the stack;
    // the paired state surfaces through device property changes.
    if manager.pair_state.is_incoming() {
        manager.stop_pairing();
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SupplyConfirmationParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    accept: bool,
}

pub(crate) fn supply_passkey_confirmation(service: &mut Service, request: BusRequest) {
    let parsed: SupplyConfirmationParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AddrParamMissing),
            ("accept", ErrorCode::AcceptParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    if !manager.pair_state.is_pairing() {
        return request.reply_error(ErrorCode::NoPairing);
    }
    if manager.pair_state.device() != Some(parsed.address) {
        return request.reply_error(ErrorCode::NoPairingForRequestedAddress);
    }

    match manager
        .sil
        .supply_pairing_confirmation(parsed.address, parsed.accept)
    {
        Ok(()) => request.reply(json!({
            "adapterAddress": adapter,
            "returnValue": true,
        })),
        Err(error) => request.reply(sil_error_body(&adapter, error)),
    }

    if manager.pair_state.is_incoming() {
        manager.stop_pairing();
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CancelPairingParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
}

pub(crate) fn cancel_pairing(service: &mut Service, request: BusRequest) {
    let parsed: CancelPairingParams =
        match params::parse(request.payload(), &[("address", ErrorCode::AddrParamMissing)]) {
            Ok(parsed) => parsed,
            Err(code) => return request.reply_error(code),
        };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    if !manager.pair_state.is_pairing() {
        return request.reply_error(ErrorCode::NoPairing);
    }
    if manager.inventory.device(&parsed.address).is_none() {
        return request.reply_error(ErrorCode::DeviceNotAvail);
    }
    if manager.pair_state.device() != Some(parsed.address) {
        return request.reply_error(ErrorCode::NoPairingForRequestedAddress);
    }

    let sil = manager.sil.clone();
    let address = parsed.address;
    defer(
        &service.core.tx,
        async move { sil.cancel_pairing(address).await },
        move |service, result| {
            request.reply(json!({
                "adapterAddress": adapter,
                "returnValue": true,
            }));

            let Some(manager) = service.core.adapter_mut(&adapter) else {
                return;
            };
            if result.is_ok() {
                // An incoming pairing keeps its subscription open after
                // a cancel; an outgoing one is finished.
                let body = json!({
                    "adapterAddress": adapter,
                    "subscribed": manager.pair_state.is_incoming(),
                    "returnValue": false,
                    "request": "endPairing",
                    "errorCode": ErrorCode::PairingCanceled.code(),
                    "errorText": ErrorCode::PairingCanceled.text(),
                });
                if manager.pair_state.is_outgoing() {
                    if let Some(watch) = manager.outgoing_pairing_watch.take() {
                        watch.post(body);
                    }
                } else if let Some(watch) = &manager.incoming_pairing_watch {
                    watch.post(body);
                }
                manager.stop_pairing();
            } else {
                let body = json!({
                    "adapterAddress": adapter,
                    "subscribed": true,
                    "returnValue": true,
                    "request": "continuePairing",
                });
                if manager.pair_state.is_outgoing() {
                    if let Some(watch) = &manager.outgoing_pairing_watch {
                        watch.post(body);
                    }
                } else if let Some(watch) = &manager.incoming_pairing_watch {
                    watch.post(body);
                }
            }
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UnpairParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
}

pub(crate) fn unpair(service: &mut Service, request: BusRequest) {
    let parsed: UnpairParams =
        match params::parse(request.payload(), &[("address", ErrorCode::AddrParamMissing)]) {
            Ok(parsed) => parsed,
            Err(code) => return request.reply_error(code),
        };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    if manager.inventory.device(&parsed.address).is_none() {
        return request.reply_error(ErrorCode::DeviceNotAvail);
    }

    let sil = manager.sil.clone();
    let address = parsed.address;
    defer(
        &service.core.tx,
        async move { sil.unpair(address).await },
        move |_service, result| match result {
            Ok(()) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
            })),
            Err(_) => request.reply_error(ErrorCode::UnpairFail),
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AwaitPairingParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

pub(crate) fn await_pairing_requests(service: &mut Service, request: BusRequest) {
    let _parsed: AwaitPairingParams = match params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    if !request.is_subscription() {
        return request.reply_error(ErrorCode::MthdNotSubscribed);
    }
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };

    // Re-subscribing is idempotent for the same caller; anyone else is
    // turned away while a listener is installed.
    if let Some(existing) = &manager.incoming_pairing_watch {
        if existing.request().sender() != request.sender() {
            return request.reply_error(ErrorCode::AllowOneSubscribe);
        }
    }

    let tx = manager.tx.clone();
    let watch = ClientWatch::new(request, WatchContext::adapter(adapter), move || {
        let _ = tx.send(Message::Resume(Box::new(move |service: &mut Service| {
            pairing_watch_dropped(service, adapter, true);
        }) as Resume));
    });
    manager.incoming_pairing_watch = Some(watch);

    let sil = manager.sil.clone();
    defer(
        &service.core.tx,
        async move {
            sil.set_adapter_property(AdapterProperty::Pairable(true))
                .await
        },
        move |service, result| {
            let Some(manager) = service.core.adapter_mut(&adapter) else {
                return;
            };
            let Some(watch) = &manager.incoming_pairing_watch else {
                return;
            };
            match result {
                Ok(()) => {
                    manager.pair_state.set_pairable(true);
                    watch.post(json!({
                        "adapterAddress": adapter,
                        "subscribed": true,
                        "returnValue": true,
                    }));
                    manager.notify_root_status();
                }
                Err(_) => {
                    watch.post(json!({
                        "adapterAddress": adapter,
                        "subscribed": false,
                        "returnValue": false,
                        "errorCode": ErrorCode::PairableFail.code(),
                        "errorText": ErrorCode::PairableFail.text(),
                    }));
                    manager.incoming_pairing_watch = None;
                }
            }
        },
    );
}

/// Compensation when a pairing subscriber disappears.
pub(crate) fn pairing_watch_dropped(service: &mut Service, adapter: Address, incoming: bool) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };
    debug!(adapter = %adapter, incoming, "pairing listener dropped");

    if incoming {
        manager.incoming_pairing_watch = None;
        if manager.io_capability != PairingIoCapability::NoInputNoOutput
            && manager.pair_state.is_pairable()
        {
            let sil = manager.sil.clone();
            defer(
                &service.core.tx,
                async move {
                    sil.set_adapter_property(AdapterProperty::Pairable(false))
                        .await
                },
                move |service, result| {
                    if result.is_ok() {
                        if let Some(manager) = service.core.adapter_mut(&adapter) {
                            manager.pair_state.set_pairable(false);
                            manager.notify_root_status();
                        }
                    }
                },
            );
        }
    } else {
        let abort = manager.pair_state.is_pairing() && manager.pair_state.is_outgoing();
        manager.outgoing_pairing_watch = None;
        if abort {
            if let Some(device) = manager.pair_state.device() {
                let sil = manager.sil.clone();
                tokio::spawn(async move {
                    if sil.cancel_pairing(device).await.is_ok() {
                        debug!(device = %device, "pairing aborted after client loss");
                    }
                });
            }
            manager.stop_pairing();
        }
    }
}

/// Routes a pairing prompt to the watch matching the direction; a
/// prompt with nobody listening aborts the pairing slot.
fn post_prompt(manager: &mut AdapterManager, address: Address, mut body: Value) {
    if manager.pair_state.is_incoming() {
        if let Some(name) = manager
            .inventory
            .device(&address)
            .map(|device| device.name.clone())
        {
            if let Some(object) = body.as_object_mut() {
                object.insert("name".into(), json!(name));
            }
        }
        if let Some(watch) = &manager.incoming_pairing_watch {
            watch.post(body);
            return;
        }
    } else if manager.pair_state.is_outgoing() {
        if let Some(watch) = &manager.outgoing_pairing_watch {
            watch.post(body);
            return;
        }
    }
    warn!(device = %address, "pairing prompt with no listener");
    manager.stop_pairing();
}

fn begin_incoming_pair(manager: &mut AdapterManager, address: Address) {
    if manager.pair_state.is_pairing() {
        warn!(
            device = %address,
            "incoming pairing request while another pairing is in progress"
        );
        return;
    }
    if manager.incoming_pairing_watch.is_none() {
        return;
    }

    match manager
        .inventory
        .device(&address)
        .map(|device| device.name.clone())
    {
        Some(name) => {
            manager.start_pairing(address, PairingDirection::Incoming);
            if let Some(watch) = &manager.incoming_pairing_watch {
                watch.post(json!({
                    "adapterAddress": manager.address,
                    "request": "incomingPairRequest",
                    "address": address,
                    "name": name,
                    "subscribed": true,
                    "returnValue": true,
                }));
            }
        }
        None => {
            if let Some(watch) = &manager.incoming_pairing_watch {
                watch.post(json!({
                    "adapterAddress": manager.address,
                    "subscribed": true,
                    "returnValue": false,
                    "errorCode": ErrorCode::IncomingPairDevUnavail.code(),
                    "errorText": ErrorCode::IncomingPairDevUnavail.text(),
                }));
            }
        }
    }
}

pub(crate) fn on_secret_requested(
    service: &mut Service,
    adapter: Address,
    address: Address,
    secret_type: PairingSecretType,
) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };
    if !manager.pair_state.is_pairing() {
        begin_incoming_pair(manager, address);
    }
    let request_kind = match secret_type {
        PairingSecretType::Passkey => "enterPasskey",
        PairingSecretType::PinCode => "enterPinCode",
    };
    post_prompt(
        manager,
        address,
        json!({
            "adapterAddress": adapter,
            "subscribed": true,
            "returnValue": true,
            "address": address,
            "request": request_kind,
        }),
    );
}

pub(crate) fn on_pin_code_displayed(
    service: &mut Service,
    adapter: Address,
    address: Address,
    pin: String,
) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };
    if !manager.pair_state.is_pairing() {
        begin_incoming_pair(manager, address);
    }
    post_prompt(
        manager,
        address,
        json!({
            "adapterAddress": adapter,
            "subscribed": true,
            "returnValue": true,
            "address": address,
            "request": "displayPinCode",
            "pin": pin,
        }),
    );
}

pub(crate) fn on_passkey_displayed(
    service: &mut Service,
    adapter: Address,
    address: Address,
    passkey: u32,
) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };
    if !manager.pair_state.is_pairing() {
        begin_incoming_pair(manager, address);
    }
    post_prompt(
        manager,
        address,
        json!({
            "adapterAddress": adapter,
            "subscribed": true,
            "returnValue": true,
            "address": address,
            "request": "displayPasskey",
            "passkey": passkey,
        }),
    );
}

pub(crate) fn on_confirmation_requested(
    service: &mut Service,
    adapter: Address,
    address: Address,
    passkey: u32,
) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };
    if !manager.pair_state.is_pairing() {
        begin_incoming_pair(manager, address);
    }
    post_prompt(
        manager,
        address,
        json!({
            "adapterAddress": adapter,
            "subscribed": true,
            "returnValue": true,
            "address": address,
            "request": "confirmPasskey",
            "passkey": passkey,
        }),
    );
}

pub(crate) fn on_pairing_canceled(service: &mut Service, adapter: Address) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };
    if !manager.pair_state.is_pairing() {
        return;
    }
    debug!(adapter = %adapter, "pairing canceled by the stack");

    let body = json!({
        "adapterAddress": adapter,
        "subscribed": true,
        "returnValue": false,
        "request": "endPairing",
        "errorCode": ErrorCode::PairingCancelTo.code(),
        "errorText": ErrorCode::PairingCancelTo.text(),
    });
    if manager.pair_state.is_incoming() {
        if let Some(watch) = &manager.incoming_pairing_watch {
            watch.post(body.clone());
        }
    }
    if manager.pair_state.is_outgoing() {
        if let Some(watch) = &manager.outgoing_pairing_watch {
            watch.post(body);
        }
    }
    manager.stop_pairing();
}
