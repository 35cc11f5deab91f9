//! OPP: outgoing pushes and incoming transfer arbitration.
//!
//! Outgoing transfers bind the stack's transfer handle to the pushing
//! client's watch; the client disappearing cancels the transfer on the
//! stack. Incoming transfers are announced on the per-adapter
//! `awaitTransferRequest` watch as push requests with 3-digit request
//! ids and wait for accept/reject; `monitorTransfer` subscribers see
//! per-transfer progress.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use blued_common::{Address, BusRequest, ClientWatch, ErrorCode, SubscriptionPoint, WatchContext, params};
use blued_sil::types::ProfileId;
use blued_sil::{OppEvent, SilAdapter, SilOpp};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::profile::base::{self, ProfileBase};
use crate::profile::{allocate_request_id, watch_for};
use crate::service::{Message, Resume, Service, defer};
use crate::storage;

/// One outgoing transfer bound to its pushing client.
struct Transfer {
    device: Address,
    adapter: Address,
    watch: ClientWatch,
    canceled: bool,
    client_disappeared: bool,
}

/// One incoming push awaiting or undergoing transfer.
#[derive(Debug, Clone)]
struct PushRequest {
    request_id: String,
    adapter: Address,
    address: Address,
    name: String,
    file_name: String,
    file_size: u64,
    transferred: u64,
}

/// The OPP profile service.
pub(crate) struct OppProfile {
    pub(crate) base: ProfileBase,
    impls: HashMap<Address, Arc<dyn SilOpp>>,
    next_request_id: u16,
    request_index: u64,
    transfers: HashMap<u64, Transfer>,
    push_requests: BTreeMap<u64, PushRequest>,
    transfer_ids: BTreeMap<u64, u64>,
    incoming_watches: Vec<ClientWatch>,
    monitor_subscriptions: HashMap<Address, SubscriptionPoint>,
    transfer_requests_allowed: HashMap<Address, bool>,
}

impl OppProfile {
    pub(crate) fn new() -> Self {
        Self {
            base: ProfileBase::new(ProfileId::Opp),
            impls: HashMap::new(),
            next_request_id: 1,
            request_index: 0,
            transfers: HashMap::new(),
            push_requests: BTreeMap::new(),
            transfer_ids: BTreeMap::new(),
            incoming_watches: Vec::new(),
            monitor_subscriptions: HashMap::new(),
            transfer_requests_allowed: HashMap::new(),
        }
    }

    pub(crate) fn initialize(&mut self, adapter: Address, sil: &dyn SilAdapter) {
        self.base.initialize(adapter, sil);
        if let Some(backend) = sil.opp() {
            self.impls.insert(adapter, backend);
        }
    }

    pub(crate) fn reset(&mut self, adapter: &Address) {
        self.base.reset(adapter);
        self.impls.remove(adapter);
        self.transfers.retain(|_, transfer| transfer.adapter != *adapter);
        let dropped: Vec<u64> = self
            .push_requests
            .iter()
            .filter(|(_, request)| request.adapter == *adapter)
            .map(|(index, _)| *index)
            .collect();
        for index in dropped {
            self.push_requests.remove(&index);
            self.transfer_ids.remove(&index);
        }
        self.incoming_watches
            .retain(|watch| watch.context().adapter_address != Some(*adapter));
        self.monitor_subscriptions.remove(adapter);
        self.transfer_requests_allowed.remove(adapter);
    }

    fn impl_for(&self, adapter: &Address) -> Option<Arc<dyn SilOpp>> {
        self.impls.get(adapter).cloned()
    }

    fn transfer_requests_allowed(&self, adapter: &Address) -> bool {
        self.transfer_requests_allowed
            .get(adapter)
            .copied()
            .unwrap_or(false)
    }

    fn find_push_request(&self, request_id: &str) -> Option<u64> {
        self.push_requests
            .iter()
            .find(|(_, request)| request.request_id == request_id)
            .map(|(index, _)| *index)
    }

    /// The `transfers` array for `monitorTransfer` posts.
    fn transfers_json(&self) -> Vec<Value> {
        self.transfer_ids
            .keys()
            .filter_map(|index| self.push_requests.get(index))
            .map(|request| {
                json!({
                    "adapterAddress": request.adapter,
                    "requestId": request.request_id,
                    "address": request.address,
                    "name": request.name,
                    "fileName": request.file_name,
                    "fileSize": request.file_size,
                    "transferred": request.transferred,
                })
            })
            .collect()
    }

    /// Posts the current transfer set to an adapter's monitor
    /// subscribers.
    fn notify_transfer_status(&mut self, adapter: Address) {
        let body = json!({
            "adapterAddress": adapter,
            "subscribed": true,
            "returnValue": true,
            "transfers": self.transfers_json(),
        });
        if let Some(point) = self.monitor_subscriptions.get_mut(&adapter) {
            point.post(&body);
        }
    }
}

/// Routes `/opp` requests.
pub(crate) fn dispatch(service: &mut Service, request: BusRequest) {
    if service.profiles.opp.is_none() {
        return request.reply_error(ErrorCode::ProfileUnavail);
    }
    match request.method() {
        "connect" => base::handle_connect(service, ProfileId::Opp, request),
        "disconnect" => base::handle_disconnect(service, ProfileId::Opp, request),
        "getStatus" => base::handle_get_status(service, ProfileId::Opp, request),
        "pushFile" => push_file(service, request),
        "awaitTransferRequest" => await_transfer_request(service, request),
        "acceptTransferRequest" => confirm_transfer_request(service, request, true),
        "rejectTransferRequest" => confirm_transfer_request(service, request, false),
        "cancelTransfer" => cancel_transfer(service, request),
        "monitorTransfer" => monitor_transfer(service, request),
        _ => request.reply_error(ErrorCode::MsgParseFail),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PushFileParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    source_file: String,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

fn push_file(service: &mut Service, request: BusRequest) {
    let parsed: PushFileParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AddrParamMissing),
            ("sourceFile", ErrorCode::SrcfileParamMissing),
        ],
    ) {
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
    let Some(opp) = service.profiles.opp.as_ref() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    if !opp.base.is_connected(adapter, device) {
        return request.reply_error(ErrorCode::OppNotConnected);
    }
    let Some(backend) = opp.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    // Outgoing files are always resolved under the mountable storage
    // root; anything escaping it is treated as invalid.
    let source = storage::resolve_source(&service.core.config.storage_root, &parsed.source_file);
    let Some(source) = source.filter(|path| storage::is_valid_source(path)) else {
        return request.reply_error(ErrorCode::SrcfileInvalid);
    };

    request.reply(json!({
        "returnValue": true,
        "adapterAddress": adapter,
        "subscribed": request.is_subscription(),
    }));

    defer(
        &service.core.tx,
        async move { backend.push_file(device, source).await },
        move |service, result| {
            let transfer_id = match result {
                Ok(transfer_id) => transfer_id,
                Err(_) => {
                    request.reply_error_subscribed(ErrorCode::OppPushPullFail);
                    return;
                }
            };
            let Some(opp) = service.profiles.opp.as_mut() else {
                return;
            };
            debug!(device = %device, transfer_id, "outgoing transfer created");
            let tx = service.core.tx.clone();
            let watch = ClientWatch::new(
                request,
                WatchContext::device(adapter, device),
                move || {
                    let _ = tx.send(Message::Resume(Box::new(move |service: &mut Service| {
                        cancel_outgoing_transfer(service, transfer_id, true);
                    }) as Resume));
                },
            );
            opp.transfers.insert(
                transfer_id,
                Transfer {
                    device,
                    adapter,
                    watch,
                    canceled: false,
                    client_disappeared: false,
                },
            );
        },
    );
}

/// Cancels an outgoing transfer, keeping it around until the stack
/// confirms the cancellation.
fn cancel_outgoing_transfer(service: &mut Service, transfer_id: u64, client_disappeared: bool) {
    let Some(opp) = service.profiles.opp.as_mut() else {
        return;
    };
    let Some(transfer) = opp.transfers.get_mut(&transfer_id) else {
        return;
    };
    debug!(transfer_id, client_disappeared, "canceling outgoing transfer");
    transfer.canceled = true;
    transfer.client_disappeared = client_disappeared;
    let adapter = transfer.adapter;
    let Some(backend) = opp.impl_for(&adapter) else {
        return;
    };

    defer(
        &service.core.tx,
        async move { backend.cancel_transfer(transfer_id).await },
        move |service, result| {
            if result.is_err() {
                warn!(transfer_id, "stack did not confirm transfer cancel");
            }
            let Some(opp) = service.profiles.opp.as_mut() else {
                return;
            };
            if let Some(transfer) = opp.transfers.remove(&transfer_id) {
                if !transfer.client_disappeared {
                    transfer.watch.post(json!({
                        "returnValue": false,
                        "adapterAddress": transfer.adapter,
                        "subscribed": false,
                        "transferred": 0,
                        "errorCode": ErrorCode::OppTransferCanceled.code(),
                        "errorText": ErrorCode::OppTransferCanceled.text(),
                    }));
                }
            }
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AwaitTransferParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

fn await_transfer_request(service: &mut Service, request: BusRequest) {
    if params::parse::<AwaitTransferParams>(request.payload(), &[])
        .map_err(|code| request.reply_error(code))
        .is_err()
    {
        return;
    }
    if !request.is_subscription() {
        return request.reply_error(ErrorCode::MthdNotSubscribed);
    }
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
    if request.sender().is_empty() {
        return request.reply_error(ErrorCode::MessageOwnerMissing);
    }
    let Some(opp) = service.profiles.opp.as_mut() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    if watch_for(&opp.incoming_watches, adapter).is_some() {
        return request.reply_error(ErrorCode::AllowOneSubscribe);
    }

    let tx = service.core.tx.clone();
    let watch = ClientWatch::new(request, WatchContext::adapter(adapter), move || {
        let _ = tx.send(Message::Resume(Box::new(move |service: &mut Service| {
            incoming_watch_dropped(service, adapter);
        }) as Resume));
    });
    watch.post(json!({
        "adapterAddress": adapter,
        "subscribed": true,
        "returnValue": true,
    }));
    opp.incoming_watches.push(watch);
    opp.transfer_requests_allowed.insert(adapter, true);
}

fn incoming_watch_dropped(service: &mut Service, adapter: Address) {
    let Some(opp) = service.profiles.opp.as_mut() else {
        return;
    };
    debug!(adapter = %adapter, "incoming transfer listener dropped");
    opp.incoming_watches
        .retain(|watch| watch.context().adapter_address != Some(adapter) || !watch.is_client_gone());
    opp.transfer_requests_allowed.insert(adapter, false);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RequestIdParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    request_id: String,
}

fn confirm_transfer_request(service: &mut Service, request: BusRequest, accept: bool) {
    let parsed: RequestIdParams = match params::parse(
        request.payload(),
        &[("requestId", ErrorCode::OppRequestIdParamMissing)],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(opp) = service.profiles.opp.as_mut() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let Some(backend) = opp.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    if !opp.transfer_requests_allowed(&adapter) {
        return request.reply_error(ErrorCode::OppTransferNotAllowed);
    }
    let Some(index) = opp.find_push_request(&parsed.request_id) else {
        return request.reply_error(ErrorCode::OppRequestIdNotExist);
    };
    if accept {
        let fully_transferred = opp
            .push_requests
            .get(&index)
            .is_some_and(|push| push.transferred == push.file_size);
        if fully_transferred {
            return request.reply_error(ErrorCode::OppAlreadyAcceptFile);
        }
    }
    let Some(transfer_id) = opp.transfer_ids.get(&index).copied() else {
        return request.reply_error(ErrorCode::OppTransferIdNotExist);
    };

    if !accept {
        // A rejected request will never see progress callbacks; its
        // transfer binding goes right away, the bookkeeping entry goes
        // once the stack confirms.
        opp.transfer_ids.remove(&index);
    }

    defer(
        &service.core.tx,
        async move {
            backend
                .supply_transfer_confirmation(transfer_id, accept)
                .await
        },
        move |service, result| {
            if !accept {
                if let Some(opp) = service.profiles.opp.as_mut() {
                    opp.push_requests.remove(&index);
                }
            }
            match result {
                Ok(()) => request.reply(json!({
                    "returnValue": true,
                    "adapterAddress": adapter,
                    "subscribed": false,
                })),
                Err(_) => request.reply_error(ErrorCode::OppStateErr),
            }
        },
    );
}

fn cancel_transfer(service: &mut Service, request: BusRequest) {
    let parsed: RequestIdParams = match params::parse(
        request.payload(),
        &[("requestId", ErrorCode::OppRequestIdParamMissing)],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(opp) = service.profiles.opp.as_mut() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let Some(backend) = opp.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    if !opp.transfer_requests_allowed(&adapter) {
        return request.reply_error(ErrorCode::OppTransferNotAllowed);
    }
    let Some(index) = opp.find_push_request(&parsed.request_id) else {
        return request.reply_error(ErrorCode::OppRequestIdNotExist);
    };
    let Some(transfer_id) = opp.transfer_ids.get(&index).copied() else {
        return request.reply_error(ErrorCode::OppTransferIdNotExist);
    };

    defer(
        &service.core.tx,
        async move { backend.cancel_transfer(transfer_id).await },
        move |service, result| {
            if let Some(opp) = service.profiles.opp.as_mut() {
                opp.transfer_ids.remove(&index);
                opp.push_requests.remove(&index);
            }
            match result {
                Ok(()) => request.reply(json!({
                    "returnValue": true,
                    "adapterAddress": adapter,
                    "subscribed": false,
                })),
                Err(_) => request.reply_error(ErrorCode::OppStateErr),
            }
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MonitorParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

fn monitor_transfer(service: &mut Service, request: BusRequest) {
    if params::parse::<MonitorParams>(request.payload(), &[])
        .map_err(|code| request.reply_error(code))
        .is_err()
    {
        return;
    }
    if !request.is_subscription() {
        return request.reply_error(ErrorCode::MthdNotSubscribed);
    }
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
    let Some(opp) = service.profiles.opp.as_mut() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    opp.monitor_subscriptions
        .entry(adapter)
        .or_default()
        .subscribe(request);
    opp.notify_transfer_status(adapter);
}

/// Routes an OPP stack observation.
pub(crate) fn on_event(service: &mut Service, adapter: Address, event: OppEvent) {
    match event {
        OppEvent::TransferConfirmationRequested {
            transfer_id,
            device,
            device_name,
            file_name,
            file_size,
        } => {
            let Some(opp) = service.profiles.opp.as_mut() else {
                return;
            };
            if !opp.transfer_requests_allowed(&adapter) {
                debug!(device = %device, "incoming transfer request while not accepting");
                return;
            }
            create_push_request(
                opp,
                adapter,
                transfer_id,
                device,
                device_name,
                file_name,
                file_size,
            );
        }
        OppEvent::TransferStateChanged {
            transfer_id,
            transferred,
            finished,
        } => incoming_transfer_state_changed(service, adapter, transfer_id, transferred, finished),
        OppEvent::PushProgress {
            transfer_id,
            error,
            transferred,
            total,
            finished,
        } => outgoing_push_progress(service, transfer_id, error, transferred, total, finished),
    }
}

fn create_push_request(
    opp: &mut OppProfile,
    adapter: Address,
    transfer_id: u64,
    device: Address,
    device_name: String,
    file_name: String,
    file_size: u64,
) {
    let mut next = opp.next_request_id;
    let request_id =
        allocate_request_id(&mut next, &mut opp.push_requests, |push| push.request_id.as_str());
    opp.next_request_id = next;

    let index = opp.request_index;
    opp.request_index += 1;
    let push = PushRequest {
        request_id: request_id.clone(),
        adapter,
        address: device,
        name: device_name,
        file_name,
        file_size,
        transferred: 0,
    };
    opp.transfer_ids.insert(index, transfer_id);

    if let Some(watch) = watch_for(&opp.incoming_watches, adapter) {
        watch.post(json!({
            "adapterAddress": adapter,
            "request": {
                "requestId": push.request_id,
                "address": push.address,
                "name": push.name,
                "fileName": push.file_name,
                "fileSize": push.file_size,
            },
        }));
    }
    opp.push_requests.insert(index, push);
    debug!(device = %device, request_id, transfer_id, "incoming push request created");
}

fn incoming_transfer_state_changed(
    service: &mut Service,
    adapter: Address,
    transfer_id: u64,
    transferred: u64,
    finished: bool,
) {
    let Some(opp) = service.profiles.opp.as_mut() else {
        return;
    };
    let Some(index) = opp
        .transfer_ids
        .iter()
        .find(|(_, id)| **id == transfer_id)
        .map(|(index, _)| *index)
    else {
        return;
    };
    if !opp.push_requests.contains_key(&index) {
        return;
    }

    if finished {
        let complete = opp
            .push_requests
            .get(&index)
            .is_some_and(|push| push.transferred == push.file_size);
        if !complete {
            opp.notify_transfer_status(adapter);
        }
        opp.transfer_ids.remove(&index);
        opp.push_requests.remove(&index);
        return;
    }

    let complete = match opp.push_requests.get_mut(&index) {
        Some(push) => {
            push.transferred += transferred;
            push.transferred == push.file_size
        }
        None => return,
    };
    opp.notify_transfer_status(adapter);
    if complete {
        opp.transfer_ids.remove(&index);
        opp.push_requests.remove(&index);
    }
}

fn outgoing_push_progress(
    service: &mut Service,
    transfer_id: u64,
    error: Option<blued_sil::SilError>,
    transferred: u64,
    total: u64,
    finished: bool,
) {
    let Some(opp) = service.profiles.opp.as_mut() else {
        return;
    };

    if error.is_some() {
        let canceled = opp
            .transfers
            .get(&transfer_id)
            .map(|transfer| transfer.canceled)
            .unwrap_or(true);
        if !canceled {
            if let Some(transfer) = opp.transfers.remove(&transfer_id) {
                transfer.watch.post(json!({
                    "returnValue": false,
                    "adapterAddress": transfer.adapter,
                    "subscribed": false,
                    "errorCode": ErrorCode::OppPushPullFail.code(),
                    "errorText": ErrorCode::OppPushPullFail.text(),
                }));
            }
        }
        return;
    }

    let Some(transfer) = opp.transfers.get(&transfer_id) else {
        return;
    };
    transfer.watch.post(json!({
        "returnValue": true,
        "adapterAddress": transfer.adapter,
        "subscribed": !finished,
        "transferred": transferred,
        "size": total,
    }));

    if finished {
        // Only remove when not mid-cancel; the cancel completion owns
        // the teardown in that case.
        let canceled = transfer.canceled;
        if !canceled {
            opp.transfers.remove(&transfer_id);
        }
    }
}
