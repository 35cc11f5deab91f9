//! LE scanning and advertising (`/le`).
//!
//! Scan filters are independent: each `startScan` subscription gets its
//! own stack-side filter and scan id, and the shared LE discovery
//! engine runs while at least one filter is registered. Advertising
//! instances are bound to their subscriber and are disabled and
//! unregistered when the subscriber disappears.

use blued_common::{Address, BusRequest, ClientWatch, ErrorCode, WatchContext, params};
use blued_sil::types::{AdvertiseData, AdvertiserSettings, LeDiscoveryFilter};
use blued_sil::SilError;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::adapter::advertise::fits_advertising_pdu;
use crate::service::{Message, Resume, Service, defer, sil_error_body};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartScanParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
    #[serde(flatten)]
    filter: LeDiscoveryFilter,
}

pub(crate) fn start_scan(service: &mut Service, request: BusRequest) {
    let parsed: StartScanParams = match params::parse(request.payload(), &[]) {
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

    let scan_id = match manager.sil.add_le_discovery_filter(parsed.filter) {
        Ok(scan_id) => scan_id,
        Err(_) => return request.reply_error(ErrorCode::StartDiscFail),
    };

    // The shared LE discovery engine runs while filters exist; the
    // first registration starts it.
    if manager.scan_watches.is_empty() && manager.sil.start_le_discovery().is_err() {
        manager.sil.remove_le_discovery_filter(scan_id);
        return request.reply_error(ErrorCode::StartDiscFail);
    }

    let tx = manager.tx.clone();
    let watch = ClientWatch::new(request, WatchContext::scan(adapter, scan_id), move || {
        let _ = tx.send(Message::Resume(Box::new(move |service: &mut Service| {
            scan_watch_dropped(service, adapter, scan_id);
        }) as Resume));
    });
    watch.post(json!({
        "returnValue": true,
        "subscribed": true,
        "adapterAddress": adapter,
    }));
    manager.scan_watches.insert(scan_id, watch);
    manager.sil.match_le_discovery_filter_devices(scan_id);
    debug!(adapter = %adapter, scan_id, "le scan registered");
}

/// Compensation when a scan subscriber disappears.
pub(crate) fn scan_watch_dropped(service: &mut Service, adapter: Address, scan_id: u32) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };
    let Some(watch) = manager.scan_watches.remove(&scan_id) else {
        return;
    };
    debug!(adapter = %adapter, scan_id, "le scan listener dropped");
    watch.post(json!({
        "subscribed": false,
        "returnValue": false,
        "adapterAddress": adapter,
    }));
    manager.inventory.drop_scan_view(scan_id);
    manager.sil.remove_le_discovery_filter(scan_id);
    if manager.scan_watches.is_empty() && manager.sil.cancel_le_discovery().is_err() {
        warn!(adapter = %adapter, "cannot stop le discovery");
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StartAdvertisingParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
    settings: Option<AdvertiserSettings>,
    advertise_data: Option<AdvertiseData>,
    scan_response: Option<AdvertiseData>,
}

pub(crate) fn start_advertising(service: &mut Service, request: BusRequest) {
    let parsed: StartAdvertisingParams = match params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    if !request.is_subscription() {
        return request.reply_error(ErrorCode::MthdNotSubscribed);
    }
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };

    let settings = parsed.settings.unwrap_or_default();
    let advertise_data = parsed.advertise_data.unwrap_or_default();
    let scan_response = parsed.scan_response.unwrap_or_default();

    let name_len = manager.name.len();
    if !fits_advertising_pdu(&advertise_data, true, name_len)
        || !fits_advertising_pdu(&scan_response, false, name_len)
    {
        return request.reply_error(ErrorCode::BleAdvExceedSizeLimit);
    }

    let sil = manager.sil.clone();
    defer(
        &service.core.tx,
        async move {
            let advertiser_id = sil.register_advertiser().await?;
            sil.start_advertising(advertiser_id, settings, advertise_data, scan_response)
                .await?;
            Ok::<u8, SilError>(advertiser_id)
        },
        move |service, result| {
            let advertiser_id = match result {
                Ok(advertiser_id) => advertiser_id,
                Err(SilError::NotAvailable) => {
                    return request.reply_error(ErrorCode::BleAdvNoMoreAdvertiser);
                }
                Err(error) => return request.reply(sil_error_body(&adapter, error)),
            };
            let Some(manager) = service.core.adapter_mut(&adapter) else {
                return request.reply_error(ErrorCode::AdapterNotAvailable);
            };

            let tx = manager.tx.clone();
            let watch = ClientWatch::new(request, WatchContext::adapter(adapter), move || {
                let _ = tx.send(Message::Resume(Box::new(move |service: &mut Service| {
                    advertiser_dropped(service, adapter, advertiser_id);
                }) as Resume));
            });
            watch.post(json!({
                "adapterAddress": adapter,
                "returnValue": true,
                "advertiserId": advertiser_id,
            }));
            manager.advertisers.insert(advertiser_id, watch);
            service.core.notify_advertising_subscribers(adapter);
        },
    );
}

/// Compensation when an advertising subscriber disappears: the
/// advertiser is first disabled, then unregistered.
pub(crate) fn advertiser_dropped(service: &mut Service, adapter: Address, advertiser_id: u8) {
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return;
    };
    if manager.advertisers.remove(&advertiser_id).is_none() {
        return;
    }
    debug!(adapter = %adapter, advertiser_id, "advertiser listener dropped");

    let sil = manager.sil.clone();
    defer(
        &service.core.tx,
        async move {
            sil.disable_advertiser(advertiser_id).await?;
            sil.unregister_advertiser(advertiser_id).await
        },
        move |service, result| {
            if result.is_err() {
                warn!(adapter = %adapter, advertiser_id, "cannot release advertiser");
            }
            service.core.notify_advertising_subscribers(adapter);
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateAdvertisingParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    advertiser_id: u8,
    settings: Option<AdvertiserSettings>,
    advertise_data: Option<AdvertiseData>,
    scan_response: Option<AdvertiseData>,
}

pub(crate) fn update_advertising(service: &mut Service, request: BusRequest) {
    let parsed: UpdateAdvertisingParams = match params::parse(
        request.payload(),
        &[("advertiserId", ErrorCode::AdvertiserIdParamMissing)],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };

    let name_len = manager.name.len();
    if parsed
        .advertise_data
        .as_ref()
        .is_some_and(|data| !fits_advertising_pdu(data, true, name_len))
        || parsed
            .scan_response
            .as_ref()
            .is_some_and(|data| !fits_advertising_pdu(data, false, name_len))
    {
        return request.reply_error(ErrorCode::BleAdvExceedSizeLimit);
    }

    let advertiser_id = parsed.advertiser_id;
    let sil = manager.sil.clone();
    defer(
        &service.core.tx,
        async move {
            if let Some(settings) = parsed.settings {
                sil.set_advertiser_parameters(advertiser_id, settings).await?;
            }
            if let Some(data) = parsed.advertise_data {
                sil.set_advertiser_data(advertiser_id, false, data).await?;
            }
            if let Some(data) = parsed.scan_response {
                sil.set_advertiser_data(advertiser_id, true, data).await?;
            }
            Ok::<(), SilError>(())
        },
        move |service, result| match result {
            Ok(()) => {
                request.reply(json!({
                    "advertiserId": advertiser_id,
                    "adapterAddress": adapter,
                    "returnValue": true,
                }));
                service.core.notify_advertising_subscribers(adapter);
            }
            Err(error) => request.reply(sil_error_body(&adapter, error)),
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DisableAdvertisingParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    advertiser_id: u8,
}

pub(crate) fn disable_advertising(service: &mut Service, request: BusRequest) {
    let parsed: DisableAdvertisingParams = match params::parse(
        request.payload(),
        &[("advertiserId", ErrorCode::AdvertiserIdParamMissing)],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };

    let advertiser_id = parsed.advertiser_id;
    let sil = manager.sil.clone();
    defer(
        &service.core.tx,
        async move {
            sil.disable_advertiser(advertiser_id).await?;
            sil.unregister_advertiser(advertiser_id).await
        },
        move |service, result| match result {
            Ok(()) => {
                if let Some(manager) = service.core.adapter_mut(&adapter) {
                    if let Some(watch) = manager.advertisers.remove(&advertiser_id) {
                        watch.post(json!({
                            "advertiserId": advertiser_id,
                            "adapterAddress": adapter,
                            "subscribed": false,
                            "returnValue": true,
                        }));
                    }
                }
                service.core.notify_advertising_subscribers(adapter);
                request.reply(json!({
                    "advertiserId": advertiser_id,
                    "adapterAddress": adapter,
                    "returnValue": true,
                }));
            }
            Err(error) => request.reply(sil_error_body(&adapter, error)),
        },
    );
}

pub(crate) fn get_status(service: &mut Service, request: BusRequest) {
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let advertising = service
        .core
        .adapter(&adapter)
        .map(|manager| manager.advertising())
        .unwrap_or(false);
    let subscribed = request.is_subscription();
    request.reply(json!({
        "adapterAddress": adapter,
        "advertising": advertising,
        "returnValue": true,
        "subscribed": subscribed,
    }));
    if subscribed {
        service.core.advertising_subscriptions.subscribe(request);
    }
}
