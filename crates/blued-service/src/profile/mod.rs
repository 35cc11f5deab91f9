//! Profile registry and request routing.

pub(crate) mod avrcp;
pub(crate) mod base;
pub(crate) mod opp;

use std::collections::BTreeMap;

use blued_common::{Address, BusRequest, ClientWatch, ErrorCode};
use blued_sil::types::ProfileId;
use blued_sil::{ProfileEvent, SilAdapter};
use tracing::{debug, info};

use crate::display::A2dpRole;
use crate::config::DaemonConfig;
use crate::service::{Service, defer};

use avrcp::AvrcpProfile;
use base::ProfileBase;
use opp::OppProfile;

/// Upper bound of the 3-digit request-id space.
pub(crate) const MAX_REQUEST_ID: u16 = 999;

/// Allocates the next 3-digit request id.
///
/// The counter is monotonic modulo 999 with wrap to 1. When the would-be
/// id collides with an outstanding request, the oldest outstanding slot
/// (by request index) is evicted and its id reused instead.
pub(crate) fn allocate_request_id<V>(
    next: &mut u16,
    outstanding: &mut BTreeMap<u64, V>,
    request_id_of: impl Fn(&V) -> &str,
) -> String {
    if *next > MAX_REQUEST_ID {
        *next = 1;
    }
    let candidate = format!("{:03}", *next);
    let collides = outstanding
        .values()
        .any(|value| request_id_of(value) == candidate);
    if collides {
        if let Some((&oldest, _)) = outstanding.iter().next() {
            if let Some(evicted) = outstanding.remove(&oldest) {
                return request_id_of(&evicted).to_owned();
            }
        }
        candidate
    } else {
        *next += 1;
        candidate
    }
}

/// The watch of `adapter` within a one-per-adapter watch list.
pub(crate) fn watch_for(watches: &[ClientWatch], adapter: Address) -> Option<&ClientWatch> {
    watches
        .iter()
        .find(|watch| watch.context().adapter_address == Some(adapter))
}

/// All watches scoped to `(adapter, device)`.
pub(crate) fn watches_for(
    watches: &[ClientWatch],
    adapter: Address,
    device: Address,
) -> impl Iterator<Item = &ClientWatch> {
    watches.iter().filter(move |watch| {
        watch.context().adapter_address == Some(adapter)
            && watch.context().device_address == Some(device)
    })
}

/// The enabled profile services.
pub(crate) struct Profiles {
    pub(crate) avrcp: Option<AvrcpProfile>,
    pub(crate) opp: Option<OppProfile>,
    generic: Vec<ProfileBase>,
}

impl Profiles {
    pub(crate) fn new(config: &DaemonConfig) -> Self {
        let avrcp = config
            .is_service_class_enabled(ProfileId::Avrcp)
            .then(AvrcpProfile::new);
        let opp = config
            .is_service_class_enabled(ProfileId::Opp)
            .then(OppProfile::new);
        let generic = ProfileId::ALL
            .into_iter()
            .filter(|id| !matches!(id, ProfileId::Avrcp | ProfileId::Opp))
            .filter(|id| config.is_service_class_enabled(*id))
            .map(ProfileBase::new)
            .collect();
        Self {
            avrcp,
            opp,
            generic,
        }
    }

    /// The shared base state of a profile, if it is enabled.
    pub(crate) fn base_mut(&mut self, id: ProfileId) -> Option<&mut ProfileBase> {
        match id {
            ProfileId::Avrcp => self.avrcp.as_mut().map(|profile| &mut profile.base),
            ProfileId::Opp => self.opp.as_mut().map(|profile| &mut profile.base),
            _ => self.generic.iter_mut().find(|base| base.id == id),
        }
    }

    /// Binds every enabled profile to the backend of a new adapter.
    pub(crate) fn initialize_adapter(&mut self, adapter: Address, sil: &dyn SilAdapter) {
        if let Some(avrcp) = &mut self.avrcp {
            avrcp.initialize(adapter, sil);
        }
        if let Some(opp) = &mut self.opp {
            opp.initialize(adapter, sil);
        }
        for base in &mut self.generic {
            base.initialize(adapter, sil);
        }
    }

    /// Drops everything belonging to a removed adapter.
    pub(crate) fn reset_adapter(&mut self, adapter: &Address) {
        if let Some(avrcp) = &mut self.avrcp {
            avrcp.reset(adapter);
        }
        if let Some(opp) = &mut self.opp {
            opp.reset(adapter);
        }
        for base in &mut self.generic {
            base.reset(adapter);
        }
    }

    fn generic_id_for_category(&self, category: &str) -> Option<ProfileId> {
        self.generic
            .iter()
            .map(|base| base.id)
            .find(|id| id.category() == category)
    }
}

/// Routes requests of the structurally specified profiles (A2DP, GATT,
/// PBAP, MAP, HFP, PAN, HID, SPP, MESH): every one of them exposes the
/// common connect/disconnect/status contract plus role enablement.
pub(crate) fn dispatch_generic(service: &mut Service, request: BusRequest) {
    let Some(id) = service
        .profiles
        .generic_id_for_category(request.category())
    else {
        return request.reply_error(ErrorCode::MsgParseFail);
    };
    match request.method() {
        "connect" => base::handle_connect(service, id, request),
        "disconnect" => base::handle_disconnect(service, id, request),
        "getStatus" => base::handle_get_status(service, id, request),
        "enable" => base::handle_enable(service, id, request),
        "disable" => base::handle_disable(service, id, request),
        _ => request.reply_error(ErrorCode::MsgParseFail),
    }
}

/// Routes a profile-scoped stack observation.
pub(crate) fn handle_stack_event(
    service: &mut Service,
    adapter: Address,
    profile: ProfileId,
    event: ProfileEvent,
) {
    match event {
        ProfileEvent::PropertiesChanged { device, properties } => {
            let connected =
                base::handle_properties_changed(service, profile, adapter, device, &properties);
            if connected == Some(false) {
                match profile {
                    ProfileId::Avrcp => avrcp::on_disconnected(service, adapter, device),
                    ProfileId::Opp => {}
                    _ => {}
                }
            }
        }
        ProfileEvent::Avrcp(event) => avrcp::on_event(service, adapter, event),
        ProfileEvent::Opp(event) => opp::on_event(service, adapter, event),
    }
}

/// Records an adapter-to-display reassignment.
///
/// A changed assignment invalidates the interface's cached bond data
/// and restarts the A2DP role the new display calls for.
pub(crate) fn set_display_assignment(service: &mut Service, request: BusRequest) {
    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct Params {
        #[serde(rename = "adapterAddress")]
        _adapter_address: Option<String>,
        interface_name: String,
        display_id: crate::display::DisplayTag,
    }

    let parsed: Params = match blued_common::params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let adapter = service
        .core
        .adapters
        .values()
        .find(|manager| manager.interface_name == parsed.interface_name)
        .map(|manager| manager.address);
    let Some(adapter) = adapter else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };

    match service
        .core
        .display
        .assign(&parsed.interface_name, parsed.display_id)
    {
        Ok(previous) => {
            if previous.is_some() {
                crate::display::clear_bond_cache(
                    &service.core.config.bond_cache_root,
                    &parsed.interface_name,
                );
            }
            enable_a2dp_role(service, adapter, parsed.display_id.a2dp_role());
            request.reply(serde_json::json!({
                "returnValue": true,
                "adapterAddress": adapter,
            }));
        }
        Err(error) => {
            debug!(%error, "cannot persist display assignment");
            request.reply_error(ErrorCode::SchemaValidationFail);
        }
    }
}

/// Applies the display assignment of a freshly appeared adapter: the
/// assigned display decides which A2DP role the adapter runs.
pub(crate) fn apply_display_role(service: &mut Service, adapter: Address) {
    let Some(manager) = service.core.adapter(&adapter) else {
        return;
    };
    let Some(display) = service.core.display.display_for(&manager.interface_name) else {
        return;
    };
    enable_a2dp_role(service, adapter, display.a2dp_role());
}

/// Enables the A2DP role UUID selected by a display assignment.
pub(crate) fn enable_a2dp_role(service: &mut Service, adapter: Address, role: A2dpRole) {
    let uuid = match role {
        A2dpRole::Source => ProfileId::A2dp.uuids()[0],
        A2dpRole::Sink => ProfileId::A2dp.uuids()[1],
    };
    let Some(base) = service.profiles.base_mut(ProfileId::A2dp) else {
        return;
    };
    let Some(backend) = base.impl_for(&adapter) else {
        return;
    };
    info!(adapter = %adapter, ?role, "selecting a2dp role");
    let enabling = uuid.to_owned();
    defer(
        &service.core.tx,
        async move {
            backend.enable_role(&enabling).await?;
            Ok::<String, blued_sil::SilError>(enabling)
        },
        move |service, result| match result {
            Ok(uuid) => {
                if let Some(base) = service.profiles.base_mut(ProfileId::A2dp) {
                    base::record_enabled_role(base, adapter, uuid);
                }
            }
            Err(error) => debug!(adapter = %adapter, %error, "cannot enable a2dp role"),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[(u64, &str)]) -> BTreeMap<u64, String> {
        values
            .iter()
            .map(|(index, id)| (*index, (*id).to_owned()))
            .collect()
    }

    #[test]
    fn ids_are_zero_padded_and_monotonic() {
        let mut next = 1;
        let mut outstanding = BTreeMap::new();
        for expected in ["001", "002", "003"] {
            let id = allocate_request_id(&mut next, &mut outstanding, String::as_str);
            assert_eq!(id, expected);
            let index = outstanding.len() as u64;
            outstanding.insert(index, id);
        }
    }

    #[test]
    fn counter_wraps_past_999() {
        let mut next = 1000;
        let mut outstanding: BTreeMap<u64, String> = BTreeMap::new();
        let id = allocate_request_id(&mut next, &mut outstanding, String::as_str);
        assert_eq!(id, "001");
        assert_eq!(next, 2);
    }

    #[test]
    fn collision_after_wrap_reuses_the_oldest_slot() {
        let mut next = 1000;
        let mut outstanding = ids(&[(7, "001"), (9, "002")]);
        let id = allocate_request_id(&mut next, &mut outstanding, String::as_str);
        // "001" is still outstanding, so the oldest slot (index 7,
        // holding "001") is evicted and its id reissued.
        assert_eq!(id, "001");
        assert!(!outstanding.contains_key(&7));
        assert!(outstanding.contains_key(&9));
    }

    #[test]
    fn outstanding_ids_stay_distinct() {
        let mut next = 1;
        let mut outstanding: BTreeMap<u64, String> = BTreeMap::new();
        for index in 0..2000u64 {
            let id = allocate_request_id(&mut next, &mut outstanding, String::as_str);
            assert!(
                !outstanding.values().any(|existing| existing == &id),
                "id {id} issued twice"
            );
            outstanding.insert(index, id);
            // Keep a bounded working set so eviction kicks in.
            if outstanding.len() > 500 {
                let oldest = *outstanding.keys().next().expect("non-empty");
                outstanding.remove(&oldest);
            }
        }
    }
}
