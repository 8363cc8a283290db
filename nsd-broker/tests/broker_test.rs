// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end broker tests against mock engines

use nsd_broker::{BrokerConfig, BrokerHandle, Dependencies, NsdBroker};
use nsd_core::legacy::{AddressPayload, DiscoveryPayload, LegacyEvent, RegistrationPayload, ResolutionPayload};
use nsd_core::managed::ManagedServiceInfo;
use nsd_core::{FailureCode, ListenerKey, NetworkHandle, ServiceInfo, TransactionId};
use nsd_mock::{
    CallbackEvent, LegacyCall, MockAdvertiser, MockDiscoveryManager, MockFeatureFlags,
    MockInterfaceResolver, MockLegacyEngine, MockSocketProvider, RecordingBroadcaster,
    RecordingCallback,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    handle: BrokerHandle,
    legacy: MockLegacyEngine,
    manager: MockDiscoveryManager,
    advertiser: MockAdvertiser,
    sockets: MockSocketProvider,
    flags: MockFeatureFlags,
    broadcaster: RecordingBroadcaster,
}

fn spawn_broker() -> Harness {
    let legacy = MockLegacyEngine::new();
    let manager = MockDiscoveryManager::new();
    let advertiser = MockAdvertiser::new();
    let sockets = MockSocketProvider::new();
    let flags = MockFeatureFlags::new();
    let broadcaster = RecordingBroadcaster::new();
    let deps = Dependencies {
        legacy_engine: Box::new(legacy.clone()),
        discovery_manager: Box::new(manager.clone()),
        advertiser: Box::new(advertiser.clone()),
        socket_provider: Box::new(sockets.clone()),
        interface_resolver: Box::new(MockInterfaceResolver::new()),
        flags: Box::new(flags.clone()),
        broadcaster: Box::new(broadcaster.clone()),
    };
    let handle = NsdBroker::spawn(deps, BrokerConfig::default());
    Harness {
        handle,
        legacy,
        manager,
        advertiser,
        sockets,
        flags,
        broadcaster,
    }
}

/// Let the broker task drain its queue.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn resolve_calls(legacy: &MockLegacyEngine) -> Vec<TransactionId> {
    legacy
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            LegacyCall::Resolve { id, .. } => Some(id),
            _ => None,
        })
        .collect()
}

fn get_address_calls(legacy: &MockLegacyEngine) -> Vec<(TransactionId, String)> {
    legacy
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            LegacyCall::GetServiceAddress { id, hostname, .. } => Some((id, hostname)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn broker_broadcasts_enabled_on_startup() {
    let harness = spawn_broker();
    settle().await;
    assert_eq!(harness.broadcaster.broadcasts(), vec![true]);
}

#[tokio::test]
async fn managed_discover_happy_path() {
    let harness = spawn_broker();
    harness.flags.set_discovery_manager_enabled(true);
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.discover_services(ListenerKey(1), ServiceInfo::new("", "_http._tcp"));
    settle().await;

    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::DiscoverStarted(
            ListenerKey(1),
            ServiceInfo::new("", "_http._tcp")
        )]
    );
    assert!(harness.sockets.is_monitoring());
    let registrations = harness.manager.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].service_type, "_http._tcp.local");
    assert!(registrations[0].options.passive_mode);
    assert_eq!(registrations[0].options.network, None);
    assert_eq!(registrations[0].options.resolve_instance_name, None);

    let listener = harness.manager.last_listener().expect("listener registered");
    listener.on_service_name_discovered(ManagedServiceInfo {
        instance_name: "Living Room Printer".to_string(),
        network: Some(NetworkHandle(101)),
        interface_index: 4,
        ..Default::default()
    });
    settle().await;

    let events = callback.take_events();
    match events.as_slice() {
        [CallbackEvent::ServiceFound(ListenerKey(1), info)] => {
            assert_eq!(info.service_name, "Living Room Printer");
            assert_eq!(info.service_type, "_http._tcp");
            assert_eq!(info.network, Some(NetworkHandle(101)));
        }
        other => panic!("unexpected events: {other:?}"),
    }

    connector.stop_discovery(ListenerKey(1));
    settle().await;
    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::StopDiscoverySucceeded(ListenerKey(1))]
    );
    let unregistrations = harness.manager.unregistrations();
    assert_eq!(unregistrations.len(), 1);
    assert_eq!(unregistrations[0].0, "_http._tcp.local");
    assert!(!harness.sockets.is_monitoring());
}

#[tokio::test]
async fn legacy_two_stage_resolve() {
    let harness = spawn_broker();
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.resolve_service(ListenerKey(5), ServiceInfo::new("X", "_ipp._tcp"));
    settle().await;

    let resolves = resolve_calls(&harness.legacy);
    assert_eq!(resolves.len(), 1);
    let first_id = resolves[0];
    assert!(callback.take_events().is_empty());

    harness.legacy.deliver(LegacyEvent::ServiceResolved {
        id: first_id,
        resolution: ResolutionPayload {
            service_full_name: "X._ipp._tcp.local.".to_string(),
            hostname: "x.local.".to_string(),
            port: 631,
            txt_attributes: HashMap::from([("rp".to_string(), b"ipp/print".to_vec())]),
            interface_index: 0,
        },
    });
    settle().await;

    // The resolve transaction is retired and the address lookup continues
    // under a fresh id on the same listener key.
    assert_eq!(harness.legacy.stopped_operations(), vec![first_id]);
    let addresses = get_address_calls(&harness.legacy);
    assert_eq!(addresses.len(), 1);
    let (second_id, hostname) = addresses[0].clone();
    assert_ne!(second_id, first_id);
    assert_eq!(hostname, "x.local.");

    harness.legacy.deliver(LegacyEvent::GetAddressSucceeded {
        id: second_id,
        address: AddressPayload {
            address: "192.0.2.5".to_string(),
            net_id: 42,
            interface_index: 0,
        },
    });
    settle().await;

    let events = callback.take_events();
    match events.as_slice() {
        [CallbackEvent::ResolveSucceeded(ListenerKey(5), info)] => {
            assert_eq!(info.service_name, "X");
            assert_eq!(info.service_type, "._ipp._tcp");
            assert_eq!(info.port, Some(631));
            assert_eq!(
                info.txt_attributes.get("rp").map(Vec::as_slice),
                Some(b"ipp/print".as_slice())
            );
            assert_eq!(info.network, Some(NetworkHandle(42)));
            assert_eq!(info.host_addresses, vec!["192.0.2.5".parse::<std::net::IpAddr>().unwrap()]);
        }
        other => panic!("unexpected events: {other:?}"),
    }

    // The scratch is cleared: a fresh resolve is accepted again.
    connector.resolve_service(ListenerKey(6), ServiceInfo::new("Y", "_ipp._tcp"));
    settle().await;
    assert!(callback.take_events().is_empty());
    assert_eq!(resolve_calls(&harness.legacy).len(), 2);
}

#[tokio::test]
async fn second_resolve_while_active_is_rejected() {
    let harness = spawn_broker();
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.resolve_service(ListenerKey(1), ServiceInfo::new("X", "_ipp._tcp"));
    connector.resolve_service(ListenerKey(2), ServiceInfo::new("X", "_ipp._tcp"));
    settle().await;

    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::ResolveFailed(
            ListenerKey(2),
            FailureCode::AlreadyActive
        )]
    );
    // The first resolve is unaffected.
    assert_eq!(resolve_calls(&harness.legacy).len(), 1);
}

#[tokio::test]
async fn peer_death_during_managed_discovery_unregisters_listener() {
    let harness = spawn_broker();
    harness.flags.set_discovery_manager_enabled(true);
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.discover_services(ListenerKey(1), ServiceInfo::new("", "_http._tcp"));
    settle().await;
    callback.take_events();
    let listener = harness.manager.last_listener().expect("listener registered");

    callback.set_dead(true);
    drop(connector);
    settle().await;

    assert_eq!(harness.manager.unregistrations().len(), 1);
    assert!(!harness.sockets.is_monitoring());

    // A late engine event for the dead client is dropped without any
    // delivery attempt.
    listener.on_service_name_discovered(ManagedServiceInfo {
        instance_name: "ghost".to_string(),
        ..Default::default()
    });
    settle().await;
    assert!(callback.take_events().is_empty());
}

#[tokio::test]
async fn legacy_register_reports_daemon_assigned_name() {
    let harness = spawn_broker();
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    let mut info = ServiceInfo::new("printer", "_ipp._tcp");
    info.port = Some(631);
    info.txt_attributes
        .insert("rp".to_string(), b"ipp/print".to_vec());
    connector.register_service(ListenerKey(3), info);
    settle().await;

    // No reply until the daemon reports the registration.
    assert!(callback.take_events().is_empty());
    let register_id = harness
        .legacy
        .calls()
        .into_iter()
        .find_map(|call| match call {
            LegacyCall::RegisterService { id, .. } => Some(id),
            _ => None,
        })
        .expect("register call recorded");

    harness.legacy.deliver(LegacyEvent::ServiceRegistered {
        id: register_id,
        registration: RegistrationPayload {
            service_name: "printer (2)".to_string(),
        },
    });
    settle().await;

    let events = callback.take_events();
    match events.as_slice() {
        [CallbackEvent::RegisterSucceeded(ListenerKey(3), info)] => {
            assert_eq!(info.service_name, "printer (2)");
            assert_eq!(info.service_type, "");
        }
        other => panic!("unexpected events: {other:?}"),
    }

    connector.unregister_service(ListenerKey(3));
    settle().await;
    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::UnregisterSucceeded(ListenerKey(3))]
    );
    assert_eq!(harness.legacy.stopped_operations(), vec![register_id]);
}

#[tokio::test]
async fn advertiser_register_truncates_and_canonicalizes() {
    let harness = spawn_broker();
    harness.flags.set_advertiser_enabled(true);
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    let mut info = ServiceInfo::new(&"n".repeat(100), "_printer._ipp._tcp");
    info.port = Some(631);
    connector.register_service(ListenerKey(1), info);
    settle().await;

    let added = harness.advertiser.added();
    assert_eq!(added.len(), 1);
    let (id, advertised) = added[0].clone();
    assert_eq!(advertised.service_name.len(), 63);
    assert_eq!(advertised.service_type, "_printer._sub._ipp._tcp");
    assert!(harness.sockets.is_monitoring());

    harness.advertiser.succeed(id, advertised.clone());
    settle().await;
    let events = callback.take_events();
    match events.as_slice() {
        [CallbackEvent::RegisterSucceeded(ListenerKey(1), info)] => {
            assert_eq!(info.service_name, advertised.service_name);
            assert_eq!(info.service_type, "");
        }
        other => panic!("unexpected events: {other:?}"),
    }

    connector.unregister_service(ListenerKey(1));
    settle().await;
    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::UnregisterSucceeded(ListenerKey(1))]
    );
    assert_eq!(harness.advertiser.removed(), vec![id]);
}

#[tokio::test]
async fn advertiser_failure_is_forwarded() {
    let harness = spawn_broker();
    harness.flags.set_advertiser_enabled(true);
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.register_service(ListenerKey(2), ServiceInfo::new("printer", "_ipp._tcp"));
    settle().await;
    let (id, _) = harness.advertiser.added()[0].clone();

    harness.advertiser.fail(id, FailureCode::InternalError);
    settle().await;
    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::RegisterFailed(
            ListenerKey(2),
            FailureCode::InternalError
        )]
    );
}

#[tokio::test]
async fn managed_resolve_is_one_shot() {
    let harness = spawn_broker();
    harness.flags.set_discovery_manager_enabled(true);
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.resolve_service(ListenerKey(9), ServiceInfo::new("Printer", "_ipp._tcp"));
    settle().await;

    let registrations = harness.manager.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].service_type, "_ipp._tcp.local");
    assert_eq!(
        registrations[0].options.resolve_instance_name.as_deref(),
        Some("Printer")
    );

    let listener = harness.manager.last_listener().expect("listener registered");
    listener.on_service_found(ManagedServiceInfo {
        instance_name: "Printer".to_string(),
        port: 631,
        attributes: vec![
            ("rp".to_string(), b"ipp/print".to_vec()),
            ("bad=key".to_string(), b"dropped".to_vec()),
        ],
        ipv4_address: Some("192.0.2.7".to_string()),
        ipv6_address: Some("2001:db8::1".to_string()),
        network: Some(NetworkHandle(5)),
        interface_index: 2,
        ..Default::default()
    });
    settle().await;

    let events = callback.take_events();
    match events.as_slice() {
        [CallbackEvent::ResolveSucceeded(ListenerKey(9), info)] => {
            assert_eq!(info.service_name, "Printer");
            assert_eq!(info.service_type, "._ipp._tcp");
            assert_eq!(info.port, Some(631));
            // IPv4 is preferred when both address families are present.
            assert_eq!(info.host_addresses, vec!["192.0.2.7".parse::<std::net::IpAddr>().unwrap()]);
            assert_eq!(
                info.txt_attributes.get("rp").map(Vec::as_slice),
                Some(b"ipp/print".as_slice())
            );
            // Invalid keys are dropped, not fatal.
            assert!(!info.txt_attributes.contains_key("bad=key"));
            assert_eq!(info.network, Some(NetworkHandle(5)));
        }
        other => panic!("unexpected events: {other:?}"),
    }

    // The listener is torn down after the first result.
    assert_eq!(harness.manager.unregistrations().len(), 1);
    assert!(!harness.sockets.is_monitoring());
}

#[tokio::test]
async fn managed_stop_resolution_unregisters_listener() {
    let harness = spawn_broker();
    harness.flags.set_discovery_manager_enabled(true);
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.resolve_service(ListenerKey(4), ServiceInfo::new("Printer", "_ipp._tcp"));
    settle().await;

    connector.stop_resolution(ListenerKey(4));
    settle().await;
    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::StopResolutionSucceeded(ListenerKey(4))]
    );
    assert_eq!(harness.manager.unregistrations().len(), 1);
    assert!(harness.legacy.stopped_operations().is_empty());
}

#[tokio::test]
async fn watch_mode_reports_updates_and_losses() {
    let harness = spawn_broker();
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.discover_services(ListenerKey(1), ServiceInfo::new("", "_ipp._tcp"));
    connector.register_service_info_callback(
        ListenerKey(2),
        ServiceInfo::new("Printer", "_ipp._tcp"),
    );
    settle().await;
    callback.take_events();

    let resolves = resolve_calls(&harness.legacy);
    assert_eq!(resolves.len(), 1);
    harness.legacy.deliver(LegacyEvent::ServiceResolved {
        id: resolves[0],
        resolution: ResolutionPayload {
            service_full_name: "Printer._ipp._tcp.local.".to_string(),
            hostname: "printer.local.".to_string(),
            port: 631,
            txt_attributes: HashMap::new(),
            interface_index: 0,
        },
    });
    settle().await;

    let addresses = get_address_calls(&harness.legacy);
    assert_eq!(addresses.len(), 1);
    let lookup_id = addresses[0].0;

    harness.legacy.deliver(LegacyEvent::GetAddressSucceeded {
        id: lookup_id,
        address: AddressPayload {
            address: "192.0.2.9".to_string(),
            net_id: 42,
            interface_index: 0,
        },
    });
    settle().await;
    let events = callback.take_events();
    match events.as_slice() {
        [CallbackEvent::ServiceUpdated(ListenerKey(2), info)] => {
            assert_eq!(info.service_name, "Printer");
            assert_eq!(info.host_addresses.len(), 1);
        }
        other => panic!("unexpected events: {other:?}"),
    }

    // The lookup stays alive: further addresses produce further updates.
    harness.legacy.deliver(LegacyEvent::GetAddressSucceeded {
        id: lookup_id,
        address: AddressPayload {
            address: "192.0.2.10".to_string(),
            net_id: 42,
            interface_index: 0,
        },
    });
    settle().await;
    let events = callback.take_events();
    match events.as_slice() {
        [CallbackEvent::ServiceUpdated(ListenerKey(2), info)] => {
            assert_eq!(info.host_addresses.len(), 2);
        }
        other => panic!("unexpected events: {other:?}"),
    }

    // A loss on the discovery stream for the watched name/type reaches the
    // watcher despite the dot-convention mismatch between the two types.
    let discover_id = harness
        .legacy
        .calls()
        .into_iter()
        .find_map(|call| match call {
            LegacyCall::Discover { id, .. } => Some(id),
            _ => None,
        })
        .expect("discover call recorded");
    harness.legacy.deliver(LegacyEvent::ServiceLost {
        id: discover_id,
        discovery: DiscoveryPayload {
            service_name: "Printer".to_string(),
            registration_type: "_ipp._tcp.".to_string(),
            net_id: 42,
            interface_index: 0,
        },
    });
    settle().await;
    let events = callback.take_events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        CallbackEvent::ServiceLost(ListenerKey(1), _)
    ));
    assert_eq!(events[1], CallbackEvent::ServiceUpdatedLost(ListenerKey(2)));

    connector.unregister_service_info_callback(ListenerKey(2));
    settle().await;
    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::CallbackUnregistered(ListenerKey(2))]
    );
    assert!(harness.legacy.stopped_operations().contains(&lookup_id));
}

#[tokio::test]
async fn resolve_failure_codes_differ_between_resolve_and_watch() {
    let harness = spawn_broker();
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.resolve_service(ListenerKey(1), ServiceInfo::new("X", "_ipp._tcp"));
    settle().await;
    let first = resolve_calls(&harness.legacy)[0];
    harness
        .legacy
        .deliver(LegacyEvent::ResolutionFailed { id: first });
    settle().await;
    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::ResolveFailed(
            ListenerKey(1),
            FailureCode::InternalError
        )]
    );

    connector.register_service_info_callback(ListenerKey(2), ServiceInfo::new("X", "_ipp._tcp"));
    settle().await;
    let second = *resolve_calls(&harness.legacy).last().expect("watch resolve");
    harness
        .legacy
        .deliver(LegacyEvent::ResolutionFailed { id: second });
    settle().await;
    assert_eq!(
        callback.take_events(),
        vec![CallbackEvent::CallbackRegistrationFailed(
            ListenerKey(2),
            FailureCode::BadParameters
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn daemon_stops_after_cleanup_delay() {
    let harness = spawn_broker();
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.start_daemon();
    settle().await;
    assert!(harness.legacy.is_started());

    drop(connector);
    settle().await;
    assert!(harness.legacy.is_started());

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    settle().await;
    assert!(!harness.legacy.is_started());
    assert_eq!(harness.legacy.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn request_arriving_mid_delay_cancels_daemon_stop() {
    let harness = spawn_broker();
    let callback = RecordingCallback::new();
    let connector = harness.handle.connect(Arc::new(callback.clone()));
    settle().await;

    connector.start_daemon();
    settle().await;
    drop(connector);
    settle().await;

    tokio::time::sleep(Duration::from_millis(5_000)).await;
    let callback2 = RecordingCallback::new();
    let connector2 = harness.handle.connect(Arc::new(callback2.clone()));
    connector2.discover_services(ListenerKey(1), ServiceInfo::new("", "_http._tcp"));
    settle().await;

    tokio::time::sleep(Duration::from_millis(20_000)).await;
    settle().await;
    assert!(harness.legacy.is_started());
    assert_eq!(harness.legacy.stop_count(), 0);
}
