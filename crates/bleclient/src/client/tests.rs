//! Unit tests for the client facade

use super::*;
use crate::dispatch::{ConnectionEvent, DisconnectReason, GattEvent, ScanEvent};
use crate::error::Status;
use crate::transport::{EventSink, TransportEvent};
use crate::uuid::Uuid128;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Transport that records every request and can refuse the next one
#[derive(Default)]
struct MockTransport {
    calls: Mutex<Vec<String>>,
    refuse_next: Mutex<Option<Status>>,
}

impl MockTransport {
    fn record(&self, call: String) -> SendResult {
        self.calls.lock().unwrap().push(call);
        match self.refuse_next.lock().unwrap().take() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn refuse_next(&self, status: Status) {
        *self.refuse_next.lock().unwrap() = Some(status);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

fn uuid_arg(uuid: Option<Uuid128>) -> String {
    uuid.map_or_else(|| "*".to_string(), |u| u.to_string())
}

impl Transport for MockTransport {
    fn enable(&self, _app_uuid: &Uuid128) -> SendResult {
        self.record("enable".to_string())
    }

    fn disable(&self) -> SendResult {
        self.record("disable".to_string())
    }

    fn start_scan(&self) -> SendResult {
        self.record("start_scan".to_string())
    }

    fn stop_scan(&self) -> SendResult {
        self.record("stop_scan".to_string())
    }

    fn connect(&self, address: &DeviceAddress) -> SendResult {
        self.record(format!("connect {}", address))
    }

    fn disconnect(&self, conn_id: ConnId) -> SendResult {
        self.record(format!("disconnect {}", conn_id))
    }

    fn pair(&self, address: &DeviceAddress) -> SendResult {
        self.record(format!("pair {}", address))
    }

    fn cancel_bond(&self, address: &DeviceAddress) -> SendResult {
        self.record(format!("cancel_bond {}", address))
    }

    fn remove_bond(&self, address: &DeviceAddress) -> SendResult {
        self.record(format!("remove_bond {}", address))
    }

    fn ssp_reply(
        &self,
        address: &DeviceAddress,
        variant: PairingVariant,
        accept: bool,
        passkey: u32,
    ) -> SendResult {
        self.record(format!(
            "ssp_reply {} {:?} {} {}",
            address, variant, accept, passkey
        ))
    }

    fn read_remote_rssi(&self, conn_id: ConnId) -> SendResult {
        self.record(format!("read_remote_rssi {}", conn_id))
    }

    fn discover_services(&self, conn_id: ConnId, uuid: Option<Uuid128>) -> SendResult {
        self.record(format!("discover_services {} {}", conn_id, uuid_arg(uuid)))
    }

    fn discover_included_services(
        &self,
        conn_id: ConnId,
        service_id: ElementId,
        uuid: Option<Uuid128>,
    ) -> SendResult {
        self.record(format!(
            "discover_included_services {} {} {}",
            conn_id,
            service_id,
            uuid_arg(uuid)
        ))
    }

    fn discover_characteristics(
        &self,
        conn_id: ConnId,
        service_id: ElementId,
        uuid: Option<Uuid128>,
    ) -> SendResult {
        self.record(format!(
            "discover_characteristics {} {} {}",
            conn_id,
            service_id,
            uuid_arg(uuid)
        ))
    }

    fn discover_descriptors(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
        uuid: Option<Uuid128>,
    ) -> SendResult {
        self.record(format!(
            "discover_descriptors {} {} {}",
            conn_id,
            char_id,
            uuid_arg(uuid)
        ))
    }

    fn read_char(&self, conn_id: ConnId, char_id: ElementId, auth: AuthRequirement) -> SendResult {
        self.record(format!("read_char {} {} {:?}", conn_id, char_id, auth))
    }

    fn read_desc(&self, conn_id: ConnId, desc_id: ElementId, auth: AuthRequirement) -> SendResult {
        self.record(format!("read_desc {} {} {:?}", conn_id, desc_id, auth))
    }

    fn write_char(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
        write_type: WriteType,
        _auth: AuthRequirement,
        value: &[u8],
    ) -> SendResult {
        self.record(format!(
            "write_char {} {} {:?} {}",
            conn_id,
            char_id,
            write_type,
            hex::encode(value)
        ))
    }

    fn write_desc(
        &self,
        conn_id: ConnId,
        desc_id: ElementId,
        write_type: WriteType,
        _auth: AuthRequirement,
        value: &[u8],
    ) -> SendResult {
        self.record(format!(
            "write_desc {} {} {:?} {}",
            conn_id,
            desc_id,
            write_type,
            hex::encode(value)
        ))
    }

    fn prep_write_char(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
        _auth: AuthRequirement,
        value: &[u8],
    ) -> SendResult {
        self.record(format!("prep_write_char {} {} {}", conn_id, char_id, hex::encode(value)))
    }

    fn prep_write_desc(
        &self,
        conn_id: ConnId,
        desc_id: ElementId,
        _auth: AuthRequirement,
        value: &[u8],
    ) -> SendResult {
        self.record(format!("prep_write_desc {} {} {}", conn_id, desc_id, hex::encode(value)))
    }

    fn execute_write(&self, conn_id: ConnId, execute: bool) -> SendResult {
        self.record(format!("execute_write {} {}", conn_id, execute))
    }

    fn register_char_notification(&self, conn_id: ConnId, char_id: ElementId) -> SendResult {
        self.record(format!("register {} {}", conn_id, char_id))
    }

    fn unregister_char_notification(&self, conn_id: ConnId, char_id: ElementId) -> SendResult {
        self.record(format!("unregister {} {}", conn_id, char_id))
    }
}

const ADDR: DeviceAddress = DeviceAddress::new([0x01, 0x23, 0x45, 0x67, 0x89, 0x0A]);
const HEART_RATE: u16 = 0x180D;
const BATTERY: u16 = 0x180F;
const HR_MEASUREMENT: u16 = 0x2A37;
const CCCD: u16 = 0x2902;

struct Harness {
    client: Arc<BleClient>,
    transport: Arc<MockTransport>,
    sink: EventSink,
    events: Arc<Mutex<Vec<Event>>>,
}

impl Harness {
    fn new() -> Self {
        let transport = Arc::new(MockTransport::default());
        let config = ClientConfig::default();
        let (sink, queue) = config.event_channel();
        let client = Arc::new(BleClient::new(transport.clone(), queue, config));

        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&events);
        client.subscribe(EventMask::all(), move |event| {
            recorded.lock().unwrap().push(event.clone());
        });

        Self {
            client,
            transport,
            sink,
            events,
        }
    }

    fn enabled() -> Self {
        let h = Self::new();
        h.client.enable().unwrap();
        h.client.handle_event(TransportEvent::AdapterEnabled);
        h.reset();
        h
    }

    /// Enabled adapter with connection 7 to `ADDR`
    fn connected() -> Self {
        let h = Self::enabled();
        h.client.connect(ADDR).unwrap();
        h.client.handle_event(TransportEvent::ConnectResult {
            address: ADDR,
            conn_id: 7,
            status: 0,
        });
        h.reset();
        h
    }

    /// Connection 7 with service 1 (heart rate), characteristic 10 in it and
    /// descriptor 20 on that characteristic
    fn discovered() -> Self {
        let h = Self::connected();
        h.client.discover_services(7, UuidFilter::Any).unwrap();
        h.found(ElementKind::Service, 1, HEART_RATE, 0);
        h.finished(ElementKind::Service, 0);
        h.client
            .discover_characteristics(7, 1, UuidFilter::Any)
            .unwrap();
        h.found(ElementKind::Characteristic, 10, HR_MEASUREMENT, 0x12);
        h.finished(ElementKind::Characteristic, 0);
        h.client
            .discover_descriptors(7, 1, 10, UuidFilter::Any)
            .unwrap();
        h.found(ElementKind::Descriptor, 20, CCCD, 0);
        h.finished(ElementKind::Descriptor, 0);
        h.reset();
        h
    }

    fn reset(&self) {
        self.transport.clear();
        self.events.lock().unwrap().clear();
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn found(&self, kind: ElementKind, element_id: ElementId, uuid: u16, properties: i32) {
        self.client.handle_event(TransportEvent::ElementFound {
            conn_id: 7,
            kind,
            element_id,
            uuid: Uuid128::from_u16(uuid),
            properties,
        });
    }

    fn finished(&self, kind: ElementKind, status: Status) {
        self.client.handle_event(TransportEvent::DiscoveryFinished {
            conn_id: 7,
            kind,
            status,
        });
    }

    fn respond(&self, op: OperationKind, element_id: ElementId, value: &[u8], status: Status) {
        self.client.handle_event(TransportEvent::GattResponse {
            conn_id: 7,
            op,
            element_id,
            value: value.to_vec(),
            value_type: 0,
            status,
        });
    }
}

#[test]
fn test_enable_is_idempotent() {
    let h = Harness::new();

    h.client.enable().unwrap();
    assert_eq!(h.client.adapter_state(), AdapterState::Enabling);
    h.client.enable().unwrap();
    assert_eq!(h.transport.calls(), vec!["enable"]);

    h.client.handle_event(TransportEvent::AdapterEnabled);
    h.client.enable().unwrap();
    assert_eq!(h.client.adapter_state(), AdapterState::Enabled);
    assert_eq!(h.transport.calls(), vec!["enable"]);

    let enabled: Vec<_> = h
        .events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                Event::Adapter(crate::dispatch::AdapterEvent::StateChanged {
                    new: AdapterState::Enabled,
                    ..
                })
            )
        })
        .collect();
    assert_eq!(enabled.len(), 1);
}

#[test]
fn test_enable_refused_rolls_back() {
    let h = Harness::new();
    h.transport.refuse_next(3);
    assert_eq!(h.client.enable(), Err(Error::Transport(3)));
    assert_eq!(h.client.adapter_state(), AdapterState::Disabled);
    h.client.enable().unwrap();
    assert_eq!(h.client.adapter_state(), AdapterState::Enabling);
}

#[test]
fn test_disable_is_idempotent_and_busy_blocks_enable() {
    let h = Harness::new();
    h.client.disable().unwrap();
    assert!(h.transport.calls().is_empty());

    let h = Harness::enabled();
    h.client.start_scan().unwrap();
    h.client.disable().unwrap();
    assert_eq!(h.client.adapter_state(), AdapterState::Disabling);
    assert!(!h.client.is_scanning());
    assert_eq!(h.client.enable(), Err(Error::AdapterBusy));
    h.client.disable().unwrap();
    assert_eq!(h.transport.calls(), vec!["start_scan", "disable"]);

    h.client
        .handle_event(TransportEvent::AdapterStateChanged { powered: false });
    assert_eq!(h.client.adapter_state(), AdapterState::Disabled);
}

#[test]
fn test_scan_reports_every_advertisement_in_order() {
    let h = Harness::new();
    assert_eq!(h.client.start_scan(), Err(Error::AdapterNotEnabled));

    let h = Harness::enabled();
    h.client.start_scan().unwrap();
    h.client.start_scan().unwrap();
    assert_eq!(h.transport.calls(), vec!["start_scan"]);

    let x = DeviceAddress::new([0x11; 6]);
    let y = DeviceAddress::new([0x22; 6]);
    let name = vec![0x05, 0x09, b'N', b'o', b'd', b'e'];
    for (address, rssi) in [(x, -40), (y, -70), (x, -45)] {
        assert!(h.sink.push(TransportEvent::ScanResult {
            address,
            rssi,
            data: name.clone(),
        }));
    }
    assert_eq!(h.client.process_events(Some(Duration::from_millis(10))), 3);

    let reports: Vec<(DeviceAddress, i32)> = h
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Scan(ScanEvent::Report(report)) => Some((report.address, report.rssi)),
            _ => None,
        })
        .collect();
    assert_eq!(reports, vec![(x, -40), (y, -70), (x, -45)]);

    let seen = h.client.last_seen(&x).unwrap();
    assert_eq!((seen.rssi, seen.count), (-45, 2));
    let device = h
        .client
        .known_devices()
        .into_iter()
        .find(|d| d.address == y)
        .unwrap();
    assert_eq!(device.name.as_deref(), Some("Node"));

    h.client.stop_scan().unwrap();
    assert!(!h.client.is_scanning());
    assert!(h.client.last_seen(&x).is_none());
    assert_eq!(h.client.stop_scan(), Err(Error::NotScanning));
}

#[test]
fn test_refused_stop_scan_keeps_session() {
    let h = Harness::enabled();
    h.client.start_scan().unwrap();
    h.transport.refuse_next(1);
    assert_eq!(h.client.stop_scan(), Err(Error::Transport(1)));
    assert!(h.client.is_scanning());
}

#[test]
fn test_connect_and_discover_services() {
    let h = Harness::enabled();
    h.client.connect(ADDR).unwrap();
    assert_eq!(h.transport.calls(), vec!["connect 01:23:45:67:89:0A"]);
    h.client.handle_event(TransportEvent::ConnectResult {
        address: ADDR,
        conn_id: 7,
        status: 0,
    });

    let info = h.client.connection(7).unwrap();
    assert_eq!(info.state, crate::connection::ConnectionState::Connected);
    assert_eq!(info.address, ADDR);
    assert_eq!(h.client.connection_by_address(&ADDR).map(|c| c.id), Some(7));

    let txn = h.client.discover_services(7, UuidFilter::Any).unwrap();
    assert_eq!(h.transport.calls().last().unwrap(), "discover_services 7 *");
    h.found(ElementKind::Service, 40, HEART_RATE, 0);
    h.found(ElementKind::Service, 12, BATTERY, 0);
    h.finished(ElementKind::Service, 0);

    let ids: Vec<ElementId> = h.client.services(7).unwrap().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![40, 12]);

    let finished = h
        .events()
        .into_iter()
        .find(|e| e.terminates() == Some(txn))
        .unwrap();
    match finished {
        Event::Gatt(GattEvent::DiscoveryFinished {
            elements, status, ..
        }) => {
            assert_eq!(status, 0);
            assert_eq!(elements.len(), 2);
            assert_eq!(elements[1].uuid, Uuid128::from_u16(BATTERY));
        }
        other => panic!("unexpected terminal event {:?}", other),
    }
}

#[test]
fn test_filtered_discovery_passes_uuid() {
    let h = Harness::connected();
    let filter = UuidFilter::parse(Some("0000180d-0000-1000-8000-00805f9b34fb")).unwrap();
    h.client.discover_services(7, filter).unwrap();
    assert_eq!(
        h.transport.calls(),
        vec!["discover_services 7 0000180D-0000-1000-8000-00805F9B34FB"]
    );
}

#[test]
fn test_connect_twice_before_result() {
    let h = Harness::enabled();
    h.client.connect(ADDR).unwrap();
    assert_eq!(h.client.connect(ADDR), Err(Error::AlreadyConnected));
    assert_eq!(h.transport.calls().len(), 1);

    h.client.handle_event(TransportEvent::ConnectResult {
        address: ADDR,
        conn_id: 7,
        status: 0,
    });
    assert_eq!(h.client.connect(ADDR), Err(Error::AlreadyConnected));
}

#[test]
fn test_connect_failure_and_refusal() {
    let h = Harness::enabled();
    h.client.connect(ADDR).unwrap();
    h.client.handle_event(TransportEvent::ConnectResult {
        address: ADDR,
        conn_id: 0,
        status: 133,
    });
    assert!(h.client.connections().is_empty());
    assert!(h.events().contains(&Event::Connection(ConnectionEvent::ConnectFailed {
        address: ADDR,
        error: Error::ConnectFailed(133),
    })));

    h.transport.refuse_next(2);
    assert_eq!(h.client.connect(ADDR), Err(Error::Transport(2)));
    // Nothing stays pending after a refusal
    h.client.connect(ADDR).unwrap();
}

#[test]
fn test_adapter_loss_destroys_connection() {
    let h = Harness::discovered();
    let txn = h
        .client
        .read_characteristic(7, 10, AuthRequirement::None)
        .unwrap();

    h.client
        .handle_event(TransportEvent::AdapterStateChanged { powered: false });

    assert_eq!(h.client.adapter_state(), AdapterState::Disabled);
    assert_eq!(h.client.connection(7), Err(Error::UnknownConnection(7)));

    let events = h.events();
    let terminal: Vec<&Event> = events.iter().filter(|e| e.terminates().is_some()).collect();
    // Adapter loss reports AdapterDisabled rather than ConnectionLost; only a
    // disconnect result from a live adapter means the link was lost.
    assert_eq!(
        terminal,
        vec![&Event::Gatt(GattEvent::TransactionFailed {
            txn,
            conn_id: 7,
            op: OperationKind::CharRead,
            target: Some(10),
            error: Error::AdapterDisabled,
        })]
    );
    assert!(events.contains(&Event::Connection(ConnectionEvent::Disconnected {
        conn_id: 7,
        address: ADDR,
        reason: DisconnectReason::AdapterDisabled,
    })));

    // A late response for the dead transaction goes nowhere
    h.respond(OperationKind::CharRead, 10, &[0x01], 0);
    assert_eq!(
        h.events().iter().filter(|e| e.terminates().is_some()).count(),
        1
    );

    // The core is re-enable-able
    h.client.enable().unwrap();
    h.client.handle_event(TransportEvent::AdapterEnabled);
    assert_eq!(h.client.adapter_state(), AdapterState::Enabled);
}

#[test]
fn test_second_request_of_same_kind_is_rejected() {
    let h = Harness::discovered();
    let first = h
        .client
        .read_characteristic(7, 10, AuthRequirement::Mitm)
        .unwrap();
    assert_eq!(
        h.client.read_characteristic(7, 10, AuthRequirement::None),
        Err(Error::TransactionInFlight)
    );
    // Other kinds have their own slot
    let desc = h
        .client
        .read_descriptor(7, 20, AuthRequirement::None)
        .unwrap();
    assert_eq!(
        h.transport.calls(),
        vec!["read_char 7 10 Mitm", "read_desc 7 20 None"]
    );
    assert_eq!(h.client.pending_transactions(7), Ok(2));

    h.respond(OperationKind::CharRead, 10, &[0x00, 0x48], 0);
    h.respond(OperationKind::DescRead, 20, &[0x01, 0x00], 0);

    let terminal: Vec<(TransactionId, Vec<u8>)> = h
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Gatt(GattEvent::Response { txn, value, .. }) => Some((txn, value)),
            _ => None,
        })
        .collect();
    assert_eq!(
        terminal,
        vec![(first, vec![0x00, 0x48]), (desc, vec![0x01, 0x00])]
    );
    assert_eq!(h.client.pending_transactions(7), Ok(0));
}

#[test]
fn test_refused_request_releases_slot() {
    let h = Harness::discovered();
    h.transport.refuse_next(0x85);
    assert_eq!(
        h.client.read_characteristic(7, 10, AuthRequirement::None),
        Err(Error::Transport(0x85))
    );
    assert_eq!(h.client.is_busy(7, OperationKind::CharRead), Ok(false));
    h.client
        .read_characteristic(7, 10, AuthRequirement::None)
        .unwrap();
}

#[test]
fn test_request_validation() {
    let h = Harness::new();
    assert_eq!(h.client.connect(ADDR), Err(Error::AdapterNotEnabled));

    let h = Harness::discovered();
    assert_eq!(
        h.client.read_characteristic(8, 10, AuthRequirement::None),
        Err(Error::UnknownConnection(8))
    );
    assert_eq!(
        h.client.read_characteristic(7, 11, AuthRequirement::None),
        Err(Error::UnknownElement {
            kind: ElementKind::Characteristic,
            id: 11
        })
    );
    // Descriptor ids are not characteristic ids
    assert_eq!(
        h.client.read_descriptor(7, 10, AuthRequirement::None),
        Err(Error::UnknownElement {
            kind: ElementKind::Descriptor,
            id: 10
        })
    );
    assert_eq!(
        h.client.discover_characteristics(7, 2, UuidFilter::Any),
        Err(Error::UnknownElement {
            kind: ElementKind::Service,
            id: 2
        })
    );
    assert!(h.transport.calls().is_empty());
}

#[test]
fn test_descriptor_discovery_needs_matching_service() {
    let h = Harness::discovered();
    h.client.discover_services(7, UuidFilter::Any).unwrap();
    h.found(ElementKind::Service, 1, HEART_RATE, 0);
    h.found(ElementKind::Service, 2, BATTERY, 0);
    h.finished(ElementKind::Service, 0);

    // Rediscovering services dropped the characteristic below service 1
    assert!(h.client.characteristics(7, 1).unwrap().is_empty());
    assert_eq!(
        h.client.discover_descriptors(7, 1, 10, UuidFilter::Any),
        Err(Error::UnknownElement {
            kind: ElementKind::Characteristic,
            id: 10
        })
    );

    h.client
        .discover_characteristics(7, 1, UuidFilter::Any)
        .unwrap();
    h.found(ElementKind::Characteristic, 10, HR_MEASUREMENT, 0x10);
    h.finished(ElementKind::Characteristic, 0);
    assert_eq!(
        h.client.discover_descriptors(7, 2, 10, UuidFilter::Any),
        Err(Error::UnknownElement {
            kind: ElementKind::Characteristic,
            id: 10
        })
    );
    h.client
        .discover_descriptors(7, 1, 10, UuidFilter::Any)
        .unwrap();
    assert_eq!(
        h.transport.calls().last().unwrap(),
        "discover_descriptors 7 10 *"
    );
}

#[test]
fn test_included_services_are_parented() {
    let h = Harness::discovered();
    h.client
        .discover_included_services(7, 1, UuidFilter::Any)
        .unwrap();
    h.found(ElementKind::IncludedService, 3, BATTERY, 0);
    h.finished(ElementKind::IncludedService, 0);

    let included = h.client.included_services(7, 1).unwrap();
    assert_eq!(included.len(), 1);
    assert_eq!(included[0].parent, Some(1));
    assert_eq!(h.client.services(7).unwrap().len(), 1);
}

#[test]
fn test_service_rediscovery_during_characteristic_discovery() {
    let h = Harness::discovered();
    let chars = h
        .client
        .discover_characteristics(7, 1, UuidFilter::Any)
        .unwrap();
    h.client.discover_services(7, UuidFilter::Any).unwrap();

    // Service 1 is gone, so characteristics found under it are dropped
    h.found(ElementKind::Characteristic, 10, HR_MEASUREMENT, 0x10);
    h.found(ElementKind::Service, 2, BATTERY, 0);
    h.finished(ElementKind::Service, 0);
    h.finished(ElementKind::Characteristic, 0);

    let elements: Vec<_> = h
        .client
        .elements(7)
        .unwrap()
        .into_iter()
        .map(|e| (e.kind, e.id, e.parent))
        .collect();
    assert_eq!(elements, vec![(ElementKind::Service, 2, None)]);
    assert_eq!(
        h.client.read_characteristic(7, 10, AuthRequirement::None),
        Err(Error::UnknownElement {
            kind: ElementKind::Characteristic,
            id: 10
        })
    );

    // The characteristic discovery still terminates, with nothing in it
    assert!(h.events().iter().any(|e| matches!(
        e,
        Event::Gatt(GattEvent::DiscoveryFinished { txn, elements, .. })
            if *txn == chars && elements.is_empty()
    )));
    assert_eq!(h.client.pending_transactions(7), Ok(0));
}

#[test]
fn test_write_length_checked_before_transport() {
    let h = Harness::discovered();
    assert!(matches!(
        h.client.write_characteristic(
            7,
            10,
            WriteType::Request,
            AuthRequirement::None,
            &[0x01, 0x02],
            3
        ),
        Err(Error::InvalidArgument(_))
    ));
    let long = vec![0u8; 513];
    assert!(matches!(
        h.client.write_descriptor(7, 20, WriteType::Command, AuthRequirement::None, &long, 513),
        Err(Error::InvalidArgument(_))
    ));
    // Length is checked even for unknown connections
    assert!(matches!(
        h.client
            .prep_write_characteristic(99, 10, AuthRequirement::None, &[0x01], 2),
        Err(Error::InvalidArgument(_))
    ));
    assert!(h.transport.calls().is_empty());
    assert_eq!(h.client.pending_transactions(7), Ok(0));

    h.client
        .write_descriptor(7, 20, WriteType::Request, AuthRequirement::None, &[0x01, 0x00], 2)
        .unwrap();
    assert_eq!(h.transport.calls(), vec!["write_desc 7 20 Request 0100"]);
}

#[test]
fn test_prepared_write_then_execute() {
    let h = Harness::discovered();
    let prep = h
        .client
        .prep_write_characteristic(7, 10, AuthRequirement::None, &[0xAA, 0xBB], 2)
        .unwrap();
    // Prepared writes share the characteristic write slot
    assert_eq!(
        h.client.write_characteristic(
            7,
            10,
            WriteType::Command,
            AuthRequirement::None,
            &[0x01],
            1
        ),
        Err(Error::TransactionInFlight)
    );
    h.respond(OperationKind::CharWrite, 10, &[0xAA, 0xBB], 0);

    let exec = h.client.execute_write(7, true).unwrap();
    h.client
        .handle_event(TransportEvent::ExecuteWriteResult { conn_id: 7, status: 0 });

    assert_eq!(
        h.transport.calls(),
        vec!["prep_write_char 7 10 aabb", "execute_write 7 true"]
    );
    let terminated: Vec<TransactionId> = h.events().iter().filter_map(Event::terminates).collect();
    assert_eq!(terminated, vec![prep, exec]);
}

#[test]
fn test_notifications_follow_registration() {
    let h = Harness::discovered();
    let notify = TransportEvent::Notification {
        conn_id: 7,
        char_id: 10,
        value: vec![0x00, 0x50],
        is_indication: false,
    };

    h.client.register_notification(7, 10).unwrap();
    h.client.handle_event(notify.clone());
    h.client
        .handle_event(TransportEvent::NotificationRegistration {
            conn_id: 7,
            char_id: 10,
            registered: true,
            status: 0,
        });
    assert_eq!(h.client.is_subscribed(7, 10), Ok(true));
    assert_eq!(h.client.subscriptions(7), Ok(vec![10]));
    h.client.handle_event(notify.clone());

    h.client.unregister_notification(7, 10).unwrap();
    h.client
        .handle_event(TransportEvent::NotificationRegistration {
            conn_id: 7,
            char_id: 10,
            registered: false,
            status: 0,
        });
    h.client.handle_event(notify);

    let delivered = h
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Notification(_)))
        .count();
    assert_eq!(delivered, 1);
    assert_eq!(
        h.transport.calls(),
        vec!["register 7 10", "unregister 7 10"]
    );
}

#[test]
fn test_disconnect_fails_outstanding_once() {
    let h = Harness::discovered();
    let read = h
        .client
        .read_characteristic(7, 10, AuthRequirement::None)
        .unwrap();
    let rssi = h.client.read_remote_rssi(7).unwrap();

    h.client.disconnect(7).unwrap();
    h.client.disconnect(7).unwrap();
    assert_eq!(h.transport.calls().last().unwrap(), "disconnect 7");
    assert_eq!(
        h.transport.calls().iter().filter(|c| c.starts_with("disconnect")).count(),
        1
    );
    assert_eq!(
        h.client.read_descriptor(7, 20, AuthRequirement::None),
        Err(Error::NotConnected(7))
    );

    h.client.handle_event(TransportEvent::DisconnectResult {
        conn_id: 7,
        status: 0x16,
    });
    h.client.handle_event(TransportEvent::DisconnectResult {
        conn_id: 7,
        status: 0x16,
    });

    let failures: Vec<(TransactionId, Error)> = h
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Gatt(GattEvent::TransactionFailed { txn, error, .. }) => Some((txn, error)),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![(read, Error::ConnectionLost), (rssi, Error::ConnectionLost)]
    );
    assert!(h.client.connections().is_empty());
    assert_eq!(h.client.elements(7), Err(Error::UnknownConnection(7)));
}

#[test]
fn test_refused_disconnect_restores_state() {
    let h = Harness::connected();
    h.transport.refuse_next(1);
    assert_eq!(h.client.disconnect(7), Err(Error::Transport(1)));
    assert_eq!(
        h.client.connection(7).unwrap().state,
        crate::connection::ConnectionState::Connected
    );
}

#[test]
fn test_pairing_and_rssi() {
    let h = Harness::connected();
    h.client.pair(ADDR).unwrap();
    assert_eq!(h.client.connection(7).unwrap().bond_state, BondState::Bonding);

    h.client.handle_event(TransportEvent::BondStateChanged {
        address: ADDR,
        state: BondState::Bonded,
        status: 0,
    });
    let device = h.client.known_devices().into_iter().next().unwrap();
    assert_eq!(device.bond_state, BondState::Bonded);

    let txn = h.client.read_remote_rssi(7).unwrap();
    h.client.handle_event(TransportEvent::RssiResult {
        conn_id: 7,
        rssi: -61,
        status: 0,
    });
    assert_eq!(h.client.connection(7).unwrap().rssi, Some(-61));
    assert!(h.events().contains(&Event::Connection(ConnectionEvent::Rssi {
        txn,
        conn_id: 7,
        rssi: -61,
        status: 0,
    })));

    h.client.remove_bond(ADDR).unwrap();
    assert_eq!(
        h.transport.calls(),
        vec![
            "pair 01:23:45:67:89:0A",
            "read_remote_rssi 7",
            "remove_bond 01:23:45:67:89:0A"
        ]
    );
}

#[test]
fn test_refused_pair_restores_bond_state() {
    let h = Harness::enabled();
    h.transport.refuse_next(9);
    assert_eq!(h.client.pair(ADDR), Err(Error::Transport(9)));
    assert_eq!(h.client.known_devices()[0].bond_state, BondState::None);
}

#[test]
fn test_cancel_bond_restores_previous_state() {
    let h = Harness::connected();
    assert_eq!(h.client.cancel_bond(ADDR), Err(Error::NotBonding(ADDR)));

    h.client.handle_event(TransportEvent::BondStateChanged {
        address: ADDR,
        state: BondState::Bonded,
        status: 0,
    });
    h.client.pair(ADDR).unwrap();
    h.client.cancel_bond(ADDR).unwrap();
    assert_eq!(h.client.connection(7).unwrap().bond_state, BondState::Bonded);
    assert_eq!(
        h.transport.calls(),
        vec!["pair 01:23:45:67:89:0A", "cancel_bond 01:23:45:67:89:0A"]
    );
    // Nothing left to cancel
    assert_eq!(h.client.cancel_bond(ADDR), Err(Error::NotBonding(ADDR)));
}

#[test]
fn test_refused_cancel_bond_keeps_bonding() {
    let h = Harness::enabled();
    h.client.pair(ADDR).unwrap();
    h.transport.refuse_next(4);
    assert_eq!(h.client.cancel_bond(ADDR), Err(Error::Transport(4)));
    assert_eq!(h.client.known_devices()[0].bond_state, BondState::Bonding);

    h.client.cancel_bond(ADDR).unwrap();
    assert_eq!(h.client.known_devices()[0].bond_state, BondState::None);
}

#[test]
fn test_pairing_request_answered_with_ssp_reply() {
    let h = Harness::connected();
    assert_eq!(
        h.client.ssp_reply(ADDR, PairingVariant::Consent, true, 0),
        Err(Error::NotBonding(ADDR))
    );

    let client = Arc::clone(&h.client);
    h.client.subscribe(EventMask::CONNECTION, move |event| {
        if let Event::Connection(ConnectionEvent::PairingRequest {
            address,
            variant,
            passkey,
        }) = event
        {
            client.ssp_reply(*address, *variant, true, *passkey).unwrap();
        }
    });
    h.client.handle_event(TransportEvent::PairingRequest {
        address: ADDR,
        variant: PairingVariant::PasskeyConfirmation,
        passkey: 482915,
    });
    assert_eq!(h.client.connection(7).unwrap().bond_state, BondState::Bonding);
    assert_eq!(
        h.transport.calls(),
        vec!["ssp_reply 01:23:45:67:89:0A PasskeyConfirmation true 482915"]
    );

    h.client.handle_event(TransportEvent::BondStateChanged {
        address: ADDR,
        state: BondState::Bonded,
        status: 0,
    });
    assert_eq!(h.client.connection(7).unwrap().bond_state, BondState::Bonded);
    assert_eq!(
        h.client.ssp_reply(ADDR, PairingVariant::PinEntry, false, 0),
        Err(Error::NotBonding(ADDR))
    );
}

#[test]
fn test_observer_can_issue_requests() {
    let h = Harness::enabled();
    let client = Arc::clone(&h.client);
    let issued = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&issued);
    h.client.subscribe(EventMask::CONNECTION, move |event| {
        if let Event::Connection(ConnectionEvent::Connected { conn_id, .. }) = event {
            // State is already updated when observers run
            assert!(client.connection(*conn_id).is_ok());
            client.discover_services(*conn_id, UuidFilter::Any).unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    h.client.connect(ADDR).unwrap();
    h.client.handle_event(TransportEvent::ConnectResult {
        address: ADDR,
        conn_id: 7,
        status: 0,
    });
    assert_eq!(issued.load(Ordering::SeqCst), 1);
    assert_eq!(h.client.is_busy(7, OperationKind::ServiceDiscovery), Ok(true));
}

#[test]
fn test_mask_limits_delivery() {
    let h = Harness::enabled();
    let gatt_only = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&gatt_only);
    let id = h.client.subscribe(EventMask::GATT, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    h.client.connect(ADDR).unwrap();
    h.client.handle_event(TransportEvent::ConnectResult {
        address: ADDR,
        conn_id: 7,
        status: 0,
    });
    assert_eq!(gatt_only.load(Ordering::SeqCst), 0);

    h.client.discover_services(7, UuidFilter::Any).unwrap();
    h.finished(ElementKind::Service, 0);
    assert_eq!(gatt_only.load(Ordering::SeqCst), 1);

    assert!(h.client.unsubscribe(id));
    h.client.discover_services(7, UuidFilter::Any).unwrap();
    h.finished(ElementKind::Service, 0);
    assert_eq!(gatt_only.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dispatcher_thread_drains_queue() {
    let Harness {
        client,
        sink,
        events,
        ..
    } = Harness::new();
    client.enable().unwrap();

    let handle = client.spawn_dispatcher().unwrap();
    let producer = sink.clone();
    std::thread::spawn(move || {
        producer.push(TransportEvent::AdapterEnabled);
    })
    .join()
    .unwrap();
    sink.push(TransportEvent::AdapterStateChanged { powered: false });
    drop(sink);
    handle.join().unwrap();

    assert_eq!(client.adapter_state(), AdapterState::Disabled);
    assert_eq!(events.lock().unwrap().len(), 2);
}
