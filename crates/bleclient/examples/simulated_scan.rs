//! Example: Scanning and service discovery against a simulated adapter
//!
//! The simulated transport answers every request on the spot by pushing the
//! events a real adapter would report. Run with `RUST_LOG`-style logging by
//! installing any `log` implementation; this example only prints.

use bleclient::transport::SendResult;
use bleclient::{
    AuthRequirement, BleClient, BondState, ClientConfig, ConnId, ConnectionEvent, DeviceAddress,
    ElementId, ElementKind, Event, EventMask, EventSink, GattEvent, OperationKind, PairingVariant,
    ScanEvent, Transport, TransportEvent, Uuid128, UuidFilter, WriteType,
};
use std::sync::Arc;
use std::time::Duration;

struct SimulatedAdapter {
    sink: EventSink,
}

impl SimulatedAdapter {
    fn report(&self, event: TransportEvent) -> SendResult {
        self.sink.push(event);
        Ok(())
    }

    fn advertisement(name: &str, service: u16) -> Vec<u8> {
        let mut data = vec![0x02, 0x01, 0x06];
        data.push(name.len() as u8 + 1);
        data.push(0x09);
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(&[0x03, 0x03]);
        data.extend_from_slice(&service.to_le_bytes());
        data
    }
}

impl Transport for SimulatedAdapter {
    fn enable(&self, _app_uuid: &Uuid128) -> SendResult {
        self.report(TransportEvent::AdapterEnabled)
    }

    fn disable(&self) -> SendResult {
        self.report(TransportEvent::AdapterStateChanged { powered: false })
    }

    fn start_scan(&self) -> SendResult {
        let devices = [
            ([0xC0, 0x11, 0x22, 0x33, 0x44, 0x01], -48, "Pulse", 0x180D),
            ([0xC0, 0x11, 0x22, 0x33, 0x44, 0x02], -71, "Thermo", 0x1809),
            ([0xC0, 0x11, 0x22, 0x33, 0x44, 0x01], -50, "Pulse", 0x180D),
        ];
        for (address, rssi, name, service) in devices {
            self.report(TransportEvent::ScanResult {
                address: DeviceAddress::new(address),
                rssi,
                data: Self::advertisement(name, service),
            })?;
        }
        Ok(())
    }

    fn stop_scan(&self) -> SendResult {
        Ok(())
    }

    fn connect(&self, address: &DeviceAddress) -> SendResult {
        self.report(TransportEvent::ConnectResult {
            address: *address,
            conn_id: 1,
            status: 0,
        })
    }

    fn disconnect(&self, conn_id: ConnId) -> SendResult {
        self.report(TransportEvent::DisconnectResult { conn_id, status: 0 })
    }

    fn pair(&self, address: &DeviceAddress) -> SendResult {
        self.report(TransportEvent::PairingRequest {
            address: *address,
            variant: PairingVariant::Consent,
            passkey: 0,
        })
    }

    fn cancel_bond(&self, address: &DeviceAddress) -> SendResult {
        self.report(TransportEvent::BondStateChanged {
            address: *address,
            state: BondState::None,
            status: 0,
        })
    }

    fn remove_bond(&self, _address: &DeviceAddress) -> SendResult {
        Err(1)
    }

    fn ssp_reply(
        &self,
        address: &DeviceAddress,
        _variant: PairingVariant,
        accept: bool,
        _passkey: u32,
    ) -> SendResult {
        let state = if accept {
            BondState::Bonded
        } else {
            BondState::None
        };
        self.report(TransportEvent::BondStateChanged {
            address: *address,
            state,
            status: 0,
        })
    }

    fn read_remote_rssi(&self, conn_id: ConnId) -> SendResult {
        self.report(TransportEvent::RssiResult {
            conn_id,
            rssi: -49,
            status: 0,
        })
    }

    fn discover_services(&self, conn_id: ConnId, uuid: Option<Uuid128>) -> SendResult {
        let filter = uuid.map_or(UuidFilter::Any, UuidFilter::Exact);
        for (element_id, uuid) in [(1, 0x1800), (2, 0x180D)] {
            let uuid = Uuid128::from_u16(uuid);
            if !filter.matches(&uuid) {
                continue;
            }
            self.report(TransportEvent::ElementFound {
                conn_id,
                kind: ElementKind::Service,
                element_id,
                uuid,
                properties: 0,
            })?;
        }
        self.report(TransportEvent::DiscoveryFinished {
            conn_id,
            kind: ElementKind::Service,
            status: 0,
        })
    }

    fn discover_included_services(
        &self,
        conn_id: ConnId,
        _service_id: ElementId,
        _uuid: Option<Uuid128>,
    ) -> SendResult {
        self.report(TransportEvent::DiscoveryFinished {
            conn_id,
            kind: ElementKind::IncludedService,
            status: 0,
        })
    }

    fn discover_characteristics(
        &self,
        conn_id: ConnId,
        service_id: ElementId,
        _uuid: Option<Uuid128>,
    ) -> SendResult {
        if service_id == 2 {
            self.report(TransportEvent::ElementFound {
                conn_id,
                kind: ElementKind::Characteristic,
                element_id: 10,
                uuid: Uuid128::from_u16(0x2A37),
                properties: 0x10,
            })?;
        }
        self.report(TransportEvent::DiscoveryFinished {
            conn_id,
            kind: ElementKind::Characteristic,
            status: 0,
        })
    }

    fn discover_descriptors(
        &self,
        conn_id: ConnId,
        _char_id: ElementId,
        _uuid: Option<Uuid128>,
    ) -> SendResult {
        self.report(TransportEvent::ElementFound {
            conn_id,
            kind: ElementKind::Descriptor,
            element_id: 20,
            uuid: Uuid128::from_u16(0x2902),
            properties: 0,
        })?;
        self.report(TransportEvent::DiscoveryFinished {
            conn_id,
            kind: ElementKind::Descriptor,
            status: 0,
        })
    }

    fn read_char(&self, _conn_id: ConnId, _char_id: ElementId, _auth: AuthRequirement) -> SendResult {
        Err(2)
    }

    fn read_desc(&self, conn_id: ConnId, desc_id: ElementId, _auth: AuthRequirement) -> SendResult {
        self.report(TransportEvent::GattResponse {
            conn_id,
            op: OperationKind::DescRead,
            element_id: desc_id,
            value: vec![0x00, 0x00],
            value_type: 0,
            status: 0,
        })
    }

    fn write_char(
        &self,
        _conn_id: ConnId,
        _char_id: ElementId,
        _write_type: WriteType,
        _auth: AuthRequirement,
        _value: &[u8],
    ) -> SendResult {
        Err(2)
    }

    fn write_desc(
        &self,
        conn_id: ConnId,
        desc_id: ElementId,
        _write_type: WriteType,
        _auth: AuthRequirement,
        value: &[u8],
    ) -> SendResult {
        self.report(TransportEvent::GattResponse {
            conn_id,
            op: OperationKind::DescWrite,
            element_id: desc_id,
            value: value.to_vec(),
            value_type: 0,
            status: 0,
        })
    }

    fn prep_write_char(
        &self,
        _conn_id: ConnId,
        _char_id: ElementId,
        _auth: AuthRequirement,
        _value: &[u8],
    ) -> SendResult {
        Err(2)
    }

    fn prep_write_desc(
        &self,
        _conn_id: ConnId,
        _desc_id: ElementId,
        _auth: AuthRequirement,
        _value: &[u8],
    ) -> SendResult {
        Err(2)
    }

    fn execute_write(&self, conn_id: ConnId, _execute: bool) -> SendResult {
        self.report(TransportEvent::ExecuteWriteResult { conn_id, status: 0 })
    }

    fn register_char_notification(&self, conn_id: ConnId, char_id: ElementId) -> SendResult {
        self.report(TransportEvent::NotificationRegistration {
            conn_id,
            char_id,
            registered: true,
            status: 0,
        })?;
        for bpm in [72u8, 74, 73] {
            self.report(TransportEvent::Notification {
                conn_id,
                char_id,
                value: vec![0x00, bpm],
                is_indication: false,
            })?;
        }
        Ok(())
    }

    fn unregister_char_notification(&self, conn_id: ConnId, char_id: ElementId) -> SendResult {
        self.report(TransportEvent::NotificationRegistration {
            conn_id,
            char_id,
            registered: false,
            status: 0,
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::default();
    let (sink, queue) = config.event_channel();
    let client = Arc::new(BleClient::new(
        Arc::new(SimulatedAdapter { sink }),
        queue,
        config,
    ));
    let settle = Some(Duration::from_millis(50));

    let replier = Arc::downgrade(&client);
    client.subscribe(EventMask::all(), move |event| match event {
        Event::Scan(ScanEvent::Report(report)) => println!(
            "  {} rssi {} name {:?} services {:?} discoverable {} le-only {}",
            report.address,
            report.rssi,
            report.data.local_name,
            report.data.service_uuids,
            report.data.is_discoverable(),
            report.data.is_le_only()
        ),
        Event::Connection(ConnectionEvent::PairingRequest {
            address,
            variant,
            passkey,
        }) => {
            println!("  Accepting {:?} pairing with {}", variant, address);
            if let Some(client) = replier.upgrade() {
                if let Err(e) = client.ssp_reply(*address, *variant, true, *passkey) {
                    println!("  Pairing reply failed: {}", e);
                }
            }
        }
        Event::Connection(ConnectionEvent::Connected { conn_id, address }) => {
            println!("Connected to {} as {}", address, conn_id)
        }
        Event::Gatt(GattEvent::DiscoveryFinished { kind, elements, .. }) => {
            for element in elements {
                println!("  {:?} {} uuid {}", kind, element.id, element.uuid);
            }
        }
        Event::Notification(notification) => {
            println!("  Heart rate: {} bpm", notification.value[1])
        }
        other => println!("  {:?}", other),
    });

    println!("Enabling adapter...");
    client.enable()?;
    client.process_events(settle);

    println!("Scanning...");
    client.start_scan()?;
    client.process_events(settle);
    client.stop_scan()?;

    let target: DeviceAddress = "C0:11:22:33:44:01".parse()?;
    client.connect(target)?;
    client.process_events(settle);
    let conn_id = client
        .connection_by_address(&target)
        .ok_or("connection not established")?
        .id;

    println!("Discovering services...");
    client.discover_services(conn_id, UuidFilter::Any)?;
    client.process_events(settle);
    for service in client.services(conn_id)? {
        client.discover_characteristics(conn_id, service.id, UuidFilter::Any)?;
        client.process_events(settle);
        for characteristic in client.characteristics(conn_id, service.id)? {
            client.discover_descriptors(conn_id, service.id, characteristic.id, UuidFilter::Any)?;
            client.process_events(settle);
        }
    }

    println!("Pairing...");
    client.pair(target)?;
    client.process_events(settle);

    println!("Enabling notifications...");
    let cccd = bleclient::parse_hex_value("0100")?;
    let notifying: Vec<_> = client
        .elements(conn_id)?
        .into_iter()
        .filter(|e| e.kind == ElementKind::Characteristic && e.properties.can_notify_or_indicate())
        .collect();
    for characteristic in notifying {
        for descriptor in client.descriptors(conn_id, characteristic.id)? {
            client.write_descriptor(
                conn_id,
                descriptor.id,
                WriteType::Request,
                AuthRequirement::None,
                &cccd,
                cccd.len(),
            )?;
            client.process_events(settle);
        }
        client.register_notification(conn_id, characteristic.id)?;
        client.process_events(settle);
    }

    if let Err(e) = client.read_characteristic(conn_id, 10, AuthRequirement::None) {
        println!("Read refused: {}", e);
    }

    client.disconnect(conn_id)?;
    client.process_events(settle);

    println!("Disabling the adapter...");
    client.disable()?;
    client.process_events(settle);

    Ok(())
}
