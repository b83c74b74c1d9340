//! Applies transport events to the core state
//!
//! [`CoreState`] is everything guarded by the client's state lock. Every
//! transport event goes through [`CoreState::route`], which mutates the state
//! and returns the observer events describing the change. Malformed or
//! unsolicited events are logged and dropped; they never fail the dispatcher.

use super::{
    AdapterEvent, ConnectionEvent, DisconnectReason, Event, GattEvent, Notification, ScanEvent,
};
use crate::connection::{ConnectOutcome, Connection, ConnectionRegistry};
use crate::error::{ConnId, Error, Result, Status, STATUS_SUCCESS};
use crate::gap::{AdapterLifecycle, BondState, DeviceAddress, PairingVariant};
use crate::gatt::{
    CharacteristicProperties, ElementId, ElementKind, GattElement, OperationKind, Rejection,
    TransactionId,
};
use crate::scan::ScanController;
use crate::transport::TransportEvent;
use crate::uuid::Uuid128;
use log::{debug, info, trace, warn};

#[derive(Debug, Default)]
pub struct CoreState {
    pub adapter: AdapterLifecycle,
    pub scan: ScanController,
    pub registry: ConnectionRegistry,
    next_txn: u64,
}

impl CoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the `kind` slot of a connected link and allocates the
    /// transaction id. `validate` runs against the connection first; nothing
    /// changes if it or the slot check fails.
    pub fn begin_transaction<F>(
        &mut self,
        conn_id: ConnId,
        kind: OperationKind,
        target: Option<ElementId>,
        validate: F,
    ) -> Result<TransactionId>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        self.adapter.require_enabled()?;
        let conn = self.registry.connected_mut(conn_id)?;
        validate(conn)?;

        let id = TransactionId(self.next_txn + 1);
        conn.transactions.begin(id, kind, target)?;
        self.next_txn += 1;
        debug!("Issued {} ({:?}) on connection {}", id, kind, conn_id);
        Ok(id)
    }

    /// Releases a slot the transport refused to act on
    pub fn cancel_transaction(&mut self, conn_id: ConnId, kind: OperationKind, id: TransactionId) {
        if let Some(conn) = self.registry.get_mut(conn_id) {
            if conn.transactions.cancel(kind, id) {
                debug!("Released {} ({:?}) on connection {}", id, kind, conn_id);
            }
        }
    }

    pub fn route(&mut self, event: TransportEvent) -> Vec<Event> {
        let name = event.name();
        trace!("Routing {} event", name);

        match event {
            TransportEvent::AdapterEnabled => self.on_adapter_enabled(),
            TransportEvent::AdapterStateChanged { powered } => self.on_power_changed(powered),
            TransportEvent::ScanResult {
                address,
                rssi,
                data,
            } => self.on_scan_result(address, rssi, data),
            TransportEvent::ConnectResult {
                address,
                conn_id,
                status,
            } => self.on_connect_result(address, conn_id, status),
            TransportEvent::DisconnectResult { conn_id, status } => {
                self.on_disconnect_result(conn_id, status)
            }
            TransportEvent::BondStateChanged {
                address,
                state,
                status,
            } => self.on_bond_state_changed(address, state, status),
            TransportEvent::PairingRequest {
                address,
                variant,
                passkey,
            } => self.on_pairing_request(address, variant, passkey),
            TransportEvent::RssiResult {
                conn_id,
                rssi,
                status,
            } => self.on_rssi_result(name, conn_id, rssi, status),
            TransportEvent::ElementFound {
                conn_id,
                kind,
                element_id,
                uuid,
                properties,
            } => self.on_element_found(name, conn_id, kind, element_id, uuid, properties),
            TransportEvent::DiscoveryFinished {
                conn_id,
                kind,
                status,
            } => self.on_discovery_finished(name, conn_id, kind, status),
            TransportEvent::GattResponse {
                conn_id,
                op,
                element_id,
                value,
                value_type,
                status,
            } => self.on_gatt_response(name, conn_id, op, element_id, value, value_type, status),
            TransportEvent::ExecuteWriteResult { conn_id, status } => {
                self.on_execute_write_result(name, conn_id, status)
            }
            TransportEvent::NotificationRegistration {
                conn_id,
                char_id,
                registered,
                status,
            } => self.on_notification_registration(name, conn_id, char_id, registered, status),
            TransportEvent::Notification {
                conn_id,
                char_id,
                value,
                is_indication,
            } => self.on_notification(name, conn_id, char_id, value, is_indication),
        }
    }

    fn connection_mut(&mut self, name: &str, conn_id: ConnId) -> Option<&mut Connection> {
        let conn = self.registry.get_mut(conn_id);
        if conn.is_none() {
            warn!("Dropping {} for unknown connection {}", name, conn_id);
        }
        conn
    }

    fn on_adapter_enabled(&mut self) -> Vec<Event> {
        match self.adapter.on_enabled() {
            Some((old, new)) => {
                info!("Adapter enabled");
                vec![Event::Adapter(AdapterEvent::StateChanged { old, new })]
            }
            None => {
                debug!(
                    "Ignoring adapter-enabled event in state {:?}",
                    self.adapter.state()
                );
                Vec::new()
            }
        }
    }

    fn on_power_changed(&mut self, powered: bool) -> Vec<Event> {
        let Some((old, new)) = self.adapter.on_power_changed(powered) else {
            debug!(
                "Adapter reports powered={} in state {:?}",
                powered,
                self.adapter.state()
            );
            return Vec::new();
        };

        info!("Adapter powered off ({:?} -> {:?})", old, new);
        let mut events = self.teardown();
        events.push(Event::Adapter(AdapterEvent::StateChanged { old, new }));
        events
    }

    /// Drops the scan session, every connection and every pending connect
    fn teardown(&mut self) -> Vec<Event> {
        let mut events = Vec::new();

        if self.scan.teardown() {
            info!("Scan session ended by adapter loss");
            events.push(Event::Scan(ScanEvent::Ended {
                reason: Error::AdapterDisabled,
            }));
        }

        let (connections, pending) = self.registry.remove_all();
        for mut conn in connections {
            info!("Connection {} to {} lost with the adapter", conn.id, conn.address);
            fail_transactions(&mut conn, &Error::AdapterDisabled, &mut events);
            events.push(Event::Connection(ConnectionEvent::Disconnected {
                conn_id: conn.id,
                address: conn.address,
                reason: DisconnectReason::AdapterDisabled,
            }));
        }
        for address in pending {
            events.push(Event::Connection(ConnectionEvent::ConnectFailed {
                address,
                error: Error::AdapterDisabled,
            }));
        }

        events
    }

    fn on_scan_result(&mut self, address: DeviceAddress, rssi: i32, data: Vec<u8>) -> Vec<Event> {
        let Some(report) = self.scan.on_advertisement(address, rssi, data) else {
            trace!("Dropping advertisement from {}: not scanning", address);
            return Vec::new();
        };

        trace!(
            "Advertisement from {} (rssi {}, {} bytes)",
            address,
            rssi,
            report.payload.len()
        );
        self.registry
            .note_advertisement(address, rssi, report.data.local_name.as_deref());
        vec![Event::Scan(ScanEvent::Report(report))]
    }

    fn on_connect_result(
        &mut self,
        address: DeviceAddress,
        conn_id: ConnId,
        status: Status,
    ) -> Vec<Event> {
        match self.registry.on_connect_result(address, conn_id, status) {
            ConnectOutcome::Connected(conn_id) => {
                info!("Connected to {} as connection {}", address, conn_id);
                vec![Event::Connection(ConnectionEvent::Connected { conn_id, address })]
            }
            ConnectOutcome::Failed(error) => {
                info!("Connection to {} failed: {}", address, error);
                vec![Event::Connection(ConnectionEvent::ConnectFailed { address, error })]
            }
            ConnectOutcome::Unsolicited => {
                warn!(
                    "Dropping connect result for {} (connection {}): no connect pending",
                    address, conn_id
                );
                Vec::new()
            }
        }
    }

    fn on_disconnect_result(&mut self, conn_id: ConnId, status: Status) -> Vec<Event> {
        let Some(mut conn) = self.registry.on_disconnect(conn_id) else {
            warn!("Dropping disconnect result for unknown connection {}", conn_id);
            return Vec::new();
        };

        info!(
            "Connection {} to {} closed (status {})",
            conn_id, conn.address, status
        );
        let mut events = Vec::new();
        fail_transactions(&mut conn, &Error::ConnectionLost, &mut events);
        events.push(Event::Connection(ConnectionEvent::Disconnected {
            conn_id,
            address: conn.address,
            reason: DisconnectReason::Status(status),
        }));
        events
    }

    fn on_bond_state_changed(
        &mut self,
        address: DeviceAddress,
        state: BondState,
        status: Status,
    ) -> Vec<Event> {
        let previous = self.registry.set_bond_state(address, state);
        info!(
            "Bond state of {}: {:?} -> {:?} (status {})",
            address, previous, state, status
        );
        vec![Event::Connection(ConnectionEvent::BondStateChanged {
            address,
            state,
            status,
        })]
    }

    fn on_pairing_request(
        &mut self,
        address: DeviceAddress,
        variant: PairingVariant,
        passkey: u32,
    ) -> Vec<Event> {
        // The peer may start bonding on its own
        if self.registry.set_bond_state(address, BondState::Bonding) != BondState::Bonding {
            info!("Bonding with {} started by the peer", address);
        }
        debug!("Pairing request from {}: {:?}", address, variant);
        vec![Event::Connection(ConnectionEvent::PairingRequest {
            address,
            variant,
            passkey,
        })]
    }

    fn on_rssi_result(&mut self, name: &str, conn_id: ConnId, rssi: i32, status: Status) -> Vec<Event> {
        let Some(conn) = self.connection_mut(name, conn_id) else {
            return Vec::new();
        };
        let Some(txn) = conn.transactions.complete(OperationKind::RemoteRssi) else {
            warn!("Dropping {} on connection {}: no request pending", name, conn_id);
            return Vec::new();
        };

        if status == STATUS_SUCCESS {
            self.registry.note_rssi(conn_id, rssi);
        }
        debug!("{} completed: rssi {} status {}", txn.id, rssi, status);
        vec![Event::Connection(ConnectionEvent::Rssi {
            txn: txn.id,
            conn_id,
            rssi,
            status,
        })]
    }

    fn on_element_found(
        &mut self,
        name: &str,
        conn_id: ConnId,
        kind: ElementKind,
        element_id: ElementId,
        uuid: Uuid128,
        properties: i32,
    ) -> Vec<Event> {
        let Some(conn) = self.connection_mut(name, conn_id) else {
            return Vec::new();
        };
        let Some(txn) = conn.transactions.pending(kind.discovery()).copied() else {
            warn!(
                "Dropping {:?} {} on connection {}: no discovery pending",
                kind, element_id, conn_id
            );
            return Vec::new();
        };
        // A rediscovery of the parent's own kind may have retired it while
        // this discovery was in flight.
        if let (Some(parent_kind), Some(parent)) = (kind.parent_kind(), txn.target) {
            if conn.elements.get(parent_kind, parent).is_none() {
                warn!(
                    "Dropping {:?} {} on connection {}: parent {:?} {} is gone",
                    kind, element_id, conn_id, parent_kind, parent
                );
                return Vec::new();
            }
        }

        let properties = match kind {
            ElementKind::Characteristic => CharacteristicProperties::from_raw(properties),
            _ => CharacteristicProperties::empty(),
        };
        let element = GattElement {
            id: element_id,
            kind,
            uuid,
            parent: txn.target,
            properties,
        };

        match conn.elements.insert(element.clone()) {
            Ok(()) => {
                trace!("{}: found {:?} {} ({})", txn.id, kind, element_id, uuid);
                vec![Event::Gatt(GattEvent::ElementFound { conn_id, element })]
            }
            Err(Rejection::Duplicate) => {
                warn!(
                    "Dropping duplicate {:?} id {} on connection {}",
                    kind, element_id, conn_id
                );
                Vec::new()
            }
            Err(Rejection::Reused { previous }) => {
                warn!(
                    "Dropping {:?} id {} ({}) on connection {}: id previously named {}",
                    kind, element_id, uuid, conn_id, previous
                );
                Vec::new()
            }
        }
    }

    fn on_discovery_finished(
        &mut self,
        name: &str,
        conn_id: ConnId,
        kind: ElementKind,
        status: Status,
    ) -> Vec<Event> {
        let Some(conn) = self.connection_mut(name, conn_id) else {
            return Vec::new();
        };
        let Some(txn) = conn.transactions.complete(kind.discovery()) else {
            warn!(
                "Dropping {} for {:?} on connection {}: no discovery pending",
                name, kind, conn_id
            );
            return Vec::new();
        };

        let elements = conn.elements.children(kind, txn.target);
        debug!(
            "{} completed: {} {:?} element(s), status {}",
            txn.id,
            elements.len(),
            kind,
            status
        );
        vec![Event::Gatt(GattEvent::DiscoveryFinished {
            txn: txn.id,
            conn_id,
            kind,
            parent: txn.target,
            elements,
            status,
        })]
    }

    #[allow(clippy::too_many_arguments)]
    fn on_gatt_response(
        &mut self,
        name: &str,
        conn_id: ConnId,
        op: OperationKind,
        element_id: ElementId,
        value: Vec<u8>,
        value_type: u16,
        status: Status,
    ) -> Vec<Event> {
        if !op.is_value_response() {
            warn!("Dropping {} carrying non-value operation {:?}", name, op);
            return Vec::new();
        }
        let Some(conn) = self.connection_mut(name, conn_id) else {
            return Vec::new();
        };
        let Some(txn) = take_matching(conn, op, element_id) else {
            return Vec::new();
        };

        debug!("{} completed with status {}", txn.id, status);
        vec![Event::Gatt(GattEvent::Response {
            txn: txn.id,
            conn_id,
            op,
            element_id,
            value,
            value_type,
            status,
        })]
    }

    fn on_execute_write_result(&mut self, name: &str, conn_id: ConnId, status: Status) -> Vec<Event> {
        let Some(conn) = self.connection_mut(name, conn_id) else {
            return Vec::new();
        };
        let Some(txn) = conn.transactions.complete(OperationKind::ExecuteWrite) else {
            warn!("Dropping {} on connection {}: no request pending", name, conn_id);
            return Vec::new();
        };

        debug!("{} completed with status {}", txn.id, status);
        vec![Event::Gatt(GattEvent::ExecuteWrite {
            txn: txn.id,
            conn_id,
            status,
        })]
    }

    fn on_notification_registration(
        &mut self,
        name: &str,
        conn_id: ConnId,
        char_id: ElementId,
        registered: bool,
        status: Status,
    ) -> Vec<Event> {
        let Some(conn) = self.connection_mut(name, conn_id) else {
            return Vec::new();
        };
        let Some(txn) = take_matching(conn, OperationKind::NotificationRegister, char_id) else {
            return Vec::new();
        };

        if status == STATUS_SUCCESS {
            conn.set_subscribed(char_id, registered);
        }
        debug!(
            "{} completed: characteristic {} registered={} status {}",
            txn.id, char_id, registered, status
        );
        vec![Event::Gatt(GattEvent::NotificationRegistration {
            txn: txn.id,
            conn_id,
            char_id,
            registered,
            status,
        })]
    }

    fn on_notification(
        &mut self,
        name: &str,
        conn_id: ConnId,
        char_id: ElementId,
        value: Vec<u8>,
        is_indication: bool,
    ) -> Vec<Event> {
        let Some(conn) = self.connection_mut(name, conn_id) else {
            return Vec::new();
        };
        if !conn.is_subscribed(char_id) {
            warn!(
                "Dropping {} for characteristic {} on connection {}: not subscribed",
                name, char_id, conn_id
            );
            return Vec::new();
        }

        trace!(
            "Notification from characteristic {} on connection {}: {}",
            char_id,
            conn_id,
            hex::encode(&value)
        );
        vec![Event::Notification(Notification {
            conn_id,
            char_id,
            value,
            is_indication,
        })]
    }
}

/// Completes the `op` slot if it is waiting on `element_id`. A response naming
/// another element leaves the slot untouched.
fn take_matching(
    conn: &mut Connection,
    op: OperationKind,
    element_id: ElementId,
) -> Option<crate::gatt::Transaction> {
    match conn.transactions.pending(op).copied() {
        Some(txn) if txn.target == Some(element_id) => conn.transactions.complete(op),
        Some(txn) => {
            warn!(
                "Ignoring {:?} response for element {} on connection {}: {} waits on {:?}",
                op, element_id, conn.id, txn.id, txn.target
            );
            None
        }
        None => {
            warn!(
                "Dropping {:?} response for element {} on connection {}: no request pending",
                op, element_id, conn.id
            );
            None
        }
    }
}

/// Ends every outstanding transaction of a dying connection with `error`
fn fail_transactions(conn: &mut Connection, error: &Error, events: &mut Vec<Event>) {
    for txn in conn.transactions.drain() {
        debug!(
            "Failing {} ({:?}) on connection {}: {}",
            txn.id, txn.kind, conn.id, error
        );
        events.push(Event::Gatt(GattEvent::TransactionFailed {
            txn: txn.id,
            conn_id: conn.id,
            op: txn.kind,
            target: txn.target,
            error: error.clone(),
        }));
    }
    conn.elements.clear();
}
