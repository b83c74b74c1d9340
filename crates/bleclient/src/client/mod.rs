//! BLE central client
//!
//! [`BleClient`] is the application-facing side of the core. Request methods
//! validate locally, reserve whatever state the request needs, hand the
//! request to the [`Transport`] and return; the outcome arrives later as an
//! [`Event`] delivered to subscribed observers.
//!
//! All core state lives behind one lock. Transport calls and observer
//! callbacks happen with that lock released, so an observer may issue new
//! requests from inside its callback. Observers must not call
//! [`BleClient::handle_event`] or [`BleClient::process_events`] themselves.

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionInfo};
use crate::dispatch::{CoreState, Event, EventMask, ListenerId, ListenerRegistry};
use crate::error::{ConnId, Error, Result};
use crate::gap::{AdapterState, BondState, DeviceAddress, KnownDevice, PairingVariant};
use crate::gatt::{
    AuthRequirement, ElementId, ElementKind, GattElement, OperationKind, TransactionId, WriteType,
};
use crate::scan::LastSeen;
use crate::transport::{EventQueue, Received, SendResult, Transport, TransportEvent};
use crate::uuid::UuidFilter;
use log::{debug, info, warn};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// GATT client core bound to one adapter
pub struct BleClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    state: Mutex<CoreState>,
    listeners: Mutex<ListenerRegistry>,
    /// Held for the whole of `handle_event` so observers see events in queue order
    dispatch_lock: Mutex<()>,
    queue: Mutex<EventQueue>,
}

impl BleClient {
    /// Creates a client. `queue` is the receiving end of the channel whose
    /// sink the transport reports its events into.
    pub fn new(transport: Arc<dyn Transport>, queue: EventQueue, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(CoreState::new()),
            listeners: Mutex::new(ListenerRegistry::new()),
            dispatch_lock: Mutex::new(()),
            queue: Mutex::new(queue),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, ListenerRegistry> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self) -> MutexGuard<'_, EventQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Adapter

    /// Powers the adapter on. A no-op while already enabled or enabling.
    pub fn enable(&self) -> Result<()> {
        let previous = {
            let mut state = self.state();
            let previous = state.adapter.state();
            if !state.adapter.request_enable()? {
                debug!("Enable requested while adapter is {:?}", previous);
                return Ok(());
            }
            previous
        };

        info!("Enabling adapter (app {})", self.config.app_uuid);
        if let Err(status) = self.transport.enable(&self.config.app_uuid) {
            warn!("Transport refused enable: status {}", status);
            let mut state = self.state();
            if state.adapter.state() == AdapterState::Enabling {
                state.adapter.rollback(previous);
            }
            return Err(Error::Transport(status));
        }
        Ok(())
    }

    /// Powers the adapter off. A no-op while already disabled or disabling.
    ///
    /// The scan session ends at once; connections are torn down when the
    /// adapter reports the power-off.
    pub fn disable(&self) -> Result<()> {
        let (previous, session) = {
            let mut state = self.state();
            let previous = state.adapter.state();
            if !state.adapter.request_disable()? {
                debug!("Disable requested while adapter is {:?}", previous);
                return Ok(());
            }
            (previous, state.scan.stop().ok())
        };

        info!("Disabling adapter");
        if let Err(status) = self.transport.disable() {
            warn!("Transport refused disable: status {}", status);
            let mut state = self.state();
            if state.adapter.state() == AdapterState::Disabling {
                state.adapter.rollback(previous);
                if let Some(session) = session {
                    state.scan.restore(session);
                }
            }
            return Err(Error::Transport(status));
        }
        Ok(())
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.state().adapter.state()
    }

    // Scanning

    /// Starts an LE scan. Calling it while a scan is running does nothing.
    pub fn start_scan(&self) -> Result<()> {
        {
            let mut state = self.state();
            let adapter = state.adapter.state();
            if !state.scan.start(adapter)? {
                debug!("Scan already running");
                return Ok(());
            }
        }

        info!("Starting scan");
        if let Err(status) = self.transport.start_scan() {
            warn!("Transport refused start_scan: status {}", status);
            self.state().scan.teardown();
            return Err(Error::Transport(status));
        }
        Ok(())
    }

    pub fn stop_scan(&self) -> Result<()> {
        let session = self.state().scan.stop()?;

        info!("Stopping scan ({} device(s) seen)", session.devices());
        if let Err(status) = self.transport.stop_scan() {
            warn!("Transport refused stop_scan: status {}", status);
            let mut state = self.state();
            if state.adapter.is_enabled() && !state.scan.is_scanning() {
                state.scan.restore(session);
            }
            return Err(Error::Transport(status));
        }
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.state().scan.is_scanning()
    }

    /// Last advertisement seen from `address` in the current scan session
    pub fn last_seen(&self, address: &DeviceAddress) -> Option<LastSeen> {
        self.state()
            .scan
            .session()
            .and_then(|session| session.last_seen(address).cloned())
    }

    // Connections and bonding

    /// Opens a connection. Fails with `AlreadyConnected` while the address
    /// is connected or has a connect request pending.
    pub fn connect(&self, address: DeviceAddress) -> Result<()> {
        {
            let mut state = self.state();
            state.adapter.require_enabled()?;
            state.registry.begin_connect(address)?;
        }

        info!("Connecting to {}", address);
        if let Err(status) = self.transport.connect(&address) {
            warn!("Transport refused connect to {}: status {}", address, status);
            self.state().registry.abort_connect(&address);
            return Err(Error::Transport(status));
        }
        Ok(())
    }

    /// Closes a connection. The connection stays in the registry, refusing
    /// new GATT requests, until the adapter reports the disconnect.
    pub fn disconnect(&self, conn_id: ConnId) -> Result<()> {
        let Some(previous) = self.state().registry.begin_disconnect(conn_id)? else {
            debug!("Connection {} is already disconnecting", conn_id);
            return Ok(());
        };

        info!("Disconnecting connection {}", conn_id);
        if let Err(status) = self.transport.disconnect(conn_id) {
            warn!("Transport refused disconnect of {}: status {}", conn_id, status);
            self.state().registry.restore_state(conn_id, previous);
            return Err(Error::Transport(status));
        }
        Ok(())
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .state()
            .registry
            .connections()
            .map(Connection::info)
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn connection(&self, conn_id: ConnId) -> Result<ConnectionInfo> {
        self.state().registry.get(conn_id).map(Connection::info)
    }

    pub fn connection_by_address(&self, address: &DeviceAddress) -> Option<ConnectionInfo> {
        self.state().registry.by_address(address).map(Connection::info)
    }

    /// Starts bonding with `address`; the device is `Bonding` until the
    /// adapter reports the outcome.
    pub fn pair(&self, address: DeviceAddress) -> Result<()> {
        let previous = {
            let mut state = self.state();
            state.adapter.require_enabled()?;
            state.registry.set_bond_state(address, BondState::Bonding)
        };

        info!("Pairing with {}", address);
        if let Err(status) = self.transport.pair(&address) {
            warn!("Transport refused pair with {}: status {}", address, status);
            let mut state = self.state();
            if state.registry.bond_state(&address) == BondState::Bonding {
                state.registry.set_bond_state(address, previous);
            }
            return Err(Error::Transport(status));
        }
        Ok(())
    }

    /// Abandons the bonding in progress with `address`. The device goes back
    /// to the bond state it had before bonding started.
    pub fn cancel_bond(&self, address: DeviceAddress) -> Result<()> {
        let restored = {
            let mut state = self.state();
            state.adapter.require_enabled()?;
            let restored = state
                .registry
                .bonding_origin(&address)
                .ok_or(Error::NotBonding(address))?;
            state.registry.set_bond_state(address, restored);
            restored
        };

        info!("Cancelling bonding with {}", address);
        if let Err(status) = self.transport.cancel_bond(&address) {
            warn!("Transport refused cancel_bond with {}: status {}", address, status);
            let mut state = self.state();
            if state.registry.bond_state(&address) == restored {
                state.registry.set_bond_state(address, BondState::Bonding);
            }
            return Err(Error::Transport(status));
        }
        Ok(())
    }

    /// Answers a [`ConnectionEvent::PairingRequest`](crate::ConnectionEvent::PairingRequest).
    /// The outcome arrives as a bond state change.
    pub fn ssp_reply(
        &self,
        address: DeviceAddress,
        variant: PairingVariant,
        accept: bool,
        passkey: u32,
    ) -> Result<()> {
        {
            let state = self.state();
            state.adapter.require_enabled()?;
            if state.registry.bond_state(&address) != BondState::Bonding {
                return Err(Error::NotBonding(address));
            }
        }

        debug!(
            "Replying to {:?} pairing request from {}: accept={}",
            variant, address, accept
        );
        self.transport
            .ssp_reply(&address, variant, accept, passkey)
            .map_err(Error::Transport)
    }

    pub fn remove_bond(&self, address: DeviceAddress) -> Result<()> {
        self.state().adapter.require_enabled()?;

        info!("Removing bond with {}", address);
        self.transport
            .remove_bond(&address)
            .map_err(Error::Transport)
    }

    /// Every device seen through scanning, connecting or bonding
    pub fn known_devices(&self) -> Vec<KnownDevice> {
        self.state().registry.known_devices()
    }

    pub fn read_remote_rssi(&self, conn_id: ConnId) -> Result<TransactionId> {
        self.transact(
            conn_id,
            OperationKind::RemoteRssi,
            None,
            |_| Ok(()),
            |t| t.read_remote_rssi(conn_id),
        )
    }

    // GATT requests

    /// Reserves the slot, sends the request and releases the slot again if
    /// the transport refuses it.
    fn transact<V, S>(
        &self,
        conn_id: ConnId,
        kind: OperationKind,
        target: Option<ElementId>,
        validate: V,
        send: S,
    ) -> Result<TransactionId>
    where
        V: FnOnce(&Connection) -> Result<()>,
        S: FnOnce(&dyn Transport) -> SendResult,
    {
        let txn = self
            .state()
            .begin_transaction(conn_id, kind, target, validate)?;

        if let Err(status) = send(self.transport.as_ref()) {
            warn!(
                "Transport refused {} ({:?}) on connection {}: status {}",
                txn, kind, conn_id, status
            );
            self.state().cancel_transaction(conn_id, kind, txn);
            return Err(Error::Transport(status));
        }
        Ok(txn)
    }

    fn discover<V, S>(
        &self,
        conn_id: ConnId,
        kind: ElementKind,
        parent: Option<ElementId>,
        validate: V,
        send: S,
    ) -> Result<TransactionId>
    where
        V: FnOnce(&Connection) -> Result<()>,
        S: FnOnce(&dyn Transport) -> SendResult,
    {
        let op = kind.discovery();
        let txn = {
            let mut state = self.state();
            let txn = state.begin_transaction(conn_id, op, parent, validate)?;
            // Old results are dropped now so the finished event lists only
            // what this discovery found.
            if let Some(conn) = state.registry.get_mut(conn_id) {
                conn.elements.begin_discovery(kind, parent);
            }
            txn
        };

        if let Err(status) = send(self.transport.as_ref()) {
            warn!(
                "Transport refused {} ({:?}) on connection {}: status {}",
                txn, op, conn_id, status
            );
            self.state().cancel_transaction(conn_id, op, txn);
            return Err(Error::Transport(status));
        }
        Ok(txn)
    }

    /// Discovers primary services, all of them for `UuidFilter::Any`
    pub fn discover_services(&self, conn_id: ConnId, filter: UuidFilter) -> Result<TransactionId> {
        self.discover(
            conn_id,
            ElementKind::Service,
            None,
            |_| Ok(()),
            |t| t.discover_services(conn_id, filter.as_uuid()),
        )
    }

    pub fn discover_included_services(
        &self,
        conn_id: ConnId,
        service_id: ElementId,
        filter: UuidFilter,
    ) -> Result<TransactionId> {
        self.discover(
            conn_id,
            ElementKind::IncludedService,
            Some(service_id),
            element_exists(ElementKind::Service, service_id),
            |t| t.discover_included_services(conn_id, service_id, filter.as_uuid()),
        )
    }

    pub fn discover_characteristics(
        &self,
        conn_id: ConnId,
        service_id: ElementId,
        filter: UuidFilter,
    ) -> Result<TransactionId> {
        self.discover(
            conn_id,
            ElementKind::Characteristic,
            Some(service_id),
            element_exists(ElementKind::Service, service_id),
            |t| t.discover_characteristics(conn_id, service_id, filter.as_uuid()),
        )
    }

    /// Discovers the descriptors of characteristic `char_id`, which must
    /// belong to service `service_id`.
    pub fn discover_descriptors(
        &self,
        conn_id: ConnId,
        service_id: ElementId,
        char_id: ElementId,
        filter: UuidFilter,
    ) -> Result<TransactionId> {
        self.discover(
            conn_id,
            ElementKind::Descriptor,
            Some(char_id),
            |conn| {
                conn.elements.require(ElementKind::Service, service_id)?;
                let characteristic = conn.elements.require(ElementKind::Characteristic, char_id)?;
                if characteristic.parent != Some(service_id) {
                    return Err(Error::UnknownElement {
                        kind: ElementKind::Characteristic,
                        id: char_id,
                    });
                }
                Ok(())
            },
            |t| t.discover_descriptors(conn_id, char_id, filter.as_uuid()),
        )
    }

    pub fn read_characteristic(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
        auth: AuthRequirement,
    ) -> Result<TransactionId> {
        self.transact(
            conn_id,
            OperationKind::CharRead,
            Some(char_id),
            element_exists(ElementKind::Characteristic, char_id),
            |t| t.read_char(conn_id, char_id, auth),
        )
    }

    pub fn read_descriptor(
        &self,
        conn_id: ConnId,
        desc_id: ElementId,
        auth: AuthRequirement,
    ) -> Result<TransactionId> {
        self.transact(
            conn_id,
            OperationKind::DescRead,
            Some(desc_id),
            element_exists(ElementKind::Descriptor, desc_id),
            |t| t.read_desc(conn_id, desc_id, auth),
        )
    }

    /// `length` must equal `value.len()`; a mismatch fails before anything
    /// is reserved or sent.
    pub fn write_characteristic(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
        write_type: WriteType,
        auth: AuthRequirement,
        value: &[u8],
        length: usize,
    ) -> Result<TransactionId> {
        self.check_value(value, length)?;
        self.transact(
            conn_id,
            OperationKind::CharWrite,
            Some(char_id),
            element_exists(ElementKind::Characteristic, char_id),
            |t| t.write_char(conn_id, char_id, write_type, auth, value),
        )
    }

    pub fn write_descriptor(
        &self,
        conn_id: ConnId,
        desc_id: ElementId,
        write_type: WriteType,
        auth: AuthRequirement,
        value: &[u8],
        length: usize,
    ) -> Result<TransactionId> {
        self.check_value(value, length)?;
        self.transact(
            conn_id,
            OperationKind::DescWrite,
            Some(desc_id),
            element_exists(ElementKind::Descriptor, desc_id),
            |t| t.write_desc(conn_id, desc_id, write_type, auth, value),
        )
    }

    /// Queues part of a long write; completes like a characteristic write
    /// and shares its slot.
    pub fn prep_write_characteristic(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
        auth: AuthRequirement,
        value: &[u8],
        length: usize,
    ) -> Result<TransactionId> {
        self.check_value(value, length)?;
        self.transact(
            conn_id,
            OperationKind::CharWrite,
            Some(char_id),
            element_exists(ElementKind::Characteristic, char_id),
            |t| t.prep_write_char(conn_id, char_id, auth, value),
        )
    }

    pub fn prep_write_descriptor(
        &self,
        conn_id: ConnId,
        desc_id: ElementId,
        auth: AuthRequirement,
        value: &[u8],
        length: usize,
    ) -> Result<TransactionId> {
        self.check_value(value, length)?;
        self.transact(
            conn_id,
            OperationKind::DescWrite,
            Some(desc_id),
            element_exists(ElementKind::Descriptor, desc_id),
            |t| t.prep_write_desc(conn_id, desc_id, auth, value),
        )
    }

    /// Commits (`execute == true`) or cancels the prepared writes of a connection
    pub fn execute_write(&self, conn_id: ConnId, execute: bool) -> Result<TransactionId> {
        self.transact(
            conn_id,
            OperationKind::ExecuteWrite,
            None,
            |_| Ok(()),
            |t| t.execute_write(conn_id, execute),
        )
    }

    pub fn register_notification(&self, conn_id: ConnId, char_id: ElementId) -> Result<TransactionId> {
        self.transact(
            conn_id,
            OperationKind::NotificationRegister,
            Some(char_id),
            element_exists(ElementKind::Characteristic, char_id),
            |t| t.register_char_notification(conn_id, char_id),
        )
    }

    pub fn unregister_notification(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
    ) -> Result<TransactionId> {
        self.transact(
            conn_id,
            OperationKind::NotificationRegister,
            Some(char_id),
            element_exists(ElementKind::Characteristic, char_id),
            |t| t.unregister_char_notification(conn_id, char_id),
        )
    }

    fn check_value(&self, value: &[u8], length: usize) -> Result<()> {
        if value.len() != length {
            return Err(Error::InvalidArgument(format!(
                "value is {} bytes but length is {}",
                value.len(),
                length
            )));
        }
        if length > self.config.max_attribute_len {
            return Err(Error::InvalidArgument(format!(
                "value of {} bytes exceeds the {} byte limit",
                length, self.config.max_attribute_len
            )));
        }
        Ok(())
    }

    // GATT state

    /// Every discovered element of a connection, in discovery order
    pub fn elements(&self, conn_id: ConnId) -> Result<Vec<GattElement>> {
        Ok(self.state().registry.get(conn_id)?.elements.all().to_vec())
    }

    pub fn services(&self, conn_id: ConnId) -> Result<Vec<GattElement>> {
        Ok(self.state().registry.get(conn_id)?.elements.services())
    }

    pub fn included_services(&self, conn_id: ConnId, service_id: ElementId) -> Result<Vec<GattElement>> {
        self.children(conn_id, ElementKind::IncludedService, service_id)
    }

    pub fn characteristics(&self, conn_id: ConnId, service_id: ElementId) -> Result<Vec<GattElement>> {
        self.children(conn_id, ElementKind::Characteristic, service_id)
    }

    pub fn descriptors(&self, conn_id: ConnId, char_id: ElementId) -> Result<Vec<GattElement>> {
        self.children(conn_id, ElementKind::Descriptor, char_id)
    }

    fn children(&self, conn_id: ConnId, kind: ElementKind, parent: ElementId) -> Result<Vec<GattElement>> {
        Ok(self
            .state()
            .registry
            .get(conn_id)?
            .elements
            .children(kind, Some(parent)))
    }

    pub fn is_subscribed(&self, conn_id: ConnId, char_id: ElementId) -> Result<bool> {
        Ok(self.state().registry.get(conn_id)?.is_subscribed(char_id))
    }

    pub fn subscriptions(&self, conn_id: ConnId) -> Result<Vec<ElementId>> {
        Ok(self.state().registry.get(conn_id)?.subscriptions())
    }

    /// Number of outstanding transactions on a connection
    pub fn pending_transactions(&self, conn_id: ConnId) -> Result<usize> {
        Ok(self.state().registry.get(conn_id)?.transactions.len())
    }

    pub fn is_busy(&self, conn_id: ConnId, kind: OperationKind) -> Result<bool> {
        Ok(self.state().registry.get(conn_id)?.transactions.is_busy(kind))
    }

    // Observers and dispatch

    /// Registers an observer for the event categories in `mask`
    pub fn subscribe<F>(&self, mask: EventMask, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners().subscribe(mask, Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners().unsubscribe(id)
    }

    /// Applies one transport event and notifies observers
    pub fn handle_event(&self, event: TransportEvent) {
        let _order = self.dispatch_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let events = self.state().route(event);
        for event in &events {
            let listeners = self.listeners().snapshot(event.category());
            for listener in listeners {
                listener(event);
            }
        }
    }

    /// Waits up to `timeout` (forever for `None`) for the next queued event,
    /// then handles it and everything else already queued. Returns the number
    /// of events handled.
    pub fn process_events(&self, timeout: Option<Duration>) -> usize {
        let queue = self.queue();
        let mut handled = 0;
        let mut next = queue.recv(timeout);
        while let Received::Event(event) = next {
            self.handle_event(event);
            handled += 1;
            next = queue.try_recv();
        }
        handled
    }

    /// Runs the dispatch loop on its own thread until every sink of the
    /// event queue is dropped. Do not mix with `process_events`.
    pub fn spawn_dispatcher(self: &Arc<Self>) -> io::Result<JoinHandle<()>> {
        let client = Arc::clone(self);
        thread::Builder::new()
            .name("bleclient-dispatch".to_string())
            .spawn(move || {
                debug!("Dispatcher started");
                loop {
                    let next = client.queue().recv(None);
                    match next {
                        Received::Event(event) => client.handle_event(event),
                        Received::TimedOut => continue,
                        Received::Closed => break,
                    }
                }
                debug!("Dispatcher stopped: event queue closed");
            })
    }
}

fn element_exists(kind: ElementKind, id: ElementId) -> impl FnOnce(&Connection) -> Result<()> {
    move |conn| conn.elements.require(kind, id).map(|_| ())
}

#[cfg(test)]
mod tests;
