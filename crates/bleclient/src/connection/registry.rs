//! Connection registry
//!
//! Single table of live connections keyed by connection id, with a secondary
//! index by device address, the set of connect requests still waiting for a
//! result, and the table of every device the client knows about.

use super::{Connection, ConnectionState};
use crate::error::{ConnId, Error, Result, Status, STATUS_SUCCESS};
use crate::gap::{BondState, DeviceAddress, KnownDevice};
use std::collections::{BTreeSet, HashMap};

/// What a connect result did to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(ConnId),
    Failed(Error),
    /// No connect request was pending for the address
    Unsolicited,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnId, Connection>,
    by_address: HashMap<DeviceAddress, ConnId>,
    pending: BTreeSet<DeviceAddress>,
    devices: HashMap<DeviceAddress, KnownDevice>,
    /// Bond state each device held before its current bonding started
    bonding_from: HashMap<DeviceAddress, BondState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a connect request for `address`
    pub fn begin_connect(&mut self, address: DeviceAddress) -> Result<()> {
        if self.pending.contains(&address) || self.by_address.contains_key(&address) {
            return Err(Error::AlreadyConnected);
        }
        self.pending.insert(address);
        self.device_mut(address);
        Ok(())
    }

    /// Forgets a connect request the transport refused to send
    pub fn abort_connect(&mut self, address: &DeviceAddress) {
        self.pending.remove(address);
    }

    pub fn on_connect_result(
        &mut self,
        address: DeviceAddress,
        id: ConnId,
        status: Status,
    ) -> ConnectOutcome {
        if !self.pending.remove(&address) {
            return ConnectOutcome::Unsolicited;
        }
        if status != STATUS_SUCCESS {
            return ConnectOutcome::Failed(Error::ConnectFailed(status));
        }
        if self.connections.contains_key(&id) {
            return ConnectOutcome::Failed(Error::InvalidArgument(format!(
                "connection id {} is already in use",
                id
            )));
        }

        let bond_state = self.device_mut(address).bond_state;
        self.connections.insert(id, Connection::new(id, address, bond_state));
        self.by_address.insert(address, id);
        ConnectOutcome::Connected(id)
    }

    /// Marks a connection as disconnecting and returns its previous state.
    /// Disconnecting an already disconnecting link is a no-op returning `None`.
    pub fn begin_disconnect(&mut self, id: ConnId) -> Result<Option<ConnectionState>> {
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(Error::UnknownConnection(id))?;
        match conn.state {
            ConnectionState::Disconnecting => Ok(None),
            previous => {
                conn.state = ConnectionState::Disconnecting;
                Ok(Some(previous))
            }
        }
    }

    pub fn restore_state(&mut self, id: ConnId, state: ConnectionState) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.state = state;
        }
    }

    /// Removes a connection after its link went down
    pub fn on_disconnect(&mut self, id: ConnId) -> Option<Connection> {
        let mut conn = self.connections.remove(&id)?;
        self.by_address.remove(&conn.address);
        conn.state = ConnectionState::Disconnected;
        Some(conn)
    }

    /// Removes every connection and pending connect request, oldest id first
    pub fn remove_all(&mut self) -> (Vec<Connection>, Vec<DeviceAddress>) {
        self.by_address.clear();
        let mut conns: Vec<Connection> = self.connections.drain().map(|(_, c)| c).collect();
        conns.sort_by_key(|c| c.id);
        for conn in &mut conns {
            conn.state = ConnectionState::Disconnected;
        }
        let pending = std::mem::take(&mut self.pending).into_iter().collect();
        (conns, pending)
    }

    pub fn get(&self, id: ConnId) -> Result<&Connection> {
        self.connections.get(&id).ok_or(Error::UnknownConnection(id))
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Returns the connection only if it is ready for GATT traffic
    pub fn connected_mut(&mut self, id: ConnId) -> Result<&mut Connection> {
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(Error::UnknownConnection(id))?;
        if conn.state != ConnectionState::Connected {
            return Err(Error::NotConnected(id));
        }
        Ok(conn)
    }

    pub fn by_address(&self, address: &DeviceAddress) -> Option<&Connection> {
        self.by_address
            .get(address)
            .and_then(|id| self.connections.get(id))
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn device_mut(&mut self, address: DeviceAddress) -> &mut KnownDevice {
        self.devices
            .entry(address)
            .or_insert_with(|| KnownDevice::new(address))
    }

    /// Updates the known-device entry from an advertisement
    pub fn note_advertisement(&mut self, address: DeviceAddress, rssi: i32, name: Option<&str>) {
        let device = self.device_mut(address);
        device.rssi = Some(rssi);
        if let Some(name) = name {
            device.name = Some(name.to_string());
        }
    }

    pub fn note_rssi(&mut self, id: ConnId, rssi: i32) {
        let address = match self.connections.get_mut(&id) {
            Some(conn) => {
                conn.rssi = Some(rssi);
                conn.address
            }
            None => return,
        };
        self.device_mut(address).rssi = Some(rssi);
    }

    pub fn bond_state(&self, address: &DeviceAddress) -> BondState {
        self.devices
            .get(address)
            .map_or(BondState::None, |d| d.bond_state)
    }

    /// Sets the bond state of a device and of its live connection, returning the old state
    pub fn set_bond_state(&mut self, address: DeviceAddress, state: BondState) -> BondState {
        let previous = std::mem::replace(&mut self.device_mut(address).bond_state, state);
        if state != BondState::Bonding {
            self.bonding_from.remove(&address);
        } else if previous != BondState::Bonding {
            self.bonding_from.insert(address, previous);
        }
        if let Some(id) = self.by_address.get(&address) {
            if let Some(conn) = self.connections.get_mut(id) {
                conn.bond_state = state;
            }
        }
        previous
    }

    /// State to fall back to when the bonding with `address` is abandoned;
    /// `None` unless the device is bonding.
    pub fn bonding_origin(&self, address: &DeviceAddress) -> Option<BondState> {
        if self.bond_state(address) != BondState::Bonding {
            return None;
        }
        Some(
            self.bonding_from
                .get(address)
                .copied()
                .unwrap_or(BondState::None),
        )
    }

    pub fn known_devices(&self) -> Vec<KnownDevice> {
        let mut devices: Vec<KnownDevice> = self.devices.values().cloned().collect();
        devices.sort_by_key(|d| d.address);
        devices
    }
}
