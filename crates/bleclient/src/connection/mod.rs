//! Connections to remote devices
//!
//! A [`Connection`] exists from a successful connect result until its
//! disconnect result (or adapter loss). It owns the GATT element table, the
//! outstanding transaction slots and the notification subscriptions of the link.

pub mod registry;

pub use registry::{ConnectOutcome, ConnectionRegistry};

use crate::error::ConnId;
use crate::gap::{BondState, DeviceAddress};
use crate::gatt::{ElementId, ElementTable, TransactionSlots};
use std::collections::HashMap;

/// Lifecycle state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// One live link to a remote device
#[derive(Debug)]
pub struct Connection {
    pub id: ConnId,
    pub address: DeviceAddress,
    pub state: ConnectionState,
    pub bond_state: BondState,
    pub rssi: Option<i32>,
    pub elements: ElementTable,
    pub transactions: TransactionSlots,
    subscriptions: HashMap<ElementId, bool>,
}

impl Connection {
    pub fn new(id: ConnId, address: DeviceAddress, bond_state: BondState) -> Self {
        Self {
            id,
            address,
            state: ConnectionState::Connected,
            bond_state,
            rssi: None,
            elements: ElementTable::new(),
            transactions: TransactionSlots::new(),
            subscriptions: HashMap::new(),
        }
    }

    pub fn is_subscribed(&self, char_id: ElementId) -> bool {
        self.subscriptions.get(&char_id).copied().unwrap_or(false)
    }

    pub fn set_subscribed(&mut self, char_id: ElementId, registered: bool) {
        self.subscriptions.insert(char_id, registered);
    }

    /// Characteristics with an active notification registration
    pub fn subscriptions(&self) -> Vec<ElementId> {
        let mut ids: Vec<ElementId> = self
            .subscriptions
            .iter()
            .filter(|(_, registered)| **registered)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            address: self.address,
            state: self.state,
            bond_state: self.bond_state,
            rssi: self.rssi,
        }
    }
}

/// Snapshot of a connection handed out to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnId,
    pub address: DeviceAddress,
    pub state: ConnectionState,
    pub bond_state: BondState,
    pub rssi: Option<i32>,
}
