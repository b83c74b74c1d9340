//! Event dispatch
//!
//! Transport events are applied to the core state in arrival order by the
//! [`router`], which yields the observer-facing [`Event`]s for that input.
//! Observers are only called once the state change for the event is complete.

pub mod listeners;
pub mod router;

pub use listeners::{Listener, ListenerId, ListenerRegistry};
pub use router::CoreState;

use crate::error::{ConnId, Error, Status};
use crate::gap::{AdapterState, BondState, DeviceAddress, PairingVariant};
use crate::gatt::{ElementId, ElementKind, GattElement, OperationKind, TransactionId};
use crate::scan::ScanReport;
use bitflags::bitflags;

bitflags! {
    /// Event categories an observer subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        const ADAPTER = 0x01;
        const SCAN = 0x02;
        const CONNECTION = 0x04;
        const GATT = 0x08;
        const NOTIFICATION = 0x10;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    StateChanged { old: AdapterState, new: AdapterState },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Report(ScanReport),
    /// The session ended without a stop request
    Ended { reason: Error },
}

/// Why a connection went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The adapter reported the disconnect with this status
    Status(Status),
    AdapterDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected {
        conn_id: ConnId,
        address: DeviceAddress,
    },
    ConnectFailed {
        address: DeviceAddress,
        error: Error,
    },
    Disconnected {
        conn_id: ConnId,
        address: DeviceAddress,
        reason: DisconnectReason,
    },
    BondStateChanged {
        address: DeviceAddress,
        state: BondState,
        status: Status,
    },
    /// Answer with [`BleClient::ssp_reply`](crate::BleClient::ssp_reply)
    PairingRequest {
        address: DeviceAddress,
        variant: PairingVariant,
        passkey: u32,
    },
    Rssi {
        txn: TransactionId,
        conn_id: ConnId,
        rssi: i32,
        status: Status,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    ElementFound {
        conn_id: ConnId,
        element: GattElement,
    },
    DiscoveryFinished {
        txn: TransactionId,
        conn_id: ConnId,
        kind: ElementKind,
        parent: Option<ElementId>,
        /// Elements of `kind` under `parent` now in the table
        elements: Vec<GattElement>,
        status: Status,
    },
    Response {
        txn: TransactionId,
        conn_id: ConnId,
        op: OperationKind,
        element_id: ElementId,
        value: Vec<u8>,
        value_type: u16,
        status: Status,
    },
    ExecuteWrite {
        txn: TransactionId,
        conn_id: ConnId,
        status: Status,
    },
    NotificationRegistration {
        txn: TransactionId,
        conn_id: ConnId,
        char_id: ElementId,
        registered: bool,
        status: Status,
    },
    /// The transaction ended without a response from the adapter
    TransactionFailed {
        txn: TransactionId,
        conn_id: ConnId,
        op: OperationKind,
        target: Option<ElementId>,
        error: Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub conn_id: ConnId,
    pub char_id: ElementId,
    pub value: Vec<u8>,
    pub is_indication: bool,
}

/// Observer-facing event, delivered after the core state reflects it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Adapter(AdapterEvent),
    Scan(ScanEvent),
    Connection(ConnectionEvent),
    Gatt(GattEvent),
    Notification(Notification),
}

impl Event {
    pub fn category(&self) -> EventMask {
        match self {
            Event::Adapter(_) => EventMask::ADAPTER,
            Event::Scan(_) => EventMask::SCAN,
            Event::Connection(_) => EventMask::CONNECTION,
            Event::Gatt(_) => EventMask::GATT,
            Event::Notification(_) => EventMask::NOTIFICATION,
        }
    }

    /// Transaction this event terminates, if it is a terminal event
    pub fn terminates(&self) -> Option<TransactionId> {
        match self {
            Event::Connection(ConnectionEvent::Rssi { txn, .. })
            | Event::Gatt(GattEvent::DiscoveryFinished { txn, .. })
            | Event::Gatt(GattEvent::Response { txn, .. })
            | Event::Gatt(GattEvent::ExecuteWrite { txn, .. })
            | Event::Gatt(GattEvent::NotificationRegistration { txn, .. })
            | Event::Gatt(GattEvent::TransactionFailed { txn, .. }) => Some(*txn),
            _ => None,
        }
    }
}
