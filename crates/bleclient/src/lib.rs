//! bleclient - core of a Bluetooth Low Energy GATT client
//!
//! This library tracks the adapter power state, scan sessions, connections to
//! remote devices and their discovered GATT services, characteristics and
//! descriptors. It talks to the radio through an injected [`Transport`] and
//! turns the transport's asynchronous reports into ordered, state-consistent
//! events for application observers.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod gap;
pub mod gatt;
pub mod scan;
pub mod transport;
pub mod uuid;

// Re-export common types for convenience
pub use client::BleClient;
pub use config::ClientConfig;
pub use connection::{ConnectionInfo, ConnectionState};
pub use dispatch::{
    AdapterEvent, ConnectionEvent, DisconnectReason, Event, EventMask, GattEvent, ListenerId,
    Notification, ScanEvent,
};
pub use error::{ConnId, Error, Result, Status, STATUS_SUCCESS};
pub use gap::{
    AdapterState, AdvertisingData, BondState, DeviceAddress, KnownDevice, PairingVariant,
};
pub use gatt::{
    parse_hex_value, AuthRequirement, CharacteristicProperties, ElementId, ElementKind,
    GattElement, OperationKind, TransactionId, WriteType,
};
pub use scan::ScanReport;
pub use transport::{event_channel, EventQueue, EventSink, Transport, TransportEvent};
pub use uuid::{Uuid128, UuidFilter};
