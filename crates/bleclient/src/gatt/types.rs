//! Common types for GATT operations
//!
//! This module defines the common types used for GATT operations.

use crate::uuid::Uuid128;
use bitflags::bitflags;
use std::fmt;

/// Element id assigned by the adapter, unique within a connection and element kind
pub type ElementId = i32;

/// Kind of a discovered GATT element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Service,
    IncludedService,
    Characteristic,
    Descriptor,
}

impl ElementKind {
    /// The discovery operation that produces elements of this kind
    pub fn discovery(self) -> OperationKind {
        match self {
            ElementKind::Service => OperationKind::ServiceDiscovery,
            ElementKind::IncludedService => OperationKind::IncludedServiceDiscovery,
            ElementKind::Characteristic => OperationKind::CharacteristicDiscovery,
            ElementKind::Descriptor => OperationKind::DescriptorDiscovery,
        }
    }

    /// Kind of the element a discovery of this kind is scoped to
    pub fn parent_kind(self) -> Option<ElementKind> {
        match self {
            ElementKind::Service => None,
            ElementKind::IncludedService | ElementKind::Characteristic => Some(ElementKind::Service),
            ElementKind::Descriptor => Some(ElementKind::Characteristic),
        }
    }
}

bitflags! {
    /// Characteristic properties as defined in the Bluetooth specification
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharacteristicProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

impl CharacteristicProperties {
    /// Decodes the raw property word reported by the transport; unknown bits are dropped.
    pub fn from_raw(raw: i32) -> Self {
        Self::from_bits_truncate((raw & 0xFF) as u8)
    }

    pub fn can_notify_or_indicate(&self) -> bool {
        self.intersects(Self::NOTIFY | Self::INDICATE)
    }
}

/// A discovered service, included service, characteristic or descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattElement {
    pub id: ElementId,
    pub kind: ElementKind,
    pub uuid: Uuid128,
    /// Service for characteristics and included services, characteristic for descriptors
    pub parent: Option<ElementId>,
    /// Access properties; empty for everything but characteristics
    pub properties: CharacteristicProperties,
}

/// Class of an outstanding request. Each connection has one slot per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    ServiceDiscovery,
    IncludedServiceDiscovery,
    CharacteristicDiscovery,
    DescriptorDiscovery,
    CharRead,
    DescRead,
    CharWrite,
    DescWrite,
    ExecuteWrite,
    NotificationRegister,
    RemoteRssi,
}

impl OperationKind {
    /// Whether a `gatt-response` event can complete this operation
    pub fn is_value_response(self) -> bool {
        matches!(
            self,
            OperationKind::CharRead
                | OperationKind::DescRead
                | OperationKind::CharWrite
                | OperationKind::DescWrite
        )
    }
}

/// Write flavour: a command gets no acknowledgement from the peer, a request does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Command,
    Request,
}

/// Link security the adapter must establish before performing the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthRequirement {
    #[default]
    None,
    NoMitm,
    Mitm,
}

/// Identifies one issued request; carried by its terminal event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Decode a hex string such as `"0100"` into an attribute value
pub fn parse_hex_value(text: &str) -> crate::error::Result<Vec<u8>> {
    Ok(hex::decode(text.trim())?)
}
