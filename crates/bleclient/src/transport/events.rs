//! Events produced by the adapter

use crate::error::{ConnId, Status};
use crate::gap::{BondState, DeviceAddress, PairingVariant};
use crate::gatt::{ElementId, ElementKind, OperationKind};
use crate::uuid::Uuid128;

/// One asynchronous report from the adapter.
///
/// Everything in here comes from the radio or the native stack and is treated
/// as untrusted: ids may be unknown, responses may be unsolicited, payloads
/// may be malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stack is up and the client application is registered
    AdapterEnabled,
    AdapterStateChanged {
        powered: bool,
    },
    ScanResult {
        address: DeviceAddress,
        rssi: i32,
        data: Vec<u8>,
    },
    ConnectResult {
        address: DeviceAddress,
        conn_id: ConnId,
        status: Status,
    },
    DisconnectResult {
        conn_id: ConnId,
        status: Status,
    },
    BondStateChanged {
        address: DeviceAddress,
        state: BondState,
        status: Status,
    },
    /// The peer needs the local side to confirm, enter or display a passkey
    PairingRequest {
        address: DeviceAddress,
        variant: PairingVariant,
        passkey: u32,
    },
    RssiResult {
        conn_id: ConnId,
        rssi: i32,
        status: Status,
    },
    ElementFound {
        conn_id: ConnId,
        kind: ElementKind,
        element_id: ElementId,
        uuid: Uuid128,
        properties: i32,
    },
    DiscoveryFinished {
        conn_id: ConnId,
        kind: ElementKind,
        status: Status,
    },
    /// Result of a characteristic/descriptor read or write; `op` names which
    GattResponse {
        conn_id: ConnId,
        op: OperationKind,
        element_id: ElementId,
        value: Vec<u8>,
        value_type: u16,
        status: Status,
    },
    ExecuteWriteResult {
        conn_id: ConnId,
        status: Status,
    },
    NotificationRegistration {
        conn_id: ConnId,
        char_id: ElementId,
        registered: bool,
        status: Status,
    },
    Notification {
        conn_id: ConnId,
        char_id: ElementId,
        value: Vec<u8>,
        is_indication: bool,
    },
}

impl TransportEvent {
    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::AdapterEnabled => "adapter-enabled",
            TransportEvent::AdapterStateChanged { .. } => "adapter-state-changed",
            TransportEvent::ScanResult { .. } => "scan-result",
            TransportEvent::ConnectResult { .. } => "connect-result",
            TransportEvent::DisconnectResult { .. } => "disconnect-result",
            TransportEvent::BondStateChanged { .. } => "bond-state-changed",
            TransportEvent::PairingRequest { .. } => "pairing-request",
            TransportEvent::RssiResult { .. } => "rssi-result",
            TransportEvent::ElementFound { .. } => "element-found",
            TransportEvent::DiscoveryFinished { .. } => "discovery-finished",
            TransportEvent::GattResponse { .. } => "gatt-response",
            TransportEvent::ExecuteWriteResult { .. } => "execute-write-result",
            TransportEvent::NotificationRegistration { .. } => "notification-registration-result",
            TransportEvent::Notification { .. } => "notification",
        }
    }
}
