//! Error types for the bleclient library
//!
//! Local validation failures are returned synchronously from request calls.
//! Failures reported by the transport travel as data inside events, carrying
//! one of these variants or a raw [`Status`] code.

use crate::gap::DeviceAddress;
use crate::gatt::ElementKind;
use thiserror::Error;

/// Status code reported by the transport. Zero means success.
pub type Status = i32;

/// Status value the transport uses to report success.
pub const STATUS_SUCCESS: Status = 0;

/// Connection handle assigned by the adapter.
pub type ConnId = i32;

/// Errors produced by the client core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Device is already connected or connecting")]
    AlreadyConnected,

    #[error("Connection failed with status {0}")]
    ConnectFailed(Status),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("A transaction of this kind is already in flight")]
    TransactionInFlight,

    #[error("Adapter is not enabled")]
    AdapterNotEnabled,

    #[error("Adapter disabled")]
    AdapterDisabled,

    #[error("Adapter is changing state")]
    AdapterBusy,

    #[error("Not scanning")]
    NotScanning,

    #[error("Unknown connection id {0}")]
    UnknownConnection(ConnId),

    #[error("Connection {0} is not connected")]
    NotConnected(ConnId),

    #[error("No bonding in progress with {0}")]
    NotBonding(DeviceAddress),

    #[error("Unknown {kind:?} with id {id}")]
    UnknownElement { kind: ElementKind, id: i32 },

    #[error("Transport rejected request with status {0}")]
    Transport(Status),
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::InvalidFormat(err.to_string())
    }
}
