//! GATT (Generic Attribute Profile) client state
//!
//! Discovered element tables and outstanding-transaction slots, owned per
//! connection and driven by the dispatcher.

pub mod elements;
pub mod transaction;
pub mod types;

pub use elements::{ElementTable, Rejection};
pub use transaction::{Transaction, TransactionSlots};
pub use types::{
    parse_hex_value, AuthRequirement, CharacteristicProperties, ElementId, ElementKind,
    GattElement, OperationKind, TransactionId, WriteType,
};
