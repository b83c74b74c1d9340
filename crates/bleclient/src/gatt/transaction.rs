//! Outstanding-request slots of a connection
//!
//! The wire protocol carries no request tag, so responses are correlated by
//! operation class alone. A connection therefore holds at most one outstanding
//! transaction per [`OperationKind`]; a second request of the same class fails
//! with `TransactionInFlight` instead of queueing.

use crate::error::{Error, Result};
use crate::gatt::types::{ElementId, OperationKind, TransactionId};
use std::collections::HashMap;

/// One outstanding request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: OperationKind,
    /// Element the request targets: the element read or written, or the
    /// parent a discovery is scoped to
    pub target: Option<ElementId>,
}

#[derive(Debug, Default)]
pub struct TransactionSlots {
    slots: HashMap<OperationKind, Transaction>,
}

impl TransactionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the slot for `kind`
    pub fn begin(
        &mut self,
        id: TransactionId,
        kind: OperationKind,
        target: Option<ElementId>,
    ) -> Result<Transaction> {
        if self.slots.contains_key(&kind) {
            return Err(Error::TransactionInFlight);
        }
        let txn = Transaction { id, kind, target };
        self.slots.insert(kind, txn);
        Ok(txn)
    }

    pub fn pending(&self, kind: OperationKind) -> Option<&Transaction> {
        self.slots.get(&kind)
    }

    pub fn is_busy(&self, kind: OperationKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Frees the slot for `kind`, returning the transaction it held
    pub fn complete(&mut self, kind: OperationKind) -> Option<Transaction> {
        self.slots.remove(&kind)
    }

    /// Frees the slot only if it still holds transaction `id`
    pub fn cancel(&mut self, kind: OperationKind, id: TransactionId) -> bool {
        let held = self.slots.get(&kind).is_some_and(|txn| txn.id == id);
        if held {
            self.slots.remove(&kind);
        }
        held
    }

    /// Empties every slot, oldest transaction first
    pub fn drain(&mut self) -> Vec<Transaction> {
        let mut txns: Vec<Transaction> = self.slots.drain().map(|(_, txn)| txn).collect();
        txns.sort_by_key(|txn| txn.id);
        txns
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
