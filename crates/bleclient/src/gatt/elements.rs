//! Per-connection table of discovered GATT elements

use crate::error::{Error, Result};
use crate::gatt::types::{ElementId, ElementKind, GattElement};
use crate::uuid::Uuid128;
use std::collections::HashMap;

/// Why a found element was not added to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The id is already live for this kind
    Duplicate,
    /// The id belonged to a different element before rediscovery
    Reused { previous: Uuid128 },
}

/// Discovered elements of one connection, in arrival order.
///
/// Ids of elements dropped by a rediscovery are remembered for the lifetime of
/// the connection so an id never comes back naming a different element.
#[derive(Debug, Default)]
pub struct ElementTable {
    live: Vec<GattElement>,
    retired: HashMap<(ElementKind, ElementId), Uuid128>,
}

impl ElementTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ElementKind, id: ElementId) -> Option<&GattElement> {
        self.live.iter().find(|e| e.kind == kind && e.id == id)
    }

    /// Looks up an element, failing with `UnknownElement` when it is absent
    pub fn require(&self, kind: ElementKind, id: ElementId) -> Result<&GattElement> {
        self.get(kind, id).ok_or(Error::UnknownElement { kind, id })
    }

    pub fn all(&self) -> &[GattElement] {
        &self.live
    }

    /// Elements of `kind` below `parent` (services use `None`)
    pub fn children(&self, kind: ElementKind, parent: Option<ElementId>) -> Vec<GattElement> {
        self.live
            .iter()
            .filter(|e| e.kind == kind && e.parent == parent)
            .cloned()
            .collect()
    }

    pub fn services(&self) -> Vec<GattElement> {
        self.children(ElementKind::Service, None)
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Drops the elements a new discovery of `kind` under `parent` will replace,
    /// together with everything that hangs below them.
    pub fn begin_discovery(&mut self, kind: ElementKind, parent: Option<ElementId>) {
        let mut doomed: Vec<(ElementKind, ElementId)> = self
            .live
            .iter()
            .filter(|e| e.kind == kind && e.parent == parent)
            .map(|e| (e.kind, e.id))
            .collect();

        let mut i = 0;
        while i < doomed.len() {
            let (doomed_kind, doomed_id) = doomed[i];
            for e in &self.live {
                if e.parent == Some(doomed_id) && e.kind.parent_kind() == Some(doomed_kind) {
                    doomed.push((e.kind, e.id));
                }
            }
            i += 1;
        }

        let retired = &mut self.retired;
        self.live.retain(|e| {
            if doomed.contains(&(e.kind, e.id)) {
                retired.insert((e.kind, e.id), e.uuid);
                false
            } else {
                true
            }
        });
    }

    /// Adds a found element, refusing duplicates and reassigned ids
    pub fn insert(&mut self, element: GattElement) -> std::result::Result<(), Rejection> {
        if self.get(element.kind, element.id).is_some() {
            return Err(Rejection::Duplicate);
        }
        if let Some(previous) = self.retired.get(&(element.kind, element.id)) {
            if *previous != element.uuid {
                return Err(Rejection::Reused { previous: *previous });
            }
        }
        self.live.push(element);
        Ok(())
    }

    /// Retires every element; used when the owning connection goes away
    pub fn clear(&mut self) {
        for e in self.live.drain(..) {
            self.retired.insert((e.kind, e.id), e.uuid);
        }
    }
}
