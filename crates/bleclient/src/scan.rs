//! Bluetooth LE scan session
//!
//! A [`ScanSession`] exists while scanning is active. It keeps the last
//! advertisement seen from every address, but reports every advertisement it
//! receives; filtering duplicates is left to observers.

use crate::error::{Error, Result};
use crate::gap::{AdapterState, AdvertisingData, DeviceAddress};
use std::collections::HashMap;

/// One advertisement report as delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub address: DeviceAddress,
    pub rssi: i32,
    /// Raw advertising payload as received
    pub payload: Vec<u8>,
    pub data: AdvertisingData,
}

/// Last advertisement seen from one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSeen {
    pub rssi: i32,
    pub payload: Vec<u8>,
    /// Number of reports received from the address in this session
    pub count: u64,
}

#[derive(Debug, Default)]
pub struct ScanSession {
    seen: HashMap<DeviceAddress, LastSeen>,
}

impl ScanSession {
    pub fn last_seen(&self, address: &DeviceAddress) -> Option<&LastSeen> {
        self.seen.get(address)
    }

    pub fn devices(&self) -> usize {
        self.seen.len()
    }
}

/// Start/stop lifecycle of the scan session
#[derive(Debug, Default)]
pub struct ScanController {
    session: Option<ScanSession>,
}

impl ScanController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the session. Returns `false` when a session already exists.
    pub fn start(&mut self, adapter: AdapterState) -> Result<bool> {
        if adapter != AdapterState::Enabled {
            return Err(Error::AdapterNotEnabled);
        }
        if self.session.is_some() {
            return Ok(false);
        }
        self.session = Some(ScanSession::default());
        Ok(true)
    }

    /// Destroys the session, handing it back so a refused stop can restore it
    pub fn stop(&mut self) -> Result<ScanSession> {
        self.session.take().ok_or(Error::NotScanning)
    }

    pub fn restore(&mut self, session: ScanSession) {
        self.session = Some(session);
    }

    /// Drops the session without a stop request; used on adapter loss
    pub fn teardown(&mut self) -> bool {
        self.session.take().is_some()
    }

    pub fn is_scanning(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    /// Records an advertisement; `None` when no session is active
    pub fn on_advertisement(
        &mut self,
        address: DeviceAddress,
        rssi: i32,
        payload: Vec<u8>,
    ) -> Option<ScanReport> {
        let session = self.session.as_mut()?;

        let entry = session.seen.entry(address).or_insert_with(|| LastSeen {
            rssi,
            payload: Vec::new(),
            count: 0,
        });
        entry.rssi = rssi;
        entry.payload = payload.clone();
        entry.count += 1;

        let data = AdvertisingData::parse(&payload);
        Some(ScanReport {
            address,
            rssi,
            payload,
            data,
        })
    }
}
