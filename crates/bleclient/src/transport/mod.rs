//! Boundary to the adapter/driver layer
//!
//! The core talks to the adapter through the [`Transport`] trait. Every call is
//! fire-and-forget: a successful return only means the request was handed to
//! the adapter, and the result arrives later as a [`TransportEvent`] pushed
//! into an [`EventSink`].

pub mod channel;
pub mod events;

pub use channel::{event_channel, EventQueue, EventSink, Received};
pub use events::TransportEvent;

use crate::error::{ConnId, Status};
use crate::gap::{DeviceAddress, PairingVariant};
use crate::gatt::{AuthRequirement, ElementId, WriteType};
use crate::uuid::Uuid128;

/// Result of handing a request to the adapter; `Err` carries the adapter's
/// non-zero status when it refused the request outright.
pub type SendResult = std::result::Result<(), Status>;

/// Requests the core issues to the adapter
///
/// Implementations must not call back into the client synchronously from
/// inside these methods while holding locks the client's observers need; the
/// usual shape is to forward the request to a driver thread and report results
/// through an [`EventSink`].
pub trait Transport: Send + Sync {
    /// Powers the adapter on and registers the client application
    fn enable(&self, app_uuid: &Uuid128) -> SendResult;
    fn disable(&self) -> SendResult;

    fn start_scan(&self) -> SendResult;
    fn stop_scan(&self) -> SendResult;

    fn connect(&self, address: &DeviceAddress) -> SendResult;
    fn disconnect(&self, conn_id: ConnId) -> SendResult;
    fn pair(&self, address: &DeviceAddress) -> SendResult;
    /// Abandons a bonding started by `pair` or by the peer
    fn cancel_bond(&self, address: &DeviceAddress) -> SendResult;
    fn remove_bond(&self, address: &DeviceAddress) -> SendResult;
    /// Answers a pairing request; `passkey` is ignored by variants that carry none
    fn ssp_reply(
        &self,
        address: &DeviceAddress,
        variant: PairingVariant,
        accept: bool,
        passkey: u32,
    ) -> SendResult;
    fn read_remote_rssi(&self, conn_id: ConnId) -> SendResult;

    /// `uuid == None` discovers every service
    fn discover_services(&self, conn_id: ConnId, uuid: Option<Uuid128>) -> SendResult;
    fn discover_included_services(
        &self,
        conn_id: ConnId,
        service_id: ElementId,
        uuid: Option<Uuid128>,
    ) -> SendResult;
    fn discover_characteristics(
        &self,
        conn_id: ConnId,
        service_id: ElementId,
        uuid: Option<Uuid128>,
    ) -> SendResult;
    fn discover_descriptors(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
        uuid: Option<Uuid128>,
    ) -> SendResult;

    fn read_char(&self, conn_id: ConnId, char_id: ElementId, auth: AuthRequirement) -> SendResult;
    fn read_desc(&self, conn_id: ConnId, desc_id: ElementId, auth: AuthRequirement) -> SendResult;
    fn write_char(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
        write_type: WriteType,
        auth: AuthRequirement,
        value: &[u8],
    ) -> SendResult;
    fn write_desc(
        &self,
        conn_id: ConnId,
        desc_id: ElementId,
        write_type: WriteType,
        auth: AuthRequirement,
        value: &[u8],
    ) -> SendResult;
    fn prep_write_char(
        &self,
        conn_id: ConnId,
        char_id: ElementId,
        auth: AuthRequirement,
        value: &[u8],
    ) -> SendResult;
    fn prep_write_desc(
        &self,
        conn_id: ConnId,
        desc_id: ElementId,
        auth: AuthRequirement,
        value: &[u8],
    ) -> SendResult;
    /// Commits (`execute == true`) or discards the queued prepared writes
    fn execute_write(&self, conn_id: ConnId, execute: bool) -> SendResult;

    fn register_char_notification(&self, conn_id: ConnId, char_id: ElementId) -> SendResult;
    fn unregister_char_notification(&self, conn_id: ConnId, char_id: ElementId) -> SendResult;
}
