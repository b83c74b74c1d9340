//! Advertising payload decoding
//!
//! Advertisement bytes come straight off the air, so every length field is
//! checked against the remaining buffer before it is trusted.

use crate::gap::constants::*;
use crate::uuid::Uuid128;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Split an advertising payload into its (type, data) AD structures
///
/// Parsing stops at the first zero length octet (the padding that follows the
/// significant part) or at a structure that would run past the end of the buffer.
pub fn parse_advertising_data(data: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i] as usize;
        if length == 0 || i + 1 + length > data.len() {
            break;
        }

        let ad_type = data[i + 1];
        result.push((ad_type, data[i + 2..i + 1 + length].to_vec()));

        i += 1 + length;
    }

    result
}

/// Decoded view of an advertising payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisingData {
    pub flags: Option<u8>,
    pub local_name: Option<String>,
    /// True when `local_name` came from a Complete Local Name structure
    pub complete_name: bool,
    pub tx_power: Option<i8>,
    pub appearance: Option<u16>,
    pub service_uuids: Vec<Uuid128>,
    pub service_data: Vec<(Uuid128, Vec<u8>)>,
    pub manufacturer_data: Vec<(u16, Vec<u8>)>,
}

impl AdvertisingData {
    pub fn parse(payload: &[u8]) -> Self {
        let mut adv = AdvertisingData::default();

        for (ad_type, data) in parse_advertising_data(payload) {
            match ad_type {
                ADV_TYPE_FLAGS => {
                    if let Some(&flags) = data.first() {
                        adv.flags = Some(flags);
                    }
                }
                ADV_TYPE_SHORT_LOCAL_NAME => {
                    if !adv.complete_name {
                        adv.local_name = Some(String::from_utf8_lossy(&data).into_owned());
                    }
                }
                ADV_TYPE_COMPLETE_LOCAL_NAME => {
                    adv.local_name = Some(String::from_utf8_lossy(&data).into_owned());
                    adv.complete_name = true;
                }
                ADV_TYPE_TX_POWER_LEVEL => {
                    if data.len() == 1 {
                        adv.tx_power = Some(data[0] as i8);
                    }
                }
                ADV_TYPE_APPEARANCE => {
                    if data.len() == 2 {
                        adv.appearance = Some(u16::from_le_bytes([data[0], data[1]]));
                    }
                }
                ADV_TYPE_16BIT_SERVICE_UUID_PARTIAL | ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE => {
                    adv.service_uuids.extend(read_uuid_list(&data, 2));
                }
                ADV_TYPE_32BIT_SERVICE_UUID_PARTIAL | ADV_TYPE_32BIT_SERVICE_UUID_COMPLETE => {
                    adv.service_uuids.extend(read_uuid_list(&data, 4));
                }
                ADV_TYPE_128BIT_SERVICE_UUID_PARTIAL | ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE => {
                    adv.service_uuids.extend(read_uuid_list(&data, 16));
                }
                ADV_TYPE_SERVICE_DATA_16BIT => adv.push_service_data(&data, 2),
                ADV_TYPE_SERVICE_DATA_32BIT => adv.push_service_data(&data, 4),
                ADV_TYPE_SERVICE_DATA_128BIT => adv.push_service_data(&data, 16),
                ADV_TYPE_MANUFACTURER_SPECIFIC => {
                    let mut cursor = Cursor::new(&data[..]);
                    if let Ok(company_id) = cursor.read_u16::<LittleEndian>() {
                        adv.manufacturer_data.push((company_id, data[2..].to_vec()));
                    }
                }
                _ => {}
            }
        }

        adv
    }

    fn push_service_data(&mut self, data: &[u8], uuid_len: usize) {
        if data.len() < uuid_len {
            return;
        }
        if let Some(uuid) = Uuid128::try_from_slice_le(&data[..uuid_len]) {
            self.service_data.push((uuid, data[uuid_len..].to_vec()));
        }
    }

    /// Whether the advertiser is in limited or general discoverable mode
    pub fn is_discoverable(&self) -> bool {
        self.flags.map_or(false, |flags| {
            flags & (ADV_FLAG_LE_LIMITED_DISCOVERABLE | ADV_FLAG_LE_GENERAL_DISCOVERABLE) != 0
        })
    }

    pub fn is_le_only(&self) -> bool {
        self.flags
            .map_or(false, |flags| flags & ADV_FLAG_BR_EDR_NOT_SUPPORTED != 0)
    }
}

/// Read a packed list of little-endian UUIDs; a trailing partial entry is dropped.
fn read_uuid_list(data: &[u8], uuid_len: usize) -> Vec<Uuid128> {
    let mut cursor = Cursor::new(data);
    let mut uuids = Vec::with_capacity(data.len() / uuid_len);

    loop {
        let uuid = match uuid_len {
            2 => cursor.read_u16::<LittleEndian>().map(Uuid128::from_u16),
            4 => cursor.read_u32::<LittleEndian>().map(Uuid128::from_u32),
            _ => cursor.read_u128::<LittleEndian>().map(|raw| Uuid128::from_bytes_le(raw.to_le_bytes())),
        };
        match uuid {
            Ok(uuid) => uuids.push(uuid),
            Err(_) => break,
        }
    }

    uuids
}
