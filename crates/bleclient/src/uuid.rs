use crate::error::Error;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;

/// Represents a 128-bit Bluetooth UUID.
///
/// Internally the UUID is stored in little-endian byte order, which is the order
/// the transport uses on the wire. The textual form is the usual dashed
/// big-endian representation, so converting between the two reverses the bytes.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Uuid128 {
    bytes: [u8; 16],
}

/// The base UUID used for constructing 128-bit UUIDs from 16-bit and 32-bit values.
/// Defined as "00000000-0000-1000-8000-00805F9B34FB" (little-endian representation).
const BASE_UUID_BYTES: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Offset within the base UUID where the 16/32-bit value is inserted.
const BASE_OFFSET: usize = 12;

/// Length of the canonical dashed text form.
const TEXT_LEN: usize = 36;

/// Positions of the dashes in the canonical text form.
const DASH_POSITIONS: [usize; 4] = [8, 13, 18, 23];

impl Uuid128 {
    /// Creates a UUID from 16 bytes in wire (little-endian) order.
    pub const fn from_bytes_le(bytes: [u8; 16]) -> Self {
        Uuid128 { bytes }
    }

    /// Creates a UUID from 16 bytes in textual (big-endian) order.
    pub fn from_bytes_be(mut bytes: [u8; 16]) -> Self {
        bytes.reverse();
        Uuid128 { bytes }
    }

    /// Creates a 128-bit UUID from a 16-bit SIG-assigned value.
    pub const fn from_u16(uuid16: u16) -> Self {
        let mut bytes = BASE_UUID_BYTES;
        bytes[BASE_OFFSET] = uuid16 as u8;
        bytes[BASE_OFFSET + 1] = (uuid16 >> 8) as u8;
        Uuid128 { bytes }
    }

    /// Creates a 128-bit UUID from a 32-bit SIG-assigned value.
    pub const fn from_u32(uuid32: u32) -> Self {
        let mut bytes = BASE_UUID_BYTES;
        bytes[BASE_OFFSET] = uuid32 as u8;
        bytes[BASE_OFFSET + 1] = (uuid32 >> 8) as u8;
        bytes[BASE_OFFSET + 2] = (uuid32 >> 16) as u8;
        bytes[BASE_OFFSET + 3] = (uuid32 >> 24) as u8;
        Uuid128 { bytes }
    }

    /// Tries to create a UUID from a little-endian byte slice.
    ///
    /// Accepts slices of length 2 (16-bit), 4 (32-bit), or 16 (128-bit).
    pub fn try_from_slice_le(slice: &[u8]) -> Option<Self> {
        match slice.len() {
            2 => Some(Uuid128::from_u16(u16::from_le_bytes([slice[0], slice[1]]))),
            4 => Some(Uuid128::from_u32(u32::from_le_bytes([
                slice[0], slice[1], slice[2], slice[3],
            ]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(slice);
                Some(Uuid128::from_bytes_le(bytes))
            }
            _ => None,
        }
    }

    /// Generates a random (version 4) UUID.
    pub fn new_random_v4() -> Self {
        let mut be = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut be);
        be[6] = (be[6] & 0x0F) | 0x40;
        be[8] = (be[8] & 0x3F) | 0x80;
        Uuid128::from_bytes_be(be)
    }

    /// Returns the bytes in wire (little-endian) order.
    pub const fn as_bytes_le(&self) -> &[u8; 16] {
        &self.bytes
    }

    /// Returns the bytes in textual (big-endian) order.
    pub fn to_bytes_be(&self) -> [u8; 16] {
        let mut bytes = self.bytes;
        bytes.reverse();
        bytes
    }

    fn is_sig_assigned(&self) -> bool {
        self.bytes[0..BASE_OFFSET] == BASE_UUID_BYTES[0..BASE_OFFSET]
    }

    /// Returns the 16-bit short form if this is a SIG-assigned 16-bit UUID.
    pub fn as_u16(&self) -> Option<u16> {
        if self.is_sig_assigned()
            && self.bytes[BASE_OFFSET + 2] == 0
            && self.bytes[BASE_OFFSET + 3] == 0
        {
            Some(u16::from_le_bytes([
                self.bytes[BASE_OFFSET],
                self.bytes[BASE_OFFSET + 1],
            ]))
        } else {
            None
        }
    }
}

impl From<u16> for Uuid128 {
    fn from(uuid16: u16) -> Self {
        Uuid128::from_u16(uuid16)
    }
}

impl fmt::Display for Uuid128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes_be();
        write!(
            f,
            "{}-{}-{}-{}-{}",
            hex::encode_upper(&b[0..4]),
            hex::encode_upper(&b[4..6]),
            hex::encode_upper(&b[6..8]),
            hex::encode_upper(&b[8..10]),
            hex::encode_upper(&b[10..16])
        )
    }
}

impl fmt::Debug for Uuid128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u16() {
            Some(short) => write!(f, "Uuid128(0x{:04X})", short),
            None => write!(f, "Uuid128({})", self),
        }
    }
}

impl FromStr for Uuid128 {
    type Err = Error;

    /// Parses the canonical 36-character dashed form, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != TEXT_LEN || !s.is_ascii() {
            return Err(Error::InvalidFormat(format!("UUID must be {} characters: {:?}", TEXT_LEN, s)));
        }

        let mut digits = String::with_capacity(32);
        for (i, c) in s.chars().enumerate() {
            if DASH_POSITIONS.contains(&i) {
                if c != '-' {
                    return Err(Error::InvalidFormat(format!("expected '-' at offset {} in {:?}", i, s)));
                }
            } else {
                digits.push(c);
            }
        }

        let mut bytes_be = [0u8; 16];
        hex::decode_to_slice(&digits, &mut bytes_be)?;
        Ok(Uuid128::from_bytes_be(bytes_be))
    }
}

/// UUID argument for discovery requests.
///
/// `Any` is the wildcard that matches every element, sent to the transport as
/// an absent UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UuidFilter {
    #[default]
    Any,
    Exact(Uuid128),
}

impl UuidFilter {
    /// Parses an optional UUID text; `None` yields the wildcard.
    pub fn parse(text: Option<&str>) -> Result<Self, Error> {
        match text {
            None => Ok(UuidFilter::Any),
            Some(s) => Ok(UuidFilter::Exact(s.parse()?)),
        }
    }

    /// Returns the UUID to send to the transport, or `None` for the wildcard.
    pub fn as_uuid(&self) -> Option<Uuid128> {
        match self {
            UuidFilter::Any => None,
            UuidFilter::Exact(uuid) => Some(*uuid),
        }
    }

    pub fn matches(&self, uuid: &Uuid128) -> bool {
        match self {
            UuidFilter::Any => true,
            UuidFilter::Exact(expected) => expected == uuid,
        }
    }
}

impl From<Uuid128> for UuidFilter {
    fn from(uuid: Uuid128) -> Self {
        UuidFilter::Exact(uuid)
    }
}
