use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// Bluetooth device address.
///
/// Bytes are kept in textual order: `01:23:45:67:89:0A` is
/// `[0x01, 0x23, 0x45, 0x67, 0x89, 0x0A]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress {
    bytes: [u8; 6],
}

impl DeviceAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    /// Builds an address from a slice that must be exactly 6 bytes long.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = slice.try_into().ok()?;
        Some(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.bytes
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[0],
            self.bytes[1],
            self.bytes[2],
            self.bytes[3],
            self.bytes[4],
            self.bytes[5]
        )
    }
}

impl FromStr for DeviceAddress {
    type Err = Error;

    /// Parses six colon-separated two-digit hex groups, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidFormat(format!("expected XX:XX:XX:XX:XX:XX, got {:?}", s));

        let mut bytes = [0u8; 6];
        let mut groups = s.split(':');
        for byte in bytes.iter_mut() {
            let group = groups.next().ok_or_else(invalid)?;
            if group.len() != 2 {
                return Err(invalid());
            }
            let mut out = [0u8; 1];
            hex::decode_to_slice(group, &mut out).map_err(|_| invalid())?;
            *byte = out[0];
        }
        if groups.next().is_some() {
            return Err(invalid());
        }

        Ok(Self { bytes })
    }
}

impl From<[u8; 6]> for DeviceAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self::new(bytes)
    }
}

/// Power state of the local adapter.
///
/// Only transport events move the adapter between states; the application can
/// request a transition with `enable`/`disable` but never set a state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterState {
    #[default]
    Disabled,
    Enabling,
    Enabled,
    Disabling,
}

/// Bonding state of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BondState {
    #[default]
    None,
    Bonding,
    Bonded,
}

/// How the peer asks the local side to authenticate a pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingVariant {
    /// Both sides show the passkey; the user confirms they match
    PasskeyConfirmation,
    /// The user types the passkey shown on the peer
    PasskeyEntry,
    /// Just Works: the user only accepts or rejects
    Consent,
    /// The passkey is shown locally for entry on the peer
    PasskeyNotification,
    /// Legacy pairing asking for a PIN code
    PinEntry,
}

/// A remote device the client has seen through scanning, connecting or bonding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownDevice {
    pub address: DeviceAddress,
    pub rssi: Option<i32>,
    pub name: Option<String>,
    pub bond_state: BondState,
}

impl KnownDevice {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            rssi: None,
            name: None,
            bond_state: BondState::None,
        }
    }
}
