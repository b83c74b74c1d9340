// Advertising Data Types
pub const ADV_TYPE_FLAGS: u8 = 0x01;
pub const ADV_TYPE_16BIT_SERVICE_UUID_PARTIAL: u8 = 0x02;
pub const ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE: u8 = 0x03;
pub const ADV_TYPE_32BIT_SERVICE_UUID_PARTIAL: u8 = 0x04;
pub const ADV_TYPE_32BIT_SERVICE_UUID_COMPLETE: u8 = 0x05;
pub const ADV_TYPE_128BIT_SERVICE_UUID_PARTIAL: u8 = 0x06;
pub const ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE: u8 = 0x07;
pub const ADV_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
pub const ADV_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const ADV_TYPE_TX_POWER_LEVEL: u8 = 0x0A;
pub const ADV_TYPE_SERVICE_DATA_16BIT: u8 = 0x16;
pub const ADV_TYPE_APPEARANCE: u8 = 0x19;
pub const ADV_TYPE_SERVICE_DATA_32BIT: u8 = 0x20;
pub const ADV_TYPE_SERVICE_DATA_128BIT: u8 = 0x21;
pub const ADV_TYPE_MANUFACTURER_SPECIFIC: u8 = 0xFF;

// Flags AD bits
pub const ADV_FLAG_LE_LIMITED_DISCOVERABLE: u8 = 0x01;
pub const ADV_FLAG_LE_GENERAL_DISCOVERABLE: u8 = 0x02;
pub const ADV_FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;
