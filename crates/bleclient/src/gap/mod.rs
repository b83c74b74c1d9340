//! Generic Access Profile: addresses, adapter power state and advertisements

pub mod adapter;
pub mod advertising;
pub mod constants;
pub mod types;

pub use adapter::{AdapterLifecycle, Transition};
pub use advertising::{parse_advertising_data, AdvertisingData};
pub use constants::*;
pub use types::*;
