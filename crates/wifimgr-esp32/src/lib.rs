//! ESP32 radio driver for wifimgr.
//!
//! Implements the `Station` and `AccessPoint` seams of `wifimgr-core` on
//! top of ESP-IDF's WiFi driver. Both handles share one `EspWifi`; the
//! driver runs in client, access point or mixed mode depending on which
//! of them is active.
//!
//! # Example
//!
//! ```ignore
//! use wifimgr_esp32::radio::take_radio;
//!
//! let (station, access_point) = take_radio(peripherals.modem, sysloop, Some(nvs))?;
//! let mut manager = WifiManager::new(station, access_point, credentials, config);
//! ```
//!
//! This crate is not a workspace member; build it with the ESP toolchain.

pub mod radio;
