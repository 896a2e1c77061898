//! wifimgr data model types.
//!
//! These types describe what the radio reports and what the manager hands
//! back to its caller:
//! - Scan results with signal strength and security mode
//! - Station link state and IP configuration
//! - The established link handle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Security mode advertised by a scanned network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    /// Anything the driver could not classify. Treated as encrypted.
    Unknown,
}

impl SecurityMode {
    /// Whether joining this network needs a secret.
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, SecurityMode::Open)
    }

    /// Weakest mode a station may accept when joining with `secret`.
    ///
    /// An empty secret only fits an open network. Any other secret accepts
    /// every encrypted mode from WEP up, so the radio negotiates whatever the
    /// network offers.
    pub fn join_threshold(secret: &str) -> Self {
        if secret.is_empty() {
            SecurityMode::Open
        } else {
            SecurityMode::Wep
        }
    }

    /// Map the numeric auth mode used by common radio firmwares
    /// (0 open, 1 WEP, 2 WPA-PSK, 3 WPA2-PSK, 4 WPA/WPA2-PSK).
    pub fn from_auth_mode(mode: u8) -> Self {
        match mode {
            0 => SecurityMode::Open,
            1 => SecurityMode::Wep,
            2 => SecurityMode::WpaPsk,
            3 => SecurityMode::Wpa2Psk,
            4 => SecurityMode::WpaWpa2Psk,
            _ => SecurityMode::Unknown,
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityMode::Open => "open",
            SecurityMode::Wep => "WEP",
            SecurityMode::WpaPsk => "WPA-PSK",
            SecurityMode::Wpa2Psk => "WPA2-PSK",
            SecurityMode::WpaWpa2Psk => "WPA/WPA2-PSK",
            SecurityMode::Unknown => "?",
        };
        f.write_str(name)
    }
}

/// A network seen by one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Network name (SSID). Empty for hidden networks.
    pub ssid: String,

    /// Received signal strength in dBm (higher is stronger).
    pub rssi: i16,

    /// Advertised security mode.
    pub security: SecurityMode,

    /// Radio channel, when the driver reports one.
    #[serde(default)]
    pub channel: u8,
}

impl ScanResult {
    pub fn new(ssid: &str, rssi: i16, security: SecurityMode) -> Self {
        Self {
            ssid: ssid.to_string(),
            rssi,
            security,
            channel: 0,
        }
    }
}

/// Order scan results by signal strength, strongest first.
///
/// The sort is stable: networks with equal strength keep the order the
/// driver reported them in.
pub fn rank_by_signal(results: &mut [ScanResult]) {
    results.sort_by(|a, b| b.rssi.cmp(&a.rssi));
}

/// Station link state as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// Not associated with any network.
    Disconnected,
    /// Association or address assignment in progress.
    Connecting,
    /// Associated and holding an address.
    Connected,
}

/// IPv4 configuration of the station interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// Netmask as prefix length (e.g. 24).
    pub prefix_len: u8,
}

impl fmt::Display for IpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} via {}",
            self.address, self.prefix_len, self.gateway
        )
    }
}

/// An established station link, handed back by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Network the manager joined, `None` when the link already existed.
    pub ssid: Option<String>,

    /// Address configuration at the time the link was confirmed.
    pub ip_info: Option<IpInfo>,
}
