//! Manager configuration.
//!
//! Timings and fixed network settings used by the acquisition flow and the
//! provisioning portal. `Default` carries the values the device ships with;
//! tests and hosted builds shrink the delays.
//!
//! Durations (de)serialize as integer milliseconds, and every field falls
//! back to its default when missing.

use crate::model::SecurityMode;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the fallback access point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPointConfig {
    /// Network name of the provisioning access point.
    pub ssid: String,

    /// Shared password of the provisioning access point.
    pub password: String,

    /// Security mode of the provisioning access point.
    pub security: SecurityMode,

    /// Address the device answers on while in AP mode.
    pub gateway: Ipv4Addr,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: "wifimanager".to_string(),
            password: "wifimanager".to_string(),
            security: SecurityMode::Wpa2Psk,
            gateway: Ipv4Addr::new(192, 168, 4, 1),
        }
    }
}

/// Configuration for the connection manager and its provisioning portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Wait before re-checking a link the driver may still be bringing up.
    #[serde(with = "millis")]
    pub settle_delay: Duration,

    /// Interval between link-state polls after a join request.
    #[serde(with = "millis")]
    pub connect_poll_interval: Duration,

    /// Number of link-state polls before a join attempt is given up.
    pub connect_poll_attempts: u32,

    /// Bound on each read from a portal client.
    #[serde(with = "millis")]
    pub read_timeout: Duration,

    /// Pause after answering a successful submission, before the AP drops.
    #[serde(with = "millis")]
    pub flush_delay: Duration,

    /// Pause after persisting new credentials so the link can stabilize.
    #[serde(with = "millis")]
    pub stabilize_delay: Duration,

    /// How long the portal waits for a client before re-checking the link.
    #[serde(with = "millis")]
    pub link_poll_interval: Duration,

    /// Wait before retrying a portal that failed to start.
    #[serde(with = "millis")]
    pub restart_delay: Duration,

    /// Largest request the portal accepts, headers and body included.
    pub max_request_bytes: usize,

    /// Address the portal binds to.
    pub portal_addr: Ipv4Addr,

    /// Port the portal listens on.
    pub portal_port: u16,

    /// Listen backlog of the portal socket.
    pub listen_backlog: u32,

    /// Fallback access point settings.
    pub access_point: AccessPointConfig,

    /// Credential file location.
    pub credentials_path: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(3),
            connect_poll_interval: Duration::from_millis(100),
            connect_poll_attempts: 200,
            read_timeout: Duration::from_secs(5),
            flush_delay: Duration::from_secs(1),
            stabilize_delay: Duration::from_secs(5),
            link_poll_interval: Duration::from_secs(1),
            restart_delay: Duration::from_secs(5),
            max_request_bytes: 4096,
            portal_addr: Ipv4Addr::UNSPECIFIED,
            portal_port: 80,
            listen_backlog: 1,
            access_point: AccessPointConfig::default(),
            credentials_path: PathBuf::from("wifi.dat"),
        }
    }
}

impl ManagerConfig {
    /// Parse a configuration from JSON, filling gaps with defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Total time a single join attempt may take.
    pub fn connect_budget(&self) -> Duration {
        self.connect_poll_interval * self.connect_poll_attempts
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.settle_delay, Duration::from_secs(3));
        assert_eq!(config.connect_budget(), Duration::from_secs(20));
        assert_eq!(config.portal_port, 80);
        assert_eq!(config.listen_backlog, 1);
        assert_eq!(config.access_point.ssid, "wifimanager");
        assert_eq!(config.access_point.security, SecurityMode::Wpa2Psk);
        assert_eq!(config.access_point.gateway, Ipv4Addr::new(192, 168, 4, 1));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ManagerConfig::from_json(r#"{"portal_port":8080,"settle_delay":250}"#).unwrap();

        assert_eq!(config.portal_port, 8080);
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.credentials_path, PathBuf::from("wifi.dat"));
    }

    #[test]
    fn test_json_round_trip() {
        let config = ManagerConfig {
            portal_port: 8081,
            flush_delay: Duration::from_millis(10),
            ..Default::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ManagerConfig::from_json(&json).unwrap(), config);
    }
}
