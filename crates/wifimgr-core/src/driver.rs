//! Radio driver facade.
//!
//! The manager never reaches for ambient radio singletons. Platform crates
//! hand it two exclusively owned handles instead:
//! - [`Station`] for scanning, joining and link-state queries
//! - [`AccessPoint`] for the fallback provisioning network
//!
//! Both handles may drive the same physical radio underneath.
//!
//! All methods are synchronous to support embedded platforms. `connect`
//! only issues the join; completion is observed through `link_state`.

use crate::config::AccessPointConfig;
use crate::model::{IpInfo, LinkState, ScanResult};

/// Errors reported by a radio driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// Scanning for networks failed.
    #[error("Scan failed: {0}")]
    Scan(String),

    /// The join request could not be issued.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Interface activation or configuration failed.
    #[error("Radio error: {0}")]
    Radio(String),
}

/// Station (client) side of the radio.
pub trait Station {
    /// Power the station interface up or down.
    fn set_active(&mut self, active: bool) -> Result<(), DriverError>;

    /// Scan for networks in range.
    fn scan(&mut self) -> Result<Vec<ScanResult>, DriverError>;

    /// Issue a join request. An empty password joins an open network.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError>;

    /// Current link state.
    fn link_state(&self) -> LinkState;

    /// IP configuration, if the interface holds an address.
    fn ip_info(&self) -> Option<IpInfo>;

    /// Check if connected.
    fn is_connected(&self) -> bool {
        self.link_state() == LinkState::Connected
    }
}

/// Access point side of the radio.
pub trait AccessPoint {
    /// Bring the access point up with the given network settings.
    fn activate(&mut self, config: &AccessPointConfig) -> Result<(), DriverError>;

    /// Take the access point down.
    fn deactivate(&mut self) -> Result<(), DriverError>;

    /// Whether the access point is currently up.
    fn is_active(&self) -> bool;
}

/// Proof that a station link was observed as connected.
///
/// Only [`LinkConfirmed::observe`] builds one, so code that demands this
/// token (such as tearing down a provisioning session) cannot run before
/// the station is up.
#[derive(Debug)]
pub struct LinkConfirmed {
    ip_info: Option<IpInfo>,
}

impl LinkConfirmed {
    /// Check the station and return a token if it reports `Connected`.
    pub fn observe<S: Station + ?Sized>(station: &S) -> Option<Self> {
        if station.is_connected() {
            Some(Self {
                ip_info: station.ip_info(),
            })
        } else {
            None
        }
    }

    /// IP configuration seen when the link was confirmed.
    pub fn ip_info(&self) -> Option<IpInfo> {
        self.ip_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStation(LinkState);

    impl Station for FixedStation {
        fn set_active(&mut self, _active: bool) -> Result<(), DriverError> {
            Ok(())
        }

        fn scan(&mut self) -> Result<Vec<ScanResult>, DriverError> {
            Err(DriverError::Scan("not supported".to_string()))
        }

        fn connect(&mut self, _ssid: &str, _password: &str) -> Result<(), DriverError> {
            Ok(())
        }

        fn link_state(&self) -> LinkState {
            self.0
        }

        fn ip_info(&self) -> Option<IpInfo> {
            None
        }
    }

    #[test]
    fn test_link_confirmed_requires_connected_station() {
        assert!(LinkConfirmed::observe(&FixedStation(LinkState::Disconnected)).is_none());
        assert!(LinkConfirmed::observe(&FixedStation(LinkState::Connecting)).is_none());
        assert!(LinkConfirmed::observe(&FixedStation(LinkState::Connected)).is_some());
    }
}
