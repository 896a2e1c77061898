//! Hosted radio simulator.
//!
//! Provides a `Station` and an `AccessPoint` backed by one shared in-memory
//! radio, for tests and for running the manager on a development machine.
//! Networks are described up front; a join succeeds after a configurable
//! number of link-state polls when the secret matches (or the network is
//! open). Every radio mutation is appended to an event log so callers can
//! check ordering afterwards.

use crate::config::AccessPointConfig;
use crate::driver::{AccessPoint, DriverError, Station};
use crate::model::{IpInfo, LinkState, ScanResult, SecurityMode};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A network the simulator can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimNetwork {
    pub ssid: String,
    pub rssi: i16,
    pub security: SecurityMode,

    /// Secret that joins this network. Ignored for open networks.
    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub channel: u8,

    /// When false the network shows up in scans but never accepts a join.
    #[serde(default = "default_true")]
    pub accepts_joins: bool,
}

fn default_true() -> bool {
    true
}

impl SimNetwork {
    pub fn open(ssid: &str, rssi: i16) -> Self {
        Self::secured(ssid, rssi, SecurityMode::Open, "")
    }

    pub fn secured(ssid: &str, rssi: i16, security: SecurityMode, password: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            rssi,
            security,
            password: password.to_string(),
            channel: 6,
            accepts_joins: true,
        }
    }

    /// Mark the network as visible but unjoinable.
    pub fn unreachable(mut self) -> Self {
        self.accepts_joins = false;
        self
    }
}

/// Scenario file layout for the simulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimScenario {
    /// Link-state polls a successful join needs before it reports connected.
    #[serde(default)]
    pub association_polls: u32,

    pub networks: Vec<SimNetwork>,
}

/// Radio mutations recorded by the simulator, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    StationActive(bool),
    Scan,
    Connect(String),
    Linked(String),
    AccessPointUp(String),
    AccessPointDown,
}

#[derive(Debug, Clone)]
enum SimLink {
    Idle,
    Associating { ssid: String, polls_left: u32 },
    Rejected,
    Up { ssid: String },
}

#[derive(Debug)]
struct SimState {
    networks: Vec<SimNetwork>,
    association_polls: u32,
    station_active: bool,
    access_point: Option<AccessPointConfig>,
    link: SimLink,
    scan_error: Option<String>,
    events: Vec<RadioEvent>,
}

impl SimState {
    fn poll_link(&mut self) -> LinkState {
        match &mut self.link {
            SimLink::Idle | SimLink::Rejected => LinkState::Disconnected,
            SimLink::Up { .. } => LinkState::Connected,
            SimLink::Associating { ssid, polls_left } => {
                if *polls_left == 0 {
                    let ssid = ssid.clone();
                    self.events.push(RadioEvent::Linked(ssid.clone()));
                    self.link = SimLink::Up { ssid };
                    LinkState::Connected
                } else {
                    *polls_left -= 1;
                    LinkState::Connecting
                }
            }
        }
    }
}

/// Shared simulated radio. Clones refer to the same radio.
#[derive(Debug, Clone)]
pub struct SimulatedRadio {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRadio {
    pub fn new(networks: Vec<SimNetwork>) -> Self {
        Self::from_scenario(SimScenario {
            association_polls: 0,
            networks,
        })
    }

    pub fn from_scenario(scenario: SimScenario) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                networks: scenario.networks,
                association_polls: scenario.association_polls,
                station_active: false,
                access_point: None,
                link: SimLink::Idle,
                scan_error: None,
                events: Vec::new(),
            })),
        }
    }

    /// Load a scenario from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_scenario(serde_json::from_str(json)?))
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Station handle onto this radio.
    pub fn station(&self) -> SimStation {
        SimStation {
            radio: self.clone(),
        }
    }

    /// Access point handle onto this radio.
    pub fn access_point(&self) -> SimAccessPoint {
        SimAccessPoint {
            radio: self.clone(),
        }
    }

    /// Make the next scans fail with the given message (`None` to clear).
    pub fn set_scan_error(&self, error: Option<&str>) {
        self.lock().scan_error = error.map(String::from);
    }

    /// Set how many polls a join takes before it reports connected.
    pub fn set_association_polls(&self, polls: u32) {
        self.lock().association_polls = polls;
    }

    /// Bring the station link up as if some outside event had joined it.
    pub fn force_link(&self, ssid: &str) {
        let mut state = self.lock();
        state.events.push(RadioEvent::Linked(ssid.to_string()));
        state.link = SimLink::Up {
            ssid: ssid.to_string(),
        };
    }

    /// Every SSID a join was requested for, in order.
    pub fn connect_attempts(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                RadioEvent::Connect(ssid) => Some(ssid.clone()),
                _ => None,
            })
            .collect()
    }

    /// Full event log.
    pub fn events(&self) -> Vec<RadioEvent> {
        self.lock().events.clone()
    }

    /// SSID of the current link, if up.
    pub fn linked_ssid(&self) -> Option<String> {
        match &self.lock().link {
            SimLink::Up { ssid } => Some(ssid.clone()),
            _ => None,
        }
    }

    /// Access point settings while it is up.
    pub fn access_point_config(&self) -> Option<AccessPointConfig> {
        self.lock().access_point.clone()
    }
}

/// Station side of a [`SimulatedRadio`].
#[derive(Debug, Clone)]
pub struct SimStation {
    radio: SimulatedRadio,
}

impl Station for SimStation {
    fn set_active(&mut self, active: bool) -> Result<(), DriverError> {
        let mut state = self.radio.lock();
        if state.station_active != active {
            state.station_active = active;
            state.events.push(RadioEvent::StationActive(active));
            if !active {
                state.link = SimLink::Idle;
            }
        }
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<ScanResult>, DriverError> {
        let mut state = self.radio.lock();
        if !state.station_active {
            return Err(DriverError::Scan("station interface is down".to_string()));
        }
        if let Some(error) = &state.scan_error {
            return Err(DriverError::Scan(error.clone()));
        }
        state.events.push(RadioEvent::Scan);
        Ok(state
            .networks
            .iter()
            .map(|n| ScanResult {
                ssid: n.ssid.clone(),
                rssi: n.rssi,
                security: n.security,
                channel: n.channel,
            })
            .collect())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        let mut state = self.radio.lock();
        if !state.station_active {
            return Err(DriverError::Connect("station interface is down".to_string()));
        }
        state.events.push(RadioEvent::Connect(ssid.to_string()));

        let accepted = state.networks.iter().any(|n| {
            n.ssid == ssid
                && n.accepts_joins
                && (n.security == SecurityMode::Open || n.password == password)
        });
        state.link = if accepted {
            SimLink::Associating {
                ssid: ssid.to_string(),
                polls_left: state.association_polls,
            }
        } else {
            SimLink::Rejected
        };
        Ok(())
    }

    fn link_state(&self) -> LinkState {
        self.radio.lock().poll_link()
    }

    fn ip_info(&self) -> Option<IpInfo> {
        match self.radio.lock().link {
            SimLink::Up { .. } => Some(IpInfo {
                address: Ipv4Addr::new(192, 168, 1, 50),
                gateway: Ipv4Addr::new(192, 168, 1, 1),
                prefix_len: 24,
            }),
            _ => None,
        }
    }
}

/// Access point side of a [`SimulatedRadio`].
#[derive(Debug, Clone)]
pub struct SimAccessPoint {
    radio: SimulatedRadio,
}

impl AccessPoint for SimAccessPoint {
    fn activate(&mut self, config: &AccessPointConfig) -> Result<(), DriverError> {
        let mut state = self.radio.lock();
        state.access_point = Some(config.clone());
        state.events.push(RadioEvent::AccessPointUp(config.ssid.clone()));
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), DriverError> {
        let mut state = self.radio.lock();
        if state.access_point.take().is_some() {
            state.events.push(RadioEvent::AccessPointDown);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.radio.lock().access_point.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_join_with_matching_secret() {
        let radio = SimulatedRadio::new(vec![SimNetwork::secured(
            "home",
            -40,
            SecurityMode::Wpa2Psk,
            "secret1",
        )]);
        radio.set_association_polls(2);
        let mut station = radio.station();

        station.set_active(true).unwrap();
        station.connect("home", "secret1").unwrap();

        assert_eq!(station.link_state(), LinkState::Connecting);
        assert_eq!(station.link_state(), LinkState::Connecting);
        assert_eq!(station.link_state(), LinkState::Connected);
        assert_eq!(radio.linked_ssid().as_deref(), Some("home"));
        assert!(station.ip_info().is_some());
    }

    #[test]
    fn test_join_with_wrong_secret_never_links() {
        let radio = SimulatedRadio::new(vec![SimNetwork::secured(
            "home",
            -40,
            SecurityMode::Wpa2Psk,
            "secret1",
        )]);
        let mut station = radio.station();

        station.set_active(true).unwrap();
        station.connect("home", "nope").unwrap();

        assert_eq!(station.link_state(), LinkState::Disconnected);
        assert_eq!(radio.connect_attempts(), vec!["home".to_string()]);
    }

    #[test]
    fn test_inactive_station_cannot_scan() {
        let radio = SimulatedRadio::new(vec![SimNetwork::open("guest", -30)]);
        let mut station = radio.station();

        assert!(station.scan().is_err());
        station.set_active(true).unwrap();
        assert_eq!(station.scan().unwrap().len(), 1);

        radio.set_scan_error(Some("driver busy"));
        assert_eq!(
            station.scan(),
            Err(DriverError::Scan("driver busy".to_string()))
        );
    }

    #[test]
    fn test_access_point_events() {
        let radio = SimulatedRadio::new(Vec::new());
        let mut ap = radio.access_point();

        ap.activate(&AccessPointConfig::default()).unwrap();
        assert!(ap.is_active());
        ap.deactivate().unwrap();
        ap.deactivate().unwrap();

        assert_eq!(
            radio.events(),
            vec![
                RadioEvent::AccessPointUp("wifimanager".to_string()),
                RadioEvent::AccessPointDown,
            ]
        );
    }

    #[test]
    fn test_scenario_from_json() {
        let radio = SimulatedRadio::from_json(
            r#"{
                "association_polls": 3,
                "networks": [
                    {"ssid": "home", "rssi": -40, "security": "wpa2-psk", "password": "pw"},
                    {"ssid": "lobby", "rssi": -70, "security": "open", "accepts_joins": false}
                ]
            }"#,
        )
        .unwrap();
        let mut station = radio.station();
        station.set_active(true).unwrap();

        let scanned = station.scan().unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[1].security, SecurityMode::Open);

        station.connect("lobby", "").unwrap();
        assert_eq!(station.link_state(), LinkState::Disconnected);
    }
}
