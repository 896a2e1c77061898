//! Connection acquisition.
//!
//! [`WifiManager::acquire_connection`] drives an explicit state machine:
//!
//! ```text
//! CheckLink --up--> Linked
//!     |
//!   Settle --up--> Linked
//!     |
//!    Scan --joined--> Linked
//!     |
//! Provision --submitted or external link--> Linked
//! ```
//!
//! Provisioning does not give up: a portal that fails to start is retried
//! after `restart_delay`, unless the station linked in the meantime. The
//! only way out without a link is cancellation, which is honoured at every
//! wait.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use wifimgr_core::{
    rank_by_signal, AccessPoint, CredentialStorage, Credentials, DriverError, Link,
    LinkConfirmed, ManagerConfig, ScanResult, Station,
};

use crate::portal::ProvisioningServer;

/// Errors from a single join attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("Failed. Not connected to {ssid}")]
    Timeout { ssid: String },

    #[error("Radio error: {0}")]
    Driver(#[from] DriverError),
}

impl ConnectError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectError::Timeout { .. })
    }
}

/// Join `ssid` and poll the link until it is up or the poll budget runs out.
///
/// The join is always requested, even if the station already reports a
/// link. The budget is `connect_poll_attempts` polls spaced
/// `connect_poll_interval` apart.
pub async fn connect_with_retry<S: Station + ?Sized>(
    station: &mut S,
    ssid: &str,
    password: &str,
    config: &ManagerConfig,
) -> Result<LinkConfirmed, ConnectError> {
    station.set_active(true)?;
    info!("Trying to connect to {}...", ssid);
    station.connect(ssid, password)?;

    for _ in 0..config.connect_poll_attempts {
        if let Some(confirmed) = LinkConfirmed::observe(&*station) {
            match confirmed.ip_info() {
                Some(ip) => info!("Connected to {}: {}", ssid, ip),
                None => info!("Connected to {}", ssid),
            }
            return Ok(confirmed);
        }
        sleep(config.connect_poll_interval).await;
    }

    warn!("Failed. Not connected to {}", ssid);
    Err(ConnectError::Timeout {
        ssid: ssid.to_string(),
    })
}

/// A network worth a join attempt, with the secret to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub ssid: String,
    pub password: String,
}

/// Order scanned networks for join attempts.
///
/// Networks are ranked by signal strength, strongest first. Open networks
/// are tried with an empty secret; encrypted ones only when a stored
/// secret exists.
pub fn plan_attempts(mut networks: Vec<ScanResult>, credentials: &Credentials) -> Vec<Candidate> {
    rank_by_signal(&mut networks);

    let mut candidates = Vec::new();
    for network in networks {
        info!(
            "ssid: {} chan: {} rssi: {} security: {}",
            network.ssid, network.channel, network.rssi, network.security
        );
        let password = if !network.security.is_encrypted() {
            String::new()
        } else if let Some(password) = credentials.get(&network.ssid) {
            password.clone()
        } else {
            debug!("Skipping unknown encrypted network {}", network.ssid);
            continue;
        };
        candidates.push(Candidate {
            ssid: network.ssid,
            password,
        });
    }
    candidates
}

/// Steps of the acquisition state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireState {
    /// Is the station already linked?
    CheckLink,
    /// Give a link the driver may be bringing up time to appear.
    Settle,
    /// Join known or open networks in range.
    Scan,
    /// Serve the provisioning portal.
    Provision,
    /// Done.
    Linked(Link),
}

/// Owns the radio handles and the credential store for one device.
pub struct WifiManager<S, A, C> {
    station: S,
    access_point: A,
    credentials: C,
    config: ManagerConfig,
}

impl<S, A, C> WifiManager<S, A, C>
where
    S: Station,
    A: AccessPoint,
    C: CredentialStorage,
{
    pub fn new(station: S, access_point: A, credentials: C, config: ManagerConfig) -> Self {
        Self {
            station,
            access_point,
            credentials,
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn station(&self) -> &S {
        &self.station
    }

    pub fn access_point(&self) -> &A {
        &self.access_point
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    /// Give back the radio handles and store.
    pub fn into_parts(self) -> (S, A, C) {
        (self.station, self.access_point, self.credentials)
    }

    /// Acquire a station link, provisioning through the portal if needed.
    ///
    /// Never gives up on its own; see [`acquire_connection_until`].
    ///
    /// [`acquire_connection_until`]: WifiManager::acquire_connection_until
    pub async fn acquire_connection(&mut self) -> Option<Link> {
        self.acquire_connection_until(std::future::pending::<()>())
            .await
    }

    /// Acquire a station link, stopping with `None` once `cancel` completes.
    ///
    /// Cancellation is observed between steps and while waiting (settle
    /// delay, join polling, portal accept). A client being served is
    /// finished first.
    pub async fn acquire_connection_until<F>(&mut self, cancel: F) -> Option<Link>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let mut state = AcquireState::CheckLink;

        loop {
            debug!("Acquisition step: {:?}", state);
            state = match state {
                AcquireState::CheckLink => match self.existing_link() {
                    Some(link) => AcquireState::Linked(link),
                    None => AcquireState::Settle,
                },
                AcquireState::Settle => {
                    tokio::select! {
                        _ = cancel.as_mut() => return self.cancelled(),
                        _ = sleep(self.config.settle_delay) => {}
                    }
                    match self.existing_link() {
                        Some(link) => AcquireState::Linked(link),
                        None => AcquireState::Scan,
                    }
                }
                AcquireState::Scan => {
                    let joined = tokio::select! {
                        _ = cancel.as_mut() => return self.cancelled(),
                        joined = self.join_known_network() => joined,
                    };
                    match joined {
                        Some(link) => AcquireState::Linked(link),
                        None => AcquireState::Provision,
                    }
                }
                AcquireState::Provision => match self.provision(cancel.as_mut()).await {
                    Ok(Some(link)) => AcquireState::Linked(link),
                    Ok(None) => return self.cancelled(),
                    Err(e) => {
                        error!("Provisioning portal failed: {}", e);
                        tokio::select! {
                            _ = cancel.as_mut() => return self.cancelled(),
                            _ = sleep(self.config.restart_delay) => {}
                        }
                        match LinkConfirmed::observe(&self.station) {
                            Some(confirmed) => {
                                AcquireState::Linked(self.release_access_point(confirmed))
                            }
                            None => AcquireState::Provision,
                        }
                    }
                },
                AcquireState::Linked(link) => {
                    info!("Network connection established");
                    return Some(link);
                }
            };
        }
    }

    fn cancelled(&self) -> Option<Link> {
        info!("Connection acquisition cancelled");
        None
    }

    fn existing_link(&self) -> Option<Link> {
        LinkConfirmed::observe(&self.station).map(|confirmed| Link {
            ssid: None,
            ip_info: confirmed.ip_info(),
        })
    }

    /// Drop an access point left up by a portal that never started.
    fn release_access_point(&mut self, confirmed: LinkConfirmed) -> Link {
        info!("Station link is up, abandoning the provisioning portal");
        if self.access_point.is_active() {
            if let Err(e) = self.access_point.deactivate() {
                warn!("Failed to deactivate access point: {}", e);
            }
        }
        Link {
            ssid: None,
            ip_info: confirmed.ip_info(),
        }
    }

    fn load_credentials(&self) -> Credentials {
        self.credentials.load().unwrap_or_else(|e| {
            warn!("No stored credentials: {}", e);
            Credentials::new()
        })
    }

    async fn join_known_network(&mut self) -> Option<Link> {
        let credentials = self.load_credentials();

        let scanned = self
            .station
            .set_active(true)
            .and_then(|()| self.station.scan());
        let networks = match scanned {
            Ok(networks) => networks,
            Err(e) => {
                warn!("Scan failed, no networks to try: {}", e);
                return None;
            }
        };

        for candidate in plan_attempts(networks, &credentials) {
            match connect_with_retry(
                &mut self.station,
                &candidate.ssid,
                &candidate.password,
                &self.config,
            )
            .await
            {
                Ok(confirmed) => {
                    return Some(Link {
                        ssid: Some(candidate.ssid),
                        ip_info: confirmed.ip_info(),
                    })
                }
                Err(ConnectError::Driver(e)) => warn!("Join of {} failed: {}", candidate.ssid, e),
                Err(ConnectError::Timeout { .. }) => {}
            }
        }
        None
    }

    async fn provision<F>(&mut self, cancel: Pin<&mut F>) -> Result<Option<Link>, crate::PortalError>
    where
        F: Future<Output = ()>,
    {
        let mut portal = ProvisioningServer::new(
            &mut self.station,
            &mut self.access_point,
            &mut self.credentials,
            &self.config,
        );
        portal.start(self.config.portal_port).await?;
        portal.run_until(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wifimgr_core::sim::{RadioEvent, SimAccessPoint, SimNetwork, SimStation, SimulatedRadio};
    use wifimgr_core::{MemoryCredentialStorage, SecurityMode};

    type SimManager = WifiManager<SimStation, SimAccessPoint, MemoryCredentialStorage>;

    fn manager(radio: &SimulatedRadio, store: &MemoryCredentialStorage) -> SimManager {
        WifiManager::new(
            radio.station(),
            radio.access_point(),
            store.clone(),
            ManagerConfig::default(),
        )
    }

    fn scanned(ssid: &str, rssi: i16, security: SecurityMode) -> ScanResult {
        ScanResult::new(ssid, rssi, security)
    }

    #[test]
    fn test_plan_attempts_ranks_and_filters() {
        let mut credentials = Credentials::new();
        credentials.insert("home".to_string(), "secret1".to_string());
        credentials.insert("guest".to_string(), "ignored".to_string());

        let plan = plan_attempts(
            vec![
                scanned("home", -40, SecurityMode::Wpa2Psk),
                scanned("office", -20, SecurityMode::Wpa2Psk),
                scanned("guest", -30, SecurityMode::Open),
            ],
            &credentials,
        );

        assert_eq!(
            plan,
            vec![
                Candidate {
                    ssid: "guest".to_string(),
                    password: String::new(),
                },
                Candidate {
                    ssid: "home".to_string(),
                    password: "secret1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_plan_attempts_nothing_usable() {
        let plan = plan_attempts(
            vec![scanned("office", -20, SecurityMode::WpaWpa2Psk)],
            &Credentials::new(),
        );
        assert!(plan.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_link_skips_scan() {
        let radio = SimulatedRadio::new(vec![SimNetwork::open("cafe", -50)]);
        radio.force_link("cafe");
        let store = MemoryCredentialStorage::new();

        let link = manager(&radio, &store).acquire_connection().await.unwrap();

        assert_eq!(link.ssid, None);
        assert!(link.ip_info.is_some());
        assert!(!radio.events().contains(&RadioEvent::Scan));
        assert!(radio.connect_attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_appearing_during_settle_is_used() {
        let radio = SimulatedRadio::new(vec![SimNetwork::open("cafe", -50)]);
        let store = MemoryCredentialStorage::new();
        let mut manager = manager(&radio, &store);

        let external = async {
            sleep(Duration::from_secs(1)).await;
            radio.force_link("cafe");
        };
        let (link, ()) = tokio::join!(manager.acquire_connection(), external);

        assert_eq!(link.unwrap().ssid, None);
        assert!(radio.connect_attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_joins_strongest_known_network() {
        let radio = SimulatedRadio::new(vec![
            SimNetwork::secured("home", -40, SecurityMode::Wpa2Psk, "secret1"),
            SimNetwork::secured("office", -20, SecurityMode::Wpa2Psk, "corp"),
            SimNetwork::open("guest", -30).unreachable(),
        ]);
        let store = MemoryCredentialStorage::with_contents("home;secret1\n");

        let link = manager(&radio, &store).acquire_connection().await.unwrap();

        assert_eq!(link.ssid.as_deref(), Some("home"));
        assert_eq!(radio.connect_attempts(), vec!["guest", "home"]);
        assert_eq!(radio.linked_ssid().as_deref(), Some("home"));
        assert!(!radio
            .events()
            .iter()
            .any(|e| matches!(e, RadioEvent::AccessPointUp(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_store_still_tries_open_networks() {
        let radio = SimulatedRadio::new(vec![
            SimNetwork::secured("home", -40, SecurityMode::Wpa2Psk, "secret1"),
            SimNetwork::open("cafe", -60),
        ]);
        let store = MemoryCredentialStorage::new();

        let link = manager(&radio, &store).acquire_connection().await.unwrap();

        assert_eq!(link.ssid.as_deref(), Some("cafe"));
        assert_eq!(radio.connect_attempts(), vec!["cafe"]);
        assert_eq!(store.contents(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_times_out() {
        let radio = SimulatedRadio::new(vec![SimNetwork::open("slow", -50)]);
        radio.set_association_polls(500);
        let mut station = radio.station();
        let config = ManagerConfig::default();

        let start = tokio::time::Instant::now();
        let result = connect_with_retry(&mut station, "slow", "", &config).await;

        assert_eq!(
            result.unwrap_err(),
            ConnectError::Timeout {
                ssid: "slow".to_string()
            }
        );
        assert!(start.elapsed() >= config.connect_budget());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_waits_for_association() {
        let radio = SimulatedRadio::new(vec![SimNetwork::secured(
            "home",
            -40,
            SecurityMode::Wpa2Psk,
            "secret1",
        )]);
        radio.set_association_polls(3);
        let mut station = radio.station();

        let confirmed = connect_with_retry(&mut station, "home", "secret1", &ManagerConfig::default())
            .await
            .unwrap();

        assert!(confirmed.ip_info().is_some());
        assert_eq!(radio.linked_ssid().as_deref(), Some("home"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_secret_times_out() {
        let radio = SimulatedRadio::new(vec![SimNetwork::secured(
            "home",
            -40,
            SecurityMode::Wpa2Psk,
            "secret1",
        )]);
        let mut station = radio.station();

        let err = connect_with_retry(&mut station, "home", "nope", &ManagerConfig::default())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(radio.linked_ssid(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_settle() {
        let radio = SimulatedRadio::new(vec![SimNetwork::open("cafe", -50)]);
        let store = MemoryCredentialStorage::new();

        let link = manager(&radio, &store)
            .acquire_connection_until(std::future::ready(()))
            .await;

        assert_eq!(link, None);
        assert!(radio.connect_attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_join_polling() {
        let radio = SimulatedRadio::new(vec![SimNetwork::open("cafe", -50).unreachable()]);
        let store = MemoryCredentialStorage::new();

        let link = manager(&radio, &store)
            .acquire_connection_until(sleep(Duration::from_secs(5)))
            .await;

        assert_eq!(link, None);
        assert_eq!(radio.connect_attempts(), vec!["cafe"]);
    }
}
