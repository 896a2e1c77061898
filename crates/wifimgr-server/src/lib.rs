//! # wifimgr-server
//!
//! Connection acquisition for a WiFi station, with a captive provisioning
//! portal as the fallback.
//!
//! [`WifiManager`] walks the acquisition steps: reuse an existing link,
//! join the strongest network it holds a secret for, and otherwise bring up
//! an access point serving [`ProvisioningServer`] until a link exists. All
//! waiting runs on a single tokio task; nothing is spawned.

pub mod manager;
pub mod portal;

pub use manager::{
    connect_with_retry, plan_attempts, AcquireState, Candidate, ConnectError, WifiManager,
};
pub use portal::{PortalError, PortalState, ProvisioningServer};
pub use wifimgr_core::{Link, ManagerConfig};
