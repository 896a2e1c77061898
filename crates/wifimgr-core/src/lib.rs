//! # wifimgr-core
//!
//! Core data model and collaborator seams for the wifimgr connection manager.
//!
//! This crate provides:
//! - Data model types (ScanResult, SecurityMode, LinkState, IpInfo, Link)
//! - The radio driver facade (`Station`, `AccessPoint`) and the
//!   `LinkConfirmed` proof token
//! - The semicolon-delimited credential store and its backends
//! - Manager configuration with the timing constants of the acquisition flow
//! - A hosted radio simulator for tests and the Linux demo binary
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (tokio) and ESP32 (esp-idf) targets.

pub mod config;
pub mod credentials;
pub mod driver;
pub mod model;
pub mod sim;

pub use config::{AccessPointConfig, ManagerConfig};
pub use credentials::{
    CredentialStorage, Credentials, FileCredentialStorage, MemoryCredentialStorage, StoreError,
};
pub use driver::{AccessPoint, DriverError, LinkConfirmed, Station};
pub use model::*;
