//! `Station` and `AccessPoint` over a shared `EspWifi`.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use anyhow::Result;
use embedded_svc::wifi::{
    AccessPointConfiguration, AccessPointInfo, AuthMethod, ClientConfiguration, Configuration,
};
use esp_idf_hal::{modem::Modem, peripheral::Peripheral};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition, sys::EspError, wifi::EspWifi,
};
use log::{debug, info, warn};

use wifimgr_core::{
    AccessPoint, AccessPointConfig, DriverError, IpInfo, LinkState, ScanResult, SecurityMode,
    Station,
};

/// Map the driver's auth method to a security mode.
pub fn security_mode(auth: Option<AuthMethod>) -> SecurityMode {
    match auth {
        Some(AuthMethod::None) => SecurityMode::Open,
        Some(AuthMethod::WEP) => SecurityMode::Wep,
        Some(AuthMethod::WPA) => SecurityMode::WpaPsk,
        Some(AuthMethod::WPA2Personal) => SecurityMode::Wpa2Psk,
        Some(AuthMethod::WPAWPA2Personal) => SecurityMode::WpaWpa2Psk,
        _ => SecurityMode::Unknown,
    }
}

fn auth_method(security: SecurityMode) -> AuthMethod {
    match security {
        SecurityMode::Open => AuthMethod::None,
        SecurityMode::Wep => AuthMethod::WEP,
        SecurityMode::WpaPsk => AuthMethod::WPA,
        SecurityMode::WpaWpa2Psk => AuthMethod::WPAWPA2Personal,
        SecurityMode::Wpa2Psk | SecurityMode::Unknown => AuthMethod::WPA2Personal,
    }
}

fn radio_error(e: EspError) -> DriverError {
    DriverError::Radio(e.to_string())
}

fn scan_result(info: AccessPointInfo) -> ScanResult {
    ScanResult {
        ssid: info.ssid.as_str().to_string(),
        rssi: i16::from(info.signal_strength),
        security: security_mode(info.auth_method),
        channel: info.channel,
    }
}

struct Radio {
    wifi: EspWifi<'static>,
    client: Option<ClientConfiguration>,
    access_point: Option<AccessPointConfiguration>,
}

impl Radio {
    /// Push the active interfaces to the driver, starting or stopping it.
    fn apply(&mut self) -> Result<(), EspError> {
        let configuration = match (&self.client, &self.access_point) {
            (Some(client), Some(ap)) => Configuration::Mixed(client.clone(), ap.clone()),
            (Some(client), None) => Configuration::Client(client.clone()),
            (None, Some(ap)) => Configuration::AccessPoint(ap.clone()),
            (None, None) => {
                if self.wifi.is_started()? {
                    self.wifi.stop()?;
                }
                return Ok(());
            }
        };

        self.wifi.set_configuration(&configuration)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }
}

/// Take the modem and return station and access point handles onto it.
pub fn take_radio(
    modem: impl Peripheral<P = Modem> + 'static,
    sysloop: EspSystemEventLoop,
    nvs: Option<EspDefaultNvsPartition>,
) -> Result<(EspStation, EspAccessPoint)> {
    let wifi = EspWifi::new(modem, sysloop, nvs)?;
    let radio = Rc::new(RefCell::new(Radio {
        wifi,
        client: None,
        access_point: None,
    }));

    Ok((
        EspStation {
            radio: radio.clone(),
        },
        EspAccessPoint { radio },
    ))
}

/// Station interface of the ESP32 radio.
pub struct EspStation {
    radio: Rc<RefCell<Radio>>,
}

impl Station for EspStation {
    fn set_active(&mut self, active: bool) -> Result<(), DriverError> {
        let mut radio = self.radio.borrow_mut();
        if radio.client.is_some() == active {
            return Ok(());
        }
        radio.client = active.then(ClientConfiguration::default);
        radio.apply().map_err(radio_error)
    }

    fn scan(&mut self) -> Result<Vec<ScanResult>, DriverError> {
        let mut radio = self.radio.borrow_mut();
        if radio.client.is_none() {
            return Err(DriverError::Scan("station interface is down".to_string()));
        }

        info!("Scanning for WiFi networks...");
        let found = radio
            .wifi
            .scan()
            .map_err(|e| DriverError::Scan(e.to_string()))?;
        debug!("Scan found {} networks", found.len());
        Ok(found.into_iter().map(scan_result).collect())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        let mut radio = self.radio.borrow_mut();

        let client = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| DriverError::Connect(format!("SSID too long: {}", ssid)))?,
            password: password
                .try_into()
                .map_err(|_| DriverError::Connect("password too long".to_string()))?,
            auth_method: auth_method(SecurityMode::join_threshold(password)),
            ..Default::default()
        };

        if radio.wifi.is_connected().unwrap_or(false) {
            if let Err(e) = radio.wifi.disconnect() {
                warn!("Disconnect before join failed: {}", e);
            }
        }
        radio.client = Some(client);
        radio.apply().map_err(radio_error)?;
        radio
            .wifi
            .connect()
            .map_err(|e| DriverError::Connect(e.to_string()))
    }

    fn link_state(&self) -> LinkState {
        let radio = self.radio.borrow();
        match (radio.wifi.is_connected(), radio.wifi.is_up()) {
            (Ok(true), Ok(true)) => LinkState::Connected,
            (Ok(true), _) => LinkState::Connecting,
            _ => LinkState::Disconnected,
        }
    }

    fn ip_info(&self) -> Option<IpInfo> {
        let radio = self.radio.borrow();
        let info = radio.wifi.sta_netif().get_ip_info().ok()?;
        let address = Ipv4Addr::from(info.ip.octets());
        if address.is_unspecified() {
            return None;
        }
        Some(IpInfo {
            address,
            gateway: Ipv4Addr::from(info.subnet.gateway.octets()),
            prefix_len: info.subnet.mask.0,
        })
    }
}

/// Access point interface of the ESP32 radio.
///
/// The soft-AP keeps the netif's own address (192.168.4.1 by default);
/// `AccessPointConfig::gateway` is only announced in the logs.
pub struct EspAccessPoint {
    radio: Rc<RefCell<Radio>>,
}

impl AccessPoint for EspAccessPoint {
    fn activate(&mut self, config: &AccessPointConfig) -> Result<(), DriverError> {
        let mut radio = self.radio.borrow_mut();

        let ap = AccessPointConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| DriverError::Radio(format!("AP SSID too long: {}", config.ssid)))?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| DriverError::Radio("AP password too long".to_string()))?,
            auth_method: auth_method(config.security),
            ..Default::default()
        };

        radio.access_point = Some(ap);
        radio.apply().map_err(radio_error)?;
        info!("Access point {} is up", config.ssid);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), DriverError> {
        let mut radio = self.radio.borrow_mut();
        if radio.access_point.take().is_none() {
            return Ok(());
        }
        radio.apply().map_err(radio_error)?;
        info!("Access point is down");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.radio.borrow().access_point.is_some()
    }
}
