//! Captive provisioning portal.
//!
//! While the manager has no link it raises the access point and serves a
//! small HTTP/1.0 site on it:
//! - `/` lists the networks in range in a form
//! - `/configure` takes the chosen network and secret, joins it, and on
//!   success stores the secret and ends the session
//! - anything else is a 404
//!
//! Clients are served one at a time, each on a fresh connection that is
//! closed after a single response. Between clients the station link is
//! checked, so a link that comes up some other way also ends the session.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use wifimgr_core::credentials::merge_credential;
use wifimgr_core::{
    AccessPoint, CredentialStorage, DriverError, Link, LinkConfirmed, ManagerConfig, Station,
};
use wifimgr_protocol::codec::HEADER_TERMINATOR;
use wifimgr_protocol::pages;
use wifimgr_protocol::{
    body_expectation, find_header_end, looks_like_http, parse_request, BodyExpectation, Request,
    RequestError, Response, Route, Submission,
};

use crate::manager::connect_with_retry;

const READ_CHUNK: usize = 512;

/// Errors that keep the portal from serving.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Radio error: {0}")]
    Driver(#[from] DriverError),

    #[error("Socket error: {0}")]
    Io(#[from] io::Error),

    #[error("Portal is not listening")]
    NotListening,
}

/// Lifecycle of a [`ProvisioningServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalState {
    Idle,
    Listening,
    Serving,
    Stopped,
}

enum Accepted {
    Client(TcpStream, SocketAddr),
    Idle,
    Cancelled,
}

enum ClientOutcome {
    Continue,
    Provisioned(Link),
}

/// One provisioning session, borrowing the manager's radio and store.
pub struct ProvisioningServer<'a, S, A, C> {
    station: &'a mut S,
    access_point: &'a mut A,
    credentials: &'a mut C,
    config: &'a ManagerConfig,
    listener: Option<TcpListener>,
    state: PortalState,
}

impl<'a, S, A, C> ProvisioningServer<'a, S, A, C>
where
    S: Station,
    A: AccessPoint,
    C: CredentialStorage,
{
    pub fn new(
        station: &'a mut S,
        access_point: &'a mut A,
        credentials: &'a mut C,
        config: &'a ManagerConfig,
    ) -> Self {
        Self {
            station,
            access_point,
            credentials,
            config,
            listener: None,
            state: PortalState::Idle,
        }
    }

    pub fn state(&self) -> PortalState {
        self.state
    }

    /// Bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Raise the access point and start listening on `port`.
    ///
    /// A listener from an earlier start is closed first.
    pub async fn start(&mut self, port: u16) -> Result<SocketAddr, PortalError> {
        self.stop();

        let ap = &self.config.access_point;
        self.station.set_active(true)?;
        self.access_point.activate(ap)?;

        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::from((self.config.portal_addr, port)))?;
        let listener = socket.listen(self.config.listen_backlog)?;
        let addr = listener.local_addr()?;

        info!(
            "Connect to WiFi ssid {}, default password: {}",
            ap.ssid, ap.password
        );
        info!(
            "and access the device via your favorite web browser at {}",
            ap.gateway
        );
        info!("Provisioning portal listening on {}", addr);

        self.listener = Some(listener);
        self.state = PortalState::Listening;
        Ok(addr)
    }

    /// Close the listener. Safe to call in any state.
    pub fn stop(&mut self) {
        if self.listener.take().is_some() {
            info!("Provisioning portal stopped");
            self.state = PortalState::Stopped;
        }
    }

    /// Serve clients until a link exists or `cancel` completes.
    ///
    /// Returns the link, or `None` when cancelled. The access point is left
    /// as it is on cancellation.
    pub async fn run_until<F>(&mut self, mut cancel: Pin<&mut F>) -> Result<Option<Link>, PortalError>
    where
        F: Future<Output = ()>,
    {
        loop {
            if let Some(confirmed) = LinkConfirmed::observe(&*self.station) {
                info!("Station link is up, closing the portal");
                return Ok(Some(self.finish(confirmed, None)));
            }

            let listener = self.listener.as_ref().ok_or(PortalError::NotListening)?;
            let accepted = tokio::select! {
                _ = cancel.as_mut() => Accepted::Cancelled,
                result = timeout(self.config.link_poll_interval, listener.accept()) => match result {
                    Ok(Ok((stream, peer))) => Accepted::Client(stream, peer),
                    Ok(Err(e)) => {
                        warn!("Failed to accept connection: {}", e);
                        Accepted::Idle
                    }
                    Err(_) => Accepted::Idle,
                },
            };

            match accepted {
                Accepted::Cancelled => {
                    self.stop();
                    return Ok(None);
                }
                Accepted::Idle => {}
                Accepted::Client(stream, peer) => {
                    debug!("Client connected from {}", peer);
                    self.state = PortalState::Serving;
                    let outcome = self.handle_client(stream).await;
                    if let ClientOutcome::Provisioned(link) = outcome {
                        return Ok(Some(link));
                    }
                    self.state = PortalState::Listening;
                }
            }
        }
    }

    /// Drop the access point and the listener once the station is linked.
    fn finish(&mut self, confirmed: LinkConfirmed, ssid: Option<String>) -> Link {
        if let Err(e) = self.access_point.deactivate() {
            warn!("Failed to deactivate access point: {}", e);
        }
        self.stop();
        Link {
            ssid,
            ip_info: confirmed.ip_info(),
        }
    }

    async fn handle_client(&mut self, mut stream: TcpStream) -> ClientOutcome {
        let request = match read_request(&mut stream, self.config).await {
            Ok(request) => request,
            Err(RequestError::Empty) => {
                debug!("Client closed without sending a request");
                return ClientOutcome::Continue;
            }
            Err(e) => {
                warn!("Discarding request: {}", e);
                return ClientOutcome::Continue;
            }
        };
        debug!("{} {}", request.method.as_str(), request.path);

        match request.route() {
            Route::Root => {
                let response = self.selection_form();
                respond(&mut stream, &response).await;
                ClientOutcome::Continue
            }
            Route::Configure => self.configure(stream, &request).await,
            Route::NotFound(path) => {
                respond(&mut stream, &Response::not_found(&path)).await;
                ClientOutcome::Continue
            }
        }
    }

    fn selection_form(&mut self) -> Response {
        let scanned = self
            .station
            .set_active(true)
            .and_then(|()| self.station.scan());
        let networks = scanned.unwrap_or_else(|e| {
            warn!("Scan failed, offering no networks: {}", e);
            Vec::new()
        });

        let ssids = pages::selectable_ssids(networks.iter().map(|n| n.ssid.as_str()));
        let credentials_file = self
            .credentials
            .location()
            .unwrap_or_else(|| self.config.credentials_path.display().to_string());
        Response::ok(pages::selection_form(&ssids, &credentials_file))
    }

    async fn configure(&mut self, mut stream: TcpStream, request: &Request) -> ClientOutcome {
        let submission = match Submission::from_request(request) {
            Ok(submission) => submission,
            Err(e) => {
                info!("Rejected submission: {}", e);
                respond(&mut stream, &Response::bad_request(e.to_string())).await;
                return ClientOutcome::Continue;
            }
        };
        let Submission { ssid, password } = submission;

        let confirmed =
            match connect_with_retry(&mut *self.station, &ssid, &password, self.config).await {
                Ok(confirmed) => confirmed,
                Err(e) => {
                    warn!("Provisioning join failed: {}", e);
                    respond(&mut stream, &Response::ok(pages::connect_failed_page(&ssid))).await;
                    return ClientOutcome::Continue;
                }
            };

        respond(&mut stream, &Response::ok(pages::connected_page(&ssid))).await;
        drop(stream);
        sleep(self.config.flush_delay).await;

        let link = self.finish(confirmed, Some(ssid.clone()));

        match merge_credential(&mut *self.credentials, &ssid, &password) {
            Ok(()) => info!("Stored credentials for {}", ssid),
            Err(e) => error!("Failed to store credentials for {}: {}", ssid, e),
        }

        sleep(self.config.stabilize_delay).await;
        ClientOutcome::Provisioned(link)
    }
}

/// Read one request: the head, then whatever body it announces.
async fn read_request(stream: &mut TcpStream, config: &ManagerConfig) -> Result<Request, RequestError> {
    let limit = config.max_request_bytes;
    let mut buf = Vec::with_capacity(READ_CHUNK);

    while find_header_end(&buf).is_none() {
        match read_chunk(stream, config).await {
            Some(chunk) => buf.extend_from_slice(&chunk),
            None => break,
        }
        if buf.len() > limit {
            return Err(RequestError::TooLarge(limit));
        }
    }

    match body_expectation(&buf) {
        BodyExpectation::None => {}
        BodyExpectation::Exact(length) => {
            let head_len = find_header_end(&buf).map_or(buf.len(), |end| end + HEADER_TERMINATOR.len());
            if head_len.saturating_add(length) > limit {
                return Err(RequestError::TooLarge(limit));
            }
            while buf.len() < head_len + length {
                match read_chunk(stream, config).await {
                    Some(chunk) => buf.extend_from_slice(&chunk),
                    None => break,
                }
            }
        }
        BodyExpectation::Continuation => {
            if let Some(chunk) = read_chunk(stream, config).await {
                debug!("Read {} body bytes after the head", chunk.len());
                buf.extend_from_slice(&chunk);
            }
        }
    }

    if buf.len() > limit {
        return Err(RequestError::TooLarge(limit));
    }
    if buf.is_empty() {
        return Err(RequestError::Empty);
    }
    if !looks_like_http(&buf) {
        return Err(RequestError::NotHttp);
    }
    parse_request(&buf)
}

/// One bounded read. `None` on timeout, end of stream or error.
async fn read_chunk(stream: &mut TcpStream, config: &ManagerConfig) -> Option<Vec<u8>> {
    let mut chunk = [0u8; READ_CHUNK];
    match timeout(config.read_timeout, stream.read(&mut chunk)).await {
        Ok(Ok(0)) => None,
        Ok(Ok(n)) => Some(chunk[..n].to_vec()),
        Ok(Err(e)) => {
            debug!("Read error: {}", e);
            None
        }
        Err(_) => {
            debug!("Read timed out");
            None
        }
    }
}

async fn respond(stream: &mut TcpStream, response: &Response) {
    debug!("Responding {}", response.status.as_u16());
    if let Err(e) = stream.write_all(&response.encode()).await {
        warn!("Failed to send response: {}", e);
        return;
    }
    if let Err(e) = stream.shutdown().await {
        debug!("Failed to shut down connection: {}", e);
    }
}
