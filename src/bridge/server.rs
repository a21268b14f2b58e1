//! WebSocket server the in-page bridge connects to.
//!
//! # Connection Flow
//!
//! 1. Rust binds a WebSocket server to `127.0.0.1:0` (random port)
//! 2. The bridge script, generated with the server's URL, is injected into
//!    the host page
//! 3. The script connects and sends a READY message
//! 4. Connection established, ready for commands and response events

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::network::Interceptor;

use super::assets;
use super::connection::{Connection, EventHandler, ReadyData};
use super::page::BridgePage;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for waiting for the page to connect.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// BridgeServer
// ============================================================================

/// A WebSocket server that is bound but not yet connected.
///
/// # Example
///
/// ```ignore
/// use std::net::{IpAddr, Ipv4Addr};
/// use scroll_harvest::bridge::BridgeServer;
///
/// let server = BridgeServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// println!("{}", server.script());
///
/// // Paste the script into the page's console...
///
/// let page = server.attach(interceptor).await?;
/// ```
#[derive(Debug)]
pub struct BridgeServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Address the server is bound to.
    addr: SocketAddr,
    /// How long to wait for the page.
    connect_timeout: Duration,
}

impl BridgeServer {
    /// Binds a WebSocket server to the specified address and port.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let addr = listener.local_addr()?;

        debug!(%addr, "Bridge server bound");

        Ok(Self {
            listener,
            addr,
            connect_timeout: CONNECTION_TIMEOUT,
        })
    }

    /// Binds to `127.0.0.1` on a random port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_local() -> Result<Self> {
        Self::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await
    }

    /// Sets how long [`accept`](Self::accept) waits for the page.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the WebSocket URL for this server.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Returns the bridge script pointed at this server.
    #[must_use]
    pub fn script(&self) -> String {
        assets::bridge_script(&self.ws_url())
    }

    /// Accepts the page's connection and completes the handshake.
    ///
    /// Events are discarded; use [`attach`](Self::attach) to collect.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the page doesn't connect in time
    /// - [`Error::Connection`] if the WebSocket upgrade fails
    /// - [`Error::ConnectionTimeout`] if READY doesn't arrive in time
    pub async fn accept(self) -> Result<(Connection, ReadyData)> {
        self.accept_with(None).await
    }

    /// Accepts the page's connection and routes its response events into
    /// `interceptor`.
    ///
    /// # Errors
    ///
    /// Same as [`accept`](Self::accept).
    pub async fn attach(self, interceptor: Interceptor) -> Result<BridgePage> {
        let handler = BridgePage::event_handler(interceptor.clone());
        let (connection, ready) = self.accept_with(Some(handler)).await?;

        Ok(BridgePage::new(connection, ready, interceptor))
    }

    async fn accept_with(self, handler: Option<EventHandler>) -> Result<(Connection, ReadyData)> {
        let (stream, peer) = timeout(self.connect_timeout, self.listener.accept())
            .await
            .map_err(|_| Error::connection_timeout(self.connect_timeout.as_millis() as u64))??;

        debug!(%peer, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        info!(port = self.addr.port(), "Bridge connection established");

        let connection = Connection::new(ws_stream, handler);
        let ready = connection.wait_ready().await?;

        info!(url = %ready.url, "Bridge ready");

        Ok((connection, ready))
    }
}

// ============================================================================
// Tests
// ============================================================================
