//! TCP transport.
//!
//! Addresses plus the two transport entry points: [`listen`] for the server
//! and [`connect`] for the client. Both map socket failures onto the error
//! taxonomy (`Bind` and `Transport` respectively).

use crate::error::{Result, RpcError};
use std::fmt;
use std::str::FromStr;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Host and port of a transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Address {
    type Err = RpcError;

    /// Parse `host:port`; IPv6 hosts are written in brackets.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| RpcError::Validation {
            field: "address".to_string(),
            message: format!("'{}': {}", s, message),
        };

        let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("expected host:port"))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        Ok(Self::new(host, port))
    }
}

impl From<std::net::SocketAddr> for Address {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Claim a listening endpoint.
pub async fn listen(address: &Address) -> Result<TcpListener> {
    TcpListener::bind((address.host(), address.port()))
        .await
        .map_err(|e| RpcError::Bind {
            addr: address.to_string(),
            message: e.to_string(),
            source: Some(e),
        })
}

/// Open a connection to `address`.
pub async fn connect(address: &Address) -> Result<TcpStream> {
    let stream = TcpStream::connect((address.host(), address.port()))
        .await
        .map_err(|e| RpcError::transport(format!("Failed to connect to {}", address), e))?;

    // Frames are written whole; don't hold them back.
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", address, e);
    }

    debug!("Connected to {}", address);
    Ok(stream)
}
