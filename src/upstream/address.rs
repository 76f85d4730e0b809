//! Upstream address parsing and dialing.
//!
//! Accepted forms:
//! - `tcp://host:port` (any address family)
//! - `tcp4://host:port`, `tcp6://host:port` (restricted family)
//! - `unix:///path/to/socket`

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tokio::net::TcpStream;
use url::{Host, Url};

use crate::upstream::connector::Transport;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid upstream address {address:?}: {reason}")]
    Invalid { address: String, reason: String },

    #[error("unsupported upstream scheme {0:?} (expected tcp, tcp4, tcp6 or unix)")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    Any,
    V4,
    V6,
}

impl AddrFamily {
    fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            AddrFamily::Any => true,
            AddrFamily::V4 => addr.is_ipv4(),
            AddrFamily::V6 => addr.is_ipv6(),
        }
    }
}

/// Where requests are forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamAddr {
    Tcp {
        host: String,
        port: u16,
        family: AddrFamily,
    },
    Unix(PathBuf),
}

impl UpstreamAddr {
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let invalid = |reason: &str| AddressError::Invalid {
            address: address.to_owned(),
            reason: reason.to_owned(),
        };

        let url = Url::parse(address).map_err(|e| invalid(&e.to_string()))?;

        let family = match url.scheme() {
            "tcp" => AddrFamily::Any,
            "tcp4" => AddrFamily::V4,
            "tcp6" => AddrFamily::V6,
            "unix" => {
                if url.path().is_empty() || url.path() == "/" {
                    return Err(invalid("missing socket path"));
                }
                return Ok(UpstreamAddr::Unix(PathBuf::from(url.path())));
            }
            other => return Err(AddressError::UnsupportedScheme(other.to_owned())),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_owned(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(invalid("missing host")),
        };
        let port = url.port().ok_or_else(|| invalid("missing port"))?;

        if !matches!(url.path(), "" | "/") || url.query().is_some() {
            return Err(invalid("tcp addresses take no path or query"));
        }

        Ok(UpstreamAddr::Tcp { host, port, family })
    }

    /// Authority used when the inbound request carries none.
    pub fn authority(&self) -> String {
        match self {
            UpstreamAddr::Tcp { host, port, .. } if host.contains(':') => format!("[{host}]:{port}"),
            UpstreamAddr::Tcp { host, port, .. } => format!("{host}:{port}"),
            UpstreamAddr::Unix(_) => "localhost".to_owned(),
        }
    }

    /// Open a transport connection to the upstream.
    pub async fn dial(&self) -> io::Result<Transport> {
        match self {
            UpstreamAddr::Tcp { host, port, family } => {
                let mut last_err = None;
                for addr in tokio::net::lookup_host((host.as_str(), *port)).await? {
                    if !family.admits(&addr) {
                        continue;
                    }
                    match TcpStream::connect(addr).await {
                        Ok(stream) => {
                            stream.set_nodelay(true)?;
                            return Ok(Transport::Tcp(stream));
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(last_err.unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        format!("no {family:?} address for {host}:{port}"),
                    )
                }))
            }
            #[cfg(unix)]
            UpstreamAddr::Unix(path) => Ok(Transport::Unix(tokio::net::UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            UpstreamAddr::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            )),
        }
    }
}

impl FromStr for UpstreamAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamAddr::Tcp { family, .. } => {
                let scheme = match family {
                    AddrFamily::Any => "tcp",
                    AddrFamily::V4 => "tcp4",
                    AddrFamily::V6 => "tcp6",
                };
                write!(f, "{scheme}://{}", self.authority())
            }
            UpstreamAddr::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}
