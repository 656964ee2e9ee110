//! Address grammar for socket endpoints.
//!
//! Every endpoint address has the shape `transport://rest`. The inproc
//! transport is serviced in-process; the remaining forms parse and validate
//! here so external transports receive structured addresses instead of raw
//! strings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A parsed endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// In-process transport: `inproc://name`.
    Inproc(String),
    /// TCP transport: `tcp://host:port[;interface]`.
    Tcp {
        host: String,
        port: u16,
        interface: Option<String>,
    },
    /// IPC transport (filesystem socket): `ipc://path`.
    Ipc(PathBuf),
    /// WebSocket transport: `ws://host:port/path`.
    Ws {
        host: String,
        port: u16,
        path: String,
    },
}

impl Address {
    /// Parse an address from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use spaceframe_core::addr::Address;
    ///
    /// let addr = Address::parse("inproc://jobs").unwrap();
    /// assert!(addr.is_inproc());
    ///
    /// let addr = Address::parse("tcp://127.0.0.1:5555").unwrap();
    /// assert!(matches!(addr, Address::Tcp { port: 5555, .. }));
    /// ```
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        s.parse()
    }

    /// True for inproc addresses.
    #[must_use]
    pub const fn is_inproc(&self) -> bool {
        matches!(self, Self::Inproc(_))
    }

    /// The inproc endpoint name, when this is an inproc address.
    #[must_use]
    pub fn inproc_name(&self) -> Option<&str> {
        match self {
            Self::Inproc(name) => Some(name),
            _ => None,
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                return Err(AddressError::EmptyInprocName);
            }
            Ok(Self::Inproc(name.to_string()))
        } else if let Some(rest) = s.strip_prefix("tcp://") {
            let (hostport, interface) = match rest.split_once(';') {
                Some((hp, iface)) if !iface.is_empty() => (hp, Some(iface.to_string())),
                Some(_) => return Err(AddressError::InvalidHostPort(rest.to_string())),
                None => (rest, None),
            };
            let (host, port) = split_host_port(hostport)?;
            Ok(Self::Tcp {
                host,
                port,
                interface,
            })
        } else if let Some(path) = s.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(AddressError::EmptyIpcPath);
            }
            Ok(Self::Ipc(PathBuf::from(path)))
        } else if let Some(rest) = s.strip_prefix("ws://") {
            let (hostport, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], rest[idx..].to_string()),
                None => (rest, "/".to_string()),
            };
            let (host, port) = split_host_port(hostport)?;
            Ok(Self::Ws { host, port, path })
        } else {
            Err(AddressError::UnknownTransport(s.to_string()))
        }
    }
}

/// Split `host:port`, tolerating bracketed IPv6 hosts.
fn split_host_port(s: &str) -> Result<(String, u16), AddressError> {
    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| AddressError::InvalidHostPort(s.to_string()))?;
        let host = &rest[..end];
        let port = rest[end + 1..]
            .strip_prefix(':')
            .ok_or_else(|| AddressError::InvalidHostPort(s.to_string()))?;
        (host, port)
    } else {
        s.rsplit_once(':')
            .ok_or_else(|| AddressError::InvalidHostPort(s.to_string()))?
    };
    if host.is_empty() {
        return Err(AddressError::InvalidHostPort(s.to_string()));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| AddressError::InvalidHostPort(s.to_string()))?;
    Ok((host.to_string(), port))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inproc(name) => write!(f, "inproc://{name}"),
            Self::Tcp {
                host,
                port,
                interface,
            } => {
                let host = if host.contains(':') {
                    format!("[{host}]")
                } else {
                    host.clone()
                };
                match interface {
                    Some(iface) => write!(f, "tcp://{host}:{port};{iface}"),
                    None => write!(f, "tcp://{host}:{port}"),
                }
            }
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Self::Ws { host, port, path } => write!(f, "ws://{host}:{port}{path}"),
        }
    }
}

/// Errors from address parsing.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("unknown transport in address: {0}")]
    UnknownTransport(String),

    #[error("inproc endpoint name cannot be empty")]
    EmptyInprocName,

    #[error("ipc endpoint path cannot be empty")]
    EmptyIpcPath,

    #[error("invalid host:port: {0}")]
    InvalidHostPort(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inproc() {
        let addr = Address::parse("inproc://echo").unwrap();
        assert_eq!(addr.inproc_name(), Some("echo"));
        assert_eq!(addr.to_string(), "inproc://echo");
    }

    #[test]
    fn reject_empty_inproc() {
        assert!(matches!(
            Address::parse("inproc://"),
            Err(AddressError::EmptyInprocName)
        ));
    }

    #[test]
    fn parse_tcp_with_interface() {
        let addr = Address::parse("tcp://10.0.0.1:5555;eth0").unwrap();
        assert_eq!(
            addr,
            Address::Tcp {
                host: "10.0.0.1".into(),
                port: 5555,
                interface: Some("eth0".into()),
            }
        );
        assert_eq!(addr.to_string(), "tcp://10.0.0.1:5555;eth0");
    }

    #[test]
    fn parse_tcp_ipv6() {
        let addr = Address::parse("tcp://[::1]:5555").unwrap();
        assert!(matches!(addr, Address::Tcp { port: 5555, .. }));
        assert_eq!(addr.to_string(), "tcp://[::1]:5555");
    }

    #[test]
    fn parse_ws_default_path() {
        let addr = Address::parse("ws://localhost:8080").unwrap();
        assert_eq!(
            addr,
            Address::Ws {
                host: "localhost".into(),
                port: 8080,
                path: "/".into(),
            }
        );
    }

    #[test]
    fn reject_unknown_scheme() {
        assert!(matches!(
            Address::parse("udp://localhost:1"),
            Err(AddressError::UnknownTransport(_))
        ));
    }

    #[test]
    fn reject_bad_port() {
        assert!(Address::parse("tcp://host:notaport").is_err());
        assert!(Address::parse("tcp://host").is_err());
        assert!(Address::parse("tcp://:5555").is_err());
    }
}
