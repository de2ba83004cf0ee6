use std::net::{SocketAddr, ToSocketAddrs as _};
use std::time::Duration;

#[cfg(unix)]
use std::path::PathBuf;

mod client;
pub(crate) use client::ConnectionManager;

/// The resolved remote address a pipeline forwards payloads to.
#[derive(Clone, Debug)]
pub(crate) enum RemoteAddr {
    Udp(Vec<SocketAddr>),
    Tcp(Vec<SocketAddr>),

    #[cfg(unix)]
    Unixgram(PathBuf),
}

impl RemoteAddr {
    /// A short acronym for the transport behind this remote address.
    pub const fn transport_id(&self) -> &'static str {
        match self {
            RemoteAddr::Udp(_) => "udp",
            RemoteAddr::Tcp(_) => "tcp",
            #[cfg(unix)]
            RemoteAddr::Unixgram(_) => "uds",
        }
    }
}

impl<'a> TryFrom<&'a str> for RemoteAddr {
    type Error = String;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        if let Some((scheme, rest)) = addr.split_once("://") {
            return match scheme {
                "udp" => resolve(rest).map(RemoteAddr::Udp),
                "tcp" => resolve(rest).map(RemoteAddr::Tcp),
                #[cfg(unix)]
                "unix" | "unixgram" => Ok(RemoteAddr::Unixgram(PathBuf::from(rest))),
                _ => Err(format!(
                    "invalid scheme '{scheme}' (expected 'udp', 'tcp', or 'unix')"
                )),
            };
        }

        // a bare host:port means UDP, the traditional statsd default
        resolve(addr).map(RemoteAddr::Udp)
    }
}

fn resolve(addr: &str) -> Result<Vec<SocketAddr>, String> {
    match addr.to_socket_addrs() {
        Ok(addrs) => {
            let addrs: Vec<_> = addrs.collect();
            if addrs.is_empty() {
                Err(format!("'{addr}' did not resolve to any address"))
            } else {
                Ok(addrs)
            }
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Forwarder configuration.
#[derive(Clone)]
pub(crate) struct ForwarderConfiguration {
    pub remote_addr: RemoteAddr,
    pub write_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::RemoteAddr;

    #[test]
    fn bare_address_is_udp() {
        let addr = RemoteAddr::try_from("127.0.0.1:8125").unwrap();
        assert!(matches!(addr, RemoteAddr::Udp(_)));
        assert_eq!(addr.transport_id(), "udp");
    }

    #[test]
    fn schemes_select_the_transport() {
        assert!(matches!(RemoteAddr::try_from("udp://127.0.0.1:8125").unwrap(), RemoteAddr::Udp(_)));
        assert!(matches!(RemoteAddr::try_from("tcp://127.0.0.1:8125").unwrap(), RemoteAddr::Tcp(_)));
    }

    #[cfg(unix)]
    #[test]
    fn unix_scheme_keeps_the_path() {
        let addr = RemoteAddr::try_from("unix:///var/run/statsd.sock").unwrap();
        match addr {
            RemoteAddr::Unixgram(path) => {
                assert_eq!(path, std::path::PathBuf::from("/var/run/statsd.sock"));
            }
            other => panic!("expected a unix datagram address, got {other:?}"),
        }
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let err = RemoteAddr::try_from("quic://127.0.0.1:8125").unwrap_err();
        assert!(err.contains("invalid scheme"));
    }

    #[test]
    fn unparseable_address_is_rejected() {
        assert!(RemoteAddr::try_from("not an address").is_err());
    }
}
