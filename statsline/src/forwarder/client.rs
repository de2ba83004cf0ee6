use std::io::{self, Write as _};
use std::net::{Ipv4Addr, TcpStream, UdpSocket};

#[cfg(unix)]
use std::os::unix::net::UnixDatagram;

use tracing::debug;

use super::{ForwarderConfiguration, RemoteAddr};

enum Client {
    Udp(UdpSocket),
    Tcp(TcpStream),

    #[cfg(unix)]
    Unixgram(UnixDatagram),
}

impl Client {
    fn connect(config: &ForwarderConfiguration) -> io::Result<Self> {
        match &config.remote_addr {
            RemoteAddr::Udp(addrs) => {
                UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).and_then(|socket| {
                    socket.connect(&addrs[..])?;
                    socket.set_write_timeout(Some(config.write_timeout))?;
                    Ok(Client::Udp(socket))
                })
            }

            RemoteAddr::Tcp(addrs) => TcpStream::connect(&addrs[..]).and_then(|stream| {
                stream.set_write_timeout(Some(config.write_timeout))?;
                stream.set_nodelay(true)?;
                Ok(Client::Tcp(stream))
            }),

            #[cfg(unix)]
            RemoteAddr::Unixgram(path) => UnixDatagram::unbound().and_then(|socket| {
                socket.connect(path)?;
                socket.set_write_timeout(Some(config.write_timeout))?;
                Ok(Client::Unixgram(socket))
            }),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Client::Udp(socket) => socket.send(buf),

            // a stream has no datagram boundaries, so payloads are
            // newline-terminated for the reading side to split on
            Client::Tcp(stream) => {
                stream.write_all(buf)?;
                stream.write_all(b"\n")?;
                Ok(buf.len())
            }

            #[cfg(unix)]
            Client::Unixgram(socket) => socket.send(buf),
        }
    }
}

enum ConnectionState {
    // Transient marker held only while a transition is in flight.
    Connecting,

    // stop() was called; sends fail until start().
    Stopped,

    // No live socket; the next send attempts to connect.
    Disconnected,

    // Live socket, ready to send.
    Connected(Client),
}

/// Owns the single outbound transport connection.
///
/// A connection is replaced, never repaired: any write failure disposes the
/// socket and leaves the manager disconnected, and the next publish-driven
/// send attempts a fresh connect. Reconnection is therefore paced by actual
/// publish activity instead of a retry loop.
pub(crate) struct ConnectionManager {
    config: ForwarderConfiguration,
    state: ConnectionState,
}

impl ConnectionManager {
    pub fn new(config: ForwarderConfiguration) -> Self {
        ConnectionManager { config, state: ConnectionState::Stopped }
    }

    /// Leaves the stopped state and attempts an initial connection.
    /// Idempotent when already started; a failed first attempt is retried by
    /// the next send.
    pub fn start(&mut self) {
        if matches!(self.state, ConnectionState::Stopped) {
            self.state = ConnectionState::Disconnected;
            match Client::connect(&self.config) {
                Ok(client) => self.state = ConnectionState::Connected(client),
                Err(e) => {
                    debug!(
                        transport = self.config.remote_addr.transport_id(),
                        error = %e,
                        "initial connection attempt failed, will retry on next send"
                    );
                }
            }
        }
    }

    /// Disposes any live socket and refuses sends until [`start`] runs
    /// again. Idempotent.
    ///
    /// [`start`]: ConnectionManager::start
    pub fn stop(&mut self) {
        self.state = ConnectionState::Stopped;
    }

    /// Attempts one write of `payload` on the current connection.
    ///
    /// A failed write disposes the connection before returning; the payload
    /// is the caller's to drop, never queued for retry.
    pub fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Connecting) {
                ConnectionState::Connecting => {
                    unreachable!("transitioned from transient connecting state")
                }
                ConnectionState::Stopped => {
                    self.state = ConnectionState::Stopped;
                    return Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "connection manager is stopped",
                    ));
                }
                ConnectionState::Disconnected => match Client::connect(&self.config) {
                    Ok(client) => self.state = ConnectionState::Connected(client),
                    Err(e) => {
                        self.state = ConnectionState::Disconnected;
                        return Err(e);
                    }
                },
                ConnectionState::Connected(mut client) => {
                    let result = client.send(payload);
                    if result.is_ok() {
                        self.state = ConnectionState::Connected(client);
                    } else {
                        self.state = ConnectionState::Disconnected;
                    }
                    return result;
                }
            }
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;
    use std::net::{TcpListener, UdpSocket};
    use std::time::Duration;

    use super::ConnectionManager;
    use crate::forwarder::{ForwarderConfiguration, RemoteAddr};

    fn config_for(addr: RemoteAddr) -> ForwarderConfiguration {
        ForwarderConfiguration { remote_addr: addr, write_timeout: Duration::from_secs(1) }
    }

    #[test]
    fn udp_send_reaches_the_receiver() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let addr = receiver.local_addr().unwrap();

        let mut manager = ConnectionManager::new(config_for(RemoteAddr::Udp(vec![addr])));
        manager.start();
        assert!(manager.is_connected());

        manager.send(b"a:1|c\nb:2|c").unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"a:1|c\nb:2|c");
    }

    #[test]
    fn stopped_manager_refuses_sends_until_started() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap();

        let mut manager = ConnectionManager::new(config_for(RemoteAddr::Udp(vec![addr])));
        assert!(manager.send(b"a:1|c").is_err());

        manager.start();
        assert!(manager.send(b"a:1|c").is_ok());

        manager.stop();
        assert!(!manager.is_connected());
        assert!(manager.send(b"a:1|c").is_err());

        // stop then start again is fine
        manager.stop();
        manager.start();
        assert!(manager.send(b"a:1|c").is_ok());
    }

    #[test]
    fn tcp_reconnects_once_the_collector_returns() {
        // learn a free port, then shut the listener so connects are refused
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut manager = ConnectionManager::new(config_for(RemoteAddr::Tcp(vec![addr])));
        manager.start();
        assert!(!manager.is_connected());
        assert!(manager.send(b"a:1|c").is_err());

        // collector comes back on the same port; the next send reconnects
        // without any stop()/start() intervention
        let listener = TcpListener::bind(addr).unwrap();
        manager.send(b"a:1|c").unwrap();
        assert!(manager.is_connected());

        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 16];
        let mut read = 0;
        while read < 6 {
            let n = stream.read(&mut buf[read..]).unwrap();
            assert!(n > 0, "stream closed early");
            read += n;
        }
        assert_eq!(&buf[..6], b"a:1|c\n");
    }

    #[test]
    fn tcp_write_failure_disposes_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut manager = ConnectionManager::new(config_for(RemoteAddr::Tcp(vec![addr])));
        manager.start();
        assert!(manager.is_connected());

        // accept and immediately drop the server side, then keep writing
        // until the broken pipe surfaces
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
        drop(listener);

        let mut failed = false;
        for _ in 0..50 {
            if manager.send(b"a:1|c").is_err() {
                failed = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(failed, "write against a closed peer never failed");
        assert!(!manager.is_connected());
    }
}
