//! Receiver-side rendezvous: dial the sender with a bounded timeout

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::endpoint::{ConnectionEndpoint, EndpointEvents};
use super::link::{EndpointState, Link, LinkFault};
use crate::config::BridgeConfig;
use crate::error::NetworkError;

/// Resolve `target` and connect within `timeout`, trying IPv4 addresses
/// first since the sender only binds the IPv4 loopback.
pub fn dial(target: &str, timeout: Duration) -> Result<TcpStream, NetworkError> {
    let mut addrs: Vec<SocketAddr> = target
        .to_socket_addrs()
        .map_err(|source| NetworkError::ConnectFailed {
            addr: target.to_string(),
            source,
        })?
        .collect();
    addrs.sort_by_key(|a| !a.is_ipv4());

    let deadline = Instant::now() + timeout;
    let mut last_err = None;
    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match TcpStream::connect_timeout(&addr, remaining) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    match last_err {
        Some(e) if e.kind() != ErrorKind::TimedOut => Err(NetworkError::ConnectFailed {
            addr: target.to_string(),
            source: e,
        }),
        _ => Err(NetworkError::ConnectTimeout {
            addr: target.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Dials on its own thread and supervises the resulting connection.
///
/// One attempt lasts up to the connect timeout: refused connects are
/// redialled within that window, so a sender that binds a moment later is
/// still reached. Without a retry interval there is no attempt after the
/// window closes or once the peer leaves; the link stays `Disconnected`
/// until the role is toggled again.
pub struct ClientConnector {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ClientConnector {
    pub fn start(
        config: &BridgeConfig,
        link: Arc<Link>,
        events: Arc<dyn EndpointEvents>,
    ) -> Result<Self, NetworkError> {
        let stop = Arc::new(AtomicBool::new(false));
        link.set_state(EndpointState::Connecting);

        let worker = DialLoop {
            link,
            events,
            config: config.clone(),
            stop: stop.clone(),
        };
        let thread = thread::Builder::new()
            .name("ipc-connector".into())
            .spawn(move || worker.run())
            .map_err(|e| NetworkError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Whether the dial thread has given up (or stopped)
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Close any live connection and join. Redials stop at once; a single
    /// connect in flight finishes first.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Connector thread panicked");
            }
        }
    }
}

impl Drop for ClientConnector {
    fn drop(&mut self) {
        self.stop();
    }
}

struct DialLoop {
    link: Arc<Link>,
    events: Arc<dyn EndpointEvents>,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
}

impl DialLoop {
    fn run(self) {
        let target = self.config.dial_target();
        let poll = self.config.poll_interval().max(Duration::from_millis(5));

        while !self.stopped() {
            self.link.set_state(EndpointState::Connecting);
            tracing::info!("Connecting to sender at {}", target);

            let Some(result) = self.dial_within_window(&target, poll) else {
                break;
            };
            match result {
                Ok(stream) => {
                    if self.stopped() {
                        break;
                    }
                    self.link.clear_fault();
                    match ConnectionEndpoint::spawn(
                        stream,
                        self.link.clone(),
                        self.events.clone(),
                        &self.config,
                        EndpointState::Disconnected,
                    ) {
                        Ok(mut ep) => {
                            while !self.stopped() && !ep.is_finished() {
                                thread::sleep(poll);
                            }
                            ep.close();
                        }
                        Err(e) => {
                            tracing::error!("Failed to start transport: {}", e);
                            self.link.set_state(EndpointState::Disconnected);
                        }
                    }
                }
                Err(e) => {
                    let fault = match e {
                        NetworkError::ConnectTimeout { .. } => LinkFault::ConnectTimeout,
                        _ => LinkFault::ConnectFailed,
                    };
                    self.link.set_state(EndpointState::Disconnected);
                    self.link.report_fault(fault);
                    tracing::warn!("{}. Make sure the sender instance is started first", e);
                }
            }

            let Some(interval) = self.config.retry_interval() else {
                break;
            };
            if !self.sleep_unless_stopped(interval, poll) {
                break;
            }
        }
    }

    /// Dial until connected or the connect timeout has elapsed. `None` when
    /// stopped first.
    fn dial_within_window(
        &self,
        target: &str,
        poll: Duration,
    ) -> Option<Result<TcpStream, NetworkError>> {
        let deadline = Instant::now() + self.config.connect_timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match dial(target, remaining.max(Duration::from_millis(1))) {
                Err(NetworkError::ConnectFailed { source, .. })
                    if source.kind() == ErrorKind::ConnectionRefused
                        && Instant::now() + poll < deadline =>
                {
                    tracing::trace!("Sender not listening yet: {}", source);
                    if !self.sleep_unless_stopped(poll, poll) {
                        return None;
                    }
                }
                result => return Some(result),
            }
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn sleep_unless_stopped(&self, total: Duration, step: Duration) -> bool {
        let deadline = Instant::now() + total;
        while Instant::now() < deadline {
            if self.stopped() {
                return false;
            }
            thread::sleep(step.min(deadline.saturating_duration_since(Instant::now())));
        }
        !self.stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_dial_refused_is_connect_failed() {
        // Grab a free port, then release it so nothing listens there
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let err = dial(&format!("127.0.0.1:{}", port), Duration::from_millis(500)).unwrap_err();
        assert!(matches!(err, NetworkError::ConnectFailed { .. }));
    }

    #[test]
    fn test_dial_prefers_ipv4_for_localhost() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = dial(&format!("localhost:{}", port), Duration::from_secs(2)).unwrap();
        assert!(stream.peer_addr().unwrap().is_ipv4());
    }

    #[test]
    fn test_failed_dial_leaves_link_disconnected() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = BridgeConfig {
            host: "127.0.0.1".into(),
            port,
            ..Default::default()
        };
        let link = Arc::new(Link::new(&config));

        let mut connector = ClientConnector::start(&config, link.clone(), Arc::new(Ignore)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(4);
        while !connector.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        connector.stop();

        assert_eq!(link.state(), EndpointState::Disconnected);
        assert_eq!(link.last_fault(), Some(LinkFault::ConnectFailed));
    }

    struct Ignore;
    impl EndpointEvents for Ignore {
        fn on_message(&self, _payload: &[u8]) {}
    }

    fn loopback_config(port: u16) -> BridgeConfig {
        BridgeConfig {
            host: "127.0.0.1".into(),
            port,
            ..Default::default()
        }
    }

    #[test]
    fn test_refused_dial_keeps_trying_within_timeout() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = loopback_config(port);
        assert_eq!(config.retry_interval(), None);
        let link = Arc::new(Link::new(&config));

        let mut connector = ClientConnector::start(&config, link.clone(), Arc::new(Ignore)).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(!connector.is_finished());
        assert_eq!(link.state(), EndpointState::Connecting);

        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        let (_peer, _) = listener.accept().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !link.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(link.is_connected());
        assert_eq!(link.last_fault(), None);
        connector.stop();
    }

    #[test]
    fn test_stop_interrupts_redial() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = loopback_config(port);
        let link = Arc::new(Link::new(&config));

        let mut connector = ClientConnector::start(&config, link, Arc::new(Ignore)).unwrap();
        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        connector.stop();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(connector.is_finished());
    }
}
