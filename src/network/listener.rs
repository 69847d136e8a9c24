//! Sender-side rendezvous: bind the well-known port and serve one peer

use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::endpoint::{ConnectionEndpoint, EndpointEvents};
use super::link::{EndpointState, Link, LinkFault};
use crate::config::BridgeConfig;
use crate::error::NetworkError;

/// Bind a non-blocking loopback listener on `port`.
///
/// `SO_REUSEADDR` is only set on Unix, where it lets the port be re-bound
/// while old connections sit in TIME_WAIT but still refuses a second live
/// listener. On Windows the same flag would allow port stealing.
pub fn bind_loopback(port: u16) -> Result<TcpListener, NetworkError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let bind = || -> std::io::Result<TcpListener> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        #[cfg(unix)]
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    };
    bind().map_err(|source| NetworkError::BindFailed { addr, source })
}

/// Accepts exactly one peer at a time on its own thread
pub struct ServerListener {
    local_addr: Option<SocketAddr>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerListener {
    /// Bind the configured port and start accepting.
    ///
    /// A busy port is returned as `BindFailed` unless retrying is enabled,
    /// in which case the accept thread keeps trying to bind in the
    /// background.
    pub fn start(
        config: &BridgeConfig,
        link: Arc<Link>,
        events: Arc<dyn EndpointEvents>,
    ) -> Result<Self, NetworkError> {
        let first = bind_loopback(config.port);
        let listener = match (first, config.retry_interval()) {
            (Ok(listener), _) => Some(listener),
            (Err(e), None) => return Err(e),
            (Err(e), Some(interval)) => {
                tracing::warn!("{}; retrying every {:?}", e, interval);
                link.report_fault(LinkFault::BindFailed);
                link.set_state(EndpointState::Disconnected);
                None
            }
        };

        let local_addr = listener.as_ref().and_then(|l| l.local_addr().ok());
        if let Some(addr) = local_addr {
            link.set_local_port(Some(addr.port()));
            link.set_state(EndpointState::Listening);
            tracing::info!("Waiting for a receiver on {}", addr);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let worker = AcceptLoop {
            listener,
            port: config.port,
            link,
            events,
            config: config.clone(),
            stop: stop.clone(),
            current: None,
        };
        let thread = thread::Builder::new()
            .name("ipc-listener".into())
            .spawn(move || worker.run())
            .map_err(|e| NetworkError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            local_addr,
            stop,
            thread: Some(thread),
        })
    }

    /// Address bound by the first attempt, if it succeeded
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Close the listener and any live connection, then join
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Listener thread panicked");
            }
        }
    }
}

impl Drop for ServerListener {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AcceptLoop {
    listener: Option<TcpListener>,
    port: u16,
    link: Arc<Link>,
    events: Arc<dyn EndpointEvents>,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
    current: Option<ConnectionEndpoint>,
}

impl AcceptLoop {
    fn run(mut self) {
        let poll = self.config.poll_interval().max(Duration::from_millis(5));
        let mut next_bind = Instant::now();

        while !self.stop.load(Ordering::Acquire) {
            let Some(listener) = self.listener.as_ref() else {
                if Instant::now() >= next_bind {
                    self.try_rebind();
                    next_bind = Instant::now() + self.config.retry_interval().unwrap_or(poll);
                }
                thread::sleep(poll);
                continue;
            };

            if self.current.as_ref().is_some_and(|ep| ep.is_finished()) {
                if let Some(mut ended) = self.current.take() {
                    ended.close();
                }
                tracing::info!("Receiver left, accepting again");
            }

            match listener.accept() {
                Ok((stream, peer)) => {
                    if self.current.is_some() {
                        tracing::warn!("Rejecting {}: a receiver is already connected", peer);
                        drop(stream);
                        continue;
                    }
                    if let Err(e) = stream.set_nonblocking(false) {
                        tracing::warn!("Rejecting {}: {}", peer, e);
                        continue;
                    }
                    tracing::info!("Accepted receiver {}", peer);
                    match ConnectionEndpoint::spawn(
                        stream,
                        self.link.clone(),
                        self.events.clone(),
                        &self.config,
                        EndpointState::Listening,
                    ) {
                        Ok(ep) => {
                            self.link.clear_fault();
                            self.current = Some(ep);
                        }
                        Err(e) => tracing::error!("Failed to start transport: {}", e),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(poll),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(poll);
                }
            }
        }

        if let Some(mut ep) = self.current.take() {
            ep.close();
        }
        self.link.set_local_port(None);
    }

    fn try_rebind(&mut self) {
        match bind_loopback(self.port) {
            Ok(listener) => {
                if let Ok(addr) = listener.local_addr() {
                    self.link.set_local_port(Some(addr.port()));
                    tracing::info!("Bound {} after retry, waiting for a receiver", addr);
                }
                self.link.clear_fault();
                self.link.set_state(EndpointState::Listening);
                self.listener = Some(listener);
            }
            Err(e) => tracing::debug!("Still cannot bind: {}", e),
        }
    }
}
