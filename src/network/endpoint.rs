//! Full-duplex framed connection with a dedicated transport thread
//!
//! The transport thread owns the socket. It drains the [`Outbox`] and reads
//! inbound bytes in one loop, so `on_connected`, `on_message` and
//! `on_disconnected` are always serialised on that thread.
//!
//! [`Outbox`]: super::outbox::Outbox

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

use super::link::{EndpointState, Link, LinkFault};
use crate::config::BridgeConfig;
use crate::error::{FrameError, NetworkError};
use crate::protocol::FrameDecoder;

const READ_CHUNK: usize = 16 * 1024;
const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Callbacks fired on the transport thread
pub trait EndpointEvents: Send + Sync {
    /// The socket is established and `is_connected` is already true
    fn on_connected(&self, _conn: Uuid) {}

    /// One complete inbound frame
    fn on_message(&self, payload: &[u8]);

    /// The peer closed, an I/O error occurred, or the endpoint was closed
    /// locally. `is_connected` is already false.
    fn on_disconnected(&self, _conn: Uuid) {}
}

/// Why a transport loop ended
#[derive(Debug)]
enum Exit {
    Closed,
    PeerClosed,
    Io(std::io::Error),
    Protocol(FrameError),
}

/// One side of an established connection
pub struct ConnectionEndpoint {
    id: Uuid,
    peer: Option<SocketAddr>,
    shutdown: Arc<AtomicBool>,
    control: TcpStream,
    thread: Option<JoinHandle<()>>,
}

impl ConnectionEndpoint {
    /// Take ownership of `stream` and start its transport thread.
    ///
    /// `after_close` is the state published when the connection ends:
    /// `Listening` for a sender, `Disconnected` for a receiver.
    pub fn spawn(
        stream: TcpStream,
        link: Arc<Link>,
        events: Arc<dyn EndpointEvents>,
        config: &BridgeConfig,
        after_close: EndpointState,
    ) -> Result<Self, NetworkError> {
        let id = Uuid::new_v4();
        let peer = stream.peer_addr().ok();
        let control = stream.try_clone().map_err(|e| NetworkError::ConnectFailed {
            addr: peer.map(|p| p.to_string()).unwrap_or_default(),
            source: e,
        })?;

        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(config.poll_interval())).ok();
        stream.set_write_timeout(Some(WRITE_TIMEOUT)).ok();

        let shutdown = Arc::new(AtomicBool::new(false));
        let transport = Transport {
            id,
            stream,
            link,
            events,
            shutdown: shutdown.clone(),
            decoder: FrameDecoder::new(config.max_frame_bytes),
            after_close,
        };

        let thread = thread::Builder::new()
            .name(format!("ipc-transport-{}", &id.to_string()[..8]))
            .spawn(move || transport.run())
            .map_err(|e| NetworkError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            id,
            peer,
            shutdown,
            control,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether the transport thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Close the socket and join the transport thread. Idempotent; once it
    /// returns no callback fires again.
    pub fn close(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.control.shutdown(Shutdown::Both);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(conn = %self.id, "Transport thread panicked");
            }
        }
    }
}

impl Drop for ConnectionEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

struct Transport {
    id: Uuid,
    stream: TcpStream,
    link: Arc<Link>,
    events: Arc<dyn EndpointEvents>,
    shutdown: Arc<AtomicBool>,
    decoder: FrameDecoder,
    after_close: EndpointState,
}

impl Transport {
    fn run(mut self) {
        let span = tracing::info_span!("transport", conn = %self.id);
        let _enter = span.enter();

        self.link.mark_connected();
        tracing::info!(
            "Connection established with {}",
            self.stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown peer".into())
        );
        self.events.on_connected(self.id);

        let exit = self.pump();

        self.link.mark_disconnected(self.after_close);
        match &exit {
            Exit::Closed => tracing::debug!("Connection closed locally"),
            Exit::PeerClosed => {
                self.link.report_fault(LinkFault::PeerClosed);
                tracing::info!("Peer closed the connection");
            }
            Exit::Io(e) => {
                self.link.report_fault(LinkFault::PeerClosed);
                tracing::warn!("Connection lost: {}", e);
            }
            Exit::Protocol(e) => {
                self.link.report_fault(LinkFault::ProtocolViolation);
                tracing::warn!("Dropping connection after protocol violation: {}", e);
            }
        }
        self.events.on_disconnected(self.id);
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn pump(&mut self) -> Exit {
        let mut scratch = vec![0u8; READ_CHUNK];

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Exit::Closed;
            }

            if let Err(e) = self.flush_outbox() {
                return self.classify(e);
            }

            match self.stream.read(&mut scratch) {
                Ok(0) => {
                    return if self.shutdown.load(Ordering::Acquire) {
                        Exit::Closed
                    } else {
                        Exit::PeerClosed
                    };
                }
                Ok(n) => {
                    self.link
                        .counters()
                        .bytes_received
                        .fetch_add(n as u64, Ordering::Relaxed);
                    self.decoder.extend(&scratch[..n]);
                    loop {
                        match self.decoder.next_frame() {
                            Ok(Some(frame)) => {
                                self.link
                                    .counters()
                                    .frames_received
                                    .fetch_add(1, Ordering::Relaxed);
                                self.events.on_message(&frame);
                            }
                            Ok(None) => break,
                            Err(e) => return Exit::Protocol(e),
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return self.classify(e),
            }
        }
    }

    fn flush_outbox(&mut self) -> std::io::Result<()> {
        let outbox = self.link.outbox();
        while let Some(frame) = outbox.pop_outbound() {
            let result = self.stream.write_all(&frame);
            let len = frame.len();
            outbox.recycle(frame);
            result?;

            let counters = self.link.counters();
            counters.frames_sent.fetch_add(1, Ordering::Relaxed);
            counters.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    fn classify(&self, e: std::io::Error) -> Exit {
        if self.shutdown.load(Ordering::Acquire) {
            Exit::Closed
        } else {
            Exit::Io(e)
        }
    }
}
