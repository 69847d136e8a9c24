//! Role selection and endpoint lifecycle

use std::sync::Arc;

use super::connector::ClientConnector;
use super::endpoint::EndpointEvents;
use super::link::{EndpointState, Link, LinkFault, Role};
use super::listener::ServerListener;
use crate::config::BridgeConfig;
use crate::error::NetworkError;

enum Active {
    Server(ServerListener),
    Client(ClientConnector),
    /// The role is selected but its endpoint could not be started
    Idle,
}

/// Turns the Send/Receive switch into a running listener or connector.
///
/// All methods run on the host side; the audio thread only observes the
/// shared [`Link`].
pub struct RoleController {
    config: BridgeConfig,
    link: Arc<Link>,
    events: Arc<dyn EndpointEvents>,
    role: Option<Role>,
    active: Option<Active>,
}

impl RoleController {
    pub fn new(config: BridgeConfig, link: Arc<Link>, events: Arc<dyn EndpointEvents>) -> Self {
        Self {
            config,
            link,
            events,
            role: None,
            active: None,
        }
    }

    /// Start in `role`. If something is already running this behaves like
    /// [`on_role_change`](Self::on_role_change).
    pub fn start(&mut self, role: Role) {
        if self.active.is_some() {
            self.on_role_change(role);
            return;
        }

        tracing::info!("Initializing as {}", role);
        self.role = Some(role);
        self.link.clear_fault();
        self.link.set_role(Some(role));
        self.link.set_state(EndpointState::Disconnected);

        let started = match role {
            Role::Sender => {
                ServerListener::start(&self.config, self.link.clone(), self.events.clone())
                    .map(Active::Server)
            }
            Role::Receiver => {
                ClientConnector::start(&self.config, self.link.clone(), self.events.clone())
                    .map(Active::Client)
            }
        };

        self.active = Some(match started {
            Ok(active) => active,
            Err(e) => {
                if matches!(e, NetworkError::BindFailed { .. }) {
                    self.link.report_fault(LinkFault::BindFailed);
                }
                tracing::warn!("Failed to start {}: {}", role, e);
                self.link.set_state(EndpointState::Disconnected);
                Active::Idle
            }
        });
    }

    /// Tear down the current endpoint and start again in `role`.
    ///
    /// Asking for the role that is already running is a no-op unless its
    /// endpoint is `Disconnected`, in which case it is restarted; that is
    /// how a receiver reconnects.
    pub fn on_role_change(&mut self, role: Role) {
        let unchanged = self.role == Some(role)
            && self.active.is_some()
            && self.link.state() != EndpointState::Disconnected;
        if unchanged {
            tracing::debug!("Role already {}, nothing to do", role);
            return;
        }

        tracing::info!(
            "Role change {} -> {}",
            self.role.map(|r| r.to_string()).unwrap_or_else(|| "none".into()),
            role
        );
        self.teardown();
        self.start(role);
    }

    /// Close every socket and join every thread. Idempotent.
    pub fn stop(&mut self) {
        if self.active.is_none() && self.link.state() == EndpointState::Closed {
            return;
        }
        self.teardown();
        self.role = None;
        self.link.set_role(None);
        self.link.set_state(EndpointState::Closed);
        tracing::info!("Bridge endpoint closed");
    }

    fn teardown(&mut self) {
        match self.active.take() {
            Some(Active::Server(mut listener)) => listener.stop(),
            Some(Active::Client(mut connector)) => connector.stop(),
            Some(Active::Idle) | None => {}
        }
        self.link.outbox().discard_pending();
        self.link.set_state(EndpointState::Disconnected);
    }

    /// Role currently selected, if started
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn state(&self) -> EndpointState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Drop for RoleController {
    fn drop(&mut self) {
        self.stop();
    }
}
