//! Network subsystem: loopback rendezvous and framed transport

pub mod connector;
pub mod controller;
pub mod endpoint;
pub mod link;
pub mod listener;
pub mod outbox;

pub use connector::ClientConnector;
pub use controller::RoleController;
pub use endpoint::{ConnectionEndpoint, EndpointEvents};
pub use link::{EndpointState, Link, LinkFault, Role};
pub use listener::ServerListener;
pub use outbox::Outbox;
