//! breakwater-core: the reactor, connection lifecycle, HTTP/1.x + HTTP/2 +
//! WebSocket + SOCKS5 state machines, forwarding proxy, and cluster
//! supervisor.
//!
//! Data flow on the server path: OS socket -> [`net`] -> [`broker`]/[`payload`]
//! -> [`endpoint`] -> [`http1`]/[`http2`]/[`ws`]/[`socks5`] -> application
//! callback ([`endpoint::callbacks`]) -> back down the same stack. The
//! forwarding proxy ([`proxy`]) sits in the callback stage, bridging a
//! server broker to a client broker instead of handing bytes to
//! application code.

pub mod broker;
pub mod cluster;
pub mod dns;
pub mod endpoint;
pub mod http1;
pub mod http2;
pub mod keepalive;
pub mod net;
pub mod node;
pub mod ntp;
pub mod payload;
pub mod proxy;
pub mod reactor;
pub mod scheme;
pub mod socks5;
pub mod ws;

pub use broker::{Broker, BrokerId};
pub use node::Node;
pub use payload::{Payload, PayloadQueue};
pub use reactor::Reactor;
pub use scheme::{Scheme, SchemeId};
