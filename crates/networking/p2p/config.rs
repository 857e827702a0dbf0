use std::net::SocketAddr;
use std::time::Duration;

use k256::SecretKey;

use crate::rlpx::capabilities::{supported_capabilities, Capability};
use crate::types::Node;

/// Everything the networking stack is configured with. Defaults follow
/// mainline client practice; every field can be overridden before
/// [`crate::start_network`] is called.
#[derive(Clone)]
pub struct NetworkConfig {
    /// The node identity. The 64-byte node id is derived from it once at
    /// startup.
    pub private_key: SecretKey,
    /// TCP bind address for inbound RLPx connections.
    pub listen_addr: SocketAddr,
    /// Cap on concurrent sessions, inbound plus outbound.
    pub max_peers: usize,
    /// Cap on concurrent outbound dial attempts.
    pub max_active_dials: usize,
    /// Per-phase deadline for ECIES, Hello and STATUS exchanges.
    pub handshake_timeout: Duration,
    /// Deadline for correlated subprotocol requests.
    pub request_timeout: Duration,
    /// How often each session pings its peer.
    pub keepalive_ping_interval: Duration,
    /// How long an unanswered ping is tolerated before the session aborts.
    pub keepalive_pong_timeout: Duration,
    /// Offer Snappy compression; actual use still requires the peer to
    /// advertise p2p/5.
    pub use_snappy_compression: bool,
    /// The capabilities advertised in Hello, in order.
    pub capabilities: Vec<Capability>,
    /// Nodes dialed at startup with exponential backoff.
    pub bootstrap_nodes: Vec<Node>,
    /// Short client identifier sent in Hello.
    pub client_id: String,
    /// How long refused or misbehaving peers stay banned.
    pub peer_ban_duration: Duration,
}

impl NetworkConfig {
    pub fn new(private_key: SecretKey) -> Self {
        Self {
            private_key,
            listen_addr: "0.0.0.0:30303".parse().expect("valid bind address"),
            max_peers: 25,
            max_active_dials: 10,
            handshake_timeout: Duration::from_millis(8000),
            request_timeout: Duration::from_millis(8000),
            keepalive_ping_interval: Duration::from_millis(15000),
            keepalive_pong_timeout: Duration::from_millis(20000),
            use_snappy_compression: true,
            capabilities: supported_capabilities(),
            bootstrap_nodes: vec![],
            client_id: format!("arclight/v{}", env!("CARGO_PKG_VERSION")),
            peer_ban_duration: Duration::from_secs(60),
        }
    }
}
