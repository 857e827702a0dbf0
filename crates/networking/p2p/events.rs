use std::net::SocketAddr;

use arclight_core::H512;

use crate::rlpx::{eth::status::StatusMessage, message::Message, p2p::DisconnectReason};

/// Capacity of the broadcast event bus. Slow subscribers observe `Lagged`
/// rather than blocking session tasks.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Everything the networking stack tells the rest of the node. Delivered on
/// a broadcast channel; consumers subscribe and pick the variants they care
/// about, and must not block while doing so.
#[derive(Clone, Debug)]
pub enum NetworkEvent {
    /// A session reached Ready: Hello (and STATUS, where ETH is negotiated)
    /// completed in both directions.
    PeerConnected { node_id: H512 },
    /// A session ended, with the Disconnect reason when one applies.
    PeerDisconnected {
        node_id: H512,
        reason: Option<DisconnectReason>,
    },
    /// The peer's validated STATUS.
    EthStatus {
        node_id: H512,
        status: StatusMessage,
    },
    /// A subprotocol announcement (new blocks, transactions, hashes).
    ProtocolMessage { node_id: H512, message: Message },
    /// The pool accepted a peer.
    PoolPeerAdded { node_id: H512 },
    /// The pool dropped a peer.
    PoolPeerRemoved { node_id: H512 },
    /// The TCP listener is up.
    ServerListening { addr: SocketAddr },
    /// A transport-level error outside any one session.
    ServerError { error: String },
}
