use std::sync::Arc;

use arclight_core::H512;
use k256::SecretKey;
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
};
use tracing::{debug, info};

pub mod backends;
pub mod config;
pub(crate) mod discovery;
pub mod events;
pub mod peer_channels;
pub mod pool;
pub mod rlpx;
pub mod snap;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use backends::{Backends, Chain, ReceiptStore, Synchronizer, TxPool};
pub use config::NetworkConfig;
pub use events::{NetworkEvent, EVENT_BUS_CAPACITY};
pub use peer_channels::PeerHandle;
pub use pool::PoolHandle;
pub use rlpx::error::RLPxError;
pub use types::Node;

use pool::{pool_channel, run_peer, PeerKind, PeerPool};
use rlpx::utils::pubkey2id;

/// Everything a connection or pool task needs to do its job.
#[derive(Clone)]
pub struct P2PContext {
    pub config: Arc<NetworkConfig>,
    pub backends: Backends,
    pub events: broadcast::Sender<NetworkEvent>,
    pub pool: PoolHandle,
    pub signer: SecretKey,
    pub local_node_id: H512,
}

/// Handle onto a running networking stack.
pub struct Network {
    events: broadcast::Sender<NetworkEvent>,
    pool: PoolHandle,
    local_node_id: H512,
    listen_addr: std::net::SocketAddr,
}

impl Network {
    /// A fresh subscription to the event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    pub fn local_node_id(&self) -> H512 {
        self.local_node_id
    }

    /// The address the listener actually bound, port included.
    pub fn listen_addr(&self) -> std::net::SocketAddr {
        self.listen_addr
    }

    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    pub async fn peer(&self, node_id: H512) -> Option<PeerHandle> {
        self.pool.peer(node_id).await
    }

    pub async fn dial(&self, node: Node) {
        self.pool.dial(node).await
    }

    pub async fn peer_count(&self) -> usize {
        self.pool.peer_count().await
    }

    pub async fn peers(&self) -> Vec<PeerHandle> {
        self.pool.peers().await
    }

    /// Announces pooled transactions by hash to every connected peer. Each
    /// session encodes the announce in its own negotiated format (flat list
    /// before eth/68, typed tuple from eth/68 on); peers with a full queue
    /// are skipped.
    pub async fn announce_pooled_transactions(
        &self,
        transactions: &[arclight_core::types::Transaction],
    ) {
        let announce =
            rlpx::eth::transactions::NewPooledTransactionHashes::new(transactions);
        for peer in self.pool.peers().await {
            let _ = peer.send_message(rlpx::message::Message::NewPooledTransactionHashes(
                announce.clone(),
            ));
        }
    }

    /// Announces a new canonical block hash to every connected peer.
    pub async fn announce_block_hash(
        &self,
        hash: arclight_core::types::BlockHash,
        number: arclight_core::types::BlockNumber,
    ) {
        let announce = rlpx::eth::blocks::NewBlockHashes::new(vec![
            rlpx::eth::blocks::BlockHashAndNumber { hash, number },
        ]);
        for peer in self.pool.peers().await {
            let _ = peer.send_message(rlpx::message::Message::NewBlockHashes(announce.clone()));
        }
    }
}

/// Boots the stack: pool task, TCP listener, discovery adapter and
/// bootstrap dialers. `discovered_peers` is the event stream of the
/// external discovery module.
pub async fn start_network(
    config: NetworkConfig,
    backends: Backends,
    discovered_peers: mpsc::Receiver<Node>,
) -> Result<Network, RLPxError> {
    let signer = config.private_key.clone();
    let local_node_id = pubkey2id(&signer.public_key());
    let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
    let (pool, pool_commands) = pool_channel();

    let config = Arc::new(config);
    let context = P2PContext {
        config: config.clone(),
        backends,
        events: events.clone(),
        pool: pool.clone(),
        signer,
        local_node_id,
    };

    tokio::spawn(PeerPool::new(context.clone(), pool_commands).run());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| RLPxError::ConnectionError(format!("could not bind listener: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| RLPxError::ConnectionError(e.to_string()))?;
    info!(%local_addr, node_id = %local_node_id, "listening for RLPx connections");
    let _ = events.send(NetworkEvent::ServerListening { addr: local_addr });
    tokio::spawn(listen_loop(context.clone(), listener));

    tokio::spawn(discovery::discovery_adapter(
        context.clone(),
        discovered_peers,
    ));
    for node in config.bootstrap_nodes.iter().copied() {
        debug!(peer = %node, "seeding bootstrap node");
        tokio::spawn(discovery::bootstrap_node(context.clone(), node));
    }

    Ok(Network {
        events,
        pool,
        local_node_id,
        listen_addr: local_addr,
    })
}

/// Accepts inbound sockets, refusing them outright while the pool is full.
async fn listen_loop(context: P2PContext, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                if !context.pool.try_accept_inbound().await {
                    debug!(%peer_addr, "refusing inbound connection: pool at capacity");
                    continue;
                }
                debug!(%peer_addr, "accepted inbound connection");
                tokio::spawn(run_peer(context.clone(), stream, PeerKind::Inbound, None));
            }
            Err(error) => {
                let _ = context.events.send(NetworkEvent::ServerError {
                    error: error.to_string(),
                });
            }
        }
    }
}
