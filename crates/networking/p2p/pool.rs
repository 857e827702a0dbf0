use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;

use arclight_core::H512;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    time::{self, Instant},
};
use tracing::{debug, info};

use crate::peer_channels::PeerHandle;
use crate::rlpx::{
    connection::{RLPxConnection, SESSION_COMMAND_BUFFER},
    error::RLPxError,
    p2p::DisconnectReason,
};
use crate::types::Node;
use crate::{NetworkEvent, P2PContext};

const POOL_COMMAND_BUFFER: usize = 256;

/// Why the pool turned a session away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegisterError {
    /// `max_peers` reached; the peer is told `TooManyPeers`.
    AtCapacity,
    /// A session for this node id is already live; the newcomer is closed
    /// without a Disconnect.
    Duplicate,
    /// The node id is on the ban list.
    Banned,
}

pub(crate) enum PoolCommand {
    Dial(Node),
    DialFinished(SocketAddr),
    Register {
        node_id: H512,
        handle: PeerHandle,
        reply: oneshot::Sender<Result<(), RegisterError>>,
    },
    Unregister {
        node_id: H512,
    },
    Ban(H512),
    TryAcceptInbound {
        reply: oneshot::Sender<bool>,
    },
    IsConnected {
        node_id: H512,
        reply: oneshot::Sender<bool>,
    },
    GetPeer {
        node_id: H512,
        reply: oneshot::Sender<Option<PeerHandle>>,
    },
    Peers {
        reply: oneshot::Sender<Vec<PeerHandle>>,
    },
    PeerCount {
        reply: oneshot::Sender<usize>,
    },
}

/// The write side of the pool task. All peer-map and ban-list mutation
/// happens on the pool task; everyone else posts commands through this.
#[derive(Clone, Debug)]
pub struct PoolHandle {
    sender: mpsc::Sender<PoolCommand>,
}

pub(crate) fn pool_channel() -> (PoolHandle, mpsc::Receiver<PoolCommand>) {
    let (sender, receiver) = mpsc::channel(POOL_COMMAND_BUFFER);
    (PoolHandle { sender }, receiver)
}

impl PoolHandle {
    /// Asks the pool to dial a node. Banned, connected and in-flight
    /// targets are dropped silently.
    pub async fn dial(&self, node: Node) {
        let _ = self.sender.send(PoolCommand::Dial(node)).await;
    }

    pub async fn is_connected(&self, node_id: H512) -> bool {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(PoolCommand::IsConnected { node_id, reply })
            .await
            .is_err()
        {
            return false;
        }
        response.await.unwrap_or(false)
    }

    pub async fn peer(&self, node_id: H512) -> Option<PeerHandle> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(PoolCommand::GetPeer { node_id, reply })
            .await
            .ok()?;
        response.await.ok().flatten()
    }

    /// Handles of every live session, for broadcast-style sends.
    pub async fn peers(&self) -> Vec<PeerHandle> {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(PoolCommand::Peers { reply })
            .await
            .is_err()
        {
            return vec![];
        }
        response.await.unwrap_or_default()
    }

    pub async fn peer_count(&self) -> usize {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(PoolCommand::PeerCount { reply })
            .await
            .is_err()
        {
            return 0;
        }
        response.await.unwrap_or(0)
    }

    pub(crate) async fn dial_finished(&self, addr: SocketAddr) {
        let _ = self.sender.send(PoolCommand::DialFinished(addr)).await;
    }

    pub(crate) async fn register(
        &self,
        node_id: H512,
        handle: PeerHandle,
    ) -> Result<(), RegisterError> {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(PoolCommand::Register {
                node_id,
                handle,
                reply,
            })
            .await
            .is_err()
        {
            return Err(RegisterError::AtCapacity);
        }
        response.await.unwrap_or(Err(RegisterError::AtCapacity))
    }

    pub(crate) async fn unregister(&self, node_id: H512) {
        let _ = self.sender.send(PoolCommand::Unregister { node_id }).await;
    }

    pub(crate) async fn ban(&self, node_id: H512) {
        let _ = self.sender.send(PoolCommand::Ban(node_id)).await;
    }

    pub(crate) async fn try_accept_inbound(&self) -> bool {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(PoolCommand::TryAcceptInbound { reply })
            .await
            .is_err()
        {
            return false;
        }
        response.await.unwrap_or(false)
    }
}

/// Owns the peer map, the ban list and the dial scheduler. Runs as a single
/// task; nothing else touches its state.
pub(crate) struct PeerPool {
    context: P2PContext,
    commands: mpsc::Receiver<PoolCommand>,
    peers: HashMap<H512, PeerHandle>,
    ban_list: HashMap<H512, Instant>,
    active_dials: HashSet<SocketAddr>,
    pending_dials: VecDeque<Node>,
}

impl PeerPool {
    pub(crate) fn new(context: P2PContext, commands: mpsc::Receiver<PoolCommand>) -> Self {
        Self {
            context,
            commands,
            peers: HashMap::new(),
            ban_list: HashMap::new(),
            active_dials: HashSet::new(),
            pending_dials: VecDeque::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                PoolCommand::Dial(node) => self.handle_dial(node),
                PoolCommand::DialFinished(addr) => self.handle_dial_finished(addr),
                PoolCommand::Register {
                    node_id,
                    handle,
                    reply,
                } => {
                    let _ = reply.send(self.handle_register(node_id, handle));
                }
                PoolCommand::Unregister { node_id } => self.handle_unregister(node_id),
                PoolCommand::Ban(node_id) => self.handle_ban(node_id),
                PoolCommand::TryAcceptInbound { reply } => {
                    let _ = reply.send(self.peers.len() < self.context.config.max_peers);
                }
                PoolCommand::IsConnected { node_id, reply } => {
                    let _ = reply.send(self.peers.contains_key(&node_id));
                }
                PoolCommand::GetPeer { node_id, reply } => {
                    let _ = reply.send(self.peers.get(&node_id).cloned());
                }
                PoolCommand::Peers { reply } => {
                    let _ = reply.send(self.peers.values().cloned().collect());
                }
                PoolCommand::PeerCount { reply } => {
                    let _ = reply.send(self.peers.len());
                }
            }
        }
    }

    fn handle_dial(&mut self, node: Node) {
        let Some(addr) = node.tcp_address() else {
            return;
        };
        if node.node_id == self.context.local_node_id {
            return;
        }
        if self.is_banned(&node.node_id) {
            debug!(peer = %node.node_id, "not dialing banned peer");
            return;
        }
        if self.peers.contains_key(&node.node_id) {
            return;
        }
        // an in-flight dial to the same address is shared, not repeated
        if self.active_dials.contains(&addr) {
            return;
        }
        if self.peers.len() + self.active_dials.len() >= self.context.config.max_peers {
            debug!(peer = %node.node_id, "not dialing: pool at capacity");
            return;
        }
        if self.active_dials.len() >= self.context.config.max_active_dials {
            self.pending_dials.push_back(node);
            return;
        }
        self.spawn_dial(node, addr);
    }

    fn spawn_dial(&mut self, node: Node, addr: SocketAddr) {
        self.active_dials.insert(addr);
        let context = self.context.clone();
        tokio::spawn(dial_task(context, node, addr));
    }

    fn handle_dial_finished(&mut self, addr: SocketAddr) {
        self.active_dials.remove(&addr);
        while self.active_dials.len() < self.context.config.max_active_dials {
            let Some(node) = self.pending_dials.pop_front() else {
                break;
            };
            self.handle_dial(node);
        }
    }

    fn handle_register(
        &mut self,
        node_id: H512,
        handle: PeerHandle,
    ) -> Result<(), RegisterError> {
        if self.is_banned(&node_id) {
            return Err(RegisterError::Banned);
        }
        if self.peers.contains_key(&node_id) {
            return Err(RegisterError::Duplicate);
        }
        if self.peers.len() >= self.context.config.max_peers {
            return Err(RegisterError::AtCapacity);
        }
        self.peers.insert(node_id, handle);
        info!(peer = %node_id, peers = self.peers.len(), "peer added to pool");
        let _ = self
            .context
            .events
            .send(NetworkEvent::PoolPeerAdded { node_id });
        Ok(())
    }

    fn handle_unregister(&mut self, node_id: H512) {
        if self.peers.remove(&node_id).is_some() {
            info!(peer = %node_id, peers = self.peers.len(), "peer removed from pool");
            let _ = self
                .context
                .events
                .send(NetworkEvent::PoolPeerRemoved { node_id });
        }
    }

    fn handle_ban(&mut self, node_id: H512) {
        debug!(peer = %node_id, "banning peer");
        self.ban_list.insert(
            node_id,
            Instant::now() + self.context.config.peer_ban_duration,
        );
    }

    fn is_banned(&mut self, node_id: &H512) -> bool {
        match self.ban_list.get(node_id) {
            Some(expiry) if *expiry > Instant::now() => true,
            Some(_) => {
                self.ban_list.remove(node_id);
                false
            }
            None => false,
        }
    }
}

async fn dial_task(context: P2PContext, node: Node, addr: SocketAddr) {
    debug!(peer = %node, "dialing peer");
    match TcpStream::connect(addr).await {
        Ok(stream) => {
            let (established_tx, established_rx) = oneshot::channel();
            tokio::spawn(run_peer(
                context.clone(),
                stream,
                PeerKind::Outbound(node),
                Some(established_tx),
            ));
            // the dial slot frees once the handshake phase finishes either
            // way: the signal fires on success and drops on failure
            let _ = established_rx.await;
        }
        Err(error) => {
            debug!(peer = %node, %error, "dial failed");
        }
    }
    context.pool.dial_finished(addr).await;
}

pub(crate) enum PeerKind {
    Inbound,
    Outbound(Node),
}

/// Drives one TCP connection through handshake, Hello, registration and the
/// live session, then unregisters it.
pub(crate) async fn run_peer(
    context: P2PContext,
    stream: TcpStream,
    kind: PeerKind,
    established_signal: Option<oneshot::Sender<()>>,
) {
    if let Err(error) = run_peer_inner(context, stream, kind, established_signal).await {
        debug!(%error, "peer connection closed");
    }
}

async fn run_peer_inner(
    context: P2PContext,
    stream: TcpStream,
    kind: PeerKind,
    established_signal: Option<oneshot::Sender<()>>,
) -> Result<(), RLPxError> {
    let mut conn = match kind {
        PeerKind::Outbound(node) => {
            RLPxConnection::initiator(context.clone(), stream, node.node_id)
        }
        PeerKind::Inbound => RLPxConnection::receiver(context.clone(), stream),
    };

    time::timeout(context.config.handshake_timeout, conn.handshake())
        .await
        .map_err(|_| RLPxError::ConnectionError("handshake timed out".to_string()))??;

    if let Err(error) = conn.exchange_hello_messages().await {
        if let Ok(node_id) = conn.remote_node_id() {
            if should_ban(&error) {
                context.pool.ban(node_id).await;
            }
        }
        if let Some(reason) = error.disconnect_reason() {
            conn.send_disconnect(reason).await;
        }
        return Err(error);
    }

    let node_id = conn.remote_node_id()?;
    debug!(peer = %node_id, client = %conn.remote_client_id(), "hello complete");
    let (command_tx, command_rx) = mpsc::channel(SESSION_COMMAND_BUFFER);
    let handle = PeerHandle::new(node_id, command_tx);
    match context.pool.register(node_id, handle).await {
        Ok(()) => {}
        Err(RegisterError::AtCapacity) => {
            conn.send_disconnect(DisconnectReason::TooManyPeers).await;
            return Err(RLPxError::PoolAtCapacity);
        }
        // duplicates and banned peers are dropped without a Disconnect
        Err(RegisterError::Duplicate) | Err(RegisterError::Banned) => return Ok(()),
    }
    if let Some(signal) = established_signal {
        let _ = signal.send(());
    }

    let result = conn.run_session(command_rx).await;
    if let Err(error) = &result {
        if should_ban(error) {
            context.pool.ban(node_id).await;
        }
    }
    context.pool.unregister(node_id).await;
    result
}

/// Failures that mean this peer cannot become useful; the ban list keeps it
/// from reconnecting until its entry expires.
fn should_ban(error: &RLPxError) -> bool {
    matches!(
        error,
        RLPxError::NoSharedCapability
            | RLPxError::IncompatibleProtocol(_)
            | RLPxError::NetworkIdMismatch { .. }
            | RLPxError::GenesisMismatch
            | RLPxError::ForkIdMismatch
            | RLPxError::IdentityClash
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_backends, test_context_with, TestChain};
    use std::time::Duration;

    fn test_pool(tweak: impl FnOnce(&mut crate::NetworkConfig)) -> PeerPool {
        let context = test_context_with(test_backends(TestChain::single_genesis()), tweak);
        let (_handle, commands) = pool_channel();
        PeerPool::new(context, commands)
    }

    fn dummy_peer(id: u8) -> (H512, PeerHandle) {
        let node_id = H512::repeat_byte(id);
        let (commands, _rx) = mpsc::channel(1);
        (node_id, PeerHandle::new(node_id, commands))
    }

    #[test]
    fn register_caps_at_max_peers() {
        let mut pool = test_pool(|c| c.max_peers = 2);
        for id in 1..=2 {
            let (node_id, handle) = dummy_peer(id);
            assert!(pool.handle_register(node_id, handle).is_ok());
        }
        let (node_id, handle) = dummy_peer(3);
        assert_eq!(
            pool.handle_register(node_id, handle),
            Err(RegisterError::AtCapacity)
        );
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let mut pool = test_pool(|_| {});
        let (node_id, handle) = dummy_peer(1);
        assert!(pool.handle_register(node_id, handle.clone()).is_ok());
        assert_eq!(
            pool.handle_register(node_id, handle),
            Err(RegisterError::Duplicate)
        );
    }

    #[test]
    fn banned_peers_cannot_register_until_expiry() {
        let mut pool = test_pool(|c| c.peer_ban_duration = Duration::from_secs(60));
        let (node_id, handle) = dummy_peer(1);
        pool.handle_ban(node_id);
        assert_eq!(
            pool.handle_register(node_id, handle.clone()),
            Err(RegisterError::Banned)
        );

        // an expired entry is pruned on the next check
        pool.ban_list.insert(node_id, Instant::now());
        assert!(pool.handle_register(node_id, handle).is_ok());
        assert!(pool.ban_list.is_empty());
    }

    #[test]
    fn unregister_removes_the_peer() {
        let mut pool = test_pool(|_| {});
        let (node_id, handle) = dummy_peer(1);
        pool.handle_register(node_id, handle).unwrap();
        pool.handle_unregister(node_id);
        assert!(pool.peers.is_empty());
    }

    #[tokio::test]
    async fn dial_scheduler_respects_max_active_dials() {
        let mut pool = test_pool(|c| c.max_active_dials = 1);
        let node = |id: u8, port: u16| Node {
            node_id: H512::repeat_byte(id),
            ip: "127.0.0.1".parse().unwrap(),
            udp_port: port,
            tcp_port: port,
        };

        pool.handle_dial(node(1, 1));
        pool.handle_dial(node(2, 2));
        assert_eq!(pool.active_dials.len(), 1);
        assert_eq!(pool.pending_dials.len(), 1);

        // an identical in-flight target is coalesced, not queued again
        pool.handle_dial(node(1, 1));
        assert_eq!(pool.pending_dials.len(), 1);

        pool.handle_dial_finished("127.0.0.1:1".parse().unwrap());
        assert_eq!(pool.active_dials.len(), 1);
        assert!(pool.pending_dials.is_empty());
    }

    #[tokio::test]
    async fn dialing_a_connected_peer_is_a_no_op() {
        let mut pool = test_pool(|_| {});
        let (node_id, handle) = dummy_peer(1);
        pool.handle_register(node_id, handle).unwrap();
        pool.handle_dial(Node {
            node_id,
            ip: "127.0.0.1".parse().unwrap(),
            udp_port: 7,
            tcp_port: 7,
        });
        assert!(pool.active_dials.is_empty());
        assert!(pool.pending_dials.is_empty());
    }
}
