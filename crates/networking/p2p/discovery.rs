use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tracing::debug;

use crate::types::Node;
use crate::P2PContext;

const BOOTSTRAP_BACKOFF_START: Duration = Duration::from_secs(1);
const BOOTSTRAP_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Bridges the external discovery module into the pool: every discovered
/// node is offered to the dial scheduler, which applies the ban list, the
/// connected set and the capacity caps.
pub(crate) async fn discovery_adapter(context: P2PContext, mut events: mpsc::Receiver<Node>) {
    while let Some(node) = events.recv().await {
        if node.node_id == context.local_node_id {
            continue;
        }
        debug!(peer = %node, "discovered peer");
        context.pool.dial(node).await;
    }
    debug!("discovery event stream ended");
}

/// Dials one bootstrap node with exponential backoff (1 s, 2 s, 4 s, …
/// capped at 60 s) until a live session exists.
pub(crate) async fn bootstrap_node(context: P2PContext, node: Node) {
    let mut backoff = BOOTSTRAP_BACKOFF_START;
    loop {
        if context.pool.is_connected(node.node_id).await {
            return;
        }
        context.pool.dial(node).await;
        time::sleep(backoff).await;
        backoff = (backoff * 2).min(BOOTSTRAP_BACKOFF_CAP);
    }
}
