use arclight_rlp::encode::RLPEncode as _;

use crate::backends::{Chain, ReceiptStore, TxPool};
use crate::rlpx::error::RLPxError;

use super::blocks::{
    BlockBodies, BlockHeaders, GetBlockBodies, GetBlockHeaders, HashOrNumber, BLOCK_HEADER_LIMIT,
};
use super::node_data::{GetNodeData, NodeData};
use super::receipts::{GetReceipts, Receipts};
use super::status::{StatusMessage, MIN_FORK_ID_VERSION};
use super::transactions::{GetPooledTransactions, PooledTransactions};

/// Soft cap on the encoded size of BLOCK_BODIES and RECEIPTS responses.
pub const MAX_RESPONSE_SOFT_BYTES: usize = 2 * 1024 * 1024;

/// Builds the STATUS this node sends for the negotiated version.
pub fn local_status(chain: &dyn Chain, eth_version: u8) -> StatusMessage {
    let fork_id = (eth_version >= MIN_FORK_ID_VERSION).then(|| chain.fork_id());
    StatusMessage::new(
        eth_version,
        chain.network_id(),
        chain.total_difficulty(),
        chain.latest_header().compute_block_hash(),
        chain.genesis_hash(),
        fork_id,
    )
}

/// Validates a peer's STATUS against ours: protocol version, network id and
/// genesis must match byte for byte; from eth/64 on the fork hash must too.
pub fn validate_status(remote: &StatusMessage, local: &StatusMessage) -> Result<(), RLPxError> {
    if remote.eth_version != local.eth_version {
        return Err(RLPxError::IncompatibleProtocol(format!(
            "peer sent status for eth/{}, negotiated eth/{}",
            remote.eth_version, local.eth_version
        )));
    }
    if remote.network_id != local.network_id {
        return Err(RLPxError::NetworkIdMismatch {
            local: local.network_id,
            remote: remote.network_id,
        });
    }
    if remote.genesis != local.genesis {
        return Err(RLPxError::GenesisMismatch);
    }
    if local.eth_version >= MIN_FORK_ID_VERSION {
        match (&remote.fork_id, &local.fork_id) {
            (Some(remote_fork), Some(local_fork))
                if remote_fork.fork_hash == local_fork.fork_hash => {}
            _ => return Err(RLPxError::ForkIdMismatch),
        }
    }
    Ok(())
}

/// Serves GET_BLOCK_HEADERS. The limit is clamped to [`BLOCK_HEADER_LIMIT`];
/// a forward walk that starts or steps past the local head yields an empty
/// response rather than an error.
pub fn serve_block_headers(request: &GetBlockHeaders, chain: &dyn Chain) -> BlockHeaders {
    let max = request.limit.min(BLOCK_HEADER_LIMIT);
    let origin_number = match request.startblock {
        HashOrNumber::Number(number) => Some(number),
        HashOrNumber::Hash(hash) => chain.block_number(hash),
    };
    let block_headers = match origin_number {
        None => vec![],
        Some(origin)
            if !request.reverse
                && origin.saturating_add(max.saturating_mul(request.skip)) > chain.height() =>
        {
            vec![]
        }
        Some(origin) => {
            let mut headers = chain.get_headers(
                HashOrNumber::Number(origin),
                max,
                request.skip,
                request.reverse,
            );
            headers.truncate(max as usize);
            headers
        }
    };
    BlockHeaders {
        id: request.id,
        block_headers,
    }
}

/// Serves GET_BLOCK_BODIES under the soft byte cap. Unknown hashes end the
/// response early, as peers must not receive gaps.
pub fn serve_block_bodies(request: &GetBlockBodies, chain: &dyn Chain) -> BlockBodies {
    let mut block_bodies = vec![];
    let mut bytes_used = 0;
    for hash in &request.block_hashes {
        let Some(block) = chain.get_block(*hash) else {
            break;
        };
        bytes_used += block.body.length();
        block_bodies.push(block.body);
        if bytes_used >= MAX_RESPONSE_SOFT_BYTES {
            break;
        }
    }
    BlockBodies {
        id: request.id,
        block_bodies,
    }
}

/// Serves GET_RECEIPTS, halting accumulation once the encoded size reaches
/// the soft cap. Blocks without stored receipts contribute an empty list.
pub fn serve_receipts(request: &GetReceipts, store: &dyn ReceiptStore) -> Receipts {
    let mut receipts = vec![];
    let mut bytes_used = 0;
    for hash in &request.block_hashes {
        let block_receipts = store.get_receipts(*hash).unwrap_or_default();
        bytes_used += block_receipts.length();
        receipts.push(block_receipts);
        if bytes_used >= MAX_RESPONSE_SOFT_BYTES {
            break;
        }
    }
    Receipts {
        id: request.id,
        receipts,
    }
}

/// Serves GET_POOLED_TRANSACTIONS. Hashes the pool no longer knows are
/// skipped, as the protocol allows.
pub fn serve_pooled_transactions(
    request: &GetPooledTransactions,
    pool: &dyn TxPool,
) -> PooledTransactions {
    PooledTransactions {
        id: request.id,
        pooled_transactions: pool.get_by_hash(&request.transaction_hashes),
    }
}

/// Serves GET_NODE_DATA. This node is not archival, so the answer is always
/// empty, still correlated by request id.
pub fn serve_node_data(request: &GetNodeData) -> NodeData {
    NodeData {
        id: request.id,
        nodes: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlpx::eth::status::StatusMessage;
    use crate::test_utils::{TestChain, TestReceiptStore};
    use arclight_core::{
        types::{BlockHash, ForkId, Log, Receipt, TxType},
        H256, H32,
    };
    use arclight_rlp::encode::RLPEncode as _;
    use bytes::Bytes;
    use std::collections::HashMap;

    fn status_pair() -> (StatusMessage, StatusMessage) {
        let chain = TestChain::single_genesis();
        let local = local_status(&chain, 68);
        (local.clone(), local)
    }

    #[test]
    fn matching_statuses_validate() {
        let (local, remote) = status_pair();
        assert!(validate_status(&remote, &local).is_ok());
    }

    #[test]
    fn genesis_mismatch_is_detected() {
        let (local, mut remote) = status_pair();
        remote.genesis = BlockHash::repeat_byte(0xff);
        assert!(matches!(
            validate_status(&remote, &local),
            Err(RLPxError::GenesisMismatch)
        ));
    }

    #[test]
    fn network_id_mismatch_is_detected() {
        let (local, mut remote) = status_pair();
        remote.network_id = 5;
        assert!(matches!(
            validate_status(&remote, &local),
            Err(RLPxError::NetworkIdMismatch { local: 1, remote: 5 })
        ));
    }

    #[test]
    fn fork_id_mismatch_is_detected() {
        let (local, mut remote) = status_pair();
        remote.fork_id = Some(ForkId {
            fork_hash: H32::from_low_u64_be(0xdeadbeef),
            fork_next: 0,
        });
        assert!(matches!(
            validate_status(&remote, &local),
            Err(RLPxError::ForkIdMismatch)
        ));
    }

    #[test]
    fn headers_request_past_head_yields_empty_response() {
        let chain = TestChain::single_genesis();
        let request = GetBlockHeaders::new(1, HashOrNumber::Number(chain.height() + 1), 1, 0, false);
        let response = serve_block_headers(&request, &chain);
        assert_eq!(response.id, 1);
        assert!(response.block_headers.is_empty());
    }

    #[test]
    fn headers_request_for_genesis_serves_it() {
        let chain = TestChain::single_genesis();
        let request = GetBlockHeaders::new(2, HashOrNumber::Number(0), 5, 0, false);
        let response = serve_block_headers(&request, &chain);
        assert_eq!(response.block_headers, vec![chain.headers[0].clone()]);
    }

    #[test]
    fn headers_limit_is_clamped() {
        let chain = TestChain::single_genesis();
        let request = GetBlockHeaders::new(3, HashOrNumber::Number(0), 1 << 40, 0, true);
        let response = serve_block_headers(&request, &chain);
        assert_eq!(response.block_headers.len(), 1);
    }

    #[test]
    fn receipts_accumulation_halts_at_soft_cap() {
        // each receipt carries ~64 KiB of log data
        let big_log = Log {
            data: Bytes::from(vec![0u8; 64 * 1024]),
            ..Default::default()
        };
        let chain = TestChain::single_genesis();
        let genesis_hash = chain.genesis;
        let receipt = Receipt::new(TxType::Legacy, true, 1, vec![big_log]);
        let store = TestReceiptStore {
            receipts: HashMap::from([(genesis_hash, vec![receipt; 16])]),
        };

        // 64 hashes worth ~1 MiB each would blow way past the cap
        let request = GetReceipts::new(4, vec![genesis_hash; 64]);
        let response = serve_receipts(&request, &store);
        assert!(response.receipts.len() < 64);

        let encoded: usize = response.receipts.length();
        // one block past the cap at most
        assert!(encoded < MAX_RESPONSE_SOFT_BYTES + 2 * 1024 * 1024);
    }

    #[test]
    fn node_data_is_served_empty() {
        let request = GetNodeData::new(9, vec![H256::repeat_byte(1)]);
        let response = serve_node_data(&request);
        assert_eq!(response.id, 9);
        assert!(response.nodes.is_empty());
    }
}
