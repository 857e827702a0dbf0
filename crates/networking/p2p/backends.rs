use std::sync::Arc;

use arclight_core::{
    types::{Block, BlockHash, BlockHeader, BlockNumber, ForkId, P2PTransaction, Receipt,
            Transaction},
    H256, H512, U256,
};

use crate::rlpx::eth::blocks::{BlockHashAndNumber, HashOrNumber};

/// Read access to the canonical chain. The chain store itself lives outside
/// this crate; the network layer only consumes this view.
pub trait Chain: Send + Sync {
    fn height(&self) -> BlockNumber;
    fn latest_header(&self) -> BlockHeader;
    fn genesis_hash(&self) -> BlockHash;
    fn network_id(&self) -> u64;
    fn total_difficulty(&self) -> U256;
    fn fork_id(&self) -> ForkId;
    /// Walks headers from `origin`, honoring `skip` and `reverse`. Returns
    /// fewer than `max` headers when the chain runs out.
    fn get_headers(&self, origin: HashOrNumber, max: u64, skip: u64, reverse: bool)
        -> Vec<BlockHeader>;
    fn get_block(&self, hash: BlockHash) -> Option<Block>;
    fn block_number(&self, hash: BlockHash) -> Option<BlockNumber>;
}

/// Read access to stored receipts.
pub trait ReceiptStore: Send + Sync {
    /// None when the block's receipts are not available.
    fn get_receipts(&self, block_hash: BlockHash) -> Option<Vec<Receipt>>;
}

/// The transaction pool, both for serving pooled-transaction requests and
/// for sinking announcements.
pub trait TxPool: Send + Sync {
    /// Transactions the pool knows, in wire form. Missing hashes are
    /// silently skipped, as the protocol allows.
    fn get_by_hash(&self, hashes: &[H256]) -> Vec<P2PTransaction>;
    fn handle_announced_txs(&self, txs: Vec<Transaction>, peer: H512);
    fn handle_announced_tx_hashes(&self, hashes: Vec<H256>, peer: H512);
}

/// Sink for block announcements.
pub trait Synchronizer: Send + Sync {
    fn handle_new_block(&self, block: Block, peer: H512);
    fn handle_new_block_hashes(&self, hashes: Vec<BlockHashAndNumber>, peer: H512);
}

/// The external collaborators every session consults.
#[derive(Clone)]
pub struct Backends {
    pub chain: Arc<dyn Chain>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub tx_pool: Arc<dyn TxPool>,
    pub synchronizer: Arc<dyn Synchronizer>,
}
