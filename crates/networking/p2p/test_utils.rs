//! Shared fixtures for the crate's tests: in-memory collaborator
//! implementations and context builders.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arclight_core::{
    types::{Block, BlockHash, BlockHeader, BlockNumber, ForkId, P2PTransaction, Receipt,
            Transaction},
    H256, H32, H512, U256,
};
use k256::SecretKey;
use tokio::sync::broadcast;

use crate::backends::{Backends, Chain, ReceiptStore, Synchronizer, TxPool};
use crate::pool::pool_channel;
use crate::rlpx::eth::blocks::{BlockHashAndNumber, HashOrNumber};
use crate::rlpx::utils::pubkey2id;
use crate::{NetworkConfig, NetworkEvent, P2PContext, EVENT_BUS_CAPACITY};

pub(crate) struct TestChain {
    pub headers: Vec<BlockHeader>,
    pub network_id: u64,
    pub genesis: BlockHash,
}

impl TestChain {
    /// A chain holding only its genesis block.
    pub fn single_genesis() -> Self {
        Self::with_genesis(BlockHeader::default())
    }

    pub fn with_genesis(genesis_header: BlockHeader) -> Self {
        let genesis = genesis_header.compute_block_hash();
        Self {
            headers: vec![genesis_header],
            network_id: 1,
            genesis,
        }
    }
}

impl Chain for TestChain {
    fn height(&self) -> BlockNumber {
        self.headers.len() as u64 - 1
    }

    fn latest_header(&self) -> BlockHeader {
        self.headers.last().cloned().unwrap_or_default()
    }

    fn genesis_hash(&self) -> BlockHash {
        self.genesis
    }

    fn network_id(&self) -> u64 {
        self.network_id
    }

    fn total_difficulty(&self) -> U256 {
        U256::from(1u64)
    }

    fn fork_id(&self) -> ForkId {
        ForkId {
            fork_hash: H32::from_low_u64_be(0xaabbccdd),
            fork_next: 0,
        }
    }

    fn get_headers(
        &self,
        origin: HashOrNumber,
        max: u64,
        skip: u64,
        reverse: bool,
    ) -> Vec<BlockHeader> {
        let origin = match origin {
            HashOrNumber::Number(n) => n,
            HashOrNumber::Hash(h) => match self.block_number(h) {
                Some(n) => n,
                None => return vec![],
            },
        };
        let step = skip + 1;
        let mut headers = vec![];
        let mut current = origin;
        for _ in 0..max {
            let Some(header) = self.headers.get(current as usize) else {
                break;
            };
            headers.push(header.clone());
            if reverse {
                match current.checked_sub(step) {
                    Some(next) => current = next,
                    None => break,
                }
            } else {
                current += step;
            }
        }
        headers
    }

    fn get_block(&self, hash: BlockHash) -> Option<Block> {
        let number = self.block_number(hash)?;
        Some(Block {
            header: self.headers[number as usize].clone(),
            body: Default::default(),
        })
    }

    fn block_number(&self, hash: BlockHash) -> Option<BlockNumber> {
        self.headers
            .iter()
            .position(|h| h.compute_block_hash() == hash)
            .map(|p| p as u64)
    }
}

#[derive(Default)]
pub(crate) struct TestReceiptStore {
    pub receipts: HashMap<BlockHash, Vec<Receipt>>,
}

impl ReceiptStore for TestReceiptStore {
    fn get_receipts(&self, block_hash: BlockHash) -> Option<Vec<Receipt>> {
        self.receipts.get(&block_hash).cloned()
    }
}

#[derive(Default)]
pub(crate) struct TestTxPool {
    pub transactions: HashMap<H256, P2PTransaction>,
    pub announced_txs: Mutex<Vec<Transaction>>,
    pub announced_hashes: Mutex<Vec<H256>>,
}

impl TxPool for TestTxPool {
    fn get_by_hash(&self, hashes: &[H256]) -> Vec<P2PTransaction> {
        hashes
            .iter()
            .filter_map(|hash| self.transactions.get(hash).cloned())
            .collect()
    }

    fn handle_announced_txs(&self, txs: Vec<Transaction>, _peer: H512) {
        self.announced_txs.lock().unwrap().extend(txs);
    }

    fn handle_announced_tx_hashes(&self, hashes: Vec<H256>, _peer: H512) {
        self.announced_hashes.lock().unwrap().extend(hashes);
    }
}

#[derive(Default)]
pub(crate) struct TestSynchronizer {
    pub new_blocks: Mutex<Vec<BlockHash>>,
    pub new_block_hashes: Mutex<Vec<BlockHashAndNumber>>,
}

impl Synchronizer for TestSynchronizer {
    fn handle_new_block(&self, block: Block, _peer: H512) {
        self.new_blocks.lock().unwrap().push(block.hash());
    }

    fn handle_new_block_hashes(&self, hashes: Vec<BlockHashAndNumber>, _peer: H512) {
        self.new_block_hashes.lock().unwrap().extend(hashes);
    }
}

pub(crate) fn test_backends(chain: TestChain) -> Backends {
    Backends {
        chain: Arc::new(chain),
        receipts: Arc::new(TestReceiptStore::default()),
        tx_pool: Arc::new(TestTxPool::default()),
        synchronizer: Arc::new(TestSynchronizer::default()),
    }
}

/// A context whose pool commands go nowhere; connection-level tests drive
/// sessions directly.
pub(crate) fn test_context(backends: Backends) -> P2PContext {
    test_context_with(backends, |_| {})
}

pub(crate) fn test_context_with(
    backends: Backends,
    tweak: impl FnOnce(&mut NetworkConfig),
) -> P2PContext {
    let signer = SecretKey::random(&mut rand::rngs::OsRng);
    let local_node_id = pubkey2id(&signer.public_key());
    let mut config = NetworkConfig::new(signer.clone());
    tweak(&mut config);
    let (events, _receiver) = broadcast::channel::<NetworkEvent>(EVENT_BUS_CAPACITY);
    let (pool, _commands) = pool_channel();
    P2PContext {
        config: Arc::new(config),
        backends,
        events,
        pool,
        signer,
        local_node_id,
    }
}
