use std::collections::BTreeMap;

use arclight_core::{
    types::{AccountState, BlockBody, BlockHeader, P2PTransaction, Receipt},
    H256, H512,
};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::rlpx::{
    connection::SessionCommand,
    error::RLPxError,
    eth::blocks::{GetBlockBodies, GetBlockHeaders, HashOrNumber},
    eth::receipts::GetReceipts,
    eth::transactions::GetPooledTransactions,
    message::Message,
    snap::{GetAccountRange, GetByteCodes, GetStorageRanges, GetTrieNodes, StorageSlot},
};

/// Default soft byte budget attached to SNAP range requests.
pub const MAX_SNAP_RESPONSE_BYTES: u64 = 512 * 1024;

/// A cheap, cloneable handle onto a live peer session. Requests resolve a
/// one-shot future each; the session owns ids, deadlines and deduplication.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    node_id: H512,
    commands: mpsc::Sender<SessionCommand>,
}

impl PeerHandle {
    pub(crate) fn new(node_id: H512, commands: mpsc::Sender<SessionCommand>) -> Self {
        Self { node_id, commands }
    }

    pub fn node_id(&self) -> H512 {
        self.node_id
    }

    /// Queues a fire-and-forget message without waiting. A full session
    /// queue surfaces as `WriteQueueOverflow`.
    pub fn send_message(&self, message: Message) -> Result<(), RLPxError> {
        self.commands
            .try_send(SessionCommand::Send(message))
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => RLPxError::WriteQueueOverflow,
                mpsc::error::TrySendError::Closed(_) => RLPxError::SessionClosed,
            })
    }

    /// Asks the session to close, optionally sending a Disconnect first.
    pub async fn close(&self, reason: Option<crate::rlpx::p2p::DisconnectReason>) {
        let _ = self.commands.send(SessionCommand::Close(reason)).await;
    }

    /// Issues a correlated request. The session assigns the request id,
    /// enforces the timeout and deduplicates identical in-flight queries;
    /// dropping the returned future cancels our interest in the reply.
    async fn request(&self, message: Message) -> Result<Message, RLPxError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Request { message, reply })
            .await
            .map_err(|_| RLPxError::SessionClosed)?;
        response.await.map_err(|_| RLPxError::SessionClosed)?
    }

    pub async fn get_block_headers(
        &self,
        origin: HashOrNumber,
        limit: u64,
        skip: u64,
        reverse: bool,
    ) -> Result<Vec<BlockHeader>, RLPxError> {
        let request = Message::GetBlockHeaders(GetBlockHeaders::new(0, origin, limit, skip, reverse));
        match self.request(request).await? {
            Message::BlockHeaders(response) => Ok(response.block_headers),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_block_bodies(
        &self,
        block_hashes: Vec<H256>,
    ) -> Result<Vec<BlockBody>, RLPxError> {
        let request = Message::GetBlockBodies(GetBlockBodies::new(0, block_hashes));
        match self.request(request).await? {
            Message::BlockBodies(response) => Ok(response.block_bodies),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_pooled_transactions(
        &self,
        transaction_hashes: Vec<H256>,
    ) -> Result<Vec<P2PTransaction>, RLPxError> {
        let request =
            Message::GetPooledTransactions(GetPooledTransactions::new(0, transaction_hashes));
        match self.request(request).await? {
            Message::PooledTransactions(response) => Ok(response.pooled_transactions),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_receipts(
        &self,
        block_hashes: Vec<H256>,
    ) -> Result<Vec<Vec<Receipt>>, RLPxError> {
        let request = Message::GetReceipts(GetReceipts::new(0, block_hashes));
        match self.request(request).await? {
            Message::Receipts(response) => Ok(response.receipts),
            other => Err(unexpected_response(other)),
        }
    }

    /// Requests an account range under `root`, starting at `starting_hash`.
    /// Returns the accounts expanded to their full form, plus the range
    /// proof.
    pub async fn get_account_range(
        &self,
        root: H256,
        starting_hash: H256,
        limit_hash: H256,
    ) -> Result<(Vec<(H256, AccountState)>, Vec<Bytes>), RLPxError> {
        let request = Message::GetAccountRange(GetAccountRange {
            id: 0,
            root_hash: root,
            starting_hash,
            limit_hash,
            response_bytes: MAX_SNAP_RESPONSE_BYTES,
        });
        match self.request(request).await? {
            Message::AccountRange(response) => {
                let accounts = response
                    .accounts
                    .into_iter()
                    .map(|unit| (unit.hash, unit.account.into_full()))
                    .collect();
                Ok((accounts, response.proof))
            }
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_storage_ranges(
        &self,
        root: H256,
        account_hashes: Vec<H256>,
        starting_hash: H256,
        limit_hash: H256,
    ) -> Result<(Vec<Vec<StorageSlot>>, Vec<Bytes>), RLPxError> {
        let request = Message::GetStorageRanges(GetStorageRanges {
            id: 0,
            root_hash: root,
            account_hashes,
            starting_hash,
            limit_hash,
            response_bytes: MAX_SNAP_RESPONSE_BYTES,
        });
        match self.request(request).await? {
            Message::StorageRanges(response) => Ok((response.slots, response.proof)),
            other => Err(unexpected_response(other)),
        }
    }

    pub async fn get_byte_codes(&self, hashes: Vec<H256>) -> Result<Vec<Bytes>, RLPxError> {
        let request = Message::GetByteCodes(GetByteCodes {
            id: 0,
            hashes,
            bytes: MAX_SNAP_RESPONSE_BYTES,
        });
        match self.request(request).await? {
            Message::ByteCodes(response) => Ok(response.codes),
            other => Err(unexpected_response(other)),
        }
    }

    /// Requests trie nodes by path: each map entry addresses one account
    /// and the paths into its storage trie.
    pub async fn get_trie_nodes(
        &self,
        root: H256,
        paths: BTreeMap<H256, Vec<Bytes>>,
    ) -> Result<Vec<Bytes>, RLPxError> {
        let paths = paths
            .into_iter()
            .map(|(account, storage_paths)| {
                let mut group = vec![Bytes::copy_from_slice(account.as_bytes())];
                group.extend(storage_paths);
                group
            })
            .collect();
        let request = Message::GetTrieNodes(GetTrieNodes {
            id: 0,
            root_hash: root,
            paths,
            bytes: MAX_SNAP_RESPONSE_BYTES,
        });
        match self.request(request).await? {
            Message::TrieNodes(response) => Ok(response.nodes),
            other => Err(unexpected_response(other)),
        }
    }

    /// Announces transactions in full to this peer.
    pub fn announce_transactions(
        &self,
        transactions: Vec<arclight_core::types::Transaction>,
    ) -> Result<(), RLPxError> {
        self.send_message(Message::Transactions(
            crate::rlpx::eth::transactions::Transactions::new(transactions),
        ))
    }

    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }
}

fn unexpected_response(message: Message) -> RLPxError {
    RLPxError::ProtocolError(format!("unexpected response {message}"))
}
