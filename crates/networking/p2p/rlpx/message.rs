use arclight_core::H256;
use arclight_rlp::error::{RLPDecodeError, RLPEncodeError};
use bytes::BufMut;
use std::fmt::Display;

use super::capabilities::{CapabilityName, ProtocolTable, BASE_PROTOCOL_LENGTH};
use super::error::RLPxError;
use super::eth::blocks::{
    BlockBodies, BlockHeaders, GetBlockBodies, GetBlockHeaders, HashOrNumber, NewBlock,
    NewBlockHashes,
};
use super::eth::node_data::{GetNodeData, NodeData, NODE_DATA_VERSIONS};
use super::eth::receipts::{GetReceipts, Receipts};
use super::eth::status::StatusMessage;
use super::eth::transactions::{
    GetPooledTransactions, NewPooledTransactionHashes, PooledTransactions, Transactions,
};
use super::p2p::{DisconnectMessage, HelloMessage, PingMessage, PongMessage};
use super::snap::{
    AccountRange, ByteCodes, GetAccountRange, GetByteCodes, GetStorageRanges, GetTrieNodes,
    StorageRanges, TrieNodes,
};

// base protocol codes, identical on every connection
pub const CODE_HELLO: u8 = 0x00;
pub const CODE_DISCONNECT: u8 = 0x01;
pub const CODE_PING: u8 = 0x02;
pub const CODE_PONG: u8 = 0x03;

/// Payload codec for a single message type. `version` is the negotiated
/// version of the message's subprotocol; the base protocol ignores it.
pub trait RLPxMessage: Sized {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError>;

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError>;
}

#[derive(Clone, Debug)]
pub enum Message {
    // base protocol
    Hello(HelloMessage),
    Disconnect(DisconnectMessage),
    Ping(PingMessage),
    Pong(PongMessage),
    // eth capability
    Status(StatusMessage),
    NewBlockHashes(NewBlockHashes),
    Transactions(Transactions),
    GetBlockHeaders(GetBlockHeaders),
    BlockHeaders(BlockHeaders),
    GetBlockBodies(GetBlockBodies),
    BlockBodies(BlockBodies),
    NewBlock(Box<NewBlock>),
    NewPooledTransactionHashes(NewPooledTransactionHashes),
    GetPooledTransactions(GetPooledTransactions),
    PooledTransactions(PooledTransactions),
    GetNodeData(GetNodeData),
    NodeData(NodeData),
    GetReceipts(GetReceipts),
    Receipts(Receipts),
    // snap capability
    GetAccountRange(GetAccountRange),
    AccountRange(AccountRange),
    GetStorageRanges(GetStorageRanges),
    StorageRanges(StorageRanges),
    GetByteCodes(GetByteCodes),
    ByteCodes(ByteCodes),
    GetTrieNodes(GetTrieNodes),
    TrieNodes(TrieNodes),
}

impl Message {
    /// Decodes a message from its absolute code and payload, routing
    /// subprotocol codes through the negotiated table. Codes with no mapping
    /// are protocol errors.
    pub fn decode(table: &ProtocolTable, code: u8, data: &[u8]) -> Result<Message, RLPxError> {
        if code < BASE_PROTOCOL_LENGTH {
            return match code {
                CODE_HELLO => Ok(Message::Hello(HelloMessage::decode(data, 0)?)),
                CODE_DISCONNECT => Ok(Message::Disconnect(DisconnectMessage::decode(data, 0)?)),
                CODE_PING => Ok(Message::Ping(PingMessage::decode(data, 0)?)),
                CODE_PONG => Ok(Message::Pong(PongMessage::decode(data, 0)?)),
                _ => Err(RLPxError::ProtocolError(format!(
                    "unknown base protocol code {code:#04x}"
                ))),
            };
        }
        let Some((entry, relative)) = table.route(code) else {
            return Err(RLPxError::ProtocolError(format!(
                "no negotiated capability for code {code:#04x}"
            )));
        };
        let version = entry.capability.version;
        match entry.capability.name {
            CapabilityName::Eth => Self::decode_eth(relative, version, data),
            CapabilityName::Snap => Self::decode_snap(relative, version, data),
            CapabilityName::Other(_) => Err(RLPxError::ProtocolError(format!(
                "message for inactive capability {}",
                entry.capability
            ))),
        }
    }

    fn decode_eth(code: u8, version: u8, data: &[u8]) -> Result<Message, RLPxError> {
        let message = match code {
            0x00 => Message::Status(StatusMessage::decode(data, version)?),
            0x01 => Message::NewBlockHashes(NewBlockHashes::decode(data, version)?),
            0x02 => Message::Transactions(Transactions::decode(data, version)?),
            0x03 => Message::GetBlockHeaders(GetBlockHeaders::decode(data, version)?),
            0x04 => Message::BlockHeaders(BlockHeaders::decode(data, version)?),
            0x05 => Message::GetBlockBodies(GetBlockBodies::decode(data, version)?),
            0x06 => Message::BlockBodies(BlockBodies::decode(data, version)?),
            0x07 => Message::NewBlock(Box::new(NewBlock::decode(data, version)?)),
            0x08 if version >= 65 => Message::NewPooledTransactionHashes(
                NewPooledTransactionHashes::decode(data, version)?,
            ),
            0x09 if version >= 65 => {
                Message::GetPooledTransactions(GetPooledTransactions::decode(data, version)?)
            }
            0x0a if version >= 65 => {
                Message::PooledTransactions(PooledTransactions::decode(data, version)?)
            }
            0x0d if NODE_DATA_VERSIONS.contains(&version) => {
                Message::GetNodeData(GetNodeData::decode(data, version)?)
            }
            0x0e if NODE_DATA_VERSIONS.contains(&version) => {
                Message::NodeData(NodeData::decode(data, version)?)
            }
            0x0f if version >= 63 => Message::GetReceipts(GetReceipts::decode(data, version)?),
            0x10 if version >= 63 => Message::Receipts(Receipts::decode(data, version)?),
            _ => {
                return Err(RLPxError::ProtocolError(format!(
                    "eth message code {code:#04x} is not valid for eth/{version}"
                )))
            }
        };
        Ok(message)
    }

    fn decode_snap(code: u8, version: u8, data: &[u8]) -> Result<Message, RLPxError> {
        let message = match code {
            0x00 => Message::GetAccountRange(GetAccountRange::decode(data, version)?),
            0x01 => Message::AccountRange(AccountRange::decode(data, version)?),
            0x02 => Message::GetStorageRanges(GetStorageRanges::decode(data, version)?),
            0x03 => Message::StorageRanges(StorageRanges::decode(data, version)?),
            0x04 => Message::GetByteCodes(GetByteCodes::decode(data, version)?),
            0x05 => Message::ByteCodes(ByteCodes::decode(data, version)?),
            0x06 => Message::GetTrieNodes(GetTrieNodes::decode(data, version)?),
            0x07 => Message::TrieNodes(TrieNodes::decode(data, version)?),
            _ => {
                return Err(RLPxError::ProtocolError(format!(
                    "snap message code {code:#04x} is not valid for snap/{version}"
                )))
            }
        };
        Ok(message)
    }

    /// The capability the message belongs to; None for the base protocol.
    pub fn capability(&self) -> Option<CapabilityName> {
        match self {
            Message::Hello(_) | Message::Disconnect(_) | Message::Ping(_) | Message::Pong(_) => {
                None
            }
            Message::Status(_)
            | Message::NewBlockHashes(_)
            | Message::Transactions(_)
            | Message::GetBlockHeaders(_)
            | Message::BlockHeaders(_)
            | Message::GetBlockBodies(_)
            | Message::BlockBodies(_)
            | Message::NewBlock(_)
            | Message::NewPooledTransactionHashes(_)
            | Message::GetPooledTransactions(_)
            | Message::PooledTransactions(_)
            | Message::GetNodeData(_)
            | Message::NodeData(_)
            | Message::GetReceipts(_)
            | Message::Receipts(_) => Some(CapabilityName::Eth),
            Message::GetAccountRange(_)
            | Message::AccountRange(_)
            | Message::GetStorageRanges(_)
            | Message::StorageRanges(_)
            | Message::GetByteCodes(_)
            | Message::ByteCodes(_)
            | Message::GetTrieNodes(_)
            | Message::TrieNodes(_) => Some(CapabilityName::Snap),
        }
    }

    /// The message's code relative to its capability's offset. Base protocol
    /// messages return their absolute code.
    pub fn relative_code(&self) -> u8 {
        match self {
            Message::Hello(_) => CODE_HELLO,
            Message::Disconnect(_) => CODE_DISCONNECT,
            Message::Ping(_) => CODE_PING,
            Message::Pong(_) => CODE_PONG,
            Message::Status(_) => 0x00,
            Message::NewBlockHashes(_) => 0x01,
            Message::Transactions(_) => 0x02,
            Message::GetBlockHeaders(_) => 0x03,
            Message::BlockHeaders(_) => 0x04,
            Message::GetBlockBodies(_) => 0x05,
            Message::BlockBodies(_) => 0x06,
            Message::NewBlock(_) => 0x07,
            Message::NewPooledTransactionHashes(_) => 0x08,
            Message::GetPooledTransactions(_) => 0x09,
            Message::PooledTransactions(_) => 0x0a,
            Message::GetNodeData(_) => 0x0d,
            Message::NodeData(_) => 0x0e,
            Message::GetReceipts(_) => 0x0f,
            Message::Receipts(_) => 0x10,
            Message::GetAccountRange(_) => 0x00,
            Message::AccountRange(_) => 0x01,
            Message::GetStorageRanges(_) => 0x02,
            Message::StorageRanges(_) => 0x03,
            Message::GetByteCodes(_) => 0x04,
            Message::ByteCodes(_) => 0x05,
            Message::GetTrieNodes(_) => 0x06,
            Message::TrieNodes(_) => 0x07,
        }
    }

    /// The absolute code for this message on a connection with the given
    /// negotiated table.
    pub fn absolute_code(&self, table: &ProtocolTable) -> Result<u8, RLPxError> {
        match self.capability() {
            None => Ok(self.relative_code()),
            Some(name) => table
                .absolute_code(&name, self.relative_code())
                .ok_or_else(|| {
                    RLPxError::IncompatibleProtocol(format!("{name} is not negotiated"))
                }),
        }
    }

    /// Encodes the message payload (no code, no compression).
    pub fn encode_payload(
        &self,
        buf: &mut dyn BufMut,
        table: &ProtocolTable,
    ) -> Result<(), RLPxError> {
        let version = match self.capability() {
            None => 0,
            Some(name) => {
                table
                    .entry(&name)
                    .ok_or_else(|| {
                        RLPxError::IncompatibleProtocol(format!("{name} is not negotiated"))
                    })?
                    .capability
                    .version
            }
        };
        match self {
            Message::Hello(msg) => msg.encode(buf, version),
            Message::Disconnect(msg) => msg.encode(buf, version),
            Message::Ping(msg) => msg.encode(buf, version),
            Message::Pong(msg) => msg.encode(buf, version),
            Message::Status(msg) => msg.encode(buf, version),
            Message::NewBlockHashes(msg) => msg.encode(buf, version),
            Message::Transactions(msg) => msg.encode(buf, version),
            Message::GetBlockHeaders(msg) => msg.encode(buf, version),
            Message::BlockHeaders(msg) => msg.encode(buf, version),
            Message::GetBlockBodies(msg) => msg.encode(buf, version),
            Message::BlockBodies(msg) => msg.encode(buf, version),
            Message::NewBlock(msg) => msg.encode(buf, version),
            Message::NewPooledTransactionHashes(msg) => msg.encode(buf, version),
            Message::GetPooledTransactions(msg) => msg.encode(buf, version),
            Message::PooledTransactions(msg) => msg.encode(buf, version),
            Message::GetNodeData(msg) => msg.encode(buf, version),
            Message::NodeData(msg) => msg.encode(buf, version),
            Message::GetReceipts(msg) => msg.encode(buf, version),
            Message::Receipts(msg) => msg.encode(buf, version),
            Message::GetAccountRange(msg) => msg.encode(buf, version),
            Message::AccountRange(msg) => msg.encode(buf, version),
            Message::GetStorageRanges(msg) => msg.encode(buf, version),
            Message::StorageRanges(msg) => msg.encode(buf, version),
            Message::GetByteCodes(msg) => msg.encode(buf, version),
            Message::ByteCodes(msg) => msg.encode(buf, version),
            Message::GetTrieNodes(msg) => msg.encode(buf, version),
            Message::TrieNodes(msg) => msg.encode(buf, version),
        }
        .map_err(RLPxError::from)
    }

    /// True for GET_* messages of either subprotocol.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Message::GetBlockHeaders(_)
                | Message::GetBlockBodies(_)
                | Message::GetPooledTransactions(_)
                | Message::GetNodeData(_)
                | Message::GetReceipts(_)
                | Message::GetAccountRange(_)
                | Message::GetStorageRanges(_)
                | Message::GetByteCodes(_)
                | Message::GetTrieNodes(_)
        )
    }

    /// The request id of a response message, used to resolve the pending
    /// entry it answers. None for anything that is not a response.
    pub fn response_id(&self) -> Option<u64> {
        match self {
            Message::BlockHeaders(msg) => Some(msg.id),
            Message::BlockBodies(msg) => Some(msg.id),
            Message::PooledTransactions(msg) => Some(msg.id),
            Message::NodeData(msg) => Some(msg.id),
            Message::Receipts(msg) => Some(msg.id),
            Message::AccountRange(msg) => Some(msg.id),
            Message::StorageRanges(msg) => Some(msg.id),
            Message::ByteCodes(msg) => Some(msg.id),
            Message::TrieNodes(msg) => Some(msg.id),
            _ => None,
        }
    }

    /// Stamps a request with its session-assigned id.
    pub fn set_request_id(&mut self, id: u64) {
        match self {
            Message::GetBlockHeaders(msg) => msg.id = id,
            Message::GetBlockBodies(msg) => msg.id = id,
            Message::GetPooledTransactions(msg) => msg.id = id,
            Message::GetNodeData(msg) => msg.id = id,
            Message::GetReceipts(msg) => msg.id = id,
            Message::GetAccountRange(msg) => msg.id = id,
            Message::GetStorageRanges(msg) => msg.id = id,
            Message::GetByteCodes(msg) => msg.id = id,
            Message::GetTrieNodes(msg) => msg.id = id,
            _ => {}
        }
    }

    /// A canonical key for in-flight request deduplication: two requests
    /// with the same key are answered by a single wire exchange.
    pub fn dedupe_key(&self) -> Option<String> {
        let key = match self {
            Message::GetBlockHeaders(msg) => {
                let origin = match msg.startblock {
                    HashOrNumber::Hash(hash) => format!("h{}", hex::encode(hash)),
                    HashOrNumber::Number(number) => format!("n{number}"),
                };
                format!(
                    "eth:headers:{origin}:{}:{}:{}",
                    msg.limit, msg.skip, msg.reverse
                )
            }
            Message::GetBlockBodies(msg) => {
                format!("eth:bodies:{}", join_hashes(&msg.block_hashes))
            }
            Message::GetPooledTransactions(msg) => {
                format!("eth:pooledtxs:{}", join_hashes(&msg.transaction_hashes))
            }
            Message::GetNodeData(msg) => format!("eth:nodedata:{}", join_hashes(&msg.hashes)),
            Message::GetReceipts(msg) => {
                format!("eth:receipts:{}", join_hashes(&msg.block_hashes))
            }
            Message::GetAccountRange(msg) => format!(
                "snap:accountrange:{}:{}:{}:{}",
                hex::encode(msg.root_hash),
                hex::encode(msg.starting_hash),
                hex::encode(msg.limit_hash),
                msg.response_bytes
            ),
            Message::GetStorageRanges(msg) => format!(
                "snap:storageranges:{}:{}:{}:{}:{}",
                hex::encode(msg.root_hash),
                join_hashes(&msg.account_hashes),
                hex::encode(msg.starting_hash),
                hex::encode(msg.limit_hash),
                msg.response_bytes
            ),
            Message::GetByteCodes(msg) => {
                let mut hashes = msg.hashes.clone();
                hashes.sort();
                format!("snap:bytecodes:{}:{}", join_hashes(&hashes), msg.bytes)
            }
            Message::GetTrieNodes(msg) => {
                let paths: Vec<String> = msg
                    .paths
                    .iter()
                    .map(|group| {
                        group
                            .iter()
                            .map(hex::encode)
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .collect();
                format!(
                    "snap:trienodes:{}:{}:{}",
                    hex::encode(msg.root_hash),
                    paths.join(","),
                    msg.bytes
                )
            }
            _ => return None,
        };
        Some(key)
    }
}

fn join_hashes(hashes: &[H256]) -> String {
    hashes.iter().map(hex::encode).collect::<Vec<_>>().join(",")
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Hello(_) => "p2p:Hello".fmt(f),
            Message::Disconnect(_) => "p2p:Disconnect".fmt(f),
            Message::Ping(_) => "p2p:Ping".fmt(f),
            Message::Pong(_) => "p2p:Pong".fmt(f),
            Message::Status(_) => "eth:Status".fmt(f),
            Message::NewBlockHashes(_) => "eth:NewBlockHashes".fmt(f),
            Message::Transactions(_) => "eth:Transactions".fmt(f),
            Message::GetBlockHeaders(_) => "eth:GetBlockHeaders".fmt(f),
            Message::BlockHeaders(_) => "eth:BlockHeaders".fmt(f),
            Message::GetBlockBodies(_) => "eth:GetBlockBodies".fmt(f),
            Message::BlockBodies(_) => "eth:BlockBodies".fmt(f),
            Message::NewBlock(_) => "eth:NewBlock".fmt(f),
            Message::NewPooledTransactionHashes(_) => "eth:NewPooledTransactionHashes".fmt(f),
            Message::GetPooledTransactions(_) => "eth:GetPooledTransactions".fmt(f),
            Message::PooledTransactions(_) => "eth:PooledTransactions".fmt(f),
            Message::GetNodeData(_) => "eth:GetNodeData".fmt(f),
            Message::NodeData(_) => "eth:NodeData".fmt(f),
            Message::GetReceipts(_) => "eth:GetReceipts".fmt(f),
            Message::Receipts(_) => "eth:Receipts".fmt(f),
            Message::GetAccountRange(_) => "snap:GetAccountRange".fmt(f),
            Message::AccountRange(_) => "snap:AccountRange".fmt(f),
            Message::GetStorageRanges(_) => "snap:GetStorageRanges".fmt(f),
            Message::StorageRanges(_) => "snap:StorageRanges".fmt(f),
            Message::GetByteCodes(_) => "snap:GetByteCodes".fmt(f),
            Message::ByteCodes(_) => "snap:ByteCodes".fmt(f),
            Message::GetTrieNodes(_) => "snap:GetTrieNodes".fmt(f),
            Message::TrieNodes(_) => "snap:TrieNodes".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlpx::capabilities::supported_capabilities;
    use arclight_core::types::BlockHash;

    fn full_table() -> ProtocolTable {
        ProtocolTable::negotiate(&supported_capabilities(), &supported_capabilities())
    }

    #[test]
    fn status_travels_at_the_eth_offset() {
        let table = full_table();
        let msg = Message::GetBlockHeaders(GetBlockHeaders::new(
            1,
            HashOrNumber::Number(0),
            1,
            0,
            false,
        ));
        assert_eq!(msg.absolute_code(&table).unwrap(), 0x10 + 0x03);
    }

    #[test]
    fn snap_codes_stack_after_eth() {
        let table = full_table();
        let msg = Message::GetAccountRange(GetAccountRange {
            id: 1,
            root_hash: Default::default(),
            starting_hash: Default::default(),
            limit_hash: Default::default(),
            response_bytes: 0,
        });
        assert_eq!(msg.absolute_code(&table).unwrap(), 0x10 + 17);
    }

    #[test]
    fn roundtrip_through_code_and_payload() {
        let table = full_table();
        let msg = Message::GetBlockBodies(GetBlockBodies::new(
            9,
            vec![BlockHash::repeat_byte(0xee)],
        ));
        let code = msg.absolute_code(&table).unwrap();
        let mut payload = vec![];
        msg.encode_payload(&mut payload, &table).unwrap();

        match Message::decode(&table, code, &payload).unwrap() {
            Message::GetBlockBodies(decoded) => {
                assert_eq!(decoded.id, 9);
                assert_eq!(decoded.block_hashes, vec![BlockHash::repeat_byte(0xee)]);
            }
            other => panic!("decoded as {other}"),
        }
    }

    #[test]
    fn unmapped_code_is_a_protocol_error() {
        let table = full_table();
        // one past the snap range
        let code = 0x10 + 17 + 8;
        assert!(matches!(
            Message::decode(&table, code, &[]),
            Err(RLPxError::ProtocolError(_))
        ));
    }

    #[test]
    fn node_data_is_rejected_on_eth68() {
        let table = full_table(); // negotiates eth/68
        let request = GetNodeData::new(1, vec![]);
        let mut payload = vec![];
        request.encode(&mut payload, 68).unwrap();
        assert!(matches!(
            Message::decode(&table, 0x10 + 0x0d, &payload),
            Err(RLPxError::ProtocolError(_))
        ));
    }

    #[test]
    fn byte_codes_dedupe_key_ignores_hash_order() {
        let a = Message::GetByteCodes(GetByteCodes {
            id: 1,
            hashes: vec![H256::repeat_byte(1), H256::repeat_byte(2)],
            bytes: 100,
        });
        let b = Message::GetByteCodes(GetByteCodes {
            id: 2,
            hashes: vec![H256::repeat_byte(2), H256::repeat_byte(1)],
            bytes: 100,
        });
        assert_eq!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn header_requests_with_same_query_share_a_key() {
        let a = Message::GetBlockHeaders(GetBlockHeaders::new(
            1,
            HashOrNumber::Number(5),
            10,
            0,
            false,
        ));
        let b = Message::GetBlockHeaders(GetBlockHeaders::new(
            2,
            HashOrNumber::Number(5),
            10,
            0,
            false,
        ));
        assert_eq!(a.dedupe_key(), b.dedupe_key());
        assert!(a.dedupe_key().is_some());
    }
}
