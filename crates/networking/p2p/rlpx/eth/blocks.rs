use arclight_core::{
    types::{Block, BlockBody, BlockHash, BlockHeader, BlockNumber},
    U256,
};
use arclight_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use bytes::BufMut;

use crate::rlpx::capabilities::MIN_ETH_REQUEST_VERSION;
use crate::rlpx::message::RLPxMessage;

/// The most headers a single GET_BLOCK_HEADERS may ask for or receive.
pub const BLOCK_HEADER_LIMIT: u64 = 1024;

/// A 32-byte string in this position is a hash; anything shorter is a block
/// number.
pub const HASH_FIRST_BYTE_DECODER: u8 = 160;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashOrNumber {
    Hash(BlockHash),
    Number(BlockNumber),
}

impl From<BlockHash> for HashOrNumber {
    fn from(hash: BlockHash) -> Self {
        Self::Hash(hash)
    }
}

impl From<BlockNumber> for HashOrNumber {
    fn from(number: BlockNumber) -> Self {
        Self::Number(number)
    }
}

impl RLPEncode for HashOrNumber {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            HashOrNumber::Hash(hash) => hash.encode(buf),
            HashOrNumber::Number(number) => number.encode(buf),
        }
    }

    fn length(&self) -> usize {
        match self {
            HashOrNumber::Hash(hash) => hash.length(),
            HashOrNumber::Number(number) => number.length(),
        }
    }
}

impl RLPDecode for HashOrNumber {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first_byte = buf.first().ok_or(RLPDecodeError::InvalidLength)?;
        // hashes are 32 bytes long, encoded as 0x80 + 32 = 0xa0 (160)
        if *first_byte == HASH_FIRST_BYTE_DECODER {
            let (hash, rest) = BlockHash::decode_unfinished(buf)?;
            return Ok((Self::Hash(hash), rest));
        }
        let (number, rest) = u64::decode_unfinished(buf)?;
        Ok((Self::Number(number), rest))
    }
}

/// An entry of a NEW_BLOCK_HASHES announce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHashAndNumber {
    pub hash: BlockHash,
    pub number: BlockNumber,
}

impl RLPEncode for BlockHashAndNumber {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.hash)
            .encode_field(&self.number)
            .finish();
    }
}

impl RLPDecode for BlockHashAndNumber {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (hash, decoder) = decoder.decode_field("hash")?;
        let (number, decoder) = decoder.decode_field("number")?;
        let remaining = decoder.finish()?;
        Ok((Self { hash, number }, remaining))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#newblockhashes-0x01
// Broadcast message
#[derive(Clone, Debug)]
pub struct NewBlockHashes {
    pub block_hashes: Vec<BlockHashAndNumber>,
}

impl NewBlockHashes {
    pub fn new(block_hashes: Vec<BlockHashAndNumber>) -> Self {
        Self { block_hashes }
    }
}

impl RLPxMessage for NewBlockHashes {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        self.block_hashes.encode(buf);
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let block_hashes = Vec::<BlockHashAndNumber>::decode(msg_data)?;
        Ok(Self::new(block_hashes))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#newblock-0x07
// Broadcast message
#[derive(Clone, Debug)]
pub struct NewBlock {
    pub block: Block,
    pub total_difficulty: U256,
}

impl RLPxMessage for NewBlock {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.block)
            .encode_field(&self.total_difficulty)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (block, decoder) = decoder.decode_field("block")?;
        let (total_difficulty, decoder) = decoder.decode_field("totalDifficulty")?;
        let _padding = decoder.finish_unchecked();
        Ok(Self {
            block,
            total_difficulty,
        })
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getblockheaders-0x03
#[derive(Clone, Debug)]
pub struct GetBlockHeaders {
    /// Chosen by the requesting peer; the response mirrors it. Zero on
    /// connections below eth/66, which don't carry request ids.
    pub id: u64,
    pub startblock: HashOrNumber,
    pub limit: u64,
    pub skip: u64,
    pub reverse: bool,
}

impl GetBlockHeaders {
    pub fn new(id: u64, startblock: HashOrNumber, limit: u64, skip: u64, reverse: bool) -> Self {
        Self {
            id,
            startblock,
            limit,
            skip,
            reverse,
        }
    }
}

impl RLPxMessage for GetBlockHeaders {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        let query = (self.startblock, self.limit, self.skip, self.reverse);
        if version >= MIN_ETH_REQUEST_VERSION {
            Encoder::new(buf)
                .encode_field(&self.id)
                .encode_field(&query)
                .finish();
        } else {
            Encoder::new(buf)
                .encode_field(&self.startblock)
                .encode_field(&self.limit)
                .encode_field(&self.skip)
                .encode_field(&self.reverse)
                .finish();
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        if version >= MIN_ETH_REQUEST_VERSION {
            let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
            let ((startblock, limit, skip, reverse), _): ((HashOrNumber, u64, u64, bool), _) =
                decoder.decode_field("getBlockHeaders request params")?;
            Ok(Self::new(id, startblock, limit, skip, reverse))
        } else {
            let (startblock, decoder) = decoder.decode_field("startblock")?;
            let (limit, decoder) = decoder.decode_field("limit")?;
            let (skip, decoder) = decoder.decode_field("skip")?;
            let (reverse, _) = decoder.decode_field("reverse")?;
            Ok(Self::new(0, startblock, limit, skip, reverse))
        }
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#blockheaders-0x04
#[derive(Clone, Debug)]
pub struct BlockHeaders {
    pub id: u64,
    pub block_headers: Vec<BlockHeader>,
}

impl BlockHeaders {
    pub fn new(id: u64, block_headers: Vec<BlockHeader>) -> Self {
        Self { block_headers, id }
    }
}

impl RLPxMessage for BlockHeaders {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            Encoder::new(buf)
                .encode_field(&self.id)
                .encode_field(&self.block_headers)
                .finish();
        } else {
            self.block_headers.encode(buf);
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            let decoder = Decoder::new(msg_data)?;
            let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
            let (block_headers, _): (Vec<BlockHeader>, _) = decoder.decode_field("headers")?;
            Ok(Self::new(id, block_headers))
        } else {
            let block_headers = Vec::<BlockHeader>::decode(msg_data)?;
            Ok(Self::new(0, block_headers))
        }
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getblockbodies-0x05
#[derive(Clone, Debug)]
pub struct GetBlockBodies {
    pub id: u64,
    pub block_hashes: Vec<BlockHash>,
}

impl GetBlockBodies {
    pub fn new(id: u64, block_hashes: Vec<BlockHash>) -> Self {
        Self { block_hashes, id }
    }
}

impl RLPxMessage for GetBlockBodies {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            Encoder::new(buf)
                .encode_field(&self.id)
                .encode_field(&self.block_hashes)
                .finish();
        } else {
            self.block_hashes.encode(buf);
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            let decoder = Decoder::new(msg_data)?;
            let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
            let (block_hashes, _): (Vec<BlockHash>, _) = decoder.decode_field("blockHashes")?;
            Ok(Self::new(id, block_hashes))
        } else {
            let block_hashes = Vec::<BlockHash>::decode(msg_data)?;
            Ok(Self::new(0, block_hashes))
        }
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#blockbodies-0x06
#[derive(Clone, Debug)]
pub struct BlockBodies {
    pub id: u64,
    pub block_bodies: Vec<BlockBody>,
}

impl BlockBodies {
    pub fn new(id: u64, block_bodies: Vec<BlockBody>) -> Self {
        Self { block_bodies, id }
    }
}

impl RLPxMessage for BlockBodies {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            Encoder::new(buf)
                .encode_field(&self.id)
                .encode_field(&self.block_bodies)
                .finish();
        } else {
            self.block_bodies.encode(buf);
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            let decoder = Decoder::new(msg_data)?;
            let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
            let (block_bodies, _): (Vec<BlockBody>, _) = decoder.decode_field("blockBodies")?;
            Ok(Self::new(id, block_bodies))
        } else {
            let block_bodies = Vec::<BlockBody>::decode(msg_data)?;
            Ok(Self::new(0, block_bodies))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_block_headers_number_origin_roundtrip() {
        let request = GetBlockHeaders::new(7, HashOrNumber::Number(1), 5, 0, false);
        let mut buf = Vec::new();
        request.encode(&mut buf, 68).unwrap();

        let decoded = GetBlockHeaders::decode(&buf, 68).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.startblock, HashOrNumber::Number(1));
        assert_eq!(decoded.limit, 5);
        assert!(!decoded.reverse);
    }

    #[test]
    fn get_block_headers_hash_origin_roundtrip() {
        let request =
            GetBlockHeaders::new(1, HashOrNumber::Hash(BlockHash::from([1; 32])), 1, 0, true);
        let mut buf = Vec::new();
        request.encode(&mut buf, 66).unwrap();

        let decoded = GetBlockHeaders::decode(&buf, 66).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(
            decoded.startblock,
            HashOrNumber::Hash(BlockHash::from([1; 32]))
        );
        assert!(decoded.reverse);
    }

    #[test]
    fn get_block_headers_eth65_has_no_request_id() {
        let request = GetBlockHeaders::new(0, HashOrNumber::Number(100), 10, 2, false);
        let mut buf = Vec::new();
        request.encode(&mut buf, 65).unwrap();

        let decoded = GetBlockHeaders::decode(&buf, 65).unwrap();
        assert_eq!(decoded.id, 0);
        assert_eq!(decoded.startblock, HashOrNumber::Number(100));
        assert_eq!(decoded.skip, 2);
    }

    #[test]
    fn block_headers_roundtrip() {
        let headers = vec![BlockHeader::default()];
        let response = BlockHeaders::new(33, headers.clone());
        let mut buf = Vec::new();
        response.encode(&mut buf, 68).unwrap();

        let decoded = BlockHeaders::decode(&buf, 68).unwrap();
        assert_eq!(decoded.id, 33);
        assert_eq!(decoded.block_headers, headers);
    }

    #[test]
    fn get_block_bodies_roundtrip() {
        let block_hashes = vec![
            BlockHash::from([0; 32]),
            BlockHash::from([1; 32]),
            BlockHash::from([2; 32]),
        ];
        let request = GetBlockBodies::new(1, block_hashes.clone());
        let mut buf = Vec::new();
        request.encode(&mut buf, 68).unwrap();

        let decoded = GetBlockBodies::decode(&buf, 68).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.block_hashes, block_hashes);
    }

    #[test]
    fn block_bodies_empty_roundtrip() {
        let response = BlockBodies::new(1, vec![]);
        let mut buf = Vec::new();
        response.encode(&mut buf, 68).unwrap();

        let decoded = BlockBodies::decode(&buf, 68).unwrap();
        assert_eq!(decoded.id, 1);
        assert!(decoded.block_bodies.is_empty());
    }

    #[test]
    fn new_block_hashes_roundtrip() {
        let announce = NewBlockHashes::new(vec![BlockHashAndNumber {
            hash: BlockHash::repeat_byte(0x01),
            number: 42,
        }]);
        let mut buf = Vec::new();
        announce.encode(&mut buf, 68).unwrap();

        let decoded = NewBlockHashes::decode(&buf, 68).unwrap();
        assert_eq!(decoded.block_hashes.len(), 1);
        assert_eq!(decoded.block_hashes[0].number, 42);
    }
}
