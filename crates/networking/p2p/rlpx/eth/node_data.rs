use arclight_core::H256;
use arclight_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use bytes::{BufMut, Bytes};

use crate::rlpx::capabilities::MIN_ETH_REQUEST_VERSION;
use crate::rlpx::message::RLPxMessage;

/// GET_NODE_DATA / NODE_DATA exist only in this version window.
pub const NODE_DATA_VERSIONS: std::ops::RangeInclusive<u8> = 63..=66;

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getnodedata-0x0d
#[derive(Clone, Debug)]
pub struct GetNodeData {
    pub id: u64,
    pub hashes: Vec<H256>,
}

impl GetNodeData {
    pub fn new(id: u64, hashes: Vec<H256>) -> Self {
        Self { hashes, id }
    }
}

impl RLPxMessage for GetNodeData {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            Encoder::new(buf)
                .encode_field(&self.id)
                .encode_field(&self.hashes)
                .finish();
        } else {
            self.hashes.encode(buf);
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            let decoder = Decoder::new(msg_data)?;
            let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
            let (hashes, _): (Vec<H256>, _) = decoder.decode_field("hashes")?;
            Ok(Self::new(id, hashes))
        } else {
            let hashes = Vec::<H256>::decode(msg_data)?;
            Ok(Self::new(0, hashes))
        }
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#nodedata-0x0e
#[derive(Clone, Debug)]
pub struct NodeData {
    pub id: u64,
    pub nodes: Vec<Bytes>,
}

impl NodeData {
    pub fn new(id: u64, nodes: Vec<Bytes>) -> Self {
        Self { nodes, id }
    }
}

impl RLPxMessage for NodeData {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            Encoder::new(buf)
                .encode_field(&self.id)
                .encode_field(&self.nodes)
                .finish();
        } else {
            self.nodes.encode(buf);
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            let decoder = Decoder::new(msg_data)?;
            let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
            let (nodes, _): (Vec<Bytes>, _) = decoder.decode_field("nodes")?;
            Ok(Self::new(id, nodes))
        } else {
            let nodes = Vec::<Bytes>::decode(msg_data)?;
            Ok(Self::new(0, nodes))
        }
    }
}
