use arclight_core::types::{BlockHash, Receipt};
use arclight_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use bytes::BufMut;

use crate::rlpx::capabilities::MIN_ETH_REQUEST_VERSION;
use crate::rlpx::message::RLPxMessage;

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getreceipts-0x0f
#[derive(Clone, Debug)]
pub struct GetReceipts {
    pub id: u64,
    pub block_hashes: Vec<BlockHash>,
}

impl GetReceipts {
    pub fn new(id: u64, block_hashes: Vec<BlockHash>) -> Self {
        Self { block_hashes, id }
    }
}

impl RLPxMessage for GetReceipts {
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

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#receipts-0x10
#[derive(Clone, Debug)]
pub struct Receipts {
    pub id: u64,
    pub receipts: Vec<Vec<Receipt>>,
}

impl Receipts {
    pub fn new(id: u64, receipts: Vec<Vec<Receipt>>) -> Self {
        Self { receipts, id }
    }
}

impl RLPxMessage for Receipts {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            Encoder::new(buf)
                .encode_field(&self.id)
                .encode_field(&self.receipts)
                .finish();
        } else {
            self.receipts.encode(buf);
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            let decoder = Decoder::new(msg_data)?;
            let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
            let (receipts, _): (Vec<Vec<Receipt>>, _) = decoder.decode_field("receipts")?;
            Ok(Self::new(id, receipts))
        } else {
            let receipts = Vec::<Vec<Receipt>>::decode(msg_data)?;
            Ok(Self::new(0, receipts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arclight_core::types::TxType;

    #[test]
    fn get_receipts_roundtrip() {
        let block_hashes = vec![
            BlockHash::from([0; 32]),
            BlockHash::from([1; 32]),
            BlockHash::from([2; 32]),
        ];
        let request = GetReceipts::new(1, block_hashes.clone());
        let mut buf = Vec::new();
        request.encode(&mut buf, 68).unwrap();

        let decoded = GetReceipts::decode(&buf, 68).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.block_hashes, block_hashes);
    }

    #[test]
    fn receipts_empty_roundtrip() {
        let response = Receipts::new(1, vec![]);
        let mut buf = Vec::new();
        response.encode(&mut buf, 68).unwrap();

        let decoded = Receipts::decode(&buf, 68).unwrap();
        assert_eq!(decoded.id, 1);
        assert!(decoded.receipts.is_empty());
    }

    #[test]
    fn receipts_grouped_by_block_roundtrip() {
        let receipts = vec![
            vec![
                Receipt::new(TxType::Legacy, true, 100, vec![]),
                Receipt::new(TxType::EIP1559, true, 500, vec![]),
            ],
            vec![],
            vec![Receipt::new(TxType::Legacy, true, 1000, vec![])],
        ];
        let response = Receipts::new(9, receipts.clone());
        let mut buf = Vec::new();
        response.encode(&mut buf, 68).unwrap();

        let decoded = Receipts::decode(&buf, 68).unwrap();
        assert_eq!(decoded.id, 9);
        assert_eq!(decoded.receipts, receipts);
    }
}
