use arclight_rlp::{
    decode::{decode_bytes, RLPDecode},
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use bytes::{BufMut, Bytes};
use ethereum_types::{Address, Bloom, H256};
use sha3::{Digest as _, Keccak256};

use super::TxType;

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

impl RLPEncode for Log {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.address)
            .encode_field(&self.topics)
            .encode_field(&self.data)
            .finish();
    }
}

impl RLPDecode for Log {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (address, decoder) = decoder.decode_field("address")?;
        let (topics, decoder) = decoder.decode_field("topics")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let remaining = decoder.finish()?;
        let log = Log {
            address,
            topics,
            data,
        };
        Ok((log, remaining))
    }
}

/// A transaction receipt. Typed receipts follow the same EIP-2718 envelope
/// rules as transactions: wrapped as byte strings inside containing lists.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Receipt {
    pub tx_type: TxType,
    pub succeeded: bool,
    pub cumulative_gas_used: u64,
    pub bloom: Bloom,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn new(tx_type: TxType, succeeded: bool, cumulative_gas_used: u64, logs: Vec<Log>) -> Self {
        Self {
            tx_type,
            succeeded,
            cumulative_gas_used,
            bloom: bloom_from_logs(&logs),
            logs,
        }
    }

    fn encode_payload(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.succeeded)
            .encode_field(&self.cumulative_gas_used)
            .encode_field(&self.bloom)
            .encode_field(&self.logs)
            .finish();
    }

    fn decode_payload(rlp: &[u8], tx_type: TxType) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (succeeded, decoder) = decoder.decode_field("succeeded")?;
        let (cumulative_gas_used, decoder) = decoder.decode_field("cumulative_gas_used")?;
        let (bloom, decoder) = decoder.decode_field("bloom")?;
        let (logs, decoder) = decoder.decode_field("logs")?;
        let remaining = decoder.finish()?;
        let receipt = Receipt {
            tx_type,
            succeeded,
            cumulative_gas_used,
            bloom,
            logs,
        };
        Ok((receipt, remaining))
    }
}

fn bloom_from_logs(logs: &[Log]) -> Bloom {
    let mut bloom = Bloom::zero();
    for log in logs {
        bloom_add(&mut bloom, log.address.as_bytes());
        for topic in &log.topics {
            bloom_add(&mut bloom, topic.as_bytes());
        }
    }
    bloom
}

// Sets the three bits selected by the first three 11-bit big-endian chunks
// of keccak256(value).
fn bloom_add(bloom: &mut Bloom, value: &[u8]) {
    let hash = Keccak256::digest(value);
    for pair in hash.chunks_exact(2).take(3) {
        let bit = (usize::from(pair[0]) << 8 | usize::from(pair[1])) & 0x7FF;
        bloom.0[256 - 1 - bit / 8] |= 1 << (bit % 8);
    }
}

impl RLPEncode for Receipt {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self.tx_type {
            TxType::Legacy => self.encode_payload(buf),
            typed => {
                let mut payload = vec![typed as u8];
                self.encode_payload(&mut payload);
                payload.as_slice().encode(buf);
            }
        }
    }
}

impl RLPDecode for Receipt {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first_byte = *rlp.first().ok_or(RLPDecodeError::InvalidLength)?;
        if first_byte >= 0xc0 {
            return Self::decode_payload(rlp, TxType::Legacy);
        }
        let (envelope, rest) = decode_bytes(rlp)?;
        let type_byte = *envelope.first().ok_or(RLPDecodeError::InvalidLength)?;
        let tx_type = TxType::from_byte(type_byte).ok_or_else(|| {
            RLPDecodeError::Custom(format!("unknown receipt type: {type_byte}"))
        })?;
        let (receipt, remaining) = Self::decode_payload(&envelope[1..], tx_type)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok((receipt, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_receipt_roundtrip() {
        let receipt = Receipt::new(TxType::Legacy, true, 21_000, vec![]);
        let encoded = receipt.encode_to_vec();
        assert_eq!(Receipt::decode(&encoded).unwrap(), receipt);
    }

    #[test]
    fn typed_receipt_roundtrip() {
        let log = Log {
            address: Address::repeat_byte(0x01),
            topics: vec![H256::repeat_byte(0x02)],
            data: Bytes::from_static(&[1, 2, 3]),
        };
        let receipt = Receipt::new(TxType::EIP1559, false, 100_000, vec![log]);
        let encoded = receipt.encode_to_vec();
        assert_eq!(Receipt::decode(&encoded).unwrap(), receipt);
    }

    #[test]
    fn receipt_bloom_covers_address_and_topics() {
        let log = Log {
            address: Address::repeat_byte(0x01),
            topics: vec![H256::repeat_byte(0x02)],
            data: Bytes::new(),
        };
        let receipt = Receipt::new(TxType::Legacy, true, 1, vec![log]);
        assert_ne!(receipt.bloom, Bloom::zero());
    }

    #[test]
    fn receipts_roundtrip_inside_nested_lists() {
        let receipts = vec![
            vec![Receipt::new(TxType::Legacy, true, 100, vec![])],
            vec![],
            vec![
                Receipt::new(TxType::EIP1559, true, 500, vec![]),
                Receipt::new(TxType::EIP4844, true, 1000, vec![]),
            ],
        ];
        let encoded = receipts.encode_to_vec();
        assert_eq!(Vec::<Vec<Receipt>>::decode(&encoded).unwrap(), receipts);
    }
}
