use arclight_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use crc32fast::Hasher;
use ethereum_types::H32;

use super::{BlockHash, BlockNumber};

/// EIP-2124 fork identifier: a CRC over the genesis hash and every fork
/// activation passed, plus the next scheduled activation (0 if none).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForkId {
    pub fork_hash: H32,
    pub fork_next: BlockNumber,
}

impl ForkId {
    /// Computes the fork id for a head at `head_block_number`/`head_timestamp`
    /// given the chain's block-number-activated and timestamp-activated forks.
    pub fn compute(
        genesis_hash: BlockHash,
        block_number_forks: &[u64],
        timestamp_forks: &[u64],
        head_block_number: u64,
        head_timestamp: u64,
    ) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(genesis_hash.as_bytes());

        let mut fork_next = update_checksum(block_number_forks, &mut hasher, head_block_number);
        if fork_next == 0 {
            fork_next = update_checksum(timestamp_forks, &mut hasher, head_timestamp);
        }

        let fork_hash = H32::from_slice(&hasher.finalize().to_be_bytes());
        Self {
            fork_hash,
            fork_next,
        }
    }
}

fn update_checksum(forks: &[u64], hasher: &mut Hasher, head: u64) -> u64 {
    let mut last_included = 0;
    for &activation in forks {
        if activation <= head {
            if activation != last_included {
                hasher.update(&activation.to_be_bytes());
                last_included = activation;
            }
        } else {
            return activation;
        }
    }
    0
}

impl RLPEncode for ForkId {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.fork_hash)
            .encode_field(&self.fork_next)
            .finish();
    }
}

impl RLPDecode for ForkId {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (fork_hash, decoder) = decoder.decode_field("forkHash")?;
        let (fork_next, decoder) = decoder.decode_field("forkNext")?;
        let remaining = decoder.finish()?;
        let fork_id = ForkId {
            fork_hash,
            fork_next,
        };
        Ok((fork_id, remaining))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use ethereum_types::H256;
    use hex_literal::hex;

    use super::*;

    #[test]
    fn encode_fork_id() {
        let fork = ForkId {
            fork_hash: H32::zero(),
            fork_next: 0,
        };
        assert_eq!(fork.encode_to_vec(), hex!("c6840000000080"));
    }

    #[test]
    fn encode_fork_id_with_next() {
        let fork = ForkId {
            fork_hash: H32::from_str("0xdeadbeef").unwrap(),
            fork_next: u64::from_str_radix("baddcafe", 16).unwrap(),
        };
        assert_eq!(fork.encode_to_vec(), hex!("ca84deadbeef84baddcafe"));
    }

    #[test]
    fn encode_fork_id_max() {
        let fork = ForkId {
            fork_hash: H32::from_low_u64_le(u32::MAX.into()),
            fork_next: u64::MAX,
        };
        assert_eq!(fork.encode_to_vec(), hex!("ce84ffffffff88ffffffffffffffff"));
    }

    #[test]
    fn fork_id_roundtrip() {
        let fork = ForkId {
            fork_hash: H32::from_str("0x12345678").unwrap(),
            fork_next: 42,
        };
        let encoded = fork.encode_to_vec();
        assert_eq!(ForkId::decode(&encoded).unwrap(), fork);
    }

    #[test]
    fn mainnet_genesis_fork_id() {
        // EIP-2124 test vector: mainnet, no forks passed yet.
        let genesis =
            H256::from_str("0xd4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3")
                .unwrap();
        let id = ForkId::compute(genesis, &[1_150_000], &[], 0, 0);
        assert_eq!(id.fork_hash, H32::from_slice(&hex!("fc64ec04")));
        assert_eq!(id.fork_next, 1_150_000);
    }

    #[test]
    fn fork_id_ignores_duplicate_activations() {
        let genesis = H256::repeat_byte(1);
        let a = ForkId::compute(genesis, &[10, 10, 20], &[], 15, 0);
        let b = ForkId::compute(genesis, &[10, 20], &[], 15, 0);
        assert_eq!(a, b);
    }
}
