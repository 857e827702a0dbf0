use arclight_core::{
    types::{BlockHash, ForkId},
    U256,
};
use arclight_rlp::{
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use bytes::BufMut;

use crate::rlpx::message::RLPxMessage;

/// Fork ids are exchanged from this ETH version on.
pub const MIN_FORK_ID_VERSION: u8 = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub eth_version: u8,
    pub network_id: u64,
    pub total_difficulty: U256,
    pub block_hash: BlockHash,
    pub genesis: BlockHash,
    /// Present from eth/64 on.
    pub fork_id: Option<ForkId>,
}

impl StatusMessage {
    pub fn new(
        eth_version: u8,
        network_id: u64,
        total_difficulty: U256,
        block_hash: BlockHash,
        genesis: BlockHash,
        fork_id: Option<ForkId>,
    ) -> Self {
        Self {
            eth_version,
            network_id,
            total_difficulty,
            block_hash,
            genesis,
            fork_id,
        }
    }
}

impl RLPxMessage for StatusMessage {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        let encoder = Encoder::new(buf)
            .encode_field(&self.eth_version)
            .encode_field(&self.network_id)
            .encode_field(&self.total_difficulty)
            .encode_field(&self.block_hash)
            .encode_field(&self.genesis);
        if self.eth_version >= MIN_FORK_ID_VERSION {
            let fork_id = self.fork_id.as_ref().ok_or_else(|| {
                RLPEncodeError::Custom("fork id is mandatory from eth/64 on".to_string())
            })?;
            encoder.encode_field(fork_id).finish();
        } else {
            encoder.finish();
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (eth_version, decoder): (u8, _) = decoder.decode_field("protocolVersion")?;
        let (network_id, decoder): (u64, _) = decoder.decode_field("networkId")?;
        let (total_difficulty, decoder): (U256, _) = decoder.decode_field("totalDifficulty")?;
        let (block_hash, decoder): (BlockHash, _) = decoder.decode_field("blockHash")?;
        let (genesis, decoder): (BlockHash, _) = decoder.decode_field("genesis")?;
        let (fork_id, decoder) = if eth_version >= MIN_FORK_ID_VERSION {
            let (fork_id, decoder): (ForkId, _) = decoder.decode_field("forkId")?;
            (Some(fork_id), decoder)
        } else {
            (None, decoder)
        };
        // implementations must ignore any additional list elements
        let _padding = decoder.finish_unchecked();

        Ok(Self {
            eth_version,
            network_id,
            total_difficulty,
            block_hash,
            genesis,
            fork_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arclight_core::H32;

    fn sample(eth_version: u8, fork_id: Option<ForkId>) -> StatusMessage {
        StatusMessage::new(
            eth_version,
            1,
            U256::from(17_179_869_184u64),
            BlockHash::repeat_byte(0xbe),
            BlockHash::repeat_byte(0x44),
            fork_id,
        )
    }

    #[test]
    fn status_roundtrip_eth68() {
        let status = sample(
            68,
            Some(ForkId {
                fork_hash: H32::from_low_u64_be(0xdce96c2d),
                fork_next: 0,
            }),
        );
        let mut buf = vec![];
        status.encode(&mut buf, 68).unwrap();
        assert_eq!(StatusMessage::decode(&buf, 68).unwrap(), status);
    }

    #[test]
    fn status_roundtrip_eth63_has_no_fork_id() {
        let status = sample(63, None);
        let mut buf = vec![];
        status.encode(&mut buf, 63).unwrap();
        assert_eq!(StatusMessage::decode(&buf, 63).unwrap(), status);
    }

    #[test]
    fn status_encode_eth68_requires_fork_id() {
        let status = sample(68, None);
        let mut buf = vec![];
        assert!(status.encode(&mut buf, 68).is_err());
    }
}
