use arclight_core::{
    types::{AccountState, EMPTY_KECCACK_HASH, EMPTY_TRIE_HASH},
    H256, U256,
};
use arclight_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use bytes::{BufMut, Bytes};

use super::message::RLPxMessage;

/// The "slim" account body exchanged in ACCOUNT_RANGE: the empty storage
/// root and the empty code hash are encoded as empty strings.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AccountStateSlim {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: Bytes,
    pub code_hash: Bytes,
}

impl AccountStateSlim {
    /// Expands to the full account form, restoring the implicit empty
    /// hashes.
    pub fn into_full(self) -> AccountState {
        let storage_root = if self.storage_root.is_empty() {
            *EMPTY_TRIE_HASH
        } else {
            H256::from_slice(&self.storage_root)
        };
        let code_hash = if self.code_hash.is_empty() {
            *EMPTY_KECCACK_HASH
        } else {
            H256::from_slice(&self.code_hash)
        };
        AccountState {
            nonce: self.nonce,
            balance: self.balance,
            storage_root,
            code_hash,
        }
    }
}

impl From<AccountState> for AccountStateSlim {
    fn from(state: AccountState) -> Self {
        let storage_root = if state.storage_root == *EMPTY_TRIE_HASH {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(state.storage_root.as_bytes())
        };
        let code_hash = if state.code_hash == *EMPTY_KECCACK_HASH {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(state.code_hash.as_bytes())
        };
        Self {
            nonce: state.nonce,
            balance: state.balance,
            storage_root,
            code_hash,
        }
    }
}

impl From<AccountStateSlim> for AccountState {
    fn from(slim: AccountStateSlim) -> Self {
        slim.into_full()
    }
}

impl RLPEncode for AccountStateSlim {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.balance)
            .encode_field(&self.storage_root)
            .encode_field(&self.code_hash)
            .finish();
    }
}

impl RLPDecode for AccountStateSlim {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (balance, decoder) = decoder.decode_field("balance")?;
        let (storage_root, decoder): (Bytes, _) = decoder.decode_field("storage_root")?;
        let (code_hash, decoder): (Bytes, _) = decoder.decode_field("code_hash")?;
        let remaining = decoder.finish()?;
        let state = Self {
            nonce,
            balance,
            storage_root,
            code_hash,
        };
        Ok((state, remaining))
    }
}

/// One `(hash, body)` entry of an ACCOUNT_RANGE response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountRangeUnit {
    pub hash: H256,
    pub account: AccountStateSlim,
}

impl RLPEncode for AccountRangeUnit {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.hash)
            .encode_field(&self.account)
            .finish();
    }
}

impl RLPDecode for AccountRangeUnit {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (hash, decoder) = decoder.decode_field("hash")?;
        let (account, decoder) = decoder.decode_field("account")?;
        let remaining = decoder.finish()?;
        Ok((Self { hash, account }, remaining))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageSlot {
    pub hash: H256,
    pub data: U256,
}

impl RLPEncode for StorageSlot {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.hash)
            .encode_field(&self.data)
            .finish();
    }
}

impl RLPDecode for StorageSlot {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (hash, decoder) = decoder.decode_field("hash")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let remaining = decoder.finish()?;
        Ok((Self { hash, data }, remaining))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/snap.md#getaccountrange-0x00
#[derive(Clone, Debug)]
pub struct GetAccountRange {
    pub id: u64,
    pub root_hash: H256,
    pub starting_hash: H256,
    pub limit_hash: H256,
    pub response_bytes: u64,
}

impl RLPxMessage for GetAccountRange {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.id)
            .encode_field(&self.root_hash)
            .encode_field(&self.starting_hash)
            .encode_field(&self.limit_hash)
            .encode_field(&self.response_bytes)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (root_hash, decoder) = decoder.decode_field("rootHash")?;
        let (starting_hash, decoder) = decoder.decode_field("startingHash")?;
        let (limit_hash, decoder) = decoder.decode_field("limitHash")?;
        let (response_bytes, _): (u64, _) = decoder.decode_field("responseBytes")?;
        Ok(Self {
            id,
            root_hash,
            starting_hash,
            limit_hash,
            response_bytes,
        })
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/snap.md#accountrange-0x01
#[derive(Clone, Debug)]
pub struct AccountRange {
    pub id: u64,
    pub accounts: Vec<AccountRangeUnit>,
    pub proof: Vec<Bytes>,
}

impl RLPxMessage for AccountRange {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.id)
            .encode_field(&self.accounts)
            .encode_field(&self.proof)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (accounts, decoder) = decoder.decode_field("accounts")?;
        let (proof, decoder) = decoder.decode_field("proof")?;
        decoder.finish()?;
        Ok(Self {
            id,
            accounts,
            proof,
        })
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/snap.md#getstorageranges-0x02
#[derive(Clone, Debug)]
pub struct GetStorageRanges {
    pub id: u64,
    pub root_hash: H256,
    pub account_hashes: Vec<H256>,
    pub starting_hash: H256,
    pub limit_hash: H256,
    pub response_bytes: u64,
}

impl RLPxMessage for GetStorageRanges {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.id)
            .encode_field(&self.root_hash)
            .encode_field(&self.account_hashes)
            .encode_field(&self.starting_hash)
            .encode_field(&self.limit_hash)
            .encode_field(&self.response_bytes)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (root_hash, decoder) = decoder.decode_field("rootHash")?;
        let (account_hashes, decoder) = decoder.decode_field("accountHashes")?;
        let (starting_hash, decoder) = decoder.decode_field("startingHash")?;
        let (limit_hash, decoder) = decoder.decode_field("limitHash")?;
        let (response_bytes, _): (u64, _) = decoder.decode_field("responseBytes")?;
        Ok(Self {
            id,
            root_hash,
            account_hashes,
            starting_hash,
            limit_hash,
            response_bytes,
        })
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/snap.md#storageranges-0x03
#[derive(Clone, Debug)]
pub struct StorageRanges {
    pub id: u64,
    pub slots: Vec<Vec<StorageSlot>>,
    pub proof: Vec<Bytes>,
}

impl RLPxMessage for StorageRanges {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.id)
            .encode_field(&self.slots)
            .encode_field(&self.proof)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (slots, decoder) = decoder.decode_field("slots")?;
        let (proof, _) = decoder.decode_field("proof")?;
        Ok(Self { id, slots, proof })
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/snap.md#getbytecodes-0x04
#[derive(Clone, Debug)]
pub struct GetByteCodes {
    pub id: u64,
    pub hashes: Vec<H256>,
    pub bytes: u64,
}

impl RLPxMessage for GetByteCodes {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.id)
            .encode_field(&self.hashes)
            .encode_field(&self.bytes)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (hashes, decoder) = decoder.decode_field("hashes")?;
        let (bytes, _): (u64, _) = decoder.decode_field("bytes")?;
        Ok(Self { id, hashes, bytes })
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/snap.md#bytecodes-0x05
#[derive(Clone, Debug)]
pub struct ByteCodes {
    pub id: u64,
    pub codes: Vec<Bytes>,
}

impl RLPxMessage for ByteCodes {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.id)
            .encode_field(&self.codes)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (codes, _) = decoder.decode_field("codes")?;
        Ok(Self { id, codes })
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/snap.md#gettrienodes-0x06
#[derive(Clone, Debug)]
pub struct GetTrieNodes {
    pub id: u64,
    pub root_hash: H256,
    /// Trie paths to fetch: the first element of each group addresses the
    /// account, the rest its storage nodes.
    pub paths: Vec<Vec<Bytes>>,
    pub bytes: u64,
}

impl RLPxMessage for GetTrieNodes {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.id)
            .encode_field(&self.root_hash)
            .encode_field(&self.paths)
            .encode_field(&self.bytes)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (root_hash, decoder) = decoder.decode_field("rootHash")?;
        let (paths, decoder) = decoder.decode_field("paths")?;
        let (bytes, _): (u64, _) = decoder.decode_field("bytes")?;
        Ok(Self {
            id,
            root_hash,
            paths,
            bytes,
        })
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/snap.md#trienodes-0x07
#[derive(Clone, Debug)]
pub struct TrieNodes {
    pub id: u64,
    pub nodes: Vec<Bytes>,
}

impl RLPxMessage for TrieNodes {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.id)
            .encode_field(&self.nodes)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
        let (nodes, _) = decoder.decode_field("nodes")?;
        Ok(Self { id, nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slim_account_omits_empty_fields() {
        let state = AccountState::default();
        let slim = AccountStateSlim::from(state.clone());
        assert!(slim.storage_root.is_empty());
        assert!(slim.code_hash.is_empty());
        assert_eq!(slim.into_full(), state);
    }

    #[test]
    fn slim_account_keeps_non_empty_fields() {
        let state = AccountState {
            nonce: 1,
            balance: U256::from(2u64),
            storage_root: H256::repeat_byte(0x11),
            code_hash: H256::repeat_byte(0x22),
        };
        let slim = AccountStateSlim::from(state.clone());
        assert_eq!(slim.storage_root.len(), 32);
        let encoded = slim.encode_to_vec();
        let decoded = AccountStateSlim::decode(&encoded).unwrap();
        assert_eq!(decoded.into_full(), state);
    }

    #[test]
    fn get_account_range_roundtrip() {
        let request = GetAccountRange {
            id: 1,
            root_hash: H256::repeat_byte(1),
            starting_hash: H256::zero(),
            limit_hash: H256::repeat_byte(0xff),
            response_bytes: 1024,
        };
        let mut buf = vec![];
        request.encode(&mut buf, 1).unwrap();
        let decoded = GetAccountRange::decode(&buf, 1).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.root_hash, H256::repeat_byte(1));
        assert_eq!(decoded.response_bytes, 1024);
    }

    #[test]
    fn account_range_roundtrip() {
        let response = AccountRange {
            id: 2,
            accounts: vec![AccountRangeUnit {
                hash: H256::repeat_byte(0x42),
                account: AccountStateSlim::from(AccountState::default()),
            }],
            proof: vec![Bytes::from_static(&[1, 2, 3])],
        };
        let mut buf = vec![];
        response.encode(&mut buf, 1).unwrap();
        let decoded = AccountRange::decode(&buf, 1).unwrap();
        assert_eq!(decoded.id, 2);
        assert_eq!(decoded.accounts, response.accounts);
        assert_eq!(decoded.proof, response.proof);
    }

    #[test]
    fn storage_ranges_roundtrip() {
        let response = StorageRanges {
            id: 3,
            slots: vec![vec![StorageSlot {
                hash: H256::repeat_byte(5),
                data: U256::from(7u64),
            }]],
            proof: vec![],
        };
        let mut buf = vec![];
        response.encode(&mut buf, 1).unwrap();
        let decoded = StorageRanges::decode(&buf, 1).unwrap();
        assert_eq!(decoded.slots, response.slots);
    }

    #[test]
    fn byte_codes_roundtrip() {
        let request = GetByteCodes {
            id: 4,
            hashes: vec![H256::repeat_byte(9)],
            bytes: 2048,
        };
        let mut buf = vec![];
        request.encode(&mut buf, 1).unwrap();
        let decoded = GetByteCodes::decode(&buf, 1).unwrap();
        assert_eq!(decoded.hashes, request.hashes);

        let response = ByteCodes {
            id: 4,
            codes: vec![Bytes::from_static(b"\x60\x80")],
        };
        let mut buf = vec![];
        response.encode(&mut buf, 1).unwrap();
        let decoded = ByteCodes::decode(&buf, 1).unwrap();
        assert_eq!(decoded.codes, response.codes);
    }

    #[test]
    fn trie_nodes_roundtrip() {
        let request = GetTrieNodes {
            id: 5,
            root_hash: H256::repeat_byte(1),
            paths: vec![vec![Bytes::from_static(&[0x00]), Bytes::from_static(&[0x01])]],
            bytes: 1000,
        };
        let mut buf = vec![];
        request.encode(&mut buf, 1).unwrap();
        let decoded = GetTrieNodes::decode(&buf, 1).unwrap();
        assert_eq!(decoded.paths, request.paths);
    }
}
