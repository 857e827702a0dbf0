use arclight_core::{
    types::{P2PTransaction, Transaction},
    H256,
};
use arclight_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use bytes::{BufMut, Bytes};

use crate::rlpx::capabilities::MIN_ETH_REQUEST_VERSION;
use crate::rlpx::message::RLPxMessage;

/// Limit taken from go-ethereum's transaction fetcher.
pub const TRANSACTION_LIMIT: usize = 256;

/// The typed announce format was introduced at this ETH version.
pub const TYPED_TX_HASH_ANNOUNCE_VERSION: u8 = 68;

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#transactions-0x02
// Broadcast message. Blob transactions are never announced in full here;
// they travel only in POOLED_TRANSACTIONS responses, in wrapper form.
#[derive(Clone, Debug)]
pub struct Transactions {
    pub transactions: Vec<Transaction>,
}

impl Transactions {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }
}

impl RLPxMessage for Transactions {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        let mut encoder = Encoder::new(buf);
        for tx in &self.transactions {
            encoder = encoder.encode_field(tx);
        }
        encoder.finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let mut decoder = Decoder::new(msg_data)?;
        let mut transactions: Vec<Transaction> = vec![];
        // Decoded one by one instead of through the Vec<T> blanket impl,
        // since a legacy transaction is itself a list.
        while !decoder.is_done() && transactions.len() < TRANSACTION_LIMIT {
            let (tx, updated_decoder) = decoder.decode_field::<Transaction>("p2p transaction")?;
            decoder = updated_decoder;
            transactions.push(tx);
        }
        Ok(Self::new(transactions))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#newpooledtransactionhashes-0x08
// Broadcast message. Before eth/68 the payload is a flat list of hashes;
// from eth/68 on it is `[types: B, sizes: [P, ...], hashes: [B_32, ...]]`
// with all three running in parallel.
#[derive(Clone, Debug)]
pub struct NewPooledTransactionHashes {
    pub transaction_types: Bytes,
    pub transaction_sizes: Vec<u64>,
    pub transaction_hashes: Vec<H256>,
}

impl NewPooledTransactionHashes {
    pub fn new(transactions: &[Transaction]) -> Self {
        let transactions_len = transactions.len();
        let mut transaction_types = Vec::with_capacity(transactions_len);
        let mut transaction_sizes = Vec::with_capacity(transactions_len);
        let mut transaction_hashes = Vec::with_capacity(transactions_len);
        for transaction in transactions {
            transaction_types.push(transaction.tx_type() as u8);
            transaction_sizes.push(transaction.size() as u64);
            transaction_hashes.push(transaction.compute_hash());
        }
        Self {
            transaction_types: transaction_types.into(),
            transaction_sizes,
            transaction_hashes,
        }
    }
}

impl RLPxMessage for NewPooledTransactionHashes {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        if version >= TYPED_TX_HASH_ANNOUNCE_VERSION {
            Encoder::new(buf)
                .encode_field(&self.transaction_types)
                .encode_field(&self.transaction_sizes)
                .encode_field(&self.transaction_hashes)
                .finish();
        } else {
            self.transaction_hashes.encode(buf);
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        if version >= TYPED_TX_HASH_ANNOUNCE_VERSION {
            let decoder = Decoder::new(msg_data)?;
            let (transaction_types, decoder): (Bytes, _) =
                decoder.decode_field("transactionTypes")?;
            let (transaction_sizes, decoder): (Vec<u64>, _) =
                decoder.decode_field("transactionSizes")?;
            let (transaction_hashes, _): (Vec<H256>, _) =
                decoder.decode_field("transactionHashes")?;

            if transaction_hashes.len() != transaction_sizes.len()
                || transaction_sizes.len() != transaction_types.len()
            {
                return Err(RLPDecodeError::Custom(
                    "transaction types, sizes and hashes must have the same length".to_string(),
                ));
            }
            Ok(Self {
                transaction_types,
                transaction_sizes,
                transaction_hashes,
            })
        } else {
            let transaction_hashes = Vec::<H256>::decode(msg_data)?;
            Ok(Self {
                transaction_types: Bytes::new(),
                transaction_sizes: vec![],
                transaction_hashes,
            })
        }
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getpooledtransactions-0x09
#[derive(Clone, Debug)]
pub struct GetPooledTransactions {
    pub id: u64,
    pub transaction_hashes: Vec<H256>,
}

impl GetPooledTransactions {
    pub fn new(id: u64, transaction_hashes: Vec<H256>) -> Self {
        Self {
            transaction_hashes,
            id,
        }
    }
}

impl RLPxMessage for GetPooledTransactions {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            Encoder::new(buf)
                .encode_field(&self.id)
                .encode_field(&self.transaction_hashes)
                .finish();
        } else {
            self.transaction_hashes.encode(buf);
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            let decoder = Decoder::new(msg_data)?;
            let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
            let (transaction_hashes, _): (Vec<H256>, _) =
                decoder.decode_field("transactionHashes")?;
            Ok(Self::new(id, transaction_hashes))
        } else {
            let transaction_hashes = Vec::<H256>::decode(msg_data)?;
            Ok(Self::new(0, transaction_hashes))
        }
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#pooledtransactions-0x0a
#[derive(Clone, Debug)]
pub struct PooledTransactions {
    pub id: u64,
    pub pooled_transactions: Vec<P2PTransaction>,
}

impl PooledTransactions {
    pub fn new(id: u64, pooled_transactions: Vec<P2PTransaction>) -> Self {
        Self {
            pooled_transactions,
            id,
        }
    }
}

impl RLPxMessage for PooledTransactions {
    fn encode(&self, buf: &mut dyn BufMut, version: u8) -> Result<(), RLPEncodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            Encoder::new(buf)
                .encode_field(&self.id)
                .encode_field(&self.pooled_transactions)
                .finish();
        } else {
            self.pooled_transactions.encode(buf);
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], version: u8) -> Result<Self, RLPDecodeError> {
        if version >= MIN_ETH_REQUEST_VERSION {
            let decoder = Decoder::new(msg_data)?;
            let (id, decoder): (u64, _) = decoder.decode_field("request-id")?;
            let (pooled_transactions, _): (Vec<P2PTransaction>, _) =
                decoder.decode_field("pooledTransactions")?;
            Ok(Self::new(id, pooled_transactions))
        } else {
            let pooled_transactions = Vec::<P2PTransaction>::decode(msg_data)?;
            Ok(Self::new(0, pooled_transactions))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arclight_core::types::{EIP1559Transaction, LegacyTransaction};

    #[test]
    fn transactions_roundtrip() {
        let announce = Transactions::new(vec![
            Transaction::LegacyTransaction(LegacyTransaction::default()),
            Transaction::EIP1559Transaction(EIP1559Transaction {
                chain_id: 1,
                nonce: 3,
                ..Default::default()
            }),
        ]);
        let mut buf = Vec::new();
        announce.encode(&mut buf, 68).unwrap();

        let decoded = Transactions::decode(&buf, 68).unwrap();
        assert_eq!(decoded.transactions, announce.transactions);
    }

    #[test]
    fn new_pooled_tx_hashes_eth68_roundtrip() {
        let txs = vec![Transaction::LegacyTransaction(LegacyTransaction::default())];
        let announce = NewPooledTransactionHashes::new(&txs);
        let mut buf = Vec::new();
        announce.encode(&mut buf, 68).unwrap();

        let decoded = NewPooledTransactionHashes::decode(&buf, 68).unwrap();
        assert_eq!(decoded.transaction_types.len(), 1);
        assert_eq!(decoded.transaction_sizes, announce.transaction_sizes);
        assert_eq!(decoded.transaction_hashes, announce.transaction_hashes);
    }

    #[test]
    fn new_pooled_tx_hashes_eth67_is_a_flat_list() {
        let txs = vec![Transaction::LegacyTransaction(LegacyTransaction::default())];
        let announce = NewPooledTransactionHashes::new(&txs);
        let mut buf = Vec::new();
        announce.encode(&mut buf, 67).unwrap();

        // the payload is exactly the rlp of the hash list
        assert_eq!(buf, announce.transaction_hashes.encode_to_vec());

        let decoded = NewPooledTransactionHashes::decode(&buf, 67).unwrap();
        assert_eq!(decoded.transaction_hashes, announce.transaction_hashes);
        assert!(decoded.transaction_types.is_empty());
    }

    #[test]
    fn new_pooled_tx_hashes_eth68_rejects_length_mismatch() {
        let announce = NewPooledTransactionHashes {
            transaction_types: vec![0x02].into(),
            transaction_sizes: vec![100, 200],
            transaction_hashes: vec![H256::repeat_byte(1)],
        };
        let mut buf = Vec::new();
        announce.encode(&mut buf, 68).unwrap();
        assert!(NewPooledTransactionHashes::decode(&buf, 68).is_err());
    }

    #[test]
    fn get_pooled_transactions_roundtrip() {
        let hashes = vec![
            H256::from_low_u64_be(1),
            H256::from_low_u64_be(2),
            H256::from_low_u64_be(3),
        ];
        let request = GetPooledTransactions::new(1, hashes.clone());
        let mut buf = Vec::new();
        request.encode(&mut buf, 68).unwrap();

        let decoded = GetPooledTransactions::decode(&buf, 68).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.transaction_hashes, hashes);
    }

    #[test]
    fn pooled_transactions_roundtrip() {
        let transaction1 = P2PTransaction::LegacyTransaction(Default::default());
        let response = PooledTransactions::new(1, vec![transaction1.clone()]);
        let mut buf = Vec::new();
        response.encode(&mut buf, 68).unwrap();

        let decoded = PooledTransactions::decode(&buf, 68).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.pooled_transactions, vec![transaction1]);
    }
}
