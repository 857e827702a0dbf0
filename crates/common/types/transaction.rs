use arclight_rlp::{
    constants::RLP_NULL,
    decode::{decode_bytes, RLPDecode},
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use bytes::{BufMut, Bytes};
use ethereum_types::{Address, H256, U256};
use sha3::{Digest as _, Keccak256};

/// The EIP-2718 transaction type byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TxType {
    #[default]
    Legacy = 0x00,
    EIP2930 = 0x01,
    EIP1559 = 0x02,
    EIP4844 = 0x03,
}

impl TxType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Legacy),
            0x01 => Some(Self::EIP2930),
            0x02 => Some(Self::EIP1559),
            0x03 => Some(Self::EIP4844),
            _ => None,
        }
    }
}

/// Recipient of a transaction: a call to an address or a contract creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TxKind {
    Call(Address),
    #[default]
    Create,
}

impl RLPEncode for TxKind {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            Self::Call(address) => address.encode(buf),
            Self::Create => buf.put_u8(RLP_NULL),
        }
    }
}

impl RLPDecode for TxKind {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        match bytes.len() {
            0 => Ok((Self::Create, rest)),
            20 => Ok((Self::Call(Address::from_slice(bytes)), rest)),
            _ => Err(RLPDecodeError::InvalidLength),
        }
    }
}

pub type AccessList = Vec<(Address, Vec<H256>)>;

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u64,
    pub gas: u64,
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EIP2930Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
    pub signature_y_parity: bool,
    pub signature_r: U256,
    pub signature_s: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EIP1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u64,
    pub max_fee_per_gas: u64,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
    pub signature_y_parity: bool,
    pub signature_r: U256,
    pub signature_s: U256,
}

/// Blob transactions always call an address; `to` cannot be empty.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EIP4844Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u64,
    pub max_fee_per_gas: u64,
    pub gas: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
    pub max_fee_per_blob_gas: U256,
    pub blob_versioned_hashes: Vec<H256>,
    pub signature_y_parity: bool,
    pub signature_r: U256,
    pub signature_s: U256,
}

impl RLPEncode for LegacyTransaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.v)
            .encode_field(&self.r)
            .encode_field(&self.s)
            .finish();
    }
}

impl RLPDecode for LegacyTransaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (gas_price, decoder) = decoder.decode_field("gas_price")?;
        let (gas, decoder) = decoder.decode_field("gas")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (v, decoder) = decoder.decode_field("v")?;
        let (r, decoder) = decoder.decode_field("r")?;
        let (s, decoder) = decoder.decode_field("s")?;
        let remaining = decoder.finish()?;
        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas,
            to,
            value,
            data,
            v,
            r,
            s,
        };
        Ok((tx, remaining))
    }
}

impl RLPEncode for EIP2930Transaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.chain_id)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .encode_field(&self.signature_y_parity)
            .encode_field(&self.signature_r)
            .encode_field(&self.signature_s)
            .finish();
    }
}

impl RLPDecode for EIP2930Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (chain_id, decoder) = decoder.decode_field("chain_id")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (gas_price, decoder) = decoder.decode_field("gas_price")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (access_list, decoder) = decoder.decode_field("access_list")?;
        let (signature_y_parity, decoder) = decoder.decode_field("signature_y_parity")?;
        let (signature_r, decoder) = decoder.decode_field("signature_r")?;
        let (signature_s, decoder) = decoder.decode_field("signature_s")?;
        let remaining = decoder.finish()?;
        let tx = EIP2930Transaction {
            chain_id,
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
            access_list,
            signature_y_parity,
            signature_r,
            signature_s,
        };
        Ok((tx, remaining))
    }
}

impl RLPEncode for EIP1559Transaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.chain_id)
            .encode_field(&self.nonce)
            .encode_field(&self.max_priority_fee_per_gas)
            .encode_field(&self.max_fee_per_gas)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .encode_field(&self.signature_y_parity)
            .encode_field(&self.signature_r)
            .encode_field(&self.signature_s)
            .finish();
    }
}

impl RLPDecode for EIP1559Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (chain_id, decoder) = decoder.decode_field("chain_id")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (max_priority_fee_per_gas, decoder) =
            decoder.decode_field("max_priority_fee_per_gas")?;
        let (max_fee_per_gas, decoder) = decoder.decode_field("max_fee_per_gas")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (access_list, decoder) = decoder.decode_field("access_list")?;
        let (signature_y_parity, decoder) = decoder.decode_field("signature_y_parity")?;
        let (signature_r, decoder) = decoder.decode_field("signature_r")?;
        let (signature_s, decoder) = decoder.decode_field("signature_s")?;
        let remaining = decoder.finish()?;
        let tx = EIP1559Transaction {
            chain_id,
            nonce,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit,
            to,
            value,
            data,
            access_list,
            signature_y_parity,
            signature_r,
            signature_s,
        };
        Ok((tx, remaining))
    }
}

impl RLPEncode for EIP4844Transaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.chain_id)
            .encode_field(&self.nonce)
            .encode_field(&self.max_priority_fee_per_gas)
            .encode_field(&self.max_fee_per_gas)
            .encode_field(&self.gas)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .encode_field(&self.max_fee_per_blob_gas)
            .encode_field(&self.blob_versioned_hashes)
            .encode_field(&self.signature_y_parity)
            .encode_field(&self.signature_r)
            .encode_field(&self.signature_s)
            .finish();
    }
}

impl RLPDecode for EIP4844Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (chain_id, decoder) = decoder.decode_field("chain_id")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (max_priority_fee_per_gas, decoder) =
            decoder.decode_field("max_priority_fee_per_gas")?;
        let (max_fee_per_gas, decoder) = decoder.decode_field("max_fee_per_gas")?;
        let (gas, decoder) = decoder.decode_field("gas")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (access_list, decoder) = decoder.decode_field("access_list")?;
        let (max_fee_per_blob_gas, decoder) = decoder.decode_field("max_fee_per_blob_gas")?;
        let (blob_versioned_hashes, decoder) = decoder.decode_field("blob_versioned_hashes")?;
        let (signature_y_parity, decoder) = decoder.decode_field("signature_y_parity")?;
        let (signature_r, decoder) = decoder.decode_field("signature_r")?;
        let (signature_s, decoder) = decoder.decode_field("signature_s")?;
        let remaining = decoder.finish()?;
        let tx = EIP4844Transaction {
            chain_id,
            nonce,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas,
            to,
            value,
            data,
            access_list,
            max_fee_per_blob_gas,
            blob_versioned_hashes,
            signature_y_parity,
            signature_r,
            signature_s,
        };
        Ok((tx, remaining))
    }
}

/// A transaction in canonical (block body) form. Typed transactions are
/// wrapped as opaque byte strings in any containing RLP list, per EIP-2718.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transaction {
    LegacyTransaction(LegacyTransaction),
    EIP2930Transaction(EIP2930Transaction),
    EIP1559Transaction(EIP1559Transaction),
    EIP4844Transaction(EIP4844Transaction),
}

impl Default for Transaction {
    fn default() -> Self {
        Self::LegacyTransaction(LegacyTransaction::default())
    }
}

impl Transaction {
    pub fn tx_type(&self) -> TxType {
        match self {
            Transaction::LegacyTransaction(_) => TxType::Legacy,
            Transaction::EIP2930Transaction(_) => TxType::EIP2930,
            Transaction::EIP1559Transaction(_) => TxType::EIP1559,
            Transaction::EIP4844Transaction(_) => TxType::EIP4844,
        }
    }

    pub fn data(&self) -> &Bytes {
        match self {
            Transaction::LegacyTransaction(tx) => &tx.data,
            Transaction::EIP2930Transaction(tx) => &tx.data,
            Transaction::EIP1559Transaction(tx) => &tx.data,
            Transaction::EIP4844Transaction(tx) => &tx.data,
        }
    }

    /// The canonical encoding used for hashing: the bare list for legacy
    /// transactions, `type || payload` for typed ones (no string wrapping).
    pub fn encode_canonical_to_vec(&self) -> Vec<u8> {
        let mut buf = vec![];
        match self {
            Transaction::LegacyTransaction(tx) => tx.encode(&mut buf),
            Transaction::EIP2930Transaction(tx) => {
                buf.push(TxType::EIP2930 as u8);
                tx.encode(&mut buf);
            }
            Transaction::EIP1559Transaction(tx) => {
                buf.push(TxType::EIP1559 as u8);
                tx.encode(&mut buf);
            }
            Transaction::EIP4844Transaction(tx) => {
                buf.push(TxType::EIP4844 as u8);
                tx.encode(&mut buf);
            }
        }
        buf
    }

    pub fn compute_hash(&self) -> H256 {
        H256::from_slice(Keccak256::digest(self.encode_canonical_to_vec()).as_slice())
    }

    /// The advertised size for NEW_POOLED_TX_HASHES: length of the canonical
    /// encoding.
    pub fn size(&self) -> usize {
        self.encode_canonical_to_vec().len()
    }
}

impl RLPEncode for Transaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            Transaction::LegacyTransaction(tx) => tx.encode(buf),
            typed => typed.encode_canonical_to_vec().as_slice().encode(buf),
        }
    }
}

impl RLPDecode for Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first_byte = *rlp.first().ok_or(RLPDecodeError::InvalidLength)?;
        // legacy transactions are bare lists; typed ones come as byte strings
        if first_byte >= 0xc0 {
            let (tx, rest) = LegacyTransaction::decode_unfinished(rlp)?;
            return Ok((Transaction::LegacyTransaction(tx), rest));
        }
        let (envelope, rest) = decode_bytes(rlp)?;
        let tx = decode_typed_transaction(envelope)?;
        Ok((tx, rest))
    }
}

fn decode_typed_transaction(envelope: &[u8]) -> Result<Transaction, RLPDecodeError> {
    let type_byte = *envelope.first().ok_or(RLPDecodeError::InvalidLength)?;
    let payload = &envelope[1..];
    match TxType::from_byte(type_byte) {
        Some(TxType::EIP2930) => Ok(Transaction::EIP2930Transaction(EIP2930Transaction::decode(
            payload,
        )?)),
        Some(TxType::EIP1559) => Ok(Transaction::EIP1559Transaction(EIP1559Transaction::decode(
            payload,
        )?)),
        Some(TxType::EIP4844) => Ok(Transaction::EIP4844Transaction(EIP4844Transaction::decode(
            payload,
        )?)),
        _ => Err(RLPDecodeError::Custom(format!(
            "unknown transaction type: {type_byte}"
        ))),
    }
}

/// The sidecar data shipped with a blob transaction in its network form.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BlobsBundle {
    pub blobs: Vec<Bytes>,
    pub commitments: Vec<Bytes>,
    pub proofs: Vec<Bytes>,
}

/// A blob transaction in its EIP-4844 "network wrapper" form:
/// `[tx_payload, blobs, commitments, proofs]`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct WrappedEIP4844Transaction {
    pub tx: EIP4844Transaction,
    pub blobs_bundle: BlobsBundle,
}

impl RLPEncode for WrappedEIP4844Transaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.tx)
            .encode_field(&self.blobs_bundle.blobs)
            .encode_field(&self.blobs_bundle.commitments)
            .encode_field(&self.blobs_bundle.proofs)
            .finish();
    }
}

impl RLPDecode for WrappedEIP4844Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (tx, decoder) = decoder.decode_field("tx")?;
        let (blobs, decoder) = decoder.decode_field("blobs")?;
        let (commitments, decoder) = decoder.decode_field("commitments")?;
        let (proofs, decoder) = decoder.decode_field("proofs")?;
        let remaining = decoder.finish()?;
        let wrapped = WrappedEIP4844Transaction {
            tx,
            blobs_bundle: BlobsBundle {
                blobs,
                commitments,
                proofs,
            },
        };
        Ok((wrapped, remaining))
    }
}

/// A transaction as exchanged over the wire in POOLED_TRANSACTIONS: same as
/// the canonical form except that blob transactions carry their sidecar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum P2PTransaction {
    LegacyTransaction(LegacyTransaction),
    EIP2930Transaction(EIP2930Transaction),
    EIP1559Transaction(EIP1559Transaction),
    WrappedEIP4844Transaction(WrappedEIP4844Transaction),
}

impl P2PTransaction {
    pub fn tx_type(&self) -> TxType {
        match self {
            P2PTransaction::LegacyTransaction(_) => TxType::Legacy,
            P2PTransaction::EIP2930Transaction(_) => TxType::EIP2930,
            P2PTransaction::EIP1559Transaction(_) => TxType::EIP1559,
            P2PTransaction::WrappedEIP4844Transaction(_) => TxType::EIP4844,
        }
    }

    pub fn compute_hash(&self) -> H256 {
        // the hash covers the canonical form, without the blob sidecar
        Transaction::from_p2p_dropping_sidecar(self).compute_hash()
    }
}

impl Transaction {
    fn from_p2p_dropping_sidecar(tx: &P2PTransaction) -> Transaction {
        match tx {
            P2PTransaction::LegacyTransaction(itx) => {
                Transaction::LegacyTransaction(itx.clone())
            }
            P2PTransaction::EIP2930Transaction(itx) => {
                Transaction::EIP2930Transaction(itx.clone())
            }
            P2PTransaction::EIP1559Transaction(itx) => {
                Transaction::EIP1559Transaction(itx.clone())
            }
            P2PTransaction::WrappedEIP4844Transaction(itx) => {
                Transaction::EIP4844Transaction(itx.tx.clone())
            }
        }
    }
}

impl From<P2PTransaction> for Transaction {
    fn from(tx: P2PTransaction) -> Self {
        Transaction::from_p2p_dropping_sidecar(&tx)
    }
}

impl RLPEncode for P2PTransaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            P2PTransaction::LegacyTransaction(tx) => tx.encode(buf),
            typed => {
                let mut payload = vec![typed.tx_type() as u8];
                match typed {
                    P2PTransaction::EIP2930Transaction(tx) => tx.encode(&mut payload),
                    P2PTransaction::EIP1559Transaction(tx) => tx.encode(&mut payload),
                    P2PTransaction::WrappedEIP4844Transaction(tx) => tx.encode(&mut payload),
                    P2PTransaction::LegacyTransaction(_) => unreachable!(),
                }
                payload.as_slice().encode(buf)
            }
        }
    }
}

impl RLPDecode for P2PTransaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first_byte = *rlp.first().ok_or(RLPDecodeError::InvalidLength)?;
        if first_byte >= 0xc0 {
            let (tx, rest) = LegacyTransaction::decode_unfinished(rlp)?;
            return Ok((P2PTransaction::LegacyTransaction(tx), rest));
        }
        let (envelope, rest) = decode_bytes(rlp)?;
        let type_byte = *envelope.first().ok_or(RLPDecodeError::InvalidLength)?;
        let payload = &envelope[1..];
        let tx = match TxType::from_byte(type_byte) {
            Some(TxType::EIP2930) => {
                P2PTransaction::EIP2930Transaction(EIP2930Transaction::decode(payload)?)
            }
            Some(TxType::EIP1559) => {
                P2PTransaction::EIP1559Transaction(EIP1559Transaction::decode(payload)?)
            }
            Some(TxType::EIP4844) => P2PTransaction::WrappedEIP4844Transaction(
                WrappedEIP4844Transaction::decode(payload)?,
            ),
            _ => {
                return Err(RLPDecodeError::Custom(format!(
                    "unknown transaction type: {type_byte}"
                )))
            }
        };
        Ok((tx, rest))
    }
}
