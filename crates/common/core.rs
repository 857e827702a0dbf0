pub mod types;

pub use ethereum_types::{
    Address, BigEndianHash, Bloom, H128, H160, H256, H32, H512, H520, H64, U256,
};

/// A 65-byte recoverable ECDSA signature: r || s || v.
pub type Signature = H520;
/// An uncompressed secp256k1 public key without the 0x04 marker; doubles as
/// the node id.
pub type Public = H512;
