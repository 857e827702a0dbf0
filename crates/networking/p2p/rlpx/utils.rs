use arclight_core::H512;
use k256::{
    elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint},
    EncodedPoint, PublicKey, SecretKey,
};
use snap::raw::{max_compress_len, Decoder as SnappyDecoder, Encoder as SnappyEncoder};

use super::error::RLPxError;

/// Decompressed frame payloads larger than this are rejected before
/// allocation.
pub(crate) const MAX_DECOMPRESSED_SIZE: usize = 16 * 1024 * 1024;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    use k256::sha2::Digest;
    k256::sha2::Sha256::digest(data).into()
}

pub fn sha256_hmac(key: &[u8], inputs: &[&[u8]], auth_data: &[u8]) -> Result<[u8; 32], RLPxError> {
    use hmac::Mac;
    use k256::sha2::Sha256;

    let mut hasher = hmac::Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| RLPxError::CryptographyError(e.to_string()))?;
    for input in inputs {
        hasher.update(input);
    }
    hasher.update(auth_data);
    Ok(hasher.finalize().into_bytes().into())
}

pub fn ecdh_xchng(secret_key: &SecretKey, public_key: &PublicKey) -> [u8; 32] {
    let shared = k256::ecdh::diffie_hellman(secret_key.to_nonzero_scalar(), public_key.as_affine());
    let mut secret = [0; 32];
    secret.copy_from_slice(&shared.raw_secret_bytes()[..32]);
    secret
}

pub fn kdf(secret: &[u8], output: &mut [u8]) -> Result<(), RLPxError> {
    // the `other_info` field is not used
    concat_kdf::derive_key_into::<k256::sha2::Sha256>(secret, &[], output)
        .map_err(|e| RLPxError::CryptographyError(e.to_string()))
}

/// Computes a node id from a public key: the uncompressed point without the
/// leading 0x04 marker.
pub fn pubkey2id(pk: &PublicKey) -> H512 {
    let encoded = pk.to_encoded_point(false);
    let bytes = encoded.as_bytes();
    debug_assert_eq!(bytes[0], 4);
    H512::from_slice(&bytes[1..])
}

/// Computes a public key from a node id, failing on points not on the curve.
pub fn id2pubkey(id: H512) -> Option<PublicKey> {
    let point = EncodedPoint::from_untagged_bytes(&id.0.into());
    PublicKey::from_encoded_point(&point).into_option()
}

pub fn snappy_compress(data: &[u8]) -> Result<Vec<u8>, RLPxError> {
    let mut encoder = SnappyEncoder::new();
    let mut compressed = vec![0; max_compress_len(data.len())];
    let compressed_size = encoder
        .compress(data, &mut compressed)
        .map_err(|e| RLPxError::FrameDecodeError(e.to_string()))?;
    compressed.truncate(compressed_size);
    Ok(compressed)
}

pub fn snappy_decompress(data: &[u8]) -> Result<Vec<u8>, RLPxError> {
    let size = snap::raw::decompress_len(data)
        .map_err(|e| RLPxError::FrameDecodeError(e.to_string()))?;
    if size > MAX_DECOMPRESSED_SIZE {
        return Err(RLPxError::FrameTooLarge(size));
    }
    let mut decoder = SnappyDecoder::new();
    decoder
        .decompress_vec(data)
        .map_err(|e| RLPxError::FrameDecodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_xchng_is_symmetric() {
        use rand::rngs::OsRng;

        let a_sk = SecretKey::random(&mut OsRng);
        let b_sk = SecretKey::random(&mut OsRng);

        // a_sk * b_pk = a * (b * G) = b * (a * G) = b_sk * a_pk
        let a_sk_b_pk = ecdh_xchng(&a_sk, &b_sk.public_key());
        let b_sk_a_pk = ecdh_xchng(&b_sk, &a_sk.public_key());
        assert_eq!(a_sk_b_pk, b_sk_a_pk);
    }

    #[test]
    fn id2pubkey_inverts_pubkey2id() {
        use rand::rngs::OsRng;

        let sk = SecretKey::random(&mut OsRng);
        let pk = sk.public_key();
        let id = pubkey2id(&pk);
        let pk2 = id2pubkey(id).unwrap();
        assert_eq!(pk, pk2);
    }

    #[test]
    fn snappy_roundtrip() {
        let data = b"arclight arclight arclight arclight".to_vec();
        let compressed = snappy_compress(&data).unwrap();
        let decompressed = snappy_decompress(&compressed).unwrap();
        assert_eq!(data, decompressed);
    }
}
