use crate::rlpx::utils::{ecdh_xchng, id2pubkey, kdf, pubkey2id, sha256, sha256_hmac};
use aes::cipher::{KeyIvInit, StreamCipher};
use arclight_core::{Signature, H128, H256, H512};
use arclight_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use k256::{
    ecdsa::{self, RecoveryId, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey, SecretKey,
};
use rand::Rng;
use sha3::{Digest as _, Keccak256};

use super::error::RLPxError;

type Aes128Ctr64BE = ctr::Ctr64BE<aes::Aes128>;

/// Size of the plaintext of a pre-EIP-8 Auth message:
/// sig(65) || ephemeral-key-hash(32) || pubkey(64) || nonce(32) || token-flag(1).
const LEGACY_AUTH_PLAINTEXT_SIZE: usize = 194;
/// Size of the plaintext of a pre-EIP-8 Ack message:
/// ephemeral-pubkey(64) || nonce(32) || token-flag(1).
const LEGACY_ACK_PLAINTEXT_SIZE: usize = 97;
/// ECIES overhead: pubkey(65) || iv(16) || mac(32).
const ECIES_OVERHEAD: usize = 113;

/// Total wire size of a pre-EIP-8 Auth message.
pub(crate) const LEGACY_AUTH_MSG_SIZE: usize = LEGACY_AUTH_PLAINTEXT_SIZE + ECIES_OVERHEAD;
/// Total wire size of a pre-EIP-8 Ack message.
pub(crate) const LEGACY_ACK_MSG_SIZE: usize = LEGACY_ACK_PLAINTEXT_SIZE + ECIES_OVERHEAD;

/// Encodes an EIP-8 Auth message, to start a handshake. This side always
/// initiates with EIP-8; the legacy form is only ever accepted, not sent.
pub(crate) fn encode_auth_message(
    static_key: &SecretKey,
    local_nonce: H256,
    remote_static_pubkey: &PublicKey,
    local_ephemeral_key: &SecretKey,
) -> Result<Vec<u8>, RLPxError> {
    let node_id = pubkey2id(&static_key.public_key());

    // Derive a shared secret from the static keys.
    let static_shared_secret = ecdh_xchng(static_key, remote_static_pubkey);

    // Sign `static-shared-secret ^ nonce` with the ephemeral key.
    let signature = sign_shared_secret(
        static_shared_secret.into(),
        local_nonce,
        local_ephemeral_key,
    )?;

    let auth = AuthMessage::new(signature, node_id, local_nonce);
    let encoded_auth_msg = auth.encode_to_vec();

    encrypt_message(remote_static_pubkey, encoded_auth_msg)
}

/// Decodes an incoming EIP-8 Auth message, starting a handshake.
/// Returns the message and the recovered remote ephemeral key.
pub(crate) fn decode_auth_message(
    static_key: &SecretKey,
    msg: &[u8],
    size_data: &[u8],
) -> Result<(AuthMessage, PublicKey), RLPxError> {
    let payload = decrypt_message(static_key, msg, size_data)?;

    let (auth, _padding) = AuthMessage::decode_unfinished(&payload)?;

    let peer_pk = id2pubkey(auth.node_id).ok_or(RLPxError::InvalidPeerId)?;
    let static_shared_secret = ecdh_xchng(static_key, &peer_pk);
    let remote_ephemeral_key =
        retrieve_remote_ephemeral_key(static_shared_secret.into(), auth.nonce, auth.signature)?;
    Ok((auth, remote_ephemeral_key))
}

/// Decodes a pre-EIP-8 Auth message: a fixed 307-byte ECIES blob with no
/// size prefix and no RLP framing.
pub(crate) fn decode_legacy_auth_message(
    static_key: &SecretKey,
    msg: &[u8],
) -> Result<(AuthMessage, PublicKey), RLPxError> {
    let payload = decrypt_message(static_key, msg, &[])?;
    if payload.len() != LEGACY_AUTH_PLAINTEXT_SIZE {
        return Err(RLPxError::InvalidMessageLength);
    }

    // sig(65) || ephemeral-key-hash(32) || pubkey(64) || nonce(32) || token-flag(1)
    let signature = Signature::from_slice(&payload[..65]);
    let ephemeral_key_hash = H256::from_slice(&payload[65..97]);
    let node_id = H512::from_slice(&payload[97..161]);
    let nonce = H256::from_slice(&payload[161..193]);

    let auth = AuthMessage {
        signature,
        node_id,
        nonce,
        version: 4,
    };

    let peer_pk = id2pubkey(auth.node_id).ok_or(RLPxError::InvalidPeerId)?;
    let static_shared_secret = ecdh_xchng(static_key, &peer_pk);
    let remote_ephemeral_key =
        retrieve_remote_ephemeral_key(static_shared_secret.into(), auth.nonce, auth.signature)?;

    // the legacy form commits to the ephemeral key by hash
    let expected_hash = Keccak256::digest(pubkey2id(&remote_ephemeral_key).as_bytes());
    if ephemeral_key_hash.as_bytes() != expected_hash.as_slice() {
        return Err(RLPxError::HandshakeHashMismatch);
    }

    Ok((auth, remote_ephemeral_key))
}

/// Encodes an EIP-8 Ack message, to complete a handshake.
pub(crate) fn encode_ack_message(
    local_ephemeral_key: &SecretKey,
    local_nonce: H256,
    remote_static_pubkey: &PublicKey,
) -> Result<Vec<u8>, RLPxError> {
    let ack_msg = AckMessage::new(pubkey2id(&local_ephemeral_key.public_key()), local_nonce);
    let encoded_ack_msg = ack_msg.encode_to_vec();

    encrypt_message(remote_static_pubkey, encoded_ack_msg)
}

/// Decodes an EIP-8 Ack message, completing a handshake.
pub(crate) fn decode_ack_message(
    static_key: &SecretKey,
    msg: &[u8],
    size_data: &[u8],
) -> Result<AckMessage, RLPxError> {
    let payload = decrypt_message(static_key, msg, size_data)?;
    let (ack, _padding) = AckMessage::decode_unfinished(&payload)?;
    Ok(ack)
}

/// Decodes a pre-EIP-8 Ack message: a fixed 210-byte ECIES blob.
pub(crate) fn decode_legacy_ack_message(
    static_key: &SecretKey,
    msg: &[u8],
) -> Result<AckMessage, RLPxError> {
    let payload = decrypt_message(static_key, msg, &[])?;
    if payload.len() != LEGACY_ACK_PLAINTEXT_SIZE {
        return Err(RLPxError::InvalidMessageLength);
    }

    // ephemeral-pubkey(64) || nonce(32) || token-flag(1)
    Ok(AckMessage {
        ephemeral_pubkey: H512::from_slice(&payload[..64]),
        nonce: H256::from_slice(&payload[64..96]),
        version: 4,
    })
}

fn decrypt_message(
    static_key: &SecretKey,
    msg: &[u8],
    size_data: &[u8],
) -> Result<Vec<u8>, RLPxError> {
    // General layout: public-key (65) || iv (16) || ciphertext || mac (32)
    if msg.len() < ECIES_OVERHEAD {
        return Err(RLPxError::InvalidMessageLength);
    }
    let (pk, rest) = msg.split_at(65);
    let (iv, rest) = rest.split_at(16);
    let (c, d) = rest.split_at(rest.len() - 32);

    // Derive the message shared secret.
    let shared_secret = ecdh_xchng(
        static_key,
        &PublicKey::from_sec1_bytes(pk).map_err(|_| RLPxError::HandshakeAuthDecryptFailed)?,
    );

    // Derive the AES and MAC keys from the message shared secret.
    let mut buf = [0; 32];
    kdf(&shared_secret, &mut buf)?;
    let aes_key = &buf[..16];
    let mac_key = sha256(&buf[16..]);

    // Verify the MAC before decrypting anything.
    let expected_d = sha256_hmac(&mac_key, &[iv, c], size_data)?;
    if d != expected_d {
        return Err(RLPxError::HandshakeAuthDecryptFailed);
    }

    let mut stream_cipher = Aes128Ctr64BE::new_from_slices(aes_key, iv)
        .map_err(|e| RLPxError::CryptographyError(e.to_string()))?;
    let mut decoded = c.to_vec();
    stream_cipher.try_apply_keystream(&mut decoded)?;
    Ok(decoded)
}

fn encrypt_message(
    remote_static_pubkey: &PublicKey,
    mut encoded_msg: Vec<u8>,
) -> Result<Vec<u8>, RLPxError> {
    const SIGNATURE_SIZE: usize = 65;
    const IV_SIZE: usize = 16;
    const MAC_FOOTER_SIZE: usize = 32;

    let mut rng = rand::thread_rng();

    // Pad with a random amount of data; at least 100 bytes to make the
    // message distinguishable from pre-EIP-8 handshakes.
    let padding_length = rng.gen_range(100..=300);
    encoded_msg.resize(encoded_msg.len() + padding_length, 0);

    // Precompute the size of the message, needed for the MAC.
    let ecies_overhead = SIGNATURE_SIZE + IV_SIZE + MAC_FOOTER_SIZE;
    let auth_size: u16 = (encoded_msg.len() + ecies_overhead)
        .try_into()
        .map_err(|_| RLPxError::InvalidMessageLength)?;
    let auth_size_bytes = auth_size.to_be_bytes();

    // Generate a keypair just for this message.
    let message_secret_key = SecretKey::random(&mut rng);

    // Derive a shared secret for this message.
    let message_secret = ecdh_xchng(&message_secret_key, remote_static_pubkey);

    // Derive the AES and MAC keys from the message secret.
    let mut secret_keys = [0; 32];
    kdf(&message_secret, &mut secret_keys)?;
    let aes_key = &secret_keys[..16];
    let mac_key = sha256(&secret_keys[16..]);

    // Use the AES secret to encrypt the message.
    let iv = H128::random_using(&mut rng);
    let mut aes_cipher = Aes128Ctr64BE::new_from_slices(aes_key, &iv.0)
        .map_err(|e| RLPxError::CryptographyError(e.to_string()))?;
    aes_cipher.try_apply_keystream(&mut encoded_msg)?;
    let encrypted_msg = encoded_msg;

    // Use the MAC secret to authenticate size prefix, iv and ciphertext.
    let r_public_key = message_secret_key.public_key().to_encoded_point(false);
    let mac_footer = sha256_hmac(&mac_key, &[&iv.0, &encrypted_msg], &auth_size_bytes)?;

    Ok([
        &auth_size_bytes,
        r_public_key.as_bytes(),
        &iv.0,
        &encrypted_msg,
        &mac_footer,
    ]
    .concat())
}

fn retrieve_remote_ephemeral_key(
    shared_secret: H256,
    remote_nonce: H256,
    signature: Signature,
) -> Result<PublicKey, RLPxError> {
    let signature_prehash = shared_secret ^ remote_nonce;
    let sign = ecdsa::Signature::from_slice(&signature.to_fixed_bytes()[..64])?;
    let rid = RecoveryId::from_byte(signature[64]).ok_or(RLPxError::InvalidRecoveryId)?;
    let ephemeral_key =
        VerifyingKey::recover_from_prehash(signature_prehash.as_bytes(), &sign, rid)?;
    Ok(ephemeral_key.into())
}

fn sign_shared_secret(
    shared_secret: H256,
    local_nonce: H256,
    local_ephemeral_key: &SecretKey,
) -> Result<Signature, RLPxError> {
    let signature_prehash = shared_secret ^ local_nonce;
    let (signature, rid) =
        SigningKey::from(local_ephemeral_key).sign_prehash_recoverable(&signature_prehash.0)?;
    let mut signature_bytes = [0; 65];
    signature_bytes[..64].copy_from_slice(signature.to_bytes().as_slice());
    signature_bytes[64] = rid.to_byte();
    Ok(signature_bytes.into())
}

#[derive(Debug)]
pub(crate) struct AuthMessage {
    /// The signature of the message.
    /// The signed data is `static-shared-secret ^ initiator-nonce`.
    pub signature: Signature,
    /// The node ID of the initiator.
    pub node_id: H512,
    /// The nonce generated by the initiator.
    pub nonce: H256,
    /// The version of RLPx used by the sender.
    pub version: u8,
}

impl AuthMessage {
    pub fn new(signature: Signature, node_id: H512, nonce: H256) -> Self {
        Self {
            signature,
            node_id,
            nonce,
            version: 5,
        }
    }
}

impl RLPEncode for AuthMessage {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.signature)
            .encode_field(&self.node_id)
            .encode_field(&self.nonce)
            .encode_field(&self.version)
            .finish()
    }
}

impl RLPDecode for AuthMessage {
    // NOTE: discards any extra data in the list after the known fields.
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (signature, decoder) = decoder.decode_field("signature")?;
        let (node_id, decoder) = decoder.decode_field("node_id")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (version, decoder) = decoder.decode_field("version")?;

        let rest = decoder.finish_unchecked();
        let this = Self {
            signature,
            node_id,
            nonce,
            version,
        };
        Ok((this, rest))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AckMessage {
    /// The recipient's ephemeral public key.
    pub ephemeral_pubkey: H512,
    /// The nonce generated by the recipient.
    pub nonce: H256,
    /// The version of RLPx used by the recipient.
    pub version: u8,
}

impl AckMessage {
    pub fn new(ephemeral_pubkey: H512, nonce: H256) -> Self {
        Self {
            ephemeral_pubkey,
            nonce,
            version: 5,
        }
    }

    pub fn get_ephemeral_pubkey(&self) -> Option<PublicKey> {
        id2pubkey(self.ephemeral_pubkey)
    }
}

impl RLPEncode for AckMessage {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.ephemeral_pubkey)
            .encode_field(&self.nonce)
            .encode_field(&self.version)
            .finish()
    }
}

impl RLPDecode for AckMessage {
    // NOTE: discards any extra data in the list after the known fields.
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (ephemeral_pubkey, decoder) = decoder.decode_field("ephemeral_pubkey")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (version, decoder) = decoder.decode_field("version")?;

        let rest = decoder.finish_unchecked();
        let this = Self {
            ephemeral_pubkey,
            nonce,
            version,
        };
        Ok((this, rest))
    }
}
