use aes::{
    cipher::{BlockEncrypt as _, KeyInit as _, StreamCipher as _},
    Aes256Enc,
};
use arclight_core::H128;
use arclight_rlp::encode::RLPEncode as _;
use sha3::Digest as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::connection::{EgressState, IngressState};
use super::error::RLPxError;

/// The header length field is 24 bits wide.
pub(crate) const MAX_FRAME_BODY_SIZE: usize = 0xFF_FF_FF;

/// Encrypts and MACs a frame onto the stream:
/// header(16) || header-mac(16) || body (padded to 16) || body-mac(16).
pub(crate) async fn write<S: AsyncWrite + std::marker::Unpin>(
    mut frame_data: Vec<u8>,
    state: &mut EgressState,
    stream: &mut S,
) -> Result<(), RLPxError> {
    if frame_data.len() > MAX_FRAME_BODY_SIZE {
        return Err(RLPxError::FrameTooLarge(frame_data.len()));
    }
    let mac_aes_cipher = Aes256Enc::new_from_slice(&state.mac_key.0)?;

    // header = frame-size || header-data || header-padding
    let mut header = Vec::with_capacity(32);
    let frame_size = frame_data.len().to_be_bytes();
    header.extend_from_slice(&frame_size[5..8]);

    // header-data = [capability-id, context-id], both always zero
    let header_data = (0_u8, 0_u8);
    header_data.encode(&mut header);

    header.resize(16, 0);
    state.egress_aes.apply_keystream(&mut header[..16]);

    // header-mac-seed = aes(mac-secret, keccak256.digest(egress-mac)[:16]) ^ header-ciphertext
    let header_mac_seed = {
        let mac_digest: [u8; 16] = state.egress_mac.clone().finalize()[..16]
            .try_into()
            .map_err(|_| RLPxError::CryptographyError("mac digest length".to_string()))?;
        let mut seed = mac_digest.into();
        mac_aes_cipher.encrypt_block(&mut seed);
        H128(seed.into())
            ^ H128(
                header[..16]
                    .try_into()
                    .map_err(|_| RLPxError::CryptographyError("header length".to_string()))?,
            )
    };
    state.egress_mac.update(header_mac_seed);
    let header_mac = state.egress_mac.clone().finalize();
    header.extend_from_slice(&header_mac[..16]);

    stream
        .write_all(&header)
        .await
        .map_err(|e| RLPxError::ConnectionError(format!("could not send frame header: {e}")))?;

    // pad the body to the next multiple of the block size
    frame_data.resize(frame_data.len().next_multiple_of(16), 0);
    state.egress_aes.apply_keystream(&mut frame_data);
    let frame_ciphertext = frame_data;

    stream
        .write_all(&frame_ciphertext)
        .await
        .map_err(|e| RLPxError::ConnectionError(format!("could not send frame body: {e}")))?;

    // frame-mac-seed = aes(mac-secret, keccak256.digest(egress-mac)[:16]) ^ keccak256.digest(egress-mac)[:16]
    state.egress_mac.update(&frame_ciphertext);
    let frame_mac_seed = {
        let mac_digest: [u8; 16] = state.egress_mac.clone().finalize()[..16]
            .try_into()
            .map_err(|_| RLPxError::CryptographyError("mac digest length".to_string()))?;
        let mut seed = mac_digest.into();
        mac_aes_cipher.encrypt_block(&mut seed);
        (H128(seed.into()) ^ H128(mac_digest)).0
    };
    state.egress_mac.update(frame_mac_seed);
    let frame_mac = state.egress_mac.clone().finalize();

    stream
        .write_all(&frame_mac[..16])
        .await
        .map_err(|e| RLPxError::ConnectionError(format!("could not send frame mac: {e}")))?;
    Ok(())
}

/// Reads one full frame off the stream, verifying both MACs before
/// decrypting. No partial frames are ever surfaced.
pub(crate) async fn read<S: AsyncRead + std::marker::Unpin>(
    state: &mut IngressState,
    stream: &mut S,
) -> Result<Vec<u8>, RLPxError> {
    let mac_aes_cipher = Aes256Enc::new_from_slice(&state.mac_key.0)?;

    let mut frame_header = [0; 32];
    stream
        .read_exact(&mut frame_header)
        .await
        .map_err(|e| RLPxError::ConnectionError(format!("connection dropped: {e}")))?;
    let (header_ciphertext, header_mac) = frame_header.split_at_mut(16);

    // header-mac-seed = aes(mac-secret, keccak256.digest(ingress-mac)[:16]) ^ header-ciphertext
    let header_mac_seed = {
        let mac_digest: [u8; 16] = state.ingress_mac.clone().finalize()[..16]
            .try_into()
            .map_err(|_| RLPxError::CryptographyError("mac digest length".to_string()))?;
        let mut seed = mac_digest.into();
        mac_aes_cipher.encrypt_block(&mut seed);
        (H128(seed.into())
            ^ H128(
                (&*header_ciphertext)
                    .try_into()
                    .map_err(|_| RLPxError::CryptographyError("header length".to_string()))?,
            ))
        .0
    };
    state.ingress_mac.update(header_mac_seed);

    let expected_header_mac = &state.ingress_mac.clone().finalize()[..16];
    if header_mac != expected_header_mac {
        return Err(RLPxError::FrameMacMismatch);
    }

    let header_text = header_ciphertext;
    state.ingress_aes.apply_keystream(header_text);

    // bytes [3..16] carry the rlp([0,0]) capability hint, ignored on receive
    let frame_size: usize =
        u32::from_be_bytes([0, header_text[0], header_text[1], header_text[2]]) as usize;

    let padded_size = frame_size.next_multiple_of(16);
    let mut frame_data = vec![0; padded_size + 16];
    stream
        .read_exact(&mut frame_data)
        .await
        .map_err(|e| RLPxError::ConnectionError(format!("connection dropped: {e}")))?;
    let (frame_ciphertext, frame_mac) = frame_data.split_at_mut(padded_size);

    state.ingress_mac.update(&frame_ciphertext);
    let frame_mac_seed = {
        let mac_digest: [u8; 16] = state.ingress_mac.clone().finalize()[..16]
            .try_into()
            .map_err(|_| RLPxError::CryptographyError("mac digest length".to_string()))?;
        let mut seed = mac_digest.into();
        mac_aes_cipher.encrypt_block(&mut seed);
        (H128(seed.into()) ^ H128(mac_digest)).0
    };
    state.ingress_mac.update(frame_mac_seed);
    let expected_frame_mac: [u8; 16] = state.ingress_mac.clone().finalize()[..16]
        .try_into()
        .map_err(|_| RLPxError::CryptographyError("mac digest length".to_string()))?;

    if frame_mac != expected_frame_mac {
        return Err(RLPxError::FrameMacMismatch);
    }

    state.ingress_aes.apply_keystream(frame_ciphertext);
    let (frame_data, _padding) = frame_ciphertext.split_at(frame_size);
    Ok(frame_data.to_vec())
}
