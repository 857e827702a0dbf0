use arclight_rlp::error::{RLPDecodeError, RLPEncodeError};
use thiserror::Error;

use super::p2p::DisconnectReason;

/// Every failure the wire layer can produce. Callers match on variants,
/// never on the display strings.
#[derive(Debug, Error)]
pub enum RLPxError {
    // frame layer: fatal, the socket is closed without sending Disconnect
    #[error("frame MAC mismatch")]
    FrameMacMismatch,
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
    #[error("malformed frame: {0}")]
    FrameDecodeError(String),

    // ECIES handshake: fatal, the socket is closed without sending Disconnect
    #[error("could not decrypt handshake message")]
    HandshakeAuthDecryptFailed,
    #[error("could not recover a key from the handshake signature")]
    HandshakeSignatureRecoveryFailed,
    #[error("ephemeral key hash mismatch in pre-EIP-8 handshake")]
    HandshakeHashMismatch,

    // post-handshake negotiation
    #[error("timed out waiting for Hello")]
    HelloTimeout,
    #[error("timed out waiting for Status")]
    StatusTimeout,
    #[error("incompatible protocol: {0}")]
    IncompatibleProtocol(String),
    #[error("no shared capability")]
    NoSharedCapability,
    #[error("remote node id is our own identity")]
    IdentityClash,
    #[error("network id mismatch: local {local}, remote {remote}")]
    NetworkIdMismatch { local: u64, remote: u64 },
    #[error("genesis hash mismatch")]
    GenesisMismatch,
    #[error("fork id mismatch")]
    ForkIdMismatch,

    // session-fatal protocol violations
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("keepalive timed out")]
    KeepaliveTimeout,
    #[error("outgoing frame queue overflowed")]
    WriteQueueOverflow,

    // request-scoped: surfaced to the caller, not session-fatal
    #[error("request timed out")]
    RequestTimeout,
    #[error("request cancelled")]
    RequestCancelled,
    #[error("session closed")]
    SessionClosed,

    // pool level
    #[error("peer pool at capacity")]
    PoolAtCapacity,

    // graceful close initiated by the remote
    #[error("disconnect requested by peer: {0:?}")]
    DisconnectRequested(Option<DisconnectReason>),

    // plumbing
    #[error("invalid connection state")]
    InvalidState,
    #[error("invalid peer id")]
    InvalidPeerId,
    #[error("invalid recovery id")]
    InvalidRecoveryId,
    #[error("invalid message length")]
    InvalidMessageLength,
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("cryptography error: {0}")]
    CryptographyError(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("decode error: {0}")]
    DecodeError(#[from] RLPDecodeError),
    #[error("encode error: {0}")]
    EncodeError(#[from] RLPEncodeError),
}

impl RLPxError {
    /// The Disconnect reason to send before closing, if any. Frame- and
    /// handshake-level failures close the socket silently.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            RLPxError::HelloTimeout | RLPxError::StatusTimeout => {
                Some(DisconnectReason::TimeoutOnReceivingMessage)
            }
            RLPxError::IncompatibleProtocol(_)
            | RLPxError::NoSharedCapability
            | RLPxError::NetworkIdMismatch { .. }
            | RLPxError::GenesisMismatch
            | RLPxError::ForkIdMismatch => Some(DisconnectReason::SubprotocolReason),
            RLPxError::IdentityClash => Some(DisconnectReason::UnexpectedIdentity),
            RLPxError::ProtocolError(_) | RLPxError::DecodeError(_) => {
                Some(DisconnectReason::ProtocolError)
            }
            RLPxError::PoolAtCapacity => Some(DisconnectReason::TooManyPeers),
            _ => None,
        }
    }

    /// True for errors that only fail a single pending request.
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            RLPxError::RequestTimeout | RLPxError::RequestCancelled | RLPxError::SessionClosed
        )
    }
}

impl From<k256::ecdsa::Error> for RLPxError {
    fn from(_: k256::ecdsa::Error) -> Self {
        RLPxError::HandshakeSignatureRecoveryFailed
    }
}

impl From<k256::elliptic_curve::Error> for RLPxError {
    fn from(e: k256::elliptic_curve::Error) -> Self {
        RLPxError::CryptographyError(e.to_string())
    }
}

impl From<aes::cipher::InvalidLength> for RLPxError {
    fn from(e: aes::cipher::InvalidLength) -> Self {
        RLPxError::CryptographyError(e.to_string())
    }
}

impl From<aes::cipher::StreamCipherError> for RLPxError {
    fn from(e: aes::cipher::StreamCipherError) -> Self {
        RLPxError::CryptographyError(e.to_string())
    }
}
