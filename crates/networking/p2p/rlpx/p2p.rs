use arclight_core::H512;
use arclight_rlp::{
    encode::RLPEncode,
    error::{RLPDecodeError, RLPEncodeError},
    structs::{Decoder, Encoder},
};
use bytes::BufMut;
use std::fmt::Display;

use super::capabilities::Capability;
use super::message::RLPxMessage;

/// The devp2p base protocol version. Version 5 enables Snappy compression
/// once both sides advertise it.
pub const P2P_PROTOCOL_VERSION: u8 = 5;

/// Standard Disconnect reason codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReason {
    DisconnectRequested = 0x00,
    NetworkError = 0x01,
    ProtocolError = 0x02,
    UselessPeer = 0x03,
    TooManyPeers = 0x04,
    AlreadyConnected = 0x05,
    IncompatibleP2PVersion = 0x06,
    NullNodeIdentity = 0x07,
    ClientQuitting = 0x08,
    UnexpectedIdentity = 0x09,
    SameIdentity = 0x0a,
    TimeoutOnReceivingMessage = 0x0b,
    SubprotocolReason = 0x10,
}

impl DisconnectReason {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::DisconnectRequested),
            0x01 => Some(Self::NetworkError),
            0x02 => Some(Self::ProtocolError),
            0x03 => Some(Self::UselessPeer),
            0x04 => Some(Self::TooManyPeers),
            0x05 => Some(Self::AlreadyConnected),
            0x06 => Some(Self::IncompatibleP2PVersion),
            0x07 => Some(Self::NullNodeIdentity),
            0x08 => Some(Self::ClientQuitting),
            0x09 => Some(Self::UnexpectedIdentity),
            0x0a => Some(Self::SameIdentity),
            0x0b => Some(Self::TimeoutOnReceivingMessage),
            0x10 => Some(Self::SubprotocolReason),
            _ => None,
        }
    }
}

impl Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::DisconnectRequested => "disconnect requested",
            Self::NetworkError => "network error",
            Self::ProtocolError => "breach of protocol",
            Self::UselessPeer => "useless peer",
            Self::TooManyPeers => "too many peers",
            Self::AlreadyConnected => "already connected",
            Self::IncompatibleP2PVersion => "incompatible p2p version",
            Self::NullNodeIdentity => "null node identity",
            Self::ClientQuitting => "client quitting",
            Self::UnexpectedIdentity => "unexpected identity",
            Self::SameIdentity => "same identity",
            Self::TimeoutOnReceivingMessage => "timeout on receiving message",
            Self::SubprotocolReason => "subprotocol reason",
        };
        text.fmt(f)
    }
}

#[derive(Clone, Debug)]
pub struct HelloMessage {
    pub protocol_version: u8,
    pub client_id: String,
    pub capabilities: Vec<Capability>,
    /// Zero for dial-only nodes.
    pub listen_port: u16,
    pub node_id: H512,
}

impl HelloMessage {
    pub fn new(
        client_id: String,
        capabilities: Vec<Capability>,
        listen_port: u16,
        node_id: H512,
    ) -> Self {
        Self {
            protocol_version: P2P_PROTOCOL_VERSION,
            client_id,
            capabilities,
            listen_port,
            node_id,
        }
    }
}

impl RLPxMessage for HelloMessage {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.protocol_version)
            .encode_field(&self.client_id)
            .encode_field(&self.capabilities)
            .encode_field(&self.listen_port)
            .encode_field(&self.node_id)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        // [protocolVersion: P, clientId: B, capabilities, listenPort: P, nodeId: B_64, ...]
        let decoder = Decoder::new(msg_data)?;
        let (protocol_version, decoder): (u8, _) = decoder.decode_field("protocolVersion")?;
        let (client_id, decoder): (String, _) = decoder.decode_field("clientId")?;
        // [[cap1, capVersion1], [cap2, capVersion2], ...]
        let (capabilities, decoder): (Vec<Capability>, _) = decoder.decode_field("capabilities")?;
        let (listen_port, decoder): (u16, _) = decoder.decode_field("listenPort")?;
        let (node_id, decoder): (H512, _) = decoder.decode_field("nodeId")?;
        // implementations must ignore any additional list elements
        let _padding = decoder.finish_unchecked();

        Ok(Self {
            protocol_version,
            client_id,
            capabilities,
            listen_port,
            node_id,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DisconnectMessage {
    pub reason: Option<DisconnectReason>,
}

impl DisconnectMessage {
    pub fn new(reason: Option<DisconnectReason>) -> Self {
        Self { reason }
    }
}

impl RLPxMessage for DisconnectMessage {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        // Disconnect payload is [reason] or the empty list
        match self.reason {
            Some(reason) => Encoder::new(buf).encode_field(&(reason as u8)).finish(),
            None => Vec::<u8>::new().encode(buf),
        }
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        // Peers encode the reason in several ways: a one-element list, a
        // bare or rlp-encoded byte, or nothing at all.
        let reason = match msg_data {
            [] | [0x80] | [0xc0] => None,
            [byte] if *byte < 0x80 => DisconnectReason::from_byte(*byte),
            [0x81, byte] => DisconnectReason::from_byte(*byte),
            _ => {
                let decoder = Decoder::new(msg_data)?;
                let (reason, _): (Option<u8>, _) = decoder.decode_optional_field();
                reason.and_then(DisconnectReason::from_byte)
            }
        };
        Ok(Self::new(reason))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PingMessage {}

impl PingMessage {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for PingMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl RLPxMessage for PingMessage {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        // Ping payload is the empty list
        Vec::<u8>::new().encode(buf);
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let _padding = decoder.finish_unchecked();
        Ok(Self::new())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PongMessage {}

impl PongMessage {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for PongMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl RLPxMessage for PongMessage {
    fn encode(&self, buf: &mut dyn BufMut, _version: u8) -> Result<(), RLPEncodeError> {
        // Pong payload is the empty list
        Vec::<u8>::new().encode(buf);
        Ok(())
    }

    fn decode(msg_data: &[u8], _version: u8) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let _padding = decoder.finish_unchecked();
        Ok(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlpx::capabilities::supported_capabilities;

    #[test]
    fn hello_roundtrip() {
        let hello = HelloMessage::new(
            "arclight/test".to_string(),
            supported_capabilities(),
            30303,
            H512::repeat_byte(0x7f),
        );
        let mut buf = vec![];
        hello.encode(&mut buf, 0).unwrap();
        let decoded = HelloMessage::decode(&buf, 0).unwrap();
        assert_eq!(decoded.protocol_version, P2P_PROTOCOL_VERSION);
        assert_eq!(decoded.client_id, "arclight/test");
        assert_eq!(decoded.capabilities, supported_capabilities());
        assert_eq!(decoded.listen_port, 30303);
        assert_eq!(decoded.node_id, H512::repeat_byte(0x7f));
    }

    #[test]
    fn disconnect_reason_roundtrip() {
        let msg = DisconnectMessage::new(Some(DisconnectReason::TooManyPeers));
        let mut buf = vec![];
        msg.encode(&mut buf, 0).unwrap();
        let decoded = DisconnectMessage::decode(&buf, 0).unwrap();
        assert_eq!(decoded.reason, Some(DisconnectReason::TooManyPeers));
    }

    #[test]
    fn disconnect_decodes_bare_byte_reason() {
        let decoded = DisconnectMessage::decode(&[0x04], 0).unwrap();
        assert_eq!(decoded.reason, Some(DisconnectReason::TooManyPeers));
    }

    #[test]
    fn disconnect_without_reason() {
        let msg = DisconnectMessage::new(None);
        let mut buf = vec![];
        msg.encode(&mut buf, 0).unwrap();
        let decoded = DisconnectMessage::decode(&buf, 0).unwrap();
        assert_eq!(decoded.reason, None);
    }

    #[test]
    fn ping_pong_roundtrip() {
        let mut buf = vec![];
        PingMessage::new().encode(&mut buf, 0).unwrap();
        PingMessage::decode(&buf, 0).unwrap();

        let mut buf = vec![];
        PongMessage::new().encode(&mut buf, 0).unwrap();
        PongMessage::decode(&buf, 0).unwrap();
    }
}
