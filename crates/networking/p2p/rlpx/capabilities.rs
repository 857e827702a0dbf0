use arclight_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use bytes::BufMut;
use std::fmt::Display;

/// Frame codes below this value belong to the base protocol on every
/// connection; negotiated subprotocols stack on top of it.
pub const BASE_PROTOCOL_LENGTH: u8 = 0x10;

/// The lowest ETH version that carries request ids. Requests are only issued
/// to peers at or above it.
pub const MIN_ETH_REQUEST_VERSION: u8 = 66;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityName {
    Eth,
    Snap,
    Other(String),
}

impl CapabilityName {
    pub fn as_str(&self) -> &str {
        match self {
            CapabilityName::Eth => "eth",
            CapabilityName::Snap => "snap",
            CapabilityName::Other(name) => name,
        }
    }

    fn from_string(name: String) -> Self {
        match name.as_str() {
            "eth" => CapabilityName::Eth,
            "snap" => CapabilityName::Snap,
            _ => CapabilityName::Other(name),
        }
    }
}

impl Display for CapabilityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A capability as advertised in Hello: a short ASCII name and a version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Capability {
    pub name: CapabilityName,
    pub version: u8,
}

impl Capability {
    pub fn eth(version: u8) -> Self {
        Self {
            name: CapabilityName::Eth,
            version,
        }
    }

    pub fn snap(version: u8) -> Self {
        Self {
            name: CapabilityName::Snap,
            version,
        }
    }

    /// How many message codes the capability occupies, for the versions in
    /// the static table. Unknown capabilities are never activated.
    pub fn message_count(&self) -> Option<u8> {
        match (&self.name, self.version) {
            (CapabilityName::Eth, 62) => Some(8),
            (CapabilityName::Eth, 63..=68) => Some(17),
            (CapabilityName::Snap, 1) => Some(8),
            _ => None,
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

impl RLPEncode for Capability {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.name.as_str())
            .encode_field(&self.version)
            .finish();
    }
}

impl RLPDecode for Capability {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (name, decoder): (String, _) = decoder.decode_field("name")?;
        let (version, decoder) = decoder.decode_field("version")?;
        // implementations must ignore any additional list elements
        let remaining = decoder.finish_unchecked();
        let capability = Capability {
            name: CapabilityName::from_string(name),
            version,
        };
        Ok((capability, remaining))
    }
}

/// Every capability this node can speak, in advertisement order.
pub fn supported_capabilities() -> Vec<Capability> {
    let mut capabilities: Vec<Capability> = (62..=68).map(Capability::eth).collect();
    capabilities.push(Capability::snap(1));
    capabilities
}

/// One activated subprotocol on a connection: the chosen capability and the
/// base offset of its message codes in the connection's absolute code space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiatedProtocol {
    pub capability: Capability,
    pub offset: u8,
    pub message_count: u8,
}

/// The per-connection capability router: maps absolute frame codes to
/// (subprotocol, relative code) and back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProtocolTable {
    entries: Vec<NegotiatedProtocol>,
}

impl ProtocolTable {
    /// Computes the shared capability set: for every name both sides
    /// advertise, the highest common version is chosen. Chosen capabilities
    /// are ordered by name and assigned contiguous code ranges starting at
    /// 0x10.
    pub fn negotiate(local: &[Capability], remote: &[Capability]) -> Self {
        let mut chosen: Vec<Capability> = vec![];
        for cap in local {
            if cap.message_count().is_none() {
                continue;
            }
            if !remote.contains(cap) {
                continue;
            }
            match chosen.iter_mut().find(|c| c.name == cap.name) {
                Some(existing) if existing.version >= cap.version => {}
                Some(existing) => *existing = cap.clone(),
                None => chosen.push(cap.clone()),
            }
        }
        chosen.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));

        let mut entries = vec![];
        let mut offset = BASE_PROTOCOL_LENGTH;
        for capability in chosen {
            // checked above
            let Some(message_count) = capability.message_count() else {
                continue;
            };
            entries.push(NegotiatedProtocol {
                capability,
                offset,
                message_count,
            });
            offset += message_count;
        }
        ProtocolTable { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Routes an absolute code ≥ 0x10 to its subprotocol and relative code.
    pub fn route(&self, code: u8) -> Option<(&NegotiatedProtocol, u8)> {
        self.entries
            .iter()
            .find(|entry| code >= entry.offset && code < entry.offset + entry.message_count)
            .map(|entry| (entry, code - entry.offset))
    }

    /// The absolute code for a subprotocol's relative code, if negotiated.
    pub fn absolute_code(&self, name: &CapabilityName, relative: u8) -> Option<u8> {
        self.entry(name)
            .filter(|entry| relative < entry.message_count)
            .map(|entry| entry.offset + relative)
    }

    pub fn entry(&self, name: &CapabilityName) -> Option<&NegotiatedProtocol> {
        self.entries.iter().find(|entry| entry.capability.name == *name)
    }

    pub fn eth_version(&self) -> Option<u8> {
        self.entry(&CapabilityName::Eth)
            .map(|entry| entry.capability.version)
    }

    pub fn snap_version(&self) -> Option<u8> {
        self.entry(&CapabilityName::Snap)
            .map(|entry| entry.capability.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_picks_highest_common_version() {
        let local = supported_capabilities();
        let remote = vec![Capability::eth(66), Capability::eth(67)];
        let table = ProtocolTable::negotiate(&local, &remote);
        assert_eq!(table.eth_version(), Some(67));
        assert_eq!(table.snap_version(), None);
    }

    #[test]
    fn negotiation_assigns_eth_before_snap() {
        let local = supported_capabilities();
        let remote = vec![Capability::eth(68), Capability::snap(1)];
        let table = ProtocolTable::negotiate(&local, &remote);

        let eth = table.entry(&CapabilityName::Eth).unwrap();
        let snap = table.entry(&CapabilityName::Snap).unwrap();
        assert_eq!(eth.offset, 0x10);
        assert_eq!(eth.message_count, 17);
        assert_eq!(snap.offset, 0x10 + 17);
        assert_eq!(snap.message_count, 8);
    }

    #[test]
    fn negotiation_is_symmetric() {
        let a = supported_capabilities();
        let b = vec![Capability::snap(1), Capability::eth(68), Capability::eth(62)];
        assert_eq!(
            ProtocolTable::negotiate(&a, &b),
            ProtocolTable::negotiate(&b, &a)
        );
    }

    #[test]
    fn negotiation_skips_unknown_capabilities() {
        let exotic = Capability {
            name: CapabilityName::Other("les".to_string()),
            version: 4,
        };
        let local = vec![exotic.clone(), Capability::eth(68)];
        let remote = vec![exotic, Capability::eth(68)];
        let table = ProtocolTable::negotiate(&local, &remote);
        assert_eq!(table.eth_version(), Some(68));
        assert!(table.entry(&CapabilityName::Other("les".to_string())).is_none());
    }

    #[test]
    fn negotiation_with_no_common_name_is_empty() {
        let local = vec![Capability::eth(68)];
        let remote = vec![Capability::snap(1)];
        assert!(ProtocolTable::negotiate(&local, &remote).is_empty());
    }

    #[test]
    fn route_rejects_out_of_range_codes() {
        let table =
            ProtocolTable::negotiate(&supported_capabilities(), &supported_capabilities());
        // eth occupies 0x10..0x21, snap 0x21..0x29
        assert!(table.route(0x0f).is_none());
        assert_eq!(table.route(0x10).unwrap().1, 0);
        assert_eq!(table.route(0x21).unwrap().1, 0);
        assert!(table.route(0x29).is_none());
    }

    #[test]
    fn eth62_occupies_eight_codes() {
        let local = supported_capabilities();
        let remote = vec![Capability::eth(62), Capability::snap(1)];
        let table = ProtocolTable::negotiate(&local, &remote);
        let eth = table.entry(&CapabilityName::Eth).unwrap();
        assert_eq!(eth.message_count, 8);
        assert_eq!(
            table.entry(&CapabilityName::Snap).unwrap().offset,
            0x10 + 8
        );
    }
}
