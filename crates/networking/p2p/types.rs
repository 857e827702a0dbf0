use std::{
    fmt::Display,
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use arclight_core::H512;

/// A remote node as discovery reports it: identity plus endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub node_id: H512,
    pub ip: IpAddr,
    pub udp_port: u16,
    pub tcp_port: u16,
}

impl Node {
    pub fn tcp_address(&self) -> Option<SocketAddr> {
        (self.tcp_port != 0).then_some(SocketAddr::new(self.ip, self.tcp_port))
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "enode://{}@{}:{}",
            hex::encode(self.node_id),
            self.ip,
            self.tcp_port
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNodeError(String);

impl Display for ParseNodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid enode url: {}", self.0)
    }
}

impl std::error::Error for ParseNodeError {}

impl FromStr for Node {
    type Err = ParseNodeError;

    /// Parses an "enode://nodeID@IPaddress:port" url.
    fn from_str(input: &str) -> Result<Node, ParseNodeError> {
        let rest = input
            .strip_prefix("enode://")
            .ok_or_else(|| ParseNodeError("missing enode:// scheme".to_string()))?;
        let (id_part, addr_part) = rest
            .split_once('@')
            .ok_or_else(|| ParseNodeError("missing @ separator".to_string()))?;
        let node_id = H512::from_str(id_part)
            .map_err(|_| ParseNodeError("malformed node id".to_string()))?;
        let socket_address: SocketAddr = addr_part
            .parse()
            .map_err(|_| ParseNodeError("malformed address".to_string()))?;
        Ok(Node {
            node_id,
            ip: socket_address.ip(),
            udp_port: socket_address.port(),
            tcp_port: socket_address.port(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_node_from_enode_url() {
        let input = "enode://d860a01f9722d78051619d1e2351aba3f43f943f6f00718d1b9baa4101932a1f5011f16bb2b1bb35db20d6fe28fa0bf09636d26a87d31de9ec6203eeedb1f666@18.138.108.67:30303";
        let node = Node::from_str(input).unwrap();
        let node_id = H512::from_str(
            "d860a01f9722d78051619d1e2351aba3f43f943f6f00718d1b9baa4101932a1f5011f16bb2b1bb35db20d6fe28fa0bf09636d26a87d31de9ec6203eeedb1f666")
            .unwrap();
        assert_eq!(node.node_id, node_id);
        assert_eq!(node.tcp_address().unwrap().to_string(), "18.138.108.67:30303");
    }

    #[test]
    fn display_roundtrips_through_parse() {
        let input = "enode://d860a01f9722d78051619d1e2351aba3f43f943f6f00718d1b9baa4101932a1f5011f16bb2b1bb35db20d6fe28fa0bf09636d26a87d31de9ec6203eeedb1f666@18.138.108.67:30303";
        let node = Node::from_str(input).unwrap();
        assert_eq!(Node::from_str(&node.to_string()).unwrap(), node);
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(Node::from_str("enode://nonsense").is_err());
        assert!(Node::from_str("http://example.com").is_err());
    }
}
