pub mod capabilities;
pub(crate) mod connection;
pub mod error;
pub mod eth;
pub(crate) mod frame;
pub(crate) mod handshake;
pub mod message;
pub mod p2p;
pub mod snap;
pub mod utils;
