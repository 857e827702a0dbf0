mod account;
mod block;
mod fork_id;
mod receipt;
mod transaction;

pub use account::*;
pub use block::*;
pub use fork_id::*;
pub use receipt::*;
pub use transaction::*;

pub type BlockNumber = u64;
pub type BlockHash = ethereum_types::H256;
