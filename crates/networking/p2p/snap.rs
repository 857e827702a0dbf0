//! Serving side of the SNAP subprotocol.
//!
//! This node keeps no state archive, so every request is answered with an
//! empty, correctly correlated response: requesters treat an empty answer as
//! "peer has no data for this range" and move on.

use crate::rlpx::snap::{
    AccountRange, ByteCodes, GetAccountRange, GetByteCodes, GetStorageRanges, GetTrieNodes,
    StorageRanges, TrieNodes,
};

pub fn process_account_range_request(request: &GetAccountRange) -> AccountRange {
    AccountRange {
        id: request.id,
        accounts: vec![],
        proof: vec![],
    }
}

pub fn process_storage_ranges_request(request: &GetStorageRanges) -> StorageRanges {
    StorageRanges {
        id: request.id,
        slots: vec![],
        proof: vec![],
    }
}

pub fn process_byte_codes_request(request: &GetByteCodes) -> ByteCodes {
    ByteCodes {
        id: request.id,
        codes: vec![],
    }
}

pub fn process_trie_nodes_request(request: &GetTrieNodes) -> TrieNodes {
    TrieNodes {
        id: request.id,
        nodes: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arclight_core::H256;

    #[test]
    fn empty_responses_still_correlate() {
        let request = GetAccountRange {
            id: 77,
            root_hash: H256::repeat_byte(1),
            starting_hash: H256::zero(),
            limit_hash: H256::repeat_byte(0xff),
            response_bytes: 1024,
        };
        let response = process_account_range_request(&request);
        assert_eq!(response.id, 77);
        assert!(response.accounts.is_empty());

        let request = GetByteCodes {
            id: 78,
            hashes: vec![H256::repeat_byte(2)],
            bytes: 1024,
        };
        let response = process_byte_codes_request(&request);
        assert_eq!(response.id, 78);
        assert!(response.codes.is_empty());
    }
}
