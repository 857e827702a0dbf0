use super::{
    constants::{RLP_EMPTY_LIST, RLP_NULL},
    error::RLPDecodeError,
};
use bytes::Bytes;
use ethereum_types::{Address, Bloom, H256, H32, H512, H520, U256};

/// Trait for decoding RLP encoded data.
/// See <https://ethereum.org/en/developers/docs/data-structures-and-encoding/rlp/#rlp-decoding>.
/// Implementors provide [`decode_unfinished`](RLPDecode::decode_unfinished),
/// which consumes one item off the front of the slice and returns the value
/// together with whatever follows it; [`decode`](RLPDecode::decode) is the
/// whole-slice form most callers want.
pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(decoded)
    }
}

/// Where one item's payload sits inside its encoding, and what kind of item
/// it is.
struct ItemLayout {
    is_list: bool,
    payload_start: usize,
    payload_len: usize,
}

/// Reads one length prefix. Strings and lists share the same shape: a tag
/// byte carrying either the payload length itself (up to 55 bytes) or the
/// width of the big-endian length that follows the tag.
fn parse_prefix(data: &[u8]) -> Result<ItemLayout, RLPDecodeError> {
    let first_byte = *data.first().ok_or(RLPDecodeError::InvalidLength)?;

    // a single byte below 0x80 is its own encoding
    if first_byte < RLP_NULL {
        return Ok(ItemLayout {
            is_list: false,
            payload_start: 0,
            payload_len: 1,
        });
    }

    let (is_list, tag) = if first_byte >= RLP_EMPTY_LIST {
        (true, first_byte - RLP_EMPTY_LIST)
    } else {
        (false, first_byte - RLP_NULL)
    };

    let (payload_start, payload_len) = if tag <= 55 {
        (1, tag as usize)
    } else {
        let length_width = (tag - 55) as usize;
        if length_width > std::mem::size_of::<usize>() {
            return Err(RLPDecodeError::InvalidLength);
        }
        let length_digits = data
            .get(1..1 + length_width)
            .ok_or(RLPDecodeError::InvalidLength)?;
        // lengths are minimally encoded
        if length_digits.first() == Some(&0) {
            return Err(RLPDecodeError::MalformedData);
        }
        let mut payload_len = 0usize;
        for digit in length_digits {
            payload_len = (payload_len << 8) | usize::from(*digit);
        }
        (1 + length_width, payload_len)
    };

    let end = payload_start
        .checked_add(payload_len)
        .ok_or(RLPDecodeError::InvalidLength)?;
    if data.len() < end {
        return Err(RLPDecodeError::InvalidLength);
    }
    Ok(ItemLayout {
        is_list,
        payload_start,
        payload_len,
    })
}

/// Decodes one RLP item off the front of a slice, returning:
/// - whether the item is a list,
/// - the item's payload, without its prefix,
/// - the remaining bytes after the item.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let item = parse_prefix(data)?;
    let end = item.payload_start + item.payload_len;
    Ok((item.is_list, &data[item.payload_start..end], &data[end..]))
}

/// Decodes the payload of a string item, rejecting lists.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (is_list, payload, rest) = decode_rlp_item(data)?;
    if is_list {
        return Err(RLPDecodeError::UnexpectedList);
    }
    Ok((payload, rest))
}

impl RLPDecode for bool {
    #[inline(always)]
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        match buf.first() {
            Some(&RLP_NULL) => Ok((false, &buf[1..])),
            Some(&0x01) => Ok((true, &buf[1..])),
            Some(_) => Err(RLPDecodeError::MalformedBoolean),
            None => Err(RLPDecodeError::InvalidLength),
        }
    }
}

// Unsigned integers are minimal big-endian strings: no leading zero digits,
// and no more digits than the type holds.
macro_rules! impl_rlp_decode_uint {
    ($($t:ty),*) => {
        $(impl RLPDecode for $t {
            fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (digits, rest) = decode_bytes(rlp)?;
                if digits.len() > std::mem::size_of::<$t>() {
                    return Err(RLPDecodeError::InvalidLength);
                }
                if digits.first() == Some(&0) {
                    return Err(RLPDecodeError::MalformedData);
                }
                let mut padded = [0u8; std::mem::size_of::<$t>()];
                padded[std::mem::size_of::<$t>() - digits.len()..].copy_from_slice(digits);
                Ok((<$t>::from_be_bytes(padded), rest))
            }
        })*
    };
}

impl_rlp_decode_uint!(u8, u16, u64);

impl RLPDecode for U256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (digits, rest) = decode_bytes(rlp)?;
        if digits.len() > 32 {
            return Err(RLPDecodeError::InvalidLength);
        }
        if digits.first() == Some(&0) {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok((U256::from_big_endian(digits), rest))
    }
}

// Fixed-size byte arrays. Lists of same-typed elements decode through the
// Vec<T> implementation instead.
impl<const N: usize> RLPDecode for [u8; N] {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (payload, rest) = decode_bytes(rlp)?;
        let value = payload
            .try_into()
            .map_err(|_| RLPDecodeError::InvalidLength)?;
        Ok((value, rest))
    }
}

impl RLPDecode for Bytes {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (payload, rest) = decode_bytes(rlp)?;
        Ok((Bytes::copy_from_slice(payload), rest))
    }
}

impl RLPDecode for String {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (payload, rest) = decode_bytes(rlp)?;
        let value =
            String::from_utf8(payload.to_vec()).map_err(|_| RLPDecodeError::MalformedData)?;
        Ok((value, rest))
    }
}

// Hash-like types are strings of exactly their width.
macro_rules! impl_rlp_decode_hash {
    ($($t:ident => $width:expr),* $(,)?) => {
        $(impl RLPDecode for $t {
            fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (payload, rest) = decode_bytes(rlp)?;
                if payload.len() != $width {
                    return Err(RLPDecodeError::InvalidLength);
                }
                Ok(($t::from_slice(payload), rest))
            }
        })*
    };
}

impl_rlp_decode_hash!(
    H32 => 4,
    Address => 20,
    H256 => 32,
    H512 => 64,
    H520 => 65,
    Bloom => 256,
);

impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, mut payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items = Vec::new();
        while !payload.is_empty() {
            let (item, leftover) = T::decode_unfinished(payload)?;
            items.push(item);
            payload = leftover;
        }
        Ok((items, rest))
    }
}

// Tuples are fixed-arity lists; the item must hold exactly the tuple's
// elements.
macro_rules! impl_rlp_decode_tuple {
    ($(($($name:ident : $t:ident),+)),* $(,)?) => {
        $(impl<$($t: RLPDecode),+> RLPDecode for ($($t,)+) {
            fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (is_list, payload, rest) = decode_rlp_item(rlp)?;
                if !is_list {
                    return Err(RLPDecodeError::UnexpectedString);
                }
                let leftover = payload;
                $(let ($name, leftover) = $t::decode_unfinished(leftover)?;)+
                if !leftover.is_empty() {
                    return Err(RLPDecodeError::MalformedData);
                }
                Ok((($($name,)+), rest))
            }
        })*
    };
}

impl_rlp_decode_tuple!(
    (a: A, b: B),
    (a: A, b: B, c: C),
    (a: A, b: B, c: C, d: D),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_bool() {
        assert!(bool::decode(&[0x01]).unwrap());
        assert!(!bool::decode(&[RLP_NULL]).unwrap());
        assert!(bool::decode(&[0x02]).is_err());
    }

    #[test]
    fn decode_uints() {
        assert_eq!(u8::decode(&[0x01]).unwrap(), 1);
        assert_eq!(u8::decode(&[RLP_NULL]).unwrap(), 0);
        assert_eq!(u8::decode(&[0x7f]).unwrap(), 127);
        assert_eq!(u8::decode(&[RLP_NULL + 1, 0xFF]).unwrap(), 255);
        assert_eq!(u64::decode(&[0x83, 0x01, 0x00, 0x00]).unwrap(), 65536);
        // leading zeros are non-minimal
        assert!(u64::decode(&[0x82, 0x00, 0x01]).is_err());
        // a 3-byte payload cannot be a u8
        assert!(u8::decode(&[0x83, 0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn decode_fixed_length_array() {
        assert_eq!(<[u8; 1]>::decode(&[0x0f]).unwrap(), [0x0f]);
        assert_eq!(
            <[u8; 3]>::decode(&[RLP_NULL + 3, 0x02, 0x03, 0x04]).unwrap(),
            [0x02, 0x03, 0x04]
        );
        assert!(<[u8; 3]>::decode(&[RLP_NULL + 2, 0x02, 0x03]).is_err());
    }

    #[test]
    fn decode_hashes() {
        let mut rlp = vec![RLP_NULL + 32];
        rlp.extend([0xab; 32]);
        assert_eq!(H256::decode(&rlp).unwrap(), H256::repeat_byte(0xab));

        // a 31-byte string is not an H256
        let mut rlp = vec![RLP_NULL + 31];
        rlp.extend([0xab; 31]);
        assert!(H256::decode(&rlp).is_err());
    }

    #[test]
    fn decode_u256() {
        assert_eq!(U256::decode(&[RLP_NULL + 1, 0x01]).unwrap(), U256::from(1));

        let mut rlp = vec![RLP_NULL + 32];
        let digits = [0x01; 32];
        rlp.extend(digits);
        assert_eq!(
            U256::decode(&rlp).unwrap(),
            U256::from_big_endian(&digits)
        );

        // 33 digits overflow
        let mut rlp = vec![RLP_NULL + 33];
        rlp.extend([0x01; 33]);
        assert!(U256::decode(&rlp).is_err());
    }

    #[test]
    fn decode_string() {
        let rlp = [RLP_NULL + 3, b'd', b'o', b'g'];
        assert_eq!(String::decode(&rlp).unwrap(), "dog");
        assert_eq!(String::decode(&[RLP_NULL]).unwrap(), "");
    }

    #[test]
    fn decode_lists() {
        let decoded: Vec<String> = Vec::decode(&[RLP_EMPTY_LIST]).unwrap();
        assert!(decoded.is_empty());

        let decoded: Vec<u8> = Vec::decode(&[RLP_EMPTY_LIST + 3, 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);

        let rlp = [0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g'];
        let decoded: Vec<String> = Vec::decode(&rlp).unwrap();
        assert_eq!(decoded, vec!["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn decode_list_of_lists() {
        let rlp = [
            RLP_EMPTY_LIST + 6,
            RLP_EMPTY_LIST + 2,
            0x01,
            0x02,
            RLP_EMPTY_LIST + 2,
            0x03,
            0x04,
        ];
        let decoded: Vec<Vec<u8>> = Vec::decode(&rlp).unwrap();
        assert_eq!(decoded, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn decode_tuples() {
        let decoded = <(u8, u8)>::decode(&[RLP_EMPTY_LIST + 2, 0x01, 0x02]).unwrap();
        assert_eq!(decoded, (1, 2));

        let rlp = [RLP_EMPTY_LIST + 5, 0x01, 0x83, b'c', b'a', b't'];
        let decoded: (u8, String) = <(u8, String)>::decode(&rlp).unwrap();
        assert_eq!(decoded, (1, "cat".to_string()));

        let decoded = <(u8, Vec<u8>)>::decode(&[RLP_EMPTY_LIST + 2, 0x03, RLP_EMPTY_LIST]).unwrap();
        assert_eq!(decoded, (3, vec![]));

        let rlp = [RLP_EMPTY_LIST + 3, 0x01, 0x02, 0x03];
        let decoded: (u8, u8, u8) = <(u8, u8, u8)>::decode(&rlp).unwrap();
        assert_eq!(decoded, (1, 2, 3));

        // trailing elements are malformed
        let rlp = [RLP_EMPTY_LIST + 3, 0x01, 0x02, 0x03];
        assert!(<(u8, u8)>::decode(&rlp).is_err());
    }

    #[test]
    fn decode_list_as_string_fails() {
        let rlp = [RLP_EMPTY_LIST + 4, 0x01, 0x02, 0x03, 0x04];
        let decoded: Result<[u8; 4], _> = RLPDecode::decode(&rlp);
        assert!(decoded.is_err());

        let rlp = [RLP_EMPTY_LIST + 2, 0x01, 0x02];
        let decoded: Result<u16, _> = RLPDecode::decode(&rlp);
        assert!(decoded.is_err());
    }

    #[test]
    fn decode_long_form_item() {
        // a 60-byte string needs the long form: 0xb8 then the length
        let mut rlp = vec![0xb8, 60];
        rlp.extend([0x11; 60]);
        let (payload, rest) = decode_bytes(&rlp).unwrap();
        assert_eq!(payload, [0x11; 60]);
        assert!(rest.is_empty());
    }

    #[test]
    fn truncated_items_fail() {
        // prefix promises 3 bytes, only 2 present
        assert!(decode_bytes(&[RLP_NULL + 3, 0x01, 0x02]).is_err());
        // long form with a zero length digit
        assert!(decode_bytes(&[0xb8, 0x00]).is_err());
        // empty input
        assert!(decode_rlp_item(&[]).is_err());
    }
}
