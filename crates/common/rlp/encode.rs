use bytes::{BufMut, Bytes};
use ethereum_types::{Address, Bloom, H256, H32, H512, H520, U256};

use super::constants::{RLP_EMPTY_LIST, RLP_NULL};

pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn length(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Writes a length prefix for a string (`base` 0x80) or a list (`base`
/// 0xc0): short lengths ride in the tag byte, longer ones follow it as a
/// minimal big-endian number.
fn write_length_prefix(buf: &mut dyn BufMut, base: u8, len: usize) {
    if len < 56 {
        buf.put_u8(base + len as u8);
    } else {
        let len_bytes = len.to_be_bytes();
        let digits = minimal_be_digits(&len_bytes);
        buf.put_u8(base + 55 + digits.len() as u8);
        buf.put_slice(digits);
    }
}

/// Strips leading zero bytes; the result is empty for zero.
fn minimal_be_digits(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes
        .iter()
        .position(|digit| *digit != 0)
        .unwrap_or(bytes.len());
    &bytes[first_nonzero..]
}

pub(crate) fn encode_length(total_len: usize, buf: &mut dyn BufMut) {
    write_length_prefix(buf, RLP_EMPTY_LIST, total_len)
}

impl RLPEncode for bool {
    #[inline(always)]
    fn encode(&self, buf: &mut dyn BufMut) {
        if *self {
            buf.put_u8(0x01);
        } else {
            buf.put_u8(RLP_NULL);
        }
    }

    #[inline(always)]
    fn length(&self) -> usize {
        1
    }
}

// Unsigned integers encode as their minimal big-endian digits: zero is the
// empty string, a single digit below 0x80 is its own encoding.
macro_rules! impl_rlp_encode_uint {
    ($($t:ty),*) => {
        $(impl RLPEncode for $t {
            fn encode(&self, buf: &mut dyn BufMut) {
                let bytes = self.to_be_bytes();
                minimal_be_digits(&bytes).encode(buf)
            }
        })*
    };
}

impl_rlp_encode_uint!(u8, u16, u64);

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        minimal_be_digits(&bytes).encode(buf)
    }
}

impl RLPEncode for [u8] {
    #[inline(always)]
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            [byte] if *byte < RLP_NULL => buf.put_u8(*byte),
            payload => {
                write_length_prefix(buf, RLP_NULL, payload.len());
                buf.put_slice(payload);
            }
        }
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
}

impl RLPEncode for str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for &str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
}

// Hash-like types are fixed-width strings.
macro_rules! impl_rlp_encode_hash {
    ($($t:ty),* $(,)?) => {
        $(impl RLPEncode for $t {
            fn encode(&self, buf: &mut dyn BufMut) {
                self.as_bytes().encode(buf)
            }
        })*
    };
}

impl_rlp_encode_hash!(H32, Address, H256, H512, H520, Bloom);

impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        let total_len: usize = self.iter().map(|item| item.length()).sum();
        write_length_prefix(buf, RLP_EMPTY_LIST, total_len);
        for item in self {
            item.encode(buf);
        }
    }
}

// Tuples encode as fixed-arity lists.
macro_rules! impl_rlp_encode_tuple {
    ($(($($name:ident : $t:ident),+)),* $(,)?) => {
        $(impl<$($t: RLPEncode),+> RLPEncode for ($($t,)+) {
            fn encode(&self, buf: &mut dyn BufMut) {
                let ($($name,)+) = self;
                let total_len = 0 $(+ $name.length())+;
                write_length_prefix(buf, RLP_EMPTY_LIST, total_len);
                $($name.encode(buf);)+
            }
        })*
    };
}

impl_rlp_encode_tuple!(
    (a: A, b: B),
    (a: A, b: B, c: C),
    (a: A, b: B, c: C, d: D),
);

#[cfg(test)]
mod tests {
    use ethereum_types::{Address, U256};
    use hex_literal::hex;

    use crate::constants::{RLP_EMPTY_LIST, RLP_NULL};

    use super::RLPEncode;

    #[test]
    fn encode_booleans() {
        let mut encoded = Vec::new();
        true.encode(&mut encoded);
        assert_eq!(encoded, vec![0x01]);

        let mut encoded = Vec::new();
        false.encode(&mut encoded);
        assert_eq!(encoded, vec![RLP_NULL]);
    }

    #[test]
    fn encode_uints() {
        let mut encoded = Vec::new();
        0u64.encode(&mut encoded);
        assert_eq!(encoded, vec![RLP_NULL]);

        let mut encoded = Vec::new();
        1u8.encode(&mut encoded);
        assert_eq!(encoded, vec![0x01]);

        let mut encoded = Vec::new();
        0x7Fu16.encode(&mut encoded);
        assert_eq!(encoded, vec![0x7f]);

        let mut encoded = Vec::new();
        0x80u16.encode(&mut encoded);
        assert_eq!(encoded, vec![RLP_NULL + 1, 0x80]);

        let mut encoded = Vec::new();
        0x10000u64.encode(&mut encoded);
        assert_eq!(encoded, vec![RLP_NULL + 3, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn encode_bytes() {
        let message: [u8; 1] = [0x00];
        let encoded = {
            let mut buf = vec![];
            message.encode(&mut buf);
            buf
        };
        assert_eq!(encoded, vec![0x00]);

        let message: [u8; 2] = [0x04, 0x00];
        let encoded = {
            let mut buf = vec![];
            message.encode(&mut buf);
            buf
        };
        assert_eq!(encoded, vec![RLP_NULL + 2, 0x04, 0x00]);
    }

    #[test]
    fn encode_long_string_uses_long_form() {
        let message = [0x11u8; 60];
        let mut encoded = vec![];
        message.encode(&mut encoded);

        let mut expected = vec![0xb8, 60];
        expected.extend(message);
        assert_eq!(encoded, expected);
    }

    #[test]
    fn encode_strings() {
        let message = "dog";
        let encoded = {
            let mut buf = vec![];
            message.encode(&mut buf);
            buf
        };
        let expected: [u8; 4] = [RLP_NULL + 3, b'd', b'o', b'g'];
        assert_eq!(encoded, expected);

        let message = "";
        let encoded = {
            let mut buf = vec![];
            message.encode(&mut buf);
            buf
        };
        assert_eq!(encoded, [RLP_NULL]);
    }

    #[test]
    fn encode_list_of_strings() {
        let message = vec!["cat", "dog"];
        let encoded = {
            let mut buf = vec![];
            message.encode(&mut buf);
            buf
        };
        let expected: [u8; 9] = [0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g'];
        assert_eq!(encoded, expected);

        let message: Vec<&str> = vec![];
        let encoded = {
            let mut buf = vec![];
            message.encode(&mut buf);
            buf
        };
        assert_eq!(encoded, [RLP_EMPTY_LIST]);
    }

    #[test]
    fn encode_addresses() {
        let address = Address::from(hex!("ef2d6d194084c2de36e0dabfce45d046b37d1106"));
        let encoded = {
            let mut buf = vec![];
            address.encode(&mut buf);
            buf
        };
        let expected = hex!("94ef2d6d194084c2de36e0dabfce45d046b37d1106");
        assert_eq!(encoded, expected);
    }

    #[test]
    fn encode_u256() {
        let mut encoded = Vec::new();
        U256::from(1).encode(&mut encoded);
        assert_eq!(encoded, vec![1]);

        let mut encoded = Vec::new();
        U256::from(128).encode(&mut encoded);
        assert_eq!(encoded, vec![RLP_NULL + 1, 128]);

        let mut encoded = Vec::new();
        U256::max_value().encode(&mut encoded);
        let mut expected: Vec<u8> = [0xff; 32].into();
        expected.insert(0, RLP_NULL + 32);
        assert_eq!(encoded, expected);
    }

    #[test]
    fn encode_tuple() {
        let tuple: (u8, u8) = (0x01, 0x02);
        let mut encoded = Vec::new();
        tuple.encode(&mut encoded);
        assert_eq!(encoded, vec![RLP_EMPTY_LIST + 2, 0x01, 0x02]);
    }
}
