use super::{
    decode::{decode_rlp_item, RLPDecode},
    encode::{encode_length, RLPEncode},
    error::RLPDecodeError,
};
use bytes::BufMut;

/// # Struct decoding helper
///
/// Walks the fields of an RLP list one `decode_field` call at a time; each
/// call consumes one item of the list's payload. The list must be consumed
/// completely with [`finish`](Decoder::finish), or explicitly truncated
/// with [`finish_unchecked`](Decoder::finish_unchecked) where the protocol
/// tells implementations to ignore trailing elements.
///
/// # Examples
///
/// ```
/// # use arclight_rlp::structs::Decoder;
/// # use arclight_rlp::decode::RLPDecode;
/// # use arclight_rlp::error::RLPDecodeError;
/// struct Endpoint {
///     port: u16,
///     open: bool,
/// }
///
/// impl RLPDecode for Endpoint {
///     fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
///         let decoder = Decoder::new(rlp)?;
///         let (port, decoder) = decoder.decode_field("port")?;
///         let (open, decoder) = decoder.decode_field("open")?;
///         let remaining = decoder.finish()?;
///         Ok((Endpoint { port, open }, remaining))
///     }
/// }
///
/// let bytes = [0xc4, 0x82, 0x1f, 0x90, 0x01];
/// let endpoint = Endpoint::decode(&bytes).unwrap();
/// assert_eq!(endpoint.port, 8080);
/// assert!(endpoint.open);
/// ```
#[derive(Debug)]
#[must_use = "`Decoder` must be consumed with `finish` to perform decoding checks"]
pub struct Decoder<'a> {
    /// The not-yet-consumed tail of the list's payload.
    fields: &'a [u8],
    /// Whatever followed the list in the input.
    after_item: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, RLPDecodeError> {
        let (is_list, fields, after_item) = decode_rlp_item(buf)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        Ok(Self { fields, after_item })
    }

    pub fn decode_field<T: RLPDecode>(self, name: &str) -> Result<(T, Self), RLPDecodeError> {
        match T::decode_unfinished(self.fields) {
            Ok((value, fields)) => Ok((value, Self { fields, ..self })),
            Err(err) => Err(RLPDecodeError::Custom(format!(
                "error decoding field '{name}' of type {}: {err}",
                std::any::type_name::<T>()
            ))),
        }
    }

    /// Returns Some(field) if there is a further field to decode, None
    /// otherwise.
    pub fn decode_optional_field<T: RLPDecode>(self) -> (Option<T>, Self) {
        match T::decode_unfinished(self.fields) {
            Ok((value, fields)) => (Some(value), Self { fields, ..self }),
            Err(_) => (None, self),
        }
    }

    /// True once every field of the list has been consumed.
    pub fn is_done(&self) -> bool {
        self.fields.is_empty()
    }

    /// Finishes decoding the list and returns the bytes after it, failing
    /// if fields were left unconsumed.
    pub fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if !self.is_done() {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok(self.after_item)
    }

    /// Same as [`finish`](Self::finish), but discards any unconsumed fields
    /// instead of failing.
    pub fn finish_unchecked(self) -> &'a [u8] {
        self.after_item
    }
}

/// # Struct encoding helper
///
/// Collects fields one `encode_field` call at a time, then writes them out
/// as a single RLP list on [`finish`](Encoder::finish).
///
/// # Examples
///
/// ```
/// # use arclight_rlp::structs::Encoder;
/// # use arclight_rlp::encode::RLPEncode;
/// # use bytes::BufMut;
/// struct Endpoint {
///     port: u16,
///     open: bool,
/// }
///
/// impl RLPEncode for Endpoint {
///     fn encode(&self, buf: &mut dyn BufMut) {
///         Encoder::new(buf)
///             .encode_field(&self.port)
///             .encode_field(&self.open)
///             .finish();
///     }
/// }
///
/// let mut buf = vec![];
/// Endpoint { port: 8080, open: true }.encode(&mut buf);
/// assert_eq!(buf, [0xc4, 0x82, 0x1f, 0x90, 0x01]);
/// ```
#[must_use = "`Encoder` must be consumed with `finish` to perform the encoding"]
pub struct Encoder<'a> {
    sink: &'a mut dyn BufMut,
    fields: Vec<u8>,
}

// BufMut has no Debug impl, so this can't be derived.
impl core::fmt::Debug for Encoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Encoder")
            .field("sink", &"..")
            .field("fields", &self.fields)
            .finish()
    }
}

impl<'a> Encoder<'a> {
    /// Creates a new encoder that writes to the given buffer.
    pub fn new(sink: &'a mut dyn BufMut) -> Self {
        Self {
            sink,
            fields: Vec::new(),
        }
    }

    /// Appends one field to the list under construction.
    pub fn encode_field<T: RLPEncode>(mut self, value: &T) -> Self {
        value.encode(&mut self.fields);
        self
    }

    /// Appends the field if `Some`, does nothing otherwise.
    pub fn encode_optional_field<T: RLPEncode>(mut self, opt_value: &Option<T>) -> Self {
        if let Some(value) = opt_value {
            value.encode(&mut self.fields);
        }
        self
    }

    /// Writes the collected fields to the sink as one RLP list.
    pub fn finish(self) {
        encode_length(self.fields.len(), self.sink);
        self.sink.put_slice(&self.fields);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        decode::RLPDecode,
        encode::RLPEncode,
        structs::{Decoder, Encoder},
    };

    #[derive(Debug, PartialEq, Eq)]
    struct Endpoint {
        port: u16,
        open: bool,
    }

    const ENDPOINT_RLP: [u8; 5] = [0xc4, 0x82, 0x1f, 0x90, 0x01];

    #[test]
    fn decoder_walks_struct_fields() {
        let decoder = Decoder::new(&ENDPOINT_RLP).unwrap();
        let (port, decoder) = decoder.decode_field("port").unwrap();
        assert!(!decoder.is_done());
        let (open, decoder) = decoder.decode_field("open").unwrap();
        assert!(decoder.is_done());
        let rest = decoder.finish().unwrap();

        assert!(rest.is_empty());
        assert_eq!(Endpoint { port, open }, Endpoint { port: 8080, open: true });

        // decoding as a tuple reads the same list
        let as_tuple = <(u16, bool) as RLPDecode>::decode(&ENDPOINT_RLP).unwrap();
        assert_eq!(as_tuple, (8080, true));
    }

    #[test]
    fn decoder_rejects_unconsumed_fields() {
        let decoder = Decoder::new(&ENDPOINT_RLP).unwrap();
        let (_, decoder): (u16, _) = decoder.decode_field("port").unwrap();
        assert!(decoder.finish().is_err());
    }

    #[test]
    fn decoder_optional_field_absent() {
        let decoder = Decoder::new(&ENDPOINT_RLP).unwrap();
        let (_, decoder): (u16, _) = decoder.decode_field("port").unwrap();
        let (_, decoder): (bool, _) = decoder.decode_field("open").unwrap();
        let (extra, decoder): (Option<u16>, _) = decoder.decode_optional_field();
        assert_eq!(extra, None);
        decoder.finish().unwrap();
    }

    #[test]
    fn encoder_builds_the_same_list() {
        let input = Endpoint { port: 8080, open: true };
        let mut buf = Vec::new();

        Encoder::new(&mut buf)
            .encode_field(&input.port)
            .encode_field(&input.open)
            .finish();

        assert_eq!(buf, ENDPOINT_RLP);

        // encoding through the tuple impl gives the same bytes
        let mut tuple_encoded = Vec::new();
        (input.port, input.open).encode(&mut tuple_encoded);
        assert_eq!(buf, tuple_encoded);
    }
}
