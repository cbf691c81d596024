//! Ordered text-decoding fallbacks
//!
//! Old submissions arrive in whatever encoding the author's editor used.
//! A [`DecoderChain`] tries each [`TextDecoder`] in order; the first that
//! accepts the bytes wins.

/// One candidate encoding.
pub trait TextDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `bytes`, or `None` if they are not valid in this encoding.
    fn decode(&self, bytes: &[u8]) -> Option<String>;
}

/// UTF-8 byte order mark, dropped by [`Utf8`].
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub struct Utf8;

impl TextDecoder for Utf8 {
    fn name(&self) -> &'static str {
        "utf-8"
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        std::str::from_utf8(bytes).ok().map(str::to_owned)
    }
}

/// ISO-8859-1: every byte maps to the code point of the same value.
pub struct Latin1;

impl TextDecoder for Latin1 {
    fn name(&self) -> &'static str {
        "latin-1"
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        Some(bytes.iter().map(|&b| char::from(b)).collect())
    }
}

/// UTF-16 with BOM sniffing; little-endian when no BOM is present.
pub struct Utf16;

impl TextDecoder for Utf16 {
    fn name(&self) -> &'static str {
        "utf-16"
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        if bytes.len() % 2 != 0 {
            return None;
        }
        let (encoding, body) = match bytes {
            [0xFF, 0xFE, rest @ ..] => (encoding_rs::UTF_16LE, rest),
            [0xFE, 0xFF, rest @ ..] => (encoding_rs::UTF_16BE, rest),
            _ => (encoding_rs::UTF_16LE, bytes),
        };
        encoding
            .decode_without_bom_handling_and_without_replacement(body)
            .map(|text| text.into_owned())
    }
}

/// UTF-32 with BOM sniffing; little-endian when no BOM is present.
pub struct Utf32;

impl TextDecoder for Utf32 {
    fn name(&self) -> &'static str {
        "utf-32"
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let (big_endian, body) = match bytes {
            [0xFF, 0xFE, 0x00, 0x00, rest @ ..] => (false, rest),
            [0x00, 0x00, 0xFE, 0xFF, rest @ ..] => (true, rest),
            _ => (false, bytes),
        };
        body.chunks_exact(4)
            .map(|unit| {
                let word = [unit[0], unit[1], unit[2], unit[3]];
                let code = if big_endian {
                    u32::from_be_bytes(word)
                } else {
                    u32::from_le_bytes(word)
                };
                char::from_u32(code)
            })
            .collect()
    }
}

/// Decoders tried in order until one succeeds.
pub struct DecoderChain {
    decoders: Vec<Box<dyn TextDecoder>>,
}

impl DecoderChain {
    pub fn new(decoders: Vec<Box<dyn TextDecoder>>) -> Self {
        Self { decoders }
    }

    /// Returns the text and the name of the decoder that produced it.
    pub fn decode(&self, bytes: &[u8]) -> Option<(String, &'static str)> {
        self.decoders
            .iter()
            .find_map(|d| d.decode(bytes).map(|text| (text, d.name())))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }
}

impl Default for DecoderChain {
    /// UTF-8, Latin-1, UTF-16, UTF-32.
    ///
    /// Latin-1 accepts any byte sequence, so the wide encodings only run in
    /// chains built without it.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Utf8),
            Box::new(Latin1),
            Box::new(Utf16),
            Box::new(Utf32),
        ])
    }
}
