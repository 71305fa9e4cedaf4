//! Text encodings understood by the scanner.
//!
//! The scanner needs two things from an encoding: how a line feed looks on
//! disk, and how many characters a run of bytes holds. Consumers additionally
//! decode line bytes to UTF-8 before matching.

use bstr::ByteSlice;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Bytes inspected when guessing an encoding without a BOM
const GUESS_SAMPLE_SIZE: usize = 64 * 1024;

/// Encodings the indexer can split and measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    /// ISO-8859-1, used for anything that is not valid UTF-8
    Latin1,
}

impl TextEncoding {
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16Le => "UTF-16LE",
            TextEncoding::Utf16Be => "UTF-16BE",
            TextEncoding::Latin1 => "ISO-8859-1",
        }
    }

    /// Bytes per code unit (and per line feed)
    pub fn code_unit_width(self) -> usize {
        match self {
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => 2,
            TextEncoding::Utf8 | TextEncoding::Latin1 => 1,
        }
    }

    /// Byte order mark for this encoding, empty when it has none
    pub fn bom(self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => &[0xEF, 0xBB, 0xBF],
            TextEncoding::Utf16Le => &[0xFF, 0xFE],
            TextEncoding::Utf16Be => &[0xFE, 0xFF],
            TextEncoding::Latin1 => &[],
        }
    }

    /// Combine two bytes of a UTF-16 code unit in file order
    pub(crate) fn code_unit(self, first: u8, second: u8) -> u16 {
        match self {
            TextEncoding::Utf16Be => u16::from_be_bytes([first, second]),
            _ => u16::from_le_bytes([first, second]),
        }
    }

    /// Guess the encoding of the start of a file
    ///
    /// # Heuristics, in order
    /// 1. Byte order mark
    /// 2. Zero bytes concentrated on one parity: BOM-less UTF-16
    /// 3. Valid UTF-8 (a sequence cut at the end of the sample is allowed)
    /// 4. Latin-1
    pub fn guess(block: &[u8]) -> Self {
        for encoding in [
            TextEncoding::Utf8,
            TextEncoding::Utf16Le,
            TextEncoding::Utf16Be,
        ] {
            if block.starts_with(encoding.bom()) {
                return encoding;
            }
        }

        let sample = &block[..block.len().min(GUESS_SAMPLE_SIZE)];
        let pairs = sample.len() / 2;
        if pairs > 0 {
            let (mut even_zeros, mut odd_zeros) = (0usize, 0usize);
            for pair in sample.chunks_exact(2) {
                even_zeros += usize::from(pair[0] == 0);
                odd_zeros += usize::from(pair[1] == 0);
            }
            if odd_zeros * 2 > pairs && even_zeros * 10 < pairs {
                return TextEncoding::Utf16Le;
            }
            if even_zeros * 2 > pairs && odd_zeros * 10 < pairs {
                return TextEncoding::Utf16Be;
            }
        }

        match std::str::from_utf8(sample) {
            Ok(_) => TextEncoding::Utf8,
            Err(e) if e.error_len().is_none() => TextEncoding::Utf8,
            Err(_) => TextEncoding::Latin1,
        }
    }

    /// Remove a trailing line feed (and a carriage return before it)
    pub fn strip_line_terminator(self, line: &[u8]) -> &[u8] {
        let (lf, cr): (&[u8], &[u8]) = match self {
            TextEncoding::Utf8 | TextEncoding::Latin1 => (b"\n", b"\r"),
            TextEncoding::Utf16Le => (&[0x0A, 0x00], &[0x0D, 0x00]),
            TextEncoding::Utf16Be => (&[0x00, 0x0A], &[0x00, 0x0D]),
        };
        let line = line.strip_suffix(lf).unwrap_or(line);
        line.strip_suffix(cr).unwrap_or(line)
    }

    /// Remove this encoding's BOM from the start of the first line
    pub fn strip_bom(self, line: &[u8]) -> &[u8] {
        let bom = self.bom();
        if bom.is_empty() {
            return line;
        }
        line.strip_prefix(bom).unwrap_or(line)
    }

    /// Decode bytes to UTF-8, replacing anything undecodable
    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        match self {
            TextEncoding::Utf8 => bytes.to_str_lossy(),
            TextEncoding::Latin1 => {
                if bytes.is_ascii() {
                    bytes.to_str_lossy()
                } else {
                    Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
                }
            }
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
                let units = bytes
                    .chunks_exact(2)
                    .map(|pair| self.code_unit(pair[0], pair[1]));
                let mut text: String = char::decode_utf16(units)
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect();
                if bytes.len() % 2 == 1 {
                    text.push(char::REPLACEMENT_CHARACTER);
                }
                Cow::Owned(text)
            }
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "utf-16le" | "utf16le" => Ok(TextEncoding::Utf16Le),
            "utf-16be" | "utf16be" => Ok(TextEncoding::Utf16Be),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(TextEncoding::Latin1),
            other => Err(format!("unsupported encoding: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn test_guess_from_bom() {
        assert_eq!(TextEncoding::guess(b"\xEF\xBB\xBFhello"), TextEncoding::Utf8);
        assert_eq!(TextEncoding::guess(b"\xFF\xFEh\x00"), TextEncoding::Utf16Le);
        assert_eq!(TextEncoding::guess(b"\xFE\xFF\x00h"), TextEncoding::Utf16Be);
    }

    #[test]
    fn test_guess_bomless_utf16() {
        assert_eq!(
            TextEncoding::guess(&utf16le("plain log line\n")),
            TextEncoding::Utf16Le
        );
        let be: Vec<u8> = "plain log line\n"
            .encode_utf16()
            .flat_map(|u| u.to_be_bytes())
            .collect();
        assert_eq!(TextEncoding::guess(&be), TextEncoding::Utf16Be);
    }

    #[test]
    fn test_guess_utf8_and_latin1() {
        assert_eq!(TextEncoding::guess("héllo\n".as_bytes()), TextEncoding::Utf8);
        assert_eq!(TextEncoding::guess(b"h\xE9llo\n"), TextEncoding::Latin1);
        // Multi-byte sequence cut by the end of the block
        assert_eq!(TextEncoding::guess(b"abc\xC3"), TextEncoding::Utf8);
        assert_eq!(TextEncoding::guess(b""), TextEncoding::Utf8);
    }

    #[test]
    fn test_strip_line_terminator() {
        assert_eq!(TextEncoding::Utf8.strip_line_terminator(b"abc\r\n"), b"abc");
        assert_eq!(TextEncoding::Utf8.strip_line_terminator(b"abc"), b"abc");
        assert_eq!(
            TextEncoding::Utf16Le.strip_line_terminator(&utf16le("ab\r\n")),
            utf16le("ab").as_slice()
        );
    }

    #[test]
    fn test_decode() {
        assert_eq!(TextEncoding::Latin1.decode(b"caf\xE9"), "café");
        assert_eq!(TextEncoding::Utf16Le.decode(&utf16le("añb")), "añb");
        assert_eq!(TextEncoding::Utf8.decode(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("utf-8".parse::<TextEncoding>(), Ok(TextEncoding::Utf8));
        assert_eq!("UTF_16LE".parse::<TextEncoding>(), Ok(TextEncoding::Utf16Le));
        assert_eq!("latin1".parse::<TextEncoding>(), Ok(TextEncoding::Latin1));
        assert!("ebcdic".parse::<TextEncoding>().is_err());
    }
}
