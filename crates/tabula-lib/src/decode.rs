//! Byte-to-character decoding with causal charset detection.
//!
//! Bytes are read in fixed-size chunks. Until a confident detection is
//! made, every non-ASCII chunk is fed to an incremental detector and
//! decoded with the best guess available at that moment. Characters
//! already produced are never revisited.

use crate::error::{Result, TabulaError};
use chardetng::EncodingDetector;
use encoding_rs::{CoderResult, Encoding};
use std::io::{self, Read};
use tracing::{debug, warn};

/// Bytes read (and inspected by the detector) per step.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A source of characters that can be inspected one ahead.
pub trait CharSource {
    fn next_char(&mut self) -> Result<Option<char>>;
    fn peek_char(&mut self) -> Result<Option<char>>;
    /// Release the underlying input. Later reads return `None`.
    fn close(&mut self);
}

/// Character set used to turn bytes into characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// 7-bit ASCII. Bytes above 0x7F decode to U+FFFD.
    Ascii,
    Encoding(&'static Encoding),
}

impl Charset {
    /// Look up a charset by label. `None` when the label is unknown.
    ///
    /// The ASCII labels are handled here because the WHATWG label table
    /// maps them to windows-1252.
    pub fn for_label(label: &str) -> Option<Charset> {
        let label = label.trim().to_ascii_lowercase();
        if matches!(
            label.as_str(),
            "ascii" | "us-ascii" | "iso646-us" | "ansi_x3.4-1968"
        ) {
            return Some(Charset::Ascii);
        }
        Encoding::for_label_no_replacement(label.as_bytes()).map(Charset::Encoding)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Charset::Ascii => "US-ASCII",
            Charset::Encoding(encoding) => encoding.name(),
        }
    }
}

pub struct Decoder {
    name: String,
    reader: Option<Box<dyn Read>>,
    /// Present while detection is still running.
    detector: Option<EncodingDetector>,
    /// Confident, fixed, or best-guess charset; `None` until a guess exists.
    current: Option<Charset>,
    active: Option<(&'static Encoding, encoding_rs::Decoder)>,
    chunk: Vec<u8>,
    text: String,
    pos: usize,
    finished: bool,
}

impl Decoder {
    /// Decoder that detects the encoding from the data.
    pub fn detecting(reader: Box<dyn Read>, name: impl Into<String>) -> Self {
        Self::build(reader, name.into(), Some(EncodingDetector::new()), None)
    }

    pub fn with_charset(reader: Box<dyn Read>, charset: Charset, name: impl Into<String>) -> Self {
        Self::build(reader, name.into(), None, Some(charset))
    }

    /// Decoder for an optional encoding label. Without a label the
    /// encoding is detected; an unknown label degrades to ASCII.
    pub fn for_label(reader: Box<dyn Read>, label: Option<&str>, name: impl Into<String>) -> Self {
        let name = name.into();
        match label {
            None => Self::detecting(reader, name),
            Some(label) => {
                let charset = Charset::for_label(label).unwrap_or_else(|| {
                    warn!(source = %name, encoding = label, "unsupported encoding, reading as US-ASCII");
                    Charset::Ascii
                });
                Self::with_charset(reader, charset, name)
            }
        }
    }

    fn build(
        reader: Box<dyn Read>,
        name: String,
        detector: Option<EncodingDetector>,
        current: Option<Charset>,
    ) -> Self {
        Self {
            name,
            reader: Some(reader),
            detector,
            current,
            active: None,
            chunk: vec![0; DEFAULT_CHUNK_SIZE],
            text: String::new(),
            pos: 0,
            finished: false,
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk = vec![0; size.max(1)];
        self
    }

    /// The charset characters are currently decoded with, if one has
    /// been chosen.
    pub fn charset(&self) -> Option<Charset> {
        self.current
    }

    /// True once the charset will no longer change.
    pub fn is_settled(&self) -> bool {
        self.detector.is_none()
    }

    /// Decode the next chunk into `text`. Returns false at end of input.
    fn fill(&mut self) -> Result<bool> {
        self.text.clear();
        self.pos = 0;
        while self.text.is_empty() {
            if self.finished {
                return Ok(false);
            }
            let len = self.read_chunk()?;
            if len == 0 {
                self.finish_active();
                self.finished = true;
                self.reader = None;
                continue;
            }
            let charset = self.charset_for_chunk(len);
            self.decode_chunk(charset, len);
        }
        Ok(true)
    }

    fn read_chunk(&mut self) -> Result<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        let mut filled = 0;
        while filled < self.chunk.len() {
            match reader.read(&mut self.chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TabulaError::io(self.name.clone(), e)),
            }
        }
        Ok(filled)
    }

    fn charset_for_chunk(&mut self, len: usize) -> Charset {
        let bytes = &self.chunk[..len];
        if let Some(detector) = self.detector.as_mut() {
            if !bytes.is_ascii() {
                detector.feed(bytes, false);
                let (encoding, confident) = detector.guess_assess(None, true);
                if confident {
                    debug!(source = %self.name, encoding = encoding.name(), "detected encoding");
                    self.detector = None;
                } else {
                    debug!(source = %self.name, encoding = encoding.name(), "guessing encoding");
                }
                self.current = Some(Charset::Encoding(encoding));
            }
        }
        self.current.unwrap_or(Charset::Ascii)
    }

    fn decode_chunk(&mut self, charset: Charset, len: usize) {
        let bytes = &self.chunk[..len];
        match charset {
            Charset::Ascii => {
                if let Some((_, mut decoder)) = self.active.take() {
                    decode_into(&mut decoder, &[], &mut self.text, true);
                }
                self.text.extend(
                    bytes
                        .iter()
                        .map(|&b| if b.is_ascii() { char::from(b) } else { '\u{FFFD}' }),
                );
            }
            Charset::Encoding(encoding) => {
                let reuse = matches!(&self.active, Some((active, _)) if *active == encoding);
                if !reuse {
                    if let Some((_, mut previous)) = self.active.take() {
                        decode_into(&mut previous, &[], &mut self.text, true);
                    }
                    self.active = Some((encoding, encoding.new_decoder_with_bom_removal()));
                }
                if let Some((_, decoder)) = self.active.as_mut() {
                    decode_into(decoder, bytes, &mut self.text, false);
                }
            }
        }
    }

    fn finish_active(&mut self) {
        if let Some((_, mut decoder)) = self.active.take() {
            decode_into(&mut decoder, &[], &mut self.text, true);
        }
    }
}

fn decode_into(decoder: &mut encoding_rs::Decoder, mut src: &[u8], dst: &mut String, last: bool) {
    loop {
        let needed = decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 4);
        dst.reserve(needed);
        let (result, read, _) = decoder.decode_to_string(src, dst, last);
        src = &src[read..];
        if let CoderResult::InputEmpty = result {
            break;
        }
    }
}

impl CharSource for Decoder {
    fn next_char(&mut self) -> Result<Option<char>> {
        let c = self.peek_char()?;
        if let Some(c) = c {
            self.pos += c.len_utf8();
        }
        Ok(c)
    }

    fn peek_char(&mut self) -> Result<Option<char>> {
        if self.pos >= self.text.len() && !self.fill()? {
            return Ok(None);
        }
        Ok(self.text[self.pos..].chars().next())
    }

    fn close(&mut self) {
        self.reader = None;
        self.detector = None;
        self.active = None;
        self.text.clear();
        self.pos = 0;
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(decoder: &mut Decoder) -> String {
        let mut out = String::new();
        while let Some(c) = decoder.next_char().unwrap() {
            out.push(c);
        }
        out
    }

    fn detecting(bytes: Vec<u8>) -> Decoder {
        Decoder::detecting(Box::new(Cursor::new(bytes)), "test")
    }

    /// Reader that hands out one byte per call.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    #[test]
    fn ascii_input_skips_detection() {
        let mut decoder = detecting(b"a,b\n1,2\n".to_vec());
        assert_eq!(read_all(&mut decoder), "a,b\n1,2\n");
        assert_eq!(decoder.charset(), None);
    }

    #[test]
    fn utf8_input_is_detected() {
        let text = "Stadt,Land\nZürich,Schweiz\nGenève,Suisse\nKraków,Polska\nMünchen,Deutschland\n";
        let mut decoder = detecting(text.as_bytes().to_vec());
        assert_eq!(read_all(&mut decoder), text);
        assert_eq!(decoder.charset(), Some(Charset::Encoding(encoding_rs::UTF_8)));
    }

    #[test]
    fn latin1_input_is_decoded() {
        let text = "nom,remarque\n\
            Le cœur déçu,mais l'âme plutôt naïve\n\
            Louÿs rêva,de crapaüter en canoë au delà des îles\n\
            près du mälström,où brûlent les novæ\n";
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(text);
        let mut decoder = detecting(bytes.into_owned());
        let out = read_all(&mut decoder);
        assert!(!out.contains('\u{FFFD}'), "{}", out);
        assert!(out.contains("déçu"), "{}", out);
        assert!(out.contains("naïve"), "{}", out);
    }

    #[test]
    fn fixed_charset_survives_chunk_splits() {
        let text = "日本語,テキスト\nüber,ñandú\n";
        for size in [1, 2, 3, 5, 7, 1024] {
            let mut decoder = Decoder::with_charset(
                Box::new(Cursor::new(text.as_bytes().to_vec())),
                Charset::Encoding(encoding_rs::UTF_8),
                "test",
            )
            .with_chunk_size(size);
            assert_eq!(read_all(&mut decoder), text, "chunk size {}", size);
        }
    }

    #[test]
    fn short_reads_fill_whole_chunks() {
        let text = "x,y\nÄrger,Öl\n";
        let mut decoder = Decoder::detecting(
            Box::new(Trickle(Cursor::new(text.as_bytes().to_vec()))),
            "test",
        );
        assert_eq!(read_all(&mut decoder), text);
    }

    #[test]
    fn utf8_bom_is_removed() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("id,näme\n".as_bytes());
        let mut decoder = Decoder::for_label(Box::new(Cursor::new(bytes)), Some("utf-8"), "test");
        assert_eq!(read_all(&mut decoder), "id,näme\n");
    }

    #[test]
    fn ascii_label_replaces_high_bytes() {
        let bytes = vec![b'a', 0xE9, b'b'];
        let mut decoder = Decoder::for_label(Box::new(Cursor::new(bytes)), Some("US-ASCII"), "test");
        assert_eq!(read_all(&mut decoder), "a\u{FFFD}b");
        assert!(decoder.is_settled());
    }

    #[test]
    fn unknown_label_falls_back_to_ascii() {
        let bytes = vec![b'a', 0xE9];
        let mut decoder =
            Decoder::for_label(Box::new(Cursor::new(bytes)), Some("no-such-charset"), "test");
        assert_eq!(decoder.charset(), Some(Charset::Ascii));
        assert_eq!(read_all(&mut decoder), "a\u{FFFD}");
    }

    #[test]
    fn labels_resolve() {
        assert_eq!(
            Charset::for_label("latin1"),
            Some(Charset::Encoding(encoding_rs::WINDOWS_1252))
        );
        assert_eq!(Charset::for_label(" UTF-8 ").map(|c| c.name()), Some("UTF-8"));
        assert_eq!(Charset::for_label("ascii"), Some(Charset::Ascii));
        assert_eq!(Charset::for_label("bogus"), None);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut decoder = detecting(b"ab".to_vec());
        assert_eq!(decoder.peek_char().unwrap(), Some('a'));
        assert_eq!(decoder.peek_char().unwrap(), Some('a'));
        assert_eq!(decoder.next_char().unwrap(), Some('a'));
        assert_eq!(decoder.next_char().unwrap(), Some('b'));
        assert_eq!(decoder.peek_char().unwrap(), None);
    }

    #[test]
    fn close_releases_input() {
        let mut decoder = detecting(b"abc".to_vec()).with_chunk_size(1);
        assert_eq!(decoder.next_char().unwrap(), Some('a'));
        decoder.close();
        assert_eq!(decoder.next_char().unwrap(), None);
    }
}
