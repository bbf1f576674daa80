//! Git pkt-line framing.
//!
//! Every protocol message is prefixed with its total length (payload plus the
//! four prefix bytes) as four lowercase hex digits. `0000` is the flush packet
//! that ends a section; `0001` and `0002` are the protocol v2 delimiter and
//! response-end packets.

use crate::{GitError, Result};
use std::io::{Read, Write};

/// Largest encoded packet, prefix included, that fits the 4-hex-digit length field.
pub const MAX_PKT_LEN: usize = 0xffff;

/// Largest payload a single data packet can carry.
pub const MAX_PAYLOAD_LEN: usize = MAX_PKT_LEN - 4;

const FLUSH: &[u8; 4] = b"0000";

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content.
    Data(Vec<u8>),
    /// Flush packet (0000).
    Flush,
    /// Delimiter packet (0001).
    Delimiter,
    /// Response-end packet (0002).
    ResponseEnd,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Creates a data packet from bytes.
    pub fn from_bytes(b: impl Into<Vec<u8>>) -> Self {
        Self::Data(b.into())
    }

    /// Encodes the packet to bytes.
    ///
    /// # Panics
    ///
    /// Panics if a data payload is longer than [`MAX_PAYLOAD_LEN`].
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(data) => encode_line(data),
            Self::Flush => FLUSH.to_vec(),
            Self::Delimiter => b"0001".to_vec(),
            Self::ResponseEnd => b"0002".to_vec(),
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    /// Returns the data content, or None for special packets.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the data as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }
}

/// Frames `payload` as a single data packet.
///
/// # Panics
///
/// Panics if `payload` is longer than [`MAX_PAYLOAD_LEN`]. Callers frame
/// short protocol text, so an oversized payload is a bug at the call site.
pub fn encode_line(payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "pkt-line payload of {} bytes exceeds {} byte limit",
        payload.len(),
        MAX_PAYLOAD_LEN
    );

    let len = payload.len() + 4;
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(format!("{len:04x}").as_bytes());
    out.extend_from_slice(payload);
    out
}

/// The flush packet that terminates a section.
pub fn flush_marker() -> &'static [u8] {
    FLUSH
}

/// Builds the preamble a smart server sends before a ref advertisement:
/// `# service=<service>\n` as one packet, followed by a flush.
pub fn service_header(service: &str) -> Vec<u8> {
    let mut out = encode_line(format!("# service={service}\n").as_bytes());
    out.extend_from_slice(flush_marker());
    out
}

/// Reader for pkt-line format.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    /// Creates a new pkt-line reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet. Returns `Ok(None)` at a clean end of input.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        match &len_buf {
            b"0000" => return Ok(Some(PktLine::Flush)),
            b"0001" => return Ok(Some(PktLine::Delimiter)),
            b"0002" => return Ok(Some(PktLine::ResponseEnd)),
            _ => {}
        }

        let len = parse_length(&len_buf)?;
        if len < 4 {
            return Err(GitError::InvalidPktLine(format!(
                "length {len:04x} is too small"
            )));
        }

        let mut data = vec![0u8; len - 4];
        self.reader.read_exact(&mut data)?;

        Ok(Some(PktLine::Data(data)))
    }

    /// Reads all packets until a flush packet.
    pub fn read_until_flush(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        loop {
            match self.read()? {
                Some(PktLine::Flush) | None => break,
                Some(pkt) => packets.push(pkt),
            }
        }
        Ok(packets)
    }

    /// Consumes the reader and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn parse_length(prefix: &[u8; 4]) -> Result<usize> {
    prefix.iter().try_fold(0usize, |acc, b| {
        let digit = (*b as char).to_digit(16).ok_or_else(|| {
            GitError::InvalidPktLine(format!(
                "invalid length prefix {:?}",
                String::from_utf8_lossy(prefix)
            ))
        })?;
        Ok(acc * 16 + digit as usize)
    })
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode())?;
        Ok(())
    }

    /// Writes a data line.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(&encode_line(data))?;
        Ok(())
    }

    /// Writes a string line, appending a newline if it lacks one.
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write_data(&data)
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.writer.write_all(flush_marker())?;
        Ok(())
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_line() {
        assert_eq!(encode_line(b"hello\n"), b"000ahello\n");
        assert_eq!(encode_line(b""), b"0004");
    }

    #[test]
    fn test_flush_marker() {
        assert_eq!(flush_marker(), b"0000");
        assert_eq!(PktLine::Flush.encode(), flush_marker());
    }

    #[test]
    fn test_special_packets_encode() {
        assert_eq!(PktLine::Delimiter.encode(), b"0001");
        assert_eq!(PktLine::ResponseEnd.encode(), b"0002");
    }

    #[test]
    fn test_service_header() {
        assert_eq!(
            service_header("git-upload-pack"),
            b"001e# service=git-upload-pack\n0000".to_vec()
        );
        assert_eq!(
            service_header("git-receive-pack"),
            b"001f# service=git-receive-pack\n0000".to_vec()
        );
    }

    #[test]
    fn test_prefix_is_lowercase() {
        let encoded = encode_line(&[b'x'; 0xfa - 4]);
        assert_eq!(&encoded[..4], b"00fa");
    }

    #[test]
    fn test_max_payload_fits() {
        let encoded = encode_line(&vec![0u8; MAX_PAYLOAD_LEN]);
        assert_eq!(&encoded[..4], b"ffff");
        assert_eq!(encoded.len(), MAX_PKT_LEN);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn test_oversized_payload_panics() {
        encode_line(&vec![0u8; MAX_PAYLOAD_LEN + 1]);
    }

    #[test]
    fn test_pktline_roundtrip() {
        let packets = vec![
            PktLine::from_string("hello\n"),
            PktLine::from_string("world\n"),
            PktLine::Flush,
        ];

        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            for pkt in &packets {
                writer.write(pkt).unwrap();
            }
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read().unwrap(), Some(packets[0].clone()));
        assert_eq!(reader.read().unwrap(), Some(packets[1].clone()));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Flush));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn test_read_special_packets() {
        let mut reader = PktLineReader::new(Cursor::new(b"000100020000".to_vec()));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Delimiter));
        assert_eq!(reader.read().unwrap(), Some(PktLine::ResponseEnd));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Flush));
    }

    #[test]
    fn test_read_rejects_short_length() {
        let mut reader = PktLineReader::new(Cursor::new(b"0003".to_vec()));
        assert!(matches!(reader.read(), Err(GitError::InvalidPktLine(_))));
    }

    #[test]
    fn test_read_rejects_non_hex_prefix() {
        let mut reader = PktLineReader::new(Cursor::new(b"+00a".to_vec()));
        assert!(matches!(reader.read(), Err(GitError::InvalidPktLine(_))));

        let mut reader = PktLineReader::new(Cursor::new(b"zzzz".to_vec()));
        assert!(matches!(reader.read(), Err(GitError::InvalidPktLine(_))));
    }

    #[test]
    fn test_read_truncated_payload() {
        let mut reader = PktLineReader::new(Cursor::new(b"000ahel".to_vec()));
        assert!(matches!(reader.read(), Err(GitError::Io(_))));
    }

    #[test]
    fn test_read_until_flush() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_line("line1").unwrap();
            writer.write_line("line2").unwrap();
            writer.flush_pkt().unwrap();
            writer.write_line("line3").unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        let packets = reader.read_until_flush().unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].as_str(), Some("line2"));
        assert_eq!(reader.read().unwrap().unwrap().as_str(), Some("line3"));
    }

    #[test]
    fn test_write_line_does_not_double_newline() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_line("test\n").unwrap();
        }
        assert_eq!(buf, b"0009test\n");
    }

    #[test]
    fn test_as_str_invalid_utf8() {
        let pkt = PktLine::from_bytes(vec![0xff, 0xfe]);
        assert!(pkt.as_str().is_none());
        assert!(PktLine::Flush.data().is_none());
    }

    #[test]
    fn test_advertisement_preamble_decodes() {
        let mut body = service_header("git-upload-pack");
        body.extend_from_slice(b"raw advertisement");

        let mut reader = PktLineReader::new(Cursor::new(body));
        let header = reader.read().unwrap().unwrap();
        assert_eq!(header.as_str(), Some("# service=git-upload-pack"));
        assert!(reader.read().unwrap().unwrap().is_flush());

        let mut rest = Vec::new();
        reader.into_inner().read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"raw advertisement");
    }

    proptest! {
        #[test]
        fn prop_encode_line_prefix(payload in prop::collection::vec(any::<u8>(), 0..2048)) {
            let encoded = encode_line(&payload);
            prop_assert_eq!(encoded.len(), payload.len() + 4);

            let prefix = std::str::from_utf8(&encoded[..4]).unwrap();
            prop_assert!(prefix.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            prop_assert_eq!(usize::from_str_radix(prefix, 16).unwrap(), payload.len() + 4);
            prop_assert!(prefix >= "0004");
            prop_assert_ne!(prefix, "0000");
        }

        #[test]
        fn prop_encode_decode_roundtrip(payload in prop::collection::vec(any::<u8>(), 0..4096)) {
            let mut reader = PktLineReader::new(Cursor::new(encode_line(&payload)));
            prop_assert_eq!(reader.read().unwrap(), Some(PktLine::Data(payload)));
            prop_assert_eq!(reader.read().unwrap(), None);
        }

        #[test]
        fn prop_reader_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            let mut reader = PktLineReader::new(Cursor::new(data));
            for _ in 0..64 {
                match reader.read() {
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }
}
