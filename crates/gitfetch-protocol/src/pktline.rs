//! Pkt-line protocol framing.
//!
//! Every packet is prefixed with 4 hex digits giving the total length,
//! including the 4 bytes of the length field itself. A length of `0000` is
//! a flush packet carrying no payload; it delimits logical sections and is
//! distinct from a zero-byte data packet (`0004`).

use std::io::{Read, Write};

use crate::FetchError;

/// Largest packet on a side-band-64k stream, including the length field.
pub const LARGE_PACKET_MAX: usize = 65520;

/// Largest packet otherwise, including the length field.
pub const SMALL_PACKET_MAX: usize = 1000;

/// Maximum data bytes in one packet (large framing).
pub const MAX_PKT_DATA_LEN: usize = LARGE_PACKET_MAX - 4;

/// One received packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Normal data line.
    Data(Vec<u8>),
    /// Flush packet (`0000`) — end of section.
    Flush,
}

/// Pkt-line reader over a byte stream.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Get a mutable reference to the inner reader.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consume the reader and return the inner value.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read one pkt-line.
    pub fn read_pkt(&mut self) -> Result<PktLine, FetchError> {
        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FetchError::Protocol("unexpected EOF reading pkt-line length".into())
            } else {
                FetchError::Io(e)
            }
        })?;

        let len_str = std::str::from_utf8(&len_buf).map_err(|_| {
            FetchError::InvalidPktLine(format!("invalid pkt-line length bytes: {:?}", len_buf))
        })?;

        let len = usize::from_str_radix(len_str, 16).map_err(|_| {
            FetchError::InvalidPktLine(format!("invalid pkt-line length: {:?}", len_str))
        })?;

        match len {
            0 => Ok(PktLine::Flush),
            // 0001-0003 cannot frame any payload; this protocol revision
            // has no delimiter packets.
            1..=3 => Err(FetchError::InvalidPktLine(format!(
                "invalid pkt-line length {len}"
            ))),
            _ => {
                let data_len = len - 4;
                if data_len > MAX_PKT_DATA_LEN {
                    return Err(FetchError::InvalidPktLine(format!(
                        "pkt-line too long: {data_len} bytes"
                    )));
                }
                let mut data = vec![0u8; data_len];
                self.reader.read_exact(&mut data)?;
                Ok(PktLine::Data(data))
            }
        }
    }

    /// Read one data line. Returns `None` on a flush packet.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>, FetchError> {
        match self.read_pkt()? {
            PktLine::Data(data) => Ok(Some(data)),
            PktLine::Flush => Ok(None),
        }
    }

    /// Read one text line: trailing newline stripped, lossily decoded.
    /// Returns `None` on a flush packet.
    pub fn read_text_line(&mut self) -> Result<Option<String>, FetchError> {
        Ok(self.read_line()?.map(|mut data| {
            if data.last() == Some(&b'\n') {
                data.pop();
            }
            String::from_utf8_lossy(&data).into_owned()
        }))
    }
}

/// Pkt-line writer over a byte stream.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Get a mutable reference to the inner writer.
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Consume the writer and return the inner value.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write a data packet.
    pub fn write_packet(&mut self, data: &[u8]) -> Result<(), FetchError> {
        if data.len() > MAX_PKT_DATA_LEN {
            return Err(FetchError::InvalidPktLine(format!(
                "data too long for pkt-line: {} bytes (max {})",
                data.len(),
                MAX_PKT_DATA_LEN
            )));
        }
        write!(self.writer, "{:04x}", data.len() + 4)?;
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Write a text line, appending `\n` if absent.
    pub fn write_text(&mut self, text: &str) -> Result<(), FetchError> {
        if text.ends_with('\n') {
            self.write_packet(text.as_bytes())
        } else {
            let mut data = Vec::with_capacity(text.len() + 1);
            data.extend_from_slice(text.as_bytes());
            data.push(b'\n');
            self.write_packet(&data)
        }
    }

    /// Write a flush packet (`0000`).
    pub fn write_flush(&mut self) -> Result<(), FetchError> {
        self.writer.write_all(b"0000")?;
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), FetchError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_and_read_data_line() {
        let mut buf = Vec::new();
        PktLineWriter::new(&mut buf).write_packet(b"hello").unwrap();
        assert_eq!(&buf, b"0009hello");

        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read_line().unwrap().unwrap(), b"hello");
    }

    #[test]
    fn text_line_gets_newline() {
        let mut buf = Vec::new();
        PktLineWriter::new(&mut buf).write_text("have abc").unwrap();
        assert_eq!(&buf, b"000dhave abc\n");
    }

    #[test]
    fn flush_roundtrip() {
        let mut buf = Vec::new();
        PktLineWriter::new(&mut buf).write_flush().unwrap();
        assert_eq!(&buf, b"0000");

        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read_pkt().unwrap(), PktLine::Flush);
    }

    #[test]
    fn flush_is_distinct_from_empty_data() {
        // 0004 frames a zero-byte data packet; 0000 is a flush.
        let mut reader = PktLineReader::new(Cursor::new(&b"00040000"[..]));
        assert_eq!(reader.read_line().unwrap(), Some(Vec::new()));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn reserved_lengths_are_rejected() {
        for frame in [&b"0001"[..], b"0002", b"0003"] {
            let mut reader = PktLineReader::new(Cursor::new(frame));
            assert!(matches!(
                reader.read_pkt(),
                Err(FetchError::InvalidPktLine(_))
            ));
        }
    }

    #[test]
    fn bad_length_digits_are_rejected() {
        let mut reader = PktLineReader::new(Cursor::new(&b"zzzz"[..]));
        assert!(matches!(
            reader.read_pkt(),
            Err(FetchError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn eof_is_a_protocol_error() {
        let mut reader = PktLineReader::new(Cursor::new(&b""[..]));
        assert!(matches!(reader.read_pkt(), Err(FetchError::Protocol(_))));
    }

    #[test]
    fn oversized_write_is_rejected() {
        let mut buf = Vec::new();
        let data = vec![0u8; MAX_PKT_DATA_LEN + 1];
        assert!(PktLineWriter::new(&mut buf).write_packet(&data).is_err());
    }

    #[test]
    fn read_text_line_strips_newline() {
        let mut buf = Vec::new();
        {
            let mut w = PktLineWriter::new(&mut buf);
            w.write_text("NAK").unwrap();
            w.write_flush().unwrap();
        }
        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read_text_line().unwrap().as_deref(), Some("NAK"));
        assert_eq!(reader.read_text_line().unwrap(), None);
    }

    #[test]
    fn sections_are_flush_delimited() {
        let mut buf = Vec::new();
        {
            let mut w = PktLineWriter::new(&mut buf);
            w.write_text("one").unwrap();
            w.write_flush().unwrap();
            w.write_text("two").unwrap();
            w.write_flush().unwrap();
        }
        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read_line().unwrap().unwrap(), b"one\n");
        assert_eq!(reader.read_line().unwrap(), None);
        assert_eq!(reader.read_line().unwrap().unwrap(), b"two\n");
        assert_eq!(reader.read_line().unwrap(), None);
    }
}
