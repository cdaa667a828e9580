//! Server greeting: the ref advertisement.
//!
//! The first line carries the capability list after a NUL byte:
//! `<hex40> <refname>\0<cap> <cap>...`; every following line is
//! `<hex40> <refname>`, and a flush packet ends the section.

use std::io::Read;

use bstr::ByteSlice;
use gitfetch_hash::ObjectId;

use crate::capability::Capabilities;
use crate::pktline::{PktLine, PktLineReader};
use crate::refs::Ref;
use crate::FetchError;

/// Parse a complete ref advertisement from the stream.
pub fn parse_ref_advertisement<R: Read>(
    reader: &mut PktLineReader<R>,
) -> Result<(Vec<Ref>, Capabilities), FetchError> {
    let mut refs = Vec::new();
    let mut capabilities = Capabilities::default();
    let mut first_line = true;

    loop {
        match reader.read_pkt()? {
            PktLine::Flush => break,
            PktLine::Data(data) => {
                let line = strip_newline(&data);

                // Smart-HTTP prologue ("# service=git-upload-pack").
                if line.is_empty() || line.starts_with(b"#") {
                    continue;
                }

                if first_line {
                    first_line = false;
                    if let Some(nul) = line.iter().position(|&b| b == 0) {
                        capabilities =
                            Capabilities::parse(&String::from_utf8_lossy(&line[nul + 1..]));
                        parse_ref_line(&line[..nul], &mut refs)?;
                        continue;
                    }
                }
                parse_ref_line(line, &mut refs)?;
            }
        }
    }

    Ok((refs, capabilities))
}

/// Parse one `<hex40> <refname>` line.
fn parse_ref_line(line: &[u8], refs: &mut Vec<Ref>) -> Result<(), FetchError> {
    let space = line.iter().position(|&b| b == b' ').ok_or_else(|| {
        FetchError::Protocol(format!(
            "invalid ref advertisement line: {}",
            line.as_bstr()
        ))
    })?;

    let hex = std::str::from_utf8(&line[..space])
        .map_err(|_| FetchError::Protocol("non-UTF8 object id in advertisement".into()))?;
    let oid = ObjectId::from_hex(hex).map_err(|e| {
        FetchError::Protocol(format!("invalid object id in advertisement: {e}"))
    })?;

    refs.push(Ref::new(&line[space + 1..], oid));
    Ok(())
}

fn strip_newline(data: &[u8]) -> &[u8] {
    match data.last() {
        Some(b'\n') => &data[..data.len() - 1],
        _ => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::PktLineWriter;
    use std::io::Cursor;

    const OID: &str = "95d09f2b10159347eece71399a7e2e907ea3df4f";

    fn advertisement(refs: &[(&str, &str)], caps: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = PktLineWriter::new(&mut buf);
        for (i, (oid, name)) in refs.iter().enumerate() {
            if i == 0 && !caps.is_empty() {
                writer
                    .write_text(&format!("{oid} {name}\0{caps}"))
                    .unwrap();
            } else {
                writer.write_text(&format!("{oid} {name}")).unwrap();
            }
        }
        writer.write_flush().unwrap();
        buf
    }

    #[test]
    fn parses_refs_and_capabilities() {
        let buf = advertisement(
            &[(OID, "HEAD"), (OID, "refs/heads/main")],
            "multi_ack side-band-64k ofs-delta shallow agent=git/2.39.0",
        );
        let mut reader = PktLineReader::new(Cursor::new(buf));
        let (refs, caps) = parse_ref_advertisement(&mut reader).unwrap();

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "HEAD");
        assert_eq!(refs[1].name, "refs/heads/main");
        assert_eq!(refs[0].old_oid.to_hex(), OID);
        assert!(caps.supports("multi_ack"));
        assert!(caps.supports("shallow"));
        assert_eq!(caps.value("agent"), Some("git/2.39.0"));
    }

    #[test]
    fn empty_advertisement() {
        let mut reader = PktLineReader::new(Cursor::new(&b"0000"[..]));
        let (refs, caps) = parse_ref_advertisement(&mut reader).unwrap();
        assert!(refs.is_empty());
        assert!(!caps.supports("multi_ack"));
    }

    #[test]
    fn skips_service_prologue() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_text("# service=git-upload-pack").unwrap();
            writer.write_text(&format!("{OID} refs/heads/main\0shallow")).unwrap();
            writer.write_flush().unwrap();
        }
        let mut reader = PktLineReader::new(Cursor::new(buf));
        let (refs, caps) = parse_ref_advertisement(&mut reader).unwrap();
        assert_eq!(refs.len(), 1);
        assert!(caps.supports("shallow"));
    }

    #[test]
    fn rejects_garbage_line() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_text("nonsense").unwrap();
            writer.write_flush().unwrap();
        }
        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert!(parse_ref_advertisement(&mut reader).is_err());
    }

    #[test]
    fn rejects_bad_oid() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_text("zzzz refs/heads/main").unwrap();
            writer.write_flush().unwrap();
        }
        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert!(parse_ref_advertisement(&mut reader).is_err());
    }
}
