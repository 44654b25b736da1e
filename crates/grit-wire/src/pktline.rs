//! pkt-line framing.
//!
//! Every record is a 4-hex-digit length (including the 4 header bytes)
//! followed by the payload. Three lengths are control packets: `0000`
//! flush, `0001` delim, `0002` response-end. Payloads top out at 65516
//! bytes. The decoder is incremental: transports hand over whatever bytes
//! arrived and packets are yielded once complete, so records split across
//! read boundaries reassemble transparently.

use crate::WireError;

/// Largest legal payload: 65520 total minus the 4 header bytes.
pub const MAX_PAYLOAD: usize = 65516;

/// One decoded pkt-line record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    /// A data record.
    Data(Vec<u8>),
    /// `0000` — section terminator.
    Flush,
    /// `0001` — delimiter between command sections (v2).
    Delim,
    /// `0002` — response end (v2 stateless).
    ResponseEnd,
}

impl Packet {
    /// Payload bytes for data packets, empty for control packets.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match self {
            Self::Data(data) => data,
            _ => &[],
        }
    }

    /// Payload as text with the conventional trailing newline stripped.
    #[must_use]
    pub fn text(&self) -> String {
        let data = self.data();
        let data = data.strip_suffix(b"\n").unwrap_or(data);
        String::from_utf8_lossy(data).into_owned()
    }
}

/// Encode one data packet.
///
/// # Errors
/// [`WireError::Oversize`] when the payload exceeds [`MAX_PAYLOAD`].
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(WireError::Oversize(payload.len()));
    }
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(format!("{:04x}", payload.len() + 4).as_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// The flush packet bytes.
pub const FLUSH: &[u8; 4] = b"0000";
/// The delim packet bytes.
pub const DELIM: &[u8; 4] = b"0001";
/// The response-end packet bytes.
pub const RESPONSE_END: &[u8; 4] = b"0002";

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Accumulates an outgoing pkt-line stream.
#[derive(Default)]
pub struct PktWriter {
    out: Vec<u8>,
}

impl PktWriter {
    /// An empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text line; a trailing newline is added, matching how git
    /// frames protocol text.
    pub fn text(&mut self, line: &str) -> Result<(), WireError> {
        let mut payload = line.as_bytes().to_vec();
        payload.push(b'\n');
        self.out.extend_from_slice(&encode(&payload)?);
        Ok(())
    }

    /// Append a binary payload verbatim.
    pub fn data(&mut self, payload: &[u8]) -> Result<(), WireError> {
        self.out.extend_from_slice(&encode(payload)?);
        Ok(())
    }

    /// Append a flush packet.
    pub fn flush(&mut self) {
        self.out.extend_from_slice(FLUSH);
    }

    /// Append a delim packet.
    pub fn delim(&mut self) {
        self.out.extend_from_slice(DELIM);
    }

    /// Append raw bytes (a packfile riding after the request).
    pub fn raw(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    /// Take the accumulated stream.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Incremental pkt-line decoder.
///
/// Feed arbitrary chunks; [`next_packet`](Self::next_packet) yields
/// complete records and returns `None` while a record is still partial.
#[derive(Default)]
pub struct PktReader {
    buf: Vec<u8>,
    pos: usize,
}

impl PktReader {
    /// An empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append transport bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        // Compact consumed space before growing.
        if self.pos > 0 && self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Unconsumed bytes (a packfile after the last packet, for example).
    #[must_use]
    pub fn remainder(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Consume and return the remainder.
    #[must_use]
    pub fn take_remainder(&mut self) -> Vec<u8> {
        let rest = self.buf[self.pos..].to_vec();
        self.buf.clear();
        self.pos = 0;
        rest
    }

    /// Decode the next complete packet, if the buffer holds one.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, WireError> {
        let avail = &self.buf[self.pos..];
        if avail.len() < 4 {
            return Ok(None);
        }
        let header = std::str::from_utf8(&avail[..4])
            .ok()
            .and_then(|s| u16::from_str_radix(s, 16).ok())
            .ok_or_else(|| {
                WireError::Pktline(format!("bad length header {:?}", &avail[..4]))
            })?;
        match header {
            0 => {
                self.pos += 4;
                Ok(Some(Packet::Flush))
            }
            1 => {
                self.pos += 4;
                Ok(Some(Packet::Delim))
            }
            2 => {
                self.pos += 4;
                Ok(Some(Packet::ResponseEnd))
            }
            3 => Err(WireError::Pktline("length 0003 is invalid".into())),
            len => {
                let total = len as usize;
                if total > MAX_PAYLOAD + 4 {
                    return Err(WireError::Pktline(format!("length {total} too large")));
                }
                if avail.len() < total {
                    return Ok(None);
                }
                let payload = avail[4..total].to_vec();
                self.pos += total;
                Ok(Some(Packet::Data(payload)))
            }
        }
    }

    /// Decode everything currently buffered.
    pub fn drain(&mut self) -> Result<Vec<Packet>, WireError> {
        let mut out = Vec::new();
        while let Some(packet) = self.next_packet()? {
            out.push(packet);
        }
        Ok(out)
    }
}

/// Decode a complete byte buffer into packets; trailing partial data is an
/// error (use [`PktReader`] for streams).
pub fn parse_all(bytes: &[u8]) -> Result<Vec<Packet>, WireError> {
    let mut reader = PktReader::new();
    reader.feed(bytes);
    let packets = reader.drain()?;
    if !reader.remainder().is_empty() {
        return Err(WireError::Pktline(format!(
            "{} trailing bytes after last packet",
            reader.remainder().len()
        )));
    }
    Ok(packets)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_known_forms() {
        assert_eq!(encode(b"").unwrap(), b"0004");
        assert_eq!(encode(b"a\n").unwrap(), b"0006a\n");
        assert_eq!(
            encode(b"want deadbeef\n").unwrap()[..4].to_vec(),
            b"0012".to_vec()
        );
    }

    #[test]
    fn oversize_rejected() {
        let big = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(encode(&big), Err(WireError::Oversize(_))));
        assert!(encode(&big[..MAX_PAYLOAD]).is_ok());
    }

    #[test]
    fn control_packets_decode() {
        let packets = parse_all(b"000000010002").unwrap();
        assert_eq!(
            packets,
            vec![Packet::Flush, Packet::Delim, Packet::ResponseEnd]
        );
    }

    #[test]
    fn boundary_split_reassembles() {
        let encoded = encode(b"hello world\n").unwrap();
        let mut reader = PktReader::new();
        // Byte-at-a-time worst case.
        for &byte in &encoded[..encoded.len() - 1] {
            reader.feed(&[byte]);
            assert_eq!(reader.next_packet().unwrap(), None);
        }
        reader.feed(&encoded[encoded.len() - 1..]);
        assert_eq!(
            reader.next_packet().unwrap(),
            Some(Packet::Data(b"hello world\n".to_vec()))
        );
    }

    #[test]
    fn remainder_after_flush_is_preserved() {
        let mut bytes = encode(b"header\n").unwrap();
        bytes.extend_from_slice(FLUSH);
        bytes.extend_from_slice(b"PACKDATA");
        let mut reader = PktReader::new();
        reader.feed(&bytes);
        assert!(matches!(reader.next_packet().unwrap(), Some(Packet::Data(_))));
        assert_eq!(reader.next_packet().unwrap(), Some(Packet::Flush));
        assert_eq!(reader.take_remainder(), b"PACKDATA");
    }

    #[test]
    fn invalid_length_0003() {
        assert!(parse_all(b"0003").is_err());
    }

    #[test]
    fn writer_text_appends_newline() {
        let mut writer = PktWriter::new();
        writer.text("command=ls-refs").unwrap();
        writer.delim();
        writer.flush();
        let bytes = writer.into_bytes();
        let packets = parse_all(&bytes).unwrap();
        assert_eq!(packets[0].text(), "command=ls-refs");
        assert_eq!(packets[1], Packet::Delim);
        assert_eq!(packets[2], Packet::Flush);
    }

    proptest! {
        /// encode ∘ decode is the identity for any payload up to the cap,
        /// including NUL-bearing binary.
        #[test]
        fn encode_decode_identity(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let encoded = encode(&payload).unwrap();
            let packets = parse_all(&encoded).unwrap();
            prop_assert_eq!(packets, vec![Packet::Data(payload)]);
        }
    }

    #[test]
    fn encode_decode_identity_at_max() {
        let payload = vec![0xa5u8; MAX_PAYLOAD];
        let encoded = encode(&payload).unwrap();
        let packets = parse_all(&encoded).unwrap();
        assert_eq!(packets, vec![Packet::Data(payload)]);
    }
}
