//! upload-pack request building and response parsing (fetch side).
//!
//! v1: the first `want` carries the negotiated capabilities, further
//! `want`s just the OID; then `shallow` lines, `deepen*` lines, a flush,
//! `have` batches, and `done`. The server answers with shallow/unshallow
//! lines (when deepening), ACK/NAK lines, then the (possibly sideband)
//! packfile.
//!
//! v2: a single `command=fetch` body with `want`/`have`/`done` arguments;
//! the response is sectioned (`shallow-info`, `acknowledgments`,
//! `packfile`) separated by delimiters.

use grit_odb::Oid;

use crate::WireError;
use crate::caps::CapabilitySet;
use crate::pktline::{Packet, PktWriter};

/// Depth/time/exclusion bounds for a shallow fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DepthSpec {
    /// `deepen N` — commit depth from each want.
    pub depth: Option<u32>,
    /// `deepen-since <unix seconds>`.
    pub since: Option<i64>,
    /// `deepen-not <rev>` exclusions.
    pub exclude: Vec<String>,
    /// `deepen-relative` — depth counts from the current shallow
    /// boundary instead of the remote tips.
    pub relative: bool,
}

impl DepthSpec {
    /// Whether any shallow bound was requested.
    #[must_use]
    pub fn is_shallow(&self) -> bool {
        self.depth.is_some() || self.since.is_some() || !self.exclude.is_empty()
    }
}

/// A v1 upload-pack request.
#[derive(Clone, Debug, Default)]
pub struct UploadPackRequest {
    /// Objects the client wants.
    pub wants: Vec<Oid>,
    /// Capabilities to announce on the first want line.
    pub capabilities: Vec<String>,
    /// Commits currently in the client's shallow set.
    pub shallow: Vec<Oid>,
    /// Shallow bounds.
    pub depth: DepthSpec,
    /// Commits the client already has (one negotiation round).
    pub haves: Vec<Oid>,
    /// Whether to close negotiation with `done`.
    pub done: bool,
}

impl UploadPackRequest {
    /// Serialize to the request body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut writer = PktWriter::new();
        for (i, want) in self.wants.iter().enumerate() {
            if i == 0 && !self.capabilities.is_empty() {
                writer.text(&format!("want {want} {}", self.capabilities.join(" ")))?;
            } else {
                writer.text(&format!("want {want}"))?;
            }
        }
        for shallow in &self.shallow {
            writer.text(&format!("shallow {shallow}"))?;
        }
        if let Some(depth) = self.depth.depth {
            writer.text(&format!("deepen {depth}"))?;
        }
        if let Some(since) = self.depth.since {
            writer.text(&format!("deepen-since {since}"))?;
        }
        for exclude in &self.depth.exclude {
            writer.text(&format!("deepen-not {exclude}"))?;
        }
        if self.depth.relative {
            writer.text("deepen-relative")?;
        }
        writer.flush();
        for have in &self.haves {
            writer.text(&format!("have {have}"))?;
        }
        if self.done {
            writer.text("done")?;
        } else {
            writer.flush();
        }
        Ok(writer.into_bytes())
    }
}

/// Build a v2 `command=fetch` request body.
pub fn fetch_request_v2(
    request: &UploadPackRequest,
    agent: &str,
    sideband: bool,
) -> Result<Vec<u8>, WireError> {
    let mut writer = PktWriter::new();
    writer.text("command=fetch")?;
    writer.text(&format!("agent={agent}"))?;
    writer.delim();
    writer.text("ofs-delta")?;
    if sideband {
        writer.text("sideband-all")?;
    }
    for want in &request.wants {
        writer.text(&format!("want {want}"))?;
    }
    for shallow in &request.shallow {
        writer.text(&format!("shallow {shallow}"))?;
    }
    if let Some(depth) = request.depth.depth {
        writer.text(&format!("deepen {depth}"))?;
    }
    if let Some(since) = request.depth.since {
        writer.text(&format!("deepen-since {since}"))?;
    }
    for exclude in &request.depth.exclude {
        writer.text(&format!("deepen-not {exclude}"))?;
    }
    if request.depth.relative {
        writer.text("deepen-relative")?;
    }
    for have in &request.haves {
        writer.text(&format!("have {have}"))?;
    }
    if request.done {
        writer.text("done")?;
    }
    writer.flush();
    Ok(writer.into_bytes())
}

/// Server acknowledgment of one `have`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ack {
    /// `ACK <oid>` — final acknowledgment.
    Ack(Oid),
    /// `ACK <oid> common|continue|ready` — multi-ack detail.
    AckDetail(Oid, String),
    /// `NAK` — nothing in common yet.
    Nak,
}

/// Parsed prelude of an upload-pack response: shallow updates and acks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchPrelude {
    /// New shallow boundary commits.
    pub shallow: Vec<Oid>,
    /// Commits no longer shallow.
    pub unshallow: Vec<Oid>,
    /// Acknowledgment lines in order.
    pub acks: Vec<Ack>,
    /// `true` when the server signalled the packfile follows (v2
    /// `packfile` section header, or any ACK-final/NAK in v1).
    pub pack_follows: bool,
}

/// Incrementally parse response packets up to the start of pack data.
///
/// Handles both v1 (bare lines then raw/sideband pack) and v2 (sectioned)
/// shapes; section headers `shallow-info`, `acknowledgments`, `packfile`
/// are recognized and skipped.
pub fn parse_fetch_prelude(packets: &[Packet]) -> Result<(FetchPrelude, usize), WireError> {
    let mut prelude = FetchPrelude::default();
    for (i, packet) in packets.iter().enumerate() {
        let line = match packet {
            Packet::Data(line) => line,
            Packet::Flush | Packet::Delim | Packet::ResponseEnd => continue,
        };
        // Sideband means pack data started; everything from here on is
        // the demuxer's problem.
        if prelude.pack_follows && !line.is_empty() && matches!(line[0], 1..=3) {
            return Ok((prelude, i));
        }
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\n');
        if let Some(rest) = text.strip_prefix("shallow ") {
            prelude.shallow.push(parse_oid(rest)?);
        } else if let Some(rest) = text.strip_prefix("unshallow ") {
            prelude.unshallow.push(parse_oid(rest)?);
        } else if text == "NAK" {
            prelude.acks.push(Ack::Nak);
            prelude.pack_follows = true;
        } else if let Some(rest) = text.strip_prefix("ACK ") {
            match rest.split_once(' ') {
                Some((hex, detail)) => prelude
                    .acks
                    .push(Ack::AckDetail(parse_oid(hex)?, detail.to_owned())),
                None => {
                    prelude.acks.push(Ack::Ack(parse_oid(rest)?));
                    prelude.pack_follows = true;
                }
            }
        } else if text == "packfile" {
            prelude.pack_follows = true;
            return Ok((prelude, i + 1));
        } else if text == "shallow-info" || text == "acknowledgments" || text == "ready" {
            if text == "ready" {
                prelude.pack_follows = true;
            }
        } else if let Some(err) = text.strip_prefix("ERR ") {
            return Err(WireError::Remote(err.to_owned()));
        } else {
            // Pack data not wrapped in sideband starts with "PACK".
            if line.starts_with(b"PACK") {
                return Ok((prelude, i));
            }
            return Err(WireError::Protocol(format!(
                "unexpected upload-pack line {text:?}"
            )));
        }
    }
    Ok((prelude, packets.len()))
}

/// Select the capabilities a client announces, given what the server
/// offers and what the request needs. Returns `Err` with the missing
/// capability name when a required one is absent.
pub fn choose_capabilities(
    server: &CapabilitySet,
    depth: &DepthSpec,
    agent: &str,
) -> Result<Vec<String>, String> {
    let mut chosen = Vec::new();
    for candidate in ["multi_ack_detailed", "no-done", "side-band-64k", "ofs-delta"] {
        if server.has(candidate) {
            chosen.push(candidate.to_owned());
        }
    }
    if depth.is_shallow() && !server.has("shallow") {
        return Err("shallow".to_owned());
    }
    if depth.is_shallow() {
        chosen.push("shallow".to_owned());
    }
    if depth.since.is_some() && !server.has("deepen-since") {
        return Err("deepen-since".to_owned());
    }
    if !depth.exclude.is_empty() && !server.has("deepen-not") {
        return Err("deepen-not".to_owned());
    }
    if depth.relative {
        if !server.has("deepen-relative") {
            return Err("deepen-relative".to_owned());
        }
        chosen.push("deepen-relative".to_owned());
    }
    chosen.push(format!("agent={agent}"));
    Ok(chosen)
}

fn parse_oid(hex: &str) -> Result<Oid, WireError> {
    Oid::from_hex(hex).map_err(|e| WireError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::parse_all;

    fn oid(n: u8) -> Oid {
        Oid::from_hex(&format!("{n:02x}").repeat(20)).unwrap()
    }

    #[test]
    fn v1_request_first_want_carries_caps() {
        let request = UploadPackRequest {
            wants: vec![oid(1), oid(2)],
            capabilities: vec!["multi_ack_detailed".into(), "agent=grit/0.3".into()],
            haves: vec![oid(9)],
            done: true,
            ..UploadPackRequest::default()
        };
        let packets = parse_all(&request.to_bytes().unwrap()).unwrap();
        assert_eq!(
            packets[0].text(),
            format!("want {} multi_ack_detailed agent=grit/0.3", oid(1))
        );
        assert_eq!(packets[1].text(), format!("want {}", oid(2)));
        assert_eq!(packets[2], Packet::Flush);
        assert_eq!(packets[3].text(), format!("have {}", oid(9)));
        assert_eq!(packets[4].text(), "done");
    }

    #[test]
    fn v1_request_shallow_lines_before_flush() {
        let request = UploadPackRequest {
            wants: vec![oid(1)],
            shallow: vec![oid(7)],
            depth: DepthSpec {
                depth: Some(1),
                ..DepthSpec::default()
            },
            done: true,
            ..UploadPackRequest::default()
        };
        let packets = parse_all(&request.to_bytes().unwrap()).unwrap();
        let texts: Vec<String> = packets.iter().map(Packet::text).collect();
        let flush_at = packets.iter().position(|p| *p == Packet::Flush).unwrap();
        assert!(texts[..flush_at].contains(&format!("shallow {}", oid(7))));
        assert!(texts[..flush_at].contains(&"deepen 1".to_owned()));
    }

    #[test]
    fn prelude_parses_shallow_and_acks() {
        let mut writer = PktWriter::new();
        writer.text(&format!("shallow {}", oid(3))).unwrap();
        writer.text(&format!("unshallow {}", oid(4))).unwrap();
        writer.text(&format!("ACK {} common", oid(9))).unwrap();
        writer.text(&format!("ACK {}", oid(9))).unwrap();
        let packets = parse_all(&writer.into_bytes()).unwrap();
        let (prelude, _) = parse_fetch_prelude(&packets).unwrap();
        assert_eq!(prelude.shallow, vec![oid(3)]);
        assert_eq!(prelude.unshallow, vec![oid(4)]);
        assert_eq!(
            prelude.acks,
            vec![Ack::AckDetail(oid(9), "common".into()), Ack::Ack(oid(9))]
        );
        assert!(prelude.pack_follows);
    }

    #[test]
    fn prelude_stops_at_v2_packfile_section() {
        let mut writer = PktWriter::new();
        writer.text("acknowledgments").unwrap();
        writer.text("NAK").unwrap();
        writer.delim();
        writer.text("packfile").unwrap();
        writer.data(&[1, b'P', b'A', b'C', b'K']).unwrap();
        let packets = parse_all(&writer.into_bytes()).unwrap();
        let (prelude, at) = parse_fetch_prelude(&packets).unwrap();
        assert!(prelude.pack_follows);
        // Index points at the first sideband packet.
        assert_eq!(packets[at].data()[0], 1);
    }

    #[test]
    fn choose_capabilities_requires_shallow_support() {
        let server = CapabilitySet::parse_v1(b"multi_ack_detailed side-band-64k");
        let shallow = DepthSpec {
            depth: Some(1),
            ..DepthSpec::default()
        };
        assert_eq!(
            choose_capabilities(&server, &shallow, "grit/0.3"),
            Err("shallow".to_owned())
        );
        let server = CapabilitySet::parse_v1(b"shallow side-band-64k");
        let chosen = choose_capabilities(&server, &shallow, "grit/0.3").unwrap();
        assert!(chosen.contains(&"shallow".to_owned()));
        assert!(chosen.iter().any(|c| c.starts_with("agent=")));
    }

    #[test]
    fn v2_fetch_body_shape() {
        let request = UploadPackRequest {
            wants: vec![oid(1)],
            haves: vec![oid(2)],
            done: true,
            ..UploadPackRequest::default()
        };
        let body = fetch_request_v2(&request, "grit/0.3", true).unwrap();
        let packets = parse_all(&body).unwrap();
        assert_eq!(packets[0].text(), "command=fetch");
        assert!(packets.contains(&Packet::Delim));
        let texts: Vec<String> = packets.iter().map(Packet::text).collect();
        assert!(texts.contains(&format!("want {}", oid(1))));
        assert!(texts.contains(&"done".to_owned()));
    }
}
