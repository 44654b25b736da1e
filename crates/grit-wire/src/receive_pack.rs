//! receive-pack request building and report parsing (push side).
//!
//! The client sends `oldOid SP newOid SP fullRef` command lines (the
//! first carrying capabilities after a NUL), a flush, then a packfile of
//! the missing objects. With `report-status` the server answers
//! `unpack ok|<error>` followed by `ok <ref>` / `ng <ref> <reason>` per
//! command.

use grit_odb::Oid;

use crate::WireError;
use crate::pktline::{self, Packet, PktWriter};

/// One ref update command: `old -> new` for `name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateCommand {
    /// Current remote value (zero OID to create).
    pub old: Oid,
    /// Desired value (zero OID to delete).
    pub new: Oid,
    /// Full ref name on the remote.
    pub name: String,
}

/// Build the receive-pack request body. `pack` is appended raw after the
/// command section; pass `None` for delete-only pushes that move no
/// objects.
pub fn build_request(
    commands: &[UpdateCommand],
    capabilities: &[String],
    pack: Option<&[u8]>,
) -> Result<Vec<u8>, WireError> {
    let mut writer = PktWriter::new();
    for (i, command) in commands.iter().enumerate() {
        let line = format!("{} {} {}", command.old, command.new, command.name);
        if i == 0 && !capabilities.is_empty() {
            // Capabilities ride after a NUL on the first command line.
            let mut payload = line.into_bytes();
            payload.push(0);
            payload.extend_from_slice(capabilities.join(" ").as_bytes());
            payload.push(b'\n');
            writer.data(&payload)?;
        } else {
            writer.text(&line)?;
        }
    }
    writer.flush();
    if let Some(pack) = pack {
        writer.raw(pack);
    }
    Ok(writer.into_bytes())
}

/// Parsed `report-status` response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushReport {
    /// `None` until an `unpack` line is seen; `Some(Ok(()))` for
    /// `unpack ok`, `Some(Err(msg))` otherwise.
    pub unpack: Option<Result<(), String>>,
    /// Per-ref outcome, in server order: `(name, Ok | Err(reason))`.
    pub refs: Vec<(String, Result<(), String>)>,
}

impl PushReport {
    /// `true` when unpack succeeded and every ref was accepted.
    #[must_use]
    pub fn ok(&self) -> bool {
        matches!(self.unpack, Some(Ok(()))) && self.refs.iter().all(|(_, r)| r.is_ok())
    }
}

/// Parse a report-status body. The report may arrive wrapped in sideband
/// band 1; unwrap with [`crate::sideband::demux`] first when side-band
/// was negotiated.
pub fn parse_report(bytes: &[u8]) -> Result<PushReport, WireError> {
    let packets = pktline::parse_all(bytes)?;
    let mut report = PushReport::default();
    for packet in &packets {
        let line = match packet {
            Packet::Data(line) => line,
            Packet::Flush | Packet::ResponseEnd => continue,
            Packet::Delim => continue,
        };
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\n');
        if let Some(rest) = text.strip_prefix("unpack ") {
            report.unpack = Some(if rest == "ok" {
                Ok(())
            } else {
                Err(rest.to_owned())
            });
        } else if let Some(name) = text.strip_prefix("ok ") {
            report.refs.push((name.to_owned(), Ok(())));
        } else if let Some(rest) = text.strip_prefix("ng ") {
            let (name, reason) = rest
                .split_once(' ')
                .map_or((rest, "rejected"), |(n, r)| (n, r));
            report
                .refs
                .push((name.to_owned(), Err(reason.to_owned())));
        } else if !text.is_empty() {
            return Err(WireError::Protocol(format!(
                "unexpected report-status line {text:?}"
            )));
        }
    }
    if report.unpack.is_none() {
        return Err(WireError::Protocol("report-status missing unpack line".into()));
    }
    Ok(report)
}
