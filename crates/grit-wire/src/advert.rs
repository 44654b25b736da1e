//! Ref advertisements, protocol v1 and v2.
//!
//! Over smart HTTP the advertisement arrives from
//! `GET /info/refs?service=git-upload-pack`: a `# service=...` banner
//! packet, a flush, then either v1 ref lines (first line carrying the
//! capability list after a NUL) or a v2 capability listing. v2 refs are
//! fetched separately with the `ls-refs` command; its request builder and
//! response parser live here too.

use std::collections::BTreeMap;

use bstr::ByteSlice as _;
use grit_odb::Oid;

use crate::WireError;
use crate::caps::CapabilitySet;
use crate::pktline::{Packet, PktWriter};

/// Which smart service is being spoken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    /// Fetch side.
    UploadPack,
    /// Push side.
    ReceivePack,
}

impl Service {
    /// Service name on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }
}

/// A parsed ref advertisement (either protocol version).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Advertisement {
    /// Protocol version: 1 or 2.
    pub protocol: u32,
    /// Capabilities the server offered.
    pub capabilities: CapabilitySet,
    /// `refname -> oid`. Empty for a v2 capability advertisement (refs
    /// come from `ls-refs`) and for an empty repository.
    pub refs: BTreeMap<String, Oid>,
    /// Symbolic refs (`HEAD -> refs/heads/main`).
    pub symrefs: BTreeMap<String, String>,
    /// Peeled tag targets (`refs/tags/v1 -> commit oid`).
    pub peeled: BTreeMap<String, Oid>,
}

impl Advertisement {
    /// The default branch the remote points HEAD at, if advertised.
    #[must_use]
    pub fn default_branch(&self) -> Option<&str> {
        self.symrefs.get("HEAD").map(String::as_str)
    }
}

/// Strip and validate the `# service=` banner of a smart info/refs body.
///
/// Returns the packets after the banner's flush. Tolerates bodies without
/// a banner (some servers omit it for v2).
pub fn strip_service_banner(
    packets: Vec<Packet>,
    service: Service,
) -> Result<Vec<Packet>, WireError> {
    let mut iter = packets.into_iter().peekable();
    if let Some(Packet::Data(first)) = iter.peek() {
        if first.starts_with(b"# service=") {
            let banner = String::from_utf8_lossy(first).trim().to_owned();
            let expected = format!("# service={}", service.as_str());
            if banner != expected {
                return Err(WireError::Protocol(format!(
                    "expected {expected:?}, server sent {banner:?}"
                )));
            }
            iter.next();
            // The banner section ends with a flush.
            if !matches!(iter.next(), Some(Packet::Flush)) {
                return Err(WireError::Protocol(
                    "missing flush after service banner".into(),
                ));
            }
        }
    }
    Ok(iter.collect())
}

/// Parse packets (banner already stripped) as either protocol version.
pub fn parse(packets: &[Packet]) -> Result<Advertisement, WireError> {
    match packets.first() {
        Some(Packet::Data(first))
            if first.strip_suffix(b"\n").unwrap_or(first) == b"version 2" =>
        {
            parse_v2_capabilities(&packets[1..])
        }
        _ => parse_v1(packets),
    }
}

/// Parse a v1 advertisement.
pub fn parse_v1(packets: &[Packet]) -> Result<Advertisement, WireError> {
    let mut advert = Advertisement {
        protocol: 1,
        ..Advertisement::default()
    };
    let mut first = true;
    for packet in packets {
        let line = match packet {
            Packet::Data(line) => line,
            Packet::Flush => break,
            other => {
                return Err(WireError::Protocol(format!(
                    "unexpected control packet {other:?} in v1 advertisement"
                )));
            }
        };
        if let Some(err) = line.strip_prefix(b"ERR ") {
            return Err(WireError::Remote(
                String::from_utf8_lossy(err).trim().to_owned(),
            ));
        }
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let (entry, caps) = match line.find_byte(0) {
            Some(nul) => (&line[..nul], Some(&line[nul + 1..])),
            None => (&line[..], None),
        };
        if first {
            advert.capabilities = caps.map(CapabilitySet::parse_v1).unwrap_or_default();
            for (from, to) in advert.capabilities.symrefs() {
                advert.symrefs.insert(from, to);
            }
            first = false;
        }
        let text = String::from_utf8_lossy(entry);
        let Some((hex, name)) = text.split_once(' ') else {
            return Err(WireError::Protocol(format!("bad ref line {text:?}")));
        };
        // An empty repository advertises `<zero-oid> capabilities^{}`.
        if name == "capabilities^{}" {
            continue;
        }
        let oid = Oid::from_hex(hex)
            .map_err(|e| WireError::Protocol(format!("bad ref line: {e}")))?;
        if let Some(base) = name.strip_suffix("^{}") {
            advert.peeled.insert(base.to_owned(), oid);
        } else {
            advert.refs.insert(name.to_owned(), oid);
        }
    }
    tracing::debug!(refs = advert.refs.len(), "parsed v1 advertisement");
    Ok(advert)
}

/// Parse the v2 capability listing (after the `version 2` packet).
pub fn parse_v2_capabilities(packets: &[Packet]) -> Result<Advertisement, WireError> {
    let mut advert = Advertisement {
        protocol: 2,
        ..Advertisement::default()
    };
    for packet in packets {
        match packet {
            Packet::Data(line) => {
                let text = String::from_utf8_lossy(line);
                advert.capabilities.push_token(text.trim());
            }
            Packet::Flush => break,
            other => {
                return Err(WireError::Protocol(format!(
                    "unexpected control packet {other:?} in capability advertisement"
                )));
            }
        }
    }
    if !advert.capabilities.has("ls-refs") || !advert.capabilities.has("fetch") {
        return Err(WireError::Protocol(
            "v2 server lacks required ls-refs/fetch commands".into(),
        ));
    }
    Ok(advert)
}

/// Options for an `ls-refs` command.
#[derive(Clone, Debug, Default)]
pub struct LsRefsOptions {
    /// Ask for `symref-target` attributes.
    pub symrefs: bool,
    /// Ask for `peeled` attributes on tags.
    pub peel: bool,
    /// Limit to these ref prefixes; empty means everything.
    pub prefixes: Vec<String>,
}

/// Build the `ls-refs` request body (v2).
pub fn ls_refs_request(options: &LsRefsOptions, agent: &str) -> Result<Vec<u8>, WireError> {
    let mut writer = PktWriter::new();
    writer.text("command=ls-refs")?;
    writer.text(&format!("agent={agent}"))?;
    writer.delim();
    if options.symrefs {
        writer.text("symrefs")?;
    }
    if options.peel {
        writer.text("peel")?;
    }
    for prefix in &options.prefixes {
        writer.text(&format!("ref-prefix {prefix}"))?;
    }
    writer.flush();
    Ok(writer.into_bytes())
}

/// Parse an `ls-refs` response into the advertisement shape.
pub fn parse_ls_refs(packets: &[Packet]) -> Result<Advertisement, WireError> {
    let mut advert = Advertisement {
        protocol: 2,
        ..Advertisement::default()
    };
    for packet in packets {
        let line = match packet {
            Packet::Data(line) => line,
            Packet::Flush | Packet::ResponseEnd => break,
            Packet::Delim => continue,
        };
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\n');
        let mut parts = text.split(' ');
        let (Some(hex), Some(name)) = (parts.next(), parts.next()) else {
            return Err(WireError::Protocol(format!("bad ls-refs line {text:?}")));
        };
        let oid = Oid::from_hex(hex)
            .map_err(|e| WireError::Protocol(format!("bad ls-refs line: {e}")))?;
        advert.refs.insert(name.to_owned(), oid);
        for attr in parts {
            if let Some(target) = attr.strip_prefix("symref-target:") {
                advert.symrefs.insert(name.to_owned(), target.to_owned());
            } else if let Some(peeled) = attr.strip_prefix("peeled:") {
                let peeled = Oid::from_hex(peeled)
                    .map_err(|e| WireError::Protocol(format!("bad peeled attr: {e}")))?;
                advert.peeled.insert(name.to_owned(), peeled);
            }
        }
    }
    Ok(advert)
}
