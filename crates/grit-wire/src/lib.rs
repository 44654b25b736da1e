//! Smart-protocol codec for grit.
//!
//! Pure byte-level machinery for the git smart protocol, v1 and v2:
//! pkt-line framing, capability sets, ref advertisements, the
//! upload-pack and receive-pack request/response shapes, and sideband
//! demultiplexing. The protocol *engine* (negotiation policy, retries,
//! ref updates) lives in the core crate; this crate never does I/O beyond
//! the [`HttpClient`] trait it defines for injection.

pub mod advert;
pub mod caps;
pub mod http;
pub mod pktline;
pub mod receive_pack;
pub mod sideband;
pub mod upload_pack;

pub use advert::Advertisement;
pub use caps::CapabilitySet;
pub use http::{HttpClient, HttpRequest, HttpResponse};
pub use pktline::{MAX_PAYLOAD, Packet, PktReader, PktWriter};

/// Errors from protocol encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Malformed pkt-line framing.
    #[error("pkt-line: {0}")]
    Pktline(String),

    /// A pkt-line payload above the 65516-byte limit.
    #[error("pkt-line payload of {0} bytes exceeds the 65516 limit")]
    Oversize(usize),

    /// The advertisement or a response body did not parse.
    #[error("protocol: {0}")]
    Protocol(String),

    /// The remote reported a fatal error over sideband or ERR.
    #[error("remote error: {0}")]
    Remote(String),

    /// Transport-level HTTP failure.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code (0 when the failure happened below HTTP).
        status: u16,
        /// Response or transport message.
        message: String,
    },

    /// I/O while streaming a body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
