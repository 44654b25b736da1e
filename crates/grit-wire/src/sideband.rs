//! Sideband demultiplexing.
//!
//! When `side-band-64k` is active, each data packet's first byte selects a
//! band: 1 carries pack data, 2 carries progress text for the user, 3 is a
//! fatal error from the remote.

use crate::WireError;
use crate::pktline::Packet;

/// Demux sideband packets into pack bytes, routing band 2 to `progress`.
///
/// Non-sideband data packets (servers without the capability) pass
/// through as pack bytes. Stops at the terminating flush.
pub fn demux(
    packets: &[Packet],
    progress: &mut dyn FnMut(&str),
) -> Result<Vec<u8>, WireError> {
    let mut pack = Vec::new();
    for packet in packets {
        let data = match packet {
            Packet::Data(data) => data,
            Packet::Flush | Packet::ResponseEnd => break,
            Packet::Delim => continue,
        };
        if data.is_empty() {
            continue;
        }
        match data[0] {
            1 => pack.extend_from_slice(&data[1..]),
            2 => progress(&String::from_utf8_lossy(&data[1..])),
            3 => {
                return Err(WireError::Remote(
                    String::from_utf8_lossy(&data[1..]).trim().to_owned(),
                ));
            }
            _ => pack.extend_from_slice(data),
        }
    }
    Ok(pack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_route_correctly() {
        let packets = vec![
            Packet::Data([&[1u8][..], b"PACKdata"].concat()),
            Packet::Data([&[2u8][..], b"Counting objects: 5"].concat()),
            Packet::Data([&[1u8][..], b"more"].concat()),
            Packet::Flush,
        ];
        let mut progress_lines = Vec::new();
        let pack = demux(&packets, &mut |line| progress_lines.push(line.to_owned())).unwrap();
        assert_eq!(pack, b"PACKdatamore");
        assert_eq!(progress_lines, vec!["Counting objects: 5".to_owned()]);
    }

    #[test]
    fn band_three_is_fatal() {
        let packets = vec![Packet::Data([&[3u8][..], b"upload-pack: not our ref"].concat())];
        let err = demux(&packets, &mut |_| {}).unwrap_err();
        assert!(matches!(err, WireError::Remote(m) if m.contains("not our ref")));
    }

    #[test]
    fn non_sideband_passthrough() {
        let packets = vec![Packet::Data(b"PACK....".to_vec()), Packet::Flush];
        let pack = demux(&packets, &mut |_| {}).unwrap();
        assert_eq!(pack, b"PACK....");
    }
}
