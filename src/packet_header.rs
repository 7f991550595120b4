use std::cmp::min;
use std::ops::Range;

use anyhow::bail;
use bytes::{Buf, BufMut};

use crate::frame::{FrameNumber, MAX_SUBFRAMES};
use crate::safe_converter::{PrecheckedCast, SafeCast};

pub const PACKET_HEADER_SIZE: usize = 8;

/// The maximum payload per packet. Together with the header this stays comfortably inside a
///  typical IPv4 MTU, so datagrams are never fragmented at the IP level.
pub const PACKET_MAX_PAYLOAD: usize = 1400;

pub const MAX_DATAGRAM_SIZE: usize = PACKET_HEADER_SIZE + PACKET_MAX_PAYLOAD;

/// The fixed 8-byte header at the start of every datagram. All multi-byte fields are
///  little-endian on the wire:
///
/// ```ascii
/// 0: frame number (u16)
/// 2: number of subframes in the enclosing frame (u8, 1..=3)
/// 3: index of the subframe this packet belongs to (u8)
/// 4: number of packets in this (frame, subframe) group (u16)
/// 6: index of this packet within the group (u16)
/// ```
///
/// The payload length is implicit: it is the rest of the datagram.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct PacketHeader {
    pub frame_number: FrameNumber,
    pub subframe_count: u8,
    pub subframe_index: u8,
    pub packet_count: u16,
    pub packet_index: u16,
}

impl PacketHeader {
    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.frame_number.to_raw());
        buf.put_u8(self.subframe_count);
        buf.put_u8(self.subframe_index);
        buf.put_u16_le(self.packet_count);
        buf.put_u16_le(self.packet_index);
    }

    /// Parses and validates a header, leaving `buf` at the start of the payload. Inconsistent
    ///  index / count combinations are rejected here so that the reassembly state machine only
    ///  ever sees internally consistent headers.
    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<PacketHeader> {
        if buf.remaining() < PACKET_HEADER_SIZE {
            bail!("datagram of {} bytes is shorter than the packet header", buf.remaining());
        }

        let frame_number = FrameNumber::from_raw(buf.get_u16_le());
        let subframe_count = buf.get_u8();
        let subframe_index = buf.get_u8();
        let packet_count = buf.get_u16_le();
        let packet_index = buf.get_u16_le();

        if subframe_count == 0 || subframe_count.safe_cast() > MAX_SUBFRAMES {
            bail!("subframe count {} is outside the supported range of 1..={}", subframe_count, MAX_SUBFRAMES);
        }
        if subframe_index >= subframe_count {
            bail!("subframe index {} is out of range for {} subframes", subframe_index, subframe_count);
        }
        if packet_index >= packet_count {
            bail!("packet index {} is out of range for {} packets", packet_index, packet_count);
        }

        Ok(PacketHeader {
            frame_number,
            subframe_count,
            subframe_index,
            packet_count,
            packet_index,
        })
    }
}

/// The number of packets a subframe of `payload_len` bytes is fragmented into. A zero-length
///  subframe still occupies one (empty) packet so that its existence registers at the receiver.
pub fn packet_count_for_payload(payload_len: usize) -> anyhow::Result<u16> {
    if payload_len == 0 {
        return Ok(1);
    }

    let packet_count = payload_len.div_ceil(PACKET_MAX_PAYLOAD);
    if packet_count > u16::MAX as usize {
        bail!("subframe of {} bytes would need {} packets, which exceeds the wire format's limit", payload_len, packet_count);
    }
    Ok(packet_count.prechecked_cast())
}

/// The byte range of `packet_index`'s payload within a subframe of `payload_len` bytes: all
///  packets carry the full payload size except the terminal one, which carries the remainder.
pub fn payload_range(packet_index: u16, payload_len: usize) -> Range<usize> {
    let start = min(packet_index.safe_cast() * PACKET_MAX_PAYLOAD, payload_len);
    let end = min(start + PACKET_MAX_PAYLOAD, payload_len);
    start..end
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use rstest::rstest;
    use super::*;

    fn header(frame: u16, subframe_count: u8, subframe_index: u8, packet_count: u16, packet_index: u16) -> PacketHeader {
        PacketHeader {
            frame_number: FrameNumber::from_raw(frame),
            subframe_count,
            subframe_index,
            packet_count,
            packet_index,
        }
    }

    #[rstest]
    #[case::minimal(header(0, 1, 0, 1, 0), vec![0,0, 1, 0, 1,0, 0,0])]
    #[case::le_fields(header(0x0102, 3, 1, 0x0304, 0x0102), vec![0x02,0x01, 3, 1, 0x04,0x03, 0x02,0x01])]
    #[case::max_frame(header(65535, 2, 1, 2, 1), vec![0xff,0xff, 2, 1, 2,0, 1,0])]
    fn test_ser(#[case] header: PacketHeader, #[case] expected: Vec<u8>) {
        let mut buf = BytesMut::new();
        header.ser(&mut buf);
        assert_eq!(buf.as_ref(), expected.as_slice());
    }

    #[rstest]
    #[case(header(0, 1, 0, 1, 0))]
    #[case(header(7, 1, 0, 3, 2))]
    #[case(header(65535, 3, 2, 65535, 65534))]
    fn test_ser_deser_roundtrip(#[case] header: PacketHeader) {
        let mut buf = BytesMut::new();
        header.ser(&mut buf);

        let mut b: &[u8] = &buf;
        let deser = PacketHeader::deser(&mut b).unwrap();

        assert!(b.is_empty());
        assert_eq!(header, deser);
    }

    #[test]
    fn test_deser_leaves_payload() {
        let mut buf = BytesMut::new();
        header(5, 1, 0, 1, 0).ser(&mut buf);
        buf.extend_from_slice(b"HELLO");

        let mut b: &[u8] = &buf;
        let deser = PacketHeader::deser(&mut b).unwrap();

        assert_eq!(deser.frame_number, FrameNumber::from_raw(5));
        assert_eq!(b, b"HELLO");
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::truncated(vec![0,0, 1, 0, 1,0, 0])]
    #[case::subframe_count_zero(vec![0,0, 0, 0, 1,0, 0,0])]
    #[case::subframe_count_over_limit(vec![0,0, 4, 0, 1,0, 0,0])]
    #[case::subframe_index_out_of_range(vec![0,0, 2, 2, 1,0, 0,0])]
    #[case::packet_count_zero(vec![0,0, 1, 0, 0,0, 0,0])]
    #[case::packet_index_out_of_range(vec![0,0, 1, 0, 2,0, 2,0])]
    fn test_deser_rejects(#[case] raw: Vec<u8>) {
        let mut b: &[u8] = &raw;
        assert!(PacketHeader::deser(&mut b).is_err());
    }

    #[rstest]
    #[case::empty(0, 1)]
    #[case::one_byte(1, 1)]
    #[case::just_below_full(1399, 1)]
    #[case::exactly_full(1400, 1)]
    #[case::just_above_full(1401, 2)]
    #[case::two_full(2800, 2)]
    #[case::two_full_plus_one(2801, 3)]
    #[case::s2_size(3500, 3)]
    #[case::largest(1400 * 65535, 65535)]
    fn test_packet_count_for_payload(#[case] payload_len: usize, #[case] expected: u16) {
        assert_eq!(packet_count_for_payload(payload_len).unwrap(), expected);
    }

    #[test]
    fn test_packet_count_for_payload_over_limit() {
        assert!(packet_count_for_payload(1400 * 65535 + 1).is_err());
    }

    #[rstest]
    #[case::first_of_three(0, 3500, 0..1400)]
    #[case::middle_of_three(1, 3500, 1400..2800)]
    #[case::terminal_remainder(2, 3500, 2800..3500)]
    #[case::single_small(0, 5, 0..5)]
    #[case::single_empty(0, 0, 0..0)]
    #[case::terminal_single_byte(1, 1401, 1400..1401)]
    #[case::terminal_exactly_full(1, 2800, 1400..2800)]
    fn test_payload_range(#[case] packet_index: u16, #[case] payload_len: usize, #[case] expected: Range<usize>) {
        assert_eq!(payload_range(packet_index, payload_len), expected);
    }
}
