//! MySQL packet framing (spec.md §4.1).
//!
//! A packet header is a 3-byte little-endian length followed by a 1-byte
//! sequence number. A payload of exactly `2^24 - 1` bytes means "more
//! follows": the next header+payload belongs to the same logical packet,
//! and so on until a header whose length is smaller than `2^24 - 1` closes
//! it. The sequence number reported for the logical packet is the sequence
//! byte of that closing frame.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::FrameError;

/// `2^24 - 1`: a physical frame this size signals a continuation.
pub const MAX_FRAME_LEN: usize = 0xFF_FFFF;

/// One fully reassembled MySQL protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: u8,
    pub payload: Bytes,
}

enum DecoderState {
    Header,
    Payload { length: usize, seq: u8 },
}

/// Stateful [`Decoder`] that joins `>= 16MiB` continuation frames into a
/// single logical [`Packet`], meant to be driven with
/// `tokio_util::codec::FramedRead` over any `AsyncRead` half-stream.
pub struct PacketDecoder {
    state: DecoderState,
    /// Bytes accumulated so far for a logical packet still in progress.
    /// `Some` only while we are mid-continuation.
    accum: Option<BytesMut>,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Header,
            accum: None,
        }
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketDecoder {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecoderState::Header => {
                    if src.len() < 4 {
                        return Ok(None);
                    }
                    let length = src.get_uint_le(3) as usize;
                    let seq = src.get_u8();
                    self.state = DecoderState::Payload { length, seq };
                }
                DecoderState::Payload { length, seq } => {
                    if src.len() < length {
                        return Ok(None);
                    }
                    let chunk = src.split_to(length);
                    self.state = DecoderState::Header;

                    if length == MAX_FRAME_LEN {
                        self.accum.get_or_insert_with(BytesMut::new).unsplit(chunk);
                        continue;
                    }

                    return Ok(Some(match self.accum.take() {
                        Some(mut buf) => {
                            buf.unsplit(chunk);
                            Packet {
                                seq,
                                payload: buf.freeze(),
                            }
                        }
                        None => Packet {
                            seq,
                            payload: chunk.freeze(),
                        },
                    }));
                }
            }
        }
    }
}

fn write_frame_header(out: &mut Vec<u8>, length: usize, seq: u8) {
    let bytes = (length as u32).to_le_bytes();
    out.extend_from_slice(&bytes[..3]);
    out.push(seq);
}

/// Encode a logical packet, splitting it into `2^24 - 1`-byte continuation
/// frames as needed. Used by tests and by anything synthesizing traffic
/// (e.g. the framer round-trip property in spec.md §8).
///
/// The sequence byte of every continuation frame except the last is
/// unobservable by a decoder (spec.md: "the sequence returned is the
/// sequence byte of the *last* constituent frame"), so intermediate frames
/// are written with sequence `0` and only the closing frame carries `seq`.
pub fn encode_packet(out: &mut Vec<u8>, seq: u8, payload: &[u8]) {
    let mut offset = 0;
    loop {
        let remaining = payload.len() - offset;
        if remaining >= MAX_FRAME_LEN {
            write_frame_header(out, MAX_FRAME_LEN, 0);
            out.extend_from_slice(&payload[offset..offset + MAX_FRAME_LEN]);
            offset += MAX_FRAME_LEN;
        } else {
            write_frame_header(out, remaining, seq);
            out.extend_from_slice(&payload[offset..]);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(mut bytes: BytesMut) -> Vec<Packet> {
        let mut decoder = PacketDecoder::new();
        let mut packets = Vec::new();
        while let Some(pk) = decoder.decode(&mut bytes).expect("valid framing") {
            packets.push(pk);
        }
        packets
    }

    #[test]
    fn round_trips_small_payloads() {
        for (seq, payload) in [(0u8, &b""[..]), (1, b"x"), (200, b"select 1")] {
            let mut buf = Vec::new();
            encode_packet(&mut buf, seq, payload);
            let packets = decode_all(BytesMut::from(&buf[..]));
            assert_eq!(packets.len(), 1);
            assert_eq!(packets[0].seq, seq);
            assert_eq!(&packets[0].payload[..], payload);
        }
    }

    #[test]
    fn round_trips_exact_continuation_boundary() {
        let payload = vec![0x42u8; MAX_FRAME_LEN];
        let mut buf = Vec::new();
        encode_packet(&mut buf, 7, &payload);
        let packets = decode_all(BytesMut::from(&buf[..]));
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].seq, 7);
        assert_eq!(packets[0].payload.len(), payload.len());
        assert_eq!(&packets[0].payload[..], &payload[..]);
    }

    #[test]
    fn round_trips_payload_spanning_two_frames() {
        let payload = vec![0x7Au8; MAX_FRAME_LEN + 12345];
        let mut buf = Vec::new();
        encode_packet(&mut buf, 3, &payload);
        let packets = decode_all(BytesMut::from(&buf[..]));
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].seq, 3);
        assert_eq!(&packets[0].payload[..], &payload[..]);
    }

    #[test]
    fn concatenates_multiple_logical_packets_in_one_buffer() {
        let mut buf = Vec::new();
        encode_packet(&mut buf, 0, b"first");
        encode_packet(&mut buf, 1, b"second");
        let packets = decode_all(BytesMut::from(&buf[..]));
        assert_eq!(packets.len(), 2);
        assert_eq!(&packets[0].payload[..], b"first");
        assert_eq!(&packets[1].payload[..], b"second");
    }

    #[test]
    fn incomplete_header_yields_none_without_consuming() {
        let mut decoder = PacketDecoder::new();
        let mut buf = BytesMut::from(&[0x01, 0x00][..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 2);
    }
}
