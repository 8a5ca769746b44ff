//! Little-endian integer and length-encoded primitive readers/writers for
//! the MySQL binary protocol.
//!
//! Every reader returns `None` on short input instead of an `Error`: a
//! truncated value inside an EXECUTE payload is a "Rewrite-degraded" event
//! (spec.md §7), not a reason to tear down the connection, so callers turn
//! a `None` into a `/* bind error: ... */` placeholder rather than
//! propagating it.

use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE, U64 as U64LE};

/// Read 1-byte integer
pub fn read_int_1(data: &[u8]) -> Option<(u8, &[u8])> {
    if data.is_empty() {
        return None;
    }
    Some((data[0], &data[1..]))
}

/// Read 2-byte little-endian integer
pub fn read_int_2(data: &[u8]) -> Option<(u16, &[u8])> {
    if data.len() < 2 {
        return None;
    }
    let value = U16LE::ref_from_bytes(&data[..2]).ok()?.get();
    Some((value, &data[2..]))
}

/// Read 3-byte little-endian integer
pub fn read_int_3(data: &[u8]) -> Option<(u32, &[u8])> {
    if data.len() < 3 {
        return None;
    }
    let value = u32::from_le_bytes([data[0], data[1], data[2], 0]);
    Some((value, &data[3..]))
}

/// Read 4-byte little-endian integer
pub fn read_int_4(data: &[u8]) -> Option<(u32, &[u8])> {
    if data.len() < 4 {
        return None;
    }
    let value = U32LE::ref_from_bytes(&data[..4]).ok()?.get();
    Some((value, &data[4..]))
}

/// Read 8-byte little-endian integer
pub fn read_int_8(data: &[u8]) -> Option<(u64, &[u8])> {
    if data.len() < 8 {
        return None;
    }
    let value = U64LE::ref_from_bytes(&data[..8]).ok()?.get();
    Some((value, &data[8..]))
}

/// Read length-encoded integer (spec.md §4.4).
pub fn read_int_lenenc(data: &[u8]) -> Option<(u64, &[u8])> {
    if data.is_empty() {
        return None;
    }

    match data[0] {
        0xFC => {
            let (val, rest) = read_int_2(&data[1..])?;
            Some((val as u64, rest))
        }
        0xFD => {
            let (val, rest) = read_int_3(&data[1..])?;
            Some((val as u64, rest))
        }
        0xFE => {
            let (val, rest) = read_int_8(&data[1..])?;
            Some((val, rest))
        }
        val => Some((val as u64, &data[1..])),
    }
}

/// Read fixed-length byte string
pub fn read_string_fix(data: &[u8], len: usize) -> Option<(&[u8], &[u8])> {
    if data.len() < len {
        return None;
    }
    Some((&data[..len], &data[len..]))
}

/// Read length-encoded byte string
pub fn read_string_lenenc(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let (len, rest) = read_int_lenenc(data)?;
    read_string_fix(rest, len as usize)
}

/// Write 2-byte little-endian integer
pub fn write_int_2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 3-byte little-endian integer
pub fn write_int_3(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

/// Write 8-byte little-endian integer
pub fn write_int_8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write length-encoded integer (spec.md §4.4, used by the round-trip test
/// and by the packet-framer continuation encoder).
pub fn write_int_lenenc(out: &mut Vec<u8>, value: u64) {
    if value < 251 {
        out.push(value as u8);
    } else if value < (1 << 16) {
        out.push(0xfc);
        write_int_2(out, value as u16);
    } else if value < (1 << 24) {
        out.push(0xfd);
        write_int_3(out, value as u32);
    } else {
        out.push(0xfe);
        write_int_8(out, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenenc_int_round_trip() {
        for n in [
            0u64,
            250,
            251,
            0xFFFF,
            0x10000,
            0xFFFFFF,
            0x1000000,
            0xFFFF_FFFF_FFFF_FFFF,
        ] {
            let mut buf = Vec::new();
            write_int_lenenc(&mut buf, n);
            let (decoded, rest) = read_int_lenenc(&buf).expect("decodes");
            assert_eq!(decoded, n);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn lenenc_string_reads_length_then_bytes() {
        let mut buf = Vec::new();
        write_int_lenenc(&mut buf, 5);
        buf.extend_from_slice(b"hello");
        buf.extend_from_slice(b"tail");
        let (s, rest) = read_string_lenenc(&buf).unwrap();
        assert_eq!(s, b"hello");
        assert_eq!(rest, b"tail");
    }

    #[test]
    fn short_reads_return_none() {
        assert_eq!(read_int_2(&[0x01]), None);
        assert_eq!(read_int_4(&[0x01, 0x02]), None);
        assert_eq!(read_string_fix(&[0x01], 5), None);
    }
}
