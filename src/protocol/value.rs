//! Binary-protocol parameter values (spec.md §3 "Prepared statement",
//! §4.4's decode table).
//!
//! Unlike a result-set row, a bound parameter is owned: it outlives the
//! packet that carried it, since [`crate::tracker`] keeps it around across
//! SEND_LONG_DATA appends and later EXECUTE/RESET cycles.

use bytes::Bytes;
use zerocopy::{FromBytes, Immutable, KnownLayout};
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};

use crate::constant::{ColumnType, PARAM_UNSIGNED_FLAG};
use crate::protocol::primitive::*;

/// A single bound (non-unset) prepared-statement parameter.
///
/// One variant per wire shape, matching the "tagged-union over untyped
/// pointer" design note (spec.md §9).
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f32),
    Double(f64),
    /// DECIMAL/NEWDECIMAL: length-encoded ASCII text, rendered unquoted.
    Decimal(Bytes),
    /// Any other length-encoded byte string: VARCHAR/STRING family, the
    /// BLOB family, BIT, ENUM, SET. Also what a SEND_LONG_DATA append
    /// produces. Rendered as a quoted, backslash-escaped literal.
    Bytes(Bytes),
    Date {
        year: u16,
        month: u8,
        day: u8,
    },
    DateTime {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        microsecond: u32,
    },
    Time {
        is_negative: bool,
        days: u32,
        hour: u8,
        minute: u8,
        second: u8,
        microsecond: u32,
    },
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
struct Timestamp4 {
    year: U16LE,
    month: u8,
    day: u8,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
struct Timestamp7 {
    year: U16LE,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
struct Timestamp11 {
    year: U16LE,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    microsecond: U32LE,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
struct Time8 {
    is_negative: u8,
    days: U32LE,
    hour: u8,
    minute: u8,
    second: u8,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
struct Time12 {
    is_negative: u8,
    days: U32LE,
    hour: u8,
    minute: u8,
    second: u8,
    microsecond: U32LE,
}

/// Why a parameter couldn't be decoded (spec.md §7, "Rewrite-degraded").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnknownTypeCode(u8),
    Truncated,
    InvalidTemporalLength(u8),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTypeCode(b) => write!(f, "unknown parameter type code 0x{b:02x}"),
            Self::Truncated => write!(f, "truncated parameter value"),
            Self::InvalidTemporalLength(n) => write!(f, "invalid temporal value length {n}"),
        }
    }
}

/// Decode one non-null binary-protocol parameter value per spec.md §4.4's
/// type table, returning the value and the remaining bytes.
pub fn parse_param(
    type_code: u8,
    unsigned: bool,
    data: &[u8],
) -> Result<(ArgValue, &[u8]), DecodeError> {
    let Some(column_type) = ColumnType::from_u8(type_code) else {
        return Err(DecodeError::UnknownTypeCode(type_code));
    };

    match column_type {
        ColumnType::MYSQL_TYPE_TINY => {
            let (v, rest) = read_int_1(data).ok_or(DecodeError::Truncated)?;
            Ok((int_value(v as i64, v as u64, unsigned), rest))
        }
        ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
            let (v, rest) = read_int_2(data).ok_or(DecodeError::Truncated)?;
            Ok((int_value(v as i16 as i64, v as u64, unsigned), rest))
        }
        ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
            let (v, rest) = read_int_4(data).ok_or(DecodeError::Truncated)?;
            Ok((int_value(v as i32 as i64, v as u64, unsigned), rest))
        }
        ColumnType::MYSQL_TYPE_LONGLONG => {
            let (v, rest) = read_int_8(data).ok_or(DecodeError::Truncated)?;
            Ok((int_value(v as i64, v, unsigned), rest))
        }
        ColumnType::MYSQL_TYPE_FLOAT => {
            let (v, rest) = read_int_4(data).ok_or(DecodeError::Truncated)?;
            Ok((ArgValue::Float(f32::from_bits(v)), rest))
        }
        ColumnType::MYSQL_TYPE_DOUBLE => {
            let (v, rest) = read_int_8(data).ok_or(DecodeError::Truncated)?;
            Ok((ArgValue::Double(f64::from_bits(v)), rest))
        }
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
            let (len, rest) = read_int_1(data).ok_or(DecodeError::Truncated)?;
            match len {
                0 => Ok((
                    ArgValue::Date {
                        year: 0,
                        month: 0,
                        day: 0,
                    },
                    rest,
                )),
                4 => {
                    let ts = Timestamp4::read_from_bytes(rest.get(..4).ok_or(DecodeError::Truncated)?)
                        .map_err(|_| DecodeError::Truncated)?;
                    Ok((
                        ArgValue::Date {
                            year: ts.year.get(),
                            month: ts.month,
                            day: ts.day,
                        },
                        &rest[4..],
                    ))
                }
                7 => {
                    let ts = Timestamp7::read_from_bytes(rest.get(..7).ok_or(DecodeError::Truncated)?)
                        .map_err(|_| DecodeError::Truncated)?;
                    Ok((
                        ArgValue::DateTime {
                            year: ts.year.get(),
                            month: ts.month,
                            day: ts.day,
                            hour: ts.hour,
                            minute: ts.minute,
                            second: ts.second,
                            microsecond: 0,
                        },
                        &rest[7..],
                    ))
                }
                11 => {
                    let ts = Timestamp11::read_from_bytes(rest.get(..11).ok_or(DecodeError::Truncated)?)
                        .map_err(|_| DecodeError::Truncated)?;
                    Ok((
                        ArgValue::DateTime {
                            year: ts.year.get(),
                            month: ts.month,
                            day: ts.day,
                            hour: ts.hour,
                            minute: ts.minute,
                            second: ts.second,
                            microsecond: ts.microsecond.get(),
                        },
                        &rest[11..],
                    ))
                }
                other => Err(DecodeError::InvalidTemporalLength(other)),
            }
        }
        ColumnType::MYSQL_TYPE_TIME => {
            let (len, rest) = read_int_1(data).ok_or(DecodeError::Truncated)?;
            match len {
                0 => Ok((
                    ArgValue::Time {
                        is_negative: false,
                        days: 0,
                        hour: 0,
                        minute: 0,
                        second: 0,
                        microsecond: 0,
                    },
                    rest,
                )),
                8 => {
                    let t = Time8::read_from_bytes(rest.get(..8).ok_or(DecodeError::Truncated)?)
                        .map_err(|_| DecodeError::Truncated)?;
                    Ok((
                        ArgValue::Time {
                            is_negative: t.is_negative != 0,
                            days: t.days.get(),
                            hour: t.hour,
                            minute: t.minute,
                            second: t.second,
                            microsecond: 0,
                        },
                        &rest[8..],
                    ))
                }
                12 => {
                    let t = Time12::read_from_bytes(rest.get(..12).ok_or(DecodeError::Truncated)?)
                        .map_err(|_| DecodeError::Truncated)?;
                    Ok((
                        ArgValue::Time {
                            is_negative: t.is_negative != 0,
                            days: t.days.get(),
                            hour: t.hour,
                            minute: t.minute,
                            second: t.second,
                            microsecond: t.microsecond.get(),
                        },
                        &rest[12..],
                    ))
                }
                other => Err(DecodeError::InvalidTemporalLength(other)),
            }
        }
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            let (bytes, rest) = read_string_lenenc(data).ok_or(DecodeError::Truncated)?;
            Ok((ArgValue::Decimal(Bytes::copy_from_slice(bytes)), rest))
        }
        other if other.is_length_encoded_bytes() => {
            let (bytes, rest) = read_string_lenenc(data).ok_or(DecodeError::Truncated)?;
            Ok((ArgValue::Bytes(Bytes::copy_from_slice(bytes)), rest))
        }
        other => Err(DecodeError::UnknownTypeCode(other as u8)),
    }
}

fn int_value(signed: i64, unsigned_bits: u64, unsigned: bool) -> ArgValue {
    if unsigned {
        ArgValue::UnsignedInt(unsigned_bits)
    } else {
        ArgValue::SignedInt(signed)
    }
}

/// Does the type's companion flag byte mark it unsigned? (spec.md §4.4)
pub fn is_unsigned_flag(flag_byte: u8) -> bool {
    flag_byte & PARAM_UNSIGNED_FLAG != 0
}

/// Null bitmap for EXECUTE parameters: bit `i` of byte `i/8` marks parameter
/// `i` as SQL NULL (spec.md §4.4, no offset — that offset only applies to
/// result-set rows, which this sniffer never decodes).
#[derive(Debug, Clone, Copy)]
pub struct NullBitmap<'a>(pub &'a [u8]);

impl<'a> NullBitmap<'a> {
    pub fn is_null(&self, idx: usize) -> bool {
        let byte = idx / 8;
        let bit = idx % 8;
        self.0.get(byte).is_some_and(|b| b & (1 << bit) != 0)
    }
}
