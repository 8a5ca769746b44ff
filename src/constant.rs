/// First byte of a client command packet payload.
///
/// Only the variants this sniffer cares about are named; every other byte is
/// classified as `Unhandled` by [`CommandByte::from_u8`] and ignored by the
/// dispatcher.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandByte {
    InitDb = 0x02,
    Query = 0x03,
    CreateDb = 0x05,
    DropDb = 0x06,
    StmtPrepare = 0x16,
    StmtExecute = 0x17,
    StmtSendLongData = 0x18,
    StmtClose = 0x19,
    StmtReset = 0x1a,
}

impl CommandByte {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x02 => Some(Self::InitDb),
            0x03 => Some(Self::Query),
            0x05 => Some(Self::CreateDb),
            0x06 => Some(Self::DropDb),
            0x16 => Some(Self::StmtPrepare),
            0x17 => Some(Self::StmtExecute),
            0x18 => Some(Self::StmtSendLongData),
            0x19 => Some(Self::StmtClose),
            0x1a => Some(Self::StmtReset),
            _ => None,
        }
    }
}

/// Handshake-phase capability-negotiation bytes that can appear as the first
/// byte of a mid-stream packet before the command phase begins.
///
/// See spec.md §4.3 and the Open Question in §9: a stricter implementation
/// would track connection phase instead of hard-coding these two bytes.
pub const HANDSHAKE_FRAGMENT_BYTES: [u8; 2] = [0x83, 0x8D];

#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    MYSQL_TYPE_DECIMAL = 0x00,
    MYSQL_TYPE_TINY = 0x01,
    MYSQL_TYPE_SHORT = 0x02,
    MYSQL_TYPE_LONG = 0x03,
    MYSQL_TYPE_FLOAT = 0x04,
    MYSQL_TYPE_DOUBLE = 0x05,
    MYSQL_TYPE_NULL = 0x06,
    MYSQL_TYPE_TIMESTAMP = 0x07,
    MYSQL_TYPE_LONGLONG = 0x08,
    MYSQL_TYPE_INT24 = 0x09,
    MYSQL_TYPE_DATE = 0x0a,
    MYSQL_TYPE_TIME = 0x0b,
    MYSQL_TYPE_DATETIME = 0x0c,
    MYSQL_TYPE_YEAR = 0x0d,
    MYSQL_TYPE_NEWDATE = 0x0e,
    MYSQL_TYPE_VARCHAR = 0x0f,
    MYSQL_TYPE_BIT = 0x10,
    MYSQL_TYPE_JSON = 0xf5,
    MYSQL_TYPE_NEWDECIMAL = 0xf6,
    MYSQL_TYPE_ENUM = 0xf7,
    MYSQL_TYPE_SET = 0xf8,
    MYSQL_TYPE_TINY_BLOB = 0xf9,
    MYSQL_TYPE_MEDIUM_BLOB = 0xfa,
    MYSQL_TYPE_LONG_BLOB = 0xfb,
    MYSQL_TYPE_BLOB = 0xfc,
    MYSQL_TYPE_VAR_STRING = 0xfd,
    MYSQL_TYPE_STRING = 0xfe,
    MYSQL_TYPE_GEOMETRY = 0xff,
}

impl ColumnType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::MYSQL_TYPE_DECIMAL),
            0x01 => Some(Self::MYSQL_TYPE_TINY),
            0x02 => Some(Self::MYSQL_TYPE_SHORT),
            0x03 => Some(Self::MYSQL_TYPE_LONG),
            0x04 => Some(Self::MYSQL_TYPE_FLOAT),
            0x05 => Some(Self::MYSQL_TYPE_DOUBLE),
            0x06 => Some(Self::MYSQL_TYPE_NULL),
            0x07 => Some(Self::MYSQL_TYPE_TIMESTAMP),
            0x08 => Some(Self::MYSQL_TYPE_LONGLONG),
            0x09 => Some(Self::MYSQL_TYPE_INT24),
            0x0a => Some(Self::MYSQL_TYPE_DATE),
            0x0b => Some(Self::MYSQL_TYPE_TIME),
            0x0c => Some(Self::MYSQL_TYPE_DATETIME),
            0x0d => Some(Self::MYSQL_TYPE_YEAR),
            0x0e => Some(Self::MYSQL_TYPE_NEWDATE),
            0x0f => Some(Self::MYSQL_TYPE_VARCHAR),
            0x10 => Some(Self::MYSQL_TYPE_BIT),
            0xf5 => Some(Self::MYSQL_TYPE_JSON),
            0xf6 => Some(Self::MYSQL_TYPE_NEWDECIMAL),
            0xf7 => Some(Self::MYSQL_TYPE_ENUM),
            0xf8 => Some(Self::MYSQL_TYPE_SET),
            0xf9 => Some(Self::MYSQL_TYPE_TINY_BLOB),
            0xfa => Some(Self::MYSQL_TYPE_MEDIUM_BLOB),
            0xfb => Some(Self::MYSQL_TYPE_LONG_BLOB),
            0xfc => Some(Self::MYSQL_TYPE_BLOB),
            0xfd => Some(Self::MYSQL_TYPE_VAR_STRING),
            0xfe => Some(Self::MYSQL_TYPE_STRING),
            0xff => Some(Self::MYSQL_TYPE_GEOMETRY),
            _ => None,
        }
    }

    /// True for every type whose value is a length-encoded byte string
    /// (DECIMAL/NEWDECIMAL text, VAR_STRING/STRING/VARCHAR, the BLOB family,
    /// BIT, ENUM, SET — see spec.md §4.4's type table).
    pub fn is_length_encoded_bytes(self) -> bool {
        matches!(
            self,
            Self::MYSQL_TYPE_DECIMAL
                | Self::MYSQL_TYPE_NEWDECIMAL
                | Self::MYSQL_TYPE_VAR_STRING
                | Self::MYSQL_TYPE_STRING
                | Self::MYSQL_TYPE_VARCHAR
                | Self::MYSQL_TYPE_TINY_BLOB
                | Self::MYSQL_TYPE_MEDIUM_BLOB
                | Self::MYSQL_TYPE_LONG_BLOB
                | Self::MYSQL_TYPE_BLOB
                | Self::MYSQL_TYPE_BIT
                | Self::MYSQL_TYPE_ENUM
                | Self::MYSQL_TYPE_SET
        )
    }
}

/// The second byte that follows a binary-protocol parameter type code; bit 0
/// set means "treat the integer decode as unsigned" (spec.md §4.4).
pub const PARAM_UNSIGNED_FLAG: u8 = 0x80;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_byte_matches_spec_table() {
        assert_eq!(CommandByte::from_u8(0x02), Some(CommandByte::InitDb));
        assert_eq!(CommandByte::from_u8(0x03), Some(CommandByte::Query));
        assert_eq!(CommandByte::from_u8(0x05), Some(CommandByte::CreateDb));
        assert_eq!(CommandByte::from_u8(0x06), Some(CommandByte::DropDb));
        assert_eq!(CommandByte::from_u8(0x16), Some(CommandByte::StmtPrepare));
        assert_eq!(CommandByte::from_u8(0x17), Some(CommandByte::StmtExecute));
        assert_eq!(
            CommandByte::from_u8(0x18),
            Some(CommandByte::StmtSendLongData)
        );
        assert_eq!(CommandByte::from_u8(0x19), Some(CommandByte::StmtClose));
        assert_eq!(CommandByte::from_u8(0x1a), Some(CommandByte::StmtReset));
        assert_eq!(CommandByte::from_u8(0x01), None);
    }

    #[test]
    fn column_type_round_trips_through_u8() {
        for byte in [0x00u8, 0x03, 0x08, 0x0c, 0xf6, 0xfd, 0xfe] {
            let ty = ColumnType::from_u8(byte).expect("known type code");
            assert_eq!(ty as u8, byte);
        }
    }
}
