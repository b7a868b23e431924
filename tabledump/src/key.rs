//! Internal keys are user keys with an eight-byte tag appended.  The tag packs a 56-bit sequence
//! number above a one-byte value type, and is stored little-endian.

use std::fmt::{Display, Formatter};

/// The width of the trailing tag of an internal key.
pub const TAG_WIDTH: usize = 8;
/// The largest sequence number that fits in a tag.
pub const MAX_SEQUENCE_NUMBER: u64 = (1u64 << 56) - 1;

///////////////////////////////////////////// ValueType ////////////////////////////////////////////

/// The operation recorded by an internal key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueType {
    /// A deletion marker.  Code 0.
    Deletion,
    /// A value insertion.  Code 1.
    Value,
    /// Any other code.  Kept so that tables written by newer code can still be dumped.
    Unknown(u8),
}

impl ValueType {
    /// The code stored in the low byte of the tag.
    pub fn code(&self) -> u8 {
        match self {
            ValueType::Deletion => 0,
            ValueType::Value => 1,
            ValueType::Unknown(code) => *code,
        }
    }
}

impl From<u8> for ValueType {
    fn from(code: u8) -> Self {
        match code {
            0 => ValueType::Deletion,
            1 => ValueType::Value,
            _ => ValueType::Unknown(code),
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            ValueType::Deletion => write!(fmt, "del"),
            ValueType::Value => write!(fmt, "val"),
            ValueType::Unknown(code) => write!(fmt, "{code}"),
        }
    }
}

///////////////////////////////////////// ParsedInternalKey ////////////////////////////////////////

/// A decoded view of an internal key.  The user key borrows from the raw key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParsedInternalKey<'a> {
    /// The user-visible portion of the key.
    pub user_key: &'a [u8],
    /// The sequence number.
    pub sequence: u64,
    /// The value type.
    pub value_type: ValueType,
}

/// Split `raw` into its user key and tag.  Returns None when the key is too short to carry a tag.
pub fn parse_internal_key(raw: &[u8]) -> Option<ParsedInternalKey<'_>> {
    if raw.len() < TAG_WIDTH {
        return None;
    }
    let (user_key, tag) = raw.split_at(raw.len() - TAG_WIDTH);
    let tag = u64::from_le_bytes(tag.try_into().ok()?);
    Some(ParsedInternalKey {
        user_key,
        sequence: tag >> 8,
        value_type: ValueType::from((tag & 0xff) as u8),
    })
}

/// Append the internal key for `user_key` to `out`.  The sequence is truncated to 56 bits.
pub fn append_internal_key(
    out: &mut Vec<u8>,
    user_key: &[u8],
    sequence: u64,
    value_type: ValueType,
) {
    let tag = ((sequence & MAX_SEQUENCE_NUMBER) << 8) | value_type.code() as u64;
    out.extend_from_slice(user_key);
    out.extend_from_slice(&tag.to_le_bytes());
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
