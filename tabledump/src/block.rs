//! A block is the base unit of a table.  This module provides a forward cursor over the entries of
//! a block.
//!
//! Entries are prefix-compressed against their predecessor:
//!
//! ```text
//! shared: varint32 | non_shared: varint32 | value_length: varint32 | key[non_shared] | value
//! ```
//!
//! The block ends with an array of fixed32 restart offsets, followed by the fixed32 count of
//! restarts.  An entry at a restart offset always has `shared == 0`.

use std::sync::Arc;

use buffertk::{v64, Unpackable};
use zerror::Z;
use zerror_core::ErrorCore;

use super::{corruption, unpack_error, Error};

/////////////////////////////////////////////// Block //////////////////////////////////////////////

/// A Block captures an immutable, sorted sequence of key-value pairs.
#[derive(Clone, Debug)]
pub struct Block {
    // The raw bytes loaded off disk, without the trailer.
    bytes: Arc<Vec<u8>>,
    // Offset of the restart array.  Entries occupy bytes[..restarts_offset].
    restarts_offset: usize,
    num_restarts: usize,
}

impl Block {
    /// Create a new block from the provided bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.len() < 4 {
            // A block must end in a u32 that indicates how many restarts there are.
            return Err(Error::BlockTooSmall {
                core: ErrorCore::default(),
                length: bytes.len(),
                required: 4,
            });
        }
        let num_restarts = read_fixed32(&bytes, bytes.len() - 4) as usize;
        let max_restarts = (bytes.len() - 4) / 4;
        if num_restarts > max_restarts {
            return Err(corruption("bad block contents")
                .with_info("num_restarts", num_restarts)
                .with_info("length", bytes.len()));
        }
        let restarts_offset = bytes.len() - (1 + num_restarts) * 4;
        Ok(Block {
            bytes: Arc::new(bytes),
            restarts_offset,
            num_restarts,
        })
    }

    /// Approximate size of the block, not including the struct itself.
    pub fn approximate_size(&self) -> usize {
        self.bytes.len()
    }

    /// The number of restart points in the block.
    pub fn num_restarts(&self) -> usize {
        self.num_restarts
    }

    /// Return a cursor over the block.
    pub fn cursor(&self) -> BlockCursor {
        BlockCursor::new(self.clone())
    }

    fn restart_point(&self, restart_idx: usize) -> usize {
        assert!(restart_idx < self.num_restarts);
        read_fixed32(&self.bytes, self.restarts_offset + restart_idx * 4) as usize
    }
}

fn read_fixed32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

////////////////////////////////////////// CursorPosition //////////////////////////////////////////

#[derive(Clone, Debug, Eq, PartialEq)]
enum CursorPosition {
    First,
    Last,
    Positioned {
        offset: usize,
        next_offset: usize,
        key: Vec<u8>,
        value_offset: usize,
        value_len: usize,
    },
}

//////////////////////////////////////////// BlockCursor ///////////////////////////////////////////

/// A forward cursor over a block.
///
/// The cursor starts before the first entry.  Each call to [BlockCursor::next] advances to the
/// next entry; once past the final entry, [BlockCursor::key] returns None.
#[derive(Clone, Debug)]
pub struct BlockCursor {
    block: Block,
    position: CursorPosition,
}

impl BlockCursor {
    /// Create a new BlockCursor from the provided block.
    pub fn new(block: Block) -> Self {
        BlockCursor {
            block,
            position: CursorPosition::First,
        }
    }

    /// Position the cursor before the first entry.
    pub fn seek_to_first(&mut self) {
        self.position = CursorPosition::First;
    }

    /// Advance to the next entry.  An error leaves the cursor past the end.
    pub fn next(&mut self) -> Result<(), Error> {
        let offset = match &self.position {
            CursorPosition::First => {
                if self.block.num_restarts == 0 {
                    self.position = CursorPosition::Last;
                    return Ok(());
                }
                self.block.restart_point(0)
            }
            CursorPosition::Last => {
                return Ok(());
            }
            CursorPosition::Positioned { next_offset, .. } => *next_offset,
        };
        if offset >= self.block.restarts_offset {
            self.position = CursorPosition::Last;
            return Ok(());
        }
        let prev_key = match &mut self.position {
            CursorPosition::Positioned { key, .. } => std::mem::take(key),
            _ => Vec::new(),
        };
        match Self::extract_entry(&self.block, offset, prev_key) {
            Ok(position) => {
                self.position = position;
                Ok(())
            }
            Err(err) => {
                self.position = CursorPosition::Last;
                Err(err)
            }
        }
    }

    /// The key where this cursor is positioned, or None if the cursor is at either end.
    pub fn key(&self) -> Option<&[u8]> {
        match &self.position {
            CursorPosition::Positioned { key, .. } => Some(key),
            _ => None,
        }
    }

    /// The value where this cursor is positioned, or None if the cursor is at either end.
    pub fn value(&self) -> Option<&[u8]> {
        match &self.position {
            CursorPosition::Positioned {
                value_offset,
                value_len,
                ..
            } => Some(&self.block.bytes[*value_offset..*value_offset + *value_len]),
            _ => None,
        }
    }

    /// The offset of the current entry within the block.
    pub fn offset(&self) -> usize {
        match &self.position {
            CursorPosition::First => 0,
            CursorPosition::Last => self.block.restarts_offset,
            CursorPosition::Positioned { offset, .. } => *offset,
        }
    }

    fn extract_entry(
        block: &Block,
        offset: usize,
        mut key: Vec<u8>,
    ) -> Result<CursorPosition, Error> {
        let limit = block.restarts_offset;
        let buf = &block.bytes[offset..limit];
        let (shared, buf) = v64::unpack(buf)
            .map_err(|e| unpack_error(e, "entry shared length").with_info("offset", offset))?;
        let (non_shared, buf) = v64::unpack(buf)
            .map_err(|e| unpack_error(e, "entry non-shared length").with_info("offset", offset))?;
        let (value_len, buf) = v64::unpack(buf)
            .map_err(|e| unpack_error(e, "entry value length").with_info("offset", offset))?;
        let shared: u64 = shared.into();
        let non_shared: u64 = non_shared.into();
        let value_len: u64 = value_len.into();
        if shared > key.len() as u64 {
            return Err(corruption("entry shares more bytes than the previous key has")
                .with_info("offset", offset)
                .with_info("shared", shared)
                .with_info("previous_key_len", key.len()));
        }
        if non_shared.saturating_add(value_len) > buf.len() as u64 {
            return Err(corruption("entry runs past the end of the block")
                .with_info("offset", offset)
                .with_info("non_shared", non_shared)
                .with_info("value_len", value_len));
        }
        let non_shared = non_shared as usize;
        let value_len = value_len as usize;
        let key_offset = limit - buf.len();
        key.truncate(shared as usize);
        key.extend_from_slice(&block.bytes[key_offset..key_offset + non_shared]);
        let value_offset = key_offset + non_shared;
        Ok(CursorPosition::Positioned {
            offset,
            next_offset: value_offset + value_len,
            key,
            value_offset,
            value_len,
        })
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
