//! The fixed-layout pieces of a table: block handles, the footer, and block trailers.
//!
//! A table ends with a 48-byte footer holding the handles of the metaindex and index blocks,
//! zero padding, and an eight-byte magic number.  Every block is followed by a five-byte
//! trailer: one byte of compression type and a masked crc32c of the block plus that byte.

use buffertk::{v64, Unpackable};
use zerror::Z;
use zerror_core::ErrorCore;

use super::file::RandomRead;
use super::{corruption, unpack_error, Error, CRC32C_FAILURE, UNSUPPORTED_COMPRESSION};

/// The magic number that terminates every table.
pub const TABLE_MAGIC_NUMBER: u64 = 0xdb4775248b80fb57;
/// The maximum encoded size of a block handle:  two varint64s.
pub const MAX_BLOCK_HANDLE_LEN: usize = 10 + 10;
/// The encoded size of a footer.
pub const FOOTER_LEN: usize = 2 * MAX_BLOCK_HANDLE_LEN + 8;
/// The size of the trailer that follows every block.
pub const BLOCK_TRAILER_LEN: usize = 5;

const MASK_DELTA: u32 = 0xa282ead8;

/// Mask a crc so that crcs of data containing embedded crcs remain useful.
pub fn mask_checksum(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Reverse [mask_checksum].
pub fn unmask_checksum(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

////////////////////////////////////////// CompressionType /////////////////////////////////////////

/// The compression named by a block trailer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompressionType {
    /// The block is stored as-is.
    NoCompression,
    /// The block is compressed with snappy.
    Snappy,
    /// A code this reader does not recognize.
    Unknown(u8),
}

impl From<u8> for CompressionType {
    fn from(code: u8) -> Self {
        match code {
            0 => CompressionType::NoCompression,
            1 => CompressionType::Snappy,
            _ => CompressionType::Unknown(code),
        }
    }
}

impl CompressionType {
    /// The byte stored in the trailer.
    pub fn code(&self) -> u8 {
        match self {
            CompressionType::NoCompression => 0,
            CompressionType::Snappy => 1,
            CompressionType::Unknown(code) => *code,
        }
    }
}

//////////////////////////////////////////// BlockHandle ///////////////////////////////////////////

/// The location of a block within a table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlockHandle {
    /// The offset of the first byte of the block.
    pub offset: u64,
    /// The size of the block, excluding its trailer.
    pub size: u64,
}

impl BlockHandle {
    /// Decode a block handle from the front of `buf`, returning the handle and the rest.
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (offset, buf) =
            v64::unpack(buf).map_err(|e| unpack_error(e, "block handle offset"))?;
        let (size, buf) = v64::unpack(buf).map_err(|e| unpack_error(e, "block handle size"))?;
        let handle = BlockHandle {
            offset: offset.into(),
            size: size.into(),
        };
        Ok((handle, buf))
    }

    /// Append the encoded form of this handle to `out`.
    pub fn encode_to(&self, out: &mut Vec<u8>) {
        buffertk::stack_pack(v64::from(self.offset))
            .pack(v64::from(self.size))
            .append_to_vec(out);
    }
}

////////////////////////////////////////////// Footer //////////////////////////////////////////////

/// The footer found in the final [FOOTER_LEN] bytes of a table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Footer {
    /// The handle of the metaindex block.
    pub metaindex_handle: BlockHandle,
    /// The handle of the index block.
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Decode a footer.  `buf` must be exactly [FOOTER_LEN] bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != FOOTER_LEN {
            return Err(corruption("footer has the wrong length").with_info("length", buf.len()));
        }
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&buf[FOOTER_LEN - 8..]);
        if u64::from_le_bytes(magic) != TABLE_MAGIC_NUMBER {
            return Err(corruption("not an sstable (bad magic number)"));
        }
        let (metaindex_handle, rest) = BlockHandle::decode(&buf[..FOOTER_LEN - 8])?;
        let (index_handle, _) = BlockHandle::decode(rest)?;
        Ok(Self {
            metaindex_handle,
            index_handle,
        })
    }

    /// Append the [FOOTER_LEN]-byte encoding of this footer to `out`.
    pub fn encode_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        self.metaindex_handle.encode_to(out);
        self.index_handle.encode_to(out);
        out.resize(start + 2 * MAX_BLOCK_HANDLE_LEN, 0);
        out.extend_from_slice(&TABLE_MAGIC_NUMBER.to_le_bytes());
    }
}

///////////////////////////////////////////// read_block ///////////////////////////////////////////

/// Read the block at `handle` and return its uncompressed contents with the trailer stripped.
///
/// The checksum is only verified when `verify_checksums` is set.  The checksum covers the block
/// as stored, so it is checked before decompression.
pub fn read_block<F: RandomRead>(
    file: &F,
    handle: &BlockHandle,
    verify_checksums: bool,
) -> Result<Vec<u8>, Error> {
    let size = handle.size as usize;
    let mut buf = vec![0u8; size + BLOCK_TRAILER_LEN];
    file.read_exact_at(&mut buf, handle.offset)
        .with_info("block_offset", handle.offset)
        .with_info("block_size", handle.size)?;
    let compression = buf[size];
    if verify_checksums {
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&buf[size + 1..]);
        let expected = unmask_checksum(u32::from_le_bytes(stored));
        let computed = crc32c::crc32c(&buf[..size + 1]);
        if expected != computed {
            CRC32C_FAILURE.click();
            return Err(Error::Crc32cFailure {
                core: ErrorCore::default(),
                offset: handle.offset,
                size: handle.size,
                expected,
                computed,
            });
        }
    }
    match CompressionType::from(compression) {
        CompressionType::NoCompression => {
            buf.truncate(size);
            Ok(buf)
        }
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(&buf[..size])
            .map_err(|err| {
                corruption("corrupted compressed block contents")
                    .with_info("offset", handle.offset)
                    .with_info("what", err.to_string())
            }),
        CompressionType::Unknown(_) => {
            UNSUPPORTED_COMPRESSION.click();
            Err(Error::UnsupportedCompression {
                core: ErrorCore::default(),
                offset: handle.offset,
                compression,
            })
        }
    }
}

/// Append `contents` and a valid trailer for `compression` to `out`.
pub fn append_block_with_trailer(out: &mut Vec<u8>, contents: &[u8], compression: CompressionType) {
    out.extend_from_slice(contents);
    out.push(compression.code());
    let crc = crc32c::crc32c_append(crc32c::crc32c(contents), &[compression.code()]);
    out.extend_from_slice(&mask_checksum(crc).to_le_bytes());
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_round_trips() {
        for crc in [0u32, 1, 0x8a9136aa, u32::MAX, 0xdeadbeef] {
            assert_eq!(crc, unmask_checksum(mask_checksum(crc)));
        }
    }

    #[test]
    fn mask_matches_leveldb() {
        // ((crc >> 15) | (crc << 17)) + kMaskDelta
        let crc = 0x12345678u32;
        let expected = ((crc >> 15) | (crc << 17)).wrapping_add(0xa282ead8);
        assert_eq!(expected, mask_checksum(crc));
    }

    #[test]
    fn block_handle_decode() {
        // offset 300 (0xac 0x02), size 5
        let buf: &[u8] = &[0xac, 0x02, 0x05, 0xff];
        let (handle, rest) = BlockHandle::decode(buf).unwrap();
        assert_eq!(BlockHandle { offset: 300, size: 5 }, handle);
        assert_eq!(&[0xff], rest);
        let mut out = Vec::new();
        handle.encode_to(&mut out);
        assert_eq!(&buf[..3], out.as_slice());
    }

    #[test]
    fn block_handle_truncated() {
        assert!(matches!(
            BlockHandle::decode(&[0x80]),
            Err(Error::UnpackError { .. })
        ));
        assert!(matches!(
            BlockHandle::decode(&[0x01]),
            Err(Error::UnpackError { .. })
        ));
    }

    #[test]
    fn footer() {
        let footer = Footer {
            metaindex_handle: BlockHandle {
                offset: 1024,
                size: 17,
            },
            index_handle: BlockHandle {
                offset: 1046,
                size: 93,
            },
        };
        let mut buf = Vec::new();
        footer.encode_to(&mut buf);
        assert_eq!(FOOTER_LEN, buf.len());
        assert_eq!(&[0x57, 0xfb, 0x80, 0x8b, 0x24, 0x75, 0x47, 0xdb], &buf[40..]);
        assert_eq!(footer, Footer::decode(&buf).unwrap());
    }

    #[test]
    fn footer_bad_magic() {
        let mut buf = Vec::new();
        Footer::default().encode_to(&mut buf);
        buf[47] ^= 0x01;
        match Footer::decode(&buf) {
            Err(Error::Corruption { context, .. }) => {
                assert_eq!("not an sstable (bad magic number)", context);
            }
            _ => panic!("expected corruption"),
        }
    }

    fn stored_block(contents: &[u8], compression: CompressionType) -> (Vec<u8>, BlockHandle) {
        let mut file = b"padding".to_vec();
        let handle = BlockHandle {
            offset: file.len() as u64,
            size: contents.len() as u64,
        };
        append_block_with_trailer(&mut file, contents, compression);
        (file, handle)
    }

    #[test]
    fn read_uncompressed_block() {
        let (file, handle) = stored_block(b"block contents", CompressionType::NoCompression);
        assert_eq!(
            b"block contents".to_vec(),
            read_block(&file, &handle, true).unwrap()
        );
    }

    #[test]
    fn read_snappy_block() {
        let contents = b"snappy snappy snappy snappy snappy snappy".repeat(8);
        let compressed = snap::raw::Encoder::new().compress_vec(&contents).unwrap();
        assert!(compressed.len() < contents.len());
        let (file, handle) = stored_block(&compressed, CompressionType::Snappy);
        assert_eq!(contents, read_block(&file, &handle, true).unwrap());
    }

    #[test]
    fn corrupt_snappy_block() {
        let (file, handle) = stored_block(&[0xff, 0xff, 0xff, 0xff, 0xff], CompressionType::Snappy);
        match read_block(&file, &handle, true) {
            Err(Error::Corruption { context, .. }) => {
                assert_eq!("corrupted compressed block contents", context);
            }
            _ => panic!("expected corruption"),
        }
    }

    #[test]
    fn unknown_compression() {
        let (file, handle) = stored_block(b"zstd?", CompressionType::Unknown(2));
        assert!(matches!(
            read_block(&file, &handle, false),
            Err(Error::UnsupportedCompression { compression: 2, .. })
        ));
    }

    #[test]
    fn checksum_mismatch() {
        let (mut file, handle) = stored_block(b"block contents", CompressionType::NoCompression);
        file[handle.offset as usize] ^= 0x01;
        assert!(matches!(
            read_block(&file, &handle, true),
            Err(Error::Crc32cFailure { .. })
        ));
        assert!(read_block(&file, &handle, false).is_ok());
    }

    #[test]
    fn footer_wrong_length() {
        assert!(matches!(
            Footer::decode(&[0u8; 47]),
            Err(Error::Corruption { .. })
        ));
    }
}
