//! tabledump prints the contents of a sorted-string table.
//!
//! The crate reads tables in the LevelDB on-disk format.  Every entry's key is decoded as an
//! internal key (user key, sequence number, value type) and written as one escaped line of text.
//! The table reader lives behind the [EntryCursor] trait so that the dump logic can be driven by
//! any ordered source of key-value pairs.

use biometrics::Counter;
use zerror::{iotoz, Z};
use zerror_core::ErrorCore;

pub mod block;
pub mod dump;
pub mod escape;
pub mod file;
pub mod format;
pub mod key;
pub mod table;

pub use dump::{dump, dump_entries, dump_table, format_entry, DumpOptions, DumpSummary, EntryCursor};
pub use key::{parse_internal_key, ParsedInternalKey, ValueType};
pub use table::{ReadOptions, Table, TableCursor, TableOptions};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static CORRUPTION: Counter = Counter::new("tabledump.corruption");
static SYSTEM_ERROR: Counter = Counter::new("tabledump.error.system_error");
static UNPACK_ERROR: Counter = Counter::new("tabledump.error.unpack_error");
static CRC32C_FAILURE: Counter = Counter::new("tabledump.error.crc32c_failure");
static UNSUPPORTED_COMPRESSION: Counter = Counter::new("tabledump.error.unsupported_compression");

/// Register this crate's biometrics.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&CORRUPTION);
    collector.register_counter(&SYSTEM_ERROR);
    collector.register_counter(&UNPACK_ERROR);
    collector.register_counter(&CRC32C_FAILURE);
    collector.register_counter(&UNSUPPORTED_COMPRESSION);

    dump::register_biometrics(collector);
    file::register_biometrics(collector);
    table::register_biometrics(collector);
}

////////////////////////////////////////////// indicio /////////////////////////////////////////////

/// The collector for this crate's clues.  Nothing is emitted until an emitter is registered.
pub static COLLECTOR: indicio::Collector = indicio::Collector::new();

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// The tabledump Error type.
#[derive(Clone, zerror_derive::Z)]
pub enum Error {
    /// Success.  Used for Default.  Should not be constructed otherwise.
    Success {
        /// The error core.
        core: ErrorCore,
    },
    /// A system error was encountered.
    SystemError {
        /// The error core.
        core: ErrorCore,
        /// A hint as to what went wrong.
        what: String,
    },
    /// General corruption was observed.
    Corruption {
        /// The error core.
        core: ErrorCore,
        /// A description of what was corrupt.
        context: String,
    },
    /// The block was too small to be considered valid.
    BlockTooSmall {
        /// The error core.
        core: ErrorCore,
        /// The length observed.
        length: usize,
        /// The length required.
        required: usize,
    },
    /// A block failed its crc check.
    Crc32cFailure {
        /// The error core.
        core: ErrorCore,
        /// The offset of the block.
        offset: u64,
        /// The size of the block, not including its trailer.
        size: u64,
        /// The crc stored in the trailer, unmasked.
        expected: u32,
        /// The crc computed over the block.
        computed: u32,
    },
    /// A block was compressed with an algorithm this reader does not implement.
    UnsupportedCompression {
        /// The error core.
        core: ErrorCore,
        /// The offset of the block.
        offset: u64,
        /// The compression type byte from the block trailer.
        compression: u8,
    },
    /// There was an error unpacking data.
    UnpackError {
        /// The error core.
        core: ErrorCore,
        /// Additional context.
        context: String,
        /// The underlying unpack error.
        what: String,
    },
}

impl Default for Error {
    fn default() -> Self {
        Error::Success {
            core: ErrorCore::default(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(what: std::io::Error) -> Error {
        SYSTEM_ERROR.click();
        Error::SystemError {
            core: ErrorCore::default(),
            what: format!("{what:?}"),
        }
    }
}

impl From<buffertk::Error> for Error {
    fn from(error: buffertk::Error) -> Error {
        UNPACK_ERROR.click();
        Error::UnpackError {
            core: ErrorCore::default(),
            context: "From<buffertk::Error>".to_owned(),
            what: format!("{error:?}"),
        }
    }
}

iotoz! {Error}

/// Create a corruption error with the provided context and click the corruption counter.
pub(crate) fn corruption<S: Into<String>>(context: S) -> Error {
    CORRUPTION.click();
    Error::Corruption {
        core: ErrorCore::default(),
        context: context.into(),
    }
}

/// Create an unpack error with the provided context.
pub(crate) fn unpack_error<S: Into<String>>(error: buffertk::Error, context: S) -> Error {
    UNPACK_ERROR.click();
    Error::UnpackError {
        core: ErrorCore::default(),
        context: context.into(),
        what: format!("{error:?}"),
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
