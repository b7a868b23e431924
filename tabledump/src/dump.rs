//! Render every entry of a table as one line of escaped text.
//!
//! Each raw key is decoded as an internal key.  Keys that decode print as
//!
//! ```text
//! '<user key>' @ <sequence> : <type> => '<value>'
//! ```
//!
//! and keys too short to carry a tag print as
//!
//! ```text
//! badkey '<raw key>' => '<value>'
//! ```
//!
//! If the cursor ends in error, one final `iterator error: <error>` line follows the entries.

use std::io::Write;
use std::path::Path;

use biometrics::Counter;
use indicio::{clue, ERROR, INFO};
use zerror::Z;

use super::escape::{append_escaped, append_number};
use super::file::RandomRead;
use super::key::parse_internal_key;
use super::table::{ReadOptions, Table, TableOptions};
use super::{Error, IoToZ, COLLECTOR};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static DUMP: Counter = Counter::new("tabledump.dump");
static DUMP_ENTRY: Counter = Counter::new("tabledump.dump.entry");
static DUMP_BAD_KEY: Counter = Counter::new("tabledump.dump.bad_key");
static DUMP_ITERATION_ERROR: Counter = Counter::new("tabledump.dump.iteration_error");

/// Register the biometrics for this module.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&DUMP);
    collector.register_counter(&DUMP_ENTRY);
    collector.register_counter(&DUMP_BAD_KEY);
    collector.register_counter(&DUMP_ITERATION_ERROR);
}

//////////////////////////////////////////// EntryCursor ///////////////////////////////////////////

/// An ordered, forward-only source of raw key-value pairs.
///
/// A cursor is positioned with [EntryCursor::seek_to_first].  While [EntryCursor::valid] holds,
/// `key` and `value` return the current entry.  Once the cursor is no longer valid,
/// [EntryCursor::status] tells clean exhaustion apart from failure.
pub trait EntryCursor {
    /// Position the cursor at the first entry, if there is one.
    fn seek_to_first(&mut self);
    /// Advance to the next entry.  Does nothing when the cursor is not valid.
    fn next(&mut self);
    /// True iff the cursor is positioned at an entry.
    fn valid(&self) -> bool;
    /// The key of the current entry.
    fn key(&self) -> Option<&[u8]>;
    /// The value of the current entry.
    fn value(&self) -> Option<&[u8]>;
    /// Ok when the cursor has not encountered an error.
    fn status(&self) -> Result<(), Error>;
}

//////////////////////////////////////////// DumpOptions ///////////////////////////////////////////

/// Options for dumping a table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct DumpOptions {
    /// Verify the checksum of every data block.
    #[cfg_attr(
        feature = "command_line",
        arrrg(flag, "Verify the checksum of every data block.")
    )]
    verify_checksums: bool,
    /// Verify the checksum of the index block when opening the table.
    #[cfg_attr(
        feature = "command_line",
        arrrg(flag, "Verify the checksum of the index block on open.")
    )]
    paranoid_checks: bool,
}

impl DumpOptions {
    /// Set whether data block checksums get verified.
    pub fn verify_checksums(mut self, verify_checksums: bool) -> Self {
        self.verify_checksums = verify_checksums;
        self
    }

    /// Set whether the index block checksum gets verified on open.
    pub fn paranoid_checks(mut self, paranoid_checks: bool) -> Self {
        self.paranoid_checks = paranoid_checks;
        self
    }

    /// The options used to open tables.
    pub fn table_options(&self) -> TableOptions {
        TableOptions::default().paranoid_checks(self.paranoid_checks)
    }

    /// The options used to read tables.  A dump touches every block once, so it never fills the
    /// block cache.
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions::default()
            .verify_checksums(self.verify_checksums)
            .fill_cache(false)
    }
}

//////////////////////////////////////////// DumpSummary ///////////////////////////////////////////

/// Counts gathered while dumping.
#[derive(Clone, Debug, Default)]
pub struct DumpSummary {
    /// The number of entry lines written.
    pub entries: u64,
    /// How many of those entries had a key too short to be an internal key.
    pub bad_keys: u64,
    /// The error the cursor ended with, if any.
    pub iteration_error: Option<Error>,
}

///////////////////////////////////////////// formatting ///////////////////////////////////////////

/// Append the line for one entry, newline included, to `out`.  Returns true iff the key was not
/// a well-formed internal key.
pub fn append_entry(out: &mut String, raw_key: &[u8], raw_value: &[u8]) -> bool {
    let bad_key = match parse_internal_key(raw_key) {
        Some(parsed) => {
            out.push('\'');
            append_escaped(out, parsed.user_key);
            out.push_str("' @ ");
            append_number(out, parsed.sequence);
            out.push_str(" : ");
            out.push_str(&parsed.value_type.to_string());
            false
        }
        None => {
            out.push_str("badkey '");
            append_escaped(out, raw_key);
            out.push('\'');
            true
        }
    };
    out.push_str(" => '");
    append_escaped(out, raw_value);
    out.push_str("'\n");
    bad_key
}

/// Return the line for one entry, newline included.
pub fn format_entry(raw_key: &[u8], raw_value: &[u8]) -> String {
    let mut out = String::new();
    append_entry(&mut out, raw_key, raw_value);
    out
}

/////////////////////////////////////////////// dump ///////////////////////////////////////////////

/// Write one line per entry of `cursor` to `sink`, followed by an error line if the cursor fails.
///
/// Errors from the cursor are reported in the output and in the summary.  Only a failure to
/// write to `sink` returns an error.
pub fn dump_entries<C: EntryCursor, W: Write>(
    cursor: &mut C,
    sink: &mut W,
) -> Result<DumpSummary, Error> {
    let mut summary = DumpSummary::default();
    let mut line = String::new();
    cursor.seek_to_first();
    while cursor.valid() {
        let (key, value) = match (cursor.key(), cursor.value()) {
            (Some(key), Some(value)) => (key, value),
            _ => break,
        };
        line.clear();
        DUMP_ENTRY.click();
        if append_entry(&mut line, key, value) {
            DUMP_BAD_KEY.click();
            summary.bad_keys += 1;
        }
        sink.write_all(line.as_bytes())
            .as_z()
            .with_info("entry", summary.entries)?;
        summary.entries += 1;
        cursor.next();
    }
    if let Err(err) = cursor.status() {
        DUMP_ITERATION_ERROR.click();
        clue!(COLLECTOR, ERROR, {
            iteration_error: err.to_string(),
            entries: summary.entries,
        });
        sink.write_all(format!("iterator error: {err}\n").as_bytes())
            .as_z()
            .with_info("entries", summary.entries)?;
        summary.iteration_error = Some(err);
    }
    Ok(summary)
}

/// Dump every entry of an open table.
pub fn dump_table<F: RandomRead, W: Write>(
    options: &DumpOptions,
    table: &Table<F>,
    sink: &mut W,
) -> Result<DumpSummary, Error> {
    let mut cursor = table.cursor(&options.read_options());
    dump_entries(&mut cursor, sink)
}

/// Open the table at `path` and dump every entry to `sink`.
///
/// A table that cannot be opened returns the error and writes nothing.  An error partway through
/// the table is written as the final line and the dump still succeeds.
pub fn dump<P: AsRef<Path>, W: Write>(
    options: &DumpOptions,
    path: P,
    sink: &mut W,
) -> Result<(), Error> {
    DUMP.click();
    let table = Table::open_path(options.table_options(), path.as_ref())?;
    let summary = dump_table(options, &table, sink)?;
    sink.flush().as_z()?;
    clue!(COLLECTOR, INFO, {
        dump: {
            path: path.as_ref().to_string_lossy().to_string(),
            entries: summary.entries,
            bad_keys: summary.bad_keys,
            iteration_error: summary.iteration_error.is_some(),
        },
    });
    Ok(())
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
