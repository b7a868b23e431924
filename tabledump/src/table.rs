//! A read-only table.  [Table::open] validates the footer and loads the index block; a
//! [TableCursor] walks the index block and each data block it names, in order.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use biometrics::Counter;
use indicio::{clue, INFO};
use lru::LruCache;
use zerror::Z;

use super::block::{Block, BlockCursor};
use super::dump::EntryCursor;
use super::file::{file_size, RandomAccessFile, RandomRead};
use super::format::{read_block, BlockHandle, Footer, BLOCK_TRAILER_LEN, FOOTER_LEN};
use super::{corruption, Error, COLLECTOR};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static TABLE_OPEN: Counter = Counter::new("tabledump.table.open");
static BLOCK_LOAD: Counter = Counter::new("tabledump.table.block_load");
static BLOCK_CACHE_HIT: Counter = Counter::new("tabledump.table.block_cache_hit");
static BLOCK_CACHE_MISS: Counter = Counter::new("tabledump.table.block_cache_miss");
static BLOCK_CACHE_INSERT: Counter = Counter::new("tabledump.table.block_cache_insert");
static CURSOR_SEEK_TO_FIRST: Counter = Counter::new("tabledump.table.cursor.seek_to_first");
static CURSOR_NEXT: Counter = Counter::new("tabledump.table.cursor.next");
static CURSOR_ERROR: Counter = Counter::new("tabledump.table.cursor.error");

/// Register the biometrics for this module.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&TABLE_OPEN);
    collector.register_counter(&BLOCK_LOAD);
    collector.register_counter(&BLOCK_CACHE_HIT);
    collector.register_counter(&BLOCK_CACHE_MISS);
    collector.register_counter(&BLOCK_CACHE_INSERT);
    collector.register_counter(&CURSOR_SEEK_TO_FIRST);
    collector.register_counter(&CURSOR_NEXT);
    collector.register_counter(&CURSOR_ERROR);
}

/////////////////////////////////////////// TableOptions ///////////////////////////////////////////

/// Options that apply for the lifetime of an open table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableOptions {
    paranoid_checks: bool,
    block_cache_capacity: usize,
}

impl TableOptions {
    /// Verify the checksum of the index block when opening the table.
    pub fn paranoid_checks(mut self, paranoid_checks: bool) -> Self {
        self.paranoid_checks = paranoid_checks;
        self
    }

    /// Set the number of data blocks the table will cache.  Zero disables the cache.  The least
    /// recently used block is evicted first.
    pub fn block_cache_capacity(mut self, block_cache_capacity: usize) -> Self {
        self.block_cache_capacity = block_cache_capacity;
        self
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            paranoid_checks: false,
            block_cache_capacity: 64,
        }
    }
}

//////////////////////////////////////////// ReadOptions ///////////////////////////////////////////

/// Options that apply to a single cursor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadOptions {
    verify_checksums: bool,
    fill_cache: bool,
}

impl ReadOptions {
    /// Verify the checksum of every data block the cursor reads.
    pub fn verify_checksums(mut self, verify_checksums: bool) -> Self {
        self.verify_checksums = verify_checksums;
        self
    }

    /// Insert the data blocks the cursor reads into the table's block cache.
    pub fn fill_cache(mut self, fill_cache: bool) -> Self {
        self.fill_cache = fill_cache;
        self
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
        }
    }
}

/////////////////////////////////////////////// Table //////////////////////////////////////////////

/// An open table.  The table owns its file; dropping the table closes the file.
pub struct Table<F: RandomRead = RandomAccessFile> {
    options: TableOptions,
    file: F,
    size: u64,
    footer: Footer,
    index: Block,
    // Data blocks keyed by offset.  None when the capacity is zero.
    cache: Option<Mutex<LruCache<u64, Block>>>,
}

impl Table<RandomAccessFile> {
    /// Open the table stored at `path`.
    pub fn open_path<P: AsRef<Path>>(options: TableOptions, path: P) -> Result<Self, Error> {
        let size = file_size(path.as_ref())?;
        let file = RandomAccessFile::open(path.as_ref())?;
        Table::open(options, file, size)
            .with_info("path", path.as_ref().to_string_lossy().to_string())
    }
}

impl<F: RandomRead> Table<F> {
    /// Open a table over the first `size` bytes of `file`.
    pub fn open(options: TableOptions, file: F, size: u64) -> Result<Self, Error> {
        if size < FOOTER_LEN as u64 {
            return Err(corruption("file is too short to be an sstable").with_info("size", size));
        }
        let mut buf = [0u8; FOOTER_LEN];
        file.read_exact_at(&mut buf, size - FOOTER_LEN as u64)
            .with_info("footer_offset", size - FOOTER_LEN as u64)?;
        let footer = Footer::decode(&buf)?;
        check_handle(&footer.index_handle, size)?;
        let index = Block::new(read_block(
            &file,
            &footer.index_handle,
            options.paranoid_checks,
        )?)?;
        TABLE_OPEN.click();
        clue!(COLLECTOR, INFO, {
            open: {
                size: size,
                index_offset: footer.index_handle.offset,
                index_size: footer.index_handle.size,
            },
        });
        let cache = NonZeroUsize::new(options.block_cache_capacity)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Ok(Self {
            options,
            file,
            size,
            footer,
            index,
            cache,
        })
    }

    /// The options this table was opened with.
    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// The size of the table in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The footer of the table.
    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    /// The number of data blocks currently held in the block cache.
    pub fn cached_blocks(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.lock().unwrap().len(),
            None => 0,
        }
    }

    /// True iff the data block at `offset` is in the block cache.
    pub fn is_cached(&self, offset: u64) -> bool {
        match &self.cache {
            Some(cache) => cache.lock().unwrap().contains(&offset),
            None => false,
        }
    }

    /// Return a cursor over the table.  The cursor is not positioned until
    /// [EntryCursor::seek_to_first] is called.
    pub fn cursor(&self, options: &ReadOptions) -> TableCursor<'_, F> {
        TableCursor {
            table: self,
            options: *options,
            index: self.index.cursor(),
            data: None,
            status: None,
        }
    }

    fn load_block(&self, handle: &BlockHandle, options: &ReadOptions) -> Result<Block, Error> {
        if let Some(cache) = &self.cache {
            let cached = cache.lock().unwrap().get(&handle.offset).cloned();
            if let Some(block) = cached {
                BLOCK_CACHE_HIT.click();
                return Ok(block);
            }
            BLOCK_CACHE_MISS.click();
        }
        check_handle(handle, self.size)?;
        BLOCK_LOAD.click();
        let block = Block::new(read_block(&self.file, handle, options.verify_checksums)?)?;
        if let (Some(cache), true) = (&self.cache, options.fill_cache) {
            cache.lock().unwrap().put(handle.offset, block.clone());
            BLOCK_CACHE_INSERT.click();
        }
        Ok(block)
    }
}

fn check_handle(handle: &BlockHandle, size: u64) -> Result<(), Error> {
    let end = handle
        .offset
        .checked_add(handle.size)
        .and_then(|x| x.checked_add(BLOCK_TRAILER_LEN as u64));
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(corruption("block handle points past the end of the file")
            .with_info("offset", handle.offset)
            .with_info("block_size", handle.size)
            .with_info("file_size", size)),
    }
}

//////////////////////////////////////////// TableCursor ///////////////////////////////////////////

/// A forward cursor over every entry of a table.
///
/// The cursor stops at the first error it encounters.  Afterwards it is not valid and
/// [EntryCursor::status] returns the error until the next [EntryCursor::seek_to_first].
pub struct TableCursor<'a, F: RandomRead = RandomAccessFile> {
    table: &'a Table<F>,
    options: ReadOptions,
    index: BlockCursor,
    data: Option<BlockCursor>,
    status: Option<Error>,
}

impl<'a, F: RandomRead> TableCursor<'a, F> {
    fn fail(&mut self, err: Error) {
        CURSOR_ERROR.click();
        self.data = None;
        self.status = Some(err);
    }

    // Advance through the index until positioned on an entry, exhausted, or failed.
    fn skip_empty_data_blocks(&mut self) {
        while self.status.is_none() {
            if self.data.as_ref().and_then(BlockCursor::key).is_some() {
                return;
            }
            if let Err(err) = self.index.next() {
                self.fail(err);
                return;
            }
            let handle = match self.index.value() {
                Some(value) => BlockHandle::decode(value).map(|(handle, _)| handle),
                None => {
                    self.data = None;
                    return;
                }
            };
            let block = match handle.and_then(|h| self.table.load_block(&h, &self.options)) {
                Ok(block) => block,
                Err(err) => {
                    self.fail(err);
                    return;
                }
            };
            let mut data = block.cursor();
            if let Err(err) = data.next() {
                self.fail(err);
                return;
            }
            self.data = Some(data);
        }
    }
}

impl<'a, F: RandomRead> EntryCursor for TableCursor<'a, F> {
    fn seek_to_first(&mut self) {
        CURSOR_SEEK_TO_FIRST.click();
        self.status = None;
        self.data = None;
        self.index.seek_to_first();
        self.skip_empty_data_blocks();
    }

    fn next(&mut self) {
        if !self.valid() {
            return;
        }
        CURSOR_NEXT.click();
        if let Some(data) = self.data.as_mut() {
            if let Err(err) = data.next() {
                self.fail(err);
                return;
            }
        }
        self.skip_empty_data_blocks();
    }

    fn valid(&self) -> bool {
        self.status.is_none() && self.key().is_some()
    }

    fn key(&self) -> Option<&[u8]> {
        self.data.as_ref().and_then(BlockCursor::key)
    }

    fn value(&self) -> Option<&[u8]> {
        self.data.as_ref().and_then(BlockCursor::value)
    }

    fn status(&self) -> Result<(), Error> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
