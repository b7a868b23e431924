//! A table writer for tests.  The library only reads tables; this writes the same format so the
//! reader has something to read.

#![allow(dead_code)]

use std::path::PathBuf;

use buffertk::v64;

use tabledump::format::{append_block_with_trailer, BlockHandle, CompressionType, Footer};
use tabledump::key::{append_internal_key, ValueType};

/////////////////////////////////////////// BuilderOptions /////////////////////////////////////////

#[derive(Clone, Debug)]
pub struct BuilderOptions {
    restart_interval: usize,
    target_block_size: usize,
    compression: CompressionType,
}

impl BuilderOptions {
    pub fn restart_interval(mut self, restart_interval: usize) -> Self {
        self.restart_interval = restart_interval.max(1);
        self
    }

    pub fn target_block_size(mut self, target_block_size: usize) -> Self {
        self.target_block_size = target_block_size;
        self
    }

    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            restart_interval: 16,
            target_block_size: 4096,
            compression: CompressionType::NoCompression,
        }
    }
}

/////////////////////////////////////////// BlockBuilder ///////////////////////////////////////////

struct BlockBuilder {
    restart_interval: usize,
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    fn new(restart_interval: usize) -> Self {
        Self {
            restart_interval,
            buffer: vec![],
            restarts: vec![0],
            counter: 0,
            last_key: vec![],
        }
    }

    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    fn add(&mut self, key: &[u8], value: &[u8]) {
        let shared = if self.counter < self.restart_interval {
            self.last_key
                .iter()
                .zip(key.iter())
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };
        buffertk::stack_pack(v64::from(shared as u64))
            .pack(v64::from((key.len() - shared) as u64))
            .pack(v64::from(value.len() as u64))
            .append_to_vec(&mut self.buffer);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
    }

    fn finish(&mut self) -> Vec<u8> {
        let mut out = std::mem::take(&mut self.buffer);
        for restart in self.restarts.iter() {
            out.extend_from_slice(&restart.to_le_bytes());
        }
        out.extend_from_slice(&(self.restarts.len() as u32).to_le_bytes());
        self.restarts = vec![0];
        self.counter = 0;
        self.last_key.clear();
        out
    }
}

/////////////////////////////////////////// TableBuilder ///////////////////////////////////////////

pub struct TableBuilder {
    options: BuilderOptions,
    file: Vec<u8>,
    data: BlockBuilder,
    index: BlockBuilder,
    last_key: Vec<u8>,
    data_handles: Vec<BlockHandle>,
}

impl TableBuilder {
    pub fn new(options: BuilderOptions) -> Self {
        let data = BlockBuilder::new(options.restart_interval);
        Self {
            options,
            file: vec![],
            data,
            index: BlockBuilder::new(1),
            last_key: vec![],
            data_handles: vec![],
        }
    }

    /// Add a raw key.  Keys are expected in sorted order but this is not checked.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        self.data.add(key, value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        if self.data.size_estimate() >= self.options.target_block_size {
            self.flush_data_block();
        }
    }

    pub fn put(&mut self, user_key: &[u8], sequence: u64, value: &[u8]) {
        let mut key = vec![];
        append_internal_key(&mut key, user_key, sequence, ValueType::Value);
        self.add(&key, value);
    }

    pub fn del(&mut self, user_key: &[u8], sequence: u64) {
        let mut key = vec![];
        append_internal_key(&mut key, user_key, sequence, ValueType::Deletion);
        self.add(&key, &[]);
    }

    /// Write an empty data block; real writers never do this, but readers must cope.
    pub fn empty_data_block(&mut self) {
        self.flush_data_block();
        let contents = self.data.finish();
        self.write_data_block(contents);
    }

    /// The handles of the data blocks written so far.
    pub fn data_handles(&self) -> &[BlockHandle] {
        &self.data_handles
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush_data_block();
        let metaindex_contents = BlockBuilder::new(1).finish();
        let metaindex_handle = self.write_block(&metaindex_contents, CompressionType::NoCompression);
        let index_contents = self.index.finish();
        let index_handle = self.write_block(&index_contents, CompressionType::NoCompression);
        Footer {
            metaindex_handle,
            index_handle,
        }
        .encode_to(&mut self.file);
        self.file
    }

    fn flush_data_block(&mut self) {
        if self.data.is_empty() {
            return;
        }
        let contents = self.data.finish();
        self.write_data_block(contents);
    }

    fn write_data_block(&mut self, contents: Vec<u8>) {
        let compression = self.options.compression;
        let contents = match compression {
            CompressionType::Snappy => snap::raw::Encoder::new().compress_vec(&contents).unwrap(),
            _ => contents,
        };
        let handle = self.write_block(&contents, compression);
        let mut encoded = vec![];
        handle.encode_to(&mut encoded);
        let separator = self.last_key.clone();
        self.index.add(&separator, &encoded);
        self.data_handles.push(handle);
    }

    fn write_block(&mut self, contents: &[u8], compression: CompressionType) -> BlockHandle {
        let handle = BlockHandle {
            offset: self.file.len() as u64,
            size: contents.len() as u64,
        };
        append_block_with_trailer(&mut self.file, contents, compression);
        handle
    }
}

////////////////////////////////////////////// helpers /////////////////////////////////////////////

/// A path in the temporary directory unique to this process and test.
pub fn scratch_path(test: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tabledump.{}.{}.ldb", std::process::id(), test))
}

/// Write `bytes` to a scratch file for `test` and return its path.
pub fn write_table(test: &str, bytes: &[u8]) -> PathBuf {
    let path = scratch_path(test);
    std::fs::write(&path, bytes).unwrap();
    path
}
