//! Read-only access to table files.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use biometrics::Counter;
use zerror::Z;

use super::{Error, IoToZ};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static FILE_OPEN: Counter = Counter::new("tabledump.file.open");
static FILE_CLOSE: Counter = Counter::new("tabledump.file.close");
pub(crate) static FILE_READ: Counter = Counter::new("tabledump.file.read");

/// Register the biometrics for this module.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&FILE_OPEN);
    collector.register_counter(&FILE_CLOSE);
    collector.register_counter(&FILE_READ);
}

///////////////////////////////////////////// file_size ////////////////////////////////////////////

/// Return the size of the file at `path`.
pub fn file_size<P: AsRef<Path>>(path: P) -> Result<u64, Error> {
    let metadata = std::fs::metadata(path.as_ref())
        .as_z()
        .with_info("stat", path.as_ref().to_string_lossy())?;
    Ok(metadata.len())
}

///////////////////////////////////////////// RandomRead ///////////////////////////////////////////

/// Positional reads.  A table reads everything it needs through this trait.
pub trait RandomRead {
    /// Fill `buf` with the bytes starting at `offset`.  A short read is an error.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error>;
}

impl RandomRead for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(buf.len())?));
        match range.and_then(|range| self.get(range)) {
            Some(src) => {
                buf.copy_from_slice(src);
                Ok(())
            }
            None => Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past the end of the buffer",
            ))
            .with_info("offset", offset)
            .with_info("amount", buf.len())
            .with_info("size", self.len())),
        }
    }
}

////////////////////////////////////////// RandomAccessFile ////////////////////////////////////////

/// A file opened for positional reads.  The descriptor is closed when this is dropped.
#[derive(Debug)]
pub struct RandomAccessFile {
    file: File,
    path: PathBuf,
}

impl RandomAccessFile {
    /// Open the file at `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref())
            .as_z()
            .with_info("open", path.as_ref().to_string_lossy())?;
        FILE_OPEN.click();
        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }
}

impl RandomRead for RandomAccessFile {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
        FILE_READ.click();
        self.file
            .read_exact_at(buf, offset)
            .as_z()
            .with_info("path", self.path.to_string_lossy())
            .with_info("offset", offset)
            .with_info("amount", buf.len())
    }
}

impl Drop for RandomAccessFile {
    fn drop(&mut self) {
        FILE_CLOSE.click();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use biometrics::Sensor;

    use super::*;

    fn scratch(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "tabledump.file.{}.{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn size_and_read() {
        let path = scratch("size_and_read", b"hello world");
        assert_eq!(11, file_size(&path).unwrap());
        let file = RandomAccessFile::open(&path).unwrap();
        let before = FILE_READ.read();
        let mut buf = [0u8; 5];
        file.read_exact_at(&mut buf, 6).unwrap();
        assert_eq!(b"world", &buf);
        assert!(FILE_READ.read() > before);
        drop(file);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn short_read_is_an_error() {
        let path = scratch("short_read", b"abc");
        let file = RandomAccessFile::open(&path).unwrap();
        let mut buf = [0u8; 8];
        let err = file.read_exact_at(&mut buf, 0).unwrap_err();
        assert!(matches!(err, Error::SystemError { .. }));
        assert!(err.long_form().contains("short_read"), "{}", err.long_form());
        drop(file);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn in_memory_reads() {
        let bytes = b"hello world".to_vec();
        let mut buf = [0u8; 5];
        bytes.read_exact_at(&mut buf, 0).unwrap();
        assert_eq!(b"hello", &buf);
        assert!(matches!(
            bytes.read_exact_at(&mut buf, 7),
            Err(Error::SystemError { .. })
        ));
        assert!(bytes.read_exact_at(&mut buf, u64::MAX).is_err());
    }

    #[test]
    fn missing_file() {
        let path = std::env::temp_dir().join("tabledump.file.does-not-exist");
        assert!(matches!(file_size(&path), Err(Error::SystemError { .. })));
        assert!(matches!(
            RandomAccessFile::open(&path),
            Err(Error::SystemError { .. })
        ));
    }
}
