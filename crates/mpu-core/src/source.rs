//! Byte-range reads from the local source file.
//!
//! Workers of one session share a single read-only handle; each read is
//! positional (pread-style) so there is no shared cursor. Part bodies are
//! streamed through [`RangeBody`], so no part is ever held in memory whole.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Positional reads from a shared source.
pub trait RangeReader: Send + Sync {
    /// Reads up to `buf.len()` bytes at `offset`. `Ok(0)` means end of source.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Reads exactly `len` bytes at `offset`. A short read is an error.
    fn read_range(&self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let len_usize = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "range too large"))?;
        let mut buf = Vec::with_capacity(len_usize);
        RangeBody::new(self, offset, len).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// One byte range of a [`RangeReader`] as a `Read` stream. Fails with
/// `UnexpectedEof` if the source ends before `len` bytes were produced.
pub struct RangeBody<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    offset: u64,
    len: u64,
    sent: u64,
}

impl<'a, R: RangeReader + ?Sized> RangeBody<'a, R> {
    pub fn new(reader: &'a R, offset: u64, len: u64) -> Self {
        Self {
            reader,
            offset,
            len,
            sent: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes produced so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl<R: RangeReader + ?Sized> Read for RangeBody<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.len - self.sent;
        if left == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = left.min(buf.len() as u64) as usize;
        loop {
            match self.reader.read_at(self.offset + self.sent, &mut buf[..want]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "short read at offset {}: expected {} bytes, got {}",
                            self.offset, self.len, self.sent
                        ),
                    ))
                }
                Ok(n) => {
                    self.sent += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Positional reader over an open file. Safe to clone and use from multiple threads.
#[derive(Clone, Debug)]
pub struct FileRangeReader {
    file: Arc<File>,
    path: PathBuf,
    len: u64,
}

impl FileRangeReader {
    /// Open `path` read-only and record its current length.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            len: meta.len(),
        })
    }

    /// File length at open time.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RangeReader for FileRangeReader {
    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        FileExt::read_at(self.file.as_ref(), buf, offset)
    }

    /// Non-Unix fallback: clone the handle, seek, read. Each call gets its own cursor.
    #[cfg(not(unix))]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::{Seek, SeekFrom};
        let mut f = self.file.as_ref().try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.read(buf)
    }
}
