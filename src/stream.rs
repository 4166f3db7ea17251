//! Byte streams carried by media objects.
//!
//! A [`MediaStream`] can be any kind of media payload — an ogg file, a
//! matroska video, a png image. Streams are explicitly opened and closed;
//! a media object hands out an independent stream per call, so no two
//! consumers ever share a read position.

use crate::error::{MediaBusError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A readable/writable byte stream with explicit lifecycle.
pub trait MediaStream: Send {
    /// Opens the stream for reading or writing.
    fn open(&mut self) -> Result<()>;

    /// Closes the stream. Closing an already-closed stream is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Reads into `buf`, returning the number of bytes read. Zero means
    /// end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf` to the stream, returning the number of bytes written.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Total size in bytes, when known up front.
    fn size(&self) -> Option<u64>;

    /// Whether the stream is currently open.
    fn is_open(&self) -> bool;
}

/// Access mode for a [`FileStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileMode {
    Read,
    Write,
}

/// A stream backed by a file on the local filesystem.
pub struct FileStream {
    path: PathBuf,
    mode: FileMode,
    file: Option<File>,
}

impl FileStream {
    /// A stream that reads an existing file.
    pub fn read_from(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: FileMode::Read,
            file: None,
        }
    }

    /// A stream that writes a file, truncating any existing content.
    pub fn write_to(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: FileMode::Write,
            file: None,
        }
    }

    /// The filesystem path backing this stream.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MediaStream for FileStream {
    fn open(&mut self) -> Result<()> {
        let file = match self.mode {
            FileMode::Read => File::open(&self.path)?,
            FileMode::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)?,
        };
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.file {
            Some(f) => Ok(f.read(buf)?),
            None => Err(MediaBusError::Stream("read from closed stream".into())),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match &mut self.file {
            Some(f) => Ok(f.write(buf)?),
            None => Err(MediaBusError::Stream("write to closed stream".into())),
        }
    }

    fn size(&self) -> Option<u64> {
        std::fs::metadata(&self.path).map(|m| m.len()).ok()
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

/// An in-memory stream over a shared byte buffer.
///
/// Reads walk the buffer from the start; writes append. The backing
/// buffer is shared, so a sink's output can be inspected while the
/// stream object itself has moved into another thread.
pub struct MemoryStream {
    data: Arc<Mutex<Vec<u8>>>,
    pos: usize,
    open: bool,
}

impl MemoryStream {
    /// An empty writable stream.
    pub fn empty() -> Self {
        Self::from_shared(Arc::new(Mutex::new(Vec::new())))
    }

    /// A stream pre-filled with `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self::from_shared(Arc::new(Mutex::new(data)))
    }

    /// A stream over an existing shared buffer.
    pub fn from_shared(data: Arc<Mutex<Vec<u8>>>) -> Self {
        Self {
            data,
            pos: 0,
            open: false,
        }
    }

    /// A clone of the backing buffer handle, for later inspection.
    pub fn shared_buffer(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.data)
    }
}

impl MediaStream for MemoryStream {
    fn open(&mut self) -> Result<()> {
        self.pos = 0;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.open {
            return Err(MediaBusError::Stream("read from closed stream".into()));
        }
        let data = crate::sync::lock(&self.data);
        let remaining = data.len().saturating_sub(self.pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(MediaBusError::Stream("write to closed stream".into()));
        }
        crate::sync::lock(&self.data).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> Option<u64> {
        Some(crate::sync::lock(&self.data).len() as u64)
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_stream_roundtrip() {
        let mut stream = MemoryStream::new(b"hello world".to_vec());
        stream.open().unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(stream.size(), Some(11));
    }

    #[test]
    fn test_memory_stream_write_appends() {
        let mut stream = MemoryStream::empty();
        let buffer = stream.shared_buffer();
        stream.open().unwrap();
        stream.write(b"abc").unwrap();
        stream.write(b"def").unwrap();
        assert_eq!(&*crate::sync::lock(&buffer), b"abcdef");
    }

    #[test]
    fn test_closed_stream_rejects_io() {
        let mut stream = MemoryStream::new(vec![1, 2, 3]);
        let mut buf = [0u8; 3];
        assert!(stream.read(&mut buf).is_err());
        assert!(stream.write(&buf).is_err());
    }

    #[test]
    fn test_read_past_end_returns_zero() {
        let mut stream = MemoryStream::new(vec![1, 2]);
        stream.open().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }
}
