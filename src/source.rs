//! Content sources
//!
//! A content source is a factory for one-shot byte streams over the
//! proxied content. It may be asked for a stream any number of times and
//! must yield the same bytes, of the declared size, every time.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A one-shot byte stream with an explicit release step
pub trait ContentStream: Read + Send {
    /// Release the stream, reporting any error that surfaces on close
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Factory for content streams
pub trait ContentSource: Send + Sync {
    /// Open a fresh stream over the content
    ///
    /// The token is the caller's cancellation signal; sources that block
    /// should stop early once it is cancelled.
    fn open(&self, cancel: &CancellationToken) -> io::Result<Box<dyn ContentStream>>;
}

impl<F> ContentSource for F
where
    F: Fn(&CancellationToken) -> io::Result<Box<dyn ContentStream>> + Send + Sync,
{
    fn open(&self, cancel: &CancellationToken) -> io::Result<Box<dyn ContentStream>> {
        self(cancel)
    }
}

/// Adapts any reader into a stream whose close never fails
pub struct ReaderStream<R> {
    inner: R,
}

impl<R: Read + Send + 'static> ReaderStream<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Wrap a reader and box it as a stream
    pub fn boxed(inner: R) -> Box<dyn ContentStream> {
        Box::new(Self::new(inner))
    }
}

impl<R: Read> Read for ReaderStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> ContentStream for ReaderStream<R> {
    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

fn cancelled() -> io::Error {
    io::Error::other("operation cancelled")
}

/// Serves the contents of a local file
///
/// The declared size is captured when the source is created; if the file
/// changes afterwards the proxy reports a length mismatch.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Create a source for `path`, recording its current length
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let len = std::fs::metadata(&path)?.len();
        Ok(Self { path, len })
    }

    /// Declared size of the content
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the content is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentSource for FileSource {
    fn open(&self, cancel: &CancellationToken) -> io::Result<Box<dyn ContentStream>> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        debug!("Opening {}", self.path.display());
        let file = File::open(&self.path)?;
        Ok(Box::new(FileStream {
            file,
            cancel: cancel.clone(),
        }))
    }
}

struct FileStream {
    file: File,
    cancel: CancellationToken,
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        self.file.read(buf)
    }
}

impl ContentStream for FileStream {
    fn close(self: Box<Self>) -> io::Result<()> {
        drop(self.file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn read_all(mut stream: Box<dyn ContentStream>) -> Vec<u8> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        stream.close().unwrap();
        out
    }

    #[test]
    fn closure_source() {
        let source =
            |_: &CancellationToken| Ok::<_, io::Error>(ReaderStream::boxed(Cursor::new(b"hello".to_vec())));
        let stream = source.open(&CancellationToken::new()).unwrap();
        assert_eq!(read_all(stream), b"hello");
    }

    #[test]
    fn file_source_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("content.bin");
        std::fs::write(&path, b"file contents").unwrap();

        let source = FileSource::new(&path).unwrap();
        assert_eq!(source.len(), 13);
        assert!(!source.is_empty());

        let stream = source.open(&CancellationToken::new()).unwrap();
        assert_eq!(read_all(stream), b"file contents");
    }

    #[test]
    fn file_source_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(FileSource::new(temp.path().join("missing")).is_err());
    }

    #[test]
    fn file_source_honors_cancellation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("content.bin");
        std::fs::write(&path, b"abc").unwrap();
        let source = FileSource::new(&path).unwrap();

        let cancel = CancellationToken::new();
        let mut stream = source.open(&cancel).unwrap();
        cancel.cancel();

        let mut buf = [0u8; 3];
        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.to_string(), "operation cancelled");

        assert!(source.open(&cancel).is_err());
    }
}
