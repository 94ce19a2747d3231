//! Invocation-private output capture and the swappable console sink.
//!
//! The session owns one [`OutputSink`], normally the process stdout. For the
//! duration of an invocation it is pointed at a [`CaptureWriter`] through
//! [`OutputSink::redirect`]. The returned [`Redirect`] guard puts the original
//! target back when it is dropped, on every exit path including unwinding,
//! and drops the capture writer at the same moment so the buffer can be
//! finalized.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::errors::CaptureError;

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    overflowed: bool,
}

/// In-memory store for the bytes written during one invocation.
#[derive(Debug)]
pub struct CaptureBuffer {
    shared: Arc<Mutex<Captured>>,
    limit: usize,
}

impl CaptureBuffer {
    /// Create a buffer holding at most `limit` bytes, reserving
    /// `initial_capacity` bytes up front.
    pub fn with_limit(limit: usize, initial_capacity: usize) -> Result<Self, CaptureError> {
        let requested = initial_capacity.min(limit);
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(requested)
            .map_err(|source| CaptureError::Allocate { requested, source })?;

        Ok(Self {
            shared: Arc::new(Mutex::new(Captured {
                bytes,
                overflowed: false,
            })),
            limit,
        })
    }

    /// A write handle feeding this buffer.
    pub fn writer(&self) -> CaptureWriter {
        CaptureWriter {
            shared: Arc::clone(&self.shared),
            limit: self.limit,
        }
    }

    /// Consume the buffer and return everything written to it.
    ///
    /// Every [`CaptureWriter`] must have been dropped first.
    pub fn finish(self) -> Result<Vec<u8>, CaptureError> {
        let captured = Arc::try_unwrap(self.shared)
            .map_err(|_| CaptureError::WriterStillOpen)?
            .into_inner()
            .map_err(|_| CaptureError::Poisoned)?;

        if captured.overflowed {
            return Err(CaptureError::LimitExceeded { limit: self.limit });
        }
        Ok(captured.bytes)
    }
}

/// Write side of a [`CaptureBuffer`].
#[derive(Debug)]
pub struct CaptureWriter {
    shared: Arc<Mutex<Captured>>,
    limit: usize,
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut captured = self
            .shared
            .lock()
            .map_err(|_| io::Error::other("capture buffer lock poisoned"))?;

        let room = self.limit.saturating_sub(captured.bytes.len());
        if buf.len() > room {
            captured.overflowed = true;
            return Err(io::Error::new(
                io::ErrorKind::StorageFull,
                format!("captured output exceeded {} bytes", self.limit),
            ));
        }
        captured.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The console every invocation writes to.
pub struct OutputSink {
    target: Box<dyn Write + Send>,
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl OutputSink {
    pub fn new(target: impl Write + Send + 'static) -> Self {
        Self {
            target: Box::new(target),
        }
    }

    /// Sink writing to the process stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Point the sink at `capture` until the returned guard is dropped.
    pub fn redirect(&mut self, capture: CaptureWriter) -> Redirect<'_> {
        let _ = self.target.flush();
        let original = std::mem::replace(&mut self.target, Box::new(capture));
        Redirect {
            sink: self,
            original: Some(original),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.target.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.target.flush()
    }
}

/// Scope of one redirection. Writes go to the capture writer.
pub struct Redirect<'a> {
    sink: &'a mut OutputSink,
    original: Option<Box<dyn Write + Send>>,
}

impl Write for Redirect<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.target.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.target.flush()
    }
}

impl Drop for Redirect<'_> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            let _ = self.sink.target.flush();
            // Dropping the replaced capture writer closes the write side.
            drop(std::mem::replace(&mut self.sink.target, original));
        }
    }
}
