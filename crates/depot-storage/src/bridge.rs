//! A blocking, bounded pipe between two threads.
//!
//! [`stream_bridge`] connects a producer pushing [`Bytes`] chunks to a
//! consumer pulling a continuous byte stream. Remote uploads use it to turn
//! the caller's sequence of `write` calls into the single reader a blob
//! service consumes; downloads use it the other way round.
//!
//! The buffer holds at most `capacity` bytes. A write blocks while the chunk
//! does not fit, except that any chunk is admitted into an empty buffer.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};

use crate::error::{StorageError, StorageResult};

/// Default buffer bound, in bytes.
pub const DEFAULT_BRIDGE_CAPACITY: usize = 4 * 1024 * 1024;

#[derive(Default)]
struct State {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    closed: bool,
    error: Option<String>,
    reader_gone: bool,
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self, error: Option<String>) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            state.error = error;
        }
        drop(state);
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

/// Create a connected writer/reader pair buffering at most `capacity` bytes.
pub fn stream_bridge(capacity: usize) -> (BridgeWriter, BridgeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::default()),
        readable: Condvar::new(),
        writable: Condvar::new(),
        capacity: capacity.max(1),
    });
    (
        BridgeWriter {
            shared: Arc::clone(&shared),
        },
        BridgeReader { shared },
    )
}

/// Producer half. Dropping it closes the bridge.
pub struct BridgeWriter {
    shared: Arc<Shared>,
}

impl BridgeWriter {
    /// Append a chunk, blocking while the buffer is full.
    ///
    /// Fails with [`StorageError::StreamClosed`] after [`close`](Self::close)
    /// and with a broken-pipe I/O error once the reader is gone.
    pub fn write(&self, data: impl Into<Bytes>) -> StorageResult<()> {
        let data = data.into();
        let shared = &*self.shared;
        let mut state = shared.lock();
        loop {
            if state.reader_gone {
                return Err(broken_pipe().into());
            }
            if state.closed {
                return Err(StorageError::StreamClosed);
            }
            if data.is_empty() {
                return Ok(());
            }
            if state.buffered == 0 || state.buffered + data.len() <= shared.capacity {
                break;
            }
            state = shared
                .writable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.buffered += data.len();
        state.chunks.push_back(data);
        drop(state);
        shared.readable.notify_all();
        Ok(())
    }

    /// Signal end of stream. Idempotent.
    pub fn close(&self) {
        self.shared.close(None);
    }

    /// Close the bridge with an error the reader sees after the buffered
    /// data.
    pub fn fail(&self, message: impl Into<String>) {
        self.shared.close(Some(message.into()));
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Returns `true` once the reader has been dropped.
    pub fn is_disconnected(&self) -> bool {
        self.shared.lock().reader_gone
    }
}

impl io::Write for BridgeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BridgeWriter::write(self, Bytes::copy_from_slice(buf)).map_err(|e| match e {
            StorageError::Io(e) => e,
            other => io::Error::other(other),
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BridgeWriter {
    fn drop(&mut self) {
        self.shared.close(None);
    }
}

/// Consumer half. Dropping it makes further writes fail.
pub struct BridgeReader {
    shared: Arc<Shared>,
}

impl BridgeReader {
    /// Read until `max` bytes are collected or the stream ends.
    ///
    /// With `None`, reads to the end of the stream. An empty result means
    /// end of stream.
    pub fn read_up_to(&mut self, max: Option<usize>) -> io::Result<Bytes> {
        let mut out = BytesMut::new();
        loop {
            let want = match max {
                Some(max) if out.len() >= max => break,
                Some(max) => max - out.len(),
                None => usize::MAX,
            };
            match self.next_chunk(want) {
                Ok(Some(chunk)) => out.extend_from_slice(&chunk),
                Ok(None) => break,
                // The failure stays recorded and is returned by the next call.
                Err(_) if !out.is_empty() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(out.freeze())
    }

    /// Take up to `want` bytes, blocking until some are buffered. Returns
    /// `None` at end of stream.
    fn next_chunk(&mut self, want: usize) -> io::Result<Option<Bytes>> {
        let shared = &*self.shared;
        let mut state = shared.lock();
        while state.chunks.is_empty() && !state.closed {
            state = shared
                .readable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let Some(front) = state.chunks.front_mut() else {
            return match &state.error {
                Some(message) => Err(io::Error::other(message.clone())),
                None => Ok(None),
            };
        };
        let chunk = if front.len() <= want {
            let whole = front.split_to(front.len());
            state.chunks.pop_front();
            whole
        } else {
            front.split_to(want)
        };
        state.buffered -= chunk.len();
        drop(state);
        shared.writable.notify_all();
        Ok(Some(chunk))
    }
}

impl io::Read for BridgeReader {
    /// Fills `buf` completely unless the stream ends first. A failure is
    /// reported only once every buffered byte has been returned.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.next_chunk(buf.len() - filled) {
                Ok(Some(chunk)) => {
                    buf[filled..filled + chunk.len()].copy_from_slice(&chunk);
                    filled += chunk.len();
                }
                Ok(None) => break,
                Err(_) if filled > 0 => break,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl Drop for BridgeReader {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.reader_gone = true;
        state.chunks.clear();
        state.buffered = 0;
        drop(state);
        self.shared.writable.notify_all();
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "bridge reader is gone")
}
