//! Append-only input streams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ParseError, ParseErrorKind};

#[derive(Default)]
struct Buffer {
    data: Vec<u8>,
    frozen: bool,
}

#[derive(Default)]
struct Shared {
    buffer: Mutex<Buffer>,
    /// An invocation is running on this stream.
    busy: AtomicBool,
    /// A parse was attempted on the stream while it was busy.
    reentered: AtomicBool,
}

/// Input for a parse. Bytes are only ever appended; once frozen no more
/// arrive.
///
/// Cloning shares the stream.
#[derive(Clone, Default)]
pub struct Stream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffer = self.shared.buffer.lock();
        f.debug_struct("Stream")
            .field("len", &buffer.data.len())
            .field("frozen", &buffer.frozen)
            .finish()
    }
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frozen stream holding `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let stream = Stream::new();
        stream.append(data);
        stream.freeze();
        stream
    }

    /// Append bytes. Ignored (with a warning) once frozen.
    pub fn append(&self, data: &[u8]) {
        let mut buffer = self.shared.buffer.lock();
        if buffer.frozen {
            tracing::warn!(len = data.len(), "append to frozen stream ignored");
            return;
        }
        buffer.data.extend_from_slice(data);
    }

    /// Signal end of data.
    pub fn freeze(&self) {
        self.shared.buffer.lock().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.shared.buffer.lock().frozen
    }

    pub fn len(&self) -> usize {
        self.shared.buffer.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the bytes from `offset` on, plus the frozen flag.
    pub fn with_window<R>(&self, offset: usize, f: impl FnOnce(&[u8], bool) -> R) -> R {
        let buffer = self.shared.buffer.lock();
        let window = buffer.data.get(offset..).unwrap_or_default();
        f(window, buffer.frozen)
    }

    /// Copy `len` bytes at `offset`, if available.
    pub fn read(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        let buffer = self.shared.buffer.lock();
        let end = offset.checked_add(len)?;
        buffer.data.get(offset..end).map(<[u8]>::to_vec)
    }

    /// Whether the stream is the same as `other`.
    pub fn same(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Mark the stream busy for the lifetime of the guard.
    ///
    /// Fails if an invocation already runs on it; the running invocation
    /// notices through [`Stream::take_reentered`].
    pub(crate) fn enter(&self, path: &str) -> Result<StreamGuard<'_>, ParseError> {
        if self.shared.busy.swap(true, Ordering::AcqRel) {
            self.shared.reentered.store(true, Ordering::Release);
            return Err(ParseError::new(
                ParseErrorKind::ReentrantHookParse,
                path,
                0,
                "a hook started a parse on the stream it is being called from",
            ));
        }
        Ok(StreamGuard { stream: self })
    }

    pub(crate) fn take_reentered(&self) -> bool {
        self.shared.reentered.swap(false, Ordering::AcqRel)
    }
}

pub(crate) struct StreamGuard<'a> {
    stream: &'a Stream,
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.stream.shared.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_freeze() {
        let s = Stream::new();
        s.append(b"ab");
        s.append(b"c");
        assert_eq!(s.len(), 3);
        assert_eq!(s.read(1, 2), Some(b"bc".to_vec()));
        assert_eq!(s.read(2, 2), None);
        s.freeze();
        s.append(b"d");
        assert_eq!(s.len(), 3);
        assert!(s.is_frozen());
    }

    #[test]
    fn window_past_end_is_empty() {
        let s = Stream::from_bytes(b"xy");
        assert_eq!(s.with_window(5, |w, eod| (w.len(), eod)), (0, true));
    }

    #[test]
    fn nested_enter_is_rejected_and_flagged() {
        let s = Stream::new();
        let guard = s.enter("Outer").unwrap();
        let err = s.clone().enter("Inner").err().unwrap();
        assert_eq!(err.kind, ParseErrorKind::ReentrantHookParse);
        assert_eq!(err.path, "Inner");
        assert!(s.take_reentered());
        assert!(!s.take_reentered());
        drop(guard);
        assert!(s.enter("Outer").is_ok());
    }
}
