use bytes::{Buf, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::{
    constants::{DEFAULT_MAX_FRAME_SIZE, INITIAL_BUFFER_CAPACITY},
    error::FramingError,
    varint::read_length_prefix,
};

/// Reassembles varint length-delimited frames from arbitrarily chunked
/// input.
///
/// Each call to [feed](FrameAssembler::feed) appends a chunk to the
/// accumulation buffer and returns a lazy iterator over the payloads which
/// became complete. Bytes of a partial frame, including a partial length
/// prefix, are kept until a later chunk completes them.
///
/// One assembler handles one logical stream.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    max_frame_size: usize,
    poisoned: bool,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Payloads announcing more than `max_frame_size` bytes are rejected with
    /// [FramingError::FrameTooLarge] as soon as their prefix is read.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_frame_size,
            poisoned: false,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Bytes received but not yet resolved into a frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether an earlier framing error stopped this assembler.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Append `chunk` and iterate over the payloads now complete.
    ///
    /// Payloads left unread when the iterator is dropped stay buffered and
    /// are returned by the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        if !self.poisoned {
            self.buffer.extend_from_slice(chunk);
        }
        Frames {
            assembler: self,
            reported_poison: false,
        }
    }

    /// End the stream, failing if a partial frame is still buffered.
    pub fn finish(self) -> Result<(), FramingError> {
        if self.poisoned {
            return Err(FramingError::Poisoned);
        }
        match self.buffer.len() {
            0 => Ok(()),
            remaining => Err(FramingError::Truncated { remaining }),
        }
    }

    /// Split the next complete frame off the front of `buffer`, returning its
    /// payload.
    ///
    /// Shared with [FrameDecoder](super::FrameDecoder), whose buffer is owned
    /// by the surrounding `FramedRead`.
    pub(crate) fn next_frame(
        buffer: &mut BytesMut,
        max_frame_size: usize,
    ) -> Result<Option<Bytes>, FramingError> {
        let prefix = match read_length_prefix(&buffer[..])? {
            Some(prefix) => prefix,
            None => return Ok(None),
        };
        let frame_len = match prefix.frame_len() {
            Some(len) if prefix.length <= max_frame_size as u64 => len,
            _ => {
                return Err(FramingError::FrameTooLarge {
                    length: prefix.length,
                    max: max_frame_size,
                })
            }
        };
        if buffer.len() < frame_len {
            buffer.reserve(frame_len - buffer.len());
            return Ok(None);
        }
        let mut frame = buffer.split_to(frame_len);
        frame.advance(prefix.prefix_len);
        trace!("Extracted frame of {} bytes", prefix.length);
        Ok(Some(frame.freeze()))
    }

    fn poison(&mut self, error: &FramingError) {
        warn!(
            "Discarding {} buffered bytes after framing error: {}",
            self.buffer.len(),
            error
        );
        self.poisoned = true;
        self.buffer.clear();
    }
}

/// Payloads made complete by one [FrameAssembler::feed].
#[derive(Debug)]
pub struct Frames<'a> {
    assembler: &'a mut FrameAssembler,
    reported_poison: bool,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<Bytes, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.assembler.poisoned {
            if self.reported_poison {
                return None;
            }
            self.reported_poison = true;
            return Some(Err(FramingError::Poisoned));
        }
        match FrameAssembler::next_frame(
            &mut self.assembler.buffer,
            self.assembler.max_frame_size,
        ) {
            Ok(frame) => frame.map(Ok),
            Err(err) => {
                self.assembler.poison(&err);
                // the error itself is reported once, later feeds see Poisoned
                self.reported_poison = true;
                Some(Err(err))
            }
        }
    }
}
