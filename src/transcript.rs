// Licensed under the Apache-2.0 license

//! Transcript accumulation. Every message that binds into a responder
//! signature or a session key derivation is logged here, request before
//! response, by explicit handler calls.

use crate::config::{
    MAX_MESSAGE_LARGE_BUFFER_SIZE, MAX_MESSAGE_MEDIUM_BUFFER_SIZE, MAX_MESSAGE_SMALL_BUFFER_SIZE,
};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TranscriptError {
    /// The buffer cannot take the requested append. Recoverable: the oversize
    /// input came from the peer, not from a broken invariant.
    #[error("transcript buffer full")]
    BufferFull,
}

pub type TranscriptResult<T> = Result<T, TranscriptError>;

/// Fixed-capacity append-only byte log. Capacity is one of the three size
/// classes and never changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedBuffer<const N: usize> {
    length: usize,
    data: [u8; N],
}

impl<const N: usize> ManagedBuffer<N> {
    pub fn new() -> Self {
        const {
            assert!(
                N == MAX_MESSAGE_SMALL_BUFFER_SIZE
                    || N == MAX_MESSAGE_MEDIUM_BUFFER_SIZE
                    || N == MAX_MESSAGE_LARGE_BUFFER_SIZE
            );
        }
        Self {
            length: 0,
            data: [0u8; N],
        }
    }

    /// Zeroes the backing storage and empties the buffer.
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.length = 0;
    }

    /// Appends `bytes` after the current contents. All-or-nothing: on
    /// `BufferFull` the buffer is unchanged. An empty append succeeds with no
    /// effect.
    pub fn append(&mut self, bytes: &[u8]) -> TranscriptResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if bytes.len() > N - self.length {
            return Err(TranscriptError::BufferFull);
        }
        self.data[self.length..self.length + bytes.len()].copy_from_slice(bytes);
        self.length += bytes.len();
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.length
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.length]
    }

    pub fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for ManagedBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Transcript buffers scoped to the whole connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TranscriptContext {
    /// GET_VERSION through ALGORITHMS.
    A,
    /// GET_DIGESTS through CERTIFICATE.
    B,
    /// CHALLENGE and CHALLENGE_AUTH minus its signature.
    C,
    /// GET_MEASUREMENTS and MEASUREMENTS minus its signature.
    M,
}

pub(crate) struct Transcript {
    message_a: ManagedBuffer<MAX_MESSAGE_SMALL_BUFFER_SIZE>,
    message_b: ManagedBuffer<MAX_MESSAGE_LARGE_BUFFER_SIZE>,
    message_c: ManagedBuffer<MAX_MESSAGE_MEDIUM_BUFFER_SIZE>,
    message_m: ManagedBuffer<MAX_MESSAGE_LARGE_BUFFER_SIZE>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            message_a: ManagedBuffer::new(),
            message_b: ManagedBuffer::new(),
            message_c: ManagedBuffer::new(),
            message_m: ManagedBuffer::new(),
        }
    }

    pub fn reset(&mut self) {
        self.message_a.reset();
        self.message_b.reset();
        self.message_c.reset();
        self.message_m.reset();
    }

    pub fn reset_context(&mut self, context: TranscriptContext) {
        match context {
            TranscriptContext::A => self.message_a.reset(),
            TranscriptContext::B => self.message_b.reset(),
            TranscriptContext::C => self.message_c.reset(),
            TranscriptContext::M => self.message_m.reset(),
        }
    }

    pub fn append(&mut self, context: TranscriptContext, data: &[u8]) -> TranscriptResult<()> {
        match context {
            TranscriptContext::A => self.message_a.append(data),
            TranscriptContext::B => self.message_b.append(data),
            TranscriptContext::C => self.message_c.append(data),
            TranscriptContext::M => self.message_m.append(data),
        }
    }

    pub fn message(&self, context: TranscriptContext) -> &[u8] {
        match context {
            TranscriptContext::A => self.message_a.data(),
            TranscriptContext::B => self.message_b.data(),
            TranscriptContext::C => self.message_c.data(),
            TranscriptContext::M => self.message_m.data(),
        }
    }

    pub fn size(&self, context: TranscriptContext) -> usize {
        self.message(context).len()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// Transcript buffers scoped to one secure session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionTranscriptContext {
    /// KEY_EXCHANGE / PSK_EXCHANGE and their responses.
    K,
    /// FINISH / PSK_FINISH and their responses.
    F,
}

#[derive(Debug)]
pub(crate) struct SessionTranscript {
    message_k: ManagedBuffer<MAX_MESSAGE_LARGE_BUFFER_SIZE>,
    message_f: ManagedBuffer<MAX_MESSAGE_MEDIUM_BUFFER_SIZE>,
}

impl SessionTranscript {
    pub fn new() -> Self {
        Self {
            message_k: ManagedBuffer::new(),
            message_f: ManagedBuffer::new(),
        }
    }

    pub fn append(
        &mut self,
        context: SessionTranscriptContext,
        data: &[u8],
    ) -> TranscriptResult<()> {
        match context {
            SessionTranscriptContext::K => self.message_k.append(data),
            SessionTranscriptContext::F => self.message_f.append(data),
        }
    }

    pub fn message(&self, context: SessionTranscriptContext) -> &[u8] {
        match context {
            SessionTranscriptContext::K => self.message_k.data(),
            SessionTranscriptContext::F => self.message_f.data(),
        }
    }
}

impl Default for SessionTranscript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_append_accumulates_in_order() {
        let mut buf: ManagedBuffer<MAX_MESSAGE_SMALL_BUFFER_SIZE> = ManagedBuffer::new();
        buf.append(&[1, 2, 3]).unwrap();
        buf.append(&[]).unwrap();
        buf.append(&[4, 5]).unwrap();
        assert_eq!(buf.size(), 5);
        assert_eq!(buf.data(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_failed_append_leaves_buffer_unchanged() {
        let mut buf: ManagedBuffer<MAX_MESSAGE_SMALL_BUFFER_SIZE> = ManagedBuffer::new();
        let mut rng = rand::thread_rng();
        let mut head = [0u8; 0x80];
        rng.fill(&mut head[..]);

        buf.append(&head).unwrap();
        let before_size = buf.size();

        let oversize = [0xAA; 0x100];
        assert_eq!(buf.append(&oversize), Err(TranscriptError::BufferFull));
        assert_eq!(buf.size(), before_size);
        assert_eq!(buf.data(), &head);
    }

    #[test]
    fn test_oversize_append_into_empty_buffer() {
        let mut buf: ManagedBuffer<MAX_MESSAGE_SMALL_BUFFER_SIZE> = ManagedBuffer::new();
        let oversize = [0u8; MAX_MESSAGE_SMALL_BUFFER_SIZE + 1];
        assert_eq!(buf.append(&oversize), Err(TranscriptError::BufferFull));
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn test_append_to_exact_capacity() {
        let mut buf: ManagedBuffer<MAX_MESSAGE_SMALL_BUFFER_SIZE> = ManagedBuffer::new();
        let fill = [0x5A; MAX_MESSAGE_SMALL_BUFFER_SIZE];
        buf.append(&fill).unwrap();
        assert_eq!(buf.size(), buf.capacity());
        assert_eq!(buf.append(&[0]), Err(TranscriptError::BufferFull));
    }

    #[test]
    fn test_reset_is_idempotent_and_zeroes() {
        let mut buf: ManagedBuffer<MAX_MESSAGE_SMALL_BUFFER_SIZE> = ManagedBuffer::new();
        buf.append(&[0xFF; 0x40]).unwrap();

        buf.reset();
        assert_eq!(buf.size(), 0);
        assert!(buf.data.iter().all(|&b| b == 0));

        let snapshot = buf.clone();
        buf.reset();
        assert_eq!(buf, snapshot);
    }

    #[test]
    fn test_transcript_contexts_are_independent() {
        let mut transcript = Transcript::new();
        transcript.append(TranscriptContext::A, &[1, 2]).unwrap();
        transcript.append(TranscriptContext::B, &[3]).unwrap();

        transcript.reset_context(TranscriptContext::B);
        assert_eq!(transcript.message(TranscriptContext::A), &[1, 2]);
        assert_eq!(transcript.size(TranscriptContext::B), 0);
    }
}
