//! Chunk framing for the notification channel
//!
//! A message travels as a sequence of chunks of at most [`CHUNK_SIZE_LIMIT`]
//! bytes followed by exactly one [`END_OF_MESSAGE`]. The receiver concatenates
//! chunks in arrival order and assumes nothing about their sizes.

use std::sync::Arc;

use crate::protocol::{CHUNK_SIZE_LIMIT, END_OF_MESSAGE};

// ----------------------------------------------------------------------------
// Framing Helpers
// ----------------------------------------------------------------------------

/// Whether a notification value is the end-of-message marker
pub fn is_end_of_message(value: &[u8]) -> bool {
    value == END_OF_MESSAGE
}

/// Split a payload into the chunk sequence the peripheral sends, marker excluded
pub fn chunks(payload: &[u8]) -> impl Iterator<Item = &[u8]> {
    payload.chunks(CHUNK_SIZE_LIMIT)
}

/// Offset of the first data chunk that is byte-identical to the marker
///
/// Only the last chunk can collide, since every other chunk is exactly
/// [`CHUNK_SIZE_LIMIT`] bytes long.
pub fn marker_collision(payload: &[u8]) -> Option<usize> {
    chunks(payload)
        .enumerate()
        .find(|(_, chunk)| is_end_of_message(chunk))
        .map(|(index, _)| index * CHUNK_SIZE_LIMIT)
}

// ----------------------------------------------------------------------------
// Inbound Reassembly
// ----------------------------------------------------------------------------

/// Result of feeding one notification into an [`InboundAccumulator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Chunk appended, message not finished yet
    Partial { buffered: usize },
    /// Marker observed; the assembled message, now owned by the caller
    Complete(Vec<u8>),
}

/// Central-side buffer for the message currently being received
#[derive(Debug, Default)]
pub struct InboundAccumulator {
    buffer: Vec<u8>,
}

impl InboundAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one notification value
    pub fn push(&mut self, value: &[u8]) -> Frame {
        if is_end_of_message(value) {
            return Frame::Complete(std::mem::take(&mut self.buffer));
        }
        self.buffer.extend_from_slice(value);
        Frame::Partial {
            buffered: self.buffer.len(),
        }
    }

    /// Drop whatever was buffered for the current peer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Outbound Cursor
// ----------------------------------------------------------------------------

/// Peripheral-side progress through the message being sent
///
/// `offset` counts bytes the transport has accepted. It is only ever advanced
/// in place through [`OutboundCursor::advance`], and always stays within
/// `0..=payload.len()`.
#[derive(Debug, Clone)]
pub struct OutboundCursor {
    payload: Arc<[u8]>,
    offset: usize,
    marker_pending: bool,
}

impl OutboundCursor {
    pub fn new(payload: Arc<[u8]>) -> Self {
        Self {
            payload,
            offset: 0,
            marker_pending: false,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }

    /// Every data byte has been accepted by the transport
    pub fn is_drained(&self) -> bool {
        self.offset == self.payload.len()
    }

    /// Set once the marker has been attempted and rejected
    pub fn marker_pending(&self) -> bool {
        self.marker_pending
    }

    pub fn set_marker_pending(&mut self, pending: bool) {
        self.marker_pending = pending;
    }

    /// The next chunk to offer the transport, empty once drained
    pub fn next_chunk(&self) -> &[u8] {
        let size = CHUNK_SIZE_LIMIT.min(self.remaining());
        &self.payload[self.offset..self.offset + size]
    }

    /// Record that the transport accepted `accepted` more bytes
    pub fn advance(&mut self, accepted: usize) {
        self.offset = (self.offset + accepted).min(self.payload.len());
    }
}
