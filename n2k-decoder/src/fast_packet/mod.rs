//! Fast-packet reassembly
//!
//! NMEA2000 spreads messages longer than 8 bytes over several frames. The low
//! 5 bits of byte 0 carry the frame's sequence number; frame 0 additionally
//! carries the total message length in byte 1. Frame 0 contributes bytes 2..,
//! every other frame bytes 1..
//!
//! One buffer is kept per conversation `(source, destination, pgn)`. A buffer
//! opens on frame 0, collects frames until the declared length is reached and
//! is then removed. Buffers that stop receiving frames are evicted once
//! `idle_frames` further frames went through the assembler without touching
//! them.

use crate::types::{CanFrame, MessageHeader, Transport};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Sequence number bits of the first data byte
const SEQUENCE_MASK: u8 = 0x1F;

//==================================================================================RESULTS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// Frame dropped: first frame missing, zero length, empty data or duplicate
    Ignored,
    /// Frame stored, more frames are expected
    FragmentConsumed,
    /// Last missing frame arrived; the buffer is gone and the message is complete
    MessageComplete(MessageHeader),
}

/// Reassembly counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReassemblyStats {
    /// Messages emitted
    pub completed: u64,
    /// Frames discarded because no buffer was open or the length was zero
    pub discarded: u64,
    /// Frames whose sequence number was already buffered
    pub duplicates: u64,
    /// Conversations abandoned (idle eviction or flush)
    pub evicted: u64,
}

//==================================================================================BUFFER
/// Conversation key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    pub source: u8,
    pub destination: u8,
    pub pgn: u32,
}

impl ConversationKey {
    pub fn of(frame: &CanFrame) -> Self {
        Self {
            source: frame.source,
            destination: frame.destination,
            pgn: frame.pgn,
        }
    }
}

/// An open conversation
#[derive(Debug, Clone)]
struct FastPacketBuffer {
    total_bytes: usize,
    frames: BTreeMap<u8, Vec<u8>>,
    received_bytes: usize,
    priority: u8,
    timestamp: Option<String>,
    /// Value of the assembler's frame counter when this buffer last changed
    last_update: u64,
}

impl FastPacketBuffer {
    fn assemble(self) -> Vec<u8> {
        let mut payload: Vec<u8> = self.frames.into_values().flatten().collect();
        payload.truncate(self.total_bytes);
        payload
    }
}

//==================================================================================ASSEMBLER
/// Per-conversation fast-packet assembler
///
/// Frames of one conversation must be fed in arrival order; different
/// conversations are independent.
#[derive(Debug, Clone, Default)]
pub struct FastPacketAssembler {
    buffers: HashMap<ConversationKey, FastPacketBuffer>,
    idle_frames: Option<u64>,
    frame_counter: u64,
    stats: ReassemblyStats,
}

impl FastPacketAssembler {
    /// Create an assembler; `idle_frames = None` keeps abandoned buffers until [`flush`](Self::flush)
    pub fn new(idle_frames: Option<u64>) -> Self {
        Self {
            idle_frames,
            ..Self::default()
        }
    }

    /// Process one frame of a fast-packet PGN
    pub fn process_frame(&mut self, frame: CanFrame) -> ProcessResult {
        self.frame_counter += 1;
        self.evict_idle();

        let Some(&first) = frame.data.first() else {
            self.stats.discarded += 1;
            return ProcessResult::Ignored;
        };
        let sequence = first & SEQUENCE_MASK;
        let key = ConversationKey::of(&frame);

        if !self.buffers.contains_key(&key) {
            if sequence != 0 {
                log::debug!("First frame missing for {:?}, skipping frame {}", key, sequence);
                self.stats.discarded += 1;
                return ProcessResult::Ignored;
            }

            let total_bytes = frame.data.get(1).copied().unwrap_or(0) as usize;
            if total_bytes == 0 {
                log::debug!("Zero message length for {:?}, skipping", key);
                self.stats.discarded += 1;
                return ProcessResult::Ignored;
            }

            log::trace!("Opening {:?}: {} bytes", key, total_bytes);
            self.buffers.insert(
                key,
                FastPacketBuffer {
                    total_bytes,
                    frames: BTreeMap::new(),
                    received_bytes: 0,
                    priority: frame.priority,
                    timestamp: frame.timestamp.clone(),
                    last_update: self.frame_counter,
                },
            );
        }

        let Some(buffer) = self.buffers.get_mut(&key) else {
            return ProcessResult::Ignored;
        };

        if buffer.frames.contains_key(&sequence) {
            log::debug!("Duplicate frame {} for {:?}, ignoring", sequence, key);
            self.stats.duplicates += 1;
            return ProcessResult::Ignored;
        }

        let header_len = if sequence == 0 { 2 } else { 1 };
        let chunk = frame.data.get(header_len..).unwrap_or_default().to_vec();
        buffer.received_bytes += chunk.len();
        buffer.frames.insert(sequence, chunk);
        buffer.last_update = self.frame_counter;

        if buffer.received_bytes < buffer.total_bytes {
            return ProcessResult::FragmentConsumed;
        }

        let Some(buffer) = self.buffers.remove(&key) else {
            return ProcessResult::Ignored;
        };
        let priority = buffer.priority;
        let timestamp = buffer.timestamp.clone();
        let payload = buffer.assemble();
        log::trace!("Completed {:?}: {} bytes", key, payload.len());
        self.stats.completed += 1;

        ProcessResult::MessageComplete(MessageHeader {
            timestamp,
            priority,
            pgn: key.pgn,
            source: key.source,
            destination: key.destination,
            payload,
            transport: Transport::Fast,
        })
    }

    fn evict_idle(&mut self) {
        let Some(limit) = self.idle_frames else {
            return;
        };
        let now = self.frame_counter;
        let before = self.buffers.len();

        self.buffers.retain(|key, buffer| {
            let keep = now - buffer.last_update <= limit;
            if !keep {
                log::debug!(
                    "Evicting {:?}: idle for {} frames, {}/{} bytes",
                    key,
                    now - buffer.last_update,
                    buffer.received_bytes,
                    buffer.total_bytes
                );
            }
            keep
        });

        self.stats.evicted += (before - self.buffers.len()) as u64;
    }

    /// Abandon every open conversation (end of stream); returns how many were dropped
    pub fn flush(&mut self) -> usize {
        let dropped = self.buffers.len();
        if dropped > 0 {
            log::debug!("Abandoning {} incomplete fast-packet conversations", dropped);
        }
        self.buffers.clear();
        self.stats.evicted += dropped as u64;
        dropped
    }

    /// True if a buffer is open for `key`
    pub fn is_open(&self, key: &ConversationKey) -> bool {
        self.buffers.contains_key(key)
    }

    /// Number of open conversations
    pub fn open_conversations(&self) -> usize {
        self.buffers.len()
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }
}
