// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Staging buffers and parser state for the header phases.

use crate::error::{Error, Result};
use crate::header::HeaderMessage;
use crate::io::TransferProgress;
use bytes::{Buf, BytesMut};
use httparse::Status;
use log::debug;
use std::io;

/// Growth step of a staging buffer.
pub const BLOCK_SIZE: usize = 4096;

const INITIAL_HEADER_SLOTS: usize = 32;
const MAX_HEADER_SLOTS: usize = 256;

/// Append-only byte buffer with a read cursor.
///
/// Bytes are appended at the end, one block at a time, and consumed
/// from the front.
#[derive(Debug, Default)]
pub struct StagingBuffer {
    buf: BytesMut,
}

impl StagingBuffer {
    pub fn new() -> Self {
        StagingBuffer { buf: BytesMut::with_capacity(BLOCK_SIZE) }
    }

    /// Appends one block of data produced by `fill`.
    ///
    /// `fill` receives a zeroed block and returns how many bytes it
    /// wrote; the rest of the block is dropped again.
    pub fn fill_block<F>(&mut self, fill: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        let start = self.buf.len();
        self.buf.resize(start + BLOCK_SIZE, 0);
        let result = fill(&mut self.buf[start..]);
        let filled = *result.as_ref().unwrap_or(&0);
        self.buf.truncate(start + filled.min(BLOCK_SIZE));
        result
    }

    /// Number of unconsumed bytes.
    pub fn read_avail(&self) -> usize {
        self.buf.len()
    }

    /// Unconsumed bytes, contiguous.
    pub fn chunk(&self) -> &[u8] {
        &self.buf
    }

    pub fn consume(&mut self, n: usize) {
        self.buf.advance(n.min(self.buf.len()));
    }

    /// Raw access for printers appending serialized data.
    pub fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

/// Incremental header parser state.
///
/// `httparse` keeps no state between calls, so the parser re-runs over
/// every staged byte on each attempt. The only state carried here is
/// the number of header slots, which grows when a message carries more
/// fields than the current capacity.
#[derive(Debug)]
pub struct HeaderParser {
    slots: usize,
}

impl Default for HeaderParser {
    fn default() -> Self {
        HeaderParser { slots: INITIAL_HEADER_SLOTS }
    }
}

impl HeaderParser {
    pub fn parse<H: HeaderMessage>(&mut self, header: &mut H, bytes: &[u8]) -> Result<Status<usize>> {
        loop {
            let mut slots = vec![httparse::EMPTY_HEADER; self.slots];
            match header.parse_from(bytes, &mut slots) {
                Err(Error::ParseError(httparse::Error::TooManyHeaders))
                    if self.slots < MAX_HEADER_SLOTS =>
                {
                    self.slots *= 2;
                    debug!(target: "connect_handler", "growing header slots to {}", self.slots);
                }
                result => return result,
            }
        }
    }
}

/// The general purpose resources of one header phase: a staging
/// buffer, its parser and the write progress over it.
///
/// A stage is created when a header phase starts and dropped as soon as
/// it completes.
#[derive(Debug, Default)]
pub struct HeaderStage {
    pub buffer: StagingBuffer,
    pub parser: HeaderParser,
    pub progress: TransferProgress,
}

impl HeaderStage {
    pub fn new() -> Self {
        HeaderStage { buffer: StagingBuffer::new(), ..Default::default() }
    }
}
