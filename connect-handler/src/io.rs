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

//! # Header I/O engine
//!
//! Incremental read/parse and serialize/write primitives shared by the
//! incoming and upstream CONNECT handlers.
//!
//! Every primitive is non-blocking and may be called repeatedly until
//! it reports [`Transfer::Done`]. Partial progress lives in the caller
//! owned counters and buffers, so a call that returns
//! [`Transfer::WouldBlock`] can simply be repeated on the next
//! readiness event.
//!
//! Writes move at most [`WRITE_CHUNK`] bytes per call. Reads drain the
//! socket until it would block, since an edge-triggered readiness
//! source will not report the leftover data again.

use crate::buffer::{HeaderParser, StagingBuffer, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::header::HeaderMessage;
use crate::socket::{is_transient, Socket};
use httparse::Status;
use log::trace;
use std::io;

/// Upper bound of bytes written per call.
pub const WRITE_CHUNK: usize = 4096;

/// Largest header the engine stages before giving up on the peer.
pub const MAX_HEADER_LEN: usize = 64 * 1024;

/// Outcome of one non-fatal engine step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transfer {
    /// The operation is complete.
    Done,
    /// No further progress is possible until the socket is ready again.
    WouldBlock,
}

/// Progress of one streaming operation.
///
/// `moved` never exceeds `expected`; the operation is complete when
/// they are equal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub expected: usize,
    pub moved: usize,
}

impl TransferProgress {
    pub fn new(expected: usize) -> Self {
        TransferProgress { expected, moved: 0 }
    }

    pub fn is_complete(&self) -> bool {
        self.moved >= self.expected
    }

    pub fn remaining(&self) -> usize {
        self.expected.saturating_sub(self.moved)
    }

    fn state(&self) -> Transfer {
        if self.is_complete() {
            Transfer::Done
        } else {
            Transfer::WouldBlock
        }
    }
}

/// Serializes `header` into `buffer` and returns the serialized length.
pub fn serialize_header_to_buffer<H: HeaderMessage>(header: &H, buffer: &mut StagingBuffer) -> usize {
    let out = buffer.bytes_mut();
    out.reserve(BLOCK_SIZE);
    header.print(out)
}

/// Writes up to one chunk of staged bytes to the socket.
pub fn write_buffer_to_socket<S: Socket>(
    socket: &mut S,
    buffer: &mut StagingBuffer,
    progress: &mut TransferProgress,
) -> Result<Transfer> {
    let to_write = WRITE_CHUNK.min(buffer.read_avail()).min(progress.remaining());
    if to_write > 0 {
        if let Some(written) = write_once(socket, &buffer.chunk()[..to_write])? {
            trace!(target: "connect_handler", "written {}", written);
            progress.moved += written;
            buffer.consume(written);
        }
    }
    Ok(progress.state())
}

/// Writes up to one chunk of `bytes`, starting at `*written`.
pub fn write_bytes_to_socket<S: Socket>(
    socket: &mut S,
    bytes: &[u8],
    written: &mut usize,
) -> Result<Transfer> {
    let mut progress = TransferProgress { expected: bytes.len(), moved: *written };
    let to_write = WRITE_CHUNK.min(progress.remaining());
    if to_write > 0 {
        let start = progress.moved;
        if let Some(n) = write_once(socket, &bytes[start..start + to_write])? {
            trace!(target: "connect_handler", "written {}", n);
            progress.moved += n;
            *written = progress.moved;
        }
    }
    Ok(progress.state())
}

/// Drains the socket into `buffer` and parses the staged bytes.
///
/// On completion the header bytes are consumed from `buffer`; anything
/// read past the end of the header stays staged. A header still
/// incomplete after [`MAX_HEADER_LEN`] staged bytes is an error.
pub fn read_header_from_socket<S: Socket, H: HeaderMessage>(
    socket: &mut S,
    header: &mut H,
    buffer: &mut StagingBuffer,
    parser: &mut HeaderParser,
) -> Result<Transfer> {
    let drained = read_into_buffer(socket, buffer)?;
    if drained.total == 0 {
        return if drained.eof { Err(closed_by_peer()) } else { Ok(Transfer::WouldBlock) };
    }

    match parser.parse(header, buffer.chunk())? {
        Status::Partial if drained.eof => Err(closed_by_peer()),
        Status::Partial if buffer.read_avail() > MAX_HEADER_LEN => {
            Err(Error::InvalidHeader(format!("header exceeds {} bytes", MAX_HEADER_LEN)))
        }
        Status::Partial => Ok(Transfer::WouldBlock),
        Status::Complete(consumed) => {
            buffer.consume(consumed);
            Ok(Transfer::Done)
        }
    }
}

/// Reads into `dest` from `*read` onwards until `dest` is full or the
/// socket would block.
pub fn read_bytes_from_socket<S: Socket>(
    socket: &mut S,
    dest: &mut [u8],
    read: &mut usize,
) -> Result<Transfer> {
    while *read < dest.len() {
        let end = dest.len().min(*read + BLOCK_SIZE);
        match socket.read(&mut dest[*read..end]) {
            Ok(0) => return Err(closed_by_peer()),
            Ok(n) => {
                trace!(target: "connect_handler", "read {}", n);
                *read += n;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_transient(&e) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(if *read == dest.len() { Transfer::Done } else { Transfer::WouldBlock })
}

/// Moves bytes already staged in `buffer` into `dest` from `*read`
/// onwards and returns how many were moved.
pub fn drain_buffer_into(buffer: &mut StagingBuffer, dest: &mut [u8], read: &mut usize) -> usize {
    let n = buffer.read_avail().min(dest.len() - *read);
    dest[*read..*read + n].copy_from_slice(&buffer.chunk()[..n]);
    buffer.consume(n);
    *read += n;
    n
}

struct Drained {
    total: usize,
    eof: bool,
}

fn read_into_buffer<S: Socket>(socket: &mut S, buffer: &mut StagingBuffer) -> Result<Drained> {
    let mut drained = Drained { total: 0, eof: false };
    loop {
        match buffer.fill_block(|block| socket.read(block)) {
            Ok(0) => {
                drained.eof = true;
                break;
            }
            Ok(n) => {
                trace!(target: "connect_handler", "read {}", n);
                drained.total += n;
                if buffer.read_avail() > MAX_HEADER_LEN {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_transient(&e) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(drained)
}

/// Writes once, retrying on interrupt. `None` means the socket would block.
fn write_once<S: Socket>(socket: &mut S, bytes: &[u8]) -> Result<Option<usize>> {
    loop {
        match socket.write(bytes) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => return Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_transient(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }
}

pub(crate) fn closed_by_peer() -> Error {
    Error::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer"))
}
