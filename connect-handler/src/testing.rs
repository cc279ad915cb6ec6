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

//! Scripted in-memory socket for unit tests.

use crate::socket::Socket;
use std::collections::VecDeque;
use std::io;

enum ReadStep {
    Data(Vec<u8>),
    WouldBlock,
    Eof,
    Error(io::ErrorKind),
}

enum WriteStep {
    Accept(usize),
    WouldBlock,
    Error(io::ErrorKind),
}

/// A socket whose reads follow a script and whose writes are captured.
///
/// An exhausted read script reports `WouldBlock`. `Eof` is sticky.
/// Writes follow their own script and otherwise accept up to
/// `write_limit` bytes per call.
#[derive(Default)]
pub struct MockSocket {
    reads: VecDeque<ReadStep>,
    writes: VecDeque<WriteStep>,
    write_limit: Option<usize>,
    pub written: Vec<u8>,
    pub read_calls: usize,
    pub write_calls: usize,
    pub peek_calls: usize,
}

impl MockSocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, data: &[u8]) -> Self {
        self.reads.push_back(ReadStep::Data(data.to_vec()));
        self
    }

    pub fn with_would_block(mut self) -> Self {
        self.reads.push_back(ReadStep::WouldBlock);
        self
    }

    /// Delivers `data` `size` bytes per readiness event.
    pub fn with_chunks(mut self, data: &[u8], size: usize) -> Self {
        for chunk in data.chunks(size.max(1)) {
            self.reads.push_back(ReadStep::Data(chunk.to_vec()));
            self.reads.push_back(ReadStep::WouldBlock);
        }
        self
    }

    pub fn with_eof(mut self) -> Self {
        self.reads.push_back(ReadStep::Eof);
        self
    }

    pub fn with_read_error(mut self, kind: io::ErrorKind) -> Self {
        self.reads.push_back(ReadStep::Error(kind));
        self
    }

    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    pub fn with_write_accept(mut self, n: usize) -> Self {
        self.writes.push_back(WriteStep::Accept(n));
        self
    }

    pub fn with_write_would_block(mut self) -> Self {
        self.writes.push_back(WriteStep::WouldBlock);
        self
    }

    pub fn with_write_error(mut self, kind: io::ErrorKind) -> Self {
        self.writes.push_back(WriteStep::Error(kind));
        self
    }

    /// Appends more inbound data after construction.
    pub fn push_data(&mut self, data: &[u8]) {
        self.reads.push_back(ReadStep::Data(data.to_vec()));
    }

    pub fn push_eof(&mut self) {
        self.reads.push_back(ReadStep::Eof);
    }

    pub fn touched(&self) -> bool {
        self.read_calls + self.write_calls + self.peek_calls > 0
    }
}

impl Socket for MockSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_calls += 1;
        match self.reads.front_mut() {
            None => Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadStep::Data(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                data.drain(..n);
                if data.is_empty() {
                    self.reads.pop_front();
                }
                Ok(n)
            }
            Some(ReadStep::Eof) => Ok(0),
            Some(ReadStep::WouldBlock) => {
                self.reads.pop_front();
                Err(io::ErrorKind::WouldBlock.into())
            }
            Some(ReadStep::Error(kind)) => {
                let kind = *kind;
                self.reads.pop_front();
                Err(kind.into())
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls += 1;
        let accept = match self.writes.pop_front() {
            Some(WriteStep::Accept(n)) => n,
            Some(WriteStep::WouldBlock) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(WriteStep::Error(kind)) => return Err(kind.into()),
            None => self.write_limit.unwrap_or(usize::MAX),
        };
        let n = accept.min(buf.len());
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.peek_calls += 1;
        match self.reads.front() {
            None => Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadStep::Data(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(ReadStep::Eof) => Ok(0),
            Some(ReadStep::WouldBlock) => {
                self.reads.pop_front();
                Err(io::ErrorKind::WouldBlock.into())
            }
            Some(ReadStep::Error(kind)) => {
                let kind = *kind;
                self.reads.pop_front();
                Err(kind.into())
            }
        }
    }
}
