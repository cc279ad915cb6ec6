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

// # Socket primitives
//
// The handlers never wait on a socket. Every primitive is attempted
// once and must return `io::ErrorKind::WouldBlock` instead of blocking.
// `WouldBlock` and `NotConnected` are transient; every other error is
// fatal to the handshake.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::task::{Context, Poll, Waker};
use tokio::io::ReadBuf;

/// Non-blocking socket operations used by the CONNECT handlers.
pub trait Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Reads without consuming.
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<S: Socket + ?Sized> Socket for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).peek(buf)
    }
}

/// The stream must have been put in non-blocking mode.
impl Socket for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::peek(self, buf)
    }
}

/// Adapts a tokio stream to the non-blocking primitives.
///
/// Readiness is left to the caller, see [`crate::driver`].
pub struct TokioSocket<'a>(pub &'a tokio::net::TcpStream);

impl Socket for TokioSocket<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }

    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut cx = Context::from_waker(Waker::noop());
        let mut read_buf = ReadBuf::new(buf);
        match self.0.poll_peek(&mut cx, &mut read_buf) {
            Poll::Ready(result) => result,
            Poll::Pending => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

/// Whether `err` only means "try again on the next readiness event".
pub fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::NotConnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn transient_kinds() {
        assert!(is_transient(&io::ErrorKind::WouldBlock.into()));
        assert!(is_transient(&io::ErrorKind::NotConnected.into()));
        assert!(!is_transient(&io::ErrorKind::ConnectionReset.into()));
        assert!(!is_transient(&io::ErrorKind::BrokenPipe.into()));
    }

    #[test]
    fn std_stream_peek_does_not_consume() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();

        let mut byte = [0u8; 1];
        let err = Socket::peek(&mut server, &mut byte).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        client.write_all(b"CONNECT").unwrap();
        client.flush().unwrap();
        server.set_nonblocking(false).unwrap();
        assert_eq!(Socket::peek(&mut server, &mut byte).unwrap(), 1);
        assert_eq!(&byte, b"C");

        let mut all = [0u8; 7];
        server.read_exact(&mut all).unwrap();
        assert_eq!(&all, b"CONNECT");
    }
}
