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

//! This module defines the CONNECT handshake error types.

use http::StatusCode;
use std::fmt;
use std::io;

/// An enumeration of possible errors.
///
/// Every variant is terminal for the handshake attempt. Transient
/// socket conditions (would-block, not-yet-connected) never surface
/// as an `Error`.
#[derive(Debug)]
pub enum Error {
    /// Hard failure from a socket read, write or peek.
    IoError(io::Error),
    /// The CONNECT request or response could not be parsed.
    ParseError(httparse::Error),
    /// The parsed header holds a value the header model rejects.
    InvalidHeader(String),
    /// The upstream proxy answered the CONNECT with a non-success status.
    UpstreamRejected(StatusCode),
    /// `do_work` was called again after the handler already failed.
    HandlerFailed,
    MalformedConfigString,
    InvalidPortNumber,
    InvalidHost,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::ParseError(err) => write!(f, "Parse error: {}", err),
            Error::InvalidHeader(msg) => write!(f, "Invalid header: {}", msg),
            Error::UpstreamRejected(status) => {
                write!(f, "Upstream proxy rejected CONNECT with status {}", status)
            }
            Error::HandlerFailed => write!(f, "CONNECT handler already failed"),
            Error::MalformedConfigString => {
                write!(f, "Invalid proxy configuration string")
            }
            Error::InvalidPortNumber => write!(f, "Invalid port number"),
            Error::InvalidHost => write!(f, "Invalid host"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            Error::ParseError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<httparse::Error> for Error {
    fn from(err: httparse::Error) -> Self {
        Error::ParseError(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_chaining() {
        let inner_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let outer_error = Error::IoError(inner_error);

        assert!(outer_error.to_string().contains("pipe closed"));
        assert!(std::error::Error::source(&outer_error).is_some());
    }

    #[test]
    fn test_upstream_rejected_names_status() {
        let err = Error::UpstreamRejected(StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_parse_error_from_httparse() {
        let err: Error = httparse::Error::Token.into();
        assert!(matches!(err, Error::ParseError(httparse::Error::Token)));
    }
}
