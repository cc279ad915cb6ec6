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

//! # CONNECT Handler
//!
//! This crate implements the non-blocking CONNECT tunnelling handshake
//! of a TLS terminating proxy.
//!
//! The `IncomingConnectHandler` runs on the client facing socket. It
//! tells a raw TLS handshake apart from an HTTP CONNECT request, parses
//! the request and writes back the response, optionally with a body.
//!
//! The `UpstreamConnectHandler` runs on the socket to an upstream HTTP
//! proxy. It sends the CONNECT request, parses the response header and
//! reads the response body.
//!
//! Both handlers are resumable state machines. `do_work` is called
//! from the connection's readiness callback, never blocks and reports
//! whether it needs a read or write event before it can continue.
//!
//! ## Example
//!
//! ```
//! use connect_handler::{ConnectHandler, IncomingConnectHandler};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8443").await.unwrap();
//!     let (stream, _) = listener.accept().await.unwrap();
//!
//!     let mut handler = IncomingConnectHandler::new();
//!     connect_handler::drive(&mut handler, &stream).await.unwrap();
//!     if handler.connect_received() {
//!         println!("tunnel to {}", handler.connect_request().target);
//!     }
//! }
//! ```
//!
//! ## Limitations
//!
//! * Chunked upstream response bodies are not supported.
//! * Only the first byte is inspected to detect TLS.

mod buffer;
mod config;
mod driver;
mod error;
mod handler;
mod header;
mod held;
mod hook;
mod incoming;
mod io;
mod socket;
#[cfg(test)]
mod testing;
mod upstream;

pub use buffer::{HeaderParser, HeaderStage, StagingBuffer, BLOCK_SIZE};
pub use config::ProxyConfig;
pub use driver::drive;
pub use error::{Error, Result};
pub use handler::{ConnectHandler, ConnectState, Progress};
pub use header::{HeaderMessage, RequestHeader, ResponseHeader};
pub use held::{Held, HeldMut, HeldRef};
pub use hook::ConnectHook;
pub use incoming::{IncomingConnectHandler, TLS_HANDSHAKE};
pub use io::{
    drain_buffer_into, read_bytes_from_socket, read_header_from_socket, serialize_header_to_buffer,
    write_buffer_to_socket, write_bytes_to_socket, Transfer, TransferProgress, MAX_HEADER_LEN,
    WRITE_CHUNK,
};
pub use socket::{is_transient, Socket, TokioSocket};
pub use upstream::{UpstreamConnectHandler, MAX_BODY_LEN};
